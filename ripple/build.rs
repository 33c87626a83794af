use std::{env, path::PathBuf};

const SHADERS: &[&str] = &["gradient_color.comp", "sky.comp", "mesh.vert", "mesh.frag"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let shader_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?).join("../shaders");
    for shader in SHADERS {
        println!("cargo:rerun-if-changed={}", shader_dir.join(shader).display());
    }

    #[cfg(feature = "compile-shaders")]
    compile::shaders(&shader_dir, SHADERS)?;

    Ok(())
}

#[cfg(feature = "compile-shaders")]
mod compile {
    use shaderc::{CompileOptions, Compiler, EnvVersion, ShaderKind, TargetEnv};
    use std::{env, error::Error, fs, path::Path};

    /// Writes `<name>.spv` for every shader into `OUT_DIR`, where the renderer embeds it.
    pub fn shaders(shader_dir: &Path, names: &[&str]) -> Result<(), Box<dyn Error>> {
        let out_dir = env::var("OUT_DIR")?;
        let compiler = Compiler::new().expect("shaderc compiler is unavailable");
        let mut options = CompileOptions::new().expect("shaderc options are unavailable");
        options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_3 as u32);

        for name in names {
            let kind = match Path::new(name).extension().and_then(|ext| ext.to_str()) {
                Some("vert") => ShaderKind::Vertex,
                Some("frag") => ShaderKind::Fragment,
                Some("comp") => ShaderKind::Compute,
                _ => return Err(format!("no shader stage for {name}").into()),
            };
            let source = fs::read_to_string(shader_dir.join(name))?;
            let artifact = compiler.compile_into_spirv(&source, kind, name, "main", Some(&options))?;
            fs::write(Path::new(&out_dir).join(format!("{name}.spv")), artifact.as_binary_u8())?;
        }
        Ok(())
    }
}
