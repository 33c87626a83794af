use anyhow::Context;
use ripple::ren::settings::Settings;

use std::{env, path::PathBuf};

const DEFAULT_SCENE: &str = "assets/structure.glb";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let scene_path = env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_SCENE));
    let mut settings = Settings::default();
    if let Ok(shader_dir) = env::var("RIPPLE_SHADER_DIR") {
        settings = settings.shader_dir(shader_dir);
    }

    log::info!("viewer - loading {}", scene_path.display());

    ripple::app::new("viewer", settings)
        .with_scene("structure", &scene_path)
        .run()
        .with_context(|| format!("viewer failed while showing {}", scene_path.display()))
}
