use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self { width: 1700, height: 900 }
    }
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

pub const DEFAULT_BUFFERING: u32 = 2;
pub const MIN_RENDER_SCALE: f32 = 0.3;

#[derive(Clone, Debug)]
pub struct Settings {
    pub resolution: Resolution,
    /// Number of frames the CPU may record ahead of the GPU.
    pub buffering: u32,
    pub render_scale: f32,
    pub vsync: bool,
    pub shader_dir: PathBuf,
    pub validation: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            buffering: DEFAULT_BUFFERING,
            render_scale: 1.0,
            vsync: true,
            shader_dir: PathBuf::from("shaders/compiled"),
            validation: cfg!(feature = "debug"),
        }
    }
}

impl Settings {
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn buffering(mut self, buffering: u32) -> Self {
        self.buffering = buffering.max(1);
        self
    }

    pub fn render_scale(mut self, render_scale: f32) -> Self {
        self.render_scale = render_scale.clamp(MIN_RENDER_SCALE, 1.0);
        self
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn shader_dir(mut self, shader_dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = shader_dir.into();
        self
    }

    pub fn validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn shader_path(&self, name: &str) -> PathBuf {
        self.shader_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_double_buffering() {
        assert_eq!(Settings::default().buffering, 2);
    }

    #[test]
    fn builder_clamps_inputs() {
        let settings = Settings::default().buffering(0).render_scale(4.0);
        assert_eq!(settings.buffering, 1);
        assert_eq!(settings.render_scale, 1.0);

        let settings = Settings::default().render_scale(0.0);
        assert_eq!(settings.render_scale, MIN_RENDER_SCALE);
    }

    #[test]
    fn shader_paths_are_relative_to_shader_dir() {
        let settings = Settings::default().shader_dir("assets/spv");
        assert_eq!(settings.shader_path("sky.comp.spv"), PathBuf::from("assets/spv/sky.comp.spv"));
    }
}
