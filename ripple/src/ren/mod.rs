pub mod api;
pub mod draw;
pub mod frame;
pub mod material;
pub mod settings;

use crate::{error::Result, info::Info, traits::Destroy};
use api::vk::{self, background::BackgroundEffects};
use draw::RendererStats;
use frame::FrameOutcome;
use settings::Settings;

use glam::Mat4;
use std::path::Path;
use winit::window::Window;

/// Owns the renderer; every subsystem hangs off it and is torn down through [`Destroy`].
pub struct Handle {
    api: vk::Renderer,
}

pub fn new(info: &Info, settings: Settings, window: &Window) -> Result<Handle> {
    Ok(Handle { api: vk::Renderer::new(info, settings, window)? })
}

impl Handle {
    pub fn draw(&mut self, view: Mat4) -> Result<FrameOutcome> {
        self.api.draw(view)
    }

    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.api.request_resize(width, height);
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.api.set_paused(paused);
    }

    pub fn paused(&self) -> bool {
        self.api.paused()
    }

    pub fn frame_number(&self) -> u64 {
        self.api.frame_number()
    }

    pub fn stats(&self) -> RendererStats {
        self.api.stats()
    }

    pub fn background_effects_mut(&mut self) -> &mut BackgroundEffects {
        self.api.background_effects_mut()
    }

    pub fn select_background_effect(&mut self, index: usize) {
        self.api.select_background_effect(index);
    }

    pub fn set_render_scale(&mut self, render_scale: f32) {
        self.api.set_render_scale(render_scale);
    }

    pub fn load_scene(&mut self, name: &str, path: &Path) -> Result<()> {
        self.api.load_scene(name, path)
    }

    pub fn unload_scene(&mut self, name: &str) -> Result<bool> {
        self.api.unload_scene(name)
    }

    pub fn scene_names(&self) -> impl Iterator<Item = &str> {
        self.api.scene_names()
    }
}

impl Destroy for Handle {
    fn destroy(&mut self) {
        self.api.destroy();
    }
}
