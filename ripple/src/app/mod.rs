use crate::{
    camera::Camera,
    error::{Error, Result},
    info::{self, Info},
    ren::{self, frame::FrameOutcome, settings::Settings},
    traits::Destroy,
};

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

pub struct App {
    info: Info,
    settings: Settings,
    scenes: Vec<(String, PathBuf)>,
    camera: Camera,

    window: Option<Window>,
    ren: Option<ren::Handle>,

    last_stats: Instant,
    error: Option<Error>,
}

pub fn new(name: &str, settings: Settings) -> App {
    App {
        info: info::new(name, info::make_version(0, 0, 1, 0)),
        settings,
        scenes: vec![],
        camera: Camera::default(),
        window: None,
        ren: None,
        last_stats: Instant::now(),
        error: None,
    }
}

impl App {
    /// Queues a glTF file to be loaded once the renderer exists.
    pub fn with_scene(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.scenes.push((name.into(), path.into()));
        self
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = camera;
        self
    }

    /// Blocks until the window closes. A fatal renderer error ends the loop and is returned.
    pub fn run(&mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(self)?;

        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        log::error!("ripple::App - {error}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attributes = Window::default_attributes()
            .with_inner_size(PhysicalSize::new(self.settings.resolution.width, self.settings.resolution.height))
            .with_title(self.info.app_name.to_string_lossy().into_owned());
        let window = event_loop.create_window(window_attributes)?;

        let mut handle = ren::new(&self.info, self.settings.clone(), &window)?;
        for (name, path) in &self.scenes {
            if let Err(e) = handle.load_scene(name, path) {
                handle.destroy();
                return Err(e);
            }
        }

        self.ren = Some(handle);
        self.window = Some(window);
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let pressed = event.state == ElementState::Pressed;
        self.camera.process_key(code, pressed);

        if !pressed {
            return;
        }
        match code {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::Digit1 | KeyCode::Digit2 => {
                let index = if code == KeyCode::Digit1 { 0 } else { 1 };
                if let Some(ren) = self.ren.as_mut() {
                    ren.select_background_effect(index);
                }
            }
            _ => (),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(ren) = self.ren.as_mut() else {
            return;
        };

        self.camera.update();
        match ren.draw(self.camera.view_matrix()) {
            Ok(FrameOutcome::Aborted) => log::debug!("ripple::App - frame {} aborted, resizing", ren.frame_number()),
            Ok(_) => (),
            Err(e) => return self.fail(event_loop, e),
        }

        if self.last_stats.elapsed() >= STATS_INTERVAL {
            self.last_stats = Instant::now();
            let stats = ren.stats();
            log::info!(
                "ripple::App - frame {:.2} ms, geometry {:.2} ms, {} draws, {} triangles",
                stats.frametime,
                stats.mesh_draw_time,
                stats.drawcall_count,
                stats.triangle_count
            );
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(ren) = self.ren.as_mut() {
                    ren.request_resize(size.width, size.height);
                }
            }
            WindowEvent::Occluded(occluded) => {
                if let Some(ren) = self.ren.as_mut() {
                    ren.set_paused(occluded);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, event),
            WindowEvent::MouseInput { state, button, .. } => {
                self.camera.process_mouse_button(button, state == ElementState::Pressed);
                if let Some(window) = self.window.as_ref() {
                    window.set_cursor_visible(!self.camera.looking());
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => (),
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (x, y) } = event {
            self.camera.process_mouse_motion(x, y);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let paused = self.ren.as_ref().is_some_and(|ren| ren.paused());
        event_loop.set_control_flow(if paused { ControlFlow::Wait } else { ControlFlow::Poll });

        if let Some(window) = self.window.as_ref().filter(|_| !paused) {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // the renderer holds a surface of the window and goes first
        if let Some(mut ren) = self.ren.take() {
            ren.destroy();
        }
        self.window = None;
    }
}
