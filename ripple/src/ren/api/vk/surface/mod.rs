use crate::{error::{Check, Result}, traits::Destroy};

use ash::{Entry, Instance, khr, vk};
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub struct Surface {
    pub instance: khr::surface::Instance,
    pub khr: vk::SurfaceKHR,
}

impl Surface {
    pub fn new(entry: &Entry, instance: &Instance, window: &(impl HasDisplayHandle + HasWindowHandle)) -> Result<Self> {
        let surface_instance = khr::surface::Instance::new(entry, instance);

        let display_handle = window.display_handle()?.as_raw();
        let window_handle = window.window_handle()?.as_raw();

        let khr = unsafe {
            ash_window::create_surface(entry, instance, display_handle, window_handle, None)
                .check("ripple::ren::vk::Surface - failed to create Surface")?
        };

        Ok(Self { instance: surface_instance, khr })
    }
}

impl Destroy for Surface {
    fn destroy(&mut self) {
        unsafe { self.instance.destroy_surface(self.khr, None) };
    }
}
