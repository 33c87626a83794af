pub mod config;

use super::surface::Surface;
use crate::{
    error::{Check, Error, Result},
    traits::Destroy,
};
use config::{PhysicalDeviceProperties, PhysicalDeviceQueueFamilies, QueueFamilyType};

use ash::{Device as DeviceHandle, Instance, vk};

pub struct Device {
    pub physical_device: vk::PhysicalDevice,
    pub physical_device_properties: PhysicalDeviceProperties,
    pub queue_families: PhysicalDeviceQueueFamilies,
    pub handle: DeviceHandle,
}

impl Device {
    pub fn new(instance: &Instance, surface: &Surface) -> Result<Self> {
        let physical_devices = unsafe {
            instance
                .enumerate_physical_devices()
                .check("ripple::ren::vk::Device - failed to enumerate physical devices")?
        };

        let mut suitable_physical_devices: Vec<_> = physical_devices
            .iter()
            .filter_map(|&physical_device| {
                match config::validate_physical_device(instance, physical_device, surface) {
                    Ok(device) => Some(device),
                    Err(e) => {
                        log::debug!("ripple::ren::vk::Device - skipping physical device: {e}");
                        None
                    }
                }
            })
            .collect();

        suitable_physical_devices.sort();

        let selected_physical_device = suitable_physical_devices.first().ok_or(Error::NoSuitableDevice)?;
        log::info!(
            "ripple::ren::vk::Device - selected {} ({:?})",
            selected_physical_device.properties.name,
            selected_physical_device.properties.device_type
        );

        let mut device_config = config::DeviceConfig::new(selected_physical_device);
        let extensions = device_config.get_extensions();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&device_config.queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&device_config.features)
            .push_next(&mut device_config.vk_13_features)
            .push_next(&mut device_config.vk_12_features);

        let device = unsafe {
            instance
                .create_device(selected_physical_device.handle, &create_info, None)
                .check("ripple::ren::vk::Device - failed to create device")?
        };

        Ok(Self {
            physical_device: selected_physical_device.handle,
            physical_device_properties: selected_physical_device.properties.clone(),
            queue_families: selected_physical_device.queue_families.clone(),
            handle: device,
        })
    }

    pub fn get_queue(&self, queue_family_type: QueueFamilyType) -> vk::Queue {
        let queue_family_index = self.queue_families.get_family_index(queue_family_type);
        unsafe { self.handle.get_device_queue(queue_family_index, 0) }
    }

    pub fn get_family_index(&self, queue_family_type: QueueFamilyType) -> u32 {
        self.queue_families.get_family_index(queue_family_type)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.handle.device_wait_idle().check("ripple::ren::vk::Device - failed to wait for device idle") }
    }
}

impl Destroy for Device {
    fn destroy(&mut self) {
        unsafe { self.handle.destroy_device(None) };
    }
}
