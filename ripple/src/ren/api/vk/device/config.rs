use super::super::{instance::config::is_extension_available, surface::Surface};
use crate::error::{Check, Result};

use ash::{Instance, khr, vk};
use std::{cmp::Ordering, collections::BTreeSet, ffi::{CStr, c_char}};

pub struct DeviceConfig<'a> {
    pub extensions: Vec<&'static CStr>,
    pub features: vk::PhysicalDeviceFeatures,
    pub vk_13_features: vk::PhysicalDeviceVulkan13Features<'a>,
    pub vk_12_features: vk::PhysicalDeviceVulkan12Features<'a>,
    pub queue_create_infos: Vec<vk::DeviceQueueCreateInfo<'a>>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceConfigError {
    #[error("device feature {0:?} is not supported")]
    FeatureNotSupported(&'static CStr),
    #[error("device extension {0:?} is not supported")]
    ExtensionNotSupported(&'static CStr),
    #[error("no {0:?} queue family")]
    QueueFamilyNotSupported(&'static CStr),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalDeviceProperties {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub min_uniform_buffer_offset_alignment: u64,
}

impl PhysicalDeviceProperties {
    pub fn new(properties: &vk::PhysicalDeviceProperties) -> Self {
        Self {
            name: properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            device_type: properties.device_type,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment,
        }
    }

    fn type_rank(&self) -> u8 {
        match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 0,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
            _ => 3,
        }
    }
}

impl PartialOrd for PhysicalDeviceProperties {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Discrete first, then the larger max image dimension.
impl Ord for PhysicalDeviceProperties {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_rank()
            .cmp(&other.type_rank())
            .then_with(|| other.max_image_dimension_2d.cmp(&self.max_image_dimension_2d))
    }
}

#[derive(Clone, Copy)]
pub enum QueueFamilyType {
    Graphics,
    Present,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalDeviceQueueFamilies {
    pub graphics_family_index: u32,
    pub present_family_index: u32,
}

// Only one queue is requested from each family.
const QUEUE_PRIORITIES: [f32; 1] = [1.0];

impl PhysicalDeviceQueueFamilies {
    pub fn get_family_index(&self, family_type: QueueFamilyType) -> u32 {
        match family_type {
            QueueFamilyType::Graphics => self.graphics_family_index,
            QueueFamilyType::Present => self.present_family_index,
        }
    }

    pub fn get_unique_indices(&self) -> Vec<u32> {
        BTreeSet::from([self.graphics_family_index, self.present_family_index])
            .into_iter()
            .collect()
    }

    pub fn is_shared(&self) -> bool {
        self.graphics_family_index == self.present_family_index
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ValidPhysicalDevice {
    pub properties: PhysicalDeviceProperties,
    pub handle: vk::PhysicalDevice,
    pub queue_families: PhysicalDeviceQueueFamilies,
}

const DEVICE_EXTENSIONS: [&CStr; 1] = [khr::swapchain::NAME];

impl DeviceConfig<'_> {
    pub fn new(valid_physical_device: &ValidPhysicalDevice) -> Self {
        let vk_13_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let vk_12_features = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true)
            .descriptor_indexing(true);

        let queue_create_infos = valid_physical_device
            .queue_families
            .get_unique_indices()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&QUEUE_PRIORITIES)
            })
            .collect();

        Self {
            extensions: DEVICE_EXTENSIONS.to_vec(),
            features: vk::PhysicalDeviceFeatures::default(),
            vk_13_features,
            vk_12_features,
            queue_create_infos,
        }
    }

    pub fn get_extensions(&self) -> Vec<*const c_char> {
        self.extensions.iter().map(|extension| extension.as_ptr()).collect()
    }
}

pub fn validate_physical_device(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    surface: &Surface,
) -> Result<ValidPhysicalDevice> {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };

    validate_extensions(instance, physical_device)?;
    validate_physical_device_feature_requirements(instance, physical_device)?;
    let queue_families = validate_physical_device_queue_families(instance, physical_device, surface)?;

    Ok(ValidPhysicalDevice {
        properties: PhysicalDeviceProperties::new(&properties),
        handle: physical_device,
        queue_families,
    })
}

fn validate_extensions(instance: &Instance, physical_device: vk::PhysicalDevice) -> Result<()> {
    let device_extension_properties = unsafe {
        instance
            .enumerate_device_extension_properties(physical_device)
            .check("ripple::ren::vk::device::Config - failed to enumerate device extension properties")?
    };

    match DEVICE_EXTENSIONS
        .iter()
        .find(|extension| !is_extension_available(extension, &device_extension_properties))
    {
        Some(missing) => Err(DeviceConfigError::ExtensionNotSupported(missing).into()),
        None => Ok(()),
    }
}

fn validate_physical_device_feature_requirements(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<()> {
    let mut vk_13_features = vk::PhysicalDeviceVulkan13Features::default();
    let mut vk_12_features = vk::PhysicalDeviceVulkan12Features::default();
    let mut features_2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut vk_13_features)
        .push_next(&mut vk_12_features);

    unsafe { instance.get_physical_device_features2(physical_device, &mut features_2) };

    let missing = if vk_13_features.dynamic_rendering == vk::FALSE {
        Some(c"vk_13_dynamic_rendering")
    } else if vk_13_features.synchronization2 == vk::FALSE {
        Some(c"vk_13_synchronization2")
    } else if vk_12_features.buffer_device_address == vk::FALSE {
        Some(c"vk_12_buffer_device_address")
    } else if vk_12_features.descriptor_indexing == vk::FALSE {
        Some(c"vk_12_descriptor_indexing")
    } else {
        None
    };

    match missing {
        Some(feature) => Err(DeviceConfigError::FeatureNotSupported(feature).into()),
        None => Ok(()),
    }
}

fn validate_physical_device_queue_families(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    surface: &Surface,
) -> Result<PhysicalDeviceQueueFamilies> {
    let queue_family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut graphics_family_index = None;
    let mut present_family_index = None;

    for (index, family) in queue_family_properties.iter().enumerate() {
        let index = index as u32;
        if graphics_family_index.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics_family_index = Some(index);
        }
        if present_family_index.is_none() {
            let supported = unsafe {
                surface
                    .instance
                    .get_physical_device_surface_support(physical_device, index, surface.khr)
                    .check("ripple::ren::vk::device::Config - failed to query surface support")?
            };
            if supported {
                present_family_index = Some(index);
            }
        }
    }

    let graphics_family_index =
        graphics_family_index.ok_or(DeviceConfigError::QueueFamilyNotSupported(c"graphics"))?;
    let present_family_index =
        present_family_index.ok_or(DeviceConfigError::QueueFamilyNotSupported(c"present"))?;

    Ok(PhysicalDeviceQueueFamilies { graphics_family_index, present_family_index })
}
