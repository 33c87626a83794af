use crate::error::{Check, Result};

use ash::{Entry, ext, vk};
use std::ffi::{CStr, c_char};
use winit::raw_window_handle::RawDisplayHandle;

pub struct InstanceConfig {
    layers: Vec<&'static CStr>,
    extensions: Vec<&'static CStr>,
}

#[derive(Debug, thiserror::Error)]
pub enum InstanceConfigError {
    #[error("instance layer {0:?} is not supported")]
    LayerNotSupported(&'static CStr),
    #[error("instance extension {0:?} is not supported")]
    ExtensionNotSupported(&'static CStr),
}

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

impl InstanceConfig {
    pub fn new(entry: &Entry, display: RawDisplayHandle, validation: bool) -> Result<Self> {
        let layers = match validation {
            true => vec![VALIDATION_LAYER],
            false => vec![],
        };

        validate_layers(entry, &layers)?;

        let surface_extensions = ash_window::enumerate_required_extensions(display)
            .check("ripple::ren::vk::instance::Config - failed to enumerate surface extensions")?;

        // SAFETY: ash_window hands out pointers to 'static extension name constants.
        let mut extensions: Vec<&'static CStr> = surface_extensions
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect();

        #[cfg(feature = "debug")]
        if validation {
            extensions.push(ext::debug_utils::NAME);
        }

        validate_extensions(entry, &extensions)?;

        Ok(Self { layers, extensions })
    }

    pub fn get_layers(&self) -> Vec<*const c_char> {
        self.layers.iter().map(|layer| layer.as_ptr()).collect()
    }

    pub fn get_extensions(&self) -> Vec<*const c_char> {
        self.extensions.iter().map(|extension| extension.as_ptr()).collect()
    }

    pub fn has_extension(&self, name: &CStr) -> bool {
        self.extensions.contains(&name)
    }
}

fn validate_layers(entry: &Entry, layers: &[&'static CStr]) -> Result<()> {
    let instance_layer_properties = unsafe {
        entry
            .enumerate_instance_layer_properties()
            .check("ripple::ren::vk::instance::Config - failed to enumerate instance layer properties")?
    };

    for &layer in layers {
        let supported = instance_layer_properties
            .iter()
            .any(|property| property.layer_name_as_c_str() == Ok(layer));
        if !supported {
            return Err(InstanceConfigError::LayerNotSupported(layer).into());
        }
    }
    Ok(())
}

fn validate_extensions(entry: &Entry, extensions: &[&'static CStr]) -> Result<()> {
    let instance_extension_properties = unsafe {
        entry
            .enumerate_instance_extension_properties(None)
            .check("ripple::ren::vk::instance::Config - failed to enumerate instance extension properties")?
    };

    for &extension in extensions {
        if !is_extension_available(extension, &instance_extension_properties) {
            return Err(InstanceConfigError::ExtensionNotSupported(extension).into());
        }
    }
    Ok(())
}

pub(crate) fn is_extension_available(extension: &CStr, available: &[vk::ExtensionProperties]) -> bool {
    available
        .iter()
        .any(|property| property.extension_name_as_c_str() == Ok(extension))
}
