pub mod config;

use crate::{error::{Check, Result}, info::Info, traits::Destroy};

use ash::{Entry, Instance as InstanceHandle, vk};
#[cfg(feature = "debug")]
use ash::ext::debug_utils;
use winit::raw_window_handle::RawDisplayHandle;

#[cfg(feature = "debug")]
struct InstanceDebugUtils {
    instance: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

pub struct Instance {
    pub handle: InstanceHandle,
    #[cfg(feature = "debug")]
    debug_utils: Option<InstanceDebugUtils>,
}

impl Instance {
    pub fn new(entry: &Entry, info: &Info, display: RawDisplayHandle, validation: bool) -> Result<Self> {
        let app_info = vk::ApplicationInfo::default()
            .application_name(&info.app_name)
            .application_version(info.app_version)
            .engine_name(&info.engine_name)
            .engine_version(info.engine_version)
            .api_version(vk::API_VERSION_1_3);

        let instance_config = config::InstanceConfig::new(entry, display, validation)?;
        let extensions = instance_config.get_extensions();
        let layers = instance_config.get_layers();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .check("ripple::ren::vk::Instance - failed to create Instance")?
        };
        log::info!("ripple::ren::vk::Instance - created (validation: {validation})");

        #[cfg(feature = "debug")]
        {
            let debug_utils = match instance_config.has_extension(debug_utils::NAME) {
                true => Some(create_debug_utils(entry, &instance)?),
                false => None,
            };
            Ok(Self { handle: instance, debug_utils })
        }
        #[cfg(not(feature = "debug"))]
        {
            Ok(Self { handle: instance })
        }
    }
}

#[cfg(feature = "debug")]
fn create_debug_utils(entry: &Entry, instance: &InstanceHandle) -> Result<InstanceDebugUtils> {
    let messenger_create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(pfn_user_callback));

    let debug_utils_instance = debug_utils::Instance::new(entry, instance);
    let messenger = unsafe {
        debug_utils_instance
            .create_debug_utils_messenger(&messenger_create_info, None)
            .check("ripple::ren::vk::Instance - failed to create debug utils messenger")?
    };

    Ok(InstanceDebugUtils { instance: debug_utils_instance, messenger })
}

#[cfg(feature = "debug")]
unsafe extern "system" fn pfn_user_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    use std::{borrow::Cow, ffi::CStr};

    let callback_data = unsafe { *p_callback_data };
    let message_id_number = callback_data.message_id_number;

    let message_id_name = if callback_data.p_message_id_name.is_null() {
        Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy() }
    };

    let message = if callback_data.p_message.is_null() {
        Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let level = match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::Level::Debug,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        _ => log::Level::Error,
    };
    log::log!(level, "{message_type:?} [{message_id_name} ({message_id_number})] : {message}");

    vk::FALSE
}

impl Destroy for Instance {
    fn destroy(&mut self) {
        #[cfg(feature = "debug")]
        if let Some(debug_utils) = self.debug_utils.take() {
            unsafe { debug_utils.instance.destroy_debug_utils_messenger(debug_utils.messenger, None) };
        }
        unsafe { self.handle.destroy_instance(None) };
    }
}
