use crate::ren::api::vk::{device::config::DeviceConfigError, instance::config::InstanceConfigError, swapchain::SwapchainError};

use ash::{prelude::VkResult, vk};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("{context} ({result})")]
    Vulkan {
        context: &'static str,
        result: vk::Result,
    },
    #[error("{context}: {source}")]
    Allocation {
        context: &'static str,
        #[source]
        source: gpu_allocator::AllocationError,
    },
    #[error("{context}: {error:?}")]
    Upload {
        context: &'static str,
        error: presser::CopyError,
    },
    #[error("image data holds {actual} bytes, {expected} needed")]
    ImageData { expected: u64, actual: usize },
    #[error("{0} - timed out waiting for the GPU")]
    Timeout(&'static str),
    #[error("no physical device satisfies the renderer requirements")]
    NoSuitableDevice,
    #[error("unsupported instance configuration: {0}")]
    InstanceConfig(#[from] InstanceConfigError),
    #[error("unsupported device configuration: {0}")]
    DeviceConfig(#[from] DeviceConfigError),
    #[error("unsupported surface: {0}")]
    Swapchain(#[from] SwapchainError),
    #[error("failed to load shader '{}': {source}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load glTF '{}': {source}", path.display())]
    Gltf {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },
    #[error("window handle unavailable: {0}")]
    Window(#[from] winit::raw_window_handle::HandleError),
    #[error("failed to create window: {0}")]
    Os(#[from] winit::error::OsError),
    #[error(transparent)]
    EventLoop(#[from] winit::error::EventLoopError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attaches a static context to the result of a Vulkan or allocator call.
pub trait Check<T> {
    fn check(self, context: &'static str) -> Result<T>;
}

impl<T> Check<T> for VkResult<T> {
    fn check(self, context: &'static str) -> Result<T> {
        self.map_err(|result| match result {
            vk::Result::TIMEOUT => Error::Timeout(context),
            result => Error::Vulkan { context, result },
        })
    }
}

impl<T> Check<T> for gpu_allocator::Result<T> {
    fn check(self, context: &'static str) -> Result<T> {
        self.map_err(|source| Error::Allocation { context, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_reported_separately() {
        let result: VkResult<()> = Err(vk::Result::TIMEOUT);
        assert!(matches!(result.check("frame fence"), Err(Error::Timeout("frame fence"))));

        let result: VkResult<()> = Err(vk::Result::ERROR_DEVICE_LOST);
        match result.check("queue submit") {
            Err(Error::Vulkan { context, result }) => {
                assert_eq!(context, "queue submit");
                assert_eq!(result, vk::Result::ERROR_DEVICE_LOST);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn configuration_errors_keep_their_source() {
        use std::error::Error as _;

        let error = Error::from(SwapchainError::NoPresentModes);
        assert_eq!(error.to_string(), "unsupported surface: surface reports no present modes");
        assert!(error.source().is_some());

        let error = Error::from(DeviceConfigError::ExtensionNotSupported(c"VK_KHR_swapchain"));
        assert!(error.to_string().contains("VK_KHR_swapchain"));
        assert!(matches!(error, Error::DeviceConfig(_)));

        let error = Error::from(InstanceConfigError::LayerNotSupported(c"VK_LAYER_KHRONOS_validation"));
        assert!(error.source().is_some());
    }
}
