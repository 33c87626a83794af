use super::{device::Device, instance::Instance, surface::Surface};
use crate::{
    error::{Check, Result},
    ren::{
        frame::{Acquire, Presented},
        settings::Resolution,
    },
};

use ash::{Device as DeviceHandle, khr, vk};
use std::cmp;

const ACQUIRE_TIMEOUT_NS: u64 = 1_000_000_000;

pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[derive(Debug, thiserror::Error)]
pub enum SwapchainError {
    #[error("surface reports no formats")]
    NoSurfaceFormats,
    #[error("surface reports no present modes")]
    NoPresentModes,
}

pub struct Swapchain {
    pub device: khr::swapchain::Device,
    pub khr: vk::SwapchainKHR,
    pub format: vk::Format,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    vsync: bool,
}

impl Swapchain {
    pub fn new(
        instance: &Instance,
        device: &Device,
        surface: &Surface,
        resolution: Resolution,
        vsync: bool,
    ) -> Result<Self> {
        let swapchain_device = khr::swapchain::Device::new(&instance.handle, &device.handle);
        Self::create(swapchain_device, device, surface, resolution, vsync)
    }

    fn create(
        swapchain_device: khr::swapchain::Device,
        device: &Device,
        surface: &Surface,
        resolution: Resolution,
        vsync: bool,
    ) -> Result<Self> {
        let surface_support = query_surface_support(device.physical_device, surface)?;

        let surface_format = select_surface_format(
            &surface_support,
            vk::Format::B8G8R8A8_UNORM,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        );
        let present_mode = select_present_mode(&surface_support, vsync);
        let swapchain_extent = select_swapchain_extent(&surface_support, resolution);
        let min_image_count = select_swapchain_min_image_count(&surface_support);
        let (image_sharing_mode, queue_family_indices) = get_queue_family_config(device);

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.khr)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(swapchain_extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(image_sharing_mode)
            .pre_transform(surface_support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        if !queue_family_indices.is_empty() {
            create_info = create_info.queue_family_indices(&queue_family_indices)
        };

        let khr = unsafe {
            swapchain_device
                .create_swapchain(&create_info, None)
                .check("ripple::ren::vk::swapchain - failed to create Swapchain")?
        };
        let images = unsafe {
            swapchain_device
                .get_swapchain_images(khr)
                .check("ripple::ren::vk::swapchain - failed to get swapchain Images")?
        };
        let image_views = images
            .iter()
            .map(|&swapchain_image| {
                let create_info = vk::ImageViewCreateInfo::default()
                    .image(swapchain_image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .level_count(1)
                            .layer_count(1),
                    );

                unsafe {
                    device
                        .handle
                        .create_image_view(&create_info, None)
                        .check("ripple::ren::vk::swapchain - failed to create swapchain Image View")
                }
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "ripple::ren::vk::swapchain - created {}x{} ({} images, {present_mode:?})",
            swapchain_extent.width,
            swapchain_extent.height,
            images.len()
        );

        Ok(Self {
            device: swapchain_device,
            khr,
            format: surface_format.format,
            images,
            image_views,
            extent: swapchain_extent,
            vsync,
        })
    }

    pub fn acquire_next(&self, semaphore: vk::Semaphore) -> Result<Acquire> {
        let result = unsafe {
            self.device
                .acquire_next_image(self.khr, ACQUIRE_TIMEOUT_NS, semaphore, vk::Fence::null())
        };
        match result {
            Ok((index, false)) => Ok(Acquire::Image(index)),
            Ok((index, true)) => Ok(Acquire::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::Stale),
            Err(e) => Err(e).check("ripple::ren::vk::swapchain - failed to acquire next Swapchain Image"),
        }
    }

    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> Result<Presented> {
        let swapchains = [self.khr];
        let wait_semaphores = [wait];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices);

        match unsafe { self.device.queue_present(queue, &present_info) } {
            Ok(false) => Ok(Presented::Ok),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::Stale),
            Err(e) => Err(e).check("ripple::ren::vk::swapchain - failed to Present swapchain Image"),
        }
    }

    /// Rebuilds the chain at the new size. The caller guarantees no frame is mid-recording.
    pub fn resize(&mut self, device: &Device, surface: &Surface, resolution: Resolution) -> Result<()> {
        device.wait_idle()?;
        self.destroy(&device.handle);
        *self = Self::create(self.device.clone(), device, surface, resolution, self.vsync)?;
        Ok(())
    }

    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        unsafe {
            self.image_views
                .drain(..)
                .for_each(|image_view| device_handle.destroy_image_view(image_view, None));
            // the swapchain owns its images
            self.images.clear();
            self.device.destroy_swapchain(self.khr, None);
        };
        self.khr = vk::SwapchainKHR::null();
    }
}

fn query_surface_support(physical_device: vk::PhysicalDevice, surface: &Surface) -> Result<SurfaceSupport> {
    let capabilities = unsafe {
        surface
            .instance
            .get_physical_device_surface_capabilities(physical_device, surface.khr)
            .check("ripple::ren::vk::swapchain - failed to query surface capabilities")?
    };

    let formats = unsafe {
        surface
            .instance
            .get_physical_device_surface_formats(physical_device, surface.khr)
            .check("ripple::ren::vk::swapchain - failed to query surface formats")?
    };
    if formats.is_empty() {
        return Err(SwapchainError::NoSurfaceFormats.into());
    }

    let present_modes = unsafe {
        surface
            .instance
            .get_physical_device_surface_present_modes(physical_device, surface.khr)
            .check("ripple::ren::vk::swapchain - failed to query surface present modes")?
    };
    if present_modes.is_empty() {
        return Err(SwapchainError::NoPresentModes.into());
    }

    Ok(SurfaceSupport { capabilities, formats, present_modes })
}

fn select_surface_format(
    surface_support: &SurfaceSupport,
    desired_format: vk::Format,
    desired_color_space: vk::ColorSpaceKHR,
) -> vk::SurfaceFormatKHR {
    surface_support
        .formats
        .iter()
        .find(|format| format.format == desired_format && format.color_space == desired_color_space)
        .or(surface_support.formats.first())
        .copied()
        .unwrap_or_default()
}

// FIFO is the only mode every implementation must support.
fn select_present_mode(surface_support: &SurfaceSupport, vsync: bool) -> vk::PresentModeKHR {
    let desired_present_mode = match vsync {
        true => vk::PresentModeKHR::FIFO,
        false => vk::PresentModeKHR::MAILBOX,
    };
    match surface_support.present_modes.contains(&desired_present_mode) {
        true => desired_present_mode,
        false => vk::PresentModeKHR::FIFO,
    }
}

fn select_swapchain_extent(surface_support: &SurfaceSupport, resolution: Resolution) -> vk::Extent2D {
    let vk::SurfaceCapabilitiesKHR { current_extent, min_image_extent, max_image_extent, .. } =
        surface_support.capabilities;

    if current_extent.width != u32::MAX {
        return current_extent;
    }

    vk::Extent2D::default()
        .width(resolution.width.clamp(min_image_extent.width, max_image_extent.width))
        .height(resolution.height.clamp(min_image_extent.height, max_image_extent.height))
}

fn select_swapchain_min_image_count(surface_support: &SurfaceSupport) -> u32 {
    let vk::SurfaceCapabilitiesKHR { min_image_count, max_image_count, .. } = surface_support.capabilities;
    let upper_bound = match max_image_count {
        0 => u32::MAX,
        max => max,
    };
    cmp::min(upper_bound, min_image_count + 1)
}

fn get_queue_family_config(device: &Device) -> (vk::SharingMode, Vec<u32>) {
    match device.queue_families.is_shared() {
        true => (vk::SharingMode::EXCLUSIVE, vec![]),
        false => (vk::SharingMode::CONCURRENT, device.queue_families.get_unique_indices()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support(current_extent: vk::Extent2D, min_image_count: u32, max_image_count: u32) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default()
                .current_extent(current_extent)
                .min_image_extent(vk::Extent2D { width: 1, height: 1 })
                .max_image_extent(vk::Extent2D { width: 4096, height: 2048 })
                .min_image_count(min_image_count)
                .max_image_count(max_image_count),
            formats: vec![
                vk::SurfaceFormatKHR::default()
                    .format(vk::Format::R8G8B8A8_SRGB)
                    .color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR),
                vk::SurfaceFormatKHR::default()
                    .format(vk::Format::B8G8R8A8_UNORM)
                    .color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE],
        }
    }

    const UNDEFINED_EXTENT: vk::Extent2D = vk::Extent2D { width: u32::MAX, height: u32::MAX };

    #[test]
    fn prefers_requested_surface_format() {
        let support = support(UNDEFINED_EXTENT, 2, 0);
        let format = select_surface_format(&support, vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(format.format, vk::Format::B8G8R8A8_UNORM);

        let format = select_surface_format(&support, vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(format.format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn mailbox_falls_back_to_fifo() {
        let support = support(UNDEFINED_EXTENT, 2, 0);
        assert_eq!(select_present_mode(&support, false), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&support, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_follows_surface_when_defined() {
        let defined = vk::Extent2D { width: 800, height: 600 };
        let support = support(defined, 2, 0);
        assert_eq!(select_swapchain_extent(&support, Resolution::new(1700, 900)), defined);
    }

    #[test]
    fn extent_clamps_window_size_otherwise() {
        let support = support(UNDEFINED_EXTENT, 2, 0);
        let extent = select_swapchain_extent(&support, Resolution::new(5000, 900));
        assert_eq!((extent.width, extent.height), (4096, 900));
    }

    #[test]
    fn image_count_respects_maximum() {
        assert_eq!(select_swapchain_min_image_count(&support(UNDEFINED_EXTENT, 2, 0)), 3);
        assert_eq!(select_swapchain_min_image_count(&support(UNDEFINED_EXTENT, 2, 2)), 2);
    }
}
