use crate::error::{Check, Error, Result};

use ash::{Device as DeviceHandle, vk};
use gpu_allocator::{MemoryLocation, vulkan as vka};

pub struct Image {
    pub handle: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub mip_levels: u32,
    allocation: vka::Allocation,
}

impl Image {
    pub fn new(
        device_handle: &DeviceHandle,
        allocator: &mut vka::Allocator,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mipmapped: bool,
        name: &str,
    ) -> Result<Self> {
        let mip_levels = match mipmapped {
            true => mip_levels(extent.width, extent.height),
            false => 1,
        };

        let image_create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage);

        let image = unsafe {
            device_handle
                .create_image(&image_create_info, None)
                .check("ripple::ren::vk::Image - failed to create Image")?
        };
        let requirements = unsafe { device_handle.get_image_memory_requirements(image) };

        let allocation = match allocator.allocate(&vka::AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: vka::AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(source) => {
                unsafe { device_handle.destroy_image(image, None) };
                return Err(Error::Allocation { context: "ripple::ren::vk::Image - failed to allocate Image", source });
            }
        };

        unsafe {
            device_handle
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .check("ripple::ren::vk::Image - failed to bind Image Memory")?
        }

        let view_create_info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .image(image)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .base_mip_level(0)
                    .level_count(mip_levels)
                    .base_array_layer(0)
                    .layer_count(1)
                    .aspect_mask(aspect_for_format(format)),
            );

        let view = unsafe {
            device_handle
                .create_image_view(&view_create_info, None)
                .check("ripple::ren::vk::Image - failed to create Image View")?
        };

        log::debug!(
            "ripple::ren::vk::Image - created '{name}' {}x{} {format:?} ({mip_levels} mips)",
            extent.width,
            extent.height
        );

        Ok(Self { handle: image, view, extent, format, mip_levels, allocation })
    }

    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D { width: self.extent.width, height: self.extent.height }
    }

    pub fn destroy(self, device_handle: &DeviceHandle, allocator: &mut vka::Allocator) -> Result<()> {
        unsafe {
            device_handle.destroy_image_view(self.view, None);
            device_handle.destroy_image(self.handle, None);
        }
        allocator
            .free(self.allocation)
            .check("ripple::ren::vk::Image - failed to free Image allocation")
    }
}

/// `floor(log2(max(width, height))) + 1`
pub fn mip_levels(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT | vk::Format::D16_UNORM => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

pub fn get_subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect_mask)
        .base_mip_level(0)
        .level_count(vk::REMAINING_MIP_LEVELS)
        .base_array_layer(0)
        .layer_count(vk::REMAINING_ARRAY_LAYERS)
}

pub fn transition(
    device_handle: &DeviceHandle,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let aspect_mask = match new_layout {
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    };
    let image_barriers = [vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .subresource_range(get_subresource_range(aspect_mask))
        .image(image)];

    let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&image_barriers);

    unsafe { device_handle.cmd_pipeline_barrier2(command_buffer, &dependency_info) };
}

fn offset(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D { x: extent.width as i32, y: extent.height as i32, z: 1 }
}

fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(mip_level)
        .base_array_layer(0)
        .layer_count(1)
}

/// Blits `src_image` (TRANSFER_SRC_OPTIMAL) onto `dst_image` (TRANSFER_DST_OPTIMAL), scaling as needed.
pub fn copy(
    device_handle: &DeviceHandle,
    command_buffer: vk::CommandBuffer,
    src_image: vk::Image,
    dst_image: vk::Image,
    src_extent: vk::Extent2D,
    dst_extent: vk::Extent2D,
) {
    let regions = [vk::ImageBlit2::default()
        .src_offsets([vk::Offset3D::default(), offset(src_extent)])
        .dst_offsets([vk::Offset3D::default(), offset(dst_extent)])
        .src_subresource(color_layers(0))
        .dst_subresource(color_layers(0))];

    let blit_image_info = vk::BlitImageInfo2::default()
        .src_image(src_image)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(dst_image)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .filter(vk::Filter::LINEAR)
        .regions(&regions);

    unsafe { device_handle.cmd_blit_image2(command_buffer, &blit_image_info) };
}

/// Fills every mip level below 0 by successive half-size blits, leaving the whole
/// image in SHADER_READ_ONLY_OPTIMAL. Expects level 0 in TRANSFER_DST_OPTIMAL.
pub fn generate_mipmaps(
    device_handle: &DeviceHandle,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    extent: vk::Extent2D,
    mip_levels: u32,
) {
    let mut mip_extent = extent;

    for mip in 0..mip_levels {
        let half_extent = vk::Extent2D {
            width: (mip_extent.width / 2).max(1),
            height: (mip_extent.height / 2).max(1),
        };

        let barriers = [vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(mip)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image(image)];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { device_handle.cmd_pipeline_barrier2(command_buffer, &dependency_info) };

        if mip + 1 < mip_levels {
            let regions = [vk::ImageBlit2::default()
                .src_offsets([vk::Offset3D::default(), offset(mip_extent)])
                .dst_offsets([vk::Offset3D::default(), offset(half_extent)])
                .src_subresource(color_layers(mip))
                .dst_subresource(color_layers(mip + 1))];

            let blit_image_info = vk::BlitImageInfo2::default()
                .src_image(image)
                .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .dst_image(image)
                .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .filter(vk::Filter::LINEAR)
                .regions(&regions);

            unsafe { device_handle.cmd_blit_image2(command_buffer, &blit_image_info) };
            mip_extent = half_extent;
        }
    }

    transition(
        device_handle,
        command_buffer,
        image,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    );
}

pub fn create_sampler(
    device_handle: &DeviceHandle,
    filter: vk::Filter,
    mipmap_mode: vk::SamplerMipmapMode,
) -> Result<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(filter)
        .min_filter(filter)
        .mipmap_mode(mipmap_mode)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE);

    unsafe {
        device_handle
            .create_sampler(&create_info, None)
            .check("ripple::ren::vk::Image - failed to create Sampler")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_length() {
        assert_eq!(mip_levels(1, 1), 1);
        assert_eq!(mip_levels(16, 16), 5);
        assert_eq!(mip_levels(1024, 1024), 11);
        assert_eq!(mip_levels(1024, 3), 11);
        assert_eq!(mip_levels(300, 200), 9);
    }

    #[test]
    fn depth_formats_use_depth_aspect() {
        assert_eq!(aspect_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_for_format(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
    }
}
