use super::{
    buffer::TransientBuffer,
    descriptor::{DescriptorAllocatorGrowable, DescriptorSetPoolSizeRatio},
    device::{Device, config::QueueFamilyType},
};
use crate::error::{Check, Result};

use ash::{Device as DeviceHandle, vk};

const FRAME_POOL_RATIOS: [DescriptorSetPoolSizeRatio; 4] = [
    DescriptorSetPoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
    DescriptorSetPoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0),
    DescriptorSetPoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
    DescriptorSetPoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
];

/// One slot of the frame ring: recording target, sync primitives and per-frame storage.
pub struct Frame {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,

    pub swapchain_semaphore: vk::Semaphore,
    pub render_semaphore: vk::Semaphore,
    pub render_fence: vk::Fence,

    pub descriptors: DescriptorAllocatorGrowable,
    pub scene_data_buffer: Option<TransientBuffer>,
}

impl Frame {
    pub fn new(device: &Device) -> Result<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.get_family_index(QueueFamilyType::Graphics));

        let command_pool = unsafe {
            device
                .handle
                .create_command_pool(&pool_create_info, None)
                .check("ripple::ren::vk::Frame - failed to create Command Pool")?
        };

        let buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);

        let command_buffer = unsafe {
            device
                .handle
                .allocate_command_buffers(&buffer_allocate_info)
                .check("ripple::ren::vk::Frame - failed to allocate Command Buffer")?[0]
        };

        Ok(Self {
            command_pool,
            command_buffer,
            swapchain_semaphore: create_semaphore(&device.handle)?,
            render_semaphore: create_semaphore(&device.handle)?,
            // signaled so the first wait on a fresh slot returns immediately
            render_fence: create_fence(&device.handle, vk::FenceCreateFlags::SIGNALED)?,
            descriptors: DescriptorAllocatorGrowable::new(&device.handle, 1000, &FRAME_POOL_RATIOS)?,
            scene_data_buffer: None,
        })
    }

    pub fn generator(device: &Device, buffering: u32) -> Result<Vec<Frame>> {
        (0..buffering).map(|_| Frame::new(device)).collect()
    }

    /// The caller releases `scene_data_buffer` through the allocator first.
    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        self.descriptors.destroy(device_handle);
        unsafe {
            device_handle.destroy_command_pool(self.command_pool, None);
            device_handle.destroy_fence(self.render_fence, None);
            device_handle.destroy_semaphore(self.render_semaphore, None);
            device_handle.destroy_semaphore(self.swapchain_semaphore, None);
        }
    }
}

pub fn create_semaphore(device_handle: &DeviceHandle) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    unsafe {
        device_handle
            .create_semaphore(&create_info, None)
            .check("ripple::ren::vk::Frame - failed to create Semaphore")
    }
}

pub fn create_fence(device_handle: &DeviceHandle, flags: vk::FenceCreateFlags) -> Result<vk::Fence> {
    let create_info = vk::FenceCreateInfo::default().flags(flags);
    unsafe {
        device_handle
            .create_fence(&create_info, None)
            .check("ripple::ren::vk::Frame - failed to create Fence")
    }
}

pub fn get_submit_info<'a>(
    command_buffer_infos: &'a [vk::CommandBufferSubmitInfo<'a>],
    wait_semaphore_infos: Option<&'a [vk::SemaphoreSubmitInfo<'a>]>,
    signal_semaphore_infos: Option<&'a [vk::SemaphoreSubmitInfo<'a>]>,
) -> vk::SubmitInfo2<'a> {
    let mut submit_info = vk::SubmitInfo2::default().command_buffer_infos(command_buffer_infos);

    if let Some(wait_semaphore_infos) = wait_semaphore_infos {
        submit_info = submit_info.wait_semaphore_infos(wait_semaphore_infos);
    };
    if let Some(signal_semaphore_infos) = signal_semaphore_infos {
        submit_info = submit_info.signal_semaphore_infos(signal_semaphore_infos);
    };

    submit_info
}
