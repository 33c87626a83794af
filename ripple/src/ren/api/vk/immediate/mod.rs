use super::{
    device::{Device, config::QueueFamilyType},
    frame::{create_fence, get_submit_info},
};
use crate::error::{Check, Result};

use ash::{Device as DeviceHandle, vk};

// Large but finite; a hung upload surfaces as Error::Timeout instead of blocking forever.
const IMMEDIATE_TIMEOUT_NS: u64 = 9_999_999_999;

/// Synchronous one-shot submissions (uploads) that run outside the frame ring.
pub struct ImmediateManager {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    queue: vk::Queue,
}

impl ImmediateManager {
    pub fn new(device: &Device) -> Result<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.get_family_index(QueueFamilyType::Graphics));

        let command_pool = unsafe {
            device
                .handle
                .create_command_pool(&pool_create_info, None)
                .check("ripple::ren::vk::Immediate - failed to create Command Pool")?
        };

        let buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);

        let command_buffer = unsafe {
            device
                .handle
                .allocate_command_buffers(&buffer_allocate_info)
                .check("ripple::ren::vk::Immediate - failed to allocate Command Buffer")?[0]
        };

        Ok(Self {
            command_pool,
            command_buffer,
            fence: create_fence(&device.handle, vk::FenceCreateFlags::SIGNALED)?,
            queue: device.get_queue(QueueFamilyType::Graphics),
        })
    }

    /// Records `work`, submits it and blocks until the GPU has finished executing it.
    pub fn submit<F>(&self, device_handle: &DeviceHandle, work: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let fences = [self.fence];
        let command_buffer = self.command_buffer;

        unsafe {
            device_handle
                .reset_fences(&fences)
                .check("ripple::ren::vk::Immediate - failed to reset Fence")?;
            device_handle
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .check("ripple::ren::vk::Immediate - failed to reset Command Buffer")?;

            let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device_handle
                .begin_command_buffer(command_buffer, &begin_info)
                .check("ripple::ren::vk::Immediate - failed to begin Command Buffer")?;
        }

        work(command_buffer);

        unsafe {
            device_handle
                .end_command_buffer(command_buffer)
                .check("ripple::ren::vk::Immediate - failed to end Command Buffer")?;

            let command_buffer_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(command_buffer)];
            let submit_info = [get_submit_info(&command_buffer_infos, None, None)];
            device_handle
                .queue_submit2(self.queue, &submit_info, self.fence)
                .check("ripple::ren::vk::Immediate - failed to submit Command Buffer")?;

            device_handle
                .wait_for_fences(&fences, true, IMMEDIATE_TIMEOUT_NS)
                .check("ripple::ren::vk::Immediate - failed to wait for Fence")
        }
    }

    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        unsafe {
            device_handle.destroy_command_pool(self.command_pool, None);
            device_handle.destroy_fence(self.fence, None);
        }
    }
}
