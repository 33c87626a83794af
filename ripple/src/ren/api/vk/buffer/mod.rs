use crate::error::{Check, Error, Result};

use ash::{Device as DeviceHandle, vk};
use gpu_allocator::{MemoryLocation, vulkan as vka};

/// A buffer together with the allocation backing it.
pub struct Buffer {
    pub handle: vk::Buffer,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    allocation: vka::Allocation,
}

impl Buffer {
    pub fn new(
        device_handle: &DeviceHandle,
        allocator: &mut vka::Allocator,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        name: &str,
        location: MemoryLocation,
    ) -> Result<Self> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size.max(1))
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device_handle
                .create_buffer(&create_info, None)
                .check("ripple::ren::vk::buffer - failed to Create Buffer")?
        };

        let requirements = unsafe { device_handle.get_buffer_memory_requirements(buffer) };
        let allocation = match allocator.allocate(&vka::AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: vka::AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(source) => {
                unsafe { device_handle.destroy_buffer(buffer, None) };
                return Err(Error::Allocation { context: "ripple::ren::vk::buffer - failed to Allocate Buffer", source });
            }
        };

        unsafe {
            device_handle
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .check("ripple::ren::vk::buffer - failed to Bind Buffer")?
        }

        log::debug!("ripple::ren::vk::buffer - created '{name}' ({size} bytes, {location:?})");

        Ok(Self {
            handle: buffer,
            size,
            usage,
            location,
            allocation,
        })
    }

    /// Copies `src` into the persistently mapped allocation at `start_offset`.
    pub fn upload<T: Copy>(&mut self, src: &[T], start_offset: usize) -> Result<presser::CopyRecord> {
        presser::copy_from_slice_to_offset(src, &mut self.allocation, start_offset)
            .map_err(|error| Error::Upload { context: "ripple::ren::vk::buffer - failed to Upload to Buffer", error })
    }

    pub fn mapped_bytes(&self) -> Option<&[u8]> {
        self.allocation.mapped_slice().map(|bytes| &bytes[..self.size as usize])
    }

    pub fn device_address(&self, device_handle: &DeviceHandle) -> vk::DeviceAddress {
        unsafe {
            device_handle.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(self.handle))
        }
    }

    pub fn destroy(self, device_handle: &DeviceHandle, allocator: &mut vka::Allocator) -> Result<()> {
        unsafe { device_handle.destroy_buffer(self.handle, None) };
        allocator
            .free(self.allocation)
            .check("ripple::ren::vk::buffer - failed to Free Buffer allocation")
    }
}

/// A short-lived, host-visible buffer that is never tracked by the registry.
/// The creator destroys it explicitly once the GPU is done with it.
pub struct TransientBuffer(Buffer);

impl TransientBuffer {
    pub(crate) fn new(buffer: Buffer) -> Self {
        Self(buffer)
    }

    pub fn handle(&self) -> vk::Buffer {
        self.0.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.0.size
    }

    pub fn upload<T: Copy>(&mut self, src: &[T], start_offset: usize) -> Result<presser::CopyRecord> {
        self.0.upload(src, start_offset)
    }

    pub fn mapped_bytes(&self) -> Option<&[u8]> {
        self.0.mapped_bytes()
    }

    pub(crate) fn into_inner(self) -> Buffer {
        self.0
    }
}
