use super::{
    buffer::{Buffer, TransientBuffer},
    image::{self, Image},
    immediate::ImmediateManager,
};
use crate::error::{Check, Error, Result};

use ash::{Device as DeviceHandle, Instance as InstanceHandle, vk};
use gpu_allocator::{MemoryLocation, vulkan as vka};
use std::collections::HashMap;

/// Copyable reference to a buffer owned by the [`ResourceAllocator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferHandle {
    pub(crate) key: u32,
    pub raw: vk::Buffer,
    pub size: vk::DeviceSize,
}

/// Copyable reference to an image owned by the [`ResourceAllocator`].
#[derive(Clone, Copy, Debug)]
pub struct ImageHandle {
    pub(crate) key: u32,
    pub raw: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub mip_levels: u32,
}

impl ImageHandle {
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D { width: self.extent.width, height: self.extent.height }
    }
}

impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

/// Owns every tracked buffer and image allocation until it is explicitly destroyed.
pub struct ResourceAllocator {
    pub handle: vka::Allocator,
    buffers: HashMap<u32, Buffer>,
    images: HashMap<u32, Image>,
    next_key: u32,
}

impl ResourceAllocator {
    pub fn new(instance: InstanceHandle, device: DeviceHandle, physical_device: vk::PhysicalDevice) -> Result<Self> {
        let handle = vka::Allocator::new(&vka::AllocatorCreateDesc {
            instance,
            device,
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })
        .check("ripple::ren::vk::allocator - failed to create Allocator")?;

        Ok(Self { handle, buffers: HashMap::new(), images: HashMap::new(), next_key: 0 })
    }

    fn next_key(&mut self) -> u32 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    pub fn create_buffer(
        &mut self,
        device_handle: &DeviceHandle,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<BufferHandle> {
        let buffer = Buffer::new(device_handle, &mut self.handle, size, usage, name, location)?;
        let key = self.next_key();
        let handle = BufferHandle { key, raw: buffer.handle, size };
        self.buffers.insert(key, buffer);
        Ok(handle)
    }

    pub fn create_image(
        &mut self,
        device_handle: &DeviceHandle,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mipmapped: bool,
        name: &str,
    ) -> Result<ImageHandle> {
        let image = Image::new(device_handle, &mut self.handle, extent, format, usage, mipmapped, name)?;
        let key = self.next_key();
        let handle = ImageHandle {
            key,
            raw: image.handle,
            view: image.view,
            extent: image.extent,
            format: image.format,
            mip_levels: image.mip_levels,
        };
        self.images.insert(key, image);
        Ok(handle)
    }

    /// Creates an untracked, host-visible buffer.
    pub fn create_transient(
        &mut self,
        device_handle: &DeviceHandle,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<TransientBuffer> {
        debug_assert!(location != MemoryLocation::GpuOnly, "transient buffers must be host visible");
        Buffer::new(device_handle, &mut self.handle, size, usage, name, location).map(TransientBuffer::new)
    }

    pub fn destroy_transient(&mut self, device_handle: &DeviceHandle, buffer: TransientBuffer) -> Result<()> {
        buffer.into_inner().destroy(device_handle, &mut self.handle)
    }

    /// Releasing an unknown or already released handle is a no-op.
    pub fn destroy_buffer(&mut self, device_handle: &DeviceHandle, handle: BufferHandle) -> Result<()> {
        match self.buffers.remove(&handle.key) {
            Some(buffer) => buffer.destroy(device_handle, &mut self.handle),
            None => Ok(()),
        }
    }

    pub fn destroy_image(&mut self, device_handle: &DeviceHandle, handle: ImageHandle) -> Result<()> {
        match self.images.remove(&handle.key) {
            Some(image) => image.destroy(device_handle, &mut self.handle),
            None => Ok(()),
        }
    }

    pub fn buffer_mut(&mut self, handle: BufferHandle) -> Option<&mut Buffer> {
        self.buffers.get_mut(&handle.key)
    }

    pub fn device_address(&self, device_handle: &DeviceHandle, handle: BufferHandle) -> vk::DeviceAddress {
        self.buffers
            .get(&handle.key)
            .map(|buffer| buffer.device_address(device_handle))
            .unwrap_or_default()
    }

    pub fn tracked_count(&self) -> (usize, usize) {
        (self.buffers.len(), self.images.len())
    }

    /// Uploads `pixels` (tightly packed, 4 bytes per texel) into a new device-local image.
    #[allow(clippy::too_many_arguments)]
    pub fn create_image_on_gpu(
        &mut self,
        device_handle: &DeviceHandle,
        immediate: &ImmediateManager,
        pixels: &[u8],
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mipmapped: bool,
    ) -> Result<ImageHandle> {
        let texels = image_texels(pixels, extent)?;
        let mut staging = self.create_transient(
            device_handle,
            texels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "image_staging",
        )?;
        staging.upload(texels, 0)?;

        let image = self.create_image(
            device_handle,
            extent,
            format,
            usage | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
            mipmapped,
            "uploaded_image",
        )?;

        immediate.submit(device_handle, |command_buffer| {
            image::transition(
                device_handle,
                command_buffer,
                image.raw,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );

            let copy_region = vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_extent(extent);

            unsafe {
                device_handle.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.handle(),
                    image.raw,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[copy_region],
                )
            };

            match mipmapped {
                true => image::generate_mipmaps(
                    device_handle,
                    command_buffer,
                    image.raw,
                    image.extent_2d(),
                    image.mip_levels,
                ),
                false => image::transition(
                    device_handle,
                    command_buffer,
                    image.raw,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                ),
            }
        })?;

        self.destroy_transient(device_handle, staging)?;
        Ok(image)
    }

    /// Copies a tracked buffer back to the host through a GPU-to-CPU staging buffer.
    pub fn read_buffer(
        &mut self,
        device_handle: &DeviceHandle,
        immediate: &ImmediateManager,
        handle: BufferHandle,
    ) -> Result<Vec<u8>> {
        let readback = self.create_transient(
            device_handle,
            handle.size,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "readback",
        )?;

        immediate.submit(device_handle, |command_buffer| unsafe {
            device_handle.cmd_copy_buffer(
                command_buffer,
                handle.raw,
                readback.handle(),
                &[vk::BufferCopy::default().size(handle.size)],
            );
        })?;

        let bytes = readback.mapped_bytes().map(<[u8]>::to_vec).unwrap_or_default();
        self.destroy_transient(device_handle, readback)?;
        Ok(bytes)
    }

    /// Releases every tracked allocation. Anything still alive afterwards is a leak.
    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        let (buffers, images) = self.tracked_count();
        log::info!("ripple::ren::vk::allocator - releasing {buffers} buffers and {images} images");

        for (_, image) in self.images.drain() {
            if let Err(e) = image.destroy(device_handle, &mut self.handle) {
                log::error!("{e}");
            }
        }
        for (_, buffer) in self.buffers.drain() {
            if let Err(e) = buffer.destroy(device_handle, &mut self.handle) {
                log::error!("{e}");
            }
        }

        #[cfg(feature = "debug")]
        self.handle.report_memory_leaks(log::Level::Warn);
    }
}

/// Byte size of a tightly packed RGBA8 upload.
pub fn staging_image_size(extent: vk::Extent3D) -> vk::DeviceSize {
    extent.width as u64 * extent.height as u64 * extent.depth.max(1) as u64 * 4
}

/// The leading `extent` worth of texels; short input is an error rather than a partial upload.
pub fn image_texels(pixels: &[u8], extent: vk::Extent3D) -> Result<&[u8]> {
    let expected = staging_image_size(extent);
    match pixels.get(..expected as usize) {
        Some(texels) => Ok(texels),
        None => Err(Error::ImageData { expected, actual: pixels.len() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_pixel_data_is_rejected() {
        let extent = vk::Extent3D { width: 2, height: 2, depth: 1 };
        let pixels = [7u8; 20];
        assert_eq!(image_texels(&pixels, extent).map(<[u8]>::len).ok(), Some(16));
        assert!(matches!(
            image_texels(&pixels[..12], extent),
            Err(Error::ImageData { expected: 16, actual: 12 })
        ));
    }

    #[test]
    fn staging_size_is_four_bytes_per_texel() {
        assert_eq!(staging_image_size(vk::Extent3D { width: 16, height: 16, depth: 1 }), 1024);
        assert_eq!(staging_image_size(vk::Extent3D { width: 1, height: 1, depth: 0 }), 4);
    }
}
