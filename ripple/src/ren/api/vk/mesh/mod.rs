use super::{
    immediate::ImmediateManager,
    resource_allocator::{BufferHandle, ResourceAllocator},
};
use crate::error::Result;

use ash::{Device as DeviceHandle, vk};
use gpu_allocator::MemoryLocation;
use ripple_gpu::{INDEX_SIZE, VERTEX_SIZE, Vertex};

/// Device-local geometry of one mesh; vertices are fetched through the buffer device address.
#[derive(Clone, Copy, Debug)]
pub struct GpuMeshBuffers {
    pub index_buffer: BufferHandle,
    pub vertex_buffer: BufferHandle,
    pub vertex_buffer_address: vk::DeviceAddress,
}

impl GpuMeshBuffers {
    pub fn destroy(self, device_handle: &DeviceHandle, allocator: &mut ResourceAllocator) -> Result<()> {
        allocator.destroy_buffer(device_handle, self.index_buffer)?;
        allocator.destroy_buffer(device_handle, self.vertex_buffer)
    }
}

/// Vertices first, indices packed right after them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagingLayout {
    pub vertex_size: vk::DeviceSize,
    pub index_offset: vk::DeviceSize,
    pub index_size: vk::DeviceSize,
}

impl StagingLayout {
    pub fn new(vertex_count: usize, index_count: usize) -> Self {
        let vertex_size = vertex_count as u64 * VERTEX_SIZE;
        Self {
            vertex_size,
            index_offset: vertex_size.next_multiple_of(INDEX_SIZE),
            index_size: index_count as u64 * INDEX_SIZE,
        }
    }

    pub fn total(&self) -> vk::DeviceSize {
        self.index_offset + self.index_size
    }
}

pub fn upload_mesh(
    device_handle: &DeviceHandle,
    allocator: &mut ResourceAllocator,
    immediate: &ImmediateManager,
    indices: &[u32],
    vertices: &[Vertex],
) -> Result<GpuMeshBuffers> {
    let layout = StagingLayout::new(vertices.len(), indices.len());

    let vertex_buffer = allocator.create_buffer(
        device_handle,
        layout.vertex_size,
        vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryLocation::GpuOnly,
        "mesh_vertices",
    )?;
    let vertex_buffer_address = allocator.device_address(device_handle, vertex_buffer);

    let index_buffer = allocator.create_buffer(
        device_handle,
        layout.index_size,
        vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::GpuOnly,
        "mesh_indices",
    )?;

    let mut staging = allocator.create_transient(
        device_handle,
        layout.total(),
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        "mesh_staging",
    )?;
    staging.upload(vertices, 0)?;
    staging.upload(indices, layout.index_offset as usize)?;

    immediate.submit(device_handle, |command_buffer| unsafe {
        if layout.vertex_size > 0 {
            device_handle.cmd_copy_buffer(
                command_buffer,
                staging.handle(),
                vertex_buffer.raw,
                &[vk::BufferCopy::default().src_offset(0).dst_offset(0).size(layout.vertex_size)],
            );
        }
        if layout.index_size > 0 {
            device_handle.cmd_copy_buffer(
                command_buffer,
                staging.handle(),
                index_buffer.raw,
                &[vk::BufferCopy::default()
                    .src_offset(layout.index_offset)
                    .dst_offset(0)
                    .size(layout.index_size)],
            );
        }
    })?;

    allocator.destroy_transient(device_handle, staging)?;

    #[cfg(feature = "debug")]
    verify_indices(device_handle, allocator, immediate, index_buffer, indices)?;

    Ok(GpuMeshBuffers { index_buffer, vertex_buffer, vertex_buffer_address })
}

/// Reads the index buffer back and compares it with what was staged.
#[cfg(feature = "debug")]
fn verify_indices(
    device_handle: &DeviceHandle,
    allocator: &mut ResourceAllocator,
    immediate: &ImmediateManager,
    index_buffer: BufferHandle,
    indices: &[u32],
) -> Result<()> {
    if indices.is_empty() {
        return Ok(());
    }
    let bytes = allocator.read_buffer(device_handle, immediate, index_buffer)?;
    if bytes.as_slice() != bytemuck::cast_slice::<u32, u8>(indices) {
        log::warn!("ripple::ren::vk::mesh - index buffer {:?} does not match the uploaded indices", index_buffer.raw);
    }
    Ok(())
}
