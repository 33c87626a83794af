use super::{
    image,
    immediate::ImmediateManager,
    mesh::{self, GpuMeshBuffers},
    resource_allocator::{ImageHandle, ResourceAllocator},
};
use crate::error::Result;

use ash::{Device as DeviceHandle, vk};
use glam::{Vec2, Vec3, Vec4};
use ripple_gpu::Vertex;

pub const CHECKERBOARD_SIZE: u32 = 16;

const MAGENTA: Vec4 = Vec4::new(1.0, 0.0, 1.0, 1.0);
const BLACK: Vec4 = Vec4::new(0.0, 0.0, 0.0, 0.0);

/// Packs a normalized color into RGBA8 with red in the lowest byte.
pub fn pack_unorm4x8(color: Vec4) -> u32 {
    let [r, g, b, a] = color.clamp(Vec4::ZERO, Vec4::ONE).to_array().map(|c| (c * 255.0).round() as u32);
    r | (g << 8) | (b << 16) | (a << 24)
}

pub fn checkerboard_pixels() -> Vec<u32> {
    let magenta = pack_unorm4x8(MAGENTA);
    let black = pack_unorm4x8(BLACK);
    (0..CHECKERBOARD_SIZE)
        .flat_map(|y| (0..CHECKERBOARD_SIZE).map(move |x| if (x % 2) ^ (y % 2) == 1 { magenta } else { black }))
        .collect()
}

pub fn rectangle() -> ([u32; 6], [Vertex; 4]) {
    let vertex = |x: f32, y: f32, uv: Vec2, color: Vec4| Vertex::new(Vec3::new(x, y, 0.0), Vec3::Z, uv, color);
    let vertices = [
        vertex(0.5, -0.5, Vec2::new(1.0, 0.0), Vec4::new(0.0, 0.0, 0.0, 1.0)),
        vertex(0.5, 0.5, Vec2::new(0.0, 0.0), Vec4::new(0.5, 0.5, 0.5, 1.0)),
        vertex(-0.5, -0.5, Vec2::new(1.0, 1.0), Vec4::new(1.0, 0.0, 0.0, 1.0)),
        vertex(-0.5, 0.5, Vec2::new(0.0, 1.0), Vec4::new(0.0, 1.0, 0.0, 1.0)),
    ];
    ([0, 1, 2, 2, 1, 3], vertices)
}

/// Renderer-owned placeholders shared by every loaded scene.
pub struct DefaultResources {
    pub white_image: ImageHandle,
    pub grey_image: ImageHandle,
    pub black_image: ImageHandle,
    pub error_checkerboard_image: ImageHandle,
    pub sampler_linear: vk::Sampler,
    pub sampler_nearest: vk::Sampler,
    pub rectangle: GpuMeshBuffers,
}

impl DefaultResources {
    pub fn new(
        device_handle: &DeviceHandle,
        allocator: &mut ResourceAllocator,
        immediate: &ImmediateManager,
    ) -> Result<Self> {
        let mut solid = |color: Vec4| {
            let pixel = [pack_unorm4x8(color)];
            create_texture(device_handle, allocator, immediate, &pixel, 1)
        };

        let white_image = solid(Vec4::ONE)?;
        let grey_image = solid(Vec4::new(0.66, 0.66, 0.66, 1.0))?;
        let black_image = solid(BLACK)?;
        let error_checkerboard_image =
            create_texture(device_handle, allocator, immediate, &checkerboard_pixels(), CHECKERBOARD_SIZE)?;

        let sampler_nearest = image::create_sampler(device_handle, vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST)?;
        let sampler_linear = image::create_sampler(device_handle, vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR)?;

        let (indices, vertices) = rectangle();
        let rectangle = mesh::upload_mesh(device_handle, allocator, immediate, &indices, &vertices)?;

        log::debug!("ripple::ren::vk::defaults - created default images, samplers and meshes");

        Ok(Self {
            white_image,
            grey_image,
            black_image,
            error_checkerboard_image,
            sampler_linear,
            sampler_nearest,
            rectangle,
        })
    }

    pub fn destroy(&self, device_handle: &DeviceHandle, allocator: &mut ResourceAllocator) -> Result<()> {
        for image in [self.white_image, self.grey_image, self.black_image, self.error_checkerboard_image] {
            allocator.destroy_image(device_handle, image)?;
        }
        unsafe {
            device_handle.destroy_sampler(self.sampler_linear, None);
            device_handle.destroy_sampler(self.sampler_nearest, None);
        }
        self.rectangle.destroy(device_handle, allocator)
    }
}

fn create_texture(
    device_handle: &DeviceHandle,
    allocator: &mut ResourceAllocator,
    immediate: &ImmediateManager,
    pixels: &[u32],
    size: u32,
) -> Result<ImageHandle> {
    allocator.create_image_on_gpu(
        device_handle,
        immediate,
        bytemuck::cast_slice(pixels),
        vk::Extent3D { width: size, height: size, depth: 1 },
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageUsageFlags::SAMPLED,
        false,
    )
}
