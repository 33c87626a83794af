//! Plain-old-data layouts shared between the renderer and the pre-compiled shaders.
//!
//! Every struct here mirrors a block declared in the SPIR-V sources; field order and
//! padding must match std140/std430 (or the push constant block) exactly.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Per-draw push constants for the mesh pipelines.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct DrawPushConstants {
    pub world_matrix: Mat4,
    pub vertex_buffer_address: u64,
    // Mat4 is 16-byte aligned; keeps the struct free of implicit padding.
    pub _padding: u64,
}

impl DrawPushConstants {
    pub fn new(world_matrix: Mat4, vertex_buffer_address: u64) -> Self {
        Self {
            world_matrix,
            vertex_buffer_address,
            _padding: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for DrawPushConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, 0)
    }
}

/// Free-form parameters for the background compute effects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ComputePushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

impl ComputePushConstants {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position_uv_x: Vec4,
    pub normal_uv_y: Vec4,
    pub color: Vec4,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2, color: Vec4) -> Self {
        Self {
            position_uv_x: Vec4::from((position, uv.x)),
            normal_uv_y: Vec4::from((normal, uv.y)),
            color,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position_uv_x.truncate()
    }
}

/// Uniform block bound at set 0 for every mesh pipeline.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct SceneData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
    pub ambient_color: Vec4,
    /// w holds the sun power.
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

impl Default for SceneData {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            viewproj: Mat4::IDENTITY,
            ambient_color: Vec4::splat(0.1),
            sunlight_direction: Vec4::new(0.0, 1.0, 0.5, 1.0),
            sunlight_color: Vec4::ONE,
        }
    }
}

/// Per-material uniform data; padded to 256 bytes so every entry in the shared
/// material buffer sits on a valid uniform offset.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct MaterialConstants {
    pub color_factors: Vec4,
    pub metal_rough_factors: Vec4,
    pub extra: [Vec4; 14],
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            color_factors: Vec4::ONE,
            metal_rough_factors: Vec4::new(1.0, 0.5, 0.0, 0.0),
            extra: [Vec4::ZERO; 14],
        }
    }
}

pub const VERTEX_SIZE: u64 = size_of::<Vertex>() as u64;
pub const INDEX_SIZE: u64 = size_of::<u32>() as u64;
pub const DRAW_PUSH_CONSTANTS_SIZE: u32 = size_of::<DrawPushConstants>() as u32;
pub const COMPUTE_PUSH_CONSTANTS_SIZE: u32 = size_of::<ComputePushConstants>() as u32;
pub const SCENE_DATA_SIZE: u64 = size_of::<SceneData>() as u64;
pub const MATERIAL_CONSTANTS_SIZE: u64 = size_of::<MaterialConstants>() as u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_shader_blocks() {
        assert_eq!(VERTEX_SIZE, 48);
        assert_eq!(DRAW_PUSH_CONSTANTS_SIZE, 80);
        assert_eq!(COMPUTE_PUSH_CONSTANTS_SIZE, 64);
        assert_eq!(SCENE_DATA_SIZE, 240);
        assert_eq!(MATERIAL_CONSTANTS_SIZE, 256);
    }

    #[test]
    fn vertex_packs_uv_into_w() {
        let vertex = Vertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::Z, Vec2::new(0.25, 0.75), Vec4::ONE);
        assert_eq!(vertex.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(vertex.position_uv_x.w, 0.25);
        assert_eq!(vertex.normal_uv_y.w, 0.75);
    }
}
