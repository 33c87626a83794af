use super::{
    descriptor::{DescriptorAllocatorGrowable, DescriptorSetLayoutBuilder, DescriptorWriter},
    pipeline::{self, PipelineBuilder},
    resource_allocator::ImageHandle,
};
use crate::{
    error::Result,
    ren::{
        material::{MaterialId, MaterialInstance, MaterialPass, MaterialPipeline},
        settings::Settings,
    },
};

use ash::{Device as DeviceHandle, vk};
use ripple_gpu::{DRAW_PUSH_CONSTANTS_SIZE, MATERIAL_CONSTANTS_SIZE};

pub const MESH_VERTEX_SHADER: &str = "mesh.vert.spv";
pub const MESH_FRAGMENT_SHADER: &str = "mesh.frag.spv";

/// Everything one metallic-roughness material binds at set 1.
#[derive(Clone, Copy, Debug)]
pub struct MaterialResources {
    pub color_image: ImageHandle,
    pub color_sampler: vk::Sampler,
    pub metal_rough_image: ImageHandle,
    pub metal_rough_sampler: vk::Sampler,
    pub data_buffer: vk::Buffer,
    pub data_buffer_offset: vk::DeviceSize,
}

/// The glTF metallic-roughness material model: one pipeline layout shared by an
/// opaque and an additive transparent pipeline.
pub struct MetallicRoughness {
    pub opaque_pipeline: MaterialPipeline,
    pub transparent_pipeline: MaterialPipeline,
    pub material_layout: vk::DescriptorSetLayout,
    writer: DescriptorWriter,
    next_id: u32,
}

impl MetallicRoughness {
    pub fn new(
        device_handle: &DeviceHandle,
        settings: &Settings,
        scene_data_layout: vk::DescriptorSetLayout,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let fragment_shader = pipeline::load_shader_module(device_handle, settings, MESH_FRAGMENT_SHADER)?;
        let vertex_shader = match pipeline::load_shader_module(device_handle, settings, MESH_VERTEX_SHADER) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device_handle.destroy_shader_module(fragment_shader, None) };
                return Err(e);
            }
        };

        let result = Self::build(device_handle, scene_data_layout, vertex_shader, fragment_shader, color_format, depth_format);

        unsafe {
            device_handle.destroy_shader_module(vertex_shader, None);
            device_handle.destroy_shader_module(fragment_shader, None);
        }
        result
    }

    fn build(
        device_handle: &DeviceHandle,
        scene_data_layout: vk::DescriptorSetLayout,
        vertex_shader: vk::ShaderModule,
        fragment_shader: vk::ShaderModule,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let material_layout = DescriptorSetLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .add_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .build(device_handle, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)?;

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(DRAW_PUSH_CONSTANTS_SIZE)];

        let layout = pipeline::create_pipeline_layout(
            device_handle,
            &[scene_data_layout, material_layout],
            &push_constant_ranges,
        )?;

        let builder = PipelineBuilder::default()
            .shaders(vertex_shader, fragment_shader)
            .input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .disable_blending()
            .enable_depthtest(true, vk::CompareOp::GREATER_OR_EQUAL)
            .color_attachment_format(color_format)
            .depth_format(depth_format)
            .layout(layout);

        let opaque = builder.build(device_handle)?;

        let transparent = builder
            .enable_blending_additive()
            .enable_depthtest(false, vk::CompareOp::GREATER_OR_EQUAL)
            .build(device_handle)?;

        log::info!("ripple::ren::vk::material - built metallic-roughness pipelines");

        Ok(Self {
            opaque_pipeline: MaterialPipeline { pipeline: opaque, layout },
            transparent_pipeline: MaterialPipeline { pipeline: transparent, layout },
            material_layout,
            writer: DescriptorWriter::default(),
            next_id: 0,
        })
    }

    pub fn write_material(
        &mut self,
        device_handle: &DeviceHandle,
        pass: MaterialPass,
        resources: &MaterialResources,
        descriptors: &mut DescriptorAllocatorGrowable,
    ) -> Result<MaterialInstance> {
        let pipeline = match pass {
            MaterialPass::Opaque => self.opaque_pipeline,
            MaterialPass::Transparent => self.transparent_pipeline,
        };

        let set = descriptors.allocate(device_handle, self.material_layout)?;

        self.writer.clear();
        self.writer
            .write_buffer(
                0,
                resources.data_buffer,
                MATERIAL_CONSTANTS_SIZE,
                resources.data_buffer_offset,
                vk::DescriptorType::UNIFORM_BUFFER,
            )
            .write_image(
                1,
                resources.color_image.view,
                resources.color_sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            )
            .write_image(
                2,
                resources.metal_rough_image.view,
                resources.metal_rough_sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            );
        self.writer.update_set(device_handle, set);

        let id = MaterialId(self.next_id);
        self.next_id += 1;

        Ok(MaterialInstance { id, pipeline, set, pass })
    }

    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        unsafe {
            device_handle.destroy_pipeline(self.opaque_pipeline.pipeline, None);
            device_handle.destroy_pipeline(self.transparent_pipeline.pipeline, None);
            // both pipelines share one layout
            device_handle.destroy_pipeline_layout(self.opaque_pipeline.layout, None);
            device_handle.destroy_descriptor_set_layout(self.material_layout, None);
        }
    }
}
