use crate::ren::{
    draw::{DrawRecorder, RenderObject},
    material::{MaterialInstance, MaterialPipeline},
};

use ash::{Device as DeviceHandle, vk};
use ripple_gpu::DrawPushConstants;

/// Records the geometry pass into a command buffer inside an active dynamic rendering scope.
pub struct CommandRecorder<'a> {
    device_handle: &'a DeviceHandle,
    command_buffer: vk::CommandBuffer,
    scene_data_set: vk::DescriptorSet,
    extent: vk::Extent2D,
}

impl<'a> CommandRecorder<'a> {
    pub fn new(
        device_handle: &'a DeviceHandle,
        command_buffer: vk::CommandBuffer,
        scene_data_set: vk::DescriptorSet,
        extent: vk::Extent2D,
    ) -> Self {
        Self { device_handle, command_buffer, scene_data_set, extent }
    }
}

impl DrawRecorder for CommandRecorder<'_> {
    fn bind_pipeline(&mut self, pipeline: &MaterialPipeline) {
        let viewports = [vk::Viewport::default()
            .width(self.extent.width as f32)
            .height(self.extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)];
        let scissors = [vk::Rect2D::default().extent(self.extent)];

        unsafe {
            self.device_handle
                .cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
            self.device_handle.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &[self.scene_data_set],
                &[],
            );
            self.device_handle.cmd_set_viewport(self.command_buffer, 0, &viewports);
            self.device_handle.cmd_set_scissor(self.command_buffer, 0, &scissors);
        }
    }

    fn bind_material(&mut self, material: &MaterialInstance) {
        unsafe {
            self.device_handle.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                material.pipeline.layout,
                1,
                &[material.set],
                &[],
            );
        }
    }

    fn bind_index_buffer(&mut self, index_buffer: vk::Buffer) {
        unsafe {
            self.device_handle
                .cmd_bind_index_buffer(self.command_buffer, index_buffer, 0, vk::IndexType::UINT32)
        };
    }

    fn draw(&mut self, object: &RenderObject) {
        let push_constants = DrawPushConstants::new(object.transform, object.vertex_buffer_address);
        unsafe {
            self.device_handle.cmd_push_constants(
                self.command_buffer,
                object.material.pipeline.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                push_constants.as_bytes(),
            );
            self.device_handle
                .cmd_draw_indexed(self.command_buffer, object.index_count, 1, object.first_index, 0, 0);
        }
    }
}
