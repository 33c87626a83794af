use super::pipeline;
use crate::{error::Result, ren::settings::Settings};

use ash::{Device as DeviceHandle, vk};
use glam::Vec4;
use ripple_gpu::{COMPUTE_PUSH_CONSTANTS_SIZE, ComputePushConstants};

const WORKGROUP_SIZE: u32 = 16;

pub struct ComputeEffect {
    pub name: &'static str,
    pub pipeline: vk::Pipeline,
    pub data: ComputePushConstants,
}

struct EffectDesc {
    name: &'static str,
    shader: &'static str,
    data: ComputePushConstants,
}

fn builtin_effects() -> [EffectDesc; 2] {
    [
        EffectDesc {
            name: "gradient",
            shader: "gradient_color.comp.spv",
            data: ComputePushConstants {
                data1: Vec4::new(1.0, 0.0, 0.0, 1.0),
                data2: Vec4::new(0.0, 0.0, 1.0, 1.0),
                ..Default::default()
            },
        },
        EffectDesc {
            name: "sky",
            shader: "sky.comp.spv",
            data: ComputePushConstants { data1: Vec4::new(0.1, 0.2, 0.4, 0.97), ..Default::default() },
        },
    ]
}

/// Compute passes that fill the draw image before geometry is rendered.
/// Effects whose shader fails to load are skipped; with none left the draw image is cleared.
pub struct BackgroundEffects {
    pub layout: vk::PipelineLayout,
    pub effects: Vec<ComputeEffect>,
    current: usize,
}

impl BackgroundEffects {
    pub fn new(
        device_handle: &DeviceHandle,
        settings: &Settings,
        draw_image_layout: vk::DescriptorSetLayout,
    ) -> Result<Self> {
        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(COMPUTE_PUSH_CONSTANTS_SIZE)];
        let layout = pipeline::create_pipeline_layout(device_handle, &[draw_image_layout], &push_constant_ranges)?;

        let mut effects = vec![];
        for desc in builtin_effects() {
            let module = match pipeline::load_shader_module(device_handle, settings, desc.shader) {
                Ok(module) => module,
                Err(e) => {
                    log::error!("ripple::ren::vk::background - skipping '{}': {e}", desc.name);
                    continue;
                }
            };
            let pipeline = pipeline::create_compute_pipeline(device_handle, module, layout);
            unsafe { device_handle.destroy_shader_module(module, None) };
            effects.push(ComputeEffect { name: desc.name, pipeline: pipeline?, data: desc.data });
        }

        if effects.is_empty() {
            log::warn!("ripple::ren::vk::background - no background effect available, clearing instead");
        }

        Ok(Self { layout, effects, current: 0 })
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Out of range indices are clamped to the last effect.
    pub fn select(&mut self, index: usize) {
        self.current = index.min(self.effects.len().saturating_sub(1));
    }

    pub fn current_mut(&mut self) -> Option<&mut ComputeEffect> {
        self.effects.get_mut(self.current)
    }

    /// Records the selected effect into `draw_image` (GENERAL layout).
    pub fn record(
        &self,
        device_handle: &DeviceHandle,
        command_buffer: vk::CommandBuffer,
        draw_image: vk::Image,
        draw_image_set: vk::DescriptorSet,
        extent: vk::Extent2D,
    ) {
        let Some(effect) = self.effects.get(self.current) else {
            let clear_color = vk::ClearColorValue { float32: [0.0, 0.0, 0.0, 1.0] };
            let ranges = [super::image::get_subresource_range(vk::ImageAspectFlags::COLOR)];
            unsafe {
                device_handle.cmd_clear_color_image(
                    command_buffer,
                    draw_image,
                    vk::ImageLayout::GENERAL,
                    &clear_color,
                    &ranges,
                )
            };
            return;
        };

        let (group_count_x, group_count_y) = group_counts(extent);
        unsafe {
            device_handle.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::COMPUTE, effect.pipeline);
            device_handle.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::COMPUTE,
                self.layout,
                0,
                &[draw_image_set],
                &[],
            );
            device_handle.cmd_push_constants(
                command_buffer,
                self.layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                effect.data.as_bytes(),
            );
            device_handle.cmd_dispatch(command_buffer, group_count_x, group_count_y, 1);
        }
    }

    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        unsafe {
            self.effects
                .drain(..)
                .for_each(|effect| device_handle.destroy_pipeline(effect.pipeline, None));
            device_handle.destroy_pipeline_layout(self.layout, None);
        }
    }
}

pub fn group_counts(extent: vk::Extent2D) -> (u32, u32) {
    (extent.width.div_ceil(WORKGROUP_SIZE), extent.height.div_ceil(WORKGROUP_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_every_pixel() {
        assert_eq!(group_counts(vk::Extent2D { width: 1700, height: 900 }), (107, 57));
        assert_eq!(group_counts(vk::Extent2D { width: 16, height: 16 }), (1, 1));
        assert_eq!(group_counts(vk::Extent2D { width: 17, height: 1 }), (2, 1));
    }

    #[test]
    fn builtin_defaults() {
        let [gradient, sky] = builtin_effects();
        assert_eq!(gradient.name, "gradient");
        assert_eq!(gradient.data.data1, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(gradient.data.data2, Vec4::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(sky.data.data1, Vec4::new(0.1, 0.2, 0.4, 0.97));
    }
}
