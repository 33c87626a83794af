use crate::{
    error::{Check, Error, Result},
    ren::settings::Settings,
};

use ash::{Device as DeviceHandle, vk};
use std::{
    fs::File,
    io::Cursor,
    path::{Path, PathBuf},
};

const ENTRY_POINT: &std::ffi::CStr = c"main";

#[cfg(feature = "compile-shaders")]
const EMBEDDED_SHADERS: &[(&str, &[u8])] = &[
    ("gradient_color.comp.spv", include_bytes!(concat!(env!("OUT_DIR"), "/gradient_color.comp.spv"))),
    ("sky.comp.spv", include_bytes!(concat!(env!("OUT_DIR"), "/sky.comp.spv"))),
    ("mesh.vert.spv", include_bytes!(concat!(env!("OUT_DIR"), "/mesh.vert.spv"))),
    ("mesh.frag.spv", include_bytes!(concat!(env!("OUT_DIR"), "/mesh.frag.spv"))),
];

#[cfg(not(feature = "compile-shaders"))]
const EMBEDDED_SHADERS: &[(&str, &[u8])] = &[];

/// Where a shader's SPIR-V is read from. Files in the shader directory win over the
/// copies built into the binary.
#[derive(Debug, PartialEq)]
pub enum ShaderSource {
    File(PathBuf),
    Embedded(&'static [u8]),
}

pub fn resolve_shader(settings: &Settings, name: &str) -> ShaderSource {
    let path = settings.shader_path(name);
    if path.is_file() {
        return ShaderSource::File(path);
    }
    match EMBEDDED_SHADERS.iter().find(|(embedded, _)| *embedded == name) {
        Some((_, code)) => ShaderSource::Embedded(*code),
        None => ShaderSource::File(path),
    }
}

pub fn read_shader(name: &str, source: &ShaderSource) -> Result<Vec<u32>> {
    match source {
        ShaderSource::File(path) => {
            let shader_load_error = |source| Error::ShaderLoad { path: path.clone(), source };
            let mut file = File::open(path).map_err(shader_load_error)?;
            ash::util::read_spv(&mut file).map_err(shader_load_error)
        }
        ShaderSource::Embedded(code) => ash::util::read_spv(&mut Cursor::new(*code))
            .map_err(|source| Error::ShaderLoad { path: Path::new(name).to_path_buf(), source }),
    }
}

pub fn load_shader_module(device_handle: &DeviceHandle, settings: &Settings, name: &str) -> Result<vk::ShaderModule> {
    let source = resolve_shader(settings, name);
    let code = read_shader(name, &source)?;
    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

    let module = unsafe {
        device_handle
            .create_shader_module(&create_info, None)
            .check("ripple::ren::vk::pipeline - failed to create shader module")?
    };
    match source {
        ShaderSource::File(path) => log::debug!("ripple::ren::vk::pipeline - loaded {}", path.display()),
        ShaderSource::Embedded(_) => log::debug!("ripple::ren::vk::pipeline - loaded embedded {name}"),
    }
    Ok(module)
}

pub fn create_pipeline_layout(
    device_handle: &DeviceHandle,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> Result<vk::PipelineLayout> {
    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);

    unsafe {
        device_handle
            .create_pipeline_layout(&create_info, None)
            .check("ripple::ren::vk::pipeline - failed to create pipeline layout")
    }
}

pub fn create_compute_pipeline(
    device_handle: &DeviceHandle,
    shader_module: vk::ShaderModule,
    layout: vk::PipelineLayout,
) -> Result<vk::Pipeline> {
    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader_module)
        .name(ENTRY_POINT);

    let create_infos = [vk::ComputePipelineCreateInfo::default().layout(layout).stage(stage)];

    let pipelines = unsafe {
        device_handle
            .create_compute_pipelines(vk::PipelineCache::null(), &create_infos, None)
            .map_err(|(_, result)| result)
            .check("ripple::ren::vk::pipeline - failed to create compute pipeline")?
    };
    Ok(pipelines[0])
}

/// Graphics pipeline description for dynamic rendering; viewport and scissor are dynamic state.
pub struct PipelineBuilder {
    shader_stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    topology: vk::PrimitiveTopology,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    depth_test: Option<(bool, vk::CompareOp)>,
    color_attachment_format: vk::Format,
    depth_format: vk::Format,
    layout: vk::PipelineLayout,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            shader_stages: vec![],
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            color_blend_attachment: vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA),
            depth_test: None,
            color_attachment_format: vk::Format::UNDEFINED,
            depth_format: vk::Format::UNDEFINED,
            layout: vk::PipelineLayout::null(),
        }
    }
}

impl PipelineBuilder {
    pub fn shaders(mut self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) -> Self {
        self.shader_stages = vec![
            (vk::ShaderStageFlags::VERTEX, vertex),
            (vk::ShaderStageFlags::FRAGMENT, fragment),
        ];
        self
    }

    pub fn input_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn polygon_mode(mut self, polygon_mode: vk::PolygonMode) -> Self {
        self.polygon_mode = polygon_mode;
        self
    }

    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    pub fn disable_blending(mut self) -> Self {
        self.color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false);
        self
    }

    /// `src * src_alpha + dst`
    pub fn enable_blending_additive(mut self) -> Self {
        self.color_blend_attachment = blend_state(vk::BlendFactor::ONE);
        self
    }

    pub fn color_attachment_format(mut self, format: vk::Format) -> Self {
        self.color_attachment_format = format;
        self
    }

    pub fn depth_format(mut self, format: vk::Format) -> Self {
        self.depth_format = format;
        self
    }

    pub fn enable_depthtest(mut self, depth_write: bool, compare_op: vk::CompareOp) -> Self {
        self.depth_test = Some((depth_write, compare_op));
        self
    }

    pub fn layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn build(&self, device_handle: &DeviceHandle) -> Result<vk::Pipeline> {
        let stages: Vec<_> = self
            .shader_stages
            .iter()
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage)
                    .module(module)
                    .name(ENTRY_POINT)
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(false);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face);
        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let attachments = [self.color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&attachments);

        let depth_stencil = match self.depth_test {
            Some((depth_write, compare_op)) => vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(depth_write)
                .depth_compare_op(compare_op),
            None => vk::PipelineDepthStencilStateCreateInfo::default().depth_compare_op(vk::CompareOp::NEVER),
        }
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_attachment_formats = [self.color_attachment_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_attachment_formats)
            .depth_attachment_format(self.depth_format);

        let create_infos = [vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .push_next(&mut rendering_info)];

        let pipelines = unsafe {
            device_handle
                .create_graphics_pipelines(vk::PipelineCache::null(), &create_infos, None)
                .map_err(|(_, result)| result)
                .check("ripple::ren::vk::pipeline - failed to create graphics pipeline")?
        };
        Ok(pipelines[0])
    }
}

fn blend_state(dst_color_blend_factor: vk::BlendFactor) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(dst_color_blend_factor)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
}
