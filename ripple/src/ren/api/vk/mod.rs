pub mod background;
pub mod buffer;
pub mod defaults;
pub mod descriptor;
pub mod device;
pub mod frame;
pub mod geometry;
pub mod image;
pub mod immediate;
pub mod instance;
pub mod material;
pub mod mesh;
pub mod pipeline;
pub mod resource_allocator;
pub mod surface;
pub mod swapchain;

use crate::{
    error::{Check, Result},
    info::Info,
    ren::{
        draw::{self, DrawContext, RendererStats},
        frame::{Acquire, FrameBackend, FrameOutcome, FrameScheduler, Presented},
        settings::{Resolution, Settings},
    },
    scene::{
        LoadedScene,
        loader::{self, LoadContext},
    },
    traits::Destroy,
};
use background::BackgroundEffects;
use defaults::DefaultResources;
use descriptor::{DescriptorAllocatorGrowable, DescriptorSetLayoutBuilder, DescriptorSetPoolSizeRatio, DescriptorWriter};
use device::{Device, config::QueueFamilyType};
use frame::Frame;
use geometry::CommandRecorder;
use immediate::ImmediateManager;
use instance::Instance;
use material::MetallicRoughness;
use resource_allocator::{ImageHandle, ResourceAllocator};
use surface::Surface;
use swapchain::Swapchain;

use ash::{Entry, vk};
use glam::Mat4;
use gpu_allocator::MemoryLocation;
use ripple_gpu::{SCENE_DATA_SIZE, SceneData};
use std::{collections::BTreeMap, path::Path, time::Instant};
use winit::{raw_window_handle::HasDisplayHandle, window::Window};

const FRAME_TIMEOUT_NS: u64 = 1_000_000_000;

const DRAW_IMAGE_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
const DEPTH_IMAGE_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

const GLOBAL_POOL_RATIOS: [DescriptorSetPoolSizeRatio; 3] = [
    DescriptorSetPoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
    DescriptorSetPoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0),
    DescriptorSetPoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 3.0),
];

/// `min(swapchain, draw image) * render_scale`, never smaller than one pixel.
pub fn scaled_draw_extent(swapchain: vk::Extent2D, draw_image: vk::Extent2D, render_scale: f32) -> vk::Extent2D {
    let scale = |swapchain: u32, draw_image: u32| ((swapchain.min(draw_image) as f32 * render_scale) as u32).max(1);
    vk::Extent2D {
        width: scale(swapchain.width, draw_image.width),
        height: scale(swapchain.height, draw_image.height),
    }
}

/// Reversed-Z perspective (far 10000, near 0.1) with Y flipped for Vulkan clip space.
pub fn scene_data(view: Mat4, extent: vk::Extent2D) -> SceneData {
    let aspect_ratio = extent.width as f32 / extent.height.max(1) as f32;
    let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect_ratio, 10000.0, 0.1);
    proj.y_axis.y *= -1.0;

    SceneData { view, proj, viewproj: proj * view, ..Default::default() }
}

/// Everything the frame ring drives: device objects, render targets, materials and scenes.
struct Backend {
    settings: Settings,
    window_size: Resolution,

    // the loader must outlive every object created through it
    #[allow(dead_code)]
    entry: Entry,
    instance: Instance,
    surface: Surface,
    device: Device,
    swapchain: Swapchain,
    graphics_queue: vk::Queue,

    allocator: ResourceAllocator,
    immediate: ImmediateManager,

    draw_image: ImageHandle,
    depth_image: ImageHandle,
    draw_extent: vk::Extent2D,

    global_descriptors: DescriptorAllocatorGrowable,
    draw_image_layout: vk::DescriptorSetLayout,
    draw_image_set: vk::DescriptorSet,
    scene_data_layout: vk::DescriptorSetLayout,

    background: BackgroundEffects,
    metal_rough: MetallicRoughness,
    defaults: DefaultResources,
    scenes: BTreeMap<String, LoadedScene>,

    view: Mat4,
    scene_data: SceneData,
    stats: RendererStats,
}

impl Backend {
    fn record_passes(&mut self, frame: &mut Frame, image_index: u32) -> Result<()> {
        let device_handle = &self.device.handle;
        let command_buffer = frame.command_buffer;
        let swapchain_image = self.swapchain.images[image_index as usize];

        let scene_data_buffer = frame.scene_data_buffer.insert(self.allocator.create_transient(
            device_handle,
            SCENE_DATA_SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "scene_data",
        )?);
        scene_data_buffer.upload(&[self.scene_data], 0)?;

        let scene_data_set = frame.descriptors.allocate(device_handle, self.scene_data_layout)?;
        let mut writer = DescriptorWriter::default();
        writer.write_buffer(0, scene_data_buffer.handle(), SCENE_DATA_SIZE, 0, vk::DescriptorType::UNIFORM_BUFFER);
        writer.update_set(device_handle, scene_data_set);

        image::transition(device_handle, command_buffer, self.draw_image.raw, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
        self.background
            .record(device_handle, command_buffer, self.draw_image.raw, self.draw_image_set, self.draw_extent);

        image::transition(
            device_handle,
            command_buffer,
            self.draw_image.raw,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        image::transition(
            device_handle,
            command_buffer,
            self.depth_image.raw,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );

        self.record_geometry(command_buffer, scene_data_set);

        let device_handle = &self.device.handle;
        image::transition(
            device_handle,
            command_buffer,
            self.draw_image.raw,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        image::transition(device_handle, command_buffer, swapchain_image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        image::copy(
            device_handle,
            command_buffer,
            self.draw_image.raw,
            swapchain_image,
            self.draw_extent,
            self.swapchain.extent,
        );
        image::transition(
            device_handle,
            command_buffer,
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        Ok(())
    }

    fn record_geometry(&mut self, command_buffer: vk::CommandBuffer, scene_data_set: vk::DescriptorSet) {
        let start = Instant::now();
        let device_handle = &self.device.handle;

        let mut context = DrawContext::default();
        for scene in self.scenes.values() {
            scene.draw(Mat4::IDENTITY, &mut context);
        }

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(self.draw_image.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)];
        // reversed Z: the far plane clears to 0
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth_image.view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth: 0.0, stencil: 0 } });
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D::default().extent(self.draw_extent))
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        unsafe { device_handle.cmd_begin_rendering(command_buffer, &rendering_info) };
        let mut recorder = CommandRecorder::new(device_handle, command_buffer, scene_data_set, self.draw_extent);
        let stats = draw::dispatch(&context, self.scene_data.viewproj, &mut recorder);
        unsafe { device_handle.cmd_end_rendering(command_buffer) };

        self.stats.drawcall_count = stats.drawcall_count;
        self.stats.triangle_count = stats.triangle_count;
        self.stats.mesh_draw_time = start.elapsed().as_secs_f32() * 1000.0;
    }
}

impl FrameBackend for Backend {
    type Slot = Frame;

    fn wait(&mut self, frame: &mut Frame) -> Result<()> {
        unsafe {
            self.device
                .handle
                .wait_for_fences(&[frame.render_fence], true, FRAME_TIMEOUT_NS)
                .check("ripple::ren::vk - failed to wait for Render Fence")
        }
    }

    fn recycle(&mut self, frame: &mut Frame) -> Result<()> {
        if let Some(buffer) = frame.scene_data_buffer.take() {
            self.allocator.destroy_transient(&self.device.handle, buffer)?;
        }
        frame.descriptors.clear_pools(&self.device.handle)
    }

    fn acquire(&mut self, frame: &mut Frame) -> Result<Acquire> {
        self.swapchain.acquire_next(frame.swapchain_semaphore)
    }

    fn record(&mut self, frame: &mut Frame, image_index: u32) -> Result<()> {
        self.draw_extent =
            scaled_draw_extent(self.swapchain.extent, self.draw_image.extent_2d(), self.settings.render_scale);
        self.scene_data = scene_data(self.view, self.draw_extent);

        let device_handle = &self.device.handle;
        let command_buffer = frame.command_buffer;
        unsafe {
            // only reset once the frame is certain to be submitted
            device_handle
                .reset_fences(&[frame.render_fence])
                .check("ripple::ren::vk - failed to reset Render Fence")?;
            device_handle
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .check("ripple::ren::vk - failed to reset frame Command Buffer")?;
            let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device_handle
                .begin_command_buffer(command_buffer, &begin_info)
                .check("ripple::ren::vk - failed to begin frame Command Buffer")?;
        }

        self.record_passes(frame, image_index)?;

        unsafe {
            self.device
                .handle
                .end_command_buffer(command_buffer)
                .check("ripple::ren::vk - failed to end frame Command Buffer")
        }
    }

    fn submit(&mut self, frame: &mut Frame) -> Result<()> {
        let command_buffer_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(frame.command_buffer)];
        let wait_semaphore_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(frame.swapchain_semaphore)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signal_semaphore_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(frame.render_semaphore)
            .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS)];
        let submit_info = [frame::get_submit_info(
            &command_buffer_infos,
            Some(&wait_semaphore_infos),
            Some(&signal_semaphore_infos),
        )];

        unsafe {
            self.device
                .handle
                .queue_submit2(self.graphics_queue, &submit_info, frame.render_fence)
                .check("ripple::ren::vk - failed to submit frame Command Buffer")
        }
    }

    fn present(&mut self, frame: &mut Frame, image_index: u32) -> Result<Presented> {
        self.swapchain.present(self.graphics_queue, image_index, frame.render_semaphore)
    }

    fn resize(&mut self) -> Result<()> {
        self.swapchain.resize(&self.device, &self.surface, self.window_size)
    }
}

pub struct Renderer {
    frames: FrameScheduler<Frame>,
    backend: Backend,
    last_frame: Option<Instant>,
}

impl Renderer {
    pub fn new(info: &Info, settings: Settings, window: &Window) -> Result<Self> {
        let entry = unsafe { Entry::load()? };

        let instance = Instance::new(&entry, info, window.display_handle()?.as_raw(), settings.validation)?;
        let surface = Surface::new(&entry, &instance.handle, window)?;
        let device = Device::new(&instance.handle, &surface)?;

        let size = window.inner_size();
        let window_size = Resolution::new(size.width, size.height);
        let swapchain = Swapchain::new(&instance, &device, &surface, window_size, settings.vsync)?;
        let graphics_queue = device.get_queue(QueueFamilyType::Graphics);

        let mut allocator = ResourceAllocator::new(instance.handle.clone(), device.handle.clone(), device.physical_device)?;
        let immediate = ImmediateManager::new(&device)?;
        let frames = Frame::generator(&device, settings.buffering.max(1))?;

        let draw_image_extent = vk::Extent3D { width: window_size.width.max(1), height: window_size.height.max(1), depth: 1 };
        let draw_image = allocator.create_image(
            &device.handle,
            draw_image_extent,
            DRAW_IMAGE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            false,
            "draw_image",
        )?;
        let depth_image = allocator.create_image(
            &device.handle,
            draw_image_extent,
            DEPTH_IMAGE_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            false,
            "depth_image",
        )?;

        let mut global_descriptors = DescriptorAllocatorGrowable::new(&device.handle, 10, &GLOBAL_POOL_RATIOS)?;
        let draw_image_layout = DescriptorSetLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(&device.handle, vk::ShaderStageFlags::COMPUTE)?;
        let draw_image_set = global_descriptors.allocate(&device.handle, draw_image_layout)?;
        DescriptorWriter::default()
            .write_image(
                0,
                draw_image.view,
                vk::Sampler::null(),
                vk::ImageLayout::GENERAL,
                vk::DescriptorType::STORAGE_IMAGE,
            )
            .update_set(&device.handle, draw_image_set);

        let scene_data_layout = DescriptorSetLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .build(&device.handle, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)?;

        let background = BackgroundEffects::new(&device.handle, &settings, draw_image_layout)?;
        let metal_rough =
            MetallicRoughness::new(&device.handle, &settings, scene_data_layout, DRAW_IMAGE_FORMAT, DEPTH_IMAGE_FORMAT)?;
        let defaults = DefaultResources::new(&device.handle, &mut allocator, &immediate)?;

        log::info!(
            "ripple::ren::vk - renderer ready on '{}' ({} frames in flight)",
            device.physical_device_properties.name,
            frames.len()
        );

        let backend = Backend {
            settings,
            window_size,
            entry,
            instance,
            surface,
            device,
            swapchain,
            graphics_queue,
            allocator,
            immediate,
            draw_image,
            depth_image,
            draw_extent: draw_image.extent_2d(),
            global_descriptors,
            draw_image_layout,
            draw_image_set,
            scene_data_layout,
            background,
            metal_rough,
            defaults,
            scenes: BTreeMap::new(),
            view: Mat4::IDENTITY,
            scene_data: SceneData::default(),
            stats: RendererStats::default(),
        };

        Ok(Self { frames: FrameScheduler::new(frames), backend, last_frame: None })
    }

    /// Runs one frame with the given camera view matrix.
    pub fn draw(&mut self, view: Mat4) -> Result<FrameOutcome> {
        let now = Instant::now();
        if let Some(last_frame) = self.last_frame.replace(now) {
            self.backend.stats.frametime = now.duration_since(last_frame).as_secs_f32() * 1000.0;
        }

        self.backend.view = view;
        let outcome = self.frames.draw_frame(&mut self.backend)?;
        self.backend.stats.settle(outcome);
        Ok(outcome)
    }

    /// Defers the swapchain rebuild to the next frame; a zero-sized window pauses rendering instead.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        let resolution = Resolution::new(width, height);
        if !resolution.is_zero() {
            self.backend.window_size = resolution;
        }
        self.frames.surface_resized(resolution.is_zero());
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.frames.set_paused(paused);
    }

    pub fn paused(&self) -> bool {
        self.frames.paused()
    }

    pub fn frame_number(&self) -> u64 {
        self.frames.ring().frame_number()
    }

    pub fn stats(&self) -> RendererStats {
        self.backend.stats
    }

    pub fn background_effects_mut(&mut self) -> &mut BackgroundEffects {
        &mut self.backend.background
    }

    pub fn select_background_effect(&mut self, index: usize) {
        self.backend.background.select(index);
    }

    pub fn set_render_scale(&mut self, render_scale: f32) {
        self.backend.settings = self.backend.settings.clone().render_scale(render_scale);
    }

    pub fn scene_names(&self) -> impl Iterator<Item = &str> {
        self.backend.scenes.keys().map(String::as_str)
    }

    /// Loads a glTF file and registers it under `name`, replacing any scene with that name.
    pub fn load_scene(&mut self, name: &str, path: &Path) -> Result<()> {
        let backend = &mut self.backend;
        let mut context = LoadContext {
            device_handle: &backend.device.handle,
            allocator: &mut backend.allocator,
            immediate: &backend.immediate,
            material_system: &mut backend.metal_rough,
            defaults: &backend.defaults,
        };
        let scene = loader::load_gltf(&mut context, name, path)?;

        if let Some(previous) = backend.scenes.insert(name.to_string(), scene) {
            backend.device.wait_idle()?;
            previous.destroy(&backend.device.handle, &mut backend.allocator)?;
        }
        Ok(())
    }

    /// Returns false when no scene is registered under `name`.
    pub fn unload_scene(&mut self, name: &str) -> Result<bool> {
        let backend = &mut self.backend;
        let Some(scene) = backend.scenes.remove(name) else {
            return Ok(false);
        };

        backend.device.wait_idle()?;
        scene.destroy(&backend.device.handle, &mut backend.allocator)?;
        Ok(true)
    }
}

impl Destroy for Renderer {
    /// Waits for the device to go idle, then releases everything in reverse creation order.
    fn destroy(&mut self) {
        let backend = &mut self.backend;
        if let Err(e) = backend.device.wait_idle() {
            log::error!("{e}");
        }

        let device_handle = backend.device.handle.clone();
        let log_error = |result: Result<()>| {
            if let Err(e) = result {
                log::error!("{e}");
            }
        };

        for (_, scene) in std::mem::take(&mut backend.scenes) {
            log_error(scene.destroy(&device_handle, &mut backend.allocator));
        }
        log_error(backend.defaults.destroy(&device_handle, &mut backend.allocator));

        for frame in self.frames.ring_mut().iter_mut() {
            if let Some(buffer) = frame.scene_data_buffer.take() {
                log_error(backend.allocator.destroy_transient(&device_handle, buffer));
            }
            frame.destroy(&device_handle);
        }

        backend.metal_rough.destroy(&device_handle);
        backend.background.destroy(&device_handle);
        unsafe {
            device_handle.destroy_descriptor_set_layout(backend.scene_data_layout, None);
            device_handle.destroy_descriptor_set_layout(backend.draw_image_layout, None);
        }
        backend.global_descriptors.destroy(&device_handle);

        // draw and depth images are released with the rest of the tracked allocations
        backend.allocator.destroy(&device_handle);
        backend.immediate.destroy(&device_handle);

        backend.swapchain.destroy(&device_handle);
        backend.device.destroy();
        backend.surface.destroy();
        backend.instance.destroy();

        log::info!("ripple::ren::vk - renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn draw_extent_is_clamped_and_scaled() {
        let swapchain = vk::Extent2D { width: 1920, height: 1080 };
        let draw_image = vk::Extent2D { width: 1700, height: 900 };

        assert_eq!(scaled_draw_extent(swapchain, draw_image, 1.0), vk::Extent2D { width: 1700, height: 900 });
        assert_eq!(scaled_draw_extent(swapchain, draw_image, 0.5), vk::Extent2D { width: 850, height: 450 });
        assert_eq!(
            scaled_draw_extent(vk::Extent2D { width: 800, height: 600 }, draw_image, 1.0),
            vk::Extent2D { width: 800, height: 600 }
        );
        assert_eq!(
            scaled_draw_extent(vk::Extent2D { width: 1, height: 1 }, draw_image, 0.3),
            vk::Extent2D { width: 1, height: 1 }
        );
    }

    #[test]
    fn projection_uses_reversed_depth_and_flipped_y() {
        let data = scene_data(Mat4::IDENTITY, vk::Extent2D { width: 1600, height: 900 });

        let near = data.viewproj * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = data.viewproj * Vec4::new(0.0, 0.0, -10000.0, 1.0);
        assert!((near.z / near.w - 1.0).abs() < 1e-4);
        assert!((far.z / far.w).abs() < 1e-4);

        let up = data.viewproj * Vec4::new(0.0, 1.0, -5.0, 1.0);
        assert!(up.y / up.w < 0.0);
        assert_eq!(data.view, Mat4::IDENTITY);
    }
}
