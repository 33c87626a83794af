//! glTF import: decodes the document on the CPU, then uploads images, material
//! constants and meshes through the renderer's immediate path.

use super::{GeoSurface, LoadedScene, MeshAsset, SceneGraph};
use crate::{
    error::{Check, Error, Result},
    ren::{
        api::vk::{
            defaults::DefaultResources,
            descriptor::{DescriptorAllocatorGrowable, DescriptorSetPoolSizeRatio},
            immediate::ImmediateManager,
            material::{MaterialResources, MetallicRoughness},
            mesh,
            resource_allocator::{ImageHandle, ResourceAllocator},
        },
        draw::Bounds,
        material::MaterialPass,
    },
};

use ash::{Device as DeviceHandle, vk};
use gltf::{
    image::Source,
    material::AlphaMode,
    texture::{MagFilter, MinFilter},
};
use glam::{Mat4, Vec2, Vec3, Vec4};
use gpu_allocator::MemoryLocation;
use ripple_gpu::{MATERIAL_CONSTANTS_SIZE, MaterialConstants, Vertex};
use std::path::Path;

const SCENE_POOL_RATIOS: [DescriptorSetPoolSizeRatio; 3] = [
    DescriptorSetPoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 3.0),
    DescriptorSetPoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
    DescriptorSetPoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 1.0),
];

/// Renderer state the loader borrows for the duration of one import.
pub struct LoadContext<'a> {
    pub device_handle: &'a DeviceHandle,
    pub allocator: &'a mut ResourceAllocator,
    pub immediate: &'a ImmediateManager,
    pub material_system: &'a mut MetallicRoughness,
    pub defaults: &'a DefaultResources,
}

pub fn load_gltf(context: &mut LoadContext, name: &str, path: &Path) -> Result<LoadedScene> {
    log::info!("ripple::scene::loader - loading '{name}' from {}", path.display());

    let gltf_error = |source| Error::Gltf { path: path.to_path_buf(), source };
    let gltf::Gltf { document, blob } = gltf::Gltf::open(path).map_err(gltf_error)?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob).map_err(gltf_error)?;

    // a scene without materials still gets one default entry for its surfaces to reference
    let material_count = document.materials().len().max(1);

    let material_buffer = context.allocator.create_buffer(
        context.device_handle,
        MATERIAL_CONSTANTS_SIZE * material_count as u64,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        MemoryLocation::CpuToGpu,
        "material_constants",
    )?;
    let descriptors = match DescriptorAllocatorGrowable::new(context.device_handle, material_count as u32, &SCENE_POOL_RATIOS) {
        Ok(descriptors) => descriptors,
        Err(e) => {
            context.allocator.destroy_buffer(context.device_handle, material_buffer)?;
            return Err(e);
        }
    };

    let mut scene = LoadedScene {
        name: name.to_string(),
        graph: SceneGraph::default(),
        meshes: vec![],
        materials: vec![],
        images: vec![],
        samplers: vec![],
        material_buffer,
        descriptors,
    };

    match populate(context, &mut scene, &document, &buffers, path) {
        Ok(()) => {
            log::info!(
                "ripple::scene::loader - '{name}': {} nodes, {} meshes, {} materials, {} images",
                scene.graph.nodes().len(),
                scene.meshes.len(),
                scene.materials.len(),
                scene.images.len()
            );
            Ok(scene)
        }
        Err(e) => {
            if let Err(cleanup) = scene.destroy(context.device_handle, context.allocator) {
                log::error!("ripple::scene::loader - cleanup after failed load: {cleanup}");
            }
            Err(e)
        }
    }
}

fn populate(
    context: &mut LoadContext,
    scene: &mut LoadedScene,
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    path: &Path,
) -> Result<()> {
    for sampler in document.samplers() {
        let handle = create_sampler(context.device_handle, sampler_filters(&sampler))?;
        scene.samplers.push(handle);
    }

    let base = path.parent().unwrap_or(Path::new("."));
    let mut textures = Vec::with_capacity(document.images().len());
    for image in document.images() {
        let texture = match decode_image(&image, buffers, base) {
            Ok(pixels) => {
                let (width, height) = pixels.dimensions();
                let handle = context.allocator.create_image_on_gpu(
                    context.device_handle,
                    context.immediate,
                    pixels.as_raw(),
                    vk::Extent3D { width, height, depth: 1 },
                    vk::Format::R8G8B8A8_UNORM,
                    vk::ImageUsageFlags::SAMPLED,
                    true,
                )?;
                scene.images.push(handle);
                handle
            }
            Err(reason) => {
                log::warn!(
                    "ripple::scene::loader - image {} '{}' failed to load ({reason}), using checkerboard",
                    image.index(),
                    image.name().unwrap_or_default()
                );
                context.defaults.error_checkerboard_image
            }
        };
        textures.push(texture);
    }

    load_materials(context, scene, document, &textures)?;

    for gltf_mesh in document.meshes() {
        let data = read_mesh(&gltf_mesh, buffers);
        let mesh_buffers = mesh::upload_mesh(
            context.device_handle,
            context.allocator,
            context.immediate,
            &data.indices,
            &data.vertices,
        )?;
        scene.meshes.push(MeshAsset { name: data.name, surfaces: data.surfaces, buffers: mesh_buffers });
    }

    scene.graph = build_graph(document);
    Ok(())
}

fn load_materials(
    context: &mut LoadContext,
    scene: &mut LoadedScene,
    document: &gltf::Document,
    textures: &[ImageHandle],
) -> Result<()> {
    let defaults = context.defaults;
    let mut constants = vec![];
    let mut passes = vec![];
    let mut color_textures = vec![];

    for material in document.materials() {
        let pbr = material.pbr_metallic_roughness();
        constants.push(MaterialConstants {
            color_factors: Vec4::from_array(pbr.base_color_factor()),
            metal_rough_factors: Vec4::new(pbr.metallic_factor(), pbr.roughness_factor(), 0.0, 0.0),
            ..Default::default()
        });
        passes.push(match material.alpha_mode() {
            AlphaMode::Blend => MaterialPass::Transparent,
            AlphaMode::Opaque | AlphaMode::Mask => MaterialPass::Opaque,
        });

        let color_texture = pbr.base_color_texture().and_then(|info| {
            let texture = info.texture();
            let image = textures.get(texture.source().index()).copied()?;
            let sampler = match texture.sampler().index() {
                Some(index) => scene.samplers.get(index).copied()?,
                None => defaults.sampler_linear,
            };
            Some((image, sampler))
        });
        color_textures.push(color_texture);
    }

    if constants.is_empty() {
        constants.push(MaterialConstants::default());
        passes.push(MaterialPass::Opaque);
        color_textures.push(None);
    }

    if let Some(buffer) = context.allocator.buffer_mut(scene.material_buffer) {
        buffer.upload(&constants, 0)?;
    }

    for (index, (pass, color_texture)) in passes.into_iter().zip(color_textures).enumerate() {
        let (color_image, color_sampler) = color_texture.unwrap_or((defaults.white_image, defaults.sampler_linear));
        let resources = MaterialResources {
            color_image,
            color_sampler,
            metal_rough_image: defaults.white_image,
            metal_rough_sampler: defaults.sampler_linear,
            data_buffer: scene.material_buffer.raw,
            data_buffer_offset: index as u64 * MATERIAL_CONSTANTS_SIZE,
        };
        let instance =
            context
                .material_system
                .write_material(context.device_handle, pass, &resources, &mut scene.descriptors)?;
        scene.materials.push(instance);
    }

    Ok(())
}

fn decode_image(
    gltf_image: &gltf::Image,
    buffers: &[gltf::buffer::Data],
    base: &Path,
) -> std::result::Result<image::RgbaImage, String> {
    let decoded = match gltf_image.source() {
        Source::View { view, .. } => {
            let data = buffers.get(view.buffer().index()).ok_or("missing buffer")?;
            let bytes = data.get(view.offset()..view.offset() + view.length()).ok_or("buffer view out of range")?;
            image::load_from_memory(bytes)
        }
        Source::Uri { uri, .. } if uri.starts_with("data:") => return Err("embedded data URIs are not supported".into()),
        Source::Uri { uri, .. } => image::open(base.join(uri)),
    };
    decoded.map(|image| image.to_rgba8()).map_err(|e| e.to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerFilters {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
}

/// Unset filters fall back to nearest sampling with linear mip blending.
pub fn sampler_filters(sampler: &gltf::texture::Sampler) -> SamplerFilters {
    let mag_filter = match sampler.mag_filter() {
        Some(MagFilter::Linear) => vk::Filter::LINEAR,
        Some(MagFilter::Nearest) | None => vk::Filter::NEAREST,
    };
    let (min_filter, mipmap_mode) = min_filter_modes(sampler.min_filter());
    SamplerFilters { mag_filter, min_filter, mipmap_mode }
}

fn min_filter_modes(filter: Option<MinFilter>) -> (vk::Filter, vk::SamplerMipmapMode) {
    match filter.unwrap_or(MinFilter::Nearest) {
        MinFilter::Nearest => (vk::Filter::NEAREST, vk::SamplerMipmapMode::LINEAR),
        MinFilter::Linear => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
        MinFilter::NearestMipmapNearest => (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST),
        MinFilter::LinearMipmapNearest => (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST),
        MinFilter::NearestMipmapLinear => (vk::Filter::NEAREST, vk::SamplerMipmapMode::LINEAR),
        MinFilter::LinearMipmapLinear => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
    }
}

fn create_sampler(device_handle: &DeviceHandle, filters: SamplerFilters) -> Result<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(filters.mag_filter)
        .min_filter(filters.min_filter)
        .mipmap_mode(filters.mipmap_mode)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE);

    unsafe {
        device_handle
            .create_sampler(&create_info, None)
            .check("ripple::scene::loader - failed to create Sampler")
    }
}

/// CPU side of one glTF mesh: every primitive appended into shared buffers.
#[derive(Debug, Default)]
pub struct MeshData {
    pub name: String,
    pub indices: Vec<u32>,
    pub vertices: Vec<Vertex>,
    pub surfaces: Vec<GeoSurface>,
}

pub fn read_mesh(gltf_mesh: &gltf::Mesh, buffers: &[gltf::buffer::Data]) -> MeshData {
    let mut data = MeshData { name: gltf_mesh.name().unwrap_or_default().to_string(), ..Default::default() };

    for primitive in gltf_mesh.primitives() {
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

        let Some(positions) = reader.read_positions() else {
            log::warn!("ripple::scene::loader - mesh '{}' has a primitive without positions", data.name);
            continue;
        };

        let initial_vertex = data.vertices.len();
        let start_index = data.indices.len() as u32;

        data.vertices.extend(
            positions.map(|position| Vertex::new(Vec3::from_array(position), Vec3::X, Vec2::ZERO, Vec4::ONE)),
        );
        let vertices = &mut data.vertices[initial_vertex..];

        match reader.read_indices() {
            Some(indices) => data.indices.extend(indices.into_u32().map(|index| index + initial_vertex as u32)),
            None => data.indices.extend((0..vertices.len() as u32).map(|index| index + initial_vertex as u32)),
        }

        if let Some(normals) = reader.read_normals() {
            for (vertex, normal) in vertices.iter_mut().zip(normals) {
                vertex.normal_uv_y = Vec4::from((Vec3::from_array(normal), vertex.normal_uv_y.w));
            }
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            for (vertex, [u, v]) in vertices.iter_mut().zip(uvs.into_f32()) {
                vertex.position_uv_x.w = u;
                vertex.normal_uv_y.w = v;
            }
        }
        if let Some(colors) = reader.read_colors(0) {
            for (vertex, color) in vertices.iter_mut().zip(colors.into_rgba_f32()) {
                vertex.color = Vec4::from_array(color);
            }
        }

        data.surfaces.push(GeoSurface {
            start_index,
            count: data.indices.len() as u32 - start_index,
            bounds: Bounds::from_points(vertices.iter().map(Vertex::position)),
            material: primitive.material().index().unwrap_or(0),
        });
    }

    data
}

/// Mirrors the document's node hierarchy; local transforms come from either the
/// node matrix or its translation * rotation * scale.
pub fn build_graph(document: &gltf::Document) -> SceneGraph {
    let mut graph = SceneGraph::default();

    for node in document.nodes() {
        let local = Mat4::from_cols_array_2d(&node.transform().matrix());
        graph.add_node(node.name().unwrap_or_default(), local, node.mesh().map(|mesh| mesh.index()));
    }
    for node in document.nodes() {
        for child in node.children() {
            graph.link(node.index(), child.index());
        }
    }

    graph.finalize();
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    // one triangle: three f32x3 positions followed by three u16 indices (+2 bytes padding)
    const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "root", "mesh": 0, "children": [1], "translation": [1.0, 0.0, 0.0] },
            { "name": "child", "mesh": 0, "scale": [2.0, 2.0, 2.0] },
            { "name": "loose", "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,5,1] }
        ],
        "meshes": [{
            "name": "triangle",
            "primitives": [
                { "attributes": { "POSITION": 0 }, "indices": 1, "material": 1 },
                { "attributes": { "POSITION": 0 }, "indices": 1 }
            ]
        }],
        "materials": [{ "name": "a" }, { "name": "b", "alphaMode": "BLEND" }],
        "buffers": [{
            "byteLength": 44,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA="
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    }"#;

    fn triangle() -> (gltf::Document, Vec<gltf::buffer::Data>) {
        let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(TRIANGLE_GLTF.as_bytes()).unwrap();
        let buffers = gltf::import_buffers(&document, None, blob).unwrap();
        (document, buffers)
    }

    #[test]
    fn primitives_share_vertex_storage_with_offset_indices() {
        let (document, buffers) = triangle();
        let gltf_mesh = document.meshes().next().unwrap();
        let data = read_mesh(&gltf_mesh, &buffers);

        assert_eq!(data.name, "triangle");
        assert_eq!(data.vertices.len(), 6);
        assert_eq!(data.indices, vec![0, 1, 2, 3, 4, 5]);

        assert_eq!(data.surfaces.len(), 2);
        assert_eq!((data.surfaces[0].start_index, data.surfaces[0].count), (0, 3));
        assert_eq!((data.surfaces[1].start_index, data.surfaces[1].count), (3, 3));
        assert_eq!(data.surfaces[0].material, 1);
        assert_eq!(data.surfaces[1].material, 0);

        let bounds = data.surfaces[0].bounds;
        assert_eq!(bounds.origin, Vec3::new(0.5, 0.5, 0.0));
        assert_eq!(bounds.extents, Vec3::new(0.5, 0.5, 0.0));
    }

    #[test]
    fn missing_attributes_use_vertex_defaults() {
        let (document, buffers) = triangle();
        let data = read_mesh(&document.meshes().next().unwrap(), &buffers);
        let vertex = data.vertices[1];

        assert_eq!(vertex.position(), Vec3::X);
        assert_eq!(vertex.normal_uv_y, Vec4::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(vertex.color, Vec4::ONE);
    }

    #[test]
    fn graph_follows_node_hierarchy() {
        let (document, _) = triangle();
        let graph = build_graph(&document);

        assert_eq!(graph.roots(), &[0, 2]);
        let child = graph.node(1).unwrap();
        assert_eq!(child.parent, Some(0));
        assert_eq!(child.mesh, Some(0));
        assert_eq!(child.world_transform.transform_point3(Vec3::Y), Vec3::new(1.0, 2.0, 0.0));

        let loose = graph.node(2).unwrap();
        assert_eq!(loose.mesh, None);
        assert_eq!(loose.world_transform.transform_point3(Vec3::ZERO), Vec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn min_filters_map_to_mipmap_modes() {
        assert_eq!(min_filter_modes(None), (vk::Filter::NEAREST, vk::SamplerMipmapMode::LINEAR));
        assert_eq!(
            min_filter_modes(Some(MinFilter::LinearMipmapNearest)),
            (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST)
        );
        assert_eq!(
            min_filter_modes(Some(MinFilter::NearestMipmapLinear)),
            (vk::Filter::NEAREST, vk::SamplerMipmapMode::LINEAR)
        );
    }
}
