pub mod loader;

use crate::{
    error::Result,
    ren::{
        api::vk::{
            descriptor::DescriptorAllocatorGrowable,
            mesh::GpuMeshBuffers,
            resource_allocator::{BufferHandle, ImageHandle, ResourceAllocator},
        },
        draw::{Bounds, DrawContext, RenderObject},
        material::MaterialInstance,
    },
};

use ash::{Device as DeviceHandle, vk};
use glam::Mat4;

/// A range of a mesh's index buffer drawn with one material.
#[derive(Clone, Copy, Debug)]
pub struct GeoSurface {
    pub start_index: u32,
    pub count: u32,
    pub bounds: Bounds,
    /// Index into the owning scene's material table.
    pub material: usize,
}

pub struct MeshAsset {
    pub name: String,
    pub surfaces: Vec<GeoSurface>,
    pub buffers: GpuMeshBuffers,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub local_transform: Mat4,
    pub world_transform: Mat4,
    /// Index into the owning scene's mesh table.
    pub mesh: Option<usize>,
}

/// Node hierarchy stored as an arena. Every node has at most one parent, so the
/// graph reachable from the roots is always a forest.
#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    roots: Vec<usize>,
}

impl SceneGraph {
    pub fn add_node(&mut self, name: impl Into<String>, local_transform: Mat4, mesh: Option<usize>) -> usize {
        self.nodes.push(Node {
            name: name.into(),
            parent: None,
            children: vec![],
            local_transform,
            world_transform: local_transform,
            mesh,
        });
        self.nodes.len() - 1
    }

    /// Returns false (and leaves the graph untouched) for self links, unknown
    /// indices, children that already have a parent and links that would close a cycle.
    pub fn link(&mut self, parent: usize, child: usize) -> bool {
        if parent == child || parent >= self.nodes.len() || child >= self.nodes.len() {
            return false;
        }
        if self.nodes[child].parent.is_some() {
            log::warn!(
                "ripple::scene - node '{}' already has a parent, ignoring link from '{}'",
                self.nodes[child].name,
                self.nodes[parent].name
            );
            return false;
        }
        if self.is_ancestor(child, parent) {
            log::warn!(
                "ripple::scene - linking '{}' under '{}' would form a cycle, ignoring",
                self.nodes[child].name,
                self.nodes[parent].name
            );
            return false;
        }

        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        true
    }

    /// True when `ancestor` is `node` or lies on its parent chain.
    fn is_ancestor(&self, ancestor: usize, node: usize) -> bool {
        let mut current = Some(node);
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.nodes[index].parent;
        }
        false
    }

    /// Collects the parentless nodes and recomputes every world transform from them.
    pub fn finalize(&mut self) {
        self.roots = (0..self.nodes.len()).filter(|&index| self.nodes[index].parent.is_none()).collect();
        for root in self.roots.clone() {
            self.refresh_transform(root, Mat4::IDENTITY);
        }
    }

    pub fn refresh_transform(&mut self, node: usize, parent_world: Mat4) {
        let world = parent_world * self.nodes[node].local_transform;
        self.nodes[node].world_transform = world;

        // children are cloned out so the arena can be borrowed mutably while recursing
        let children = self.nodes[node].children.clone();
        for child in children {
            self.refresh_transform(child, world);
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Emits one [`RenderObject`] per surface of every mesh node reachable from the roots.
    pub fn draw<'m>(
        &self,
        top_matrix: Mat4,
        meshes: &[MeshAsset],
        materials: &'m [MaterialInstance],
        context: &mut DrawContext<'m>,
    ) {
        for &root in &self.roots {
            self.draw_node(root, top_matrix, meshes, materials, context);
        }
    }

    fn draw_node<'m>(
        &self,
        index: usize,
        top_matrix: Mat4,
        meshes: &[MeshAsset],
        materials: &'m [MaterialInstance],
        context: &mut DrawContext<'m>,
    ) {
        let node = &self.nodes[index];

        if let Some(mesh) = node.mesh.and_then(|mesh| meshes.get(mesh)) {
            let transform = top_matrix * node.world_transform;
            for surface in &mesh.surfaces {
                let Some(material) = materials.get(surface.material) else {
                    continue;
                };
                context.push(RenderObject {
                    index_count: surface.count,
                    first_index: surface.start_index,
                    index_buffer: mesh.buffers.index_buffer.raw,
                    material,
                    bounds: surface.bounds,
                    transform,
                    vertex_buffer_address: mesh.buffers.vertex_buffer_address,
                });
            }
        }

        for &child in &node.children {
            self.draw_node(child, top_matrix, meshes, materials, context);
        }
    }
}

/// Every GPU resource created for one loaded asset; destroyed as a unit.
pub struct LoadedScene {
    pub name: String,
    pub graph: SceneGraph,
    pub meshes: Vec<MeshAsset>,
    pub materials: Vec<MaterialInstance>,
    /// Images owned by this scene. Shared defaults used as fallbacks are not listed.
    pub images: Vec<ImageHandle>,
    pub samplers: Vec<vk::Sampler>,
    pub material_buffer: BufferHandle,
    pub descriptors: DescriptorAllocatorGrowable,
}

impl LoadedScene {
    pub fn draw<'m>(&'m self, top_matrix: Mat4, context: &mut DrawContext<'m>) {
        self.graph.draw(top_matrix, &self.meshes, &self.materials, context);
    }

    pub fn destroy(mut self, device_handle: &DeviceHandle, allocator: &mut ResourceAllocator) -> Result<()> {
        log::debug!("ripple::scene - destroying '{}'", self.name);

        for mesh in self.meshes.drain(..) {
            mesh.buffers.destroy(device_handle, allocator)?;
        }
        for image in self.images.drain(..) {
            allocator.destroy_image(device_handle, image)?;
        }
        unsafe {
            self.samplers
                .drain(..)
                .for_each(|sampler| device_handle.destroy_sampler(sampler, None));
        }
        allocator.destroy_buffer(device_handle, self.material_buffer)?;
        self.descriptors.destroy(device_handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ren::{
        api::vk::scene_data,
        draw::{DrawRecorder, DrawStats, dispatch},
        material::{MaterialId, MaterialPass, MaterialPipeline},
    };

    use ash::vk::Handle;
    use glam::Vec3;

    fn material(id: u32, pass: MaterialPass) -> MaterialInstance {
        MaterialInstance {
            id: MaterialId(id),
            pipeline: MaterialPipeline {
                pipeline: vk::Pipeline::from_raw(1),
                layout: vk::PipelineLayout::from_raw(1),
            },
            set: vk::DescriptorSet::from_raw(id as u64 + 1),
            pass,
        }
    }

    fn mesh(index_buffer: u64, surfaces: Vec<GeoSurface>) -> MeshAsset {
        MeshAsset {
            name: format!("mesh{index_buffer}"),
            surfaces,
            buffers: GpuMeshBuffers {
                index_buffer: BufferHandle { key: 0, raw: vk::Buffer::from_raw(index_buffer), size: 0 },
                vertex_buffer: BufferHandle { key: 1, raw: vk::Buffer::from_raw(index_buffer + 100), size: 0 },
                vertex_buffer_address: 0xbeef,
            },
        }
    }

    fn surface(start_index: u32, count: u32, material: usize) -> GeoSurface {
        GeoSurface { start_index, count, bounds: Bounds::default(), material }
    }

    #[test]
    fn world_transforms_compose_top_down() {
        let mut graph = SceneGraph::default();
        let root = graph.add_node("root", Mat4::from_translation(Vec3::X), None);
        let child = graph.add_node("child", Mat4::from_scale(Vec3::splat(2.0)), None);
        let grandchild = graph.add_node("grandchild", Mat4::from_translation(Vec3::Y), None);
        assert!(graph.link(root, child));
        assert!(graph.link(child, grandchild));
        graph.finalize();

        assert_eq!(graph.roots(), &[root]);
        let world = graph.node(grandchild).map(|node| node.world_transform).unwrap();
        assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 0.0));

        // moving the root only takes effect once refreshed
        graph.nodes[root].local_transform = Mat4::IDENTITY;
        graph.refresh_transform(root, Mat4::IDENTITY);
        let world = graph.node(grandchild).map(|node| node.world_transform).unwrap();
        assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn rejects_second_parent_and_self_links() {
        let mut graph = SceneGraph::default();
        let a = graph.add_node("a", Mat4::IDENTITY, None);
        let b = graph.add_node("b", Mat4::IDENTITY, None);
        let c = graph.add_node("c", Mat4::IDENTITY, None);

        assert!(graph.link(a, b));
        assert!(graph.link(b, c));
        assert!(!graph.link(c, b));
        assert!(!graph.link(a, a));
        assert!(!graph.link(a, 7));
        graph.finalize();

        assert_eq!(graph.roots(), &[a]);
        assert_eq!(graph.node(b).and_then(|node| node.parent), Some(a));
        assert!(graph.node(c).is_some_and(|node| node.children.is_empty()));
    }

    #[test]
    fn rejects_links_that_close_a_cycle() {
        let mut graph = SceneGraph::default();
        let a = graph.add_node("a", Mat4::IDENTITY, None);
        let b = graph.add_node("b", Mat4::IDENTITY, None);
        let c = graph.add_node("c", Mat4::IDENTITY, None);

        assert!(graph.link(a, b));
        assert!(!graph.link(b, a));
        assert!(graph.link(b, c));
        assert!(!graph.link(c, a));
        graph.finalize();

        assert_eq!(graph.roots(), &[a]);
        assert_eq!(graph.node(a).and_then(|node| node.parent), None);
        assert!(graph.node(c).is_some_and(|node| node.children.is_empty()));
    }

    #[test]
    fn draw_emits_one_object_per_surface() {
        let materials = [material(0, MaterialPass::Opaque), material(1, MaterialPass::Transparent)];
        let meshes = [mesh(10, vec![surface(0, 6, 0), surface(6, 3, 1)]), mesh(20, vec![surface(0, 3, 0)])];

        let mut graph = SceneGraph::default();
        let root = graph.add_node("root", Mat4::from_translation(Vec3::Z), Some(0));
        let child = graph.add_node("child", Mat4::from_translation(Vec3::X), Some(1));
        graph.add_node("empty", Mat4::IDENTITY, None);
        graph.link(root, child);
        graph.finalize();

        let top = Mat4::from_scale(Vec3::splat(3.0));
        let mut context = DrawContext::default();
        graph.draw(top, &meshes, &materials, &mut context);

        assert_eq!(context.opaque.len(), 2);
        assert_eq!(context.transparent.len(), 1);

        let first = &context.opaque[0];
        assert_eq!((first.first_index, first.index_count), (0, 6));
        assert_eq!(first.index_buffer, vk::Buffer::from_raw(10));
        assert_eq!(first.vertex_buffer_address, 0xbeef);
        assert_eq!(first.transform.transform_point3(Vec3::ZERO), Vec3::new(0.0, 0.0, 3.0));

        let nested = &context.opaque[1];
        assert_eq!(nested.index_buffer, vk::Buffer::from_raw(20));
        assert_eq!(nested.transform.transform_point3(Vec3::ZERO), Vec3::new(3.0, 0.0, 3.0));

        assert_eq!(context.transparent[0].first_index, 6);
        assert_eq!(context.transparent[0].material.id, MaterialId(1));
    }

    #[derive(Default)]
    struct DrawLog(Vec<(u64, u32, MaterialId)>);

    impl DrawRecorder for DrawLog {
        fn bind_pipeline(&mut self, _pipeline: &MaterialPipeline) {}

        fn bind_material(&mut self, _material: &MaterialInstance) {}

        fn bind_index_buffer(&mut self, _index_buffer: vk::Buffer) {}

        fn draw(&mut self, object: &RenderObject) {
            self.0.push((object.index_buffer.as_raw(), object.first_index, object.material.id));
        }
    }

    fn unit_surface(start_index: u32, count: u32, material: usize) -> GeoSurface {
        let bounds = Bounds::from_points([Vec3::splat(-1.0), Vec3::splat(1.0)]);
        GeoSurface { start_index, count, bounds, material }
    }

    #[test]
    fn loaded_hierarchy_draws_visible_opaque_sorted_then_transparent() {
        let materials = [material(0, MaterialPass::Opaque), material(1, MaterialPass::Transparent)];
        let meshes = [
            mesh(30, vec![unit_surface(0, 3, 0), unit_surface(3, 6, 1)]),
            mesh(10, vec![unit_surface(0, 6, 0), unit_surface(6, 9, 0)]),
            mesh(20, vec![unit_surface(0, 12, 0)]),
            mesh(40, vec![unit_surface(0, 30, 0), unit_surface(30, 3, 1)]),
        ];
        let at = |x: f32, y: f32, z: f32| Mat4::from_translation(Vec3::new(x, y, z));

        let mut graph = SceneGraph::default();
        let tower = graph.add_node("tower", at(0.0, 0.0, -10.0), Some(1));
        let annex = graph.add_node("annex", at(2.0, 0.0, 0.0), Some(2));
        graph.add_node("window", at(-2.0, 0.0, -10.0), Some(0));
        graph.add_node("behind_tower", at(0.0, 0.0, 20.0), Some(1));
        graph.add_node("behind_annex", at(0.0, 0.0, 30.0), Some(2));
        let far = graph.add_node("far", at(500.0, 0.0, -10.0), Some(3));
        let far_child = graph.add_node("far_child", at(0.0, 500.0, 0.0), Some(2));
        graph.add_node("behind_lamp", at(0.0, 0.0, 40.0), Some(3));
        assert!(graph.link(tower, annex));
        assert!(graph.link(far, far_child));
        graph.finalize();

        let mut context = DrawContext::default();
        graph.draw(Mat4::IDENTITY, &meshes, &materials, &mut context);
        assert_eq!((context.opaque.len(), context.transparent.len()), (10, 3));

        let viewproj = scene_data(Mat4::IDENTITY, vk::Extent2D { width: 1600, height: 900 }).viewproj;
        let mut draws = DrawLog::default();
        let stats = dispatch(&context, viewproj, &mut draws);

        let (opaque, transparent) = (MaterialId(0), MaterialId(1));
        assert_eq!(
            draws.0,
            vec![
                (10, 0, opaque),
                (10, 6, opaque),
                (20, 0, opaque),
                (30, 0, opaque),
                (30, 3, transparent),
                (40, 30, transparent),
                (40, 30, transparent),
            ]
        );
        assert_eq!(stats, DrawStats { drawcall_count: 7, triangle_count: (6 + 9 + 12 + 3 + 6 + 3 + 3) / 3 });
    }

    #[test]
    fn surfaces_with_unknown_materials_are_skipped() {
        let materials = [material(0, MaterialPass::Opaque)];
        let meshes = [mesh(10, vec![surface(0, 3, 4)])];

        let mut graph = SceneGraph::default();
        graph.add_node("root", Mat4::IDENTITY, Some(0));
        graph.add_node("dangling", Mat4::IDENTITY, Some(9));
        graph.finalize();

        let mut context = DrawContext::default();
        graph.draw(Mat4::IDENTITY, &meshes, &materials, &mut context);
        assert!(context.is_empty());
    }
}
