//! Per-frame draw collection: frustum culling, opaque sorting and binding-minimal dispatch.

use super::{
    frame::FrameOutcome,
    material::{MaterialId, MaterialInstance, MaterialPass, MaterialPipeline},
};

use ash::vk;
use glam::{Mat4, Vec3, Vec4};

/// Axis-aligned box in mesh space plus the radius of its bounding sphere.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub origin: Vec3,
    pub extents: Vec3,
    pub sphere_radius: f32,
}

impl Bounds {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::default();
        };
        let (min, max) = points.fold((first, first), |(min, max), point| (min.min(point), max.max(point)));
        let extents = (max - min) / 2.0;
        Self { origin: (max + min) / 2.0, extents, sphere_radius: extents.length() }
    }
}

/// A single indexed draw, valid for the frame it was collected in.
#[derive(Clone, Copy, Debug)]
pub struct RenderObject<'m> {
    pub index_count: u32,
    pub first_index: u32,
    pub index_buffer: vk::Buffer,
    pub material: &'m MaterialInstance,
    pub bounds: Bounds,
    pub transform: Mat4,
    pub vertex_buffer_address: vk::DeviceAddress,
}

#[derive(Default)]
pub struct DrawContext<'m> {
    pub opaque: Vec<RenderObject<'m>>,
    pub transparent: Vec<RenderObject<'m>>,
}

impl<'m> DrawContext<'m> {
    pub fn push(&mut self, object: RenderObject<'m>) {
        match object.material.pass {
            MaterialPass::Opaque => self.opaque.push(object),
            MaterialPass::Transparent => self.transparent.push(object),
        }
    }

    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
    }
}

const CORNERS: [Vec3; 8] = [
    Vec3::new(1.0, 1.0, 1.0),
    Vec3::new(1.0, 1.0, -1.0),
    Vec3::new(1.0, -1.0, 1.0),
    Vec3::new(1.0, -1.0, -1.0),
    Vec3::new(-1.0, 1.0, 1.0),
    Vec3::new(-1.0, 1.0, -1.0),
    Vec3::new(-1.0, -1.0, 1.0),
    Vec3::new(-1.0, -1.0, -1.0),
];

/// False only when the projected hull of the object's bounds lies entirely outside
/// one side of the clip volume (x, y in [-1, 1], z in [0, 1]).
pub fn is_visible(object: &RenderObject, viewproj: Mat4) -> bool {
    let matrix = viewproj * object.transform;
    let Bounds { origin, extents, .. } = object.bounds;

    let (min, max) = CORNERS.iter().fold(
        (Vec3::splat(1.5), Vec3::splat(-1.5)),
        |(min, max), corner| {
            let v = matrix * Vec4::from((origin + *corner * extents, 1.0));
            let projected = v.truncate() / v.w;
            (min.min(projected), max.max(projected))
        },
    );

    !(min.z > 1.0 || max.z < 0.0 || min.x > 1.0 || max.x < -1.0 || min.y > 1.0 || max.y < -1.0)
}

fn sort_key(object: &RenderObject) -> (MaterialId, vk::Buffer) {
    (object.material.id, object.index_buffer)
}

/// Indices of the visible opaque objects, stably ordered by material then index buffer.
pub fn visible_opaque_order(opaque: &[RenderObject], viewproj: Mat4) -> Vec<usize> {
    let mut order: Vec<usize> = opaque
        .iter()
        .enumerate()
        .filter(|(_, object)| is_visible(object, viewproj))
        .map(|(index, _)| index)
        .collect();
    order.sort_by_key(|&index| sort_key(&opaque[index]));
    order
}

/// Command sink for [`dispatch`].
pub trait DrawRecorder {
    fn bind_pipeline(&mut self, pipeline: &MaterialPipeline);
    fn bind_material(&mut self, material: &MaterialInstance);
    fn bind_index_buffer(&mut self, index_buffer: vk::Buffer);
    fn draw(&mut self, object: &RenderObject);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub drawcall_count: u32,
    pub triangle_count: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RendererStats {
    /// Milliseconds between the last two frames.
    pub frametime: f32,
    pub drawcall_count: u32,
    pub triangle_count: u32,
    /// Milliseconds spent recording the geometry pass.
    pub mesh_draw_time: f32,
}

impl RendererStats {
    /// Zeroes the geometry counters when the frame recorded nothing.
    pub fn settle(&mut self, outcome: FrameOutcome) {
        if outcome != FrameOutcome::Presented {
            self.drawcall_count = 0;
            self.triangle_count = 0;
            self.mesh_draw_time = 0.0;
        }
    }
}

#[derive(Default)]
struct BindState {
    pipeline: Option<MaterialPipeline>,
    material: Option<MaterialId>,
    index_buffer: Option<vk::Buffer>,
}

/// Culls and sorts the opaque objects, then records them followed by the transparent
/// objects in submission order. Transparent objects are neither culled nor depth sorted.
pub fn dispatch<R: DrawRecorder>(context: &DrawContext, viewproj: Mat4, recorder: &mut R) -> DrawStats {
    let order = visible_opaque_order(&context.opaque, viewproj);

    let mut state = BindState::default();
    let mut stats = DrawStats::default();

    let objects = order
        .iter()
        .map(|&index| &context.opaque[index])
        .chain(context.transparent.iter());

    for object in objects {
        let material = object.material;
        if state.material != Some(material.id) {
            state.material = Some(material.id);
            if state.pipeline != Some(material.pipeline) {
                state.pipeline = Some(material.pipeline);
                recorder.bind_pipeline(&material.pipeline);
            }
            recorder.bind_material(material);
        }
        if state.index_buffer != Some(object.index_buffer) {
            state.index_buffer = Some(object.index_buffer);
            recorder.bind_index_buffer(object.index_buffer);
        }

        recorder.draw(object);
        stats.drawcall_count += 1;
        stats.triangle_count += object.index_count / 3;
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn material(id: u32, pipeline: u64, pass: MaterialPass) -> MaterialInstance {
        MaterialInstance {
            id: MaterialId(id),
            pipeline: MaterialPipeline {
                pipeline: vk::Pipeline::from_raw(pipeline),
                layout: vk::PipelineLayout::from_raw(1),
            },
            set: vk::DescriptorSet::from_raw(100 + id as u64),
            pass,
        }
    }

    fn object(material: &MaterialInstance, index_buffer: u64, position: Vec3) -> RenderObject<'_> {
        RenderObject {
            index_count: 36,
            first_index: 0,
            index_buffer: vk::Buffer::from_raw(index_buffer),
            material,
            bounds: Bounds { origin: Vec3::ZERO, extents: Vec3::ONE, sphere_radius: 3f32.sqrt() },
            transform: Mat4::from_translation(position),
            vertex_buffer_address: 0,
        }
    }

    // Camera at the origin looking down -Z, reversed depth.
    fn viewproj() -> Mat4 {
        let mut projection = Mat4::perspective_rh(45f32.to_radians(), 16.0 / 9.0, 10000.0, 0.1);
        projection.y_axis.y *= -1.0;
        projection * Mat4::IDENTITY
    }

    #[derive(Default)]
    struct Recorder {
        pipelines: u32,
        materials: Vec<MaterialId>,
        index_buffers: u32,
        draws: Vec<(MaterialId, u64)>,
    }

    impl DrawRecorder for Recorder {
        fn bind_pipeline(&mut self, _pipeline: &MaterialPipeline) {
            self.pipelines += 1;
        }

        fn bind_material(&mut self, material: &MaterialInstance) {
            self.materials.push(material.id);
        }

        fn bind_index_buffer(&mut self, _index_buffer: vk::Buffer) {
            self.index_buffers += 1;
        }

        fn draw(&mut self, object: &RenderObject) {
            self.draws.push((object.material.id, object.index_buffer.as_raw()));
        }
    }

    #[test]
    fn bounds_from_points() {
        let bounds = Bounds::from_points([Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 2.0, 4.0)]);
        assert_eq!(bounds.origin, Vec3::new(1.0, 1.0, 3.0));
        assert_eq!(bounds.extents, Vec3::new(2.0, 1.0, 1.0));
        assert!((bounds.sphere_radius - 6f32.sqrt()).abs() < 1e-6);
        assert_eq!(Bounds::from_points(Vec::<Vec3>::new()), Bounds::default());
    }

    #[test]
    fn objects_in_front_are_visible() {
        let opaque = material(0, 1, MaterialPass::Opaque);
        assert!(is_visible(&object(&opaque, 1, Vec3::new(0.0, 0.0, -5.0)), viewproj()));
        assert!(is_visible(&object(&opaque, 1, Vec3::new(2.0, -1.0, -20.0)), viewproj()));
    }

    #[test]
    fn objects_outside_one_plane_are_culled() {
        let opaque = material(0, 1, MaterialPass::Opaque);
        // behind the camera
        assert!(!is_visible(&object(&opaque, 1, Vec3::new(0.0, 0.0, 10.0)), viewproj()));
        // far to the side
        assert!(!is_visible(&object(&opaque, 1, Vec3::new(500.0, 0.0, -10.0)), viewproj()));
        assert!(!is_visible(&object(&opaque, 1, Vec3::new(0.0, -500.0, -10.0)), viewproj()));
    }

    #[test]
    fn partially_visible_objects_are_kept() {
        let opaque = material(0, 1, MaterialPass::Opaque);
        let mut straddling = object(&opaque, 1, Vec3::new(0.0, 0.0, -5.0));
        straddling.bounds.extents = Vec3::new(100.0, 1.0, 1.0);
        assert!(is_visible(&straddling, viewproj()));
    }

    #[test]
    fn opaque_sort_is_stable_and_total() {
        let a = material(1, 1, MaterialPass::Opaque);
        let b = material(0, 1, MaterialPass::Opaque);
        let in_view = Vec3::new(0.0, 0.0, -10.0);
        let opaque = vec![
            object(&a, 7, in_view),
            object(&b, 9, in_view),
            object(&a, 3, in_view),
            object(&b, 9, in_view),
            object(&a, 7, in_view),
        ];

        let order = visible_opaque_order(&opaque, viewproj());
        assert_eq!(order, vec![1, 3, 2, 0, 4]);
        assert_eq!(visible_opaque_order(&opaque, viewproj()), order);
    }

    #[test]
    fn push_partitions_by_pass() {
        let opaque = material(0, 1, MaterialPass::Opaque);
        let transparent = material(1, 2, MaterialPass::Transparent);
        let mut context = DrawContext::default();
        context.push(object(&transparent, 1, Vec3::ZERO));
        context.push(object(&opaque, 1, Vec3::ZERO));
        context.push(object(&opaque, 2, Vec3::ZERO));
        assert_eq!((context.opaque.len(), context.transparent.len()), (2, 1));

        context.clear();
        assert!(context.is_empty());
    }

    #[test]
    fn frames_without_recording_report_no_geometry() {
        let drawn = RendererStats { frametime: 16.0, drawcall_count: 7, triangle_count: 14, mesh_draw_time: 0.4 };

        let mut stats = drawn;
        stats.settle(FrameOutcome::Presented);
        assert_eq!(stats, drawn);

        for outcome in [FrameOutcome::Aborted, FrameOutcome::Skipped] {
            let mut stats = drawn;
            stats.settle(outcome);
            assert_eq!(stats, RendererStats { frametime: 16.0, ..Default::default() });
        }
    }

    #[test]
    fn dispatch_rebinds_only_on_change() {
        let first = material(0, 1, MaterialPass::Opaque);
        let second = material(1, 1, MaterialPass::Opaque);
        let glass = material(2, 2, MaterialPass::Transparent);
        let in_view = Vec3::new(0.0, 0.0, -10.0);

        let mut context = DrawContext::default();
        context.push(object(&second, 5, in_view));
        context.push(object(&first, 5, in_view));
        context.push(object(&first, 5, in_view));
        context.push(object(&glass, 6, Vec3::new(0.0, 0.0, 10.0)));
        context.push(object(&glass, 5, in_view));

        let mut recorder = Recorder::default();
        let stats = dispatch(&context, viewproj(), &mut recorder);

        assert_eq!(stats, DrawStats { drawcall_count: 5, triangle_count: 60 });
        // opaque materials share a pipeline; the transparent one does not
        assert_eq!(recorder.pipelines, 2);
        assert_eq!(recorder.materials, vec![MaterialId(0), MaterialId(1), MaterialId(2)]);
        // 5 -> 6 -> 5
        assert_eq!(recorder.index_buffers, 3);
        // transparent objects keep submission order and skip culling
        assert_eq!(
            recorder.draws,
            vec![(MaterialId(0), 5), (MaterialId(0), 5), (MaterialId(1), 5), (MaterialId(2), 6), (MaterialId(2), 5)]
        );
    }
}
