use ash::vk::{self, Handle};
use glam::{Mat4, Vec3};
use ripple::ren::{
    draw::{self, Bounds, DrawContext, DrawRecorder, DrawStats, RenderObject},
    material::{MaterialId, MaterialInstance, MaterialPass, MaterialPipeline},
};

fn material(id: u32, pipeline: u64, pass: MaterialPass) -> MaterialInstance {
    MaterialInstance {
        id: MaterialId(id),
        pipeline: MaterialPipeline {
            pipeline: vk::Pipeline::from_raw(pipeline),
            layout: vk::PipelineLayout::from_raw(pipeline + 100),
        },
        set: vk::DescriptorSet::from_raw(1000 + id as u64),
        pass,
    }
}

fn object(material: &MaterialInstance, index_buffer: u64, index_count: u32, position: Vec3) -> RenderObject<'_> {
    RenderObject {
        index_count,
        first_index: 0,
        index_buffer: vk::Buffer::from_raw(index_buffer),
        material,
        bounds: Bounds::from_points([Vec3::splat(-1.0), Vec3::splat(1.0)]),
        transform: Mat4::from_translation(position),
        vertex_buffer_address: index_buffer << 8,
    }
}

fn viewproj() -> Mat4 {
    let eye = Vec3::new(0.0, 0.0, 5.0);
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
    let mut projection = Mat4::perspective_rh(45f32.to_radians(), 1700.0 / 900.0, 10000.0, 0.1);
    projection.y_axis.y *= -1.0;
    projection * view
}

#[derive(Debug, PartialEq)]
enum Command {
    Pipeline(u64),
    Material(u32),
    IndexBuffer(u64),
    Draw { material: u32, index_buffer: u64, index_count: u32 },
}

#[derive(Default)]
struct CommandLog(Vec<Command>);

impl CommandLog {
    fn draws(&self) -> Vec<(u32, u64)> {
        self.0
            .iter()
            .filter_map(|command| match command {
                Command::Draw { material, index_buffer, .. } => Some((*material, *index_buffer)),
                _ => None,
            })
            .collect()
    }
}

impl DrawRecorder for CommandLog {
    fn bind_pipeline(&mut self, pipeline: &MaterialPipeline) {
        self.0.push(Command::Pipeline(pipeline.pipeline.as_raw()));
    }

    fn bind_material(&mut self, material: &MaterialInstance) {
        self.0.push(Command::Material(material.id.0));
    }

    fn bind_index_buffer(&mut self, index_buffer: vk::Buffer) {
        self.0.push(Command::IndexBuffer(index_buffer.as_raw()));
    }

    fn draw(&mut self, object: &RenderObject) {
        self.0.push(Command::Draw {
            material: object.material.id.0,
            index_buffer: object.index_buffer.as_raw(),
            index_count: object.index_count,
        });
    }
}

#[test]
fn frame_draws_visible_opaque_sorted_then_transparent() {
    let stone = material(0, 1, MaterialPass::Opaque);
    let metal = material(1, 1, MaterialPass::Opaque);
    let glass = material(2, 2, MaterialPass::Transparent);

    let behind = Vec3::new(0.0, 0.0, 50.0);
    let beside = Vec3::new(400.0, 0.0, -10.0);

    let mut context = DrawContext::default();
    context.push(object(&metal, 20, 3, Vec3::new(-1.0, 0.0, -5.0)));
    context.push(object(&stone, 11, 6, Vec3::new(1.0, 0.0, -5.0)));
    context.push(object(&stone, 10, 9, Vec3::new(0.0, 1.0, -8.0)));
    context.push(object(&metal, 10, 12, Vec3::new(0.0, -1.0, -8.0)));
    for index in 0..6 {
        let material = if index % 2 == 0 { &stone } else { &metal };
        let position = if index < 3 { behind } else { beside };
        context.push(object(material, 30 + index, 300, position));
    }
    context.push(object(&glass, 40, 3, Vec3::ZERO));
    context.push(object(&glass, 41, 3, behind));
    context.push(object(&glass, 40, 6, Vec3::new(0.0, 0.0, -3.0)));
    assert_eq!((context.opaque.len(), context.transparent.len()), (10, 3));

    let mut commands = CommandLog::default();
    let stats = draw::dispatch(&context, viewproj(), &mut commands);

    assert_eq!(commands.draws(), vec![(0, 10), (0, 11), (1, 10), (1, 20), (2, 40), (2, 41), (2, 40)]);
    assert_eq!(stats, DrawStats { drawcall_count: 7, triangle_count: (9 + 6 + 12 + 3 + 3 + 3 + 6) / 3 });
}

#[test]
fn bindings_follow_state_changes() {
    let stone = material(0, 1, MaterialPass::Opaque);
    let metal = material(1, 1, MaterialPass::Opaque);
    let glass = material(2, 2, MaterialPass::Transparent);
    let in_view = Vec3::new(0.0, 0.0, -5.0);

    let mut context = DrawContext::default();
    context.push(object(&metal, 10, 3, in_view));
    context.push(object(&stone, 10, 3, in_view));
    context.push(object(&glass, 10, 3, in_view));

    let mut commands = CommandLog::default();
    draw::dispatch(&context, viewproj(), &mut commands);

    assert_eq!(
        commands.0,
        vec![
            Command::Pipeline(1),
            Command::Material(0),
            Command::IndexBuffer(10),
            Command::Draw { material: 0, index_buffer: 10, index_count: 3 },
            Command::Material(1),
            Command::Draw { material: 1, index_buffer: 10, index_count: 3 },
            Command::Pipeline(2),
            Command::Material(2),
            Command::Draw { material: 2, index_buffer: 10, index_count: 3 },
        ]
    );
}

#[test]
fn empty_frame_records_nothing() {
    let mut commands = CommandLog::default();
    let stats = draw::dispatch(&DrawContext::default(), viewproj(), &mut commands);
    assert_eq!(stats, DrawStats::default());
    assert!(commands.0.is_empty());
}
