use ash::vk;

/// Sort identity of a material; unique per renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialPass {
    Opaque,
    Transparent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaterialPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

#[derive(Clone, Copy, Debug)]
pub struct MaterialInstance {
    pub id: MaterialId,
    pub pipeline: MaterialPipeline,
    pub set: vk::DescriptorSet,
    pub pass: MaterialPass,
}

impl PartialEq for MaterialInstance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
