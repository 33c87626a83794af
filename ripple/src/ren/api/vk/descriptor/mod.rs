use crate::error::{Check, Result};

use ash::{Device as DeviceHandle, vk};

pub struct DescriptorSetLayoutBuilder<'a> {
    pub bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self { bindings: vec![] }
    }
}

impl DescriptorSetLayoutBuilder<'_> {
    pub fn add_binding(mut self, binding: u32, descriptor_type: vk::DescriptorType) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_count(1)
                .descriptor_type(descriptor_type),
        );
        self
    }

    pub fn build(
        mut self,
        device_handle: &DeviceHandle,
        shader_stages: vk::ShaderStageFlags,
    ) -> Result<vk::DescriptorSetLayout> {
        self.bindings
            .iter_mut()
            .for_each(|binding| binding.stage_flags |= shader_stages);

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        unsafe {
            device_handle
                .create_descriptor_set_layout(&create_info, None)
                .check("ripple::ren::vk::descriptor - failed to Create Descriptor Set Layout")
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DescriptorSetPoolSizeRatio {
    pub ty: vk::DescriptorType,
    pub ratio: f32,
}

impl DescriptorSetPoolSizeRatio {
    pub const fn new(ty: vk::DescriptorType, ratio: f32) -> Self {
        Self { ty, ratio }
    }
}

pub const MAX_SETS_PER_POOL: u32 = 4092;

/// Size of the pool created after one of `sets_per_pool` sets ran out.
pub fn next_pool_size(sets_per_pool: u32) -> u32 {
    ((sets_per_pool as f32 * 1.5) as u32).min(MAX_SETS_PER_POOL)
}

fn pool_sizes(max_sets: u32, pool_ratios: &[DescriptorSetPoolSizeRatio]) -> Vec<vk::DescriptorPoolSize> {
    pool_ratios
        .iter()
        .map(|pool_ratio| {
            vk::DescriptorPoolSize::default()
                .ty(pool_ratio.ty)
                .descriptor_count((pool_ratio.ratio * max_sets as f32) as u32)
        })
        .collect()
}

fn create_pool(
    device_handle: &DeviceHandle,
    max_sets: u32,
    pool_ratios: &[DescriptorSetPoolSizeRatio],
) -> Result<vk::DescriptorPool> {
    let pool_sizes = pool_sizes(max_sets, pool_ratios);
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(max_sets)
        .pool_sizes(&pool_sizes);

    unsafe {
        device_handle
            .create_descriptor_pool(&create_info, None)
            .check("ripple::ren::vk::descriptor - failed to Create Descriptor Pool")
    }
}

/// Hands out descriptor sets from a list of pools, adding larger pools as the full ones run dry.
pub struct DescriptorAllocatorGrowable {
    ratios: Vec<DescriptorSetPoolSizeRatio>,
    full_pools: Vec<vk::DescriptorPool>,
    ready_pools: Vec<vk::DescriptorPool>,
    sets_per_pool: u32,
}

impl DescriptorAllocatorGrowable {
    pub fn new(
        device_handle: &DeviceHandle,
        initial_sets: u32,
        pool_ratios: &[DescriptorSetPoolSizeRatio],
    ) -> Result<Self> {
        let pool = create_pool(device_handle, initial_sets, pool_ratios)?;
        Ok(Self {
            ratios: pool_ratios.to_vec(),
            full_pools: vec![],
            ready_pools: vec![pool],
            sets_per_pool: next_pool_size(initial_sets),
        })
    }

    fn get_pool(&mut self, device_handle: &DeviceHandle) -> Result<vk::DescriptorPool> {
        if let Some(pool) = self.ready_pools.pop() {
            return Ok(pool);
        }
        let pool = create_pool(device_handle, self.sets_per_pool, &self.ratios)?;
        log::debug!("ripple::ren::vk::descriptor - growing to a pool of {} sets", self.sets_per_pool);
        self.sets_per_pool = next_pool_size(self.sets_per_pool);
        Ok(pool)
    }

    pub fn allocate(
        &mut self,
        device_handle: &DeviceHandle,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        let mut pool = self.get_pool(device_handle)?;

        let allocate = |pool: vk::DescriptorPool| {
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);
            unsafe { device_handle.allocate_descriptor_sets(&allocate_info) }
        };

        let sets = match allocate(pool) {
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.full_pools.push(pool);
                pool = self.get_pool(device_handle)?;
                allocate(pool)
            }
            result => result,
        }
        .check("ripple::ren::vk::descriptor - failed to Allocate Descriptor Set")?;

        self.ready_pools.push(pool);
        Ok(sets[0])
    }

    /// Resets every pool; all sets handed out so far become invalid.
    pub fn clear_pools(&mut self, device_handle: &DeviceHandle) -> Result<()> {
        self.ready_pools.append(&mut self.full_pools);
        for &pool in &self.ready_pools {
            unsafe {
                device_handle
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
                    .check("ripple::ren::vk::descriptor - failed to Reset Descriptor Pool")?
            };
        }
        Ok(())
    }

    pub fn destroy(&mut self, device_handle: &DeviceHandle) {
        self.ready_pools
            .drain(..)
            .chain(self.full_pools.drain(..))
            .for_each(|pool| unsafe { device_handle.destroy_descriptor_pool(pool, None) });
    }
}

/// Accumulates descriptor writes and flushes them into a set in one call.
#[derive(Default)]
pub struct DescriptorWriter {
    image_writes: Vec<(u32, vk::DescriptorType, vk::DescriptorImageInfo)>,
    buffer_writes: Vec<(u32, vk::DescriptorType, vk::DescriptorBufferInfo)>,
}

impl DescriptorWriter {
    pub fn write_image(
        &mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        let info = vk::DescriptorImageInfo::default()
            .sampler(sampler)
            .image_view(view)
            .image_layout(layout);
        self.image_writes.push((binding, ty, info));
        self
    }

    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        let info = vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(offset)
            .range(size);
        self.buffer_writes.push((binding, ty, info));
        self
    }

    pub fn clear(&mut self) {
        self.image_writes.clear();
        self.buffer_writes.clear();
    }

    pub fn update_set(&self, device_handle: &DeviceHandle, set: vk::DescriptorSet) {
        let image_writes = self.image_writes.iter().map(|(binding, ty, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(*ty)
                .image_info(std::slice::from_ref(info))
        });
        let buffer_writes = self.buffer_writes.iter().map(|(binding, ty, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(*ty)
                .buffer_info(std::slice::from_ref(info))
        });
        let writes: Vec<_> = image_writes.chain(buffer_writes).collect();

        unsafe { device_handle.update_descriptor_sets(&writes, &[]) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_grow_by_half_up_to_cap() {
        assert_eq!(next_pool_size(1000), 1500);
        assert_eq!(next_pool_size(10), 15);

        let mut size = 10;
        for _ in 0..32 {
            size = next_pool_size(size);
        }
        assert_eq!(size, MAX_SETS_PER_POOL);
    }

    #[test]
    fn pool_sizes_scale_with_ratio() {
        let ratios = [
            DescriptorSetPoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
            DescriptorSetPoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 0.5),
        ];
        let sizes = pool_sizes(10, &ratios);
        assert_eq!(sizes[0].descriptor_count, 30);
        assert_eq!(sizes[1].descriptor_count, 5);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }

    #[test]
    fn writer_collects_and_clears() {
        let mut writer = DescriptorWriter::default();
        writer
            .write_buffer(0, vk::Buffer::null(), 256, 512, vk::DescriptorType::UNIFORM_BUFFER)
            .write_image(
                1,
                vk::ImageView::null(),
                vk::Sampler::null(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            );
        assert_eq!(writer.buffer_writes.len(), 1);
        assert_eq!(writer.buffer_writes[0].2.offset, 512);
        assert_eq!(writer.image_writes[0].0, 1);

        writer.clear();
        assert!(writer.buffer_writes.is_empty() && writer.image_writes.is_empty());
    }
}
