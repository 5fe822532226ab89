/// Descriptor set layouts, pools, sets and writes
///
/// Pools are created without FREE_DESCRIPTOR_SET: sets live until their
/// pool is reset or destroyed, which also drops their handles here.

use ash::vk;
use nova_rhi::nova::device::{AllocationError, DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle};
use nova_rhi::nova::pipeline::{
    DescriptorPoolDesc, DescriptorResource, DescriptorSetLayoutDesc, DescriptorType, DescriptorWrite,
};
use nova_rhi::nova::{Error, Result};

use crate::vulkan_backend::{lookup, vk_err, VulkanBackend, VulkanDescriptorPool, VulkanDescriptorSet, VulkanSetLayout};
use crate::vulkan_convert::{descriptor_type_to_vk, stage_flags_to_vk};

impl VulkanBackend {
    pub(crate) fn build_set_layout(&mut self, desc: &DescriptorSetLayoutDesc) -> Result<DescriptorSetLayoutHandle> {
        for (i, binding) in desc.bindings.iter().enumerate() {
            if desc.bindings[..i].iter().any(|b| b.binding == binding.binding) {
                return Err(Error::InvalidResource(format!(
                    "Binding {} declared twice",
                    binding.binding
                )));
            }
        }

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(descriptor_type_to_vk(b.descriptor_type))
                    .descriptor_count(b.count)
                    .stage_flags(stage_flags_to_vk(b.stages))
            })
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe {
            self.ctx
                .device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(|e| vk_err("Failed to create descriptor set layout", e))?
        };
        Ok(self.set_layouts.insert(VulkanSetLayout {
            layout,
            desc: desc.clone(),
        }))
    }

    pub(crate) fn build_descriptor_pool(&mut self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        // Merge duplicate entries, drop empty ones
        let mut counts = [0u32; DescriptorType::COUNT];
        for (ty, count) in &desc.pool_sizes {
            counts[ty.index()] += count;
        }
        let pool_sizes: Vec<vk::DescriptorPoolSize> = DescriptorType::ALL
            .iter()
            .filter(|ty| counts[ty.index()] > 0)
            .map(|ty| vk::DescriptorPoolSize {
                ty: descriptor_type_to_vk(*ty),
                descriptor_count: counts[ty.index()],
            })
            .collect();
        if pool_sizes.is_empty() || desc.max_sets == 0 {
            return Err(Error::InvalidResource(
                "Descriptor pool needs at least one set and one descriptor".to_string(),
            ));
        }

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(desc.max_sets);
        let pool = unsafe {
            self.ctx
                .device
                .create_descriptor_pool(&pool_info, None)
                .map_err(|e| vk_err("Failed to create descriptor pool", e))?
        };
        Ok(self.pools.insert(VulkanDescriptorPool {
            pool,
            sets: Vec::new(),
        }))
    }

    pub(crate) fn reset_pool(&mut self, pool: DescriptorPoolHandle) -> Result<()> {
        let native = self
            .pools
            .get_mut(pool)
            .ok_or_else(|| Error::InvalidResource("Unknown descriptor pool".to_string()))?;
        unsafe {
            self.ctx
                .device
                .reset_descriptor_pool(native.pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(|e| vk_err("Failed to reset descriptor pool", e))?;
        }
        for set in native.sets.drain(..) {
            self.sets.remove(set);
        }
        Ok(())
    }

    pub(crate) fn allocate_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> std::result::Result<DescriptorSetHandle, AllocationError> {
        let native_layout = lookup(&self.set_layouts, layout, "set layout")
            .map_err(AllocationError::Other)?
            .layout;
        let native_pool = lookup(&self.pools, pool, "descriptor pool")
            .map_err(AllocationError::Other)?
            .pool;

        let layouts = [native_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(native_pool)
            .set_layouts(&layouts);
        let result = unsafe { self.ctx.device.allocate_descriptor_sets(&alloc_info) };
        let set = match result {
            Ok(sets) => match sets.first() {
                Some(set) => *set,
                None => {
                    return Err(AllocationError::Other(Error::BackendError(
                        "Driver returned no descriptor set".to_string(),
                    )))
                }
            },
            // Exhaustion is an expected outcome, the allocator retries in a new pool
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => return Err(AllocationError::OutOfPoolMemory),
            Err(vk::Result::ERROR_FRAGMENTED_POOL) => return Err(AllocationError::FragmentedPool),
            Err(e) => return Err(AllocationError::Other(vk_err("Failed to allocate descriptor set", e))),
        };

        let handle = self.sets.insert(VulkanDescriptorSet { set, layout });
        if let Some(native) = self.pools.get_mut(pool) {
            native.sets.push(handle);
        }
        Ok(handle)
    }

    pub(crate) fn update_descriptor(&mut self, write: &DescriptorWrite) -> Result<()> {
        let set = self
            .sets
            .get(write.set)
            .ok_or_else(|| Error::InvalidResource("Write to an unknown or reset descriptor set".to_string()))?;
        let layout = self
            .set_layouts
            .get(set.layout)
            .ok_or_else(|| Error::InvalidResource("Descriptor set layout was destroyed".to_string()))?;
        let Some(binding) = layout.desc.binding(write.binding) else {
            return Err(Error::InvalidResource(format!("Layout has no binding {}", write.binding)));
        };
        if write.array_element >= binding.count {
            return Err(Error::InvalidResource(format!(
                "Array element {} out of range for binding {} (count {})",
                write.array_element, write.binding, binding.count
            )));
        }
        let ty = binding.descriptor_type;
        let mismatch = || {
            Error::InvalidResource(format!(
                "Resource does not match binding {} of type {:?}",
                write.binding, ty
            ))
        };

        let mut buffer_info = [vk::DescriptorBufferInfo::default()];
        let mut image_info = [vk::DescriptorImageInfo::default()];
        let mut vk_write = vk::WriteDescriptorSet::default()
            .dst_set(set.set)
            .dst_binding(write.binding)
            .dst_array_element(write.array_element)
            .descriptor_type(descriptor_type_to_vk(ty));

        match (&write.resource, ty) {
            (DescriptorResource::Buffer { .. }, DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer) => {
                return Err(Error::InvalidResource(
                    "Texel buffer descriptors are not supported by the Vulkan backend".to_string(),
                ));
            }
            (DescriptorResource::Buffer { buffer, offset, range }, ty) if ty.is_buffer() => {
                let native = lookup(&self.buffers, *buffer, "buffer")?;
                if offset.checked_add(*range).map_or(true, |end| end > native.size) {
                    return Err(Error::InvalidResource("Buffer range exceeds buffer size".to_string()));
                }
                buffer_info[0] = vk::DescriptorBufferInfo {
                    buffer: native.buffer,
                    offset: *offset,
                    range: *range,
                };
                vk_write = vk_write.buffer_info(&buffer_info);
            }
            (DescriptorResource::Image { view, sampler }, ty) => {
                let native_view = lookup(&self.views, *view, "image view")?.view;
                let native_sampler = match sampler {
                    Some(sampler) => *lookup(&self.samplers, *sampler, "sampler")?,
                    None => vk::Sampler::null(),
                };
                let (image_view, sampler) = match ty {
                    DescriptorType::CombinedImageSampler if sampler.is_some() => (native_view, native_sampler),
                    DescriptorType::SampledImage | DescriptorType::InputAttachment => (native_view, vk::Sampler::null()),
                    _ => return Err(mismatch()),
                };
                image_info[0] = vk::DescriptorImageInfo {
                    sampler,
                    image_view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                };
                vk_write = vk_write.image_info(&image_info);
            }
            (DescriptorResource::StorageImage { view }, DescriptorType::StorageImage) => {
                image_info[0] = vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: lookup(&self.views, *view, "image view")?.view,
                    image_layout: vk::ImageLayout::GENERAL,
                };
                vk_write = vk_write.image_info(&image_info);
            }
            _ => return Err(mismatch()),
        }

        unsafe { self.ctx.device.update_descriptor_sets(&[vk_write], &[]) };
        Ok(())
    }
}
