/// Growable descriptor allocator for transient descriptor sets
///
/// Sets are carved out of fixed-size pools. When the current pool runs dry
/// it is retired and a fresh one (recycled or newly created) takes over, so
/// callers never see pool exhaustion. Sets are never freed one by one:
/// `clean_up` resets every pool in bulk, typically once per frame.

use crate::error::{Error, Result};
use crate::device::backend::{AllocationError, Backend};
use crate::device::handles::{DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle};
use crate::pipeline::descriptor::{DescriptorPoolDesc, DescriptorType};

/// Sets per pool created by the allocator
pub const SETS_PER_POOL: u32 = 1000;

/// Descriptors of each type reserved per set
pub const POOL_RATIOS: [(DescriptorType, f32); DescriptorType::COUNT] = [
    (DescriptorType::Sampler, 0.5),
    (DescriptorType::CombinedImageSampler, 4.0),
    (DescriptorType::SampledImage, 4.0),
    (DescriptorType::StorageImage, 1.0),
    (DescriptorType::UniformTexelBuffer, 1.0),
    (DescriptorType::StorageTexelBuffer, 1.0),
    (DescriptorType::UniformBuffer, 2.0),
    (DescriptorType::StorageBuffer, 2.0),
    (DescriptorType::UniformBufferDynamic, 1.0),
    (DescriptorType::StorageBufferDynamic, 1.0),
    (DescriptorType::InputAttachment, 0.5),
];

/// Pool description sized for `sets` sets following `POOL_RATIOS`
pub fn pool_desc(sets: u32) -> DescriptorPoolDesc {
    DescriptorPoolDesc {
        max_sets: sets,
        pool_sizes: POOL_RATIOS
            .iter()
            .map(|(ty, ratio)| (*ty, (ratio * sets as f32).ceil() as u32))
            .collect(),
    }
}

/// Pool bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorAllocatorStats {
    /// Pools created over the allocator's lifetime
    pub pools_created: u32,
    /// Pools holding live sets (retired ones plus the current one)
    pub pools_in_use: usize,
    /// Reset pools waiting to be reused
    pub pools_free: usize,
    /// Sets handed out since the last `clean_up`
    pub sets_allocated: u64,
}

pub struct DescriptorAllocator {
    sets_per_pool: u32,
    current: Option<DescriptorPoolHandle>,
    used: Vec<DescriptorPoolHandle>,
    free: Vec<DescriptorPoolHandle>,
    pools_created: u32,
    sets_allocated: u64,
}

impl Default for DescriptorAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorAllocator {
    pub fn new() -> Self {
        Self::with_sets_per_pool(SETS_PER_POOL)
    }

    /// Allocator whose pools hold `sets_per_pool` sets
    pub fn with_sets_per_pool(sets_per_pool: u32) -> Self {
        Self {
            sets_per_pool: sets_per_pool.max(1),
            current: None,
            used: Vec::new(),
            free: Vec::new(),
            pools_created: 0,
            sets_allocated: 0,
        }
    }

    /// Recycled pool if any, otherwise a new one
    fn grab_pool(&mut self, backend: &mut dyn Backend) -> Result<DescriptorPoolHandle> {
        if let Some(pool) = self.free.pop() {
            return Ok(pool);
        }
        let pool = backend.create_descriptor_pool(&pool_desc(self.sets_per_pool))?;
        self.pools_created += 1;
        crate::engine_debug!(
            "nova::DescriptorAllocator",
            "Descriptor pool #{} created ({} sets)",
            self.pools_created,
            self.sets_per_pool
        );
        Ok(pool)
    }

    /// Allocate one set of `layout`
    ///
    /// # Errors
    ///
    /// `OutOfMemory` when even a fresh pool cannot hold the set. Other
    /// backend errors are returned unchanged.
    pub fn allocate(&mut self, backend: &mut dyn Backend, layout: DescriptorSetLayoutHandle) -> Result<DescriptorSetHandle> {
        let pool = match self.current {
            Some(pool) => pool,
            None => {
                let pool = self.grab_pool(backend)?;
                self.current = Some(pool);
                pool
            }
        };

        match backend.allocate_descriptor_set(pool, layout) {
            Ok(set) => {
                self.sets_allocated += 1;
                return Ok(set);
            }
            Err(AllocationError::OutOfPoolMemory) | Err(AllocationError::FragmentedPool) => {}
            Err(AllocationError::Other(e)) => return Err(e),
        }

        // retire the exhausted pool and retry once
        self.used.push(pool);
        self.current = None;
        let fresh = self.grab_pool(backend)?;
        self.current = Some(fresh);

        match backend.allocate_descriptor_set(fresh, layout) {
            Ok(set) => {
                self.sets_allocated += 1;
                Ok(set)
            }
            Err(AllocationError::Other(e)) => Err(e),
            Err(err) => {
                crate::engine_error!(
                    "nova::DescriptorAllocator",
                    "Descriptor set does not fit a fresh pool: {:?}",
                    err
                );
                Err(Error::OutOfMemory)
            }
        }
    }

    /// Reset every pool in bulk and make them all reusable
    ///
    /// Every set handed out so far becomes invalid. A pool that fails to
    /// reset stays in use (and is still released by `destroy`); the first
    /// failure is returned once every pool has been tried.
    pub fn clean_up(&mut self, backend: &mut dyn Backend) -> Result<()> {
        if let Some(pool) = self.current.take() {
            self.used.push(pool);
        }
        let mut first_error = None;
        let mut failed = Vec::new();
        for pool in self.used.drain(..) {
            match backend.reset_descriptor_pool(pool) {
                Ok(()) => self.free.push(pool),
                Err(err) => {
                    crate::engine_warn!("nova::DescriptorAllocator", "Failed to reset descriptor pool: {:?}", err);
                    failed.push(pool);
                    first_error.get_or_insert(err);
                }
            }
        }
        self.used = failed;
        self.sets_allocated = 0;
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Destroy every pool
    pub fn destroy(&mut self, backend: &mut dyn Backend) {
        let pools = self.current.take().into_iter().chain(self.used.drain(..)).chain(self.free.drain(..));
        for pool in pools {
            backend.destroy_descriptor_pool(pool);
        }
        self.sets_allocated = 0;
    }

    pub fn stats(&self) -> DescriptorAllocatorStats {
        DescriptorAllocatorStats {
            pools_created: self.pools_created,
            pools_in_use: self.used.len() + self.current.iter().count(),
            pools_free: self.free.len(),
            sets_allocated: self.sets_allocated,
        }
    }
}

#[cfg(test)]
#[path = "descriptor_allocator_tests.rs"]
mod tests;
