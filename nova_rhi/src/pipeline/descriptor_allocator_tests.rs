//! Unit tests for the growable descriptor allocator.

use crate::device::backend::{Backend, BackendInit};
use crate::device::config::Config;
use crate::device::handles::DescriptorSetLayoutHandle;
use crate::device::null::NullBackend;
use crate::device::types::{BufferUsage, MemoryLocation, ShaderStageFlags};
use crate::error::Error;
use crate::pipeline::*;
use crate::resource::BufferCreateInfo;

fn backend_with(config: Config) -> NullBackend {
    NullBackend::new(&BackendInit { config: &config, window: None, width: 64, height: 64 }).unwrap()
}

fn uniform_layout(backend: &mut NullBackend, count: u32) -> DescriptorSetLayoutHandle {
    backend
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc {
            bindings: vec![DescriptorBinding {
                binding: 0,
                descriptor_type: DescriptorType::UniformBuffer,
                count,
                stages: ShaderStageFlags::VERTEX,
            }],
        })
        .unwrap()
}

#[test]
fn test_pool_desc_follows_ratios() {
    let desc = pool_desc(SETS_PER_POOL);
    assert_eq!(desc.max_sets, 1000);
    assert_eq!(desc.pool_sizes.len(), DescriptorType::COUNT);
    assert!(desc.pool_sizes.contains(&(DescriptorType::Sampler, 500)));
    assert!(desc.pool_sizes.contains(&(DescriptorType::CombinedImageSampler, 4000)));
    assert!(desc.pool_sizes.contains(&(DescriptorType::UniformBuffer, 2000)));
    assert!(desc.pool_sizes.contains(&(DescriptorType::InputAttachment, 500)));

    // fractional ratios round up
    let small = pool_desc(3);
    assert!(small.pool_sizes.contains(&(DescriptorType::Sampler, 2)));
}

#[test]
fn test_first_allocation_creates_one_pool() {
    let mut backend = backend_with(Config::default());
    let layout = uniform_layout(&mut backend, 1);
    let mut allocator = DescriptorAllocator::new();

    for _ in 0..50 {
        allocator.allocate(&mut backend, layout).unwrap();
    }
    let stats = allocator.stats();
    assert_eq!(stats.pools_created, 1);
    assert_eq!(stats.pools_in_use, 1);
    assert_eq!(stats.sets_allocated, 50);
}

#[test]
fn test_overflow_acquires_new_pool_and_keeps_sets() {
    let mut backend = backend_with(Config::default());
    let layout = uniform_layout(&mut backend, 1);
    let buffer = backend
        .create_buffer(&BufferCreateInfo {
            size: 64,
            usage: BufferUsage::UNIFORM,
            location: MemoryLocation::HostVisible,
        })
        .unwrap();
    let mut allocator = DescriptorAllocator::with_sets_per_pool(4);

    let sets: Vec<_> = (0..10).map(|_| allocator.allocate(&mut backend, layout).unwrap()).collect();

    let stats = allocator.stats();
    assert_eq!(stats.pools_created, 3);
    assert_eq!(stats.pools_in_use, 3);
    assert_eq!(backend.live_descriptor_pool_count(), 3);

    // sets from the retired pools are still valid
    for set in sets {
        backend
            .write_descriptor(&DescriptorWrite {
                set,
                binding: 0,
                array_element: 0,
                resource: DescriptorResource::Buffer { buffer, offset: 0, range: 64 },
            })
            .unwrap();
    }
}

#[test]
fn test_fragmented_pool_is_retried() {
    let mut config = Config::default();
    config.null_device.report_fragmentation = true;
    let mut backend = backend_with(config);
    let layout = uniform_layout(&mut backend, 1);
    let mut allocator = DescriptorAllocator::with_sets_per_pool(2);

    for _ in 0..5 {
        allocator.allocate(&mut backend, layout).unwrap();
    }
    assert_eq!(allocator.stats().pools_created, 3);
}

#[test]
fn test_clean_up_recycles_pools() {
    let mut backend = backend_with(Config::default());
    let layout = uniform_layout(&mut backend, 1);
    let mut allocator = DescriptorAllocator::with_sets_per_pool(4);

    for _ in 0..6 {
        allocator.allocate(&mut backend, layout).unwrap();
    }
    assert_eq!(allocator.stats().pools_created, 2);

    allocator.clean_up(&mut backend).unwrap();
    let stats = allocator.stats();
    assert_eq!(stats.pools_in_use, 0);
    assert_eq!(stats.pools_free, 2);
    assert_eq!(stats.sets_allocated, 0);

    for _ in 0..8 {
        allocator.allocate(&mut backend, layout).unwrap();
    }
    let stats = allocator.stats();
    assert_eq!(stats.pools_created, 2);
    assert_eq!(stats.pools_free, 0);
    assert_eq!(backend.stats().descriptor_pools_created, 2);
}

#[test]
fn test_clean_up_keeps_going_after_a_failed_reset() {
    let mut backend = backend_with(Config::default());
    let layout = uniform_layout(&mut backend, 1);
    let mut allocator = DescriptorAllocator::with_sets_per_pool(2);

    for _ in 0..5 {
        allocator.allocate(&mut backend, layout).unwrap();
    }
    assert_eq!(allocator.stats().pools_created, 3);

    // the first retired pool disappears behind the allocator's back
    let broken = allocator.used[0];
    backend.destroy_descriptor_pool(broken);

    let result = allocator.clean_up(&mut backend);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
    let stats = allocator.stats();
    assert_eq!(stats.pools_free, 2);
    assert_eq!(stats.pools_in_use, 1);
    assert_eq!(stats.sets_allocated, 0);

    allocator.destroy(&mut backend);
    assert_eq!(backend.live_descriptor_pool_count(), 0);
    assert_eq!(allocator.stats().pools_in_use + allocator.stats().pools_free, 0);
}

#[test]
fn test_set_larger_than_a_pool_is_out_of_memory() {
    let mut backend = backend_with(Config::default());
    // a pool of 4 sets holds 8 uniform buffers
    let layout = uniform_layout(&mut backend, 9);
    let mut allocator = DescriptorAllocator::with_sets_per_pool(4);

    assert_eq!(allocator.allocate(&mut backend, layout), Err(Error::OutOfMemory));
    assert_eq!(allocator.stats().pools_created, 2);
}

#[test]
fn test_other_errors_propagate() {
    let mut backend = backend_with(Config::default());
    let mut allocator = DescriptorAllocator::new();

    let result = allocator.allocate(&mut backend, DescriptorSetLayoutHandle::default());
    assert!(matches!(result, Err(Error::InvalidResource(_))));
    assert_eq!(allocator.stats().pools_created, 1);
}

#[test]
fn test_destroy_releases_every_pool() {
    let mut backend = backend_with(Config::default());
    let layout = uniform_layout(&mut backend, 1);
    let mut allocator = DescriptorAllocator::with_sets_per_pool(2);

    for _ in 0..5 {
        allocator.allocate(&mut backend, layout).unwrap();
    }
    allocator.clean_up(&mut backend).unwrap();
    allocator.allocate(&mut backend, layout).unwrap();

    allocator.destroy(&mut backend);
    assert_eq!(backend.live_descriptor_pool_count(), 0);
    assert_eq!(allocator.stats().pools_in_use + allocator.stats().pools_free, 0);
}
