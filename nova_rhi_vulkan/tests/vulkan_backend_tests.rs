//! Integration tests for the Vulkan backend
//!
//! These tests drive the public nova API against a real device through one
//! shared hidden window. All tests require a GPU and are marked with #[ignore].
//!
//! Run with: cargo test --test vulkan_backend_tests -- --ignored

mod gpu_test_utils;

use gpu_test_utils::get_test_factory;
use nova_rhi::nova::command::BufferCopy;
use nova_rhi::nova::device::*;
use nova_rhi::nova::pipeline::*;
use nova_rhi::nova::resource::{
    BufferCreateInfo, BufferType, ImageDesc, ImageShape, ImageUpdateInfo, ImageViewDesc, ImageViewType,
};
use nova_rhi::nova::FrameSync;
use nova_rhi_vulkan::VulkanBackend;
use serial_test::serial;

// ============================================================================
// DEVICE
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_factory_init() {
    let factory = get_test_factory();
    let factory = factory.lock().unwrap();

    assert_eq!(factory.config().backend, BackendKind::Vulkan);
    assert!(factory.backend_as::<VulkanBackend>().is_some());
    assert!(!factory.adapter_info().name.is_empty());

    let swapchain = factory.swapchain();
    assert!(swapchain.image_count() >= 2);
    assert!(factory.config().surface_formats.contains(&swapchain.format()));
    assert!(swapchain.width() > 0 && swapchain.height() > 0);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_fence_wait_and_timeout() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();

    let unsignaled = factory.create_fence(false).unwrap();
    assert!(!factory.fence_signaled(unsignaled).unwrap());
    assert!(!factory.wait_for_fence_timeout(unsignaled, 1_000).unwrap());

    let signaled = factory.create_fence(true).unwrap();
    assert!(factory.wait_for_fence_timeout(signaled, 1_000).unwrap());
    factory.reset_fence(signaled).unwrap();
    assert!(!factory.fence_signaled(signaled).unwrap());

    factory.destroy_fence(unsignaled);
    factory.destroy_fence(signaled);
}

// ============================================================================
// BUFFERS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_static_buffer_round_trip() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();

    let values: Vec<u32> = (0..64).collect();
    let buffer = factory
        .resources()
        .create_buffer_from(BufferType::Uniform, &values, true)
        .unwrap();

    let data = factory.backend().read_buffer(buffer, 0, 256).unwrap();
    assert_eq!(data, bytemuck::cast_slice::<u32, u8>(&values));

    factory.resources().update_buffer_with(buffer, 16, &[0xdead_beefu32]).unwrap();
    let patched = factory.backend().read_buffer(buffer, 16, 4).unwrap();
    assert_eq!(patched, 0xdead_beefu32.to_ne_bytes());

    factory.resources().destroy_buffer(buffer);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_device_local_buffer_copy() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();

    let values: Vec<u32> = (0..32).map(|i| i * 3).collect();
    let (device_local, mut cmd, pool) = {
        let mut resources = factory.resources();
        let buffer = resources.create_buffer_from(BufferType::Storage, &values, false).unwrap();
        let pool = resources.create_command_pool(QueueRole::Graphics).unwrap();
        let cmd = resources.allocate_command_buffer(pool).unwrap();
        (buffer, cmd, pool)
    };

    // device-local memory is not mappable
    assert!(factory.backend().read_buffer(device_local, 0, 4).is_err());

    let readback = factory
        .backend_mut()
        .create_buffer(&BufferCreateInfo {
            size: 128,
            usage: BufferUsage::TRANSFER_DST,
            location: MemoryLocation::HostVisible,
        })
        .unwrap();

    cmd.begin().unwrap();
    cmd.copy_buffer(device_local, readback, &[BufferCopy { src_offset: 0, dst_offset: 0, size: 128 }])
        .unwrap();
    cmd.end().unwrap();
    let fence = factory.create_fence(false).unwrap();
    factory
        .submit(&mut cmd, &SubmitInfo { fence: Some(fence), ..SubmitInfo::default() })
        .unwrap();
    factory.wait_for_fence(fence).unwrap();

    let data = factory.backend().read_buffer(readback, 0, 128).unwrap();
    assert_eq!(data, bytemuck::cast_slice::<u32, u8>(&values));

    factory.destroy_fence(fence);
    factory.backend_mut().destroy_buffer(readback);
    let mut resources = factory.resources();
    resources.free_command_buffer(cmd);
    resources.destroy_command_pool(pool);
    resources.destroy_buffer(device_local);
}

// ============================================================================
// IMAGES
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_image_upload_and_readback() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();
    let mut resources = factory.resources();

    let image = resources
        .create_image(&ImageDesc {
            width: 16,
            height: 16,
            format: Format::R8G8B8A8_UNORM,
            mip_levels: 1,
            usage: ImageUsage::SAMPLED,
            shape: ImageShape::Tex2D,
        })
        .unwrap();

    let texels: Vec<u8> = (0..16 * 16 * 4).map(|i| (i % 251) as u8).collect();
    resources
        .update_image(
            image,
            &ImageUpdateInfo {
                offset: Offset3D::default(),
                extent: Extent3D::new(16, 16, 1),
                mip_level: 0,
                layer: 0,
                data: &texels,
            },
        )
        .unwrap();
    assert_eq!(resources.image(image).unwrap().state(), ImageState::ShaderRead);

    let read = resources.read_image(image, 0, 0).unwrap();
    assert_eq!(read, texels);
    assert_eq!(resources.image(image).unwrap().state(), ImageState::ShaderRead);

    resources.destroy_image(image);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_generate_mipmap() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();
    let mut resources = factory.resources();

    let image = resources
        .create_image(&ImageDesc {
            width: 64,
            height: 64,
            mip_levels: 0,
            ..ImageDesc::default()
        })
        .unwrap();
    assert_eq!(resources.image(image).unwrap().mip_levels(), 7);

    // a flat color survives every linear downsample
    let texels = vec![200u8; 64 * 64 * 4];
    resources
        .update_image(
            image,
            &ImageUpdateInfo {
                offset: Offset3D::default(),
                extent: Extent3D::new(64, 64, 1),
                mip_level: 0,
                layer: 0,
                data: &texels,
            },
        )
        .unwrap();
    resources.generate_mipmap(image, 7).unwrap();

    let smallest = resources.read_image(image, 6, 0).unwrap();
    assert_eq!(smallest.len(), 4);
    assert!(smallest.iter().all(|&b| b == 200));

    resources.destroy_image(image);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_cube_views() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();
    let mut resources = factory.resources();

    let cube = resources
        .create_image(&ImageDesc {
            width: 8,
            height: 8,
            format: Format::R8G8B8A8_UNORM,
            mip_levels: 1,
            usage: ImageUsage::SAMPLED,
            shape: ImageShape::Cube,
        })
        .unwrap();
    assert_eq!(resources.image(cube).unwrap().array_layers(), 6);

    // one 2D view per face
    let faces: Vec<ImageViewHandle> = (0..6)
        .map(|face| {
            resources
                .create_image_view(
                    cube,
                    &ImageViewDesc {
                        view_type: ImageViewType::Tex2D,
                        range: SubresourceRange::single(0, face),
                    },
                )
                .unwrap()
        })
        .collect();
    for face in faces {
        resources.destroy_image_view(face).unwrap();
    }

    resources.destroy_image(cube);
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_descriptor_writes() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();

    let (uniform, texture_view) = {
        let mut resources = factory.resources();
        let uniform = resources.create_buffer(BufferType::Uniform, None, 256, true).unwrap();
        let texture = resources
            .create_image(&ImageDesc { width: 4, height: 4, ..ImageDesc::default() })
            .unwrap();
        (uniform, resources.image(texture).unwrap().view())
    };

    let mut pipelines = factory.pipelines();
    let sampler = pipelines.create_sampler(&SamplerDesc::default()).unwrap();
    let layout = pipelines
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc {
            bindings: vec![
                DescriptorBinding {
                    binding: 0,
                    descriptor_type: DescriptorType::UniformBuffer,
                    count: 1,
                    stages: ShaderStageFlags::ALL_GRAPHICS,
                },
                DescriptorBinding {
                    binding: 1,
                    descriptor_type: DescriptorType::CombinedImageSampler,
                    count: 2,
                    stages: ShaderStageFlags::FRAGMENT,
                },
            ],
        })
        .unwrap();
    let pool = pipelines
        .create_descriptor_pool(&DescriptorPoolDesc {
            max_sets: 1,
            pool_sizes: vec![(DescriptorType::UniformBuffer, 1), (DescriptorType::CombinedImageSampler, 2)],
        })
        .unwrap();

    let set = pipelines.allocate_descriptor_set(pool, layout).unwrap();
    pipelines.bind_buffer(set, 0, 0, uniform, 0, 256).unwrap();
    pipelines.bind_image(set, 1, 1, texture_view, Some(sampler)).unwrap();

    // out-of-range writes are rejected before reaching the driver
    assert!(pipelines.bind_buffer(set, 0, 0, uniform, 128, 256).is_err());
    assert!(pipelines.bind_image(set, 1, 2, texture_view, Some(sampler)).is_err());
    assert!(pipelines.bind_image(set, 1, 0, texture_view, None).is_err());

    // the pool holds exactly one set
    assert!(pipelines.allocate_descriptor_set(pool, layout).is_err());
    pipelines.reset_descriptor_pool(pool).unwrap();
    pipelines.allocate_descriptor_set(pool, layout).unwrap();

    pipelines.destroy_descriptor_pool(pool);
    pipelines.destroy_descriptor_set_layout(layout);
    pipelines.destroy_sampler(sampler);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_transient_sets_grow() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();
    let mut pipelines = factory.pipelines();

    let layout = pipelines
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc {
            bindings: vec![DescriptorBinding {
                binding: 0,
                descriptor_type: DescriptorType::StorageBuffer,
                count: 1,
                stages: ShaderStageFlags::COMPUTE,
            }],
        })
        .unwrap();

    for _ in 0..2000 {
        pipelines.allocate_transient_set(layout).unwrap();
    }
    assert!(pipelines.transient_stats().pools_in_use > 1);

    pipelines.reset_transient_sets().unwrap();
    assert_eq!(pipelines.transient_stats().pools_in_use, 0);
    pipelines.destroy_descriptor_set_layout(layout);
}

// ============================================================================
// SWAPCHAIN
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_present_frames() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();

    let mut sync = FrameSync::new(&mut factory, 2).unwrap();
    let (pool, mut cmd) = {
        let mut resources = factory.resources();
        let pool = resources.create_command_pool(QueueRole::Graphics).unwrap();
        let cmd = resources.allocate_command_buffer(pool).unwrap();
        (pool, cmd)
    };

    let mut presented = 0;
    for _ in 0..4 {
        let Some(frame) = sync.begin_frame(&mut factory).unwrap() else {
            let extent = factory.swapchain().extent();
            factory.recreate_swapchain(extent.width, extent.height).unwrap();
            continue;
        };
        let image = factory.swapchain().images()[frame.image_index as usize].image;

        cmd.begin().unwrap();
        cmd.image_barrier(image, SubresourceRange::single(0, 0), ImageState::Undefined, ImageState::Present)
            .unwrap();
        cmd.end().unwrap();

        if sync.end_frame(&mut factory, &frame, &mut cmd).unwrap() == PresentOutcome::Presented {
            presented += 1;
        }
    }
    assert!(presented > 0);
    assert!(sync.frame_counter() >= presented);

    sync.destroy(&mut factory).unwrap();
    let mut resources = factory.resources();
    resources.free_command_buffer(cmd);
    resources.destroy_command_pool(pool);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_recreate_swapchain() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();

    let old_views: Vec<ImageViewHandle> = factory.swapchain().images().iter().map(|i| i.view).collect();

    factory.recreate_swapchain(640, 480).unwrap();

    let swapchain = factory.swapchain();
    assert!(swapchain.image_count() >= 2);
    assert!(swapchain.width() > 0 && swapchain.height() > 0);
    for image in swapchain.images() {
        assert!(!old_views.contains(&image.view));
    }

    // back to the original size for the other tests
    factory
        .recreate_swapchain(gpu_test_utils::TEST_WIDTH, gpu_test_utils::TEST_HEIGHT)
        .unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_swapchain_image_not_destroyable() {
    let factory = get_test_factory();
    let mut factory = factory.lock().unwrap();

    let image = factory.swapchain().images()[0].image;
    factory.backend_mut().destroy_image(image);

    // still present and usable for a frame
    let backend = factory.backend_as::<VulkanBackend>().unwrap();
    assert!(backend.native_image(image).is_some());
}
