//! Unit tests for the resource context, run against the Null backend.

use crate::command::{Command, CommandBufferState};
use crate::device::null::{NullBackend, NullEvent};
use crate::device::{
    Config, Extent3D, Factory, Format, ImageState, ImageUsage, Offset3D, QueueRole, SubresourceRange,
};
use crate::error::Error;
use crate::resource::*;

fn factory() -> Factory {
    Factory::init(Config::default(), None, 64, 64).unwrap()
}

fn null(factory: &Factory) -> &NullBackend {
    factory.backend_as::<NullBackend>().unwrap()
}

fn image_desc(width: u32, height: u32, format: Format, mip_levels: u32) -> ImageDesc {
    ImageDesc {
        width,
        height,
        format,
        mip_levels,
        usage: ImageUsage::SAMPLED,
        shape: ImageShape::Tex2D,
    }
}

fn full_update<'a>(image: &Image, data: &'a [u8]) -> ImageUpdateInfo<'a> {
    ImageUpdateInfo {
        offset: Offset3D::default(),
        extent: Extent3D::new(image.width(), image.height(), 1),
        mip_level: 0,
        layer: 0,
        data,
    }
}

// ===== BUFFERS =====

#[test]
fn test_static_buffer_is_written_directly() {
    let mut factory = factory();
    let buffer = factory
        .resources()
        .create_buffer(BufferType::Vertex, Some(&[1, 2, 3, 4]), 8, true)
        .unwrap();

    let record = factory.resources().buffer(buffer).cloned().unwrap();
    assert!(record.is_static());
    assert!(record.staging().is_none());
    assert_eq!(null(&factory).buffer_data(buffer), Some(&[1u8, 2, 3, 4, 0, 0, 0, 0][..]));
    assert_eq!(null(&factory).stats().submissions, 0);
}

#[test]
fn test_dynamic_buffer_goes_through_staging() {
    let mut factory = factory();
    let buffer = factory
        .resources()
        .create_buffer(BufferType::Uniform, None, 16, false)
        .unwrap();
    factory.backend_as_mut::<NullBackend>().unwrap().clear_events();

    factory.resources().update_buffer(buffer, 4, &[9, 8, 7, 6]).unwrap();

    let backend = null(&factory);
    assert_eq!(&backend.buffer_data(buffer).unwrap()[4..8], &[9, 8, 7, 6]);

    let submissions = backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].role, QueueRole::Graphics);
    assert!(matches!(submissions[0].commands[0], Command::CopyBuffer { .. }));
    assert_eq!(backend.events().last(), Some(&NullEvent::QueueWaitIdle(QueueRole::Graphics)));
}

#[test]
fn test_buffer_size_validation() {
    let mut factory = factory();
    let mut resources = factory.resources();
    assert!(matches!(
        resources.create_buffer(BufferType::Index, None, 0, true),
        Err(Error::InvalidResource(_))
    ));
    assert!(matches!(
        resources.create_buffer(BufferType::Index, Some(&[0; 8]), 4, false),
        Err(Error::InvalidResource(_))
    ));
    assert_eq!(resources.buffer_count(), 0);
}

#[test]
fn test_update_past_end_fails() {
    let mut factory = factory();
    let mut resources = factory.resources();
    let buffer = resources.create_buffer(BufferType::Storage, None, 4, true).unwrap();
    assert!(resources.update_buffer(buffer, 2, &[1, 2, 3]).is_err());
    // offset + length wraps around u64
    assert!(matches!(
        resources.update_buffer(buffer, u64::MAX, &[1, 2, 3, 4]),
        Err(Error::InvalidResource(_))
    ));
}

#[test]
fn test_destroy_buffer_releases_staging() {
    let mut factory = factory();
    let buffer = factory.resources().create_buffer(BufferType::Vertex, None, 4, false).unwrap();
    assert_eq!(null(&factory).live_buffer_count(), 2);
    factory.resources().destroy_buffer(buffer);
    assert_eq!(null(&factory).live_buffer_count(), 0);
}

// ===== IMAGE CREATION =====

#[test]
fn test_zero_mip_levels_means_full_chain() {
    let mut factory = factory();
    let mut resources = factory.resources();
    let image = resources.create_image(&image_desc(256, 64, Format::R8G8B8A8_UNORM, 0)).unwrap();
    let record = resources.image(image).unwrap();
    assert_eq!(record.mip_levels(), 9);
    assert_eq!(record.state(), ImageState::Undefined);
    assert_eq!(record.staging_size(), 256 * 64 * 4);
}

#[test]
fn test_mip_levels_clamped_to_full_chain() {
    let mut factory = factory();
    let mut resources = factory.resources();
    let image = resources.create_image(&image_desc(16, 16, Format::R8_UNORM, 20)).unwrap();
    assert_eq!(resources.image(image).unwrap().mip_levels(), 5);
}

#[test]
fn test_cube_images() {
    let mut factory = factory();
    let mut resources = factory.resources();

    let mut desc = image_desc(8, 4, Format::R8G8B8A8_UNORM, 1);
    desc.shape = ImageShape::Cube;
    assert!(resources.create_image(&desc).is_err());

    desc.height = 8;
    desc.shape = ImageShape::CubeArray { cubes: 2 };
    let image = resources.create_image(&desc).unwrap();
    assert_eq!(resources.image(image).unwrap().array_layers(), 12);
}

#[test]
fn test_destroy_image_releases_views_and_staging() {
    let mut factory = factory();
    let views_before = null(&factory).live_view_count();

    let image = {
        let mut resources = factory.resources();
        let image = resources.create_image(&image_desc(8, 8, Format::R8G8B8A8_UNORM, 0)).unwrap();
        resources
            .create_image_view(
                image,
                &ImageViewDesc {
                    view_type: ImageViewType::Tex2D,
                    range: SubresourceRange::single(1, 0),
                },
            )
            .unwrap();
        image
    };
    assert_eq!(null(&factory).live_view_count(), views_before + 2);

    factory.resources().destroy_image(image);
    assert_eq!(null(&factory).live_view_count(), views_before);
    assert_eq!(null(&factory).live_image_count(), 3);
    assert_eq!(null(&factory).live_buffer_count(), 0);
}

#[test]
fn test_view_outside_image_fails() {
    let mut factory = factory();
    let mut resources = factory.resources();
    let image = resources.create_image(&image_desc(8, 8, Format::R8G8B8A8_UNORM, 1)).unwrap();
    let result = resources.create_image_view(
        image,
        &ImageViewDesc {
            view_type: ImageViewType::Tex2D,
            range: SubresourceRange::single(1, 0),
        },
    );
    assert!(result.is_err());
}

// ===== UPLOADS =====

#[test]
fn test_update_image_round_trip_color() {
    let mut factory = factory();
    let data: Vec<u8> = (0..4 * 4 * 4).map(|i| i as u8).collect();

    let mut resources = factory.resources();
    let image = resources.create_image(&image_desc(4, 4, Format::R8G8B8A8_UNORM, 1)).unwrap();
    let record = resources.image(image).cloned().unwrap();
    resources.update_image(image, &full_update(&record, &data)).unwrap();

    assert_eq!(resources.image(image).unwrap().state(), ImageState::ShaderRead);
    assert_eq!(resources.read_image(image, 0, 0).unwrap(), data);
    assert_eq!(resources.image(image).unwrap().state(), ImageState::ShaderRead);
}

#[test]
fn test_update_image_round_trip_depth() {
    let mut factory = factory();
    let data: Vec<u8> = [0.0f32, 0.25, 0.5, 1.0].iter().flat_map(|d| d.to_le_bytes()).collect();

    let mut resources = factory.resources();
    let mut desc = image_desc(2, 2, Format::D32_SFLOAT, 1);
    desc.usage = ImageUsage::DEPTH_STENCIL_ATTACHMENT | ImageUsage::SAMPLED;
    let image = resources.create_image(&desc).unwrap();
    let record = resources.image(image).cloned().unwrap();
    resources.update_image(image, &full_update(&record, &data)).unwrap();

    assert_eq!(resources.read_image(image, 0, 0).unwrap(), data);
}

#[test]
fn test_update_image_barriers_target_one_subresource() {
    let mut factory = factory();
    let image = {
        let mut resources = factory.resources();
        let mut desc = image_desc(4, 4, Format::R8_UNORM, 1);
        desc.shape = ImageShape::Tex2DArray { layers: 3 };
        let image = resources.create_image(&desc).unwrap();
        resources
            .update_image(
                image,
                &ImageUpdateInfo {
                    offset: Offset3D { x: 1, y: 1, z: 0 },
                    extent: Extent3D::new(2, 2, 1),
                    mip_level: 0,
                    layer: 2,
                    data: &[1, 2, 3, 4],
                },
            )
            .unwrap();
        image
    };

    let backend = null(&factory);
    let barriers = backend.barriers();
    assert_eq!(barriers.len(), 3);
    // first upload moves the whole image out of Undefined
    assert_eq!(barriers[0].range, SubresourceRange::whole(1, 3));
    assert_eq!(barriers[0].old_state, ImageState::Undefined);
    assert_eq!(barriers[0].new_state, ImageState::ShaderRead);
    assert_eq!(barriers[1].range, SubresourceRange::single(0, 2));
    assert_eq!(barriers[1].old_state, ImageState::ShaderRead);
    assert_eq!(barriers[1].new_state, ImageState::TransferDst);
    assert_eq!(barriers[2].range, SubresourceRange::single(0, 2));
    assert_eq!(barriers[2].new_state, ImageState::ShaderRead);
    for layer in 0..3 {
        assert_eq!(backend.image_state(image, 0, layer), Some(ImageState::ShaderRead));
    }

    let texels = backend.image_data(image, 0, 2).unwrap();
    assert_eq!(texels[5], 1);
    assert_eq!(texels[6], 2);
    assert_eq!(texels[9], 3);
    assert_eq!(texels[10], 4);
}

#[test]
fn test_update_image_validation() {
    let mut factory = factory();
    let mut resources = factory.resources();
    let image = resources.create_image(&image_desc(4, 4, Format::R8G8B8A8_UNORM, 1)).unwrap();
    let record = resources.image(image).cloned().unwrap();

    // wrong byte count
    assert!(resources.update_image(image, &full_update(&record, &[0; 10])).is_err());

    // region past the edge
    let outside = ImageUpdateInfo {
        offset: Offset3D { x: 3, y: 0, z: 0 },
        extent: Extent3D::new(2, 1, 1),
        mip_level: 0,
        layer: 0,
        data: &[0; 8],
    };
    assert!(resources.update_image(image, &outside).is_err());

    // offset + extent wraps around u32
    let wrapping = ImageUpdateInfo {
        offset: Offset3D { x: u32::MAX, y: 0, z: 0 },
        extent: Extent3D::new(1, 1, 1),
        mip_level: 0,
        layer: 0,
        data: &[0; 4],
    };
    assert!(matches!(resources.update_image(image, &wrapping), Err(Error::InvalidResource(_))));

    // combined depth-stencil
    let depth_stencil = resources.create_image(&image_desc(2, 2, Format::D24_UNORM_S8_UINT, 1)).unwrap();
    let record = resources.image(depth_stencil).cloned().unwrap();
    assert!(resources.update_image(depth_stencil, &full_update(&record, &[0; 16])).is_err());
}

// ===== MIPMAPS =====

#[test]
fn test_generate_mipmap_blits_every_level() {
    let mut factory = factory();
    let image = {
        let mut resources = factory.resources();
        let image = resources.create_image(&image_desc(16, 8, Format::R8G8B8A8_UNORM, 0)).unwrap();
        let record = resources.image(image).cloned().unwrap();
        resources.update_image(image, &full_update(&record, &[200; 16 * 8 * 4])).unwrap();
        resources.generate_mipmap(image, 5).unwrap();
        assert_eq!(resources.image(image).unwrap().state(), ImageState::ShaderRead);
        image
    };

    let backend = null(&factory);
    let dims: Vec<(u32, u32)> = backend
        .blits()
        .iter()
        .map(|b| (b.dst_extent.width, b.dst_extent.height))
        .collect();
    assert_eq!(dims, vec![(8, 4), (4, 2), (2, 1), (1, 1)]);

    for (i, blit) in backend.blits().iter().enumerate() {
        assert_eq!(blit.src_mip, i as u32);
        assert_eq!(blit.dst_mip, i as u32 + 1);
    }
    // skip the upload's whole-image barrier and its two per-subresource ones
    for barrier in &backend.barriers()[3..] {
        assert_eq!(barrier.range.mip_level_count, 1);
    }
    for mip in 0..5 {
        assert_eq!(backend.image_state(image, mip, 0), Some(ImageState::ShaderRead));
        let extent = backend.image_extent(image, mip).unwrap();
        assert_eq!(extent.width, (16u32 >> mip).max(1));
        assert_eq!(extent.height, (8u32 >> mip).max(1));
    }
    // a uniform level 0 filters down to the same value
    assert_eq!(backend.image_data(image, 4, 0), Some(&[200u8, 200, 200, 200][..]));
}

#[test]
fn test_partial_mip_chain_leaves_whole_image_shader_readable() {
    let mut factory = factory();
    let image = {
        let mut resources = factory.resources();
        let image = resources.create_image(&image_desc(4, 4, Format::R8G8B8A8_UNORM, 0)).unwrap();
        let record = resources.image(image).cloned().unwrap();
        assert_eq!(record.mip_levels(), 3);
        resources.update_image(image, &full_update(&record, &[50; 4 * 4 * 4])).unwrap();
        resources.generate_mipmap(image, 2).unwrap();
        image
    };
    for mip in 0..3 {
        assert_eq!(null(&factory).image_state(image, mip, 0), Some(ImageState::ShaderRead));
    }

    // a whole-image transition from the tracked state is accepted
    factory
        .resources()
        .convert_image_state(image, ImageState::ShaderRead, ImageState::TransferSrc)
        .unwrap();
    assert_eq!(null(&factory).image_state(image, 2, 0), Some(ImageState::TransferSrc));
}

#[test]
fn test_partial_mip_chain_from_undefined() {
    let mut factory = factory();
    let image = {
        let mut resources = factory.resources();
        let image = resources.create_image(&image_desc(8, 8, Format::R8G8B8A8_UNORM, 0)).unwrap();
        resources.generate_mipmap(image, 1).unwrap();
        image
    };

    let backend = null(&factory);
    let barriers = backend.barriers();
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[1].range.base_mip_level, 1);
    assert_eq!(barriers[1].range.mip_level_count, 3);
    for mip in 0..4 {
        assert_eq!(backend.image_state(image, mip, 0), Some(ImageState::ShaderRead));
    }
}

#[test]
fn test_generate_mipmap_single_level() {
    let mut factory = factory();
    let image = {
        let mut resources = factory.resources();
        let image = resources.create_image(&image_desc(4, 4, Format::R8G8B8A8_UNORM, 1)).unwrap();
        resources.generate_mipmap(image, 1).unwrap();
        image
    };
    let backend = null(&factory);
    assert_eq!(backend.barriers().len(), 1);
    assert!(backend.blits().is_empty());
    assert_eq!(backend.image_state(image, 0, 0), Some(ImageState::ShaderRead));
}

#[test]
fn test_generate_mipmap_level_bounds() {
    let mut factory = factory();
    let mut resources = factory.resources();
    let image = resources.create_image(&image_desc(4, 4, Format::R8G8B8A8_UNORM, 0)).unwrap();
    assert!(resources.generate_mipmap(image, 0).is_err());
    assert!(resources.generate_mipmap(image, 4).is_err());
}

// ===== STATE CONVERSION & READBACK =====

#[test]
fn test_convert_image_state_is_idempotent() {
    let mut factory = factory();
    let image = {
        let mut resources = factory.resources();
        let image = resources.create_image(&image_desc(4, 4, Format::R8G8B8A8_UNORM, 0)).unwrap();
        resources
            .convert_image_state(image, ImageState::Undefined, ImageState::General)
            .unwrap();
        resources
            .convert_image_state(image, ImageState::General, ImageState::General)
            .unwrap();
        assert_eq!(resources.image(image).unwrap().state(), ImageState::General);
        image
    };

    let backend = null(&factory);
    assert_eq!(backend.barriers().len(), 1);
    assert_eq!(backend.barriers()[0].range, SubresourceRange::whole(3, 1));
    assert_eq!(backend.image_state(image, 2, 0), Some(ImageState::General));
}

#[test]
fn test_read_undefined_image_fails() {
    let mut factory = factory();
    let mut resources = factory.resources();
    let image = resources.create_image(&image_desc(4, 4, Format::R8G8B8A8_UNORM, 1)).unwrap();
    assert!(matches!(resources.read_image(image, 0, 0), Err(Error::InvalidState(_))));
}

// ===== COMMAND POOLS =====

#[test]
fn test_command_buffers_inherit_pool_role() {
    let mut factory = factory();
    let mut resources = factory.resources();
    let pool = resources.create_command_pool(QueueRole::Compute).unwrap();
    let cmd = resources.allocate_command_buffer(pool).unwrap();
    assert_eq!(cmd.role(), QueueRole::Compute);
    assert_eq!(cmd.pool(), pool);
    assert_eq!(cmd.state(), CommandBufferState::Initial);

    resources.reset_command_pool(pool).unwrap();
    resources.free_command_buffer(cmd);
    resources.destroy_command_pool(pool);
    assert!(resources.reset_command_pool(pool).is_err());
}
