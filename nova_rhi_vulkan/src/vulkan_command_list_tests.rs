//! Unit tests for copy and blit region translation

use super::*;
use nova_rhi::nova::device::Offset3D;

#[test]
fn test_buffer_image_copy_region() {
    let region = BufferImageCopy {
        buffer_offset: 256,
        mip_level: 2,
        base_layer: 3,
        layer_count: 1,
        image_offset: Offset3D { x: 4, y: 8, z: 0 },
        image_extent: Extent3D::new(16, 16, 1),
    };
    let copy = buffer_image_copy(Format::R8G8B8A8_SRGB, &region);

    assert_eq!(copy.buffer_offset, 256);
    assert_eq!(copy.buffer_row_length, 0);
    assert_eq!(copy.image_subresource.aspect_mask, vk::ImageAspectFlags::COLOR);
    assert_eq!(copy.image_subresource.mip_level, 2);
    assert_eq!(copy.image_subresource.base_array_layer, 3);
    assert_eq!(copy.image_offset.x, 4);
    assert_eq!(copy.image_offset.y, 8);
    assert_eq!(copy.image_extent.width, 16);
}

#[test]
fn test_depth_copy_uses_depth_aspect() {
    let region = BufferImageCopy {
        buffer_offset: 0,
        mip_level: 0,
        base_layer: 0,
        layer_count: 1,
        image_offset: Offset3D::default(),
        image_extent: Extent3D::new(4, 4, 1),
    };
    let copy = buffer_image_copy(Format::D24_UNORM_S8_UINT, &region);
    assert_eq!(copy.image_subresource.aspect_mask, vk::ImageAspectFlags::DEPTH);
}

#[test]
fn test_mip_blit_region() {
    let region = ImageBlit {
        src_mip: 0,
        dst_mip: 1,
        base_layer: 0,
        layer_count: 6,
        src_extent: Extent3D::new(64, 64, 1),
        dst_extent: Extent3D::new(32, 32, 1),
    };
    let blit = image_blit(Format::R8G8B8A8_UNORM, &region);

    assert_eq!(blit.src_subresource.mip_level, 0);
    assert_eq!(blit.dst_subresource.mip_level, 1);
    assert_eq!(blit.src_subresource.layer_count, 6);
    assert_eq!(blit.src_offsets[0], vk::Offset3D::default());
    assert_eq!(blit.src_offsets[1], vk::Offset3D { x: 64, y: 64, z: 1 });
    assert_eq!(blit.dst_offsets[1], vk::Offset3D { x: 32, y: 32, z: 1 });
}
