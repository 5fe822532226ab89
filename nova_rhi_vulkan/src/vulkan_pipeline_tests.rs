//! Unit tests for render pass and blend state translation
//!
//! These only build Vulkan structs, no device required.

use super::*;
use nova_rhi::nova::device::{Format, SampleCount};
use nova_rhi::nova::pipeline::{
    AttachmentFinalLayout, ColorAttachmentDesc, DepthAttachmentDesc, LoadOp, RenderTargetDesc,
    ResolveAttachmentDesc, StoreOp,
};

fn color(format: Format, samples: SampleCount, final_layout: AttachmentFinalLayout) -> ColorAttachmentDesc {
    ColorAttachmentDesc {
        format,
        samples,
        load_op: LoadOp::Clear,
        store_op: StoreOp::Store,
        final_layout,
    }
}

fn depth() -> DepthAttachmentDesc {
    DepthAttachmentDesc {
        format: Format::D32_SFLOAT,
        samples: SampleCount::S1,
        depth_load_op: LoadOp::Clear,
        depth_store_op: StoreOp::DontCare,
        stencil_load_op: LoadOp::DontCare,
        stencil_store_op: StoreOp::DontCare,
        final_layout: AttachmentFinalLayout::AttachmentOptimal,
    }
}

fn resolve() -> ResolveAttachmentDesc {
    ResolveAttachmentDesc {
        format: Format::B8G8R8A8_SRGB,
        samples: SampleCount::S1,
        final_layout: AttachmentFinalLayout::Present,
    }
}

// ============================================================================
// RENDER PASS
// ============================================================================

#[test]
fn test_present_target_descriptions() {
    let layout = RenderTargetLayout::build(&RenderTargetDesc {
        colors: vec![color(Format::B8G8R8A8_SRGB, SampleCount::S1, AttachmentFinalLayout::Present)],
        depth: Some(depth()),
        resolves: Vec::new(),
    })
    .unwrap();

    let descriptions = attachment_descriptions(&layout);
    assert_eq!(descriptions.len(), 2);

    assert_eq!(descriptions[0].format, vk::Format::B8G8R8A8_SRGB);
    assert_eq!(descriptions[0].load_op, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(descriptions[0].initial_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(descriptions[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

    assert_eq!(descriptions[1].format, vk::Format::D32_SFLOAT);
    assert_eq!(descriptions[1].store_op, vk::AttachmentStoreOp::DONT_CARE);
    assert_eq!(descriptions[1].final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
}

#[test]
fn test_subpass_refs_follow_layout_order() {
    let layout = RenderTargetLayout::build(&RenderTargetDesc {
        colors: vec![color(Format::R8G8B8A8_UNORM, SampleCount::S1, AttachmentFinalLayout::ShaderRead)],
        depth: Some(depth()),
        resolves: Vec::new(),
    })
    .unwrap();

    let refs = subpass_refs(&layout);
    assert_eq!(refs.colors.len(), 1);
    assert_eq!(refs.colors[0].attachment, 0);
    assert_eq!(refs.colors[0].layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    let depth_ref = refs.depth.unwrap();
    assert_eq!(depth_ref.attachment, 1);
    assert_eq!(depth_ref.layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    assert!(refs.resolves.is_empty());
}

#[test]
fn test_resolves_padded_to_color_count() {
    let layout = RenderTargetLayout::build(&RenderTargetDesc {
        colors: vec![
            color(Format::B8G8R8A8_SRGB, SampleCount::S4, AttachmentFinalLayout::AttachmentOptimal),
            color(Format::R16G16B16A16_SFLOAT, SampleCount::S4, AttachmentFinalLayout::AttachmentOptimal),
        ],
        depth: None,
        resolves: vec![resolve()],
    })
    .unwrap();

    let refs = subpass_refs(&layout);
    assert_eq!(refs.resolves.len(), 2);
    // colors 0-1, then the resolve of color 0
    assert_eq!(refs.resolves[0].attachment, 2);
    assert_eq!(refs.resolves[1].attachment, vk::ATTACHMENT_UNUSED);

    let descriptions = attachment_descriptions(&layout);
    assert_eq!(descriptions[0].samples, vk::SampleCountFlags::TYPE_4);
    assert_eq!(descriptions[2].samples, vk::SampleCountFlags::TYPE_1);
    assert_eq!(descriptions[2].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
}

#[test]
fn test_subpass_dependencies() {
    let [incoming, outgoing] = subpass_dependencies();
    assert_eq!(incoming.src_subpass, vk::SUBPASS_EXTERNAL);
    assert_eq!(incoming.dst_subpass, 0);
    assert!(incoming.dst_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    assert_eq!(outgoing.src_subpass, 0);
    assert_eq!(outgoing.dst_subpass, vk::SUBPASS_EXTERNAL);
    assert_eq!(outgoing.dst_access_mask, vk::AccessFlags::SHADER_READ);
}

// ============================================================================
// BLEND STATE
// ============================================================================

#[test]
fn test_single_blend_state_broadcast() {
    let attachments = color_blend_attachments(&[ColorBlendState::alpha_blending()], 3).unwrap();
    assert_eq!(attachments.len(), 3);
    for attachment in &attachments {
        assert_eq!(attachment.blend_enable, vk::TRUE);
        assert_eq!(attachment.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(attachment.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    }
}

#[test]
fn test_blend_state_per_attachment() {
    let states = [ColorBlendState::default(), ColorBlendState::alpha_blending()];
    let attachments = color_blend_attachments(&states, 2).unwrap();
    assert_eq!(attachments[0].blend_enable, vk::FALSE);
    assert_eq!(attachments[1].blend_enable, vk::TRUE);
}

#[test]
fn test_blend_state_count_mismatch() {
    let states = [ColorBlendState::default(), ColorBlendState::default()];
    assert!(color_blend_attachments(&states, 3).is_err());
    // depth-only targets take no blend state
    assert!(color_blend_attachments(&[], 0).unwrap().is_empty());
}
