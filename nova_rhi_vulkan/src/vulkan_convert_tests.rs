//! Unit tests for Vulkan conversion functions
//!
//! Pure mappings only, no GPU required.

use super::*;

// ============================================================================
// FORMAT TESTS
// ============================================================================

const ALL_FORMATS: [Format; 16] = [
    Format::R8_UNORM,
    Format::R8G8_UNORM,
    Format::R8G8B8A8_UNORM,
    Format::R8G8B8A8_SRGB,
    Format::B8G8R8A8_UNORM,
    Format::B8G8R8A8_SRGB,
    Format::R16G16B16A16_SFLOAT,
    Format::R32_SFLOAT,
    Format::R32G32_SFLOAT,
    Format::R32G32B32_SFLOAT,
    Format::R32G32B32A32_SFLOAT,
    Format::R32_UINT,
    Format::D16_UNORM,
    Format::D32_SFLOAT,
    Format::D24_UNORM_S8_UINT,
    Format::D32_SFLOAT_S8_UINT,
];

#[test]
fn test_every_format_maps_back() {
    for format in ALL_FORMATS {
        assert_eq!(vk_format_to_format(format_to_vk(format)), Some(format));
    }
}

#[test]
fn test_swapchain_formats() {
    assert_eq!(format_to_vk(Format::B8G8R8A8_SRGB), vk::Format::B8G8R8A8_SRGB);
    assert_eq!(format_to_vk(Format::D32_SFLOAT), vk::Format::D32_SFLOAT);
    assert_eq!(vk_format_to_format(vk::Format::A2B10G10R10_UNORM_PACK32), None);
}

#[test]
fn test_aspect_masks() {
    assert_eq!(aspect_mask(Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
    assert_eq!(aspect_mask(Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
    assert_eq!(
        aspect_mask(Format::D24_UNORM_S8_UINT),
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
    // sampled views of depth/stencil images only expose depth
    assert_eq!(view_aspect_mask(Format::D32_SFLOAT_S8_UINT), vk::ImageAspectFlags::DEPTH);
}

#[test]
fn test_subresource_range() {
    let range = subresource_range_to_vk(Format::R8G8B8A8_SRGB, &SubresourceRange::single(2, 4));
    assert_eq!(range.base_mip_level, 2);
    assert_eq!(range.level_count, 1);
    assert_eq!(range.base_array_layer, 4);
    assert_eq!(range.layer_count, 1);
}

// ============================================================================
// IMAGE STATE TESTS
// ============================================================================

#[test]
fn test_image_state_layouts() {
    assert_eq!(image_state_to_layout(ImageState::Undefined), vk::ImageLayout::UNDEFINED);
    assert_eq!(image_state_to_layout(ImageState::ShaderRead), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(image_state_to_layout(ImageState::Present), vk::ImageLayout::PRESENT_SRC_KHR);
    assert_eq!(image_state_to_layout(ImageState::TransferDst), vk::ImageLayout::TRANSFER_DST_OPTIMAL);
}

#[test]
fn test_barrier_stages() {
    assert_eq!(image_state_stage(ImageState::Undefined, true), vk::PipelineStageFlags::TOP_OF_PIPE);
    assert_eq!(image_state_stage(ImageState::Present, false), vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    assert_eq!(image_state_stage(ImageState::TransferSrc, true), vk::PipelineStageFlags::TRANSFER);
    assert!(image_state_access(ImageState::Undefined).is_empty());
    assert_eq!(image_state_access(ImageState::TransferDst), vk::AccessFlags::TRANSFER_WRITE);
}

#[test]
fn test_wait_stages() {
    assert_eq!(
        pipeline_stage_to_vk(PipelineStage::ColorAttachmentOutput),
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
    );
    assert_eq!(pipeline_stage_to_vk(PipelineStage::AllCommands), vk::PipelineStageFlags::ALL_COMMANDS);
}

// ============================================================================
// FLAG TESTS
// ============================================================================

#[test]
fn test_usage_flags() {
    let usage = image_usage_to_vk(ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST);
    assert_eq!(usage, vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST);

    let usage = buffer_usage_to_vk(BufferUsage::VERTEX | BufferUsage::TRANSFER_DST);
    assert_eq!(usage, vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST);

    assert_eq!(
        stage_flags_to_vk(ShaderStageFlags::ALL_GRAPHICS),
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    );
}

#[test]
fn test_present_modes_round_trip() {
    for mode in [PresentMode::Fifo, PresentMode::FifoRelaxed, PresentMode::Mailbox, PresentMode::Immediate] {
        assert_eq!(vk_present_mode_to_present_mode(present_mode_to_vk(mode)), Some(mode));
    }
    assert_eq!(vk_present_mode_to_present_mode(vk::PresentModeKHR::SHARED_DEMAND_REFRESH), None);
}

#[test]
fn test_adapter_types() {
    assert_eq!(adapter_type_from_vk(vk::PhysicalDeviceType::DISCRETE_GPU), AdapterType::DiscreteGpu);
    assert_eq!(adapter_type_from_vk(vk::PhysicalDeviceType::CPU), AdapterType::Cpu);
    assert_eq!(adapter_type_from_vk(vk::PhysicalDeviceType::OTHER), AdapterType::Other);
}

#[test]
fn test_queue_family_info() {
    let props = vk::QueueFamilyProperties {
        queue_flags: vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        queue_count: 2,
        ..Default::default()
    };
    let info = queue_family_info(3, &props, false);
    assert_eq!(info.index, 3);
    assert_eq!(info.queue_count, 2);
    assert!(!info.graphics);
    assert!(info.compute);
    assert!(info.transfer);
    assert!(!info.present);
}

// ============================================================================
// PIPELINE STATE TESTS
// ============================================================================

#[test]
fn test_stencil_face() {
    let face = StencilFaceState {
        fail_op: StencilOp::Zero,
        pass_op: StencilOp::Replace,
        reference: 7,
        ..StencilFaceState::default()
    };
    let vk_face = stencil_face_to_vk(&face);
    assert_eq!(vk_face.fail_op, vk::StencilOp::ZERO);
    assert_eq!(vk_face.pass_op, vk::StencilOp::REPLACE);
    assert_eq!(vk_face.depth_fail_op, vk::StencilOp::KEEP);
    assert_eq!(vk_face.compare_op, vk::CompareOp::ALWAYS);
    assert_eq!(vk_face.reference, 7);
}

#[test]
fn test_color_write_mask() {
    assert_eq!(
        color_write_mask_to_vk(&ColorWriteMask::ALL),
        vk::ColorComponentFlags::R | vk::ColorComponentFlags::G | vk::ColorComponentFlags::B | vk::ColorComponentFlags::A
    );
    assert!(color_write_mask_to_vk(&ColorWriteMask::NONE).is_empty());
    let rg = ColorWriteMask { r: true, g: true, b: false, a: false };
    assert_eq!(color_write_mask_to_vk(&rg), vk::ColorComponentFlags::R | vk::ColorComponentFlags::G);
}

#[test]
fn test_fixed_function_enums() {
    assert_eq!(cull_mode_to_vk(CullMode::FrontAndBack), vk::CullModeFlags::FRONT_AND_BACK);
    assert_eq!(front_face_to_vk(FrontFace::Clockwise), vk::FrontFace::CLOCKWISE);
    assert_eq!(polygon_mode_to_vk(PolygonMode::Line), vk::PolygonMode::LINE);
    assert_eq!(topology_to_vk(PrimitiveTopology::TriangleStrip), vk::PrimitiveTopology::TRIANGLE_STRIP);
    assert_eq!(blend_factor_to_vk(BlendFactor::OneMinusSrcAlpha), vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    assert_eq!(blend_op_to_vk(BlendOp::ReverseSubtract), vk::BlendOp::REVERSE_SUBTRACT);
    assert_eq!(sample_count_to_vk(SampleCount::S4), vk::SampleCountFlags::TYPE_4);
    assert_eq!(load_op_to_vk(LoadOp::DontCare), vk::AttachmentLoadOp::DONT_CARE);
    assert_eq!(store_op_to_vk(StoreOp::Store), vk::AttachmentStoreOp::STORE);
}

#[test]
fn test_descriptor_types() {
    for ty in DescriptorType::ALL {
        // the dense index lines up with Vulkan's numbering
        assert_eq!(descriptor_type_to_vk(ty).as_raw(), ty.index() as i32);
    }
}

#[test]
fn test_sampler_enums() {
    assert_eq!(filter_to_vk(Filter::Nearest), vk::Filter::NEAREST);
    assert_eq!(mipmap_mode_to_vk(MipmapMode::Linear), vk::SamplerMipmapMode::LINEAR);
    assert_eq!(address_mode_to_vk(AddressMode::ClampToBorder), vk::SamplerAddressMode::CLAMP_TO_BORDER);
    assert_eq!(border_color_to_vk(BorderColor::OpaqueWhite), vk::BorderColor::FLOAT_OPAQUE_WHITE);
}

#[test]
fn test_clear_values() {
    let color = clear_value_to_vk(&ClearValue::Color([0.25, 0.5, 0.75, 1.0]));
    // SAFETY: written as the color variant
    assert_eq!(unsafe { color.color.float32 }, [0.25, 0.5, 0.75, 1.0]);

    let depth = clear_value_to_vk(&ClearValue::DepthStencil { depth: 1.0, stencil: 3 });
    let depth_stencil = unsafe { depth.depth_stencil };
    assert_eq!(depth_stencil.depth, 1.0);
    assert_eq!(depth_stencil.stencil, 3);

    assert_eq!(index_type_to_vk(IndexType::U16), vk::IndexType::UINT16);
}
