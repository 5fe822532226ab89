/// Pipelines, render passes and frame buffers
///
/// Every graphics pipeline owns the render pass built from its render-target
/// layout. Frame buffers and render pass begins use that same render pass,
/// so a pipeline is always compatible with the frame buffers made for it.

use ash::vk;
use nova_rhi::nova::device::{FrameBufferHandle, PipelineHandle};
use nova_rhi::nova::pipeline::{
    ColorBlendState, FrameBufferDesc, PipelineBindPoint, PipelineDesc, RenderTargetLayout, ShaderStageDesc,
};
use nova_rhi::nova::{Error, Result};
use nova_rhi::{engine_bail, engine_debug, engine_err};
use std::ffi::CString;

use crate::vulkan_backend::{lookup, vk_err, VulkanBackend, VulkanPipeline};
use crate::vulkan_convert::{
    blend_factor_to_vk, blend_op_to_vk, color_write_mask_to_vk, compare_op_to_vk, cull_mode_to_vk,
    format_to_vk, front_face_to_vk, image_state_to_layout, input_rate_to_vk, load_op_to_vk,
    polygon_mode_to_vk, sample_count_to_vk, stage_flags_to_vk, stencil_face_to_vk, store_op_to_vk,
    topology_to_vk,
};

// ============================================================================
// Render pass description
// ============================================================================

/// Attachment references of the single subpass
#[derive(Debug, Clone, Default)]
pub(crate) struct SubpassRefs {
    pub(crate) colors: Vec<vk::AttachmentReference>,
    pub(crate) depth: Option<vk::AttachmentReference>,
    /// Padded with VK_ATTACHMENT_UNUSED to the color count when non-empty
    pub(crate) resolves: Vec<vk::AttachmentReference>,
}

/// One attachment description per slot, in layout order
pub(crate) fn attachment_descriptions(layout: &RenderTargetLayout) -> Vec<vk::AttachmentDescription> {
    layout
        .attachments
        .iter()
        .map(|slot| {
            vk::AttachmentDescription::default()
                .format(format_to_vk(slot.format))
                .samples(sample_count_to_vk(slot.samples))
                .load_op(load_op_to_vk(slot.load_op))
                .store_op(store_op_to_vk(slot.store_op))
                .stencil_load_op(load_op_to_vk(slot.stencil_load_op))
                .stencil_store_op(store_op_to_vk(slot.stencil_store_op))
                .initial_layout(image_state_to_layout(slot.initial_state))
                .final_layout(image_state_to_layout(slot.final_state))
        })
        .collect()
}

pub(crate) fn subpass_refs(layout: &RenderTargetLayout) -> SubpassRefs {
    let colors: Vec<vk::AttachmentReference> = layout
        .color_refs
        .iter()
        .map(|&attachment| vk::AttachmentReference {
            attachment,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        })
        .collect();

    let depth = layout.depth_ref.map(|attachment| vk::AttachmentReference {
        attachment,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    });

    // Resolve i receives color i
    let mut resolves = Vec::new();
    if !layout.resolve_refs.is_empty() {
        resolves = (0..colors.len())
            .map(|i| vk::AttachmentReference {
                attachment: layout
                    .resolve_refs
                    .get(i)
                    .copied()
                    .unwrap_or(vk::ATTACHMENT_UNUSED),
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();
    }

    SubpassRefs { colors, depth, resolves }
}

/// External dependencies: attachment writes wait for prior use, later shader reads wait for the pass
pub(crate) fn subpass_dependencies() -> [vk::SubpassDependency; 2] {
    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let attachment_writes =
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

    [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(attachment_stages)
            .dst_stage_mask(attachment_stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(attachment_writes),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(attachment_stages)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER)
            .src_access_mask(attachment_writes)
            .dst_access_mask(vk::AccessFlags::SHADER_READ),
    ]
}

/// Blend state per color attachment; a single entry is broadcast
pub(crate) fn color_blend_attachments(
    states: &[ColorBlendState],
    color_count: usize,
) -> Result<Vec<vk::PipelineColorBlendAttachmentState>> {
    let per_attachment: Vec<&ColorBlendState> = match states.len() {
        0 if color_count == 0 => Vec::new(),
        1 => vec![&states[0]; color_count],
        n if n == color_count => states.iter().collect(),
        n => {
            return Err(Error::InvalidResource(format!(
                "{} blend states for {} color attachments",
                n, color_count
            )))
        }
    };

    Ok(per_attachment
        .into_iter()
        .map(|state| {
            let mut attachment = vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(color_write_mask_to_vk(&state.color_write_mask))
                .blend_enable(state.blend_enable);
            if state.blend_enable {
                attachment = attachment
                    .src_color_blend_factor(blend_factor_to_vk(state.src_color_factor))
                    .dst_color_blend_factor(blend_factor_to_vk(state.dst_color_factor))
                    .color_blend_op(blend_op_to_vk(state.color_blend_op))
                    .src_alpha_blend_factor(blend_factor_to_vk(state.src_alpha_factor))
                    .dst_alpha_blend_factor(blend_factor_to_vk(state.dst_alpha_factor))
                    .alpha_blend_op(blend_op_to_vk(state.alpha_blend_op));
            }
            attachment
        })
        .collect())
}

// ============================================================================
// Backend operations
// ============================================================================

impl VulkanBackend {
    fn create_render_pass(&self, layout: &RenderTargetLayout) -> Result<vk::RenderPass> {
        let attachments = attachment_descriptions(layout);
        let refs = subpass_refs(layout);
        let dependencies = subpass_dependencies();

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&refs.colors);
        if let Some(depth) = &refs.depth {
            subpass = subpass.depth_stencil_attachment(depth);
        }
        if !refs.resolves.is_empty() {
            subpass = subpass.resolve_attachments(&refs.resolves);
        }
        let subpasses = [subpass];

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        unsafe {
            self.ctx
                .device
                .create_render_pass(&render_pass_info, None)
                .map_err(|e| vk_err("Failed to create render pass", e))
        }
    }

    fn create_shader_module(&self, stage: &ShaderStageDesc) -> Result<vk::ShaderModule> {
        if stage.code.len() % 4 != 0 {
            engine_bail!(
                "nova::vulkan",
                "{:?} shader code not 4-byte aligned (size: {} bytes)",
                stage.stage,
                stage.code.len()
            );
        }
        let words = ash::util::read_spv(&mut std::io::Cursor::new(&stage.code))
            .map_err(|e| engine_err!("nova::vulkan", "Invalid SPIR-V for {:?} stage: {}", stage.stage, e))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        unsafe {
            self.ctx
                .device
                .create_shader_module(&create_info, None)
                .map_err(|e| vk_err("Failed to create shader module", e))
        }
    }

    fn create_pipeline_layout(&self, desc: &PipelineDesc) -> Result<vk::PipelineLayout> {
        let set_layouts = desc
            .descriptor_set_layouts
            .iter()
            .map(|layout| lookup(&self.set_layouts, *layout, "set layout").map(|l| l.layout))
            .collect::<Result<Vec<_>>>()?;

        let push_constant_ranges: Vec<vk::PushConstantRange> = desc
            .push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: stage_flags_to_vk(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        unsafe {
            self.ctx
                .device
                .create_pipeline_layout(&layout_info, None)
                .map_err(|e| vk_err("Failed to create pipeline layout", e))
        }
    }

    /// Create a graphics or compute pipeline
    ///
    /// # Arguments
    ///
    /// * `desc` - Shader stages and fixed-function state
    /// * `target` - Flattened render-target layout (graphics pipelines only)
    pub(crate) fn build_pipeline(
        &mut self,
        desc: &PipelineDesc,
        target: Option<&RenderTargetLayout>,
    ) -> Result<PipelineHandle> {
        let bind_point = desc.bind_point();
        if bind_point == PipelineBindPoint::Graphics && target.is_none() {
            engine_bail!("nova::vulkan", "Graphics pipeline without a render target layout");
        }

        let entry_points = desc
            .shader_stages
            .iter()
            .map(|stage| {
                CString::new(stage.entry_point.as_str()).map_err(|_| {
                    Error::InvalidResource(format!("Entry point '{}' contains a NUL byte", stage.entry_point))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let layout = self.create_pipeline_layout(desc)?;

        let mut modules = Vec::with_capacity(desc.shader_stages.len());
        for stage in &desc.shader_stages {
            match self.create_shader_module(stage) {
                Ok(module) => modules.push(module),
                Err(e) => {
                    self.destroy_partial(&modules, layout, vk::RenderPass::null());
                    return Err(e);
                }
            }
        }
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
            .shader_stages
            .iter()
            .zip(&modules)
            .zip(&entry_points)
            .map(|((stage, module), name)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage_flags_to_vk(stage.stage.flag()))
                    .module(*module)
                    .name(name)
            })
            .collect();

        let built = match target {
            Some(target) if bind_point == PipelineBindPoint::Graphics => {
                self.create_graphics(desc, target, &stages, layout)
            }
            _ => self.create_compute(&stages, layout).map(|p| (p, vk::RenderPass::null())),
        };

        // Modules are no longer needed once the pipeline exists
        for module in &modules {
            unsafe { self.ctx.device.destroy_shader_module(*module, None) };
        }

        let (pipeline, render_pass) = match built {
            Ok(result) => result,
            Err(e) => {
                self.destroy_partial(&[], layout, vk::RenderPass::null());
                return Err(e);
            }
        };

        engine_debug!(
            "nova::vulkan",
            "{:?} pipeline created ({} stages)",
            bind_point,
            desc.shader_stages.len()
        );

        Ok(self.pipelines.insert(VulkanPipeline {
            pipeline,
            layout,
            render_pass,
            bind_point,
            attachment_count: target.map_or(0, |t| t.attachment_count()),
        }))
    }

    fn create_graphics(
        &self,
        desc: &PipelineDesc,
        target: &RenderTargetLayout,
        stages: &[vk::PipelineShaderStageCreateInfo],
        layout: vk::PipelineLayout,
    ) -> Result<(vk::Pipeline, vk::RenderPass)> {
        let blend_attachments = color_blend_attachments(&desc.color_blend, target.color_count())?;
        let render_pass = self.create_render_pass(target)?;

        // Vertex input state
        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex_layout
            .bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: input_rate_to_vk(binding.input_rate),
            })
            .collect();
        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_layout
            .attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.topology))
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = {
            let raster = &desc.rasterization;
            let mut info = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(polygon_mode_to_vk(raster.polygon_mode))
                .line_width(raster.line_width)
                .cull_mode(cull_mode_to_vk(raster.cull_mode))
                .front_face(front_face_to_vk(raster.front_face));
            if let Some(bias) = raster.depth_bias {
                info = info
                    .depth_bias_enable(true)
                    .depth_bias_constant_factor(bias.constant_factor)
                    .depth_bias_slope_factor(bias.slope_factor)
                    .depth_bias_clamp(bias.clamp);
            }
            info
        };

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_stencil.depth_test_enable)
            .depth_write_enable(desc.depth_stencil.depth_write_enable)
            .depth_compare_op(compare_op_to_vk(desc.depth_stencil.depth_compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(desc.depth_stencil.stencil_test_enable)
            .front(stencil_face_to_vk(&desc.depth_stencil.front))
            .back(stencil_face_to_vk(&desc.depth_stencil.back));

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(sample_count_to_vk(desc.multisample.sample_count))
            .alpha_to_coverage_enable(desc.multisample.alpha_to_coverage);

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .depth_stencil_state(&depth_stencil_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let result = unsafe {
            self.ctx
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        match result {
            Ok(pipelines) => match pipelines.first() {
                Some(pipeline) => Ok((*pipeline, render_pass)),
                None => {
                    unsafe { self.ctx.device.destroy_render_pass(render_pass, None) };
                    Err(engine_err!("nova::vulkan", "Driver returned no graphics pipeline"))
                }
            },
            Err((_, e)) => {
                unsafe { self.ctx.device.destroy_render_pass(render_pass, None) };
                Err(vk_err("Failed to create graphics pipeline", e))
            }
        }
    }

    fn create_compute(
        &self,
        stages: &[vk::PipelineShaderStageCreateInfo],
        layout: vk::PipelineLayout,
    ) -> Result<vk::Pipeline> {
        let [stage] = stages else {
            engine_bail!("nova::vulkan", "Compute pipeline needs exactly one stage, got {}", stages.len());
        };
        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(*stage)
            .layout(layout);

        let result = unsafe {
            self.ctx
                .device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        match result {
            Ok(pipelines) => pipelines
                .first()
                .copied()
                .ok_or_else(|| engine_err!("nova::vulkan", "Driver returned no compute pipeline")),
            Err((_, e)) => Err(vk_err("Failed to create compute pipeline", e)),
        }
    }

    fn destroy_partial(&self, modules: &[vk::ShaderModule], layout: vk::PipelineLayout, render_pass: vk::RenderPass) {
        unsafe {
            for module in modules {
                self.ctx.device.destroy_shader_module(*module, None);
            }
            self.ctx.device.destroy_pipeline_layout(layout, None);
            if render_pass != vk::RenderPass::null() {
                self.ctx.device.destroy_render_pass(render_pass, None);
            }
        }
    }

    pub(crate) fn build_frame_buffer(&mut self, desc: &FrameBufferDesc) -> Result<FrameBufferHandle> {
        let pipeline = self
            .pipelines
            .get(desc.pipeline)
            .ok_or_else(|| Error::InvalidResource("Frame buffer for an unknown pipeline".to_string()))?;
        if pipeline.bind_point != PipelineBindPoint::Graphics {
            return Err(Error::InvalidResource("Frame buffer for a compute pipeline".to_string()));
        }
        if pipeline.attachment_count != desc.attachments.len() {
            return Err(Error::InvalidResource(format!(
                "Frame buffer has {} attachments, pipeline expects {}",
                desc.attachments.len(),
                pipeline.attachment_count
            )));
        }

        let attachments = desc
            .attachments
            .iter()
            .enumerate()
            .map(|(i, view)| {
                self.views
                    .get(*view)
                    .map(|v| v.view)
                    .ok_or_else(|| Error::InvalidResource(format!("Attachment {} is an unknown view", i)))
            })
            .collect::<Result<Vec<_>>>()?;

        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(pipeline.render_pass)
            .attachments(&attachments)
            .width(desc.width)
            .height(desc.height)
            .layers(desc.layers.max(1));

        let frame_buffer = unsafe {
            self.ctx
                .device
                .create_framebuffer(&framebuffer_info, None)
                .map_err(|e| vk_err("Failed to create frame buffer", e))?
        };
        Ok(self.frame_buffers.insert(frame_buffer))
    }
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
