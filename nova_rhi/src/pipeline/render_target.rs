/// Render-target layout builder
///
/// Turns the declarative attachment lists of a pipeline into one flat
/// attachment array plus reference indices. The order is fixed: every color
/// attachment (in the order given), then the depth/stencil attachment if
/// any, then every resolve attachment (in the order given). Frame buffers
/// built for the pipeline must supply their views in exactly this order.

use crate::error::{Error, Result};
use crate::device::types::{Format, ImageState, SampleCount};

// ===== DESCRIPTIONS =====

/// What happens to an attachment's contents when the pass begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Clear,
    Load,
    DontCare,
}

/// What happens to an attachment's contents when the pass ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// State an attachment is left in after the pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentFinalLayout {
    /// Ready for presentation
    Present,
    /// Stays an attachment (color or depth/stencil)
    AttachmentOptimal,
    /// Sampled by a later pass
    ShaderRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAttachmentDesc {
    pub format: Format,
    pub samples: SampleCount,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub final_layout: AttachmentFinalLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthAttachmentDesc {
    pub format: Format,
    pub samples: SampleCount,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub final_layout: AttachmentFinalLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveAttachmentDesc {
    pub format: Format,
    /// Must be `S1`
    pub samples: SampleCount,
    pub final_layout: AttachmentFinalLayout,
}

/// Attachments a graphics pipeline renders into
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub colors: Vec<ColorAttachmentDesc>,
    pub depth: Option<DepthAttachmentDesc>,
    /// Resolve `i` receives color attachment `i`; colors past the end are not resolved
    pub resolves: Vec<ResolveAttachmentDesc>,
}

// ===== LAYOUT =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Color,
    DepthStencil,
    Resolve,
}

/// One entry of the flattened attachment array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentSlot {
    pub kind: AttachmentKind,
    pub format: Format,
    pub samples: SampleCount,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    /// State the pass expects the image in (Undefined unless contents are loaded)
    pub initial_state: ImageState,
    /// State the pass leaves the image in
    pub final_state: ImageState,
}

/// Flattened attachments with reference indices into them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderTargetLayout {
    pub attachments: Vec<AttachmentSlot>,
    pub color_refs: Vec<u32>,
    pub depth_ref: Option<u32>,
    pub resolve_refs: Vec<u32>,
}

fn final_state(layout: AttachmentFinalLayout, attachment_state: ImageState) -> ImageState {
    match layout {
        AttachmentFinalLayout::Present => ImageState::Present,
        AttachmentFinalLayout::AttachmentOptimal => attachment_state,
        AttachmentFinalLayout::ShaderRead => ImageState::ShaderRead,
    }
}

fn initial_state(load_op: LoadOp, attachment_state: ImageState) -> ImageState {
    match load_op {
        LoadOp::Load => attachment_state,
        LoadOp::Clear | LoadOp::DontCare => ImageState::Undefined,
    }
}

impl RenderTargetLayout {
    /// Validate `desc` and flatten it in color → depth → resolve order
    pub fn build(desc: &RenderTargetDesc) -> Result<Self> {
        if desc.colors.is_empty() && desc.depth.is_none() {
            return Err(Error::InvalidResource(
                "Render target needs at least one attachment".to_string(),
            ));
        }
        if desc.resolves.len() > desc.colors.len() {
            return Err(Error::InvalidResource(format!(
                "Render target has {} resolve attachments for only {} color attachments",
                desc.resolves.len(),
                desc.colors.len()
            )));
        }

        let mut layout = RenderTargetLayout::default();

        for (i, color) in desc.colors.iter().enumerate() {
            if color.format.is_depth() {
                return Err(Error::InvalidResource(format!(
                    "Color attachment {} uses depth format {:?}",
                    i, color.format
                )));
            }
            layout.color_refs.push(layout.attachments.len() as u32);
            layout.attachments.push(AttachmentSlot {
                kind: AttachmentKind::Color,
                format: color.format,
                samples: color.samples,
                load_op: color.load_op,
                store_op: color.store_op,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::DontCare,
                initial_state: initial_state(color.load_op, ImageState::ColorAttachment),
                final_state: final_state(color.final_layout, ImageState::ColorAttachment),
            });
        }

        if let Some(depth) = &desc.depth {
            if !depth.format.is_depth() {
                return Err(Error::InvalidResource(format!(
                    "Depth attachment uses non-depth format {:?}",
                    depth.format
                )));
            }
            if depth.final_layout == AttachmentFinalLayout::Present {
                return Err(Error::InvalidResource(
                    "Depth attachment cannot be presented".to_string(),
                ));
            }
            let loads = depth.depth_load_op == LoadOp::Load
                || (depth.format.has_stencil() && depth.stencil_load_op == LoadOp::Load);
            layout.depth_ref = Some(layout.attachments.len() as u32);
            layout.attachments.push(AttachmentSlot {
                kind: AttachmentKind::DepthStencil,
                format: depth.format,
                samples: depth.samples,
                load_op: depth.depth_load_op,
                store_op: depth.depth_store_op,
                stencil_load_op: depth.stencil_load_op,
                stencil_store_op: depth.stencil_store_op,
                initial_state: if loads { ImageState::DepthStencilAttachment } else { ImageState::Undefined },
                final_state: final_state(depth.final_layout, ImageState::DepthStencilAttachment),
            });
        }

        for (i, resolve) in desc.resolves.iter().enumerate() {
            if resolve.samples != SampleCount::S1 {
                return Err(Error::InvalidResource(format!(
                    "Resolve attachment {} must be single-sampled",
                    i
                )));
            }
            if resolve.format.is_depth() {
                return Err(Error::InvalidResource(format!(
                    "Resolve attachment {} uses depth format {:?}",
                    i, resolve.format
                )));
            }
            layout.resolve_refs.push(layout.attachments.len() as u32);
            layout.attachments.push(AttachmentSlot {
                kind: AttachmentKind::Resolve,
                format: resolve.format,
                samples: SampleCount::S1,
                load_op: LoadOp::DontCare,
                store_op: StoreOp::Store,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::DontCare,
                initial_state: ImageState::Undefined,
                final_state: final_state(resolve.final_layout, ImageState::ColorAttachment),
            });
        }

        Ok(layout)
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    pub fn color_count(&self) -> usize {
        self.color_refs.len()
    }

    pub fn has_depth(&self) -> bool {
        self.depth_ref.is_some()
    }

    pub fn has_resolves(&self) -> bool {
        !self.resolve_refs.is_empty()
    }
}

#[cfg(test)]
#[path = "render_target_tests.rs"]
mod tests;
