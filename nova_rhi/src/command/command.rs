/// Recorded command stream
///
/// A `CommandBuffer` stores its operations as a list of `Command`s. The list
/// is replayed into the backend's native command buffer at submission time.

use crate::device::handles::{
    BufferHandle, DescriptorSetHandle, FrameBufferHandle, ImageHandle, PipelineHandle,
};
use crate::device::types::{
    Extent3D, Filter, ImageState, Offset3D, Rect2D, ShaderStageFlags, SubresourceRange, Viewport,
};
use crate::pipeline::PipelineBindPoint;

/// Clear value of one attachment, in attachment order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// RGBA color (float, unorm and srgb formats)
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size_bytes(&self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Buffer-to-buffer copy region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// Buffer/image copy region (one mip level, a run of layers)
///
/// The buffer side is tightly packed: layer after layer, row after row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub mip_level: u32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub image_offset: Offset3D,
    pub image_extent: Extent3D,
}

/// Scaled copy between two mip levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBlit {
    pub src_mip: u32,
    pub dst_mip: u32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub src_extent: Extent3D,
    pub dst_extent: Extent3D,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        pipeline: PipelineHandle,
        frame_buffer: FrameBufferHandle,
        render_area: Rect2D,
        clear_values: Vec<ClearValue>,
    },
    EndRenderPass,
    BindPipeline {
        pipeline: PipelineHandle,
        bind_point: PipelineBindPoint,
    },
    BindDescriptorSets {
        bind_point: PipelineBindPoint,
        pipeline: PipelineHandle,
        first_set: u32,
        sets: Vec<DescriptorSetHandle>,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<(BufferHandle, u64)>,
    },
    BindIndexBuffer {
        buffer: BufferHandle,
        offset: u64,
        index_type: IndexType,
    },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    PushConstants {
        pipeline: PipelineHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    ImageBarrier {
        image: ImageHandle,
        range: SubresourceRange,
        old_state: ImageState,
        new_state: ImageState,
    },
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        regions: Vec<BufferCopy>,
    },
    CopyBufferToImage {
        buffer: BufferHandle,
        image: ImageHandle,
        region: BufferImageCopy,
    },
    CopyImageToBuffer {
        image: ImageHandle,
        buffer: BufferHandle,
        region: BufferImageCopy,
    },
    BlitImage {
        src: ImageHandle,
        dst: ImageHandle,
        region: ImageBlit,
        filter: Filter,
    },
}

impl Command {
    /// Short operation name, for logs and test assertions
    pub fn name(&self) -> &'static str {
        match self {
            Command::BeginRenderPass { .. } => "begin_render_pass",
            Command::EndRenderPass => "end_render_pass",
            Command::BindPipeline { .. } => "bind_pipeline",
            Command::BindDescriptorSets { .. } => "bind_descriptor_sets",
            Command::BindVertexBuffers { .. } => "bind_vertex_buffers",
            Command::BindIndexBuffer { .. } => "bind_index_buffer",
            Command::SetViewport(_) => "set_viewport",
            Command::SetScissor(_) => "set_scissor",
            Command::PushConstants { .. } => "push_constants",
            Command::Draw { .. } => "draw",
            Command::DrawIndexed { .. } => "draw_indexed",
            Command::Dispatch { .. } => "dispatch",
            Command::ImageBarrier { .. } => "image_barrier",
            Command::CopyBuffer { .. } => "copy_buffer",
            Command::CopyBufferToImage { .. } => "copy_buffer_to_image",
            Command::CopyImageToBuffer { .. } => "copy_image_to_buffer",
            Command::BlitImage { .. } => "blit_image",
        }
    }
}
