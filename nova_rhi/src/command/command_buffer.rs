/// Command recorder
///
/// State machine: `Initial → Recording → Ended → Submitted`. `begin()` may be
/// called again from `Ended` or `Submitted` to re-record; waiting for the
/// previous submission to finish (fence) is the caller's job.

use crate::error::{Error, Result};
use crate::command::command::{
    BufferCopy, BufferImageCopy, ClearValue, Command, ImageBlit, IndexType,
};
use crate::device::handles::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, DescriptorSetHandle, FrameBufferHandle,
    ImageHandle, PipelineHandle,
};
use crate::device::types::{
    Filter, ImageState, QueueRole, Rect2D, ShaderStageFlags, SubresourceRange, Viewport,
};
use crate::pipeline::PipelineBindPoint;

/// Recording state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    Initial,
    Recording,
    Ended,
    Submitted,
}

/// Command buffer bound to one queue role
#[derive(Debug)]
pub struct CommandBuffer {
    handle: CommandBufferHandle,
    pool: CommandPoolHandle,
    role: QueueRole,
    state: CommandBufferState,
    commands: Vec<Command>,
    in_render_pass: bool,
    graphics_bound: bool,
    compute_bound: bool,
}

impl CommandBuffer {
    pub(crate) fn new(handle: CommandBufferHandle, pool: CommandPoolHandle, role: QueueRole) -> Self {
        Self {
            handle,
            pool,
            role,
            state: CommandBufferState::Initial,
            commands: Vec::new(),
            in_render_pass: false,
            graphics_bound: false,
            compute_bound: false,
        }
    }

    pub fn handle(&self) -> CommandBufferHandle {
        self.handle
    }

    pub fn pool(&self) -> CommandPoolHandle {
        self.pool
    }

    pub fn role(&self) -> QueueRole {
        self.role
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Recorded operations, in order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn in_render_pass(&self) -> bool {
        self.in_render_pass
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.state = CommandBufferState::Submitted;
    }

    // ===== STATE CHECKS =====

    fn require_recording(&self, op: &str) -> Result<()> {
        if self.state != CommandBufferState::Recording {
            return Err(Error::InvalidState(format!(
                "{} requires a recording command buffer (state: {:?})",
                op, self.state
            )));
        }
        Ok(())
    }

    fn require_outside_render_pass(&self, op: &str) -> Result<()> {
        self.require_recording(op)?;
        if self.in_render_pass {
            return Err(Error::InvalidState(format!("{} is not allowed inside a render pass", op)));
        }
        Ok(())
    }

    fn require_draw(&self, op: &str) -> Result<()> {
        self.require_recording(op)?;
        if !self.in_render_pass {
            return Err(Error::InvalidState(format!("{} requires an active render pass", op)));
        }
        if !self.graphics_bound {
            return Err(Error::InvalidState(format!("{} requires a bound graphics pipeline", op)));
        }
        Ok(())
    }

    // ===== LIFECYCLE =====

    /// Start recording, dropping any previous recording
    pub fn begin(&mut self) -> Result<()> {
        if self.state == CommandBufferState::Recording {
            return Err(Error::InvalidState("Command buffer is already recording".to_string()));
        }
        self.commands.clear();
        self.in_render_pass = false;
        self.graphics_bound = false;
        self.compute_bound = false;
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        self.require_recording("end")?;
        if self.in_render_pass {
            return Err(Error::InvalidState("end called inside a render pass".to_string()));
        }
        self.state = CommandBufferState::Ended;
        Ok(())
    }

    // ===== RENDER PASS =====

    /// Begin the render pass of `pipeline` on `frame_buffer`
    ///
    /// # Arguments
    ///
    /// * `clear_values` - One entry per attachment, in the layout order
    /// * `render_area` - Region of the frame buffer rendered to
    pub fn begin_render_pass(
        &mut self,
        pipeline: PipelineHandle,
        frame_buffer: FrameBufferHandle,
        clear_values: &[ClearValue],
        render_area: Rect2D,
    ) -> Result<()> {
        self.require_outside_render_pass("begin_render_pass")?;
        self.in_render_pass = true;
        self.commands.push(Command::BeginRenderPass {
            pipeline,
            frame_buffer,
            render_area,
            clear_values: clear_values.to_vec(),
        });
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        self.require_recording("end_render_pass")?;
        if !self.in_render_pass {
            return Err(Error::InvalidState("end_render_pass without an active render pass".to_string()));
        }
        self.in_render_pass = false;
        self.commands.push(Command::EndRenderPass);
        Ok(())
    }

    // ===== BINDING =====

    pub fn bind_pipeline(&mut self, pipeline: PipelineHandle, bind_point: PipelineBindPoint) -> Result<()> {
        self.require_recording("bind_pipeline")?;
        match bind_point {
            PipelineBindPoint::Graphics => self.graphics_bound = true,
            PipelineBindPoint::Compute => self.compute_bound = true,
        }
        self.commands.push(Command::BindPipeline { pipeline, bind_point });
        Ok(())
    }

    pub fn bind_descriptor_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        pipeline: PipelineHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) -> Result<()> {
        self.require_recording("bind_descriptor_sets")?;
        self.commands.push(Command::BindDescriptorSets {
            bind_point,
            pipeline,
            first_set,
            sets: sets.to_vec(),
        });
        Ok(())
    }

    /// Bind `(buffer, offset)` pairs starting at `first_binding`
    pub fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[(BufferHandle, u64)]) -> Result<()> {
        self.require_recording("bind_vertex_buffers")?;
        self.commands.push(Command::BindVertexBuffers {
            first_binding,
            buffers: buffers.to_vec(),
        });
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) -> Result<()> {
        self.require_recording("bind_index_buffer")?;
        self.commands.push(Command::BindIndexBuffer { buffer, offset, index_type });
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.require_recording("set_viewport")?;
        self.commands.push(Command::SetViewport(viewport));
        Ok(())
    }

    pub fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.require_recording("set_scissor")?;
        self.commands.push(Command::SetScissor(scissor));
        Ok(())
    }

    pub fn push_constants(
        &mut self,
        pipeline: PipelineHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.require_recording("push_constants")?;
        if data.len() % 4 != 0 || offset % 4 != 0 {
            return Err(Error::InvalidResource(
                "Push constant offset and size must be multiples of 4".to_string(),
            ));
        }
        self.commands.push(Command::PushConstants {
            pipeline,
            stages,
            offset,
            data: data.to_vec(),
        });
        Ok(())
    }

    /// Push a plain-old-data block (a `#[repr(C)]` struct or an array)
    pub fn push_constants_pod<T: bytemuck::Pod>(
        &mut self,
        pipeline: PipelineHandle,
        stages: ShaderStageFlags,
        offset: u32,
        value: &T,
    ) -> Result<()> {
        self.push_constants(pipeline, stages, offset, bytemuck::bytes_of(value))
    }

    // ===== WORK =====

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        self.require_draw("draw")?;
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.require_draw("draw_indexed")?;
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.require_outside_render_pass("dispatch")?;
        if !self.compute_bound {
            return Err(Error::InvalidState("dispatch requires a bound compute pipeline".to_string()));
        }
        self.commands.push(Command::Dispatch { x, y, z });
        Ok(())
    }

    // ===== TRANSFER & SYNC =====

    pub fn image_barrier(
        &mut self,
        image: ImageHandle,
        range: SubresourceRange,
        old_state: ImageState,
        new_state: ImageState,
    ) -> Result<()> {
        self.require_outside_render_pass("image_barrier")?;
        self.commands.push(Command::ImageBarrier { image, range, old_state, new_state });
        Ok(())
    }

    pub fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, regions: &[BufferCopy]) -> Result<()> {
        self.require_outside_render_pass("copy_buffer")?;
        self.commands.push(Command::CopyBuffer {
            src,
            dst,
            regions: regions.to_vec(),
        });
        Ok(())
    }

    pub fn copy_buffer_to_image(&mut self, buffer: BufferHandle, image: ImageHandle, region: BufferImageCopy) -> Result<()> {
        self.require_outside_render_pass("copy_buffer_to_image")?;
        self.commands.push(Command::CopyBufferToImage { buffer, image, region });
        Ok(())
    }

    pub fn copy_image_to_buffer(&mut self, image: ImageHandle, buffer: BufferHandle, region: BufferImageCopy) -> Result<()> {
        self.require_outside_render_pass("copy_image_to_buffer")?;
        self.commands.push(Command::CopyImageToBuffer { image, buffer, region });
        Ok(())
    }

    pub fn blit_image(&mut self, src: ImageHandle, dst: ImageHandle, region: ImageBlit, filter: Filter) -> Result<()> {
        self.require_outside_render_pass("blit_image")?;
        self.commands.push(Command::BlitImage { src, dst, region, filter });
        Ok(())
    }
}

#[cfg(test)]
#[path = "command_buffer_tests.rs"]
mod tests;
