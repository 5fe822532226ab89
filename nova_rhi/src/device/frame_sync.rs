/// Frames-in-flight synchronization
///
/// One slot per frame in flight, each with an image-available semaphore, a
/// render-finished semaphore and a fence created signaled. A slot is only
/// reused once its fence has signaled, so the CPU never runs more than N
/// frames ahead of the GPU.

use crate::error::{Error, Result};
use crate::command::{CommandBuffer, CommandBufferState};
use crate::device::backend::SubmitInfo;
use crate::device::factory::Factory;
use crate::device::handles::{FenceHandle, SemaphoreHandle};
use crate::device::swapchain::{AcquireOutcome, PresentOutcome};
use crate::device::types::PipelineStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameSlot {
    image_available: SemaphoreHandle,
    render_finished: SemaphoreHandle,
    in_flight: FenceHandle,
}

/// One frame between `begin_frame` and `end_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Frame-in-flight slot
    pub slot: usize,
    /// Acquired swapchain image
    pub image_index: u32,
    /// Signaled when the swapchain image is ready
    pub image_available: SemaphoreHandle,
    /// Signaled when rendering is done; present waits on it
    pub render_finished: SemaphoreHandle,
    /// Signaled when the frame's submission completes
    pub fence: FenceHandle,
}

/// Ring of per-frame synchronization objects
pub struct FrameSync {
    slots: Vec<FrameSlot>,
    frame_counter: u64,
}

impl FrameSync {
    /// Create the sync objects
    ///
    /// # Arguments
    ///
    /// * `factory` - Factory owning the semaphores and fences
    /// * `frames_in_flight` - Slot count (0 = one per swapchain image)
    pub fn new(factory: &mut Factory, frames_in_flight: u32) -> Result<Self> {
        let count = if frames_in_flight == 0 {
            factory.swapchain().image_count()
        } else {
            frames_in_flight
        };

        let mut slots = Vec::with_capacity(count as usize);
        for _ in 0..count {
            slots.push(FrameSlot {
                image_available: factory.create_semaphore()?,
                render_finished: factory.create_semaphore()?,
                in_flight: factory.create_fence(true)?,
            });
        }

        crate::engine_debug!("nova::FrameSync", "{} frames in flight", count);

        Ok(Self {
            slots,
            frame_counter: 0,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Frames ended so far
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Slot the next `begin_frame` will use
    pub fn current_slot(&self) -> usize {
        (self.frame_counter % self.slots.len().max(1) as u64) as usize
    }

    /// Wait for the slot's previous frame, then acquire a swapchain image
    ///
    /// The slot fence stays signaled until `end_frame` submits.
    ///
    /// # Returns
    ///
    /// None when the swapchain is out of date, in which case the frame can
    /// simply be retried after recreation
    pub fn begin_frame(&mut self, factory: &mut Factory) -> Result<Option<Frame>> {
        let slot_index = self.current_slot();
        let slot = self
            .slots
            .get(slot_index)
            .copied()
            .ok_or_else(|| Error::InvalidState("begin_frame on destroyed frame sync".to_string()))?;

        factory.wait_for_fence(slot.in_flight)?;

        let image_index = match factory.acquire_next_image(slot.image_available)? {
            AcquireOutcome::Image(index) => index,
            AcquireOutcome::OutOfDate => {
                crate::engine_debug!("nova::FrameSync", "Swapchain out of date at acquire");
                return Ok(None);
            }
        };

        Ok(Some(Frame {
            slot: slot_index,
            image_index,
            image_available: slot.image_available,
            render_finished: slot.render_finished,
            fence: slot.in_flight,
        }))
    }

    /// Submit the frame's commands and present its image
    ///
    /// The submission waits on `image_available` at the color attachment
    /// output stage, signals `render_finished` and the slot fence; present
    /// waits on `render_finished`.
    ///
    /// A command buffer that is not ended is rejected before the fence is
    /// reset; the frame stays open and `end_frame` can be called again.
    pub fn end_frame(&mut self, factory: &mut Factory, frame: &Frame, cmd: &mut CommandBuffer) -> Result<PresentOutcome> {
        if cmd.state() != CommandBufferState::Ended {
            return Err(Error::InvalidState(format!(
                "end_frame needs an ended command buffer (state: {:?})",
                cmd.state()
            )));
        }
        if self.slots.get(frame.slot).map(|slot| slot.in_flight) != Some(frame.fence) {
            return Err(Error::InvalidState("Frame does not belong to this frame sync".to_string()));
        }

        factory.reset_fence(frame.fence)?;
        let info = SubmitInfo {
            wait: vec![(frame.image_available, PipelineStage::ColorAttachmentOutput)],
            signal: vec![frame.render_finished],
            fence: Some(frame.fence),
        };
        factory.submit(cmd, &info)?;

        let outcome = factory.present(frame.image_index, &[frame.render_finished])?;
        self.frame_counter += 1;
        Ok(outcome)
    }

    /// Wait for the device to go idle and destroy every sync object
    pub fn destroy(&mut self, factory: &mut Factory) -> Result<()> {
        factory.wait_idle()?;
        for slot in self.slots.drain(..) {
            factory.destroy_semaphore(slot.image_available);
            factory.destroy_semaphore(slot.render_finished);
            factory.destroy_fence(slot.in_flight);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "frame_sync_tests.rs"]
mod tests;
