/// Null backend: a headless, CPU-side simulation of a GPU
///
/// Images, buffers, blits, copies, clears, queue submission, fences and
/// semaphores are simulated in memory, with the same ordering rules a real
/// driver's validation layer enforces. Every submission, barrier and blit is
/// recorded so tests can inspect what the core contexts asked for.

pub mod null_backend;
mod null_execute;

pub use null_backend::*;

use crate::command::Command;
use crate::device::config::PresentMode;
use crate::device::handles::{FenceHandle, ImageHandle, SemaphoreHandle};
use crate::device::selection::{AdapterInfo, AdapterType, QueueFamilyInfo};
use crate::device::swapchain::SurfaceCapabilities;
use crate::device::types::{Extent2D, Extent3D, Format, ImageState, PipelineStage, QueueRole, SubresourceRange};

// ===== CONFIGURATION =====

/// Simulated device description (`Config::null_device`)
#[derive(Debug, Clone, PartialEq)]
pub struct NullDeviceConfig {
    /// Adapters offered to adapter selection
    pub adapters: Vec<AdapterInfo>,
    /// Queue families offered to queue-family selection
    pub queue_families: Vec<QueueFamilyInfo>,
    /// Surface bounds, formats and present modes
    pub surface: SurfaceCapabilities,
    /// Cap applied to every descriptor pool's set count
    pub max_sets_per_pool: Option<u32>,
    /// Report exhausted pools as fragmented instead of out of memory
    pub report_fragmentation: bool,
}

impl Default for NullDeviceConfig {
    fn default() -> Self {
        Self {
            adapters: vec![AdapterInfo {
                name: "Nova Null Device".to_string(),
                adapter_type: AdapterType::DiscreteGpu,
                vendor_id: 0,
                device_id: 0,
            }],
            queue_families: vec![QueueFamilyInfo {
                index: 0,
                queue_count: 4,
                graphics: true,
                compute: true,
                transfer: true,
                present: true,
            }],
            surface: SurfaceCapabilities {
                min_extent: Extent2D { width: 1, height: 1 },
                max_extent: Extent2D { width: 16384, height: 16384 },
                current_extent: None,
                min_image_count: 2,
                max_image_count: Some(8),
                formats: vec![
                    Format::B8G8R8A8_SRGB,
                    Format::B8G8R8A8_UNORM,
                    Format::R8G8B8A8_SRGB,
                    Format::R8G8B8A8_UNORM,
                ],
                present_modes: vec![
                    PresentMode::Fifo,
                    PresentMode::FifoRelaxed,
                    PresentMode::Mailbox,
                    PresentMode::Immediate,
                ],
            },
            max_sets_per_pool: None,
            report_fragmentation: false,
        }
    }
}

// ===== RECORDS =====

/// One queue submission, as executed
#[derive(Debug, Clone, PartialEq)]
pub struct NullSubmission {
    pub role: QueueRole,
    pub wait: Vec<(SemaphoreHandle, PipelineStage)>,
    pub signal: Vec<SemaphoreHandle>,
    pub fence: Option<FenceHandle>,
    /// Commands of every submitted command buffer, in order
    pub commands: Vec<Command>,
}

/// Device-level event, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum NullEvent {
    Acquire { image_index: u32, semaphore: SemaphoreHandle },
    Submit(NullSubmission),
    Present { image_index: u32, wait: Vec<SemaphoreHandle> },
    FenceWait { fence: FenceHandle, signaled: bool },
    FenceReset(FenceHandle),
    QueueWaitIdle(QueueRole),
    DeviceWaitIdle,
}

/// Executed image barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullBarrier {
    pub image: ImageHandle,
    pub range: SubresourceRange,
    pub old_state: ImageState,
    pub new_state: ImageState,
}

/// Executed blit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullBlit {
    pub src: ImageHandle,
    pub dst: ImageHandle,
    pub src_mip: u32,
    pub dst_mip: u32,
    pub src_extent: Extent3D,
    pub dst_extent: Extent3D,
    pub layer_count: u32,
}

/// Work counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullStats {
    pub submissions: u32,
    pub render_passes: u32,
    pub draws: u32,
    pub vertices: u64,
    pub dispatches: u32,
    pub descriptor_pools_created: u32,
    pub descriptor_writes: u32,
}
