/// Backend driver trait
///
/// Everything the core contexts need from a native graphics API. A backend
/// owns its native objects in slot maps and hands out the typed handles from
/// `device::handles`; the core never sees native types. Backends are built
/// through the plugin registry (`Engine::register_backend`).

use std::any::Any;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use crate::error::{Error, Result};
use crate::command::Command;
use crate::device::config::{BackendKind, Config};
use crate::device::handles::*;
use crate::device::selection::{AdapterInfo, QueueFamilies};
use crate::device::swapchain::{AcquireOutcome, PresentOutcome, SurfaceCapabilities, SwapchainDesc};
use crate::device::types::{PipelineStage, QueueRole};
use crate::pipeline::{
    DescriptorPoolDesc, DescriptorSetLayoutDesc, DescriptorWrite, FrameBufferDesc, PipelineDesc,
    RenderTargetLayout, SamplerDesc,
};
use crate::resource::{BufferCreateInfo, ImageCreateInfo, ImageViewCreateInfo};

/// Window a backend can present to
///
/// Implemented for every `raw-window-handle` window (winit, sdl, ...).
pub trait WindowSurface: HasDisplayHandle + HasWindowHandle {}

impl<T: HasDisplayHandle + HasWindowHandle + ?Sized> WindowSurface for T {}

/// Parameters handed to a backend factory
pub struct BackendInit<'a> {
    pub config: &'a Config,
    /// None for headless backends
    pub window: Option<&'a dyn WindowSurface>,
    pub width: u32,
    pub height: u32,
}

/// Semaphores and fence attached to one queue submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitInfo {
    /// Semaphores waited on, with the stage that blocks
    pub wait: Vec<(SemaphoreHandle, PipelineStage)>,
    pub signal: Vec<SemaphoreHandle>,
    /// Signaled when the submission completes
    pub fence: Option<FenceHandle>,
}

/// Descriptor set allocation failure
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationError {
    /// Pool has no room left for this set
    OutOfPoolMemory,
    /// Pool has room but it is too fragmented to serve the set
    FragmentedPool,
    /// Any other failure
    Other(Error),
}

impl From<AllocationError> for Error {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::OutOfPoolMemory => Error::OutOfMemory,
            AllocationError::FragmentedPool => Error::OutOfMemory,
            AllocationError::Other(e) => e,
        }
    }
}

/// Native graphics API driver
pub trait Backend: Send {
    // ===== IDENTITY =====

    fn kind(&self) -> BackendKind;

    /// Adapter chosen at init
    fn adapter_info(&self) -> &AdapterInfo;

    /// Family used by each queue role
    fn queue_families(&self) -> QueueFamilies;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    // ===== SWAPCHAIN =====

    fn surface_capabilities(&self) -> Result<SurfaceCapabilities>;

    /// Build the swapchain, replacing (and releasing) any previous one
    ///
    /// Views of the previous images must already be destroyed.
    ///
    /// # Returns
    ///
    /// The presentable images, in acquire-index order
    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<Vec<ImageHandle>>;

    fn destroy_swapchain(&mut self);

    /// Acquire the next image; `signal` is signaled when it is ready
    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> Result<AcquireOutcome>;

    fn present(&mut self, image_index: u32, wait: &[SemaphoreHandle]) -> Result<PresentOutcome>;

    // ===== SYNCHRONIZATION =====

    fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle>;

    fn destroy_fence(&mut self, fence: FenceHandle);

    /// Block until the fence signals or `timeout_ns` elapses
    ///
    /// # Returns
    ///
    /// `true` when the fence signaled, `false` on timeout
    fn wait_for_fence(&mut self, fence: FenceHandle, timeout_ns: u64) -> Result<bool>;

    fn reset_fence(&mut self, fence: FenceHandle) -> Result<()>;

    fn fence_signaled(&self, fence: FenceHandle) -> Result<bool>;

    fn create_semaphore(&mut self) -> Result<SemaphoreHandle>;

    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle);

    fn queue_wait_idle(&mut self, role: QueueRole) -> Result<()>;

    fn wait_idle(&mut self) -> Result<()>;

    // ===== BUFFERS & IMAGES =====

    fn create_buffer(&mut self, info: &BufferCreateInfo) -> Result<BufferHandle>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Write into a host-visible buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    /// Read back from a host-visible buffer
    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Result<Vec<u8>>;

    fn create_image(&mut self, info: &ImageCreateInfo) -> Result<ImageHandle>;

    fn destroy_image(&mut self, image: ImageHandle);

    fn create_image_view(&mut self, info: &ImageViewCreateInfo) -> Result<ImageViewHandle>;

    fn destroy_image_view(&mut self, view: ImageViewHandle) -> Result<()>;

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle>;

    fn destroy_sampler(&mut self, sampler: SamplerHandle);

    // ===== DESCRIPTORS =====

    fn create_descriptor_set_layout(&mut self, desc: &DescriptorSetLayoutDesc) -> Result<DescriptorSetLayoutHandle>;

    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayoutHandle);

    fn create_descriptor_pool(&mut self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle>;

    /// Return every set of the pool at once
    fn reset_descriptor_pool(&mut self, pool: DescriptorPoolHandle) -> Result<()>;

    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle);

    fn allocate_descriptor_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> std::result::Result<DescriptorSetHandle, AllocationError>;

    fn write_descriptor(&mut self, write: &DescriptorWrite) -> Result<()>;

    // ===== PIPELINES =====

    /// `layout` is the flattened render target (None for compute pipelines)
    fn create_pipeline(&mut self, desc: &PipelineDesc, layout: Option<&RenderTargetLayout>) -> Result<PipelineHandle>;

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle);

    fn create_frame_buffer(&mut self, desc: &FrameBufferDesc) -> Result<FrameBufferHandle>;

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle);

    // ===== COMMANDS =====

    fn create_command_pool(&mut self, role: QueueRole) -> Result<CommandPoolHandle>;

    fn reset_command_pool(&mut self, pool: CommandPoolHandle) -> Result<()>;

    fn destroy_command_pool(&mut self, pool: CommandPoolHandle);

    fn allocate_command_buffer(&mut self, pool: CommandPoolHandle) -> Result<CommandBufferHandle>;

    fn free_command_buffer(&mut self, pool: CommandPoolHandle, cmd: CommandBufferHandle);

    /// Replay `commands` into the native command buffer
    fn record(&mut self, cmd: CommandBufferHandle, commands: &[Command]) -> Result<()>;

    fn submit(&mut self, role: QueueRole, cmds: &[CommandBufferHandle], info: &SubmitInfo) -> Result<()>;
}
