/// Typed arena handles for every GPU object.
///
/// Each backend owns one `SlotMap` per object kind and hands these keys out.
/// The core keeps its own bookkeeping in `SecondaryMap`s keyed by the same
/// handles, so no code ever needs to know the concrete backend type.

use slotmap::new_key_type;

// ===== SLOT MAP KEYS =====

new_key_type! {
    /// Device image (texture, render target, swapchain image)
    pub struct ImageHandle;

    /// View over a subresource range of an image
    pub struct ImageViewHandle;

    /// Device or host-visible buffer
    pub struct BufferHandle;

    /// Immutable sampler object
    pub struct SamplerHandle;

    /// Ordered list of (binding, descriptor type) pairs
    pub struct DescriptorSetLayoutHandle;

    /// Fixed-capacity descriptor pool
    pub struct DescriptorPoolHandle;

    /// Descriptor set allocated from exactly one pool
    pub struct DescriptorSetHandle;

    /// Graphics or compute pipeline (immutable once created)
    pub struct PipelineHandle;

    /// Attachment views bound to a pipeline's render-target layout
    pub struct FrameBufferHandle;

    /// CPU-observable GPU completion signal
    pub struct FenceHandle;

    /// GPU-side ordering primitive
    pub struct SemaphoreHandle;

    /// Command pool scoped to one queue role
    pub struct CommandPoolHandle;

    /// Native command buffer allocated from a command pool
    pub struct CommandBufferHandle;
}
