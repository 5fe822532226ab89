/// Backend-neutral vocabulary shared by every context: formats, image states,
/// queue roles, extents and usage flags.

use bitflags::bitflags;

// ===== FORMATS =====

/// Image and vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Format {
    // 8-bit color formats
    R8_UNORM,
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,

    // Wide color formats
    R16G16B16A16_SFLOAT,
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32_UINT,

    // Depth/stencil formats
    D16_UNORM,
    D32_SFLOAT,
    D24_UNORM_S8_UINT,
    D32_SFLOAT_S8_UINT,
}

impl Format {
    /// Number of channels (depth and stencil count as one channel each)
    pub fn channel_count(&self) -> u32 {
        match self {
            Format::R8_UNORM | Format::R32_SFLOAT | Format::R32_UINT => 1,
            Format::R8G8_UNORM | Format::R32G32_SFLOAT => 2,
            Format::R32G32B32_SFLOAT => 3,
            Format::R8G8B8A8_UNORM
            | Format::R8G8B8A8_SRGB
            | Format::B8G8R8A8_UNORM
            | Format::B8G8R8A8_SRGB
            | Format::R16G16B16A16_SFLOAT
            | Format::R32G32B32A32_SFLOAT => 4,
            Format::D16_UNORM | Format::D32_SFLOAT => 1,
            Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT => 2,
        }
    }

    /// Size of one texel in bytes, as laid out in a tightly packed staging buffer
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Format::R8_UNORM => 1,
            Format::R8G8_UNORM | Format::D16_UNORM => 2,
            Format::R8G8B8A8_UNORM
            | Format::R8G8B8A8_SRGB
            | Format::B8G8R8A8_UNORM
            | Format::B8G8R8A8_SRGB
            | Format::R32_SFLOAT
            | Format::R32_UINT
            | Format::D32_SFLOAT
            | Format::D24_UNORM_S8_UINT => 4,
            Format::R16G16B16A16_SFLOAT | Format::R32G32_SFLOAT | Format::D32_SFLOAT_S8_UINT => 8,
            Format::R32G32B32_SFLOAT => 12,
            Format::R32G32B32A32_SFLOAT => 16,
        }
    }

    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            Format::D16_UNORM | Format::D32_SFLOAT | Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT)
    }

    pub fn is_srgb(&self) -> bool {
        matches!(self, Format::R8G8B8A8_SRGB | Format::B8G8R8A8_SRGB)
    }

    /// Whether a linear-filtered blit between two levels of this format is allowed
    pub fn supports_linear_blit(&self) -> bool {
        !self.is_depth() && !matches!(self, Format::R32_UINT)
    }
}

// ===== IMAGE STATE =====

/// Layout/usage state of an image subresource
///
/// Transitions are explicit: every change goes through an image barrier
/// recorded by the caller or by one of the resource context helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageState {
    /// Contents undefined (initial state, or "discard on transition")
    Undefined,
    /// Generic read/write (storage images)
    General,
    /// Color attachment of a render pass
    ColorAttachment,
    /// Depth/stencil attachment of a render pass
    DepthStencilAttachment,
    /// Sampled from shaders
    ShaderRead,
    /// Source of a copy or blit
    TransferSrc,
    /// Destination of a copy or blit
    TransferDst,
    /// Handed to the presentation engine
    Present,
}

// ===== QUEUES =====

/// Role a queue plays; roles may alias the same native queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueRole {
    Graphics,
    Compute,
    Transfer,
    Present,
}

impl QueueRole {
    pub const ALL: [QueueRole; 4] = [
        QueueRole::Graphics,
        QueueRole::Compute,
        QueueRole::Transfer,
        QueueRole::Present,
    ];

    /// Dense index, for per-role arrays
    pub fn index(&self) -> usize {
        match self {
            QueueRole::Graphics => 0,
            QueueRole::Compute => 1,
            QueueRole::Transfer => 2,
            QueueRole::Present => 3,
        }
    }
}

/// Pipeline stage a semaphore wait blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    TopOfPipe,
    ColorAttachmentOutput,
    FragmentShader,
    ComputeShader,
    Transfer,
    AllCommands,
}

// ===== GEOMETRY =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3D {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self { width, height, depth }
    }

    /// Extent of mip `level` for an image whose level 0 is `self`
    pub fn mip(&self, level: u32) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
            depth: (self.depth >> level).max(1),
        }
    }

    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offset3D {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Rectangle (render area, scissor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn from_extent(extent: Extent2D) -> Self {
        Self { x: 0, y: 0, width: extent.width, height: extent.height }
    }
}

/// Viewport (always dynamic state)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-extent viewport with the [0, 1] depth range
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Mip levels and array layers covered by a barrier or a view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceRange {
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

impl SubresourceRange {
    /// One mip level across `layer_count` layers
    pub fn mip(level: u32, layer_count: u32) -> Self {
        Self { base_mip_level: level, mip_level_count: 1, base_array_layer: 0, array_layer_count: layer_count }
    }

    /// Every mip and layer of an image
    pub fn whole(mip_levels: u32, array_layers: u32) -> Self {
        Self { base_mip_level: 0, mip_level_count: mip_levels, base_array_layer: 0, array_layer_count: array_layers }
    }

    /// One mip level of one layer
    pub fn single(level: u32, layer: u32) -> Self {
        Self { base_mip_level: level, mip_level_count: 1, base_array_layer: layer, array_layer_count: 1 }
    }
}

// ===== SAMPLING =====

/// Multisample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleCount {
    S1,
    S2,
    S4,
    S8,
}

impl SampleCount {
    pub fn count(&self) -> u32 {
        match self {
            SampleCount::S1 => 1,
            SampleCount::S2 => 2,
            SampleCount::S4 => 4,
            SampleCount::S8 => 8,
        }
    }
}

/// Texel filter (samplers and blits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Where a buffer's memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Mapped, CPU-writable (static buffers, staging, readback)
    HostVisible,
    /// Device-local, reachable only through transfer commands
    DeviceLocal,
}

// ===== FLAGS =====

bitflags! {
    /// Image usage bitmask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

bitflags! {
    /// Buffer usage bitmask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

bitflags! {
    /// Shader stages a binding or push constant range is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
