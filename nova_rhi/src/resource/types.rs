/// Buffer and image descriptions and the records the resource context keeps.

use crate::device::handles::{BufferHandle, ImageHandle, ImageViewHandle};
use crate::device::types::{
    BufferUsage, Extent3D, Format, ImageState, ImageUsage, MemoryLocation, Offset3D,
    SubresourceRange,
};

// ===== BUFFERS =====

/// What a buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    Vertex,
    Index,
    Uniform,
    Storage,
}

impl BufferType {
    pub fn usage(&self) -> BufferUsage {
        match self {
            BufferType::Vertex => BufferUsage::VERTEX,
            BufferType::Index => BufferUsage::INDEX,
            BufferType::Uniform => BufferUsage::UNIFORM,
            BufferType::Storage => BufferUsage::STORAGE,
        }
    }
}

/// Backend-level buffer creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCreateInfo {
    pub size: u64,
    pub usage: BufferUsage,
    pub location: MemoryLocation,
}

/// Buffer owned by the resource context
///
/// Static buffers live in host-visible memory and are written directly.
/// Dynamic buffers are device-local and paired with a staging buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub(crate) handle: BufferHandle,
    pub(crate) size: u64,
    pub(crate) ty: BufferType,
    pub(crate) is_static: bool,
    pub(crate) staging: Option<BufferHandle>,
}

impl Buffer {
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn buffer_type(&self) -> BufferType {
        self.ty
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn staging(&self) -> Option<BufferHandle> {
        self.staging
    }
}

// ===== IMAGES =====

/// Dimensionality and layer layout of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageShape {
    Tex2D,
    Tex2DArray { layers: u32 },
    /// Six square faces
    Cube,
    /// `cubes` groups of six square faces
    CubeArray { cubes: u32 },
}

impl ImageShape {
    /// Layer count, or `None` when a cube array overflows `u32`
    pub fn array_layers(&self) -> Option<u32> {
        match self {
            ImageShape::Tex2D => Some(1),
            ImageShape::Tex2DArray { layers } => Some(*layers),
            ImageShape::Cube => Some(6),
            ImageShape::CubeArray { cubes } => cubes.checked_mul(6),
        }
    }

    pub fn is_cube(&self) -> bool {
        matches!(self, ImageShape::Cube | ImageShape::CubeArray { .. })
    }

    /// View type of the image's default view
    pub fn view_type(&self) -> ImageViewType {
        match self {
            ImageShape::Tex2D => ImageViewType::Tex2D,
            ImageShape::Tex2DArray { .. } => ImageViewType::Tex2DArray,
            ImageShape::Cube => ImageViewType::Cube,
            ImageShape::CubeArray { .. } => ImageViewType::CubeArray,
        }
    }
}

/// Image view dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageViewType {
    Tex2D,
    Tex2DArray,
    Cube,
    CubeArray,
}

/// Image creation descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    /// Mip level count (0 = full chain)
    pub mip_levels: u32,
    pub usage: ImageUsage,
    pub shape: ImageShape,
}

impl Default for ImageDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            format: Format::R8G8B8A8_UNORM,
            mip_levels: 1,
            usage: ImageUsage::SAMPLED,
            shape: ImageShape::Tex2D,
        }
    }
}

/// Number of levels in a full mip chain for a `width` x `height` image
pub fn full_mip_chain(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Backend-level image creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCreateInfo {
    pub extent: Extent3D,
    pub format: Format,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage: ImageUsage,
    pub cube_compatible: bool,
}

/// View creation descriptor (render targets of one mip/layer, custom ranges)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageViewDesc {
    pub view_type: ImageViewType,
    pub range: SubresourceRange,
}

/// Backend-level view creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageViewCreateInfo {
    pub image: ImageHandle,
    pub view_type: ImageViewType,
    pub format: Format,
    pub range: SubresourceRange,
}

/// Image owned by the resource context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub(crate) handle: ImageHandle,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) depth: u32,
    pub(crate) format: Format,
    pub(crate) mip_levels: u32,
    pub(crate) array_layers: u32,
    pub(crate) usage: ImageUsage,
    pub(crate) shape: ImageShape,
    pub(crate) view: ImageViewHandle,
    pub(crate) state: ImageState,
    pub(crate) staging: BufferHandle,
    pub(crate) staging_size: u64,
}

impl Image {
    pub fn handle(&self) -> ImageHandle {
        self.handle
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn extent(&self) -> Extent3D {
        Extent3D::new(self.width, self.height, self.depth)
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn channel_count(&self) -> u32 {
        self.format.channel_count()
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    pub fn usage(&self) -> ImageUsage {
        self.usage
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    /// Default view covering every mip and layer
    pub fn view(&self) -> ImageViewHandle {
        self.view
    }

    /// State of the whole image as last set by the resource context
    pub fn state(&self) -> ImageState {
        self.state
    }

    pub fn staging_size(&self) -> u64 {
        self.staging_size
    }

    pub fn whole_range(&self) -> SubresourceRange {
        SubresourceRange::whole(self.mip_levels, self.array_layers)
    }
}

/// Region of one mip level of one layer to overwrite
#[derive(Debug, Clone, Copy)]
pub struct ImageUpdateInfo<'a> {
    pub offset: Offset3D,
    pub extent: Extent3D,
    pub mip_level: u32,
    pub layer: u32,
    /// Tightly packed texels, `extent` texels times the format size
    pub data: &'a [u8],
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
