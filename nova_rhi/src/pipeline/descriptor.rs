/// Descriptor and sampler descriptions.

use crate::device::handles::{BufferHandle, DescriptorSetHandle, ImageViewHandle, SamplerHandle};
use crate::device::types::{Filter, ShaderStageFlags};
use crate::pipeline::types::CompareOp;

// ===== DESCRIPTOR TYPES =====

/// Kind of resource a binding holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    UniformBufferDynamic,
    StorageBufferDynamic,
    InputAttachment,
}

impl DescriptorType {
    pub const COUNT: usize = 11;

    pub const ALL: [DescriptorType; Self::COUNT] = [
        DescriptorType::Sampler,
        DescriptorType::CombinedImageSampler,
        DescriptorType::SampledImage,
        DescriptorType::StorageImage,
        DescriptorType::UniformTexelBuffer,
        DescriptorType::StorageTexelBuffer,
        DescriptorType::UniformBuffer,
        DescriptorType::StorageBuffer,
        DescriptorType::UniformBufferDynamic,
        DescriptorType::StorageBufferDynamic,
        DescriptorType::InputAttachment,
    ];

    /// Dense index, for per-type arrays
    pub fn index(&self) -> usize {
        match self {
            DescriptorType::Sampler => 0,
            DescriptorType::CombinedImageSampler => 1,
            DescriptorType::SampledImage => 2,
            DescriptorType::StorageImage => 3,
            DescriptorType::UniformTexelBuffer => 4,
            DescriptorType::StorageTexelBuffer => 5,
            DescriptorType::UniformBuffer => 6,
            DescriptorType::StorageBuffer => 7,
            DescriptorType::UniformBufferDynamic => 8,
            DescriptorType::StorageBufferDynamic => 9,
            DescriptorType::InputAttachment => 10,
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(
            self,
            DescriptorType::UniformTexelBuffer
                | DescriptorType::StorageTexelBuffer
                | DescriptorType::UniformBuffer
                | DescriptorType::StorageBuffer
                | DescriptorType::UniformBufferDynamic
                | DescriptorType::StorageBufferDynamic
        )
    }
}

/// One binding point of a set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    /// Array size
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Ordered list of bindings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetLayoutDesc {
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutDesc {
    /// Descriptors of each type one set of this layout consumes
    pub fn type_counts(&self) -> [u32; DescriptorType::COUNT] {
        let mut counts = [0u32; DescriptorType::COUNT];
        for binding in &self.bindings {
            counts[binding.descriptor_type.index()] += binding.count;
        }
        counts
    }

    pub fn binding(&self, binding: u32) -> Option<&DescriptorBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }
}

/// Fixed capacity of a descriptor pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorPoolDesc {
    pub max_sets: u32,
    pub pool_sizes: Vec<(DescriptorType, u32)>,
}

// ===== DESCRIPTOR WRITES =====

/// Resource written into one array element of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        range: u64,
    },
    /// Sampled image, with its sampler for combined image-samplers
    Image {
        view: ImageViewHandle,
        sampler: Option<SamplerHandle>,
    },
    StorageImage {
        view: ImageViewHandle,
    },
}

/// Single descriptor update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub set: DescriptorSetHandle,
    pub binding: u32,
    pub array_element: u32,
    pub resource: DescriptorResource,
}

// ===== SAMPLERS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipmapMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

/// Sampler creation descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: MipmapMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    /// Depth comparison (shadow samplers)
    pub compare_op: Option<CompareOp>,
    pub mip_lod_bias: f32,
    pub min_lod: f32,
    pub max_lod: f32,
    /// None = anisotropic filtering disabled
    pub max_anisotropy: Option<f32>,
    pub border_color: BorderColor,
}

impl SamplerDesc {
    /// Unclamped maximum LOD
    pub const LOD_CLAMP_NONE: f32 = 1000.0;
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_mode: MipmapMode::Linear,
            address_u: AddressMode::Repeat,
            address_v: AddressMode::Repeat,
            address_w: AddressMode::Repeat,
            compare_op: None,
            mip_lod_bias: 0.0,
            min_lod: 0.0,
            max_lod: Self::LOD_CLAMP_NONE,
            max_anisotropy: None,
            border_color: BorderColor::OpaqueBlack,
        }
    }
}
