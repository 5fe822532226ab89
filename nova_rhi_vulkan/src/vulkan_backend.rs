/// VulkanBackend - Vulkan implementation of the nova `Backend` trait
///
/// Owns one slot map per native object kind. Handles handed to the core are
/// the slot map keys; the native Vulkan objects never leave this crate.
/// Swapchain, descriptor, pipeline and command replay code live in the
/// sibling `vulkan_*` modules as further `impl VulkanBackend` blocks.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use nova_rhi::nova::command::Command;
use nova_rhi::nova::device::{
    AcquireOutcome, AdapterInfo, AllocationError, Backend, BackendInit, BackendKind,
    BufferHandle, BufferUsage, CommandBufferHandle, CommandPoolHandle, DescriptorPoolHandle,
    DescriptorSetHandle, DescriptorSetLayoutHandle, FenceHandle, Format, FrameBufferHandle,
    ImageHandle, ImageUsage, ImageViewHandle, MemoryLocation, PipelineHandle, PresentOutcome,
    QueueFamilies, QueueRole, SamplerHandle, SemaphoreHandle, SubmitInfo, SurfaceCapabilities,
    SwapchainDesc,
};
use nova_rhi::nova::pipeline::{
    DescriptorPoolDesc, DescriptorSetLayoutDesc, DescriptorWrite, FrameBufferDesc,
    PipelineBindPoint, PipelineDesc, RenderTargetLayout, SamplerDesc,
};
use nova_rhi::nova::resource::{BufferCreateInfo, ImageCreateInfo, ImageViewCreateInfo, ImageViewType};
use nova_rhi::nova::{Error, Result};
use nova_rhi::{engine_bail, engine_debug, engine_err, engine_error};
use slotmap::SlotMap;
use std::any::Any;

use crate::vulkan_context::VulkanContext;
use crate::vulkan_convert::{
    address_mode_to_vk, aspect_mask, border_color_to_vk, buffer_usage_to_vk, compare_op_to_vk,
    filter_to_vk, format_to_vk, image_usage_to_vk, mipmap_mode_to_vk, pipeline_stage_to_vk,
    subresource_range_to_vk, view_aspect_mask, view_type_to_vk,
};

// ============================================================================
// Native objects
// ============================================================================

pub(crate) struct VulkanBuffer {
    pub(crate) buffer: vk::Buffer,
    pub(crate) allocation: Option<Allocation>,
    pub(crate) size: u64,
}

pub(crate) struct VulkanImage {
    pub(crate) image: vk::Image,
    /// None for swapchain images (owned by the presentation engine)
    pub(crate) allocation: Option<Allocation>,
    pub(crate) format: Format,
    pub(crate) usage: ImageUsage,
    pub(crate) swapchain_owned: bool,
}

pub(crate) struct VulkanImageView {
    pub(crate) view: vk::ImageView,
    pub(crate) image: ImageHandle,
}

pub(crate) struct VulkanSetLayout {
    pub(crate) layout: vk::DescriptorSetLayout,
    pub(crate) desc: DescriptorSetLayoutDesc,
}

pub(crate) struct VulkanDescriptorPool {
    pub(crate) pool: vk::DescriptorPool,
    pub(crate) sets: Vec<DescriptorSetHandle>,
}

pub(crate) struct VulkanDescriptorSet {
    pub(crate) set: vk::DescriptorSet,
    pub(crate) layout: DescriptorSetLayoutHandle,
}

pub(crate) struct VulkanPipeline {
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    /// Null for compute pipelines
    pub(crate) render_pass: vk::RenderPass,
    pub(crate) bind_point: PipelineBindPoint,
    pub(crate) attachment_count: usize,
}

pub(crate) struct VulkanCommandPool {
    pub(crate) pool: vk::CommandPool,
    pub(crate) role: QueueRole,
    pub(crate) buffers: Vec<CommandBufferHandle>,
}

pub(crate) struct VulkanCommandBuffer {
    pub(crate) buffer: vk::CommandBuffer,
    pub(crate) pool: CommandPoolHandle,
}

pub(crate) struct VulkanSwapchain {
    pub(crate) swapchain: vk::SwapchainKHR,
    pub(crate) images: Vec<ImageHandle>,
}

/// Look up a native object, naming its kind in the error
pub(crate) fn lookup<'a, K: slotmap::Key, V>(map: &'a SlotMap<K, V>, key: K, what: &str) -> Result<&'a V> {
    map.get(key)
        .ok_or_else(|| Error::InvalidResource(format!("Unknown {} {:?}", what, key)))
}

/// Log a failed Vulkan call and convert it to an engine error
pub(crate) fn vk_err(what: &str, result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            engine_error!("nova::vulkan", "{}: out of memory ({:?})", what, result);
            Error::OutOfMemory
        }
        _ => engine_err!("nova::vulkan", "{}: {:?}", what, result),
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Vulkan device backend
///
/// Created through the engine's backend registry (see `crate::register`).
pub struct VulkanBackend {
    pub(crate) buffers: SlotMap<BufferHandle, VulkanBuffer>,
    pub(crate) images: SlotMap<ImageHandle, VulkanImage>,
    pub(crate) views: SlotMap<ImageViewHandle, VulkanImageView>,
    pub(crate) samplers: SlotMap<SamplerHandle, vk::Sampler>,
    pub(crate) set_layouts: SlotMap<DescriptorSetLayoutHandle, VulkanSetLayout>,
    pub(crate) pools: SlotMap<DescriptorPoolHandle, VulkanDescriptorPool>,
    pub(crate) sets: SlotMap<DescriptorSetHandle, VulkanDescriptorSet>,
    pub(crate) pipelines: SlotMap<PipelineHandle, VulkanPipeline>,
    pub(crate) frame_buffers: SlotMap<FrameBufferHandle, vk::Framebuffer>,
    pub(crate) fences: SlotMap<FenceHandle, vk::Fence>,
    pub(crate) semaphores: SlotMap<SemaphoreHandle, vk::Semaphore>,
    pub(crate) command_pools: SlotMap<CommandPoolHandle, VulkanCommandPool>,
    pub(crate) command_buffers: SlotMap<CommandBufferHandle, VulkanCommandBuffer>,
    pub(crate) swapchain: Option<VulkanSwapchain>,

    /// Declared last: the device outlives every object above
    pub(crate) ctx: VulkanContext,
}

impl VulkanBackend {
    /// Create the instance, device and allocator for `init.window`
    pub fn new(init: &BackendInit<'_>) -> Result<Self> {
        let ctx = VulkanContext::new(init)?;

        Ok(Self {
            buffers: SlotMap::with_key(),
            images: SlotMap::with_key(),
            views: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            set_layouts: SlotMap::with_key(),
            pools: SlotMap::with_key(),
            sets: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            frame_buffers: SlotMap::with_key(),
            fences: SlotMap::with_key(),
            semaphores: SlotMap::with_key(),
            command_pools: SlotMap::with_key(),
            command_buffers: SlotMap::with_key(),
            swapchain: None,
            ctx,
        })
    }

    /// Shared device context (device, queues, allocator)
    pub fn context(&self) -> &VulkanContext {
        &self.ctx
    }

    /// Native image behind a handle
    pub fn native_image(&self, image: ImageHandle) -> Option<vk::Image> {
        self.images.get(image).map(|i| i.image)
    }

    /// Native buffer behind a handle
    pub fn native_buffer(&self, buffer: BufferHandle) -> Option<vk::Buffer> {
        self.buffers.get(buffer).map(|b| b.buffer)
    }

    pub(crate) fn semaphore(&self, semaphore: SemaphoreHandle) -> Result<vk::Semaphore> {
        lookup(&self.semaphores, semaphore, "semaphore").copied()
    }

    fn allocate_memory(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: gpu_allocator::MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.ctx
            .allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                match e {
                    gpu_allocator::AllocationError::OutOfMemory => {
                        engine_error!("nova::vulkan", "Out of GPU memory for {} ({:.2} MB)", name, size_mb);
                        Error::OutOfMemory
                    }
                    other => engine_err!("nova::vulkan", "Failed to allocate {} ({:.2} MB): {}", name, size_mb, other),
                }
            })
    }

    fn free_memory(&mut self, allocation: Option<Allocation>) {
        if let Some(allocation) = allocation {
            if let Err(e) = self.ctx.allocator.free(allocation) {
                engine_error!("nova::vulkan", "Failed to free GPU allocation: {}", e);
            }
        }
    }

    /// Mapped bytes of a host-visible buffer, bounds-checked against the buffer size
    fn check_mapped_range(native: &VulkanBuffer, offset: u64, len: u64) -> Result<()> {
        if native.allocation.as_ref().and_then(|a| a.mapped_ptr()).is_none() {
            engine_bail!("nova::vulkan", "Mapping a device-local buffer");
        }
        if offset.checked_add(len).map_or(true, |end| end > native.size) {
            return Err(Error::InvalidResource(format!(
                "Access of {} bytes at offset {} exceeds buffer size {}",
                len, offset, native.size
            )));
        }
        Ok(())
    }
}

impl Backend for VulkanBackend {
    // ===== IDENTITY =====

    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn adapter_info(&self) -> &AdapterInfo {
        &self.ctx.adapter
    }

    fn queue_families(&self) -> QueueFamilies {
        self.ctx.families
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    // ===== SWAPCHAIN =====

    fn surface_capabilities(&self) -> Result<SurfaceCapabilities> {
        self.query_surface_capabilities()
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<Vec<ImageHandle>> {
        self.build_swapchain(desc)
    }

    fn destroy_swapchain(&mut self) {
        self.release_swapchain();
    }

    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> Result<AcquireOutcome> {
        self.acquire(signal)
    }

    fn present(&mut self, image_index: u32, wait: &[SemaphoreHandle]) -> Result<PresentOutcome> {
        self.present_image(image_index, wait)
    }

    // ===== SYNCHRONIZATION =====

    fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            self.ctx
                .device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
                .map_err(|e| vk_err("Failed to create fence", e))?
        };
        Ok(self.fences.insert(fence))
    }

    fn destroy_fence(&mut self, fence: FenceHandle) {
        if let Some(native) = self.fences.remove(fence) {
            unsafe { self.ctx.device.destroy_fence(native, None) };
        }
    }

    fn wait_for_fence(&mut self, fence: FenceHandle, timeout_ns: u64) -> Result<bool> {
        let native = *lookup(&self.fences, fence, "fence")?;
        match unsafe { self.ctx.device.wait_for_fences(&[native], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(vk_err("Failed to wait for fence", e)),
        }
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> Result<()> {
        let native = *lookup(&self.fences, fence, "fence")?;
        unsafe {
            self.ctx
                .device
                .reset_fences(&[native])
                .map_err(|e| vk_err("Failed to reset fence", e))
        }
    }

    fn fence_signaled(&self, fence: FenceHandle) -> Result<bool> {
        let native = *lookup(&self.fences, fence, "fence")?;
        unsafe {
            self.ctx
                .device
                .get_fence_status(native)
                .map_err(|e| vk_err("Failed to query fence", e))
        }
    }

    fn create_semaphore(&mut self) -> Result<SemaphoreHandle> {
        let semaphore = unsafe {
            self.ctx
                .device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| vk_err("Failed to create semaphore", e))?
        };
        Ok(self.semaphores.insert(semaphore))
    }

    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) {
        if let Some(native) = self.semaphores.remove(semaphore) {
            unsafe { self.ctx.device.destroy_semaphore(native, None) };
        }
    }

    fn queue_wait_idle(&mut self, role: QueueRole) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .queue_wait_idle(self.ctx.queue(role))
                .map_err(|e| vk_err("Queue wait idle failed", e))
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .map_err(|e| vk_err("Device wait idle failed", e))
        }
    }

    // ===== BUFFERS & IMAGES =====

    fn create_buffer(&mut self, info: &BufferCreateInfo) -> Result<BufferHandle> {
        if info.size == 0 {
            return Err(Error::InvalidResource("Buffer size must be non-zero".to_string()));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(info.size)
            .usage(buffer_usage_to_vk(info.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            self.ctx
                .device
                .create_buffer(&buffer_info, None)
                .map_err(|e| vk_err("Failed to create buffer", e))?
        };
        let requirements = unsafe { self.ctx.device.get_buffer_memory_requirements(buffer) };

        // Readback buffers get cached host memory
        let location = match info.location {
            MemoryLocation::DeviceLocal => gpu_allocator::MemoryLocation::GpuOnly,
            MemoryLocation::HostVisible if info.usage == BufferUsage::TRANSFER_DST => {
                gpu_allocator::MemoryLocation::GpuToCpu
            }
            MemoryLocation::HostVisible => gpu_allocator::MemoryLocation::CpuToGpu,
        };

        let allocation = match self.allocate_memory("buffer", requirements, location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.ctx.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        let bound = unsafe {
            self.ctx
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free_memory(Some(allocation));
            unsafe { self.ctx.device.destroy_buffer(buffer, None) };
            return Err(vk_err("Failed to bind buffer memory", e));
        }

        Ok(self.buffers.insert(VulkanBuffer {
            buffer,
            allocation: Some(allocation),
            size: info.size,
        }))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(mut native) = self.buffers.remove(buffer) {
            self.free_memory(native.allocation.take());
            unsafe { self.ctx.device.destroy_buffer(native.buffer, None) };
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let native = lookup(&self.buffers, buffer, "buffer")?;
        Self::check_mapped_range(native, offset, data.len() as u64)?;
        let Some(mapped) = native.allocation.as_ref().and_then(|a| a.mapped_ptr()) else {
            engine_bail!("nova::vulkan", "Buffer lost its mapping");
        };
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                (mapped.as_ptr() as *mut u8).add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Result<Vec<u8>> {
        let native = lookup(&self.buffers, buffer, "buffer")?;
        Self::check_mapped_range(native, offset, size)?;
        let Some(mapped) = native.allocation.as_ref().and_then(|a| a.mapped_ptr()) else {
            engine_bail!("nova::vulkan", "Buffer lost its mapping");
        };
        let mut out = vec![0u8; size as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(
                (mapped.as_ptr() as *const u8).add(offset as usize),
                out.as_mut_ptr(),
                out.len(),
            );
        }
        Ok(out)
    }

    fn create_image(&mut self, info: &ImageCreateInfo) -> Result<ImageHandle> {
        if info.extent.width == 0 || info.extent.height == 0 || info.extent.depth == 0 {
            return Err(Error::InvalidResource("Image extent must be non-zero".to_string()));
        }
        if info.mip_levels == 0 || info.array_layers == 0 {
            return Err(Error::InvalidResource("Image needs at least one mip and one layer".to_string()));
        }
        if info.cube_compatible
            && (info.extent.width != info.extent.height || info.array_layers % 6 != 0)
        {
            return Err(Error::InvalidResource(
                "Cube images must be square with a multiple of 6 layers".to_string(),
            ));
        }

        let flags = if info.cube_compatible {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let image_type = if info.extent.depth > 1 {
            vk::ImageType::TYPE_3D
        } else {
            vk::ImageType::TYPE_2D
        };
        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(image_type)
            .format(format_to_vk(info.format))
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: info.extent.depth,
            })
            .mip_levels(info.mip_levels)
            .array_layers(info.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(image_usage_to_vk(info.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe {
            self.ctx
                .device
                .create_image(&image_info, None)
                .map_err(|e| vk_err("Failed to create image", e))?
        };
        let requirements = unsafe { self.ctx.device.get_image_memory_requirements(image) };

        let allocation = match self.allocate_memory("image", requirements, gpu_allocator::MemoryLocation::GpuOnly, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                engine_error!(
                    "nova::vulkan",
                    "Image allocation failed ({}x{}, {} layers, {:?})",
                    info.extent.width,
                    info.extent.height,
                    info.array_layers,
                    info.format
                );
                unsafe { self.ctx.device.destroy_image(image, None) };
                return Err(e);
            }
        };
        let bound = unsafe {
            self.ctx
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free_memory(Some(allocation));
            unsafe { self.ctx.device.destroy_image(image, None) };
            return Err(vk_err("Failed to bind image memory", e));
        }

        Ok(self.images.insert(VulkanImage {
            image,
            allocation: Some(allocation),
            format: info.format,
            usage: info.usage,
            swapchain_owned: false,
        }))
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        let Some(native) = self.images.get(image) else {
            return;
        };
        if native.swapchain_owned {
            engine_error!("nova::vulkan", "Swapchain images are released with the swapchain");
            return;
        }
        if let Some(mut native) = self.images.remove(image) {
            self.free_memory(native.allocation.take());
            unsafe { self.ctx.device.destroy_image(native.image, None) };
        }
    }

    fn create_image_view(&mut self, info: &ImageViewCreateInfo) -> Result<ImageViewHandle> {
        let native = self
            .images
            .get(info.image)
            .ok_or_else(|| Error::InvalidResource("View of an unknown image".to_string()))?;

        let layers_ok = match info.view_type {
            ImageViewType::Tex2D => info.range.array_layer_count == 1,
            ImageViewType::Tex2DArray => true,
            ImageViewType::Cube => info.range.array_layer_count == 6,
            ImageViewType::CubeArray => info.range.array_layer_count % 6 == 0,
        };
        if !layers_ok {
            return Err(Error::InvalidResource(format!(
                "{:?} view cannot cover {} layers",
                info.view_type, info.range.array_layer_count
            )));
        }

        // Attachment views keep both aspects, sampled views only depth
        let mut range = subresource_range_to_vk(info.format, &info.range);
        range.aspect_mask = if native.usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
            aspect_mask(info.format)
        } else {
            view_aspect_mask(info.format)
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(native.image)
            .view_type(view_type_to_vk(info.view_type))
            .format(format_to_vk(info.format))
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(range);
        let view = unsafe {
            self.ctx
                .device
                .create_image_view(&view_info, None)
                .map_err(|e| vk_err("Failed to create image view", e))?
        };

        Ok(self.views.insert(VulkanImageView {
            view,
            image: info.image,
        }))
    }

    fn destroy_image_view(&mut self, view: ImageViewHandle) -> Result<()> {
        let Some(native) = self.views.remove(view) else {
            engine_bail!("nova::vulkan", "Destroying unknown or already destroyed view {:?}", view);
        };
        unsafe { self.ctx.device.destroy_image_view(native.view, None) };
        Ok(())
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        if desc.min_lod > desc.max_lod {
            return Err(Error::InvalidResource("Sampler min_lod exceeds max_lod".to_string()));
        }
        if matches!(desc.max_anisotropy, Some(a) if a < 1.0) {
            return Err(Error::InvalidResource("Sampler anisotropy must be at least 1".to_string()));
        }

        // Anisotropy silently disabled when the device lacks the feature
        let anisotropy = match (desc.max_anisotropy, self.ctx.max_anisotropy) {
            (Some(requested), Some(limit)) => Some(requested.min(limit)),
            _ => None,
        };

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_to_vk(desc.mag_filter))
            .min_filter(filter_to_vk(desc.min_filter))
            .mipmap_mode(mipmap_mode_to_vk(desc.mipmap_mode))
            .address_mode_u(address_mode_to_vk(desc.address_u))
            .address_mode_v(address_mode_to_vk(desc.address_v))
            .address_mode_w(address_mode_to_vk(desc.address_w))
            .mip_lod_bias(desc.mip_lod_bias)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .compare_enable(desc.compare_op.is_some())
            .compare_op(desc.compare_op.map_or(vk::CompareOp::ALWAYS, compare_op_to_vk))
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod)
            .border_color(border_color_to_vk(desc.border_color))
            .unnormalized_coordinates(false);

        let sampler = unsafe {
            self.ctx
                .device
                .create_sampler(&sampler_info, None)
                .map_err(|e| vk_err("Failed to create sampler", e))?
        };
        Ok(self.samplers.insert(sampler))
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        if let Some(native) = self.samplers.remove(sampler) {
            unsafe { self.ctx.device.destroy_sampler(native, None) };
        }
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_set_layout(&mut self, desc: &DescriptorSetLayoutDesc) -> Result<DescriptorSetLayoutHandle> {
        self.build_set_layout(desc)
    }

    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayoutHandle) {
        if let Some(native) = self.set_layouts.remove(layout) {
            unsafe { self.ctx.device.destroy_descriptor_set_layout(native.layout, None) };
        }
    }

    fn create_descriptor_pool(&mut self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        self.build_descriptor_pool(desc)
    }

    fn reset_descriptor_pool(&mut self, pool: DescriptorPoolHandle) -> Result<()> {
        self.reset_pool(pool)
    }

    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle) {
        if let Some(native) = self.pools.remove(pool) {
            for set in native.sets {
                self.sets.remove(set);
            }
            unsafe { self.ctx.device.destroy_descriptor_pool(native.pool, None) };
        }
    }

    fn allocate_descriptor_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> std::result::Result<DescriptorSetHandle, AllocationError> {
        self.allocate_set(pool, layout)
    }

    fn write_descriptor(&mut self, write: &DescriptorWrite) -> Result<()> {
        self.update_descriptor(write)
    }

    // ===== PIPELINES =====

    fn create_pipeline(&mut self, desc: &PipelineDesc, layout: Option<&RenderTargetLayout>) -> Result<PipelineHandle> {
        self.build_pipeline(desc, layout)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        if let Some(native) = self.pipelines.remove(pipeline) {
            unsafe {
                self.ctx.device.destroy_pipeline(native.pipeline, None);
                self.ctx.device.destroy_pipeline_layout(native.layout, None);
                if native.render_pass != vk::RenderPass::null() {
                    self.ctx.device.destroy_render_pass(native.render_pass, None);
                }
            }
        }
    }

    fn create_frame_buffer(&mut self, desc: &FrameBufferDesc) -> Result<FrameBufferHandle> {
        self.build_frame_buffer(desc)
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle) {
        if let Some(native) = self.frame_buffers.remove(frame_buffer) {
            unsafe { self.ctx.device.destroy_framebuffer(native, None) };
        }
    }

    // ===== COMMANDS =====

    fn create_command_pool(&mut self, role: QueueRole) -> Result<CommandPoolHandle> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.ctx.families.family(role));
        let pool = unsafe {
            self.ctx
                .device
                .create_command_pool(&pool_info, None)
                .map_err(|e| vk_err("Failed to create command pool", e))?
        };
        Ok(self.command_pools.insert(VulkanCommandPool {
            pool,
            role,
            buffers: Vec::new(),
        }))
    }

    fn reset_command_pool(&mut self, pool: CommandPoolHandle) -> Result<()> {
        let native = lookup(&self.command_pools, pool, "command pool")?;
        unsafe {
            self.ctx
                .device
                .reset_command_pool(native.pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| vk_err("Failed to reset command pool", e))
        }
    }

    fn destroy_command_pool(&mut self, pool: CommandPoolHandle) {
        if let Some(native) = self.command_pools.remove(pool) {
            for cmd in native.buffers {
                self.command_buffers.remove(cmd);
            }
            // Destroying the pool frees its command buffers
            unsafe { self.ctx.device.destroy_command_pool(native.pool, None) };
        }
    }

    fn allocate_command_buffer(&mut self, pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        let native_pool = lookup(&self.command_pools, pool, "command pool")?.pool;
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(native_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe {
            self.ctx
                .device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| vk_err("Failed to allocate command buffer", e))?
        };
        let Some(&buffer) = buffers.first() else {
            engine_bail!("nova::vulkan", "Driver returned no command buffer");
        };

        let cmd = self.command_buffers.insert(VulkanCommandBuffer { buffer, pool });
        if let Some(native) = self.command_pools.get_mut(pool) {
            native.buffers.push(cmd);
        }
        Ok(cmd)
    }

    fn free_command_buffer(&mut self, pool: CommandPoolHandle, cmd: CommandBufferHandle) {
        let Some(native_pool) = self.command_pools.get_mut(pool) else {
            return;
        };
        native_pool.buffers.retain(|b| *b != cmd);
        let vk_pool = native_pool.pool;
        if let Some(native) = self.command_buffers.remove(cmd) {
            unsafe { self.ctx.device.free_command_buffers(vk_pool, &[native.buffer]) };
        }
    }

    fn record(&mut self, cmd: CommandBufferHandle, commands: &[Command]) -> Result<()> {
        let buffer = lookup(&self.command_buffers, cmd, "command buffer")?.buffer;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.ctx
                .device
                .begin_command_buffer(buffer, &begin_info)
                .map_err(|e| vk_err("Failed to begin command buffer", e))?;
        }

        if let Err(e) = self.replay(buffer, commands) {
            // Close the half-recorded buffer; the next record begins it again
            unsafe {
                let _ = self.ctx.device.end_command_buffer(buffer);
            }
            return Err(e);
        }

        unsafe {
            self.ctx
                .device
                .end_command_buffer(buffer)
                .map_err(|e| vk_err("Failed to end command buffer", e))
        }
    }

    fn submit(&mut self, role: QueueRole, cmds: &[CommandBufferHandle], info: &SubmitInfo) -> Result<()> {
        let mut buffers = Vec::with_capacity(cmds.len());
        for cmd in cmds {
            let native = lookup(&self.command_buffers, *cmd, "command buffer")?;
            let pool_role = lookup(&self.command_pools, native.pool, "command pool")?.role;
            if self.ctx.families.family(pool_role) != self.ctx.families.family(role) {
                engine_bail!(
                    "nova::vulkan",
                    "Command buffer from a {:?} pool submitted to the {:?} queue",
                    pool_role,
                    role
                );
            }
            buffers.push(native.buffer);
        }

        let mut wait_semaphores = Vec::with_capacity(info.wait.len());
        let mut wait_stages = Vec::with_capacity(info.wait.len());
        for (semaphore, stage) in &info.wait {
            wait_semaphores.push(self.semaphore(*semaphore)?);
            wait_stages.push(pipeline_stage_to_vk(*stage));
        }
        let signal_semaphores = info
            .signal
            .iter()
            .map(|s| self.semaphore(*s))
            .collect::<Result<Vec<_>>>()?;
        let fence = match info.fence {
            Some(fence) => *lookup(&self.fences, fence, "fence")?,
            None => vk::Fence::null(),
        };

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.queue(role), &[submit_info], fence)
                .map_err(|e| vk_err("Failed to submit command buffers", e))
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.ctx.device.device_wait_idle() {
                engine_error!("nova::vulkan", "Device wait idle failed during shutdown: {:?}", e);
            }
        }

        let leaked = self.buffers.len() + self.images.len() - self.swapchain.as_ref().map_or(0, |s| s.images.len());
        if leaked > 0 {
            engine_debug!("nova::vulkan", "Releasing {} buffers/images still alive at shutdown", leaked);
        }

        let device = self.ctx.device.clone();
        unsafe {
            for (_, cmd_pool) in self.command_pools.drain() {
                device.destroy_command_pool(cmd_pool.pool, None);
            }
            self.command_buffers.clear();
            for (_, frame_buffer) in self.frame_buffers.drain() {
                device.destroy_framebuffer(frame_buffer, None);
            }
            for (_, pipeline) in self.pipelines.drain() {
                device.destroy_pipeline(pipeline.pipeline, None);
                device.destroy_pipeline_layout(pipeline.layout, None);
                if pipeline.render_pass != vk::RenderPass::null() {
                    device.destroy_render_pass(pipeline.render_pass, None);
                }
            }
            self.sets.clear();
            for (_, pool) in self.pools.drain() {
                device.destroy_descriptor_pool(pool.pool, None);
            }
            for (_, layout) in self.set_layouts.drain() {
                device.destroy_descriptor_set_layout(layout.layout, None);
            }
            for (_, sampler) in self.samplers.drain() {
                device.destroy_sampler(sampler, None);
            }
            for (_, view) in self.views.drain() {
                device.destroy_image_view(view.view, None);
            }
            for (_, fence) in self.fences.drain() {
                device.destroy_fence(fence, None);
            }
            for (_, semaphore) in self.semaphores.drain() {
                device.destroy_semaphore(semaphore, None);
            }
        }

        let buffers: Vec<VulkanBuffer> = self.buffers.drain().map(|(_, b)| b).collect();
        for mut buffer in buffers {
            self.free_memory(buffer.allocation.take());
            unsafe { device.destroy_buffer(buffer.buffer, None) };
        }
        let images: Vec<VulkanImage> = self.images.drain().map(|(_, i)| i).collect();
        for mut image in images {
            if image.swapchain_owned {
                continue;
            }
            self.free_memory(image.allocation.take());
            unsafe { device.destroy_image(image.image, None) };
        }

        if let Some(swapchain) = self.swapchain.take() {
            unsafe { self.ctx.swapchain_loader.destroy_swapchain(swapchain.swapchain, None) };
        }
    }
}
