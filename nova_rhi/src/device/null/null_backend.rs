/// Null backend driver state and `Backend` implementation

use std::any::Any;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use crate::error::{Error, Result};
use crate::command::Command;
use crate::device::backend::{AllocationError, Backend, BackendInit, SubmitInfo};
use crate::device::config::BackendKind;
use crate::device::handles::*;
use crate::device::null::{NullBarrier, NullBlit, NullDeviceConfig, NullEvent, NullStats, NullSubmission};
use crate::device::selection::{select_adapter, select_queue_families, AdapterInfo, QueueFamilies};
use crate::device::swapchain::{AcquireOutcome, PresentOutcome, SurfaceCapabilities, SwapchainDesc};
use crate::device::types::{
    Extent2D, Extent3D, ImageState, ImageUsage, MemoryLocation, QueueRole, SubresourceRange,
};
use crate::pipeline::{
    DescriptorPoolDesc, DescriptorResource, DescriptorSetLayoutDesc, DescriptorType,
    DescriptorWrite, FrameBufferDesc, PipelineBindPoint, PipelineDesc, RenderTargetLayout,
    SamplerDesc,
};
use crate::resource::{BufferCreateInfo, ImageCreateInfo, ImageViewCreateInfo, ImageViewType};

// ============================================================================
// Native objects
// ============================================================================

/// Byte range `offset..offset + len`, if it fits in `size` bytes
pub(super) fn byte_range(offset: u64, len: u64, size: usize) -> Option<std::ops::Range<usize>> {
    let end = offset.checked_add(len)?;
    if end > size as u64 {
        return None;
    }
    Some(offset as usize..end as usize)
}

pub(super) struct NullBuffer {
    pub(super) data: Vec<u8>,
    pub(super) location: MemoryLocation,
}

pub(super) struct NullSubresource {
    pub(super) state: ImageState,
    pub(super) data: Vec<u8>,
}

pub(super) struct NullImage {
    pub(super) info: ImageCreateInfo,
    pub(super) subresources: Vec<NullSubresource>,
}

impl NullImage {
    fn new(info: ImageCreateInfo) -> Self {
        let bpp = info.format.bytes_per_pixel() as u64;
        let mut subresources = Vec::with_capacity((info.mip_levels * info.array_layers) as usize);
        for mip in 0..info.mip_levels {
            let size = info.extent.mip(mip).texel_count() * bpp;
            for _ in 0..info.array_layers {
                subresources.push(NullSubresource {
                    state: ImageState::Undefined,
                    data: vec![0u8; size as usize],
                });
            }
        }
        Self { info, subresources }
    }

    pub(super) fn index(&self, mip: u32, layer: u32) -> usize {
        (mip * self.info.array_layers + layer) as usize
    }

    pub(super) fn contains(&self, range: &SubresourceRange) -> bool {
        range.mip_level_count > 0
            && range.array_layer_count > 0
            && range.base_mip_level as u64 + range.mip_level_count as u64 <= self.info.mip_levels as u64
            && range.base_array_layer as u64 + range.array_layer_count as u64 <= self.info.array_layers as u64
    }

    pub(super) fn mip_extent(&self, mip: u32) -> Extent3D {
        self.info.extent.mip(mip)
    }
}

pub(super) struct NullView {
    pub(super) image: ImageHandle,
    pub(super) range: SubresourceRange,
}

pub(super) struct NullDescriptorPool {
    max_sets: u32,
    capacity: [u32; DescriptorType::COUNT],
    used: [u32; DescriptorType::COUNT],
    sets: Vec<DescriptorSetHandle>,
}

pub(super) struct NullDescriptorSet {
    layout: DescriptorSetLayoutHandle,
}

pub(super) struct NullPipeline {
    pub(super) bind_point: PipelineBindPoint,
    pub(super) layout: Option<RenderTargetLayout>,
}

pub(super) struct NullFrameBuffer {
    pub(super) pipeline: PipelineHandle,
    pub(super) attachments: Vec<ImageViewHandle>,
}

struct NullCommandPool {
    role: QueueRole,
    buffers: Vec<CommandBufferHandle>,
}

struct NullCommandBuffer {
    pool: CommandPoolHandle,
    commands: Vec<Command>,
}

struct NullSwapchain {
    images: Vec<ImageHandle>,
    acquired: Vec<bool>,
    next: usize,
}

// ============================================================================
// Backend
// ============================================================================

/// Headless in-memory backend
pub struct NullBackend {
    config: NullDeviceConfig,
    adapter: AdapterInfo,
    families: QueueFamilies,
    surface_extent: Option<Extent2D>,
    out_of_date: bool,
    swapchain: Option<NullSwapchain>,

    pub(super) buffers: SlotMap<BufferHandle, NullBuffer>,
    pub(super) images: SlotMap<ImageHandle, NullImage>,
    pub(super) views: SlotMap<ImageViewHandle, NullView>,
    samplers: SlotMap<SamplerHandle, SamplerDesc>,
    set_layouts: SlotMap<DescriptorSetLayoutHandle, DescriptorSetLayoutDesc>,
    pools: SlotMap<DescriptorPoolHandle, NullDescriptorPool>,
    pub(super) sets: SlotMap<DescriptorSetHandle, NullDescriptorSet>,
    pub(super) pipelines: SlotMap<PipelineHandle, NullPipeline>,
    pub(super) frame_buffers: SlotMap<FrameBufferHandle, NullFrameBuffer>,
    fences: SlotMap<FenceHandle, bool>,
    semaphores: SlotMap<SemaphoreHandle, bool>,
    command_pools: SlotMap<CommandPoolHandle, NullCommandPool>,
    command_buffers: SlotMap<CommandBufferHandle, NullCommandBuffer>,

    events: Vec<NullEvent>,
    pub(super) barriers: Vec<NullBarrier>,
    pub(super) blits: Vec<NullBlit>,
    pub(super) stats: NullStats,
    view_destroys: FxHashMap<ImageViewHandle, u32>,
}

impl NullBackend {
    /// Build the simulated device described by `init.config.null_device`
    pub fn new(init: &BackendInit<'_>) -> Result<Self> {
        let config = init.config.null_device.clone();
        let adapter_index = select_adapter(&config.adapters)?;
        let adapter = config.adapters[adapter_index].clone();
        let families = select_queue_families(&config.queue_families)?;

        crate::engine_info!(
            "nova::null",
            "Null device ready ({}x{} requested)",
            init.width,
            init.height
        );

        Ok(Self {
            config,
            adapter,
            families,
            surface_extent: None,
            out_of_date: false,
            swapchain: None,
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
            events: Vec::new(),
            barriers: Vec::new(),
            blits: Vec::new(),
            stats: NullStats::default(),
            view_destroys: FxHashMap::default(),
        })
    }

    // ===== TEST CONTROLS =====

    /// Make the next acquire/present report an out-of-date surface
    pub fn mark_surface_out_of_date(&mut self) {
        self.out_of_date = true;
    }

    /// Force (or release) the extent the surface dictates
    pub fn set_surface_extent(&mut self, extent: Option<Extent2D>) {
        self.surface_extent = extent;
    }

    // ===== INSPECTION =====

    pub fn events(&self) -> &[NullEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Executed submissions, in order
    pub fn submissions(&self) -> Vec<&NullSubmission> {
        self.events
            .iter()
            .filter_map(|event| match event {
                NullEvent::Submit(submission) => Some(submission),
                _ => None,
            })
            .collect()
    }

    pub fn barriers(&self) -> &[NullBarrier] {
        &self.barriers
    }

    pub fn blits(&self) -> &[NullBlit] {
        &self.blits
    }

    pub fn stats(&self) -> NullStats {
        self.stats
    }

    pub fn image_state(&self, image: ImageHandle, mip: u32, layer: u32) -> Option<ImageState> {
        let native = self.images.get(image)?;
        native.subresources.get(native.index(mip, layer)).map(|s| s.state)
    }

    /// Texels of one subresource, tightly packed
    pub fn image_data(&self, image: ImageHandle, mip: u32, layer: u32) -> Option<&[u8]> {
        let native = self.images.get(image)?;
        native.subresources.get(native.index(mip, layer)).map(|s| s.data.as_slice())
    }

    pub fn image_extent(&self, image: ImageHandle, mip: u32) -> Option<Extent3D> {
        self.images.get(image).map(|native| native.mip_extent(mip))
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.data.as_slice())
    }

    /// Times `view` was successfully destroyed
    pub fn view_destroy_count(&self, view: ImageViewHandle) -> u32 {
        self.view_destroys.get(&view).copied().unwrap_or(0)
    }

    pub fn is_view_alive(&self, view: ImageViewHandle) -> bool {
        self.views.contains_key(view)
    }

    pub fn live_image_count(&self) -> usize {
        self.images.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_view_count(&self) -> usize {
        self.views.len()
    }

    pub fn live_descriptor_pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn is_fence_alive(&self, fence: FenceHandle) -> bool {
        self.fences.contains_key(fence)
    }

    pub fn is_semaphore_alive(&self, semaphore: SemaphoreHandle) -> bool {
        self.semaphores.contains_key(semaphore)
    }

    pub fn semaphore_signaled(&self, semaphore: SemaphoreHandle) -> Option<bool> {
        self.semaphores.get(semaphore).copied()
    }

    pub fn swapchain_images(&self) -> Vec<ImageHandle> {
        self.swapchain.as_ref().map(|s| s.images.clone()).unwrap_or_default()
    }

    // ===== INTERNAL =====

    fn semaphore_mut(&mut self, semaphore: SemaphoreHandle) -> Result<&mut bool> {
        self.semaphores
            .get_mut(semaphore)
            .ok_or_else(|| Error::InvalidResource("Unknown semaphore".to_string()))
    }

    /// Consume a wait on `semaphore`; waiting on an unsignaled binary semaphore never completes
    fn consume_wait(&mut self, semaphore: SemaphoreHandle) -> Result<()> {
        let signaled = self.semaphore_mut(semaphore)?;
        if !*signaled {
            return Err(crate::engine_err!(
                "nova::null",
                "Wait on semaphore {:?} that has no pending signal",
                semaphore
            ));
        }
        *signaled = false;
        Ok(())
    }

    fn signal_semaphore(&mut self, semaphore: SemaphoreHandle) -> Result<()> {
        let signaled = self.semaphore_mut(semaphore)?;
        if *signaled {
            return Err(crate::engine_err!(
                "nova::null",
                "Signal of semaphore {:?} that is already signaled",
                semaphore
            ));
        }
        *signaled = true;
        Ok(())
    }

    fn pool_exhausted(&self) -> AllocationError {
        if self.config.report_fragmentation {
            AllocationError::FragmentedPool
        } else {
            AllocationError::OutOfPoolMemory
        }
    }
}

impl Backend for NullBackend {
    // ===== IDENTITY =====

    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    // ===== SWAPCHAIN =====

    fn surface_capabilities(&self) -> Result<SurfaceCapabilities> {
        let mut caps = self.config.surface.clone();
        if self.surface_extent.is_some() {
            caps.current_extent = self.surface_extent;
        }
        Ok(caps)
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<Vec<ImageHandle>> {
        let caps = self.surface_capabilities()?;
        if desc.extent.width < caps.min_extent.width
            || desc.extent.height < caps.min_extent.height
            || desc.extent.width > caps.max_extent.width
            || desc.extent.height > caps.max_extent.height
        {
            crate::engine_bail!("nova::null", "Swapchain extent {:?} outside surface bounds", desc.extent);
        }
        if !caps.formats.contains(&desc.format) {
            crate::engine_bail!("nova::null", "Surface does not support {:?}", desc.format);
        }

        self.destroy_swapchain();
        if self.swapchain.is_some() {
            crate::engine_bail!("nova::null", "Previous swapchain images still have live views");
        }

        let info = ImageCreateInfo {
            extent: Extent3D::new(desc.extent.width, desc.extent.height, 1),
            format: desc.format,
            mip_levels: 1,
            array_layers: 1,
            usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_DST,
            cube_compatible: false,
        };
        let images: Vec<ImageHandle> = (0..desc.image_count)
            .map(|_| self.images.insert(NullImage::new(info)))
            .collect();

        self.swapchain = Some(NullSwapchain {
            images: images.clone(),
            acquired: vec![false; images.len()],
            next: 0,
        });
        self.out_of_date = false;

        crate::engine_debug!(
            "nova::null",
            "Swapchain created: {}x{}, {} images",
            desc.extent.width,
            desc.extent.height,
            desc.image_count
        );
        Ok(images)
    }

    fn destroy_swapchain(&mut self) {
        let Some(swapchain) = &self.swapchain else {
            return;
        };
        let has_live_views = self
            .views
            .values()
            .any(|view| swapchain.images.contains(&view.image));
        if has_live_views {
            crate::engine_error!("nova::null", "Swapchain destroyed while its image views are alive");
            return;
        }
        for image in &swapchain.images {
            self.images.remove(*image);
        }
        self.swapchain = None;
    }

    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> Result<AcquireOutcome> {
        if self.out_of_date {
            return Ok(AcquireOutcome::OutOfDate);
        }
        self.signal_semaphore(signal)?;

        let Some(swapchain) = self.swapchain.as_mut() else {
            crate::engine_bail!("nova::null", "acquire_next_image without a swapchain");
        };
        let count = swapchain.images.len();
        let found = (0..count)
            .map(|i| (swapchain.next + i) % count)
            .find(|&index| !swapchain.acquired[index]);
        let Some(index) = found else {
            crate::engine_bail!("nova::null", "Every swapchain image is already acquired");
        };
        swapchain.acquired[index] = true;
        swapchain.next = (index + 1) % count;

        self.events.push(NullEvent::Acquire {
            image_index: index as u32,
            semaphore: signal,
        });
        Ok(AcquireOutcome::Image(index as u32))
    }

    fn present(&mut self, image_index: u32, wait: &[SemaphoreHandle]) -> Result<PresentOutcome> {
        for semaphore in wait {
            self.consume_wait(*semaphore)?;
        }

        let Some(swapchain) = self.swapchain.as_mut() else {
            crate::engine_bail!("nova::null", "present without a swapchain");
        };
        let index = image_index as usize;
        if index >= swapchain.images.len() || !swapchain.acquired[index] {
            crate::engine_bail!("nova::null", "Presenting image {} that was not acquired", image_index);
        }
        swapchain.acquired[index] = false;
        let image = swapchain.images[index];

        if self.out_of_date {
            return Ok(PresentOutcome::OutOfDate);
        }

        let state = self.image_state(image, 0, 0);
        if state != Some(ImageState::Present) {
            crate::engine_bail!(
                "nova::null",
                "Presenting image {} in state {:?} (expected Present)",
                image_index,
                state
            );
        }

        self.events.push(NullEvent::Present {
            image_index,
            wait: wait.to_vec(),
        });
        Ok(PresentOutcome::Presented)
    }

    // ===== SYNCHRONIZATION =====

    fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle> {
        Ok(self.fences.insert(signaled))
    }

    fn destroy_fence(&mut self, fence: FenceHandle) {
        self.fences.remove(fence);
    }

    fn wait_for_fence(&mut self, fence: FenceHandle, timeout_ns: u64) -> Result<bool> {
        let signaled = *self
            .fences
            .get(fence)
            .ok_or_else(|| Error::InvalidResource("Unknown fence".to_string()))?;
        self.events.push(NullEvent::FenceWait { fence, signaled });
        if !signaled && timeout_ns == u64::MAX {
            crate::engine_bail!("nova::null", "Infinite wait on fence {:?} that is never signaled", fence);
        }
        Ok(signaled)
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> Result<()> {
        let signaled = self
            .fences
            .get_mut(fence)
            .ok_or_else(|| Error::InvalidResource("Unknown fence".to_string()))?;
        *signaled = false;
        self.events.push(NullEvent::FenceReset(fence));
        Ok(())
    }

    fn fence_signaled(&self, fence: FenceHandle) -> Result<bool> {
        self.fences
            .get(fence)
            .copied()
            .ok_or_else(|| Error::InvalidResource("Unknown fence".to_string()))
    }

    fn create_semaphore(&mut self) -> Result<SemaphoreHandle> {
        Ok(self.semaphores.insert(false))
    }

    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) {
        self.semaphores.remove(semaphore);
    }

    fn queue_wait_idle(&mut self, role: QueueRole) -> Result<()> {
        self.events.push(NullEvent::QueueWaitIdle(role));
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.events.push(NullEvent::DeviceWaitIdle);
        Ok(())
    }

    // ===== BUFFERS & IMAGES =====

    fn create_buffer(&mut self, info: &BufferCreateInfo) -> Result<BufferHandle> {
        if info.size == 0 {
            return Err(Error::InvalidResource("Buffer size must be non-zero".to_string()));
        }
        Ok(self.buffers.insert(NullBuffer {
            data: vec![0u8; info.size as usize],
            location: info.location,
        }))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer);
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let native = self
            .buffers
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown buffer".to_string()))?;
        if native.location != MemoryLocation::HostVisible {
            crate::engine_bail!("nova::null", "Mapping a device-local buffer");
        }
        let Some(range) = byte_range(offset, data.len() as u64, native.data.len()) else {
            return Err(Error::InvalidResource(format!(
                "Write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                native.data.len()
            )));
        };
        native.data[range].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Result<Vec<u8>> {
        let native = self
            .buffers
            .get(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown buffer".to_string()))?;
        if native.location != MemoryLocation::HostVisible {
            crate::engine_bail!("nova::null", "Mapping a device-local buffer");
        }
        let Some(range) = byte_range(offset, size, native.data.len()) else {
            return Err(Error::InvalidResource("Read exceeds buffer size".to_string()));
        };
        Ok(native.data[range].to_vec())
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
        Ok(self.images.insert(NullImage::new(*info)))
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        self.images.remove(image);
    }

    fn create_image_view(&mut self, info: &ImageViewCreateInfo) -> Result<ImageViewHandle> {
        let native = self
            .images
            .get(info.image)
            .ok_or_else(|| Error::InvalidResource("View of an unknown image".to_string()))?;
        if !native.contains(&info.range) {
            return Err(Error::InvalidResource(format!(
                "View range {:?} outside the image",
                info.range
            )));
        }
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
        Ok(self.views.insert(NullView {
            image: info.image,
            range: info.range,
        }))
    }

    fn destroy_image_view(&mut self, view: ImageViewHandle) -> Result<()> {
        if self.views.remove(view).is_none() {
            crate::engine_bail!("nova::null", "Destroying unknown or already destroyed view {:?}", view);
        }
        *self.view_destroys.entry(view).or_insert(0) += 1;
        Ok(())
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        if desc.min_lod > desc.max_lod {
            return Err(Error::InvalidResource("Sampler min_lod exceeds max_lod".to_string()));
        }
        if matches!(desc.max_anisotropy, Some(a) if a < 1.0) {
            return Err(Error::InvalidResource("Sampler anisotropy must be at least 1".to_string()));
        }
        Ok(self.samplers.insert(*desc))
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(sampler);
    }

    // ===== DESCRIPTORS =====

    fn create_descriptor_set_layout(&mut self, desc: &DescriptorSetLayoutDesc) -> Result<DescriptorSetLayoutHandle> {
        for (i, binding) in desc.bindings.iter().enumerate() {
            if desc.bindings[..i].iter().any(|b| b.binding == binding.binding) {
                return Err(Error::InvalidResource(format!(
                    "Binding {} declared twice",
                    binding.binding
                )));
            }
        }
        Ok(self.set_layouts.insert(desc.clone()))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayoutHandle) {
        self.set_layouts.remove(layout);
    }

    fn create_descriptor_pool(&mut self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        let mut capacity = [0u32; DescriptorType::COUNT];
        for (ty, count) in &desc.pool_sizes {
            capacity[ty.index()] += count;
        }
        let max_sets = match self.config.max_sets_per_pool {
            Some(cap) => desc.max_sets.min(cap),
            None => desc.max_sets,
        };
        self.stats.descriptor_pools_created += 1;
        Ok(self.pools.insert(NullDescriptorPool {
            max_sets,
            capacity,
            used: [0; DescriptorType::COUNT],
            sets: Vec::new(),
        }))
    }

    fn reset_descriptor_pool(&mut self, pool: DescriptorPoolHandle) -> Result<()> {
        let native = self
            .pools
            .get_mut(pool)
            .ok_or_else(|| Error::InvalidResource("Unknown descriptor pool".to_string()))?;
        for set in native.sets.drain(..) {
            self.sets.remove(set);
        }
        native.used = [0; DescriptorType::COUNT];
        Ok(())
    }

    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle) {
        if let Some(native) = self.pools.remove(pool) {
            for set in native.sets {
                self.sets.remove(set);
            }
        }
    }

    fn allocate_descriptor_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> std::result::Result<DescriptorSetHandle, AllocationError> {
        let counts = self
            .set_layouts
            .get(layout)
            .map(|desc| desc.type_counts())
            .ok_or_else(|| AllocationError::Other(Error::InvalidResource("Unknown set layout".to_string())))?;
        let exhausted = self.pool_exhausted();
        let native = self
            .pools
            .get_mut(pool)
            .ok_or_else(|| AllocationError::Other(Error::InvalidResource("Unknown descriptor pool".to_string())))?;

        if native.sets.len() as u32 >= native.max_sets {
            return Err(exhausted);
        }
        let fits = (0..DescriptorType::COUNT).all(|i| native.used[i] + counts[i] <= native.capacity[i]);
        if !fits {
            return Err(exhausted);
        }

        for i in 0..DescriptorType::COUNT {
            native.used[i] += counts[i];
        }
        let set = self.sets.insert(NullDescriptorSet { layout });
        native.sets.push(set);
        Ok(set)
    }

    fn write_descriptor(&mut self, write: &DescriptorWrite) -> Result<()> {
        let set = self
            .sets
            .get(write.set)
            .ok_or_else(|| Error::InvalidResource("Write to an unknown or reset descriptor set".to_string()))?;
        let layout = self
            .set_layouts
            .get(set.layout)
            .ok_or_else(|| Error::InvalidResource("Descriptor set layout was destroyed".to_string()))?;
        let Some(binding) = layout.binding(write.binding) else {
            return Err(Error::InvalidResource(format!("Layout has no binding {}", write.binding)));
        };
        if write.array_element >= binding.count {
            return Err(Error::InvalidResource(format!(
                "Array element {} out of range for binding {} (count {})",
                write.array_element, write.binding, binding.count
            )));
        }

        let matches = match (&write.resource, binding.descriptor_type) {
            (DescriptorResource::Buffer { buffer, offset, range }, ty) if ty.is_buffer() => {
                let native = self
                    .buffers
                    .get(*buffer)
                    .ok_or_else(|| Error::InvalidResource("Unknown buffer".to_string()))?;
                if byte_range(*offset, *range, native.data.len()).is_none() {
                    return Err(Error::InvalidResource("Buffer range exceeds buffer size".to_string()));
                }
                true
            }
            (DescriptorResource::Image { view, sampler }, ty) => {
                if !self.views.contains_key(*view) {
                    return Err(Error::InvalidResource("Unknown image view".to_string()));
                }
                if let Some(sampler) = sampler {
                    if !self.samplers.contains_key(*sampler) {
                        return Err(Error::InvalidResource("Unknown sampler".to_string()));
                    }
                }
                match ty {
                    DescriptorType::CombinedImageSampler => sampler.is_some(),
                    DescriptorType::SampledImage | DescriptorType::InputAttachment => true,
                    _ => false,
                }
            }
            (DescriptorResource::StorageImage { view }, DescriptorType::StorageImage) => {
                if !self.views.contains_key(*view) {
                    return Err(Error::InvalidResource("Unknown image view".to_string()));
                }
                true
            }
            _ => false,
        };
        if !matches {
            return Err(Error::InvalidResource(format!(
                "Resource does not match binding {} of type {:?}",
                write.binding, binding.descriptor_type
            )));
        }

        self.stats.descriptor_writes += 1;
        Ok(())
    }

    // ===== PIPELINES =====

    fn create_pipeline(&mut self, desc: &PipelineDesc, layout: Option<&RenderTargetLayout>) -> Result<PipelineHandle> {
        let bind_point = desc.bind_point();
        if bind_point == PipelineBindPoint::Graphics && layout.is_none() {
            crate::engine_bail!("nova::null", "Graphics pipeline without a render target layout");
        }
        for set_layout in &desc.descriptor_set_layouts {
            if !self.set_layouts.contains_key(*set_layout) {
                return Err(Error::InvalidResource("Pipeline uses an unknown set layout".to_string()));
            }
        }
        Ok(self.pipelines.insert(NullPipeline {
            bind_point,
            layout: layout.cloned(),
        }))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        self.pipelines.remove(pipeline);
    }

    fn create_frame_buffer(&mut self, desc: &FrameBufferDesc) -> Result<FrameBufferHandle> {
        let pipeline = self
            .pipelines
            .get(desc.pipeline)
            .ok_or_else(|| Error::InvalidResource("Frame buffer for an unknown pipeline".to_string()))?;
        let Some(layout) = &pipeline.layout else {
            return Err(Error::InvalidResource("Frame buffer for a compute pipeline".to_string()));
        };
        if layout.attachment_count() != desc.attachments.len() {
            return Err(Error::InvalidResource(format!(
                "Frame buffer has {} attachments, pipeline expects {}",
                desc.attachments.len(),
                layout.attachment_count()
            )));
        }

        for (i, view) in desc.attachments.iter().enumerate() {
            let native_view = self
                .views
                .get(*view)
                .ok_or_else(|| Error::InvalidResource(format!("Attachment {} is an unknown view", i)))?;
            let image = self
                .images
                .get(native_view.image)
                .ok_or_else(|| Error::InvalidResource(format!("Attachment {} views a destroyed image", i)))?;
            if image.info.format != layout.attachments[i].format {
                return Err(Error::InvalidResource(format!(
                    "Attachment {} is {:?}, layout expects {:?}",
                    i, image.info.format, layout.attachments[i].format
                )));
            }
            let extent = image.mip_extent(native_view.range.base_mip_level);
            if extent.width < desc.width || extent.height < desc.height {
                return Err(Error::InvalidResource(format!(
                    "Attachment {} ({}x{}) smaller than the frame buffer",
                    i, extent.width, extent.height
                )));
            }
        }

        Ok(self.frame_buffers.insert(NullFrameBuffer {
            pipeline: desc.pipeline,
            attachments: desc.attachments.clone(),
        }))
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle) {
        self.frame_buffers.remove(frame_buffer);
    }

    // ===== COMMANDS =====

    fn create_command_pool(&mut self, role: QueueRole) -> Result<CommandPoolHandle> {
        Ok(self.command_pools.insert(NullCommandPool {
            role,
            buffers: Vec::new(),
        }))
    }

    fn reset_command_pool(&mut self, pool: CommandPoolHandle) -> Result<()> {
        let native = self
            .command_pools
            .get(pool)
            .ok_or_else(|| Error::InvalidResource("Unknown command pool".to_string()))?;
        for cmd in &native.buffers {
            if let Some(buffer) = self.command_buffers.get_mut(*cmd) {
                buffer.commands.clear();
            }
        }
        Ok(())
    }

    fn destroy_command_pool(&mut self, pool: CommandPoolHandle) {
        if let Some(native) = self.command_pools.remove(pool) {
            for cmd in native.buffers {
                self.command_buffers.remove(cmd);
            }
        }
    }

    fn allocate_command_buffer(&mut self, pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        if !self.command_pools.contains_key(pool) {
            return Err(Error::InvalidResource("Unknown command pool".to_string()));
        }
        let cmd = self.command_buffers.insert(NullCommandBuffer {
            pool,
            commands: Vec::new(),
        });
        if let Some(native) = self.command_pools.get_mut(pool) {
            native.buffers.push(cmd);
        }
        Ok(cmd)
    }

    fn free_command_buffer(&mut self, pool: CommandPoolHandle, cmd: CommandBufferHandle) {
        if let Some(native) = self.command_pools.get_mut(pool) {
            native.buffers.retain(|b| *b != cmd);
        }
        self.command_buffers.remove(cmd);
    }

    fn record(&mut self, cmd: CommandBufferHandle, commands: &[Command]) -> Result<()> {
        let native = self
            .command_buffers
            .get_mut(cmd)
            .ok_or_else(|| Error::InvalidResource("Unknown command buffer".to_string()))?;
        native.commands = commands.to_vec();
        Ok(())
    }

    fn submit(&mut self, role: QueueRole, cmds: &[CommandBufferHandle], info: &SubmitInfo) -> Result<()> {
        let mut commands = Vec::new();
        for cmd in cmds {
            let native = self
                .command_buffers
                .get(*cmd)
                .ok_or_else(|| Error::InvalidResource("Submitting an unknown command buffer".to_string()))?;
            let pool_role = self
                .command_pools
                .get(native.pool)
                .map(|p| p.role)
                .ok_or_else(|| Error::InvalidResource("Command buffer pool was destroyed".to_string()))?;
            if self.families.family(pool_role) != self.families.family(role) {
                crate::engine_bail!(
                    "nova::null",
                    "Command buffer from a {:?} pool submitted to the {:?} queue",
                    pool_role,
                    role
                );
            }
            commands.extend(native.commands.iter().cloned());
        }

        if let Some(fence) = info.fence {
            let signaled = self.fence_signaled(fence)?;
            if signaled {
                crate::engine_bail!("nova::null", "Submitting with fence {:?} that is still signaled", fence);
            }
        }
        for (semaphore, _) in &info.wait {
            self.consume_wait(*semaphore)?;
        }

        self.execute(&commands)?;

        for semaphore in &info.signal {
            self.signal_semaphore(*semaphore)?;
        }
        if let Some(fence) = info.fence {
            if let Some(signaled) = self.fences.get_mut(fence) {
                *signaled = true;
            }
        }

        self.stats.submissions += 1;
        self.events.push(NullEvent::Submit(NullSubmission {
            role,
            wait: info.wait.clone(),
            signal: info.signal.clone(),
            fence: info.fence,
            commands,
        }));
        Ok(())
    }
}

#[cfg(test)]
#[path = "null_backend_tests.rs"]
mod tests;
