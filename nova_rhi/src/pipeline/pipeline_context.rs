/// Pipeline context: samplers, descriptors, pipelines and frame buffers
///
/// Creation calls validate their descriptions before reaching the backend,
/// so every backend sees the same well-formed input.

use slotmap::SecondaryMap;
use crate::error::{Error, Result};
use crate::device::backend::Backend;
use crate::device::handles::{
    BufferHandle, DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle,
    FrameBufferHandle, ImageViewHandle, PipelineHandle, SamplerHandle,
};
use crate::pipeline::descriptor::{
    DescriptorPoolDesc, DescriptorResource, DescriptorSetLayoutDesc, DescriptorWrite, SamplerDesc,
};
use crate::pipeline::descriptor_allocator::{DescriptorAllocator, DescriptorAllocatorStats};
use crate::pipeline::render_target::RenderTargetLayout;
use crate::pipeline::types::{FrameBufferDesc, PipelineBindPoint, PipelineDesc, ShaderStage};

// ============================================================================
// Records
// ============================================================================

/// Pipeline owned by the pipeline context
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub(crate) handle: PipelineHandle,
    pub(crate) bind_point: PipelineBindPoint,
    pub(crate) layout: Option<RenderTargetLayout>,
    pub(crate) set_layouts: Vec<DescriptorSetLayoutHandle>,
}

impl Pipeline {
    pub fn handle(&self) -> PipelineHandle {
        self.handle
    }

    pub fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    /// Flattened render target (None for compute pipelines)
    ///
    /// Frame buffers must supply their views in this attachment order.
    pub fn render_target_layout(&self) -> Option<&RenderTargetLayout> {
        self.layout.as_ref()
    }

    pub fn set_layouts(&self) -> &[DescriptorSetLayoutHandle] {
        &self.set_layouts
    }
}

/// Frame buffer owned by the pipeline context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub(crate) handle: FrameBufferHandle,
    pub(crate) pipeline: PipelineHandle,
    pub(crate) attachments: Vec<ImageViewHandle>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) layers: u32,
}

impl FrameBuffer {
    pub fn handle(&self) -> FrameBufferHandle {
        self.handle
    }

    pub fn pipeline(&self) -> PipelineHandle {
        self.pipeline
    }

    pub fn attachments(&self) -> &[ImageViewHandle] {
        &self.attachments
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }
}

// ============================================================================
// Store
// ============================================================================

/// Pipeline-side records owned by the factory
pub struct PipelineStore {
    samplers: SecondaryMap<SamplerHandle, SamplerDesc>,
    set_layouts: SecondaryMap<DescriptorSetLayoutHandle, DescriptorSetLayoutDesc>,
    pools: SecondaryMap<DescriptorPoolHandle, u32>,
    pipelines: SecondaryMap<PipelineHandle, Pipeline>,
    frame_buffers: SecondaryMap<FrameBufferHandle, FrameBuffer>,
    transient: DescriptorAllocator,
}

impl PipelineStore {
    pub(crate) fn new() -> Self {
        Self {
            samplers: SecondaryMap::new(),
            set_layouts: SecondaryMap::new(),
            pools: SecondaryMap::new(),
            pipelines: SecondaryMap::new(),
            frame_buffers: SecondaryMap::new(),
            transient: DescriptorAllocator::new(),
        }
    }

    /// Release every object still alive, dependents first
    pub(crate) fn destroy(&mut self, backend: &mut dyn Backend) {
        self.transient.destroy(backend);
        for (pool, _) in self.pools.drain() {
            backend.destroy_descriptor_pool(pool);
        }
        for (frame_buffer, _) in self.frame_buffers.drain() {
            backend.destroy_frame_buffer(frame_buffer);
        }
        for (pipeline, _) in self.pipelines.drain() {
            backend.destroy_pipeline(pipeline);
        }
        for (layout, _) in self.set_layouts.drain() {
            backend.destroy_descriptor_set_layout(layout);
        }
        for (sampler, _) in self.samplers.drain() {
            backend.destroy_sampler(sampler);
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_pipeline(desc: &PipelineDesc) -> Result<()> {
    if desc.shader_stages.is_empty() {
        return Err(Error::InvalidResource("Pipeline needs at least one shader stage".to_string()));
    }
    for stage in &desc.shader_stages {
        if stage.code.is_empty() || stage.code.len() % 4 != 0 {
            return Err(Error::InvalidResource(format!(
                "{:?} shader bytecode length {} is not a non-zero multiple of 4",
                stage.stage,
                stage.code.len()
            )));
        }
        if stage.entry_point.is_empty() {
            return Err(Error::InvalidResource(format!("{:?} shader has no entry point", stage.stage)));
        }
    }

    let has = |wanted: ShaderStage| desc.shader_stages.iter().filter(|s| s.stage == wanted).count();

    if has(ShaderStage::Compute) > 0 {
        if desc.shader_stages.len() != 1 {
            return Err(Error::InvalidResource(
                "A compute stage must be the pipeline's only stage".to_string(),
            ));
        }
        if desc.render_target.is_some() {
            return Err(Error::InvalidResource("Compute pipelines have no render target".to_string()));
        }
        return Ok(());
    }

    if has(ShaderStage::Vertex) != 1 || has(ShaderStage::Fragment) > 1 {
        return Err(Error::InvalidResource(
            "Graphics pipelines need exactly one vertex stage and at most one fragment stage".to_string(),
        ));
    }
    let Some(target) = &desc.render_target else {
        return Err(Error::InvalidResource("Graphics pipeline without a render target".to_string()));
    };

    let colors = target.colors.len();
    let blends = desc.color_blend.len();
    if blends != 1 && blends != colors {
        return Err(Error::InvalidResource(format!(
            "{} blend states for {} color attachments (expected 1 or {})",
            blends, colors, colors
        )));
    }

    for attribute in &desc.vertex_layout.attributes {
        if !desc.vertex_layout.bindings.iter().any(|b| b.binding == attribute.binding) {
            return Err(Error::InvalidResource(format!(
                "Vertex attribute at location {} uses undeclared binding {}",
                attribute.location, attribute.binding
            )));
        }
    }

    for range in &desc.push_constant_ranges {
        if range.size == 0 || range.offset % 4 != 0 || range.size % 4 != 0 {
            return Err(Error::InvalidResource(format!(
                "Push constant range {}+{} must be non-empty and 4-byte aligned",
                range.offset, range.size
            )));
        }
    }

    Ok(())
}

// ============================================================================
// Context
// ============================================================================

/// Borrowed view over the backend and the pipeline store
pub struct PipelineContext<'a> {
    backend: &'a mut dyn Backend,
    store: &'a mut PipelineStore,
}

impl<'a> PipelineContext<'a> {
    pub(crate) fn new(backend: &'a mut dyn Backend, store: &'a mut PipelineStore) -> Self {
        Self { backend, store }
    }

    // ===== SAMPLERS =====

    pub fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let sampler = self.backend.create_sampler(desc)?;
        self.store.samplers.insert(sampler, *desc);
        Ok(sampler)
    }

    pub fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        if self.store.samplers.remove(sampler).is_some() {
            self.backend.destroy_sampler(sampler);
        }
    }

    // ===== DESCRIPTOR SET LAYOUTS =====

    pub fn create_descriptor_set_layout(&mut self, desc: &DescriptorSetLayoutDesc) -> Result<DescriptorSetLayoutHandle> {
        if let Some(binding) = desc.bindings.iter().find(|b| b.count == 0) {
            return Err(Error::InvalidResource(format!(
                "Binding {} has an empty descriptor array",
                binding.binding
            )));
        }
        let layout = self.backend.create_descriptor_set_layout(desc)?;
        self.store.set_layouts.insert(layout, desc.clone());
        Ok(layout)
    }

    pub fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayoutHandle) {
        if self.store.set_layouts.remove(layout).is_some() {
            self.backend.destroy_descriptor_set_layout(layout);
        }
    }

    pub fn descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) -> Option<&DescriptorSetLayoutDesc> {
        self.store.set_layouts.get(layout)
    }

    // ===== DESCRIPTOR POOLS =====

    /// Fixed-capacity pool for explicit allocations
    pub fn create_descriptor_pool(&mut self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        if desc.max_sets == 0 {
            return Err(Error::InvalidResource("Descriptor pool must hold at least one set".to_string()));
        }
        let pool = self.backend.create_descriptor_pool(desc)?;
        self.store.pools.insert(pool, desc.max_sets);
        Ok(pool)
    }

    /// Return every set of the pool at once
    pub fn reset_descriptor_pool(&mut self, pool: DescriptorPoolHandle) -> Result<()> {
        if !self.store.pools.contains_key(pool) {
            return Err(Error::InvalidResource("Unknown descriptor pool".to_string()));
        }
        self.backend.reset_descriptor_pool(pool)
    }

    pub fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle) {
        if self.store.pools.remove(pool).is_some() {
            self.backend.destroy_descriptor_pool(pool);
        }
    }

    // ===== DESCRIPTOR SETS =====

    /// Allocate from an explicit pool
    ///
    /// # Errors
    ///
    /// `OutOfMemory` when the pool is exhausted or fragmented.
    pub fn allocate_descriptor_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle> {
        if !self.store.pools.contains_key(pool) {
            return Err(Error::InvalidResource("Unknown descriptor pool".to_string()));
        }
        Ok(self.backend.allocate_descriptor_set(pool, layout)?)
    }

    /// Allocate from the growable transient allocator
    ///
    /// Valid until the next `reset_transient_sets`.
    pub fn allocate_transient_set(&mut self, layout: DescriptorSetLayoutHandle) -> Result<DescriptorSetHandle> {
        self.store.transient.allocate(self.backend, layout)
    }

    /// Invalidate every transient set and recycle their pools
    pub fn reset_transient_sets(&mut self) -> Result<()> {
        self.store.transient.clean_up(self.backend)
    }

    pub fn transient_stats(&self) -> DescriptorAllocatorStats {
        self.store.transient.stats()
    }

    /// Write a buffer range into one array element of a binding
    pub fn bind_buffer(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        array_element: u32,
        buffer: BufferHandle,
        offset: u64,
        range: u64,
    ) -> Result<()> {
        self.backend.write_descriptor(&DescriptorWrite {
            set,
            binding,
            array_element,
            resource: DescriptorResource::Buffer { buffer, offset, range },
        })
    }

    /// Write a sampled image (with its sampler for combined image-samplers)
    pub fn bind_image(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        array_element: u32,
        view: ImageViewHandle,
        sampler: Option<SamplerHandle>,
    ) -> Result<()> {
        self.backend.write_descriptor(&DescriptorWrite {
            set,
            binding,
            array_element,
            resource: DescriptorResource::Image { view, sampler },
        })
    }

    pub fn bind_storage_image(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        array_element: u32,
        view: ImageViewHandle,
    ) -> Result<()> {
        self.backend.write_descriptor(&DescriptorWrite {
            set,
            binding,
            array_element,
            resource: DescriptorResource::StorageImage { view },
        })
    }

    // ===== PIPELINES =====

    /// Validate `desc`, flatten its render target and build the pipeline
    pub fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle> {
        validate_pipeline(desc)?;
        for layout in &desc.descriptor_set_layouts {
            if !self.store.set_layouts.contains_key(*layout) {
                return Err(Error::InvalidResource("Pipeline uses an unknown set layout".to_string()));
            }
        }

        let layout = match &desc.render_target {
            Some(target) => Some(RenderTargetLayout::build(target)?),
            None => None,
        };
        let handle = self.backend.create_pipeline(desc, layout.as_ref())?;

        let bind_point = desc.bind_point();
        crate::engine_debug!(
            "nova::pipeline",
            "{:?} pipeline created ({} stages, {} attachments)",
            bind_point,
            desc.shader_stages.len(),
            layout.as_ref().map_or(0, |l| l.attachment_count())
        );

        self.store.pipelines.insert(
            handle,
            Pipeline {
                handle,
                bind_point,
                layout,
                set_layouts: desc.descriptor_set_layouts.clone(),
            },
        );
        Ok(handle)
    }

    /// Destroy a pipeline and every frame buffer built against it
    pub fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        if self.store.pipelines.remove(pipeline).is_none() {
            return;
        }
        let dependents: Vec<FrameBufferHandle> = self
            .store
            .frame_buffers
            .iter()
            .filter(|(_, fb)| fb.pipeline == pipeline)
            .map(|(handle, _)| handle)
            .collect();
        for frame_buffer in dependents {
            crate::engine_trace!("nova::pipeline", "Destroying frame buffer of a destroyed pipeline");
            self.destroy_frame_buffer(frame_buffer);
        }
        self.backend.destroy_pipeline(pipeline);
    }

    pub fn pipeline(&self, pipeline: PipelineHandle) -> Option<&Pipeline> {
        self.store.pipelines.get(pipeline)
    }

    pub fn pipeline_count(&self) -> usize {
        self.store.pipelines.len()
    }

    // ===== FRAME BUFFERS =====

    /// Bind attachment views to a graphics pipeline's render target
    ///
    /// # Errors
    ///
    /// `InvalidResource` when the view count differs from the pipeline's
    /// attachment count or a dimension is zero.
    pub fn create_frame_buffer(&mut self, desc: &FrameBufferDesc) -> Result<FrameBufferHandle> {
        let pipeline = self
            .store
            .pipelines
            .get(desc.pipeline)
            .ok_or_else(|| Error::InvalidResource("Frame buffer for an unknown pipeline".to_string()))?;
        let Some(layout) = &pipeline.layout else {
            return Err(Error::InvalidResource("Frame buffer for a compute pipeline".to_string()));
        };
        if desc.attachments.len() != layout.attachment_count() {
            return Err(Error::InvalidResource(format!(
                "Frame buffer has {} attachments, pipeline expects {}",
                desc.attachments.len(),
                layout.attachment_count()
            )));
        }
        if desc.width == 0 || desc.height == 0 || desc.layers == 0 {
            return Err(Error::InvalidResource(format!(
                "Frame buffer dimensions must be non-zero ({}x{}x{})",
                desc.width, desc.height, desc.layers
            )));
        }

        let handle = self.backend.create_frame_buffer(desc)?;
        self.store.frame_buffers.insert(
            handle,
            FrameBuffer {
                handle,
                pipeline: desc.pipeline,
                attachments: desc.attachments.clone(),
                width: desc.width,
                height: desc.height,
                layers: desc.layers,
            },
        );
        Ok(handle)
    }

    pub fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle) {
        if self.store.frame_buffers.remove(frame_buffer).is_some() {
            self.backend.destroy_frame_buffer(frame_buffer);
        }
    }

    pub fn frame_buffer(&self, frame_buffer: FrameBufferHandle) -> Option<&FrameBuffer> {
        self.store.frame_buffers.get(frame_buffer)
    }

    pub fn frame_buffer_count(&self) -> usize {
        self.store.frame_buffers.len()
    }
}

#[cfg(test)]
#[path = "pipeline_context_tests.rs"]
mod tests;
