/// Resource context: buffers, images, views and command pools
///
/// Every transfer (buffer upload, image upload, mipmap generation, state
/// conversion, readback) is recorded into the store's upload command
/// buffer, submitted to the graphics queue and waited on before returning.

use slotmap::SecondaryMap;
use crate::error::{Error, Result};
use crate::command::{BufferCopy, BufferImageCopy, CommandBuffer, ImageBlit};
use crate::device::backend::{Backend, SubmitInfo};
use crate::device::handles::{BufferHandle, CommandPoolHandle, ImageHandle, ImageViewHandle};
use crate::device::types::{
    BufferUsage, Extent3D, Filter, ImageState, ImageUsage, MemoryLocation, Offset3D, QueueRole,
    SubresourceRange,
};
use crate::resource::types::{
    full_mip_chain, Buffer, BufferCreateInfo, BufferType, Image, ImageCreateInfo, ImageDesc,
    ImageUpdateInfo, ImageViewCreateInfo, ImageViewDesc,
};

// ============================================================================
// Store
// ============================================================================

/// Reusable one-shot command buffer for synchronous transfers
struct UploadContext {
    pool: CommandPoolHandle,
    cmd: CommandBuffer,
}

/// Resource records owned by the factory
pub struct ResourceStore {
    buffers: SecondaryMap<BufferHandle, Buffer>,
    images: SecondaryMap<ImageHandle, Image>,
    /// Views created through `create_image_view`, with their image
    views: SecondaryMap<ImageViewHandle, ImageHandle>,
    command_pools: SecondaryMap<CommandPoolHandle, QueueRole>,
    upload: UploadContext,
}

impl ResourceStore {
    pub(crate) fn new(backend: &mut dyn Backend) -> Result<Self> {
        let pool = backend.create_command_pool(QueueRole::Graphics)?;
        let handle = backend.allocate_command_buffer(pool)?;
        Ok(Self {
            buffers: SecondaryMap::new(),
            images: SecondaryMap::new(),
            views: SecondaryMap::new(),
            command_pools: SecondaryMap::new(),
            upload: UploadContext {
                pool,
                cmd: CommandBuffer::new(handle, pool, QueueRole::Graphics),
            },
        })
    }

    /// Release every object still alive
    pub(crate) fn destroy(&mut self, backend: &mut dyn Backend) {
        for (view, _) in self.views.drain() {
            if let Err(e) = backend.destroy_image_view(view) {
                crate::engine_warn!("nova::resource", "Failed to destroy image view: {}", e);
            }
        }
        for (_, image) in self.images.drain() {
            release_image(backend, &image);
        }
        for (_, buffer) in self.buffers.drain() {
            release_buffer(backend, &buffer);
        }
        for (pool, _) in self.command_pools.drain() {
            backend.destroy_command_pool(pool);
        }
        backend.destroy_command_pool(self.upload.pool);
    }
}

fn release_image(backend: &mut dyn Backend, image: &Image) {
    if let Err(e) = backend.destroy_image_view(image.view) {
        crate::engine_warn!("nova::resource", "Failed to destroy default image view: {}", e);
    }
    backend.destroy_buffer(image.staging);
    backend.destroy_image(image.handle);
}

fn release_buffer(backend: &mut dyn Backend, buffer: &Buffer) {
    if let Some(staging) = buffer.staging {
        backend.destroy_buffer(staging);
    }
    backend.destroy_buffer(buffer.handle);
}

// ============================================================================
// Context
// ============================================================================

/// Borrowed view over the backend and the resource store
pub struct ResourceContext<'a> {
    backend: &'a mut dyn Backend,
    store: &'a mut ResourceStore,
}

impl<'a> ResourceContext<'a> {
    pub(crate) fn new(backend: &'a mut dyn Backend, store: &'a mut ResourceStore) -> Self {
        Self { backend, store }
    }

    /// Record with `record`, submit to the graphics queue and wait for completion
    fn one_shot<F>(&mut self, record: F) -> Result<()>
    where
        F: FnOnce(&mut CommandBuffer) -> Result<()>,
    {
        let upload = &mut self.store.upload;
        self.backend.reset_command_pool(upload.pool)?;

        upload.cmd.begin()?;
        if let Err(e) = record(&mut upload.cmd) {
            upload.cmd.end().ok();
            return Err(e);
        }
        upload.cmd.end()?;

        self.backend.record(upload.cmd.handle(), upload.cmd.commands())?;
        self.backend.submit(QueueRole::Graphics, &[upload.cmd.handle()], &SubmitInfo::default())?;
        self.backend.queue_wait_idle(QueueRole::Graphics)?;
        upload.cmd.mark_submitted();
        Ok(())
    }

    // ===== BUFFERS =====

    /// Create a vertex, index, uniform or storage buffer
    ///
    /// # Arguments
    ///
    /// * `ty` - What the buffer is bound as
    /// * `data` - Optional initial contents (at most `size` bytes)
    /// * `size` - Size in bytes
    /// * `is_static` - Host-visible buffer written directly (true) or
    ///   device-local buffer fed through a staging buffer (false)
    pub fn create_buffer(&mut self, ty: BufferType, data: Option<&[u8]>, size: u64, is_static: bool) -> Result<BufferHandle> {
        if size == 0 {
            return Err(Error::InvalidResource("Buffer size must be non-zero".to_string()));
        }
        if let Some(data) = data {
            if data.len() as u64 > size {
                return Err(Error::InvalidResource(format!(
                    "Initial data ({} bytes) larger than the buffer ({} bytes)",
                    data.len(),
                    size
                )));
            }
        }

        let buffer = if is_static {
            let handle = self.backend.create_buffer(&BufferCreateInfo {
                size,
                usage: ty.usage(),
                location: MemoryLocation::HostVisible,
            })?;
            Buffer { handle, size, ty, is_static, staging: None }
        } else {
            let handle = self.backend.create_buffer(&BufferCreateInfo {
                size,
                usage: ty.usage() | BufferUsage::TRANSFER_DST,
                location: MemoryLocation::DeviceLocal,
            })?;
            let staging = match self.backend.create_buffer(&BufferCreateInfo {
                size,
                usage: BufferUsage::TRANSFER_SRC,
                location: MemoryLocation::HostVisible,
            }) {
                Ok(staging) => staging,
                Err(e) => {
                    self.backend.destroy_buffer(handle);
                    return Err(e);
                }
            };
            Buffer { handle, size, ty, is_static, staging: Some(staging) }
        };

        let handle = buffer.handle;
        self.store.buffers.insert(handle, buffer);

        if let Some(data) = data {
            if let Err(e) = self.update_buffer(handle, 0, data) {
                self.destroy_buffer(handle);
                return Err(e);
            }
        }

        crate::engine_trace!(
            "nova::resource",
            "Buffer created: {:?}, {} bytes, {}",
            ty,
            size,
            if is_static { "static" } else { "dynamic" }
        );
        Ok(handle)
    }

    /// Create a buffer sized and filled from a slice of plain-old-data values
    pub fn create_buffer_from<T: bytemuck::Pod>(&mut self, ty: BufferType, values: &[T], is_static: bool) -> Result<BufferHandle> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        self.create_buffer(ty, Some(bytes), bytes.len() as u64, is_static)
    }

    /// Overwrite `data.len()` bytes at `offset`
    ///
    /// Dynamic buffers go through their staging buffer and a synchronous copy.
    pub fn update_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let record = self
            .store
            .buffers
            .get(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown buffer".to_string()))?;
        if offset.checked_add(data.len() as u64).map_or(true, |end| end > record.size) {
            return Err(Error::InvalidResource(format!(
                "Update of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                record.size
            )));
        }
        if data.is_empty() {
            return Ok(());
        }

        match record.staging {
            None => self.backend.write_buffer(buffer, offset, data),
            Some(staging) => {
                self.backend.write_buffer(staging, offset, data)?;
                let region = BufferCopy {
                    src_offset: offset,
                    dst_offset: offset,
                    size: data.len() as u64,
                };
                self.one_shot(|cmd| cmd.copy_buffer(staging, buffer, &[region]))
            }
        }
    }

    /// Overwrite `values` at `offset`, as raw bytes
    pub fn update_buffer_with<T: bytemuck::Pod>(&mut self, buffer: BufferHandle, offset: u64, values: &[T]) -> Result<()> {
        self.update_buffer(buffer, offset, bytemuck::cast_slice(values))
    }

    pub fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(record) = self.store.buffers.remove(buffer) {
            release_buffer(self.backend, &record);
        }
    }

    pub fn buffer(&self, buffer: BufferHandle) -> Option<&Buffer> {
        self.store.buffers.get(buffer)
    }

    pub fn buffer_count(&self) -> usize {
        self.store.buffers.len()
    }

    // ===== IMAGES =====

    /// Create an image, its default view and its staging buffer
    ///
    /// `mip_levels` of 0 requests the full chain; larger values are clamped
    /// to it. The image starts `Undefined`.
    pub fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidResource("Image dimensions must be non-zero".to_string()));
        }
        let array_layers = match desc.shape.array_layers() {
            Some(0) => return Err(Error::InvalidResource("Image must have at least one layer".to_string())),
            Some(layers) => layers,
            None => return Err(Error::InvalidResource(format!("Layer count of {:?} overflows", desc.shape))),
        };
        if desc.shape.is_cube() && desc.width != desc.height {
            return Err(Error::InvalidResource(format!(
                "Cube images must be square ({}x{})",
                desc.width, desc.height
            )));
        }

        let full_chain = full_mip_chain(desc.width, desc.height);
        let mip_levels = if desc.mip_levels == 0 {
            full_chain
        } else {
            desc.mip_levels.min(full_chain)
        };

        let handle = self.backend.create_image(&ImageCreateInfo {
            extent: Extent3D::new(desc.width, desc.height, 1),
            format: desc.format,
            mip_levels,
            array_layers,
            usage: desc.usage | ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST,
            cube_compatible: desc.shape.is_cube(),
        })?;

        let view = match self.backend.create_image_view(&ImageViewCreateInfo {
            image: handle,
            view_type: desc.shape.view_type(),
            format: desc.format,
            range: SubresourceRange::whole(mip_levels, array_layers),
        }) {
            Ok(view) => view,
            Err(e) => {
                self.backend.destroy_image(handle);
                return Err(e);
            }
        };

        let staging_size = desc.width as u64 * desc.height as u64 * desc.format.bytes_per_pixel() as u64;
        let staging = match self.backend.create_buffer(&BufferCreateInfo {
            size: staging_size,
            usage: BufferUsage::TRANSFER_SRC,
            location: MemoryLocation::HostVisible,
        }) {
            Ok(staging) => staging,
            Err(e) => {
                self.backend.destroy_image_view(view).ok();
                self.backend.destroy_image(handle);
                return Err(e);
            }
        };

        self.store.images.insert(
            handle,
            Image {
                handle,
                width: desc.width,
                height: desc.height,
                depth: 1,
                format: desc.format,
                mip_levels,
                array_layers,
                usage: desc.usage,
                shape: desc.shape,
                view,
                state: ImageState::Undefined,
                staging,
                staging_size,
            },
        );

        crate::engine_debug!(
            "nova::resource",
            "Image created: {}x{} {:?}, {} mips, {} layers",
            desc.width,
            desc.height,
            desc.format,
            mip_levels,
            array_layers
        );
        Ok(handle)
    }

    fn image_record(&self, image: ImageHandle) -> Result<&Image> {
        self.store
            .images
            .get(image)
            .ok_or_else(|| Error::InvalidResource("Unknown image".to_string()))
    }

    fn set_state(&mut self, image: ImageHandle, state: ImageState) {
        if let Some(record) = self.store.images.get_mut(image) {
            record.state = state;
        }
    }

    /// Upload a region of one mip level of one layer
    ///
    /// An image not yet in `ShaderRead` is moved there as a whole first, so
    /// every sub-resource matches the tracked state afterwards. The target
    /// sub-resource then goes `ShaderRead -> TransferDst -> ShaderRead`.
    pub fn update_image(&mut self, image: ImageHandle, info: &ImageUpdateInfo<'_>) -> Result<()> {
        let record = self.image_record(image)?.clone();
        if info.mip_level >= record.mip_levels || info.layer >= record.array_layers {
            return Err(Error::InvalidResource(format!(
                "Mip {} / layer {} out of range ({} mips, {} layers)",
                info.mip_level, info.layer, record.mip_levels, record.array_layers
            )));
        }
        if record.format.has_stencil() {
            return Err(Error::InvalidResource(format!(
                "Uploads to combined depth-stencil format {:?} are not supported",
                record.format
            )));
        }

        let mip_extent = record.extent().mip(info.mip_level);
        let fits = info.extent.width > 0
            && info.extent.height > 0
            && info.extent.depth == 1
            && info.offset.z == 0
            && info.offset.x as u64 + info.extent.width as u64 <= mip_extent.width as u64
            && info.offset.y as u64 + info.extent.height as u64 <= mip_extent.height as u64;
        if !fits {
            return Err(Error::InvalidResource(format!(
                "Region {:?} at {:?} does not fit mip {} ({}x{})",
                info.extent, info.offset, info.mip_level, mip_extent.width, mip_extent.height
            )));
        }

        let size = info.extent.texel_count() * record.format.bytes_per_pixel() as u64;
        if info.data.len() as u64 != size {
            return Err(Error::InvalidResource(format!(
                "Image update expects {} bytes, got {}",
                size,
                info.data.len()
            )));
        }

        let staging = if size > record.staging_size {
            let old = record.staging;
            let grown = self.backend.create_buffer(&BufferCreateInfo {
                size,
                usage: BufferUsage::TRANSFER_SRC,
                location: MemoryLocation::HostVisible,
            })?;
            self.backend.destroy_buffer(old);
            if let Some(record) = self.store.images.get_mut(image) {
                record.staging = grown;
                record.staging_size = size;
            }
            crate::engine_trace!("nova::resource", "Image staging buffer grown to {} bytes", size);
            grown
        } else {
            record.staging
        };

        self.backend.write_buffer(staging, 0, info.data)?;

        let current = record.state;
        let whole = record.whole_range();
        let range = SubresourceRange::single(info.mip_level, info.layer);
        let region = BufferImageCopy {
            buffer_offset: 0,
            mip_level: info.mip_level,
            base_layer: info.layer,
            layer_count: 1,
            image_offset: info.offset,
            image_extent: info.extent,
        };
        self.one_shot(|cmd| {
            if current != ImageState::ShaderRead {
                cmd.image_barrier(image, whole, current, ImageState::ShaderRead)?;
            }
            cmd.image_barrier(image, range, ImageState::ShaderRead, ImageState::TransferDst)?;
            cmd.copy_buffer_to_image(staging, image, region)?;
            cmd.image_barrier(image, range, ImageState::TransferDst, ImageState::ShaderRead)
        })?;

        self.set_state(image, ImageState::ShaderRead);
        Ok(())
    }

    /// Fill mip levels `1..levels` by successive linear blits from level 0
    ///
    /// Every barrier on the generated chain covers exactly one mip level
    /// (all layers). Levels past `levels` are moved to `ShaderRead` in one
    /// trailing barrier, so the whole image ends up `ShaderRead`.
    pub fn generate_mipmap(&mut self, image: ImageHandle, levels: u32) -> Result<()> {
        let record = self.image_record(image)?.clone();
        if levels == 0 || levels > record.mip_levels {
            return Err(Error::InvalidResource(format!(
                "Cannot generate {} levels for an image with {} mips",
                levels, record.mip_levels
            )));
        }

        let layers = record.array_layers;
        let current = record.state;
        let extent = record.extent();
        let untouched = (levels < record.mip_levels && current != ImageState::ShaderRead).then(|| SubresourceRange {
            base_mip_level: levels,
            mip_level_count: record.mip_levels - levels,
            base_array_layer: 0,
            array_layer_count: layers,
        });

        if levels == 1 {
            self.one_shot(|cmd| {
                cmd.image_barrier(image, SubresourceRange::mip(0, layers), current, ImageState::ShaderRead)?;
                if let Some(rest) = untouched {
                    cmd.image_barrier(image, rest, current, ImageState::ShaderRead)?;
                }
                Ok(())
            })?;
            self.set_state(image, ImageState::ShaderRead);
            return Ok(());
        }

        if !record.format.supports_linear_blit() {
            return Err(Error::InvalidResource(format!(
                "Format {:?} does not support linear blits",
                record.format
            )));
        }

        self.one_shot(|cmd| {
            cmd.image_barrier(image, SubresourceRange::mip(0, layers), current, ImageState::TransferDst)?;
            for level in 1..levels {
                cmd.image_barrier(
                    image,
                    SubresourceRange::mip(level, layers),
                    ImageState::Undefined,
                    ImageState::TransferDst,
                )?;
            }

            for level in 1..levels {
                let src = SubresourceRange::mip(level - 1, layers);
                cmd.image_barrier(image, src, ImageState::TransferDst, ImageState::TransferSrc)?;
                cmd.blit_image(
                    image,
                    image,
                    ImageBlit {
                        src_mip: level - 1,
                        dst_mip: level,
                        base_layer: 0,
                        layer_count: layers,
                        src_extent: extent.mip(level - 1),
                        dst_extent: extent.mip(level),
                    },
                    Filter::Linear,
                )?;
                cmd.image_barrier(image, src, ImageState::TransferSrc, ImageState::ShaderRead)?;
            }

            cmd.image_barrier(
                image,
                SubresourceRange::mip(levels - 1, layers),
                ImageState::TransferDst,
                ImageState::ShaderRead,
            )?;
            if let Some(rest) = untouched {
                cmd.image_barrier(image, rest, current, ImageState::ShaderRead)?;
            }
            Ok(())
        })?;

        crate::engine_trace!("nova::resource", "Generated {} mip levels", levels);
        self.set_state(image, ImageState::ShaderRead);
        Ok(())
    }

    /// Transition the whole image from `src` to `dst`
    ///
    /// No barrier is issued when `src == dst` and the image is already in
    /// `dst`.
    pub fn convert_image_state(&mut self, image: ImageHandle, src: ImageState, dst: ImageState) -> Result<()> {
        let record = self.image_record(image)?.clone();
        if src == dst && record.state == dst {
            return Ok(());
        }
        let range = record.whole_range();
        self.one_shot(|cmd| cmd.image_barrier(image, range, src, dst))?;
        self.set_state(image, dst);
        Ok(())
    }

    /// Read back one mip level of one layer, tightly packed
    ///
    /// The sub-resource is moved to `TransferSrc` for the copy and returned
    /// to the image's tracked state.
    pub fn read_image(&mut self, image: ImageHandle, mip_level: u32, layer: u32) -> Result<Vec<u8>> {
        let record = self.image_record(image)?.clone();
        if mip_level >= record.mip_levels || layer >= record.array_layers {
            return Err(Error::InvalidResource(format!(
                "Mip {} / layer {} out of range",
                mip_level, layer
            )));
        }
        if record.state == ImageState::Undefined {
            return Err(Error::InvalidState("Reading back an image with undefined contents".to_string()));
        }
        if record.format.has_stencil() {
            return Err(Error::InvalidResource(format!(
                "Readback of combined depth-stencil format {:?} is not supported",
                record.format
            )));
        }

        let state = record.state;
        let extent = record.extent().mip(mip_level);
        let size = extent.texel_count() * record.format.bytes_per_pixel() as u64;

        let readback = self.backend.create_buffer(&BufferCreateInfo {
            size,
            usage: BufferUsage::TRANSFER_DST,
            location: MemoryLocation::HostVisible,
        })?;

        let range = SubresourceRange::single(mip_level, layer);
        let region = BufferImageCopy {
            buffer_offset: 0,
            mip_level,
            base_layer: layer,
            layer_count: 1,
            image_offset: Offset3D::default(),
            image_extent: extent,
        };
        let copied = self.one_shot(|cmd| {
            if state != ImageState::TransferSrc {
                cmd.image_barrier(image, range, state, ImageState::TransferSrc)?;
            }
            cmd.copy_image_to_buffer(image, readback, region)?;
            if state != ImageState::TransferSrc {
                cmd.image_barrier(image, range, ImageState::TransferSrc, state)?;
            }
            Ok(())
        });

        let bytes = copied.and_then(|_| self.backend.read_buffer(readback, 0, size));
        self.backend.destroy_buffer(readback);
        bytes
    }

    /// Destroy an image with its default view, staging buffer and extra views
    pub fn destroy_image(&mut self, image: ImageHandle) {
        let Some(record) = self.store.images.remove(image) else {
            return;
        };
        let extra: Vec<ImageViewHandle> = self
            .store
            .views
            .iter()
            .filter(|(_, owner)| **owner == image)
            .map(|(view, _)| view)
            .collect();
        for view in extra {
            self.store.views.remove(view);
            if let Err(e) = self.backend.destroy_image_view(view) {
                crate::engine_warn!("nova::resource", "Failed to destroy image view: {}", e);
            }
        }
        release_image(self.backend, &record);
    }

    pub fn image(&self, image: ImageHandle) -> Option<&Image> {
        self.store.images.get(image)
    }

    pub fn image_count(&self) -> usize {
        self.store.images.len()
    }

    // ===== IMAGE VIEWS =====

    /// Additional view over part of an image (one mip or layer as a render target, ...)
    pub fn create_image_view(&mut self, image: ImageHandle, desc: &ImageViewDesc) -> Result<ImageViewHandle> {
        let record = self.image_record(image)?.clone();
        let range = desc.range;
        let inside = range.mip_level_count > 0
            && range.array_layer_count > 0
            && range.base_mip_level as u64 + range.mip_level_count as u64 <= record.mip_levels as u64
            && range.base_array_layer as u64 + range.array_layer_count as u64 <= record.array_layers as u64;
        if !inside {
            return Err(Error::InvalidResource(format!("View range {:?} outside the image", range)));
        }
        let format = record.format;

        let view = self.backend.create_image_view(&ImageViewCreateInfo {
            image,
            view_type: desc.view_type,
            format,
            range,
        })?;
        self.store.views.insert(view, image);
        Ok(view)
    }

    /// Destroy a view made by `create_image_view` (default views go with their image)
    pub fn destroy_image_view(&mut self, view: ImageViewHandle) -> Result<()> {
        if self.store.views.remove(view).is_none() {
            return Err(Error::InvalidResource(
                "Unknown image view (default views are destroyed with their image)".to_string(),
            ));
        }
        self.backend.destroy_image_view(view)
    }

    // ===== COMMAND POOLS =====

    /// Resettable command pool scoped to one queue role
    pub fn create_command_pool(&mut self, role: QueueRole) -> Result<CommandPoolHandle> {
        let pool = self.backend.create_command_pool(role)?;
        self.store.command_pools.insert(pool, role);
        Ok(pool)
    }

    /// Return every command buffer of the pool to the initial state
    pub fn reset_command_pool(&mut self, pool: CommandPoolHandle) -> Result<()> {
        if !self.store.command_pools.contains_key(pool) {
            return Err(Error::InvalidResource("Unknown command pool".to_string()));
        }
        self.backend.reset_command_pool(pool)
    }

    /// Destroy a pool and every command buffer allocated from it
    pub fn destroy_command_pool(&mut self, pool: CommandPoolHandle) {
        if self.store.command_pools.remove(pool).is_some() {
            self.backend.destroy_command_pool(pool);
        }
    }

    pub fn allocate_command_buffer(&mut self, pool: CommandPoolHandle) -> Result<CommandBuffer> {
        let role = *self
            .store
            .command_pools
            .get(pool)
            .ok_or_else(|| Error::InvalidResource("Unknown command pool".to_string()))?;
        let handle = self.backend.allocate_command_buffer(pool)?;
        Ok(CommandBuffer::new(handle, pool, role))
    }

    pub fn free_command_buffer(&mut self, cmd: CommandBuffer) {
        if self.store.command_pools.contains_key(cmd.pool()) {
            self.backend.free_command_buffer(cmd.pool(), cmd.handle());
        }
    }
}

#[cfg(test)]
#[path = "resource_context_tests.rs"]
mod tests;
