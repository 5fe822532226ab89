/// CPU execution of recorded commands for the Null backend

use crate::error::{Error, Result};
use crate::command::{BufferCopy, BufferImageCopy, ClearValue, Command, ImageBlit};
use crate::device::handles::{BufferHandle, FrameBufferHandle, ImageHandle, PipelineHandle};
use crate::device::null::null_backend::byte_range;
use crate::device::null::{NullBackend, NullBarrier, NullBlit};
use crate::device::types::{Filter, Format, ImageState, Rect2D, SubresourceRange};
use crate::pipeline::{AttachmentKind, LoadOp, PipelineBindPoint, RenderTargetLayout};

/// Render pass being executed
struct ActivePass {
    layout: RenderTargetLayout,
    targets: Vec<(ImageHandle, SubresourceRange)>,
}

/// Bound state of one command stream
#[derive(Default)]
struct ExecutionState {
    pass: Option<ActivePass>,
    graphics: Option<PipelineHandle>,
    compute: Option<PipelineHandle>,
    index_bound: bool,
}

impl NullBackend {
    pub(super) fn execute(&mut self, commands: &[Command]) -> Result<()> {
        let mut state = ExecutionState::default();
        for command in commands {
            self.execute_one(&mut state, command)?;
        }
        if state.pass.is_some() {
            crate::engine_bail!("nova::null", "Command stream ends inside a render pass");
        }
        Ok(())
    }

    fn execute_one(&mut self, state: &mut ExecutionState, command: &Command) -> Result<()> {
        match command {
            Command::BeginRenderPass { pipeline, frame_buffer, render_area, clear_values } => {
                let pass = self.begin_render_pass(*pipeline, *frame_buffer, *render_area, clear_values)?;
                state.pass = Some(pass);
            }
            Command::EndRenderPass => {
                let Some(pass) = state.pass.take() else {
                    crate::engine_bail!("nova::null", "end_render_pass outside a render pass");
                };
                self.end_render_pass(&pass)?;
            }
            Command::BindPipeline { pipeline, bind_point } => {
                let native = self
                    .pipelines
                    .get(*pipeline)
                    .ok_or_else(|| Error::InvalidResource("Binding an unknown pipeline".to_string()))?;
                if native.bind_point != *bind_point {
                    crate::engine_bail!(
                        "nova::null",
                        "{:?} pipeline bound at the {:?} bind point",
                        native.bind_point,
                        bind_point
                    );
                }
                match bind_point {
                    PipelineBindPoint::Graphics => state.graphics = Some(*pipeline),
                    PipelineBindPoint::Compute => state.compute = Some(*pipeline),
                }
            }
            Command::BindDescriptorSets { pipeline, sets, .. } => {
                if !self.pipelines.contains_key(*pipeline) {
                    return Err(Error::InvalidResource("Descriptor sets bound for an unknown pipeline".to_string()));
                }
                if let Some(set) = sets.iter().find(|set| !self.sets.contains_key(**set)) {
                    crate::engine_bail!("nova::null", "Binding descriptor set {:?} that was freed or reset", set);
                }
            }
            Command::BindVertexBuffers { buffers, .. } => {
                for (buffer, _) in buffers {
                    self.require_buffer(*buffer)?;
                }
            }
            Command::BindIndexBuffer { buffer, .. } => {
                self.require_buffer(*buffer)?;
                state.index_bound = true;
            }
            Command::SetViewport(_) | Command::SetScissor(_) => {}
            Command::PushConstants { pipeline, .. } => {
                if !self.pipelines.contains_key(*pipeline) {
                    return Err(Error::InvalidResource("Push constants for an unknown pipeline".to_string()));
                }
            }
            Command::Draw { vertex_count, instance_count, .. } => {
                Self::require_draw_state(state, false)?;
                self.stats.draws += 1;
                self.stats.vertices += *vertex_count as u64 * *instance_count as u64;
            }
            Command::DrawIndexed { index_count, instance_count, .. } => {
                Self::require_draw_state(state, true)?;
                self.stats.draws += 1;
                self.stats.vertices += *index_count as u64 * *instance_count as u64;
            }
            Command::Dispatch { .. } => {
                if state.pass.is_some() {
                    crate::engine_bail!("nova::null", "dispatch inside a render pass");
                }
                if state.compute.is_none() {
                    crate::engine_bail!("nova::null", "dispatch without a bound compute pipeline");
                }
                self.stats.dispatches += 1;
            }
            Command::ImageBarrier { image, range, old_state, new_state } => {
                self.image_barrier(*image, *range, *old_state, *new_state)?;
            }
            Command::CopyBuffer { src, dst, regions } => {
                self.copy_buffer(*src, *dst, regions)?;
            }
            Command::CopyBufferToImage { buffer, image, region } => {
                self.copy_buffer_to_image(*buffer, *image, region)?;
            }
            Command::CopyImageToBuffer { image, buffer, region } => {
                self.copy_image_to_buffer(*image, *buffer, region)?;
            }
            Command::BlitImage { src, dst, region, filter } => {
                self.blit_image(*src, *dst, region, *filter)?;
            }
        }
        Ok(())
    }

    fn require_buffer(&self, buffer: BufferHandle) -> Result<()> {
        if self.buffers.contains_key(buffer) {
            Ok(())
        } else {
            Err(Error::InvalidResource("Unknown buffer".to_string()))
        }
    }

    fn require_draw_state(state: &ExecutionState, indexed: bool) -> Result<()> {
        if state.pass.is_none() {
            crate::engine_bail!("nova::null", "draw outside a render pass");
        }
        if state.graphics.is_none() {
            crate::engine_bail!("nova::null", "draw without a bound graphics pipeline");
        }
        if indexed && !state.index_bound {
            crate::engine_bail!("nova::null", "draw_indexed without a bound index buffer");
        }
        Ok(())
    }

    /// Every subresource of `range` must be in one of `allowed`
    fn require_states(
        &self,
        image: ImageHandle,
        range: SubresourceRange,
        allowed: &[ImageState],
        operation: &str,
    ) -> Result<()> {
        let native = self
            .images
            .get(image)
            .ok_or_else(|| Error::InvalidResource(format!("{} on an unknown image", operation)))?;
        if !native.contains(&range) {
            crate::engine_bail!("nova::null", "{} outside the image ({:?})", operation, range);
        }
        for mip in range.base_mip_level..range.base_mip_level + range.mip_level_count {
            for layer in range.base_array_layer..range.base_array_layer + range.array_layer_count {
                let current = native.subresources[native.index(mip, layer)].state;
                if !allowed.contains(&current) {
                    crate::engine_bail!(
                        "nova::null",
                        "{} on mip {} layer {} in state {:?} (expected one of {:?})",
                        operation,
                        mip,
                        layer,
                        current,
                        allowed
                    );
                }
            }
        }
        Ok(())
    }

    fn set_states(&mut self, image: ImageHandle, range: SubresourceRange, new_state: ImageState) {
        if let Some(native) = self.images.get_mut(image) {
            for mip in range.base_mip_level..range.base_mip_level + range.mip_level_count {
                for layer in range.base_array_layer..range.base_array_layer + range.array_layer_count {
                    let index = native.index(mip, layer);
                    native.subresources[index].state = new_state;
                }
            }
        }
    }

    // ===== RENDER PASSES =====

    fn begin_render_pass(
        &mut self,
        pipeline: PipelineHandle,
        frame_buffer: FrameBufferHandle,
        render_area: Rect2D,
        clear_values: &[ClearValue],
    ) -> Result<ActivePass> {
        let layout = self
            .pipelines
            .get(pipeline)
            .and_then(|p| p.layout.clone())
            .ok_or_else(|| Error::InvalidResource("Render pass for an unknown or compute pipeline".to_string()))?;
        let native_fb = self
            .frame_buffers
            .get(frame_buffer)
            .ok_or_else(|| Error::InvalidResource("Render pass on an unknown frame buffer".to_string()))?;
        let fb_layout = self.pipelines.get(native_fb.pipeline).and_then(|p| p.layout.as_ref());
        if fb_layout != Some(&layout) {
            crate::engine_bail!("nova::null", "Frame buffer is not compatible with the pipeline's render target");
        }

        let mut targets = Vec::with_capacity(native_fb.attachments.len());
        for view in &native_fb.attachments {
            let native_view = self
                .views
                .get(*view)
                .ok_or_else(|| Error::InvalidResource("Frame buffer attachment view was destroyed".to_string()))?;
            targets.push((native_view.image, native_view.range));
        }

        for (i, slot) in layout.attachments.iter().enumerate() {
            let (image, range) = targets[i];
            if slot.initial_state != ImageState::Undefined {
                self.require_states(image, range, &[slot.initial_state], "Render pass load")?;
            }

            let clears = slot.load_op == LoadOp::Clear
                || (slot.kind == AttachmentKind::DepthStencil && slot.stencil_load_op == LoadOp::Clear);
            if clears {
                let Some(value) = clear_values.get(i) else {
                    crate::engine_bail!("nova::null", "Attachment {} is cleared but has no clear value", i);
                };
                let texel = encode_clear(slot.format, value)?;
                self.fill(image, range, render_area, &texel);
            }

            let attachment_state = match slot.kind {
                AttachmentKind::DepthStencil => ImageState::DepthStencilAttachment,
                AttachmentKind::Color | AttachmentKind::Resolve => ImageState::ColorAttachment,
            };
            self.set_states(image, range, attachment_state);
        }

        self.stats.render_passes += 1;
        Ok(ActivePass { layout, targets })
    }

    fn end_render_pass(&mut self, pass: &ActivePass) -> Result<()> {
        for (color, resolve) in pass.layout.color_refs.iter().zip(&pass.layout.resolve_refs) {
            let (src_image, src_range) = pass.targets[*color as usize];
            let (dst_image, dst_range) = pass.targets[*resolve as usize];
            let data = self
                .images
                .get(src_image)
                .map(|native| native.subresources[native.index(src_range.base_mip_level, src_range.base_array_layer)].data.clone())
                .ok_or_else(|| Error::InvalidResource("Resolve source was destroyed".to_string()))?;
            let native = self
                .images
                .get_mut(dst_image)
                .ok_or_else(|| Error::InvalidResource("Resolve target was destroyed".to_string()))?;
            let index = native.index(dst_range.base_mip_level, dst_range.base_array_layer);
            let target = &mut native.subresources[index].data;
            if target.len() != data.len() {
                crate::engine_bail!("nova::null", "Resolve between attachments of different sizes");
            }
            target.copy_from_slice(&data);
        }

        for (i, slot) in pass.layout.attachments.iter().enumerate() {
            let (image, range) = pass.targets[i];
            self.set_states(image, range, slot.final_state);
        }
        Ok(())
    }

    /// Write `texel` over `area` of every subresource in `range`
    fn fill(&mut self, image: ImageHandle, range: SubresourceRange, area: Rect2D, texel: &[u8]) {
        let Some(native) = self.images.get_mut(image) else {
            return;
        };
        let bpp = texel.len();
        for mip in range.base_mip_level..range.base_mip_level + range.mip_level_count {
            let extent = native.mip_extent(mip);
            let x0 = area.x.max(0) as u32;
            let y0 = area.y.max(0) as u32;
            let x1 = (x0 + area.width).min(extent.width);
            let y1 = (y0 + area.height).min(extent.height);
            for layer in range.base_array_layer..range.base_array_layer + range.array_layer_count {
                let index = native.index(mip, layer);
                let data = &mut native.subresources[index].data;
                for y in y0..y1 {
                    for x in x0..x1 {
                        let offset = ((y * extent.width + x) as usize) * bpp;
                        data[offset..offset + bpp].copy_from_slice(texel);
                    }
                }
            }
        }
    }

    // ===== TRANSFERS =====

    fn image_barrier(
        &mut self,
        image: ImageHandle,
        range: SubresourceRange,
        old_state: ImageState,
        new_state: ImageState,
    ) -> Result<()> {
        if old_state == ImageState::Undefined {
            let native = self
                .images
                .get(image)
                .ok_or_else(|| Error::InvalidResource("Barrier on an unknown image".to_string()))?;
            if !native.contains(&range) {
                crate::engine_bail!("nova::null", "Barrier outside the image ({:?})", range);
            }
        } else {
            self.require_states(image, range, &[old_state], "Barrier")?;
        }
        self.set_states(image, range, new_state);
        self.barriers.push(NullBarrier { image, range, old_state, new_state });
        Ok(())
    }

    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, regions: &[BufferCopy]) -> Result<()> {
        for region in regions {
            let data = {
                let native = self
                    .buffers
                    .get(src)
                    .ok_or_else(|| Error::InvalidResource("Copy from an unknown buffer".to_string()))?;
                let Some(range) = byte_range(region.src_offset, region.size, native.data.len()) else {
                    crate::engine_bail!("nova::null", "Copy source range exceeds the buffer");
                };
                native.data[range].to_vec()
            };
            let native = self
                .buffers
                .get_mut(dst)
                .ok_or_else(|| Error::InvalidResource("Copy to an unknown buffer".to_string()))?;
            let Some(range) = byte_range(region.dst_offset, data.len() as u64, native.data.len()) else {
                crate::engine_bail!("nova::null", "Copy destination range exceeds the buffer");
            };
            native.data[range].copy_from_slice(&data);
        }
        Ok(())
    }

    /// Byte layout shared by both copy directions
    fn copy_layout(&self, image: ImageHandle, region: &BufferImageCopy) -> Result<(u32, usize)> {
        let native = self
            .images
            .get(image)
            .ok_or_else(|| Error::InvalidResource("Copy with an unknown image".to_string()))?;
        let extent = native.mip_extent(region.mip_level);
        let fits = region.image_extent.depth == 1
            && region.image_offset.z == 0
            && region.image_offset.x as u64 + region.image_extent.width as u64 <= extent.width as u64
            && region.image_offset.y as u64 + region.image_extent.height as u64 <= extent.height as u64;
        if !fits {
            crate::engine_bail!(
                "nova::null",
                "Copy region {:?} at {:?} does not fit mip {} ({}x{})",
                region.image_extent,
                region.image_offset,
                region.mip_level,
                extent.width,
                extent.height
            );
        }
        Ok((extent.width, native.info.format.bytes_per_pixel() as usize))
    }

    fn copy_buffer_to_image(&mut self, buffer: BufferHandle, image: ImageHandle, region: &BufferImageCopy) -> Result<()> {
        let range = copy_range(region);
        self.require_states(image, range, &[ImageState::TransferDst, ImageState::General], "Copy to image")?;
        let (mip_width, bpp) = self.copy_layout(image, region)?;

        let source = self
            .buffers
            .get(buffer)
            .ok_or_else(|| Error::InvalidResource("Copy from an unknown buffer".to_string()))?;
        let row = region.image_extent.width as usize * bpp;
        let rows = region.image_extent.height as usize;
        let needed = region.buffer_offset as usize + row * rows * region.layer_count as usize;
        if needed > source.data.len() {
            crate::engine_bail!("nova::null", "Copy reads {} bytes from a {}-byte buffer", needed, source.data.len());
        }

        let native = self
            .images
            .get_mut(image)
            .ok_or_else(|| Error::InvalidResource("Copy to an unknown image".to_string()))?;
        for l in 0..region.layer_count {
            let index = native.index(region.mip_level, region.base_layer + l);
            let target = &mut native.subresources[index].data;
            for y in 0..rows {
                let src = region.buffer_offset as usize + (l as usize * rows + y) * row;
                let dst = ((region.image_offset.y as usize + y) * mip_width as usize
                    + region.image_offset.x as usize)
                    * bpp;
                target[dst..dst + row].copy_from_slice(&source.data[src..src + row]);
            }
        }
        Ok(())
    }

    fn copy_image_to_buffer(&mut self, image: ImageHandle, buffer: BufferHandle, region: &BufferImageCopy) -> Result<()> {
        let range = copy_range(region);
        self.require_states(image, range, &[ImageState::TransferSrc, ImageState::General], "Copy from image")?;
        let (mip_width, bpp) = self.copy_layout(image, region)?;

        let native = self
            .images
            .get(image)
            .ok_or_else(|| Error::InvalidResource("Copy from an unknown image".to_string()))?;
        let target = self
            .buffers
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource("Copy to an unknown buffer".to_string()))?;
        let row = region.image_extent.width as usize * bpp;
        let rows = region.image_extent.height as usize;
        let needed = region.buffer_offset as usize + row * rows * region.layer_count as usize;
        if needed > target.data.len() {
            crate::engine_bail!("nova::null", "Copy writes {} bytes into a {}-byte buffer", needed, target.data.len());
        }

        for l in 0..region.layer_count {
            let source = &native.subresources[native.index(region.mip_level, region.base_layer + l)].data;
            for y in 0..rows {
                let src = ((region.image_offset.y as usize + y) * mip_width as usize
                    + region.image_offset.x as usize)
                    * bpp;
                let dst = region.buffer_offset as usize + (l as usize * rows + y) * row;
                target.data[dst..dst + row].copy_from_slice(&source[src..src + row]);
            }
        }
        Ok(())
    }

    fn blit_image(&mut self, src: ImageHandle, dst: ImageHandle, region: &ImageBlit, filter: Filter) -> Result<()> {
        let src_range = SubresourceRange {
            base_mip_level: region.src_mip,
            mip_level_count: 1,
            base_array_layer: region.base_layer,
            array_layer_count: region.layer_count,
        };
        let dst_range = SubresourceRange { base_mip_level: region.dst_mip, ..src_range };
        self.require_states(src, src_range, &[ImageState::TransferSrc, ImageState::General], "Blit source")?;
        self.require_states(dst, dst_range, &[ImageState::TransferDst, ImageState::General], "Blit destination")?;

        let (format, sources) = {
            let native = self
                .images
                .get(src)
                .ok_or_else(|| Error::InvalidResource("Blit from an unknown image".to_string()))?;
            let extent = native.mip_extent(region.src_mip);
            if region.src_extent.width > extent.width || region.src_extent.height > extent.height {
                crate::engine_bail!("nova::null", "Blit source extent exceeds mip {}", region.src_mip);
            }
            let sources: Vec<(u32, Vec<u8>)> = (0..region.layer_count)
                .map(|l| {
                    let index = native.index(region.src_mip, region.base_layer + l);
                    (extent.width, native.subresources[index].data.clone())
                })
                .collect();
            (native.info.format, sources)
        };

        let native = self
            .images
            .get_mut(dst)
            .ok_or_else(|| Error::InvalidResource("Blit to an unknown image".to_string()))?;
        if native.info.format != format {
            crate::engine_bail!("nova::null", "Blit between {:?} and {:?}", format, native.info.format);
        }
        if filter == Filter::Linear && !format.supports_linear_blit() {
            crate::engine_bail!("nova::null", "Linear blit is not supported for {:?}", format);
        }
        let extent = native.mip_extent(region.dst_mip);
        if region.dst_extent.width > extent.width || region.dst_extent.height > extent.height {
            crate::engine_bail!("nova::null", "Blit destination extent exceeds mip {}", region.dst_mip);
        }

        let bpp = format.bytes_per_pixel() as usize;
        let averaged = filter == Filter::Linear && bpp == format.channel_count() as usize;
        let (sw, sh) = (region.src_extent.width.max(1), region.src_extent.height.max(1));
        let (dw, dh) = (region.dst_extent.width, region.dst_extent.height);

        for (l, (src_width, source)) in sources.iter().enumerate() {
            let index = native.index(region.dst_mip, region.base_layer + l as u32);
            let target = &mut native.subresources[index].data;
            for y in 0..dh {
                let sy0 = y * sh / dh;
                let sy1 = ((y + 1) * sh / dh).max(sy0 + 1);
                for x in 0..dw {
                    let sx0 = x * sw / dw;
                    let sx1 = ((x + 1) * sw / dw).max(sx0 + 1);
                    let dst_offset = ((y * extent.width + x) as usize) * bpp;
                    if averaged {
                        let count = (sx1 - sx0) * (sy1 - sy0);
                        for b in 0..bpp {
                            let mut sum = 0u32;
                            for sy in sy0..sy1 {
                                for sx in sx0..sx1 {
                                    sum += source[((sy * src_width + sx) as usize) * bpp + b] as u32;
                                }
                            }
                            target[dst_offset + b] = ((sum + count / 2) / count) as u8;
                        }
                    } else {
                        let src_offset = ((sy0 * src_width + sx0) as usize) * bpp;
                        target[dst_offset..dst_offset + bpp].copy_from_slice(&source[src_offset..src_offset + bpp]);
                    }
                }
            }
        }

        self.blits.push(NullBlit {
            src,
            dst,
            src_mip: region.src_mip,
            dst_mip: region.dst_mip,
            src_extent: region.src_extent,
            dst_extent: region.dst_extent,
            layer_count: region.layer_count,
        });
        Ok(())
    }
}

fn copy_range(region: &BufferImageCopy) -> SubresourceRange {
    SubresourceRange {
        base_mip_level: region.mip_level,
        mip_level_count: 1,
        base_array_layer: region.base_layer,
        array_layer_count: region.layer_count,
    }
}

// ===== CLEAR ENCODING =====

fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn srgb8(value: f32) -> u8 {
    let linear = value.clamp(0.0, 1.0);
    let encoded = if linear <= 0.003_130_8 {
        linear * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    };
    unorm8(encoded)
}

fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32 - 127 + 15;
    let mantissa = bits & 0x007f_ffff;
    if exponent <= 0 {
        sign
    } else if exponent >= 31 {
        sign | 0x7c00
    } else {
        sign | ((exponent as u16) << 10) | ((mantissa >> 13) as u16)
    }
}

/// Texel bytes a clear of `format` to `value` produces
pub(super) fn encode_clear(format: Format, value: &ClearValue) -> Result<Vec<u8>> {
    match (value, format.is_depth()) {
        (ClearValue::Color(c), false) => {
            let srgb = |v: f32| if format.is_srgb() { srgb8(v) } else { unorm8(v) };
            Ok(match format {
                Format::R8_UNORM => vec![unorm8(c[0])],
                Format::R8G8_UNORM => vec![unorm8(c[0]), unorm8(c[1])],
                Format::R8G8B8A8_UNORM | Format::R8G8B8A8_SRGB => {
                    vec![srgb(c[0]), srgb(c[1]), srgb(c[2]), unorm8(c[3])]
                }
                Format::B8G8R8A8_UNORM | Format::B8G8R8A8_SRGB => {
                    vec![srgb(c[2]), srgb(c[1]), srgb(c[0]), unorm8(c[3])]
                }
                Format::R16G16B16A16_SFLOAT => c.iter().flat_map(|v| f32_to_f16(*v).to_le_bytes()).collect(),
                Format::R32_UINT => (c[0].max(0.0) as u32).to_le_bytes().to_vec(),
                _ => {
                    let channels = format.channel_count() as usize;
                    c[..channels].iter().flat_map(|v| v.to_le_bytes()).collect()
                }
            })
        }
        (ClearValue::DepthStencil { depth, stencil }, true) => {
            let depth = depth.clamp(0.0, 1.0);
            Ok(match format {
                Format::D16_UNORM => ((depth * 65535.0).round() as u16).to_le_bytes().to_vec(),
                Format::D24_UNORM_S8_UINT => {
                    let packed = ((depth * 16_777_215.0).round() as u32) | ((stencil & 0xff) << 24);
                    packed.to_le_bytes().to_vec()
                }
                Format::D32_SFLOAT_S8_UINT => {
                    let mut bytes = depth.to_le_bytes().to_vec();
                    bytes.extend_from_slice(&(stencil & 0xff).to_le_bytes());
                    bytes
                }
                _ => depth.to_le_bytes().to_vec(),
            })
        }
        _ => Err(crate::engine_err!(
            "nova::null",
            "Clear value {:?} does not match attachment format {:?}",
            value,
            format
        )),
    }
}
