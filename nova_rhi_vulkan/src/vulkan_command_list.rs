/// Command replay - translates the recorded nova command stream into Vulkan
///
/// The core validates commands while they are recorded; replay only resolves
/// handles to native objects and emits the matching `vkCmd*` calls.

use ash::vk;
use nova_rhi::nova::command::{BufferImageCopy, Command, ImageBlit};
use nova_rhi::nova::device::{Extent3D, Format, ImageHandle, PipelineHandle};
use nova_rhi::nova::Result;

use crate::vulkan_backend::{lookup, VulkanBackend, VulkanPipeline};
use crate::vulkan_convert::{
    aspect_mask, bind_point_to_vk, clear_value_to_vk, filter_to_vk, image_state_access, image_state_stage,
    image_state_to_layout, index_type_to_vk, stage_flags_to_vk, subresource_range_to_vk, view_aspect_mask,
};

/// Far corner of a blit region
fn blit_extent(extent: Extent3D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: extent.depth as i32,
    }
}

/// Buffer/image copy region for one mip level
pub(crate) fn buffer_image_copy(format: Format, region: &BufferImageCopy) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: region.buffer_offset,
        // Tightly packed
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: view_aspect_mask(format),
            mip_level: region.mip_level,
            base_array_layer: region.base_layer,
            layer_count: region.layer_count,
        },
        image_offset: vk::Offset3D {
            x: region.image_offset.x as i32,
            y: region.image_offset.y as i32,
            z: region.image_offset.z as i32,
        },
        image_extent: vk::Extent3D {
            width: region.image_extent.width,
            height: region.image_extent.height,
            depth: region.image_extent.depth,
        },
    }
}

pub(crate) fn image_blit(format: Format, region: &ImageBlit) -> vk::ImageBlit {
    let layers = |mip_level| vk::ImageSubresourceLayers {
        aspect_mask: aspect_mask(format),
        mip_level,
        base_array_layer: region.base_layer,
        layer_count: region.layer_count,
    };
    vk::ImageBlit {
        src_subresource: layers(region.src_mip),
        src_offsets: [vk::Offset3D::default(), blit_extent(region.src_extent)],
        dst_subresource: layers(region.dst_mip),
        dst_offsets: [vk::Offset3D::default(), blit_extent(region.dst_extent)],
    }
}

impl VulkanBackend {
    fn pipeline(&self, pipeline: PipelineHandle) -> Result<&VulkanPipeline> {
        lookup(&self.pipelines, pipeline, "pipeline")
    }

    fn image_and_format(&self, image: ImageHandle) -> Result<(vk::Image, Format)> {
        lookup(&self.images, image, "image").map(|i| (i.image, i.format))
    }

    /// Emit `commands` into a command buffer that is already recording
    pub(crate) fn replay(&self, cmd: vk::CommandBuffer, commands: &[Command]) -> Result<()> {
        let device = &self.ctx.device;

        for command in commands {
            match command {
                Command::BeginRenderPass {
                    pipeline,
                    frame_buffer,
                    render_area,
                    clear_values,
                } => {
                    let render_pass = self.pipeline(*pipeline)?.render_pass;
                    let framebuffer = *lookup(&self.frame_buffers, *frame_buffer, "frame buffer")?;
                    let vk_clear_values: Vec<vk::ClearValue> = clear_values.iter().map(clear_value_to_vk).collect();
                    let begin_info = vk::RenderPassBeginInfo::default()
                        .render_pass(render_pass)
                        .framebuffer(framebuffer)
                        .render_area(vk::Rect2D {
                            offset: vk::Offset2D {
                                x: render_area.x,
                                y: render_area.y,
                            },
                            extent: vk::Extent2D {
                                width: render_area.width,
                                height: render_area.height,
                            },
                        })
                        .clear_values(&vk_clear_values);
                    unsafe { device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE) };
                }

                Command::EndRenderPass => unsafe { device.cmd_end_render_pass(cmd) },

                Command::BindPipeline { pipeline, bind_point } => {
                    let native = self.pipeline(*pipeline)?.pipeline;
                    unsafe { device.cmd_bind_pipeline(cmd, bind_point_to_vk(*bind_point), native) };
                }

                Command::BindDescriptorSets {
                    bind_point,
                    pipeline,
                    first_set,
                    sets,
                } => {
                    let layout = self.pipeline(*pipeline)?.layout;
                    let native_sets = sets
                        .iter()
                        .map(|set| lookup(&self.sets, *set, "descriptor set").map(|s| s.set))
                        .collect::<Result<Vec<_>>>()?;
                    unsafe {
                        device.cmd_bind_descriptor_sets(
                            cmd,
                            bind_point_to_vk(*bind_point),
                            layout,
                            *first_set,
                            &native_sets,
                            &[],
                        )
                    };
                }

                Command::BindVertexBuffers { first_binding, buffers } => {
                    let mut native_buffers = Vec::with_capacity(buffers.len());
                    let mut offsets = Vec::with_capacity(buffers.len());
                    for (buffer, offset) in buffers {
                        native_buffers.push(lookup(&self.buffers, *buffer, "buffer")?.buffer);
                        offsets.push(*offset);
                    }
                    unsafe { device.cmd_bind_vertex_buffers(cmd, *first_binding, &native_buffers, &offsets) };
                }

                Command::BindIndexBuffer {
                    buffer,
                    offset,
                    index_type,
                } => {
                    let native = lookup(&self.buffers, *buffer, "buffer")?.buffer;
                    unsafe { device.cmd_bind_index_buffer(cmd, native, *offset, index_type_to_vk(*index_type)) };
                }

                Command::SetViewport(viewport) => {
                    let vk_viewport = vk::Viewport {
                        x: viewport.x,
                        y: viewport.y,
                        width: viewport.width,
                        height: viewport.height,
                        min_depth: viewport.min_depth,
                        max_depth: viewport.max_depth,
                    };
                    unsafe { device.cmd_set_viewport(cmd, 0, &[vk_viewport]) };
                }

                Command::SetScissor(scissor) => {
                    let vk_scissor = vk::Rect2D {
                        offset: vk::Offset2D {
                            x: scissor.x,
                            y: scissor.y,
                        },
                        extent: vk::Extent2D {
                            width: scissor.width,
                            height: scissor.height,
                        },
                    };
                    unsafe { device.cmd_set_scissor(cmd, 0, &[vk_scissor]) };
                }

                Command::PushConstants {
                    pipeline,
                    stages,
                    offset,
                    data,
                } => {
                    let layout = self.pipeline(*pipeline)?.layout;
                    unsafe { device.cmd_push_constants(cmd, layout, stage_flags_to_vk(*stages), *offset, data) };
                }

                Command::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => unsafe {
                    device.cmd_draw(cmd, *vertex_count, *instance_count, *first_vertex, *first_instance)
                },

                Command::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                } => unsafe {
                    device.cmd_draw_indexed(
                        cmd,
                        *index_count,
                        *instance_count,
                        *first_index,
                        *vertex_offset,
                        *first_instance,
                    )
                },

                Command::Dispatch { x, y, z } => unsafe { device.cmd_dispatch(cmd, *x, *y, *z) },

                Command::ImageBarrier {
                    image,
                    range,
                    old_state,
                    new_state,
                } => {
                    let (native, format) = self.image_and_format(*image)?;
                    let barrier = vk::ImageMemoryBarrier::default()
                        .old_layout(image_state_to_layout(*old_state))
                        .new_layout(image_state_to_layout(*new_state))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(native)
                        .subresource_range(subresource_range_to_vk(format, range))
                        .src_access_mask(image_state_access(*old_state))
                        .dst_access_mask(image_state_access(*new_state));
                    unsafe {
                        device.cmd_pipeline_barrier(
                            cmd,
                            image_state_stage(*old_state, true),
                            image_state_stage(*new_state, false),
                            vk::DependencyFlags::empty(),
                            &[],
                            &[],
                            &[barrier],
                        )
                    };
                }

                Command::CopyBuffer { src, dst, regions } => {
                    let src_buffer = lookup(&self.buffers, *src, "buffer")?.buffer;
                    let dst_buffer = lookup(&self.buffers, *dst, "buffer")?.buffer;
                    let vk_regions: Vec<vk::BufferCopy> = regions
                        .iter()
                        .map(|r| vk::BufferCopy {
                            src_offset: r.src_offset,
                            dst_offset: r.dst_offset,
                            size: r.size,
                        })
                        .collect();
                    unsafe { device.cmd_copy_buffer(cmd, src_buffer, dst_buffer, &vk_regions) };
                }

                Command::CopyBufferToImage { buffer, image, region } => {
                    let native_buffer = lookup(&self.buffers, *buffer, "buffer")?.buffer;
                    let (native_image, format) = self.image_and_format(*image)?;
                    unsafe {
                        device.cmd_copy_buffer_to_image(
                            cmd,
                            native_buffer,
                            native_image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &[buffer_image_copy(format, region)],
                        )
                    };
                }

                Command::CopyImageToBuffer { image, buffer, region } => {
                    let native_buffer = lookup(&self.buffers, *buffer, "buffer")?.buffer;
                    let (native_image, format) = self.image_and_format(*image)?;
                    unsafe {
                        device.cmd_copy_image_to_buffer(
                            cmd,
                            native_image,
                            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                            native_buffer,
                            &[buffer_image_copy(format, region)],
                        )
                    };
                }

                Command::BlitImage {
                    src,
                    dst,
                    region,
                    filter,
                } => {
                    let (src_image, format) = self.image_and_format(*src)?;
                    let (dst_image, _) = self.image_and_format(*dst)?;
                    unsafe {
                        device.cmd_blit_image(
                            cmd,
                            src_image,
                            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                            dst_image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &[image_blit(format, region)],
                            filter_to_vk(*filter),
                        )
                    };
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "vulkan_command_list_tests.rs"]
mod tests;
