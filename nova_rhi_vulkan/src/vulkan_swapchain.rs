/// Swapchain - surface queries, (re)creation, acquire and present
///
/// Swapchain images are registered in the backend's image map so the core
/// can view, barrier and render into them like any other image. They are
/// flagged as swapchain-owned and are never destroyed individually.

use ash::vk;
use nova_rhi::nova::device::{
    AcquireOutcome, Extent2D, ImageHandle, ImageUsage, PresentOutcome, QueueRole, SemaphoreHandle,
    SurfaceCapabilities, SwapchainDesc,
};
use nova_rhi::nova::Result;
use nova_rhi::{engine_bail, engine_debug, engine_error, engine_warn};

use crate::vulkan_backend::{vk_err, VulkanBackend, VulkanImage, VulkanSwapchain};
use crate::vulkan_convert::{format_to_vk, present_mode_to_vk, vk_format_to_format, vk_present_mode_to_present_mode};

/// Extent the surface reports when the swapchain decides the size
const UNDEFINED_EXTENT: u32 = u32::MAX;

impl VulkanBackend {
    pub(crate) fn query_surface_capabilities(&self) -> Result<SurfaceCapabilities> {
        let ctx = &self.ctx;
        let (caps, formats, present_modes) = unsafe {
            let caps = ctx
                .surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, ctx.surface)
                .map_err(|e| vk_err("Failed to get surface capabilities", e))?;
            let formats = ctx
                .surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, ctx.surface)
                .map_err(|e| vk_err("Failed to query surface formats", e))?;
            let present_modes = ctx
                .surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, ctx.surface)
                .map_err(|e| vk_err("Failed to query present modes", e))?;
            (caps, formats, present_modes)
        };

        let current_extent = if caps.current_extent.width == UNDEFINED_EXTENT {
            None
        } else {
            Some(Extent2D {
                width: caps.current_extent.width,
                height: caps.current_extent.height,
            })
        };

        let mut supported_formats = Vec::new();
        for surface_format in &formats {
            if surface_format.color_space != vk::ColorSpaceKHR::SRGB_NONLINEAR {
                continue;
            }
            if let Some(format) = vk_format_to_format(surface_format.format) {
                if !supported_formats.contains(&format) {
                    supported_formats.push(format);
                }
            }
        }

        Ok(SurfaceCapabilities {
            min_extent: Extent2D {
                width: caps.min_image_extent.width,
                height: caps.min_image_extent.height,
            },
            max_extent: Extent2D {
                width: caps.max_image_extent.width,
                height: caps.max_image_extent.height,
            },
            current_extent,
            min_image_count: caps.min_image_count,
            max_image_count: (caps.max_image_count > 0).then_some(caps.max_image_count),
            formats: supported_formats,
            present_modes: present_modes
                .into_iter()
                .filter_map(vk_present_mode_to_present_mode)
                .collect(),
        })
    }

    /// Create the swapchain, retiring the previous one if any
    ///
    /// # Arguments
    ///
    /// * `desc` - Extent, format, present mode and image count chosen by the factory
    pub(crate) fn build_swapchain(&mut self, desc: &SwapchainDesc) -> Result<Vec<ImageHandle>> {
        if self.has_live_swapchain_views() {
            engine_bail!("nova::vulkan", "Previous swapchain images still have live views");
        }

        let caps = unsafe {
            self.ctx
                .surface_loader
                .get_physical_device_surface_capabilities(self.ctx.physical_device, self.ctx.surface)
                .map_err(|e| vk_err("Failed to get surface capabilities", e))?
        };

        let old_swapchain = self
            .swapchain
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |s| s.swapchain);

        let usage = ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_DST;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.ctx.surface)
            .min_image_count(desc.image_count)
            .image_format(format_to_vk(desc.format))
            .image_color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .image_extent(vk::Extent2D {
                width: desc.extent.width,
                height: desc.extent.height,
            })
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode_to_vk(desc.present_mode))
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            self.ctx
                .swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| vk_err("Failed to create swapchain", e))?
        };

        // The old swapchain is retired by the create call either way
        self.release_swapchain();

        let native_images = match unsafe { self.ctx.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { self.ctx.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(vk_err("Failed to get swapchain images", e));
            }
        };

        let images: Vec<ImageHandle> = native_images
            .into_iter()
            .map(|image| {
                self.images.insert(VulkanImage {
                    image,
                    allocation: None,
                    format: desc.format,
                    usage,
                    swapchain_owned: true,
                })
            })
            .collect();

        self.swapchain = Some(VulkanSwapchain {
            swapchain,
            images: images.clone(),
        });

        engine_debug!(
            "nova::vulkan",
            "Swapchain created: {}x{}, {:?}, {} images",
            desc.extent.width,
            desc.extent.height,
            desc.present_mode,
            images.len()
        );
        Ok(images)
    }

    /// Destroy the swapchain and unregister its images
    pub(crate) fn release_swapchain(&mut self) {
        if self.swapchain.is_none() {
            return;
        }
        if self.has_live_swapchain_views() {
            engine_error!("nova::vulkan", "Swapchain destroyed while its image views are alive");
            return;
        }
        if let Some(swapchain) = self.swapchain.take() {
            for image in &swapchain.images {
                self.images.remove(*image);
            }
            unsafe { self.ctx.swapchain_loader.destroy_swapchain(swapchain.swapchain, None) };
        }
    }

    pub(crate) fn acquire(&mut self, signal: SemaphoreHandle) -> Result<AcquireOutcome> {
        let semaphore = self.semaphore(signal)?;
        let Some(swapchain) = &self.swapchain else {
            engine_bail!("nova::vulkan", "acquire_next_image without a swapchain");
        };

        let result = unsafe {
            self.ctx.swapchain_loader.acquire_next_image(
                swapchain.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Image(index)),
            Ok((_, true)) => {
                engine_warn!("nova::vulkan", "Swapchain suboptimal during acquire");
                // The semaphore was signaled; consume it so the caller can reuse it
                let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
                let semaphores = [semaphore];
                let drain = vk::SubmitInfo::default()
                    .wait_semaphores(&semaphores)
                    .wait_dst_stage_mask(&wait_stages);
                unsafe {
                    self.ctx
                        .device
                        .queue_submit(self.ctx.queue(QueueRole::Graphics), &[drain], vk::Fence::null())
                        .map_err(|e| vk_err("Failed to release the acquire semaphore", e))?;
                }
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_warn!("nova::vulkan", "Swapchain out of date during acquire");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(vk_err("Failed to acquire next swapchain image", e)),
        }
    }

    pub(crate) fn present_image(&mut self, image_index: u32, wait: &[SemaphoreHandle]) -> Result<PresentOutcome> {
        let wait_semaphores = wait
            .iter()
            .map(|s| self.semaphore(*s))
            .collect::<Result<Vec<_>>>()?;
        let Some(swapchain) = &self.swapchain else {
            engine_bail!("nova::vulkan", "present without a swapchain");
        };
        if image_index as usize >= swapchain.images.len() {
            engine_bail!(
                "nova::vulkan",
                "present: image_index {} out of range (count: {})",
                image_index,
                swapchain.images.len()
            );
        }

        let swapchains = [swapchain.swapchain];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe {
            self.ctx
                .swapchain_loader
                .queue_present(self.ctx.queue(QueueRole::Present), &present_info)
        };
        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(vk_err("Failed to present swapchain image", e)),
        }
    }

    fn has_live_swapchain_views(&self) -> bool {
        let Some(swapchain) = &self.swapchain else {
            return false;
        };
        self.views
            .values()
            .any(|view| swapchain.images.contains(&view.image))
    }
}
