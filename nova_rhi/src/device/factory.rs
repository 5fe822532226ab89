/// Device factory
///
/// Owns the backend, the swapchain and the resource/pipeline stores. Every
/// GPU object is created through the factory or one of its contexts:
///
/// ```text
/// Factory
///  ├── backend (Box<dyn Backend>, picked through the plugin registry)
///  ├── swapchain (images + one default view each)
///  ├── resources()  -> ResourceContext  (buffers, images, command pools)
///  ├── pipelines()  -> PipelineContext  (samplers, layouts, pipelines, sets)
///  └── extensions   (optional contexts, looked up by name)
/// ```
///
/// Drop order: device idle, extensions, stores, swapchain views, then the
/// backend itself.

use crate::error::{Error, Result};
use crate::engine::Engine;
use crate::command::{CommandBuffer, CommandBufferState};
use crate::device::backend::{Backend, BackendInit, SubmitInfo, WindowSurface};
use crate::device::config::Config;
use crate::device::extension::{Extension, ExtensionDescriptor, ExtensionInit, ExtensionRegistry, NamedExtension};
use crate::device::handles::{FenceHandle, SemaphoreHandle};
use crate::device::selection::{AdapterInfo, QueueFamilies};
use crate::device::swapchain::{
    choose_image_count, choose_present_mode, choose_surface_format, clamp_extent, AcquireOutcome,
    PresentOutcome, Swapchain, SwapchainDesc, SwapchainImage,
};
use crate::device::types::SubresourceRange;
use crate::pipeline::{PipelineContext, PipelineStore};
use crate::resource::{ImageViewCreateInfo, ImageViewType, ResourceContext, ResourceStore};

/// Entry point of the RHI: one device, one surface
pub struct Factory {
    config: Config,
    swapchain: Swapchain,
    resources: ResourceStore,
    pipelines: PipelineStore,
    extensions: ExtensionRegistry,
    /// Dropped last (after every object it owns has been released)
    backend: Box<dyn Backend>,
}

impl Factory {
    /// Create the backend named by `config.backend` and everything built on it
    ///
    /// # Arguments
    ///
    /// * `config` - Factory configuration
    /// * `window` - Surface to present to (None for headless backends)
    /// * `width` - Requested swapchain width (clamped to the surface bounds)
    /// * `height` - Requested swapchain height (clamped to the surface bounds)
    ///
    /// # Errors
    ///
    /// `InitializationFailed` when the backend is not registered, when no
    /// adapter or required queue family exists, or when the surface offers
    /// no format. Treat it as fatal.
    pub fn init(config: Config, window: Option<&dyn WindowSurface>, width: u32, height: u32) -> Result<Self> {
        let mut backend = Engine::create_backend(
            config.backend,
            &BackendInit {
                config: &config,
                window,
                width,
                height,
            },
        )?;

        let caps = backend.surface_capabilities()?;
        let desc = SwapchainDesc {
            extent: clamp_extent(&caps, width, height),
            format: choose_surface_format(&caps, &config.surface_formats)?,
            present_mode: choose_present_mode(&caps, config.present_mode),
            image_count: choose_image_count(&caps),
        };
        let swapchain = Self::build_swapchain(backend.as_mut(), &desc)?;

        let resources = ResourceStore::new(backend.as_mut())?;
        let pipelines = PipelineStore::new();

        let mut extensions = ExtensionRegistry::new();
        for descriptor in &config.extensions {
            extensions.register(*descriptor);
        }
        extensions.instantiate_all(&ExtensionInit {
            backend_kind: backend.kind(),
            adapter: backend.adapter_info(),
            backend: backend.as_ref(),
        })?;

        crate::engine_info!(
            "nova::Factory",
            "Factory initialized: {:?} backend on '{}', swapchain {}x{} ({} images, {:?}, {:?})",
            backend.kind(),
            backend.adapter_info().name,
            desc.extent.width,
            desc.extent.height,
            swapchain.image_count(),
            desc.format,
            desc.present_mode
        );

        Ok(Self {
            config,
            swapchain,
            resources,
            pipelines,
            extensions,
            backend,
        })
    }

    fn build_swapchain(backend: &mut dyn Backend, desc: &SwapchainDesc) -> Result<Swapchain> {
        let images = backend.create_swapchain(desc)?;
        let mut swapchain = Swapchain {
            images: Vec::with_capacity(images.len()),
            format: desc.format,
            extent: desc.extent,
            present_mode: desc.present_mode,
        };
        for image in images {
            let view = backend.create_image_view(&ImageViewCreateInfo {
                image,
                view_type: ImageViewType::Tex2D,
                format: desc.format,
                range: SubresourceRange::whole(1, 1),
            })?;
            swapchain.images.push(SwapchainImage { image, view });
        }
        Ok(swapchain)
    }

    /// Destroy every swapchain view exactly once
    fn destroy_swapchain_views(&mut self) {
        for image in self.swapchain.images.drain(..) {
            if let Err(e) = self.backend.destroy_image_view(image.view) {
                crate::engine_warn!("nova::Factory", "Failed to destroy swapchain view: {}", e);
            }
        }
    }

    // ===== ACCESSORS =====

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    /// Downcast the backend to its concrete type
    pub fn backend_as<T: Backend + 'static>(&self) -> Option<&T> {
        self.backend.as_any().downcast_ref::<T>()
    }

    pub fn backend_as_mut<T: Backend + 'static>(&mut self) -> Option<&mut T> {
        self.backend.as_any_mut().downcast_mut::<T>()
    }

    pub fn adapter_info(&self) -> &AdapterInfo {
        self.backend.adapter_info()
    }

    pub fn queue_families(&self) -> QueueFamilies {
        self.backend.queue_families()
    }

    // ===== SWAPCHAIN =====

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Acquire the next presentable image
    ///
    /// # Arguments
    ///
    /// * `semaphore` - Signaled when the image is ready to be rendered to
    ///
    /// # Returns
    ///
    /// `AcquireOutcome::OutOfDate` when the surface is out of date or
    /// suboptimal; call `recreate_swapchain` and try again
    pub fn acquire_next_image(&mut self, semaphore: SemaphoreHandle) -> Result<AcquireOutcome> {
        self.backend.acquire_next_image(semaphore)
    }

    /// Present `image_index` once every `wait` semaphore is signaled
    pub fn present(&mut self, image_index: u32, wait: &[SemaphoreHandle]) -> Result<PresentOutcome> {
        self.backend.present(image_index, wait)
    }

    /// Rebuild the swapchain at a new size
    ///
    /// Waits for the device to go idle and destroys every previous image
    /// view first. Frame buffers built on the old views are NOT rebuilt:
    /// destroy and recreate them afterwards.
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        self.backend.wait_idle()?;
        self.destroy_swapchain_views();

        let caps = self.backend.surface_capabilities()?;
        let desc = SwapchainDesc {
            extent: clamp_extent(&caps, width, height),
            format: choose_surface_format(&caps, &self.config.surface_formats)?,
            present_mode: choose_present_mode(&caps, self.config.present_mode),
            image_count: choose_image_count(&caps),
        };
        self.swapchain = Self::build_swapchain(self.backend.as_mut(), &desc)?;

        crate::engine_info!(
            "nova::Factory",
            "Swapchain recreated: {}x{} ({} images)",
            desc.extent.width,
            desc.extent.height,
            self.swapchain.image_count()
        );
        Ok(())
    }

    // ===== SYNCHRONIZATION =====

    pub fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle> {
        self.backend.create_fence(signaled)
    }

    /// Block until the fence signals
    pub fn wait_for_fence(&mut self, fence: FenceHandle) -> Result<()> {
        if !self.backend.wait_for_fence(fence, u64::MAX)? {
            return Err(Error::BackendError("Fence wait timed out".to_string()));
        }
        Ok(())
    }

    /// Block until the fence signals or `timeout_ns` elapses
    ///
    /// # Returns
    ///
    /// `false` on timeout
    pub fn wait_for_fence_timeout(&mut self, fence: FenceHandle, timeout_ns: u64) -> Result<bool> {
        self.backend.wait_for_fence(fence, timeout_ns)
    }

    pub fn reset_fence(&mut self, fence: FenceHandle) -> Result<()> {
        self.backend.reset_fence(fence)
    }

    pub fn fence_signaled(&self, fence: FenceHandle) -> Result<bool> {
        self.backend.fence_signaled(fence)
    }

    pub fn destroy_fence(&mut self, fence: FenceHandle) {
        self.backend.destroy_fence(fence);
    }

    pub fn create_semaphore(&mut self) -> Result<SemaphoreHandle> {
        self.backend.create_semaphore()
    }

    pub fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) {
        self.backend.destroy_semaphore(semaphore);
    }

    /// Block until every queue is idle
    pub fn wait_idle(&mut self) -> Result<()> {
        self.backend.wait_idle()
    }

    // ===== SUBMISSION =====

    /// Submit an ended command buffer to its queue role
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the command buffer is `Ended`.
    pub fn submit(&mut self, cmd: &mut CommandBuffer, info: &SubmitInfo) -> Result<()> {
        if cmd.state() != CommandBufferState::Ended {
            return Err(Error::InvalidState(format!(
                "Only ended command buffers can be submitted (state: {:?})",
                cmd.state()
            )));
        }
        self.backend.record(cmd.handle(), cmd.commands())?;
        self.backend.submit(cmd.role(), &[cmd.handle()], info)?;
        cmd.mark_submitted();
        Ok(())
    }

    // ===== CONTEXTS =====

    /// Buffers, images and command pools
    pub fn resources(&mut self) -> ResourceContext<'_> {
        ResourceContext::new(self.backend.as_mut(), &mut self.resources)
    }

    /// Samplers, descriptors, pipelines and frame buffers
    pub fn pipelines(&mut self) -> PipelineContext<'_> {
        PipelineContext::new(self.backend.as_mut(), &mut self.pipelines)
    }

    // ===== EXTENSIONS =====

    /// Typed extension lookup; None when unregistered or unsupported
    pub fn get_context<T: NamedExtension>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn get_context_mut<T: NamedExtension>(&mut self) -> Option<&mut T> {
        self.extensions.get_mut::<T>()
    }

    pub fn context_by_name(&self, name: &str) -> Option<&dyn Extension> {
        self.extensions.by_name(name)
    }

    /// Register and instantiate an extension after init
    ///
    /// # Returns
    ///
    /// `true` when the backend supports it
    pub fn add_extension(&mut self, descriptor: ExtensionDescriptor) -> Result<bool> {
        self.extensions.register(descriptor);
        let init = ExtensionInit {
            backend_kind: self.backend.kind(),
            adapter: self.backend.adapter_info(),
            backend: self.backend.as_ref(),
        };
        self.extensions.instantiate(descriptor.name, &init)
    }
}

impl Drop for Factory {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            crate::engine_warn!("nova::Factory", "wait_idle failed during shutdown: {}", e);
        }
        self.extensions.clear();
        self.pipelines.destroy(self.backend.as_mut());
        self.resources.destroy(self.backend.as_mut());
        self.destroy_swapchain_views();
        crate::engine_debug!("nova::Factory", "Factory destroyed");
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
