//! Unit tests for factory init, swapchain recreation and submission.

use std::any::Any;
use crate::command::CommandBufferState;
use crate::device::null::NullBackend;
use crate::device::*;
use crate::error::{Error, Result};

fn factory_with(config: Config) -> Result<Factory> {
    Factory::init(config, None, 64, 64)
}

fn null(factory: &Factory) -> &NullBackend {
    factory.backend_as::<NullBackend>().unwrap()
}

// ===== INIT =====

#[test]
fn test_default_init() {
    let factory = factory_with(Config::default()).unwrap();

    assert_eq!(factory.backend().kind(), BackendKind::Null);
    assert_eq!(factory.adapter_info().name, "Nova Null Device");

    let swapchain = factory.swapchain();
    assert_eq!(swapchain.format(), Format::B8G8R8A8_SRGB);
    assert_eq!(swapchain.image_count(), 3);
    assert_eq!(swapchain.width(), 64);
    assert_eq!(swapchain.height(), 64);
    assert_eq!(swapchain.present_mode(), PresentMode::Fifo);

    let backend = null(&factory);
    for image in swapchain.images() {
        assert!(backend.is_view_alive(image.view));
    }
    assert_eq!(backend.swapchain_images().len(), 3);
}

#[test]
fn test_requested_extent_is_clamped() {
    let mut config = Config::default();
    config.null_device.surface.max_extent = Extent2D { width: 32, height: 48 };
    let factory = factory_with(config).unwrap();
    assert_eq!(factory.swapchain().extent(), Extent2D { width: 32, height: 48 });
}

#[test]
fn test_surface_extent_wins() {
    let mut config = Config::default();
    config.null_device.surface.current_extent = Some(Extent2D { width: 20, height: 10 });
    let factory = factory_with(config).unwrap();
    assert_eq!(factory.swapchain().extent(), Extent2D { width: 20, height: 10 });
}

#[test]
fn test_surface_format_fallback() {
    let mut config = Config::default();
    config.surface_formats = vec![Format::R16G16B16A16_SFLOAT];
    let factory = factory_with(config).unwrap();
    assert_eq!(factory.swapchain().format(), Format::B8G8R8A8_SRGB);

    let mut config = Config::default();
    config.null_device.surface.formats.clear();
    assert!(matches!(factory_with(config), Err(Error::InitializationFailed(_))));
}

#[test]
fn test_present_mode_fallback() {
    let mut config = Config::default();
    config.present_mode = PresentMode::Mailbox;
    config.null_device.surface.present_modes = vec![PresentMode::Fifo];
    let factory = factory_with(config).unwrap();
    assert_eq!(factory.swapchain().present_mode(), PresentMode::Fifo);
}

#[test]
fn test_unregistered_backend_fails() {
    let result = factory_with(Config::for_backend(BackendKind::Vulkan));
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}

#[test]
fn test_missing_adapter_fails() {
    let mut config = Config::default();
    config.null_device.adapters.clear();
    assert!(matches!(factory_with(config), Err(Error::InitializationFailed(_))));
}

// ===== SWAPCHAIN =====

#[test]
fn test_recreate_destroys_every_view_once() {
    let mut factory = factory_with(Config::default()).unwrap();
    let old: Vec<SwapchainImage> = factory.swapchain().images().to_vec();

    factory.recreate_swapchain(128, 96).unwrap();

    let backend = null(&factory);
    for image in &old {
        assert_eq!(backend.view_destroy_count(image.view), 1);
        assert!(!backend.is_view_alive(image.view));
    }
    let swapchain = factory.swapchain();
    assert_eq!(swapchain.extent(), Extent2D { width: 128, height: 96 });
    for image in swapchain.images() {
        assert!(backend.is_view_alive(image.view));
        assert!(!old.iter().any(|o| o.view == image.view));
    }
}

#[test]
fn test_recreate_twice() {
    let mut factory = factory_with(Config::default()).unwrap();
    factory.recreate_swapchain(32, 32).unwrap();
    let middle: Vec<SwapchainImage> = factory.swapchain().images().to_vec();
    factory.recreate_swapchain(16, 16).unwrap();

    let backend = null(&factory);
    for image in &middle {
        assert_eq!(backend.view_destroy_count(image.view), 1);
    }
    assert_eq!(backend.live_view_count(), 3);
}

#[test]
fn test_out_of_date_acquire() {
    let mut factory = factory_with(Config::default()).unwrap();
    let semaphore = factory.create_semaphore().unwrap();
    factory.backend_as_mut::<NullBackend>().unwrap().mark_surface_out_of_date();

    assert_eq!(factory.acquire_next_image(semaphore).unwrap(), AcquireOutcome::OutOfDate);
    assert_eq!(null(&factory).semaphore_signaled(semaphore), Some(false));

    factory.recreate_swapchain(64, 64).unwrap();
    assert_eq!(factory.acquire_next_image(semaphore).unwrap(), AcquireOutcome::Image(0));
}

// ===== SUBMISSION =====

#[test]
fn test_submit_requires_ended_buffer() {
    let mut factory = factory_with(Config::default()).unwrap();
    let mut cmd = {
        let mut resources = factory.resources();
        let pool = resources.create_command_pool(QueueRole::Graphics).unwrap();
        resources.allocate_command_buffer(pool).unwrap()
    };

    assert!(matches!(
        factory.submit(&mut cmd, &SubmitInfo::default()),
        Err(Error::InvalidState(_))
    ));

    cmd.begin().unwrap();
    assert!(matches!(
        factory.submit(&mut cmd, &SubmitInfo::default()),
        Err(Error::InvalidState(_))
    ));

    cmd.end().unwrap();
    factory.submit(&mut cmd, &SubmitInfo::default()).unwrap();
    assert_eq!(cmd.state(), CommandBufferState::Submitted);

    // resubmitting without re-recording is rejected
    assert!(factory.submit(&mut cmd, &SubmitInfo::default()).is_err());
}

#[test]
fn test_submit_signals_fence() {
    let mut factory = factory_with(Config::default()).unwrap();
    let fence = factory.create_fence(false).unwrap();
    assert!(!factory.fence_signaled(fence).unwrap());
    assert_eq!(factory.wait_for_fence_timeout(fence, 0).unwrap(), false);
    assert!(factory.wait_for_fence(fence).is_err());

    let mut cmd = {
        let mut resources = factory.resources();
        let pool = resources.create_command_pool(QueueRole::Compute).unwrap();
        resources.allocate_command_buffer(pool).unwrap()
    };
    cmd.begin().unwrap();
    cmd.end().unwrap();
    factory
        .submit(&mut cmd, &SubmitInfo { fence: Some(fence), ..SubmitInfo::default() })
        .unwrap();

    assert!(factory.fence_signaled(fence).unwrap());
    factory.wait_for_fence(fence).unwrap();
    factory.reset_fence(fence).unwrap();
    assert!(!factory.fence_signaled(fence).unwrap());

    factory.destroy_fence(fence);
    assert!(!null(&factory).is_fence_alive(fence));
}

// ===== EXTENSIONS =====

struct Marker {
    adapter: String,
}

impl Extension for Marker {
    fn name(&self) -> &'static str {
        Self::NAME
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl NamedExtension for Marker {
    const NAME: &'static str = "test.marker";
}

fn make_marker(init: &ExtensionInit<'_>) -> Result<Option<Box<dyn Extension>>> {
    Ok(Some(Box::new(Marker { adapter: init.adapter.name.clone() })))
}

fn vulkan_marker(init: &ExtensionInit<'_>) -> Result<Option<Box<dyn Extension>>> {
    if init.backend_kind != BackendKind::Vulkan {
        return Ok(None);
    }
    make_marker(init)
}

#[test]
fn test_configured_extension_is_available() {
    let mut config = Config::default();
    config.extensions.push(ExtensionDescriptor::new(Marker::NAME, make_marker));
    let factory = factory_with(config).unwrap();

    let marker = factory.get_context::<Marker>().unwrap();
    assert_eq!(marker.adapter, "Nova Null Device");
    assert!(factory.context_by_name("test.marker").is_some());
    assert!(factory.context_by_name("test.missing").is_none());
}

#[test]
fn test_added_extension_respects_backend_support() {
    let mut factory = factory_with(Config::default()).unwrap();
    assert!(factory.get_context::<Marker>().is_none());

    let supported = factory.add_extension(ExtensionDescriptor::new(Marker::NAME, vulkan_marker)).unwrap();
    assert!(!supported);
    assert!(factory.get_context::<Marker>().is_none());

    let supported = factory.add_extension(ExtensionDescriptor::new(Marker::NAME, make_marker)).unwrap();
    assert!(supported);
    assert!(factory.get_context_mut::<Marker>().is_some());
}
