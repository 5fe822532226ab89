#![allow(dead_code)]
//! GPU test utilities - Shared Vulkan factory for integration tests
//!
//! winit only allows one event loop per process and ash-window refuses to
//! create a second surface for the same window on some platforms, so every
//! GPU test shares one hidden window and one `Factory`.

use nova_rhi::nova::device::{BackendKind, Config};
use nova_rhi::nova::Factory;
use std::sync::{Arc, Mutex, OnceLock};
use winit::event_loop::EventLoop;
use winit::window::Window;

// Platform-specific imports for EventLoop threading
#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;
#[cfg(all(unix, not(target_os = "macos")))]
use winit::platform::x11::EventLoopBuilderExtX11;

pub const TEST_WIDTH: u32 = 800;
pub const TEST_HEIGHT: u32 = 600;

/// Global factory (initialized once)
static GPU_FACTORY: OnceLock<Arc<Mutex<Factory>>> = OnceLock::new();

/// Global window (kept alive for the surface)
static GPU_WINDOW: OnceLock<Window> = OnceLock::new();

/// Get the shared Vulkan factory for GPU tests
///
/// Lazily registers the backend and creates the factory on first call.
///
/// The event loop is leaked with `mem::forget` to keep the window valid; it
/// cannot live in a static (not Sync).
pub fn get_test_factory() -> Arc<Mutex<Factory>> {
    GPU_FACTORY
        .get_or_init(|| {
            nova_rhi_vulkan::register();

            let (window, event_loop) = create_test_window();
            let window = GPU_WINDOW.get_or_init(|| window);

            let mut config = Config::for_backend(BackendKind::Vulkan);
            config.app_name = "nova_rhi_vulkan tests".to_string();
            let factory = Factory::init(config, Some(window), TEST_WIDTH, TEST_HEIGHT)
                .expect("Failed to create the Vulkan factory for tests");

            std::mem::forget(event_loop);

            Arc::new(Mutex::new(factory))
        })
        .clone()
}

/// Create a hidden test window
///
/// The event loop is allowed off the main thread, which cargo test requires.
#[allow(deprecated)]
pub fn create_test_window() -> (Window, EventLoop<()>) {
    let mut builder = EventLoop::builder();
    #[cfg(target_os = "windows")]
    builder.with_any_thread(true);
    #[cfg(all(unix, not(target_os = "macos")))]
    builder.with_any_thread(true);
    let event_loop = builder.build().unwrap();

    let window_attrs = Window::default_attributes()
        .with_title("GPU Test Window")
        .with_inner_size(winit::dpi::PhysicalSize::new(TEST_WIDTH, TEST_HEIGHT))
        .with_visible(false);

    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}
