/*!
# Nova RHI - Vulkan Backend

Vulkan implementation of the nova rendering hardware interface.

This crate provides a `Backend` built on the Ash bindings, with
gpu-allocator for memory management and the Khronos validation layers
routed into the nova logger when the `vulkan-validation` feature is on.

The backend is registered with the engine's backend registry and selected
at runtime through `Config::backend`.

## Example

```no_run
use nova_rhi::nova::Factory;
use nova_rhi::nova::device::{BackendKind, Config};
# fn run(window: &winit::window::Window) -> nova_rhi::nova::Result<()> {
nova_rhi_vulkan::register();
let factory = Factory::init(Config::for_backend(BackendKind::Vulkan), Some(window), 1280, 720)?;
# Ok(())
# }
```
*/

mod debug;
mod vulkan_convert;
mod vulkan_context;
mod vulkan_backend;
mod vulkan_swapchain;
mod vulkan_descriptor_set;
mod vulkan_pipeline;
mod vulkan_command_list;

use nova_rhi::nova::device::{Backend, BackendInit, BackendKind};
use nova_rhi::nova::Engine;

pub use vulkan_backend::VulkanBackend;
pub use vulkan_context::VulkanContext;

// Re-export debug utilities
pub use debug::{print_validation_stats_report, validation_stats, VALIDATION_SOURCE};

/// Register the Vulkan backend with the engine's backend registry
///
/// Call once before `Factory::init` with a Vulkan config. Registering again
/// replaces the previous factory.
pub fn register() {
    Engine::register_backend(BackendKind::Vulkan, |init: &BackendInit<'_>| {
        Ok(Box::new(VulkanBackend::new(init)?) as Box<dyn Backend>)
    });
}
