/*!
# Nova RHI

Backend-agnostic rendering hardware interface.

This crate provides the GPU abstraction the rest of a renderer is written
against: a device factory, typed resource handles, pipelines, descriptors
and a command recorder. Native APIs plug in as backends through the
runtime registry; the headless Null backend ships with the core.

## Architecture

- **Factory**: Owns the backend, the swapchain and the stores
- **ResourceContext**: Buffers, images, views and command pools
- **PipelineContext**: Samplers, descriptors, pipelines and frame buffers
- **DescriptorAllocator**: Growable pool allocator for transient sets
- **CommandBuffer**: Validating recorder replayed by the backend at submit
- **FrameSync**: Frames-in-flight semaphores and fences

Backends implement the `Backend` trait and hand out slot-map handles; the
core never touches native objects.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod device;
pub mod resource;
pub mod pipeline;
pub mod command;

// Main nova namespace module
pub mod nova {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton (logger + backend registry)
    pub use crate::engine::Engine;

    // Entry points
    pub use crate::device::{Factory, FrameSync};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Device, backends, swapchain and synchronization
    pub mod device {
        pub use crate::device::*;
    }

    // Buffers, images and command pools
    pub mod resource {
        pub use crate::resource::*;
    }

    // Pipelines, render targets and descriptors
    pub mod pipeline {
        pub use crate::pipeline::*;
    }

    // Command recording
    pub mod command {
        pub use crate::command::*;
    }
}
