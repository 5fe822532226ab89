/// Device module - factory, backends, swapchain and synchronization

pub mod handles;
pub mod types;
pub mod config;
pub mod selection;
pub mod swapchain;
pub mod backend;
pub mod extension;
pub mod factory;
pub mod frame_sync;

// Headless backend (always available)
pub mod null;

pub use handles::*;
pub use types::*;
pub use config::*;
pub use selection::*;
pub use swapchain::*;
pub use backend::*;
pub use extension::*;
pub use factory::*;
pub use frame_sync::*;
