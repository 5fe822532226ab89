/// Resource module - buffers, images and command pools

pub mod types;
pub mod resource_context;

pub use types::*;
pub use resource_context::*;
