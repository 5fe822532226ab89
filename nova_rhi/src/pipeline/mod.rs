/// Pipeline module - pipelines, render targets, descriptors and samplers

pub mod types;
pub mod descriptor;
pub mod render_target;
pub mod descriptor_allocator;
pub mod pipeline_context;

pub use types::*;
pub use descriptor::*;
pub use render_target::*;
pub use descriptor_allocator::*;
pub use pipeline_context::*;
