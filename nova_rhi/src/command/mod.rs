/// Command recording: the `Command` stream and the `CommandBuffer` recorder

pub mod command;
pub mod command_buffer;

pub use command::*;
pub use command_buffer::*;
