//! Error types for Nova RHI
//!
//! This module defines the error type shared by the core contexts and every
//! backend, plus the `engine_err!` / `engine_bail!` helpers that log an error
//! before handing it back to the caller.

use std::fmt;

/// Result type for Nova RHI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Nova RHI errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan, Null, etc.)
    BackendError(String),

    /// Out of GPU memory (also raised when a fresh descriptor pool cannot serve a set)
    OutOfMemory,

    /// Invalid resource (image, buffer, pipeline, handle, etc.)
    InvalidResource(String),

    /// Initialization failed (backend lookup, adapter, queue families, swapchain)
    InitializationFailed(String),

    /// Operation issued in the wrong state (command buffer state machine, render pass scope)
    InvalidState(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Log an ERROR (with file:line) and build an `Error::BackendError` from the same message
///
/// # Example
///
/// ```no_run
/// # use nova_rhi::engine_err;
/// let err = engine_err!("nova::vulkan", "Failed to create fence: {}", 42);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::nova::Engine::log_detailed(
            $crate::nova::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::nova::Error::BackendError(message)
    }};
}

/// Log an ERROR and return early with `Err(Error::BackendError(..))`
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

/// Log a WARN and build an `Error::BackendError` from the same message
#[macro_export]
macro_rules! engine_warn_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::nova::Engine::log(
            $crate::nova::log::LogSeverity::Warn,
            $source,
            message.clone()
        );
        $crate::nova::Error::BackendError(message)
    }};
}

/// Log a WARN and return early with `Err(Error::BackendError(..))`
#[macro_export]
macro_rules! engine_bail_warn {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_warn_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
