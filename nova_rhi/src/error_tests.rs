//! Unit tests for error.rs
//!
//! Tests all Error variants, their Display output and the logging error macros.

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("vkQueueSubmit returned -4".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("vkQueueSubmit returned -4"));
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");
}

#[test]
fn test_invalid_resource_display() {
    let err = Error::InvalidResource("image handle is stale".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid resource"));
    assert!(display.contains("image handle is stale"));
}

#[test]
fn test_initialization_failed_display() {
    let err = Error::InitializationFailed("no present queue family".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Initialization failed"));
    assert!(display.contains("no present queue family"));
}

#[test]
fn test_invalid_state_display() {
    let err = Error::InvalidState("draw outside render pass".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid state"));
    assert!(display.contains("draw outside render pass"));
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_clone_and_eq() {
    let err = Error::InvalidState("recording".to_string());
    assert_eq!(err.clone(), err);
    assert_ne!(err, Error::OutOfMemory);
}

// ============================================================================
// RESULT AND MACRO TESTS
// ============================================================================

#[test]
fn test_error_propagation_with_question_mark() {
    fn inner() -> Result<i32> {
        Err(Error::OutOfMemory)
    }

    fn outer() -> Result<i32> {
        inner()?;
        Ok(42)
    }

    assert_eq!(outer(), Err(Error::OutOfMemory));
}

#[test]
fn test_engine_err_builds_backend_error() {
    let err = crate::engine_err!("nova::test", "fence {} lost", 3);
    assert_eq!(err, Error::BackendError("fence 3 lost".to_string()));
}

#[test]
fn test_engine_bail_returns_early() {
    fn bails(flag: bool) -> Result<u32> {
        if flag {
            crate::engine_bail!("nova::test", "bailed with {}", "flag");
        }
        Ok(7)
    }

    assert_eq!(bails(false), Ok(7));
    assert_eq!(bails(true), Err(Error::BackendError("bailed with flag".to_string())));
}

#[test]
fn test_engine_bail_warn_returns_early() {
    fn bails() -> Result<()> {
        crate::engine_bail_warn!("nova::test", "soft failure");
    }

    assert_eq!(bails(), Err(Error::BackendError("soft failure".to_string())));
}
