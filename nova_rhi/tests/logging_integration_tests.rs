//! Integration tests for the Engine logging system
//!
//! These tests verify the logger plumbing and the entries the factory emits.
//! No GPU required.
//!
//! Run with: cargo test --test logging_integration_tests

use nova_rhi::nova::device::{BackendKind, Config};
use nova_rhi::nova::log::{LogEntry, LogSeverity, Logger};
use nova_rhi::nova::{Engine, Error, Factory};
use serial_test::serial;
use std::sync::{Arc, Mutex};

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_custom_logger() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log(LogSeverity::Info, "test::module", "Test info message".to_string());
    Engine::log(LogSeverity::Warn, "test::module", "Test warning message".to_string());
    Engine::log(LogSeverity::Error, "test::module", "Test error message".to_string());

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 3);
        assert_eq!(captured[0].severity, LogSeverity::Info);
        assert_eq!(captured[1].severity, LogSeverity::Warn);
        assert_eq!(captured[2].severity, LogSeverity::Error);
        assert!(captured.iter().all(|e| e.source == "test::module"));
        assert_eq!(captured[2].message, "Test error message");
        assert_eq!(captured[2].file, None);
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_error_logging_with_location() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log_detailed(
        LogSeverity::Error,
        "test::error",
        "Critical error occurred".to_string(),
        "test_file.rs",
        42,
    );

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].file, Some("test_file.rs"));
        assert_eq!(captured[0].line, Some(42));
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_logger_reset() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log(LogSeverity::Info, "test", "Message 1".to_string());
    assert_eq!(entries.lock().unwrap().len(), 1);

    Engine::reset_logger();

    // goes to the default logger, not captured
    Engine::log(LogSeverity::Info, "test", "Message 2".to_string());
    assert_eq!(entries.lock().unwrap().len(), 1);
}

// ============================================================================
// FACTORY LOGGING
// ============================================================================

#[test]
#[serial]
fn test_integration_factory_init_is_logged() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    let factory = Factory::init(Config::default(), None, 64, 64).unwrap();
    drop(factory);

    {
        let captured = entries.lock().unwrap();
        let init = captured
            .iter()
            .find(|e| e.source == "nova::Factory" && e.message.starts_with("Factory initialized"))
            .expect("factory init entry");
        assert_eq!(init.severity, LogSeverity::Info);
        assert!(init.message.contains("Nova Null Device"));
        assert!(captured
            .iter()
            .any(|e| e.source == "nova::Factory" && e.message == "Factory destroyed"));
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_unregistered_backend_error_has_location() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    let result = Factory::init(Config::for_backend(BackendKind::Vulkan), None, 64, 64);
    assert!(matches!(result, Err(Error::InitializationFailed(_))));

    {
        let captured = entries.lock().unwrap();
        let error = captured
            .iter()
            .find(|e| e.severity == LogSeverity::Error)
            .expect("error entry");
        assert_eq!(error.source, "nova::Engine");
        assert!(error.message.contains("Vulkan"));
        assert!(error.file.is_some());
        assert!(error.line.is_some());
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_surface_format_fallback_warns() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    let mut config = Config::default();
    config.surface_formats = vec![nova_rhi::nova::device::Format::R16G16B16A16_SFLOAT];
    let factory = Factory::init(config, None, 64, 64).unwrap();
    assert_eq!(factory.swapchain().format(), nova_rhi::nova::device::Format::B8G8R8A8_SRGB);

    {
        let captured = entries.lock().unwrap();
        assert!(captured
            .iter()
            .any(|e| e.severity == LogSeverity::Warn && e.message.contains("falling back")));
    }

    drop(factory);
    Engine::reset_logger();
}
