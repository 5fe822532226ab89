//! Integration tests for the backend plugin registry
//!
//! These tests register backend factories the way a backend crate does and
//! check that `Factory::init` dispatches through them. No GPU required.
//!
//! Run with: cargo test --test engine_integration_tests

use nova_rhi::nova::device::null::NullBackend;
use nova_rhi::nova::device::{Backend, BackendInit, BackendKind, Config};
use nova_rhi::nova::{Engine, Error, Factory};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// REGISTRY TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_null_backend_always_registered() {
    assert!(Engine::registered_backends().contains(&BackendKind::Null));
    let factory = Factory::init(Config::default(), None, 64, 64).unwrap();
    assert_eq!(factory.backend().kind(), BackendKind::Null);
}

#[test]
#[serial]
fn test_integration_registered_factory_is_used() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    Engine::register_backend(BackendKind::Vulkan, move |init: &BackendInit<'_>| {
        counter.fetch_add(1, Ordering::SeqCst);
        assert_eq!(init.width, 320);
        assert!(init.window.is_none());
        Ok(Box::new(NullBackend::new(init)?) as Box<dyn Backend>)
    });
    assert_eq!(Engine::registered_backends(), vec![BackendKind::Vulkan, BackendKind::Null]);

    let factory = Factory::init(Config::for_backend(BackendKind::Vulkan), None, 320, 200).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(factory.swapchain().width(), 320);
    assert_eq!(factory.swapchain().height(), 200);
}

#[test]
#[serial]
fn test_integration_factory_error_is_returned() {
    Engine::register_backend(BackendKind::Vulkan, |_init: &BackendInit<'_>| {
        Err(Error::InitializationFailed("no driver".to_string()))
    });

    match Factory::init(Config::for_backend(BackendKind::Vulkan), None, 64, 64) {
        Err(Error::InitializationFailed(message)) => assert_eq!(message, "no driver"),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("factory should have failed"),
    }
}
