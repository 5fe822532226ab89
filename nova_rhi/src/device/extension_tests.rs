//! Unit tests for the extension registry.

use std::any::Any;
use crate::device::backend::BackendInit;
use crate::device::config::{BackendKind, Config};
use crate::device::extension::*;
use crate::device::null::NullBackend;
use crate::device::Backend;
use crate::error::{Error, Result};

struct Counter {
    hits: u32,
}

impl Extension for Counter {
    fn name(&self) -> &'static str {
        Self::NAME
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl NamedExtension for Counter {
    const NAME: &'static str = "test.counter";
}

fn make_counter(_init: &ExtensionInit<'_>) -> Result<Option<Box<dyn Extension>>> {
    Ok(Some(Box::new(Counter { hits: 0 })))
}

fn vulkan_only(init: &ExtensionInit<'_>) -> Result<Option<Box<dyn Extension>>> {
    if init.backend_kind == BackendKind::Vulkan {
        return Ok(Some(Box::new(Counter { hits: 0 })));
    }
    Ok(None)
}

fn failing(_init: &ExtensionInit<'_>) -> Result<Option<Box<dyn Extension>>> {
    Err(Error::InitializationFailed("extension refused".to_string()))
}

fn null_backend() -> NullBackend {
    let config = Config::default();
    NullBackend::new(&BackendInit { config: &config, window: None, width: 64, height: 64 }).unwrap()
}

fn init(backend: &NullBackend) -> ExtensionInit<'_> {
    ExtensionInit {
        backend_kind: backend.kind(),
        adapter: backend.adapter_info(),
        backend,
    }
}

#[test]
fn test_registered_extension_is_instantiated() {
    let backend = null_backend();
    let mut registry = ExtensionRegistry::new();
    registry.register(ExtensionDescriptor::new(Counter::NAME, make_counter));
    registry.instantiate_all(&init(&backend)).unwrap();

    assert!(registry.get::<Counter>().is_some());
    assert_eq!(registry.by_name("test.counter").map(|e| e.name()), Some("test.counter"));
    assert_eq!(registry.active(), vec!["test.counter"]);
}

#[test]
fn test_get_mut_reaches_the_instance() {
    let backend = null_backend();
    let mut registry = ExtensionRegistry::new();
    registry.register(ExtensionDescriptor::new(Counter::NAME, make_counter));
    registry.instantiate_all(&init(&backend)).unwrap();

    registry.get_mut::<Counter>().unwrap().hits += 2;
    assert_eq!(registry.get::<Counter>().unwrap().hits, 2);
}

#[test]
fn test_unregistered_lookup_is_none() {
    let registry = ExtensionRegistry::new();
    assert!(registry.get::<Counter>().is_none());
    assert!(registry.by_name("missing").is_none());
}

#[test]
fn test_unsupported_backend_yields_none() {
    let backend = null_backend();
    let mut registry = ExtensionRegistry::new();
    registry.register(ExtensionDescriptor::new(Counter::NAME, vulkan_only));
    registry.instantiate_all(&init(&backend)).unwrap();

    assert!(registry.is_registered(Counter::NAME));
    assert!(registry.get::<Counter>().is_none());
}

#[test]
fn test_factory_error_propagates() {
    let backend = null_backend();
    let mut registry = ExtensionRegistry::new();
    registry.register(ExtensionDescriptor::new("test.failing", failing));
    assert!(registry.instantiate_all(&init(&backend)).is_err());
}

#[test]
fn test_reregistration_replaces_descriptor() {
    let backend = null_backend();
    let mut registry = ExtensionRegistry::new();
    registry.register(ExtensionDescriptor::new(Counter::NAME, vulkan_only));
    registry.register(ExtensionDescriptor::new(Counter::NAME, make_counter));
    registry.instantiate_all(&init(&backend)).unwrap();
    assert!(registry.get::<Counter>().is_some());
}
