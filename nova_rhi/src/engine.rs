/// Nova RHI global services
///
/// Holds the process-wide state shared by every factory: the logger and the
/// backend plugin registry. Both live in thread-safe statics so a backend
/// crate can register itself before any factory is created.

use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::SystemTime;
use rustc_hash::FxHashMap;
use crate::device::{Backend, BackendInit, BackendKind};
use crate::device::null::NullBackend;
use crate::error::{Error, Result};
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Global backend plugin registry (the Null backend is always present)
static BACKEND_REGISTRY: OnceLock<Mutex<FxHashMap<BackendKind, BackendFactory>>> = OnceLock::new();

/// Backend plugin factory function type
pub type BackendFactory = Arc<dyn Fn(&BackendInit<'_>) -> Result<Box<dyn Backend>> + Send + Sync>;

fn backend_registry() -> &'static Mutex<FxHashMap<BackendKind, BackendFactory>> {
    BACKEND_REGISTRY.get_or_init(|| {
        let mut plugins: FxHashMap<BackendKind, BackendFactory> = FxHashMap::default();
        plugins.insert(
            BackendKind::Null,
            Arc::new(|init: &BackendInit<'_>| {
                Ok(Box::new(NullBackend::new(init)?) as Box<dyn Backend>)
            }),
        );
        Mutex::new(plugins)
    })
}

// ===== PUBLIC API =====

/// Global engine services (logging, backend plugins)
pub struct Engine;

impl Engine {
    // ===== BACKEND PLUGIN API =====

    /// Register (or replace) the factory used to build a backend
    ///
    /// # Arguments
    ///
    /// * `kind` - Backend selector the factory answers to
    /// * `factory` - Function building the backend from the init parameters
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nova_rhi::nova::{Engine, device::{BackendKind, BackendInit}};
    /// use nova_rhi::nova::device::null::NullBackend;
    ///
    /// Engine::register_backend(BackendKind::Null, |init: &BackendInit<'_>| {
    ///     Ok(Box::new(NullBackend::new(init)?) as Box<dyn nova_rhi::nova::device::Backend>)
    /// });
    /// ```
    pub fn register_backend<F>(kind: BackendKind, factory: F)
    where
        F: Fn(&BackendInit<'_>) -> Result<Box<dyn Backend>> + Send + Sync + 'static,
    {
        match backend_registry().lock() {
            Ok(mut plugins) => {
                if plugins.insert(kind, Arc::new(factory)).is_some() {
                    crate::engine_debug!("nova::Engine", "Backend {:?} factory replaced", kind);
                } else {
                    crate::engine_info!("nova::Engine", "Backend {:?} registered", kind);
                }
            }
            Err(_) => {
                crate::engine_error!("nova::Engine", "Backend registry lock poisoned, {:?} not registered", kind);
            }
        }
    }

    /// Backends currently available, sorted by selector
    pub fn registered_backends() -> Vec<BackendKind> {
        let mut kinds: Vec<BackendKind> = match backend_registry().lock() {
            Ok(plugins) => plugins.keys().copied().collect(),
            Err(_) => Vec::new(),
        };
        kinds.sort();
        kinds
    }

    /// Build a backend through its registered factory
    ///
    /// # Errors
    ///
    /// `InitializationFailed` when no factory is registered for `kind`, or
    /// whatever the factory itself returns.
    pub(crate) fn create_backend(kind: BackendKind, init: &BackendInit<'_>) -> Result<Box<dyn Backend>> {
        let factory = {
            let plugins = backend_registry().lock().map_err(|_| {
                crate::engine_error!("nova::Engine", "Backend registry lock poisoned");
                Error::BackendError("Backend registry lock poisoned".to_string())
            })?;
            plugins.get(&kind).cloned()
        };

        match factory {
            Some(factory) => factory(init),
            None => {
                crate::engine_error!("nova::Engine", "Backend {:?} is not registered", kind);
                Err(Error::InitializationFailed(format!("Backend {:?} is not registered", kind)))
            }
        }
    }

    // ===== LOGGING API =====

    /// Set a custom logger
    ///
    /// # Arguments
    ///
    /// * `logger` - Any type implementing the Logger trait
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::default())));
        if let Ok(mut lock) = logger_lock.write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset logger to the default colored console logger
    pub fn reset_logger() {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::default())));
        if let Ok(mut lock) = logger_lock.write() {
            *lock = Box::new(DefaultLogger::default());
        }
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::default())));
        if let Ok(lock) = logger_lock.read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Internal logging method with file:line information (for ERROR logs)
    ///
    /// Used by engine_error! and engine_err! to include source location.
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::default())));
        if let Ok(lock) = logger_lock.read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
