/// Construction-time configuration of a `Factory`.

use crate::device::extension::ExtensionDescriptor;
use crate::device::null::NullDeviceConfig;
use crate::device::types::Format;

/// Native backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    /// Vulkan (registered by the `nova_rhi_vulkan` crate)
    Vulkan,
    /// Headless in-memory backend, always available
    Null,
}

/// Swapchain presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    /// V-sync, always supported
    Fifo,
    /// V-sync with late frames presented immediately
    FifoRelaxed,
    /// Triple buffering, no tearing
    Mailbox,
    /// No synchronization, may tear
    Immediate,
}

/// Validation message severity filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Only errors
    ErrorsOnly,
    /// Errors and warnings
    ErrorsAndWarnings,
    /// Everything including info and verbose
    All,
}

/// Validation message category filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: true,
        }
    }
}

/// Validation statistics gathered by a backend's debug messenger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Factory configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend to instantiate through the plugin registry
    pub backend: BackendKind,

    /// Application name reported to the driver
    pub app_name: String,

    /// Application version reported to the driver (major, minor, patch)
    pub app_version: (u32, u32, u32),

    /// Enable backend validation layers (default: debug builds only)
    pub enable_validation: bool,

    /// Validation messages at or above this severity are forwarded to the logger
    pub debug_severity: DebugSeverity,

    /// Validation message categories forwarded to the logger
    pub debug_message_filter: DebugMessageFilter,

    /// Count validation messages (see `ValidationStats`)
    pub enable_validation_stats: bool,

    /// Preferred present mode (FIFO is used when unsupported)
    pub present_mode: PresentMode,

    /// Surface formats in order of preference (first supported wins)
    pub surface_formats: Vec<Format>,

    /// Frames in flight for `FrameSync` (0 = one per swapchain image)
    pub frames_in_flight: u32,

    /// Extensions instantiated at factory init
    pub extensions: Vec<ExtensionDescriptor>,

    /// Simulated device used by the Null backend
    pub null_device: NullDeviceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Null,
            app_name: "Nova Application".to_string(),
            app_version: (0, 1, 0),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            debug_message_filter: DebugMessageFilter::default(),
            enable_validation_stats: false,
            present_mode: PresentMode::Fifo,
            surface_formats: vec![Format::B8G8R8A8_SRGB, Format::R8G8B8A8_SRGB],
            frames_in_flight: 0,
            extensions: Vec::new(),
            null_device: NullDeviceConfig::default(),
        }
    }
}

impl Config {
    /// Default configuration targeting `backend`
    pub fn for_backend(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }
}
