/// Swapchain description, acquire/present outcomes and surface negotiation.

use crate::error::{Error, Result};
use crate::device::config::PresentMode;
use crate::device::handles::{ImageHandle, ImageViewHandle};
use crate::device::types::{Extent2D, Format};

// ===== SURFACE =====

/// What the window surface supports
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceCapabilities {
    pub min_extent: Extent2D,
    pub max_extent: Extent2D,
    /// Extent imposed by the surface (None = the swapchain decides)
    pub current_extent: Option<Extent2D>,
    pub min_image_count: u32,
    /// None = no upper bound
    pub max_image_count: Option<u32>,
    pub formats: Vec<Format>,
    pub present_modes: Vec<PresentMode>,
}

/// Clamp a requested size to the surface bounds
///
/// A surface that dictates its current extent wins over the request.
pub fn clamp_extent(caps: &SurfaceCapabilities, width: u32, height: u32) -> Extent2D {
    if let Some(current) = caps.current_extent {
        return current;
    }
    Extent2D {
        width: width.clamp(caps.min_extent.width, caps.max_extent.width.max(caps.min_extent.width)),
        height: height.clamp(caps.min_extent.height, caps.max_extent.height.max(caps.min_extent.height)),
    }
}

/// One more image than the minimum, capped by the maximum
pub fn choose_image_count(caps: &SurfaceCapabilities) -> u32 {
    let desired = caps.min_image_count + 1;
    match caps.max_image_count {
        Some(max) if max > 0 => desired.min(max),
        _ => desired,
    }
}

/// First preferred format the surface supports, else the surface's first format
pub fn choose_surface_format(caps: &SurfaceCapabilities, preferred: &[Format]) -> Result<Format> {
    if let Some(format) = preferred.iter().find(|f| caps.formats.contains(f)) {
        return Ok(*format);
    }
    match caps.formats.first() {
        Some(format) => {
            crate::engine_warn!(
                "nova::device",
                "No preferred surface format supported, falling back to {:?}",
                format
            );
            Ok(*format)
        }
        None => {
            crate::engine_error!("nova::device", "Surface reports no formats");
            Err(Error::InitializationFailed("Surface reports no formats".to_string()))
        }
    }
}

/// Requested mode if supported, FIFO otherwise
pub fn choose_present_mode(caps: &SurfaceCapabilities, preferred: PresentMode) -> PresentMode {
    if caps.present_modes.contains(&preferred) {
        preferred
    } else {
        PresentMode::Fifo
    }
}

// ===== SWAPCHAIN =====

/// Parameters handed to the backend when (re)building the swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub extent: Extent2D,
    pub format: Format,
    pub present_mode: PresentMode,
    pub image_count: u32,
}

/// Presentable image and the default view the factory made for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
}

/// Current swapchain; rebuilt wholesale by `Factory::recreate_swapchain`
#[derive(Debug, Clone)]
pub struct Swapchain {
    pub(crate) images: Vec<SwapchainImage>,
    pub(crate) format: Format,
    pub(crate) extent: Extent2D,
    pub(crate) present_mode: PresentMode,
}

impl Swapchain {
    pub fn images(&self) -> &[SwapchainImage] {
        &self.images
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }
}

// ===== OUTCOMES =====

/// Result of acquiring the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Index of the acquired image
    Image(u32),
    /// Surface out of date or suboptimal: recreate the swapchain and retry
    OutOfDate,
}

impl AcquireOutcome {
    /// Image index, or -1 when the swapchain must be recreated
    pub fn index(&self) -> i64 {
        match self {
            AcquireOutcome::Image(index) => *index as i64,
            AcquireOutcome::OutOfDate => -1,
        }
    }
}

/// Result of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Surface out of date or suboptimal: recreate the swapchain
    OutOfDate,
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;
