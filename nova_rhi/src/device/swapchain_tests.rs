//! Unit tests for surface negotiation helpers.

use crate::device::config::PresentMode;
use crate::device::swapchain::*;
use crate::device::types::{Extent2D, Format};

fn caps() -> SurfaceCapabilities {
    SurfaceCapabilities {
        min_extent: Extent2D { width: 16, height: 16 },
        max_extent: Extent2D { width: 4096, height: 2048 },
        current_extent: None,
        min_image_count: 2,
        max_image_count: Some(3),
        formats: vec![Format::B8G8R8A8_UNORM, Format::R8G8B8A8_SRGB],
        present_modes: vec![PresentMode::Fifo, PresentMode::Immediate],
    }
}

#[test]
fn test_clamp_extent_to_bounds() {
    let caps = caps();
    assert_eq!(clamp_extent(&caps, 800, 600), Extent2D { width: 800, height: 600 });
    assert_eq!(clamp_extent(&caps, 1, 1), Extent2D { width: 16, height: 16 });
    assert_eq!(clamp_extent(&caps, 10000, 10000), Extent2D { width: 4096, height: 2048 });
}

#[test]
fn test_clamp_extent_uses_current_extent() {
    let mut caps = caps();
    caps.current_extent = Some(Extent2D { width: 1280, height: 720 });
    assert_eq!(clamp_extent(&caps, 800, 600), Extent2D { width: 1280, height: 720 });
}

#[test]
fn test_image_count_is_min_plus_one_capped() {
    let mut caps = caps();
    assert_eq!(choose_image_count(&caps), 3);

    caps.min_image_count = 3;
    assert_eq!(choose_image_count(&caps), 3);

    caps.max_image_count = None;
    assert_eq!(choose_image_count(&caps), 4);
}

#[test]
fn test_surface_format_preference() {
    let caps = caps();
    let format = choose_surface_format(&caps, &[Format::B8G8R8A8_SRGB, Format::R8G8B8A8_SRGB]).unwrap();
    assert_eq!(format, Format::R8G8B8A8_SRGB);

    let fallback = choose_surface_format(&caps, &[Format::R16G16B16A16_SFLOAT]).unwrap();
    assert_eq!(fallback, Format::B8G8R8A8_UNORM);
}

#[test]
fn test_surface_without_formats_fails() {
    let mut caps = caps();
    caps.formats.clear();
    assert!(choose_surface_format(&caps, &[Format::B8G8R8A8_SRGB]).is_err());
}

#[test]
fn test_present_mode_falls_back_to_fifo() {
    let caps = caps();
    assert_eq!(choose_present_mode(&caps, PresentMode::Immediate), PresentMode::Immediate);
    assert_eq!(choose_present_mode(&caps, PresentMode::Mailbox), PresentMode::Fifo);
}

#[test]
fn test_acquire_outcome_sentinel() {
    assert_eq!(AcquireOutcome::Image(2).index(), 2);
    assert_eq!(AcquireOutcome::OutOfDate.index(), -1);
}
