//! Unit tests for adapter and queue-family selection.

use crate::device::selection::*;
use crate::error::Error;

fn adapter(name: &str, adapter_type: AdapterType) -> AdapterInfo {
    AdapterInfo { name: name.to_string(), adapter_type, vendor_id: 0, device_id: 0 }
}

fn family(index: u32, graphics: bool, compute: bool, transfer: bool, present: bool) -> QueueFamilyInfo {
    QueueFamilyInfo { index, queue_count: 1, graphics, compute, transfer, present }
}

// ============================================================================
// ADAPTER SELECTION
// ============================================================================

#[test]
fn test_select_adapter_prefers_discrete() {
    let adapters = vec![
        adapter("llvmpipe", AdapterType::Cpu),
        adapter("iGPU", AdapterType::IntegratedGpu),
        adapter("dGPU", AdapterType::DiscreteGpu),
    ];
    assert_eq!(select_adapter(&adapters).unwrap(), 2);
}

#[test]
fn test_select_adapter_first_wins_tie() {
    let adapters = vec![
        adapter("first", AdapterType::IntegratedGpu),
        adapter("second", AdapterType::IntegratedGpu),
    ];
    assert_eq!(select_adapter(&adapters).unwrap(), 0);
}

#[test]
fn test_select_adapter_empty_is_fatal() {
    assert!(matches!(select_adapter(&[]), Err(Error::InitializationFailed(_))));
}

// ============================================================================
// QUEUE FAMILY SELECTION
// ============================================================================

#[test]
fn test_single_universal_family_is_shared() {
    let families = select_queue_families(&[family(0, true, true, true, true)]).unwrap();
    assert_eq!(families, QueueFamilies { graphics: 0, compute: 0, transfer: 0, present: 0 });
    assert_eq!(families.unique_families(), vec![0]);
}

#[test]
fn test_dedicated_families_are_preferred() {
    let families = select_queue_families(&[
        family(0, true, true, true, true),
        family(1, false, true, true, false),
        family(2, false, false, true, false),
    ])
    .unwrap();

    assert_eq!(families.graphics, 0);
    assert_eq!(families.compute, 1);
    assert_eq!(families.transfer, 2);
    assert_eq!(families.present, 0);
    assert_eq!(families.unique_families(), vec![0, 1, 2]);
}

#[test]
fn test_transfer_falls_back_to_dedicated_compute() {
    let families = select_queue_families(&[
        family(0, true, true, true, true),
        family(1, false, true, true, false),
    ])
    .unwrap();
    assert_eq!(families.transfer, 1);
}

#[test]
fn test_present_on_separate_family() {
    let families = select_queue_families(&[
        family(0, true, true, true, false),
        family(1, false, false, false, true),
    ])
    .unwrap();
    assert_eq!(families.graphics, 0);
    assert_eq!(families.present, 1);
}

#[test]
fn test_missing_present_is_fatal() {
    let result = select_queue_families(&[family(0, true, true, true, false)]);
    assert!(matches!(result, Err(Error::InitializationFailed(msg)) if msg.contains("present")));
}

#[test]
fn test_missing_graphics_is_fatal() {
    let result = select_queue_families(&[family(0, false, true, true, true)]);
    assert!(matches!(result, Err(Error::InitializationFailed(msg)) if msg.contains("graphics")));
}

#[test]
fn test_missing_compute_is_fatal() {
    let result = select_queue_families(&[family(0, true, false, true, true)]);
    assert!(matches!(result, Err(Error::InitializationFailed(msg)) if msg.contains("compute")));
}

#[test]
fn test_empty_family_is_skipped() {
    let mut empty = family(0, true, true, true, true);
    empty.queue_count = 0;
    let families = select_queue_families(&[empty, family(1, true, true, true, true)]).unwrap();
    assert_eq!(families.graphics, 1);
}
