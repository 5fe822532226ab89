/// Adapter and queue-family selection.
///
/// Backends describe what the driver reports with `AdapterInfo` and
/// `QueueFamilyInfo`; the choice itself is made here so every backend picks
/// devices and queues the same way.

use crate::error::{Error, Result};
use crate::device::types::QueueRole;

/// Physical adapter category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterType {
    DiscreteGpu,
    IntegratedGpu,
    VirtualGpu,
    Cpu,
    Other,
}

impl AdapterType {
    /// Preference rank (higher wins)
    pub fn priority(&self) -> u32 {
        match self {
            AdapterType::DiscreteGpu => 4,
            AdapterType::IntegratedGpu => 3,
            AdapterType::VirtualGpu => 2,
            AdapterType::Cpu => 1,
            AdapterType::Other => 0,
        }
    }
}

/// Description of a physical adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub adapter_type: AdapterType,
    pub vendor_id: u32,
    pub device_id: u32,
}

/// Capabilities of one queue family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub index: u32,
    pub queue_count: u32,
    pub graphics: bool,
    pub compute: bool,
    pub transfer: bool,
    /// Can present to the factory's surface
    pub present: bool,
}

/// Family index chosen for each queue role (indices may repeat)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub compute: u32,
    pub transfer: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn family(&self, role: QueueRole) -> u32 {
        match role {
            QueueRole::Graphics => self.graphics,
            QueueRole::Compute => self.compute,
            QueueRole::Transfer => self.transfer,
            QueueRole::Present => self.present,
        }
    }

    /// Distinct family indices, in role order
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(4);
        for role in QueueRole::ALL {
            let family = self.family(role);
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// Pick the preferred adapter: discrete > integrated > virtual > cpu > other,
/// first listed wins a tie. Returns the index into `adapters`.
pub fn select_adapter(adapters: &[AdapterInfo]) -> Result<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, adapter) in adapters.iter().enumerate() {
        let priority = adapter.adapter_type.priority();
        if best.map_or(true, |(_, best_priority)| priority > best_priority) {
            best = Some((index, priority));
        }
    }

    match best {
        Some((index, _)) => {
            crate::engine_info!(
                "nova::device",
                "Selected adapter '{}' ({:?})",
                adapters[index].name,
                adapters[index].adapter_type
            );
            Ok(index)
        }
        None => {
            crate::engine_error!("nova::device", "No graphics adapter found");
            Err(Error::InitializationFailed("No graphics adapter found".to_string()))
        }
    }
}

/// Resolve a family for every queue role.
///
/// Dedicated compute/transfer families are preferred; otherwise they fall
/// back to the graphics family. A missing graphics, compute or present
/// capability is fatal.
pub fn select_queue_families(families: &[QueueFamilyInfo]) -> Result<QueueFamilies> {
    let usable = |f: &&QueueFamilyInfo| f.queue_count > 0;

    let graphics = families
        .iter()
        .filter(usable)
        .find(|f| f.graphics)
        .map(|f| f.index)
        .ok_or_else(|| {
            crate::engine_error!("nova::device", "No graphics queue family found");
            Error::InitializationFailed("No graphics queue family found".to_string())
        })?;
    let graphics_info = families.iter().find(|f| f.index == graphics);

    let present = if graphics_info.map_or(false, |f| f.present) {
        Some(graphics)
    } else {
        families.iter().filter(usable).find(|f| f.present).map(|f| f.index)
    }
    .ok_or_else(|| {
        crate::engine_error!("nova::device", "No present queue family found");
        Error::InitializationFailed("No present queue family found".to_string())
    })?;

    let dedicated_compute = families
        .iter()
        .filter(usable)
        .find(|f| f.compute && !f.graphics)
        .map(|f| f.index);
    let compute = dedicated_compute
        .or_else(|| graphics_info.filter(|f| f.compute).map(|f| f.index))
        .or_else(|| families.iter().filter(usable).find(|f| f.compute).map(|f| f.index))
        .ok_or_else(|| {
            crate::engine_error!("nova::device", "No compute queue family found");
            Error::InitializationFailed("No compute queue family found".to_string())
        })?;

    // Graphics and compute families implicitly support transfer
    let transfer = families
        .iter()
        .filter(usable)
        .find(|f| f.transfer && !f.graphics && !f.compute)
        .map(|f| f.index)
        .or(dedicated_compute)
        .unwrap_or(graphics);

    let selected = QueueFamilies { graphics, compute, transfer, present };
    crate::engine_debug!(
        "nova::device",
        "Queue families: graphics {}, compute {}, transfer {}, present {}",
        graphics, compute, transfer, present
    );
    Ok(selected)
}

#[cfg(test)]
#[path = "selection_tests.rs"]
mod tests;
