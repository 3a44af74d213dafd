//! Forklifts and pickers — the two worker pools

use serde::{Deserialize, Serialize};

use super::Pallet;

// ============================================================================
// Forklifts
// ============================================================================

/// Operational state of a forklift.
///
/// Invariant: a forklift holds at most one task at a time, and any
/// non-Idle, non-Offline state implies a bound task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum ForkliftState {
    #[default]
    Idle,
    MovingToPallet,
    Loading,
    MovingToBuffer,
    Unloading,
    Offline,
}

impl std::fmt::Display for ForkliftState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForkliftState::Idle => write!(f, "Idle"),
            ForkliftState::MovingToPallet => write!(f, "Moving To Pallet"),
            ForkliftState::Loading => write!(f, "Loading"),
            ForkliftState::MovingToBuffer => write!(f, "Moving To Buffer"),
            ForkliftState::Unloading => write!(f, "Unloading"),
            ForkliftState::Offline => write!(f, "Offline"),
        }
    }
}

/// A buffer-replenishment forklift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forklift {
    pub id: String,
    pub name: String,
    /// Travel speed (m/s)
    pub speed_m_per_s: f64,
    /// Fixed time to load or unload one pallet (seconds)
    pub load_unload_s: f64,
    /// Current position along the storage→buffer axis (meters from buffer)
    pub current_position_m: f64,
    pub state: ForkliftState,
    /// Weak back-reference to the currently bound task, if any
    pub current_task_id: Option<String>,
}

impl Forklift {
    pub fn new(id: impl Into<String>, name: impl Into<String>, speed_m_per_s: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            speed_m_per_s: speed_m_per_s.max(0.1),
            load_unload_s: 30.0,
            current_position_m: 0.0,
            state: ForkliftState::Idle,
            current_task_id: None,
        }
    }

    /// Whether this forklift can accept a new task right now.
    pub fn is_available(&self) -> bool {
        self.state == ForkliftState::Idle && self.current_task_id.is_none()
    }

    /// Estimated time to deliver the given pallet to the buffer (seconds).
    ///
    /// Travel to the pallet, load, travel back to the buffer, unload.
    pub fn estimate_delivery_time(&self, pallet: &Pallet) -> f64 {
        let to_pallet = (pallet.storage_distance_m - self.current_position_m).abs();
        let back = pallet.storage_distance_m;
        to_pallet / self.speed_m_per_s
            + self.load_unload_s
            + back / self.speed_m_per_s
            + self.load_unload_s
    }
}

// ============================================================================
// Pickers
// ============================================================================

/// Operational state of a picker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum PickerState {
    #[default]
    Idle,
    Picking,
    /// Waiting on an empty buffer, the stall condition the controller fights
    Waiting,
    Break,
    Offline,
}

impl std::fmt::Display for PickerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PickerState::Idle => write!(f, "Idle"),
            PickerState::Picking => write!(f, "Picking"),
            PickerState::Waiting => write!(f, "Waiting"),
            PickerState::Break => write!(f, "Break"),
            PickerState::Offline => write!(f, "Offline"),
        }
    }
}

/// A packing-zone picker.
///
/// Pickers never own pallets beyond the current pick; they drain the
/// buffer into order cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Picker {
    pub id: String,
    pub name: String,
    pub state: PickerState,
    /// Long-run average pick rate (lines/hour)
    pub avg_rate: f64,
    /// Current observed pick rate (lines/hour)
    pub current_rate: f64,
    /// Pallets fully consumed per hour at the current rate
    pub pallet_consumption_rate: f64,
}

impl Picker {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: PickerState::Idle,
            avg_rate: 0.0,
            current_rate: 0.0,
            pallet_consumption_rate: 0.0,
        }
    }

    /// Whether this picker counts toward active buffer consumption.
    pub fn is_active(&self) -> bool {
        matches!(self.state, PickerState::Picking | PickerState::Waiting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;

    #[test]
    fn delivery_estimate_covers_round_trip_and_handling() {
        let mut forklift = Forklift::new("F-1", "Forklift 1", 2.0);
        forklift.load_unload_s = 30.0;
        forklift.current_position_m = 0.0;

        let product = Product::new("SKU-1", "Widget", 10.0, 5.0, 20.0);
        let pallet = Pallet::new("PAL-1", product, 10, 100.0);

        // 100m out at 2 m/s (50s) + 30s load + 100m back (50s) + 30s unload
        let est = forklift.estimate_delivery_time(&pallet);
        assert!((est - 160.0).abs() < 1e-9);
    }

    #[test]
    fn offline_forklift_is_not_available() {
        let mut forklift = Forklift::new("F-2", "Forklift 2", 1.5);
        assert!(forklift.is_available());
        forklift.state = ForkliftState::Offline;
        assert!(!forklift.is_available());
    }
}
