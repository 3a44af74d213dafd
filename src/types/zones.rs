//! Buffer and storage zones, plus the periodic buffer snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Pallet, PalletLocation};

/// Zone operation errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ZoneError {
    #[error("buffer full: capacity {capacity} reached")]
    BufferFull { capacity: usize },
    #[error("pallet {0} not found")]
    PalletNotFound(String),
}

// ============================================================================
// Buffer Zone
// ============================================================================

/// The bounded buffer of fixed-capacity slots between storage and packing.
///
/// Invariants: the pallet multiset never exceeds `capacity`, and every
/// pallet inside has `location = Buffer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferZone {
    capacity: usize,
    pallets: HashMap<String, Pallet>,
}

impl BufferZone {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pallets: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.pallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pallets.is_empty()
    }

    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.pallets.len())
    }

    /// Fill level in [0, 1].
    pub fn fill_level(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.pallets.len() as f64 / self.capacity as f64
    }

    /// Insert a pallet. Fails when no free slot remains.
    pub fn insert(&mut self, mut pallet: Pallet) -> Result<(), ZoneError> {
        if self.pallets.len() >= self.capacity {
            return Err(ZoneError::BufferFull {
                capacity: self.capacity,
            });
        }
        pallet.location = PalletLocation::Buffer;
        self.pallets.insert(pallet.id.clone(), pallet);
        Ok(())
    }

    /// Remove and return a specific pallet.
    pub fn take_by_id(&mut self, id: &str) -> Result<Pallet, ZoneError> {
        self.pallets
            .remove(id)
            .ok_or_else(|| ZoneError::PalletNotFound(id.to_string()))
    }

    /// Remove and return the heaviest pallet (heavy-on-bottom pick order).
    pub fn take_heaviest(&mut self) -> Option<Pallet> {
        let id = self
            .pallets
            .values()
            .max_by(|a, b| {
                a.total_weight()
                    .partial_cmp(&b.total_weight())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|p| p.id.clone())?;
        self.pallets.remove(&id)
    }

    /// Pallets ordered by descending total weight.
    pub fn by_weight_desc(&self) -> Vec<&Pallet> {
        let mut pallets: Vec<&Pallet> = self.pallets.values().collect();
        pallets.sort_by(|a, b| {
            b.total_weight()
                .partial_cmp(&a.total_weight())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pallets
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pallets.contains_key(id)
    }
}

// ============================================================================
// Storage Zone
// ============================================================================

/// The large storage zone pallets are replenished from.
///
/// Unordered; every pallet carries its distance-to-buffer annotation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageZone {
    pallets: HashMap<String, Pallet>,
}

impl StorageZone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pallets.is_empty()
    }

    /// Ingest a pallet into storage.
    pub fn ingest(&mut self, mut pallet: Pallet) {
        pallet.location = PalletLocation::Storage;
        self.pallets.insert(pallet.id.clone(), pallet);
    }

    pub fn get(&self, id: &str) -> Option<&Pallet> {
        self.pallets.get(id)
    }

    /// Remove and return a specific pallet.
    pub fn take_by_id(&mut self, id: &str) -> Result<Pallet, ZoneError> {
        self.pallets
            .remove(id)
            .ok_or_else(|| ZoneError::PalletNotFound(id.to_string()))
    }

    /// The pallet nearest to the given position, if any.
    pub fn query_nearest(&self, position_m: f64) -> Option<&Pallet> {
        self.pallets.values().min_by(|a, b| {
            let da = (a.storage_distance_m - position_m).abs();
            let db = (b.storage_distance_m - position_m).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pallet> {
        self.pallets.values()
    }
}

// ============================================================================
// Buffer Snapshot
// ============================================================================

/// Periodic record of the buffer's operating point, persisted by the
/// historical loop and bucketed into hourly demand patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferSnapshot {
    pub time: DateTime<Utc>,
    /// Fill level in [0, 1]
    pub buffer_level: f64,
    /// Name of the controller state at snapshot time
    pub buffer_state: String,
    pub pallets_count: u32,
    pub active_forklifts: u32,
    pub active_pickers: u32,
    /// Pallets consumed per hour
    pub consumption_rate: f64,
    /// Pallets delivered per hour
    pub delivery_rate: f64,
    /// Pickers queued on the buffer
    pub queue_length: u32,
    pub pending_tasks: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;

    fn make_pallet(id: &str, weight: f64, qty: u32) -> Pallet {
        let product = Product::new(format!("SKU-{id}"), "Test", weight, 5.0, 20.0);
        Pallet::new(id, product, qty, 50.0)
    }

    #[test]
    fn insert_fails_when_full() {
        let mut buffer = BufferZone::new(2);
        buffer.insert(make_pallet("A", 1.0, 1)).expect("slot free");
        buffer.insert(make_pallet("B", 1.0, 1)).expect("slot free");
        let err = buffer.insert(make_pallet("C", 1.0, 1)).unwrap_err();
        assert_eq!(err, ZoneError::BufferFull { capacity: 2 });
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn inserted_pallets_are_relocated_to_buffer() {
        let mut buffer = BufferZone::new(4);
        buffer.insert(make_pallet("A", 1.0, 1)).expect("slot free");
        let taken = buffer.take_by_id("A").expect("present");
        assert_eq!(taken.location, PalletLocation::Buffer);
    }

    #[test]
    fn take_heaviest_respects_total_weight() {
        let mut buffer = BufferZone::new(4);
        // 2kg x 10 = 20kg total beats 15kg x 1
        buffer.insert(make_pallet("LIGHT", 15.0, 1)).expect("slot free");
        buffer.insert(make_pallet("HEAVY", 2.0, 10)).expect("slot free");
        let heaviest = buffer.take_heaviest().expect("non-empty");
        assert_eq!(heaviest.id, "HEAVY");
    }

    #[test]
    fn nearest_query_picks_closest_distance() {
        let mut storage = StorageZone::new();
        storage.ingest(make_pallet("FAR", 1.0, 1));
        storage.ingest({
            let mut p = make_pallet("NEAR", 1.0, 1);
            p.storage_distance_m = 10.0;
            p
        });
        let nearest = storage.query_nearest(0.0).expect("non-empty");
        assert_eq!(nearest.id, "NEAR");
    }
}
