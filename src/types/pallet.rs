//! Pallets — the unit of movement between storage, buffer and picking

use serde::{Deserialize, Serialize};

use super::Product;

/// Where a pallet currently sits in its lifecycle.
///
/// Lifecycle: Storage → InTransit (held by exactly one forklift) →
/// Buffer → Picking → Completed. Pallets are created by storage
/// ingestion and destroyed after Completed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum PalletLocation {
    #[default]
    Storage,
    InTransit,
    Buffer,
    Picking,
    Completed,
}

impl std::fmt::Display for PalletLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PalletLocation::Storage => write!(f, "Storage"),
            PalletLocation::InTransit => write!(f, "In Transit"),
            PalletLocation::Buffer => write!(f, "Buffer"),
            PalletLocation::Picking => write!(f, "Picking"),
            PalletLocation::Completed => write!(f, "Completed"),
        }
    }
}

/// A mono-product pallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pallet {
    /// Opaque pallet identifier
    pub id: String,
    /// The single product carried
    pub product: Product,
    /// Units of the product on the pallet
    pub quantity: u32,
    /// Distance from the storage slot to the buffer (meters)
    pub storage_distance_m: f64,
    /// Storage bin code (`01<ZONE>-<AISLE>-<POSITION>-<SHELF>`), when known
    pub bin_code: Option<String>,
    /// Current lifecycle location
    pub location: PalletLocation,
}

impl Pallet {
    pub fn new(
        id: impl Into<String>,
        product: Product,
        quantity: u32,
        storage_distance_m: f64,
    ) -> Self {
        Self {
            id: id.into(),
            product,
            quantity,
            storage_distance_m,
            bin_code: None,
            location: PalletLocation::Storage,
        }
    }

    /// Annotate the storage bin code.
    pub fn with_bin_code(mut self, bin_code: impl Into<String>) -> Self {
        self.bin_code = Some(bin_code.into());
        self
    }

    /// Total weight carried (kg).
    pub fn total_weight(&self) -> f64 {
        self.product.weight_kg * f64::from(self.quantity)
    }
}
