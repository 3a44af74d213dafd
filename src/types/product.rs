//! Products and weight categories

use serde::{Deserialize, Serialize};

/// Weight category derived from a product's unit weight.
///
/// Drives the heavy-on-bottom rule: heavier goods are placed into an
/// order before lighter ones so the light goods ride on top.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WeightCategory {
    /// Below the light threshold (default < 5 kg)
    Light,
    /// Between the light and heavy thresholds (default 5–20 kg)
    Medium,
    /// At or above the heavy threshold (default ≥ 20 kg)
    Heavy,
}

impl WeightCategory {
    /// Classify a unit weight against the configured category thresholds.
    pub fn classify(weight_kg: f64, light_below_kg: f64, heavy_from_kg: f64) -> Self {
        if weight_kg < light_below_kg {
            WeightCategory::Light
        } else if weight_kg < heavy_from_kg {
            WeightCategory::Medium
        } else {
            WeightCategory::Heavy
        }
    }
}

impl std::fmt::Display for WeightCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightCategory::Light => write!(f, "LIGHT"),
            WeightCategory::Medium => write!(f, "MEDIUM"),
            WeightCategory::Heavy => write!(f, "HEAVY"),
        }
    }
}

/// A stock-keeping unit. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// Opaque SKU identifier
    pub sku: String,
    /// Human-readable name
    pub name: String,
    /// Unit weight (kg)
    pub weight_kg: f64,
    /// Weight category derived at creation time
    pub weight_category: WeightCategory,
    /// Scheduling priority; defaults to ⌊weight_kg · 10⌋
    pub priority: u32,
}

impl Product {
    /// Create a product with the default weight-derived priority.
    pub fn new(
        sku: impl Into<String>,
        name: impl Into<String>,
        weight_kg: f64,
        light_below_kg: f64,
        heavy_from_kg: f64,
    ) -> Self {
        let weight_kg = weight_kg.max(0.0);
        Self {
            sku: sku.into(),
            name: name.into(),
            weight_kg,
            weight_category: WeightCategory::classify(weight_kg, light_below_kg, heavy_from_kg),
            priority: (weight_kg * 10.0).floor() as u32,
        }
    }

    /// Create a product with an explicit priority override.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_configured_thresholds() {
        assert_eq!(WeightCategory::classify(4.9, 5.0, 20.0), WeightCategory::Light);
        assert_eq!(WeightCategory::classify(5.0, 5.0, 20.0), WeightCategory::Medium);
        assert_eq!(WeightCategory::classify(19.9, 5.0, 20.0), WeightCategory::Medium);
        assert_eq!(WeightCategory::classify(20.0, 5.0, 20.0), WeightCategory::Heavy);
    }

    #[test]
    fn default_priority_is_ten_times_weight_floored() {
        let p = Product::new("SKU-1", "Flour 12kg", 12.35, 5.0, 20.0);
        assert_eq!(p.priority, 123);
        assert_eq!(p.weight_category, WeightCategory::Medium);
    }

    #[test]
    fn negative_weight_clamped_to_zero() {
        let p = Product::new("SKU-2", "Broken row", -3.0, 5.0, 20.0);
        assert_eq!(p.weight_kg, 0.0);
        assert_eq!(p.priority, 0);
    }
}
