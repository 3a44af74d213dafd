//! Duration predictor — cascade over cached aggregates
//!
//! Given a prospective task, returns an estimated duration in seconds
//! with a source tag. The cascade is a pure read through the aggregate
//! cache; no inference happens here:
//!
//! 1. `actual`         — the historical row for this exact action (replay)
//! 2. `route_stats`    — trimmed route median, forklift tasks
//! 3. `picker_product` — per-task seconds derived from the pair's rates
//! 4. `default`        — the wave mean, or the global mean fallback

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregation::AggregateCache;
use crate::config::defaults::{GLOBAL_MEAN_TASK_SECONDS, ROUTE_CONFIDENCE_FLOOR};
use crate::historical::extract_zone;
use crate::types::WorkerRole;

/// Which rung of the cascade produced the estimate.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum PredictionSource {
    Actual,
    RouteStats,
    PickerProduct,
    Default,
}

impl std::fmt::Display for PredictionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionSource::Actual => write!(f, "actual"),
            PredictionSource::RouteStats => write!(f, "route_stats"),
            PredictionSource::PickerProduct => write!(f, "picker_product"),
            PredictionSource::Default => write!(f, "default"),
        }
    }
}

/// A duration estimate with provenance.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Prediction {
    pub seconds: f64,
    pub source: PredictionSource,
}

/// The task being costed.
#[derive(Debug, Clone)]
pub struct ProspectiveTask {
    /// Identity of the historical action when replaying
    pub action_id: Option<Uuid>,
    pub worker_id: Option<String>,
    pub role: WorkerRole,
    pub from_slot: String,
    pub to_slot: String,
    pub product_sku: String,
    pub weight_kg: f64,
    pub quantity: f64,
    pub time: DateTime<Utc>,
}

/// Cascading duration predictor over a frozen aggregate snapshot.
pub struct DurationPredictor {
    cache: Arc<AggregateCache>,
    /// Replay mode: known actual durations by action id
    actuals: HashMap<Uuid, f64>,
    /// Mean task duration of the wave under study, when known
    wave_mean_seconds: Option<f64>,
}

impl DurationPredictor {
    pub fn new(cache: Arc<AggregateCache>) -> Self {
        Self {
            cache,
            actuals: HashMap::new(),
            wave_mean_seconds: None,
        }
    }

    /// Attach actual durations for replay mode.
    pub fn with_actuals(mut self, actuals: HashMap<Uuid, f64>) -> Self {
        self.actuals = actuals;
        self
    }

    /// Attach the wave's mean task duration as the default rung.
    pub fn with_wave_mean(mut self, seconds: f64) -> Self {
        self.wave_mean_seconds = (seconds > 0.0).then_some(seconds);
        self
    }

    /// Run the cascade.
    pub fn predict(&self, task: &ProspectiveTask) -> Prediction {
        // 1. Exact actual (replay).
        if let Some(seconds) = task.action_id.and_then(|id| self.actuals.get(&id)) {
            return Prediction {
                seconds: *seconds,
                source: PredictionSource::Actual,
            };
        }

        // 2. Route statistics (forklift tasks).
        if task.role == WorkerRole::Forklift {
            let from_zone = extract_zone(&task.from_slot);
            let to_zone = extract_zone(&task.to_slot);
            if let Some(route) = self.cache.route(&from_zone, &to_zone) {
                if route.confidence >= ROUTE_CONFIDENCE_FLOOR {
                    return Prediction {
                        seconds: route.predicted_duration_seconds,
                        source: PredictionSource::RouteStats,
                    };
                }
            }
        }

        // 3. Picker × product skill (picker tasks).
        if task.role == WorkerRole::Picker {
            if let Some(stats) = task
                .worker_id
                .as_deref()
                .and_then(|w| self.cache.picker_product(w, &task.product_sku))
            {
                if let Some(seconds) = per_task_seconds(stats, task) {
                    return Prediction {
                        seconds,
                        source: PredictionSource::PickerProduct,
                    };
                }
            }
        }

        // 4. Wave mean, then global mean.
        let seconds = self
            .wave_mean_seconds
            .unwrap_or_else(|| {
                let global = self.cache.global_mean_duration_seconds;
                if global > 0.0 {
                    global
                } else {
                    GLOBAL_MEAN_TASK_SECONDS
                }
            });
        Prediction {
            seconds,
            source: PredictionSource::Default,
        }
    }
}

/// Derive per-task seconds from the pair's lines/units/kg-per-minute
/// rates: each usable rate contributes an estimate, averaged.
fn per_task_seconds(
    stats: &crate::types::PickerProductStats,
    task: &ProspectiveTask,
) -> Option<f64> {
    let mut estimates = Vec::with_capacity(3);
    if stats.lines_per_minute > 0.0 {
        estimates.push(60.0 / stats.lines_per_minute);
    }
    if stats.units_per_minute > 0.0 && task.quantity > 0.0 {
        estimates.push(60.0 * task.quantity / stats.units_per_minute);
    }
    if stats.kg_per_minute > 0.0 && task.weight_kg > 0.0 {
        estimates.push(60.0 * task.weight_kg / stats.kg_per_minute);
    }
    if estimates.is_empty() {
        return None;
    }
    Some(estimates.iter().sum::<f64>() / estimates.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PickerProductStats, RouteStatistics};

    fn make_cache(with_route: bool, with_picker: bool) -> Arc<AggregateCache> {
        let mut cache = AggregateCache {
            global_mean_duration_seconds: 150.0,
            ..AggregateCache::default()
        };
        if with_route {
            cache.routes.insert(
                ("I".into(), "D".into()),
                RouteStatistics {
                    from_zone: "I".into(),
                    to_zone: "D".into(),
                    normalized_trips: 15,
                    outliers_removed: 1,
                    avg_duration_seconds: 101.0,
                    median_duration_seconds: 99.0,
                    std_dev_seconds: 4.0,
                    lower_bound_seconds: 80.0,
                    upper_bound_seconds: 120.0,
                    predicted_duration_seconds: 99.0,
                    confidence: 0.75,
                },
            );
        }
        if with_picker {
            cache.picker_product.insert(
                ("P-1".into(), "SKU-1".into()),
                PickerProductStats {
                    picker_id: "P-1".into(),
                    product_sku: "SKU-1".into(),
                    lines_per_minute: 2.0,
                    units_per_minute: 8.0,
                    kg_per_minute: 24.0,
                    observations: 40,
                    confidence: 0.8,
                },
            );
        }
        Arc::new(cache)
    }

    fn forklift_task(action_id: Option<Uuid>) -> ProspectiveTask {
        ProspectiveTask {
            action_id,
            worker_id: Some("F-1".into()),
            role: WorkerRole::Forklift,
            from_slot: "01I-01-001-01".into(),
            to_slot: "01D-02-001-01".into(),
            product_sku: "SKU-1".into(),
            weight_kg: 12.0,
            quantity: 4.0,
            time: Utc::now(),
        }
    }

    #[test]
    fn cascade_prefers_actual_then_route_then_default() {
        let id = Uuid::new_v4();
        let mut actuals = HashMap::new();
        actuals.insert(id, 87.0);

        // Rung 1: actual wins.
        let predictor = DurationPredictor::new(make_cache(true, false)).with_actuals(actuals);
        let p = predictor.predict(&forklift_task(Some(id)));
        assert_eq!(p.source, PredictionSource::Actual);
        assert!((p.seconds - 87.0).abs() < 1e-9);

        // Rung 2: no actual → trimmed route median.
        let p = predictor.predict(&forklift_task(None));
        assert_eq!(p.source, PredictionSource::RouteStats);
        assert!((p.seconds - 99.0).abs() < 1e-9);

        // Rung 4: no route either → wave mean.
        let predictor = DurationPredictor::new(make_cache(false, false)).with_wave_mean(132.0);
        let p = predictor.predict(&forklift_task(None));
        assert_eq!(p.source, PredictionSource::Default);
        assert!((p.seconds - 132.0).abs() < 1e-9);
    }

    #[test]
    fn low_confidence_route_falls_through() {
        let cache = make_cache(true, false);
        // Rebuild with a low-confidence route.
        let mut routes = cache.routes.clone();
        if let Some(route) = routes.get_mut(&("I".into(), "D".into())) {
            route.confidence = 0.1;
        }
        let cache = Arc::new(AggregateCache {
            routes,
            global_mean_duration_seconds: 150.0,
            ..AggregateCache::default()
        });
        let p = DurationPredictor::new(cache).predict(&forklift_task(None));
        assert_eq!(p.source, PredictionSource::Default);
        assert!((p.seconds - 150.0).abs() < 1e-9);
    }

    #[test]
    fn picker_tasks_use_pair_rates() {
        let predictor = DurationPredictor::new(make_cache(false, true));
        let task = ProspectiveTask {
            action_id: None,
            worker_id: Some("P-1".into()),
            role: WorkerRole::Picker,
            from_slot: "01B-01-001-01".into(),
            to_slot: "01P-01-001-01".into(),
            product_sku: "SKU-1".into(),
            weight_kg: 12.0,
            quantity: 4.0,
            time: Utc::now(),
        };
        let p = predictor.predict(&task);
        assert_eq!(p.source, PredictionSource::PickerProduct);
        // (60/2 + 60·4/8 + 60·12/24) / 3 = (30 + 30 + 30) / 3
        assert!((p.seconds - 30.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_picker_pair_falls_to_default() {
        let predictor = DurationPredictor::new(make_cache(false, true));
        let task = ProspectiveTask {
            action_id: None,
            worker_id: Some("P-2".into()),
            role: WorkerRole::Picker,
            from_slot: "01B-01-001-01".into(),
            to_slot: "01P-01-001-01".into(),
            product_sku: "SKU-1".into(),
            weight_kg: 12.0,
            quantity: 4.0,
            time: Utc::now(),
        };
        let p = predictor.predict(&task);
        assert_eq!(p.source, PredictionSource::Default);
    }
}
