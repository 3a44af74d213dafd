//! Aggregate computation over the raw action log
//!
//! Pure functions: rows in, aggregate tables out. Recomputing on an
//! unchanged log yields identical rows, which is what lets the
//! aggregation service run blindly on a timer.

use statrs::statistics::{Data, Distribution, OrderStatistics};
use std::collections::HashMap;

use crate::config::defaults::MAX_TRANSITION_GAP_SECONDS;
use crate::config::RouteStatisticsConfig;
use crate::types::{
    ActionStatus, PickerProductStats, RouteStatistics, TaskActionRecord, WorkerRecord, WorkerRole,
    WorkerTransitionStats,
};

use super::bin_code::extract_zone;

/// Rows that carry a usable duration signal.
fn usable(record: &TaskActionRecord) -> bool {
    record.status == ActionStatus::Completed
        && record.duration_seconds.map(|d| d > 0.0).unwrap_or(false)
}

// ============================================================================
// Workers
// ============================================================================

/// (Re)compute the per-worker performance table.
pub fn aggregate_workers_from_tasks(records: &[TaskActionRecord]) -> Vec<WorkerRecord> {
    let mut by_worker: HashMap<&str, Vec<&TaskActionRecord>> = HashMap::new();
    for record in records.iter().filter(|r| usable(r)) {
        by_worker.entry(record.worker_id.as_str()).or_default().push(record);
    }

    let mut workers: Vec<WorkerRecord> = by_worker
        .into_iter()
        .map(|(worker_id, rows)| {
            let durations: Vec<f64> =
                rows.iter().filter_map(|r| r.duration_seconds).collect();
            let mut data = Data::new(durations.clone());
            let avg = durations.iter().sum::<f64>() / durations.len() as f64;

            let first = rows.iter().filter_map(|r| r.started_at).min();
            let last = rows.iter().filter_map(|r| r.completed_at).max();
            let active_hours = match (first, last) {
                (Some(f), Some(l)) if l > f => (l - f).num_seconds() as f64 / 3600.0,
                _ => 0.0,
            };
            let tasks_per_hour = if active_hours > 0.0 {
                rows.len() as f64 / active_hours
            } else {
                0.0
            };

            WorkerRecord {
                worker_id: worker_id.to_string(),
                worker_name: rows[0].worker_name.clone(),
                role: rows[0].role,
                task_count: rows.len() as u64,
                avg_duration_seconds: avg,
                median_duration_seconds: data.median(),
                std_dev_duration_seconds: data.std_dev().unwrap_or(0.0),
                p90_duration_seconds: data.percentile(90),
                tasks_per_hour,
                first_activity: first,
                last_activity: last,
            }
        })
        .collect();

    workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
    workers
}

// ============================================================================
// Routes
// ============================================================================

/// (Re)compute route statistics for forklift actions, grouped by the
/// zone pair extracted from the from/to bin codes, with IQR outlier
/// trimming: accept `[Q1 − k·IQR, Q3 + k·IQR]`.
pub fn aggregate_routes(
    records: &[TaskActionRecord],
    config: &RouteStatisticsConfig,
) -> Vec<RouteStatistics> {
    let mut by_route: HashMap<(String, String), Vec<f64>> = HashMap::new();
    for record in records
        .iter()
        .filter(|r| usable(r) && r.role == WorkerRole::Forklift)
    {
        let key = (extract_zone(&record.from_bin), extract_zone(&record.to_bin));
        if let Some(duration) = record.duration_seconds {
            by_route.entry(key).or_default().push(duration);
        }
    }

    let mut routes: Vec<RouteStatistics> = by_route
        .into_iter()
        .filter_map(|((from_zone, to_zone), durations)| {
            let raw_count = durations.len() as u64;
            let mut data = Data::new(durations.clone());
            let q1 = data.lower_quartile();
            let q3 = data.upper_quartile();
            let iqr = q3 - q1;
            let lower = q1 - config.iqr_trim_factor * iqr;
            let upper = q3 + config.iqr_trim_factor * iqr;

            let trimmed: Vec<f64> = durations
                .iter()
                .copied()
                .filter(|d| *d >= lower && *d <= upper)
                .collect();
            let normalized_trips = trimmed.len() as u64;
            if normalized_trips < config.min_trips {
                return None;
            }

            let mut trimmed_data = Data::new(trimmed.clone());
            let median = trimmed_data.median();
            let avg = trimmed.iter().sum::<f64>() / trimmed.len() as f64;
            let confidence =
                (normalized_trips as f64 / config.full_confidence_trips as f64).min(1.0);

            Some(RouteStatistics {
                from_zone,
                to_zone,
                normalized_trips,
                outliers_removed: raw_count - normalized_trips,
                avg_duration_seconds: avg,
                median_duration_seconds: median,
                std_dev_seconds: trimmed_data.std_dev().unwrap_or(0.0),
                lower_bound_seconds: lower,
                upper_bound_seconds: upper,
                predicted_duration_seconds: median,
                confidence,
            })
        })
        .collect();

    routes.sort_by(|a, b| {
        a.from_zone
            .cmp(&b.from_zone)
            .then_with(|| a.to_zone.cmp(&b.to_zone))
    });
    routes
}

// ============================================================================
// Picker × product
// ============================================================================

/// (Re)compute picker×product skill statistics from picker-role rows.
pub fn aggregate_picker_product(
    records: &[TaskActionRecord],
    full_confidence_observations: u64,
) -> Vec<PickerProductStats> {
    struct Acc {
        lines: u64,
        units: f64,
        kg: f64,
        minutes: f64,
    }

    let mut by_pair: HashMap<(String, String), Acc> = HashMap::new();
    for record in records
        .iter()
        .filter(|r| usable(r) && r.role == WorkerRole::Picker)
    {
        let Some(duration) = record.duration_seconds else {
            continue;
        };
        let acc = by_pair
            .entry((record.worker_id.clone(), record.product_sku.clone()))
            .or_insert(Acc {
                lines: 0,
                units: 0.0,
                kg: 0.0,
                minutes: 0.0,
            });
        acc.lines += 1;
        acc.units += record.quantity;
        acc.kg += record.weight_kg;
        acc.minutes += duration / 60.0;
    }

    let mut stats: Vec<PickerProductStats> = by_pair
        .into_iter()
        .filter(|(_, acc)| acc.minutes > 0.0)
        .map(|((picker_id, product_sku), acc)| PickerProductStats {
            picker_id,
            product_sku,
            lines_per_minute: acc.lines as f64 / acc.minutes,
            units_per_minute: acc.units / acc.minutes,
            kg_per_minute: acc.kg / acc.minutes,
            observations: acc.lines,
            confidence: (acc.lines as f64 / full_confidence_observations.max(1) as f64).min(1.0),
        })
        .collect();

    stats.sort_by(|a, b| {
        a.picker_id
            .cmp(&b.picker_id)
            .then_with(|| a.product_sku.cmp(&b.product_sku))
    });
    stats
}

// ============================================================================
// Transitions
// ============================================================================

/// Median gap between a worker's successive same-day actions, counting
/// only gaps in `(0, 10 min)`.
pub fn worker_transition_stats(
    records: &[TaskActionRecord],
    role: WorkerRole,
) -> Vec<WorkerTransitionStats> {
    let mut by_worker: HashMap<&str, Vec<&TaskActionRecord>> = HashMap::new();
    for record in records.iter().filter(|r| r.role == role) {
        by_worker.entry(record.worker_id.as_str()).or_default().push(record);
    }

    let mut stats: Vec<WorkerTransitionStats> = by_worker
        .into_iter()
        .filter_map(|(worker_id, mut rows)| {
            rows.sort_by_key(|r| r.started_at);
            let mut gaps = Vec::new();
            for pair in rows.windows(2) {
                let (Some(prev_end), Some(next_start)) =
                    (pair[0].completed_at, pair[1].started_at)
                else {
                    continue;
                };
                if pair[0].day() != pair[1].day() {
                    continue;
                }
                let gap = (next_start - prev_end).num_milliseconds() as f64 / 1000.0;
                if gap > 0.0 && gap < MAX_TRANSITION_GAP_SECONDS {
                    gaps.push(gap);
                }
            }
            if gaps.is_empty() {
                return None;
            }
            let observations = gaps.len() as u64;
            let mut data = Data::new(gaps);
            Some(WorkerTransitionStats {
                worker_id: worker_id.to_string(),
                role,
                median_transition_seconds: data.median(),
                observations,
            })
        })
        .collect();

    stats.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
    stats
}
