//! Aggregation Service — periodic recompute of statistics caches
//!
//! A background worker that recomputes worker / route / picker-product
//! statistics and hourly demand patterns on a timer (default 5 min).
//! Results are persisted through the repository and published to an
//! `ArcSwap` copy-on-write cache, so predictor lookups never contend
//! with a refresh in flight.

use arc_swap::ArcSwap;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::defaults::{DEMAND_PATTERN_WINDOW_DAYS, GLOBAL_MEAN_TASK_SECONDS};
use crate::config::RouteStatisticsConfig;
use crate::historical::{
    aggregate_picker_product, aggregate_routes, aggregate_workers_from_tasks,
    worker_transition_stats, HistoricalRepository, StoreError,
};
use crate::types::{
    PickerProductStats, RouteStatistics, WorkerRecord, WorkerRole, WorkerTransitionStats,
};

// ============================================================================
// Cache
// ============================================================================

/// Immutable aggregate snapshot served to the predictor.
#[derive(Debug, Default)]
pub struct AggregateCache {
    pub workers: Vec<WorkerRecord>,
    pub routes: HashMap<(String, String), RouteStatistics>,
    pub picker_product: HashMap<(String, String), PickerProductStats>,
    pub transitions: Vec<WorkerTransitionStats>,
    /// Average consumption rate by (hour_of_day, day_of_week)
    pub demand: HashMap<(u32, u32), f64>,
    /// Mean completed-task duration over the whole log
    pub global_mean_duration_seconds: f64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl AggregateCache {
    pub fn route(&self, from_zone: &str, to_zone: &str) -> Option<&RouteStatistics> {
        self.routes.get(&(from_zone.to_string(), to_zone.to_string()))
    }

    pub fn picker_product(&self, picker_id: &str, sku: &str) -> Option<&PickerProductStats> {
        self.picker_product
            .get(&(picker_id.to_string(), sku.to_string()))
    }
}

// ============================================================================
// Service
// ============================================================================

/// Periodic aggregation worker with a copy-on-write result cache.
pub struct AggregationService {
    repository: HistoricalRepository,
    route_config: RouteStatisticsConfig,
    interval: std::time::Duration,
    cache: ArcSwap<AggregateCache>,
}

impl AggregationService {
    pub fn new(
        repository: HistoricalRepository,
        route_config: RouteStatisticsConfig,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            repository,
            route_config,
            interval,
            cache: ArcSwap::from_pointee(AggregateCache::default()),
        }
    }

    /// The current cache snapshot. Lock-free; refreshes swap in a new Arc.
    pub fn cache(&self) -> Arc<AggregateCache> {
        self.cache.load_full()
    }

    /// Recompute every aggregate table, persist, and publish the new cache.
    pub fn refresh(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        let records = self.repository.all_actions()?;

        let workers = aggregate_workers_from_tasks(&records);
        let routes = aggregate_routes(&records, &self.route_config);
        let picker_product =
            aggregate_picker_product(&records, self.route_config.full_confidence_trips);
        let mut transitions = worker_transition_stats(&records, WorkerRole::Picker);
        transitions.extend(worker_transition_stats(&records, WorkerRole::Forklift));

        self.repository.save_workers(&workers)?;
        self.repository.save_routes(&routes)?;
        self.repository.save_picker_product(&picker_product)?;
        self.repository.save_transitions(&transitions)?;

        let demand = self.demand_patterns(now)?;

        let durations: Vec<f64> = records
            .iter()
            .filter_map(|r| r.duration_seconds)
            .filter(|d| *d > 0.0)
            .collect();
        let global_mean = if durations.is_empty() {
            GLOBAL_MEAN_TASK_SECONDS
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        let cache = AggregateCache {
            workers,
            routes: routes
                .into_iter()
                .map(|r| ((r.from_zone.clone(), r.to_zone.clone()), r))
                .collect(),
            picker_product: picker_product
                .into_iter()
                .map(|s| ((s.picker_id.clone(), s.product_sku.clone()), s))
                .collect(),
            transitions,
            demand,
            global_mean_duration_seconds: global_mean,
            refreshed_at: Some(now),
        };
        info!(
            workers = cache.workers.len(),
            routes = cache.routes.len(),
            picker_product = cache.picker_product.len(),
            "aggregates refreshed"
        );
        self.cache.store(Arc::new(cache));
        Ok(())
    }

    /// Hourly demand patterns from buffer snapshots, bucketed by
    /// (hour_of_day × day_of_week).
    fn demand_patterns(&self, now: DateTime<Utc>) -> Result<HashMap<(u32, u32), f64>, StoreError> {
        let window_start = now - Duration::days(DEMAND_PATTERN_WINDOW_DAYS);
        let snapshots = self.repository.snapshots_range(window_start, now)?;

        let mut sums: HashMap<(u32, u32), (f64, u64)> = HashMap::new();
        for snapshot in snapshots {
            let key = (
                snapshot.time.hour(),
                snapshot.time.weekday().num_days_from_monday(),
            );
            let entry = sums.entry(key).or_insert((0.0, 0));
            entry.0 += snapshot.consumption_rate;
            entry.1 += 1;
        }
        Ok(sums
            .into_iter()
            .map(|(key, (sum, count))| (key, sum / count as f64))
            .collect())
    }

    // ------------------------------------------------------------------
    // Forecast reads (documented fallbacks to global averages)
    // ------------------------------------------------------------------

    /// Lines/minute forecast for a picker at the given hour.
    ///
    /// Falls back to the picker's overall rate, then to the crew-wide
    /// average, then to a conservative 1 line/min.
    pub fn picker_speed_forecast(&self, picker_id: &str, _hour: u32) -> f64 {
        let cache = self.cache();
        let own: Vec<f64> = cache
            .picker_product
            .values()
            .filter(|s| s.picker_id == picker_id)
            .map(|s| s.lines_per_minute)
            .collect();
        if !own.is_empty() {
            return own.iter().sum::<f64>() / own.len() as f64;
        }
        let all: Vec<f64> = cache
            .picker_product
            .values()
            .map(|s| s.lines_per_minute)
            .collect();
        if all.is_empty() {
            1.0
        } else {
            all.iter().sum::<f64>() / all.len() as f64
        }
    }

    /// Duration forecast for a forklift route (seconds).
    ///
    /// Falls back to the global mean task duration when the route has
    /// no trimmed statistic.
    pub fn route_duration_forecast(&self, from_zone: &str, to_zone: &str) -> f64 {
        let cache = self.cache();
        cache
            .route(from_zone, to_zone)
            .map(|r| r.predicted_duration_seconds)
            .unwrap_or(cache.global_mean_duration_seconds.max(1.0))
    }

    /// Expected consumption rate at a point in time.
    ///
    /// Falls back to the average over all buckets when the exact
    /// (hour, weekday) bucket has never been observed.
    pub fn demand_forecast(&self, at: DateTime<Utc>) -> f64 {
        let cache = self.cache();
        let key = (at.hour(), at.weekday().num_days_from_monday());
        if let Some(rate) = cache.demand.get(&key) {
            return *rate;
        }
        if cache.demand.is_empty() {
            return 0.0;
        }
        cache.demand.values().sum::<f64>() / cache.demand.len() as f64
    }

    /// Background loop: refresh on a timer until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(interval_s = self.interval.as_secs(), "aggregation service started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("aggregation service shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let service = Arc::clone(&self);
                    // Aggregation is CPU + sled I/O; keep it off the scheduler.
                    let result = tokio::task::spawn_blocking(move || service.refresh(Utc::now())).await;
                    match result {
                        Ok(Ok(())) => debug!("aggregation cycle complete"),
                        Ok(Err(e)) => warn!(error = %e, "aggregation cycle failed, will retry next tick"),
                        Err(e) => warn!(error = %e, "aggregation task panicked"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionStatus, BufferSnapshot, TaskActionRecord};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn make_service() -> (tempfile::TempDir, AggregationService) {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = HistoricalRepository::open(dir.path()).expect("open");
        let service = AggregationService::new(
            repo,
            RouteStatisticsConfig::default(),
            std::time::Duration::from_secs(300),
        );
        (dir, service)
    }

    fn make_forklift_record(duration: f64, minute: i64) -> TaskActionRecord {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).single().expect("valid")
            + Duration::minutes(minute);
        TaskActionRecord {
            id: Uuid::new_v4(),
            worker_id: "F-1".into(),
            worker_name: "Forklift 1".into(),
            role: WorkerRole::Forklift,
            template: "replenishment".into(),
            basis_number: 1,
            from_bin: "01I-01-001-01".into(),
            to_bin: "01D-02-001-01".into(),
            product_sku: "SKU-1".into(),
            product_name: "Widget".into(),
            weight_kg: 10.0,
            quantity: 1.0,
            started_at: Some(start),
            completed_at: Some(start + Duration::seconds(duration as i64)),
            status: ActionStatus::Completed,
            duration_seconds: Some(duration),
            failure_reason: None,
            wave_number: Some(1),
        }
    }

    #[test]
    fn refresh_publishes_routes_and_global_mean() {
        let (_dir, service) = make_service();
        let records: Vec<TaskActionRecord> =
            (0..5).map(|i| make_forklift_record(100.0 + i as f64, i as i64 * 5)).collect();
        service.repository.save_task_batch(&records).expect("save");

        service.refresh(Utc::now()).expect("refresh");
        let cache = service.cache();
        assert!(cache.route("I", "D").is_some());
        assert!((cache.global_mean_duration_seconds - 102.0).abs() < 1e-9);

        // Forecast reads the trimmed median.
        let forecast = service.route_duration_forecast("I", "D");
        assert!((forecast - 102.0).abs() < 1e-9);
        // Unknown route falls back to the global mean.
        let fallback = service.route_duration_forecast("X", "Y");
        assert!((fallback - 102.0).abs() < 1e-9);
    }

    #[test]
    fn demand_forecast_buckets_by_hour_and_weekday() {
        let (_dir, service) = make_service();
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).single().expect("valid");
        // Monday 09:xx snapshots at 120 pal/h.
        for minute in [0, 10, 20] {
            let time = Utc.with_ymd_and_hms(2025, 3, 10, 9, minute, 0).single().expect("valid");
            service
                .repository
                .buffer_snapshot(&BufferSnapshot {
                    time,
                    buffer_level: 0.5,
                    buffer_state: "NORMAL".into(),
                    pallets_count: 25,
                    active_forklifts: 2,
                    active_pickers: 10,
                    consumption_rate: 120.0,
                    delivery_rate: 110.0,
                    queue_length: 0,
                    pending_tasks: 3,
                })
                .expect("save");
        }
        service.refresh(now).expect("refresh");

        let monday_nine = Utc.with_ymd_and_hms(2025, 3, 17, 9, 30, 0).single().expect("valid");
        assert!((service.demand_forecast(monday_nine) - 120.0).abs() < 1e-9);
        // Unobserved bucket: falls back to the overall average.
        let sunday_three = Utc.with_ymd_and_hms(2025, 3, 16, 3, 0, 0).single().expect("valid");
        assert!((service.demand_forecast(sunday_three) - 120.0).abs() < 1e-9);
    }
}
