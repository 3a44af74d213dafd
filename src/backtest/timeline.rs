//! Fact timeline reconstruction from the action log

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use crate::types::{TaskActionRecord, WorkerRole};

use super::{ScheduleEvent, TimelineKind};

/// The observed execution of a wave: actions ordered by time, wall
/// clock and per-day active spans, per-worker totals.
#[derive(Debug, Clone)]
pub struct FactTimeline {
    pub events: Vec<ScheduleEvent>,
    pub wall_clock_seconds: f64,
    /// Σ over days of (last end − first start) on that day
    pub active_seconds: f64,
    pub days: Vec<NaiveDate>,
    pub per_day_active_seconds: BTreeMap<NaiveDate, f64>,
    pub per_day_pallets: BTreeMap<NaiveDate, u32>,
    pub per_worker_active_seconds: HashMap<String, f64>,
    pub per_worker_tasks: HashMap<String, u32>,
}

impl FactTimeline {
    /// Build from wave rows. Rows without both timestamps carry no
    /// schedule information and are skipped.
    ///
    /// The buffer trace is reconstructed deterministically: every
    /// completed forklift action adds a pallet, every picker action
    /// removes one, clamped to `[0, capacity]`.
    pub fn build(records: &[TaskActionRecord], buffer_capacity: u32) -> Self {
        let mut timed: Vec<&TaskActionRecord> = records
            .iter()
            .filter(|r| r.started_at.is_some() && r.completed_at.is_some())
            .collect();
        timed.sort_by_key(|r| (r.started_at, r.id));

        let mut events = Vec::with_capacity(timed.len());
        let mut last_end_by_worker: HashMap<&str, chrono::DateTime<chrono::Utc>> = HashMap::new();
        let mut buffer_level: u32 = 0;
        let mut per_day_pallets: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        let mut per_worker_tasks: HashMap<String, u32> = HashMap::new();
        let mut per_worker_active: HashMap<String, f64> = HashMap::new();

        for record in &timed {
            let (Some(start), Some(end)) = (record.started_at, record.completed_at) else {
                continue;
            };
            let transition = last_end_by_worker
                .get(record.worker_id.as_str())
                .map(|prev| ((start - *prev).num_milliseconds() as f64 / 1000.0).max(0.0))
                .unwrap_or(0.0);
            last_end_by_worker.insert(record.worker_id.as_str(), end);

            let at_start = buffer_level;
            match record.role {
                WorkerRole::Forklift => {
                    buffer_level = (buffer_level + 1).min(buffer_capacity);
                    *per_day_pallets.entry(start.date_naive()).or_insert(0) += 1;
                }
                WorkerRole::Picker => {
                    buffer_level = buffer_level.saturating_sub(1);
                }
            }

            let duration = (end - start).num_milliseconds() as f64 / 1000.0;
            *per_worker_tasks.entry(record.worker_id.clone()).or_insert(0) += 1;
            *per_worker_active.entry(record.worker_id.clone()).or_insert(0.0) += duration;

            events.push(ScheduleEvent {
                timeline: TimelineKind::Fact,
                worker_id: record.worker_id.clone(),
                worker_name: record.worker_name.clone(),
                role: record.role,
                start,
                end,
                duration_seconds: duration,
                product_name: record.product_name.clone(),
                from_bin: record.from_bin.clone(),
                to_bin: record.to_bin.clone(),
                weight_kg: record.weight_kg,
                buffer_level_at_start: at_start,
                transition_seconds: transition,
            });
        }

        // Day spans.
        let mut day_bounds: BTreeMap<NaiveDate, (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> =
            BTreeMap::new();
        for event in &events {
            let day = event.start.date_naive();
            day_bounds
                .entry(day)
                .and_modify(|(first, last)| {
                    *first = (*first).min(event.start);
                    *last = (*last).max(event.end);
                })
                .or_insert((event.start, event.end));
        }
        let per_day_active_seconds: BTreeMap<NaiveDate, f64> = day_bounds
            .iter()
            .map(|(day, (first, last))| {
                (*day, (*last - *first).num_milliseconds() as f64 / 1000.0)
            })
            .collect();
        let active_seconds = per_day_active_seconds.values().sum();

        let wall_clock_seconds = match (
            events.iter().map(|e| e.start).min(),
            events.iter().map(|e| e.end).max(),
        ) {
            (Some(first), Some(last)) => (last - first).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };

        Self {
            events,
            wall_clock_seconds,
            active_seconds,
            days: day_bounds.keys().copied().collect(),
            per_day_active_seconds,
            per_day_pallets,
            per_worker_active_seconds: per_worker_active,
            per_worker_tasks,
        }
    }

    /// Mean task duration, the predictor's wave-level default.
    pub fn mean_task_duration(&self) -> Option<f64> {
        if self.events.is_empty() {
            return None;
        }
        Some(
            self.events.iter().map(|e| e.duration_seconds).sum::<f64>()
                / self.events.len() as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionStatus;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn make_record(
        worker: &str,
        role: WorkerRole,
        day: u32,
        hour: u32,
        duration_s: i64,
    ) -> TaskActionRecord {
        let start = Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).single().expect("valid");
        TaskActionRecord {
            id: Uuid::new_v4(),
            worker_id: worker.to_string(),
            worker_name: worker.to_string(),
            role,
            template: "t".into(),
            basis_number: 1,
            from_bin: "01I-01-001-01".into(),
            to_bin: "01B-01-001-01".into(),
            product_sku: "SKU-1".into(),
            product_name: "Widget".into(),
            weight_kg: 10.0,
            quantity: 1.0,
            started_at: Some(start),
            completed_at: Some(start + Duration::seconds(duration_s)),
            status: ActionStatus::Completed,
            duration_seconds: Some(duration_s as f64),
            failure_reason: None,
            wave_number: Some(1),
        }
    }

    #[test]
    fn wall_clock_spans_days_active_time_does_not() {
        // Day 1: 08:00-09:00 active. Day 2: 08:00-08:30 active.
        let records = vec![
            make_record("F-1", WorkerRole::Forklift, 10, 8, 3600),
            make_record("F-1", WorkerRole::Forklift, 11, 8, 1800),
        ];
        let timeline = FactTimeline::build(&records, 50);
        assert_eq!(timeline.days.len(), 2);
        // Wall clock: day1 08:00 → day2 08:30 = 24.5h
        assert!((timeline.wall_clock_seconds - 24.5 * 3600.0).abs() < 1e-6);
        // Active: 1h + 0.5h
        assert!((timeline.active_seconds - 5400.0).abs() < 1e-6);
    }

    #[test]
    fn buffer_trace_rises_with_forklifts_and_drains_with_pickers() {
        let records = vec![
            make_record("F-1", WorkerRole::Forklift, 10, 8, 600),
            make_record("F-1", WorkerRole::Forklift, 10, 9, 600),
            make_record("P-1", WorkerRole::Picker, 10, 10, 600),
        ];
        let timeline = FactTimeline::build(&records, 50);
        let levels: Vec<u32> = timeline
            .events
            .iter()
            .map(|e| e.buffer_level_at_start)
            .collect();
        assert_eq!(levels, vec![0, 1, 2]);
    }

    #[test]
    fn transitions_are_per_worker() {
        let records = vec![
            make_record("F-1", WorkerRole::Forklift, 10, 8, 600),
            make_record("P-1", WorkerRole::Picker, 10, 8, 600),
            make_record("F-1", WorkerRole::Forklift, 10, 9, 600),
        ];
        let timeline = FactTimeline::build(&records, 50);
        // F-1's second task starts 09:00, previous ended 08:10 → 3000s.
        let second_f1 = timeline
            .events
            .iter()
            .filter(|e| e.worker_id == "F-1")
            .nth(1)
            .expect("present");
        assert!((second_f1.transition_seconds - 3000.0).abs() < 1e-6);
    }
}
