//! The replay simulator
//!
//! Re-plans a historical wave's work set under the engine's
//! constraints: the buffer as a hard capacity limit, heavy-on-bottom
//! precedence within each basis group, and a cross-day pallet pool:
//! work observed on a later day may be pulled earlier when capacity and
//! precedence permit. Task costs come from the predictor in replay
//! mode (actual durations where the log has them, cascade otherwise).
//!
//! Determinism: the simulated clock is anchored to the fact timeline,
//! every ordering is total, and nothing reads the wall clock. Two runs
//! against the same frozen log produce identical artifacts.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregation::AggregateCache;
use crate::historical::{HistoricalRepository, StoreError};
use crate::predictor::{DurationPredictor, ProspectiveTask};
use crate::types::{TaskActionRecord, WorkerRole};

use super::timeline::FactTimeline;
use super::{
    ActiveConstraint, BacktestResult, BacktestSummary, DayBreakdown, DecisionRecord, DecisionType,
    ScheduleEvent, TimelineKind, WorkerBreakdown,
};

/// Fallback working-day length when the fact timeline is degenerate.
const DEFAULT_DAY_SECONDS: f64 = 8.0 * 3600.0;

/// Backtest errors.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("no historical rows for wave {0}")]
    NoData(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The backtest engine over a frozen repository.
pub struct BacktestEngine {
    repository: HistoricalRepository,
    buffer_capacity: u32,
}

struct SimWorker {
    id: String,
    name: String,
    role: WorkerRole,
    clock: DateTime<Utc>,
    done_for_day: bool,
    /// Median inter-task gap from the transition table
    transition_seconds: f64,
}

struct SimTask {
    record: TaskActionRecord,
    assigned: bool,
}

impl BacktestEngine {
    pub fn new(repository: HistoricalRepository, buffer_capacity: u32) -> Self {
        Self {
            repository,
            buffer_capacity,
        }
    }

    /// Run a backtest for the given wave and persist the artifacts
    /// atomically (replacing any prior run). Returns the result with
    /// its run id.
    pub fn run(&self, wave_number: i64) -> Result<(Uuid, BacktestResult), BacktestError> {
        let records = self.repository.actions_for_wave(wave_number)?;
        if records.is_empty() {
            return Err(BacktestError::NoData(wave_number));
        }
        info!(wave = wave_number, rows = records.len(), "backtest started");

        let fact = FactTimeline::build(&records, self.buffer_capacity);
        let cache = self.load_cache(&records)?;
        let predictor = DurationPredictor::new(Arc::new(cache))
            .with_actuals(
                records
                    .iter()
                    .filter_map(|r| r.duration_seconds.map(|d| (r.id, d)))
                    .collect(),
            )
            .with_wave_mean(fact.mean_task_duration().unwrap_or(0.0));

        let result = self.simulate(wave_number, &records, &fact, &predictor);
        let run_id = self.repository.save_backtest(wave_number, &result)?;
        info!(
            wave = wave_number,
            original_days = result.summary.original_days,
            optimized_days = result.summary.optimized_days,
            improvement = result.summary.improvement_percent,
            "backtest complete"
        );
        Ok((run_id, result))
    }

    /// Aggregate cache frozen from the repository's persisted tables.
    fn load_cache(&self, records: &[TaskActionRecord]) -> Result<AggregateCache, StoreError> {
        let durations: Vec<f64> = records
            .iter()
            .filter_map(|r| r.duration_seconds)
            .filter(|d| *d > 0.0)
            .collect();
        let global_mean = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };
        Ok(AggregateCache {
            workers: self.repository.load_workers()?,
            routes: self
                .repository
                .load_routes()?
                .into_iter()
                .map(|r| ((r.from_zone.clone(), r.to_zone.clone()), r))
                .collect(),
            picker_product: self
                .repository
                .load_picker_product()?
                .into_iter()
                .map(|s| ((s.picker_id.clone(), s.product_sku.clone()), s))
                .collect(),
            transitions: self.repository.load_transitions()?,
            demand: HashMap::new(),
            global_mean_duration_seconds: global_mean,
            refreshed_at: None,
        })
    }

    // ------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------

    fn simulate(
        &self,
        wave_number: i64,
        records: &[TaskActionRecord],
        fact: &FactTimeline,
        predictor: &DurationPredictor,
    ) -> BacktestResult {
        // Working-day window anchored to the fact timeline.
        let anchor = fact
            .events
            .first()
            .map(|e| e.start)
            .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC);
        let longest_fact_day = fact
            .per_day_active_seconds
            .values()
            .fold(0.0f64, |a, b| a.max(*b));
        let day_seconds = if longest_fact_day > 0.0 {
            longest_fact_day
        } else {
            DEFAULT_DAY_SECONDS
        };

        // The same crew the facts used, deterministic order.
        let mut workers = self.build_workers(records);
        let has_forklifts = workers.iter().any(|w| w.role == WorkerRole::Forklift);
        let has_pickers = workers.iter().any(|w| w.role == WorkerRole::Picker);

        // The cross-day pallet pool: every task of the wave, precedence
        // order (basis groups, heavy first inside each).
        let mut repl = Self::build_pool(records, WorkerRole::Forklift);
        let mut dist = Self::build_pool(records, WorkerRole::Picker);

        // Pre-stocked buffer: picks the log shows with no matching
        // delivery must have come from stock on hand.
        let surplus = (dist.len() as u32).saturating_sub(repl.len() as u32);
        let mut buffer_level = surplus.min(self.buffer_capacity);

        let mut decisions: Vec<DecisionRecord> = Vec::new();
        let mut events: Vec<ScheduleEvent> = Vec::new();
        let mut sequence = 0u64;
        let mut source_counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut per_day: Vec<DayBreakdown> = Vec::new();
        let mut day_index = 0u32;

        while repl.iter().any(|t| !t.assigned) || dist.iter().any(|t| !t.assigned) {
            let day_start = anchor + Duration::days(i64::from(day_index));
            let day_end = day_start + Duration::milliseconds((day_seconds * 1000.0) as i64);
            let day = day_start.date_naive();
            for worker in &mut workers {
                worker.clock = day_start;
                worker.done_for_day = false;
            }
            let mut day_repl = 0u32;
            let mut day_dist = 0u32;
            let mut day_first_start: Option<DateTime<Utc>> = None;
            let mut day_last_end: Option<DateTime<Utc>> = None;

            // Missing role: the whole pool for it stalls.
            if !has_forklifts && repl.iter().any(|t| !t.assigned) {
                sequence += 1;
                decisions.push(Self::skip_decision(
                    sequence, day, day_start, DecisionType::SkipNoWorker,
                    ActiveConstraint::NoWorker, buffer_level,
                    "no forklifts in the replayed crew",
                ));
                repl.iter_mut().for_each(|t| t.assigned = true);
            }
            if !has_pickers && dist.iter().any(|t| !t.assigned) {
                sequence += 1;
                decisions.push(Self::skip_decision(
                    sequence, day, day_start, DecisionType::SkipNoWorker,
                    ActiveConstraint::NoWorker, buffer_level,
                    "no pickers in the replayed crew",
                ));
                dist.iter_mut().for_each(|t| t.assigned = true);
            }

            loop {
                // Earliest-available worker still inside the day.
                let Some(worker_idx) = workers
                    .iter()
                    .enumerate()
                    .filter(|(_, w)| !w.done_for_day && w.clock < day_end)
                    .min_by_key(|(i, w)| (w.clock, *i))
                    .map(|(i, _)| i)
                else {
                    break;
                };

                let role = workers[worker_idx].role;
                let pool = match role {
                    WorkerRole::Forklift => &mut repl,
                    WorkerRole::Picker => &mut dist,
                };
                let Some(task_idx) = pool.iter().position(|t| !t.assigned) else {
                    workers[worker_idx].done_for_day = true;
                    continue;
                };

                // Buffer constraints.
                let blocked = match role {
                    WorkerRole::Forklift => buffer_level >= self.buffer_capacity,
                    WorkerRole::Picker => buffer_level == 0,
                };
                if blocked {
                    let (decision, constraint, reason) = match role {
                        WorkerRole::Forklift => (
                            DecisionType::SkipNoCapacity,
                            ActiveConstraint::BufferFull,
                            "buffer full, delivery deferred",
                        ),
                        WorkerRole::Picker => (
                            DecisionType::BufferWait,
                            ActiveConstraint::Precedence,
                            "buffer empty, pick waits on replenishment",
                        ),
                    };
                    sequence += 1;
                    decisions.push(Self::skip_decision(
                        sequence, day, workers[worker_idx].clock, decision, constraint,
                        buffer_level, reason,
                    ));
                    // Wait for the other role's next completion, or retire.
                    let own_clock = workers[worker_idx].clock;
                    let unblock = workers
                        .iter()
                        .filter(|w| w.role != role && !w.done_for_day && w.clock > own_clock)
                        .map(|w| w.clock)
                        .min();
                    match unblock {
                        Some(t) if t < day_end => workers[worker_idx].clock = t,
                        // No relief today.
                        _ => workers[worker_idx].done_for_day = true,
                    }
                    continue;
                }

                // Cost the task through the replay predictor.
                let record = pool[task_idx].record.clone();
                let prediction = predictor.predict(&ProspectiveTask {
                    action_id: Some(record.id),
                    worker_id: Some(workers[worker_idx].id.clone()),
                    role,
                    from_slot: record.from_bin.clone(),
                    to_slot: record.to_bin.clone(),
                    product_sku: record.product_sku.clone(),
                    weight_kg: record.weight_kg,
                    quantity: record.quantity,
                    time: workers[worker_idx].clock,
                });
                let transition = if workers[worker_idx].clock > day_start {
                    workers[worker_idx].transition_seconds
                } else {
                    0.0
                };
                let start = workers[worker_idx].clock
                    + Duration::milliseconds((transition * 1000.0) as i64);
                let end = start + Duration::milliseconds((prediction.seconds * 1000.0) as i64);
                if end > day_end {
                    workers[worker_idx].done_for_day = true;
                    continue;
                }

                // Commit.
                pool[task_idx].assigned = true;
                let before = buffer_level;
                let (decision, reason) = match role {
                    WorkerRole::Forklift => {
                        buffer_level = (buffer_level + 1).min(self.buffer_capacity);
                        day_repl += 1;
                        (DecisionType::AssignRepl, "replenishment seated on earliest free forklift")
                    }
                    WorkerRole::Picker => {
                        buffer_level = buffer_level.saturating_sub(1);
                        day_dist += 1;
                        (DecisionType::AssignDist, "distribution seated on earliest free picker")
                    }
                };
                *source_counts.entry(prediction.source.to_string()).or_insert(0) += 1;
                sequence += 1;
                decisions.push(DecisionRecord {
                    sequence,
                    day,
                    time: start,
                    decision,
                    worker_id: Some(workers[worker_idx].id.clone()),
                    task_priority: Some((record.weight_kg * 10.0).max(0.0) as u32),
                    duration_seconds: Some(prediction.seconds),
                    weight_kg: Some(record.weight_kg),
                    buffer_before: before,
                    buffer_after: buffer_level,
                    constraint: ActiveConstraint::None,
                    reason: reason.to_string(),
                });
                events.push(ScheduleEvent {
                    timeline: TimelineKind::Optimized,
                    worker_id: workers[worker_idx].id.clone(),
                    worker_name: workers[worker_idx].name.clone(),
                    role,
                    start,
                    end,
                    duration_seconds: prediction.seconds,
                    product_name: record.product_name.clone(),
                    from_bin: record.from_bin.clone(),
                    to_bin: record.to_bin.clone(),
                    weight_kg: record.weight_kg,
                    buffer_level_at_start: before,
                    transition_seconds: transition,
                });
                day_first_start = Some(day_first_start.map_or(start, |t| t.min(start)));
                day_last_end = Some(day_last_end.map_or(end, |t| t.max(end)));
                workers[worker_idx].clock = end;
            }

            let optimized_active = match (day_first_start, day_last_end) {
                (Some(first), Some(last)) => (last - first).num_milliseconds() as f64 / 1000.0,
                _ => 0.0,
            };
            if day_repl + day_dist > 0 {
                let fact_day = fact.days.get(day_index as usize).copied();
                let fact_active = fact_day
                    .and_then(|d| fact.per_day_active_seconds.get(&d))
                    .copied()
                    .unwrap_or(0.0);
                let fact_pallets = fact_day
                    .and_then(|d| fact.per_day_pallets.get(&d))
                    .copied()
                    .unwrap_or(0);
                per_day.push(DayBreakdown {
                    day,
                    workers: workers.len() as u32,
                    fact_pallets,
                    optimized_pallets: day_repl,
                    delta_pallets: i64::from(day_repl) - i64::from(fact_pallets),
                    buffer_level_end: buffer_level,
                    fact_active_seconds: fact_active,
                    optimized_active_seconds: optimized_active,
                    improvement_percent: if fact_active > 0.0 {
                        100.0 * (fact_active - optimized_active) / fact_active
                    } else {
                        0.0
                    },
                });
                day_index += 1;
            } else if repl.iter().any(|t| !t.assigned) || dist.iter().any(|t| !t.assigned) {
                // A full day with zero progress means the reconstruction
                // cannot seat the rest (e.g. picks with no deliveries and
                // an empty buffer). Seat them virtually to terminate.
                debug!(wave = wave_number, "zero-progress day, force-draining remainder");
                for task in repl.iter_mut().chain(dist.iter_mut()).filter(|t| !t.assigned) {
                    task.assigned = true;
                    sequence += 1;
                    decisions.push(Self::skip_decision(
                        sequence, day, day_start, DecisionType::BufferWait,
                        ActiveConstraint::Precedence, buffer_level,
                        "unschedulable under reconstruction, dropped from plan",
                    ));
                }
                break;
            }
        }

        // Summary.
        let optimized_days = per_day.len() as u32;
        let original_days = fact.days.len() as u32;
        let days_saved = i64::from(original_days) - i64::from(optimized_days);
        let optimized_active: f64 = per_day.iter().map(|d| d.optimized_active_seconds).sum();
        let improvement_percent = if days_saved > 0 && original_days > 0 {
            100.0 * days_saved as f64 / f64::from(original_days)
        } else if fact.active_seconds > 0.0 {
            100.0 * (fact.active_seconds - optimized_active) / fact.active_seconds
        } else {
            0.0
        };

        let per_worker = Self::worker_breakdowns(fact, &events);

        BacktestResult {
            wave_number,
            summary: BacktestSummary {
                wave_number,
                original_days,
                optimized_days,
                days_saved,
                improvement_percent,
                fact_wall_clock_seconds: fact.wall_clock_seconds,
                fact_active_seconds: fact.active_seconds,
                optimized_active_seconds: optimized_active,
                total_tasks: records.len() as u32,
                duration_sources: source_counts,
            },
            decisions,
            fact_events: fact.events.clone(),
            optimized_events: events,
            per_day,
            per_worker,
        }
    }

    fn build_workers(&self, records: &[TaskActionRecord]) -> Vec<SimWorker> {
        let mut seen: BTreeMap<String, (String, WorkerRole)> = BTreeMap::new();
        for record in records {
            seen.entry(record.worker_id.clone())
                .or_insert((record.worker_name.clone(), record.role));
        }
        let transitions: HashMap<String, f64> = self
            .repository
            .load_transitions()
            .unwrap_or_default()
            .into_iter()
            .map(|t| (t.worker_id, t.median_transition_seconds))
            .collect();
        seen.into_iter()
            .map(|(id, (name, role))| SimWorker {
                transition_seconds: transitions.get(&id).copied().unwrap_or(0.0),
                id,
                name,
                role,
                clock: DateTime::<Utc>::MIN_UTC,
                done_for_day: false,
            })
            .collect()
    }

    /// Precedence-ordered task pool for one role: basis groups in
    /// first-seen order, heavy-on-bottom inside each group.
    fn build_pool(records: &[TaskActionRecord], role: WorkerRole) -> Vec<SimTask> {
        let mut rows: Vec<&TaskActionRecord> =
            records.iter().filter(|r| r.role == role).collect();
        rows.sort_by(|a, b| {
            a.basis_number
                .cmp(&b.basis_number)
                .then_with(|| {
                    b.weight_kg
                        .partial_cmp(&a.weight_kg)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        rows.into_iter()
            .map(|r| SimTask {
                record: r.clone(),
                assigned: false,
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn skip_decision(
        sequence: u64,
        day: NaiveDate,
        time: DateTime<Utc>,
        decision: DecisionType,
        constraint: ActiveConstraint,
        buffer_level: u32,
        reason: &str,
    ) -> DecisionRecord {
        DecisionRecord {
            sequence,
            day,
            time,
            decision,
            worker_id: None,
            task_priority: None,
            duration_seconds: None,
            weight_kg: None,
            buffer_before: buffer_level,
            buffer_after: buffer_level,
            constraint,
            reason: reason.to_string(),
        }
    }

    fn worker_breakdowns(fact: &FactTimeline, optimized: &[ScheduleEvent]) -> Vec<WorkerBreakdown> {
        let mut by_worker: BTreeMap<String, WorkerBreakdown> = BTreeMap::new();
        for event in &fact.events {
            let entry = by_worker
                .entry(event.worker_id.clone())
                .or_insert(WorkerBreakdown {
                    worker_id: event.worker_id.clone(),
                    worker_name: event.worker_name.clone(),
                    role: event.role,
                    fact_tasks: 0,
                    optimized_tasks: 0,
                    fact_active_seconds: 0.0,
                    optimized_active_seconds: 0.0,
                });
            entry.fact_tasks += 1;
            entry.fact_active_seconds += event.duration_seconds;
        }
        for event in optimized {
            let entry = by_worker
                .entry(event.worker_id.clone())
                .or_insert(WorkerBreakdown {
                    worker_id: event.worker_id.clone(),
                    worker_name: event.worker_name.clone(),
                    role: event.role,
                    fact_tasks: 0,
                    optimized_tasks: 0,
                    fact_active_seconds: 0.0,
                    optimized_active_seconds: 0.0,
                });
            entry.optimized_tasks += 1;
            entry.optimized_active_seconds += event.duration_seconds;
        }
        by_worker.into_values().collect()
    }
}
