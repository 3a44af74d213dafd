//! Control Service — the three-cadence closed loop
//!
//! - **Realtime** (default 200 ms): observe the buffer, step the
//!   hysteresis controller, evaluate rules, issue urgent delivery
//!   tasks (capped per cycle), dispatch idle forklifts.
//! - **Tactical** (default 2 s): snapshot pending tasks and available
//!   forklifts, run the assignment optimizer off the scheduler, and
//!   reconcile the plan with the dispatcher. Warm-starts from the
//!   previous solution.
//! - **Historical** (default 60 s): persist buffer snapshots and run
//!   storage housekeeping once a day.
//!
//! The loops share no mutable state beyond the observability facade
//! and the repository; any single-cycle failure is logged and skipped,
//! never propagated across loops.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WarehouseConfig;
use crate::controller::HysteresisController;
use crate::dispatch::Dispatcher;
use crate::historical::{extract_zone, HistoricalRepository};
use crate::optimizer::{
    AssignmentOptimizer, CandidateForklift, CandidateTask, OptimizationResult, WarmStart,
};
use crate::queueing;
use crate::rules::{ActionType, BufferFact, ForkliftFact, RuleEngine};
use crate::types::{BufferSnapshot, DeliveryTask, ForkliftState};
use crate::wms::sync::LiveState;
use crate::wms::{CreateTaskRequest, WmsAdapter};

use super::events::{DomainEvent, EventBus};
use super::facade::{ObservabilityFacade, OptimizationSummary};

/// Priority mapping from controller state to the wire scale 1..=3.
fn wire_priority(state: crate::controller::BufferState) -> u8 {
    match state {
        crate::controller::BufferState::Critical => 3,
        crate::controller::BufferState::Low => 2,
        _ => 1,
    }
}

/// The orchestrator over C1–C10.
pub struct ControlService {
    config: WarehouseConfig,
    adapter: Arc<dyn WmsAdapter>,
    repository: HistoricalRepository,
    dispatcher: Arc<Dispatcher>,
    controller: Mutex<HysteresisController>,
    warm: Mutex<Option<WarmStart>>,
    live: Arc<RwLock<LiveState>>,
    facade: Arc<ObservabilityFacade>,
    events: Arc<EventBus>,
    /// Pallets already requested through the urgent path this session
    requested_pallets: Mutex<HashSet<String>>,
    urgent_batch_seq: std::sync::atomic::AtomicU64,
    last_housekeeping: Mutex<Option<DateTime<Utc>>>,
}

impl ControlService {
    pub fn new(
        config: WarehouseConfig,
        adapter: Arc<dyn WmsAdapter>,
        repository: HistoricalRepository,
        dispatcher: Arc<Dispatcher>,
        live: Arc<RwLock<LiveState>>,
        facade: Arc<ObservabilityFacade>,
        events: Arc<EventBus>,
    ) -> Self {
        let controller = HysteresisController::new(&config.buffer);
        Self {
            config,
            adapter,
            repository,
            dispatcher,
            controller: Mutex::new(controller),
            warm: Mutex::new(None),
            live,
            facade,
            events,
            requested_pallets: Mutex::new(HashSet::new()),
            urgent_batch_seq: std::sync::atomic::AtomicU64::new(0),
            last_housekeeping: Mutex::new(None),
        }
    }

    pub fn facade(&self) -> Arc<ObservabilityFacade> {
        Arc::clone(&self.facade)
    }

    fn lock_controller(&self) -> std::sync::MutexGuard<'_, HysteresisController> {
        self.controller
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Realtime loop
    // ------------------------------------------------------------------

    pub async fn run_realtime(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
            self.config.timing.realtime_cycle_ms,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            cycle_ms = self.config.timing.realtime_cycle_ms,
            "realtime loop started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.realtime_cycle(Utc::now()).await;
                }
            }
        }
        info!("realtime loop stopped");
    }

    /// One realtime control cycle.
    pub async fn realtime_cycle(&self, now: DateTime<Utc>) {
        // Observe.
        let (level, capacity, consumption) = {
            let live = self.live.read().await;
            (live.buffer_level, live.buffer_capacity, live.consumption_rate)
        };

        // Step the controller.
        let (state, delivery_rate, deficit, urgent, change) = {
            let mut controller = self.lock_controller();
            let change = controller.update_observation(level, capacity, consumption);
            (
                controller.state(),
                controller.required_delivery_rate(consumption),
                controller.pallets_to_request(),
                controller.urgent_delivery_required(),
                change,
            )
        };
        if let Some(change) = change {
            info!(prev = %change.prev, new = %change.new, level, "buffer state changed");
            self.events.publish(&DomainEvent::BufferLevelChanged {
                level,
                prev: change.prev,
                state: change.new,
            });
        }

        // Evaluate rules against the fresh fact base.
        let (forklift_facts, active_pickers, active_forklifts, service_rate) = {
            let live = self.live.read().await;
            let facts = live
                .forklifts
                .iter()
                .map(|f| ForkliftFact {
                    id: f.id.clone(),
                    state: f.state,
                })
                .collect::<Vec<_>>();
            let rates: Vec<f64> = live
                .pickers
                .iter()
                .filter(|p| p.pallet_consumption_rate > 0.0)
                .map(|p| p.pallet_consumption_rate)
                .collect();
            let service_rate = if rates.is_empty() {
                0.0
            } else {
                rates.iter().sum::<f64>() / rates.len() as f64
            };
            (facts, live.active_pickers(), live.active_forklifts(), service_rate)
        };
        let dispatcher_stats = self.dispatcher.stats();
        let buffer_fact = BufferFact {
            fill_level: level,
            state,
            pending_tasks: dispatcher_stats.pending_tasks,
            idle_forklifts: forklift_facts
                .iter()
                .filter(|f| f.state == ForkliftState::Idle)
                .count(),
            consumption_rate: consumption,
        };
        let actions = RuleEngine::evaluate(&buffer_fact, &forklift_facts);

        // Act: urgent delivery requests, capped per cycle.
        if urgent && deficit > 0 {
            let cap = self.config.timing.max_task_creates_per_cycle;
            let requested = actions
                .iter()
                .find(|a| a.action == ActionType::UrgentDelivery)
                .and_then(|a| a.pallets)
                .unwrap_or(deficit);
            let count = (requested.max(deficit) as usize).min(cap);
            self.issue_delivery_tasks(count, wire_priority(state), now).await;
        }

        // Dispatch idle forklifts into the current stream.
        {
            let mut live = self.live.write().await;
            let LiveState { forklifts, storage, .. } = &mut *live;
            let (assignments, completed) = self.dispatcher.dispatch(forklifts, storage, now);
            drop(live);
            for assignment in &assignments {
                self.events.publish(&DomainEvent::ForkliftStateChanged {
                    forklift_id: assignment.forklift_id.clone(),
                    state: ForkliftState::MovingToPallet,
                });
                let adapter = Arc::clone(&self.adapter);
                let forklift_id = assignment.forklift_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = adapter
                        .update_forklift_status(&forklift_id, "MovingToPallet")
                        .await
                    {
                        warn!(error = %e, forklift = %forklift_id, "status push failed");
                    }
                });
            }
            for event in completed {
                self.events.publish(&DomainEvent::TaskStreamCompleted {
                    stream_id: event.stream_id,
                    sequence_number: event.sequence_number,
                });
            }
        }

        // Publish observability. The M/M/c server count falls back to
        // the configured crew size until pickers report in.
        let servers = if active_pickers > 0 {
            active_pickers
        } else {
            self.config.workers.pickers_count
        };
        let queue = queueing::assess(consumption, service_rate, servers, &self.config.queueing);
        self.facade.record_realtime(
            level,
            state,
            consumption,
            delivery_rate,
            deficit,
            active_pickers,
            active_forklifts,
            queue,
            now,
        );
        self.facade.record_dispatcher(self.dispatcher.stats());
    }

    /// Issue up to `count` delivery tasks against the nearest unrequested
    /// storage pallets, mirroring each as an internal dispatcher task.
    async fn issue_delivery_tasks(&self, count: usize, priority: u8, now: DateTime<Utc>) {
        let candidates: Vec<(String, f64, Option<String>, f64)> = {
            let live = self.live.read().await;
            let requested = self
                .requested_pallets
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut pallets: Vec<_> = live
                .storage
                .iter()
                .filter(|p| !requested.contains(&p.id))
                .collect();
            pallets.sort_by(|a, b| {
                a.storage_distance_m
                    .partial_cmp(&b.storage_distance_m)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            pallets
                .into_iter()
                .take(count)
                .map(|p| {
                    (
                        p.id.clone(),
                        p.total_weight(),
                        p.bin_code.clone(),
                        p.storage_distance_m,
                    )
                })
                .collect()
        };
        if candidates.is_empty() {
            debug!("urgent delivery requested but storage has no free pallets");
            return;
        }

        let buffer_bin = self.config.wms.buffer_bin.clone();
        let mut batch: Vec<DeliveryTask> = Vec::new();
        for (pallet_id, weight, bin_code, _distance) in candidates {
            let from_slot = bin_code.unwrap_or_else(|| "01S-00-000-00".to_string());
            let request = CreateTaskRequest {
                from_zone: extract_zone(&from_slot),
                from_slot: from_slot.clone(),
                to_zone: extract_zone(&buffer_bin),
                to_slot: buffer_bin.clone(),
                pallet_id: pallet_id.clone(),
                priority,
            };
            match self.adapter.create_task(&request).await {
                Ok(task_id) => {
                    let mut task =
                        DeliveryTask::new(&task_id, &pallet_id, weight).with_created_at(now);
                    // Urgent tasks carry the boosted priority into the optimizer.
                    if priority == 3 {
                        task.priority = task.priority.max(100);
                    }
                    batch.push(task);
                    self.requested_pallets
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .insert(pallet_id);
                }
                Err(e) => {
                    warn!(error = %e, pallet = %pallet_id, "create task failed, rest of cycle skipped");
                    break;
                }
            }
        }
        if batch.is_empty() {
            return;
        }

        // One stream per batch: the whole urgent set stays concurrently
        // dispatchable (a singleton stream per task would serialize it
        // through the single-flight executor).
        let created = batch.len() as u64;
        let seq = self
            .urgent_batch_seq
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let stream = crate::types::TaskStream::new(
            format!("urgent-{seq}"),
            format!("urgent batch {seq}"),
            u64::MAX,
        );
        self.dispatcher.enqueue_stream(stream, batch);

        self.events.publish(&DomainEvent::PalletRequested {
            count: created as u32,
            priority: u32::from(priority),
        });
        self.facade.record_tasks_created(created);
        info!(created, priority, "urgent delivery tasks issued");
    }

    /// Record a pallet delivery confirmed by the WMS: completes the
    /// internal task and frees the pallet id for future requests.
    pub async fn confirm_delivery(&self, task_id: &str, pallet_id: &str, now: DateTime<Utc>) {
        let mut live = self.live.write().await;
        if let Some(slot) = live
            .forklifts
            .iter()
            .position(|f| f.current_task_id.as_deref() == Some(task_id))
        {
            let completed = {
                let forklift = &mut live.forklifts[slot];
                self.dispatcher.complete_task(task_id, forklift, now)
            };
            if let Some(event) = completed {
                self.events.publish(&DomainEvent::TaskStreamCompleted {
                    stream_id: event.stream_id,
                    sequence_number: event.sequence_number,
                });
            }
        }
        drop(live);
        self.requested_pallets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(pallet_id);
        self.events.publish(&DomainEvent::PalletDelivered {
            pallet_id: pallet_id.to_string(),
        });
    }

    // ------------------------------------------------------------------
    // Tactical loop
    // ------------------------------------------------------------------

    pub async fn run_tactical(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
            self.config.timing.tactical_cycle_ms,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            cycle_ms = self.config.timing.tactical_cycle_ms,
            "tactical loop started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tactical_cycle().await;
                }
            }
        }
        info!("tactical loop stopped");
    }

    /// One tactical cycle: optimize the pending set, reconcile.
    pub async fn tactical_cycle(&self) {
        let pending = self.dispatcher.pending_tasks();
        if pending.is_empty() {
            return;
        }

        let (tasks, forklifts) = {
            let live = self.live.read().await;
            let tasks: Vec<CandidateTask> = pending
                .iter()
                .map(|task| CandidateTask {
                    id: task.id.clone(),
                    pallet_distance_m: live
                        .storage
                        .get(&task.pallet_id)
                        .map(|p| p.storage_distance_m)
                        .unwrap_or(0.0),
                    weight_kg: task.weight_kg,
                    stream_seq: task
                        .stream_id
                        .as_deref()
                        .and_then(|id| self.dispatcher.stream_sequence(id)),
                    critical: task.priority >= 100,
                    deadline_offset_s: None,
                })
                .collect();
            let forklifts: Vec<CandidateForklift> = live
                .forklifts
                .iter()
                .filter(|f| f.state != ForkliftState::Offline)
                .map(|f| CandidateForklift {
                    id: f.id.clone(),
                    speed_m_per_s: f.speed_m_per_s,
                    load_unload_s: f.load_unload_s,
                    current_position_m: f.current_position_m,
                })
                .collect();
            (tasks, forklifts)
        };

        // The solver enforces its own wall-clock budget; running it on
        // the blocking pool keeps this loop responsive to cancellation.
        let optimizer_config = self.config.optimization.clone();
        let warm = self
            .warm
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        let result: OptimizationResult = match tokio::task::spawn_blocking(move || {
            let optimizer = AssignmentOptimizer::new(optimizer_config);
            optimizer.solve(&tasks, &forklifts, warm.as_ref())
        })
        .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "solver task failed, cycle skipped");
                return;
            }
        };

        debug!(
            status = %result.status,
            assignments = result.assignments.len(),
            objective = result.objective_seconds,
            "tactical solve complete"
        );

        match result.status {
            crate::optimizer::SolveStatus::Infeasible => {
                // Leave the dispatcher in its last consistent state;
                // rule-driven dispatch keeps the floor moving.
                warn!(
                    unassigned = result.unassigned_task_ids.len(),
                    "optimization infeasible, falling back to rule-driven dispatch"
                );
            }
            _ => {
                self.dispatcher.reconcile_hints(result.assignment_hints());
                if self.config.optimization.warm_start_enabled {
                    *self
                        .warm
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner) =
                        Some(WarmStart::from_result(&result));
                }
            }
        }

        self.facade.record_tactical(OptimizationSummary {
            status: result.status,
            assignments: result.assignments.len(),
            objective_seconds: result.objective_seconds,
            workload_variance: result.workload_variance,
            solver_time_ms: result.solver_time_ms,
        });
    }

    // ------------------------------------------------------------------
    // Historical loop
    // ------------------------------------------------------------------

    pub async fn run_historical(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
            self.config.timing.historical_cycle_ms,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            cycle_ms = self.config.timing.historical_cycle_ms,
            "historical loop started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.historical_cycle(Utc::now()).await;
                }
            }
        }
        info!("historical loop stopped");
    }

    /// One historical cycle: snapshot persistence + daily housekeeping.
    pub async fn historical_cycle(&self, now: DateTime<Utc>) {
        let snapshot = {
            let live = self.live.read().await;
            let controller = self.lock_controller();
            let stats = self.dispatcher.stats();
            BufferSnapshot {
                time: now,
                buffer_level: live.buffer_level,
                buffer_state: controller.state().to_string(),
                pallets_count: live.buffer_pallets as u32,
                active_forklifts: live.active_forklifts() as u32,
                active_pickers: live.active_pickers() as u32,
                consumption_rate: live.consumption_rate,
                delivery_rate: controller.required_delivery_rate(live.consumption_rate),
                queue_length: live.queue_length,
                pending_tasks: stats.pending_tasks as u32,
            }
        };
        if let Err(e) = self.repository.buffer_snapshot(&snapshot) {
            warn!(error = %e, "snapshot persist failed, cycle skipped");
        }
        self.facade.record_historical_cycle();

        // Housekeeping at most once a day.
        let due = {
            let last = self
                .last_housekeeping
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            last.map(|t| now - t > ChronoDuration::hours(24)).unwrap_or(true)
        };
        if due {
            let repository = self.repository.clone();
            let historical = self.config.historical.clone();
            let result =
                tokio::task::spawn_blocking(move || repository.run_housekeeping(&historical, now))
                    .await;
            match result {
                Ok(Ok(())) => {
                    *self
                        .last_housekeeping
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(now);
                }
                Ok(Err(e)) => warn!(error = %e, "housekeeping failed, will retry next day-cycle"),
                Err(e) => warn!(error = %e, "housekeeping task panicked"),
            }
        }
    }
}
