//! Observability facade
//!
//! The only mutable state the three control loops share directly: a
//! small, lock-protected stats block snapshotted for the status API
//! and telemetry. Everything else flows through the repository.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;

use crate::controller::BufferState;
use crate::dispatch::DispatcherStats;
use crate::optimizer::SolveStatus;
use crate::queueing::QueueAssessment;

/// Last-solve summary kept for telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationSummary {
    pub status: SolveStatus,
    pub assignments: usize,
    pub objective_seconds: f64,
    pub workload_variance: f64,
    pub solver_time_ms: u64,
}

/// Point-in-time view served by the status API.
#[derive(Debug, Clone, Serialize, Default)]
pub struct FacadeSnapshot {
    pub buffer_level: f64,
    pub buffer_state: Option<BufferState>,
    pub consumption_rate: f64,
    pub required_delivery_rate: f64,
    pub pallets_to_request: u32,
    pub active_pickers: usize,
    pub active_forklifts: usize,
    pub realtime_cycles: u64,
    pub tactical_cycles: u64,
    pub historical_cycles: u64,
    pub tasks_created: u64,
    pub dispatcher: DispatcherStats,
    pub last_optimization: Option<OptimizationSummary>,
    pub queue: Option<QueueAssessment>,
    pub last_realtime_tick: Option<DateTime<Utc>>,
}

/// Lock-protected facade. Writers hold the lock only to copy fields in.
#[derive(Default)]
pub struct ObservabilityFacade {
    inner: Mutex<FacadeSnapshot>,
}

impl ObservabilityFacade {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FacadeSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> FacadeSnapshot {
        self.lock().clone()
    }

    pub fn record_realtime(
        &self,
        level: f64,
        state: BufferState,
        consumption: f64,
        delivery_rate: f64,
        deficit: u32,
        active_pickers: usize,
        active_forklifts: usize,
        queue: QueueAssessment,
        now: DateTime<Utc>,
    ) {
        let mut snapshot = self.lock();
        snapshot.buffer_level = level;
        snapshot.buffer_state = Some(state);
        snapshot.consumption_rate = consumption;
        snapshot.required_delivery_rate = delivery_rate;
        snapshot.pallets_to_request = deficit;
        snapshot.active_pickers = active_pickers;
        snapshot.active_forklifts = active_forklifts;
        snapshot.queue = Some(queue);
        snapshot.realtime_cycles += 1;
        snapshot.last_realtime_tick = Some(now);
    }

    pub fn record_tasks_created(&self, count: u64) {
        self.lock().tasks_created += count;
    }

    pub fn record_dispatcher(&self, stats: DispatcherStats) {
        self.lock().dispatcher = stats;
    }

    pub fn record_tactical(&self, summary: OptimizationSummary) {
        let mut snapshot = self.lock();
        snapshot.tactical_cycles += 1;
        snapshot.last_optimization = Some(summary);
    }

    pub fn record_historical_cycle(&self) {
        self.lock().historical_cycles += 1;
    }
}
