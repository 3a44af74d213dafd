//! Backtest engine — replay a historical wave through the scheduler
//!
//! Given a wave number, the engine reconstructs the fact timeline from
//! the action log, re-plans the same work set under the engine's
//! constraints (buffer capacity as a hard limit, precedence, cross-day
//! pallet pooling), and produces a decision log, per-worker schedule
//! events for both timelines, and a comparison summary.

mod engine;
mod report;
mod timeline;

pub use engine::{BacktestEngine, BacktestError};
pub use report::{render, write_report, ReportError};
pub use timeline::FactTimeline;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::WorkerRole;

// ============================================================================
// Decision log
// ============================================================================

/// What the simulated scheduler decided at one step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    AssignRepl,
    AssignDist,
    SkipNoCapacity,
    SkipNoWorker,
    BufferWait,
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionType::AssignRepl => write!(f, "assign_repl"),
            DecisionType::AssignDist => write!(f, "assign_dist"),
            DecisionType::SkipNoCapacity => write!(f, "skip_no_capacity"),
            DecisionType::SkipNoWorker => write!(f, "skip_no_worker"),
            DecisionType::BufferWait => write!(f, "buffer_wait"),
        }
    }
}

/// The constraint that bound at a decision point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActiveConstraint {
    BufferFull,
    Precedence,
    WaveDeadline,
    NoWorker,
    None,
}

impl std::fmt::Display for ActiveConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveConstraint::BufferFull => write!(f, "buffer_full"),
            ActiveConstraint::Precedence => write!(f, "precedence"),
            ActiveConstraint::WaveDeadline => write!(f, "wave_deadline"),
            ActiveConstraint::NoWorker => write!(f, "no_worker"),
            ActiveConstraint::None => write!(f, "none"),
        }
    }
}

/// One row of the ordered decision log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub sequence: u64,
    /// Simulated calendar day
    pub day: NaiveDate,
    /// Simulated time of the decision
    pub time: DateTime<Utc>,
    pub decision: DecisionType,
    pub worker_id: Option<String>,
    pub task_priority: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub weight_kg: Option<f64>,
    pub buffer_before: u32,
    pub buffer_after: u32,
    pub constraint: ActiveConstraint,
    pub reason: String,
}

// ============================================================================
// Schedule events
// ============================================================================

/// Which timeline a schedule event belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Fact,
    Optimized,
}

/// One per-worker Gantt row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub timeline: TimelineKind,
    pub worker_id: String,
    pub worker_name: String,
    pub role: WorkerRole,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: f64,
    pub product_name: String,
    pub from_bin: String,
    pub to_bin: String,
    pub weight_kg: f64,
    /// Buffer occupancy when the event started
    pub buffer_level_at_start: u32,
    /// Gap to the worker's previous event (seconds)
    pub transition_seconds: f64,
}

// ============================================================================
// Breakdowns and summary
// ============================================================================

/// Per-day comparison row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayBreakdown {
    pub day: NaiveDate,
    pub workers: u32,
    pub fact_pallets: u32,
    pub optimized_pallets: u32,
    pub delta_pallets: i64,
    /// Buffer occupancy at optimized end of day
    pub buffer_level_end: u32,
    pub fact_active_seconds: f64,
    pub optimized_active_seconds: f64,
    pub improvement_percent: f64,
}

/// Per-worker comparison row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerBreakdown {
    pub worker_id: String,
    pub worker_name: String,
    pub role: WorkerRole,
    pub fact_tasks: u32,
    pub optimized_tasks: u32,
    pub fact_active_seconds: f64,
    pub optimized_active_seconds: f64,
}

/// Headline comparison numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub wave_number: i64,
    pub original_days: u32,
    pub optimized_days: u32,
    pub days_saved: i64,
    /// By day count when days were saved, else by active duration
    pub improvement_percent: f64,
    pub fact_wall_clock_seconds: f64,
    pub fact_active_seconds: f64,
    pub optimized_active_seconds: f64,
    pub total_tasks: u32,
    /// Count of estimates per predictor source tag
    pub duration_sources: BTreeMap<String, u64>,
}

/// Everything one backtest run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub wave_number: i64,
    pub summary: BacktestSummary,
    pub decisions: Vec<DecisionRecord>,
    pub fact_events: Vec<ScheduleEvent>,
    pub optimized_events: Vec<ScheduleEvent>,
    pub per_day: Vec<DayBreakdown>,
    pub per_worker: Vec<WorkerBreakdown>,
}
