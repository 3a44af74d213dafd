//! Historical action log rows and derived aggregate records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which worker pool performed an action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    Picker,
    Forklift,
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerRole::Picker => write!(f, "Picker"),
            WorkerRole::Forklift => write!(f, "Forklift"),
        }
    }
}

/// Terminal status of a recorded action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum ActionStatus {
    #[default]
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::Completed => write!(f, "COMPLETED"),
            ActionStatus::Failed => write!(f, "FAILED"),
            ActionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One row of the append-only action log: a single physical pick or
/// move, grouped with sibling lines by `basis_number`.
///
/// Rows are identified by a stable UUID; re-insertion of the same id is
/// idempotent and may only touch the mutable completion fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskActionRecord {
    pub id: Uuid,
    pub worker_id: String,
    pub worker_name: String,
    pub role: WorkerRole,
    /// WMS task template name (e.g. replenishment vs distribution)
    pub template: String,
    /// Groups the lines of one pick task
    pub basis_number: i64,
    /// Source bin code, `01<ZONE>-<AISLE>-<POSITION>-<SHELF>`
    pub from_bin: String,
    /// Destination bin code
    pub to_bin: String,
    pub product_sku: String,
    pub product_name: String,
    /// Line weight (kg); negative inputs are clamped to 0 at ingestion
    pub weight_kg: f64,
    pub quantity: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ActionStatus,
    /// Wall-clock seconds; `None` when the source timestamps are inconsistent
    pub duration_seconds: Option<f64>,
    pub failure_reason: Option<String>,
    /// Wave the action belonged to, when known
    pub wave_number: Option<i64>,
}

impl TaskActionRecord {
    /// Day bucket of the action (completion day, falling back to start day).
    pub fn day(&self) -> Option<chrono::NaiveDate> {
        self.completed_at
            .or(self.started_at)
            .map(|t| t.date_naive())
    }
}

// ============================================================================
// Derived aggregates
// ============================================================================

/// Per-worker performance aggregate over the action log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub worker_name: String,
    pub role: WorkerRole,
    pub task_count: u64,
    pub avg_duration_seconds: f64,
    pub median_duration_seconds: f64,
    pub std_dev_duration_seconds: f64,
    pub p90_duration_seconds: f64,
    pub tasks_per_hour: f64,
    pub first_activity: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Route statistics for one (from_zone → to_zone) pair of forklift
/// actions, IQR-normalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteStatistics {
    pub from_zone: String,
    pub to_zone: String,
    /// Trips surviving the IQR trim
    pub normalized_trips: u64,
    pub outliers_removed: u64,
    pub avg_duration_seconds: f64,
    pub median_duration_seconds: f64,
    pub std_dev_seconds: f64,
    /// IQR acceptance band applied: [Q1 − 1.5·IQR, Q3 + 1.5·IQR]
    pub lower_bound_seconds: f64,
    pub upper_bound_seconds: f64,
    /// Trimmed median, the duration the predictor serves
    pub predicted_duration_seconds: f64,
    /// In [0, 1], proportional to min(1, normalized_trips / K)
    pub confidence: f64,
}

/// Picker × product skill statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PickerProductStats {
    pub picker_id: String,
    pub product_sku: String,
    pub lines_per_minute: f64,
    pub units_per_minute: f64,
    pub kg_per_minute: f64,
    pub observations: u64,
    pub confidence: f64,
}

/// Median gap between a worker's successive same-day actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerTransitionStats {
    pub worker_id: String,
    pub role: WorkerRole,
    pub median_transition_seconds: f64,
    pub observations: u64,
}

/// Flat feature vector projected from one action row, consumed by the
/// external duration-prediction trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRow {
    pub worker_id: String,
    pub role: WorkerRole,
    pub from_zone: String,
    pub to_zone: String,
    pub product_sku: String,
    pub weight_kg: f64,
    pub quantity: f64,
    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub duration_seconds: f64,
}
