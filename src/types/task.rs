//! Delivery tasks and task streams

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single delivery task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task still needs a forklift.
    pub fn is_open(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Assigned | TaskStatus::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "PENDING"),
            TaskStatus::Assigned => write!(f, "ASSIGNED"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
            TaskStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One buffer-replenishment task: move one pallet from storage to the buffer.
///
/// Forklift ↔ task is a weak back-reference pair: the task stores the
/// forklift id, the forklift stores the task id, neither owns the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub id: String,
    /// The pallet to be moved
    pub pallet_id: String,
    /// Total weight of the pallet (kg), cached for ordering decisions
    pub weight_kg: f64,
    /// Weight-derived priority, mirrors the pallet's product priority
    pub priority: u32,
    pub status: TaskStatus,
    /// Forklift currently bound to this task
    pub assigned_forklift: Option<String>,
    /// Stream this task belongs to (arena index, not an owning reference)
    pub stream_id: Option<String>,
    /// Position within the stream's weight-descending order
    pub sequence_in_stream: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl DeliveryTask {
    pub fn new(id: impl Into<String>, pallet_id: impl Into<String>, weight_kg: f64) -> Self {
        Self {
            id: id.into(),
            pallet_id: pallet_id.into(),
            weight_kg,
            priority: (weight_kg * 10.0).floor().max(0.0) as u32,
            status: TaskStatus::Pending,
            assigned_forklift: None,
            stream_id: None,
            sequence_in_stream: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            estimated_completion: None,
        }
    }

    /// Fixed creation timestamp, for deterministic replay construction.
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}

/// Status of a task stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum StreamStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamStatus::Pending => write!(f, "PENDING"),
            StreamStatus::InProgress => write!(f, "IN_PROGRESS"),
            StreamStatus::Completed => write!(f, "COMPLETED"),
            StreamStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A group of delivery tasks belonging to one order, executed as a
/// single sequential unit.
///
/// Streams have a strict total order by `sequence_number`. Tasks are
/// held as ids into the dispatcher's arena; the execution order within
/// the stream is descending total weight (heavy-on-bottom), enforced at
/// every enumeration rather than assumed from insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStream {
    pub id: String,
    pub name: String,
    pub sequence_number: u64,
    /// Task ids in insertion order; dispatch re-sorts by weight on every call
    pub task_ids: Vec<String>,
    pub status: StreamStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskStream {
    pub fn new(id: impl Into<String>, name: impl Into<String>, sequence_number: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sequence_number,
            task_ids: Vec::new(),
            status: StreamStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }
}
