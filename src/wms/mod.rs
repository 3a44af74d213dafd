//! WMS adapter interface (consumed)
//!
//! The engine does not own the WMS wire schema; it consumes an adapter
//! exposing paged reads by monotonically increasing id, current-state
//! reads, and a small set of mutations. The HTTP implementation lives
//! in [`http`]; the cursor-driven ingestion loops in [`sync`].

pub mod http;
pub mod sync;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ActionStatus, TaskActionRecord, WorkerRole};

/// Adapter errors. Transient failures are retried once per cycle by
/// callers; everything else skips the cycle.
#[derive(Debug, thiserror::Error)]
pub enum WmsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Server(u16),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cancelled")]
    Cancelled,
}

impl WmsError {
    /// Whether a single in-cycle retry is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            WmsError::Http(e) => e.is_timeout() || e.is_connect(),
            WmsError::Server(code) => *code >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Task status wire enum (bit-exact):
/// 0=Pending, 1=Assigned, 2=InProgress, 3=Completed, 4=Failed, 5=Cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum WireTaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TryFrom<u8> for WireTaskStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(WireTaskStatus::Pending),
            1 => Ok(WireTaskStatus::Assigned),
            2 => Ok(WireTaskStatus::InProgress),
            3 => Ok(WireTaskStatus::Completed),
            4 => Ok(WireTaskStatus::Failed),
            5 => Ok(WireTaskStatus::Cancelled),
            other => Err(format!("unknown task status code {other}")),
        }
    }
}

impl From<WireTaskStatus> for u8 {
    fn from(status: WireTaskStatus) -> u8 {
        match status {
            WireTaskStatus::Pending => 0,
            WireTaskStatus::Assigned => 1,
            WireTaskStatus::InProgress => 2,
            WireTaskStatus::Completed => 3,
            WireTaskStatus::Failed => 4,
            WireTaskStatus::Cancelled => 5,
        }
    }
}

impl WireTaskStatus {
    /// Terminal statuses map into the action log.
    pub fn as_action_status(self) -> Option<ActionStatus> {
        match self {
            WireTaskStatus::Completed => Some(ActionStatus::Completed),
            WireTaskStatus::Failed => Some(ActionStatus::Failed),
            WireTaskStatus::Cancelled => Some(ActionStatus::Cancelled),
            _ => None,
        }
    }
}

/// One page of a monotonic read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Highest id in `items`; pass back as the next cursor
    pub last_id: i64,
    pub has_more: bool,
}

/// A raw executed-task row from the WMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmsTaskRow {
    pub id: i64,
    /// Stable row identity used as the action-log primary key
    pub uid: Uuid,
    pub worker_id: String,
    pub worker_name: String,
    /// "Picker" or "Forklift"
    pub role: String,
    pub template: String,
    pub basis_number: i64,
    pub from_bin: String,
    pub to_bin: String,
    pub product_sku: String,
    pub product_name: String,
    pub weight_kg: f64,
    pub quantity: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: WireTaskStatus,
    pub failure_reason: Option<String>,
    pub wave_number: Option<i64>,
}

impl WmsTaskRow {
    /// Convert into an action-log record. Duration derives from the
    /// timestamps; inconsistent timestamps yield `None`.
    pub fn into_record(self) -> Option<TaskActionRecord> {
        let role = match self.role.as_str() {
            "Picker" => WorkerRole::Picker,
            "Forklift" => WorkerRole::Forklift,
            _ => return None,
        };
        let status = self.status.as_action_status()?;
        let duration_seconds = match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) if end >= start => {
                Some((end - start).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        };
        Some(TaskActionRecord {
            id: self.uid,
            worker_id: self.worker_id,
            worker_name: self.worker_name,
            role,
            template: self.template,
            basis_number: self.basis_number,
            from_bin: self.from_bin,
            to_bin: self.to_bin,
            product_sku: self.product_sku,
            product_name: self.product_name,
            weight_kg: self.weight_kg,
            quantity: self.quantity,
            started_at: self.started_at,
            completed_at: self.completed_at,
            status,
            duration_seconds,
            failure_reason: self.failure_reason,
            wave_number: self.wave_number,
        })
    }
}

/// Reference rows for the paged dictionary reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmsWorker {
    pub id: i64,
    pub worker_id: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmsZone {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmsCell {
    pub id: i64,
    pub bin_code: String,
    pub zone_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmsProduct {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub weight_kg: f64,
}

/// Current picker state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmsPicker {
    pub picker_id: String,
    pub name: String,
    pub state: String,
    pub current_rate: f64,
    pub pallet_consumption_rate: f64,
}

/// Current forklift state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmsForklift {
    pub forklift_id: String,
    pub name: String,
    pub state: String,
    pub speed_m_per_s: f64,
    pub load_unload_s: f64,
    pub current_position_m: f64,
}

/// Current buffer observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmsBufferState {
    pub capacity: usize,
    pub pallets_count: usize,
    /// Pallets consumed per hour
    pub consumption_rate: f64,
    /// Pickers queued on the buffer
    pub queue_length: u32,
}

/// Task creation request. Priority is the wire scale 1..=3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub from_zone: String,
    pub from_slot: String,
    pub to_zone: String,
    pub to_slot: String,
    pub pallet_id: String,
    pub priority: u8,
}

// ============================================================================
// Adapter trait
// ============================================================================

/// The consumed WMS surface. Every call is a suspension point and
/// honors cancellation at the transport layer.
#[async_trait]
pub trait WmsAdapter: Send + Sync {
    // Paged reads by monotonically increasing id
    async fn tasks_after(&self, after_id: i64, limit: usize) -> Result<Page<WmsTaskRow>, WmsError>;
    async fn workers_after(&self, after_id: i64, limit: usize) -> Result<Page<WmsWorker>, WmsError>;
    async fn zones_after(&self, after_id: i64, limit: usize) -> Result<Page<WmsZone>, WmsError>;
    async fn cells_after(&self, after_id: i64, limit: usize) -> Result<Page<WmsCell>, WmsError>;
    async fn products_after(&self, after_id: i64, limit: usize)
        -> Result<Page<WmsProduct>, WmsError>;

    // Current reads
    async fn current_pickers(&self) -> Result<Vec<WmsPicker>, WmsError>;
    async fn current_forklifts(&self) -> Result<Vec<WmsForklift>, WmsError>;
    async fn buffer_state(&self) -> Result<WmsBufferState, WmsError>;

    // Mutations
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<String, WmsError>;
    async fn update_task_status(
        &self,
        task_id: &str,
        status: WireTaskStatus,
    ) -> Result<(), WmsError>;
    async fn confirm_pallet_delivered(&self, pallet_id: &str) -> Result<(), WmsError>;
    async fn confirm_pallet_consumed(&self, pallet_id: &str) -> Result<(), WmsError>;
    async fn update_forklift_status(&self, forklift_id: &str, state: &str) -> Result<(), WmsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_status_codes_are_bit_exact() {
        for (code, status) in [
            (0u8, WireTaskStatus::Pending),
            (1, WireTaskStatus::Assigned),
            (2, WireTaskStatus::InProgress),
            (3, WireTaskStatus::Completed),
            (4, WireTaskStatus::Failed),
            (5, WireTaskStatus::Cancelled),
        ] {
            assert_eq!(WireTaskStatus::try_from(code), Ok(status));
            assert_eq!(u8::from(status), code);
        }
        assert!(WireTaskStatus::try_from(6).is_err());
    }

    #[test]
    fn task_row_duration_derives_from_timestamps() {
        let start = Utc::now();
        let row = WmsTaskRow {
            id: 1,
            uid: Uuid::new_v4(),
            worker_id: "F-1".into(),
            worker_name: "Forklift 1".into(),
            role: "Forklift".into(),
            template: "replenishment".into(),
            basis_number: 5,
            from_bin: "01I-01-001-01".into(),
            to_bin: "01D-01-001-01".into(),
            product_sku: "SKU-1".into(),
            product_name: "Widget".into(),
            weight_kg: 9.0,
            quantity: 1.0,
            started_at: Some(start),
            completed_at: Some(start + chrono::Duration::seconds(75)),
            status: WireTaskStatus::Completed,
            failure_reason: None,
            wave_number: Some(2),
        };
        let record = row.into_record().expect("terminal row converts");
        assert_eq!(record.duration_seconds, Some(75.0));
        assert_eq!(record.status, ActionStatus::Completed);
    }

    #[test]
    fn open_rows_do_not_enter_the_log() {
        let row = WmsTaskRow {
            id: 1,
            uid: Uuid::new_v4(),
            worker_id: "F-1".into(),
            worker_name: "Forklift 1".into(),
            role: "Forklift".into(),
            template: "replenishment".into(),
            basis_number: 5,
            from_bin: "01I-01-001-01".into(),
            to_bin: "01D-01-001-01".into(),
            product_sku: "SKU-1".into(),
            product_name: "Widget".into(),
            weight_kg: 9.0,
            quantity: 1.0,
            started_at: None,
            completed_at: None,
            status: WireTaskStatus::InProgress,
            failure_reason: None,
            wave_number: None,
        };
        assert!(row.into_record().is_none());
    }
}
