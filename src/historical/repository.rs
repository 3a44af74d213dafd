//! Historical Repository — sled-backed append-only store
//!
//! Trees:
//! - `actions`      — TaskActionRecord by UUID (idempotent upsert)
//! - `snapshots`    — BufferSnapshot by big-endian unix-seconds key
//! - `snapshots_cold` — zstd-compressed day chunks of old snapshots
//! - `workers`, `routes`, `picker_product`, `transitions` — aggregates
//! - `backtests`    — backtest artifacts by wave number
//!
//! Keys sort chronologically (big-endian timestamps) so range scans
//! are cheap. Values are JSON. Writes are batched; durability rides on
//! sled's background flushing.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HistoricalConfig;
use crate::types::{
    BufferSnapshot, PickerProductStats, RouteStatistics, TaskActionRecord, WorkerRecord,
    WorkerTransitionStats,
};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("compression error: {0}")]
    Compression(String),
}

/// Outcome of one idempotent batch save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    /// Existing rows whose mutable fields were refreshed
    pub updated: usize,
}

/// The historical repository. Cheap to clone; all clones share one db.
#[derive(Clone)]
pub struct HistoricalRepository {
    db: Arc<sled::Db>,
    actions: sled::Tree,
    snapshots: sled::Tree,
    snapshots_cold: sled::Tree,
    workers: sled::Tree,
    routes: sled::Tree,
    picker_product: sled::Tree,
    transitions: sled::Tree,
    backtests: sled::Tree,
}

impl HistoricalRepository {
    /// Open or create the repository at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            actions: db.open_tree("actions")?,
            snapshots: db.open_tree("snapshots")?,
            snapshots_cold: db.open_tree("snapshots_cold")?,
            workers: db.open_tree("workers")?,
            routes: db.open_tree("routes")?,
            picker_product: db.open_tree("picker_product")?,
            transitions: db.open_tree("transitions")?,
            backtests: db.open_tree("backtests")?,
            db: Arc::new(db),
        })
    }

    // ------------------------------------------------------------------
    // Action log
    // ------------------------------------------------------------------

    /// Save a batch of action records, idempotent on the UUID key.
    ///
    /// A colliding id is treated as success: only
    /// `started_at / completed_at / status / duration_seconds /
    /// failure_reason` are refreshed, everything else keeps the first
    /// write. Weight is clamped at ingestion; a negative duration is
    /// stored as `None`.
    pub fn save_task_batch(&self, records: &[TaskActionRecord]) -> Result<BatchOutcome, StoreError> {
        let mut outcome = BatchOutcome::default();
        let mut batch = sled::Batch::default();

        for record in records {
            let mut record = record.clone();
            if record.weight_kg < 0.0 {
                warn!(id = %record.id, weight = record.weight_kg, "negative weight clamped to 0");
                record.weight_kg = 0.0;
            }
            if record.duration_seconds.map(|d| d < 0.0).unwrap_or(false) {
                warn!(id = %record.id, "negative duration stored as null");
                record.duration_seconds = None;
            }

            let key = record.id.as_bytes();
            match self.actions.get(key)? {
                Some(existing) => {
                    let mut stored: TaskActionRecord = serde_json::from_slice(&existing)?;
                    stored.started_at = record.started_at;
                    stored.completed_at = record.completed_at;
                    stored.status = record.status;
                    stored.duration_seconds = record.duration_seconds;
                    stored.failure_reason = record.failure_reason.clone();
                    batch.insert(key, serde_json::to_vec(&stored)?);
                    outcome.updated += 1;
                }
                None => {
                    batch.insert(key, serde_json::to_vec(&record)?);
                    outcome.inserted += 1;
                }
            }
        }

        self.actions.apply_batch(batch)?;
        debug!(inserted = outcome.inserted, updated = outcome.updated, "action batch saved");
        Ok(outcome)
    }

    pub fn get_action(&self, id: Uuid) -> Result<Option<TaskActionRecord>, StoreError> {
        match self.actions.get(id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Every action row. The log is append-mostly and bounded by
    /// retention, so a full scan is acceptable for aggregation cycles.
    pub fn all_actions(&self) -> Result<Vec<TaskActionRecord>, StoreError> {
        let mut records = Vec::new();
        for item in self.actions.iter() {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Actions belonging to one wave, ordered by start time.
    pub fn actions_for_wave(&self, wave_number: i64) -> Result<Vec<TaskActionRecord>, StoreError> {
        let mut records: Vec<TaskActionRecord> = self
            .all_actions()?
            .into_iter()
            .filter(|r| r.wave_number == Some(wave_number))
            .collect();
        records.sort_by_key(|r| r.started_at);
        Ok(records)
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Administrative wipe of the action log.
    pub fn truncate_tasks(&self) -> Result<(), StoreError> {
        self.actions.clear()?;
        self.db.flush()?;
        info!("action log truncated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Upsert a buffer snapshot keyed by its timestamp (same-time
    /// upsert replaces the record).
    pub fn buffer_snapshot(&self, snapshot: &BufferSnapshot) -> Result<(), StoreError> {
        let key = snapshot_key(snapshot.time);
        self.snapshots.insert(key, serde_json::to_vec(snapshot)?)?;
        Ok(())
    }

    /// Snapshots in `[start, end]`, in non-decreasing time order.
    pub fn snapshots_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BufferSnapshot>, StoreError> {
        let mut snapshots = Vec::new();
        for item in self.snapshots.range(snapshot_key(start)..=snapshot_key(end)) {
            let (_, value) = item?;
            snapshots.push(serde_json::from_slice(&value)?);
        }
        Ok(snapshots)
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    pub fn save_workers(&self, workers: &[WorkerRecord]) -> Result<(), StoreError> {
        self.replace_tree(&self.workers, workers, |w| w.worker_id.clone().into_bytes())
    }

    pub fn load_workers(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        self.load_tree(&self.workers)
    }

    pub fn save_routes(&self, routes: &[RouteStatistics]) -> Result<(), StoreError> {
        self.replace_tree(&self.routes, routes, |r| {
            format!("{}\u{1f}{}", r.from_zone, r.to_zone).into_bytes()
        })
    }

    pub fn load_routes(&self) -> Result<Vec<RouteStatistics>, StoreError> {
        self.load_tree(&self.routes)
    }

    pub fn save_picker_product(&self, stats: &[PickerProductStats]) -> Result<(), StoreError> {
        self.replace_tree(&self.picker_product, stats, |s| {
            format!("{}\u{1f}{}", s.picker_id, s.product_sku).into_bytes()
        })
    }

    pub fn load_picker_product(&self) -> Result<Vec<PickerProductStats>, StoreError> {
        self.load_tree(&self.picker_product)
    }

    pub fn save_transitions(&self, stats: &[WorkerTransitionStats]) -> Result<(), StoreError> {
        self.replace_tree(&self.transitions, stats, |s| {
            format!("{}\u{1f}{}", s.role, s.worker_id).into_bytes()
        })
    }

    pub fn load_transitions(&self) -> Result<Vec<WorkerTransitionStats>, StoreError> {
        self.load_tree(&self.transitions)
    }

    // ------------------------------------------------------------------
    // Backtest artifacts
    // ------------------------------------------------------------------

    /// Replace the stored artifact set for a wave (CASCADE-style:
    /// repeated runs delete and re-insert the whole value). Returns the
    /// run id.
    pub fn save_backtest<T: Serialize>(
        &self,
        wave_number: i64,
        artifact: &T,
    ) -> Result<Uuid, StoreError> {
        let run_id = Uuid::new_v4();
        let envelope = serde_json::json!({
            "run_id": run_id,
            "saved_at": Utc::now(),
            "artifact": artifact,
        });
        self.backtests
            .insert(wave_number.to_be_bytes(), serde_json::to_vec(&envelope)?)?;
        info!(wave = wave_number, run = %run_id, "backtest artifacts replaced");
        Ok(run_id)
    }

    pub fn load_backtest(&self, wave_number: i64) -> Result<Option<serde_json::Value>, StoreError> {
        match self.backtests.get(wave_number.to_be_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// Retention sweep: drop actions and snapshots older than
    /// `retention_days`, and compress snapshot chunks older than
    /// `compression_after_days` into day-keyed zstd blocks.
    pub fn run_housekeeping(&self, config: &HistoricalConfig, now: DateTime<Utc>) -> Result<(), StoreError> {
        let retention_cutoff = now - Duration::days(config.retention_days as i64);

        // Actions: scan, delete old.
        let mut removed = 0usize;
        for item in self.actions.iter() {
            let (key, value) = item?;
            let record: TaskActionRecord = serde_json::from_slice(&value)?;
            let stamp = record.completed_at.or(record.started_at);
            if stamp.map(|t| t < retention_cutoff).unwrap_or(false) {
                self.actions.remove(key)?;
                removed += 1;
            }
        }

        // Snapshots: keyed by time, so the old range drops directly.
        let mut snapshots_removed = 0usize;
        let cutoff_key = snapshot_key(retention_cutoff);
        let old_keys: Vec<sled::IVec> = self
            .snapshots
            .range(..cutoff_key)
            .filter_map(|item| item.ok().map(|(k, _)| k))
            .collect();
        for key in old_keys {
            self.snapshots.remove(key)?;
            snapshots_removed += 1;
        }

        if config.compression_enabled {
            self.compress_cold_snapshots(config, now)?;
        }

        if removed > 0 || snapshots_removed > 0 {
            info!(
                actions_removed = removed,
                snapshots_removed,
                "retention sweep complete"
            );
            self.db.flush()?;
        }
        Ok(())
    }

    /// Move snapshots older than `compression_after_days` into
    /// day-keyed zstd-compressed chunks.
    fn compress_cold_snapshots(
        &self,
        config: &HistoricalConfig,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let cold_cutoff = now - Duration::days(config.compression_after_days as i64);
        let cold: Vec<BufferSnapshot> = self.snapshots_range(DateTime::<Utc>::MIN_UTC, cold_cutoff)?;
        if cold.is_empty() {
            return Ok(());
        }

        let mut by_day: std::collections::BTreeMap<chrono::NaiveDate, Vec<BufferSnapshot>> =
            std::collections::BTreeMap::new();
        for snapshot in cold {
            by_day.entry(snapshot.time.date_naive()).or_default().push(snapshot);
        }

        for (day, snapshots) in by_day {
            let json = serde_json::to_vec(&snapshots)?;
            let compressed = zstd::encode_all(json.as_slice(), 3)
                .map_err(|e| StoreError::Compression(e.to_string()))?;
            self.snapshots_cold
                .insert(day.to_string().into_bytes(), compressed)?;
            for snapshot in &snapshots {
                self.snapshots.remove(snapshot_key(snapshot.time))?;
            }
            debug!(%day, count = snapshots.len(), "snapshot chunk compressed");
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Ingestion cursors
    // ------------------------------------------------------------------

    /// Last ingested id for a named cursor (0 when never set).
    pub fn cursor(&self, name: &str) -> Result<i64, StoreError> {
        let key = format!("cursor/{name}");
        match self.db.get(key.as_bytes())? {
            Some(value) if value.len() == 8 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&value);
                Ok(i64::from_be_bytes(bytes))
            }
            _ => Ok(0),
        }
    }

    /// Persist a named ingestion cursor.
    pub fn set_cursor(&self, name: &str, value: i64) -> Result<(), StoreError> {
        let key = format!("cursor/{name}");
        self.db.insert(key.as_bytes(), &value.to_be_bytes())?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tree plumbing
    // ------------------------------------------------------------------

    fn replace_tree<T: Serialize>(
        &self,
        tree: &sled::Tree,
        rows: &[T],
        key_fn: impl Fn(&T) -> Vec<u8>,
    ) -> Result<(), StoreError> {
        tree.clear()?;
        let mut batch = sled::Batch::default();
        for row in rows {
            batch.insert(key_fn(row), serde_json::to_vec(row)?);
        }
        tree.apply_batch(batch)?;
        Ok(())
    }

    fn load_tree<T: DeserializeOwned>(&self, tree: &sled::Tree) -> Result<Vec<T>, StoreError> {
        let mut rows = Vec::new();
        for item in tree.iter() {
            let (_, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }
}

/// Big-endian unix-seconds key: sorts chronologically.
fn snapshot_key(time: DateTime<Utc>) -> [u8; 8] {
    (time.timestamp().max(0) as u64).to_be_bytes()
}
