//! WMS ingestion loops
//!
//! Cursor-driven, monotonic ingestion of executed tasks into the
//! historical log, plus current-state refresh loops (pickers,
//! forklifts, buffer) feeding the shared live view the control service
//! reads. Pagination never re-processes already-saved rows: the cursor
//! is persisted and only moves forward (an explicit truncate resets it).

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{WmsEndpointConfig, WmsSyncConfig};
use crate::historical::HistoricalRepository;
use crate::types::{
    Forklift, ForkliftState, Picker, PickerState, StorageZone, TaskActionRecord,
};

use super::{WmsAdapter, WmsError};

/// Cursor names in the repository.
const TASKS_CURSOR: &str = "tasks";

// ============================================================================
// Live view
// ============================================================================

/// The current system observation shared between the ingestion loops
/// and the control service. One writer per field group, many readers.
#[derive(Debug, Default)]
pub struct LiveState {
    pub pickers: Vec<Picker>,
    pub forklifts: Vec<Forklift>,
    /// Mirror of the physical buffer occupancy
    pub buffer_level: f64,
    pub buffer_capacity: usize,
    pub buffer_pallets: usize,
    pub consumption_rate: f64,
    pub queue_length: u32,
    /// Pallets known to sit in storage, for travel estimates
    pub storage: StorageZone,
}

impl LiveState {
    pub fn active_pickers(&self) -> usize {
        self.pickers.iter().filter(|p| p.is_active()).count()
    }

    pub fn active_forklifts(&self) -> usize {
        self.forklifts
            .iter()
            .filter(|f| f.state != ForkliftState::Offline && f.state != ForkliftState::Idle)
            .count()
    }
}

fn parse_picker_state(raw: &str) -> PickerState {
    match raw {
        "Picking" => PickerState::Picking,
        "Waiting" => PickerState::Waiting,
        "Break" => PickerState::Break,
        "Offline" => PickerState::Offline,
        _ => PickerState::Idle,
    }
}

fn parse_forklift_state(raw: &str) -> ForkliftState {
    match raw {
        "MovingToPallet" => ForkliftState::MovingToPallet,
        "Loading" => ForkliftState::Loading,
        "MovingToBuffer" => ForkliftState::MovingToBuffer,
        "Unloading" => ForkliftState::Unloading,
        "Offline" => ForkliftState::Offline,
        _ => ForkliftState::Idle,
    }
}

// ============================================================================
// Sync service
// ============================================================================

/// Cursor-driven WMS ingestion.
pub struct WmsSyncService {
    adapter: Arc<dyn WmsAdapter>,
    repository: HistoricalRepository,
    config: WmsSyncConfig,
    page_size: usize,
}

impl WmsSyncService {
    pub fn new(
        adapter: Arc<dyn WmsAdapter>,
        repository: HistoricalRepository,
        config: WmsSyncConfig,
        endpoint: &WmsEndpointConfig,
    ) -> Self {
        Self {
            adapter,
            repository,
            config,
            page_size: endpoint.page_size,
        }
    }

    /// Retry-once policy for transient adapter failures.
    async fn with_retry<T, F, Fut>(operation: F) -> Result<T, WmsError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, WmsError>>,
    {
        match operation().await {
            Ok(value) => Ok(value),
            Err(e) if e.is_transient() => {
                debug!(error = %e, "transient adapter failure, retrying once");
                operation().await
            }
            Err(e) => Err(e),
        }
    }

    /// Drain all new executed-task rows into the historical log.
    ///
    /// Returns the number of rows saved. The cursor only advances, so
    /// repeated calls are monotonic; idempotent keys make a retried
    /// page harmless.
    pub async fn sync_tasks_once(&self) -> Result<usize, WmsError> {
        let mut cursor = self
            .repository
            .cursor(TASKS_CURSOR)
            .map_err(|e| {
                warn!(error = %e, "cursor read failed, starting from 0");
                e
            })
            .unwrap_or(0);
        let mut total = 0usize;

        loop {
            let adapter = Arc::clone(&self.adapter);
            let page_size = self.page_size;
            let page =
                Self::with_retry(|| adapter.tasks_after(cursor, page_size)).await?;

            let records: Vec<TaskActionRecord> = page
                .items
                .into_iter()
                .filter_map(super::WmsTaskRow::into_record)
                .collect();
            if !records.is_empty() {
                if let Err(e) = self.repository.save_task_batch(&records) {
                    warn!(error = %e, "batch save failed, cycle aborted");
                    break;
                }
                total += records.len();
            }

            if page.last_id > cursor {
                cursor = page.last_id;
                if let Err(e) = self.repository.set_cursor(TASKS_CURSOR, cursor) {
                    warn!(error = %e, "cursor persist failed");
                }
            }
            if !page.has_more {
                break;
            }
        }

        if total > 0 {
            info!(rows = total, cursor, "task ingestion advanced");
        }
        Ok(total)
    }

    /// Full resync: wipe the log and the cursor, then ingest everything.
    pub async fn resync_tasks(&self) -> Result<usize, WmsError> {
        if let Err(e) = self.repository.truncate_tasks() {
            warn!(error = %e, "truncate failed");
        }
        if let Err(e) = self.repository.set_cursor(TASKS_CURSOR, 0) {
            warn!(error = %e, "cursor reset failed");
        }
        self.sync_tasks_once().await
    }

    /// Background loop: ingest tasks on the configured cadence.
    pub async fn run_tasks_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_millis(self.config.tasks_sync_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("task ingestion loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_tasks_once().await {
                        warn!(error = %e, "task sync cycle skipped");
                    }
                }
            }
        }
        info!("task ingestion loop stopped");
    }

    /// Background loop: refresh the live picker view.
    pub async fn run_pickers_loop(
        self: Arc<Self>,
        live: Arc<RwLock<LiveState>>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
            self.config.pickers_sync_interval_ms,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let adapter = Arc::clone(&self.adapter);
                    match Self::with_retry(|| adapter.current_pickers()).await {
                        Ok(rows) => {
                            let pickers = rows
                                .into_iter()
                                .map(|row| {
                                    let mut picker = Picker::new(row.picker_id, row.name);
                                    picker.state = parse_picker_state(&row.state);
                                    picker.current_rate = row.current_rate;
                                    picker.pallet_consumption_rate = row.pallet_consumption_rate;
                                    picker
                                })
                                .collect();
                            live.write().await.pickers = pickers;
                        }
                        Err(e) => warn!(error = %e, "picker refresh skipped"),
                    }
                }
            }
        }
    }

    /// Background loop: refresh the live forklift view.
    pub async fn run_forklifts_loop(
        self: Arc<Self>,
        live: Arc<RwLock<LiveState>>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
            self.config.forklifts_sync_interval_ms,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let adapter = Arc::clone(&self.adapter);
                    match Self::with_retry(|| adapter.current_forklifts()).await {
                        Ok(rows) => {
                            let forklifts = rows
                                .into_iter()
                                .map(|row| {
                                    let mut forklift =
                                        Forklift::new(row.forklift_id, row.name, row.speed_m_per_s);
                                    forklift.state = parse_forklift_state(&row.state);
                                    forklift.load_unload_s = row.load_unload_s;
                                    forklift.current_position_m = row.current_position_m;
                                    forklift
                                })
                                .collect();
                            live.write().await.forklifts = forklifts;
                        }
                        Err(e) => warn!(error = %e, "forklift refresh skipped"),
                    }
                }
            }
        }
    }

    /// Background loop: refresh the live buffer observation.
    pub async fn run_buffer_loop(
        self: Arc<Self>,
        live: Arc<RwLock<LiveState>>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
            self.config.buffer_sync_interval_ms,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let adapter = Arc::clone(&self.adapter);
                    match Self::with_retry(|| adapter.buffer_state()).await {
                        Ok(state) => {
                            let mut guard = live.write().await;
                            guard.buffer_capacity = state.capacity;
                            guard.buffer_pallets = state.pallets_count;
                            guard.buffer_level = if state.capacity > 0 {
                                state.pallets_count as f64 / state.capacity as f64
                            } else {
                                0.0
                            };
                            guard.consumption_rate = state.consumption_rate;
                            guard.queue_length = state.queue_length;
                        }
                        Err(e) => warn!(error = %e, "buffer refresh skipped"),
                    }
                }
            }
        }
    }
}
