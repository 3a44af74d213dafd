//! Urgent delivery end-to-end: a Critical buffer drives CreateTask
//! calls with top wire priority within a single realtime cycle,
//! bounded by the per-cycle cap.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use palletflow::config::WarehouseConfig;
use palletflow::control::{ControlService, EventBus, ObservabilityFacade};
use palletflow::dispatch::Dispatcher;
use palletflow::historical::HistoricalRepository;
use palletflow::types::{Pallet, Product};
use palletflow::wms::sync::LiveState;
use palletflow::wms::{
    CreateTaskRequest, Page, WireTaskStatus, WmsAdapter, WmsBufferState, WmsCell, WmsError,
    WmsForklift, WmsPicker, WmsProduct, WmsTaskRow, WmsWorker, WmsZone,
};
use palletflow::Forklift;

/// Records every mutation the control loop issues.
#[derive(Default)]
struct RecordingAdapter {
    created: Mutex<Vec<CreateTaskRequest>>,
    task_counter: AtomicUsize,
}

#[async_trait]
impl WmsAdapter for RecordingAdapter {
    async fn tasks_after(&self, _: i64, _: usize) -> Result<Page<WmsTaskRow>, WmsError> {
        Ok(Page { items: vec![], last_id: 0, has_more: false })
    }
    async fn workers_after(&self, _: i64, _: usize) -> Result<Page<WmsWorker>, WmsError> {
        Ok(Page { items: vec![], last_id: 0, has_more: false })
    }
    async fn zones_after(&self, _: i64, _: usize) -> Result<Page<WmsZone>, WmsError> {
        Ok(Page { items: vec![], last_id: 0, has_more: false })
    }
    async fn cells_after(&self, _: i64, _: usize) -> Result<Page<WmsCell>, WmsError> {
        Ok(Page { items: vec![], last_id: 0, has_more: false })
    }
    async fn products_after(&self, _: i64, _: usize) -> Result<Page<WmsProduct>, WmsError> {
        Ok(Page { items: vec![], last_id: 0, has_more: false })
    }
    async fn current_pickers(&self) -> Result<Vec<WmsPicker>, WmsError> {
        Ok(vec![])
    }
    async fn current_forklifts(&self) -> Result<Vec<WmsForklift>, WmsError> {
        Ok(vec![])
    }
    async fn buffer_state(&self) -> Result<WmsBufferState, WmsError> {
        Ok(WmsBufferState {
            capacity: 50,
            pallets_count: 6,
            consumption_rate: 120.0,
            queue_length: 0,
        })
    }
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<String, WmsError> {
        self.created
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.clone());
        let n = self.task_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("WMS-T{n}"))
    }
    async fn update_task_status(&self, _: &str, _: WireTaskStatus) -> Result<(), WmsError> {
        Ok(())
    }
    async fn confirm_pallet_delivered(&self, _: &str) -> Result<(), WmsError> {
        Ok(())
    }
    async fn confirm_pallet_consumed(&self, _: &str) -> Result<(), WmsError> {
        Ok(())
    }
    async fn update_forklift_status(&self, _: &str, _: &str) -> Result<(), WmsError> {
        Ok(())
    }
}

#[tokio::test]
async fn critical_buffer_issues_capped_priority_three_tasks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repository = HistoricalRepository::open(dir.path()).expect("open");
    let adapter = Arc::new(RecordingAdapter::default());
    let config = WarehouseConfig::default();

    // Live view: level 0.12 of 50 (Critical), storage stocked with 15
    // pallets, three idle forklifts.
    let mut live = LiveState::default();
    live.buffer_level = 0.12;
    live.buffer_capacity = 50;
    live.buffer_pallets = 6;
    live.consumption_rate = 120.0;
    for i in 0..15 {
        let product = Product::new(format!("SKU-{i}"), "Goods", 12.0, 5.0, 20.0);
        live.storage.ingest(
            Pallet::new(format!("PAL-{i}"), product, 2, 40.0 + i as f64)
                .with_bin_code(format!("01S-01-{i:03}-01")),
        );
    }
    live.forklifts = (0..3)
        .map(|i| Forklift::new(format!("F-{i}"), format!("Forklift {i}"), 2.0))
        .collect();
    let live = Arc::new(RwLock::new(live));

    let service = ControlService::new(
        config.clone(),
        adapter.clone() as Arc<dyn WmsAdapter>,
        repository,
        Arc::new(Dispatcher::new()),
        Arc::clone(&live),
        Arc::new(ObservabilityFacade::new()),
        Arc::new(EventBus::new()),
    );

    service.realtime_cycle(Utc::now()).await;

    let created = adapter
        .created
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    // Deficit at 0.12 is 19 pallets; the per-cycle cap bounds it to 10.
    assert_eq!(created.len(), config.timing.max_task_creates_per_cycle);
    assert!(created.iter().all(|r| r.priority == 3), "non-critical priority seen");
    // Zones derive from the bin code grammar.
    assert!(created.iter().all(|r| r.from_zone == "S"));

    // The mirrored internal tasks dispatch to the idle forklifts in the
    // same cycle.
    let bound = live
        .read()
        .await
        .forklifts
        .iter()
        .filter(|f| f.current_task_id.is_some())
        .count();
    assert_eq!(bound, 3, "idle forklifts not dispatched");
}
