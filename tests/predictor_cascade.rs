//! Predictor cascade fall-through against a real repository:
//! actual → route_stats → picker_product → default.

use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use palletflow::aggregation::AggregationService;
use palletflow::config::RouteStatisticsConfig;
use palletflow::historical::HistoricalRepository;
use palletflow::predictor::{DurationPredictor, PredictionSource, ProspectiveTask};
use palletflow::types::{ActionStatus, TaskActionRecord, WorkerRole};

fn make_record(
    worker: &str,
    role: WorkerRole,
    from: &str,
    to: &str,
    sku: &str,
    duration: f64,
    minute: i64,
) -> TaskActionRecord {
    let start = Utc.with_ymd_and_hms(2025, 5, 5, 8, 0, 0).single().expect("valid")
        + Duration::minutes(minute);
    TaskActionRecord {
        id: Uuid::new_v4(),
        worker_id: worker.into(),
        worker_name: worker.into(),
        role,
        template: "task".into(),
        basis_number: minute,
        from_bin: from.into(),
        to_bin: to.into(),
        product_sku: sku.into(),
        product_name: sku.into(),
        weight_kg: 10.0,
        quantity: 2.0,
        started_at: Some(start),
        completed_at: Some(start + Duration::seconds(duration as i64)),
        status: ActionStatus::Completed,
        duration_seconds: Some(duration),
        failure_reason: None,
        wave_number: Some(1),
    }
}

fn forklift_task(action_id: Option<Uuid>) -> ProspectiveTask {
    ProspectiveTask {
        action_id,
        worker_id: Some("F-1".into()),
        role: WorkerRole::Forklift,
        from_slot: "01I-01-001-01".into(),
        to_slot: "01D-02-001-01".into(),
        product_sku: "SKU-A".into(),
        weight_kg: 10.0,
        quantity: 2.0,
        time: Utc::now(),
    }
}

#[test]
fn cascade_falls_through_each_rung_in_turn() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repository = HistoricalRepository::open(dir.path()).expect("open");

    // Seed forklift trips on I→D and picker history on (P-1, SKU-A).
    let mut records: Vec<TaskActionRecord> = (0..8)
        .map(|i| {
            make_record(
                "F-1",
                WorkerRole::Forklift,
                "01I-01-001-01",
                "01D-02-001-01",
                "SKU-A",
                100.0 + i as f64,
                i * 10,
            )
        })
        .collect();
    records.extend((0..6).map(|i| {
        make_record(
            "P-1",
            WorkerRole::Picker,
            "01B-01-001-01",
            "01P-01-001-01",
            "SKU-A",
            60.0,
            100 + i * 10,
        )
    }));
    repository.save_task_batch(&records).expect("seed");

    let service = AggregationService::new(
        repository,
        RouteStatisticsConfig::default(),
        std::time::Duration::from_secs(300),
    );
    service.refresh(Utc::now()).expect("refresh");
    let cache = service.cache();

    // Rung 1: the exact action row exists → actual.
    let replayed = records[0].id;
    let actuals: HashMap<Uuid, f64> = HashMap::from([(replayed, 100.0)]);
    let predictor = DurationPredictor::new(Arc::clone(&cache))
        .with_actuals(actuals)
        .with_wave_mean(90.0);
    let p = predictor.predict(&forklift_task(Some(replayed)));
    assert_eq!(p.source, PredictionSource::Actual);
    assert!((p.seconds - 100.0).abs() < 1e-9);

    // Rung 2: no actual → the IQR-trimmed route median.
    let p = predictor.predict(&forklift_task(None));
    assert_eq!(p.source, PredictionSource::RouteStats);
    assert!((p.seconds - 103.5).abs() < 1e-9);

    // Rung 3: picker task on a known (picker, product) pair.
    let picker_task = ProspectiveTask {
        action_id: None,
        worker_id: Some("P-1".into()),
        role: WorkerRole::Picker,
        from_slot: "01B-01-001-01".into(),
        to_slot: "01P-01-001-01".into(),
        product_sku: "SKU-A".into(),
        weight_kg: 10.0,
        quantity: 2.0,
        time: Utc::now(),
    };
    let p = predictor.predict(&picker_task);
    assert_eq!(p.source, PredictionSource::PickerProduct);
    assert!(p.seconds > 0.0);

    // Rung 4: unknown everything → the wave mean, tagged default.
    let unknown = ProspectiveTask {
        from_slot: "01Z-09-001-01".into(),
        to_slot: "01Q-09-001-01".into(),
        ..forklift_task(None)
    };
    let p = predictor.predict(&unknown);
    assert_eq!(p.source, PredictionSource::Default);
    assert!((p.seconds - 90.0).abs() < 1e-9);
}
