//! Backtest replay: a sparse three-day fact schedule compresses under
//! the optimizer, the improvement formula follows the day/duration
//! rule, and two runs over the same frozen log are identical.

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use palletflow::backtest::{write_report, BacktestEngine};
use palletflow::historical::HistoricalRepository;
use palletflow::types::{ActionStatus, TaskActionRecord, WorkerRole};

const WAVE: i64 = 42;

fn make_record(
    seed: u128,
    worker: &str,
    role: WorkerRole,
    day: u32,
    hour: u32,
    minute: u32,
    duration_s: i64,
) -> TaskActionRecord {
    let start = Utc
        .with_ymd_and_hms(2025, 6, day, hour, minute, 0)
        .single()
        .expect("valid");
    TaskActionRecord {
        // Fixed ids keep the frozen log byte-identical between runs.
        id: Uuid::from_u128(seed),
        worker_id: worker.into(),
        worker_name: worker.into(),
        role,
        template: if role == WorkerRole::Forklift {
            "replenishment".into()
        } else {
            "distribution".into()
        },
        basis_number: seed as i64,
        from_bin: "01I-01-001-01".into(),
        to_bin: "01B-01-001-01".into(),
        product_sku: "SKU-A".into(),
        product_name: "Goods".into(),
        weight_kg: 12.0,
        quantity: 1.0,
        started_at: Some(start),
        completed_at: Some(start + Duration::seconds(duration_s)),
        status: ActionStatus::Completed,
        duration_seconds: Some(duration_s as f64),
        failure_reason: None,
        wave_number: Some(WAVE),
    }
}

/// Three sparse days: each day one forklift delivery at 08:00 and one
/// pick at 15:00, 600 s each, with huge idle gaps the replay removes.
fn seed_wave(repository: &HistoricalRepository) {
    let mut records = Vec::new();
    let mut seed = 1u128;
    for day in [2u32, 3, 4] {
        for slot in 0..4u32 {
            records.push(make_record(
                seed,
                "F-1",
                WorkerRole::Forklift,
                day,
                8,
                slot * 11,
                600,
            ));
            seed += 1;
            records.push(make_record(
                seed,
                "P-1",
                WorkerRole::Picker,
                day,
                15,
                slot * 11,
                600,
            ));
            seed += 1;
        }
    }
    repository.save_task_batch(&records).expect("seed");
}

#[test]
fn replay_compresses_days_and_reports_the_right_improvement() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repository = HistoricalRepository::open(dir.path()).expect("open");
    seed_wave(&repository);

    let engine = BacktestEngine::new(repository, 50);
    let (_, result) = engine.run(WAVE).expect("backtest");
    let summary = &result.summary;

    assert_eq!(summary.original_days, 3);
    assert!(summary.optimized_days <= summary.original_days);
    assert_eq!(summary.total_tasks, 24);

    // Improvement formula: by day count when days were saved, else by
    // active duration.
    if summary.days_saved > 0 {
        let expected =
            100.0 * summary.days_saved as f64 / f64::from(summary.original_days);
        assert!((summary.improvement_percent - expected).abs() < 1e-9);
    } else {
        let expected = 100.0
            * (summary.fact_active_seconds - summary.optimized_active_seconds)
            / summary.fact_active_seconds;
        assert!((summary.improvement_percent - expected).abs() < 1e-9);
    }

    // Every duration came from the log itself.
    assert_eq!(summary.duration_sources.get("actual"), Some(&24));

    // The decision log pairs one decision per assignment at minimum.
    assert!(result.decisions.len() >= 24);
    assert!(result
        .decisions
        .windows(2)
        .all(|w| w[0].sequence < w[1].sequence));

    // Both timelines carry per-worker rows.
    assert!(!result.fact_events.is_empty());
    assert!(!result.optimized_events.is_empty());
    assert_eq!(result.per_worker.len(), 2);
}

#[test]
fn two_runs_over_a_frozen_log_are_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repository = HistoricalRepository::open(dir.path()).expect("open");
    seed_wave(&repository);

    let engine = BacktestEngine::new(repository, 50);
    let (_, first) = engine.run(WAVE).expect("first run");
    let (_, second) = engine.run(WAVE).expect("second run");

    let decisions_a = serde_json::to_string(&first.decisions).expect("json");
    let decisions_b = serde_json::to_string(&second.decisions).expect("json");
    assert_eq!(decisions_a, decisions_b, "decision logs diverged");

    let events_a = serde_json::to_string(&first.optimized_events).expect("json");
    let events_b = serde_json::to_string(&second.optimized_events).expect("json");
    assert_eq!(events_a, events_b, "schedule events diverged");

    let summary_a = serde_json::to_string(&first.summary).expect("json");
    let summary_b = serde_json::to_string(&second.summary).expect("json");
    assert_eq!(summary_a, summary_b, "summaries diverged");
}

#[test]
fn report_file_lands_in_the_reports_dir_with_the_expected_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repository = HistoricalRepository::open(dir.path()).expect("open");
    seed_wave(&repository);

    let engine = BacktestEngine::new(repository, 50);
    let (_, result) = engine.run(WAVE).expect("backtest");

    let reports = tempfile::tempdir().expect("reports dir");
    let at = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).single().expect("valid");
    let path = write_report(&result, reports.path(), at).expect("report");
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("backtest_42_20250701_120000.txt")
    );
    let text = std::fs::read_to_string(&path).expect("readable");
    assert!(text.contains("РАЗБИВКА ПО ДНЯМ"));
    assert!(text.contains("ОПТИМИЗИРОВАННЫЙ ПЛАН"));
}
