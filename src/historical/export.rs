//! Training export — flat feature vectors for the external trainer

use chrono::{Datelike, Timelike};

use crate::types::{TaskActionRecord, TrainingRow};

use super::bin_code::extract_zone;

/// Project completed action rows into flat feature vectors.
///
/// Rows without a usable duration or start timestamp carry no training
/// signal and are skipped.
pub fn export_training_rows(records: &[TaskActionRecord]) -> Vec<TrainingRow> {
    records
        .iter()
        .filter_map(|record| {
            let duration = record.duration_seconds.filter(|d| *d > 0.0)?;
            let started = record.started_at?;
            Some(TrainingRow {
                worker_id: record.worker_id.clone(),
                role: record.role,
                from_zone: extract_zone(&record.from_bin),
                to_zone: extract_zone(&record.to_bin),
                product_sku: record.product_sku.clone(),
                weight_kg: record.weight_kg,
                quantity: record.quantity,
                hour_of_day: started.hour(),
                day_of_week: started.weekday().num_days_from_monday(),
                duration_seconds: duration,
            })
        })
        .collect()
}

/// Serialize training rows as JSON lines.
pub fn to_json_lines(rows: &[TrainingRow]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for row in rows {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    Ok(out)
}
