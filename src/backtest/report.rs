//! Backtest report writer
//!
//! Fixed-column plain-text layout consumed by warehouse operations.
//! Section headers are the ones the report consumers already parse;
//! they stay in Russian. Output file:
//! `backtest_<wave>_<YYYYMMDD_HHMMSS>.txt` in the configured reports
//! directory.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{BacktestResult, ScheduleEvent};

/// Report writing errors.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write report {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
}

const RULE: &str =
    "================================================================================";
const THIN: &str =
    "--------------------------------------------------------------------------------";

/// Render and write the report file. Returns the path written.
///
/// `generated_at` is passed in (not read from the wall clock) so report
/// generation stays deterministic under test.
pub fn write_report(
    result: &BacktestResult,
    reports_dir: &Path,
    generated_at: DateTime<Utc>,
) -> Result<PathBuf, ReportError> {
    let text = render(result, generated_at);
    let file_name = format!(
        "backtest_{}_{}.txt",
        result.wave_number,
        generated_at.format("%Y%m%d_%H%M%S")
    );
    let path = reports_dir.join(file_name);
    std::fs::create_dir_all(reports_dir).map_err(|e| ReportError::Io(path.clone(), e))?;
    std::fs::write(&path, text).map_err(|e| ReportError::Io(path.clone(), e))?;
    info!(path = %path.display(), "backtest report written");
    Ok(path)
}

fn hours(seconds: f64) -> f64 {
    seconds / 3600.0
}

/// Render the full fixed-layout report.
pub fn render(result: &BacktestResult, generated_at: DateTime<Utc>) -> String {
    let summary = &result.summary;
    let mut out = String::new();

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "ОТЧЁТ ПО БЭКТЕСТУ ВОЛНЫ {}", summary.wave_number);
    let _ = writeln!(out, "Сформирован: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out);

    // --- ОБЩАЯ ИНФОРМАЦИЯ ---
    let _ = writeln!(out, "ОБЩАЯ ИНФОРМАЦИЯ");
    let _ = writeln!(out, "{THIN}");
    let _ = writeln!(out, "  Волна:                  {}", summary.wave_number);
    let _ = writeln!(out, "  Всего операций:         {}", summary.total_tasks);
    let _ = writeln!(out, "  Фактических дней:       {}", summary.original_days);
    let _ = writeln!(
        out,
        "  Факт, астрономическое:  {:.1} ч",
        hours(summary.fact_wall_clock_seconds)
    );
    let _ = writeln!(
        out,
        "  Факт, активное:         {:.1} ч",
        hours(summary.fact_active_seconds)
    );
    let _ = writeln!(out);

    // --- РЕЗУЛЬТАТЫ СРАВНЕНИЯ ---
    let _ = writeln!(out, "РЕЗУЛЬТАТЫ СРАВНЕНИЯ");
    let _ = writeln!(out, "{THIN}");
    let _ = writeln!(out, "  Оптимизированных дней:  {}", summary.optimized_days);
    let _ = writeln!(out, "  Сэкономлено дней:       {}", summary.days_saved);
    let _ = writeln!(
        out,
        "  Оптим., активное:       {:.1} ч",
        hours(summary.optimized_active_seconds)
    );
    let _ = writeln!(out, "  Улучшение:              {:.1} %", summary.improvement_percent);
    let _ = writeln!(out);

    // --- РАЗБИВКА ПО ДНЯМ ---
    let _ = writeln!(out, "РАЗБИВКА ПО ДНЯМ");
    let _ = writeln!(out, "{THIN}");
    let _ = writeln!(
        out,
        "{:<12} {:>8} {:>10} {:>10} {:>7} {:>12} {:>10} {:>10} {:>8}",
        "Дата", "Рабочих", "Факт,пал", "Опт,пал", "Дельта", "Буфер,кон", "Факт,ч", "Опт,ч", "Улучш,%"
    );
    for day in &result.per_day {
        let _ = writeln!(
            out,
            "{:<12} {:>8} {:>10} {:>10} {:>7} {:>12} {:>10.1} {:>10.1} {:>8.1}",
            day.day,
            day.workers,
            day.fact_pallets,
            day.optimized_pallets,
            day.delta_pallets,
            day.buffer_level_end,
            hours(day.fact_active_seconds),
            hours(day.optimized_active_seconds),
            day.improvement_percent
        );
    }
    let _ = writeln!(out);

    // --- РАЗБИВКА ПО РАБОТНИКАМ ---
    let _ = writeln!(out, "РАЗБИВКА ПО РАБОТНИКАМ");
    let _ = writeln!(out, "{THIN}");
    let _ = writeln!(
        out,
        "{:<14} {:<20} {:<9} {:>9} {:>9} {:>10} {:>10}",
        "Код", "Имя", "Роль", "Факт,оп", "Опт,оп", "Факт,ч", "Опт,ч"
    );
    for worker in &result.per_worker {
        let _ = writeln!(
            out,
            "{:<14} {:<20} {:<9} {:>9} {:>9} {:>10.1} {:>10.1}",
            worker.worker_id,
            worker.worker_name,
            worker.role.to_string(),
            worker.fact_tasks,
            worker.optimized_tasks,
            hours(worker.fact_active_seconds),
            hours(worker.optimized_active_seconds)
        );
    }
    let _ = writeln!(out);

    // --- ИСТОЧНИКИ ОЦЕНКИ ВРЕМЕНИ ---
    let _ = writeln!(out, "ИСТОЧНИКИ ОЦЕНКИ ВРЕМЕНИ");
    let _ = writeln!(out, "{THIN}");
    for (source, count) in &summary.duration_sources {
        let _ = writeln!(out, "  {source:<16} {count:>8}");
    }
    let _ = writeln!(out);

    // --- Timelines ---
    let _ = writeln!(out, "ФАКТИЧЕСКИЙ ГРАФИК");
    let _ = writeln!(out, "{THIN}");
    write_events(&mut out, &result.fact_events);
    let _ = writeln!(out);

    let _ = writeln!(out, "ОПТИМИЗИРОВАННЫЙ ПЛАН");
    let _ = writeln!(out, "{THIN}");
    write_events(&mut out, &result.optimized_events);
    let _ = writeln!(out, "{RULE}");

    out
}

fn write_events(out: &mut String, events: &[ScheduleEvent]) {
    let _ = writeln!(
        out,
        "{:<14} {:<9} {:<20} {:<20} {:>8} {:<16} {:<16} {:>8} {:>7} {:>8}",
        "Работник", "Роль", "Начало", "Конец", "Длит,с", "Откуда", "Куда", "Вес,кг", "Буфер", "Перех,с"
    );
    for event in events {
        let _ = writeln!(
            out,
            "{:<14} {:<9} {:<20} {:<20} {:>8.0} {:<16} {:<16} {:>8.1} {:>7} {:>8.0}",
            event.worker_id,
            event.role.to_string(),
            event.start.format("%Y-%m-%d %H:%M:%S"),
            event.end.format("%Y-%m-%d %H:%M:%S"),
            event.duration_seconds,
            event.from_bin,
            event.to_bin,
            event.weight_kg,
            event.buffer_level_at_start,
            event.transition_seconds
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::BacktestSummary;
    use std::collections::BTreeMap;

    fn make_result() -> BacktestResult {
        BacktestResult {
            wave_number: 7,
            summary: BacktestSummary {
                wave_number: 7,
                original_days: 3,
                optimized_days: 2,
                days_saved: 1,
                improvement_percent: 33.3,
                fact_wall_clock_seconds: 72.0 * 3600.0,
                fact_active_seconds: 24.0 * 3600.0,
                optimized_active_seconds: 15.0 * 3600.0,
                total_tasks: 120,
                duration_sources: BTreeMap::from([
                    ("actual".to_string(), 100u64),
                    ("route_stats".to_string(), 15),
                    ("default".to_string(), 5),
                ]),
            },
            decisions: Vec::new(),
            fact_events: Vec::new(),
            optimized_events: Vec::new(),
            per_day: Vec::new(),
            per_worker: Vec::new(),
        }
    }

    #[test]
    fn report_carries_the_fixed_sections() {
        let text = render(&make_result(), Utc::now());
        for section in [
            "ОБЩАЯ ИНФОРМАЦИЯ",
            "РЕЗУЛЬТАТЫ СРАВНЕНИЯ",
            "РАЗБИВКА ПО ДНЯМ",
            "РАЗБИВКА ПО РАБОТНИКАМ",
            "ИСТОЧНИКИ ОЦЕНКИ ВРЕМЕНИ",
            "ФАКТИЧЕСКИЙ ГРАФИК",
            "ОПТИМИЗИРОВАННЫЙ ПЛАН",
        ] {
            assert!(text.contains(section), "missing section {section}");
        }
        assert!(text.contains("actual"));
    }

    #[test]
    fn file_name_embeds_wave_and_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 4, 1, 10, 30, 0)
            .single()
            .expect("valid");
        let path = write_report(&make_result(), dir.path(), at).expect("written");
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("backtest_7_20250401_103000.txt")
        );
        assert!(path.exists());
    }
}
