//! Operator CLI
//!
//! Sub-command surface for warehouse operations:
//!
//! ```bash
//! opsctl sync tasks            # ingest new executed tasks
//! opsctl sync all --truncate   # full resync from scratch
//! opsctl stats routes          # recompute + show route statistics
//! opsctl backtest 42           # replay wave 42, write the report
//! opsctl train                 # export training rows as JSON lines
//! ```
//!
//! Every operation exits non-zero on unrecoverable error and prints a
//! compact cause line.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;

use palletflow::aggregation::AggregationService;
use palletflow::backtest::{write_report, BacktestEngine};
use palletflow::config::{self, WarehouseConfig};
use palletflow::historical::{export_training_rows, HistoricalRepository};
use palletflow::wms::http::HttpWmsAdapter;
use palletflow::wms::sync::WmsSyncService;
use palletflow::wms::WmsAdapter;

#[derive(Parser, Debug)]
#[command(name = "opsctl")]
#[command(about = "PalletFlow operations CLI")]
#[command(version)]
struct Cli {
    /// Data directory of the historical store
    #[arg(long, default_value = "./data")]
    data_dir: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest reference and task data from the WMS
    Sync {
        #[arg(value_enum)]
        what: SyncTarget,
        /// Wipe the local log (and cursor) before ingesting
        #[arg(long)]
        truncate: bool,
    },
    /// Recompute and show statistics
    Stats {
        #[arg(value_enum)]
        what: StatsTarget,
    },
    /// Replay a historical wave and write the comparison report
    Backtest {
        /// Wave number to replay
        wave: i64,
    },
    /// Export training feature rows as JSON lines on stdout
    Train,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SyncTarget {
    Tasks,
    Zones,
    Cells,
    Products,
    All,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatsTarget {
    Workers,
    Routes,
    PickerProduct,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = WarehouseConfig::load();
    cfg.validate().context("invalid configuration")?;
    config::init(cfg.clone());

    let repository = HistoricalRepository::open(&cli.data_dir)
        .with_context(|| format!("failed to open historical store at {}", cli.data_dir))?;

    match cli.command {
        Command::Sync { what, truncate } => sync(&cfg, repository, what, truncate).await,
        Command::Stats { what } => stats(&cfg, repository, what),
        Command::Backtest { wave } => backtest(&cfg, repository, wave),
        Command::Train => train(repository),
    }
}

async fn sync(
    cfg: &WarehouseConfig,
    repository: HistoricalRepository,
    what: SyncTarget,
    truncate: bool,
) -> Result<()> {
    let adapter: Arc<dyn WmsAdapter> =
        Arc::new(HttpWmsAdapter::new(&cfg.wms).context("failed to build WMS client")?);
    let service = WmsSyncService::new(
        Arc::clone(&adapter),
        repository,
        cfg.wms_sync.clone(),
        &cfg.wms,
    );

    if matches!(what, SyncTarget::Tasks | SyncTarget::All) {
        let rows = if truncate {
            service.resync_tasks().await.context("task resync failed")?
        } else {
            service.sync_tasks_once().await.context("task sync failed")?
        };
        println!("tasks: {rows} rows ingested");
    }
    if matches!(what, SyncTarget::Zones | SyncTarget::All) {
        let count = drain_pages(|after| adapter.zones_after(after, cfg.wms.page_size)).await?;
        println!("zones: {count} rows");
    }
    if matches!(what, SyncTarget::Cells | SyncTarget::All) {
        let count = drain_pages(|after| adapter.cells_after(after, cfg.wms.page_size)).await?;
        println!("cells: {count} rows");
    }
    if matches!(what, SyncTarget::Products | SyncTarget::All) {
        let count = drain_pages(|after| adapter.products_after(after, cfg.wms.page_size)).await?;
        println!("products: {count} rows");
    }
    Ok(())
}

/// Walk a paged read to the end, returning the total row count.
async fn drain_pages<T, F, Fut>(mut fetch: F) -> Result<usize>
where
    F: FnMut(i64) -> Fut,
    Fut: std::future::Future<Output = Result<palletflow::wms::Page<T>, palletflow::wms::WmsError>>,
{
    let mut after = 0i64;
    let mut total = 0usize;
    loop {
        let page = fetch(after).await.context("paged read failed")?;
        total += page.items.len();
        if !page.has_more {
            break;
        }
        after = page.last_id;
    }
    Ok(total)
}

fn stats(cfg: &WarehouseConfig, repository: HistoricalRepository, what: StatsTarget) -> Result<()> {
    let service = AggregationService::new(
        repository,
        cfg.route_statistics.clone(),
        std::time::Duration::from_secs(300),
    );
    service.refresh(Utc::now()).context("aggregate recompute failed")?;
    let cache = service.cache();

    match what {
        StatsTarget::Workers => {
            println!(
                "{:<14} {:<9} {:>7} {:>9} {:>9} {:>9} {:>8}",
                "worker", "role", "tasks", "avg,s", "median,s", "p90,s", "per-hour"
            );
            for w in &cache.workers {
                println!(
                    "{:<14} {:<9} {:>7} {:>9.1} {:>9.1} {:>9.1} {:>8.1}",
                    w.worker_id,
                    w.role.to_string(),
                    w.task_count,
                    w.avg_duration_seconds,
                    w.median_duration_seconds,
                    w.p90_duration_seconds,
                    w.tasks_per_hour
                );
            }
        }
        StatsTarget::Routes => {
            println!(
                "{:<8} {:<8} {:>7} {:>9} {:>10} {:>9} {:>10}",
                "from", "to", "trips", "median,s", "trimmed", "conf", "predicted"
            );
            let mut routes: Vec<_> = cache.routes.values().collect();
            routes.sort_by(|a, b| {
                a.from_zone.cmp(&b.from_zone).then_with(|| a.to_zone.cmp(&b.to_zone))
            });
            for r in routes {
                println!(
                    "{:<8} {:<8} {:>7} {:>9.1} {:>10} {:>9.2} {:>10.1}",
                    r.from_zone,
                    r.to_zone,
                    r.normalized_trips,
                    r.median_duration_seconds,
                    r.outliers_removed,
                    r.confidence,
                    r.predicted_duration_seconds
                );
            }
        }
        StatsTarget::PickerProduct => {
            println!(
                "{:<14} {:<14} {:>9} {:>9} {:>9} {:>7}",
                "picker", "sku", "lines/min", "units/min", "kg/min", "obs"
            );
            let mut stats: Vec<_> = cache.picker_product.values().collect();
            stats.sort_by(|a, b| {
                a.picker_id.cmp(&b.picker_id).then_with(|| a.product_sku.cmp(&b.product_sku))
            });
            for s in stats {
                println!(
                    "{:<14} {:<14} {:>9.2} {:>9.2} {:>9.2} {:>7}",
                    s.picker_id,
                    s.product_sku,
                    s.lines_per_minute,
                    s.units_per_minute,
                    s.kg_per_minute,
                    s.observations
                );
            }
        }
    }
    Ok(())
}

fn backtest(cfg: &WarehouseConfig, repository: HistoricalRepository, wave: i64) -> Result<()> {
    let engine = BacktestEngine::new(repository, cfg.buffer.capacity as u32);
    let (run_id, result) = engine
        .run(wave)
        .with_context(|| format!("backtest of wave {wave} failed"))?;
    let path = write_report(&result, &cfg.reports.dir, Utc::now())
        .context("report write failed")?;

    println!("run:         {run_id}");
    println!("wave:        {wave}");
    println!(
        "days:        {} → {} (saved {})",
        result.summary.original_days, result.summary.optimized_days, result.summary.days_saved
    );
    println!("improvement: {:.1} %", result.summary.improvement_percent);
    println!("report:      {}", path.display());
    Ok(())
}

fn train(repository: HistoricalRepository) -> Result<()> {
    let records = repository.all_actions().context("log read failed")?;
    let rows = export_training_rows(&records);
    let out = palletflow::historical::to_json_lines(&rows).context("serialization failed")?;
    print!("{out}");
    eprintln!("{} training rows", rows.len());
    Ok(())
}
