//! PalletFlow service binary
//!
//! Starts the three control loops, the WMS ingestion loops, the
//! aggregation worker, and the status API, then runs until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (./warehouse_config.toml when present)
//! palletflow
//!
//! # Point at a specific config and data directory
//! PALLETFLOW_CONFIG=/etc/palletflow.toml palletflow --data-dir /var/lib/palletflow
//! ```
//!
//! # Environment Variables
//!
//! - `PALLETFLOW_CONFIG`: path to the TOML configuration
//! - `RUST_LOG`: logging filter (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use palletflow::aggregation::AggregationService;
use palletflow::config::{self, WarehouseConfig};
use palletflow::control::{ControlService, EventBus, ObservabilityFacade};
use palletflow::dispatch::Dispatcher;
use palletflow::historical::HistoricalRepository;
use palletflow::wms::http::HttpWmsAdapter;
use palletflow::wms::sync::{LiveState, WmsSyncService};
use palletflow::wms::WmsAdapter;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "palletflow")]
#[command(about = "Warehouse buffer-flow scheduling engine")]
#[command(version)]
struct CliArgs {
    /// Data directory for the embedded historical store
    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// Override the status API bind address
    #[arg(short, long)]
    addr: Option<String>,

    /// Disable the WMS ingestion loops (control loops only)
    #[arg(long)]
    no_sync: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let cfg = WarehouseConfig::load();
    cfg.validate().context("invalid configuration")?;
    config::init(cfg.clone());

    info!("PalletFlow starting");
    info!(
        capacity = cfg.buffer.capacity,
        low = cfg.buffer.low_threshold,
        high = cfg.buffer.high_threshold,
        critical = cfg.buffer.critical_threshold,
        "buffer band configured"
    );

    let repository = HistoricalRepository::open(&args.data_dir)
        .with_context(|| format!("failed to open historical store at {}", args.data_dir))?;

    let adapter: Arc<dyn WmsAdapter> =
        Arc::new(HttpWmsAdapter::new(&cfg.wms).context("failed to build WMS client")?);
    let live = Arc::new(RwLock::new(LiveState::default()));
    let dispatcher = Arc::new(Dispatcher::new());
    let facade = Arc::new(ObservabilityFacade::new());
    let events = Arc::new(EventBus::new());

    // Domain event logging: the bus always has at least one subscriber.
    events.subscribe("tracing", |event| {
        tracing::debug!(?event, "domain event");
    });

    let control = Arc::new(ControlService::new(
        cfg.clone(),
        Arc::clone(&adapter),
        repository.clone(),
        Arc::clone(&dispatcher),
        Arc::clone(&live),
        Arc::clone(&facade),
        Arc::clone(&events),
    ));

    let aggregation = Arc::new(AggregationService::new(
        repository.clone(),
        cfg.route_statistics.clone(),
        std::time::Duration::from_millis(cfg.wms_sync.aggregation_interval_ms),
    ));

    let sync = Arc::new(WmsSyncService::new(
        Arc::clone(&adapter),
        repository.clone(),
        cfg.wms_sync.clone(),
        &cfg.wms,
    ));

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    // Control loops.
    tasks.spawn(Arc::clone(&control).run_realtime(cancel.clone()));
    tasks.spawn(Arc::clone(&control).run_tactical(cancel.clone()));
    tasks.spawn(Arc::clone(&control).run_historical(cancel.clone()));

    // Aggregation worker.
    tasks.spawn(Arc::clone(&aggregation).run(cancel.clone()));

    // WMS ingestion loops.
    if cfg.wms_sync.enabled && !args.no_sync {
        tasks.spawn(Arc::clone(&sync).run_tasks_loop(cancel.clone()));
        tasks.spawn(Arc::clone(&sync).run_pickers_loop(Arc::clone(&live), cancel.clone()));
        tasks.spawn(Arc::clone(&sync).run_forklifts_loop(Arc::clone(&live), cancel.clone()));
        tasks.spawn(Arc::clone(&sync).run_buffer_loop(Arc::clone(&live), cancel.clone()));
    } else {
        warn!("WMS ingestion disabled");
    }

    // Status API.
    let addr = args.addr.unwrap_or_else(|| cfg.server.addr.clone());
    {
        let facade = Arc::clone(&facade);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(e) = palletflow::api::serve(&addr, facade, cancel).await {
                error!(error = %e, "status API exited");
            }
        });
    }

    // Run until Ctrl-C, then drain cooperatively.
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    cancel.cancel();

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "task ended abnormally during shutdown");
        }
    }

    if let Err(e) = repository.flush() {
        warn!(error = %e, "final store flush failed");
    }
    info!("PalletFlow stopped");
    Ok(())
}
