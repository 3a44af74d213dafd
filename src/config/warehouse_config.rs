//! Warehouse Configuration - All control thresholds as operator-tunable TOML values
//!
//! Every threshold the control loops use is a field in this module. Each
//! struct implements `Default` with the values the engine was tuned with,
//! ensuring zero-change behavior when no config file is present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a warehouse deployment.
///
/// Load with `WarehouseConfig::load()` which searches:
/// 1. `$PALLETFLOW_CONFIG` env var
/// 2. `./warehouse_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WarehouseConfig {
    /// Buffer FSM thresholds and hysteresis
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Control loop cadences
    #[serde(default)]
    pub timing: TimingConfig,

    /// Wave sizing and weight-category thresholds
    #[serde(default)]
    pub wave: WaveConfig,

    /// Expected crew sizes
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Assignment solver tuning
    #[serde(default)]
    pub optimization: OptimizationConfig,

    /// M/M/c utilisation warning bands
    #[serde(default)]
    pub queueing: QueueingConfig,

    /// WMS ingestion cadence
    #[serde(default)]
    pub wms_sync: WmsSyncConfig,

    /// Historical store housekeeping
    #[serde(default)]
    pub historical: HistoricalConfig,

    /// Route aggregation tuning
    #[serde(default)]
    pub route_statistics: RouteStatisticsConfig,

    /// WMS adapter endpoint
    #[serde(default)]
    pub wms: WmsEndpointConfig,

    /// Status API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Backtest report output
    #[serde(default)]
    pub reports: ReportsConfig,
}

impl WarehouseConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PALLETFLOW_CONFIG` environment variable
    /// 2. `./warehouse_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("PALLETFLOW_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded warehouse config from PALLETFLOW_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from PALLETFLOW_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "PALLETFLOW_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("warehouse_config.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded warehouse config from ./warehouse_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./warehouse_config.toml, using defaults");
                }
            }
        }

        info!("No warehouse_config.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check threshold ordering and loop cadences.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.buffer;
        if !(b.critical_threshold < b.low_threshold && b.low_threshold < b.high_threshold) {
            return Err(ConfigError::Invalid(format!(
                "buffer thresholds must satisfy critical < low < high (got {} / {} / {})",
                b.critical_threshold, b.low_threshold, b.high_threshold
            )));
        }
        if b.dead_band < 0.0 || b.dead_band >= (b.low_threshold - b.critical_threshold) {
            return Err(ConfigError::Invalid(format!(
                "dead_band {} must be non-negative and narrower than the critical..low gap",
                b.dead_band
            )));
        }
        if b.capacity == 0 {
            return Err(ConfigError::Invalid("buffer capacity must be > 0".into()));
        }
        if self.timing.realtime_cycle_ms == 0
            || self.timing.tactical_cycle_ms == 0
            || self.timing.historical_cycle_ms == 0
        {
            return Err(ConfigError::Invalid("loop cadences must be > 0 ms".into()));
        }
        if self.wave.light_below_kg >= self.wave.heavy_from_kg {
            return Err(ConfigError::Invalid(format!(
                "weight category thresholds must satisfy light < heavy (got {} / {})",
                self.wave.light_below_kg, self.wave.heavy_from_kg
            )));
        }
        Ok(())
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// Groups
// ============================================================================

/// Buffer FSM thresholds. Levels are fill fractions in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Fixed slot count of the buffer zone
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
    /// Below this the buffer is Low
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    /// Above this the buffer is Overflow
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    /// Below this the buffer is Critical
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,
    /// Symmetric hysteresis margin δ around each threshold
    #[serde(default = "default_dead_band")]
    pub dead_band: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_buffer_capacity(),
            low_threshold: default_low_threshold(),
            high_threshold: default_high_threshold(),
            critical_threshold: default_critical_threshold(),
            dead_band: default_dead_band(),
        }
    }
}

fn default_buffer_capacity() -> usize {
    50
}
fn default_low_threshold() -> f64 {
    0.3
}
fn default_high_threshold() -> f64 {
    0.7
}
fn default_critical_threshold() -> f64 {
    0.15
}
fn default_dead_band() -> f64 {
    0.05
}

/// Control loop cadences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_realtime_cycle_ms")]
    pub realtime_cycle_ms: u64,
    #[serde(default = "default_tactical_cycle_ms")]
    pub tactical_cycle_ms: u64,
    #[serde(default = "default_historical_cycle_ms")]
    pub historical_cycle_ms: u64,
    /// Cap on CreateDeliveryTask calls issued in one realtime cycle
    #[serde(default = "default_max_creates_per_cycle")]
    pub max_task_creates_per_cycle: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            realtime_cycle_ms: default_realtime_cycle_ms(),
            tactical_cycle_ms: default_tactical_cycle_ms(),
            historical_cycle_ms: default_historical_cycle_ms(),
            max_task_creates_per_cycle: default_max_creates_per_cycle(),
        }
    }
}

fn default_realtime_cycle_ms() -> u64 {
    200
}
fn default_tactical_cycle_ms() -> u64 {
    2_000
}
fn default_historical_cycle_ms() -> u64 {
    60_000
}
fn default_max_creates_per_cycle() -> usize {
    10
}

/// Wave sizing and weight-category thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveConfig {
    #[serde(default = "default_wave_duration_minutes")]
    pub duration_minutes: u64,
    #[serde(default = "default_safety_margin_seconds")]
    pub safety_margin_seconds: u64,
    #[serde(default = "default_max_pallets_per_wave")]
    pub max_pallets_per_wave: usize,
    /// Unit weight below this is Light (kg)
    #[serde(default = "default_light_below_kg")]
    pub light_below_kg: f64,
    /// Unit weight at or above this is Heavy (kg)
    #[serde(default = "default_heavy_from_kg")]
    pub heavy_from_kg: f64,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_wave_duration_minutes(),
            safety_margin_seconds: default_safety_margin_seconds(),
            max_pallets_per_wave: default_max_pallets_per_wave(),
            light_below_kg: default_light_below_kg(),
            heavy_from_kg: default_heavy_from_kg(),
        }
    }
}

fn default_wave_duration_minutes() -> u64 {
    60
}
fn default_safety_margin_seconds() -> u64 {
    300
}
fn default_max_pallets_per_wave() -> usize {
    40
}
fn default_light_below_kg() -> f64 {
    5.0
}
fn default_heavy_from_kg() -> f64 {
    20.0
}

/// Expected crew sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_forklifts_count")]
    pub forklifts_count: usize,
    #[serde(default = "default_pickers_count")]
    pub pickers_count: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            forklifts_count: default_forklifts_count(),
            pickers_count: default_pickers_count(),
        }
    }
}

fn default_forklifts_count() -> usize {
    3
}
fn default_pickers_count() -> usize {
    12
}

/// Assignment solver tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// λ weight on workload variance in the objective
    #[serde(default = "default_workload_balance_lambda")]
    pub workload_balance_lambda: f64,
    /// Hard wall-clock budget per solve (ms)
    #[serde(default = "default_max_solver_time_ms")]
    pub max_solver_time_ms: u64,
    #[serde(default = "default_warm_start_enabled")]
    pub warm_start_enabled: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            workload_balance_lambda: default_workload_balance_lambda(),
            max_solver_time_ms: default_max_solver_time_ms(),
            warm_start_enabled: default_warm_start_enabled(),
        }
    }
}

fn default_workload_balance_lambda() -> f64 {
    0.1
}
fn default_max_solver_time_ms() -> u64 {
    500
}
fn default_warm_start_enabled() -> bool {
    true
}

/// ρ warning bands for the M/M/c picker queue model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueingConfig {
    /// ρ above this is an overload warning
    #[serde(default = "default_overload_threshold")]
    pub overload_threshold: f64,
    /// ρ above this is critical
    #[serde(default = "default_queue_critical_threshold")]
    pub critical_threshold: f64,
}

impl Default for QueueingConfig {
    fn default() -> Self {
        Self {
            overload_threshold: default_overload_threshold(),
            critical_threshold: default_queue_critical_threshold(),
        }
    }
}

fn default_overload_threshold() -> f64 {
    0.8
}
fn default_queue_critical_threshold() -> f64 {
    0.95
}

/// WMS ingestion cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmsSyncConfig {
    #[serde(default = "default_tasks_sync_interval_ms")]
    pub tasks_sync_interval_ms: u64,
    #[serde(default = "default_pickers_sync_interval_ms")]
    pub pickers_sync_interval_ms: u64,
    #[serde(default = "default_forklifts_sync_interval_ms")]
    pub forklifts_sync_interval_ms: u64,
    #[serde(default = "default_buffer_sync_interval_ms")]
    pub buffer_sync_interval_ms: u64,
    #[serde(default = "default_aggregation_interval_ms")]
    pub aggregation_interval_ms: u64,
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,
}

impl Default for WmsSyncConfig {
    fn default() -> Self {
        Self {
            tasks_sync_interval_ms: default_tasks_sync_interval_ms(),
            pickers_sync_interval_ms: default_pickers_sync_interval_ms(),
            forklifts_sync_interval_ms: default_forklifts_sync_interval_ms(),
            buffer_sync_interval_ms: default_buffer_sync_interval_ms(),
            aggregation_interval_ms: default_aggregation_interval_ms(),
            enabled: default_sync_enabled(),
        }
    }
}

fn default_tasks_sync_interval_ms() -> u64 {
    5_000
}
fn default_pickers_sync_interval_ms() -> u64 {
    2_000
}
fn default_forklifts_sync_interval_ms() -> u64 {
    2_000
}
fn default_buffer_sync_interval_ms() -> u64 {
    1_000
}
fn default_aggregation_interval_ms() -> u64 {
    300_000
}
fn default_sync_enabled() -> bool {
    true
}

/// Historical store housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_chunk_interval_days")]
    pub chunk_interval_days: u32,
    #[serde(default = "default_compression_enabled")]
    pub compression_enabled: bool,
    #[serde(default = "default_compression_after_days")]
    pub compression_after_days: u32,
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            chunk_interval_days: default_chunk_interval_days(),
            compression_enabled: default_compression_enabled(),
            compression_after_days: default_compression_after_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    180
}
fn default_chunk_interval_days() -> u32 {
    7
}
fn default_compression_enabled() -> bool {
    true
}
fn default_compression_after_days() -> u32 {
    30
}

/// Route aggregation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStatisticsConfig {
    /// Multiplier on the IQR for the acceptance band
    #[serde(default = "default_iqr_trim_factor")]
    pub iqr_trim_factor: f64,
    /// Trips needed for full confidence (the K in min(1, trips/K))
    #[serde(default = "default_full_confidence_trips")]
    pub full_confidence_trips: u64,
    /// Routes with fewer trimmed trips than this are not published
    #[serde(default = "default_min_trips")]
    pub min_trips: u64,
}

impl Default for RouteStatisticsConfig {
    fn default() -> Self {
        Self {
            iqr_trim_factor: default_iqr_trim_factor(),
            full_confidence_trips: default_full_confidence_trips(),
            min_trips: default_min_trips(),
        }
    }
}

fn default_iqr_trim_factor() -> f64 {
    1.5
}
fn default_full_confidence_trips() -> u64 {
    20
}
fn default_min_trips() -> u64 {
    3
}

/// WMS adapter endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmsEndpointConfig {
    #[serde(default = "default_wms_base_url")]
    pub base_url: String,
    /// Bearer token; empty disables the Authorization header
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_wms_page_size")]
    pub page_size: usize,
    #[serde(default = "default_wms_timeout_secs")]
    pub timeout_secs: u64,
    /// Destination bin for buffer deliveries
    #[serde(default = "default_buffer_bin")]
    pub buffer_bin: String,
}

impl Default for WmsEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_wms_base_url(),
            api_key: String::new(),
            page_size: default_wms_page_size(),
            timeout_secs: default_wms_timeout_secs(),
            buffer_bin: default_buffer_bin(),
        }
    }
}

fn default_buffer_bin() -> String {
    "01B-01-001-01".to_string()
}

fn default_wms_base_url() -> String {
    "http://localhost:9000".to_string()
}
fn default_wms_page_size() -> usize {
    500
}
fn default_wms_timeout_secs() -> u64 {
    30
}

/// Status API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

fn default_server_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Backtest report output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_reports_dir")]
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: default_reports_dir(),
        }
    }
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("./reports")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        WarehouseConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn rejects_misordered_thresholds() {
        let mut config = WarehouseConfig::default();
        config.buffer.low_threshold = 0.8; // above high
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_wide_dead_band() {
        let mut config = WarehouseConfig::default();
        config.buffer.dead_band = 0.2; // wider than critical..low gap
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let toml = r#"
            [buffer]
            capacity = 80
            [optimization]
            max_solver_time_ms = 250
        "#;
        let config: WarehouseConfig = toml::from_str(toml).expect("parses");
        assert_eq!(config.buffer.capacity, 80);
        assert_eq!(config.optimization.max_solver_time_ms, 250);
        // untouched groups keep defaults
        assert_eq!(config.timing.realtime_cycle_ms, 200);
    }
}
