//! Warehouse Configuration Module
//!
//! Provides deployment configuration loaded from TOML files, replacing
//! hardcoded control thresholds with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `PALLETFLOW_CONFIG` environment variable (path to TOML file)
//! 2. `warehouse_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(WarehouseConfig::load());
//!
//! // Anywhere in the codebase:
//! let dead_band = config::get().buffer.dead_band;
//! ```

pub mod defaults;
mod warehouse_config;

pub use warehouse_config::*;

use std::sync::OnceLock;

/// Global warehouse configuration, initialized once at startup.
static WAREHOUSE_CONFIG: OnceLock<WarehouseConfig> = OnceLock::new();

/// Initialize the global warehouse configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: WarehouseConfig) {
    if WAREHOUSE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global warehouse configuration.
///
/// Falls back to built-in defaults when `init()` has not been called,
/// which keeps library consumers and tests decoupled from startup order.
pub fn get() -> &'static WarehouseConfig {
    WAREHOUSE_CONFIG.get_or_init(WarehouseConfig::default)
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    WAREHOUSE_CONFIG.get().is_some()
}
