//! PalletFlow: Warehouse Buffer-Flow Intelligence
//!
//! Closed-loop scheduling engine for a three-stage material flow
//! (storage → buffer → packing).
//!
//! ## Architecture
//!
//! - **Controller**: hysteresis state machine keeping the buffer in its
//!   safe operating band
//! - **Dispatcher**: single-flight stream executor with heavy-on-bottom
//!   task ordering
//! - **Optimizer**: constrained task×forklift assignment with stream,
//!   weight and deadline precedence
//! - **Historical layer**: append-only action log, aggregates, and the
//!   duration-prediction cascade they feed
//! - **Backtest engine**: counterfactual replay of historical waves

pub mod aggregation;
pub mod api;
pub mod backtest;
pub mod config;
pub mod control;
pub mod controller;
pub mod dispatch;
pub mod historical;
pub mod optimizer;
pub mod predictor;
pub mod queueing;
pub mod rules;
pub mod types;
pub mod waves;
pub mod wms;

// Re-export the configuration root
pub use config::WarehouseConfig;

// Re-export commonly used domain types
pub use types::{
    BufferSnapshot, BufferZone, DeliveryTask, Forklift, ForkliftState, Order, OrderLine, Pallet,
    Picker, Product, StorageZone, TaskActionRecord, TaskStatus, TaskStream, Wave, WaveStatus,
    WeightCategory, WorkerRole,
};

// Re-export the control-loop surfaces
pub use control::{ControlService, EventBus, ObservabilityFacade};
pub use controller::{BufferState, BufferStateMachine, HysteresisController};
pub use dispatch::Dispatcher;

// Re-export the historical stack
pub use historical::{HistoricalRepository, StoreError};
pub use predictor::{DurationPredictor, Prediction, PredictionSource};
