//! Shared data structures for the buffer-flow scheduling engine
//!
//! This module defines the core types of the material-flow pipeline:
//! - Products, pallets and the buffer/storage zones they move through
//! - Forklifts and pickers (the two worker pools)
//! - Delivery tasks, task streams, orders and waves
//! - Buffer snapshots and the historical action log with its aggregates

mod historical;
mod order;
mod pallet;
mod product;
mod task;
mod workers;
mod zones;

pub use historical::{
    ActionStatus, PickerProductStats, RouteStatistics, TaskActionRecord, TrainingRow,
    WorkerRecord, WorkerRole, WorkerTransitionStats,
};
pub use order::{Order, OrderLine, OrderStatus, Wave, WaveStatus};
pub use pallet::{Pallet, PalletLocation};
pub use product::{Product, WeightCategory};
pub use task::{DeliveryTask, StreamStatus, TaskStatus, TaskStream};
pub use workers::{Forklift, ForkliftState, Picker, PickerState};
pub use zones::{BufferSnapshot, BufferZone, StorageZone, ZoneError};
