//! Historical layer: append-only action log, snapshot time-series and
//! the derived aggregate tables the predictor reads.

mod aggregates;
mod bin_code;
mod export;
mod repository;

pub use aggregates::{
    aggregate_picker_product, aggregate_routes, aggregate_workers_from_tasks,
    worker_transition_stats,
};
pub use bin_code::extract_zone;
pub use export::{export_training_rows, to_json_lines};
pub use repository::{BatchOutcome, HistoricalRepository, StoreError};
