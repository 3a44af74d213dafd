//! Fixed engine constants that are not operator-tunable

/// High-consumption probe threshold for the rule engine (pallets/hour).
pub const HIGH_CONSUMPTION_PALLETS_PER_HOUR: f64 = 150.0;

/// Fill level below which the high-consumption probe fires.
pub const HIGH_CONSUMPTION_LEVEL_CEILING: f64 = 0.5;

/// Urgent delivery pallet request floor in the Critical rule.
pub const CRITICAL_PALLET_REQUEST: u32 = 10;

/// Transition gaps outside (0, this] are discarded when computing
/// worker transition medians (seconds).
pub const MAX_TRANSITION_GAP_SECONDS: f64 = 600.0;

/// Average walking/driving speed assumed for wave lead-time estimates (m/s).
pub const WAVE_AVG_SPEED_M_PER_S: f64 = 1.5;

/// Snapshot history window the demand-pattern bucketing reads (days).
pub const DEMAND_PATTERN_WINDOW_DAYS: i64 = 28;

/// Minimum confidence a route statistic needs before the predictor
/// serves it instead of cascading further.
pub const ROUTE_CONFIDENCE_FLOOR: f64 = 0.3;

/// Global fallback task duration when no historical signal exists (seconds).
pub const GLOBAL_MEAN_TASK_SECONDS: f64 = 180.0;
