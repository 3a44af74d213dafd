//! Hysteresis controller — buffer level + consumption → delivery demand
//!
//! Converts the observed buffer operating point into the three numbers
//! the realtime loop acts on: required delivery rate, pallet deficit,
//! and recommended forklift count.

use crate::types::BufferZone;

use super::{BufferState, BufferStateMachine, StateChanged};

/// Per-state gain applied to the consumption rate when computing the
/// required delivery rate.
fn state_gain(state: BufferState) -> f64 {
    match state {
        BufferState::Critical => 3.0,
        BufferState::Low => 1.5,
        BufferState::Normal => 1.0,
        BufferState::Overflow => 0.5,
    }
}

/// Per-state floor on the pallet deficit request.
fn deficit_floor(state: BufferState) -> u32 {
    match state {
        BufferState::Critical => 5,
        BufferState::Low => 3,
        BufferState::Normal => 1,
        BufferState::Overflow => 0,
    }
}

/// Closed-loop controller over the buffer FSM.
#[derive(Debug, Clone)]
pub struct HysteresisController {
    fsm: BufferStateMachine,
    /// Midpoint of Tlow and Thigh, the level the controller steers toward
    target_level: f64,
    level: f64,
    capacity: usize,
    consumption_rate: f64,
}

impl HysteresisController {
    pub fn new(buffer: &crate::config::BufferConfig) -> Self {
        Self {
            fsm: BufferStateMachine::from_config(buffer),
            target_level: (buffer.low_threshold + buffer.high_threshold) / 2.0,
            level: 0.0,
            capacity: buffer.capacity,
            consumption_rate: 0.0,
        }
    }

    pub fn state(&self) -> BufferState {
        self.fsm.state()
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn target_level(&self) -> f64 {
        self.target_level
    }

    /// Feed the current buffer observation; returns the FSM transition
    /// if one fired.
    pub fn update(&mut self, buffer: &BufferZone, consumption_rate: f64) -> Option<StateChanged> {
        self.update_observation(buffer.fill_level(), buffer.capacity(), consumption_rate)
    }

    /// Same as [`update`](Self::update) for callers that observe the
    /// buffer remotely instead of owning the zone.
    pub fn update_observation(
        &mut self,
        level: f64,
        capacity: usize,
        consumption_rate: f64,
    ) -> Option<StateChanged> {
        self.level = level;
        self.capacity = capacity;
        self.consumption_rate = consumption_rate.max(0.0);
        self.fsm.update(self.level)
    }

    /// Required delivery rate (pallets/hour) to hold the target level.
    ///
    /// `consumption · gain(state) + (target − level) · consumption · 2`,
    /// floored at zero.
    pub fn required_delivery_rate(&self, consumption_rate: f64) -> f64 {
        let consumption = consumption_rate.max(0.0);
        let rate = consumption * state_gain(self.state())
            + (self.target_level - self.level) * consumption * 2.0;
        rate.max(0.0)
    }

    /// Pallet deficit: how many pallets to request right now.
    ///
    /// `(target − level) · capacity` with the per-state floor applied.
    pub fn pallets_to_request(&self) -> u32 {
        let deficit = ((self.target_level - self.level) * self.capacity as f64).ceil();
        let deficit = if deficit.is_sign_negative() { 0 } else { deficit as u32 };
        deficit.max(deficit_floor(self.state()))
    }

    /// Recommended forklift count out of `total`.
    pub fn recommended_forklift_count(&self, total: usize) -> usize {
        self.state().recommended_forklifts(total)
    }

    /// Whether the realtime loop should issue urgent delivery tasks.
    pub fn urgent_delivery_required(&self) -> bool {
        self.state() == BufferState::Critical
    }
}
