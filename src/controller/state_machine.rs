//! Buffer state machine with dead-band hysteresis
//!
//! Four states driven by fill-level thresholds `Tcrit < Tlow < Thigh`
//! with a dead-band δ. Downward transitions (Low, Critical) fire at the
//! raw threshold so the controller reacts to a draining buffer without
//! lag; the recovery paths require clearing the threshold by δ, and the
//! Overflow entry requires exceeding `Thigh + δ`. Each side of every
//! threshold therefore carries a band at least δ wide, which is what
//! keeps an oscillating level from chattering between states.

use serde::{Deserialize, Serialize};

/// Operating state of the buffer zone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum BufferState {
    #[default]
    Normal,
    Low,
    Critical,
    Overflow,
}

impl BufferState {
    /// Recommended number of active forklifts for this state.
    pub fn recommended_forklifts(self, total: usize) -> usize {
        match self {
            BufferState::Critical => total,
            BufferState::Low => total.saturating_sub(1).max(2).min(total),
            BufferState::Normal => (total / 2).max(1),
            BufferState::Overflow => 1,
        }
    }

    /// Delivery priority attached to tasks created in this state.
    pub fn delivery_priority(self) -> u32 {
        match self {
            BufferState::Critical => 100,
            BufferState::Low => 75,
            BufferState::Normal => 50,
            BufferState::Overflow => 10,
        }
    }
}

impl std::fmt::Display for BufferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferState::Normal => write!(f, "NORMAL"),
            BufferState::Low => write!(f, "LOW"),
            BufferState::Critical => write!(f, "CRITICAL"),
            BufferState::Overflow => write!(f, "OVERFLOW"),
        }
    }
}

/// Signal emitted on every state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChanged {
    pub prev: BufferState,
    pub new: BufferState,
}

/// The buffer FSM. Pure state; `update` is the only mutator.
#[derive(Debug, Clone)]
pub struct BufferStateMachine {
    state: BufferState,
    critical_threshold: f64,
    low_threshold: f64,
    high_threshold: f64,
    dead_band: f64,
}

impl BufferStateMachine {
    pub fn new(
        critical_threshold: f64,
        low_threshold: f64,
        high_threshold: f64,
        dead_band: f64,
    ) -> Self {
        Self {
            state: BufferState::Normal,
            critical_threshold,
            low_threshold,
            high_threshold,
            dead_band,
        }
    }

    /// Build from the configured buffer group.
    pub fn from_config(buffer: &crate::config::BufferConfig) -> Self {
        Self::new(
            buffer.critical_threshold,
            buffer.low_threshold,
            buffer.high_threshold,
            buffer.dead_band,
        )
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Feed the current fill level; returns the transition if one fired.
    pub fn update(&mut self, level: f64) -> Option<StateChanged> {
        let next = self.next_state(level);
        if next == self.state {
            return None;
        }
        let change = StateChanged {
            prev: self.state,
            new: next,
        };
        self.state = next;
        Some(change)
    }

    fn next_state(&self, level: f64) -> BufferState {
        // Critical pre-empts everything.
        if level < self.critical_threshold {
            return BufferState::Critical;
        }
        match self.state {
            BufferState::Normal => {
                if level < self.low_threshold {
                    BufferState::Low
                } else if level > self.high_threshold + self.dead_band {
                    BufferState::Overflow
                } else {
                    BufferState::Normal
                }
            }
            BufferState::Low => {
                if level > self.low_threshold + self.dead_band {
                    BufferState::Normal
                } else {
                    BufferState::Low
                }
            }
            BufferState::Critical => {
                if level > self.critical_threshold + self.dead_band {
                    BufferState::Low
                } else {
                    BufferState::Critical
                }
            }
            BufferState::Overflow => {
                if level < self.high_threshold {
                    BufferState::Normal
                } else {
                    BufferState::Overflow
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_fsm() -> BufferStateMachine {
        // Capacity 50 reference tuning: Tcrit 0.15, Tlow 0.3, Thigh 0.7, δ 0.05
        BufferStateMachine::new(0.15, 0.3, 0.7, 0.05)
    }

    #[test]
    fn reference_level_sequence_walks_expected_path() {
        let mut fsm = make_fsm();
        let feed = [0.60, 0.45, 0.28, 0.33, 0.36, 0.76, 0.66, 0.10, 0.21];
        let expected = [
            BufferState::Normal,
            BufferState::Normal,
            BufferState::Low,
            BufferState::Low,
            BufferState::Normal,
            BufferState::Overflow,
            BufferState::Normal,
            BufferState::Critical,
            BufferState::Low,
        ];
        for (level, want) in feed.iter().zip(expected.iter()) {
            fsm.update(*level);
            assert_eq!(fsm.state(), *want, "level {level}");
        }
    }

    #[test]
    fn oscillation_inside_dead_band_does_not_chatter() {
        // Settle into Low, then oscillate just above Tlow but under Tlow+δ.
        let mut fsm = make_fsm();
        fsm.update(0.28);
        assert_eq!(fsm.state(), BufferState::Low);
        for level in [0.31, 0.34, 0.32, 0.34, 0.31] {
            assert!(fsm.update(level).is_none(), "chatter at {level}");
        }
        assert_eq!(fsm.state(), BufferState::Low);
    }

    #[test]
    fn overflow_entry_requires_clearing_the_dead_band() {
        let mut fsm = make_fsm();
        // Oscillation within δ of Thigh never enters Overflow.
        for level in [0.68, 0.72, 0.69, 0.74, 0.71] {
            assert!(fsm.update(level).is_none(), "chatter at {level}");
        }
        assert_eq!(fsm.state(), BufferState::Normal);
        // Clearing Thigh + δ does.
        let change = fsm.update(0.76).expect("transition");
        assert_eq!(change.new, BufferState::Overflow);
    }

    #[test]
    fn critical_preempts_from_any_state() {
        let mut fsm = make_fsm();
        fsm.update(0.76);
        assert_eq!(fsm.state(), BufferState::Overflow);
        let change = fsm.update(0.05).expect("transition");
        assert_eq!(change, StateChanged { prev: BufferState::Overflow, new: BufferState::Critical });
    }

    #[test]
    fn crew_and_priority_mappings() {
        assert_eq!(BufferState::Critical.recommended_forklifts(5), 5);
        assert_eq!(BufferState::Low.recommended_forklifts(5), 4);
        assert_eq!(BufferState::Low.recommended_forklifts(2), 2);
        assert_eq!(BufferState::Normal.recommended_forklifts(5), 2);
        assert_eq!(BufferState::Normal.recommended_forklifts(1), 1);
        assert_eq!(BufferState::Overflow.recommended_forklifts(5), 1);

        assert_eq!(BufferState::Critical.delivery_priority(), 100);
        assert_eq!(BufferState::Low.delivery_priority(), 75);
        assert_eq!(BufferState::Normal.delivery_priority(), 50);
        assert_eq!(BufferState::Overflow.delivery_priority(), 10);
    }
}
