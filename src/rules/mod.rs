//! Declarative rule engine over buffer and forklift facts
//!
//! A minimal pattern-matching loop: facts in, prioritized
//! recommendations out. The rule set is closed and static, and the
//! engine is stateless between evaluations: every cycle starts from a
//! fresh fact base, nothing is retained.

use serde::Serialize;

use crate::config::defaults::{
    CRITICAL_PALLET_REQUEST, HIGH_CONSUMPTION_LEVEL_CEILING, HIGH_CONSUMPTION_PALLETS_PER_HOUR,
};
use crate::controller::BufferState;
use crate::types::ForkliftState;

// ============================================================================
// Facts
// ============================================================================

/// Current buffer observation asserted each cycle.
#[derive(Debug, Clone, Copy)]
pub struct BufferFact {
    pub fill_level: f64,
    pub state: BufferState,
    pub pending_tasks: usize,
    pub idle_forklifts: usize,
    /// Pallets consumed per hour
    pub consumption_rate: f64,
}

/// Per-forklift observation asserted each cycle.
#[derive(Debug, Clone)]
pub struct ForkliftFact {
    pub id: String,
    pub state: ForkliftState,
}

impl ForkliftFact {
    fn is_idle(&self) -> bool {
        self.state == ForkliftState::Idle
    }

    fn is_online(&self) -> bool {
        self.state != ForkliftState::Offline
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Kind of recommendation a rule can emit.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ActionType {
    UrgentDelivery,
    RequestPallets,
    ActivateForklifts,
    DeactivateForklifts,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::UrgentDelivery => write!(f, "URGENT_DELIVERY"),
            ActionType::RequestPallets => write!(f, "REQUEST_PALLETS"),
            ActionType::ActivateForklifts => write!(f, "ACTIVATE_FORKLIFTS"),
            ActionType::DeactivateForklifts => write!(f, "DEACTIVATE_FORKLIFTS"),
        }
    }
}

/// A prioritized recommendation. Consumed in strict priority order;
/// ties break on insertion order.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendedAction {
    pub action: ActionType,
    pub priority: u32,
    pub reason: String,
    /// Pallets to request, when the action moves stock
    pub pallets: Option<u32>,
    /// Forklifts to activate (or keep, for deactivation)
    pub forklift_ids: Vec<String>,
}

// ============================================================================
// Engine
// ============================================================================

/// Stateless rule evaluator.
pub struct RuleEngine;

impl RuleEngine {
    /// Evaluate the closed rule set against the given facts.
    ///
    /// Returns recommendations sorted by descending priority, stable on
    /// insertion order for ties.
    pub fn evaluate(buffer: &BufferFact, forklifts: &[ForkliftFact]) -> Vec<RecommendedAction> {
        let mut actions = Vec::new();

        let idle: Vec<String> = forklifts
            .iter()
            .filter(|f| f.is_idle())
            .map(|f| f.id.clone())
            .collect();
        let online: Vec<String> = forklifts
            .iter()
            .filter(|f| f.is_online())
            .map(|f| f.id.clone())
            .collect();

        // Critical: everything to the buffer, now.
        if buffer.state == BufferState::Critical {
            actions.push(RecommendedAction {
                action: ActionType::UrgentDelivery,
                priority: 100,
                reason: format!(
                    "buffer critical at {:.0}% fill, {} tasks pending",
                    buffer.fill_level * 100.0,
                    buffer.pending_tasks
                ),
                pallets: Some(CRITICAL_PALLET_REQUEST),
                forklift_ids: online,
            });
        } else if buffer.state == BufferState::Low && buffer.idle_forklifts > 0 {
            // Low with idle capacity: request ahead of the drain.
            let request = (2 * buffer.idle_forklifts as u32).max(3);
            actions.push(RecommendedAction {
                action: ActionType::RequestPallets,
                priority: 75,
                reason: format!(
                    "buffer low at {:.0}% fill with {} idle forklifts",
                    buffer.fill_level * 100.0,
                    buffer.idle_forklifts
                ),
                pallets: Some(request),
                forklift_ids: idle,
            });
        }

        // High-consumption probe: normal state but draining fast below midline.
        if buffer.state == BufferState::Normal
            && buffer.consumption_rate > HIGH_CONSUMPTION_PALLETS_PER_HOUR
            && buffer.fill_level < HIGH_CONSUMPTION_LEVEL_CEILING
        {
            actions.push(RecommendedAction {
                action: ActionType::RequestPallets,
                priority: 60,
                reason: format!(
                    "consumption {:.0} pal/h above probe threshold at {:.0}% fill",
                    buffer.consumption_rate,
                    buffer.fill_level * 100.0
                ),
                pallets: Some(5),
                forklift_ids: Vec::new(),
            });
        }

        // Overflow: wind the crew down to one.
        if buffer.state == BufferState::Overflow {
            let keep = forklifts
                .iter()
                .find(|f| f.is_online())
                .map(|f| f.id.clone())
                .into_iter()
                .collect();
            actions.push(RecommendedAction {
                action: ActionType::DeactivateForklifts,
                priority: 50,
                reason: format!("buffer overflow at {:.0}% fill", buffer.fill_level * 100.0),
                pallets: None,
                forklift_ids: keep,
            });
        }

        // Strict priority order, insertion-stable on ties.
        actions.sort_by(|a, b| b.priority.cmp(&a.priority));
        actions
    }
}
