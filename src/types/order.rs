//! Orders and waves

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One required product line of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_sku: String,
    pub quantity: u32,
}

/// Status of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum OrderStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::InProgress => write!(f, "IN_PROGRESS"),
            OrderStatus::Completed => write!(f, "COMPLETED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A customer order: the set of pallets required, via product lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub lines: Vec<OrderLine>,
    pub status: OrderStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub assigned_picker: Option<String>,
}

impl Order {
    pub fn new(id: impl Into<String>, lines: Vec<OrderLine>) -> Self {
        Self {
            id: id.into(),
            lines,
            status: OrderStatus::Pending,
            deadline: None,
            assigned_picker: None,
        }
    }
}

/// Status of a wave. Monotone: a wave never regresses from Completed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum WaveStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl std::fmt::Display for WaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaveStatus::Pending => write!(f, "PENDING"),
            WaveStatus::InProgress => write!(f, "IN_PROGRESS"),
            WaveStatus::Completed => write!(f, "COMPLETED"),
            WaveStatus::Overdue => write!(f, "OVERDUE"),
        }
    }
}

/// A batch of orders scheduled to start together within a deadline window.
///
/// One stream is derived per order; the wave transitions to Completed
/// only when every stream is Completed, and to Overdue iff the deadline
/// passes before completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    pub sequence_number: u64,
    pub orders: Vec<Order>,
    /// Ids of the streams derived from this wave's orders
    pub stream_ids: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: WaveStatus,
}

impl Wave {
    /// Apply a status transition, honoring monotonicity.
    ///
    /// Returns `true` if the status changed.
    pub fn transition(&mut self, to: WaveStatus) -> bool {
        if self.status == WaveStatus::Completed || self.status == to {
            return false;
        }
        self.status = to;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wave_never_regresses_from_completed() {
        let mut wave = Wave {
            sequence_number: 1,
            orders: Vec::new(),
            stream_ids: Vec::new(),
            start_time: Utc::now(),
            deadline: Utc::now(),
            status: WaveStatus::Completed,
        };
        assert!(!wave.transition(WaveStatus::InProgress));
        assert!(!wave.transition(WaveStatus::Overdue));
        assert_eq!(wave.status, WaveStatus::Completed);
    }
}
