//! Wave manager — batches orders into waves and derives their streams
//!
//! One stream per order, tasks inside sorted by descending pallet
//! weight at creation (heavy-on-bottom). Wave status transitions are
//! monotone: Completed is terminal.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::config::defaults::WAVE_AVG_SPEED_M_PER_S;
use crate::config::WaveConfig;
use crate::types::{
    DeliveryTask, Forklift, Order, OrderStatus, StorageZone, StreamStatus, TaskStream, Wave,
    WaveStatus,
};

/// Wave construction errors.
#[derive(Debug, thiserror::Error)]
pub enum WaveError {
    #[error("wave {0} not found")]
    NotFound(u64),
    #[error("no orders supplied")]
    EmptyOrderSet,
}

/// A freshly created wave plus the streams to hand to the dispatcher.
#[derive(Debug)]
pub struct WaveBuild {
    pub wave: Wave,
    pub streams: Vec<(TaskStream, Vec<DeliveryTask>)>,
    /// Pallets that could not be sourced, by order id
    pub unfilled: HashMap<String, u32>,
}

/// Creates waves, tracks their deadlines and status transitions.
pub struct WaveManager {
    config: WaveConfig,
    waves: BTreeMap<u64, Wave>,
    /// Longest storage distance among a wave's pallets, for lead time
    wave_max_distance_m: HashMap<u64, f64>,
    next_wave_seq: u64,
    next_stream_seq: u64,
}

impl WaveManager {
    pub fn new(config: WaveConfig) -> Self {
        Self {
            config,
            waves: BTreeMap::new(),
            wave_max_distance_m: HashMap::new(),
            next_wave_seq: 1,
            next_stream_seq: 0,
        }
    }

    /// Create a wave from a batch of orders, sourcing pallets from storage.
    ///
    /// Allocates one stream per order; within each stream tasks are
    /// sorted by descending pallet weight and the in-stream sequence is
    /// fixed from that order. Pallet allocation stops at
    /// `max_pallets_per_wave`; unsourceable lines are reported, not fatal.
    pub fn create_wave(
        &mut self,
        orders: Vec<Order>,
        available: &StorageZone,
        now: DateTime<Utc>,
    ) -> Result<WaveBuild, WaveError> {
        if orders.is_empty() {
            return Err(WaveError::EmptyOrderSet);
        }

        let wave_seq = self.next_wave_seq;
        self.next_wave_seq += 1;

        // Index free pallets by SKU; each pallet is used at most once.
        let mut by_sku: HashMap<&str, Vec<&crate::types::Pallet>> = HashMap::new();
        for pallet in available.iter() {
            by_sku.entry(pallet.product.sku.as_str()).or_default().push(pallet);
        }
        for pallets in by_sku.values_mut() {
            // Stable source order: nearest pallets first (taken from the tail).
            pallets.sort_by(|a, b| {
                b.storage_distance_m
                    .partial_cmp(&a.storage_distance_m)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let mut streams = Vec::with_capacity(orders.len());
        let mut stream_ids = Vec::with_capacity(orders.len());
        let mut unfilled = HashMap::new();
        let mut pallets_allocated = 0usize;
        let mut max_distance: f64 = 0.0;

        for order in &orders {
            let stream_seq = self.next_stream_seq;
            self.next_stream_seq += 1;
            let stream_id = format!("wave{wave_seq}-order-{}", order.id);
            let stream = TaskStream::new(&stream_id, format!("order {}", order.id), stream_seq);

            let mut tasks = Vec::new();
            for line in &order.lines {
                let mut remaining = line.quantity;
                let mut pool = by_sku.get_mut(line.product_sku.as_str());
                while remaining > 0 {
                    if pallets_allocated >= self.config.max_pallets_per_wave {
                        warn!(wave = wave_seq, "max_pallets_per_wave reached, truncating");
                        break;
                    }
                    let Some(pallet) = pool.as_mut().and_then(|p| p.pop()) else {
                        break;
                    };
                    max_distance = max_distance.max(pallet.storage_distance_m);
                    pallets_allocated += 1;
                    remaining = remaining.saturating_sub(pallet.quantity);
                    let task_id = format!("{stream_id}-t{}", tasks.len());
                    tasks.push(DeliveryTask::new(task_id, &pallet.id, pallet.total_weight()));
                }
                if remaining > 0 {
                    *unfilled.entry(order.id.clone()).or_insert(0) += remaining;
                }
            }

            // Heavy-on-bottom: fix the in-stream order now.
            tasks.sort_by(|a, b| {
                b.weight_kg
                    .partial_cmp(&a.weight_kg)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for (position, task) in tasks.iter_mut().enumerate() {
                task.sequence_in_stream = Some(position as u32);
                task.stream_id = Some(stream_id.clone());
            }

            stream_ids.push(stream_id);
            streams.push((stream, tasks));
        }

        let deadline = now + Duration::minutes(self.config.duration_minutes as i64);
        let wave = Wave {
            sequence_number: wave_seq,
            orders,
            stream_ids,
            start_time: now,
            deadline,
            status: WaveStatus::Pending,
        };
        self.wave_max_distance_m.insert(wave_seq, max_distance);
        self.waves.insert(wave_seq, wave.clone());
        info!(
            wave = wave_seq,
            streams = streams.len(),
            pallets = pallets_allocated,
            "Wave created"
        );

        Ok(WaveBuild {
            wave,
            streams,
            unfilled,
        })
    }

    /// Lowest-sequence wave still Pending.
    pub fn next_pending_wave(&self) -> Option<&Wave> {
        self.waves
            .values()
            .find(|w| w.status == WaveStatus::Pending)
    }

    /// Mark a wave started.
    pub fn start(&mut self, sequence_number: u64, now: DateTime<Utc>) -> Result<(), WaveError> {
        let wave = self
            .waves
            .get_mut(&sequence_number)
            .ok_or(WaveError::NotFound(sequence_number))?;
        if wave.transition(WaveStatus::InProgress) {
            wave.start_time = now;
            for order in &mut wave.orders {
                if order.status == OrderStatus::Pending {
                    order.status = OrderStatus::InProgress;
                }
            }
            info!(wave = sequence_number, "Wave started");
        }
        Ok(())
    }

    /// Re-derive wave statuses from stream completion and the clock.
    ///
    /// A wave completes only when every derived stream is Completed; it
    /// becomes Overdue iff the deadline passes first.
    pub fn update_statuses(
        &mut self,
        now: DateTime<Utc>,
        stream_status: impl Fn(&str) -> Option<StreamStatus>,
    ) {
        for wave in self.waves.values_mut() {
            if wave.status == WaveStatus::Completed {
                continue;
            }
            let all_done = !wave.stream_ids.is_empty()
                && wave
                    .stream_ids
                    .iter()
                    .all(|id| stream_status(id) == Some(StreamStatus::Completed));
            if all_done {
                if wave.transition(WaveStatus::Completed) {
                    for order in &mut wave.orders {
                        order.status = OrderStatus::Completed;
                    }
                    info!(wave = wave.sequence_number, "Wave completed");
                }
            } else if now > wave.deadline {
                if wave.transition(WaveStatus::Overdue) {
                    warn!(wave = wave.sequence_number, "Wave overdue");
                }
            }
        }
    }

    /// Estimated lead time for a wave (seconds):
    /// `max_distance / avg_speed + safety_margin`.
    pub fn lead_time(&self, sequence_number: u64, forklifts: &[Forklift]) -> Result<f64, WaveError> {
        let max_distance = self
            .wave_max_distance_m
            .get(&sequence_number)
            .ok_or(WaveError::NotFound(sequence_number))?;
        let avg_speed = if forklifts.is_empty() {
            WAVE_AVG_SPEED_M_PER_S
        } else {
            forklifts.iter().map(|f| f.speed_m_per_s).sum::<f64>() / forklifts.len() as f64
        };
        Ok(max_distance / avg_speed.max(0.1) + self.config.safety_margin_seconds as f64)
    }

    pub fn get(&self, sequence_number: u64) -> Option<&Wave> {
        self.waves.get(&sequence_number)
    }

    pub fn waves(&self) -> impl Iterator<Item = &Wave> {
        self.waves.values()
    }
}
