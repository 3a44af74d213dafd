//! Stream queue and single-flight dispatcher
//!
//! Streams execute strictly in `sequence_number` order, one at a time.
//! Within the in-progress stream, pending tasks are handed to idle
//! forklifts in descending-weight order (heavy-on-bottom), re-derived
//! on every call rather than trusted from insertion order.
//!
//! All state transitions go through a single mutex; the arena holds
//! tasks and streams by id so nothing owns anything else (tasks carry
//! `stream_id`, forklifts and tasks carry weak back-references).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::types::{
    DeliveryTask, Forklift, ForkliftState, StorageZone, StreamStatus, TaskStatus, TaskStream,
};

// ============================================================================
// Outputs
// ============================================================================

/// One task→forklift binding produced by a dispatch pass.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub task_id: String,
    pub forklift_id: String,
    pub estimated_completion: Option<DateTime<Utc>>,
}

/// Emitted when the dispatcher retires a finished stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamCompleted {
    pub stream_id: String,
    pub sequence_number: u64,
}

/// Counters exposed through the observability facade.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatcherStats {
    pub queued_streams: usize,
    pub completed_streams: u64,
    pub pending_tasks: usize,
    pub active_tasks: usize,
    pub completed_tasks: u64,
    pub current_stream: Option<String>,
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Debug, Default)]
struct DispatcherInner {
    tasks: HashMap<String, DeliveryTask>,
    streams: HashMap<String, TaskStream>,
    /// Pending streams keyed by sequence number (strict total order)
    queue: BTreeMap<u64, String>,
    current_stream: Option<String>,
    /// Optimizer hints: task id → preferred forklift
    preferred_forklift: HashMap<String, String>,
    next_sequence: u64,
    completed_streams: u64,
    completed_tasks: u64,
}

/// Single-flight stream executor.
pub struct Dispatcher {
    inner: Mutex<DispatcherInner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DispatcherInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DispatcherInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Enqueue a stream with its tasks.
    ///
    /// Sequence numbers must stay monotonic under concurrent enqueue: a
    /// stream arriving with a stale or colliding sequence number (or
    /// the `u64::MAX` auto-assign sentinel) is re-sequenced behind
    /// everything already queued. Returns the effective sequence number.
    pub fn enqueue_stream(&self, mut stream: TaskStream, tasks: Vec<DeliveryTask>) -> u64 {
        let mut inner = self.lock();
        if stream.sequence_number == u64::MAX
            || stream.sequence_number < inner.next_sequence
            || inner.queue.contains_key(&stream.sequence_number)
        {
            stream.sequence_number = inner.next_sequence;
        }
        inner.next_sequence = stream.sequence_number.saturating_add(1);

        stream.task_ids = tasks.iter().map(|t| t.id.clone()).collect();
        for (position, mut task) in tasks.into_iter().enumerate() {
            task.stream_id = Some(stream.id.clone());
            task.sequence_in_stream = Some(position as u32);
            inner.tasks.insert(task.id.clone(), task);
        }
        let seq = stream.sequence_number;
        debug!(stream = %stream.id, seq, tasks = stream.task_ids.len(), "Stream enqueued");
        inner.queue.insert(seq, stream.id.clone());
        inner.streams.insert(stream.id.clone(), stream);
        seq
    }

    /// Enqueue a single ad-hoc task, wrapped in a singleton stream.
    pub fn enqueue_task(&self, task: DeliveryTask) -> u64 {
        let stream_id = format!("adhoc-{}", task.id);
        let stream = TaskStream::new(&stream_id, format!("ad-hoc {}", task.id), u64::MAX);
        self.enqueue_stream(stream, vec![task])
    }

    /// Record optimizer assignment hints for upcoming dispatch passes.
    pub fn reconcile_hints(&self, hints: impl IntoIterator<Item = (String, String)>) {
        let mut inner = self.lock();
        inner.preferred_forklift.clear();
        inner.preferred_forklift.extend(hints);
    }

    /// One cooperative dispatch pass.
    ///
    /// 1. Retire the current stream when every task in it is closed,
    ///    then promote the lowest-sequence pending stream.
    /// 2. While the current stream has a pending task and an idle
    ///    forklift remains, bind the heaviest pending task to it.
    pub fn dispatch(
        &self,
        forklifts: &mut [Forklift],
        storage: &StorageZone,
        now: DateTime<Utc>,
    ) -> (Vec<Assignment>, Vec<StreamCompleted>) {
        let mut inner = self.lock();
        let mut assignments = Vec::new();
        let mut completed = Vec::new();

        loop {
            if let Some(event) = Self::rotate_current(&mut inner, now) {
                completed.push(event);
            }
            let Some(current_id) = inner.current_stream.clone() else {
                break;
            };

            let Some(task_id) = Self::next_pending_task(&inner, &current_id) else {
                // Nothing pending: either all handed out (wait for
                // completions) or the stream just drained (retire next pass).
                if Self::stream_is_drained(&inner, &current_id) {
                    continue;
                }
                break;
            };

            let preferred = inner.preferred_forklift.get(&task_id).cloned();
            let Some(slot) = Self::pick_forklift(forklifts, preferred.as_deref()) else {
                break;
            };

            let pallet_id = match inner.tasks.get(&task_id) {
                Some(task) => task.pallet_id.clone(),
                None => break,
            };
            let estimate = storage
                .get(&pallet_id)
                .map(|pallet| forklifts[slot].estimate_delivery_time(pallet));

            let forklift_id = forklifts[slot].id.clone();
            let estimated_completion = estimate
                .map(|secs| now + chrono::Duration::milliseconds((secs * 1000.0) as i64));
            if let Some(task) = inner.tasks.get_mut(&task_id) {
                task.status = TaskStatus::Assigned;
                task.assigned_forklift = Some(forklift_id.clone());
                task.started_at = Some(now);
                task.estimated_completion = estimated_completion;
            }
            forklifts[slot].state = ForkliftState::MovingToPallet;
            forklifts[slot].current_task_id = Some(task_id.clone());

            debug!(task = %task_id, forklift = %forklift_id, "Task assigned");
            assignments.push(Assignment {
                task_id,
                forklift_id,
                estimated_completion,
            });
        }

        (assignments, completed)
    }

    /// Mark a task completed and release its forklift binding.
    ///
    /// Returns the stream-completion event when this was the stream's
    /// last open task.
    pub fn complete_task(
        &self,
        task_id: &str,
        forklift: &mut Forklift,
        now: DateTime<Utc>,
    ) -> Option<StreamCompleted> {
        let mut inner = self.lock();
        let stream_id = {
            let task = inner.tasks.get_mut(task_id)?;
            task.status = TaskStatus::Completed;
            task.completed_at = Some(now);
            task.assigned_forklift = None;
            task.stream_id.clone()
        };
        inner.completed_tasks += 1;
        inner.preferred_forklift.remove(task_id);

        if forklift.current_task_id.as_deref() == Some(task_id) {
            forklift.current_task_id = None;
            forklift.state = ForkliftState::Idle;
        }

        let stream_id = stream_id?;
        if Self::stream_is_drained(&inner, &stream_id) {
            Self::finish_stream(&mut inner, &stream_id, now)
        } else {
            None
        }
    }

    /// Cancel an open task (e.g. its pallet disappeared upstream).
    pub fn cancel_task(&self, task_id: &str, now: DateTime<Utc>) -> Option<StreamCompleted> {
        let mut inner = self.lock();
        let stream_id = {
            let task = inner.tasks.get_mut(task_id)?;
            if !task.status.is_open() {
                return None;
            }
            task.status = TaskStatus::Cancelled;
            task.completed_at = Some(now);
            task.assigned_forklift = None;
            task.stream_id.clone()
        }?;
        if Self::stream_is_drained(&inner, &stream_id) {
            Self::finish_stream(&mut inner, &stream_id, now)
        } else {
            None
        }
    }

    /// Status of a stream, if known.
    pub fn stream_status(&self, stream_id: &str) -> Option<StreamStatus> {
        self.lock().streams.get(stream_id).map(|s| s.status)
    }

    /// Snapshot of the pending task set for the tactical optimizer.
    pub fn pending_tasks(&self) -> Vec<DeliveryTask> {
        let inner = self.lock();
        let mut tasks: Vec<DeliveryTask> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    /// Stream sequence number lookup for the optimizer's precedence graph.
    pub fn stream_sequence(&self, stream_id: &str) -> Option<u64> {
        self.lock().streams.get(stream_id).map(|s| s.sequence_number)
    }

    pub fn stats(&self) -> DispatcherStats {
        let inner = self.lock();
        DispatcherStats {
            queued_streams: inner.queue.len(),
            completed_streams: inner.completed_streams,
            pending_tasks: inner
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::Pending)
                .count(),
            active_tasks: inner
                .tasks
                .values()
                .filter(|t| matches!(t.status, TaskStatus::Assigned | TaskStatus::InProgress))
                .count(),
            completed_tasks: inner.completed_tasks,
            current_stream: inner.current_stream.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Internals (inner lock already held)
    // ------------------------------------------------------------------

    /// Retire a finished current stream and promote the next pending one.
    fn rotate_current(inner: &mut DispatcherInner, now: DateTime<Utc>) -> Option<StreamCompleted> {
        let mut event = None;
        if let Some(current_id) = inner.current_stream.clone() {
            let finished = inner
                .streams
                .get(&current_id)
                .map(|s| s.status == StreamStatus::Completed || s.status == StreamStatus::Cancelled)
                .unwrap_or(true);
            if finished {
                inner.current_stream = None;
            } else if Self::stream_is_drained(inner, &current_id) {
                event = Self::finish_stream(inner, &current_id, now);
                inner.current_stream = None;
            }
        }
        if inner.current_stream.is_none() {
            if let Some((&seq, stream_id)) = inner.queue.iter().next() {
                let stream_id = stream_id.clone();
                inner.queue.remove(&seq);
                if let Some(stream) = inner.streams.get_mut(&stream_id) {
                    stream.status = StreamStatus::InProgress;
                    stream.started_at = Some(now);
                    info!(stream = %stream_id, seq, "Stream started");
                }
                inner.current_stream = Some(stream_id);
            }
        }
        event
    }

    /// The heaviest still-pending task of the stream. Re-sorted every
    /// call: dispatch order is a property of the data, not of insertion.
    fn next_pending_task(inner: &DispatcherInner, stream_id: &str) -> Option<String> {
        let stream = inner.streams.get(stream_id)?;
        stream
            .task_ids
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|t| t.status == TaskStatus::Pending)
            .max_by(|a, b| {
                a.weight_kg
                    .partial_cmp(&b.weight_kg)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|t| t.id.clone())
    }

    /// Whether every task of the stream is closed (completed/cancelled).
    fn stream_is_drained(inner: &DispatcherInner, stream_id: &str) -> bool {
        inner
            .streams
            .get(stream_id)
            .map(|stream| {
                stream
                    .task_ids
                    .iter()
                    .filter_map(|id| inner.tasks.get(id))
                    .all(|t| !t.status.is_open())
            })
            .unwrap_or(false)
    }

    fn finish_stream(
        inner: &mut DispatcherInner,
        stream_id: &str,
        now: DateTime<Utc>,
    ) -> Option<StreamCompleted> {
        let stream = inner.streams.get_mut(stream_id)?;
        if stream.status == StreamStatus::Completed {
            return None;
        }
        stream.status = StreamStatus::Completed;
        stream.completed_at = Some(now);
        inner.completed_streams += 1;
        info!(stream = %stream_id, seq = stream.sequence_number, "Stream completed");
        Some(StreamCompleted {
            stream_id: stream_id.to_string(),
            sequence_number: stream.sequence_number,
        })
    }

    /// An idle forklift with no bound task, preferring the optimizer's hint.
    fn pick_forklift(forklifts: &mut [Forklift], preferred: Option<&str>) -> Option<usize> {
        if let Some(pref) = preferred {
            if let Some(i) = forklifts
                .iter()
                .position(|f| f.id == pref && f.is_available())
            {
                return Some(i);
            }
        }
        forklifts.iter().position(Forklift::is_available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Pallet, Product};

    fn make_storage(pallets: &[(&str, f64, f64)]) -> StorageZone {
        let mut storage = StorageZone::new();
        for (id, weight, distance) in pallets {
            let product = Product::new(format!("SKU-{id}"), "Test", *weight, 5.0, 20.0);
            let mut pallet = Pallet::new(*id, product, 1, *distance);
            pallet.storage_distance_m = *distance;
            storage.ingest(pallet);
        }
        storage
    }

    fn make_task(id: &str, pallet: &str, weight: f64) -> DeliveryTask {
        DeliveryTask::new(id, pallet, weight)
    }

    fn make_forklifts(n: usize) -> Vec<Forklift> {
        (0..n)
            .map(|i| Forklift::new(format!("F-{i}"), format!("Forklift {i}"), 2.0))
            .collect()
    }

    #[test]
    fn heaviest_task_dispatched_first_within_stream() {
        let dispatcher = Dispatcher::new();
        let storage = make_storage(&[("P25", 25.0, 50.0), ("P5", 5.0, 50.0), ("P15", 15.0, 50.0)]);

        let mut s0 = TaskStream::new("S0", "order A", 0);
        s0.status = StreamStatus::Pending;
        dispatcher.enqueue_stream(
            s0,
            vec![make_task("T5", "P5", 5.0), make_task("T25", "P25", 25.0)],
        );
        let s1 = TaskStream::new("S1", "order B", 1);
        dispatcher.enqueue_stream(s1, vec![make_task("T15", "P15", 15.0)]);

        let mut forklifts = make_forklifts(2);
        let now = Utc::now();
        let (assignments, _) = dispatcher.dispatch(&mut forklifts, &storage, now);

        // Both forklifts bind to stream 0, heaviest first; stream 1 must wait.
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].task_id, "T25");
        assert_eq!(assignments[1].task_id, "T5");
    }

    #[test]
    fn next_stream_starts_only_after_current_completes() {
        let dispatcher = Dispatcher::new();
        let storage = make_storage(&[("P25", 25.0, 50.0), ("P5", 5.0, 50.0), ("P15", 15.0, 50.0)]);

        dispatcher.enqueue_stream(
            TaskStream::new("S0", "order A", 0),
            vec![make_task("T5", "P5", 5.0), make_task("T25", "P25", 25.0)],
        );
        dispatcher.enqueue_stream(
            TaskStream::new("S1", "order B", 1),
            vec![make_task("T15", "P15", 15.0)],
        );

        let mut forklifts = make_forklifts(2);
        let now = Utc::now();
        let (first, _) = dispatcher.dispatch(&mut forklifts, &storage, now);
        assert_eq!(first.len(), 2);

        // Complete only the heavy task: stream 0 still open, T15 must not start.
        let heavy_forklift = first
            .iter()
            .find(|a| a.task_id == "T25")
            .map(|a| a.forklift_id.clone())
            .expect("assigned");
        let slot = forklifts.iter().position(|f| f.id == heavy_forklift).expect("present");
        assert!(dispatcher
            .complete_task("T25", &mut forklifts[slot], now)
            .is_none());

        let (mid, completed) = dispatcher.dispatch(&mut forklifts, &storage, now);
        assert!(mid.is_empty(), "stream 1 started early: {mid:?}");
        assert!(completed.is_empty());

        // Complete the light task → stream 0 retires and T15 dispatches.
        let light_forklift = first
            .iter()
            .find(|a| a.task_id == "T5")
            .map(|a| a.forklift_id.clone())
            .expect("assigned");
        let slot = forklifts.iter().position(|f| f.id == light_forklift).expect("present");
        let event = dispatcher.complete_task("T5", &mut forklifts[slot], now);
        assert!(event.is_some(), "stream completion signal expected");

        let (last, _) = dispatcher.dispatch(&mut forklifts, &storage, now);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].task_id, "T15");
    }

    #[test]
    fn no_task_is_assigned_to_two_forklifts() {
        let dispatcher = Dispatcher::new();
        let storage = make_storage(&[("P1", 10.0, 50.0)]);
        dispatcher.enqueue_stream(
            TaskStream::new("S0", "order", 0),
            vec![make_task("T1", "P1", 10.0)],
        );

        let mut forklifts = make_forklifts(3);
        let now = Utc::now();
        let (a1, _) = dispatcher.dispatch(&mut forklifts, &storage, now);
        let (a2, _) = dispatcher.dispatch(&mut forklifts, &storage, now);
        assert_eq!(a1.len(), 1);
        assert!(a2.is_empty(), "double assignment: {a2:?}");
        assert_eq!(
            forklifts.iter().filter(|f| f.current_task_id.is_some()).count(),
            1
        );
    }

    #[test]
    fn adhoc_task_wrapped_in_singleton_stream() {
        let dispatcher = Dispatcher::new();
        let storage = make_storage(&[("P1", 10.0, 50.0)]);
        dispatcher.enqueue_task(make_task("T1", "P1", 10.0));

        let mut forklifts = make_forklifts(1);
        let (assignments, _) = dispatcher.dispatch(&mut forklifts, &storage, Utc::now());
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].task_id, "T1");
    }

    #[test]
    fn stale_sequence_numbers_are_resequenced() {
        let dispatcher = Dispatcher::new();
        let s_a = dispatcher.enqueue_stream(TaskStream::new("A", "a", 5), vec![]);
        let s_b = dispatcher.enqueue_stream(TaskStream::new("B", "b", 2), vec![]);
        assert!(s_b > s_a, "monotonicity violated: {s_a} then {s_b}");
    }

    #[test]
    fn offline_forklifts_are_skipped() {
        let dispatcher = Dispatcher::new();
        let storage = make_storage(&[("P1", 10.0, 50.0)]);
        dispatcher.enqueue_stream(
            TaskStream::new("S0", "order", 0),
            vec![make_task("T1", "P1", 10.0)],
        );

        let mut forklifts = make_forklifts(2);
        forklifts[0].state = ForkliftState::Offline;
        let (assignments, _) = dispatcher.dispatch(&mut forklifts, &storage, Utc::now());
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].forklift_id, "F-1");
    }
}
