//! Problem formulation: candidates, precedence order, cost matrix

use rayon::prelude::*;

/// A task as the optimizer sees it.
#[derive(Debug, Clone)]
pub struct CandidateTask {
    pub id: String,
    /// Storage distance of the pallet to fetch (meters)
    pub pallet_distance_m: f64,
    pub weight_kg: f64,
    /// Stream sequence; tasks without a stream sort behind all streams
    pub stream_seq: Option<u64>,
    /// Created under Critical buffer state, boosted ahead of
    /// non-critical work of the same or greater stream sequence
    pub critical: bool,
    /// Seconds from plan start by which this task must complete
    pub deadline_offset_s: Option<f64>,
}

/// A forklift as the optimizer sees it. Offline units are excluded
/// before the problem is built.
#[derive(Debug, Clone)]
pub struct CandidateForklift {
    pub id: String,
    pub speed_m_per_s: f64,
    pub load_unload_s: f64,
    pub current_position_m: f64,
}

impl CandidateForklift {
    /// Mirror of the forklift's delivery-time estimator.
    fn delivery_cost(&self, task: &CandidateTask) -> f64 {
        let to_pallet = (task.pallet_distance_m - self.current_position_m).abs();
        to_pallet / self.speed_m_per_s
            + self.load_unload_s
            + task.pallet_distance_m / self.speed_m_per_s
            + self.load_unload_s
    }
}

/// Dense cost matrix `c[task][forklift]` in seconds.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    cells: Vec<Vec<f64>>,
}

impl CostMatrix {
    /// Build the full grid. Rows are independent, so they are computed
    /// in parallel for large task sets.
    pub fn build(tasks: &[CandidateTask], forklifts: &[CandidateForklift]) -> Self {
        let cells = tasks
            .par_iter()
            .map(|task| forklifts.iter().map(|f| f.delivery_cost(task)).collect())
            .collect();
        Self { cells }
    }

    pub fn cost(&self, task_idx: usize, forklift_idx: usize) -> f64 {
        self.cells[task_idx][forklift_idx]
    }
}

/// Topological order of the precedence relation.
///
/// The stream constraint chains whole streams by sequence number; the
/// weight constraint chains tasks within a stream by descending weight;
/// the critical boost pulls Critical tasks to the front of their
/// stream. The relation is a total order, so a sort realizes it.
/// Returns indices into `tasks`.
pub fn precedence_order(tasks: &[CandidateTask]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..tasks.len()).collect();
    order.sort_by(|&a, &b| {
        let ta = &tasks[a];
        let tb = &tasks[b];
        let seq_a = ta.stream_seq.unwrap_or(u64::MAX);
        let seq_b = tb.stream_seq.unwrap_or(u64::MAX);
        seq_a
            .cmp(&seq_b)
            .then_with(|| tb.critical.cmp(&ta.critical))
            .then_with(|| {
                tb.weight_kg
                    .partial_cmp(&ta.weight_kg)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| ta.id.cmp(&tb.id))
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task(id: &str, seq: Option<u64>, weight: f64, critical: bool) -> CandidateTask {
        CandidateTask {
            id: id.to_string(),
            pallet_distance_m: 50.0,
            weight_kg: weight,
            stream_seq: seq,
            critical,
            deadline_offset_s: None,
        }
    }

    #[test]
    fn streams_order_before_weight() {
        let tasks = vec![
            make_task("b-light", Some(1), 5.0, false),
            make_task("a-light", Some(0), 5.0, false),
            make_task("a-heavy", Some(0), 25.0, false),
        ];
        let order = precedence_order(&tasks);
        let ids: Vec<&str> = order.iter().map(|&i| tasks[i].id.as_str()).collect();
        assert_eq!(ids, ["a-heavy", "a-light", "b-light"]);
    }

    #[test]
    fn critical_jumps_ahead_within_its_stream() {
        let tasks = vec![
            make_task("heavy", Some(0), 30.0, false),
            make_task("critical-light", Some(0), 2.0, true),
        ];
        let order = precedence_order(&tasks);
        assert_eq!(tasks[order[0]].id, "critical-light");
    }

    #[test]
    fn streamless_tasks_sort_last() {
        let tasks = vec![
            make_task("adhoc", None, 40.0, false),
            make_task("streamed", Some(7), 1.0, false),
        ];
        let order = precedence_order(&tasks);
        assert_eq!(tasks[order[0]].id, "streamed");
    }

    #[test]
    fn cost_matrix_matches_estimator_shape() {
        let tasks = vec![make_task("t", Some(0), 10.0, false)];
        let forklifts = vec![CandidateForklift {
            id: "F-0".into(),
            speed_m_per_s: 2.0,
            load_unload_s: 30.0,
            current_position_m: 0.0,
        }];
        let matrix = CostMatrix::build(&tasks, &forklifts);
        // 50m out (25s) + 30s + 50m back (25s) + 30s
        assert!((matrix.cost(0, 0) - 110.0).abs() < 1e-9);
    }
}
