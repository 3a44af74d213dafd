//! Budgeted list scheduler behind the shared result contract

use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::OptimizationConfig;

use super::model::{precedence_order, CandidateForklift, CandidateTask, CostMatrix};
use super::{OptimizationResult, PlannedAssignment, SolveStatus};

/// Prior solution carried between tactical cycles. Only consulted when
/// task identities are preserved; stale entries are ignored.
#[derive(Debug, Clone, Default)]
pub struct WarmStart {
    /// task id → forklift id from the previous plan
    assignments: HashMap<String, String>,
}

impl WarmStart {
    pub fn from_result(result: &OptimizationResult) -> Self {
        Self {
            assignments: result.assignment_hints().collect(),
        }
    }

    fn preferred(&self, task_id: &str) -> Option<&str> {
        self.assignments.get(task_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Warm-start stability: keep the previous seat when its score is
/// within this factor of the best one.
const WARM_KEEP_FACTOR: f64 = 1.05;

/// The assignment optimizer.
pub struct AssignmentOptimizer {
    config: OptimizationConfig,
}

impl AssignmentOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    /// Solve one assignment problem.
    ///
    /// Streams are walked in sequence-number order (the precedence
    /// order is total), partial per-stream solutions compose into the
    /// final plan, and a deadline miss anywhere propagates to the
    /// overall status. The wall-clock budget is a hard deadline:
    /// expiry returns the best-so-far plan as `Feasible`, never a
    /// partial mutation.
    pub fn solve(
        &self,
        tasks: &[CandidateTask],
        forklifts: &[CandidateForklift],
        warm: Option<&WarmStart>,
    ) -> OptimizationResult {
        let started = Instant::now();
        let budget_ms = self.config.max_solver_time_ms;

        if tasks.is_empty() {
            return OptimizationResult {
                status: SolveStatus::Optimal,
                assignments: Vec::new(),
                objective_seconds: 0.0,
                solver_time_ms: 0,
                workload_variance: 0.0,
                total_travel_seconds: 0.0,
                unassigned_task_ids: Vec::new(),
            };
        }
        if forklifts.is_empty() {
            warn!("optimizer invoked with no available forklifts");
            return OptimizationResult::infeasible(
                started.elapsed().as_millis() as u64,
                tasks.iter().map(|t| t.id.clone()).collect(),
            );
        }

        let matrix = CostMatrix::build(tasks, forklifts);
        let order = precedence_order(tasks);
        let warm = match (self.config.warm_start_enabled, warm) {
            (true, Some(w)) => Some(w),
            _ => None,
        };

        let lambda = self.config.workload_balance_lambda.max(0.0);
        let mut workloads = vec![0.0f64; forklifts.len()];
        let mut assignments = Vec::with_capacity(tasks.len());
        let mut unassigned = Vec::new();
        // The precedence relation is a chain, so every task starts when
        // its predecessor ends.
        let mut chain_clock = 0.0f64;
        let mut deadline_missed = false;
        let mut budget_expired = false;

        for &task_idx in &order {
            if started.elapsed().as_millis() as u64 > budget_ms {
                budget_expired = true;
                unassigned.extend(
                    order
                        .iter()
                        .skip(assignments.len() + unassigned.len())
                        .map(|&i| tasks[i].id.clone()),
                );
                break;
            }

            let task = &tasks[task_idx];
            let best = Self::pick_seat(task, &matrix, task_idx, forklifts, &workloads, lambda, warm);
            let Some((forklift_idx, cost)) = best else {
                unassigned.push(task.id.clone());
                continue;
            };

            let start = chain_clock;
            let end = start + cost;
            if let Some(deadline) = task.deadline_offset_s {
                if end > deadline {
                    debug!(task = %task.id, end, deadline, "wave deadline unreachable");
                    deadline_missed = true;
                }
            }

            workloads[forklift_idx] += cost;
            chain_clock = end;
            assignments.push(PlannedAssignment {
                task_id: task.id.clone(),
                forklift_id: forklifts[forklift_idx].id.clone(),
                start_offset_s: start,
                end_offset_s: end,
                cost_s: cost,
            });
        }

        let objective: f64 = assignments.iter().map(|a| a.cost_s).sum();
        let variance = population_variance(&workloads);
        let status = if deadline_missed {
            SolveStatus::Infeasible
        } else if budget_expired || !unassigned.is_empty() {
            SolveStatus::Feasible
        } else {
            SolveStatus::Optimal
        };

        OptimizationResult {
            status,
            assignments,
            objective_seconds: objective,
            solver_time_ms: started.elapsed().as_millis() as u64,
            workload_variance: variance,
            total_travel_seconds: objective,
            unassigned_task_ids: unassigned,
        }
    }

    /// Cheapest seat under the λ-weighted workload penalty, keeping the
    /// warm-start seat when it is close enough.
    fn pick_seat(
        task: &CandidateTask,
        matrix: &CostMatrix,
        task_idx: usize,
        forklifts: &[CandidateForklift],
        workloads: &[f64],
        lambda: f64,
        warm: Option<&WarmStart>,
    ) -> Option<(usize, f64)> {
        let score = |j: usize| matrix.cost(task_idx, j) + lambda * workloads[j];

        let best = (0..forklifts.len()).min_by(|&a, &b| {
            score(a)
                .partial_cmp(&score(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;

        if let Some(prev_id) = warm.and_then(|w| w.preferred(&task.id)) {
            if let Some(prev) = forklifts.iter().position(|f| f.id == prev_id) {
                if score(prev) <= score(best) * WARM_KEEP_FACTOR {
                    return Some((prev, matrix.cost(task_idx, prev)));
                }
            }
        }
        Some((best, matrix.cost(task_idx, best)))
    }
}

/// Population variance over per-forklift workloads.
fn population_variance(workloads: &[f64]) -> f64 {
    if workloads.is_empty() {
        return 0.0;
    }
    let n = workloads.len() as f64;
    let mean = workloads.iter().sum::<f64>() / n;
    workloads.iter().map(|w| (w - mean).powi(2)).sum::<f64>() / n
}
