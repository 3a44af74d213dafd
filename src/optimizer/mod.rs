//! Assignment optimizer — constrained task×forklift scheduling
//!
//! The formulation follows a CP-SAT shape: binary assignment variables
//! over a task×forklift grid, an exactly-one constraint per task, a
//! travel-time cost matrix, and precedence constraints (stream order,
//! weight order within a stream, critical boost, wave deadlines). The
//! backing algorithm is a deterministic list scheduler: tasks are
//! topologically ordered by the precedence relation, then greedily
//! seated on the cheapest forklift with a λ-weighted workload penalty.
//! Callers observe only the shared result contract
//! (`optimal | feasible | infeasible`), never the backing algorithm.

mod model;
mod solver;

pub use model::{CandidateForklift, CandidateTask, CostMatrix};
pub use solver::{AssignmentOptimizer, WarmStart};

use serde::Serialize;

/// Solve outcome flag shared by every backing algorithm.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum SolveStatus {
    /// Ran to completion within budget; the plan satisfies every constraint
    Optimal,
    /// Budget expired or constraints relaxed; best-so-far plan returned
    Feasible,
    /// No plan satisfying the hard constraints exists
    Infeasible,
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "OPTIMAL"),
            SolveStatus::Feasible => write!(f, "FEASIBLE"),
            SolveStatus::Infeasible => write!(f, "INFEASIBLE"),
        }
    }
}

/// One cell of the solved plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAssignment {
    pub task_id: String,
    pub forklift_id: String,
    /// Seconds from plan start
    pub start_offset_s: f64,
    pub end_offset_s: f64,
    /// The cost-matrix cell that was charged
    pub cost_s: f64,
}

/// Full solver output. Never a partial mutation: the plan is built off
/// to the side and returned whole.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub status: SolveStatus,
    pub assignments: Vec<PlannedAssignment>,
    /// Σ assigned cost (seconds)
    pub objective_seconds: f64,
    pub solver_time_ms: u64,
    /// Population variance of per-forklift workloads
    pub workload_variance: f64,
    pub total_travel_seconds: f64,
    /// Tasks that could not be seated within the hard constraints
    pub unassigned_task_ids: Vec<String>,
}

impl OptimizationResult {
    pub fn infeasible(solver_time_ms: u64, unassigned: Vec<String>) -> Self {
        Self {
            status: SolveStatus::Infeasible,
            assignments: Vec::new(),
            objective_seconds: 0.0,
            solver_time_ms,
            workload_variance: 0.0,
            total_travel_seconds: 0.0,
            unassigned_task_ids: unassigned,
        }
    }

    /// Task → forklift map, the shape the dispatcher reconciles with.
    pub fn assignment_hints(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.assignments
            .iter()
            .map(|a| (a.task_id.clone(), a.forklift_id.clone()))
    }
}
