//! Solver invariants under a seeded synthetic load: exactly-one
//! assignment per task, stream/weight precedence over the whole plan,
//! and graceful degradation when the crew shrinks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

use palletflow::config::OptimizationConfig;
use palletflow::optimizer::{
    AssignmentOptimizer, CandidateForklift, CandidateTask, SolveStatus,
};

fn synthetic_problem(seed: u64, tasks: usize, streams: u64) -> Vec<CandidateTask> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..tasks)
        .map(|i| CandidateTask {
            id: format!("T{i:03}"),
            pallet_distance_m: rng.gen_range(10.0..300.0),
            weight_kg: rng.gen_range(1.0..40.0),
            stream_seq: Some(rng.gen_range(0..streams)),
            critical: rng.gen_bool(0.1),
            deadline_offset_s: None,
        })
        .collect()
}

fn crew(n: usize) -> Vec<CandidateForklift> {
    (0..n)
        .map(|i| CandidateForklift {
            id: format!("F-{i}"),
            speed_m_per_s: 1.5 + i as f64 * 0.3,
            load_unload_s: 30.0,
            current_position_m: 0.0,
        })
        .collect()
}

#[test]
fn hundred_task_plan_holds_every_invariant() {
    let tasks = synthetic_problem(7, 100, 10);
    let optimizer = AssignmentOptimizer::new(OptimizationConfig::default());
    let result = optimizer.solve(&tasks, &crew(5), None);

    assert_eq!(result.status, SolveStatus::Optimal);
    assert_eq!(result.assignments.len(), 100);

    // Exactly one seat per task.
    let ids: HashSet<&str> = result.assignments.iter().map(|a| a.task_id.as_str()).collect();
    assert_eq!(ids.len(), 100);

    // Stream precedence: for any pair in different streams, the earlier
    // stream's task ends before the later stream's task starts.
    // Weight precedence: inside one stream, heavier ends first.
    let lookup = |id: &str| tasks.iter().find(|t| t.id == id).expect("known task");
    for a in &result.assignments {
        for b in &result.assignments {
            let (ta, tb) = (lookup(&a.task_id), lookup(&b.task_id));
            match (ta.stream_seq, tb.stream_seq) {
                (Some(sa), Some(sb)) if sa < sb => {
                    assert!(
                        a.end_offset_s <= b.start_offset_s + 1e-9,
                        "stream precedence violated: {} vs {}",
                        a.task_id,
                        b.task_id
                    );
                }
                (Some(sa), Some(sb))
                    if sa == sb
                        && ta.critical == tb.critical
                        && ta.weight_kg > tb.weight_kg =>
                {
                    assert!(
                        a.end_offset_s <= b.start_offset_s + 1e-9,
                        "weight precedence violated: {} vs {}",
                        a.task_id,
                        b.task_id
                    );
                }
                _ => {}
            }
        }
    }

    // The objective is the travel total and variance is finite.
    assert!(result.objective_seconds > 0.0);
    assert!(result.workload_variance.is_finite());
}

#[test]
fn shrinking_the_crew_stays_feasible_with_bounded_variance() {
    let tasks = synthetic_problem(11, 60, 6);
    let optimizer = AssignmentOptimizer::new(OptimizationConfig::default());

    let full = optimizer.solve(&tasks, &crew(3), None);
    let reduced = optimizer.solve(&tasks, &crew(2), None);

    assert_ne!(reduced.status, SolveStatus::Infeasible);
    assert_eq!(reduced.assignments.len(), 60);
    // Forklift F-2 no longer exists in the reduced plan.
    assert!(reduced.assignments.iter().all(|a| a.forklift_id != "F-2"));
    assert!(reduced.workload_variance.is_finite());
    assert!(full.workload_variance.is_finite());
}
