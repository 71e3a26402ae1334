//! Seeded randomized checks over generated single-block kernels.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use super::{AttemptOutcome, IiSearch, Scheduler, Technique};
use crate::models::{Cdfg, OpKind, ResourceLimits, Schedule};
use crate::resource::{ResourceManager, Strategy};
use crate::validation::validate_schedule;

const KINDS: [OpKind; 4] = [OpKind::Load, OpKind::Add, OpKind::Sub, OpKind::Mul];

/// Random DAG `n0..n{k}`; edges only go from lower to higher index.
/// Returns the graph and, per node, its forward predecessors.
fn random_dag(rng: &mut SmallRng, with_phi: bool) -> (Cdfg, Vec<Vec<usize>>) {
    let mut g = Cdfg::new("rand");
    let bb = g.add_block("body");
    let n = rng.random_range(4..10);
    let mut preds = vec![Vec::new(); n];
    for i in 0..n {
        let kind = if with_phi && i == 0 {
            OpKind::Phi
        } else {
            KINDS[rng.random_range(0..KINDS.len())]
        };
        g.op(&format!("n{i}"), kind, bb).unwrap();
    }
    for j in 1..n {
        for i in 0..j {
            if rng.random_bool(0.3) {
                g.add_dependency(&format!("n{i}"), &format!("n{j}")).unwrap();
                preds[j].push(i);
            }
        }
    }
    (g, preds)
}

fn latency(g: &Cdfg, node: usize) -> i64 {
    let id = g.node_by_name(&format!("n{node}")).unwrap();
    g.node(id).latency as i64
}

fn solve(g: &Cdfg, technique: Technique, limits: Option<&ResourceLimits>) -> Schedule {
    let mut s = Scheduler::new(technique);
    s.initialize(g).unwrap();
    s.build_ilp().unwrap();
    if let Some(limits) = limits {
        let manager = ResourceManager::new(limits.clone());
        let mut handle = s.pass_scheduling_ilp().unwrap();
        manager
            .add_resource_constraints(&mut handle, Strategy::Ordering)
            .unwrap();
    }
    assert!(s.solve("rand").unwrap().is_solved());
    s.schedule().unwrap()
}

#[test]
fn test_asap_matches_longest_path() {
    let mut rng = SmallRng::seed_from_u64(42);
    for _ in 0..25 {
        let (mut g, preds) = random_dag(&mut rng, false);
        g.insert_super_nodes().unwrap();
        let sched = solve(&g, Technique::Asap, None);
        assert!(validate_schedule(&g, &sched).is_empty());

        let mut earliest = vec![0i64; preds.len()];
        let mut finish = 0;
        for j in 0..preds.len() {
            earliest[j] = preds[j]
                .iter()
                .map(|&i| earliest[i] + latency(&g, i))
                .max()
                .unwrap_or(0);
            assert_eq!(sched.cycle(&format!("n{j}")), Some(earliest[j]));
            finish = finish.max(earliest[j] + latency(&g, j));
        }
        assert_eq!(sched.cycle("ssink_0"), Some(finish));
    }
}

#[test]
fn test_ordering_bounds_in_flight_instances() {
    let mut rng = SmallRng::seed_from_u64(7);
    let limits = ResourceLimits::new()
        .with("load", 1)
        .with("mul", 1)
        .with("add", 2);
    for _ in 0..25 {
        let (mut g, _) = random_dag(&mut rng, false);
        g.insert_super_nodes().unwrap();
        let sched = solve(&g, Technique::Asap, Some(&limits));
        assert!(validate_schedule(&g, &sched).is_empty());

        let mut spans: BTreeMap<&str, Vec<(i64, i64)>> = BTreeMap::new();
        for (_, op) in g.operations() {
            if let (Some(class), Some(start)) = (op.kind.resource_class(), sched.cycle(&op.name)) {
                spans
                    .entry(class)
                    .or_default()
                    .push((start, start + op.latency as i64));
            }
        }
        for (class, spans) in &spans {
            let Some(cap) = limits.capacity(class) else {
                continue;
            };
            let horizon = spans.iter().map(|s| s.1).max().unwrap_or(0);
            for t in 0..horizon {
                let in_flight = spans.iter().filter(|(s, e)| *s <= t && t < *e).count();
                assert!(
                    in_flight <= cap as usize,
                    "{in_flight} {class} in flight at cycle {t}, capacity {cap}"
                );
            }
        }
    }
}

#[test]
fn test_ii_search_yields_sound_minimal_ii() {
    let mut rng = SmallRng::seed_from_u64(1234);
    for _ in 0..10 {
        let (mut g, preds) = random_dag(&mut rng, true);
        let last = preds.len() - 1;
        g.add_back_edge(&format!("n{last}"), "n0").unwrap();
        g.insert_super_nodes().unwrap();

        let found = IiSearch::new(40).run(&g).unwrap();
        let sched = found.scheduler.schedule().unwrap();
        assert_eq!(sched.ii, Some(found.ii));
        assert!(validate_schedule(&g, &sched).is_empty());

        let (scheduled, rejected) = found.attempts.split_last().unwrap();
        assert_eq!(scheduled.outcome, AttemptOutcome::Scheduled);
        assert!(rejected
            .iter()
            .all(|a| a.outcome == AttemptOutcome::Infeasible));
    }
}
