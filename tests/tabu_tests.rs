//! Unit tests for the tabu memory: incremental hashing must agree exactly
//! with full recomputation, and tabu bits are never cleared.

use irp_tabu::problem::{Node, Problem, Vehicle};
use irp_tabu::state::{Move, VisitMatrix};
use irp_tabu::tabu::TabuMemory;

const GAMMAS: [f64; 3] = [0.6, 1.2, 1.8];
const BITS: usize = 1 << 16;

/// Four periods and five customers, enough room for every move shape.
fn create_test_problem() -> Problem {
    let customer = |x: f64, y: f64| Node {
        x,
        y,
        init_quantity: 5.0,
        capacity: 20.0,
        min_level: 0.0,
        holding_cost: 1.0,
        demands: vec![2.0; 4],
    };
    Problem {
        period_num: 4,
        depot_num: 1,
        vehicles: vec![Vehicle { capacity: 60.0 }],
        nodes: vec![
            Node {
                x: 0.0,
                y: 0.0,
                init_quantity: 100.0,
                capacity: 100.0,
                min_level: 0.0,
                holding_cost: 0.0,
                demands: vec![0.0; 4],
            },
            customer(1.0, 2.0),
            customer(5.0, 1.0),
            customer(3.0, 7.0),
            customer(8.0, 4.0),
            customer(2.0, 9.0),
        ],
    }
}

fn create_visits(problem: &Problem) -> VisitMatrix {
    let mut visits = VisitMatrix::new(problem);
    // a scattered but fixed pattern
    for (p, n) in [(0, 1), (0, 3), (1, 2), (1, 5), (2, 1), (2, 4), (3, 3)] {
        visits.set(p, n, true);
    }
    visits
}

#[test]
fn test_incremental_hash_matches_full_for_all_move_kinds() {
    let problem = create_test_problem();
    let mut visits = create_visits(&problem);
    let mut tabu = TabuMemory::new(BITS, GAMMAS, problem.node_num());
    tabu.commit_state(&visits);

    let moves = [
        Move::Add { p: 3, n: 5 },
        Move::Del { p: 0, n: 1 },
        Move::Mov { n: 3, from: 0, to: 1 },
        // visits[1][2]=1, visits[2][4]=1, visits[1][4]=0, visits[2][2]=0
        Move::Swp {
            p1: 1,
            n1: 2,
            p2: 2,
            n2: 4,
        },
    ];

    for mv in moves {
        let shifted = tabu.shift(tabu.current(), &mv);
        mv.apply(&mut visits);
        assert_eq!(
            shifted,
            tabu.hash_state(&visits),
            "incremental hash diverged for {:?}",
            mv
        );
        mv.revert(&mut visits);
    }
}

#[test]
fn test_commit_move_tracks_hash_state() {
    let problem = create_test_problem();
    let mut visits = create_visits(&problem);
    let mut tabu = TabuMemory::new(BITS, GAMMAS, problem.node_num());
    tabu.commit_state(&visits);

    let walk = [
        Move::Del { p: 1, n: 2 },
        Move::Mov { n: 1, from: 0, to: 3 },
        Move::Add { p: 2, n: 5 },
        Move::Swp {
            p1: 2,
            n1: 4,
            p2: 3,
            n2: 3,
        },
    ];
    for mv in walk {
        mv.apply(&mut visits);
        tabu.commit_move(&mv);
        assert_eq!(tabu.current(), tabu.hash_state(&visits));
    }
}

#[test]
fn test_move_and_inverse_restore_hash_triple() {
    let problem = create_test_problem();
    let visits = create_visits(&problem);
    let tabu = TabuMemory::new(BITS, GAMMAS, problem.node_num());
    let start = tabu.hash_state(&visits);

    let moves = [
        Move::Del { p: 0, n: 3 },
        Move::Mov { n: 2, from: 1, to: 2 },
        Move::Swp {
            p1: 0,
            n1: 1,
            p2: 1,
            n2: 5,
        },
    ];
    for mv in moves {
        let there = tabu.shift(start, &mv);
        let back = tabu.shift(there, &mv.inverse());
        assert_eq!(back, start, "inverse of {:?} did not restore the hashes", mv);
    }
}

#[test]
fn test_committed_state_is_tabu() {
    let problem = create_test_problem();
    let visits = create_visits(&problem);
    let mut tabu = TabuMemory::new(BITS, GAMMAS, problem.node_num());

    assert!(!tabu.is_tabu_state(&visits));
    tabu.commit_state(&visits);
    assert!(tabu.is_tabu_state(&visits));
}

#[test]
fn test_tabu_bits_are_monotone() {
    let problem = create_test_problem();
    let mut visits = create_visits(&problem);
    let mut tabu = TabuMemory::new(BITS, GAMMAS, problem.node_num());
    tabu.commit_state(&visits);

    // visiting more states never clears earlier marks
    let snapshot = visits.clone();
    for mv in [
        Move::Del { p: 0, n: 1 },
        Move::Add { p: 3, n: 4 },
        Move::Mov { n: 5, from: 1, to: 2 },
    ] {
        mv.apply(&mut visits);
        tabu.commit_move(&mv);
        assert!(tabu.is_tabu_state(&snapshot));
    }
}

#[test]
fn test_is_tabu_move_agrees_with_post_state() {
    let problem = create_test_problem();
    let mut visits = create_visits(&problem);
    let mut tabu = TabuMemory::new(BITS, GAMMAS, problem.node_num());
    tabu.commit_state(&visits);

    let mv = Move::Del { p: 2, n: 4 };
    assert!(!tabu.is_tabu_move(&mv));

    // mark the post-move state, as the neighborhood probe does
    tabu.mark_move(&mv);
    assert!(tabu.is_tabu_move(&mv));

    mv.apply(&mut visits);
    assert!(tabu.is_tabu_state(&visits));
}
