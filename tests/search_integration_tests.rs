//! Integration tests: neighborhood construction, disturbance, and the full
//! solver on small instances with known optima.

use irp_tabu::checker;
use irp_tabu::problem::{Node, Problem, RoutingCost, Vehicle};
use irp_tabu::search::{disturb, neighborhood, SearchContext};
use irp_tabu::solution::MAX_COST;
use irp_tabu::state::{TourPlan, VisitMatrix};
use irp_tabu::tabu::TabuMemory;
use irp_tabu::tsp::TspCache;
use irp_tabu::utils::Timer;
use irp_tabu::{Config, Environment, Solver};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

/// One depot, one customer at routing distance 3, two periods of demand 5.
/// With `customer_capacity` 5 every period must be visited (total 12); with
/// 10 the demand can be consolidated into one trip (total 11).
fn create_two_period_problem(customer_capacity: f64) -> Problem {
    Problem {
        period_num: 2,
        depot_num: 1,
        vehicles: vec![Vehicle { capacity: 10.0 }],
        nodes: vec![
            Node {
                x: 0.0,
                y: 0.0,
                init_quantity: 10.0,
                capacity: 10.0,
                min_level: 0.0,
                holding_cost: 0.0,
                demands: vec![0.0, 0.0],
            },
            Node {
                x: 3.0,
                y: 0.0,
                init_quantity: 0.0,
                capacity: customer_capacity,
                min_level: 0.0,
                holding_cost: 1.0,
                demands: vec![5.0, 5.0],
            },
        ],
    }
}

/// Three periods and three customers with plenty of slack, for the search
/// component tests.
fn create_slack_problem() -> Problem {
    let customer = |x: f64, y: f64| Node {
        x,
        y,
        init_quantity: 6.0,
        capacity: 30.0,
        min_level: 0.0,
        holding_cost: 1.0,
        demands: vec![2.0; 3],
    };
    Problem {
        period_num: 3,
        depot_num: 1,
        vehicles: vec![Vehicle { capacity: 100.0 }],
        nodes: vec![
            Node {
                x: 0.0,
                y: 0.0,
                init_quantity: 100.0,
                capacity: 100.0,
                min_level: 0.0,
                holding_cost: 0.0,
                demands: vec![0.0; 3],
            },
            customer(10.0, 0.0),
            customer(10.0, 10.0),
            customer(0.0, 10.0),
        ],
    }
}

fn environment(timeout: Duration) -> Environment {
    let mut env = Environment {
        timeout,
        job_num: 1,
        ..Environment::default()
    };
    // no calibrate: keep the exact timeout and a single worker
    env.rand_seed = 7;
    env
}

fn config() -> Config {
    Config::new()
        .with_threads_per_worker(1)
        .with_window_time_limit(Duration::from_secs(5))
}

#[test]
fn test_neighborhood_leaves_state_untouched() {
    let problem = create_slack_problem();
    let routing = RoutingCost::new(&problem);
    let cache = TspCache::in_memory();
    let ctx = SearchContext::new(&problem, &routing, &cache);

    let mut visits = VisitMatrix::full(&problem);
    let mut plan = TourPlan::new(problem.period_num);
    plan.rebuild_all(&visits, &ctx.tsp, &routing).unwrap();
    let mut tabu = TabuMemory::new(1 << 16, [0.6, 1.2, 1.8], problem.node_num());
    tabu.commit_state(&visits);

    let snapshot = visits.clone();
    let timer = Timer::new(Duration::from_secs(30));
    let candidates = neighborhood::build(&ctx, &mut visits, &plan, &mut tabu, &timer);

    assert_eq!(visits, snapshot, "probing must revert every move");
    assert!(!candidates.is_empty());
    for cand in &candidates {
        assert!(cand.lp_cost >= 0.0);
        assert!(cand.score().is_finite());
    }
    // all kept candidates tie within the tolerance
    let best = candidates[0].score();
    for cand in &candidates {
        assert!((cand.score() - best).abs() <= 1e-6);
    }
}

#[test]
fn test_disturb_preserves_feasibility() {
    let problem = create_slack_problem();
    let routing = RoutingCost::new(&problem);
    let cache = TspCache::in_memory();
    let ctx = SearchContext::new(&problem, &routing, &cache);

    let mut visits = VisitMatrix::full(&problem);
    let tabu = TabuMemory::new(1 << 16, [0.6, 1.2, 1.8], problem.node_num());
    let mut rng = StdRng::seed_from_u64(3);
    let timer = Timer::new(Duration::from_secs(30));

    disturb::shake(&ctx, &mut visits, &tabu, &mut rng, &timer);

    // the depot stays pinned and the matrix keeps a feasible schedule
    for p in 0..problem.period_num {
        assert!(visits.get(p, 0));
    }
    assert!(ctx.lp.objective(&visits).is_some());
}

#[test]
fn test_tight_capacity_forces_a_visit_every_period() {
    let problem = create_two_period_problem(5.0);
    let mut solver = Solver::new(
        problem.clone(),
        environment(Duration::from_secs(3)),
        config(),
    );
    let (solution, report) = solver.solve();

    assert!(report.best_worker.is_some());
    // both periods must be visited and each trip costs 6
    assert!((solution.total_cost - 12.0).abs() < 1e-6);
    for p in 0..2 {
        assert_eq!(solution.visited_customers(p, problem.depot_num), vec![1]);
    }

    let routing = RoutingCost::new(&problem);
    let recomputed = checker::check(&problem, &routing, &solution).expect("feasible");
    assert!((recomputed - solution.total_cost).abs() < 1e-3);
}

#[test]
fn test_consolidation_beats_twice_weekly_delivery() {
    let problem = create_two_period_problem(10.0);
    let mut solver = Solver::new(
        problem.clone(),
        environment(Duration::from_secs(3)),
        config(),
    );
    let (solution, _report) = solver.solve();

    // one trip of 10 in period 0: routing 6 plus one period of stock 5
    assert!((solution.total_cost - 11.0).abs() < 1e-6);
    assert_eq!(solution.visited_customers(0, problem.depot_num), vec![1]);
    assert!(solution.visited_customers(1, problem.depot_num).is_empty());

    let routing = RoutingCost::new(&problem);
    let recomputed = checker::check(&problem, &routing, &solution).expect("feasible");
    assert!((recomputed - solution.total_cost).abs() < 1e-3);
}

#[test]
fn test_anytime_on_a_tiny_budget() {
    // even with a near-zero budget the warm start yields a feasible plan
    let problem = create_two_period_problem(5.0);
    let mut solver = Solver::new(
        problem.clone(),
        environment(Duration::from_millis(50)),
        config(),
    );
    let (solution, _report) = solver.solve();

    assert!(solution.total_cost < MAX_COST);
    let routing = RoutingCost::new(&problem);
    assert!(checker::check(&problem, &routing, &solution).is_ok());
}

#[test]
fn test_three_customer_instance_converges() {
    let problem = create_slack_problem();
    let mut solver = Solver::new(
        problem.clone(),
        environment(Duration::from_secs(4)),
        config(),
    );
    let (solution, _report) = solver.solve();

    assert!(solution.total_cost < MAX_COST);
    let routing = RoutingCost::new(&problem);
    let recomputed = checker::check(&problem, &routing, &solution).expect("feasible");
    assert!((recomputed - solution.total_cost).abs() < 1e-3);
}
