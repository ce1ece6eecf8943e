//! Unit tests for the TSP repair and its persistent cache.

use irp_tabu::problem::{Node, Problem, Price, RoutingCost, Vehicle};
use irp_tabu::tsp::{CachedTspSolver, TspBackend, TspCache};

/// Depot at the origin and four customers on a 10x10 square.
fn create_test_problem() -> Problem {
    let customer = |x: f64, y: f64| Node {
        x,
        y,
        init_quantity: 0.0,
        capacity: 10.0,
        min_level: 0.0,
        holding_cost: 1.0,
        demands: vec![1.0],
    };
    Problem {
        period_num: 1,
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
                demands: vec![0.0],
            },
            customer(10.0, 0.0),
            customer(10.0, 10.0),
            customer(0.0, 10.0),
            customer(20.0, 0.0),
        ],
    }
}

#[test]
fn test_trivial_subsets() {
    let problem = create_test_problem();
    let routing = RoutingCost::new(&problem);
    let cache = TspCache::in_memory();
    let tsp = CachedTspSolver::new(&cache);

    let empty = tsp.tour(&[], &routing).unwrap();
    assert_eq!(empty.nodes, vec![0, 0]);
    assert_eq!(empty.price, 0.0);

    let depot_only = tsp.tour(&[0], &routing).unwrap();
    assert_eq!(depot_only.nodes, vec![0, 0]);
    assert_eq!(depot_only.price, 0.0);

    let single = tsp.tour(&[0, 1], &routing).unwrap();
    assert_eq!(single.nodes, vec![0, 1, 0]);
    assert_eq!(single.price, 2.0 * routing.at(0, 1));
}

#[test]
fn test_depot_is_added_when_missing() {
    let problem = create_test_problem();
    let routing = RoutingCost::new(&problem);
    let cache = TspCache::in_memory();
    let tsp = CachedTspSolver::new(&cache);

    let tour = tsp.tour(&[2], &routing).unwrap();
    assert_eq!(tour.nodes, vec![0, 2, 0]);

    let tour = tsp.tour(&[1, 2, 3], &routing).unwrap();
    assert_eq!(tour.nodes.first(), Some(&0));
    assert_eq!(tour.nodes.last(), Some(&0));
    assert_eq!(tour.nodes.len(), 5);
}

#[test]
fn test_square_tour_is_optimal() {
    let problem = create_test_problem();
    let routing = RoutingCost::new(&problem);
    let cache = TspCache::in_memory();
    let tsp = CachedTspSolver::new(&cache);

    let tour = tsp.tour(&[0, 1, 2, 3], &routing).unwrap();
    // 0 -> (10,0) -> (10,10) -> (0,10) -> 0, or its reverse: 10+10+10+10,
    // with the diagonal hop 14 any other order is longer
    assert_eq!(tour.price, 40.0);
    assert_eq!(tour.nodes.len(), 5);
    // the multiset of visited nodes matches the subset
    let mut inner = tour.nodes[..4].to_vec();
    inner.sort_unstable();
    assert_eq!(inner, vec![0, 1, 2, 3]);
}

#[test]
fn test_cache_hit_returns_stored_tour() {
    let problem = create_test_problem();
    let routing = RoutingCost::new(&problem);
    let cache = TspCache::in_memory();
    let tsp = CachedTspSolver::new(&cache);

    let first = tsp.tour(&[0, 1, 2, 3], &routing).unwrap();
    assert_eq!(cache.len(), 1);
    let second = tsp.tour(&[0, 1, 2, 3], &routing).unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_fingerprint_is_order_independent() {
    assert_eq!(
        TspCache::fingerprint(&[3, 1, 0, 2]),
        TspCache::fingerprint(&[0, 1, 2, 3])
    );
    assert_eq!(TspCache::fingerprint(&[0, 1, 2, 3]), "0-1-2-3");
}

#[test]
fn test_cache_persistence_round_trip() {
    let path = std::env::temp_dir().join(format!("irp_tsp_cache_{}.csv", std::process::id()));
    std::fs::remove_file(&path).ok();

    let problem = create_test_problem();
    let routing = RoutingCost::new(&problem);
    let expected = {
        let cache = TspCache::with_file(&path);
        let tsp = CachedTspSolver::new(&cache);
        tsp.tour(&[0, 1, 2, 3], &routing).unwrap()
    };

    // a fresh cache reloads the persisted tour without calling the backend
    let cache = TspCache::with_file(&path);
    assert_eq!(cache.len(), 1);
    let tsp = CachedTspSolver::new(&cache);
    let reloaded = tsp.tour(&[0, 1, 2, 3], &routing).unwrap();
    assert_eq!(reloaded, expected);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_backend_failure_leaves_cache_untouched() {
    struct FailingBackend;
    impl TspBackend for FailingBackend {
        fn solve(&self, _dist: &[Vec<Price>]) -> Option<Vec<usize>> {
            None
        }
    }

    let problem = create_test_problem();
    let routing = RoutingCost::new(&problem);
    let cache = TspCache::in_memory();
    let tsp = CachedTspSolver::with_backend(&cache, Box::new(FailingBackend));

    // trivial subsets never reach the backend
    assert!(tsp.tour(&[0, 1], &routing).is_some());
    // larger ones fail without polluting the cache
    assert!(tsp.tour(&[0, 1, 2, 3], &routing).is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_larger_subset_stays_consistent() {
    let problem = create_test_problem();
    let routing = RoutingCost::new(&problem);
    let cache = TspCache::in_memory();
    let tsp = CachedTspSolver::new(&cache);

    let tour = tsp.tour(&[0, 1, 2, 3, 4], &routing).unwrap();
    assert_eq!(tour.nodes.len(), 6);
    assert_eq!(tour.price, routing.walk_price(&tour.nodes));
    // nearest-neighbour plus 2-opt reaches the optimum on this layout:
    // 0 -> (0,10) -> (10,10) -> (20,0) -> (10,0) -> 0 at price 54
    assert_eq!(tour.price, 54.0);
}
