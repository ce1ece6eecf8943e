//! Tabu-search machinery over the visit matrix: candidate neighborhoods
//! and the random disturbance used between tabu runs.

pub mod disturb;
pub mod neighborhood;

use crate::lp::QuantityLp;
use crate::problem::{Problem, RoutingCost};
use crate::tsp::CachedTspSolver;

pub use neighborhood::Candidate;

/// Read-only evaluation context shared by the search components.
pub struct SearchContext<'a> {
    pub problem: &'a Problem,
    pub routing: &'a RoutingCost,
    pub lp: QuantityLp<'a>,
    pub tsp: CachedTspSolver<'a>,
}

impl<'a> SearchContext<'a> {
    pub fn new(
        problem: &'a Problem,
        routing: &'a RoutingCost,
        cache: &'a crate::tsp::TspCache,
    ) -> Self {
        SearchContext {
            problem,
            routing,
            lp: QuantityLp::new(problem),
            tsp: CachedTspSolver::new(cache),
        }
    }
}
