//! Search state: the period-by-node visit matrix, the local moves that
//! mutate it, and the per-period tour bookkeeping.

use crate::problem::{NodeId, PeriodId, Price, Problem, RoutingCost};
use crate::tsp::CachedTspSolver;

/// Binary matrix `visits[p][n]`, 1 iff node `n` is visited in period `p`.
/// Depot rows are pinned to 1 for bookkeeping and never enumerated as moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitMatrix {
    period_num: usize,
    node_num: usize,
    bits: Vec<u8>,
}

impl VisitMatrix {
    /// All-zero matrix with depot columns raised.
    pub fn new(problem: &Problem) -> Self {
        let mut m = VisitMatrix {
            period_num: problem.period_num,
            node_num: problem.node_num(),
            bits: vec![0; problem.period_num * problem.node_num()],
        };
        for p in 0..m.period_num {
            for d in 0..problem.depot_num {
                m.set(p, d, true);
            }
        }
        m
    }

    /// Matrix visiting every customer in every period.
    pub fn full(problem: &Problem) -> Self {
        let mut m = Self::new(problem);
        for p in 0..m.period_num {
            for n in problem.customers() {
                m.set(p, n, true);
            }
        }
        m
    }

    pub fn period_num(&self) -> usize {
        self.period_num
    }

    pub fn node_num(&self) -> usize {
        self.node_num
    }

    #[inline]
    pub fn get(&self, p: PeriodId, n: NodeId) -> bool {
        self.bits[p * self.node_num + n] != 0
    }

    #[inline]
    pub fn set(&mut self, p: PeriodId, n: NodeId, on: bool) {
        self.bits[p * self.node_num + n] = on as u8;
    }

    /// Nodes visited in period `p`, depot included.
    pub fn period_nodes(&self, p: PeriodId) -> Vec<NodeId> {
        (0..self.node_num).filter(|&n| self.get(p, n)).collect()
    }

    /// All raised `(p, n)` cells in row-major order.
    pub fn ones(&self) -> impl Iterator<Item = (PeriodId, NodeId)> + '_ {
        let node_num = self.node_num;
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, &b)| b != 0)
            .map(move |(i, _)| (i / node_num, i % node_num))
    }
}

/// A local change to the visit matrix. `Add` only appears in disturbance;
/// the neighborhood enumerates `Del`, `Mov` and `Swp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Raise `visits[p][n]`.
    Add { p: PeriodId, n: NodeId },
    /// Clear `visits[p][n]`.
    Del { p: PeriodId, n: NodeId },
    /// Move node `n`'s visit from period `from` to period `to`.
    Mov {
        n: NodeId,
        from: PeriodId,
        to: PeriodId,
    },
    /// Exchange the periods of two nodes: requires `visits[p1][n1] = 1`,
    /// `visits[p2][n2] = 1`, `visits[p1][n2] = 0`, `visits[p2][n1] = 0`.
    Swp {
        p1: PeriodId,
        n1: NodeId,
        p2: PeriodId,
        n2: NodeId,
    },
}

impl Move {
    pub fn apply(&self, visits: &mut VisitMatrix) {
        match *self {
            Move::Add { p, n } => visits.set(p, n, true),
            Move::Del { p, n } => visits.set(p, n, false),
            Move::Mov { n, from, to } => {
                visits.set(from, n, false);
                visits.set(to, n, true);
            }
            Move::Swp { p1, n1, p2, n2 } => {
                visits.set(p1, n1, false);
                visits.set(p2, n2, false);
                visits.set(p1, n2, true);
                visits.set(p2, n1, true);
            }
        }
    }

    pub fn revert(&self, visits: &mut VisitMatrix) {
        self.inverse().apply(visits);
    }

    /// The move undoing this one.
    pub fn inverse(&self) -> Move {
        match *self {
            Move::Add { p, n } => Move::Del { p, n },
            Move::Del { p, n } => Move::Add { p, n },
            Move::Mov { n, from, to } => Move::Mov {
                n,
                from: to,
                to: from,
            },
            Move::Swp { p1, n1, p2, n2 } => Move::Swp {
                p1,
                n1: n2,
                p2,
                n2: n1,
            },
        }
    }

    /// Periods whose tour changes when the move is applied.
    pub fn touched_periods(&self) -> Vec<PeriodId> {
        match *self {
            Move::Add { p, .. } | Move::Del { p, .. } => vec![p],
            Move::Mov { from, to, .. } => vec![from, to],
            Move::Swp { p1, p2, .. } => vec![p1, p2],
        }
    }
}

/// Per-period tour state: a cyclic node sequence `[0, v1, .., vk, 0]` and
/// its routing price. The node multiset of `tours[p]` always matches the
/// visit matrix row `p`.
#[derive(Debug, Clone)]
pub struct TourPlan {
    pub tours: Vec<Vec<NodeId>>,
    pub prices: Vec<Price>,
}

impl TourPlan {
    pub fn new(period_num: usize) -> Self {
        TourPlan {
            tours: vec![vec![0, 0]; period_num],
            prices: vec![0.0; period_num],
        }
    }

    pub fn total_price(&self) -> Price {
        self.prices.iter().sum()
    }

    /// Cheapest insertion delta for node `n` into period `p`'s tour:
    /// the minimum of `C[a][n] + C[n][b] - C[a][b]` over consecutive pairs.
    pub fn insertion_price(&self, p: PeriodId, n: NodeId, routing: &RoutingCost) -> Price {
        let tour = &self.tours[p];
        let mut best = Price::INFINITY;
        for w in tour.windows(2) {
            let cur = routing.at(w[0], n) + routing.at(n, w[1]) - routing.at(w[0], w[1]);
            if cur < best {
                best = cur;
            }
        }
        best
    }

    /// Removal delta for node `n` in period `p`'s tour:
    /// `C[pre][succ] - C[n][pre] - C[n][succ]` for its current neighbors.
    /// The node must be present.
    pub fn removal_price(&self, p: PeriodId, n: NodeId, routing: &RoutingCost) -> Price {
        let tour = &self.tours[p];
        let pos = tour
            .iter()
            .position(|&t| t == n)
            .expect("removal target must be on the tour");
        debug_assert!(pos > 0 && pos + 1 < tour.len());
        let (pre, succ) = (tour[pos - 1], tour[pos + 1]);
        routing.at(pre, succ) - routing.at(n, pre) - routing.at(n, succ)
    }

    /// Re-solve the tours of `periods` against the visit matrix and return
    /// the total routing price over the whole horizon. On a backend failure
    /// nothing is mutated and `None` is returned, so the caller can revert
    /// the move under evaluation.
    pub fn rebuild(
        &mut self,
        periods: &[PeriodId],
        visits: &VisitMatrix,
        tsp: &CachedTspSolver,
        routing: &RoutingCost,
    ) -> Option<Price> {
        let mut repaired = Vec::with_capacity(periods.len());
        for &p in periods {
            repaired.push((p, tsp.tour(&visits.period_nodes(p), routing)?));
        }
        for (p, tour) in repaired {
            self.prices[p] = tour.price;
            self.tours[p] = tour.nodes;
        }
        Some(self.total_price())
    }

    /// Rebuild every period.
    pub fn rebuild_all(
        &mut self,
        visits: &VisitMatrix,
        tsp: &CachedTspSolver,
        routing: &RoutingCost,
    ) -> Option<Price> {
        let periods: Vec<PeriodId> = (0..self.tours.len()).collect();
        self.rebuild(&periods, visits, tsp, routing)
    }
}
