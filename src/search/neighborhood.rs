//! Candidate construction for one tabu step: enumerate DEL, MOV and SWP
//! moves, rank them by a cheap tour-delta estimate, then price the best of
//! each kind exactly with the quantity LP.

use super::SearchContext;
use crate::problem::{PeriodId, Price};
use crate::state::{Move, TourPlan, VisitMatrix};
use crate::tabu::TabuMemory;
use crate::utils::{strong_less, weak_equal, Timer};

/// An evaluated move: the incremental tour estimate and the exact holding
/// cost of the post-move matrix.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub mv: Move,
    pub tour_delta: Price,
    pub lp_cost: Price,
}

impl Candidate {
    /// Ranking score: estimated routing change plus exact holding cost.
    pub fn score(&self) -> Price {
        self.tour_delta + self.lp_cost
    }
}

/// Unevaluated move with its tour-delta estimate.
struct Probe {
    mv: Move,
    tour_delta: Price,
}

/// Build the candidate set for the current state: the non-tabu moves whose
/// exact score ties the best one found, up to `2 * P * floor(sqrt(N))`
/// exact evaluations per move kind.
pub fn build(
    ctx: &SearchContext,
    visits: &mut VisitMatrix,
    tour_plan: &TourPlan,
    tabu: &mut TabuMemory,
    timer: &Timer,
) -> Vec<Candidate> {
    let period_num = visits.period_num();
    let node_num = visits.node_num();
    let depot_num = ctx.problem.depot_num;

    let mut del_probes = Vec::new();
    let mut mov_probes = Vec::new();
    let mut swp_probes = Vec::new();

    for n in depot_num..node_num {
        let mut on_periods = Vec::new();
        let mut off_periods = Vec::new();
        for p in 0..period_num {
            if visits.get(p, n) {
                on_periods.push(p);
                let mv = Move::Del { p, n };
                if !tabu.is_tabu_move(&mv) {
                    del_probes.push(Probe {
                        mv,
                        tour_delta: tour_plan.removal_price(p, n, ctx.routing),
                    });
                }
            } else {
                off_periods.push(p);
            }
        }

        for &to in &off_periods {
            for &from in &on_periods {
                let mv = Move::Mov { n, from, to };
                if tabu.is_tabu_move(&mv) {
                    continue;
                }
                mov_probes.push(Probe {
                    mv,
                    tour_delta: tour_plan.insertion_price(to, n, ctx.routing)
                        + tour_plan.removal_price(from, n, ctx.routing),
                });
            }
        }
    }

    for n in depot_num..node_num {
        for m in n + 1..node_num {
            let mut only_n: Vec<PeriodId> = Vec::new();
            let mut only_m: Vec<PeriodId> = Vec::new();
            for p in 0..period_num {
                match (visits.get(p, n), visits.get(p, m)) {
                    (true, false) => only_n.push(p),
                    (false, true) => only_m.push(p),
                    _ => {}
                }
            }
            for &p1 in &only_n {
                for &p2 in &only_m {
                    let mv = Move::Swp { p1, n1: n, p2, n2: m };
                    if tabu.is_tabu_move(&mv) {
                        continue;
                    }
                    swp_probes.push(Probe {
                        mv,
                        tour_delta: tour_plan.removal_price(p1, n, ctx.routing)
                            + tour_plan.removal_price(p2, m, ctx.routing)
                            + tour_plan.insertion_price(p2, n, ctx.routing)
                            + tour_plan.insertion_price(p1, m, ctx.routing),
                    });
                }
            }
        }
    }

    let keep = 2 * period_num * (node_num as f64).sqrt() as usize;
    for probes in [&mut del_probes, &mut mov_probes, &mut swp_probes] {
        probes.sort_by(|a, b| a.tour_delta.total_cmp(&b.tour_delta));
        probes.truncate(keep);
    }

    let mut best: Vec<Candidate> = Vec::new();
    let mut min_score = Price::INFINITY;
    for probe in del_probes
        .into_iter()
        .chain(mov_probes)
        .chain(swp_probes)
    {
        if timer.is_time_out() {
            break;
        }
        // probed states are marked so the walk never comes back to them
        tabu.mark_move(&probe.mv);

        probe.mv.apply(visits);
        let lp_cost = ctx.lp.objective(visits);
        probe.mv.revert(visits);

        let lp_cost = match lp_cost {
            Some(cost) => cost,
            None => continue,
        };
        let cand = Candidate {
            mv: probe.mv,
            tour_delta: probe.tour_delta,
            lp_cost,
        };
        if strong_less(cand.score(), min_score) {
            min_score = cand.score();
            best.clear();
            best.push(cand);
        } else if weak_equal(cand.score(), min_score) {
            best.push(cand);
        }
    }
    best
}
