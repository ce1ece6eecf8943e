//! Mixed-integer re-optimization over a set of active periods. Routing
//! edges are modeled only for the active periods; the rest of the horizon
//! keeps its current visit pattern and tour prices. Subtour elimination is
//! lazy: the model is re-solved with the accumulated cut pool until the
//! integer solution is subtour-free or the budget runs out, and every
//! integer solution on the way is repaired into a feasible plan by the TSP
//! solver and offered to the incumbent sink.

use crate::problem::{NodeId, PeriodId, Price, Problem, RoutingCost};
use crate::solution::{Delivery, Solution};
use crate::state::VisitMatrix;
use crate::tsp::CachedTspSolver;
use crate::utils::{strong_less, Timer};
use good_lp::{
    constraint, default_solver, variable, Constraint, Expression, ProblemVariables,
    ResolutionError, Solution as _, SolverModel, Variable,
};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;

/// Which violated subtours to cut per integer solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtourPolicy {
    /// The first subtour found per (period, vehicle).
    First,
    /// The smallest subtour per (period, vehicle).
    Best,
    /// Every subtour found.
    All,
}

/// A subtour elimination cut: the edge set of one depot-free cycle in the
/// routing graph of `(active_idx, vehicle)`.
struct Cut {
    active_idx: usize,
    vehicle: usize,
    edges: Vec<(NodeId, NodeId)>,
}

struct Model {
    vars: ProblemVariables,
    /// `d[p][v][n]` for the whole horizon.
    delivery: Vec<Vec<Vec<Variable>>>,
    /// `x[i][v][n][m]` for active periods only, `None` on the diagonal.
    edge: Vec<Vec<Vec<Vec<Option<Variable>>>>>,
    holding: Expression,
    objective: Expression,
    constraints: Vec<Constraint>,
}

/// Model builder and cutting-plane driver for one instance.
pub struct WindowMip<'a> {
    problem: &'a Problem,
    routing: &'a RoutingCost,
    policy: SubtourPolicy,
}

/// Upper bound on cutting-plane rounds per invocation; the deadline usually
/// fires first.
const MAX_CUT_ROUNDS: usize = 200;

impl<'a> WindowMip<'a> {
    pub fn new(problem: &'a Problem, routing: &'a RoutingCost, policy: SubtourPolicy) -> Self {
        WindowMip {
            problem,
            routing,
            policy,
        }
    }

    /// Re-optimize the `active` periods against the rest of the plan.
    ///
    /// `visits` gates deliveries of the inactive periods and `tour_prices`
    /// carries their fixed routing cost. Every repaired integer solution
    /// that beats `sln` replaces it and is reported through `on_improve`.
    #[allow(clippy::too_many_arguments)]
    pub fn optimize(
        &self,
        active: &[PeriodId],
        visits: &VisitMatrix,
        tour_prices: &[Price],
        sln: &mut Solution,
        tsp: &CachedTspSolver,
        timer: Timer,
        rng: &mut StdRng,
        on_improve: &mut dyn FnMut(&Solution),
    ) {
        // Randomized emphasis between tour and holding cost, resampled per
        // invocation so successive calls explore different tradeoffs.
        let tour_cost_factor = 1.0 + rng.gen_range(8..13) as f64 / 10.0;
        let mut cuts: Vec<Cut> = Vec::new();

        for round in 0..MAX_CUT_ROUNDS {
            if timer.is_time_out() {
                debug!("window mip out of time after {} cut rounds", round);
                return;
            }

            let model = self.build(active, visits, tour_prices, tour_cost_factor, &cuts);
            let Model {
                vars,
                delivery,
                edge,
                holding,
                objective,
                constraints,
            } = model;

            let mut solver = vars.minimise(objective).using(default_solver);
            for c in constraints {
                solver = solver.with(c);
            }
            let sol = match solver.solve() {
                Ok(sol) => sol,
                Err(ResolutionError::Infeasible) => {
                    debug!("window mip infeasible for periods {:?}", active);
                    return;
                }
                Err(e) => {
                    warn!("window mip solve failed: {}", e);
                    return;
                }
            };

            self.offer_incumbent(
                active,
                tour_prices,
                &sol,
                &delivery,
                &edge,
                &holding,
                sln,
                tsp,
                on_improve,
            );

            let new_cuts = self.violated_subtours(&sol, &edge);
            if new_cuts.is_empty() {
                debug!("window mip subtour-free after {} cut rounds", round + 1);
                return;
            }
            cuts.extend(new_cuts);
        }
        info!("window mip stopped at the cut round limit");
    }

    fn build(
        &self,
        active: &[PeriodId],
        visits: &VisitMatrix,
        tour_prices: &[Price],
        tour_cost_factor: f64,
        cuts: &[Cut],
    ) -> Model {
        let pb = self.problem;
        let period_num = pb.period_num;
        let vehicle_num = pb.vehicle_num();
        let node_num = pb.node_num();

        let mut vars = ProblemVariables::new();

        let mut delivery: Vec<Vec<Vec<Variable>>> = Vec::with_capacity(period_num);
        for _p in 0..period_num {
            let mut per_vehicle = Vec::with_capacity(vehicle_num);
            for v in 0..vehicle_num {
                let mut per_node = Vec::with_capacity(node_num);
                for n in 0..node_num {
                    let bound = pb.delivery_bound(v, n);
                    let var = if pb.is_depot(n) {
                        vars.add(variable().min(-bound).max(0.0))
                    } else {
                        vars.add(variable().min(0.0).max(bound))
                    };
                    per_node.push(var);
                }
                per_vehicle.push(per_node);
            }
            delivery.push(per_vehicle);
        }

        let mut edge: Vec<Vec<Vec<Vec<Option<Variable>>>>> = Vec::with_capacity(active.len());
        for _i in 0..active.len() {
            let mut per_vehicle = Vec::with_capacity(vehicle_num);
            for _v in 0..vehicle_num {
                let mut per_tail = Vec::with_capacity(node_num);
                for n in 0..node_num {
                    let mut per_head = Vec::with_capacity(node_num);
                    for m in 0..node_num {
                        per_head.push((n != m).then(|| vars.add(variable().binary())));
                    }
                    per_tail.push(per_head);
                }
                per_vehicle.push(per_tail);
            }
            edge.push(per_vehicle);
        }

        let mut constraints = Vec::new();

        // inventory levels per node across the horizon
        let mut holding = Expression::default();
        holding += pb.init_holding_cost();
        for n in 0..node_num {
            let node = &pb.nodes[n];
            let mut level = Expression::default();
            level += node.init_quantity;
            for p in 0..period_num {
                for v in 0..vehicle_num {
                    level += delivery[p][v][n];
                }
                constraints.push(constraint!(level.clone() <= node.capacity));
                level -= node.demands[p];
                constraints.push(constraint!(level.clone() >= node.min_level));
                holding += level.clone() * node.holding_cost;
            }
        }

        // per-vehicle quantity matching
        for p in 0..period_num {
            for v in 0..vehicle_num {
                let mut total = Expression::default();
                for n in 0..node_num {
                    total += delivery[p][v][n];
                }
                constraints.push(constraint!(total == 0.0));
            }
        }

        // routing structure of the active periods
        for (i, &p) in active.iter().enumerate() {
            for v in 0..vehicle_num {
                for n in 0..node_num {
                    let mut in_degree = Expression::default();
                    let mut out_degree = Expression::default();
                    for m in 0..node_num {
                        if let Some(x) = edge[i][v][m][n] {
                            in_degree += x;
                        }
                        if let Some(x) = edge[i][v][n][m] {
                            out_degree += x;
                        }
                    }
                    constraints.push(constraint!(in_degree.clone() == out_degree));
                    let bound = pb.delivery_bound(v, n);
                    let sign = if pb.is_depot(n) { -1.0 } else { 1.0 };
                    constraints
                        .push(constraint!(delivery[p][v][n] * sign <= in_degree.clone() * bound));
                    if !pb.is_depot(n) {
                        // a visited customer receives something
                        constraints.push(constraint!(delivery[p][v][n] >= in_degree.clone()));
                    }
                    constraints.push(constraint!(in_degree <= 1.0));
                }
            }
        }

        // inactive periods keep their current visit gating
        for p in 0..period_num {
            if active.contains(&p) {
                continue;
            }
            for v in 0..vehicle_num {
                for n in 0..node_num {
                    let bound = pb.delivery_bound(v, n);
                    let sign = if pb.is_depot(n) { -1.0 } else { 1.0 };
                    let gate = bound * visits.get(p, n) as u8 as f64;
                    constraints.push(constraint!(delivery[p][v][n] * sign <= gate));
                }
            }
        }

        // accumulated subtour elimination cuts
        for cut in cuts {
            let mut edges = Expression::default();
            for &(n, m) in &cut.edges {
                if let Some(x) = edge[cut.active_idx][cut.vehicle][n][m] {
                    edges += x;
                }
            }
            constraints.push(constraint!(edges <= cut.edges.len() as f64 - 1.0));
        }

        // objective: holding plus randomly emphasized routing; inactive
        // periods contribute their fixed tour prices
        let mut routing_cost = Expression::default();
        for p in 0..period_num {
            if !active.contains(&p) {
                routing_cost += tour_prices[p];
            }
        }
        for (i, _) in active.iter().enumerate() {
            for v in 0..vehicle_num {
                for n in 0..node_num {
                    for m in 0..node_num {
                        if let Some(x) = edge[i][v][n][m] {
                            routing_cost += x * self.routing.at(n, m);
                        }
                    }
                }
            }
        }
        let objective = holding.clone() + routing_cost * tour_cost_factor;

        Model {
            vars,
            delivery,
            edge,
            holding,
            objective,
            constraints,
        }
    }

    /// Repair one integer solution into a feasible plan and swap it into
    /// `sln` if it is strictly better.
    #[allow(clippy::too_many_arguments)]
    fn offer_incumbent(
        &self,
        active: &[PeriodId],
        tour_prices: &[Price],
        sol: &impl good_lp::Solution,
        delivery: &[Vec<Vec<Variable>>],
        edge: &[Vec<Vec<Vec<Option<Variable>>>>],
        holding: &Expression,
        sln: &mut Solution,
        tsp: &CachedTspSolver,
        on_improve: &mut dyn FnMut(&Solution),
    ) {
        let pb = self.problem;
        let node_num = pb.node_num();
        let mut cur = sln.clone();
        let mut total = 0.0;

        for (i, &p) in active.iter().enumerate() {
            for v in 0..pb.vehicle_num() {
                let visited: Vec<NodeId> = (0..node_num)
                    .filter(|&n| {
                        (0..node_num)
                            .any(|m| edge[i][v][n][m].is_some_and(|x| sol.value(x) > 0.5))
                    })
                    .collect();
                let route = &mut cur.period_routes[p].vehicle_routes[v];
                route.deliveries.clear();
                let tour = match tsp.tour(&visited, self.routing) {
                    Some(tour) => tour,
                    // backend failure voids this incumbent, cuts still apply
                    None => return,
                };
                if tour.nodes.len() <= 2 {
                    continue;
                }
                total += tour.price;
                for &n in &tour.nodes[1..] {
                    route.deliveries.push(Delivery {
                        node: n,
                        quantity: sol.value(delivery[p][v][n]).round() as i64,
                    });
                }
            }
        }

        // inactive periods: fixed tours, refreshed quantities
        for p in 0..pb.period_num {
            if active.contains(&p) {
                continue;
            }
            total += tour_prices[p];
            for v in 0..pb.vehicle_num() {
                for d in &mut cur.period_routes[p].vehicle_routes[v].deliveries {
                    d.quantity = sol.value(delivery[p][v][d.node]).round() as i64;
                }
            }
        }

        total += sol.eval(holding);
        cur.total_cost = total;

        if strong_less(cur.total_cost, sln.total_cost) {
            info!(
                "window mip incumbent over {} periods, cost {:.2}",
                active.len(),
                cur.total_cost
            );
            *sln = cur;
            on_improve(sln);
        }
    }

    /// Walk the integral edge sets and collect depot-free cycles according
    /// to the elimination policy.
    fn violated_subtours(
        &self,
        sol: &impl good_lp::Solution,
        edge: &[Vec<Vec<Vec<Option<Variable>>>>],
    ) -> Vec<Cut> {
        let pb = self.problem;
        let node_num = pb.node_num();
        let mut cuts = Vec::new();

        for (i, per_vehicle) in edge.iter().enumerate() {
            for (v, xpv) in per_vehicle.iter().enumerate() {
                let is_true =
                    |n: usize, m: usize| xpv[n][m].is_some_and(|x| sol.value(x) > 0.5);
                let mut visited = vec![false; node_num];
                let mut best: Option<Vec<NodeId>> = None;

                'start: for s in 0..node_num {
                    if visited[s] {
                        continue;
                    }
                    let mut cycle = Vec::new();
                    let mut prev = s;
                    for _step in 0..=node_num {
                        match (0..node_num).find(|&n| n != prev && is_true(prev, n)) {
                            None => {
                                cycle.clear();
                                break;
                            }
                            Some(n) => {
                                if !pb.is_depot(s) {
                                    cycle.push(n);
                                }
                                prev = n;
                                visited[n] = true;
                                if prev == s {
                                    break;
                                }
                            }
                        }
                    }
                    // cycles through a depot are legitimate routes
                    if pb.is_depot(s) || cycle.is_empty() || *cycle.last().unwrap() != s {
                        continue;
                    }

                    match self.policy {
                        SubtourPolicy::All => cuts.push(Self::cut_of(i, v, &cycle)),
                        SubtourPolicy::First => {
                            cuts.push(Self::cut_of(i, v, &cycle));
                            break 'start;
                        }
                        SubtourPolicy::Best => {
                            if best.as_ref().map_or(true, |b| cycle.len() < b.len()) {
                                best = Some(cycle);
                            }
                        }
                    }
                }

                if let Some(cycle) = best {
                    cuts.push(Self::cut_of(i, v, &cycle));
                }
            }
        }
        cuts
    }

    /// The edge set of a cycle given as successor list ending at its start.
    fn cut_of(active_idx: usize, vehicle: usize, cycle: &[NodeId]) -> Cut {
        let mut edges = Vec::with_capacity(cycle.len());
        let mut prev = *cycle.last().unwrap();
        for &n in cycle {
            edges.push((prev, n));
            prev = n;
        }
        Cut {
            active_idx,
            vehicle,
            edges,
        }
    }
}
