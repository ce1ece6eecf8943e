//! Continuous LP over delivery quantities for a fixed visit matrix. The LP
//! is the feasibility oracle of the search: an infeasible model is an
//! ordinary answer (`None`), not an error.

use crate::problem::{Price, Problem, Quantity};
use crate::state::VisitMatrix;
use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError,
    Solution as _, SolverModel, Variable,
};
use log::warn;

/// A priced delivery schedule: `delivery[p][v][n]`, negative at the depot.
#[derive(Debug, Clone)]
pub struct QuantitySchedule {
    pub objective: Price,
    pub delivery: Vec<Vec<Vec<Quantity>>>,
}

/// Builder/solver for the quantity LP of one instance.
pub struct QuantityLp<'a> {
    problem: &'a Problem,
}

impl<'a> QuantityLp<'a> {
    pub fn new(problem: &'a Problem) -> Self {
        QuantityLp { problem }
    }

    /// Minimum holding cost achievable under `visits`, or `None` when no
    /// non-negative delivery schedule fits the visit matrix.
    pub fn objective(&self, visits: &VisitMatrix) -> Option<Price> {
        self.solve(visits).map(|s| s.objective)
    }

    /// Solve the LP and materialize the delivery quantities.
    ///
    /// Per (period, vehicle, node) variable `d`:
    /// depot: `d in [-Q, 0]`, customer: `d in [0, Q]` with
    /// `Q = min(vehicle capacity, node capacity)`; deliveries are gated by
    /// the visit bit; inventory levels stay within the node bounds after
    /// each period; every vehicle's deliveries sum to zero (what it hands
    /// out it picked up at the depot).
    pub fn solve(&self, visits: &VisitMatrix) -> Option<QuantitySchedule> {
        let pb = self.problem;
        let period_num = pb.period_num;
        let vehicle_num = pb.vehicle_num();
        let node_num = pb.node_num();

        let mut vars = ProblemVariables::new();
        let mut d: Vec<Vec<Vec<Variable>>> = Vec::with_capacity(period_num);
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
            d.push(per_vehicle);
        }

        let mut constraints = Vec::new();
        let mut objective = Expression::default();
        objective += pb.init_holding_cost();

        // inventory levels per node across the horizon
        for n in 0..node_num {
            let node = &pb.nodes[n];
            let mut level = Expression::default();
            level += node.init_quantity;
            for p in 0..period_num {
                for v in 0..vehicle_num {
                    level += d[p][v][n];
                }
                constraints.push(constraint!(level.clone() <= node.capacity));
                level -= node.demands[p];
                constraints.push(constraint!(level.clone() >= node.min_level));
                objective += level.clone() * node.holding_cost;
            }
        }

        // visit gating and per-vehicle quantity matching
        for p in 0..period_num {
            for v in 0..vehicle_num {
                let mut total = Expression::default();
                for n in 0..node_num {
                    total += d[p][v][n];
                    let bound = pb.delivery_bound(v, n);
                    let sign = if pb.is_depot(n) { -1.0 } else { 1.0 };
                    let gate = bound * visits.get(p, n) as u8 as f64;
                    constraints.push(constraint!(d[p][v][n] * sign <= gate));
                }
                constraints.push(constraint!(total == 0.0));
            }
        }

        let mut model = vars.minimise(objective.clone()).using(default_solver);
        for c in constraints {
            model = model.with(c);
        }

        match model.solve() {
            Ok(sol) => {
                let delivery = d
                    .iter()
                    .map(|per_vehicle| {
                        per_vehicle
                            .iter()
                            .map(|per_node| per_node.iter().map(|&var| sol.value(var)).collect())
                            .collect()
                    })
                    .collect();
                Some(QuantitySchedule {
                    objective: sol.eval(&objective),
                    delivery,
                })
            }
            Err(ResolutionError::Infeasible) => None,
            Err(e) => {
                warn!("quantity lp failed: {}", e);
                None
            }
        }
    }
}
