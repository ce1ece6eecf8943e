//! Solution representation: per-period, per-vehicle delivery sequences in
//! tour order, plus the submission record written next to them.

use crate::problem::{NodeId, Price, RoutingCost};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Sentinel cost of a not-yet-found solution.
pub const MAX_COST: Price = 1e12;

/// One stop of a vehicle: the visited node and the quantity handed over
/// (negative at the depot, where the vehicle loads up).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Delivery {
    pub node: NodeId,
    pub quantity: i64,
}

/// Deliveries of one vehicle in one period, in tour order. The sequence
/// starts with the first stop after the depot and closes with the depot
/// itself, so consecutive entries (wrapping) are tour edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VehicleRoute {
    pub deliveries: Vec<Delivery>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodRoute {
    #[serde(rename = "vehicleroutes")]
    pub vehicle_routes: Vec<VehicleRoute>,
}

/// A complete plan for the horizon and its objective value.
#[derive(Clone, Serialize, Deserialize)]
pub struct Solution {
    #[serde(rename = "totalcost")]
    pub total_cost: Price,
    #[serde(rename = "periodroutes")]
    pub period_routes: Vec<PeriodRoute>,
}

/// Benchmark metadata stored alongside a solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub thread: String,
    pub instance: String,
    pub duration: String,
    pub obj: Price,
}

#[derive(Serialize)]
struct RecordOut<'a> {
    submission: &'a Submission,
    #[serde(flatten)]
    solution: &'a Solution,
}

#[derive(Deserialize)]
struct RecordIn {
    submission: Option<Submission>,
    #[serde(flatten)]
    solution: Solution,
}

impl Solution {
    /// Empty plan with the given shape and sentinel cost.
    pub fn empty(period_num: usize, vehicle_num: usize, total_cost: Price) -> Self {
        Solution {
            total_cost,
            period_routes: vec![
                PeriodRoute {
                    vehicle_routes: vec![VehicleRoute::default(); vehicle_num],
                };
                period_num
            ],
        }
    }

    pub fn period_num(&self) -> usize {
        self.period_routes.len()
    }

    /// Recompute the routing part of the objective from the delivery
    /// sequences. Each non-empty sequence is a cycle whose closing entry is
    /// the depot.
    pub fn routing_price(&self, routing: &RoutingCost) -> Price {
        let mut total = 0.0;
        for period in &self.period_routes {
            for route in &period.vehicle_routes {
                let delivs = &route.deliveries;
                if delivs.is_empty() {
                    continue;
                }
                let mut prev = delivs[delivs.len() - 1].node;
                for d in delivs {
                    total += routing.at(prev, d.node);
                    prev = d.node;
                }
            }
        }
        total
    }

    /// Customers visited in period `p` across all vehicles (depot omitted).
    pub fn visited_customers(&self, p: usize, depot_num: usize) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        for route in &self.period_routes[p].vehicle_routes {
            for d in &route.deliveries {
                if d.node >= depot_num {
                    nodes.push(d.node);
                }
            }
        }
        nodes
    }

    /// Write the solution and its submission record as one JSON document.
    pub fn save<P: AsRef<Path>>(&self, path: P, submission: &Submission) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(
            file,
            &RecordOut {
                submission,
                solution: self,
            },
        )
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Read a solution document written by [`Solution::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<(Self, Option<Submission>)> {
        let file = File::open(path)?;
        let record: RecordIn = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok((record.solution, record.submission))
    }
}

impl fmt::Debug for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Solution (cost {:.2}):", self.total_cost)?;
        for (p, period) in self.period_routes.iter().enumerate() {
            for (v, route) in period.vehicle_routes.iter().enumerate() {
                if route.deliveries.is_empty() {
                    continue;
                }
                write!(f, "  p{} v{}:", p, v)?;
                for d in &route.deliveries {
                    write!(f, " {}({})", d.node, d.quantity)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
