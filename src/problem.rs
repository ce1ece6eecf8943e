//! Problem definition and data structures for the inventory routing problem.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Node index. Depots occupy `[0, depot_num)`, customers the rest.
pub type NodeId = usize;
/// Planning period index.
pub type PeriodId = usize;
/// Vehicle index.
pub type VehicleId = usize;
/// Routing or holding cost.
pub type Price = f64;
/// Product quantity (continuous inside the LP, rounded on output).
pub type Quantity = f64;

/// A node of the distribution network, either a depot or a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "initquantity")]
    pub init_quantity: Quantity,
    pub capacity: Quantity,
    #[serde(rename = "minlevel")]
    pub min_level: Quantity,
    #[serde(rename = "holdingcost")]
    pub holding_cost: Price,
    /// Per-period demand. Negative at the depot (production).
    pub demands: Vec<Quantity>,
}

/// One vehicle of the homogeneous fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub capacity: Quantity,
}

/// An inventory routing instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "periodnum")]
    pub period_num: usize,
    #[serde(rename = "depotnum")]
    pub depot_num: usize,
    pub vehicles: Vec<Vehicle>,
    pub nodes: Vec<Node>,
}

impl Problem {
    pub fn node_num(&self) -> usize {
        self.nodes.len()
    }

    pub fn vehicle_num(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_depot(&self, n: NodeId) -> bool {
        n < self.depot_num
    }

    /// Customer indices, `[depot_num, node_num)`.
    pub fn customers(&self) -> std::ops::Range<NodeId> {
        self.depot_num..self.node_num()
    }

    /// The tighter of vehicle and node capacity, the delivery bound for
    /// every `d[p][v][n]` variable.
    pub fn delivery_bound(&self, v: VehicleId, n: NodeId) -> Quantity {
        self.vehicles[v].capacity.min(self.nodes[n].capacity)
    }

    /// Holding cost charged for the initial stocks, a constant part of every
    /// objective.
    pub fn init_holding_cost(&self) -> Price {
        self.nodes
            .iter()
            .map(|node| node.holding_cost * node.init_quantity)
            .sum()
    }

    /// Load an instance from its JSON form.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn save_json_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Load an instance from the legacy text form:
    /// `nodeNum periodNum vehicleCapacity`, a supplier line
    /// `id x y initQuantity unitDemand holdingCost`, then per-customer lines
    /// `id x y initQuantity capacity minLevel unitDemand holdingCost`.
    /// Demands are constant across periods; the supplier produces
    /// (negative demand) and its capacity covers the whole horizon. The fleet
    /// shares the given capacity evenly.
    pub fn from_legacy_text<P: AsRef<Path>>(path: P, vehicle_num: usize, depot_num: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut tokens = Vec::new();
        for line in reader.lines() {
            let line = line?;
            tokens.extend(
                line.split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>(),
            );
        }
        let mut it = tokens.into_iter();
        let mut next_f64 = move || -> io::Result<f64> {
            it.next()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated instance"))?
                .parse::<f64>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        };

        let node_num = next_f64()? as usize;
        let period_num = next_f64()? as usize;
        let shared_capacity = next_f64()?;

        let vehicle_num = vehicle_num.max(1);
        let vehicles = vec![
            Vehicle {
                capacity: (shared_capacity / vehicle_num as f64).floor(),
            };
            vehicle_num
        ];

        let mut nodes = Vec::with_capacity(node_num);

        // supplier
        let _id = next_f64()?;
        let x = next_f64()?;
        let y = next_f64()?;
        let init_quantity = next_f64()?;
        let unit_demand = next_f64()?;
        let holding_cost = next_f64()?;
        nodes.push(Node {
            x,
            y,
            init_quantity,
            capacity: init_quantity + unit_demand * period_num as f64,
            min_level: 0.0,
            holding_cost,
            demands: vec![-unit_demand; period_num],
        });

        // customers
        for _ in 1..node_num {
            let _id = next_f64()?;
            let x = next_f64()?;
            let y = next_f64()?;
            let init_quantity = next_f64()?;
            let capacity = next_f64()?;
            let min_level = next_f64()?;
            let unit_demand = next_f64()?;
            let holding_cost = next_f64()?;
            nodes.push(Node {
                x,
                y,
                init_quantity,
                capacity,
                min_level,
                holding_cost,
                demands: vec![unit_demand; period_num],
            });
        }

        Ok(Problem {
            period_num,
            depot_num,
            vehicles,
            nodes,
        })
    }
}

/// Symmetric matrix of rounded Euclidean distances between all nodes.
#[derive(Debug, Clone)]
pub struct RoutingCost {
    size: usize,
    costs: Vec<Price>,
}

impl RoutingCost {
    /// Build the matrix once from the node coordinates. Rounding is
    /// half-away-from-zero, applied when the matrix is built and nowhere
    /// else.
    pub fn new(problem: &Problem) -> Self {
        let size = problem.node_num();
        let mut costs = vec![0.0; size * size];
        for i in 0..size {
            for j in 0..i {
                let a = &problem.nodes[i];
                let b = &problem.nodes[j];
                let value = (a.x - b.x).hypot(a.y - b.y).round();
                costs[i * size + j] = value;
                costs[j * size + i] = value;
            }
        }
        RoutingCost { size, costs }
    }

    #[inline]
    pub fn at(&self, i: NodeId, j: NodeId) -> Price {
        self.costs[i * self.size + j]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Price of a closed or open walk given as a node sequence.
    pub fn walk_price(&self, walk: &[NodeId]) -> Price {
        walk.windows(2).map(|w| self.at(w[0], w[1])).sum()
    }
}
