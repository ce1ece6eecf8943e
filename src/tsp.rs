//! TSP repair for the per-period tours: an exchangeable backend produces a
//! Hamiltonian cycle on a node subset, and a shared persistent cache
//! remembers the cheapest tour seen for every subset.

use crate::problem::{NodeId, Price, RoutingCost};
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// A closed tour `[0, v1, .., vk, 0]` starting and ending at the depot,
/// priced on the routing matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Tour {
    pub nodes: Vec<NodeId>,
    pub price: Price,
}

impl Tour {
    /// The empty route.
    pub fn empty() -> Self {
        Tour {
            nodes: vec![0, 0],
            price: 0.0,
        }
    }
}

/// The external cycle solver. Implementations get the distance submatrix of
/// the subset and return a cyclic visiting order as index permutation, or
/// `None` on backend failure (the caller then drops the current evaluation).
pub trait TspBackend: Send + Sync {
    fn solve(&self, dist: &[Vec<Price>]) -> Option<Vec<usize>>;
}

/// Built-in backend: deterministic nearest-neighbour construction followed
/// by 2-opt and single-node Or-opt descent. Good tours, not provably
/// optimal, which is all the cache contract asks for.
#[derive(Debug, Default)]
pub struct TwoOptBackend;

impl TwoOptBackend {
    fn tour_len(dist: &[Vec<Price>], order: &[usize]) -> Price {
        let k = order.len();
        (0..k).map(|i| dist[order[i]][order[(i + 1) % k]]).sum()
    }

    fn nearest_neighbour(dist: &[Vec<Price>]) -> Vec<usize> {
        let k = dist.len();
        let mut order = Vec::with_capacity(k);
        let mut used = vec![false; k];
        let mut cur = 0;
        used[0] = true;
        order.push(0);
        for _ in 1..k {
            let mut best = usize::MAX;
            let mut best_d = Price::INFINITY;
            for (j, &seen) in used.iter().enumerate() {
                if !seen && dist[cur][j] < best_d {
                    best_d = dist[cur][j];
                    best = j;
                }
            }
            used[best] = true;
            order.push(best);
            cur = best;
        }
        order
    }

    /// Reverse segments while any reversal shortens the cycle.
    fn two_opt(dist: &[Vec<Price>], order: &mut [usize]) {
        let k = order.len();
        let mut improved = true;
        while improved {
            improved = false;
            for i in 0..k - 1 {
                for j in i + 2..k {
                    if i == 0 && j == k - 1 {
                        continue;
                    }
                    let (a, b) = (order[i], order[i + 1]);
                    let (c, d) = (order[j], order[(j + 1) % k]);
                    let delta = dist[a][c] + dist[b][d] - dist[a][b] - dist[c][d];
                    if delta < -1e-9 {
                        order[i + 1..=j].reverse();
                        improved = true;
                    }
                }
            }
        }
    }

    /// Relocate single nodes while any relocation shortens the cycle.
    fn or_opt(dist: &[Vec<Price>], order: &mut Vec<usize>) {
        let k = order.len();
        if k < 4 {
            return;
        }
        let mut improved = true;
        while improved {
            improved = false;
            for i in 0..k {
                let node = order[i];
                let prev = order[(i + k - 1) % k];
                let next = order[(i + 1) % k];
                let removal = dist[prev][next] - dist[prev][node] - dist[node][next];
                let mut best_delta = -1e-9;
                let mut best_pos = None;
                for j in 0..k {
                    if j == i || (j + 1) % k == i {
                        continue;
                    }
                    let (a, b) = (order[j], order[(j + 1) % k]);
                    let insertion = dist[a][node] + dist[node][b] - dist[a][b];
                    let delta = removal + insertion;
                    if delta < best_delta {
                        best_delta = delta;
                        best_pos = Some(j);
                    }
                }
                if let Some(j) = best_pos {
                    let node = order.remove(i);
                    // removing i shifts every later position left by one
                    let anchor = if j < i { j } else { j - 1 };
                    order.insert(anchor + 1, node);
                    improved = true;
                }
            }
        }
    }
}

impl TspBackend for TwoOptBackend {
    fn solve(&self, dist: &[Vec<Price>]) -> Option<Vec<usize>> {
        let mut order = Self::nearest_neighbour(dist);
        Self::two_opt(dist, &mut order);
        let mut relocated = order.clone();
        Self::or_opt(dist, &mut relocated);
        Self::two_opt(dist, &mut relocated);
        if Self::tour_len(dist, &relocated) < Self::tour_len(dist, &order) {
            order = relocated;
        }
        Some(order)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    price: Price,
    /// Cyclic order starting at the depot, closing hop omitted.
    nodes: Vec<NodeId>,
}

/// Persistent subset-to-tour map shared by all workers. The file is a flat
/// CSV `fingerprint,cost,node sequence`; loads on construction, rewrites
/// atomically (temp file then rename) on every improvement.
pub struct TspCache {
    path: Option<PathBuf>,
    map: RwLock<HashMap<String, CacheEntry>>,
}

impl TspCache {
    /// In-memory cache without persistence.
    pub fn in_memory() -> Self {
        TspCache {
            path: None,
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Cache backed by `path`. A missing or unreadable file starts empty.
    pub fn with_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut map = HashMap::new();
        if let Ok(text) = fs::read_to_string(&path) {
            for line in text.lines() {
                let mut fields = line.splitn(3, ',');
                let (fp, price, seq) = match (fields.next(), fields.next(), fields.next()) {
                    (Some(a), Some(b), Some(c)) => (a, b, c),
                    _ => continue,
                };
                let price: Price = match price.trim().parse() {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let nodes: Vec<NodeId> = seq
                    .split_whitespace()
                    .filter_map(|t| t.parse().ok())
                    .collect();
                if !nodes.is_empty() {
                    map.insert(fp.trim().to_string(), CacheEntry { price, nodes });
                }
            }
        }
        TspCache {
            path: Some(path),
            map: RwLock::new(map),
        }
    }

    /// Canonical key of a node subset: sorted ids joined by dashes.
    pub fn fingerprint(nodes: &[NodeId]) -> String {
        let mut sorted = nodes.to_vec();
        sorted.sort_unstable();
        let mut key = String::with_capacity(sorted.len() * 4);
        for (i, n) in sorted.iter().enumerate() {
            if i > 0 {
                key.push('-');
            }
            key.push_str(&n.to_string());
        }
        key
    }

    fn get(&self, fingerprint: &str) -> Option<(Price, Vec<NodeId>)> {
        let map = self.map.read().expect("tsp cache poisoned");
        map.get(fingerprint).map(|e| (e.price, e.nodes.clone()))
    }

    /// Keep the cheaper of the stored and offered tours, then persist.
    fn update(&self, fingerprint: String, price: Price, nodes: Vec<NodeId>) {
        {
            let mut map = self.map.write().expect("tsp cache poisoned");
            let improves = map.get(&fingerprint).map_or(true, |e| price < e.price);
            if !improves {
                return;
            }
            map.insert(fingerprint, CacheEntry { price, nodes });
        }
        if let Err(e) = self.persist() {
            warn!("tsp cache write failed: {}", e);
        }
    }

    fn persist(&self) -> io::Result<()> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        let map = self.map.read().expect("tsp cache poisoned");
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            for (fp, entry) in map.iter() {
                let seq: Vec<String> = entry.nodes.iter().map(|n| n.to_string()).collect();
                writeln!(file, "{},{},{}", fp, entry.price, seq.join(" "))?;
            }
        }
        fs::rename(tmp, path)
    }

    pub fn len(&self) -> usize {
        self.map.read().expect("tsp cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// TSP repair entry point: trivial subsets are answered directly, larger
/// ones through the cache and the backend.
pub struct CachedTspSolver<'a> {
    cache: &'a TspCache,
    backend: Box<dyn TspBackend>,
}

impl<'a> CachedTspSolver<'a> {
    pub fn new(cache: &'a TspCache) -> Self {
        CachedTspSolver {
            cache,
            backend: Box::new(TwoOptBackend),
        }
    }

    pub fn with_backend(cache: &'a TspCache, backend: Box<dyn TspBackend>) -> Self {
        CachedTspSolver { cache, backend }
    }

    /// Cheapest known cycle through `nodes` (the depot is added if absent).
    /// `None` only on backend failure; the cache is left untouched then.
    pub fn tour(&self, nodes: &[NodeId], routing: &RoutingCost) -> Option<Tour> {
        let mut subset: Vec<NodeId> = nodes.to_vec();
        if !subset.contains(&0) {
            subset.push(0);
        }
        subset.sort_unstable();
        subset.dedup();

        match subset.len() {
            0 | 1 => Some(Tour::empty()),
            2 => {
                let other = subset[1];
                Some(Tour {
                    price: 2.0 * routing.at(0, other),
                    nodes: vec![0, other, 0],
                })
            }
            _ => self.repair(&subset, routing),
        }
    }

    fn repair(&self, subset: &[NodeId], routing: &RoutingCost) -> Option<Tour> {
        let fingerprint = TspCache::fingerprint(subset);
        if let Some((price, open)) = self.cache.get(&fingerprint) {
            let mut nodes = open;
            let start = nodes[0];
            nodes.push(start);
            return Some(Tour { nodes, price });
        }

        let k = subset.len();
        let mut dist = vec![vec![0.0; k]; k];
        for (i, &a) in subset.iter().enumerate() {
            for (j, &b) in subset.iter().enumerate() {
                dist[i][j] = routing.at(a, b);
            }
        }
        let order = self.backend.solve(&dist)?;
        debug_assert_eq!(order.len(), k);

        let mut cycle: Vec<NodeId> = order.into_iter().map(|i| subset[i]).collect();
        let depot_pos = cycle
            .iter()
            .position(|&n| n == 0)
            .expect("depot must be on the repaired tour");
        cycle.rotate_left(depot_pos);

        let mut closed = cycle.clone();
        closed.push(0);
        let price = routing.walk_price(&closed);

        self.cache.update(fingerprint, price, cycle);
        Some(Tour {
            nodes: closed,
            price,
        })
    }
}
