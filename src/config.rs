//! Configuration of the matheuristic and the run environment.

use crate::mip::SubtourPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

impl Serialize for SubtourPolicy {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let name = match self {
            SubtourPolicy::First => "first",
            SubtourPolicy::Best => "best",
            SubtourPolicy::All => "all",
        };
        s.serialize_str(name)
    }
}

impl<'de> Deserialize<'de> for SubtourPolicy {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let name = String::deserialize(d)?;
        match name.as_str() {
            "first" => Ok(SubtourPolicy::First),
            "best" => Ok(SubtourPolicy::Best),
            "all" => Ok(SubtourPolicy::All),
            other => Err(serde::de::Error::custom(format!(
                "unknown subtour policy `{}`",
                other
            ))),
        }
    }
}

/// Tunable parameters of the search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Solver threads granted to each worker; the worker count is
    /// `jobs / threads_per_worker`.
    pub threads_per_worker: usize,
    /// Tabu steps without improvement before a run gives up.
    pub alpha: usize,
    /// Size of each tabu bit array; must be a power of two.
    pub tabu_bit_size: usize,
    /// The three hash exponents; distinct values in (0,1) or (1,2].
    pub tabu_gammas: [f64; 3],
    /// Wallclock budget of every window MIP invocation.
    pub window_time_limit: Duration,
    /// Total search budget after startup.
    pub search_budget: Duration,
    /// Which subtours to cut per integer solution.
    pub subtour_policy: SubtourPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            threads_per_worker: 4,
            alpha: 100,
            tabu_bit_size: 1 << 24,
            tabu_gammas: [0.6, 1.2, 1.8],
            window_time_limit: Duration::from_secs(120),
            search_budget: Duration::from_secs(2100),
            subtour_policy: SubtourPolicy::Best,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    /// Load from a JSON file; missing fields keep their defaults. A missing
    /// or empty path yields the default configuration.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Self {
        match path {
            Some(p) => std::fs::read_to_string(p)
                .ok()
                .and_then(|text| serde_json::from_str(&text).ok())
                .unwrap_or_default(),
            None => Config::default(),
        }
    }

    /// Compact textual form for the run log.
    pub fn brief(&self) -> String {
        format!(
            "a{};b{};g{:.2}/{:.2}/{:.2};w{}",
            self.alpha,
            self.tabu_bit_size,
            self.tabu_gammas[0],
            self.tabu_gammas[1],
            self.tabu_gammas[2],
            self.window_time_limit.as_secs()
        )
    }

    pub fn with_alpha(mut self, alpha: usize) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_threads_per_worker(mut self, threads: usize) -> Self {
        self.threads_per_worker = threads.max(1);
        self
    }

    pub fn with_tabu_bit_size(mut self, size: usize) -> Self {
        self.tabu_bit_size = size;
        self
    }

    pub fn with_window_time_limit(mut self, limit: Duration) -> Self {
        self.window_time_limit = limit;
        self
    }

    pub fn with_search_budget(mut self, budget: Duration) -> Self {
        self.search_budget = budget;
        self
    }

    pub fn with_subtour_policy(mut self, policy: SubtourPolicy) -> Self {
        self.subtour_policy = policy;
        self
    }
}

/// Wallclock reserved for serializing the final solution.
const SAVE_SOLUTION_TIME: Duration = Duration::from_millis(500);

/// Where and how one run executes: paths, seed, budget, parallelism.
#[derive(Debug, Clone)]
pub struct Environment {
    pub instance_path: PathBuf,
    pub solution_path: PathBuf,
    pub rand_seed: u64,
    pub timeout: Duration,
    pub max_iter: u64,
    pub job_num: usize,
    pub run_id: String,
    pub config_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            instance_path: PathBuf::new(),
            solution_path: PathBuf::new(),
            rand_seed: 0,
            timeout: Duration::from_secs(3600),
            max_iter: u64::MAX,
            job_num: 0,
            run_id: String::new(),
            config_path: None,
            log_path: None,
        }
    }
}

impl Environment {
    /// Clamp the worker budget to the machine and keep some wallclock for
    /// writing the solution.
    pub fn calibrate(&mut self) {
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if self.job_num == 0 || self.job_num > hardware {
            self.job_num = hardware;
        }
        self.timeout = self.timeout.saturating_sub(SAVE_SOLUTION_TIME);
    }

    /// Instance name without directories or extension.
    pub fn friendly_instance_name(&self) -> String {
        self.instance_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Location of the shared TSP cache for this instance.
    pub fn tsp_cache_path(&self) -> PathBuf {
        PathBuf::from("TspCache").join(format!("{}.csv", self.friendly_instance_name()))
    }
}
