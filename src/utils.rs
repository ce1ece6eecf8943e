//! Small helpers shared across the solver: wallclock budgeting, tolerant
//! floating-point comparisons, and reservoir sampling.

use rand::rngs::StdRng;
use rand::Rng;
use std::time::{Duration, Instant};

/// Absolute tolerance for cost comparisons. Costs are sums of rounded
/// Euclidean distances and integral holding costs, so anything far below one
/// cost unit is noise.
pub const COST_EPSILON: f64 = 1e-6;

/// `a < b` by more than the cost tolerance.
pub fn strong_less(a: f64, b: f64) -> bool {
    a < b - COST_EPSILON
}

/// `a == b` within the cost tolerance.
pub fn weak_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= COST_EPSILON
}

/// A monotonic deadline. Copied freely; every outer loop, move evaluation and
/// model iteration checks it before doing more work.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
    end: Instant,
}

impl Timer {
    /// Start a timer that expires `budget` from now.
    pub fn new(budget: Duration) -> Self {
        let start = Instant::now();
        Timer {
            start,
            end: start + budget,
        }
    }

    /// Start a timer that expires `budget` after an earlier origin.
    pub fn from_origin(origin: Instant, budget: Duration) -> Self {
        Timer {
            start: origin,
            end: origin + budget,
        }
    }

    pub fn start_time(&self) -> Instant {
        self.start
    }

    pub fn end_time(&self) -> Instant {
        self.end
    }

    pub fn is_time_out(&self) -> bool {
        Instant::now() >= self.end
    }

    /// Remaining budget, zero once expired.
    pub fn rest(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Format a duration as hours, minutes, and seconds.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}h {:02}m {:02}s", hours, minutes, seconds)
}

/// Uniform reservoir sample of `k` items from `pool`.
pub fn sample<T: Copy>(pool: &[T], k: usize, rng: &mut StdRng) -> Vec<T> {
    let k = k.min(pool.len());
    let mut res: Vec<T> = pool[..k].to_vec();
    for i in k..pool.len() {
        let r = rng.gen_range(0..=i);
        if r < k {
            res[r] = pool[i];
        }
    }
    res
}

/// Peak physical/virtual memory of this process in kilobytes, best effort.
pub fn peak_memory_usage() -> (u64, u64) {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let grab = |key: &str| {
                status
                    .lines()
                    .find(|l| l.starts_with(key))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0)
            };
            return (grab("VmHWM:"), grab("VmPeak:"));
        }
    }
    (0, 0)
}
