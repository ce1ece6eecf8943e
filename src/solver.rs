//! Solver orchestration: fans independent workers out over the instance,
//! runs each worker's MIP / tabu-search state machine, and keeps the best
//! plan any of them found.

use crate::checker;
use crate::config::{Config, Environment};
use crate::mip::WindowMip;
use crate::problem::{NodeId, PeriodId, Price, Problem, RoutingCost};
use crate::search::{disturb, neighborhood, SearchContext};
use crate::solution::{Delivery, Solution, MAX_COST};
use crate::state::{TourPlan, VisitMatrix};
use crate::tabu::TabuMemory;
use crate::tsp::TspCache;
use crate::utils::{self, strong_less, Timer};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Outcome metadata of one solve call.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Start to the moment the returned solution was found.
    pub duration: Duration,
    /// Index of the winning worker, if any succeeded.
    pub best_worker: Option<usize>,
    /// Disturb/restart rounds of the winning worker.
    pub iterations: u64,
}

/// Entry point tying an instance, an environment and a configuration
/// together.
pub struct Solver {
    problem: Problem,
    pub env: Environment,
    config: Config,
}

struct WorkerResult {
    solution: Solution,
    best_sln_time: Instant,
    iterations: u64,
}

impl Solver {
    pub fn new(problem: Problem, env: Environment, config: Config) -> Self {
        Solver {
            problem,
            env,
            config,
        }
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// Run all workers to completion and keep the cheapest plan. Always
    /// returns a solution; an unsolvable run yields the empty plan with the
    /// sentinel cost.
    pub fn solve(&mut self) -> (Solution, SolveReport) {
        let timer = Timer::new(self.env.timeout);
        let routing = RoutingCost::new(&self.problem);
        let cache = if self.env.instance_path.as_os_str().is_empty() {
            TspCache::in_memory()
        } else {
            let path = self.env.tsp_cache_path();
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            TspCache::with_file(path)
        };

        let worker_num = (self.env.job_num / self.config.threads_per_worker).max(1);
        info!("launching {} workers", worker_num);

        let results: Vec<Option<WorkerResult>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..worker_num)
                .map(|id| {
                    let problem = &self.problem;
                    let routing = &routing;
                    let cache = &cache;
                    let config = &self.config;
                    let env = &self.env;
                    s.spawn(move || {
                        Worker::new(problem, routing, cache, config, env, id, timer).optimize()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(None))
                .collect()
        });

        let mut best: Option<(usize, WorkerResult)> = None;
        for (id, result) in results.into_iter().enumerate() {
            let result = match result {
                Some(r) => r,
                None => continue,
            };
            info!("worker {} got {:.2}", id, result.solution.total_cost);
            if best
                .as_ref()
                .map_or(true, |(_, b)| result.solution.total_cost < b.solution.total_cost)
            {
                best = Some((id, result));
            }
        }

        match best {
            Some((id, result)) => {
                self.env.run_id = id.to_string();
                let report = SolveReport {
                    duration: result
                        .best_sln_time
                        .saturating_duration_since(timer.start_time()),
                    best_worker: Some(id),
                    iterations: result.iterations,
                };
                info!(
                    "best solution {:.2} found after {}",
                    result.solution.total_cost,
                    utils::format_duration(report.duration)
                );
                (result.solution, report)
            }
            None => (
                Solution::empty(self.problem.period_num, self.problem.vehicle_num(), MAX_COST),
                SolveReport {
                    duration: timer.elapsed(),
                    best_worker: None,
                    iterations: 0,
                },
            ),
        }
    }

    /// Append one line to the run log, creating it with the CSV header when
    /// empty. Checker disagreements are logged, never propagated.
    pub fn record(&self, sln: &Solution, report: &SolveReport) {
        static LOG_MUTEX: Mutex<()> = Mutex::new(());

        let log_path = match &self.env.log_path {
            Some(p) => p,
            None => return,
        };

        let routing = RoutingCost::new(&self.problem);
        let (feasible, obj_match) = match checker::check(&self.problem, &routing, sln) {
            Ok(obj) => (true, obj - sln.total_cost),
            Err(flags) => {
                warn!("checker flags: {:?}", flags);
                (false, f64::NAN)
            }
        };
        let (min_cost, ref_cost, ref_duration) = self.baseline_entry().unwrap_or_default();
        let (phys_mem, virt_mem) = utils::peak_memory_usage();
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let line = format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},",
            stamp,
            self.env.run_id,
            self.env.instance_path.display(),
            feasible as u8,
            obj_match,
            sln.total_cost,
            min_cost,
            ref_cost,
            report.duration.as_secs_f64(),
            ref_duration,
            phys_mem,
            virt_mem,
            self.env.rand_seed,
            self.config.brief(),
            0,
            report.iterations,
        );

        let _guard = LOG_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let need_header = std::fs::metadata(log_path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
        {
            Ok(mut file) => {
                if need_header {
                    let _ = writeln!(
                        file,
                        "Time,ID,Instance,Feasible,ObjMatch,Cost,MinCost,RefCost,Duration,\
                         RefDuration,PhysMem,VirtMem,RandSeed,Config,Generation,Iteration,Solution"
                    );
                }
                let _ = writeln!(file, "{}", line);
            }
            Err(e) => warn!("cannot open run log: {}", e),
        }
    }

    /// Reference results for this instance from a `Baseline.csv` next to it:
    /// `instance,bestObj,refObj,refTime`.
    fn baseline_entry(&self) -> Option<(String, String, String)> {
        let dir = self.env.instance_path.parent()?;
        let text = std::fs::read_to_string(Path::new(dir).join("Baseline.csv")).ok()?;
        let name = self.env.friendly_instance_name();
        for line in text.lines() {
            let mut fields = line.split(',');
            if fields.next() != Some(name.as_str()) {
                continue;
            }
            return Some((
                fields.next().unwrap_or_default().to_string(),
                fields.next().unwrap_or_default().to_string(),
                fields.next().unwrap_or_default().to_string(),
            ));
        }
        None
    }
}

/// One independent search: owns its RNG, tabu memory and state machine;
/// shares only the TSP cache with its siblings.
struct Worker<'a> {
    env: &'a Environment,
    config: &'a Config,
    ctx: SearchContext<'a>,
    mip: WindowMip<'a>,
    tabu: TabuMemory,
    rng: StdRng,
    id: usize,
    timer: Timer,
    search: Timer,
    cur_visits: VisitMatrix,
    best_visits: VisitMatrix,
    tour_plan: TourPlan,
    best_cost: Price,
    best_sln_time: Instant,
    iterations: u64,
}

impl<'a> Worker<'a> {
    fn new(
        problem: &'a Problem,
        routing: &'a RoutingCost,
        cache: &'a TspCache,
        config: &'a Config,
        env: &'a Environment,
        id: usize,
        timer: Timer,
    ) -> Self {
        Worker {
            env,
            config,
            ctx: SearchContext::new(problem, routing, cache),
            mip: WindowMip::new(problem, routing, config.subtour_policy),
            tabu: TabuMemory::new(config.tabu_bit_size, config.tabu_gammas, problem.node_num()),
            rng: StdRng::seed_from_u64(env.rand_seed.wrapping_add(id as u64)),
            id,
            timer,
            search: timer,
            cur_visits: VisitMatrix::new(problem),
            best_visits: VisitMatrix::new(problem),
            tour_plan: TourPlan::new(problem.period_num),
            best_cost: MAX_COST,
            best_sln_time: timer.start_time(),
            iterations: 0,
        }
    }

    fn optimize(mut self) -> Option<WorkerResult> {
        info!("worker {} starts", self.id);
        let problem = self.ctx.problem;
        let mut sln = Solution::empty(problem.period_num, problem.vehicle_num(), MAX_COST);
        self.exec_search(&mut sln);
        info!("worker {} ends", self.id);

        if sln.total_cost >= MAX_COST {
            return None;
        }
        Some(WorkerResult {
            solution: sln,
            best_sln_time: self.best_sln_time,
            iterations: self.iterations,
        })
    }

    /// The search state machine: warm start, full-horizon MIP, sliding
    /// window MIPs of width 3 then twice width 2, one tabu run from the
    /// best matrix, then disturb/restart until the budget expires.
    fn exec_search(&mut self, sln: &mut Solution) {
        let budget = self.config.search_budget.min(self.env.timeout);
        self.search = Timer::from_origin(self.timer.start_time(), budget);
        let period_num = self.ctx.problem.period_num;

        self.warm_start(sln);

        let all_periods: Vec<PeriodId> = (0..period_num).collect();
        self.run_window(sln, &all_periods, self.env.timeout);

        for p in 0..period_num.saturating_sub(2) {
            self.run_window(sln, &[p, p + 1, p + 2], self.config.window_time_limit);
        }
        for _ in 0..2 {
            for p in 0..period_num.saturating_sub(1) {
                self.run_window(sln, &[p, p + 1], self.config.window_time_limit);
            }
        }

        self.cur_visits = self.best_visits.clone();
        self.tabu_search();
        self.final_search();

        self.extract_best(sln);
    }

    /// Seed the plan with the all-visit schedule so a best solution exists
    /// from the very start.
    fn warm_start(&mut self, sln: &mut Solution) {
        let visits = VisitMatrix::full(self.ctx.problem);
        let schedule = match self.ctx.lp.solve(&visits) {
            Some(s) => s,
            None => return,
        };
        if let Some(candidate) = self.materialize(&visits, &schedule) {
            if strong_less(candidate.total_cost, sln.total_cost) {
                *sln = candidate;
                self.best_sln_time = Instant::now();
            }
            self.sync_from_solution(sln);
        }
    }

    /// One MIP re-optimization of `active` periods followed by a state
    /// refresh from the (possibly improved) incumbent.
    fn run_window(&mut self, sln: &mut Solution, active: &[PeriodId], budget: Duration) {
        if self.search.is_time_out() {
            return;
        }
        let timer = Timer::new(budget.min(self.search.rest()));
        let mut improved_at = None;
        {
            let mut on_improve = |_: &Solution| improved_at = Some(Instant::now());
            self.mip.optimize(
                active,
                &self.best_visits,
                &self.tour_plan.prices,
                sln,
                &self.ctx.tsp,
                timer,
                &mut self.rng,
                &mut on_improve,
            );
        }
        if let Some(at) = improved_at {
            self.best_sln_time = at;
        }
        self.sync_from_solution(sln);
    }

    /// Adopt `sln` as the reference plan: reset the best matrix, rebuild
    /// the per-period tours from its delivery sequences and take its cost
    /// as the incumbent cost.
    fn sync_from_solution(&mut self, sln: &Solution) {
        let problem = self.ctx.problem;
        self.best_cost = sln.total_cost;
        self.best_visits = VisitMatrix::new(problem);
        for p in 0..problem.period_num {
            let mut tour: Vec<NodeId> = Vec::new();
            for route in &sln.period_routes[p].vehicle_routes {
                let delivs = &route.deliveries;
                if delivs.is_empty() {
                    continue;
                }
                tour.push(delivs[delivs.len() - 1].node);
                for d in delivs {
                    self.best_visits.set(p, d.node, true);
                    tour.push(d.node);
                }
            }
            if tour.is_empty() {
                tour = vec![0, 0];
            }
            self.tour_plan.prices[p] = self.ctx.routing.walk_price(&tour);
            self.tour_plan.tours[p] = tour;
        }
    }

    /// Tabu run on the current matrix: up to `alpha` steps without
    /// improvement, every improvement restarting the window.
    fn tabu_search(&mut self) -> bool {
        self.tabu.commit_state(&self.cur_visits);
        let mut improved = false;
        let mut step = 0;
        while !self.search.is_time_out() && step < self.config.alpha {
            let candidates = neighborhood::build(
                &self.ctx,
                &mut self.cur_visits,
                &self.tour_plan,
                &mut self.tabu,
                &self.search,
            );
            if candidates.is_empty() {
                break;
            }
            let cand = candidates[self.rng.gen_range(0..candidates.len())].clone();
            cand.mv.apply(&mut self.cur_visits);
            let touched = cand.mv.touched_periods();
            let total = match self.tour_plan.rebuild(
                &touched,
                &self.cur_visits,
                &self.ctx.tsp,
                self.ctx.routing,
            ) {
                Some(routing_total) => cand.lp_cost + routing_total,
                None => {
                    // tsp backend failure: the move evaluation is void
                    cand.mv.revert(&mut self.cur_visits);
                    break;
                }
            };
            self.tabu.commit_move(&cand.mv);
            if strong_less(total, self.best_cost) {
                improved = true;
                step = 0;
                self.take_best(total);
                continue;
            }
            step += 1;
        }
        improved
    }

    /// Disturb/restart loop: with decaying probability (never below one
    /// half) restart from the best matrix, shake it, and run tabu again.
    fn final_search(&mut self) {
        let mut round: i32 = 0;
        while !self.search.is_time_out() && (round as u64) < self.env.max_iter {
            let threshold = (100_000.0 * 0.99f64.powi(round)).max(50_000.0) as u32;
            if self.rng.gen_range(0..100_000u32) < threshold {
                self.cur_visits = self.best_visits.clone();
            }
            self.shake_and_search();
            self.iterations += 1;
            round = round.saturating_add(1);
        }
    }

    fn shake_and_search(&mut self) {
        disturb::shake(
            &self.ctx,
            &mut self.cur_visits,
            &self.tabu,
            &mut self.rng,
            &self.search,
        );
        let lp_cost = self.ctx.lp.objective(&self.cur_visits);
        let routing_total =
            self.tour_plan
                .rebuild_all(&self.cur_visits, &self.ctx.tsp, self.ctx.routing);
        if let (Some(lp_cost), Some(routing_total)) = (lp_cost, routing_total) {
            let total = lp_cost + routing_total;
            info!("worker {} disturbed to {:.2}", self.id, total);
            if strong_less(total, self.best_cost) {
                self.take_best(total);
            }
            self.tabu_search();
        }
    }

    fn take_best(&mut self, total: Price) {
        self.best_cost = total;
        self.best_visits = self.cur_visits.clone();
        self.best_sln_time = Instant::now();
        info!("worker {} new best {:.2}", self.id, total);
    }

    /// Materialize the best matrix into the final plan: LP for quantities,
    /// cached TSP for tours.
    fn extract_best(&mut self, sln: &mut Solution) {
        if self.best_cost >= MAX_COST {
            return;
        }
        let visits = self.best_visits.clone();
        let schedule = match self.ctx.lp.solve(&visits) {
            Some(s) => s,
            None => return,
        };
        if let Some(out) = self.materialize(&visits, &schedule) {
            *sln = out;
        }
    }

    /// Build a solution from a visit matrix and its LP schedule. Tours come
    /// from the TSP repair of each period; vehicles that carry nothing in a
    /// period stay home.
    fn materialize(
        &mut self,
        visits: &VisitMatrix,
        schedule: &crate::lp::QuantitySchedule,
    ) -> Option<Solution> {
        let problem = self.ctx.problem;
        let routing_total = self
            .tour_plan
            .rebuild_all(visits, &self.ctx.tsp, self.ctx.routing)?;
        let mut out = Solution::empty(
            problem.period_num,
            problem.vehicle_num(),
            routing_total + schedule.objective,
        );
        for p in 0..problem.period_num {
            let tour = &self.tour_plan.tours[p];
            if tour.len() <= 2 {
                continue;
            }
            let carriers: Vec<usize> = (0..problem.vehicle_num())
                .filter(|&v| {
                    tour[1..]
                        .iter()
                        .any(|&n| schedule.delivery[p][v][n].abs() > 0.5)
                })
                .collect();
            let carriers = if carriers.is_empty() { vec![0] } else { carriers };
            for v in carriers {
                let route = &mut out.period_routes[p].vehicle_routes[v];
                for &n in &tour[1..] {
                    route.deliveries.push(Delivery {
                        node: n,
                        quantity: schedule.delivery[p][v][n].round() as i64,
                    });
                }
            }
        }
        Some(out)
    }
}
