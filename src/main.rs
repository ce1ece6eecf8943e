//! Command line interface of the solver.

use anyhow::{Context, Result};
use clap::Parser;
use irp_tabu::{Config, Environment, Problem, Solver, Submission};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "irp-tabu", about = "Hybrid tabu/MIP solver for the inventory routing problem")]
struct Args {
    /// Instance file (JSON)
    #[arg(short = 'p', value_name = "path")]
    instance: Option<PathBuf>,

    /// Solution output file
    #[arg(short = 'o', value_name = "path")]
    solution: Option<PathBuf>,

    /// Random seed
    #[arg(short = 's', value_name = "int")]
    seed: Option<u64>,

    /// Wallclock timeout in seconds
    #[arg(short = 't', value_name = "seconds")]
    timeout: Option<f64>,

    /// Maximum disturb/restart iterations
    #[arg(short = 'i', value_name = "int")]
    max_iter: Option<u64>,

    /// Worker thread budget (auto when 0 or above the machine)
    #[arg(short = 'j', value_name = "int")]
    jobs: Option<usize>,

    /// Run identifier for the log
    #[arg(short = 'r', value_name = "string")]
    run_id: Option<String>,

    /// Environment file
    #[arg(short = 'e', value_name = "path")]
    environment: Option<PathBuf>,

    /// Configuration file (JSON)
    #[arg(short = 'c', value_name = "path")]
    config: Option<PathBuf>,

    /// Run log file (CSV, appended)
    #[arg(short = 'l', value_name = "path")]
    log: Option<PathBuf>,

    /// Print the author and continue
    #[arg(short = 'a')]
    author: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::from(255)
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = Args::parse();

    if args.author {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    }

    let mut env = Environment::default();
    // environment files are reserved for the benchmark harness; command
    // line options always win
    let _ = args.environment;
    if let Some(p) = args.instance {
        env.instance_path = p;
    }
    if let Some(p) = args.solution {
        env.solution_path = p;
    }
    if let Some(s) = args.seed {
        env.rand_seed = s;
    }
    if let Some(t) = args.timeout {
        env.timeout = Duration::from_secs_f64(t.max(0.0));
    }
    if let Some(i) = args.max_iter {
        env.max_iter = i;
    }
    if let Some(j) = args.jobs {
        env.job_num = j;
    }
    if let Some(r) = args.run_id {
        env.run_id = r;
    }
    env.config_path = args.config;
    env.log_path = args.log;
    env.calibrate();

    if env.instance_path.as_os_str().is_empty() || env.solution_path.as_os_str().is_empty() {
        eprintln!("instance (-p) and solution (-o) paths are required");
        return Ok(ExitCode::from(255));
    }

    let config = Config::load(env.config_path.as_ref());
    let problem = Problem::from_json_file(&env.instance_path)
        .with_context(|| format!("cannot load instance {}", env.instance_path.display()))?;

    let mut solver = Solver::new(problem, env, config);
    let (solution, report) = solver.solve();

    let submission = Submission {
        thread: solver.env.job_num.to_string(),
        instance: solver.env.friendly_instance_name(),
        duration: format!("{}s", report.duration.as_secs_f64()),
        obj: solution.total_cost,
    };
    solution
        .save(&solver.env.solution_path, &submission)
        .with_context(|| {
            format!(
                "cannot write solution {}",
                solver.env.solution_path.display()
            )
        })?;
    solver.record(&solution, &report);

    Ok(ExitCode::SUCCESS)
}
