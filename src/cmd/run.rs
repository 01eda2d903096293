use crate::reports;
use archipelago::config::SimParams;
use archipelago::engine::RunState;
use archipelago::{start_simulation, SimResult};
use clap::Args;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

const COPYOUT_INTERVAL: Duration = Duration::from_millis(250);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub sim: SimParams,

    /// Stop after this many seconds
    #[arg(short, long, default_value_t = 10.0)]
    pub time: f64,

    /// Stop once this many trials have completed
    #[arg(long)]
    pub trials: Option<u64>,

    /// Also print mean outcomes per seeding island
    #[arg(long, default_value_t = false)]
    pub islands_report: bool,

    /// Write the final snapshot as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,
}

pub fn run(args: RunArgs) -> SimResult<()> {
    let config = args.sim.to_config()?;
    let handle = start_simulation(config)?;

    if let Some(range) = handle.payoff_range() {
        info!("Payoff range on grid: [{:.4}, {:.4}]", range.min, range.max);
    }

    let limit = Duration::from_secs_f64(args.time.max(0.0));
    let start = Instant::now();
    let mut last_progress = Instant::now();

    loop {
        thread::sleep(COPYOUT_INTERVAL);
        handle.request_snapshot();
        handle.refresh_cold();

        let status = handle.status();
        if last_progress.elapsed() >= PROGRESS_INTERVAL {
            let secs = start.elapsed().as_secs_f64();
            info!(
                "{:.1}s: {} trials ({:.0}/s), {} generations",
                secs,
                status.trials,
                status.trials as f64 / secs.max(1e-9),
                status.generations
            );
            last_progress = Instant::now();
        }

        if status.state != RunState::Running {
            break;
        }
        if args.trials.is_some_and(|t| status.trials >= t) {
            break;
        }
        if start.elapsed() >= limit {
            break;
        }
    }

    handle.stop();

    // One last publication so the report covers every folded trial.
    handle.publish_now();
    handle.refresh_cold();

    let status = handle.status();
    let snap = handle.read_cold();

    reports::print_status(&status);
    reports::print_outcome_report(&snap);
    if args.islands_report {
        reports::print_island_report(&snap);
    }

    if let Some(path) = &args.json {
        fs::write(path, serde_json::to_string_pretty(&snap)?)?;
        println!("Snapshot written to {}", path.display());
    }

    match status.fault {
        Some(fault) => Err(fault.into()),
        None => Ok(()),
    }
}
