use super::state::{HotState, Job};
use super::trial::{TrialOutcome, TrialRunner};
use crate::config::ValidatedConfig;
use crate::expr::EvalFault;
use crate::snapshot::SnapshotPipeline;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

/// State shared by the workers and every handle of one simulation.
pub(crate) struct Shared {
    pub config: Arc<ValidatedConfig>,
    hot: Mutex<HotState>,
    wake: Condvar,
    // Mirrors `Terminating` so running trials can bail out between generations.
    stop: AtomicBool,
    pub pipeline: SnapshotPipeline,
}

impl Shared {
    pub(crate) fn new(config: Arc<ValidatedConfig>) -> Self {
        let grid = config.grid.clone();
        let pipeline = SnapshotPipeline::new(grid.clone(), config.fit_workspace());
        Self {
            hot: Mutex::new(HotState::new(&grid)),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
            pipeline,
            config,
        }
    }

    pub(crate) fn lock_hot(&self) -> MutexGuard<'_, HotState> {
        self.hot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn condvar(&self) -> &Condvar {
        &self.wake
    }

    /// Enters `Terminating` and wakes every waiter.
    pub(crate) fn terminate(&self) {
        let wake = {
            let mut hot = self.lock_hot();
            self.stop.store(true, Ordering::Relaxed);
            hot.state.terminate()
        };
        wake.broadcast(&self.wake);
    }

    /// Records the first arithmetic fault and shuts the simulation down.
    fn fail(&self, fault: EvalFault) {
        let wake = {
            let mut hot = self.lock_hot();
            if hot.fault.is_none() {
                error!("Simulation stopped by arithmetic fault: {}", fault);
                hot.fault = Some(fault);
            }
            self.stop.store(true, Ordering::Relaxed);
            hot.state.terminate()
        };
        wake.broadcast(&self.wake);
    }
}

struct Pending {
    job: Job,
    outcome: TrialOutcome,
}

pub(crate) fn run_worker(shared: Arc<Shared>, index: usize, seed: Option<u64>) {
    let config = Arc::clone(&shared.config);
    let mut runner = TrialRunner::new(Arc::clone(&config), seed);
    let mut pending: Option<Pending> = None;

    debug!("Worker {} started", index);

    loop {
        let (job, raw) = {
            let mut hot = shared.lock_hot();

            if let Some(done) = pending.take() {
                hot.buckets.record(
                    done.job.incumbent,
                    done.job.mutant,
                    done.job.island,
                    done.outcome.fraction,
                    done.outcome.generations,
                );
            }

            while hot.state.is_paused() {
                hot = shared
                    .wake
                    .wait(hot)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if hot.state.is_stopping() {
                break;
            }

            let raw = hot.claim_copy();
            (hot.cursor.advance(), raw)
        };

        // Elected copier: derive warm (and refit) without holding hot.
        if let Some(raw) = raw {
            debug!(
                "Worker {} copying hot -> warm at {} trials",
                index, raw.counters.trials
            );
            shared.pipeline.copy_hot_to_warm(&raw);
            shared.lock_hot().finish_copy(raw.counters);
        }

        let incumbent_x = config.strategy(job.incumbent);
        let mutant_x = runner.mutant_strategy(incumbent_x, config.strategy(job.mutant));

        match runner.run_until(mutant_x, incumbent_x, job.island, &shared.stop) {
            Ok(outcome) if outcome.complete => pending = Some(Pending { job, outcome }),
            Ok(_) => {}
            Err(fault) => {
                shared.fail(fault);
                break;
            }
        }
    }

    debug!(
        "Worker {} exiting ({} Poisson tables built)",
        index,
        runner.poisson().builds()
    );
}
