//! The island migration engine: worker threads, their shared hot state and
//! the reference-counted handle consumers hold.

pub mod migration;
pub mod state;
pub mod trial;
mod worker;

pub use migration::MigrationTable;
pub use state::{Cursor, Job, RunState};
pub use trial::{TrialOutcome, TrialRunner, MAX_BIRTH_MEAN};

use crate::config::{SimulationConfig, ValidatedConfig};
use crate::error::{SimError, SimResult};
use crate::expr::{EvalFault, PayoffRange};
use crate::snapshot::{Counters, Snapshot};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};
use worker::Shared;

/// Externally observable state of a simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimStatus {
    pub state: RunState,
    pub fault: Option<EvalFault>,
    pub trials: u64,
    pub generations: u64,
}

struct Simulation {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Simulation {
    /// Terminates and joins every worker. Safe to call more than once.
    fn shutdown(&self) {
        self.shared.terminate();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        if handles.is_empty() {
            return;
        }

        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                warn!("A simulation worker panicked before joining");
            }
        }
        self.shared.lock_hot().state.mark_joined();
        info!("Simulation stopped; joined {} workers", count);
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shared handle to a running simulation. Cloning (or [`attach`]) adds a
/// consumer; the simulation is torn down when the last one is dropped.
///
/// [`attach`]: SimulationHandle::attach
#[derive(Clone)]
pub struct SimulationHandle {
    inner: Arc<Simulation>,
}

/// Validates `config` and spawns its workers.
pub fn start_simulation(config: SimulationConfig) -> SimResult<SimulationHandle> {
    let validated = Arc::new(config.validate()?);
    let threads = validated.source.threads;
    let seed = validated.source.seed;
    let shared = Arc::new(Shared::new(Arc::clone(&validated)));

    let sim = Simulation {
        shared: Arc::clone(&shared),
        workers: Mutex::new(Vec::with_capacity(threads)),
    };

    for i in 0..threads {
        let worker_shared = Arc::clone(&shared);
        let worker_seed = seed.map(|s| s + i as u64);
        let spawned = thread::Builder::new()
            .name(format!("island-worker-{}", i))
            .spawn(move || worker::run_worker(worker_shared, i, worker_seed));

        match spawned {
            Ok(handle) => sim
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle),
            Err(e) => {
                // Dropping `sim` terminates and joins what was spawned.
                drop(sim);
                return Err(SimError::Resource(format!(
                    "could not spawn worker {}: {}",
                    i, e
                )));
            }
        }
    }

    info!(
        "Simulation started: {} islands, {} slices, {} workers",
        validated.islands(),
        validated.grid.slices(),
        threads
    );

    Ok(SimulationHandle {
        inner: Arc::new(sim),
    })
}

impl SimulationHandle {
    fn shared(&self) -> &Shared {
        &self.inner.shared
    }

    /// Adds a consumer.
    pub fn attach(&self) -> SimulationHandle {
        self.clone()
    }

    /// Removes this consumer. The last detach terminates and joins.
    pub fn detach(self) {
        drop(self);
    }

    pub fn consumers(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Idempotent.
    pub fn pause(&self) {
        if self.shared().lock_hot().state.pause() {
            info!("Simulation paused");
        }
    }

    /// Idempotent.
    pub fn resume(&self) {
        let wake = self.shared().lock_hot().state.resume();
        if let Some(wake) = wake {
            wake.broadcast(self.shared().condvar());
            info!("Simulation resumed");
        }
    }

    /// Terminates and joins the workers now, for every consumer.
    pub fn stop(&self) {
        self.inner.shutdown();
    }

    /// Asks the next worker through the hot lock to publish a warm copy.
    /// No-op when a copy is in flight or nothing changed since the last one.
    pub fn request_snapshot(&self) -> bool {
        self.shared().lock_hot().request_copy()
    }

    /// Performs the hot -> warm copy on the calling thread unless a worker is
    /// already doing it. After [`stop`](Self::stop) no worker is left to
    /// answer [`request_snapshot`](Self::request_snapshot), so this is how
    /// the final totals get published.
    pub fn publish_now(&self) -> bool {
        let raw = self.shared().lock_hot().claim_now();
        let Some(raw) = raw else {
            return false;
        };
        let advanced = self.shared().pipeline.copy_hot_to_warm(&raw);
        self.shared().lock_hot().finish_copy(raw.counters);
        advanced
    }

    /// Copies warm to cold if warm is newer. Returns whether cold changed.
    pub fn refresh_cold(&self) -> bool {
        self.shared().pipeline.copy_warm_to_cold()
    }

    pub fn read_cold(&self) -> Snapshot {
        self.shared().pipeline.read_cold()
    }

    /// Live totals straight from the hot state.
    pub fn counters(&self) -> Counters {
        self.shared().lock_hot().buckets.counters
    }

    pub fn status(&self) -> SimStatus {
        let hot = self.shared().lock_hot();
        SimStatus {
            state: hot.state,
            fault: hot.fault,
            trials: hot.buckets.counters.trials,
            generations: hot.buckets.counters.generations,
        }
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.shared().config
    }

    /// Payoff extremes found when the simulation was validated.
    pub fn payoff_range(&self) -> Option<PayoffRange> {
        self.shared().config.payoff_range
    }
}
