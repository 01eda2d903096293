//! Three-stage (hot -> warm -> cold) publication of simulation statistics.
//!
//! * **hot**: [`HotBuckets`], raw accumulators updated by workers under the
//!   simulation's hot mutex.
//! * **warm**: a [`Snapshot`] derived from a copy of hot by exactly one elected
//!   worker, outside the hot mutex. Polynomial fitting happens here.
//! * **cold**: the latest warm snapshot copied by the consumer on its own
//!   schedule; read without touching hot at all.
//!
//! Every stage carries [`Counters`]; a copy only happens when the source is
//! strictly newer than the destination.

use crate::fit::{FitResult, FitWorkspace};
use crate::stats::{Extinction, OnlineStats};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub trials: u64,
    pub generations: u64,
}

impl Counters {
    /// True when these totals are strictly ahead of the given ones.
    pub fn newer_than(&self, last_trials: u64, last_generations: u64) -> bool {
        (self.trials > last_trials && self.generations >= last_generations)
            || (self.trials >= last_trials && self.generations > last_generations)
    }
}

pub trait Staged: Clone {
    fn counters(&self) -> Counters;
}

/// Copies `src` over `dst` only when `src` is newer. Returns whether it did.
pub fn copy_if_stale<T: Staged>(dst: &mut T, src: &T) -> bool {
    let last = dst.counters();
    if !src.counters().newer_than(last.trials, last.generations) {
        return false;
    }
    dst.clone_from(src);
    true
}

/// Tri-state rendezvous flag electing a single hot -> warm copier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CopyFlag {
    #[default]
    Idle,
    Requested,
    InProgress,
}

/// Shape of the strategy grid the statistics are laid out on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Incumbent strategy at each slice.
    pub strategies: Vec<f64>,
    /// 1 for Gaussian mutants, `strategies.len()` for grid mutants.
    pub mutant_slices: usize,
    pub islands: usize,
    pub lower: f64,
    pub upper: f64,
}

impl GridSpec {
    pub fn slices(&self) -> usize {
        self.strategies.len()
    }
}

/// Raw per-bucket accumulators. Only ever touched under the hot mutex.
#[derive(Debug, Clone, PartialEq)]
pub struct HotBuckets {
    pub counters: Counters,
    mutant_slices: usize,
    islands: usize,
    /// Indexed `incumbent * mutant_slices + mutant`.
    pub pair: Vec<OnlineStats>,
    /// Indexed `incumbent * islands + island`.
    pub island: Vec<OnlineStats>,
}

impl HotBuckets {
    pub fn new(grid: &GridSpec) -> Self {
        let slices = grid.slices();
        Self {
            counters: Counters::default(),
            mutant_slices: grid.mutant_slices,
            islands: grid.islands,
            pair: vec![OnlineStats::new(); slices * grid.mutant_slices],
            island: vec![OnlineStats::new(); slices * grid.islands],
        }
    }

    pub fn record(
        &mut self,
        incumbent: usize,
        mutant: usize,
        island: usize,
        outcome: f64,
        generations: u64,
    ) {
        self.pair[incumbent * self.mutant_slices + mutant].push(outcome);
        self.island[incumbent * self.islands + island].push(outcome);
        self.counters.trials += 1;
        self.counters.generations += generations;
    }

    /// Outcomes for one incumbent slice, pooled across mutant columns.
    pub fn incumbent_stats(&self, incumbent: usize) -> OnlineStats {
        let row = &self.pair[incumbent * self.mutant_slices..(incumbent + 1) * self.mutant_slices];
        row.iter().fold(OnlineStats::new(), |mut acc, s| {
            acc.merge(s);
            acc
        })
    }
}

impl Staged for HotBuckets {
    fn counters(&self) -> Counters {
        self.counters
    }
}

/// Consumer-facing view of the statistics at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub counters: Counters,
    pub slices: usize,
    pub mutant_slices: usize,
    pub islands: usize,
    pub strategies: Vec<f64>,
    pub samples: Vec<u64>,
    pub mean: Vec<f64>,
    pub stddev: Vec<f64>,
    pub mutant_extinction: Vec<f64>,
    pub incumbent_extinction: Vec<f64>,
    /// Mean outcome by (incumbent, island the mutant was seeded on).
    pub island_mean: Vec<f64>,
    /// Mean outcome by (incumbent, mutant).
    pub pair_mean: Vec<f64>,
    pub fit: Option<FitResult>,
}

impl Snapshot {
    pub fn empty(grid: &GridSpec) -> Self {
        let slices = grid.slices();
        Self {
            counters: Counters::default(),
            slices,
            mutant_slices: grid.mutant_slices,
            islands: grid.islands,
            strategies: grid.strategies.clone(),
            samples: vec![0; slices],
            mean: vec![0.0; slices],
            stddev: vec![0.0; slices],
            mutant_extinction: vec![0.0; slices],
            incumbent_extinction: vec![0.0; slices],
            island_mean: vec![0.0; slices * grid.islands],
            pair_mean: vec![0.0; slices * grid.mutant_slices],
            fit: None,
        }
    }

    /// Builds the derived view from a copy of the hot buckets, running the
    /// polynomial fit when a workspace is supplied.
    pub fn derive(raw: &HotBuckets, grid: &GridSpec, fit: Option<&mut FitWorkspace>) -> Self {
        let slices = grid.slices();
        let per_incumbent: Vec<OnlineStats> =
            (0..slices).map(|i| raw.incumbent_stats(i)).collect();

        let fit = fit.and_then(|ws| ws.fit(&grid.strategies, &per_incumbent, grid.lower, grid.upper));

        Self {
            counters: raw.counters,
            slices,
            mutant_slices: grid.mutant_slices,
            islands: grid.islands,
            strategies: grid.strategies.clone(),
            samples: per_incumbent.iter().map(|s| s.count()).collect(),
            mean: per_incumbent.iter().map(|s| s.mean()).collect(),
            stddev: per_incumbent.iter().map(|s| s.stddev()).collect(),
            mutant_extinction: per_incumbent
                .iter()
                .map(|s| s.extinction_rate(Extinction::Mutant))
                .collect(),
            incumbent_extinction: per_incumbent
                .iter()
                .map(|s| s.extinction_rate(Extinction::Incumbent))
                .collect(),
            island_mean: raw.island.iter().map(|s| s.mean()).collect(),
            pair_mean: raw.pair.iter().map(|s| s.mean()).collect(),
            fit,
        }
    }
}

impl Staged for Snapshot {
    fn counters(&self) -> Counters {
        self.counters
    }
}

struct WarmStage {
    snapshot: Snapshot,
    fit: Option<FitWorkspace>,
}

/// Warm and cold stages of one simulation.
pub struct SnapshotPipeline {
    grid: GridSpec,
    warm: Mutex<WarmStage>,
    cold: Mutex<Snapshot>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SnapshotPipeline {
    pub fn new(grid: GridSpec, fit: Option<FitWorkspace>) -> Self {
        let empty = Snapshot::empty(&grid);
        Self {
            warm: Mutex::new(WarmStage {
                snapshot: empty.clone(),
                fit,
            }),
            cold: Mutex::new(empty),
            grid,
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Derives warm from a raw hot copy. Must only be called by the worker
    /// holding [`CopyFlag::InProgress`]. Returns whether warm advanced.
    pub fn copy_hot_to_warm(&self, raw: &HotBuckets) -> bool {
        let mut warm = lock(&self.warm);
        let last = warm.snapshot.counters;
        if !raw.counters.newer_than(last.trials, last.generations) {
            return false;
        }
        let stage = &mut *warm;
        stage.snapshot = Snapshot::derive(raw, &self.grid, stage.fit.as_mut());
        true
    }

    /// Consumer-side warm -> cold copy. Returns whether cold advanced.
    pub fn copy_warm_to_cold(&self) -> bool {
        let warm = lock(&self.warm);
        let mut cold = lock(&self.cold);
        copy_if_stale(&mut *cold, &warm.snapshot)
    }

    pub fn warm_counters(&self) -> Counters {
        lock(&self.warm).snapshot.counters
    }

    pub fn read_cold(&self) -> Snapshot {
        lock(&self.cold).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridSpec {
        GridSpec {
            strategies: vec![0.0, 0.5, 1.0],
            mutant_slices: 3,
            islands: 2,
            lower: 0.0,
            upper: 1.0,
        }
    }

    #[test]
    fn test_counters_newer_than() {
        let c = Counters {
            trials: 5,
            generations: 10,
        };
        assert!(c.newer_than(4, 10));
        assert!(c.newer_than(5, 9));
        assert!(!c.newer_than(5, 10));
        assert!(!c.newer_than(6, 0));
    }

    #[test]
    fn test_incumbent_stats_pool_mutant_columns() {
        let g = grid();
        let mut hot = HotBuckets::new(&g);
        hot.record(1, 0, 0, 0.0, 3);
        hot.record(1, 2, 1, 1.0, 4);
        let pooled = hot.incumbent_stats(1);
        assert_eq!(pooled.count(), 2);
        assert!((pooled.mean() - 0.5).abs() < 1e-12);
        assert_eq!(hot.counters.generations, 7);
    }

    #[test]
    fn test_warm_ignores_stale_raw() {
        let g = grid();
        let pipeline = SnapshotPipeline::new(g.clone(), None);
        let mut hot = HotBuckets::new(&g);
        assert!(!pipeline.copy_hot_to_warm(&hot));
        hot.record(0, 0, 0, 1.0, 2);
        assert!(pipeline.copy_hot_to_warm(&hot));
        assert!(!pipeline.copy_hot_to_warm(&hot));
    }
}
