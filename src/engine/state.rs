use crate::expr::EvalFault;
use crate::snapshot::{CopyFlag, Counters, GridSpec, HotBuckets};
use serde::Serialize;
use std::sync::Condvar;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Paused,
    Terminating,
    Joined,
}

/// Proof that a transition may have left workers blocked on the condvar.
/// Must be consumed by [`Wake::broadcast`].
#[must_use = "workers blocked on the condvar will not see this transition until it is broadcast"]
pub(crate) struct Wake(());

impl Wake {
    pub(crate) fn broadcast(self, cond: &Condvar) {
        cond.notify_all();
    }
}

impl RunState {
    /// `Running -> Paused`. Returns whether the state changed.
    pub(crate) fn pause(&mut self) -> bool {
        if *self == RunState::Running {
            *self = RunState::Paused;
            true
        } else {
            false
        }
    }

    /// `Paused -> Running`.
    pub(crate) fn resume(&mut self) -> Option<Wake> {
        if *self == RunState::Paused {
            *self = RunState::Running;
            Some(Wake(()))
        } else {
            None
        }
    }

    /// Irreversible. Always hands back a [`Wake`] since paused workers must
    /// observe it.
    pub(crate) fn terminate(&mut self) -> Wake {
        if matches!(self, RunState::Running | RunState::Paused) {
            *self = RunState::Terminating;
        }
        Wake(())
    }

    pub(crate) fn mark_joined(&mut self) {
        *self = RunState::Joined;
    }

    pub fn is_paused(&self) -> bool {
        *self == RunState::Paused
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self, RunState::Terminating | RunState::Joined)
    }
}

/// Wrapping position over (mutant, incumbent, island). Mutant cycles fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub mutant: usize,
    pub incumbent: usize,
    pub island: usize,
    mutant_slices: usize,
    slices: usize,
    islands: usize,
}

impl Cursor {
    pub fn new(grid: &GridSpec) -> Self {
        Self {
            mutant: 0,
            incumbent: 0,
            island: 0,
            mutant_slices: grid.mutant_slices,
            slices: grid.slices(),
            islands: grid.islands,
        }
    }

    /// Returns the current position and steps past it.
    pub fn advance(&mut self) -> Job {
        let job = Job {
            mutant: self.mutant,
            incumbent: self.incumbent,
            island: self.island,
        };
        self.mutant += 1;
        if self.mutant == self.mutant_slices {
            self.mutant = 0;
            self.incumbent += 1;
            if self.incumbent == self.slices {
                self.incumbent = 0;
                self.island = (self.island + 1) % self.islands;
            }
        }
        job
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub mutant: usize,
    pub incumbent: usize,
    pub island: usize,
}

/// Everything guarded by the hot mutex.
pub(crate) struct HotState {
    pub state: RunState,
    pub buckets: HotBuckets,
    pub cursor: Cursor,
    pub copy: CopyFlag,
    /// Hot counters at the last completed hot -> warm copy.
    pub published: Counters,
    pub fault: Option<EvalFault>,
}

impl HotState {
    pub(crate) fn new(grid: &GridSpec) -> Self {
        Self {
            state: RunState::Running,
            buckets: HotBuckets::new(grid),
            cursor: Cursor::new(grid),
            copy: CopyFlag::Idle,
            published: Counters::default(),
            fault: None,
        }
    }

    /// Marks a copy as requested unless one is in flight or nothing changed.
    pub(crate) fn request_copy(&mut self) -> bool {
        let last = self.published;
        if self.copy != CopyFlag::Idle
            || !self.buckets.counters.newer_than(last.trials, last.generations)
        {
            return false;
        }
        self.copy = CopyFlag::Requested;
        true
    }

    /// Elects the caller as copier if a copy was requested.
    pub(crate) fn claim_copy(&mut self) -> Option<HotBuckets> {
        if self.copy != CopyFlag::Requested {
            return None;
        }
        self.copy = CopyFlag::InProgress;
        Some(self.buckets.clone())
    }

    /// Elects the caller unconditionally unless a copy is already running.
    pub(crate) fn claim_now(&mut self) -> Option<HotBuckets> {
        if self.copy == CopyFlag::InProgress {
            return None;
        }
        self.copy = CopyFlag::Requested;
        self.claim_copy()
    }

    pub(crate) fn finish_copy(&mut self, copied: Counters) {
        self.published = copied;
        self.copy = CopyFlag::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(slices: usize, mutant_slices: usize, islands: usize) -> GridSpec {
        GridSpec {
            strategies: (0..slices).map(|i| i as f64).collect(),
            mutant_slices,
            islands,
            lower: 0.0,
            upper: 1.0,
        }
    }

    #[test]
    fn test_cursor_wraps_mutant_fastest() {
        let mut cursor = Cursor::new(&grid(2, 2, 2));
        let seen: Vec<(usize, usize, usize)> = (0..9)
            .map(|_| {
                let j = cursor.advance();
                (j.mutant, j.incumbent, j.island)
            })
            .collect();
        assert_eq!(seen[1], (1, 0, 0));
        assert_eq!(seen[2], (0, 1, 0));
        assert_eq!(seen[4], (0, 0, 1));
        assert_eq!(seen[8], (0, 0, 0));
    }

    #[test]
    fn test_terminate_is_irreversible() {
        let mut state = RunState::Paused;
        let cond = Condvar::new();
        state.terminate().broadcast(&cond);
        assert_eq!(state, RunState::Terminating);
        assert!(state.resume().is_none());
        assert!(!state.pause());
        assert_eq!(state, RunState::Terminating);
    }

    #[test]
    fn test_single_copier_election() {
        let mut hot = HotState::new(&grid(2, 2, 2));
        assert!(!hot.request_copy());
        hot.buckets.record(0, 0, 0, 1.0, 3);
        assert!(hot.request_copy());
        assert!(!hot.request_copy());

        let raw = hot.claim_copy().unwrap();
        assert!(hot.claim_copy().is_none());
        hot.finish_copy(raw.counters);
        assert_eq!(hot.copy, CopyFlag::Idle);
        assert!(!hot.request_copy());
    }
}
