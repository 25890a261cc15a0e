//! Single-flight guards for background jobs.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Background jobs that must not overlap with themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    News,
    Companies,
}

impl JobKind {
    fn index(self) -> usize {
        match self {
            Self::News => 0,
            Self::Companies => 1,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::News => "news parsing",
            Self::Companies => "company parsing",
        })
    }
}

/// Tracks which jobs are running. Cloning shares the state.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    running: Arc<[AtomicBool; 2]>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `kind`, or `None` if a run is already in progress.
    /// The claim is released when the guard drops.
    pub fn try_start(&self, kind: JobKind) -> Option<JobGuard> {
        self.running[kind.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| JobGuard {
                running: Arc::clone(&self.running),
                kind,
            })
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        self.running[kind.index()].load(Ordering::Acquire)
    }
}

/// Proof that a job run holds its slot.
#[derive(Debug)]
pub struct JobGuard {
    running: Arc<[AtomicBool; 2]>,
    kind: JobKind,
}

impl JobGuard {
    pub fn kind(&self) -> JobKind {
        self.kind
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.running[self.kind.index()].store(false, Ordering::Release);
    }
}
