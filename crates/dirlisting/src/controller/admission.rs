//! Ceiling on concurrent directory scans.
//!
//! A listing holds an [`AdmissionSlot`] from the moment its directory is
//! opened until it is done or torn down. The slot gives its count back on
//! drop, so every exit path releases it exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::ServerLimits;

/// Counter of listings in progress, shared by every request of one event loop.
#[derive(Debug, Clone)]
pub struct AdmissionCounter {
    in_flight: Arc<AtomicUsize>,
    ceiling: usize,
}

impl AdmissionCounter {
    pub fn new(ceiling: usize) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            ceiling: ceiling.max(1),
        }
    }

    pub fn from_limits(limits: &ServerLimits) -> Self {
        Self::new(limits.admission_ceiling())
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Takes a slot, or `None` when the ceiling is reached.
    pub fn try_acquire(&self) -> Option<AdmissionSlot> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.ceiling).then_some(n + 1))
            .ok()
            .map(|_| AdmissionSlot {
                in_flight: Arc::clone(&self.in_flight),
            })
    }
}

/// One admitted listing. Releases its slot when dropped.
#[derive(Debug)]
pub struct AdmissionSlot {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
