//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters bumped from the data plane.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub(crate) packets: AtomicU64,
    pub(crate) permitted: AtomicU64,
    pub(crate) denied: AtomicU64,
    pub(crate) unmatched: AtomicU64,
    pub(crate) malformed: AtomicU64,
    pub(crate) non_ip: AtomicU64,
    pub(crate) session_hits: AtomicU64,
    pub(crate) session_creates: AtomicU64,
    pub(crate) session_create_failures: AtomicU64,
    pub(crate) reaped: AtomicU64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl EngineStats {
    pub(crate) fn add_reaped(&self, n: usize) {
        self.reaped.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            packets: load(&self.packets),
            permitted: load(&self.permitted),
            denied: load(&self.denied),
            unmatched: load(&self.unmatched),
            malformed: load(&self.malformed),
            non_ip: load(&self.non_ip),
            session_hits: load(&self.session_hits),
            session_creates: load(&self.session_creates),
            session_create_failures: load(&self.session_create_failures),
            reaped: load(&self.reaped),
        }
    }
}

/// Counter values at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub packets: u64,
    pub permitted: u64,
    pub denied: u64,
    pub unmatched: u64,
    pub malformed: u64,
    pub non_ip: u64,
    pub session_hits: u64,
    pub session_creates: u64,
    pub session_create_failures: u64,
    pub reaped: u64,
}
