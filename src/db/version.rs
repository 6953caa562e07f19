//! Insert timestamp issuance and the visibility watermark.
//!
//! Every write transaction holds one insert timestamp from acquisition until
//! it commits or aborts. The watermark returned by
//! [`VersionManager::read_timestamp`] only advances past a timestamp once it
//! and every earlier one have been released.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::types::{PenumbraError, Result, Timestamp, TIMESTAMP_FINISHED};

/// The release half of timestamp issuance, as seen by a transaction.
pub trait TimestampAuthority: Send + Sync {
    /// Returns `ts` to the authority. Called exactly once per timestamp.
    fn release_insert_timestamp(&self, ts: Timestamp);
}

#[derive(Debug)]
struct VersionState {
    next: Timestamp,
    outstanding: BTreeSet<Timestamp>,
}

/// Monotonic insert-timestamp issuer.
///
/// Timestamp 0 is reserved; the first issued timestamp is 1 unless the
/// manager is restored with [`VersionManager::with_start`].
#[derive(Debug)]
pub struct VersionManager {
    state: Mutex<VersionState>,
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionManager {
    /// Creates a manager whose first timestamp is 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VersionState {
                next: 1,
                outstanding: BTreeSet::new(),
            }),
        }
    }

    /// Creates a manager whose first timestamp is `start`, e.g. one past the
    /// last timestamp replayed from the log.
    pub fn with_start(start: Timestamp) -> Result<Self> {
        if start == 0 {
            return Err(PenumbraError::Invalid("timestamp 0 is reserved"));
        }
        if start == TIMESTAMP_FINISHED {
            return Err(PenumbraError::Invalid("timestamp space exhausted"));
        }
        Ok(Self {
            state: Mutex::new(VersionState {
                next: start,
                outstanding: BTreeSet::new(),
            }),
        })
    }

    /// Issues the next insert timestamp.
    pub fn acquire_insert_timestamp(&self) -> Result<Timestamp> {
        let mut state = self.state.lock();
        let ts = state.next;
        if ts == TIMESTAMP_FINISHED {
            return Err(PenumbraError::Invalid("timestamp space exhausted"));
        }
        state.next += 1;
        state.outstanding.insert(ts);
        trace!(timestamp = ts, "version.acquire");
        Ok(ts)
    }

    /// Largest timestamp `t` such that every issued timestamp `<= t` has been
    /// released. 0 before anything is released.
    pub fn read_timestamp(&self) -> Timestamp {
        let state = self.state.lock();
        match state.outstanding.first() {
            Some(&oldest) => oldest - 1,
            None => state.next - 1,
        }
    }

    /// Next timestamp that would be issued.
    pub fn next_timestamp(&self) -> Timestamp {
        self.state.lock().next
    }

    /// Number of issued, unreleased timestamps.
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }
}

impl TimestampAuthority for VersionManager {
    fn release_insert_timestamp(&self, ts: Timestamp) {
        let mut state = self.state.lock();
        if !state.outstanding.remove(&ts) {
            warn!(timestamp = ts, "version.release.unknown");
            return;
        }
        trace!(
            timestamp = ts,
            outstanding = state.outstanding.len(),
            "version.release"
        );
    }
}
