//! Streaming counters shared between the worker and the session.

use crate::source::ChannelId;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters for one channel. Written by the worker only.
#[derive(Debug)]
pub struct ChannelStats {
    id: ChannelId,
    elements_read: AtomicU64,
    elements_dropped: AtomicU64,
    read_errors: AtomicU64,
    last_request: AtomicUsize,
}

impl ChannelStats {
    fn new(id: ChannelId, initial_request: usize) -> Self {
        Self {
            id,
            elements_read: AtomicU64::new(0),
            elements_dropped: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            last_request: AtomicUsize::new(initial_request),
        }
    }

    pub(crate) fn record_read(&self, n: usize) {
        self.elements_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, n: usize) {
        self.elements_dropped.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_request(&self, n: usize) {
        self.last_request.store(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            id: self.id,
            elements_read: self.elements_read.load(Ordering::Relaxed),
            elements_dropped: self.elements_dropped.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            next_request: self.last_request.load(Ordering::Relaxed),
        }
    }
}

/// Live counters for a session.
#[derive(Debug)]
pub struct StreamStats {
    iterations: AtomicU64,
    channels: [ChannelStats; 2],
}

impl StreamStats {
    pub(crate) fn new(ids: [ChannelId; 2], initial_request: usize) -> Self {
        Self {
            iterations: AtomicU64::new(0),
            channels: ids.map(|id| ChannelStats::new(id, initial_request)),
        }
    }

    pub(crate) fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn channel(&self, slot: usize) -> &ChannelStats {
        &self.channels[slot]
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            channels: [self.channels[0].snapshot(), self.channels[1].snapshot()],
        }
    }
}

/// Point-in-time copy of one channel's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    /// Elements read from hardware and pushed (or attempted) into the buffer.
    pub elements_read: u64,
    /// Elements read from hardware but discarded because shutdown interrupted a blocked push.
    pub elements_dropped: u64,
    /// Reads that returned a nonzero status.
    pub read_errors: u64,
    /// Size of the next hardware read the worker will issue.
    pub next_request: usize,
}

/// Point-in-time copy of a session's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Completed drain iterations.
    pub iterations: u64,
    pub channels: [ChannelSnapshot; 2],
}

impl StatsSnapshot {
    /// Counters for `id`, if it belongs to this session.
    pub fn channel(&self, id: ChannelId) -> Option<&ChannelSnapshot> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn total_read(&self) -> u64 {
        self.channels.iter().map(|c| c.elements_read).sum()
    }
}
