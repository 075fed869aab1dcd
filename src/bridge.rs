//! Streaming bridge: the background drain loop.
//!
//! One worker serves both channels of a session. Each iteration it reads
//! every channel with the session timeout, pushes whatever arrived into the
//! channel's bounded buffer, then sizes the next read from the backlog the
//! hardware reported:
//!
//! ```text
//! next_request = min(remaining, batch_size)
//! ```
//!
//! A deep backlog gets a full batch; a shallow one gets exactly what is
//! queued, so sparse input is not held up waiting for a full batch to fill.
//!
//! The stop flag and the interrupt signal are checked before every hardware
//! read. Neither check takes a lock.

use crate::buffer::{BufferWriter, PushError};
use crate::cancel::{CancelToken, InterruptSignal};
use crate::config::StreamConfig;
use crate::invariant_rt::{
    signal_invariant, INV_BACKPRESSURE_STALL, INV_BATCH_PUSHED, INV_INTERRUPT_HONORED,
    INV_READ_ERROR_TOLERATED, INV_REQUEST_WITHIN_BATCH, INV_STOP_HONORED,
};
use crate::source::ChannelSource;
use crate::stats::StreamStats;
use rtrb::Producer;
use std::sync::Arc;
use std::time::Duration;

/// Adaptive batch sizing rule.
#[inline]
pub fn next_request(remaining: usize, batch_size: usize) -> usize {
    remaining.min(batch_size)
}

/// Why the worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The stop flag was observed.
    Stopped,
    /// The interrupt signal was observed.
    Interrupted,
    /// A channel buffer's consumer was dropped.
    ConsumerGone,
}

/// One channel as seen by the worker.
struct Lane<S: ChannelSource> {
    source: S,
    writer: BufferWriter<S::Elem>,
    scratch: Vec<S::Elem>,
    requested: usize,
}

/// The worker half of a session. Consumed by [`Bridge::run`].
pub struct Bridge<S: ChannelSource> {
    lanes: [Lane<S>; 2],
    batch_size: usize,
    read_timeout: Duration,
    backpressure_poll: Duration,
    idle_backoff: Duration,
    stop: CancelToken,
    interrupt: Arc<dyn InterruptSignal>,
    stats: Arc<StreamStats>,
    signals: Producer<u8>,
    // Each fact is signaled once per run so terminal signals are never crowded out.
    signaled: u64,
}

impl<S: ChannelSource> Bridge<S> {
    pub(crate) fn new(
        config: &StreamConfig,
        channels: [(S, BufferWriter<S::Elem>); 2],
        stop: CancelToken,
        interrupt: Arc<dyn InterruptSignal>,
        stats: Arc<StreamStats>,
        signals: Producer<u8>,
    ) -> Self {
        let batch_size = config.batch_size;
        let lanes = channels.map(|(source, writer)| Lane {
            source,
            writer,
            scratch: vec![S::Elem::default(); batch_size],
            requested: batch_size,
        });
        Self {
            lanes,
            batch_size,
            read_timeout: config.read_timeout,
            backpressure_poll: config.backpressure_poll,
            idle_backoff: config.idle_backoff,
            stop,
            interrupt,
            stats,
            signals,
            signaled: 0,
        }
    }

    /// Drains both channels until stopped, interrupted, or abandoned.
    ///
    /// Both buffer producers are released when this returns.
    pub fn run(mut self) -> WorkerExit {
        log::debug!(
            "Streaming worker started: channels {} and {}, batch {}, timeout {:?}",
            self.lanes[0].source.channel_id(),
            self.lanes[1].source.channel_id(),
            self.batch_size,
            self.read_timeout
        );
        let exit = loop {
            if let Some(exit) = self.step() {
                break exit;
            }
        };
        match exit {
            WorkerExit::Stopped => self.signal(INV_STOP_HONORED),
            WorkerExit::Interrupted => self.signal(INV_INTERRUPT_HONORED),
            WorkerExit::ConsumerGone => {}
        }
        log::info!(
            "Streaming worker exiting ({:?}) after {} iterations",
            exit,
            self.stats.snapshot().iterations
        );
        exit
    }

    /// Runs one drain iteration over both channels.
    ///
    /// Returns `Some` when the worker must exit.
    pub(crate) fn step(&mut self) -> Option<WorkerExit> {
        let mut idle = true;
        for slot in 0..self.lanes.len() {
            if self.interrupt.is_interrupt_pending() {
                return Some(WorkerExit::Interrupted);
            }
            if self.stop.is_cancelled() {
                return Some(WorkerExit::Stopped);
            }
            let (busy, gone) = self.drain_lane(slot);
            if gone {
                return Some(WorkerExit::ConsumerGone);
            }
            idle &= !busy;
        }
        self.stats.record_iteration();
        if idle && !self.idle_backoff.is_zero() {
            log::trace!("No backlog on either channel, backing off {:?}", self.idle_backoff);
            std::thread::sleep(self.idle_backoff);
        }
        None
    }

    /// Reads one channel, pushes the result and adapts the next request.
    ///
    /// Returns (did any work, consumer gone).
    fn drain_lane(&mut self, slot: usize) -> (bool, bool) {
        let Self {
            lanes,
            batch_size,
            read_timeout,
            backpressure_poll,
            stop,
            interrupt,
            stats,
            ..
        } = self;
        let lane = &mut lanes[slot];
        let channel_stats = stats.channel(slot);
        let channel = lane.source.channel_id();
        let requested = lane.requested;

        let outcome = lane.source.read(&mut lane.scratch[..requested], *read_timeout);
        let mut tolerated_error = false;
        if !outcome.status.is_success() {
            log::warn!(
                "FIFO read on channel {} returned status {} ({} of {} elements)",
                channel,
                outcome.status,
                outcome.read,
                requested
            );
            channel_stats.record_error();
            tolerated_error = true;
        }

        let n = outcome.read.min(requested);
        let mut stalled = false;
        let mut gone = false;
        if n > 0 {
            channel_stats.record_read(n);
            let pushed = lane.writer.push_until(&lane.scratch[..n], *backpressure_poll, || {
                stop.is_cancelled() || interrupt.is_interrupt_pending()
            });
            match pushed {
                Ok(stalls) => stalled = stalls > 0,
                Err(PushError::Aborted { pushed }) => {
                    log::warn!(
                        "Shutdown while channel {} buffer was full, dropping {} elements",
                        channel,
                        n - pushed
                    );
                    channel_stats.record_dropped(n - pushed);
                }
                Err(PushError::Abandoned { pushed }) => {
                    log::warn!(
                        "Channel {} buffer has no consumer, dropping {} elements",
                        channel,
                        n - pushed
                    );
                    channel_stats.record_dropped(n - pushed);
                    gone = true;
                }
            }
        }

        let next = next_request(outcome.remaining, *batch_size);
        if next != requested {
            log::trace!(
                "Channel {} backlog {}, next request {} (was {})",
                channel,
                outcome.remaining,
                next,
                requested
            );
        }
        lane.requested = next;
        channel_stats.record_request(next);
        let within_batch = next <= *batch_size;

        if tolerated_error {
            self.signal(INV_READ_ERROR_TOLERATED);
        }
        if n > 0 {
            self.signal(INV_BATCH_PUSHED);
        }
        if stalled {
            self.signal(INV_BACKPRESSURE_STALL);
        }
        if within_batch {
            self.signal(INV_REQUEST_WITHIN_BATCH);
        }
        (requested > 0 || n > 0, gone)
    }

    fn signal(&mut self, id: u8) {
        let bit = 1u64 << (id % 64);
        if self.signaled & bit == 0 {
            self.signaled |= bit;
            signal_invariant(&mut self.signals, id);
        }
    }

    #[cfg(test)]
    fn requested(&self, slot: usize) -> usize {
        self.lanes[slot].requested
    }
}
