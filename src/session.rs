//! Session: the lifecycle of one streaming run.
//!
//! A [`Session`] is an ordinary value owned by the caller. It holds the
//! consumer halves of both channel buffers, the optional file sinks, and the
//! worker thread handle. Any number of sessions may exist side by side.
//!
//! ```text
//!   Idle --start--> Running --stop--> Stopping --join--> Idle
//! ```
//!
//! Every entry point checks the current state and returns an error on a
//! misuse transition instead of corrupting the session.

use crate::bridge::{Bridge, WorkerExit};
use crate::buffer::{bounded, BufferReader};
use crate::cancel::{never_interrupt, CancelToken, InterruptSignal};
use crate::config::StreamConfig;
use crate::element::Element;
use crate::error::{BridgeError, Result};
use crate::invariant_ppt::{
    assert_invariant, BUFFER_CAPACITY_BOUND, CHANNEL_MAPPING_UNIQUE, EAGER_POP_BOUND,
    SESSION_TRANSITION,
};
use crate::invariant_rt::{drain_invariant_signals, new_invariant_queue};
use crate::sink::{FileSink, SinkConfig};
use crate::source::{ChannelId, ChannelSource};
use crate::stats::{StatsSnapshot, StreamStats};
use rtrb::Consumer;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

/// Summary returned by [`Session::stop`].
#[derive(Debug, Clone)]
pub struct StopReport {
    pub exit: WorkerExit,
    pub stats: StatsSnapshot,
    /// Worker invariant signals not yet drained when the session stopped.
    pub signals: Vec<u8>,
    /// Elements persisted per channel, if the session had a file sink.
    pub persisted: Option<[u64; 2]>,
}

struct ChannelSlot<T> {
    id: ChannelId,
    reader: BufferReader<T>,
    sink: Option<FileSink>,
}

struct ActiveStream<T> {
    slots: [ChannelSlot<T>; 2],
    stop: CancelToken,
    worker: JoinHandle<WorkerExit>,
    stats: Arc<StreamStats>,
    signals: Consumer<u8>,
}

/// A dual-channel streaming session.
pub struct Session<T: Element> {
    config: StreamConfig,
    interrupt: Arc<dyn InterruptSignal>,
    state: SessionState,
    active: Option<ActiveStream<T>>,
}

impl<T: Element> Session<T> {
    /// Creates an idle session. Nothing is allocated until [`start`](Self::start).
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            interrupt: never_interrupt(),
            state: SessionState::Idle,
            active: None,
        }
    }

    /// Injects the host's asynchronous abort check, polled by the worker.
    pub fn with_interrupt(mut self, interrupt: Arc<dyn InterruptSignal>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Channel ids of the running stream, in start order.
    pub fn channels(&self) -> Option<[ChannelId; 2]> {
        self.active
            .as_ref()
            .map(|active| [active.slots[0].id, active.slots[1].id])
    }

    /// Starts streaming from both sources.
    pub fn start<S>(&mut self, sources: [S; 2]) -> Result<()>
    where
        S: ChannelSource<Elem = T>,
    {
        self.launch(sources, None)
    }

    /// Starts streaming and opens one append-only file per channel.
    ///
    /// Only [`read_channel_to_file`](Self::read_channel_to_file) writes to
    /// the files.
    pub fn start_with_sink<S>(&mut self, sources: [S; 2], sink: &SinkConfig) -> Result<()>
    where
        S: ChannelSource<Elem = T>,
    {
        self.launch(sources, Some(sink))
    }

    fn launch<S>(&mut self, sources: [S; 2], sink: Option<&SinkConfig>) -> Result<()>
    where
        S: ChannelSource<Elem = T>,
    {
        if self.state != SessionState::Idle {
            return Err(BridgeError::AlreadyRunning);
        }
        self.config.validate()?;

        let ids = [sources[0].channel_id(), sources[1].channel_id()];
        if ids[0] == ids[1] {
            return Err(BridgeError::DuplicateChannel(ids[0]));
        }
        assert_invariant(
            CHANNEL_MAPPING_UNIQUE,
            ids[0] != ids[1],
            "each channel id maps to exactly one buffer",
            None,
        );

        let mut sinks = match sink {
            Some(sink) => [
                Some(FileSink::open(ids[0], sink.path(0))?),
                Some(FileSink::open(ids[1], sink.path(1))?),
            ],
            None => [None, None],
        };

        let (w0, r0) = bounded::<T>(self.config.buffer_capacity);
        let (w1, r1) = bounded::<T>(self.config.buffer_capacity);
        let stop = CancelToken::new();
        let stats = Arc::new(StreamStats::new(ids, self.config.batch_size));
        let (signal_tx, signal_rx) = new_invariant_queue();

        let [s0, s1] = sources;
        let bridge = Bridge::new(
            &self.config,
            [(s0, w0), (s1, w1)],
            stop.clone(),
            self.interrupt.clone(),
            stats.clone(),
            signal_tx,
        );
        let worker = std::thread::Builder::new()
            .name(format!("fifobridge-{}-{}", ids[0], ids[1]))
            .spawn(move || bridge.run())
            .map_err(BridgeError::Spawn)?;

        self.active = Some(ActiveStream {
            slots: [
                ChannelSlot {
                    id: ids[0],
                    reader: r0,
                    sink: sinks[0].take(),
                },
                ChannelSlot {
                    id: ids[1],
                    reader: r1,
                    sink: sinks[1].take(),
                },
            ],
            stop,
            worker,
            stats,
            signals: signal_rx,
        });
        self.transition(SessionState::Idle, SessionState::Running);
        log::info!(
            "Session started: channels {} and {}, batch {}, timeout {:?}, capacity {}{}",
            ids[0],
            ids[1],
            self.config.batch_size,
            self.config.read_timeout,
            self.config.buffer_capacity,
            if sink.is_some() { ", with file sink" } else { "" }
        );
        Ok(())
    }

    fn transition(&mut self, from: SessionState, to: SessionState) {
        assert_invariant(
            SESSION_TRANSITION,
            self.state == from,
            "session transitions follow Idle -> Running -> Stopping -> Idle",
            Some(&format!("{:?} -> {:?} from {:?}", from, to, self.state)),
        );
        self.state = to;
    }

    fn slot_mut(&mut self, channel: ChannelId) -> Result<&mut ChannelSlot<T>> {
        let state = self.state;
        let active = match self.active.as_mut() {
            Some(active) if state == SessionState::Running => active,
            _ => return Err(BridgeError::NotRunning(state)),
        };
        active
            .slots
            .iter_mut()
            .find(|slot| slot.id == channel)
            .ok_or(BridgeError::UnknownChannel(channel))
    }

    /// Elements ready to read on `channel` right now.
    pub fn available(&mut self, channel: ChannelId) -> Result<usize> {
        let slot = self.slot_mut(channel)?;
        let available = slot.reader.available();
        assert_invariant(
            BUFFER_CAPACITY_BOUND,
            available <= slot.reader.capacity(),
            "buffer occupancy never exceeds capacity",
            None,
        );
        Ok(available)
    }

    /// Pops up to `out.len()` elements from `channel` without blocking.
    pub fn read_channel_into(&mut self, channel: ChannelId, out: &mut [T]) -> Result<usize> {
        let slot = self.slot_mut(channel)?;
        let got = slot.reader.pop_into(out);
        assert_invariant(
            EAGER_POP_BOUND,
            got <= out.len(),
            "eager pop returns at most the requested count",
            None,
        );
        Ok(got)
    }

    /// Pops up to `max` elements from `channel` without blocking, oldest first.
    ///
    /// Returns an empty batch when nothing is buffered.
    pub fn read_channel(&mut self, channel: ChannelId, max: usize) -> Result<Vec<T>> {
        let slot = self.slot_mut(channel)?;
        let batch = slot.reader.pop_eager(max);
        assert_invariant(
            EAGER_POP_BOUND,
            batch.len() <= max,
            "eager pop returns at most the requested count",
            None,
        );
        Ok(batch)
    }

    /// Like [`read_channel`](Self::read_channel), and appends the batch to
    /// the channel's sink file.
    ///
    /// A failed write disables the sink but still hands the popped batch
    /// back, so nothing leaves the in-memory stream unseen. Later calls fail
    /// with [`BridgeError::SinkFailed`] without popping; the data stays
    /// available to [`read_channel`](Self::read_channel).
    pub fn read_channel_to_file(&mut self, channel: ChannelId, max: usize) -> Result<Vec<T>> {
        let slot = self.slot_mut(channel)?;
        let sink = slot.sink.as_mut().ok_or(BridgeError::SinkNotOpen)?;
        if sink.is_failed() {
            return Err(BridgeError::SinkFailed(channel));
        }
        let batch = slot.reader.pop_eager(max);
        if let Err(err) = sink.append(&batch) {
            log::warn!(
                "Returning {} unpersisted elements from channel {}: {}",
                batch.len(),
                channel,
                err
            );
        }
        Ok(batch)
    }

    /// True once the sink of `channel` has been disabled by a failed write.
    pub fn sink_failed(&mut self, channel: ChannelId) -> Result<bool> {
        let slot = self.slot_mut(channel)?;
        slot.sink
            .as_ref()
            .map(FileSink::is_failed)
            .ok_or(BridgeError::SinkNotOpen)
    }

    /// True if the worker has already exited on its own, e.g. after an
    /// interrupt. The session stays `Running` until [`stop`](Self::stop).
    pub fn worker_finished(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.worker.is_finished())
    }

    /// Current counters, while a stream is active.
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.active.as_ref().map(|active| active.stats.snapshot())
    }

    /// Drains worker invariant signals emitted since the last drain.
    pub fn drain_invariant_signals(&mut self) -> Vec<u8> {
        match self.active.as_mut() {
            Some(active) => drain_invariant_signals(&mut active.signals),
            None => Vec::new(),
        }
    }

    /// Stops the worker, waits for it to exit and releases both buffers.
    ///
    /// Blocks for at most one in-flight hardware read plus one backpressure
    /// poll. Also completes immediately if the worker already exited on an
    /// interrupt. Calling it on an idle session returns
    /// [`BridgeError::NotRunning`] and changes nothing.
    pub fn stop(&mut self) -> Result<StopReport> {
        if self.state != SessionState::Running {
            return Err(BridgeError::NotRunning(self.state));
        }
        let active = match self.active.take() {
            Some(active) => active,
            None => {
                self.state = SessionState::Idle;
                return Err(BridgeError::NotRunning(SessionState::Idle));
            }
        };
        self.transition(SessionState::Running, SessionState::Stopping);

        let ActiveStream {
            slots,
            stop,
            worker,
            stats,
            signals: mut signal_rx,
        } = active;
        stop.cancel();
        let joined = worker.join();

        let signals = drain_invariant_signals(&mut signal_rx);
        let mut persisted = [0u64; 2];
        let mut has_sink = false;
        let mut sink_error = None;
        for (i, slot) in slots.into_iter().enumerate() {
            if let Some(sink) = slot.sink {
                has_sink = true;
                match sink.close() {
                    Ok(written) => persisted[i] = written,
                    Err(err) => {
                        log::error!("Closing sink for channel {} failed: {}", slot.id, err);
                        sink_error.get_or_insert(err);
                    }
                }
            }
        }
        self.transition(SessionState::Stopping, SessionState::Idle);

        let exit = joined.map_err(|_| {
            log::error!("Streaming worker panicked");
            BridgeError::WorkerPanicked
        })?;
        if let Some(err) = sink_error {
            return Err(BridgeError::Io(err));
        }
        let stats = stats.snapshot();
        log::info!(
            "Session stopped ({:?}): {} iterations, {} elements read",
            exit,
            stats.iterations,
            stats.total_read()
        );
        Ok(StopReport {
            exit,
            stats,
            signals,
            persisted: has_sink.then_some(persisted),
        })
    }
}

impl<T: Element> Drop for Session<T> {
    fn drop(&mut self) {
        if self.state == SessionState::Running {
            if let Err(err) = self.stop() {
                log::warn!("Stopping session on drop failed: {}", err);
            }
        }
    }
}

impl<T: Element> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("channels", &self.channels())
            .finish()
    }
}
