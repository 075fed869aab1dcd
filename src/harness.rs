//! Test harness: mock hardware channel sources.
//!
//! Every source records the size of each read it is asked for, so tests can
//! observe the worker's adaptive batch sizing from the outside.

use crate::element::Element;
use crate::source::{ChannelId, ChannelSource, FifoRead, FifoStatus};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared record of requested read sizes.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    inner: Arc<Mutex<Vec<usize>>>,
}

impl RequestLog {
    fn record(&self, n: usize) {
        if let Ok(mut log) = self.inner.lock() {
            log.push(n);
        }
    }

    /// Every requested read size so far, in order.
    pub fn requests(&self) -> Vec<usize> {
        self.inner.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

/// One scripted hardware read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadStep<T> {
    pub data: Vec<T>,
    /// Backlog reported after this step's data is delivered.
    pub remaining: usize,
    pub status: FifoStatus,
}

impl<T: Element> ReadStep<T> {
    pub fn data(data: Vec<T>, remaining: usize) -> Self {
        Self {
            data,
            remaining,
            status: FifoStatus::SUCCESS,
        }
    }

    /// A read that delivers nothing and reports `status`.
    pub fn status(status: FifoStatus, remaining: usize) -> Self {
        Self {
            data: Vec::new(),
            remaining,
            status,
        }
    }
}

/// Replays a fixed script of reads, then behaves like an empty FIFO.
///
/// - A non-empty read consumes the next step, delivering at most the
///   requested number of elements; undelivered elements stay queued and are
///   added to the reported backlog.
/// - An empty read (backlog poll) consumes nothing and reports every
///   scripted element still pending.
/// - A non-empty read with the script exhausted blocks for the full timeout
///   and returns [`FifoStatus::TIMEOUT`].
#[derive(Debug)]
pub struct ScriptedSource<T> {
    id: ChannelId,
    steps: VecDeque<ReadStep<T>>,
    log: RequestLog,
}

impl<T: Element> ScriptedSource<T> {
    pub fn new(id: ChannelId, steps: Vec<ReadStep<T>>) -> Self {
        Self {
            id,
            steps: steps.into(),
            log: RequestLog::default(),
        }
    }

    pub fn request_log(&self) -> RequestLog {
        self.log.clone()
    }

    fn pending(&self) -> usize {
        self.steps.iter().map(|s| s.data.len()).sum()
    }
}

impl<T: Element> ChannelSource for ScriptedSource<T> {
    type Elem = T;

    fn channel_id(&self) -> ChannelId {
        self.id
    }

    fn read(&mut self, buf: &mut [T], timeout: Duration) -> FifoRead {
        self.log.record(buf.len());
        if buf.is_empty() {
            return FifoRead::ok(0, self.pending());
        }
        let Some(mut step) = self.steps.pop_front() else {
            std::thread::sleep(timeout);
            return FifoRead {
                status: FifoStatus::TIMEOUT,
                read: 0,
                remaining: 0,
            };
        };
        let n = buf.len().min(step.data.len());
        buf[..n].copy_from_slice(&step.data[..n]);
        let leftover = step.data.split_off(n);
        let remaining = step.remaining + leftover.len();
        if !leftover.is_empty() {
            self.steps.push_front(ReadStep::data(leftover, step.remaining));
        }
        FifoRead {
            status: step.status,
            read: n,
            remaining,
        }
    }
}

/// Endless source of consecutive `u32` values that always fills the
/// request and reports a fixed backlog.
#[derive(Debug)]
pub struct CountingSource {
    id: ChannelId,
    next: u32,
    backlog: usize,
    log: RequestLog,
}

impl CountingSource {
    pub fn new(id: ChannelId, backlog: usize) -> Self {
        Self {
            id,
            next: 0,
            backlog,
            log: RequestLog::default(),
        }
    }

    pub fn request_log(&self) -> RequestLog {
        self.log.clone()
    }
}

impl ChannelSource for CountingSource {
    type Elem = u32;

    fn channel_id(&self) -> ChannelId {
        self.id
    }

    fn read(&mut self, buf: &mut [u32], _timeout: Duration) -> FifoRead {
        self.log.record(buf.len());
        for slot in buf.iter_mut() {
            *slot = self.next;
            self.next = self.next.wrapping_add(1);
        }
        FifoRead::ok(buf.len(), self.backlog)
    }
}

/// Source whose every non-empty read blocks for the full timeout and
/// delivers nothing, while claiming a backlog so the worker keeps asking.
#[derive(Debug)]
pub struct StalledSource {
    id: ChannelId,
    log: RequestLog,
}

impl StalledSource {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            log: RequestLog::default(),
        }
    }

    pub fn request_log(&self) -> RequestLog {
        self.log.clone()
    }
}

impl ChannelSource for StalledSource {
    type Elem = u32;

    fn channel_id(&self) -> ChannelId {
        self.id
    }

    fn read(&mut self, buf: &mut [u32], timeout: Duration) -> FifoRead {
        self.log.record(buf.len());
        if !buf.is_empty() {
            std::thread::sleep(timeout);
        }
        FifoRead {
            status: FifoStatus::TIMEOUT,
            read: 0,
            remaining: usize::MAX,
        }
    }
}
