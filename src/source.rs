//! Hardware channel source boundary.
//!
//! A source is a timeout-bounded, partial-read-capable FIFO that also
//! reports how many elements are still queued on the hardware side. Real
//! bindings (an FPGA DMA FIFO, for example) live outside this crate and
//! implement [`ChannelSource`].

#![forbid(unsafe_code)]

use crate::element::Element;
use std::fmt;
use std::time::Duration;

/// Hardware address of a FIFO channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw status code returned by a FIFO read.
///
/// Zero is success, negative values are errors, positive values are
/// warnings. None of them abort a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FifoStatus(pub i32);

impl FifoStatus {
    pub const SUCCESS: FifoStatus = FifoStatus(0);
    /// Vendor code for "fewer elements than requested arrived before the timeout".
    pub const TIMEOUT: FifoStatus = FifoStatus(-50400);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    pub fn is_error(self) -> bool {
        self.0 < 0
    }

    pub fn is_warning(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for FifoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one hardware read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FifoRead {
    pub status: FifoStatus,
    /// Elements written into the caller's buffer.
    pub read: usize,
    /// Backlog still queued in the hardware FIFO after this read.
    pub remaining: usize,
}

impl FifoRead {
    pub fn ok(read: usize, remaining: usize) -> Self {
        Self {
            status: FifoStatus::SUCCESS,
            read,
            remaining,
        }
    }
}

/// A blocking, timeout-bounded FIFO read primitive for one channel.
pub trait ChannelSource: Send + 'static {
    type Elem: Element;

    /// The hardware address this source reads from.
    fn channel_id(&self) -> ChannelId;

    /// Reads up to `buf.len()` elements, blocking for at most `timeout`.
    ///
    /// An empty `buf` is a backlog poll: it must return immediately with
    /// the current `remaining` count.
    fn read(&mut self, buf: &mut [Self::Elem], timeout: Duration) -> FifoRead;
}

impl<S: ChannelSource + ?Sized> ChannelSource for Box<S> {
    type Elem = S::Elem;

    fn channel_id(&self) -> ChannelId {
        (**self).channel_id()
    }

    fn read(&mut self, buf: &mut [Self::Elem], timeout: Duration) -> FifoRead {
        (**self).read(buf, timeout)
    }
}
