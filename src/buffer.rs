//! Bounded channel buffer: fixed-capacity SPSC queue with blocking push and
//! non-blocking eager pop.
//!
//! Built on the `rtrb` lock-free ring buffer. The producer half lives on the
//! streaming worker, the consumer half on whichever thread polls the session.
//!
//! # Guarantees
//!
//! - Occupancy never exceeds the capacity.
//! - [`BufferWriter::push`] blocks while the buffer is full; it never drops
//!   or overwrites queued elements.
//! - [`BufferReader::pop_eager`] never blocks and returns elements in the
//!   exact order they were pushed.

use crate::element::Element;
use rtrb::{Consumer, Producer, RingBuffer};
use std::time::Duration;
use thiserror::Error;

/// Default interval a blocked push waits before re-checking for room.
pub const DEFAULT_PUSH_POLL: Duration = Duration::from_millis(1);

/// Creates a buffer pair with room for `capacity` elements.
///
/// Returns (producer for the worker, consumer for the session).
pub fn bounded<T: Element>(capacity: usize) -> (BufferWriter<T>, BufferReader<T>) {
    let (producer, consumer) = RingBuffer::new(capacity);
    (
        BufferWriter {
            inner: producer,
            capacity,
        },
        BufferReader {
            inner: consumer,
            capacity,
        },
    )
}

/// Why a push returned before every element was enqueued.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The consumer half was dropped; nothing will ever drain the buffer.
    #[error("buffer consumer was dropped after {pushed} elements were pushed")]
    Abandoned { pushed: usize },
    /// The abort check fired while the push was waiting for room.
    #[error("push aborted after {pushed} elements were pushed")]
    Aborted { pushed: usize },
}

impl PushError {
    /// Elements that made it into the buffer before the push gave up.
    pub fn pushed(&self) -> usize {
        match *self {
            PushError::Abandoned { pushed } | PushError::Aborted { pushed } => pushed,
        }
    }
}

/// Producer half of a bounded channel buffer.
pub struct BufferWriter<T> {
    inner: Producer<T>,
    capacity: usize,
}

impl<T: Element> BufferWriter<T> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Elements currently queued, as seen from the producer side.
    pub fn occupancy(&self) -> usize {
        self.capacity - self.inner.slots()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    /// True once the consumer half has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.inner.is_abandoned()
    }

    /// Enqueues every element, blocking while the buffer is full.
    ///
    /// Only returns early if the consumer is dropped.
    pub fn push(&mut self, items: &[T]) -> Result<(), PushError> {
        self.push_until(items, DEFAULT_PUSH_POLL, || false).map(|_| ())
    }

    /// Enqueues every element, blocking while the buffer is full and
    /// re-checking `abort` every `poll` while blocked.
    ///
    /// Returns the number of times the push had to wait for room.
    pub fn push_until<F>(&mut self, items: &[T], poll: Duration, abort: F) -> Result<usize, PushError>
    where
        F: Fn() -> bool,
    {
        let mut rest = items;
        let mut pushed = 0;
        let mut stalls = 0;
        while !rest.is_empty() {
            let free = self.inner.slots();
            if free > 0 {
                let n = free.min(rest.len());
                let written = match self.inner.write_chunk_uninit(n) {
                    Ok(chunk) => chunk.fill_from_iter(rest[..n].iter().copied()),
                    Err(_) => 0,
                };
                pushed += written;
                rest = &rest[written..];
                continue;
            }
            if self.inner.is_abandoned() {
                return Err(PushError::Abandoned { pushed });
            }
            if abort() {
                return Err(PushError::Aborted { pushed });
            }
            stalls += 1;
            std::thread::sleep(poll);
        }
        Ok(stalls)
    }
}

/// Consumer half of a bounded channel buffer.
pub struct BufferReader<T> {
    inner: Consumer<T>,
    capacity: usize,
}

impl<T: Element> BufferReader<T> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Elements ready to pop right now.
    pub fn available(&self) -> usize {
        self.inner.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// True once the producer half has been dropped (worker exited).
    pub fn is_abandoned(&self) -> bool {
        self.inner.is_abandoned()
    }

    /// Pops up to `out.len()` elements into `out` without blocking.
    ///
    /// Returns the number of elements written, `min(out.len(), available)`.
    pub fn pop_into(&mut self, out: &mut [T]) -> usize {
        let n = out.len().min(self.inner.slots());
        if n == 0 {
            return 0;
        }
        let chunk = match self.inner.read_chunk(n) {
            Ok(chunk) => chunk,
            Err(_) => return 0,
        };
        let (first, second) = chunk.as_slices();
        out[..first.len()].copy_from_slice(first);
        out[first.len()..n].copy_from_slice(second);
        chunk.commit_all();
        n
    }

    /// Pops up to `max` elements without blocking, oldest first.
    pub fn pop_eager(&mut self, max: usize) -> Vec<T> {
        let n = max.min(self.inner.slots());
        let mut out = vec![T::default(); n];
        let got = self.pop_into(&mut out);
        out.truncate(got);
        out
    }
}

impl<T> std::fmt::Debug for BufferWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferWriter")
            .field("capacity", &self.capacity)
            .field("free", &self.inner.slots())
            .finish()
    }
}

impl<T> std::fmt::Debug for BufferReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferReader")
            .field("capacity", &self.capacity)
            .field("available", &self.inner.slots())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn pop_on_empty_returns_nothing() {
        let (_tx, mut rx) = bounded::<u32>(8);
        assert!(rx.pop_eager(4).is_empty());
        let mut out = [0u32; 4];
        assert_eq!(rx.pop_into(&mut out), 0);
    }

    #[test]
    fn pop_returns_min_of_request_and_available() {
        let (mut tx, mut rx) = bounded::<u32>(8);
        tx.push(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(rx.pop_eager(3), vec![1, 2, 3]);
        assert_eq!(rx.available(), 2);
        assert_eq!(rx.pop_eager(10), vec![4, 5]);
        assert!(rx.is_empty());
    }

    #[test]
    fn fifo_order_across_wraparound() {
        let (mut tx, mut rx) = bounded::<u16>(4);
        tx.push(&[1, 2, 3]).unwrap();
        assert_eq!(rx.pop_eager(2), vec![1, 2]);
        tx.push(&[4, 5, 6]).unwrap();
        assert_eq!(tx.occupancy(), 4);
        assert_eq!(rx.pop_eager(8), vec![3, 4, 5, 6]);
    }

    #[test]
    fn push_larger_than_capacity_completes_with_concurrent_consumer() {
        let (mut tx, mut rx) = bounded::<u32>(4);
        let data: Vec<u32> = (0..64).collect();
        let expected = data.clone();
        let producer = std::thread::spawn(move || tx.push(&data));
        let mut received = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while received.len() < expected.len() && Instant::now() < deadline {
            received.extend(rx.pop_eager(3));
        }
        producer.join().unwrap().unwrap();
        assert_eq!(received, expected);
    }

    #[test]
    fn push_reports_abandoned_consumer() {
        let (mut tx, rx) = bounded::<u32>(2);
        drop(rx);
        let err = tx.push(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, PushError::Abandoned { pushed: 2 });
        assert!(tx.is_abandoned());
    }

    #[test]
    fn blocked_push_honours_abort() {
        let (mut tx, _rx) = bounded::<u32>(2);
        let abort = Arc::new(AtomicBool::new(false));
        let flag = abort.clone();
        let handle = std::thread::spawn(move || {
            tx.push_until(&[1, 2, 3, 4], Duration::from_millis(1), || {
                flag.load(Ordering::SeqCst)
            })
        });
        std::thread::sleep(Duration::from_millis(20));
        abort.store(true, Ordering::SeqCst);
        let result = handle.join().unwrap();
        assert_eq!(result, Err(PushError::Aborted { pushed: 2 }));
    }
}
