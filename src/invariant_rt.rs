//! Worker-safe invariant signaling for the streaming loop.
//!
//! This module provides the first tier of the two-tier invariant system:
//! - **Tier 1 (worker)**: lock-free signaling of invariant IDs from the
//!   streaming worker thread
//! - **Tier 2 (session)**: verification and contract testing on the
//!   consumer side, see [`crate::invariant_ppt`]
//!
//! The worker **signals facts**. The session **judges correctness**.
//!
//! Signaling never allocates, never locks and never blocks: a full queue
//! drops the signal rather than stalling the drain loop.

use rtrb::{Consumer, Producer, RingBuffer};

// ============================================================================
// Worker Invariant IDs (Tier 1)
// ============================================================================

/// A non-empty hardware read was pushed into its channel buffer.
pub const INV_BATCH_PUSHED: u8 = 1;

/// The next requested read size stayed within `batch_size`.
pub const INV_REQUEST_WITHIN_BATCH: u8 = 2;

/// A nonzero hardware status was reported and the loop carried on.
pub const INV_READ_ERROR_TOLERATED: u8 = 3;

/// The worker observed the stop flag and exited without another read.
pub const INV_STOP_HONORED: u8 = 4;

/// The worker observed the interrupt signal and exited without another read.
pub const INV_INTERRUPT_HONORED: u8 = 5;

/// A push had to wait for the consumer to free room.
pub const INV_BACKPRESSURE_STALL: u8 = 6;

// ============================================================================
// Invariant Signal Queue
// ============================================================================

/// Capacity for the invariant signal queue.
pub const INVARIANT_QUEUE_CAPACITY: usize = 256;

/// Creates a new invariant signal queue pair.
///
/// Returns (producer for the worker, consumer for the session).
pub fn new_invariant_queue() -> (Producer<u8>, Consumer<u8>) {
    RingBuffer::new(INVARIANT_QUEUE_CAPACITY)
}

/// Signals an invariant from the worker. Dropped silently if the queue is full.
#[inline]
pub fn signal_invariant(tx: &mut Producer<u8>, id: u8) {
    let _ = tx.push(id);
}

/// Drains all pending invariant signals from the queue.
pub fn drain_invariant_signals(rx: &mut Consumer<u8>) -> Vec<u8> {
    let mut signals = Vec::with_capacity(rx.slots());
    while let Ok(id) = rx.pop() {
        signals.push(id);
    }
    signals
}

/// Counts occurrences of each invariant ID in a signal list.
pub fn count_invariant_signals(signals: &[u8]) -> [usize; 256] {
    let mut counts = [0usize; 256];
    for &id in signals {
        counts[id as usize] += 1;
    }
    counts
}

/// Contract verification: asserts that required invariants were signaled.
///
/// # Panics
/// Panics if any required invariant was not signaled at least once.
pub fn contract_test_rt(contract_name: &str, signals: &[u8], required: &[u8]) {
    let counts = count_invariant_signals(signals);
    let missing: Vec<&str> = required
        .iter()
        .filter(|&&id| counts[id as usize] == 0)
        .map(|&id| invariant_name(id))
        .collect();

    if !missing.is_empty() {
        let present: Vec<&str> = signals
            .iter()
            .map(|&id| invariant_name(id))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        panic!(
            "Worker contract '{}' missing invariants: {:?}. Present: {:?}",
            contract_name, missing, present
        );
    }
}

/// Maps invariant ID to human-readable name (for diagnostics only).
pub const fn invariant_name(id: u8) -> &'static str {
    match id {
        INV_BATCH_PUSHED => "BATCH_PUSHED",
        INV_REQUEST_WITHIN_BATCH => "REQUEST_WITHIN_BATCH",
        INV_READ_ERROR_TOLERATED => "READ_ERROR_TOLERATED",
        INV_STOP_HONORED => "STOP_HONORED",
        INV_INTERRUPT_HONORED => "INTERRUPT_HONORED",
        INV_BACKPRESSURE_STALL => "BACKPRESSURE_STALL",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_queue_roundtrip() {
        let (mut tx, mut rx) = new_invariant_queue();

        signal_invariant(&mut tx, INV_BATCH_PUSHED);
        signal_invariant(&mut tx, INV_REQUEST_WITHIN_BATCH);
        signal_invariant(&mut tx, INV_BATCH_PUSHED);

        let signals = drain_invariant_signals(&mut rx);
        assert_eq!(
            signals,
            vec![INV_BATCH_PUSHED, INV_REQUEST_WITHIN_BATCH, INV_BATCH_PUSHED]
        );
    }

    #[test]
    fn test_count_invariant_signals() {
        let signals = vec![INV_BATCH_PUSHED, INV_BATCH_PUSHED, INV_STOP_HONORED];
        let counts = count_invariant_signals(&signals);
        assert_eq!(counts[INV_BATCH_PUSHED as usize], 2);
        assert_eq!(counts[INV_STOP_HONORED as usize], 1);
        assert_eq!(counts[INV_INTERRUPT_HONORED as usize], 0);
    }

    #[test]
    #[should_panic(expected = "missing invariants")]
    fn test_contract_fails_when_invariants_missing() {
        let signals = vec![INV_BATCH_PUSHED];
        contract_test_rt(
            "incomplete contract",
            &signals,
            &[INV_BATCH_PUSHED, INV_STOP_HONORED],
        );
    }

    #[test]
    fn test_queue_drops_overflow() {
        let (mut tx, mut rx) = new_invariant_queue();
        for _ in 0..INVARIANT_QUEUE_CAPACITY + 100 {
            signal_invariant(&mut tx, INV_BATCH_PUSHED);
        }
        let signals = drain_invariant_signals(&mut rx);
        assert_eq!(signals.len(), INVARIANT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_invariant_names() {
        assert_eq!(invariant_name(INV_READ_ERROR_TOLERATED), "READ_ERROR_TOLERATED");
        assert_eq!(invariant_name(255), "UNKNOWN");
    }
}
