//! Stream configuration.

#![forbid(unsafe_code)]

use crate::error::{BridgeError, Result};
use crate::invariant_ppt::{assert_invariant, CONFIG_VALIDATION};
use std::time::Duration;

/// Largest single transfer a hardware FIFO hands over in one read.
pub const MAX_TRANSFER_ELEMS: usize = 32_768;

/// Default per-channel buffer capacity: 32 maximal hardware transfers.
pub const DEFAULT_BUFFER_CAPACITY: usize = 32 * MAX_TRANSFER_ELEMS;

/// Default per-read hardware timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Execution parameters for one streaming session.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Upper bound on elements requested from a channel per read (`nElem`).
    pub batch_size: usize,
    /// Longest a single hardware read may block.
    pub read_timeout: Duration,
    /// Capacity of each channel buffer, in elements.
    pub buffer_capacity: usize,
    /// How often a push blocked on a full buffer re-checks for room and cancellation.
    pub backpressure_poll: Duration,
    /// Sleep after an iteration that neither requested nor read anything. Zero disables it.
    pub idle_backoff: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_TRANSFER_ELEMS,
            read_timeout: DEFAULT_READ_TIMEOUT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            backpressure_poll: Duration::from_millis(1),
            idle_backoff: Duration::from_millis(1),
        }
    }
}

impl StreamConfig {
    /// Config with the given batch size and timeout; everything else defaulted.
    pub fn new(batch_size: usize, read_timeout: Duration) -> Self {
        Self {
            batch_size,
            read_timeout,
            ..Self::default()
        }
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_backpressure_poll(mut self, poll: Duration) -> Self {
        self.backpressure_poll = poll;
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    /// Checks the parameters before any thread or buffer is created.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "buffer_capacity must be greater than zero".into(),
            ));
        }
        if self.batch_size > self.buffer_capacity {
            return Err(BridgeError::InvalidConfig(format!(
                "batch_size ({}) exceeds buffer_capacity ({})",
                self.batch_size, self.buffer_capacity
            )));
        }
        assert_invariant(
            CONFIG_VALIDATION,
            self.batch_size <= self.buffer_capacity,
            "validated config keeps a batch within one buffer",
            None,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_32_transfers() {
        let config = StreamConfig::default();
        assert_eq!(config.buffer_capacity, 32 * config.batch_size);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_batch() {
        let config = StreamConfig::new(0, DEFAULT_READ_TIMEOUT);
        assert!(matches!(config.validate(), Err(BridgeError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_batch_larger_than_capacity() {
        let config = StreamConfig::new(64, DEFAULT_READ_TIMEOUT).with_buffer_capacity(32);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds buffer_capacity"));
    }
}
