//! Dual-channel FIFO streaming bridge.
//!
//! A background worker drains two timeout-bounded hardware FIFOs into
//! bounded in-memory buffers, so a consumer can poll them at its own pace
//! without ever blocking. Each popped batch can also be mirrored to a
//! per-channel append-only file.
//!
//! ```ignore
//! let mut session = Session::new(StreamConfig::new(4096, Duration::from_millis(100)));
//! session.start([fifo_a, fifo_b])?;
//! let batch = session.read_channel(ChannelId(2), 10_000)?;
//! session.stop()?;
//! ```

pub mod bridge;
pub mod buffer;
pub mod cancel;
pub mod config;
pub mod element;
pub mod error;
#[doc(hidden)]
pub mod harness;
#[doc(hidden)]
pub mod invariant_ppt;
#[doc(hidden)]
pub mod invariant_rt;
pub mod session;
pub mod sink;
pub mod source;
pub mod stats;
