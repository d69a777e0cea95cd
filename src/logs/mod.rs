// src/logs/mod.rs

//! Per-command log buffering and fan-out.
//!
//! - [`buffer`] is the capped ring buffer holding the most recent lines.
//! - [`multiplexer`] owns one buffer per command, queues new lines, and
//!   flushes them on a short timer as batches to subscribers and as
//!   `NewLogEntry` events on the bus.

pub mod buffer;
pub mod multiplexer;

pub use buffer::LogBuffer;
pub use multiplexer::{DEFAULT_BATCH_INTERVAL, LogBatch, LogMultiplexer};
