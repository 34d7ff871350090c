//! A single-writer/single-reader byte queue stored in memory shared between two processes.
//!
//! Records are framed as a 4-byte little-endian length followed by the payload
//! inside a fixed-capacity circular Data Segment. A 16-byte Control Segment holds
//! the writer's and the reader's logical offsets, and a process-shared mutex
//! serialises every operation.

mod control;
mod core;
mod errors;
mod ring;

pub mod config;
pub mod object;
pub mod queue;
pub mod reader;
pub mod writer;

#[cfg(test)]
mod tests;

pub use crate::config::{QueueConfig, MAX_CAPACITY, MIN_CAPACITY};
pub use crate::control::{Pointers, Role, CONTROL_SIZE};
pub use crate::errors::{
    ConfigError, Corruption, DequeueError, EnqueueError, LockTimeout, OpenError,
};
pub use crate::queue::{MemoryMappedQueue, QueueStats};
pub use crate::ring::LEN_PREFIX_SIZE;

/// Unlinks the segments of the queue named by `cfg`.
pub fn remove_segments(cfg: &QueueConfig) -> Result<(), OpenError> {
    crate::core::ShmemService::remove(cfg)
}
