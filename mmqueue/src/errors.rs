use std::time::Duration;

use thiserror::Error;

use crate::control::Role;

/// Rejected endpoint configuration. Raised before any segment or lock exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("capacity {capacity} is below the minimum of {min} bytes")]
    CapacityTooSmall { capacity: usize, min: usize },
    #[error("capacity {capacity} must be below {max} bytes")]
    CapacityTooLarge { capacity: usize, max: usize },
    #[error("queue name must not be empty")]
    EmptyName,
}

/// An observed pointer relationship that no correct peer could have produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Corruption {
    #[error("read offset {read} is ahead of write offset {write}")]
    ReadAheadOfWrite { read: u64, write: u64 },
    #[error("{live} live bytes exceed capacity {capacity}")]
    OverCapacity { live: u64, capacity: u64 },
    #[error("{role} offset moved backwards from {cached} to {observed}")]
    PointerRegressed { role: Role, cached: u64, observed: u64 },
    #[error("{role} offset was republished as {observed}, expected {expected}")]
    ForeignPublish { role: Role, expected: u64, observed: u64 },
    #[error("record at offset {offset} declares {len} bytes but only {available} are live")]
    InvalidRecordLength { offset: u64, len: u32, available: u64 },
}

/// Failures while creating or attaching to the shared segments.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("shared memory error on {id}: {source}")]
    SharedMemory {
        id: String,
        #[source]
        source: shared_memory::ShmemError,
    },
    #[error("segment {id} holds {actual} bytes, expected at least {expected}")]
    SizeMismatch { id: String, expected: usize, actual: usize },
    #[error("lock error: {0}")]
    Lock(String),
    #[error("lock in {id} was not initialised within {timeout:?}")]
    LockNotReady { id: String, timeout: Duration },
    #[error("lock not acquired within {0:?}")]
    LockTimeout(Duration),
    #[error("corrupted queue state: {0}")]
    Corrupted(#[from] Corruption),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("enqueue called on a {0} endpoint")]
    RoleViolation(Role),
    #[error("empty payloads cannot be enqueued")]
    EmptyPayload,
    #[error("record of {record_size} bytes can never fit a queue of {capacity} bytes")]
    RecordTooLarge { record_size: usize, capacity: usize },
    #[error("record of {needed} bytes does not fit the {free} free bytes")]
    OutOfSpace { needed: usize, free: usize },
    #[error("lock not acquired within {0:?}")]
    LockTimeout(Duration),
    #[error("corrupted queue state: {0}")]
    Corrupted(Corruption),
}

impl EnqueueError {
    /// Whether the same call may succeed later without reconfiguring the queue.
    pub fn is_transient(&self) -> bool {
        matches!(self, EnqueueError::OutOfSpace { .. } | EnqueueError::LockTimeout(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DequeueError {
    #[error("dequeue called on a {0} endpoint")]
    RoleViolation(Role),
    #[error("lock not acquired within {0:?}")]
    LockTimeout(Duration),
    #[error("corrupted queue state: {0}")]
    Corrupted(Corruption),
}

impl DequeueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DequeueError::LockTimeout(_))
    }
}

/// The shared mutex was not acquired before the configured timeout elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeout(pub Duration);

impl From<LockTimeout> for EnqueueError {
    fn from(err: LockTimeout) -> Self {
        EnqueueError::LockTimeout(err.0)
    }
}

impl From<LockTimeout> for DequeueError {
    fn from(err: LockTimeout) -> Self {
        DequeueError::LockTimeout(err.0)
    }
}

impl From<LockTimeout> for OpenError {
    fn from(err: LockTimeout) -> Self {
        OpenError::LockTimeout(err.0)
    }
}
