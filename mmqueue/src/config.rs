use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Smallest capacity accepted: room for the control fields plus a length prefix overhead.
pub const MIN_CAPACITY: usize = 16;
/// Exclusive upper bound. Every framed length must fit the 4-byte prefix.
pub const MAX_CAPACITY: usize = i32::MAX as usize;

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Base name of the shared segments and the lock.
    pub name: String,
    /// Data Segment size in bytes. Must match on both endpoints.
    pub capacity: usize,
    pub lock_timeout_ms: u64,
    /// Unlink the segments when the endpoint that created them is dropped.
    pub remove_on_drop: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            name: "mmqueue".to_string(),
            capacity: 1024 * 1024,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            remove_on_drop: false,
        }
    }
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, capacity: usize) -> QueueConfig {
        QueueConfig {
            name: name.into(),
            capacity,
            ..Default::default()
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn data_id(&self) -> String {
        format!("{}_data", self.name)
    }

    pub fn pointers_id(&self) -> String {
        format!("{}_pointers", self.name)
    }

    pub fn lock_id(&self) -> String {
        format!("{}_lock", self.name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        validate_capacity(self.capacity)
    }
}

pub fn validate_capacity(capacity: usize) -> Result<(), ConfigError> {
    if capacity < MIN_CAPACITY {
        return Err(ConfigError::CapacityTooSmall {
            capacity,
            min: MIN_CAPACITY,
        });
    }
    if capacity >= MAX_CAPACITY {
        return Err(ConfigError::CapacityTooLarge {
            capacity,
            max: MAX_CAPACITY,
        });
    }
    Ok(())
}
