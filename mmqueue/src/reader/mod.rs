use serde_derive::{Deserialize, Serialize};

use super::config::QueueConfig;
use super::control::Role;
use super::errors::{DequeueError, OpenError};
use super::queue::{MemoryMappedQueue, QueueStats};

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub queue: QueueConfig,
}

/// The consuming end of a queue.
pub struct MessageReader {
    queue: MemoryMappedQueue,
}

impl MessageReader {
    pub fn new(cfg: &ReaderConfig) -> Result<MessageReader, OpenError> {
        let queue = MemoryMappedQueue::with_config(&cfg.queue, Role::Reader)?;
        Ok(MessageReader { queue })
    }

    pub fn close(self) {
        self.queue.close()
    }

    pub fn read(&mut self) -> Result<Option<Vec<u8>>, DequeueError> {
        self.queue.dequeue()
    }

    /// Hands each available record to `f` until the queue is empty; returns how many were read.
    pub fn read_all<F>(&mut self, mut f: F) -> Result<usize, DequeueError>
    where
        F: FnMut(Vec<u8>),
    {
        let mut count = 0;
        while let Some(message) = self.queue.dequeue()? {
            f(message);
            count += 1;
        }
        Ok(count)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}
