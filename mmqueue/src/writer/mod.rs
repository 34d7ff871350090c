use serde_derive::{Deserialize, Serialize};

use super::config::QueueConfig;
use super::control::Role;
use super::errors::{EnqueueError, OpenError};
use super::queue::{MemoryMappedQueue, QueueStats};

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    pub queue: QueueConfig,
}

/// The producing end of a queue.
pub struct MessageWriter {
    queue: MemoryMappedQueue,
}

impl MessageWriter {
    pub fn new(cfg: &WriterConfig) -> Result<MessageWriter, OpenError> {
        let queue = MemoryMappedQueue::with_config(&cfg.queue, Role::Writer)?;
        Ok(MessageWriter { queue })
    }

    pub fn close(self) {
        self.queue.close()
    }

    pub fn add(&mut self, message: &[u8]) -> Result<(), EnqueueError> {
        self.queue.enqueue(message)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Largest payload that fits an empty queue.
    pub fn max_message_size(&self) -> usize {
        self.queue.capacity() - crate::ring::LEN_PREFIX_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{MessageReader, ReaderConfig};
    use crate::tests::unique_config;

    #[test]
    fn add_then_read() {
        let queue = unique_config(128);
        let mut writer = MessageWriter::new(&WriterConfig { queue: queue.clone() }).unwrap();
        let mut reader = MessageReader::new(&ReaderConfig { queue }).unwrap();

        writer.add(b"Hello from shmem!").unwrap();
        writer.add(b"Short").unwrap();
        assert_eq!(writer.stats().live_bytes, 21 + 9);

        assert_eq!(reader.read().unwrap().as_deref(), Some(&b"Hello from shmem!"[..]));
        assert_eq!(reader.read().unwrap().as_deref(), Some(&b"Short"[..]));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn max_message_size_fills_an_empty_queue() {
        let queue = unique_config(32);
        let mut writer = MessageWriter::new(&WriterConfig { queue }).unwrap();
        let size = writer.max_message_size();
        assert_eq!(size, 28);
        writer.add(&vec![1u8; size]).unwrap();
        assert_eq!(writer.stats().free_bytes, 0);
        assert!(matches!(
            writer.add(&[1]),
            Err(EnqueueError::OutOfSpace { needed: 5, free: 0 })
        ));
    }
}
