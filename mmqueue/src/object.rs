//! Typed adapters that move serde values through a byte queue as JSON records.

use std::marker::PhantomData;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{DequeueError, EnqueueError, OpenError};
use crate::reader::{MessageReader, ReaderConfig};
use crate::writer::{MessageWriter, WriterConfig};

pub const DEFAULT_MAX_ITEM_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error("serialized item is {size} bytes, the limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),
    #[error(transparent)]
    Dequeue(#[from] DequeueError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectWriterConfig {
    pub writer: WriterConfig,
    pub max_item_size: usize,
    /// Skip oversized items instead of failing.
    pub ignore_incorrect_items: bool,
}

impl Default for ObjectWriterConfig {
    fn default() -> Self {
        ObjectWriterConfig {
            writer: WriterConfig::default(),
            max_item_size: DEFAULT_MAX_ITEM_SIZE,
            ignore_incorrect_items: true,
        }
    }
}

pub struct ObjectWriter<T> {
    writer: MessageWriter,
    max_item_size: usize,
    ignore_incorrect_items: bool,
    _item: PhantomData<fn(&T)>,
}

impl<T: Serialize> ObjectWriter<T> {
    pub fn new(cfg: &ObjectWriterConfig) -> Result<ObjectWriter<T>, OpenError> {
        Ok(ObjectWriter {
            writer: MessageWriter::new(&cfg.writer)?,
            max_item_size: cfg.max_item_size,
            ignore_incorrect_items: cfg.ignore_incorrect_items,
            _item: PhantomData,
        })
    }

    /// Serializes and enqueues `item`.
    ///
    /// Returns `Ok(false)` when an oversized item was skipped.
    pub fn send(&mut self, item: &T) -> Result<bool, ObjectError> {
        let bytes = serde_json::to_vec(item).map_err(ObjectError::Serialize)?;
        if bytes.len() > self.max_item_size {
            if self.ignore_incorrect_items {
                warn!(
                    "skipping item of {} bytes (limit {})",
                    bytes.len(),
                    self.max_item_size
                );
                return Ok(false);
            }
            return Err(ObjectError::TooLarge {
                size: bytes.len(),
                max: self.max_item_size,
            });
        }
        self.writer.add(&bytes)?;
        Ok(true)
    }

    pub fn into_inner(self) -> MessageWriter {
        self.writer
    }
}

pub struct ObjectReader<T> {
    reader: MessageReader,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> ObjectReader<T> {
    pub fn new(cfg: &ReaderConfig) -> Result<ObjectReader<T>, OpenError> {
        Ok(ObjectReader {
            reader: MessageReader::new(cfg)?,
            _item: PhantomData,
        })
    }

    pub fn recv(&mut self) -> Result<Option<T>, ObjectError> {
        match self.reader.read()? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(ObjectError::Deserialize),
            None => Ok(None),
        }
    }

    pub fn into_inner(self) -> MessageReader {
        self.reader
    }
}
