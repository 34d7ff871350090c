use std::{
    convert::TryInto,
    error::Error,
    sync::{Arc, Barrier},
    thread,
    time::{Duration, Instant},
};

use super::unique_config;
use crate::{
    config::QueueConfig,
    control::Role,
    errors::{DequeueError, EnqueueError},
    queue::MemoryMappedQueue,
};

#[derive(Debug, Clone, PartialEq)]
struct TestMessage {
    id: u64,
    data: Vec<u8>,
}

impl TestMessage {
    fn new(id: u64, size: usize) -> Self {
        let val = (id % 250) as u8;
        TestMessage {
            id,
            data: vec![val; size],
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.id.to_le_bytes());
        bytes.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 12 {
            return None;
        }
        let id = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let data_len = u32::from_le_bytes(bytes[8..12].try_into().ok()?) as usize;
        if bytes.len() != 12 + data_len {
            return None;
        }
        Some(TestMessage {
            id,
            data: bytes[12..].to_vec(),
        })
    }

    fn is_consistent(&self) -> bool {
        let expected_val = (self.id % 250) as u8;
        self.data.iter().all(|&byte| byte == expected_val)
    }
}

#[test]
fn test_message_serialization() {
    let original = TestMessage::new(12345, 32);
    let decoded = TestMessage::from_bytes(&original.to_bytes()).expect("decoding failed");
    assert_eq!(original, decoded);
    assert!(decoded.is_consistent());

    let mut torn = original.clone();
    torn.data[0] = torn.data[0].wrapping_add(1);
    assert!(!torn.is_consistent());
    assert!(TestMessage::from_bytes(&original.to_bytes()[..20]).is_none());
}

fn run_writer(cfg: QueueConfig, ready: Arc<Barrier>, count: u64) -> Result<u64, EnqueueError> {
    let mut writer = MemoryMappedQueue::with_config(&cfg, Role::Writer).expect("writer: open failed");
    ready.wait();
    let mut retries = 0u64;
    for id in 1..=count {
        // Sizes vary so records land on every physical offset and straddle the end.
        let msg = TestMessage::new(id, (id % 97) as usize + 1).to_bytes();
        loop {
            match writer.enqueue(&msg) {
                Ok(()) => break,
                Err(e) if e.is_transient() => {
                    retries += 1;
                    thread::yield_now();
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(retries)
}

fn run_reader(cfg: QueueConfig, ready: Arc<Barrier>, count: u64) -> Result<u64, DequeueError> {
    let mut reader = MemoryMappedQueue::with_config(&cfg, Role::Reader).expect("reader: open failed");
    ready.wait();
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut expected_id = 1u64;
    let mut empty_polls = 0u64;
    while expected_id <= count {
        assert!(Instant::now() < deadline, "reader stalled at message {}", expected_id);
        let stats = reader.stats();
        assert!(stats.read_offset <= stats.write_offset);
        assert!(stats.live_bytes <= stats.capacity as u64);
        match reader.dequeue() {
            Ok(Some(bytes)) => {
                let msg = TestMessage::from_bytes(&bytes).expect("reader: torn record");
                assert_eq!(msg.id, expected_id, "records out of order");
                assert!(msg.is_consistent(), "inconsistent payload in record {}", msg.id);
                assert_eq!(msg.data.len(), (msg.id % 97) as usize + 1);
                expected_id += 1;
            }
            Ok(None) => {
                empty_polls += 1;
                thread::yield_now();
            }
            Err(e) if e.is_transient() => thread::yield_now(),
            Err(e) => return Err(e),
        }
    }
    assert_eq!(reader.dequeue()?, None);
    Ok(empty_polls)
}

// Each endpoint is opened in its own thread, so the two sides go through separate
// mappings of the same segments, as two processes would.
#[test]
fn writer_and_reader_threads_agree_on_every_record() -> Result<(), Box<dyn Error>> {
    let count = 20_000u64;
    let cfg = unique_config(1024);
    let ready = Arc::new(Barrier::new(2));

    let writer_thread = thread::spawn({
        let cfg = cfg.clone();
        let ready = Arc::clone(&ready);
        move || run_writer(cfg, ready, count)
    });
    let reader_thread = thread::spawn({
        let ready = Arc::clone(&ready);
        move || run_reader(cfg, ready, count)
    });

    let retries = writer_thread.join().expect("writer thread panicked")?;
    let empty_polls = reader_thread.join().expect("reader thread panicked")?;
    println!(
        "{} records transferred, {} writer retries, {} empty polls",
        count, retries, empty_polls
    );
    Ok(())
}

#[test]
fn tiny_queue_under_contention() -> Result<(), Box<dyn Error>> {
    let count = 5_000u64;
    // Only one record fits at a time for most sizes, forcing constant backpressure.
    let cfg = unique_config(128);
    let ready = Arc::new(Barrier::new(2));

    let writer_thread = thread::spawn({
        let cfg = cfg.clone();
        let ready = Arc::clone(&ready);
        move || run_writer(cfg, ready, count)
    });
    let reader_thread = thread::spawn({
        let ready = Arc::clone(&ready);
        move || run_reader(cfg, ready, count)
    });

    let retries = writer_thread.join().expect("writer thread panicked")?;
    reader_thread.join().expect("reader thread panicked")?;
    assert!(retries > 0, "a 128-byte queue should have pushed back at least once");
    Ok(())
}
