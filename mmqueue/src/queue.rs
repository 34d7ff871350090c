use std::fmt;

use log::{debug, trace, warn};

use crate::config::QueueConfig;
use crate::control::{Pointers, Role};
use crate::core::{LockedRegion, ShmemService};
use crate::errors::{Corruption, DequeueError, EnqueueError, OpenError};
use crate::ring;

/// One endpoint of a shared-memory byte queue.
///
/// A `Writer` endpoint owns `write_offset` and may only `enqueue`; a `Reader`
/// endpoint owns `read_offset` and may only `dequeue`. Each keeps a cached copy
/// of the peer's pointer, refreshed under the lock at the start of every
/// operation.
pub struct MemoryMappedQueue {
    role: Role,
    capacity: usize,
    pointers: Pointers,
    poisoned: Option<Corruption>,
    shmem_service: ShmemService,
}

/// Snapshot of an endpoint's local view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub role: Role,
    pub capacity: usize,
    pub write_offset: u64,
    pub read_offset: u64,
    pub live_bytes: u64,
    pub free_bytes: u64,
    pub poisoned: bool,
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} capacity={} write={} read={} live={} free={}",
            self.role, self.capacity, self.write_offset, self.read_offset, self.live_bytes, self.free_bytes
        )?;
        if self.poisoned {
            write!(f, " (corrupted)")?;
        }
        Ok(())
    }
}

impl MemoryMappedQueue {
    /// Opens an endpoint with default settings for `name`.
    pub fn new(capacity: usize, role: Role, name: &str) -> Result<MemoryMappedQueue, OpenError> {
        MemoryMappedQueue::with_config(&QueueConfig::new(name, capacity), role)
    }

    pub fn with_config(cfg: &QueueConfig, role: Role) -> Result<MemoryMappedQueue, OpenError> {
        cfg.validate()?;
        let shmem_service = ShmemService::open(cfg)?;
        let capacity = cfg.capacity;
        let pointers = shmem_service.with_lock(role, |region| {
            let pointers = region.control.snapshot();
            ring::validate(pointers, capacity).map(|_| pointers)
        })??;
        debug!(
            "{} {} {} queue at write={} read={}",
            cfg.name,
            role,
            if shmem_service.is_creator() { "created" } else { "attached to" },
            pointers.write_offset,
            pointers.read_offset
        );
        Ok(MemoryMappedQueue {
            role,
            capacity,
            pointers,
            poisoned: None,
            shmem_service,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &str {
        self.shmem_service.name()
    }

    pub fn stats(&self) -> QueueStats {
        let live = self.pointers.write_offset.saturating_sub(self.pointers.read_offset);
        QueueStats {
            role: self.role,
            capacity: self.capacity,
            write_offset: self.pointers.write_offset,
            read_offset: self.pointers.read_offset,
            live_bytes: live,
            free_bytes: (self.capacity as u64).saturating_sub(live),
            poisoned: self.poisoned.is_some(),
        }
    }

    /// Frames `payload` into the queue and publishes the new write offset.
    ///
    /// A record may fill the queue to exactly `capacity` bytes.
    pub fn enqueue(&mut self, payload: &[u8]) -> Result<(), EnqueueError> {
        if self.role != Role::Writer {
            return Err(EnqueueError::RoleViolation(self.role));
        }
        if let Some(corruption) = &self.poisoned {
            return Err(EnqueueError::Corrupted(corruption.clone()));
        }
        if payload.is_empty() {
            return Err(EnqueueError::EmptyPayload);
        }
        let record_size = ring::framed_size(payload.len());
        if record_size > self.capacity {
            return Err(EnqueueError::RecordTooLarge {
                record_size,
                capacity: self.capacity,
            });
        }

        let capacity = self.capacity;
        let cached = &mut self.pointers;
        let result = self.shmem_service.with_lock(
            Role::Writer,
            |region| -> Result<(), EnqueueError> {
                let pointers = refresh(region, cached, capacity).map_err(EnqueueError::Corrupted)?;
                let free = ring::free_bytes(pointers, capacity);
                if free < record_size {
                    return Err(EnqueueError::OutOfSpace {
                        needed: record_size,
                        free,
                    });
                }
                let next = ring::write_record(region.data, pointers.write_offset, payload);
                // The record is complete in the Data Segment before the pointer moves.
                region.control.publish(next);
                cached.write_offset = next;
                Ok(())
            },
        )?;
        match &result {
            Ok(()) => trace!("{} enqueued {} bytes: {}", self.name(), payload.len(), self.stats()),
            Err(EnqueueError::Corrupted(corruption)) => self.poison(corruption),
            Err(_) => {}
        }
        result
    }

    /// Takes the oldest record, or `None` if the queue is empty.
    pub fn dequeue(&mut self) -> Result<Option<Vec<u8>>, DequeueError> {
        if self.role != Role::Reader {
            return Err(DequeueError::RoleViolation(self.role));
        }
        if let Some(corruption) = &self.poisoned {
            return Err(DequeueError::Corrupted(corruption.clone()));
        }

        let capacity = self.capacity;
        let cached = &mut self.pointers;
        let result = self.shmem_service.with_lock(
            Role::Reader,
            |region| -> Result<Option<Vec<u8>>, Corruption> {
                let pointers = refresh(region, cached, capacity)?;
                if pointers.read_offset == pointers.write_offset {
                    return Ok(None);
                }
                let (payload, next) = ring::read_record(region.data, pointers)?;
                region.control.publish(next);
                cached.read_offset = next;
                Ok(Some(payload))
            },
        )?;
        match &result {
            Ok(Some(payload)) => trace!("{} dequeued {} bytes: {}", self.name(), payload.len(), self.stats()),
            Ok(None) => {}
            Err(corruption) => self.poison(corruption),
        }
        result.map_err(DequeueError::Corrupted)
    }

    fn poison(&mut self, corruption: &Corruption) {
        warn!(
            "{} {}: corrupted queue state, refusing further operations: {}",
            self.name(),
            self.role,
            corruption
        );
        self.poisoned = Some(corruption.clone());
    }

    /// Releases the segment and lock handles.
    pub fn close(self) {
        debug!("{} {} closed: {}", self.name(), self.role, self.stats());
    }
}

/// Reloads the peer's pointer into `cached` and checks it against what this
/// endpoint knows: its own published pointer must be unchanged, the peer's must
/// not have moved backwards, and the pair must satisfy the queue invariants.
fn refresh(
    region: &LockedRegion<'_>,
    cached: &mut Pointers,
    capacity: usize,
) -> Result<Pointers, Corruption> {
    let role = region.control.role();
    let own = region.control.own();
    let peer = region.control.peer();
    let (expected_own, cached_peer) = match role {
        Role::Writer => (cached.write_offset, cached.read_offset),
        Role::Reader => (cached.read_offset, cached.write_offset),
    };
    if own != expected_own {
        return Err(Corruption::ForeignPublish {
            role,
            expected: expected_own,
            observed: own,
        });
    }
    if peer < cached_peer {
        return Err(Corruption::PointerRegressed {
            role: role.peer(),
            cached: cached_peer,
            observed: peer,
        });
    }
    let observed = match role {
        Role::Writer => Pointers {
            write_offset: own,
            read_offset: peer,
        },
        Role::Reader => Pointers {
            write_offset: peer,
            read_offset: own,
        },
    };
    ring::validate(observed, capacity)?;
    *cached = observed;
    Ok(observed)
}
