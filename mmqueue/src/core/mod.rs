use std::slice;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use ::shared_memory::{Shmem, ShmemConf, ShmemError};
use log::{debug, warn};
use raw_sync::locks::{LockImpl, LockInit, Mutex};
use raw_sync::Timeout;

use crate::config::QueueConfig;
use crate::control::{ControlBlock, Role, CONTROL_SIZE};
use crate::errors::{LockTimeout, OpenError};

// Lock segment: [ready flag][pad to 8][process-shared mutex]
const LOCK_READY_AT: usize = 0;
const LOCK_MUTEX_AT: usize = 8;
const LOCK_READY: u8 = 1;
const LOCK_SLACK: usize = 64;

const OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(1);

struct Segment {
    shmem: Shmem,
    created: bool,
}

impl Segment {
    fn create_or_open(id: &str, size: usize, cfg: &QueueConfig) -> Result<Segment, OpenError> {
        match ShmemConf::new().os_id(id).size(size).create() {
            Ok(mut shmem) => {
                shmem.set_owner(cfg.remove_on_drop);
                debug!("created segment {} ({} bytes)", id, size);
                Ok(Segment { shmem, created: true })
            }
            Err(ShmemError::MappingIdExists) => Segment::open(id, size, cfg.lock_timeout()),
            Err(source) => Err(OpenError::SharedMemory {
                id: id.to_string(),
                source,
            }),
        }
    }

    // The creator may not have sized the mapping yet, so keep trying until the deadline.
    fn open(id: &str, size: usize, timeout: Duration) -> Result<Segment, OpenError> {
        let deadline = Instant::now() + timeout;
        loop {
            let err = match ShmemConf::new().os_id(id).open() {
                Ok(shmem) if shmem.len() == size => {
                    debug!("opened segment {} ({} bytes)", id, size);
                    return Ok(Segment {
                        shmem,
                        created: false,
                    });
                }
                Ok(shmem) => OpenError::SizeMismatch {
                    id: id.to_string(),
                    expected: size,
                    actual: shmem.len(),
                },
                Err(source) => OpenError::SharedMemory {
                    id: id.to_string(),
                    source,
                },
            };
            if Instant::now() >= deadline {
                return Err(err);
            }
            thread::sleep(OPEN_RETRY_INTERVAL);
        }
    }

    #[inline]
    fn as_ptr(&self) -> *mut u8 {
        self.shmem.as_ptr()
    }
}

/// The segments visible while holding the queue-wide lock.
pub(crate) struct LockedRegion<'a> {
    pub data: &'a mut [u8],
    pub control: ControlBlock<'a>,
}

/// Handles to the Data Segment, the Control Segment and the shared lock of one queue.
pub struct ShmemService {
    name: String,
    capacity: usize,
    lock_timeout: Duration,
    data: Segment,
    pointers: Segment,
    // Dropped before `lock_segment` unmaps the memory it points into.
    lock: Box<dyn LockImpl>,
    #[allow(dead_code)]
    lock_segment: Segment,
}

impl ShmemService {
    /// Creates the segments and the lock, or attaches to them if another endpoint already did.
    ///
    /// The configuration must already be validated.
    pub fn open(cfg: &QueueConfig) -> Result<ShmemService, OpenError> {
        let data = Segment::create_or_open(&cfg.data_id(), cfg.capacity, cfg)?;
        let pointers = Segment::create_or_open(&cfg.pointers_id(), CONTROL_SIZE, cfg)?;
        let lock_size = LOCK_MUTEX_AT + Mutex::size_of(None) + LOCK_SLACK;
        let lock_segment = Segment::create_or_open(&cfg.lock_id(), lock_size, cfg)?;
        let lock = ShmemService::attach_lock(&lock_segment, &pointers, cfg)?;
        debug!(
            "shmem {}: capacity {} bytes, data {}, lock {}",
            cfg.name,
            cfg.capacity,
            if data.created { "created" } else { "opened" },
            if lock_segment.created { "created" } else { "opened" },
        );
        Ok(ShmemService {
            name: cfg.name.clone(),
            capacity: cfg.capacity,
            lock_timeout: cfg.lock_timeout(),
            data,
            pointers,
            lock,
            lock_segment,
        })
    }

    fn attach_lock(
        lock_segment: &Segment,
        pointers: &Segment,
        cfg: &QueueConfig,
    ) -> Result<Box<dyn LockImpl>, OpenError> {
        let base = lock_segment.as_ptr();
        let ready = unsafe { &*(base.add(LOCK_READY_AT) as *const AtomicU8) };
        let mutex_at = unsafe { base.add(LOCK_MUTEX_AT) };

        if lock_segment.created {
            let (lock, _) = unsafe { Mutex::new(mutex_at, pointers.as_ptr()) }
                .map_err(|e| OpenError::Lock(e.to_string()))?;
            ready.store(LOCK_READY, Ordering::Release);
            return Ok(lock);
        }

        let timeout = cfg.lock_timeout();
        let deadline = Instant::now() + timeout;
        while ready.load(Ordering::Acquire) != LOCK_READY {
            if Instant::now() >= deadline {
                return Err(OpenError::LockNotReady {
                    id: cfg.lock_id(),
                    timeout,
                });
            }
            thread::sleep(OPEN_RETRY_INTERVAL);
        }
        let (lock, _) = unsafe { Mutex::from_existing(mutex_at, pointers.as_ptr()) }
            .map_err(|e| OpenError::Lock(e.to_string()))?;
        Ok(lock)
    }

    /// Unlinks the queue's segments so the name can be reused. Mappings held by live
    /// endpoints stay valid until they are dropped.
    pub fn remove(cfg: &QueueConfig) -> Result<(), OpenError> {
        let mut first_err = None;
        for id in [cfg.data_id(), cfg.pointers_id(), cfg.lock_id()] {
            match ShmemConf::new().os_id(&id).open() {
                Ok(mut shmem) => {
                    shmem.set_owner(true);
                    debug!("removing segment {}", id);
                }
                Err(source) => {
                    first_err.get_or_insert(OpenError::SharedMemory { id, source });
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this handle created the Data Segment rather than opening it.
    pub fn is_creator(&self) -> bool {
        self.data.created
    }

    /// Runs `f` with the lock held; the lock is released on every exit path.
    pub(crate) fn with_lock<R, F>(&self, role: Role, f: F) -> Result<R, LockTimeout>
    where
        F: FnOnce(&mut LockedRegion<'_>) -> R,
    {
        let _guard = match self.lock.try_lock(Timeout::Val(self.lock_timeout)) {
            Ok(guard) => guard,
            Err(e) => {
                warn!(
                    "{} {}: lock not acquired within {:?}: {}",
                    self.name, role, self.lock_timeout, e
                );
                return Err(LockTimeout(self.lock_timeout));
            }
        };
        // The mutex serialises every access to both segments.
        let mut region = unsafe {
            LockedRegion {
                data: slice::from_raw_parts_mut(self.data.as_ptr(), self.capacity),
                control: ControlBlock::new(
                    slice::from_raw_parts_mut(self.pointers.as_ptr(), CONTROL_SIZE),
                    role,
                ),
            }
        };
        Ok(f(&mut region))
    }
}

impl Drop for ShmemService {
    fn drop(&mut self) {
        debug!(
            "closing shmem {} (remove on drop: {})",
            self.name,
            self.data.shmem.is_owner()
        );
    }
}
