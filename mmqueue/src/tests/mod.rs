use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::QueueConfig;

mod concurrent_tests;

pub(crate) fn unique_name() -> String {
    static SHMEM_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "mmqueue_test_{}_{}",
        std::process::id(),
        SHMEM_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

/// A fresh queue name whose segments are unlinked once the creating endpoint drops.
pub(crate) fn unique_config(capacity: usize) -> QueueConfig {
    QueueConfig {
        remove_on_drop: true,
        ..QueueConfig::new(unique_name(), capacity)
    }
}
