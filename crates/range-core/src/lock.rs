//! Mutual exclusion for sequential range creation

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Handle serializing sequential allocations
///
/// Clones share the same lock. Allocators built from unrelated handles
/// never wait on each other.
#[derive(Debug, Clone, Default)]
pub struct AllocationLock {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of one sequential allocation
#[derive(Debug)]
pub struct AllocationGuard {
    _guard: OwnedMutexGuard<()>,
}

impl AllocationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> AllocationGuard {
        AllocationGuard {
            _guard: self.inner.clone().lock_owned().await,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
