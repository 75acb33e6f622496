//! Opaque handles for live sessions.
//!
//! A handle is a plain integer the host can store anywhere. Only the
//! registry turns it back into a session, so a closed or forged handle can
//! never reach engine memory.

use crate::WalletError;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies one open session. `0` is never issued.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletHandle(u64);

impl WalletHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct HandleRegistry<T> {
    next: AtomicU64,
    entries: Mutex<HashMap<WalletHandle, Arc<T>>>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<WalletHandle, Arc<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `entry` under a handle that has never been issued before.
    pub fn register(&self, entry: T) -> WalletHandle {
        let handle = WalletHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries().insert(handle, Arc::new(entry));
        handle
    }

    pub fn resolve(&self, handle: WalletHandle) -> Result<Arc<T>, WalletError> {
        self.entries()
            .get(&handle)
            .cloned()
            .ok_or(WalletError::InvalidHandle)
    }

    /// Removes the mapping. Succeeds at most once per registered handle.
    pub fn release(&self, handle: WalletHandle) -> Result<Arc<T>, WalletError> {
        self.entries()
            .remove(&handle)
            .ok_or(WalletError::InvalidHandle)
    }

    pub fn is_live(&self, handle: WalletHandle) -> bool {
        self.entries().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Removes every entry, returning them in handle order.
    pub fn drain(&self) -> Vec<(WalletHandle, Arc<T>)> {
        let mut drained: Vec<_> = self.entries().drain().collect();
        drained.sort_by_key(|(handle, _)| *handle);
        drained
    }
}
