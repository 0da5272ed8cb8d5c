//! [`Environment`] implementation: the owner of sibling contexts and the
//! optional external store.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::context::Context;
use crate::error::VmResult;
use crate::storage::{MemoryStore, Store};

struct EnvInner<S> {
    store: Option<Mutex<S>>,
}

/// Shared owner of contexts and the store. Cloning yields another handle
/// to the same environment; contexts hold one internally.
pub struct Environment<S = MemoryStore> {
    inner: Arc<EnvInner<S>>,
}

impl<S> Clone for Environment<S> {
    fn clone(&self) -> Self {
        Environment {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Environment<MemoryStore> {
    /// An environment with no store: transactions fail, stowage hints
    /// are ignored.
    pub fn new() -> Environment<MemoryStore> {
        Environment {
            inner: Arc::new(EnvInner { store: None }),
        }
    }

    /// An environment backed by a fresh in-memory store.
    pub fn in_memory() -> Environment<MemoryStore> {
        Environment::with_store(MemoryStore::new())
    }
}

impl Default for Environment<MemoryStore> {
    fn default() -> Self {
        Environment::new()
    }
}

impl<S: Store> Environment<S> {
    /// An environment backed by the given store implementation.
    pub fn with_store(store: S) -> Environment<S> {
        Environment {
            inner: Arc::new(EnvInner {
                store: Some(Mutex::new(store)),
            }),
        }
    }

    /// Flush prior transactions to stable storage.
    pub fn sync(&self) -> VmResult<()> {
        if let Some(mutex) = self.inner.store.as_ref() {
            let mut store = mutex.lock().unwrap_or_else(PoisonError::into_inner);
            store.sync(true)?;
        }
        Ok(())
    }
}

impl<S> Environment<S> {
    /// Create a context with `size_mb` mebibytes of arena, between
    /// [`CX_SIZE_MIN_MB`](crate::consts::CX_SIZE_MIN_MB) and
    /// [`CX_SIZE_MAX_MB`](crate::consts::CX_SIZE_MAX_MB). The new
    /// context holds the unit value.
    pub fn create_context(&self, size_mb: u32) -> VmResult<Context<S>> {
        Context::create(self.clone(), size_mb)
    }

    /// Whether this environment carries a store.
    pub fn has_store(&self) -> bool {
        self.inner.store.is_some()
    }

    pub(crate) fn store_mutex(&self) -> Option<&Mutex<S>> {
        self.inner.store.as_ref()
    }

    pub(crate) fn store_lock(&self) -> Option<MutexGuard<'_, S>> {
        self.inner
            .store
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<S> fmt::Debug for Environment<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("store", &self.inner.store.is_some())
            .finish()
    }
}
