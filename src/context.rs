//! [`Context`] implementation.
//!
//! A context owns a slot of root registers in a [`Space`](crate::arena)
//! and is the handle through which every operation runs. Contexts are
//! externally single-threaded: at most one caller may be inside an
//! operation on a given context at a time. Sibling contexts created by
//! [`Context::fork`] share one space, so the space sits behind a mutex
//! and each operation is a short critical section.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::arena::Space;
use crate::consts::{CX_SIZE_MAX_MB, CX_SIZE_MIN_MB};
use crate::env::Environment;
use crate::error::{ErrorMask, RuntimeError, VmResult};
use crate::state::MemStats;
use crate::storage::MemoryStore;

mod arith;
mod constructors;
mod copy;
mod eval;
mod plumbing;
mod transfer;
pub(crate) mod txn;

pub(crate) use constructors::plan_text_chunks;
use txn::Txn;

/// A single-writer evaluation environment: one arena slot, a primary
/// value, and an optional open transaction.
///
/// A fresh context holds the unit value. Values are introduced with the
/// constructor operations, rearranged with the data plumbing primitives,
/// and evaluated by [`Context::apply`] / [`Context::step_eval`].
pub struct Context<S = MemoryStore> {
    env: Environment<S>,
    space: Arc<Mutex<Space>>,
    slot: usize,
    pub(crate) txn: Option<Txn>,
}

impl<S> Context<S> {
    pub(crate) fn create(env: Environment<S>, size_mb: u32) -> VmResult<Context<S>> {
        if !(CX_SIZE_MIN_MB..=CX_SIZE_MAX_MB).contains(&size_mb) {
            return Err(RuntimeError::InvalidArgument);
        }
        let mut space = Space::new(size_mb)?;
        let slot = space.add_slot();
        Ok(Context {
            env,
            space: Arc::new(Mutex::new(space)),
            slot,
            txn: None,
        })
    }

    /// Create a sibling context sharing this context's space.
    ///
    /// Values move between siblings in O(1); the shared space is traced
    /// from every sibling's registers during compaction.
    pub fn fork(&self) -> VmResult<Context<S>> {
        let slot = self.lock().add_slot();
        Ok(Context {
            env: self.env.clone(),
            space: Arc::clone(&self.space),
            slot,
            txn: None,
        })
    }

    /// The owning environment.
    pub fn env(&self) -> &Environment<S> {
        &self.env
    }

    /// The latched error state; empty means healthy.
    pub fn error(&self) -> ErrorMask {
        match self.lock().regs(self.slot).err {
            Some(e) => e.mask(),
            None => ErrorMask::empty(),
        }
    }

    /// Reset the context: primary value back to unit, latched error
    /// cleared, open transaction aborted, and the space compacted so the
    /// dropped data is reclaimed immediately.
    pub fn reset(&mut self) {
        self.txn = None;
        let mut sp = self.lock();
        *sp.regs_mut(self.slot) = crate::arena::Regs::init();
        sp.compact();
    }

    /// Force a compaction of the context's space. Observable state is
    /// unchanged; only addresses and counters move.
    pub fn compact(&mut self) {
        self.lock().compact();
    }

    /// Memory statistics for the context's space.
    pub fn mem_stats(&self) -> MemStats {
        self.lock().stats()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Space> {
        self.space
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn space_arc(&self) -> &Arc<Mutex<Space>> {
        &self.space
    }
}

impl<S> Drop for Context<S> {
    fn drop(&mut self) {
        self.lock().drop_slot(self.slot);
    }
}

impl<S> std::fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("slot", &self.slot)
            .field("error", &self.error())
            .field("txn", &self.txn.is_some())
            .finish()
    }
}
