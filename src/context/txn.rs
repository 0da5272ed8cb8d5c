//! Key-value transactions against the environment's store.
//!
//! A context holds at most one open, non-hierarchical transaction.
//! Reads snapshot store values; writes buffer locally and reads-your-
//! writes; commit revalidates every snapshot under the store lock and
//! aborts on conflict. Root values travel as byte lists: reading a key
//! introduces a binary, writing consumes one, and the empty list is the
//! default value whose write deletes the key.

use std::collections::HashMap;
use std::sync::PoisonError;

use crate::context::Context;
use crate::error::{RuntimeError, VmResult};
use crate::storage::Store;
use runic_asm::valid_key;

#[derive(Debug, Default)]
pub(crate) struct Txn {
    reads: HashMap<Vec<u8>, Option<Vec<u8>>>,
    writes: HashMap<Vec<u8>, Option<Vec<u8>>>,
    durable: bool,
}

impl<S: Store> Context<S> {
    /// Begin a transaction. Requires a store and no open transaction.
    pub fn txn_create(&mut self) -> VmResult<()> {
        if !self.env().has_store() {
            return Err(RuntimeError::Store);
        }
        if self.txn.is_some() {
            return Err(RuntimeError::InvalidArgument);
        }
        self.txn = Some(Txn::default());
        Ok(())
    }

    /// `e → (v * e)`: read a key's value into the context as a binary.
    /// Unwritten keys read as the empty list.
    pub fn txn_read(&mut self, key: &str) -> VmResult<()> {
        if !valid_key(key) {
            return Err(RuntimeError::InvalidArgument);
        }
        if self.txn.is_none() {
            return Err(RuntimeError::InvalidArgument);
        }
        let bytes = self.txn_lookup(key)?;
        let slot = self.slot();
        self.lock()
            .guarded(slot, |sp, r| sp.intro_binary(r, bytes.as_deref().unwrap_or(&[])))
    }

    /// Resolve a key through the write buffer, the read snapshot, then
    /// the store, snapshotting first-time store reads.
    fn txn_lookup(&mut self, key: &str) -> VmResult<Option<Vec<u8>>> {
        let txn = self.txn.as_ref().ok_or(RuntimeError::InvalidArgument)?;
        if let Some(buffered) = txn.writes.get(key.as_bytes()) {
            return Ok(buffered.clone());
        }
        if let Some(snapshot) = txn.reads.get(key.as_bytes()) {
            return Ok(snapshot.clone());
        }
        let fetched = {
            let store = self.env().store_lock().ok_or(RuntimeError::Store)?;
            store.read_root(key.as_bytes())?
        };
        let txn = self.txn.as_mut().ok_or(RuntimeError::InvalidArgument)?;
        txn.reads
            .insert(key.as_bytes().to_vec(), fetched.clone());
        Ok(fetched)
    }

    /// `(v * e) → e`: buffer the top binary as the key's new value.
    /// Writing the empty list deletes the key on commit.
    pub fn txn_write(&mut self, key: &str) -> VmResult<()> {
        if !valid_key(key) {
            return Err(RuntimeError::InvalidArgument);
        }
        if self.txn.is_none() {
            return Err(RuntimeError::InvalidArgument);
        }
        let slot = self.slot();
        let bytes = self.lock().guarded(slot, |sp, r| {
            let p = sp.top_pair(r)?;
            let (content, _, _) = sp.list_scan(sp.val_at(p), false)?;
            let rest = sp.val_at(p + 8);
            sp.regs_mut(r).val = rest;
            Ok(content)
        })?;
        let txn = self.txn.as_mut().ok_or(RuntimeError::InvalidArgument)?;
        let value = if bytes.is_empty() { None } else { Some(bytes) };
        txn.writes.insert(key.as_bytes().to_vec(), value);
        Ok(())
    }

    /// Abandon the open transaction, if any.
    pub fn txn_abort(&mut self) {
        self.txn = None;
    }

    /// Commit the open transaction. Conflicting snapshots abort it and
    /// report [`RuntimeError::Conflict`]; the context stays healthy.
    pub fn txn_commit(&mut self) -> VmResult<()> {
        let txn = self.txn.take().ok_or(RuntimeError::InvalidArgument)?;
        let mutex = self
            .env()
            .store_mutex()
            .ok_or(RuntimeError::Store)?;
        let mut store = mutex.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, snapshot) in &txn.reads {
            if store.read_root(key)?.as_deref() != snapshot.as_deref() {
                return Err(RuntimeError::Conflict);
            }
        }
        for (key, value) in &txn.writes {
            store.write_root(key, value.as_deref())?;
        }
        if txn.durable {
            store.sync(true)?;
        }
        Ok(())
    }

    /// Mark the open transaction durable: its commit will not return
    /// before reaching stable storage.
    pub fn txn_durable(&mut self) -> VmResult<()> {
        match self.txn.as_mut() {
            Some(txn) => {
                txn.durable = true;
                Ok(())
            }
            None => Err(RuntimeError::InvalidArgument),
        }
    }
}
