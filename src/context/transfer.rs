//! Moving values between contexts.
//!
//! Between siblings sharing a space, a move is an O(1) cell handoff.
//! Between contexts with distinct spaces, the value is sized, reserved
//! and deep-copied into the destination, then detached from the source.

use std::sync::Arc;

use crate::arena::Space;
use crate::consts::CELL;
use crate::context::copy::copy_across;
use crate::context::Context;
use crate::error::{RuntimeError, TypeFault, VmResult};
use crate::state::Substruct;
use crate::value::{Tag, Val};

fn sibling_transfer(
    sp: &mut Space,
    src: usize,
    dst: usize,
    keep_source: bool,
    force: bool,
) -> VmResult<Substruct> {
    let p = sp.top_pair(src)?;
    let ss = sp.observe(sp.val_at(p));
    if keep_source {
        if !force && !ss.copyable() {
            return Err(TypeFault::CopyAffine.into());
        }
        let sz = sp.size_of_value(sp.val_at(p));
        sp.reserve(sz + CELL)?;
        let p = sp.top_pair(src)?;
        let (moved, _) = {
            let v = sp.val_at(p);
            sp.copy_value_raw(v, false)
        };
        let dv = sp.regs(dst).val;
        let cell = sp.alloc_cell(Tag::Prod, moved, dv);
        sp.regs_mut(dst).val = cell;
    } else {
        sp.reserve(CELL)?;
        let p = sp.top_pair(src)?;
        let (a, rest) = sp.cell_at(p);
        sp.regs_mut(src).val = rest;
        let dv = sp.regs(dst).val;
        let cell = sp.alloc_cell(Tag::Prod, a, dv);
        sp.regs_mut(dst).val = cell;
    }
    Ok(ss)
}

impl<S> Context<S> {
    fn transfer(&mut self, dst: &mut Context<S>, keep_source: bool, force: bool) -> VmResult<Substruct> {
        if Arc::ptr_eq(self.space_arc(), dst.space_arc()) {
            if self.slot() == dst.slot() {
                return Err(RuntimeError::InvalidArgument);
            }
            let (src_slot, dst_slot) = (self.slot(), dst.slot());
            let mut sp = self.lock();
            if let Some(e) = sp.regs(src_slot).err {
                return Err(e);
            }
            if let Some(e) = sp.regs(dst_slot).err {
                return Err(e);
            }
            return match sibling_transfer(&mut sp, src_slot, dst_slot, keep_source, force) {
                Ok(ss) => Ok(ss),
                Err(e) => {
                    sp.regs_mut(src_slot).err.get_or_insert(e);
                    Err(e)
                }
            };
        }

        // Distinct spaces: lock both in address order so concurrent
        // moves in opposite directions cannot deadlock.
        let (mut ga, mut gb);
        if Arc::as_ptr(self.space_arc()) < Arc::as_ptr(dst.space_arc()) {
            ga = self.lock();
            gb = dst.lock();
        } else {
            gb = dst.lock();
            ga = self.lock();
        }
        let (src_slot, dst_slot) = (self.slot(), dst.slot());
        if let Some(e) = ga.regs(src_slot).err {
            return Err(e);
        }
        if let Some(e) = gb.regs(dst_slot).err {
            return Err(e);
        }
        let result = (|| {
            let p = ga.top_pair(src_slot)?;
            let v = ga.val_at(p);
            let ss = ga.observe(v);
            if keep_source && !force && !ss.copyable() {
                return Err(TypeFault::CopyAffine.into());
            }
            let sz = ga.size_of_value(v);
            gb.reserve(sz + CELL)?;
            let moved = copy_across(&ga, &mut gb, v);
            if !keep_source {
                let rest = ga.val_at(p + 8);
                ga.regs_mut(src_slot).val = rest;
            }
            let dv = gb.regs(dst_slot).val;
            let cell = gb.alloc_cell(Tag::Prod, moved, dv);
            gb.regs_mut(dst_slot).val = cell;
            Ok(ss)
        })();
        if let Err(e) = result {
            ga.regs_mut(src_slot).err.get_or_insert(e);
        }
        result
    }

    /// Move the top of this context's value to `dst`: `(a * b) → b` here,
    /// `c → (a * c)` there. O(1) between siblings sharing a space.
    pub fn move_to(&mut self, dst: &mut Context<S>) -> VmResult<()> {
        self.transfer(dst, false, true).map(|_| ())
    }

    /// Copy the top of this context's value onto `dst` without consuming
    /// it here, reporting the observed substructure. Combines copy and
    /// move without an intermediate.
    pub fn copy_move_to(&mut self, dst: &mut Context<S>, force: bool) -> VmResult<Substruct> {
        self.transfer(dst, true, force)
    }
}
