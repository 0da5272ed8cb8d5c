//! The evaluator: apply, step, quote, compose, and annotations.
//!
//! A pending value wraps a `(block * argument)` pair. One step installs
//! the block's operation list as `pc`, tucks the outer environment and an
//! empty call stack into the continuation cell `cc`, and drains
//! operations until everything is consumed, the effort quota expires, or
//! an error latches. On suspension the residual `pc` and call stack fold
//! back into a block and the pending value is rebuilt, so a later step
//! resumes exactly where this one stopped.

use crate::arena::Space;
use crate::consts::{CELL, RES_APPLY, RES_QUOTE, RES_SUSPEND};
use crate::context::Context;
use crate::error::{RuntimeError, TypeFault, VmResult};
use crate::state::{EvalState, SumTag};
use crate::value::{
    hdr, hdr_is, ObjTag, Tag, Val, BLOCK_AFF, BLOCK_LAZY, BLOCK_PAR, BLOCK_REL, OPVAL_INHERIT,
};
use runic_asm::Opcode;

use super::arith::Num;

impl Space {
    fn is_block(&self, v: Val) -> bool {
        v.is_obj() && hdr_is(self.word(v.addr()), ObjTag::Block)
    }

    fn is_pending(&self, v: Val) -> bool {
        v.is_obj() && hdr_is(self.word(v.addr()), ObjTag::Pending)
    }

    /// Construct an evaluation without running it:
    /// `([a→b] * (a * e)) → ((pending (block * a)) * e)`.
    pub(crate) fn apply(&mut self, r: usize) -> VmResult<()> {
        self.reserve(CELL)?;
        let p = self.top_pair(r)?;
        let (bk, rest) = self.cell_at(p);
        if !self.is_block(bk) {
            return Err(TypeFault::ExpectedBlock.into());
        }
        if !rest.is_prod() {
            return Err(TypeFault::ExpectedProduct.into());
        }
        self.prod_assocl(r)?;
        let p = self.top_pair(r)?;
        let inner = self.val_at(p);
        let pend = self.alloc_obj2(hdr(ObjTag::Pending, 0), inner);
        self.set_word(p, pend.raw());
        Ok(())
    }

    /// Run one evaluation step against a quota measured in compactions.
    pub(crate) fn step_eval(&mut self, r: usize, effort: u32) -> VmResult<EvalState> {
        let regs = self.regs(r);
        if regs.pc != Val::UNIT || regs.cc != Val::UNIT_INR {
            return Err(RuntimeError::Unimplemented("nested evaluation"));
        }
        // Open the pending wrapper: ((pending (block * a)) * e).
        let p = self.top_pair(r)?;
        let pv = self.val_at(p);
        if !self.is_pending(pv) {
            return Err(TypeFault::ExpectedPending.into());
        }
        let inner = self.val_at(pv.addr() + 8);
        if !inner.is_prod() {
            return Err(TypeFault::ExpectedPending.into());
        }
        let (bk, arg) = self.cell_at(inner.addr());
        if !self.is_block(bk) {
            return Err(TypeFault::ExpectedBlock.into());
        }
        let ops = self.val_at(bk.addr() + 8);
        let e = self.val_at(p + 8);

        // Install the registers, reusing the pending's pair cell as the
        // continuation cell (call-stack, hidden-e).
        self.set_cell(inner.addr(), Val::UNIT_INR, e);
        let regs = self.regs_mut(r);
        regs.pc = ops;
        regs.cc = Val::tagged(Tag::Prod, inner.addr());
        regs.val = arg;

        let start = self.compactions;
        match self.eval_loop(r, start, effort as u64) {
            Ok(true) => {
                // Recover the hidden environment; the continuation cell
                // becomes the result pair.
                let cca = self.regs(r).cc.addr();
                let e = self.val_at(cca + 8);
                let result = self.regs(r).val;
                self.set_cell(cca, result, e);
                let regs = self.regs_mut(r);
                regs.val = Val::tagged(Tag::Prod, cca);
                regs.pc = Val::UNIT;
                regs.cc = Val::UNIT_INR;
                Ok(EvalState::Done)
            }
            Ok(false) => {
                self.suspend_eval(r)?;
                Ok(EvalState::Pending)
            }
            Err(e) => {
                // Preserve the residual computation for inspection.
                let _ = self.suspend_eval(r);
                Err(e)
            }
        }
    }

    /// Drain operations. Returns `Ok(true)` when both `pc` and the call
    /// stack are empty, `Ok(false)` when the quota expires.
    fn eval_loop(&mut self, r: usize, start: u64, budget: u64) -> VmResult<bool> {
        if budget == 0 {
            return Ok(false);
        }
        loop {
            let pc = self.regs(r).pc;
            if pc.is_cons() {
                let ca = pc.addr();
                let (head, rest) = self.cell_at(ca);
                self.regs_mut(r).pc = rest;
                if head.is_small_int() {
                    let op = u8::try_from(head.small_value())
                        .ok()
                        .and_then(Opcode::from_u8)
                        .ok_or(RuntimeError::Unimplemented("operator"))?;
                    self.exec_op(r, op)?;
                } else {
                    // Extended operand: hoist it onto the value stack,
                    // reusing the spent cons cell, so it stays rooted.
                    let val = self.regs(r).val;
                    self.set_cell(ca, head, val);
                    self.regs_mut(r).val = Val::tagged(Tag::Prod, ca);
                    self.exec_operand(r)?;
                }
            } else if pc.is_nil() {
                let cca = self.regs(r).cc.addr();
                let stack = self.val_at(cca);
                if stack.is_cons() {
                    if self.compactions - start >= budget {
                        return Ok(false);
                    }
                    let (frame, rest) = self.cell_at(stack.addr());
                    self.set_word(cca, rest.raw());
                    self.regs_mut(r).pc = frame;
                } else {
                    return Ok(true);
                }
            } else {
                return Err(RuntimeError::Unimplemented("operations list"));
            }
        }
    }

    /// Fold the residual `pc` and call stack into a block and rebuild
    /// the pending value. Leaves the registers in their resting state.
    fn suspend_eval(&mut self, r: usize) -> VmResult<()> {
        if let Err(e) = self.reserve(RES_SUSPEND) {
            // Nowhere to rebuild: drop the residual continuation and
            // leave the raw value behind.
            let regs = self.regs_mut(r);
            regs.pc = Val::UNIT;
            regs.cc = Val::UNIT_INR;
            return Err(e);
        }
        let cca = self.regs(r).cc.addr();
        let (mut stack, e) = self.cell_at(cca);
        let mut ops = self.regs(r).pc;
        while stack.is_cons() {
            let (frame, rest) = self.cell_at(stack.addr());
            ops = self.concat_ops(ops, frame);
            stack = rest;
        }
        let bk = self.alloc_obj2(hdr(ObjTag::Block, 0), ops);
        let inner = self.alloc_cell(Tag::Prod, bk, self.regs(r).val);
        let pend = self.alloc_obj2(hdr(ObjTag::Pending, 0), inner);
        self.set_cell(cca, pend, e);
        let regs = self.regs_mut(r);
        regs.val = Val::tagged(Tag::Prod, cca);
        regs.pc = Val::UNIT;
        regs.cc = Val::UNIT_INR;
        Ok(())
    }

    /// Append `b` to the operations list `a` by tail rewrite.
    pub(crate) fn concat_ops(&mut self, a: Val, b: Val) -> Val {
        if !a.is_cons() {
            return b;
        }
        let mut cur = a;
        loop {
            let next = self.val_at(cur.addr() + 8);
            if next.is_cons() {
                cur = next;
            } else {
                self.set_word(cur.addr() + 8, b.raw());
                return a;
            }
        }
    }

    fn exec_op(&mut self, r: usize, op: Opcode) -> VmResult<()> {
        use Opcode::*;
        match op {
            Sp | Lf => Ok(()),
            AssocL => self.prod_assocl(r),
            AssocR => self.prod_assocr(r),
            SwapW => self.prod_wswap(r),
            SwapZ => self.prod_zswap(r),
            IntroUnit => self.intro_unit_r(r),
            ElimUnit => self.elim_unit_r(r),
            SumAssocL => self.sum_assocl(r),
            SumAssocR => self.sum_assocr(r),
            SumSwapW => self.sum_wswap(r),
            SumSwapZ => self.sum_zswap(r),
            SumIntro0 => self.sum_wrap(r, SumTag::Left),
            SumElim0 => self.sum_elim0(r),
            Copy => self.val_copy(r, false).map(|_| ()),
            Drop => self.val_drop(r, false).map(|_| ()),
            Apply => self.eval_apply(r),
            Compose => self.compose(r),
            Quote => self.quote(r),
            Rel => self.block_attr(r, BLOCK_REL),
            Aff => self.block_attr(r, BLOCK_AFF),
            IntroNum => self.intro_num(r, &Num::Small(0)),
            D0 | D1 | D2 | D3 | D4 | D5 | D6 | D7 | D8 | D9 => {
                self.int_digit(r, op.digit().unwrap_or(0))
            }
            Add => self.int_add(r),
            Mul => self.int_mul(r),
            Neg => self.int_neg(r),
            Div => self.int_div(r),
            Gt => self.int_gt(r),
            CondApply => self.eval_condap(r),
            Distrib => self.sum_distrib(r),
            Factor => self.sum_factor(r),
            Merge => self.sum_merge(r),
            Assert => self.sum_assert(r),
            TailCall => self.eval_tailcall(r),
            Inline => {
                self.reserve(CELL)?;
                self.eval_inline(r)
            }
            ProdSwap => self.prod_swap(r),
            IntroUnitL => self.intro_unit(r),
            SumSwap => self.sum_swap(r),
            IntroVoidL => self.sum_wrap(r, SumTag::Right),
            AssocRSnd => self.prod_assocr_snd(r),
            AssocLSnd => self.prod_assocl_snd(r),
            AnnoPar => self.block_attr(r, BLOCK_PAR),
            AnnoLazy => self.block_attr(r, BLOCK_LAZY),
            AnnoAsync => self.anno_async(r),
            AnnoJoin => self.anno_join(r),
            AnnoTrash => self.val_trash(r),
            AnnoStow => self.stow(r),
            AnnoTrace => self.anno_trace(r),
            AnnoText => self.anno_compact(r, true),
            AnnoBinary => self.anno_compact(r, false),
        }
    }

    /// Dispatch an extended operand hoisted to `(operand * val)`.
    fn exec_operand(&mut self, r: usize) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let ov = self.val_at(p);
        debug_assert!(ov.is_obj());
        let h = self.word(ov.addr());
        match ObjTag::of(h) {
            ObjTag::OpVal => {
                // Quoted literal: becomes the new top of the value stack.
                let inner = self.val_at(ov.addr() + 8);
                self.set_word(p, inner.raw());
                Ok(())
            }
            ObjTag::SealSm => {
                // Inline sealer applied to the current top value.
                let rest = self.val_at(p + 8);
                if !rest.is_prod() {
                    return Err(TypeFault::ExpectedProduct.into());
                }
                let x = self.val_at(rest.addr());
                self.set_word(ov.addr() + 8, x.raw());
                self.set_word(rest.addr(), ov.raw());
                self.regs_mut(r).val = rest;
                Ok(())
            }
            ObjTag::Seal => {
                let token = self.seal_token(ov.addr());
                let rest = self.val_at(p + 8);
                self.regs_mut(r).val = rest;
                match token.as_bytes().first() {
                    Some(b':') => self.wrap_seal(r, &token),
                    Some(b'.') => {
                        let sealed_with = self.unwrap_seal(r)?;
                        let matches = sealed_with.as_str().strip_prefix(':')
                            == token.strip_prefix('.');
                        if matches {
                            Ok(())
                        } else {
                            Err(TypeFault::SealMismatch.into())
                        }
                    }
                    _ => Err(RuntimeError::Unimplemented("token")),
                }
            }
            _ => Err(RuntimeError::Unimplemented("operand")),
        }
    }

    /// `$` evaluated: hide the environment behind continuation ops, then
    /// enter the block.
    pub(crate) fn eval_apply(&mut self, r: usize) -> VmResult<()> {
        self.reserve(RES_APPLY)?;
        let p = self.top_pair(r)?;
        let (_, rest) = self.cell_at(p);
        if !rest.is_prod() {
            return Err(TypeFault::ExpectedProduct.into());
        }
        // (bk * (a * e)) → (e * (bk * a)), then queue ops restoring e.
        self.prod_assocl(r)?;
        self.prod_swap(r)?;
        self.push_op_r(r, Opcode::ProdSwap);
        self.push_opval_r(r)?;
        self.eval_inline(r)
    }

    /// `vr$c` evaluated: `([a→b] * a) → b`. Assumes one cell reserved
    /// for the call-stack frame.
    fn eval_inline(&mut self, r: usize) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let (bk, a) = self.cell_at(p);
        if !self.is_block(bk) {
            return Err(TypeFault::ExpectedBlock.into());
        }
        let h = self.word(bk.addr());
        if h & BLOCK_LAZY != 0 {
            // A lazy block produces a pending value instead of running;
            // laziness is not preserved across the forced evaluation.
            self.set_word(bk.addr(), h & !BLOCK_LAZY);
            let pend = self.alloc_obj2(hdr(ObjTag::Pending, 0), Val::tagged(Tag::Prod, p));
            self.regs_mut(r).val = pend;
            return Ok(());
        }
        let ops = self.val_at(bk.addr() + 8);
        let pc = self.regs(r).pc;
        if !pc.is_nil() {
            // Not a tail call: push a resumption frame.
            let cca = self.regs(r).cc.addr();
            let stack = self.val_at(cca);
            let frame = self.alloc_cell(Tag::ProdInL, pc, stack);
            self.set_word(cca, frame.raw());
        }
        let regs = self.regs_mut(r);
        regs.pc = ops;
        regs.val = a;
        Ok(())
    }

    /// `$c` evaluated: `([a→b] * (a * 1)) → b`.
    fn eval_tailcall(&mut self, r: usize) -> VmResult<()> {
        self.reserve(CELL)?;
        self.prod_assocl(r)?;
        self.elim_unit_r(r)?;
        self.eval_inline(r)
    }

    /// `?` evaluated: apply on in-left, drop the (droppable) block on
    /// in-right.
    fn eval_condap(&mut self, r: usize) -> VmResult<()> {
        self.prod_wswap(r)?;
        match self.sum_unwrap(r)? {
            SumTag::Right => {
                self.sum_wrap(r, SumTag::Right)?;
                self.prod_wswap(r)?;
                self.val_drop(r, false).map(|_| ())
            }
            SumTag::Left => {
                self.push_op(r, Opcode::SumIntro0)?;
                self.prod_wswap(r)?;
                self.eval_apply(r)
            }
        }
    }

    fn push_op(&mut self, r: usize, op: Opcode) -> VmResult<()> {
        self.reserve(CELL)?;
        self.push_op_r(r, op);
        Ok(())
    }

    /// Prepend an operator to `pc`. Assumes one cell reserved.
    fn push_op_r(&mut self, r: usize, op: Opcode) {
        let pc = self.regs(r).pc;
        let cell = self.alloc_cell(Tag::ProdInL, Val::small(op as u8 as i64), pc);
        self.regs_mut(r).pc = cell;
    }

    /// `(v * e) → e`, with `v` prepended to `pc` as a quoted literal.
    /// Assumes one cell reserved; the pair cell becomes the cons cell.
    fn push_opval_r(&mut self, r: usize) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let fst = self.val_at(p);
        let obj = self.alloc_obj2(hdr(ObjTag::OpVal, 0), fst);
        let snd = self.val_at(p + 8);
        let pc = self.regs(r).pc;
        self.set_cell(p, obj, pc);
        let regs = self.regs_mut(r);
        regs.pc = Val::tagged(Tag::ProdInL, p);
        regs.val = snd;
        Ok(())
    }

    /// `' :: (a * e) → (block * e)` — wrap the value as a constant
    /// block. Substructural attribution is deferred through the opval
    /// inherit bit rather than computed now.
    pub(crate) fn quote(&mut self, r: usize) -> VmResult<()> {
        self.top_pair(r)?;
        self.reserve(RES_QUOTE)?;
        let p = self.top_pair(r)?;
        let a = self.val_at(p);
        let opv = self.alloc_obj2(hdr(ObjTag::OpVal, 0) | OPVAL_INHERIT, a);
        let ops = self.alloc_cell(Tag::ProdInL, opv, Val::UNIT_INR);
        let bk = self.alloc_obj2(hdr(ObjTag::Block, 0), ops);
        self.set_word(p, bk.raw());
        Ok(())
    }

    /// `o :: ([a→b] * ([b→c] * e)) → ([a→c] * e)` — concatenate the
    /// operation lists and merge the attribute flags. Non-allocating.
    pub(crate) fn compose(&mut self, r: usize) -> VmResult<()> {
        let (p, q) = self.top_two(r)?;
        let b1 = self.val_at(p);
        let b2 = self.val_at(q);
        if !self.is_block(b1) || !self.is_block(b2) {
            return Err(TypeFault::ExpectedBlock.into());
        }
        let h1 = self.word(b1.addr());
        let h2 = self.word(b2.addr());
        let ops1 = self.val_at(b1.addr() + 8);
        let ops2 = self.val_at(b2.addr() + 8);
        let ops = self.concat_ops(ops1, ops2);
        let flags = (h1 | h2) & (BLOCK_REL | BLOCK_AFF | BLOCK_PAR | BLOCK_LAZY);
        self.set_word(b2.addr(), hdr(ObjTag::Block, 0) | flags);
        self.set_word(b2.addr() + 8, ops.raw());
        self.regs_mut(r).val = Val::tagged(Tag::Prod, q);
        Ok(())
    }

    /// Set a block attribute flag on the top value.
    pub(crate) fn block_attr(&mut self, r: usize, flag: u64) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let bk = self.val_at(p);
        if !self.is_block(bk) {
            return Err(TypeFault::ExpectedBlock.into());
        }
        let h = self.word(bk.addr());
        self.set_word(bk.addr(), h | flag);
        Ok(())
    }

    /// `{&asynch}`: wrap the top value as a pending computation by
    /// applying a lazy identity block.
    fn anno_async(&mut self, r: usize) -> VmResult<()> {
        self.reserve(CELL + RES_APPLY)?;
        self.top_pair(r)?;
        let bk = self.alloc_obj2(hdr(ObjTag::Block, 0) | BLOCK_LAZY, Val::UNIT_INR);
        self.intro_value(r, bk);
        self.eval_apply(r)
    }

    /// `{&join}`: force a pending computation before continuing.
    fn anno_join(&mut self, r: usize) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let pv = self.val_at(p);
        if !self.is_pending(pv) {
            return Err(TypeFault::ExpectedPending.into());
        }
        let inner = self.val_at(pv.addr() + 8);
        if !inner.is_prod() {
            return Err(TypeFault::ExpectedPending.into());
        }
        self.set_word(p, inner.raw());
        self.prod_assocr(r)?;
        self.eval_apply(r)
    }

    /// `{&trace}`: report the top value's shape to the debug log and
    /// leave it untouched.
    fn anno_trace(&mut self, r: usize) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let shape = self.describe(self.val_at(p));
        tracing::trace!(target: "runic_vm::eval", value = shape, "trace annotation");
        Ok(())
    }

    /// A one-word description of a value's shape, for tracing.
    pub(crate) fn describe(&self, v: Val) -> &'static str {
        match v.tag() {
            Tag::SmallInt => "integer",
            Tag::Unit => "unit",
            Tag::UnitInL | Tag::UnitInR => "unit-sum",
            Tag::Prod => "pair",
            Tag::ProdInL | Tag::ProdInR => "sum",
            Tag::Obj => match ObjTag::of(self.word(v.addr())) {
                ObjTag::DeepSum => "sum",
                ObjTag::Block => "block",
                ObjTag::OpVal => "quoted",
                ObjTag::Seal | ObjTag::SealSm => "sealed",
                ObjTag::Binary => "binary",
                ObjTag::Text => "text",
                ObjTag::Trash => "trash",
                ObjTag::Pending => "pending",
                ObjTag::BigNum => "integer",
            },
        }
    }
}

impl<S> Context<S> {
    /// Construct an evaluation:
    /// `([a→b] * (a * e)) → ((pending b) * e)`. Nothing runs until
    /// [`Context::step_eval`].
    pub fn apply(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::apply)
    }

    /// Step the pending evaluation at the top of the value:
    /// `((pending a) * e) → (a * e)` on [`EvalState::Done`].
    ///
    /// Effort is measured in compaction cycles; the quota is checked at
    /// block boundaries, so a primitive in progress runs to completion.
    /// On [`EvalState::Pending`] the residual computation has been
    /// re-wrapped and a further step resumes it; zero effort makes no
    /// progress at all.
    pub fn step_eval(&mut self, effort: u32) -> VmResult<EvalState> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.step_eval(r, effort))
    }

    /// `' :: (a * e) → ([∀s. s→(a*s)] * e)`.
    pub fn quote(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::quote)
    }

    /// `o :: ([a→b] * ([b→c] * e)) → ([a→c] * e)`.
    pub fn compose(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::compose)
    }

    /// Mark the top block affine (non-copyable).
    pub fn block_aff(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.block_attr(r, BLOCK_AFF))
    }

    /// Mark the top block relevant (non-droppable).
    pub fn block_rel(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.block_attr(r, BLOCK_REL))
    }

    /// Mark the top block for parallel evaluation. Advisory: this
    /// runtime evaluates sequentially, which is observably equivalent.
    pub fn block_par(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.block_attr(r, BLOCK_PAR))
    }

    /// Mark the top block lazy: application will produce a pending value
    /// forced by `{&join}` or further stepping.
    pub fn block_lazy(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.block_attr(r, BLOCK_LAZY))
    }
}
