//! Product and sum data plumbing.
//!
//! The product rearrangements are non-allocating cell rewrites. The sum
//! rearrangements compose unwrap/wrap rounds and reserve their worst
//! case up front ([`RES_SUM_OP`]), so no step can move memory under the
//! addresses in hand.

use crate::arena::Space;
use crate::consts::{RES_SUM_OP, RES_WRAP_SUM};
use crate::context::Context;
use crate::error::{TypeFault, VmResult};
use crate::state::SumTag;
use crate::value::{Addr, Val};

impl Space {
    /// The primary pair and its second component as a pair:
    /// `(a * (b * c))` yields both cell addresses.
    pub(crate) fn top_two(&self, r: usize) -> VmResult<(Addr, Addr)> {
        let p = self.top_pair(r)?;
        let snd = self.val_at(p + 8);
        if !snd.is_prod() {
            return Err(TypeFault::ExpectedProduct.into());
        }
        Ok((p, snd.addr()))
    }

    /// `l :: (a * (b * c)) → ((a * b) * c)`
    pub(crate) fn prod_assocl(&mut self, r: usize) -> VmResult<()> {
        let (p, q) = self.top_two(r)?;
        let a = self.val_at(p);
        let (b, c) = self.cell_at(q);
        self.set_cell(q, a, b);
        self.set_cell(p, Val::tagged(crate::value::Tag::Prod, q), c);
        Ok(())
    }

    /// `r :: ((a * b) * c) → (a * (b * c))`
    pub(crate) fn prod_assocr(&mut self, r: usize) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let (y, c) = self.cell_at(p);
        if !y.is_prod() {
            return Err(TypeFault::ExpectedProduct.into());
        }
        let (a, b) = self.cell_at(y.addr());
        self.set_cell(y.addr(), b, c);
        self.set_cell(p, a, Val::tagged(crate::value::Tag::Prod, y.addr()));
        Ok(())
    }

    /// `w :: (a * (b * c)) → (b * (a * c))`
    pub(crate) fn prod_wswap(&mut self, r: usize) -> VmResult<()> {
        let (p, q) = self.top_two(r)?;
        let a = self.val_at(p);
        let b = self.val_at(q);
        self.set_word(p, b.raw());
        self.set_word(q, a.raw());
        Ok(())
    }

    /// `z :: (a * (b * (c * d))) → (a * (c * (b * d)))`
    pub(crate) fn prod_zswap(&mut self, r: usize) -> VmResult<()> {
        let (_, q) = self.top_two(r)?;
        let m = self.val_at(q + 8);
        if !m.is_prod() {
            return Err(TypeFault::ExpectedProduct.into());
        }
        let b = self.val_at(q);
        let c = self.val_at(m.addr());
        self.set_word(q, c.raw());
        self.set_word(m.addr(), b.raw());
        Ok(())
    }

    /// `vrwlc :: (a * b) → (b * a)`
    pub(crate) fn prod_swap(&mut self, r: usize) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let (a, b) = self.cell_at(p);
        self.set_cell(p, b, a);
        Ok(())
    }

    /// `wrzw :: (a * ((b * c) * d)) → (a * (b * (c * d)))`
    pub(crate) fn prod_assocr_snd(&mut self, r: usize) -> VmResult<()> {
        let (_, q) = self.top_two(r)?;
        let (y, d) = self.cell_at(q);
        if !y.is_prod() {
            return Err(TypeFault::ExpectedProduct.into());
        }
        let (b, c) = self.cell_at(y.addr());
        self.set_cell(y.addr(), c, d);
        self.set_cell(q, b, Val::tagged(crate::value::Tag::Prod, y.addr()));
        Ok(())
    }

    /// `wzlw :: (a * (b * (c * d))) → (a * ((b * c) * d))`
    pub(crate) fn prod_assocl_snd(&mut self, r: usize) -> VmResult<()> {
        let (_, q) = self.top_two(r)?;
        let (b, m) = self.cell_at(q);
        if !m.is_prod() {
            return Err(TypeFault::ExpectedProduct.into());
        }
        let (c, d) = self.cell_at(m.addr());
        self.set_cell(m.addr(), b, c);
        self.set_cell(q, Val::tagged(crate::value::Tag::Prod, m.addr()), d);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sum rearrangements. Each rewrites the tag chain of the first
    // component through unwrap/wrap rounds.

    /// Replace the primary pair's first component through `f`, with the
    /// sum-op worst case reserved.
    fn on_sum(
        &mut self,
        r: usize,
        f: impl FnOnce(&mut Space, Val) -> VmResult<Val>,
    ) -> VmResult<()> {
        self.top_pair(r)?;
        self.reserve(RES_SUM_OP)?;
        let p = self.top_pair(r)?;
        let fst = self.val_at(p);
        let out = f(self, fst)?;
        self.set_word(p, out.raw());
        Ok(())
    }

    /// `L :: ((a + (b + c)) * e) → (((a + b) + c) * e)`
    pub(crate) fn sum_assocl(&mut self, r: usize) -> VmResult<()> {
        self.on_sum(r, |sp, s| {
            let (t1, v) = sp.unwrap_sum_v(s)?;
            Ok(match t1 {
                SumTag::Left => {
                    let w = sp.wrap_sum_v(v, SumTag::Left);
                    sp.wrap_sum_v(w, SumTag::Left)
                }
                SumTag::Right => {
                    let (t2, v2) = sp.unwrap_sum_v(v)?;
                    match t2 {
                        SumTag::Left => {
                            let w = sp.wrap_sum_v(v2, SumTag::Right);
                            sp.wrap_sum_v(w, SumTag::Left)
                        }
                        SumTag::Right => sp.wrap_sum_v(v2, SumTag::Right),
                    }
                }
            })
        })
    }

    /// `R :: (((a + b) + c) * e) → ((a + (b + c)) * e)`
    pub(crate) fn sum_assocr(&mut self, r: usize) -> VmResult<()> {
        self.on_sum(r, |sp, s| {
            let (t1, v) = sp.unwrap_sum_v(s)?;
            Ok(match t1 {
                SumTag::Left => {
                    let (t2, v2) = sp.unwrap_sum_v(v)?;
                    match t2 {
                        SumTag::Left => sp.wrap_sum_v(v2, SumTag::Left),
                        SumTag::Right => {
                            let w = sp.wrap_sum_v(v2, SumTag::Left);
                            sp.wrap_sum_v(w, SumTag::Right)
                        }
                    }
                }
                SumTag::Right => {
                    let w = sp.wrap_sum_v(v, SumTag::Right);
                    sp.wrap_sum_v(w, SumTag::Right)
                }
            })
        })
    }

    /// `W :: ((a + (b + c)) * e) → ((b + (a + c)) * e)`
    pub(crate) fn sum_wswap(&mut self, r: usize) -> VmResult<()> {
        self.on_sum(r, |sp, s| {
            let (t1, v) = sp.unwrap_sum_v(s)?;
            Ok(match t1 {
                SumTag::Left => {
                    let w = sp.wrap_sum_v(v, SumTag::Left);
                    sp.wrap_sum_v(w, SumTag::Right)
                }
                SumTag::Right => {
                    let (t2, v2) = sp.unwrap_sum_v(v)?;
                    match t2 {
                        SumTag::Left => sp.wrap_sum_v(v2, SumTag::Left),
                        SumTag::Right => {
                            let w = sp.wrap_sum_v(v2, SumTag::Right);
                            sp.wrap_sum_v(w, SumTag::Right)
                        }
                    }
                }
            })
        })
    }

    /// `Z :: ((a + (b + (c + d))) * e) → ((a + (c + (b + d))) * e)`
    pub(crate) fn sum_zswap(&mut self, r: usize) -> VmResult<()> {
        self.on_sum(r, |sp, s| {
            let (t1, v) = sp.unwrap_sum_v(s)?;
            Ok(match t1 {
                SumTag::Left => sp.wrap_sum_v(v, SumTag::Left),
                SumTag::Right => {
                    let (t2, v2) = sp.unwrap_sum_v(v)?;
                    match t2 {
                        SumTag::Left => {
                            let w = sp.wrap_sum_v(v2, SumTag::Left);
                            let w = sp.wrap_sum_v(w, SumTag::Right);
                            sp.wrap_sum_v(w, SumTag::Right)
                        }
                        SumTag::Right => {
                            let (t3, v3) = sp.unwrap_sum_v(v2)?;
                            match t3 {
                                SumTag::Left => {
                                    let w = sp.wrap_sum_v(v3, SumTag::Left);
                                    sp.wrap_sum_v(w, SumTag::Right)
                                }
                                SumTag::Right => {
                                    let w = sp.wrap_sum_v(v3, SumTag::Right);
                                    let w = sp.wrap_sum_v(w, SumTag::Right);
                                    sp.wrap_sum_v(w, SumTag::Right)
                                }
                            }
                        }
                    }
                }
            })
        })
    }

    /// `VRWLC :: ((a + b) * e) → ((b + a) * e)`
    pub(crate) fn sum_swap(&mut self, r: usize) -> VmResult<()> {
        self.on_sum(r, |sp, s| {
            let (t, v) = sp.unwrap_sum_v(s)?;
            Ok(sp.wrap_sum_v(v, t.flip()))
        })
    }

    /// `C :: ((a + 0) * e) → (a * e)`
    pub(crate) fn sum_elim0(&mut self, r: usize) -> VmResult<()> {
        match self.sum_unwrap(r)? {
            SumTag::Left => Ok(()),
            SumTag::Right => Err(TypeFault::ExpectedSum.into()),
        }
    }

    /// `M :: ((a + a) * e) → (a * e)`
    pub(crate) fn sum_merge(&mut self, r: usize) -> VmResult<()> {
        self.sum_unwrap(r).map(|_| ())
    }

    /// `K :: ((a + b) * e) → (b * e)`; in-left is an assertion failure.
    pub(crate) fn sum_assert(&mut self, r: usize) -> VmResult<()> {
        match self.sum_unwrap(r)? {
            SumTag::Right => Ok(()),
            SumTag::Left => Err(TypeFault::AssertFailed.into()),
        }
    }

    /// `D :: (a * ((b + c) * e)) → (((a * b) + (a * c)) * e)`
    pub(crate) fn sum_distrib(&mut self, r: usize) -> VmResult<()> {
        self.top_two(r)?;
        self.reserve(RES_SUM_OP)?;
        let (p, q) = self.top_two(r)?;
        let s = self.val_at(q);
        let (tag, v) = self.unwrap_sum_v(s)?;
        // Reuse the outer cell as the (a * b) pair and the inner cell as
        // the new primary pair.
        self.set_word(p + 8, v.raw());
        let pair = self.wrap_sum_v(Val::tagged(crate::value::Tag::Prod, p), tag);
        self.set_word(q, pair.raw());
        self.regs_mut(r).val = Val::tagged(crate::value::Tag::Prod, q);
        Ok(())
    }

    /// `F :: (((a * b) + (c * d)) * e) → ((a + c) * ((b + d) * e))`
    pub(crate) fn sum_factor(&mut self, r: usize) -> VmResult<()> {
        self.top_pair(r)?;
        self.reserve(RES_SUM_OP + RES_WRAP_SUM)?;
        let p = self.top_pair(r)?;
        let s = self.val_at(p);
        let (tag, pv) = self.unwrap_sum_v(s)?;
        if !pv.is_prod() {
            return Err(TypeFault::ExpectedProduct.into());
        }
        let (x, y) = self.cell_at(pv.addr());
        let xw = self.wrap_sum_v(x, tag);
        let yw = self.wrap_sum_v(y, tag);
        let e = self.val_at(p + 8);
        self.set_cell(pv.addr(), yw, e);
        self.set_cell(p, xw, Val::tagged(crate::value::Tag::Prod, pv.addr()));
        Ok(())
    }
}

impl<S> Context<S> {
    /// `l :: (a * (b * c)) → ((a * b) * c)`. Non-allocating.
    pub fn assocl(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::prod_assocl)
    }

    /// `r :: ((a * b) * c) → (a * (b * c))`. Non-allocating.
    pub fn assocr(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::prod_assocr)
    }

    /// `w :: (a * (b * c)) → (b * (a * c))`. Non-allocating.
    pub fn wswap(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::prod_wswap)
    }

    /// `z :: (a * (b * (c * d))) → (a * (c * (b * d)))`. Non-allocating.
    pub fn zswap(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::prod_zswap)
    }

    /// `vrwlc :: (a * b) → (b * a)`. Non-allocating.
    pub fn swap(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::prod_swap)
    }

    /// `L :: ((a + (b + c)) * e) → (((a + b) + c) * e)`
    pub fn sum_assocl(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::sum_assocl)
    }

    /// `R :: (((a + b) + c) * e) → ((a + (b + c)) * e)`
    pub fn sum_assocr(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::sum_assocr)
    }

    /// `W :: ((a + (b + c)) * e) → ((b + (a + c)) * e)`
    pub fn sum_wswap(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::sum_wswap)
    }

    /// `Z :: ((a + (b + (c + d))) * e) → ((a + (c + (b + d))) * e)`
    pub fn sum_zswap(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::sum_zswap)
    }

    /// `VRWLC :: ((a + b) * e) → ((b + a) * e)`
    pub fn sum_swap(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::sum_swap)
    }

    /// `D :: (a * ((b + c) * e)) → (((a * b) + (a * c)) * e)`
    pub fn sum_distrib(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::sum_distrib)
    }

    /// `F :: (((a * b) + (c * d)) * e) → ((a + c) * ((b + d) * e))`
    pub fn sum_factor(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::sum_factor)
    }
}
