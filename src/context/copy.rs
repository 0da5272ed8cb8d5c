//! Deep copy, drop and size computation.
//!
//! Values may be arbitrarily deep, so every traversal here is a worklist
//! iteration in bounded native stack. Copy sizes first, reserves, then
//! copies, so no allocation mid-copy can trigger a compaction. Drop is
//! observation only: the arena has no free operation, and the memory is
//! reclaimed by the next collection.

use crate::arena::{capture_block_ss, capture_trash_ss, chunk_byte_len, Space};
use crate::consts::{cell_buff, CELL};
use crate::context::Context;
use crate::error::{TypeFault, VmResult};
use crate::state::Substruct;
use crate::value::{
    hdr, obj_size, ObjTag, Tag, Val, OPVAL_INHERIT, TRASH_AFF, TRASH_REL,
};

impl Space {
    /// Allocation required to deep-copy `v`, in bytes.
    pub(crate) fn size_of_value(&self, v: Val) -> u64 {
        let mut total = 0;
        let mut work = vec![v];
        while let Some(x) = work.pop() {
            if x.is_shallow() {
                continue;
            }
            let a = x.addr();
            match x.tag() {
                Tag::Prod | Tag::ProdInL | Tag::ProdInR => {
                    total += CELL;
                    let (fst, snd) = self.cell_at(a);
                    work.push(fst);
                    work.push(snd);
                }
                Tag::Obj => {
                    let h = self.word(a);
                    total += obj_size(h);
                    match ObjTag::of(h) {
                        ObjTag::Trash | ObjTag::BigNum => {}
                        ObjTag::Binary | ObjTag::Text => {
                            total += cell_buff(chunk_byte_len(ObjTag::of(h), self.word(a + 16)));
                            work.push(self.val_at(a + 8));
                        }
                        _ => work.push(self.val_at(a + 8)),
                    }
                }
                _ => unreachable!("shallow values handled above"),
            }
        }
        total
    }

    /// Observe the substructural attributes of `v` without copying or
    /// consuming it: block and trash headers contribute their flags,
    /// pending wrappers the pending bit, and quoted literals without the
    /// inherit bit hide their contents.
    pub(crate) fn observe(&self, v: Val) -> Substruct {
        let mut ss = Substruct::empty();
        let mut work = vec![(v, false)];
        while let Some((x, hide)) = work.pop() {
            if x.is_shallow() {
                continue;
            }
            let a = x.addr();
            match x.tag() {
                Tag::Prod | Tag::ProdInL | Tag::ProdInR => {
                    let (fst, snd) = self.cell_at(a);
                    work.push((fst, hide));
                    work.push((snd, hide));
                }
                Tag::Obj => {
                    let h = self.word(a);
                    match ObjTag::of(h) {
                        ObjTag::Block => {
                            if !hide {
                                capture_block_ss(h, &mut ss);
                            }
                            work.push((self.val_at(a + 8), hide));
                        }
                        ObjTag::OpVal => {
                            let child_hide = hide || (h & OPVAL_INHERIT) == 0;
                            work.push((self.val_at(a + 8), child_hide));
                        }
                        ObjTag::Pending => {
                            if !hide {
                                ss |= Substruct::PENDING;
                            }
                            work.push((self.val_at(a + 8), hide));
                        }
                        ObjTag::Trash => {
                            if !hide {
                                capture_trash_ss(h, &mut ss);
                            }
                        }
                        ObjTag::BigNum => {}
                        _ => work.push((self.val_at(a + 8), hide)),
                    }
                }
                _ => unreachable!("shallow values handled above"),
            }
        }
        ss
    }

    /// `^ :: (a * e) → (a * (a * e))`, reporting the observed
    /// substructure. Without `force`, copying an affine or pending value
    /// is a type fault and nothing changes.
    pub(crate) fn val_copy(&mut self, r: usize, force: bool) -> VmResult<Substruct> {
        let p = self.top_pair(r)?;
        let ss = self.observe(self.val_at(p));
        if !force && !ss.copyable() {
            return Err(TypeFault::CopyAffine.into());
        }
        let sz = self.size_of_value(self.val_at(p));
        self.reserve(sz + CELL)?;
        let p = self.top_pair(r)?;
        let orig = self.val_at(p);
        let (copy, _) = self.copy_value_raw(orig, false);
        self.intro_value(r, copy);
        Ok(ss)
    }

    /// `% :: (a * e) → e`, reporting the observed substructure. Without
    /// `force`, dropping a relevant or pending value is a type fault.
    pub(crate) fn val_drop(&mut self, r: usize, force: bool) -> VmResult<Substruct> {
        let p = self.top_pair(r)?;
        let ss = self.observe(self.val_at(p));
        if !force && !ss.droppable() {
            return Err(TypeFault::DropRelevant.into());
        }
        let snd = self.val_at(p + 8);
        self.regs_mut(r).val = snd;
        Ok(ss)
    }

    /// `{&trash}` — replace the top value with a placeholder that keeps
    /// its substructural attributes and nothing else.
    pub(crate) fn val_trash(&mut self, r: usize) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let ss = self.observe(self.val_at(p));
        self.reserve(CELL)?;
        let p = self.top_pair(r)?;
        let mut flags = 0;
        if ss.contains(Substruct::RELEVANT) || ss.contains(Substruct::PENDING) {
            flags |= TRASH_REL;
        }
        if ss.contains(Substruct::AFFINE) || ss.contains(Substruct::PENDING) {
            flags |= TRASH_AFF;
        }
        let obj = self.alloc_obj2(hdr(ObjTag::Trash, 0) | flags, Val::UNIT);
        self.set_word(p, obj.raw());
        Ok(())
    }
}

/// Deep-copy `v` from `src` into `dst`. The destination reservation must
/// already cover `src.size_of_value(v)`.
pub(crate) fn copy_across(src: &Space, dst: &mut Space, v: Val) -> Val {
    let mut work: Vec<u64> = Vec::new();
    let root = copy_across_node(src, dst, v, &mut work);
    while let Some(loc) = work.pop() {
        let cur = dst.val_at(loc);
        if cur.is_shallow() {
            continue;
        }
        let moved = copy_across_node(src, dst, cur, &mut work);
        dst.set_word(loc, moved.raw());
    }
    root
}

fn copy_across_node(src: &Space, dst: &mut Space, v: Val, work: &mut Vec<u64>) -> Val {
    if v.is_shallow() {
        return v;
    }
    let a = v.addr();
    match v.tag() {
        Tag::Prod | Tag::ProdInL | Tag::ProdInR => {
            let d = dst.alloc_raw(CELL);
            dst.write_bytes(d, src.bytes(a, CELL as usize));
            work.push(d);
            work.push(d + 8);
            Val::tagged(v.tag(), d)
        }
        Tag::Obj => {
            let h = src.word(a);
            let tag = ObjTag::of(h);
            let sz = obj_size(h);
            let d = dst.alloc_raw(sz);
            dst.write_bytes(d, src.bytes(a, sz as usize));
            match tag {
                ObjTag::Trash | ObjTag::BigNum => {}
                ObjTag::Binary | ObjTag::Text => {
                    let len = chunk_byte_len(tag, src.word(a + 16));
                    if len > 0 {
                        let sbuf = src.word(a + 24);
                        let bd = dst.alloc_raw(cell_buff(len));
                        dst.write_bytes(bd, src.bytes(sbuf, len as usize));
                        dst.set_word(d + 24, bd);
                    }
                    work.push(d + 8);
                }
                _ => work.push(d + 8),
            }
            Val::tagged(Tag::Obj, d)
        }
        _ => unreachable!("shallow values handled above"),
    }
}

impl<S> Context<S> {
    /// `^ :: (a * e) → (a * (a * e))`, reporting the observed
    /// substructural attributes.
    ///
    /// With `force` the copy proceeds regardless and the caller judges
    /// the report; without it, copying affine or pending data fails.
    pub fn copy(&mut self, force: bool) -> VmResult<Substruct> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.val_copy(r, force))
    }

    /// `% :: (a * e) → e`, reporting the observed substructural
    /// attributes; `force` as in [`Context::copy`].
    pub fn drop_value(&mut self, force: bool) -> VmResult<Substruct> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.val_drop(r, force))
    }

    /// Discard the top value but keep its substructural attributes.
    /// Observing the trash later is a type fault; copying or dropping it
    /// behaves like the original.
    pub fn trash(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::val_trash)
    }
}
