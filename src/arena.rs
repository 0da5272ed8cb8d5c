//! Context space: bump allocation and compacting collection.
//!
//! Each space is one contiguous byte region split into two semispace
//! halves. Allocation bumps downward inside the active half; collection
//! evacuates everything reachable from the root registers of every
//! context sharing the space into the other half, then flips.
//!
//! The reservation discipline is the contract that makes compaction safe:
//! any primitive performing allocations first calls [`Space::reserve`]
//! with its worst case, after which up to that many bytes may be
//! allocated with [`Space::alloc_raw`] without anything moving.

use crate::consts::{cell_buff, CELL, MB};
use crate::error::{RuntimeError, VmResult};
use crate::state::{MemStats, Substruct};
use crate::value::{
    obj_size, Addr, ObjTag, Tag, Val, BLOCK_AFF, BLOCK_REL, OPVAL_INHERIT, TRASH_AFF, TRASH_REL,
};

/// Root registers of one context slot. Everything live in a space is
/// reachable from these.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Regs {
    /// Primary value visible to primitives.
    pub val: Val,
    /// Operations list under evaluation.
    pub pc: Val,
    /// Continuation cell `(call-stack, hidden-e)` during a step.
    pub cc: Val,
    /// Scratch register rooting intermediates across reservations.
    pub tmp: Val,
    /// First error latched on the context.
    pub err: Option<RuntimeError>,
}

impl Regs {
    pub fn init() -> Regs {
        Regs {
            val: Val::UNIT,
            pc: Val::UNIT,
            cc: Val::UNIT_INR,
            tmp: Val::UNIT_INR,
            err: None,
        }
    }
}

pub(crate) struct Space {
    mem: Box<[u8]>,
    /// Bytes per half.
    half: u64,
    /// Whether the active half is the upper one.
    upper: bool,
    /// Lowest allocated byte address; allocation moves it down.
    alloc: Addr,
    slots: Vec<Option<Regs>>,
    pub compactions: u64,
    pub live_after_gc: u64,
    pub bytes_compacted: u64,
    pub bytes_collected: u64,
}

impl Space {
    pub fn new(size_mb: u32) -> VmResult<Space> {
        let bytes = (size_mb as u64) * MB;
        let mut mem: Vec<u8> = Vec::new();
        mem.try_reserve_exact(bytes as usize)
            .map_err(|_| RuntimeError::OutOfMemory)?;
        mem.resize(bytes as usize, 0);
        Ok(Space {
            mem: mem.into_boxed_slice(),
            half: bytes / 2,
            upper: false,
            alloc: bytes / 2,
            slots: Vec::new(),
            compactions: 0,
            live_after_gc: 0,
            bytes_compacted: 0,
            bytes_collected: 0,
        })
    }

    /// Lowest usable address of the active half. The first granule of
    /// each half is reserved so address zero is never allocated.
    #[inline]
    fn lo(&self) -> Addr {
        if self.upper {
            self.half + CELL
        } else {
            CELL
        }
    }

    /// One past the highest usable address of the active half.
    #[inline]
    fn hi(&self) -> Addr {
        if self.upper {
            2 * self.half
        } else {
            self.half
        }
    }

    #[inline]
    pub fn available(&self) -> u64 {
        self.alloc - self.lo()
    }

    #[inline]
    pub fn in_use(&self) -> u64 {
        self.hi() - self.alloc
    }

    pub fn stats(&self) -> MemStats {
        MemStats {
            capacity: self.half - CELL,
            in_use: self.in_use(),
            compactions: self.compactions,
            live_after_gc: self.live_after_gc,
            bytes_compacted: self.bytes_compacted,
            bytes_collected: self.bytes_collected,
        }
    }

    // ------------------------------------------------------------------
    // Root slots

    pub fn add_slot(&mut self) -> usize {
        for (i, s) in self.slots.iter_mut().enumerate() {
            if s.is_none() {
                *s = Some(Regs::init());
                return i;
            }
        }
        self.slots.push(Some(Regs::init()));
        self.slots.len() - 1
    }

    pub fn drop_slot(&mut self, slot: usize) {
        self.slots[slot] = None;
    }

    #[inline]
    pub fn regs(&self, slot: usize) -> &Regs {
        self.slots[slot].as_ref().expect("live context slot")
    }

    #[inline]
    pub fn regs_mut(&mut self, slot: usize) -> &mut Regs {
        self.slots[slot].as_mut().expect("live context slot")
    }

    /// Run an operation under the context's latched-error guard: a latched
    /// error short-circuits, and a new error latches.
    pub fn guarded<T>(
        &mut self,
        slot: usize,
        f: impl FnOnce(&mut Space, usize) -> VmResult<T>,
    ) -> VmResult<T> {
        if let Some(e) = self.regs(slot).err {
            return Err(e);
        }
        match f(self, slot) {
            Ok(t) => Ok(t),
            Err(e) => {
                self.regs_mut(slot).err.get_or_insert(e);
                Err(e)
            }
        }
    }

    /// Like [`Space::guarded`], but read-only probes do not latch their
    /// failures.
    pub fn probing<T>(
        &mut self,
        slot: usize,
        f: impl FnOnce(&mut Space, usize) -> VmResult<T>,
    ) -> VmResult<T> {
        if let Some(e) = self.regs(slot).err {
            return Err(e);
        }
        f(self, slot)
    }

    // ------------------------------------------------------------------
    // Words and bytes

    #[inline]
    pub fn word(&self, a: Addr) -> u64 {
        let i = a as usize;
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.mem[i..i + 8]);
        u64::from_le_bytes(b)
    }

    #[inline]
    pub fn set_word(&mut self, a: Addr, w: u64) {
        let i = a as usize;
        self.mem[i..i + 8].copy_from_slice(&w.to_le_bytes());
    }

    #[inline]
    pub fn val_at(&self, a: Addr) -> Val {
        Val::from_raw(self.word(a))
    }

    #[inline]
    pub fn cell_at(&self, a: Addr) -> (Val, Val) {
        (self.val_at(a), self.val_at(a + 8))
    }

    #[inline]
    pub fn set_cell(&mut self, a: Addr, fst: Val, snd: Val) {
        self.set_word(a, fst.raw());
        self.set_word(a + 8, snd.raw());
    }

    #[inline]
    pub fn bytes(&self, a: Addr, len: usize) -> &[u8] {
        &self.mem[a as usize..a as usize + len]
    }

    #[inline]
    pub fn write_bytes(&mut self, a: Addr, data: &[u8]) {
        self.mem[a as usize..a as usize + data.len()].copy_from_slice(data);
    }

    // ------------------------------------------------------------------
    // Allocation

    /// Guarantee `n` bytes of movement-free allocation, compacting if
    /// needed.
    pub fn reserve(&mut self, n: u64) -> VmResult<()> {
        if self.available() >= n {
            return Ok(());
        }
        self.compact();
        if self.available() >= n {
            Ok(())
        } else {
            Err(RuntimeError::ContextFull)
        }
    }

    /// Allocate `n` granule-buffered bytes from reserved space.
    #[inline]
    pub fn alloc_raw(&mut self, n: u64) -> Addr {
        debug_assert_eq!(n, cell_buff(n));
        debug_assert!(self.available() >= n, "allocation without reservation");
        self.alloc -= n;
        self.alloc
    }

    /// Allocate one cell from reserved space.
    #[inline]
    pub fn alloc_cell(&mut self, tag: Tag, fst: Val, snd: Val) -> Val {
        let a = self.alloc_raw(CELL);
        self.set_cell(a, fst, snd);
        Val::tagged(tag, a)
    }

    /// Allocate a cell-sized boxed object from reserved space.
    #[inline]
    pub fn alloc_obj2(&mut self, header: u64, v: Val) -> Val {
        let a = self.alloc_raw(CELL);
        self.set_word(a, header);
        self.set_word(a + 8, v.raw());
        Val::tagged(Tag::Obj, a)
    }

    // ------------------------------------------------------------------
    // Collection

    /// Compact the space: evacuate everything reachable from every
    /// context slot into the other half and flip. All addresses change;
    /// callers must re-derive pointers from the root registers.
    pub fn compact(&mut self) {
        let before = self.in_use();
        self.upper = !self.upper;
        self.alloc = self.hi();
        for i in 0..self.slots.len() {
            if let Some(mut regs) = self.slots[i].take() {
                regs.val = self.copy_value_raw(regs.val, false).0;
                regs.pc = self.copy_value_raw(regs.pc, false).0;
                regs.cc = self.copy_value_raw(regs.cc, false).0;
                regs.tmp = self.copy_value_raw(regs.tmp, false).0;
                self.slots[i] = Some(regs);
            }
        }
        let after = self.in_use();
        self.compactions += 1;
        self.live_after_gc = after;
        self.bytes_compacted += after;
        self.bytes_collected += before.saturating_sub(after);
        tracing::debug!(
            target: "runic_vm::arena",
            before,
            after,
            compactions = self.compactions,
            "compacted space"
        );
    }

    /// Deep-copy a value graph, allocating from this space, and report
    /// the observed substructural attributes. Linearity guarantees each
    /// node is reached exactly once, so no forwarding is needed.
    ///
    /// The caller must have reserved the graph's size; the collector
    /// itself relies on the half-to-half capacity guarantee instead.
    pub fn copy_value_raw(&mut self, v: Val, hide0: bool) -> (Val, Substruct) {
        let mut ss = Substruct::empty();
        let mut work: Vec<(Addr, bool)> = Vec::new();
        let root = self.copy_node(v, hide0, &mut ss, &mut work);
        while let Some((loc, hide)) = work.pop() {
            let cur = self.val_at(loc);
            if cur.is_shallow() {
                continue;
            }
            let moved = self.copy_node(cur, hide, &mut ss, &mut work);
            self.set_word(loc, moved.raw());
        }
        (root, ss)
    }

    /// Copy one node, pushing the copied child-value locations onto the
    /// worklist. Returns the relocated value.
    fn copy_node(
        &mut self,
        v: Val,
        hide: bool,
        ss: &mut Substruct,
        work: &mut Vec<(Addr, bool)>,
    ) -> Val {
        if v.is_shallow() {
            return v;
        }
        let a = v.addr();
        match v.tag() {
            Tag::Prod | Tag::ProdInL | Tag::ProdInR => {
                let d = self.alloc_raw(CELL);
                self.mem
                    .copy_within(a as usize..(a + CELL) as usize, d as usize);
                work.push((d, hide));
                work.push((d + 8, hide));
                Val::tagged(v.tag(), d)
            }
            Tag::Obj => {
                let h = self.word(a);
                let tag = ObjTag::of(h);
                let sz = obj_size(h);
                let d = self.alloc_raw(sz);
                self.mem
                    .copy_within(a as usize..(a + sz) as usize, d as usize);
                match tag {
                    ObjTag::Block => {
                        if !hide {
                            capture_block_ss(h, ss);
                        }
                        work.push((d + 8, hide));
                    }
                    ObjTag::OpVal => {
                        let child_hide = hide || (h & OPVAL_INHERIT) == 0;
                        work.push((d + 8, child_hide));
                    }
                    ObjTag::Pending => {
                        if !hide {
                            *ss |= Substruct::PENDING;
                        }
                        work.push((d + 8, hide));
                    }
                    ObjTag::Trash => {
                        if !hide {
                            capture_trash_ss(h, ss);
                        }
                    }
                    ObjTag::DeepSum | ObjTag::Seal | ObjTag::SealSm => {
                        work.push((d + 8, hide));
                    }
                    ObjTag::BigNum => {}
                    ObjTag::Binary | ObjTag::Text => {
                        let len = chunk_byte_len(tag, self.word(a + 16));
                        if len > 0 {
                            let src = self.word(a + 24);
                            let bd = self.alloc_raw(cell_buff(len));
                            self.mem
                                .copy_within(src as usize..src as usize + len as usize, bd as usize);
                            self.set_word(d + 24, bd);
                        }
                        work.push((d + 8, hide));
                    }
                }
                Val::tagged(Tag::Obj, d)
            }
            _ => unreachable!("shallow values handled above"),
        }
    }
}

/// Fold a block header's substructural flags into an observation.
#[inline]
pub(crate) fn capture_block_ss(h: u64, ss: &mut Substruct) {
    if h & BLOCK_REL != 0 {
        *ss |= Substruct::RELEVANT;
    }
    if h & BLOCK_AFF != 0 {
        *ss |= Substruct::AFFINE;
    }
}

#[inline]
pub(crate) fn capture_trash_ss(h: u64, ss: &mut Substruct) {
    if h & TRASH_REL != 0 {
        *ss |= Substruct::RELEVANT;
    }
    if h & TRASH_AFF != 0 {
        *ss |= Substruct::AFFINE;
    }
}

/// Byte length of a binary or text chunk's buffer, from its size word.
#[inline]
pub(crate) fn chunk_byte_len(tag: ObjTag, size_word: u64) -> u64 {
    match tag {
        ObjTag::Binary => size_word,
        ObjTag::Text => size_word & 0xffff,
        _ => 0,
    }
}

/// Codepoint count of a text chunk's size word.
#[inline]
pub(crate) fn text_char_count(size_word: u64) -> u64 {
    size_word >> 16
}

/// Pack a text chunk size word.
#[inline]
pub(crate) fn text_size_word(bytes: usize, chars: usize) -> u64 {
    ((chars as u64) << 16) | bytes as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SumTag;
    use crate::value::{deepsum_bits, hdr};

    #[test]
    fn bump_allocation_moves_down() {
        let mut sp = Space::new(3).expect("space");
        sp.reserve(2 * CELL).expect("reserve");
        let a = sp.alloc_raw(CELL);
        let b = sp.alloc_raw(CELL);
        assert_eq!(a - CELL, b);
        assert_eq!(sp.in_use(), 2 * CELL);
    }

    #[test]
    fn compaction_drops_garbage_and_keeps_roots() {
        let mut sp = Space::new(3).expect("space");
        let slot = sp.add_slot();
        sp.reserve(4 * CELL).expect("reserve");
        // Rooted pair (1, (2, unit)); plus one garbage cell.
        let inner = sp.alloc_cell(Tag::Prod, Val::small(2), Val::UNIT);
        let outer = sp.alloc_cell(Tag::Prod, Val::small(1), inner);
        sp.alloc_cell(Tag::Prod, Val::small(9), Val::small(9));
        sp.regs_mut(slot).val = outer;

        sp.compact();
        assert_eq!(sp.in_use(), 2 * CELL);
        let (a, rest) = sp.cell_at(sp.regs(slot).val.addr());
        assert_eq!(a.small_value(), 1);
        let (b, u) = sp.cell_at(rest.addr());
        assert_eq!(b.small_value(), 2);
        assert!(u.is_unit());
    }

    #[test]
    fn compaction_traces_every_slot() {
        let mut sp = Space::new(3).expect("space");
        let s1 = sp.add_slot();
        let s2 = sp.add_slot();
        sp.reserve(2 * CELL).expect("reserve");
        let v1 = sp.alloc_cell(Tag::Prod, Val::small(7), Val::UNIT);
        let v2 = sp.alloc_cell(Tag::ProdInL, Val::small(8), Val::UNIT_INR);
        sp.regs_mut(s1).val = v1;
        sp.regs_mut(s2).val = v2;
        sp.compact();
        assert_eq!(sp.val_at(sp.regs(s1).val.addr()).small_value(), 7);
        assert_eq!(sp.val_at(sp.regs(s2).val.addr()).small_value(), 8);
        assert_eq!(sp.regs(s2).val.tag(), Tag::ProdInL);
    }

    #[test]
    fn copy_observes_block_flags_through_deepsum() {
        let mut sp = Space::new(3).expect("space");
        let slot = sp.add_slot();
        sp.reserve(2 * CELL).expect("reserve");
        let block = sp.alloc_obj2(hdr(ObjTag::Block, 0) | BLOCK_AFF, Val::UNIT_INR);
        let sum = sp.alloc_obj2(
            hdr(ObjTag::DeepSum, deepsum_bits(SumTag::Right)),
            block,
        );
        sp.regs_mut(slot).val = sum;
        sp.reserve(2 * CELL).expect("reserve");
        let v = sp.regs(slot).val;
        let (_, ss) = sp.copy_value_raw(v, false);
        assert_eq!(ss, Substruct::AFFINE);
    }

    #[test]
    fn reserve_fails_when_exhausted() {
        let mut sp = Space::new(3).expect("space");
        let cap = sp.available();
        assert!(sp.reserve(cap).is_ok());
        assert_eq!(sp.reserve(cap + CELL), Err(RuntimeError::ContextFull));
    }
}
