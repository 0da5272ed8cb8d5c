//! Introduction and elimination of values on the primary register.
//!
//! Every operation here is fail-safe: a typed error leaves the context's
//! value unchanged, except for the incremental reads which document
//! partial progress.

use crate::arena::{chunk_byte_len, text_char_count, text_size_word, Space};
use crate::consts::{
    cell_buff, CELL, RES_UNWRAP_SUM, RES_WRAP_SUM, SEAL_INLINE_MAX, TEXT_CHUNK_MAX,
};
use crate::context::Context;
use crate::error::{RuntimeError, TypeFault, VmResult};
use crate::state::SumTag;
use crate::value::{
    deepsum_bits, deepsum_has_room, hdr, hdr_data, hdr_is, seal_size, sealsm_pack, sealsm_unpack,
    Addr, ObjTag, Tag, Val,
};
use runic_asm::{valid_token, valid_text_char, Token};

impl Space {
    /// Address of the primary pair `(a * e)`, or a type fault.
    pub(crate) fn top_pair(&self, r: usize) -> VmResult<Addr> {
        let v = self.regs(r).val;
        if v.is_prod() {
            Ok(v.addr())
        } else {
            Err(TypeFault::ExpectedProduct.into())
        }
    }

    /// Push a value onto the primary register: `e → (v * e)`.
    /// Assumes one cell reserved.
    pub(crate) fn intro_value(&mut self, r: usize, v: Val) {
        let old = self.regs(r).val;
        let cell = self.alloc_cell(Tag::Prod, v, old);
        self.regs_mut(r).val = cell;
    }

    // ------------------------------------------------------------------
    // Unit

    pub(crate) fn intro_unit(&mut self, r: usize) -> VmResult<()> {
        self.reserve(CELL)?;
        self.intro_value(r, Val::UNIT);
        Ok(())
    }

    pub(crate) fn intro_unit_r(&mut self, r: usize) -> VmResult<()> {
        self.reserve(CELL)?;
        let old = self.regs(r).val;
        let cell = self.alloc_cell(Tag::Prod, old, Val::UNIT);
        self.regs_mut(r).val = cell;
        Ok(())
    }

    pub(crate) fn elim_unit(&mut self, r: usize) -> VmResult<()> {
        let a = self.top_pair(r)?;
        let (fst, snd) = self.cell_at(a);
        if !fst.is_unit() {
            return Err(TypeFault::ExpectedUnit.into());
        }
        self.regs_mut(r).val = snd;
        Ok(())
    }

    pub(crate) fn elim_unit_r(&mut self, r: usize) -> VmResult<()> {
        let a = self.top_pair(r)?;
        let (fst, snd) = self.cell_at(a);
        if !snd.is_unit() {
            return Err(TypeFault::ExpectedUnit.into());
        }
        self.regs_mut(r).val = fst;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sums

    /// Wrap a loose value in a sum branch. Collapses to a pointer-tag
    /// rewrite for products and unit; otherwise packs into a deep-sum
    /// header, extending in place when the chain has room.
    /// Assumes [`RES_WRAP_SUM`] reserved.
    pub(crate) fn wrap_sum_v(&mut self, v: Val, tag: SumTag) -> Val {
        let bits = deepsum_bits(tag);
        match v.tag() {
            Tag::Prod => {
                let t = if tag.is_right() {
                    Tag::ProdInR
                } else {
                    Tag::ProdInL
                };
                Val::tagged(t, v.addr())
            }
            Tag::Unit => {
                if tag.is_right() {
                    Val::UNIT_INR
                } else {
                    Val::UNIT_INL
                }
            }
            Tag::Obj => {
                let a = v.addr();
                let h = self.word(a);
                if hdr_is(h, ObjTag::DeepSum) && deepsum_has_room(hdr_data(h)) {
                    self.set_word(a, hdr(ObjTag::DeepSum, (hdr_data(h) << 2) | bits));
                    v
                } else {
                    self.alloc_obj2(hdr(ObjTag::DeepSum, bits), v)
                }
            }
            _ => self.alloc_obj2(hdr(ObjTag::DeepSum, bits), v),
        }
    }

    /// Split one sum level off a loose value. Compact binary and text
    /// chunks behave as their list expansion: the head element is popped
    /// and the chunk narrows. Assumes [`RES_UNWRAP_SUM`] reserved.
    pub(crate) fn unwrap_sum_v(&mut self, v: Val) -> VmResult<(SumTag, Val)> {
        match v.tag() {
            Tag::ProdInL => Ok((SumTag::Left, Val::tagged(Tag::Prod, v.addr()))),
            Tag::ProdInR => Ok((SumTag::Right, Val::tagged(Tag::Prod, v.addr()))),
            Tag::UnitInL => Ok((SumTag::Left, Val::UNIT)),
            Tag::UnitInR => Ok((SumTag::Right, Val::UNIT)),
            Tag::Obj => {
                let a = v.addr();
                let h = self.word(a);
                match ObjTag::of(h) {
                    ObjTag::DeepSum => {
                        let data = hdr_data(h);
                        let tag = if data & 3 == 3 {
                            SumTag::Right
                        } else {
                            SumTag::Left
                        };
                        let rest = data >> 2;
                        if rest == 0 {
                            Ok((tag, self.val_at(a + 8)))
                        } else {
                            self.set_word(a, hdr(ObjTag::DeepSum, rest));
                            Ok((tag, v))
                        }
                    }
                    ObjTag::Binary => {
                        let head = Val::small(self.chunk_pop_byte(a) as i64);
                        let rest = self.chunk_rest(a, v);
                        Ok((SumTag::Left, self.alloc_cell(Tag::Prod, head, rest)))
                    }
                    ObjTag::Text => {
                        let head = Val::small(self.chunk_pop_char(a) as i64);
                        let rest = self.chunk_rest(a, v);
                        Ok((SumTag::Left, self.alloc_cell(Tag::Prod, head, rest)))
                    }
                    _ => Err(TypeFault::ExpectedSum.into()),
                }
            }
            _ => Err(TypeFault::ExpectedSum.into()),
        }
    }

    /// Remove the first byte of a binary chunk, narrowing it in place.
    fn chunk_pop_byte(&mut self, a: Addr) -> u8 {
        let size = self.word(a + 16);
        let buf = self.word(a + 24);
        let byte = self.bytes(buf, 1)[0];
        self.set_word(a + 16, size - 1);
        self.set_word(a + 24, buf + 1);
        byte
    }

    /// Remove the first codepoint of a text chunk, narrowing it in place.
    fn chunk_pop_char(&mut self, a: Addr) -> char {
        let sw = self.word(a + 16);
        let bytes = sw & 0xffff;
        let chars = text_char_count(sw);
        let buf = self.word(a + 24);
        let b0 = self.bytes(buf, 1)[0];
        let clen = utf8_len(b0);
        let c = core::str::from_utf8(self.bytes(buf, clen))
            .ok()
            .and_then(|s| s.chars().next())
            .expect("Unreachable! Text chunks hold validated UTF-8");
        self.set_word(a + 16, text_size_word((bytes - clen as u64) as usize, (chars - 1) as usize));
        self.set_word(a + 24, buf + clen as u64);
        c
    }

    /// The remainder of a chunk after a pop: the chunk itself, or its
    /// continuation once emptied.
    fn chunk_rest(&mut self, a: Addr, v: Val) -> Val {
        let tag = ObjTag::of(self.word(a));
        if chunk_byte_len(tag, self.word(a + 16)) == 0 {
            self.val_at(a + 8)
        } else {
            v
        }
    }

    /// `(a * e) → ((a + 0) * e)` or the right-branch variant.
    pub(crate) fn sum_wrap(&mut self, r: usize, tag: SumTag) -> VmResult<()> {
        self.top_pair(r)?;
        self.reserve(RES_WRAP_SUM)?;
        let a = self.top_pair(r)?;
        let fst = self.val_at(a);
        let wrapped = self.wrap_sum_v(fst, tag);
        self.set_word(a, wrapped.raw());
        Ok(())
    }

    /// `((a + b) * e) → (a * e)` reporting which branch was present.
    pub(crate) fn sum_unwrap(&mut self, r: usize) -> VmResult<SumTag> {
        self.top_pair(r)?;
        self.reserve(RES_UNWRAP_SUM)?;
        let a = self.top_pair(r)?;
        let fst = self.val_at(a);
        let (tag, inner) = self.unwrap_sum_v(fst)?;
        self.set_word(a, inner.raw());
        Ok(tag)
    }

    // ------------------------------------------------------------------
    // Seals

    pub(crate) fn wrap_seal(&mut self, r: usize, token: &str) -> VmResult<()> {
        if !valid_token(token) {
            return Err(RuntimeError::InvalidArgument);
        }
        self.top_pair(r)?;
        let obj = self.alloc_seal(token, None)?;
        let a = self.top_pair(r)?;
        let fst = self.val_at(a);
        self.set_word(obj.addr() + 8, fst.raw());
        self.set_word(a, obj.raw());
        Ok(())
    }

    /// Allocate a sealer object wrapping `inner` (or unit for operand
    /// objects built by the reader). Reserves internally, so `inner` must
    /// be shallow; deep payloads are attached afterwards through a root.
    pub(crate) fn alloc_seal(&mut self, token: &str, inner: Option<Val>) -> VmResult<Val> {
        debug_assert!(inner.map_or(true, |v| v.is_shallow()));
        let v = inner.unwrap_or(Val::UNIT);
        if token.starts_with(':') && token.len() <= SEAL_INLINE_MAX {
            self.reserve(CELL)?;
            Ok(self.alloc_obj2(hdr(ObjTag::SealSm, sealsm_pack(token)), v))
        } else {
            let sz = seal_size(token.len());
            self.reserve(sz)?;
            let a = self.alloc_raw(sz);
            self.set_word(a, hdr(ObjTag::Seal, token.len() as u64));
            self.set_word(a + 8, v.raw());
            self.write_bytes(a + 16, token.as_bytes());
            Ok(Val::tagged(Tag::Obj, a))
        }
    }

    /// Read the sealer token of the object at `a`.
    pub(crate) fn seal_token(&self, a: Addr) -> String {
        let h = self.word(a);
        if hdr_is(h, ObjTag::SealSm) {
            sealsm_unpack(h)
        } else {
            let len = hdr_data(h) as usize;
            String::from_utf8_lossy(self.bytes(a + 16, len)).into_owned()
        }
    }

    pub(crate) fn unwrap_seal(&mut self, r: usize) -> VmResult<Token> {
        let a = self.top_pair(r)?;
        let fst = self.val_at(a);
        if !fst.is_obj() {
            return Err(TypeFault::ExpectedSealed.into());
        }
        let h = self.word(fst.addr());
        if !hdr_is(h, ObjTag::Seal) && !hdr_is(h, ObjTag::SealSm) {
            return Err(TypeFault::ExpectedSealed.into());
        }
        let token = self.seal_token(fst.addr());
        let inner = self.val_at(fst.addr() + 8);
        self.set_word(a, inner.raw());
        Token::try_from(token.as_str()).map_err(|_| RuntimeError::InvalidArgument)
    }

    // ------------------------------------------------------------------
    // Binary and text

    pub(crate) fn intro_binary(&mut self, r: usize, data: &[u8]) -> VmResult<()> {
        if data.is_empty() {
            self.reserve(CELL)?;
            self.intro_value(r, Val::UNIT_INR);
            return Ok(());
        }
        let len = data.len() as u64;
        self.reserve(2 * CELL + cell_buff(len) + CELL)?;
        let buf = self.alloc_raw(cell_buff(len));
        self.write_bytes(buf, data);
        let a = self.alloc_raw(2 * CELL);
        self.set_word(a, hdr(ObjTag::Binary, 0));
        self.set_word(a + 8, Val::UNIT_INR.raw());
        self.set_word(a + 16, len);
        self.set_word(a + 24, buf);
        self.intro_value(r, Val::tagged(Tag::Obj, a));
        Ok(())
    }

    /// Destructively read bytes from the front of a binary list into
    /// `out`. Returns the count read; the consumed prefix is dropped even
    /// when a malformed element stops the read early.
    pub(crate) fn read_binary(&mut self, r: usize, out: &mut [u8]) -> VmResult<usize> {
        let mut n = 0;
        while n < out.len() {
            let a = self.top_pair(r)?;
            let fst = self.val_at(a);
            if is_list_end(self, fst) {
                return Ok(n);
            }
            if fst.is_cons() {
                let (head, tail) = self.cell_at(fst.addr());
                let byte = head
                    .is_small_int()
                    .then(|| head.small_value())
                    .filter(|b| (0..=255).contains(b))
                    .ok_or(TypeFault::ExpectedList)?;
                out[n] = byte as u8;
                n += 1;
                self.set_word(a, tail.raw());
            } else if fst.is_obj() && hdr_is(self.word(fst.addr()), ObjTag::Binary) {
                let o = fst.addr();
                let size = self.word(o + 16);
                let take = size.min((out.len() - n) as u64);
                let buf = self.word(o + 24);
                out[n..n + take as usize].copy_from_slice(self.bytes(buf, take as usize));
                n += take as usize;
                if take == size {
                    let next = self.val_at(o + 8);
                    self.set_word(a, next.raw());
                } else {
                    self.set_word(o + 16, size - take);
                    self.set_word(o + 24, buf + take);
                }
            } else {
                return Err(TypeFault::ExpectedList.into());
            }
        }
        Ok(n)
    }

    pub(crate) fn intro_text(&mut self, r: usize, text: &str) -> VmResult<()> {
        if !text.chars().all(valid_text_char) {
            return Err(RuntimeError::InvalidArgument);
        }
        let chunks = plan_text_chunks(text);
        let total: u64 = chunks
            .iter()
            .map(|c| 2 * CELL + cell_buff(c.len() as u64))
            .sum::<u64>()
            + CELL;
        self.reserve(total)?;
        let v = self.build_text_r(&chunks, Val::UNIT_INR);
        self.intro_value(r, v);
        Ok(())
    }

    /// Build a chunk chain from back to front onto `terminal`. Assumes
    /// the summed chunk sizes are reserved.
    pub(crate) fn build_text_r(&mut self, chunks: &[&str], terminal: Val) -> Val {
        let mut next = terminal;
        for chunk in chunks.iter().rev() {
            let len = chunk.len() as u64;
            let buf = self.alloc_raw(cell_buff(len));
            self.write_bytes(buf, chunk.as_bytes());
            let a = self.alloc_raw(2 * CELL);
            self.set_word(a, hdr(ObjTag::Text, 0));
            self.set_word(a + 8, next.raw());
            self.set_word(a + 16, text_size_word(chunk.len(), chunk.chars().count()));
            self.set_word(a + 24, buf);
            next = Val::tagged(Tag::Obj, a);
        }
        next
    }

    /// Destructively read text into a UTF-8 buffer. Returns bytes and
    /// codepoints read; stops at the buffer boundary, always on a
    /// codepoint boundary.
    pub(crate) fn read_text(&mut self, r: usize, out: &mut [u8]) -> VmResult<(usize, usize)> {
        let mut bytes = 0;
        let mut chars = 0;
        loop {
            let a = self.top_pair(r)?;
            let fst = self.val_at(a);
            if is_list_end(self, fst) {
                return Ok((bytes, chars));
            }
            if fst.is_cons() {
                let (head, tail) = self.cell_at(fst.addr());
                let c = head
                    .is_small_int()
                    .then(|| head.small_value())
                    .and_then(|n| u32::try_from(n).ok())
                    .and_then(char::from_u32)
                    .filter(|c| valid_text_char(*c))
                    .ok_or(TypeFault::ExpectedList)?;
                if bytes + c.len_utf8() > out.len() {
                    return Ok((bytes, chars));
                }
                c.encode_utf8(&mut out[bytes..]);
                bytes += c.len_utf8();
                chars += 1;
                self.set_word(a, tail.raw());
            } else if fst.is_obj() && hdr_is(self.word(fst.addr()), ObjTag::Text) {
                let o = fst.addr();
                let sw = self.word(o + 16);
                if chunk_byte_len(ObjTag::Text, sw) as usize <= out.len() - bytes {
                    // Whole chunk fits.
                    let blen = chunk_byte_len(ObjTag::Text, sw) as usize;
                    let buf = self.word(o + 24);
                    out[bytes..bytes + blen].copy_from_slice(self.bytes(buf, blen));
                    bytes += blen;
                    chars += text_char_count(sw) as usize;
                    let next = self.val_at(o + 8);
                    self.set_word(a, next.raw());
                } else {
                    // Pop one codepoint at a time until the buffer fills.
                    let buf = self.word(o + 24);
                    let clen = utf8_len(self.bytes(buf, 1)[0]);
                    if bytes + clen > out.len() {
                        return Ok((bytes, chars));
                    }
                    let c = self.chunk_pop_char(o);
                    c.encode_utf8(&mut out[bytes..]);
                    bytes += c.len_utf8();
                    chars += 1;
                    let rest = self.chunk_rest(o, fst);
                    self.set_word(a, rest.raw());
                }
            } else {
                return Err(TypeFault::ExpectedList.into());
            }
        }
    }

    /// Hint that the value may migrate to external storage. Stowage is
    /// lazy; the hint is recorded and the value stays in place.
    pub(crate) fn stow(&mut self, r: usize) -> VmResult<()> {
        self.top_pair(r)?;
        tracing::debug!(target: "runic_vm::stow", "stowage hint recorded");
        Ok(())
    }

    /// Walk a byte or codepoint list, collecting the encoded content,
    /// the codepoint count, and the terminal value. Read-only; the
    /// terminal is invalidated by any later reservation.
    pub(crate) fn list_scan(&self, start: Val, text: bool) -> VmResult<(Vec<u8>, usize, Val)> {
        let mut out = Vec::new();
        let mut chars = 0usize;
        let mut v = start;
        loop {
            if is_list_end(self, v) {
                return Ok((out, chars, v));
            }
            if v.is_cons() {
                let (head, tail) = self.cell_at(v.addr());
                if !head.is_small_int() {
                    return Err(TypeFault::ExpectedList.into());
                }
                let n = head.small_value();
                if text {
                    let c = u32::try_from(n)
                        .ok()
                        .and_then(char::from_u32)
                        .filter(|c| valid_text_char(*c))
                        .ok_or(TypeFault::ExpectedList)?;
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    chars += 1;
                } else {
                    if !(0..=255).contains(&n) {
                        return Err(TypeFault::ExpectedList.into());
                    }
                    out.push(n as u8);
                }
                v = tail;
            } else if v.is_obj() {
                let a = v.addr();
                let h = self.word(a);
                match (ObjTag::of(h), text) {
                    (ObjTag::Binary, false) => {
                        let len = self.word(a + 16) as usize;
                        out.extend_from_slice(self.bytes(self.word(a + 24), len));
                        v = self.val_at(a + 8);
                    }
                    (ObjTag::Text, true) => {
                        let sw = self.word(a + 16);
                        let len = chunk_byte_len(ObjTag::Text, sw) as usize;
                        out.extend_from_slice(self.bytes(self.word(a + 24), len));
                        chars += text_char_count(sw) as usize;
                        v = self.val_at(a + 8);
                    }
                    _ => return Err(TypeFault::ExpectedList.into()),
                }
            } else {
                return Err(TypeFault::ExpectedList.into());
            }
        }
    }

    /// `{&text}` / `{&binary}`: compact a list value into its chunked
    /// representation, preserving the terminal.
    pub(crate) fn anno_compact(&mut self, r: usize, text: bool) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let (content, _, _) = self.list_scan(self.val_at(p), text)?;
        if content.is_empty() {
            return Ok(());
        }
        let total = if text {
            let s = core::str::from_utf8(&content)
                .expect("Unreachable! Scan emits valid UTF-8");
            plan_text_chunks(s)
                .iter()
                .map(|c| 2 * CELL + cell_buff(c.len() as u64))
                .sum()
        } else {
            2 * CELL + cell_buff(content.len() as u64)
        };
        self.reserve(total)?;
        // Re-walk: the reservation may have moved everything.
        let p = self.top_pair(r)?;
        let (content, _, terminal) = self.list_scan(self.val_at(p), text)?;
        let compact = if text {
            let s = core::str::from_utf8(&content)
                .expect("Unreachable! Scan emits valid UTF-8");
            let chunks = plan_text_chunks(s);
            self.build_text_r(&chunks, terminal)
        } else {
            let len = content.len() as u64;
            let buf = self.alloc_raw(cell_buff(len));
            self.write_bytes(buf, &content);
            let a = self.alloc_raw(2 * CELL);
            self.set_word(a, hdr(ObjTag::Binary, 0));
            self.set_word(a + 8, terminal.raw());
            self.set_word(a + 16, len);
            self.set_word(a + 24, buf);
            Val::tagged(Tag::Obj, a)
        };
        self.set_word(p, compact.raw());
        Ok(())
    }
}

/// Whether a value terminates a list: any sum-in-right.
pub(crate) fn is_list_end(sp: &Space, v: Val) -> bool {
    match v.tag() {
        Tag::UnitInR | Tag::ProdInR => true,
        Tag::Obj => {
            let h = sp.word(v.addr());
            hdr_is(h, ObjTag::DeepSum) && hdr_data(h) & 3 == 3
        }
        _ => false,
    }
}

/// Length of the UTF-8 sequence beginning with `b0`.
fn utf8_len(b0: u8) -> usize {
    match b0 {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

/// Split text into chunks of at most [`TEXT_CHUNK_MAX`] bytes on
/// codepoint boundaries.
pub(crate) fn plan_text_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut take = rest.len().min(TEXT_CHUNK_MAX);
        while !rest.is_char_boundary(take) {
            take -= 1;
        }
        chunks.push(&rest[..take]);
        rest = &rest[take..];
    }
    chunks
}

impl<S> Context<S> {
    /// `(a) → (1 * a)`.
    pub fn intro_unit(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::intro_unit)
    }

    /// `(a) → (a * 1)`.
    pub fn intro_unit_r(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::intro_unit_r)
    }

    /// `(1 * a) → (a)`.
    pub fn elim_unit(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::elim_unit)
    }

    /// `(a * 1) → (a)`.
    pub fn elim_unit_r(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::elim_unit_r)
    }

    /// `(a * e) → ((a + 0) * e)` for [`SumTag::Left`], the mirrored form
    /// for [`SumTag::Right`].
    pub fn wrap_sum(&mut self, tag: SumTag) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.sum_wrap(r, tag))
    }

    /// Split one sum level, reporting the branch.
    pub fn unwrap_sum(&mut self) -> VmResult<SumTag> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::sum_unwrap)
    }

    /// `(a * e) → ((sealed a) * e)` with a token such as `:map`.
    pub fn wrap_seal(&mut self, token: &str) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.wrap_seal(r, token))
    }

    /// `((sealed a) * e) → (a * e)`, returning the sealer token.
    pub fn unwrap_seal(&mut self) -> VmResult<Token> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::unwrap_seal)
    }

    /// `e → (binary * e)`: introduce a compact byte list.
    pub fn intro_binary(&mut self, data: &[u8]) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.intro_binary(r, data))
    }

    /// Destructively read the binary prefix into `out`; returns bytes
    /// read. Fewer bytes than `out.len()` means the list is exhausted.
    pub fn read_binary(&mut self, out: &mut [u8]) -> VmResult<usize> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.read_binary(r, out))
    }

    /// `e → (text * e)`: introduce a compact text.
    ///
    /// Text must satisfy the character rules: no control characters
    /// except LF, no replacement character.
    pub fn intro_text(&mut self, text: &str) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.intro_text(r, text))
    }

    /// Destructively read text into a UTF-8 buffer; returns `(bytes,
    /// codepoints)` read.
    pub fn read_text(&mut self, out: &mut [u8]) -> VmResult<(usize, usize)> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| sp.read_text(r, out))
    }

    /// Mark the top value for lazy migration to the external store.
    pub fn stow(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::stow)
    }
}
