//! Integer primitives.
//!
//! Operands are lifted out of the arena into a host-side [`Num`], the
//! arithmetic runs on that, and the result is lowered back after a single
//! reservation. Values inside the small range use the immediate form;
//! everything else boxes as little-endian base-10⁹ digits with a sign
//! bit, most significant digit nonzero.

use std::cmp::Ordering;

use crate::arena::Space;
use crate::consts::{CELL, RES_WRAP_SUM, SMALL_INT_MAX};
use crate::context::Context;
use crate::error::{RuntimeError, TypeFault, VmResult};
use crate::state::SumTag;
use crate::value::{bignum_size, hdr, hdr_data, hdr_is, ObjTag, Tag, Val};

const BASE: u64 = crate::consts::BIGNUM_BASE;

/// A host-side integer: immediate or sign-magnitude digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Num {
    Small(i64),
    Big { neg: bool, mag: Vec<u32> },
}

impl Num {
    pub fn from_i64(n: i64) -> Num {
        norm_i128(n as i128)
    }

    fn is_zero(&self) -> bool {
        matches!(self, Num::Small(0))
    }

    fn parts(&self) -> (bool, Vec<u32>) {
        match self {
            Num::Small(n) => (*n < 0, mag_from_u128(n.unsigned_abs() as u128)),
            Num::Big { neg, mag } => (*neg, mag.clone()),
        }
    }

    fn to_i128(&self) -> Option<i128> {
        match self {
            Num::Small(n) => Some(*n as i128),
            Num::Big { neg, mag } => {
                let mut v: i128 = 0;
                for d in mag.iter().rev() {
                    v = v.checked_mul(BASE as i128)?.checked_add(*d as i128)?;
                }
                Some(if *neg { -v } else { v })
            }
        }
    }

    /// Bytes of arena storage the lowered form needs.
    pub fn arena_size(&self) -> u64 {
        match self {
            Num::Small(_) => 0,
            Num::Big { mag, .. } => bignum_size(mag.len()),
        }
    }

    pub fn to_decimal(&self) -> String {
        match self {
            Num::Small(n) => n.to_string(),
            Num::Big { neg, mag } => {
                let mut s = String::with_capacity(mag.len() * 9 + 1);
                if *neg {
                    s.push('-');
                }
                let mut digits = mag.iter().rev();
                if let Some(top) = digits.next() {
                    s.push_str(&top.to_string());
                }
                for d in digits {
                    s.push_str(&format!("{d:09}"));
                }
                s
            }
        }
    }
}

/// Normalize sign-magnitude digits: strip high zeros, demote to the
/// immediate form when the value fits.
fn norm(neg: bool, mut mag: Vec<u32>) -> Num {
    while mag.last() == Some(&0) {
        mag.pop();
    }
    if mag.len() <= 2 {
        let mut v: i64 = 0;
        for d in mag.iter().rev() {
            v = v * BASE as i64 + *d as i64;
        }
        Num::Small(if neg { -v } else { v })
    } else {
        Num::Big { neg, mag }
    }
}

fn norm_i128(n: i128) -> Num {
    if n.unsigned_abs() <= SMALL_INT_MAX as u128 {
        Num::Small(n as i64)
    } else {
        norm(n < 0, mag_from_u128(n.unsigned_abs()))
    }
}

fn mag_from_u128(mut u: u128) -> Vec<u32> {
    let mut mag = Vec::new();
    while u > 0 {
        mag.push((u % BASE as u128) as u32);
        u /= BASE as u128;
    }
    mag
}

fn mag_cmp(a: &[u32], b: &[u32]) -> Ordering {
    a.len()
        .cmp(&b.len())
        .then_with(|| a.iter().rev().cmp(b.iter().rev()))
}

fn mag_add(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().max(b.len()) + 1);
    let mut carry = 0u64;
    for i in 0..a.len().max(b.len()) {
        let s = carry
            + *a.get(i).unwrap_or(&0) as u64
            + *b.get(i).unwrap_or(&0) as u64;
        out.push((s % BASE) as u32);
        carry = s / BASE;
    }
    if carry > 0 {
        out.push(carry as u32);
    }
    out
}

/// `a - b`, requiring `a >= b`.
fn mag_sub(a: &[u32], b: &[u32]) -> Vec<u32> {
    debug_assert!(mag_cmp(a, b) != Ordering::Less);
    let mut out = Vec::with_capacity(a.len());
    let mut borrow = 0i64;
    for i in 0..a.len() {
        let mut d = a[i] as i64 - borrow - *b.get(i).unwrap_or(&0) as i64;
        if d < 0 {
            d += BASE as i64;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out.push(d as u32);
    }
    out
}

fn mag_mul(a: &[u32], b: &[u32]) -> Vec<u32> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut cols = vec![0u128; a.len() + b.len()];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            cols[i + j] += *x as u128 * *y as u128;
        }
    }
    let mut out = Vec::with_capacity(cols.len());
    let mut carry = 0u128;
    for c in cols {
        let s = c + carry;
        out.push((s % BASE as u128) as u32);
        carry = s / BASE as u128;
    }
    while carry > 0 {
        out.push((carry % BASE as u128) as u32);
        carry /= BASE as u128;
    }
    out
}

fn mag_mul_small(a: &[u32], m: u64) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len() + 1);
    let mut carry = 0u64;
    for x in a {
        let p = *x as u64 * m + carry;
        out.push((p % BASE) as u32);
        carry = p / BASE;
    }
    while carry > 0 {
        out.push((carry % BASE) as u32);
        carry /= BASE;
    }
    out
}

/// Schoolbook long division on magnitudes; each quotient digit is found
/// by binary search. Returns `(quotient, remainder)`.
fn mag_divmod(a: &[u32], b: &[u32]) -> (Vec<u32>, Vec<u32>) {
    debug_assert!(!b.is_empty());
    if mag_cmp(a, b) == Ordering::Less {
        return (Vec::new(), a.to_vec());
    }
    let mut rem: Vec<u32> = Vec::new();
    let mut q_rev: Vec<u32> = Vec::new();
    for d in a.iter().rev() {
        rem.insert(0, *d);
        while rem.last() == Some(&0) {
            rem.pop();
        }
        let mut lo = 0u64;
        let mut hi = BASE - 1;
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            if mag_cmp(&mag_mul_small(b, mid), &rem) == Ordering::Greater {
                hi = mid - 1;
            } else {
                lo = mid;
            }
        }
        if lo > 0 {
            rem = mag_sub(&rem, &mag_mul_small(b, lo));
        }
        q_rev.push(lo as u32);
    }
    q_rev.reverse();
    while q_rev.last() == Some(&0) {
        q_rev.pop();
    }
    while rem.last() == Some(&0) {
        rem.pop();
    }
    (q_rev, rem)
}

pub(crate) fn num_add(a: &Num, b: &Num) -> Num {
    if let (Num::Small(x), Num::Small(y)) = (a, b) {
        return norm_i128(*x as i128 + *y as i128);
    }
    let (an, am) = a.parts();
    let (bn, bm) = b.parts();
    if an == bn {
        norm(an, mag_add(&am, &bm))
    } else {
        match mag_cmp(&am, &bm) {
            Ordering::Less => norm(bn, mag_sub(&bm, &am)),
            _ => norm(an, mag_sub(&am, &bm)),
        }
    }
}

pub(crate) fn num_mul(a: &Num, b: &Num) -> Num {
    if let (Num::Small(x), Num::Small(y)) = (a, b) {
        return norm_i128(*x as i128 * *y as i128);
    }
    let (an, am) = a.parts();
    let (bn, bm) = b.parts();
    norm(an != bn, mag_mul(&am, &bm))
}

pub(crate) fn num_neg(a: &Num) -> Num {
    match a {
        Num::Small(n) => Num::Small(-n),
        Num::Big { neg, mag } => Num::Big {
            neg: !neg,
            mag: mag.clone(),
        },
    }
}

pub(crate) fn num_cmp(a: &Num, b: &Num) -> Ordering {
    if let (Num::Small(x), Num::Small(y)) = (a, b) {
        return x.cmp(y);
    }
    let (an, am) = a.parts();
    let (bn, bm) = b.parts();
    match (an, bn) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, false) => mag_cmp(&am, &bm),
        (true, true) => mag_cmp(&bm, &am),
    }
}

/// Floored division: `dividend = q * divisor + r` with `r` taking the
/// divisor's sign and `|r| < |divisor|`.
pub(crate) fn num_divmod(dividend: &Num, divisor: &Num) -> VmResult<(Num, Num)> {
    if divisor.is_zero() {
        return Err(TypeFault::DivideByZero.into());
    }
    let (an, am) = dividend.parts();
    let (bn, bm) = divisor.parts();
    let (qm, rm) = mag_divmod(&am, &bm);
    let exact = rm.is_empty();
    if an == bn {
        Ok((norm(an != bn, qm), norm(bn, rm)))
    } else if exact {
        Ok((norm(true, qm), Num::Small(0)))
    } else {
        // Signs differ: floor the quotient and fold the remainder onto
        // the divisor's side.
        let q = norm(true, mag_add(&qm, &[1]));
        let r = norm(bn, mag_sub(&bm, &rm));
        Ok((q, r))
    }
}

impl Space {
    /// Lift an integer value into host form.
    pub(crate) fn read_num(&self, v: Val) -> VmResult<Num> {
        if v.is_small_int() {
            return Ok(Num::Small(v.small_value()));
        }
        if v.is_obj() {
            let a = v.addr();
            let h = self.word(a);
            if hdr_is(h, ObjTag::BigNum) {
                let data = hdr_data(h);
                let neg = data & 1 == 1;
                let n = (data >> 1) as usize;
                let mut mag = Vec::with_capacity(n);
                for i in 0..n {
                    let w = self.word(a + 8 + 8 * (i as u64 / 2));
                    mag.push((w >> (32 * (i as u64 % 2))) as u32);
                }
                return Ok(Num::Big { neg, mag });
            }
        }
        Err(TypeFault::ExpectedInteger.into())
    }

    /// Lower a host integer into the arena. Assumes `n.arena_size()`
    /// reserved.
    pub(crate) fn lower_num(&mut self, n: &Num) -> Val {
        match n {
            Num::Small(v) => Val::small(*v),
            Num::Big { neg, mag } => {
                let a = self.alloc_raw(bignum_size(mag.len()));
                let data = ((mag.len() as u64) << 1) | *neg as u64;
                self.set_word(a, hdr(ObjTag::BigNum, data));
                for (i, d) in mag.iter().enumerate() {
                    let wa = a + 8 + 8 * (i as u64 / 2);
                    let old = if i % 2 == 0 { 0 } else { self.word(wa) };
                    self.set_word(wa, old | ((*d as u64) << (32 * (i as u64 % 2))));
                }
                Val::tagged(Tag::Obj, a)
            }
        }
    }

    pub(crate) fn intro_num(&mut self, r: usize, n: &Num) -> VmResult<()> {
        self.reserve(CELL + n.arena_size())?;
        let v = self.lower_num(n);
        self.intro_value(r, v);
        Ok(())
    }

    /// One binary integer operation `(I(a) * (I(b) * e)) → (I(f) * e)`.
    fn int_binop(
        &mut self,
        r: usize,
        f: impl FnOnce(&Num, &Num) -> Num,
    ) -> VmResult<()> {
        let (p, q) = self.int_operands(r)?;
        let x = self.read_num(self.val_at(p))?;
        let y = self.read_num(self.val_at(q))?;
        let out = f(&x, &y);
        self.reserve(out.arena_size())?;
        let p = self.top_pair(r)?;
        let q = self.val_at(p + 8).addr();
        let lowered = self.lower_num(&out);
        self.set_word(q, lowered.raw());
        self.regs_mut(r).val = Val::tagged(Tag::Prod, q);
        Ok(())
    }

    fn int_operands(&self, r: usize) -> VmResult<(u64, u64)> {
        let p = self.top_pair(r)?;
        let snd = self.val_at(p + 8);
        if !snd.is_prod() {
            return Err(TypeFault::ExpectedProduct.into());
        }
        Ok((p, snd.addr()))
    }

    pub(crate) fn int_add(&mut self, r: usize) -> VmResult<()> {
        self.int_binop(r, |x, y| num_add(y, x))
    }

    pub(crate) fn int_mul(&mut self, r: usize) -> VmResult<()> {
        self.int_binop(r, |x, y| num_mul(y, x))
    }

    pub(crate) fn int_neg(&mut self, r: usize) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let fst = self.val_at(p);
        if fst.is_small_int() {
            self.set_word(p, Val::small(-fst.small_value()).raw());
            return Ok(());
        }
        if fst.is_obj() && hdr_is(self.word(fst.addr()), ObjTag::BigNum) {
            let a = fst.addr();
            let h = self.word(a);
            self.set_word(a, h ^ (1 << 8));
            return Ok(());
        }
        Err(TypeFault::ExpectedInteger.into())
    }

    /// `Q :: (I(divisor) * (I(dividend) * e)) → (I(r) * (I(q) * e))`
    pub(crate) fn int_div(&mut self, r: usize) -> VmResult<()> {
        let (p, q) = self.int_operands(r)?;
        let divisor = self.read_num(self.val_at(p))?;
        let dividend = self.read_num(self.val_at(q))?;
        let (quot, rem) = num_divmod(&dividend, &divisor)?;
        self.reserve(quot.arena_size() + rem.arena_size())?;
        let p = self.top_pair(r)?;
        let q = self.val_at(p + 8).addr();
        let rem_v = self.lower_num(&rem);
        let quot_v = self.lower_num(&quot);
        self.set_word(p, rem_v.raw());
        self.set_word(q, quot_v.raw());
        Ok(())
    }

    /// `G :: (I(A) * (I(B) * e)) → (((B*A) + (A*B)) * e)`, in right when
    /// `B > A`.
    pub(crate) fn int_gt(&mut self, r: usize) -> VmResult<()> {
        let (p, q) = self.int_operands(r)?;
        let a = self.read_num(self.val_at(p))?;
        let b = self.read_num(self.val_at(q))?;
        self.reserve(RES_WRAP_SUM)?;
        let p = self.top_pair(r)?;
        let q = self.val_at(p + 8).addr();
        let x = self.val_at(p);
        let (y, e) = self.cell_at(q);
        if num_cmp(&b, &a) == Ordering::Greater {
            self.set_cell(q, x, y);
            let s = self.wrap_sum_v(Val::tagged(Tag::Prod, q), SumTag::Right);
            self.set_cell(p, s, e);
        } else {
            self.set_cell(q, y, x);
            let s = self.wrap_sum_v(Val::tagged(Tag::Prod, q), SumTag::Left);
            self.set_cell(p, s, e);
        }
        self.regs_mut(r).val = Val::tagged(Tag::Prod, p);
        Ok(())
    }

    /// Non-destructive comparison of `b` against `a` in
    /// `(I(a) * (I(b) * e))`, in allocation order.
    pub(crate) fn int_cmp(&self, r: usize) -> VmResult<Ordering> {
        let (p, q) = self.int_operands(r)?;
        let a = self.read_num(self.val_at(p))?;
        let b = self.read_num(self.val_at(q))?;
        Ok(num_cmp(&b, &a))
    }

    /// Digit operator: `(I(a) * e) → (I(10a+k) * e)`.
    pub(crate) fn int_digit(&mut self, r: usize, k: i64) -> VmResult<()> {
        let p = self.top_pair(r)?;
        let n = self.read_num(self.val_at(p))?;
        let out = num_add(&num_mul(&n, &Num::Small(10)), &Num::Small(k));
        self.reserve(out.arena_size())?;
        let p = self.top_pair(r)?;
        let lowered = self.lower_num(&out);
        self.set_word(p, lowered.raw());
        Ok(())
    }

    pub(crate) fn peek_num(&self, r: usize) -> VmResult<Num> {
        let p = self.top_pair(r)?;
        self.read_num(self.val_at(p))
    }
}

/// Parse the canonical external form `0 | (-)?[1-9][0-9]*`.
pub(crate) fn parse_decimal(s: &str) -> VmResult<Num> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let neg = s.starts_with('-');
    let well_formed = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'))
        && !(neg && digits == "0");
    if !well_formed {
        return Err(RuntimeError::InvalidArgument);
    }
    let bytes = digits.as_bytes();
    let mut mag = Vec::with_capacity(bytes.len() / 9 + 1);
    let mut end = bytes.len();
    while end > 0 {
        let start = end.saturating_sub(9);
        let chunk = core::str::from_utf8(&bytes[start..end])
            .ok()
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or(RuntimeError::InvalidArgument)?;
        mag.push(chunk);
        end = start;
    }
    Ok(norm(neg, mag))
}

impl<S> Context<S> {
    /// `e → (I(n) * e)`.
    pub fn intro_i32(&mut self, n: i32) -> VmResult<()> {
        let slot = self.slot();
        self.lock()
            .guarded(slot, |sp, r| sp.intro_num(r, &Num::from_i64(n as i64)))
    }

    /// `e → (I(n) * e)`.
    pub fn intro_i64(&mut self, n: i64) -> VmResult<()> {
        let slot = self.slot();
        self.lock()
            .guarded(slot, |sp, r| sp.intro_num(r, &Num::from_i64(n)))
    }

    /// `e → (I(n) * e)` from the canonical decimal form
    /// `0 | (-)?[1-9][0-9]*`.
    pub fn intro_istr(&mut self, s: &str) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, |sp, r| {
            let n = parse_decimal(s)?;
            sp.intro_num(r, &n)
        })
    }

    /// Non-destructively read the top integer as an `i32`.
    pub fn peek_i32(&mut self) -> VmResult<i32> {
        let slot = self.slot();
        self.lock().probing(slot, |sp, r| {
            let n = sp.peek_num(r)?;
            n.to_i128()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or(RuntimeError::BufferTooSmall { needed: 8 })
        })
    }

    /// Non-destructively read the top integer as an `i64`.
    pub fn peek_i64(&mut self) -> VmResult<i64> {
        let slot = self.slot();
        self.lock().probing(slot, |sp, r| {
            let n = sp.peek_num(r)?;
            n.to_i128()
                .and_then(|v| i64::try_from(v).ok())
                .ok_or_else(|| RuntimeError::BufferTooSmall {
                    needed: n.to_decimal().len(),
                })
        })
    }

    /// Non-destructively format the top integer in decimal into `buf`,
    /// returning the byte length. An undersized buffer reports the
    /// required length without latching an error.
    pub fn peek_istr(&mut self, buf: &mut [u8]) -> VmResult<usize> {
        let slot = self.slot();
        self.lock().probing(slot, |sp, r| {
            let s = sp.peek_num(r)?.to_decimal();
            if buf.len() < s.len() {
                return Err(RuntimeError::BufferTooSmall { needed: s.len() });
            }
            buf[..s.len()].copy_from_slice(s.as_bytes());
            Ok(s.len())
        })
    }

    /// `+ :: (I(a) * (I(b) * e)) → (I(a+b) * e)`.
    pub fn int_add(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::int_add)
    }

    /// `* :: (I(a) * (I(b) * e)) → (I(a·b) * e)`.
    pub fn int_mul(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::int_mul)
    }

    /// `- :: (I(a) * e) → (I(-a) * e)`. Non-allocating.
    pub fn int_neg(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::int_neg)
    }

    /// `Q` — lossless floored divmod; zero divisor is a type fault.
    pub fn int_div(&mut self) -> VmResult<()> {
        let slot = self.slot();
        self.lock().guarded(slot, Space::int_div)
    }

    /// Compare `b` against `a` in `(I(a) * (I(b) * e))` without touching
    /// the values.
    pub fn int_cmp(&mut self) -> VmResult<Ordering> {
        let slot = self.slot();
        self.lock().probing(slot, |sp, r| sp.int_cmp(r))
    }
}
