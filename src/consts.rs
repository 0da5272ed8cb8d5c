//! Public contract constants and internal layout parameters.

/// Largest integer representable in the immediate (unboxed) form: eighteen
/// decimal digits. Values outside `SMALL_INT_MIN..=SMALL_INT_MAX` box into
/// the big-integer representation.
pub const SMALL_INT_MAX: i64 = 999_999_999_999_999_999;

/// Smallest immediate integer; the range is symmetric.
pub const SMALL_INT_MIN: i64 = -SMALL_INT_MAX;

/// Minimum context size in mebibytes.
pub const CX_SIZE_MIN_MB: u32 = 3;

/// Maximum context size in mebibytes.
pub const CX_SIZE_MAX_MB: u32 = 4092;

/// Maximum byte length of one text chunk. Texts larger than this are
/// chained through multiple chunks.
pub const TEXT_CHUNK_MAX: usize = 0xffff;

/// Sealer tokens beginning with `:` of at most this many bytes are stored
/// inline in the object header.
pub const SEAL_INLINE_MAX: usize = 4;

/// Maximum number of sum tags packed into one deep-sum header word.
pub const DEEPSUM_MAX_DEPTH: u32 = 12;

pub(crate) const MB: u64 = 1 << 20;

/// Two words: the allocation granule.
pub(crate) const CELL: u64 = 16;

/// Base of one big-integer digit.
pub(crate) const BIGNUM_BASE: u64 = 1_000_000_000;

/// Round a byte size up to the allocation granule.
pub(crate) const fn cell_buff(n: u64) -> u64 {
    (n + (CELL - 1)) & !(CELL - 1)
}

// Worst-case reservation constants. Primitives that allocate more than
// once reserve the summed worst case up front so no allocation mid-way
// can trigger a compaction.

/// Wrapping a sum allocates at most one deep-sum cell.
pub(crate) const RES_WRAP_SUM: u64 = CELL;

/// Unwrapping a sum allocates at most one pair cell (compact-chunk pop).
pub(crate) const RES_UNWRAP_SUM: u64 = CELL;

/// Sum data plumbing composes at most four unwrap/wrap rounds.
pub(crate) const RES_SUM_OP: u64 = 4 * (RES_WRAP_SUM + RES_UNWRAP_SUM);

/// Quote allocates an opval, a cons cell and a block header.
pub(crate) const RES_QUOTE: u64 = 3 * CELL;

/// Apply allocates a continuation op, a hidden-environment opval and a
/// call-stack frame.
pub(crate) const RES_APPLY: u64 = 3 * CELL;

/// Suspending an evaluation rebuilds a block, a pair and a pending header.
pub(crate) const RES_SUSPEND: u64 = 3 * CELL;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_buffering() {
        assert_eq!(cell_buff(0), 0);
        assert_eq!(cell_buff(1), CELL);
        assert_eq!(cell_buff(16), 16);
        assert_eq!(cell_buff(17), 32);
    }

    #[test]
    fn small_int_fits_tagged_word() {
        // Three tag bits leave 61; the contract range must fit.
        assert!((SMALL_INT_MAX as i128) < (1i128 << 60));
    }
}
