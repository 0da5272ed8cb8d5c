//! Evaluation state and substructural metadata.

/// Sum tag: which branch a sum value inhabits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SumTag {
    /// The left alternative.
    Left,
    /// The right alternative.
    Right,
}

impl SumTag {
    /// The opposite branch.
    pub const fn flip(self) -> SumTag {
        match self {
            SumTag::Left => SumTag::Right,
            SumTag::Right => SumTag::Left,
        }
    }

    /// Whether this is the right branch.
    pub const fn is_right(self) -> bool {
        matches!(self, SumTag::Right)
    }
}

bitflags::bitflags! {
    /// Substructural attributes observed while copying or dropping.
    ///
    /// These are computed by traversal when a copy or drop actually
    /// happens; the representation does not maintain them eagerly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Substruct: u8 {
        /// Contains an affine (non-copyable) block.
        const AFFINE = 1 << 0;
        /// Contains a relevant (non-droppable) block.
        const RELEVANT = 1 << 1;
        /// Contains a pending computation.
        const PENDING = 1 << 2;
    }
}

impl Substruct {
    /// Whether a value with these attributes may be copied.
    pub const fn copyable(self) -> bool {
        !self.intersects(Substruct::AFFINE.union(Substruct::PENDING))
    }

    /// Whether a value with these attributes may be dropped.
    pub const fn droppable(self) -> bool {
        !self.intersects(Substruct::RELEVANT.union(Substruct::PENDING))
    }
}

/// Resulting state of one evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EvalState {
    /// Evaluation finished; the pending wrapper has been discarded.
    Done,
    /// The effort quota expired; the residual computation was re-wrapped
    /// as a pending value and a further step will resume it.
    Pending,
}

impl EvalState {
    /// Whether more stepping is required.
    pub const fn is_pending(&self) -> bool {
        matches!(self, EvalState::Pending)
    }
}

/// Memory statistics for a context's space.
///
/// Counter semantics follow the collector: `compactions` increments per
/// collection, `bytes_compacted` accumulates live bytes copied, and
/// `bytes_collected` accumulates garbage reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemStats {
    /// Usable bytes per semispace half.
    pub capacity: u64,
    /// Bytes currently allocated in the active half.
    pub in_use: u64,
    /// Number of compactions performed.
    pub compactions: u64,
    /// Live bytes after the most recent compaction.
    pub live_after_gc: u64,
    /// Cumulative live bytes copied by the collector.
    pub bytes_compacted: u64,
    /// Cumulative garbage bytes reclaimed by the collector.
    pub bytes_collected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substruct_policies() {
        assert!(Substruct::empty().copyable());
        assert!(Substruct::empty().droppable());
        assert!(!Substruct::AFFINE.copyable());
        assert!(Substruct::AFFINE.droppable());
        assert!(Substruct::RELEVANT.copyable());
        assert!(!Substruct::RELEVANT.droppable());
        assert!(!Substruct::PENDING.copyable());
        assert!(!Substruct::PENDING.droppable());
    }

    #[test]
    fn sum_tag_flip() {
        assert_eq!(SumTag::Left.flip(), SumTag::Right);
        assert!(SumTag::Right.is_right());
    }
}
