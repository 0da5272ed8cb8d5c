//! Runtime error implementation.
//!
//! Every fallible operation returns a typed [`RuntimeError`]; contexts
//! additionally latch the first error they observe, and the latched state
//! is reported through the C-style [`ErrorMask`] bitmask.

use thiserror::Error;

bitflags::bitflags! {
    /// Bitmask form of the error taxonomy, as reported by
    /// [`Context::error`](crate::context::Context::error).
    ///
    /// `ErrorMask::empty()` means no error has latched. The `QUOTA` bit is
    /// reserved for wire-level parity: quota expiry is reported as
    /// [`EvalState::Pending`](crate::state::EvalState) rather than latched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ErrorMask: u32 {
        /// Bad arguments; avoidable caller error.
        const INVALID_ARGUMENT = 1 << 0;
        /// Reached a limit of the implementation.
        const UNIMPLEMENTED = 1 << 1;
        /// Store or filesystem layer error.
        const STORE = 1 << 2;
        /// Host allocation failure.
        const OUT_OF_MEMORY = 1 << 3;
        /// Context arena exhausted.
        const CONTEXT_FULL = 1 << 4;
        /// Caller buffer too small.
        const BUFFER_TOO_SMALL = 1 << 5;
        /// Transaction state conflict.
        const CONFLICT = 1 << 6;
        /// Evaluation effort quota reached.
        const QUOTA = 1 << 7;
        /// Runtime type mismatch.
        const TYPE = 1 << 8;
    }
}

/// Reason detail for a runtime type fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeFault {
    /// The operand was not a product.
    #[error("expected a product")]
    ExpectedProduct,
    /// The operand was not a sum.
    #[error("expected a sum")]
    ExpectedSum,
    /// The operand was not unit.
    #[error("expected unit")]
    ExpectedUnit,
    /// The operand was not an integer.
    #[error("expected an integer")]
    ExpectedInteger,
    /// The operand was not a block.
    #[error("expected a block")]
    ExpectedBlock,
    /// The operand was not a sealed value.
    #[error("expected a sealed value")]
    ExpectedSealed,
    /// The operand was not a pending computation.
    #[error("expected a pending computation")]
    ExpectedPending,
    /// The operand was not a list of the required elements.
    #[error("expected a list")]
    ExpectedList,
    /// Division by zero.
    #[error("division by zero")]
    DivideByZero,
    /// An assertion operator observed in-left.
    #[error("assertion failed")]
    AssertFailed,
    /// An unseal token did not match the value's sealer.
    #[error("seal mismatch")]
    SealMismatch,
    /// Copy of an affine or pending value without permission.
    #[error("copy of an affine value")]
    CopyAffine,
    /// Drop of a relevant or pending value without permission.
    #[error("drop of a relevant value")]
    DropRelevant,
}

/// Runtime error variants.
///
/// All primitive operations are fail-safe: returning an error implies the
/// context's primary value was left unchanged, except where an operation
/// documents partial progress (incremental reads).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RuntimeError {
    /// Bad arguments; avoidable caller error.
    #[error("invalid argument")]
    InvalidArgument,
    /// Reached a limit of the implementation.
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),
    /// Store or filesystem layer error.
    #[error("store layer failure")]
    Store,
    /// The host refused the backing allocation.
    #[error("host allocation failure")]
    OutOfMemory,
    /// The context arena cannot satisfy the reservation, even after
    /// compaction.
    #[error("context memory exhausted")]
    ContextFull,
    /// The caller buffer cannot hold the result; `needed` bytes required.
    #[error("buffer too small: {needed} bytes required")]
    BufferTooSmall {
        /// Required buffer size in bytes.
        needed: usize,
    },
    /// The transaction lost a read-write race and has been aborted.
    #[error("transaction conflict")]
    Conflict,
    /// Runtime type mismatch.
    #[error("type fault: {0}")]
    Type(#[from] TypeFault),
}

impl RuntimeError {
    /// The bitmask classification of this error.
    pub const fn mask(&self) -> ErrorMask {
        match self {
            RuntimeError::InvalidArgument => ErrorMask::INVALID_ARGUMENT,
            RuntimeError::Unimplemented(_) => ErrorMask::UNIMPLEMENTED,
            RuntimeError::Store => ErrorMask::STORE,
            RuntimeError::OutOfMemory => ErrorMask::OUT_OF_MEMORY,
            RuntimeError::ContextFull => ErrorMask::CONTEXT_FULL,
            RuntimeError::BufferTooSmall { .. } => ErrorMask::BUFFER_TOO_SMALL,
            RuntimeError::Conflict => ErrorMask::CONFLICT,
            RuntimeError::Type(_) => ErrorMask::TYPE,
        }
    }
}

/// Crate-wide result alias.
pub type VmResult<T> = core::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_are_disjoint() {
        let errors = [
            RuntimeError::InvalidArgument,
            RuntimeError::Unimplemented("x"),
            RuntimeError::Store,
            RuntimeError::OutOfMemory,
            RuntimeError::ContextFull,
            RuntimeError::BufferTooSmall { needed: 1 },
            RuntimeError::Conflict,
            RuntimeError::Type(TypeFault::ExpectedSum),
        ];
        let mut seen = ErrorMask::empty();
        for e in errors {
            assert!(!seen.intersects(e.mask()));
            seen |= e.mask();
        }
    }

    #[test]
    fn type_faults_convert() {
        let e: RuntimeError = TypeFault::DivideByZero.into();
        assert_eq!(e.mask(), ErrorMask::TYPE);
    }
}
