//! A runtime for a small, purely functional concatenative bytecode.
//!
//! Values are linear: every heap cell has exactly one owner, so
//! logically immutable operations mutate in place. Each [`Context`]
//! owns a slot in a contiguous arena with a compacting semispace
//! collector; primitives follow a reserve-then-allocate discipline that
//! keeps them correct across compaction. Evaluation is resumable: an
//! apply builds a pending value and [`Context::step_eval`] drains it
//! under an effort quota measured in collection cycles.
//!
//! ```
//! use runic_vm::prelude::*;
//!
//! let env = Environment::new();
//! let mut cx = env.create_context(3)?;
//! cx.intro_i32(41)?;
//! cx.intro_block("#1+", BlockOptions::default())?;
//! cx.apply()?;
//! assert_eq!(cx.step_eval(1_000)?, EvalState::Done);
//! assert_eq!(cx.peek_i32()?, 42);
//! # Ok::<(), RuntimeError>(())
//! ```
//!
//! [`Context`]: crate::context::Context
//! [`Context::step_eval`]: crate::context::Context::step_eval

mod arena;
pub mod consts;
pub mod context;
pub mod env;
pub mod error;
pub mod parse;
pub mod state;
pub mod storage;
mod value;

pub mod prelude {
    //! Convenient single import for the public surface.

    pub use runic_asm::{valid_key, valid_text_char, valid_token, Opcode, Token};

    pub use crate::context::Context;
    pub use crate::env::Environment;
    pub use crate::error::{ErrorMask, RuntimeError, TypeFault, VmResult};
    pub use crate::parse::BlockOptions;
    pub use crate::state::{EvalState, MemStats, Substruct, SumTag};
    pub use crate::storage::{MemoryStore, Store, StoreError};
}
