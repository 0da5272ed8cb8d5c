#![warn(missing_docs)]
//! Instruction set and token primitives shared by the runic runtime.
//!
//! The bytecode is a stream of single-character primitive operators plus
//! embedded block, text and token literals. This crate owns the opcode
//! enumeration (primitives, accelerators and annotation operators), the
//! character mapping used by the serialized form, and the validation rules
//! for tokens and store keys.

mod opcode;
mod token;

pub use opcode::Opcode;
pub use token::{
    valid_key, valid_text_char, valid_token, valid_token_char, InvalidToken, Token, KEY_MAX_LEN,
    TOKEN_MAX_LEN,
};
