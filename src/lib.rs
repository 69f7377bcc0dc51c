//! Shared data model for the sm83 assembler/linker toolchain: interning,
//! tokens, expressions, symbols, sections, and the object file codec.
//!
//! `crates/smasm` and `crates/smold` both depend on this crate so the two
//! tools agree on the wire format and the token-stream frame shapes
//! without duplicating them.

pub mod diagnostic;
pub mod expr;
pub mod lexer;
pub mod object;
pub mod pos;
pub mod sect;
pub mod stream;
pub mod sym;
pub mod token;
pub mod utf8;
pub mod view;
