//! `smfix`'s error type (spec.md §6 "Checksum fixer").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ROM file too small (need at least 0x014E bytes)")]
    TooSmall,
    #[error("invalid ROM size byte at 0x0148: {0:#04X}")]
    BadRomSize(u8),
}
