//! The linker's top-level error type (spec.md §7, §4.7).

use sm83asm_core::lexer::LexError;
use sm83asm_core::stream::StreamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Object(#[from] sm83asm_core::object::ObjectError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("expected {0}, found {1}")]
    Expected(&'static str, String),
    #[error("unknown attribute `{0}`")]
    UnknownAttribute(String),
    #[error("unknown memory kind `{0}`")]
    UnknownMemKind(String),
    #[error("unknown section kind `{0}`")]
    UnknownSectKind(String),
    #[error("memory `{0}` is already defined")]
    DuplicateMemory(String),
    #[error("section `{0}` is already defined")]
    DuplicateSection(String),
    #[error("section `{0}` has no `load` memory")]
    MissingLoad(String),
    #[error("section `{0}` loads into undefined memory `{1}`")]
    UnknownMemory(String, String),
    #[error("read-only memory `{0}` cannot host non-code section `{1}`")]
    ReadOnlyHostsData(String, String),
    #[error("symbol `{0}` is exported more than once (in `{1}` and `{2}`)")]
    DuplicateExport(String, String, String),
    #[error("undefined symbol `{0}`")]
    UndefinedSymbol(String),
    #[error("expression in `{0}` did not resolve to a constant")]
    NotConstant(String),
    #[error("section `{0}` ({1} bytes) does not fit in memory `{2}` ({3} bytes free)")]
    Overflow(String, u32, String, u32),
    #[error("relocation in `{0}` does not fit in {1} byte(s)")]
    RelocOutOfRange(String, u8),
    #[error("HRAM relocation in `{0}` resolves outside $FF00-$FFFF")]
    NotHram(String),
    #[error("RST relocation in `{0}` does not target a reset vector")]
    NotRstVector(String),
    #[error("{0}")]
    Fatal(String),
}
