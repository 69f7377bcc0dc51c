//! The assembler's top-level error type (spec.md §7).

use crate::encode::EncodeError;
use crate::operand::OperandError;
use sm83asm_core::expr::EvalError;
use sm83asm_core::lexer::LexError;
use sm83asm_core::stream::StreamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AsmError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Operand(#[from] OperandError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("unknown mnemonic or directive: {0}")]
    UnknownMnemonic(String),
    #[error("expected {0}, found {1}")]
    Expected(&'static str, String),
    #[error("label `{0}` is already defined")]
    DuplicateLabel(String),
    #[error("expression did not resolve to a constant")]
    NotConstant,
    #[error("@REPEAT count must be a non-negative constant")]
    BadRepeatCount,
    #[error("could not find include file `{0}`")]
    IncludeNotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("token-stream depth exceeded")]
    TooDeep,
    #[error("unterminated block: missing @END")]
    UnterminatedBlock,
    #[error("{0}")]
    Fatal(String),
}
