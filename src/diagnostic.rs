//! The diagnostics model (SPEC_FULL.md §3 "Diagnostics model", §7).
//!
//! Every fatal condition in the toolchain carries a [`Diagnostic`]: a kind,
//! a source position, and a message. It is the single payload rendered as
//! `file:line:col: message` from the lexer through the dispatcher through
//! the CLI binaries (spec.md §7).

use crate::pos::Pos;
use crate::view::Pool;
use std::fmt;

/// The seven error kinds named in spec.md §7, not further subdivided —
/// each crate's `thiserror::Error` enum carries the specific trigger as
/// its own variant and maps into one of these for reporting.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DiagnosticKind {
    Lex,
    Parse,
    Semantic,
    Macro,
    Config,
    Io,
    Internal,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::Lex => "lex error",
            DiagnosticKind::Parse => "parse error",
            DiagnosticKind::Semantic => "semantic error",
            DiagnosticKind::Macro => "macro error",
            DiagnosticKind::Config => "config error",
            DiagnosticKind::Io => "io error",
            DiagnosticKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// A `(kind, position, message)` triple. `Pos` needs a `Pool` to render
/// its file name, so `Diagnostic` only borrows the pool when displayed,
/// not when constructed — it is cheap to build and propagate with `?`.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub pos: Pos,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, pos: Pos, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            pos,
            message: message.into(),
        }
    }

    /// Render as `file:line:col: message`, the fatal-exit format from
    /// spec.md §7.
    pub fn display<'p>(&'p self, pool: &'p Pool) -> DiagnosticDisplay<'p> {
        DiagnosticDisplay { diag: self, pool }
    }
}

pub struct DiagnosticDisplay<'p> {
    diag: &'p Diagnostic,
    pool: &'p Pool,
}

impl<'p> fmt::Display for DiagnosticDisplay<'p> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.diag.pos.display(self.pool),
            self.diag.message
        )
    }
}
