use crate::view::{Pool, View};
use std::fmt;

/// A source location: the file name (an interned view) plus 1-based line
/// and column. Carried on every token and every declaration site so
/// diagnostics can be rendered as `file:line:col: message`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Pos {
    pub file: View,
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub fn new(file: View, line: u32, col: u32) -> Self {
        Pos { file, line, col }
    }

    /// Render as `file:line:col: ` the way every fatal diagnostic is
    /// prefixed per the error handling design.
    pub fn display<'p>(&self, pool: &'p Pool) -> PosDisplay<'p> {
        PosDisplay { pos: *self, pool }
    }
}

pub struct PosDisplay<'p> {
    pos: Pos,
    pool: &'p Pool,
}

impl<'p> fmt::Display for PosDisplay<'p> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.pool.as_str(self.pos.file),
            self.pos.line,
            self.pos.col
        )
    }
}
