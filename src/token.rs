//! The token model (spec.md §3 "Token (`Tok`)").
//!
//! A single tagged union covers every token flavor the lexer and the
//! replayed-body frames (macro, repeat, if-else) produce; there is no
//! separate `MacroTok`/`RepeatTok` payload type, since none of those
//! frames need anything a plain `Tok` does not already carry (see
//! DESIGN.md for why this collapses three container-generating C macros
//! into one enum).

use crate::pos::Pos;
use crate::view::View;

/// Directive keywords recognized after `@`. Matched case-sensitively
/// against the uppercased identifier per the lexer rules.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Directive {
    Db,
    Dw,
    Ds,
    Section,
    Include,
    Incbin,
    If,
    Else,
    End,
    Macro,
    Repeat,
    Struct,
    Union,
    Strfmt,
    Idfmt,
    Defined,
    Strlen,
    Tag,
    Rel,
    Arg,
    Narg,
    Shift,
    Unique,
    Print,
    Fatal,
    Create,
    Iter,
    Export,
    Static,
}

impl Directive {
    /// Case-sensitive match against the uppercased text following `@`.
    pub fn from_name(name: &str) -> Option<Directive> {
        use Directive::*;
        Some(match name {
            "DB" => Db,
            "DW" => Dw,
            "DS" => Ds,
            "SECTION" => Section,
            "INCLUDE" => Include,
            "INCBIN" => Incbin,
            "IF" => If,
            "ELSE" => Else,
            "END" => End,
            "MACRO" => Macro,
            "REPEAT" => Repeat,
            "STRUCT" => Struct,
            "UNION" => Union,
            "STRFMT" => Strfmt,
            "IDFMT" => Idfmt,
            "DEFINED" => Defined,
            "STRLEN" => Strlen,
            "TAG" => Tag,
            "REL" => Rel,
            "ARG" => Arg,
            "NARG" => Narg,
            "SHIFT" => Shift,
            "UNIQUE" => Unique,
            "PRINT" => Print,
            "FATAL" => Fatal,
            "CREATE" => Create,
            "ITER" => Iter,
            "EXPORT" => Export,
            "STATIC" => Static,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use Directive::*;
        match self {
            Db => "@DB",
            Dw => "@DW",
            Ds => "@DS",
            Section => "@SECTION",
            Include => "@INCLUDE",
            Incbin => "@INCBIN",
            If => "@IF",
            Else => "@ELSE",
            End => "@END",
            Macro => "@MACRO",
            Repeat => "@REPEAT",
            Struct => "@STRUCT",
            Union => "@UNION",
            Strfmt => "@STRFMT",
            Idfmt => "@IDFMT",
            Defined => "@DEFINED",
            Strlen => "@STRLEN",
            Tag => "@TAG",
            Rel => "@REL",
            Arg => "@ARG",
            Narg => "@NARG",
            Shift => "@SHIFT",
            Unique => "@UNIQUE",
            Print => "@PRINT",
            Fatal => "@FATAL",
            Create => "@CREATE",
            Iter => "@ITER",
            Export => "@EXPORT",
            Static => "@STATIC",
        }
    }
}

/// 16-bit register pairs, 8-bit registers, and branch conditions that the
/// lexer classifies directly (so the parser never re-parses an identifier
/// to find out it named a register).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Reg {
    Af,
    Bc,
    De,
    Hl,
    Sp,
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    Nc,
    Nz,
    Z,
}

impl Reg {
    pub fn from_word(word: &str) -> Option<Reg> {
        use Reg::*;
        Some(match word {
            "AF" => Af,
            "BC" => Bc,
            "DE" => De,
            "HL" => Hl,
            "SP" => Sp,
            "NC" => Nc,
            "NZ" => Nz,
            "A" => A,
            "B" => B,
            "C" => C,
            "D" => D,
            "E" => E,
            "H" => H,
            "L" => L,
            "Z" => Z,
            _ => return None,
        })
    }
}

/// Two-character punctuation digraphs, consulted before single-char
/// punctuation so `<<` isn't lexed as two `<` tokens.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Digraph {
    Shl,   // <<
    Asr,   // >>
    Lsr,   // ~>
    Le,    // <=
    Ge,    // >=
    Eq,    // ==
    Ne,    // !=
    And,   // &&
    Or,    // ||
    DColon, // ::
    EqColon, // =:
    DStar, // **
}

impl Digraph {
    pub fn from_chars(a: char, b: char) -> Option<Digraph> {
        use Digraph::*;
        Some(match (a, b) {
            ('<', '<') => Shl,
            ('>', '>') => Asr,
            ('~', '>') => Lsr,
            ('<', '=') => Le,
            ('>', '=') => Ge,
            ('=', '=') => Eq,
            ('!', '=') => Ne,
            ('&', '&') => And,
            ('|', '|') => Or,
            (':', ':') => DColon,
            ('=', ':') => EqColon,
            ('*', '*') => DStar,
            _ => return None,
        })
    }
}

/// The numeric radix a `NUM` token was lexed in; kept only for the lexer
/// round-trip testable property (spec.md §8), since the parsed value is
/// radix-independent.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Radix {
    Bin,
    Dec,
    Hex,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokKind {
    Eof,
    Punct(char),
    Digraph(Digraph),
    Id(View),
    Str(View),
    Num(i32, Radix),
    Directive(Directive),
    Reg(Reg),
    /// A bare backslash not followed by a newline (lexer rule 2), used by
    /// macro bodies that want a literal `\`.
    Backslash,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Tok {
    pub kind: TokKind,
    pub pos: Pos,
}

impl Tok {
    pub fn new(kind: TokKind, pos: Pos) -> Tok {
        Tok { kind, pos }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokKind::Eof)
    }

    /// Human-readable name for error messages, mirroring `smTokName`.
    pub fn name(&self) -> String {
        match self.kind {
            TokKind::Eof => "end of file".into(),
            TokKind::Id(_) => "identifier".into(),
            TokKind::Str(_) => "string".into(),
            TokKind::Num(..) => "number".into(),
            TokKind::Directive(d) => d.name().into(),
            TokKind::Digraph(d) => format!("`{}`", digraph_text(d)),
            TokKind::Reg(r) => format!("register `{:?}`", r).to_uppercase(),
            TokKind::Punct(c) => format!("`{}`", c),
            TokKind::Backslash => "`\\`".into(),
        }
    }
}

pub fn digraph_text(d: Digraph) -> &'static str {
    use Digraph::*;
    match d {
        Shl => "<<",
        Asr => ">>",
        Lsr => "~>",
        Le => "<=",
        Ge => ">=",
        Eq => "==",
        Ne => "!=",
        And => "&&",
        Or => "||",
        DColon => "::",
        EqColon => "=:",
        DStar => "**",
    }
}
