//! The file-token lexer (spec.md §4.1).
//!
//! Operates over an in-memory byte slice (the whole source file, read up
//! front — the reference implementation streams one byte at a time from a
//! `FILE*`; an in-memory slice is simpler and no less correct for files
//! small enough to be an assembler input) and produces one [`Tok`] per
//! call to [`Lexer::next`].

use crate::pos::Pos;
use crate::token::{Digraph, Directive, Radix, Reg, Tok, TokKind};
use crate::utf8;
use crate::view::{Pool, View};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexError {
    #[error("invalid UTF-8 data")]
    InvalidUtf8,
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("unrecognized directive: {0}")]
    UnknownDirective(String),
    #[error("unrecognized character escape")]
    BadEscape,
    #[error("expected single quote")]
    ExpectedQuote,
    #[error("empty number")]
    EmptyNumber,
    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

/// Owns its source bytes via `Rc` (rather than borrowing `&'a [u8]`) so a
/// `Lexer` can live inside a `File` token-stream frame without threading a
/// lifetime parameter through the whole stack — frames are pushed, held in
/// a `Vec`, and popped across arbitrarily nested includes, which a borrow
/// can't express without self-referential storage.
pub struct Lexer {
    bytes: Rc<[u8]>,
    offset: usize,
    line: u32,
    col: u32,
    file: View,
    /// One codepoint of lookahead, with its source byte length.
    stash: Option<(char, usize)>,
}

impl Lexer {
    pub fn new(bytes: &[u8], file: View) -> Self {
        Lexer { bytes: Rc::from(bytes), offset: 0, line: 1, col: 1, file, stash: None }
    }

    /// Build directly from an already-shared buffer, avoiding a copy when
    /// a `File` frame hands its bytes to a fresh lexer on include.
    pub fn from_shared(bytes: Rc<[u8]>, file: View) -> Self {
        Lexer { bytes, offset: 0, line: 1, col: 1, file, stash: None }
    }

    pub fn rewind(&mut self) {
        self.offset = 0;
        self.line = 1;
        self.col = 1;
        self.stash = None;
    }

    fn peek_char(&mut self) -> Option<char> {
        if let Some((c, _)) = self.stash {
            return Some(c);
        }
        if self.offset >= self.bytes.len() {
            return None;
        }
        let (c, len) = utf8::decode(&self.bytes[self.offset..]);
        // `len == 0` means an unrecognized lead byte; still stash it so
        // `eat_char` has something to consume (one raw byte) rather than
        // spinning forever on malformed input.
        self.stash = Some((c, len.max(1)));
        Some(c)
    }

    fn eat_char(&mut self) {
        if let Some((c, len)) = self.stash.take() {
            self.offset += len;
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    pub fn pos(&self) -> Pos {
        Pos::new(self.file, self.line, self.col)
    }

    pub fn file(&self) -> View {
        self.file
    }

    fn skip_ws_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            loop {
                match self.peek_char() {
                    None => break,
                    Some(c) if c.is_whitespace() && c != '\n' => self.eat_char(),
                    Some('\n') => self.eat_char(),
                    _ => break,
                }
            }
            if self.peek_char() == Some(';') {
                while !matches!(self.peek_char(), None | Some('\n')) {
                    self.eat_char();
                }
                continue;
            }
            if self.peek_char() == Some('\\') {
                let save = (self.offset, self.line, self.col, self.stash);
                self.eat_char();
                if self.peek_char() == Some('\n') {
                    self.eat_char();
                    continue;
                }
                self.offset = save.0;
                self.line = save.1;
                self.col = save.2;
                self.stash = save.3;
            }
            break;
        }
        Ok(())
    }

    fn push_char(text: &mut Vec<u8>, c: char) {
        let mut buf = [0u8; 4];
        let n = utf8::encode(c as u32, &mut buf);
        text.extend_from_slice(&buf[..n]);
    }

    fn parse_radix(text: &[u8], radix: u32) -> Result<i32, LexError> {
        if text.is_empty() {
            return Err(LexError::EmptyNumber);
        }
        let s = String::from_utf8_lossy(text);
        let mut value: i64 = 0;
        for ch in s.chars() {
            let digit = ch
                .to_digit(16)
                .ok_or_else(|| LexError::InvalidNumber(s.to_string()))?;
            if digit >= radix {
                return Err(LexError::InvalidNumber(s.to_string()));
            }
            value = value * radix as i64 + digit as i64;
        }
        Ok(value as i32)
    }

    /// Lex the next token.
    pub fn next(&mut self, pool: &mut Pool) -> Result<Tok, LexError> {
        self.skip_ws_and_comments()?;
        let pos = self.pos();

        let c = match self.peek_char() {
            None => {
                self.eat_char();
                return Ok(Tok::new(TokKind::Eof, pos));
            }
            Some(c) => c,
        };

        if c == '\\' {
            self.eat_char();
            return Ok(Tok::new(TokKind::Backslash, pos));
        }

        if c == '@' {
            self.eat_char();
            let first = self.peek_char();
            if matches!(first, Some(d) if d.is_ascii_digit()) {
                let mut text = Vec::new();
                while matches!(self.peek_char(), Some(d) if d.is_ascii_digit()) {
                    let d = self.peek_char().unwrap();
                    Self::push_char(&mut text, d);
                    self.eat_char();
                }
                let n = Self::parse_radix(&text, 10)?;
                return Ok(Tok::new(TokKind::Num(n, Radix::Dec), pos));
            }
            let mut text = String::new();
            while matches!(self.peek_char(), Some(d) if d.is_ascii_alphanumeric()) {
                let d = self.peek_char().unwrap();
                text.push(d.to_ascii_uppercase());
                self.eat_char();
            }
            return match Directive::from_name(&text) {
                Some(d) => Ok(Tok::new(TokKind::Directive(d), pos)),
                None => Err(LexError::UnknownDirective(text)),
            };
        }

        if c == '"' {
            self.eat_char();
            let mut text = Vec::new();
            loop {
                match self.peek_char() {
                    None => return Err(LexError::UnexpectedEof),
                    Some('"') => {
                        self.eat_char();
                        break;
                    }
                    Some('\\') => {
                        self.eat_char();
                        let esc = self.peek_char().ok_or(LexError::UnexpectedEof)?;
                        let lit = match esc {
                            'n' => '\n',
                            'r' => '\r',
                            't' => '\t',
                            '\\' => '\\',
                            '"' => '"',
                            '0' => '\0',
                            _ => return Err(LexError::BadEscape),
                        };
                        Self::push_char(&mut text, lit);
                        self.eat_char();
                    }
                    Some(ch) => {
                        Self::push_char(&mut text, ch);
                        self.eat_char();
                    }
                }
            }
            let v = pool.intern(&text);
            return Ok(Tok::new(TokKind::Str(v), pos));
        }

        if c == '\'' {
            self.eat_char();
            let raw = self.peek_char().ok_or(LexError::UnexpectedEof)?;
            let value = if raw == '\\' {
                self.eat_char();
                let esc = self.peek_char().ok_or(LexError::UnexpectedEof)?;
                let lit = match esc {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    '\\' => '\\',
                    '\'' => '\'',
                    '0' => '\0',
                    _ => return Err(LexError::BadEscape),
                };
                self.eat_char();
                lit as i32
            } else {
                self.eat_char();
                raw as i32
            };
            if self.peek_char() != Some('\'') {
                return Err(LexError::ExpectedQuote);
            }
            self.eat_char();
            return Ok(Tok::new(TokKind::Num(value, Radix::Dec), pos));
        }

        if c.is_ascii_digit() || c == '%' || c == '$' {
            let mut radix = 10u32;
            let mut radix_tag = Radix::Dec;
            if c == '%' {
                self.eat_char();
                let next = self.peek_char();
                if !matches!(next, Some('0') | Some('1')) {
                    return Ok(Tok::new(TokKind::Punct('%'), pos));
                }
                radix = 2;
                radix_tag = Radix::Bin;
            } else if c == '$' {
                self.eat_char();
                let next = self.peek_char();
                if !matches!(next, Some(d) if d.is_ascii_alphanumeric()) {
                    return Ok(Tok::new(TokKind::Punct('$'), pos));
                }
                radix = 16;
                radix_tag = Radix::Hex;
            }
            let mut text = Vec::new();
            loop {
                match self.peek_char() {
                    Some('_') => self.eat_char(),
                    Some(d) if d.is_ascii_alphanumeric() => {
                        Self::push_char(&mut text, d);
                        self.eat_char();
                    }
                    _ => break,
                }
            }
            let n = Self::parse_radix(&text, radix)?;
            return Ok(Tok::new(TokKind::Num(n, radix_tag), pos));
        }

        // Identifier run: `[A-Za-z0-9_.]+` plus any non-ASCII codepoint.
        let mut text = String::new();
        loop {
            match self.peek_char() {
                None => break,
                Some(d) if d.is_ascii() && !(d.is_ascii_alphanumeric() || d == '_' || d == '.') => {
                    break
                }
                Some(d) => {
                    text.push(d);
                    self.eat_char();
                }
            }
        }

        if text.is_empty() {
            // Not an identifier character: either a digraph or bare
            // punctuation.
            self.eat_char();
            let nc = self.peek_char();
            if let Some(nc) = nc {
                if let Some(dg) = Digraph::from_chars(c, nc) {
                    self.eat_char();
                    return Ok(Tok::new(TokKind::Digraph(dg), pos));
                }
            }
            return Ok(Tok::new(TokKind::Punct(c.to_ascii_uppercase()), pos));
        }

        if text.len() == 1 {
            let upper = text.chars().next().unwrap().to_ascii_uppercase();
            if "ABCDEHLZ".contains(upper) {
                if let Some(r) = Reg::from_word(&upper.to_string()) {
                    return Ok(Tok::new(TokKind::Reg(r), pos));
                }
            }
            let v = pool.intern_str(&text);
            return Ok(Tok::new(TokKind::Id(v), pos));
        }

        if text.len() == 2 {
            let upper = text.to_ascii_uppercase();
            if let Some(r) = Reg::from_word(&upper) {
                return Ok(Tok::new(TokKind::Reg(r), pos));
            }
        }

        let v = pool.intern_str(&text);
        Ok(Tok::new(TokKind::Id(v), pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<TokKind> {
        let mut pool = Pool::new();
        let file = pool.intern_str("test.s");
        let mut lexer = Lexer::new(src.as_bytes(), file);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next(&mut pool).unwrap();
            let done = tok.is_eof();
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn numbers_in_all_radixes() {
        let toks = lex_all("10 $1F %101");
        assert_eq!(toks[0], TokKind::Num(10, Radix::Dec));
        assert_eq!(toks[1], TokKind::Num(0x1F, Radix::Hex));
        assert_eq!(toks[2], TokKind::Num(0b101, Radix::Bin));
    }

    #[test]
    fn numbers_with_underscores() {
        let toks = lex_all("$FF_FF");
        assert_eq!(toks[0], TokKind::Num(0xFFFF, Radix::Hex));
    }

    #[test]
    fn percent_not_followed_by_binary_digit_is_modulus() {
        let toks = lex_all("%2");
        assert_eq!(toks[0], TokKind::Punct('%'));
        assert_eq!(toks[1], TokKind::Num(2, Radix::Dec));
    }

    #[test]
    fn char_literal_and_escape() {
        let toks = lex_all("'a' '\\n'");
        assert_eq!(toks[0], TokKind::Num('a' as i32, Radix::Dec));
        assert_eq!(toks[1], TokKind::Num('\n' as i32, Radix::Dec));
    }

    #[test]
    fn string_with_escapes() {
        let mut pool = Pool::new();
        let file = pool.intern_str("t.s");
        let mut lexer = Lexer::new(b"\"a\\nb\"", file);
        let tok = lexer.next(&mut pool).unwrap();
        match tok.kind {
            TokKind::Str(v) => assert_eq!(pool.as_str(v), "a\nb"),
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn directive_keywords() {
        let toks = lex_all("@DB @SECTION @MACRO");
        assert_eq!(toks[0], TokKind::Directive(Directive::Db));
        assert_eq!(toks[1], TokKind::Directive(Directive::Section));
        assert_eq!(toks[2], TokKind::Directive(Directive::Macro));
    }

    #[test]
    fn macro_arg_selector_number() {
        let toks = lex_all("@1");
        assert_eq!(toks[0], TokKind::Num(1, Radix::Dec));
    }

    #[test]
    fn registers_and_conditions() {
        let toks = lex_all("A BC NZ HL");
        assert_eq!(toks[0], TokKind::Reg(Reg::A));
        assert_eq!(toks[1], TokKind::Reg(Reg::Bc));
        assert_eq!(toks[2], TokKind::Reg(Reg::Nz));
        assert_eq!(toks[3], TokKind::Reg(Reg::Hl));
    }

    #[test]
    fn digraphs_before_single_punct() {
        let toks = lex_all("<< >= :: **");
        assert_eq!(toks[0], TokKind::Digraph(Digraph::Shl));
        assert_eq!(toks[1], TokKind::Digraph(Digraph::Ge));
        assert_eq!(toks[2], TokKind::Digraph(Digraph::DColon));
        assert_eq!(toks[3], TokKind::Digraph(Digraph::DStar));
    }

    #[test]
    fn line_continuation_is_consumed() {
        let toks = lex_all("1 + \\\n2");
        assert_eq!(toks[0], TokKind::Num(1, Radix::Dec));
        assert_eq!(toks[1], TokKind::Punct('+'));
        assert_eq!(toks[2], TokKind::Num(2, Radix::Dec));
    }

    #[test]
    fn comment_to_end_of_line() {
        let toks = lex_all("1 ; comment\n2");
        assert_eq!(toks[0], TokKind::Num(1, Radix::Dec));
        assert_eq!(toks[1], TokKind::Num(2, Radix::Dec));
    }

    #[test]
    fn identifier_allows_dot_and_underscore() {
        let toks = lex_all(".local_label");
        match toks[0] {
            TokKind::Id(_) => {}
            _ => panic!("expected identifier"),
        }
    }
}
