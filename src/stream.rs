//! The token-stream stack (spec.md §4.2).
//!
//! A bounded stack of frames; the top frame is the current source of
//! tokens. `peek`/`eat` transparently pop a finished frame and retry on
//! the new top, except for the root `File` frame, which instead yields a
//! persistent `EOF`.
//!
//! `File` lives here (not in `crates/smasm`) because `smold`'s config
//! parser pushes its own root `File` frame over the same lexer (spec.md
//! §4.7 "reuses the same lexer"). `Macro`/`Repeat`/`Fmt`/`IfElse` carry
//! their substitution logic here too, since it is intrinsic to how each
//! frame answers `peek`/`eat` and does not need dispatcher context — only
//! the *tables* that decide when to construct one (macro definitions,
//! `@IF` condition results) belong to `crates/smasm`.

use crate::lexer::{LexError, Lexer};
use crate::pos::Pos;
use crate::token::{Directive, Radix, Tok, TokKind};
use crate::view::{Pool, View};
use std::collections::VecDeque;
use std::rc::Rc;
use thiserror::Error;

/// spec.md §5 "Bounded stacks": "the token-stream depth is bounded at a
/// small constant (≤64); exceeding it is fatal."
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("too many open files")]
    TooManyOpenFrames,
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("@SHIFT on an empty argument queue")]
    ShiftEmptyQueue,
    #[error("@ARG used with no remaining argument")]
    ArgOutsideMacro,
}

/// A captured, pre-tokenized body plus a read cursor — shared shape behind
/// macro bodies, repeat bodies, and if-captured bodies (spec.md §4.2).
#[derive(Clone)]
struct Body {
    toks: Rc<[Tok]>,
    index: usize,
}

impl Body {
    fn new(toks: Rc<[Tok]>) -> Self {
        Body { toks, index: 0 }
    }

    fn peek(&self) -> Option<Tok> {
        self.toks.get(self.index).copied()
    }

    fn eat(&mut self) -> Option<Tok> {
        let t = self.peek();
        if t.is_some() {
            self.index += 1;
        }
        t
    }

    fn rewind(&mut self) {
        self.index = 0;
    }
}

/// Owns a file's lexer. Supports `rewind()` for the pass-2 restart
/// (spec.md §4.4 "Pass 2... rewinds the root stream").
pub struct FileFrame {
    lexer: Lexer,
    stash: Option<Tok>,
}

impl FileFrame {
    pub fn new(bytes: &[u8], file: View) -> Self {
        FileFrame {
            lexer: Lexer::new(bytes, file),
            stash: None,
        }
    }

    pub fn from_shared(bytes: Rc<[u8]>, file: View) -> Self {
        FileFrame {
            lexer: Lexer::from_shared(bytes, file),
            stash: None,
        }
    }

    fn peek(&mut self, pool: &mut Pool) -> Result<Tok, LexError> {
        if self.stash.is_none() {
            self.stash = Some(self.lexer.next(pool)?);
        }
        Ok(self.stash.unwrap())
    }

    fn eat(&mut self, pool: &mut Pool) -> Result<Tok, LexError> {
        let t = self.peek(pool)?;
        self.stash = None;
        Ok(t)
    }

    fn pos(&self) -> Pos {
        self.lexer.pos()
    }

    pub fn rewind(&mut self) {
        self.lexer.rewind();
        self.stash = None;
    }
}

/// Replays a macro body, splicing in argument tokens at `@ARG`, dequeuing
/// at `@SHIFT`, and reporting the remaining count at `@NARG` (spec.md §4.2
/// "MACRO... On encountering `@SHIFT`, the front argument list is
/// dequeued. `@ARG` expands to the tokens of the current argument;
/// advancing across a multi-token argument is transparent to the
/// parser."). `@UNIQUE` expands to the call's nonce as a constant, for use
/// in `@IDFMT`-built unique label names.
pub struct MacroFrame {
    pub name: View,
    body: Body,
    args: VecDeque<Rc<[Tok]>>,
    arg_cursor: Option<Body>,
    nonce: u32,
    call_pos: Pos,
    pending: Option<Tok>,
}

impl MacroFrame {
    pub fn new(name: View, body: Rc<[Tok]>, args: Vec<Rc<[Tok]>>, nonce: u32, call_pos: Pos) -> Self {
        MacroFrame {
            name,
            body: Body::new(body),
            args: args.into(),
            arg_cursor: None,
            nonce,
            call_pos,
            pending: None,
        }
    }

    fn fill(&mut self) -> Result<(), StreamError> {
        if self.pending.is_some() {
            return Ok(());
        }
        loop {
            if let Some(cur) = self.arg_cursor.as_mut() {
                if let Some(t) = cur.eat() {
                    self.pending = Some(t);
                    return Ok(());
                }
                self.arg_cursor = None;
            }
            let t = match self.body.eat() {
                Some(t) => t,
                None => {
                    self.pending = Some(Tok::new(TokKind::Eof, self.call_pos));
                    return Ok(());
                }
            };
            match t.kind {
                TokKind::Directive(Directive::Arg) => {
                    let toks = self.args.pop_front().ok_or(StreamError::ArgOutsideMacro)?;
                    self.arg_cursor = Some(Body::new(toks));
                }
                TokKind::Directive(Directive::Shift) => {
                    self.args.pop_front().ok_or(StreamError::ShiftEmptyQueue)?;
                }
                TokKind::Directive(Directive::Narg) => {
                    self.pending = Some(Tok::new(TokKind::Num(self.args.len() as i32, Radix::Dec), t.pos));
                    return Ok(());
                }
                TokKind::Directive(Directive::Unique) => {
                    self.pending = Some(Tok::new(TokKind::Num(self.nonce as i32, Radix::Dec), t.pos));
                    return Ok(());
                }
                _ => {
                    self.pending = Some(t);
                    return Ok(());
                }
            }
        }
    }

    fn peek(&mut self) -> Result<Tok, StreamError> {
        self.fill()?;
        Ok(self.pending.unwrap())
    }

    fn eat(&mut self) -> Result<Tok, StreamError> {
        self.fill()?;
        Ok(self.pending.take().unwrap())
    }

    fn pos(&self) -> Pos {
        self.pending.map(|t| t.pos).unwrap_or(self.call_pos)
    }
}

/// Replays a body `count` times, expanding `@ITER` to the 0-based
/// iteration index (spec.md §4.2 "REPEAT... An `@ITER` sub-token expands
/// to the current iteration index").
pub struct RepeatFrame {
    body: Body,
    count: u32,
    iter: u32,
    start_pos: Pos,
    pending: Option<Tok>,
}

impl RepeatFrame {
    pub fn new(toks: Rc<[Tok]>, count: u32, start_pos: Pos) -> Self {
        RepeatFrame {
            body: Body::new(toks),
            count,
            iter: 0,
            start_pos,
            pending: None,
        }
    }

    fn fill(&mut self) {
        if self.pending.is_some() {
            return;
        }
        loop {
            if self.count == 0 {
                self.pending = Some(Tok::new(TokKind::Eof, self.start_pos));
                return;
            }
            match self.body.eat() {
                Some(t) => {
                    if let TokKind::Directive(Directive::Iter) = t.kind {
                        self.pending =
                            Some(Tok::new(TokKind::Num(self.iter as i32, Radix::Dec), t.pos));
                        return;
                    }
                    self.pending = Some(t);
                    return;
                }
                None => {
                    self.iter += 1;
                    if self.iter >= self.count {
                        self.pending = Some(Tok::new(TokKind::Eof, self.start_pos));
                        return;
                    }
                    self.body.rewind();
                }
            }
        }
    }

    fn peek(&mut self) -> Tok {
        self.fill();
        self.pending.unwrap()
    }

    fn eat(&mut self) -> Tok {
        self.fill();
        self.pending.take().unwrap()
    }

    fn pos(&self) -> Pos {
        self.pending.map(|t| t.pos).unwrap_or(self.start_pos)
    }
}

/// Yields exactly one synthesized token (from `@STRFMT`/`@IDFMT`), then
/// `EOF` forever (spec.md §4.2 "FMT: yields exactly one synthesized
/// token... then yields EOF").
pub struct FmtFrame {
    tok: Option<Tok>,
    eof_pos: Pos,
}

impl FmtFrame {
    pub fn new(tok: Tok) -> Self {
        FmtFrame {
            eof_pos: tok.pos,
            tok: Some(tok),
        }
    }

    fn peek(&self) -> Tok {
        self.tok.unwrap_or(Tok::new(TokKind::Eof, self.eof_pos))
    }

    fn eat(&mut self) -> Tok {
        let t = self.peek();
        self.tok = None;
        t
    }

    fn pos(&self) -> Pos {
        self.tok.map(|t| t.pos).unwrap_or(self.eof_pos)
    }
}

/// Replays the tokens captured for whichever `@IF`/`@ELSE` branch was
/// selected (spec.md §4.2 "IFELSE: replays the sequence of tokens captured
/// while the `@IF`/`@ELSE`/`@END` engine decided which branch to keep.").
pub struct IfElseFrame {
    body: Body,
    eof_pos: Pos,
}

impl IfElseFrame {
    pub fn new(toks: Rc<[Tok]>, eof_pos: Pos) -> Self {
        IfElseFrame {
            body: Body::new(toks),
            eof_pos,
        }
    }

    fn peek(&self) -> Tok {
        self.body.peek().unwrap_or(Tok::new(TokKind::Eof, self.eof_pos))
    }

    fn eat(&mut self) -> Tok {
        self.body.eat().unwrap_or(Tok::new(TokKind::Eof, self.eof_pos))
    }

    fn pos(&self) -> Pos {
        self.body.peek().map(|t| t.pos).unwrap_or(self.eof_pos)
    }
}

pub enum Frame {
    File(FileFrame),
    Macro(MacroFrame),
    Repeat(RepeatFrame),
    Fmt(FmtFrame),
    IfElse(IfElseFrame),
}

impl Frame {
    fn peek(&mut self, pool: &mut Pool) -> Result<Tok, StreamError> {
        match self {
            Frame::File(f) => Ok(f.peek(pool)?),
            Frame::Macro(f) => f.peek(),
            Frame::Repeat(f) => Ok(f.peek()),
            Frame::Fmt(f) => Ok(f.peek()),
            Frame::IfElse(f) => Ok(f.peek()),
        }
    }

    fn eat(&mut self, pool: &mut Pool) -> Result<Tok, StreamError> {
        match self {
            Frame::File(f) => Ok(f.eat(pool)?),
            Frame::Macro(f) => f.eat(),
            Frame::Repeat(f) => Ok(f.eat()),
            Frame::Fmt(f) => Ok(f.eat()),
            Frame::IfElse(f) => Ok(f.eat()),
        }
    }

    fn pos(&self) -> Pos {
        match self {
            Frame::File(f) => f.pos(),
            Frame::Macro(f) => f.pos(),
            Frame::Repeat(f) => f.pos(),
            Frame::Fmt(f) => f.pos(),
            Frame::IfElse(f) => f.pos(),
        }
    }
}

/// The bounded stack itself. The bottom frame is always `File` (the root
/// source file); `peek`/`eat` pop any higher frame once it reports `EOF`,
/// but never pop the root.
pub struct TokStream {
    frames: Vec<Frame>,
}

impl TokStream {
    pub fn new(root: FileFrame) -> Self {
        TokStream {
            frames: vec![Frame::File(root)],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, frame: Frame) -> Result<(), StreamError> {
        if self.frames.len() >= MAX_DEPTH {
            return Err(StreamError::TooManyOpenFrames);
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pos(&self) -> Pos {
        self.frames.last().expect("token stream is never empty").pos()
    }

    pub fn peek(&mut self, pool: &mut Pool) -> Result<Tok, StreamError> {
        loop {
            let top = self.frames.len() - 1;
            let tok = self.frames[top].peek(pool)?;
            if tok.is_eof() && top > 0 {
                self.frames.pop();
                continue;
            }
            return Ok(tok);
        }
    }

    pub fn eat(&mut self, pool: &mut Pool) -> Result<Tok, StreamError> {
        loop {
            let top = self.frames.len() - 1;
            let tok = self.frames[top].peek(pool)?;
            if tok.is_eof() && top > 0 {
                self.frames.pop();
                continue;
            }
            return self.frames[top].eat(pool);
        }
    }

    /// Rewind between assembler passes: drop every pushed frame and rewind
    /// the root `FILE` frame (spec.md §4.4).
    pub fn rewind_root(&mut self) {
        self.frames.truncate(1);
        if let Frame::File(f) = &mut self.frames[0] {
            f.rewind();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokKind;

    fn ident(pool: &mut Pool, s: &str, pos: Pos) -> Tok {
        Tok::new(TokKind::Id(pool.intern_str(s)), pos)
    }

    fn dummy_pos() -> Pos {
        Pos::new(View::EMPTY, 1, 1)
    }

    #[test]
    fn file_frame_reads_underlying_lexer() {
        let mut pool = Pool::new();
        let file = pool.intern_str("main.s");
        let root = FileFrame::new(b"LD A, 1", file);
        let mut stream = TokStream::new(root);
        let t = stream.eat(&mut pool).unwrap();
        assert!(matches!(t.kind, TokKind::Id(_)));
    }

    #[test]
    fn macro_frame_substitutes_each_arg_call() {
        let mut pool = Pool::new();
        let pos = dummy_pos();
        let body: Rc<[Tok]> = vec![
            ident(&mut pool, "ADD", pos),
            Tok::new(TokKind::Directive(Directive::Arg), pos),
            ident(&mut pool, "ADD", pos),
            Tok::new(TokKind::Directive(Directive::Arg), pos),
        ]
        .into();
        let args = vec![
            vec![Tok::new(TokKind::Num(1, Radix::Dec), pos)].into(),
            vec![Tok::new(TokKind::Num(2, Radix::Dec), pos)].into(),
        ];
        let mut frame = MacroFrame::new(pool.intern_str("add2"), body, args, 0, pos);
        let mut got = Vec::new();
        loop {
            let t = frame.eat().unwrap();
            if t.is_eof() {
                break;
            }
            got.push(t.kind);
        }
        assert_eq!(
            got,
            vec![
                TokKind::Id(pool.intern_str("ADD")),
                TokKind::Num(1, Radix::Dec),
                TokKind::Id(pool.intern_str("ADD")),
                TokKind::Num(2, Radix::Dec),
            ]
        );
    }

    #[test]
    fn shift_dequeues_without_substitution() {
        let pos = dummy_pos();
        let body: Rc<[Tok]> = vec![Tok::new(TokKind::Directive(Directive::Shift), pos)].into();
        let args = vec![
            vec![Tok::new(TokKind::Num(1, Radix::Dec), pos)].into(),
            vec![Tok::new(TokKind::Num(2, Radix::Dec), pos)].into(),
        ];
        let mut frame = MacroFrame::new(View::EMPTY, body, args, 0, pos);
        let t = frame.eat().unwrap();
        assert!(t.is_eof());
    }

    #[test]
    fn narg_reports_remaining_count() {
        let pos = dummy_pos();
        let body: Rc<[Tok]> = vec![Tok::new(TokKind::Directive(Directive::Narg), pos)].into();
        let args = vec![
            vec![Tok::new(TokKind::Num(1, Radix::Dec), pos)].into(),
            vec![Tok::new(TokKind::Num(2, Radix::Dec), pos)].into(),
        ];
        let mut frame = MacroFrame::new(View::EMPTY, body, args, 0, pos);
        let t = frame.eat().unwrap();
        assert_eq!(t.kind, TokKind::Num(2, Radix::Dec));
    }

    #[test]
    fn repeat_frame_yields_iter_each_pass() {
        let pos = dummy_pos();
        let body: Rc<[Tok]> = vec![Tok::new(TokKind::Directive(Directive::Iter), pos)].into();
        let mut frame = RepeatFrame::new(body, 3, pos);
        let mut got = Vec::new();
        loop {
            let t = frame.eat();
            if t.is_eof() {
                break;
            }
            got.push(t.kind);
        }
        assert_eq!(
            got,
            vec![
                TokKind::Num(0, Radix::Dec),
                TokKind::Num(1, Radix::Dec),
                TokKind::Num(2, Radix::Dec),
            ]
        );
    }

    #[test]
    fn repeat_of_zero_yields_eof_immediately() {
        let pos = dummy_pos();
        let body: Rc<[Tok]> = vec![Tok::new(TokKind::Directive(Directive::Iter), pos)].into();
        let mut frame = RepeatFrame::new(body, 0, pos);
        assert!(frame.eat().is_eof());
    }

    #[test]
    fn fmt_frame_yields_one_token_then_eof() {
        let mut pool = Pool::new();
        let pos = dummy_pos();
        let mut frame = FmtFrame::new(ident(&mut pool, "L_05", pos));
        assert!(!frame.eat().is_eof());
        assert!(frame.eat().is_eof());
        assert!(frame.eat().is_eof());
    }

    #[test]
    fn pushing_past_max_depth_is_fatal() {
        let mut pool = Pool::new();
        let file = pool.intern_str("main.s");
        let mut stream = TokStream::new(FileFrame::new(b"", file));
        for _ in 1..MAX_DEPTH {
            let tok = Tok::new(TokKind::Id(pool.intern_str("x")), dummy_pos());
            stream.push(Frame::Fmt(FmtFrame::new(tok))).unwrap();
        }
        assert_eq!(stream.depth(), MAX_DEPTH);
        let tok = Tok::new(TokKind::Id(pool.intern_str("y")), dummy_pos());
        assert!(matches!(
            stream.push(Frame::Fmt(FmtFrame::new(tok))),
            Err(StreamError::TooManyOpenFrames)
        ));
    }

    #[test]
    fn finished_frame_pops_transparently() {
        let mut pool = Pool::new();
        let file = pool.intern_str("main.s");
        let mut stream = TokStream::new(FileFrame::new(b"NOP", file));
        let tok = ident(&mut pool, "inner", dummy_pos());
        stream.push(Frame::Fmt(FmtFrame::new(tok))).unwrap();
        let first = stream.eat(&mut pool).unwrap();
        assert!(matches!(first.kind, TokKind::Id(_)));
        assert_eq!(stream.depth(), 1);
        let second = stream.eat(&mut pool).unwrap();
        assert!(matches!(second.kind, TokKind::Id(_)));
    }

    #[test]
    fn rewind_root_drops_pushed_frames_and_resets_lexer() {
        let mut pool = Pool::new();
        let file = pool.intern_str("main.s");
        let mut stream = TokStream::new(FileFrame::new(b"NOP NOP", file));
        let _ = stream.eat(&mut pool).unwrap();
        stream.rewind_root();
        assert_eq!(stream.depth(), 1);
        let t = stream.eat(&mut pool).unwrap();
        assert!(matches!(t.kind, TokKind::Id(_)));
    }
}
