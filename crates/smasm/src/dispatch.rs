//! The statement-level driver (spec.md §4.4): reads one logical line at a
//! time, resolves label definitions, handles directives, and dispatches
//! mnemonics to the encoder. Runs twice (spec.md §4.4 "Two passes").
//!
//! Not grounded on the retrieved `original_source`'s own dispatcher —
//! `src/smasm/main.c`'s `pass()` is an empty stub in the kept source, and
//! `state.c` only provides the surrounding plumbing (`SYMS`, `SECTS`,
//! `scope`, `emit`) the real dispatcher would have closed over. This
//! module rebuilds that closure from spec.md §4.4's prose and the data
//! model the rest of this crate already established.

use crate::encode::{self, PendingImm};
use crate::error::AsmError;
use crate::fmt::{self, FmtArg};
use crate::label;
use crate::mne;
use crate::operand::{self, ExprCtx, Operand};
use crate::state::{AssemblerContext, MacroDef};
use sm83asm_core::expr;
use sm83asm_core::pos::Pos;
use sm83asm_core::sect::{Reloc, RelocFlags};
use sm83asm_core::stream::{FileFrame, Frame, FmtFrame, IfElseFrame, MacroFrame, RepeatFrame, TokStream};
use sm83asm_core::sym::{Sym, SymFlags};
use sm83asm_core::token::{Directive, Tok, TokKind};
use sm83asm_core::view::View;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Builds an `ExprCtx` borrowing `self.ctx.syms`. Always bind the result to
/// its own `let` before separately borrowing `self.ctx.pool`/`self.stream`
/// mutably — `section`/`pc` are read out first so no borrow of `self.ctx`
/// as a whole outlives the macro's own expansion.
macro_rules! ectx {
    ($self_:expr) => {{
        let section = $self_.ctx.current_section_name();
        let pc = $self_.ctx.current_pc();
        ExprCtx {
            section,
            pc,
            syms: &$self_.ctx.syms,
        }
    }};
}

pub struct Assembler {
    pub ctx: AssemblerContext,
    stream: TokStream,
    /// Every file successfully opened via `@INCLUDE`, in open order, for
    /// `-MD`'s dependency list.
    pub included_files: Vec<PathBuf>,
    source_path: PathBuf,
}

impl Assembler {
    pub fn new(source_path: &Path, search_dirs: Vec<String>) -> Result<Self, AsmError> {
        let mut ctx = AssemblerContext::new();
        ctx.search_dirs = search_dirs;
        let bytes = std::fs::read(source_path)?;
        let file = ctx.pool.intern_str(&source_path.to_string_lossy());
        let stream = TokStream::new(FileFrame::new(&bytes, file));
        Ok(Assembler {
            ctx,
            stream,
            included_files: vec![source_path.to_path_buf()],
            source_path: source_path.to_path_buf(),
        })
    }

    /// Pre-define a `-D KEY=value` symbol in the synthetic `@DEFINES`
    /// section (spec.md §6).
    pub fn define(&mut self, key: &str, value: i32) {
        let defines = self.ctx.pool.intern_str("@DEFINES");
        let name = self.ctx.pool.intern_str(key);
        let lbl = sm83asm_core::sym::Lbl::global(name);
        let sym = Sym {
            lbl,
            value: expr::intern(vec![expr::ExprAtom::Const(value)]),
            unit: self.ctx.pool.intern_str("@STATIC"),
            section: defines,
            pos: Pos::new(View::EMPTY, 0, 0),
            flags: SymFlags::EQU,
        };
        self.ctx.syms.insert(sym);
    }

    pub fn assemble(&mut self) -> Result<(), AsmError> {
        self.ctx.emit = false;
        self.ctx.current_scope = View::EMPTY;
        self.run_pass()?;

        self.ctx.reset_pass();
        self.stream.rewind_root();
        self.ctx.current_scope = View::EMPTY;
        self.ctx.current_section = 0;
        self.ctx.emit = true;
        self.run_pass()?;
        Ok(())
    }

    fn run_pass(&mut self) -> Result<(), AsmError> {
        loop {
            let tok = self.stream.peek(&mut self.ctx.pool)?;
            match tok.kind {
                TokKind::Eof => break,
                TokKind::Punct('\n') | TokKind::Backslash => {
                    self.stream.eat(&mut self.ctx.pool)?;
                }
                TokKind::Directive(d) => {
                    self.stream.eat(&mut self.ctx.pool)?;
                    self.dispatch_directive(d, tok.pos)?;
                }
                TokKind::Id(_) => self.dispatch_id(tok)?,
                _ => return Err(AsmError::Expected("statement", tok.name())),
            }
        }
        Ok(())
    }


    /// `ID` at statement head: either a label definition (`:`, `::`,
    /// `=:`) or a mnemonic.
    fn dispatch_id(&mut self, id_tok: Tok) -> Result<(), AsmError> {
        let TokKind::Id(name_view) = id_tok.kind else {
            unreachable!()
        };
        self.stream.eat(&mut self.ctx.pool)?;
        let text = self.ctx.pool.as_str(name_view).to_string();
        let after = self.stream.peek(&mut self.ctx.pool)?;
        match after.kind {
            TokKind::Digraph(sm83asm_core::token::Digraph::DColon) => {
                self.stream.eat(&mut self.ctx.pool)?;
                self.define_label(&text, id_tok.pos, true)
            }
            TokKind::Punct(':') => {
                self.stream.eat(&mut self.ctx.pool)?;
                self.define_label(&text, id_tok.pos, false)
            }
            TokKind::Digraph(sm83asm_core::token::Digraph::EqColon) => {
                self.stream.eat(&mut self.ctx.pool)?;
                self.define_equ(&text, id_tok.pos)
            }
            _ => self.dispatch_mnemonic(&text, id_tok.pos),
        }
    }

    fn define_label(&mut self, text: &str, pos: Pos, exported: bool) -> Result<(), AsmError> {
        let lbl = label::resolve(&mut self.ctx.pool, text, self.ctx.current_scope);
        let is_global_form = label::is_global_form(text);
        let section = self.ctx.current_section_name();
        let pc = self.ctx.current_pc();
        let unit = self.ctx.pool.intern_str(&self.source_path.to_string_lossy());
        let mut flags = SymFlags::empty();
        if exported || self.ctx.default_export {
            flags |= SymFlags::EXPORTED;
        }
        if !self.ctx.emit {
            if let Some(existing) = self.ctx.syms.find(lbl) {
                if !existing.is_equ() {
                    return Err(AsmError::DuplicateLabel(lbl.full_name(&self.ctx.pool)));
                }
            }
        }
        let sym = Sym {
            lbl,
            value: expr::intern(vec![expr::ExprAtom::Addr { section, pc }]),
            unit,
            section,
            pos,
            flags,
        };
        self.ctx.syms.insert(sym);
        if is_global_form {
            self.ctx.current_scope = lbl.name;
        }
        Ok(())
    }

    fn define_equ(&mut self, text: &str, pos: Pos) -> Result<(), AsmError> {
        let lbl = label::resolve(&mut self.ctx.pool, text, self.ctx.current_scope);
        let __ectx = ectx!(self);
        let value = operand::parse_expr(&mut self.stream, &mut self.ctx.pool, &__ectx)?;
        let section = self.ctx.current_section_name();
        let unit = self.ctx.pool.intern_str(&self.source_path.to_string_lossy());
        let sym = Sym {
            lbl,
            value,
            unit,
            section,
            pos,
            flags: SymFlags::EQU,
        };
        self.ctx.syms.insert(sym);
        Ok(())
    }

    fn dispatch_mnemonic(&mut self, text: &str, pos: Pos) -> Result<(), AsmError> {
        let Some(m) = mne::find(text) else {
            return Err(AsmError::UnknownMnemonic(text.to_string()));
        };
        let ectx = ectx!(self);
        let ops = operand::parse_operands(&mut self.stream, &mut self.ctx.pool, &ectx)?;
        let encoded = encode::encode(m, &ops)?;
        self.emit_encoded(encoded, pos)
    }

    fn emit_encoded(&mut self, encoded: encode::Encoded, pos: Pos) -> Result<(), AsmError> {
        let len = encoded.bytes.len() as u32;
        if !self.ctx.emit {
            self.ctx.current_section_mut().advance(len);
            return Ok(());
        }
        let unit = self.ctx.pool.intern_str(&self.source_path.to_string_lossy());
        let section_name = self.ctx.current_section_name();
        let base_pc = self.ctx.current_pc() as u32;
        let mut bytes = encoded.bytes;
        if let Some(PendingImm {
            offset,
            width,
            value,
            flags,
        }) = encoded.imm
        {
            let relative = flags.contains(RelocFlags::JP);
            let solved = expr::solve(&value, &self.ctx.syms, section_name, relative);
            let reloc_offset = base_pc + offset as u32;
            match (width, solved) {
                (0, Some(vector)) => {
                    // RST: fold the vector directly into the already-emitted
                    // opcode byte, no relocation needed.
                    if !(0..=0x38).contains(&vector) || vector % 8 != 0 {
                        return Err(AsmError::NotConstant);
                    }
                    bytes[offset] |= vector as u8;
                }
                (0, None) => return Err(AsmError::NotConstant), // RST vector is always assemble-time
                (_, Some(n)) => {
                    // JP's displacement is relative to the byte *after* the
                    // displacement byte itself (spec.md §4.4).
                    let n = if relative {
                        n - (reloc_offset as i32 + 1)
                    } else {
                        n
                    };
                    write_immediate(&mut bytes, offset, width, n, flags)?
                }
                (_, None) => {
                    self.ctx.current_section_mut().add_reloc(Reloc {
                        offset: reloc_offset,
                        width,
                        value,
                        unit,
                        pos,
                        flags,
                    });
                }
            }
        }
        self.ctx.current_section_mut().emit_bytes(&bytes);
        Ok(())
    }

    fn dispatch_directive(&mut self, d: Directive, pos: Pos) -> Result<(), AsmError> {
        use Directive::*;
        match d {
            Db => self.directive_db(),
            Dw => self.directive_dw(),
            Ds => self.directive_ds(),
            Section => self.directive_section(),
            Include => self.directive_include(),
            Incbin => self.directive_incbin(),
            Macro => self.directive_macro(),
            Repeat => self.directive_repeat(pos),
            If => self.directive_if(pos),
            Strfmt => self.directive_fmt(true),
            Idfmt => self.directive_fmt(false),
            Print => self.directive_print(false),
            Fatal => self.directive_print(true),
            Create => {
                let name = self.ctx.current_section_name();
                self.ctx.mark_force_created(name);
                Ok(())
            }
            Export => {
                self.ctx.default_export = true;
                Ok(())
            }
            Static => {
                self.ctx.default_export = false;
                Ok(())
            }
            Struct | Union => Err(AsmError::Fatal(
                "@STRUCT/@UNION layout blocks are not implemented".into(),
            )),
            Else | End => Err(AsmError::Fatal("stray @ELSE/@END".into())),
            Arg | Narg | Shift | Unique | Iter => Err(AsmError::Fatal(
                "meta-programming directive used outside its frame".into(),
            )),
            Defined | Strlen | Tag | Rel => {
                Err(AsmError::Fatal("expression-only directive used as a statement".into()))
            }
        }
    }

    fn directive_db(&mut self) -> Result<(), AsmError> {
        loop {
            let tok = self.stream.peek(&mut self.ctx.pool)?;
            if let TokKind::Str(v) = tok.kind {
                self.stream.eat(&mut self.ctx.pool)?;
                let bytes = v.as_bytes(&self.ctx.pool).to_vec();
                if self.ctx.emit {
                    self.ctx.current_section_mut().emit_bytes(&bytes);
                } else {
                    self.ctx.current_section_mut().advance(bytes.len() as u32);
                }
            } else {
                let __ectx = ectx!(self);
                let e = operand::parse_expr(&mut self.stream, &mut self.ctx.pool, &__ectx)?;
                self.emit_imm_list(e, 1)?;
            }
            if !self.eat_comma_or_break()? {
                break;
            }
        }
        Ok(())
    }

    fn directive_dw(&mut self) -> Result<(), AsmError> {
        loop {
            let __ectx = ectx!(self);
            let e = operand::parse_expr(&mut self.stream, &mut self.ctx.pool, &__ectx)?;
            self.emit_imm_list(e, 2)?;
            if !self.eat_comma_or_break()? {
                break;
            }
        }
        Ok(())
    }

    fn emit_imm_list(&mut self, value: expr::ExprView, width: u8) -> Result<(), AsmError> {
        if !self.ctx.emit {
            self.ctx.current_section_mut().advance(width as u32);
            return Ok(());
        }
        let section = self.ctx.current_section_name();
        let base_pc = self.ctx.current_pc() as u32;
        let unit = self.ctx.pool.intern_str(&self.source_path.to_string_lossy());
        match expr::solve(&value, &self.ctx.syms, section, false) {
            Some(n) => {
                let mut bytes = vec![0u8; width as usize];
                write_immediate(&mut bytes, 0, width, n, RelocFlags::empty())?;
                self.ctx.current_section_mut().emit_bytes(&bytes);
            }
            None => {
                self.ctx.current_section_mut().add_reloc(Reloc {
                    offset: base_pc,
                    width,
                    value,
                    unit,
                    pos: self.stream.pos(),
                    flags: RelocFlags::empty(),
                });
                self.ctx.current_section_mut().emit_bytes(&vec![0u8; width as usize]);
            }
        }
        Ok(())
    }

    fn directive_ds(&mut self) -> Result<(), AsmError> {
        let __ectx = ectx!(self);
        let count_expr = operand::parse_expr(&mut self.stream, &mut self.ctx.pool, &__ectx)?;
        let count = expr::solve(&count_expr, &self.ctx.syms, View::EMPTY, false)
            .ok_or(AsmError::NotConstant)?;
        if count < 0 {
            return Err(AsmError::NotConstant);
        }
        let fill = if self.eat_comma_or_break()? {
            let __ectx = ectx!(self);
            let e = operand::parse_expr(&mut self.stream, &mut self.ctx.pool, &__ectx)?;
            expr::solve(&e, &self.ctx.syms, View::EMPTY, false).unwrap_or(0) as u8
        } else {
            0
        };
        if self.ctx.emit {
            self.ctx.current_section_mut().emit_bytes(&vec![fill; count as usize]);
        } else {
            self.ctx.current_section_mut().advance(count as u32);
        }
        Ok(())
    }

    fn directive_section(&mut self) -> Result<(), AsmError> {
        let name = self.expect_str()?;
        let view = self.ctx.pool.intern_str(&name);
        self.ctx.switch_section(view);
        Ok(())
    }

    fn directive_include(&mut self) -> Result<(), AsmError> {
        let name = self.expect_str()?;
        let resolved = self.resolve_include(&name)?;
        let bytes = std::fs::read(&resolved).map_err(AsmError::Io)?;
        self.included_files.push(resolved.clone());
        let file = self.ctx.pool.intern_str(&resolved.to_string_lossy());
        self.stream
            .push(Frame::File(FileFrame::new(&bytes, file)))
            .map_err(|_| AsmError::TooDeep)
    }

    fn directive_incbin(&mut self) -> Result<(), AsmError> {
        let name = self.expect_str()?;
        let resolved = self.resolve_include(&name)?;
        let bytes = std::fs::read(&resolved).map_err(AsmError::Io)?;
        self.included_files.push(resolved);
        if self.ctx.emit {
            self.ctx.current_section_mut().emit_bytes(&bytes);
        } else {
            self.ctx.current_section_mut().advance(bytes.len() as u32);
        }
        Ok(())
    }

    fn resolve_include(&self, name: &str) -> Result<PathBuf, AsmError> {
        let direct = Path::new(name);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        for dir in &self.ctx.search_dirs {
            let candidate = Path::new(dir).join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(AsmError::IncludeNotFound(name.to_string()))
    }

    fn directive_macro(&mut self) -> Result<(), AsmError> {
        let name_view = self.expect_id()?;
        let body = self.capture_block()?;
        self.ctx.macros.insert(
            name_view,
            MacroDef {
                body: Rc::from(body),
            },
        );
        Ok(())
    }

    fn directive_repeat(&mut self, pos: Pos) -> Result<(), AsmError> {
        let __ectx = ectx!(self);
        let e = operand::parse_expr(&mut self.stream, &mut self.ctx.pool, &__ectx)?;
        let count = expr::solve(&e, &self.ctx.syms, View::EMPTY, false)
            .filter(|n| *n >= 0)
            .ok_or(AsmError::BadRepeatCount)?;
        let body = self.capture_block()?;
        self.stream
            .push(Frame::Repeat(RepeatFrame::new(Rc::from(body), count as u32, pos)))
            .map_err(|_| AsmError::TooDeep)
    }

    fn directive_if(&mut self, pos: Pos) -> Result<(), AsmError> {
        let __ectx = ectx!(self);
        let e = operand::parse_expr(&mut self.stream, &mut self.ctx.pool, &__ectx)?;
        let (then_branch, else_branch) = self.capture_if_branches()?;
        let cond = expr::solve(&e, &self.ctx.syms, View::EMPTY, false).unwrap_or(0);
        let chosen = if cond != 0 { then_branch } else { else_branch };
        self.stream
            .push(Frame::IfElse(IfElseFrame::new(Rc::from(chosen), pos)))
            .map_err(|_| AsmError::TooDeep)
    }

    /// Captures raw tokens up to the matching `@END`, tracking nested
    /// `@IF`/`@MACRO`/`@REPEAT`/`@STRUCT`/`@UNION` opens so an inner
    /// block's own `@END` doesn't end the outer capture (spec.md §4.4).
    fn capture_block(&mut self) -> Result<Vec<Tok>, AsmError> {
        let mut depth = 0u32;
        let mut out = Vec::new();
        loop {
            let tok = self.stream.eat(&mut self.ctx.pool)?;
            if tok.is_eof() {
                return Err(AsmError::UnterminatedBlock);
            }
            if let TokKind::Directive(d) = tok.kind {
                use Directive::*;
                match d {
                    If | Macro | Repeat | Struct | Union => depth += 1,
                    End => {
                        if depth == 0 {
                            return Ok(out);
                        }
                        depth -= 1;
                    }
                    _ => {}
                }
            }
            out.push(tok);
        }
    }

    fn capture_if_branches(&mut self) -> Result<(Vec<Tok>, Vec<Tok>), AsmError> {
        let mut depth = 0u32;
        let mut then_branch = Vec::new();
        let mut saw_else = false;
        loop {
            let tok = self.stream.eat(&mut self.ctx.pool)?;
            if tok.is_eof() {
                return Err(AsmError::UnterminatedBlock);
            }
            if let TokKind::Directive(d) = tok.kind {
                use Directive::*;
                match d {
                    If | Macro | Repeat | Struct | Union => depth += 1,
                    Else if depth == 0 => {
                        saw_else = true;
                        break;
                    }
                    End => {
                        if depth == 0 {
                            return Ok((then_branch, Vec::new()));
                        }
                        depth -= 1;
                    }
                    _ => {}
                }
            }
            then_branch.push(tok);
        }
        debug_assert!(saw_else);
        let else_branch = self.capture_block()?;
        Ok((then_branch, else_branch))
    }

    fn directive_fmt(&mut self, is_str: bool) -> Result<(), AsmError> {
        let fmt_str = self.expect_str()?;
        let args = self.parse_fmt_args()?;
        let rendered = fmt::format(&fmt_str, &args).map_err(|e| AsmError::Fatal(e.to_string()))?;
        let pos = self.stream.pos();
        let tok = if is_str {
            let v = self.ctx.pool.intern_str(&rendered);
            Tok::new(TokKind::Str(v), pos)
        } else {
            let v = self.ctx.pool.intern_str(&rendered);
            Tok::new(TokKind::Id(v), pos)
        };
        self.stream
            .push(Frame::Fmt(FmtFrame::new(tok)))
            .map_err(|_| AsmError::TooDeep)
    }

    fn directive_print(&mut self, fatal: bool) -> Result<(), AsmError> {
        let fmt_str = self.expect_str()?;
        let args = self.parse_fmt_args()?;
        let rendered = fmt::format(&fmt_str, &args).map_err(|e| AsmError::Fatal(e.to_string()))?;
        if fatal {
            return Err(AsmError::Fatal(rendered));
        }
        if self.ctx.emit {
            eprintln!("{}", rendered);
        }
        Ok(())
    }

    fn parse_fmt_args(&mut self) -> Result<Vec<FmtArg>, AsmError> {
        let mut args = Vec::new();
        while self.eat_comma_or_break()? {
            let tok = self.stream.peek(&mut self.ctx.pool)?;
            match tok.kind {
                TokKind::Str(v) => {
                    self.stream.eat(&mut self.ctx.pool)?;
                    args.push(FmtArg::Text(self.ctx.pool.as_str(v).to_string()));
                }
                TokKind::Id(v) => {
                    self.stream.eat(&mut self.ctx.pool)?;
                    args.push(FmtArg::Text(self.ctx.pool.as_str(v).to_string()));
                }
                _ => {
                    let __ectx = ectx!(self);
                    let e = operand::parse_expr(&mut self.stream, &mut self.ctx.pool, &__ectx)?;
                    let n = expr::solve(&e, &self.ctx.syms, View::EMPTY, false)
                        .ok_or(AsmError::NotConstant)?;
                    args.push(FmtArg::Int(n as i64));
                }
            }
        }
        Ok(args)
    }

    /// Consumes a `,` and returns `true` if one was found; otherwise
    /// leaves the stream untouched and returns `false`.
    fn eat_comma_or_break(&mut self) -> Result<bool, AsmError> {
        let tok = self.stream.peek(&mut self.ctx.pool)?;
        if tok.kind == TokKind::Punct(',') {
            self.stream.eat(&mut self.ctx.pool)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_str(&mut self) -> Result<String, AsmError> {
        let tok = self.stream.eat(&mut self.ctx.pool)?;
        match tok.kind {
            TokKind::Str(v) => Ok(self.ctx.pool.as_str(v).to_string()),
            _ => Err(AsmError::Expected("a string", tok.name())),
        }
    }

    fn expect_id(&mut self) -> Result<View, AsmError> {
        let tok = self.stream.eat(&mut self.ctx.pool)?;
        match tok.kind {
            TokKind::Id(v) => Ok(v),
            _ => Err(AsmError::Expected("an identifier", tok.name())),
        }
    }
}

fn write_immediate(
    bytes: &mut [u8],
    offset: usize,
    width: u8,
    value: i32,
    flags: RelocFlags,
) -> Result<(), AsmError> {
    if flags.contains(RelocFlags::HRAM) {
        if !(0xFF00..=0xFFFF).contains(&value) {
            return Err(AsmError::Fatal(format!(
                "value ${:04X} is not in the HRAM range $FF00-$FFFF",
                value
            )));
        }
        bytes[offset] = (value & 0xFF) as u8;
        return Ok(());
    }
    if flags.contains(RelocFlags::JP) {
        if !(-128..=127).contains(&value) {
            return Err(AsmError::Fatal(format!(
                "relative jump displacement {} is out of range",
                value
            )));
        }
        bytes[offset] = value as i8 as u8;
        return Ok(());
    }
    match width {
        1 => {
            if !expr::can_repr_u8(value) && !expr::can_repr_i8(value) {
                return Err(AsmError::Fatal(format!(
                    "value {} does not fit in a byte",
                    value
                )));
            }
            bytes[offset] = (value & 0xFF) as u8;
        }
        2 => {
            if !expr::can_repr_u16(value) && !(i16::MIN as i32..=i16::MAX as i32).contains(&value)
            {
                return Err(AsmError::Fatal(format!(
                    "value {} does not fit in a word",
                    value
                )));
            }
            let v = value as u16;
            bytes[offset] = (v & 0xFF) as u8;
            bytes[offset + 1] = (v >> 8) as u8;
        }
        _ => unreachable!("widths are only ever 1 or 2"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn assemble_src(src: &str) -> Assembler {
        let mut tmp = std::env::temp_dir();
        tmp.push(format!("smasm_test_{}.s", src.len() * 7 + src.as_bytes().first().copied().unwrap_or(0) as usize));
        let mut f = std::fs::File::create(&tmp).unwrap();
        f.write_all(src.as_bytes()).unwrap();
        let mut asm = Assembler::new(&tmp, vec![]).unwrap();
        asm.assemble().unwrap();
        asm
    }

    #[test]
    fn assembles_a_plain_nop() {
        let mut asm = assemble_src("@SECTION \"CODE\"\nNOP\n");
        let code = asm.ctx.pool.intern_str("CODE");
        asm.ctx.switch_section(code);
        let sect = &asm.ctx.sections[asm.ctx.current_section];
        assert_eq!(sect.data, vec![0x00]);
    }

    #[test]
    fn label_then_jump_resolves_within_same_section() {
        let mut asm = assemble_src("@SECTION \"CODE\"\nloop:\nNOP\nJR loop\n");
        let code = asm.ctx.pool.intern_str("CODE");
        asm.ctx.switch_section(code);
        let sect = &asm.ctx.sections[asm.ctx.current_section];
        assert_eq!(sect.data, vec![0x00, 0x18, 0xFE]);
    }

    #[test]
    fn equ_symbol_is_constant_and_usable_immediately() {
        let mut asm = assemble_src("FOO =: 5\n@SECTION \"CODE\"\n@DB FOO\n");
        let code = asm.ctx.pool.intern_str("CODE");
        asm.ctx.switch_section(code);
        let sect = &asm.ctx.sections[asm.ctx.current_section];
        assert_eq!(sect.data, vec![5]);
    }

    #[test]
    fn duplicate_non_equ_label_is_an_error() {
        let mut tmp = std::env::temp_dir();
        tmp.push("smasm_test_dup.s");
        std::fs::write(&tmp, "foo:\nfoo:\n").unwrap();
        let mut asm = Assembler::new(&tmp, vec![]).unwrap();
        assert!(asm.assemble().is_err());
    }

    #[test]
    fn macro_call_expands_argument() {
        let mut asm = assemble_src(
            "@MACRO put\n@DB @ARG\n@END\n@SECTION \"CODE\"\nput 9\n",
        );
        let code = asm.ctx.pool.intern_str("CODE");
        asm.ctx.switch_section(code);
        let sect = &asm.ctx.sections[asm.ctx.current_section];
        assert_eq!(sect.data, vec![9]);
    }
}
