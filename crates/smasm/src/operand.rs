//! Operand parsing (spec.md §4.4: "operand parsing disambiguates an
//! *addressing form*"). Consumes tokens directly off the shared
//! [`TokStream`], the same way the expression parser consumes operator
//! and operand tokens — it stops at the first token it doesn't recognize
//! as part of an operand.

use sm83asm_core::expr::{self, ExprAtom, ExprView, OpTok};
use sm83asm_core::pos::Pos;
use sm83asm_core::stream::{StreamError, TokStream};
use sm83asm_core::sym::Lbl;
use sm83asm_core::token::{Directive, Reg, TokKind};
use sm83asm_core::view::{Pool, View};
use thiserror::Error;

/// Context the expression parser needs for the two PC-dependent atoms
/// (`*`, `**`) and for `@DEFINED`, which is resolved immediately rather
/// than deferred into an atom (spec.md §4.3).
pub struct ExprCtx<'a> {
    pub section: View,
    pub pc: u16,
    pub syms: &'a sm83asm_core::sym::SymTable,
}

#[derive(Debug, Error)]
pub enum OperandError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("expected an operand, found {0}")]
    Expected(String),
    #[error("unbalanced parentheses in expression")]
    Unbalanced,
}

/// 8-bit register operands in opcode-table order: B, C, D, E, H, L,
/// `[HL]`, A.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    IndHl,
    A,
}

impl Reg8 {
    /// The 3-bit field value used in every `r`/`r'` opcode slot.
    pub fn code(self) -> u8 {
        match self {
            Reg8::B => 0,
            Reg8::C => 1,
            Reg8::D => 2,
            Reg8::E => 3,
            Reg8::H => 4,
            Reg8::L => 5,
            Reg8::IndHl => 6,
            Reg8::A => 7,
        }
    }
}

/// 16-bit register-pair operands in `rr` opcode-table order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reg16 {
    Bc,
    De,
    Hl,
    Sp,
}

impl Reg16 {
    pub fn code(self) -> u8 {
        match self {
            Reg16::Bc => 0,
            Reg16::De => 1,
            Reg16::Hl => 2,
            Reg16::Sp => 3,
        }
    }
}

/// `PUSH`/`POP` use `AF` where other 16-bit groups use `SP`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StackReg {
    Bc,
    De,
    Hl,
    Af,
}

impl StackReg {
    pub fn code(self) -> u8 {
        match self {
            StackReg::Bc => 0,
            StackReg::De => 1,
            StackReg::Hl => 2,
            StackReg::Af => 3,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cond {
    Nz,
    Z,
    Nc,
    C,
}

impl Cond {
    pub fn code(self) -> u8 {
        match self {
            Cond::Nz => 0,
            Cond::Z => 1,
            Cond::Nc => 2,
            Cond::C => 3,
        }
    }
}

/// One parsed operand. `Ind*` variants came from a bracketed `[...]`
/// form; bare registers and immediates did not.
#[derive(Clone, Debug)]
pub enum Operand {
    Reg8(Reg8),
    Reg16(Reg16),
    Stack(StackReg),
    Cond(Cond),
    IndBc,
    IndDe,
    IndHlInc,
    IndHlDec,
    IndC,
    Imm(ExprView),
    Ind(ExprView),
    SpPlusImm(ExprView),
}

/// Reads zero or more comma-separated operands, stopping at end of
/// statement (anything that is not a comma after the first operand).
pub fn parse_operands(
    stream: &mut TokStream,
    pool: &mut Pool,
    ctx: &ExprCtx,
) -> Result<Vec<Operand>, OperandError> {
    let mut out = Vec::new();
    let first = stream.peek(pool)?;
    if is_statement_end(&first) {
        return Ok(out);
    }
    out.push(parse_operand(stream, pool, ctx)?);
    loop {
        let tok = stream.peek(pool)?;
        if tok.kind == TokKind::Punct(',') {
            stream.eat(pool)?;
            out.push(parse_operand(stream, pool, ctx)?);
        } else {
            break;
        }
    }
    Ok(out)
}

fn is_statement_end(tok: &sm83asm_core::token::Tok) -> bool {
    matches!(tok.kind, TokKind::Eof | TokKind::Punct('\n'))
}

fn parse_operand(
    stream: &mut TokStream,
    pool: &mut Pool,
    ctx: &ExprCtx,
) -> Result<Operand, OperandError> {
    let tok = stream.peek(pool)?;
    match tok.kind {
        TokKind::Punct('[') => parse_indirect(stream, pool, ctx),
        TokKind::Reg(Reg::Sp) => {
            stream.eat(pool)?;
            let after = stream.peek(pool)?;
            if after.kind == TokKind::Punct('+') {
                stream.eat(pool)?;
                return Ok(Operand::SpPlusImm(parse_expr(stream, pool, ctx)?));
            }
            Ok(Operand::Reg16(Reg16::Sp))
        }
        TokKind::Reg(r) => {
            stream.eat(pool)?;
            Ok(bare_reg_operand(r))
        }
        _ => Ok(Operand::Imm(parse_expr(stream, pool, ctx)?)),
    }
}

fn bare_reg_operand(r: Reg) -> Operand {
    use Reg::*;
    match r {
        B => Operand::Reg8(Reg8::B),
        C => Operand::Reg8(Reg8::C),
        D => Operand::Reg8(Reg8::D),
        E => Operand::Reg8(Reg8::E),
        H => Operand::Reg8(Reg8::H),
        L => Operand::Reg8(Reg8::L),
        A => Operand::Reg8(Reg8::A),
        Bc => Operand::Reg16(Reg16::Bc),
        De => Operand::Reg16(Reg16::De),
        Hl => Operand::Reg16(Reg16::Hl),
        Sp => Operand::Reg16(Reg16::Sp),
        Af => Operand::Stack(StackReg::Af),
        Nz => Operand::Cond(Cond::Nz),
        Z => Operand::Cond(Cond::Z),
        Nc => Operand::Cond(Cond::Nc),
    }
}

fn parse_indirect(
    stream: &mut TokStream,
    pool: &mut Pool,
    ctx: &ExprCtx,
) -> Result<Operand, OperandError> {
    stream.eat(pool)?; // '['
    let tok = stream.peek(pool)?;
    let operand = match tok.kind {
        TokKind::Reg(Reg::Bc) => {
            stream.eat(pool)?;
            Operand::IndBc
        }
        TokKind::Reg(Reg::De) => {
            stream.eat(pool)?;
            Operand::IndDe
        }
        TokKind::Reg(Reg::C) => {
            stream.eat(pool)?;
            Operand::IndC
        }
        TokKind::Reg(Reg::Hl) => {
            stream.eat(pool)?;
            let after = stream.peek(pool)?;
            match after.kind {
                TokKind::Punct('+') => {
                    stream.eat(pool)?;
                    Operand::IndHlInc
                }
                TokKind::Punct('-') => {
                    stream.eat(pool)?;
                    Operand::IndHlDec
                }
                _ => Operand::Reg8(Reg8::IndHl),
            }
        }
        _ => Operand::Ind(parse_expr(stream, pool, ctx)?),
    };
    let close = stream.eat(pool)?;
    if close.kind != TokKind::Punct(']') {
        return Err(OperandError::Unbalanced);
    }
    Ok(operand)
}

/// Parse a postfix expression using the operand/operator two-stack
/// algorithm of spec.md §4.3, stopping at the first token that is not a
/// recognized operator or operand.
pub fn parse_expr(
    stream: &mut TokStream,
    pool: &mut Pool,
    ctx: &ExprCtx,
) -> Result<ExprView, OperandError> {
    let mut operands: Vec<ExprAtom> = Vec::new();
    let mut operators: Vec<Option<OpTok>> = Vec::new(); // None = '(' sentinel

    fn pop_operator(operands: &mut Vec<ExprAtom>, op: OpTok) {
        operands.push(ExprAtom::Op(op));
    }

    let mut expect_operand = true;
    loop {
        let tok = stream.peek(pool)?;
        if expect_operand {
            match tok.kind {
                TokKind::Num(n, _) => {
                    stream.eat(pool)?;
                    operands.push(ExprAtom::Const(n));
                    expect_operand = false;
                }
                TokKind::Id(name) => {
                    stream.eat(pool)?;
                    operands.push(ExprAtom::Label(Lbl::global(name)));
                    expect_operand = false;
                }
                TokKind::Digraph(sm83asm_core::token::Digraph::DStar) => {
                    stream.eat(pool)?;
                    operands.push(ExprAtom::Addr {
                        section: ctx.section,
                        pc: ctx.pc,
                    });
                    expect_operand = false;
                }
                TokKind::Directive(Directive::Defined) => {
                    stream.eat(pool)?;
                    expect_punct(stream, pool, '(')?;
                    let id = expect_id(stream, pool)?;
                    expect_punct(stream, pool, ')')?;
                    let defined = ctx.syms.find(Lbl::global(id)).is_some();
                    operands.push(ExprAtom::Const(defined as i32));
                    expect_operand = false;
                }
                TokKind::Directive(Directive::Strlen) => {
                    stream.eat(pool)?;
                    let s = expect_str(stream, pool)?;
                    let len = s.len() as i32;
                    operands.push(ExprAtom::Const(len));
                    expect_operand = false;
                }
                TokKind::Directive(Directive::Tag) => {
                    stream.eat(pool)?;
                    let id = expect_id(stream, pool)?;
                    expect_punct(stream, pool, ',')?;
                    let name = expect_str(stream, pool)?;
                    let name_view = pool.intern(name.as_bytes());
                    operands.push(ExprAtom::Tag {
                        lbl: Lbl::global(id),
                        name: name_view,
                    });
                    expect_operand = false;
                }
                TokKind::Directive(Directive::Rel) => {
                    stream.eat(pool)?;
                    let id = expect_id(stream, pool)?;
                    operands.push(ExprAtom::Rel(Lbl::global(id)));
                    expect_operand = false;
                }
                TokKind::Punct('(') => {
                    stream.eat(pool)?;
                    operators.push(None);
                }
                TokKind::Punct('-') => {
                    stream.eat(pool)?;
                    operators.push(Some(OpTok::Neg));
                }
                TokKind::Punct('+') => {
                    stream.eat(pool)?;
                    operators.push(Some(OpTok::Pos));
                }
                TokKind::Punct('~') => {
                    stream.eat(pool)?;
                    operators.push(Some(OpTok::BitNot));
                }
                TokKind::Punct('!') => {
                    stream.eat(pool)?;
                    operators.push(Some(OpTok::Not));
                }
                TokKind::Punct('<') => {
                    stream.eat(pool)?;
                    operators.push(Some(OpTok::LowByte));
                }
                TokKind::Punct('>') => {
                    stream.eat(pool)?;
                    operators.push(Some(OpTok::MidByte));
                }
                TokKind::Punct('^') => {
                    stream.eat(pool)?;
                    operators.push(Some(OpTok::HighByte));
                }
                TokKind::Punct('*') => {
                    stream.eat(pool)?;
                    operands.push(ExprAtom::Const(ctx.pc as i32));
                    expect_operand = false;
                }
                _ => return Err(OperandError::Expected(tok.name())),
            }
            continue;
        }

        // Binary-operator / close-paren position.
        let op = match tok.kind {
            TokKind::Punct('+') => Some(OpTok::Add),
            TokKind::Punct('-') => Some(OpTok::Sub),
            TokKind::Punct('*') => Some(OpTok::Mul),
            TokKind::Punct('/') => Some(OpTok::Div),
            TokKind::Punct('%') => Some(OpTok::Mod),
            TokKind::Punct('&') => Some(OpTok::BitAnd),
            TokKind::Punct('|') => Some(OpTok::BitOr),
            TokKind::Punct(')') => {
                stream.eat(pool)?;
                while let Some(top) = operators.pop() {
                    match top {
                        None => break,
                        Some(o) => pop_operator(&mut operands, o),
                    }
                }
                continue;
            }
            _ => None,
        };
        let Some(op) = op else { break };
        stream.eat(pool)?;
        while let Some(Some(top)) = operators.last().copied() {
            if expr::precedence(top) <= expr::precedence(op) {
                operators.pop();
                pop_operator(&mut operands, top);
            } else {
                break;
            }
        }
        operators.push(Some(op));
        expect_operand = true;
    }

    while let Some(top) = operators.pop() {
        match top {
            None => return Err(OperandError::Unbalanced),
            Some(o) => pop_operator(&mut operands, o),
        }
    }
    Ok(expr::intern(operands))
}

fn expect_punct(stream: &mut TokStream, pool: &mut Pool, c: char) -> Result<(), OperandError> {
    let tok = stream.eat(pool)?;
    if tok.kind != TokKind::Punct(c) {
        return Err(OperandError::Expected(tok.name()));
    }
    Ok(())
}

fn expect_id(stream: &mut TokStream, pool: &mut Pool) -> Result<View, OperandError> {
    let tok = stream.eat(pool)?;
    match tok.kind {
        TokKind::Id(v) => Ok(v),
        _ => Err(OperandError::Expected(tok.name())),
    }
}

fn expect_str(stream: &mut TokStream, pool: &mut Pool) -> Result<String, OperandError> {
    let tok = stream.eat(pool)?;
    match tok.kind {
        TokKind::Str(v) => Ok(pool.as_str(v).to_string()),
        _ => Err(OperandError::Expected(tok.name())),
    }
}

pub fn pos_of(stream: &TokStream) -> Pos {
    stream.pos()
}

/// Only used by callers that want a scoped label rather than `Lbl::global`
/// (local `.label` references); kept separate so `parse_expr` stays
/// agnostic of the current assembler scope.
pub fn scoped_label(scope: View, name: View) -> Lbl {
    Lbl::scoped(scope, name)
}
