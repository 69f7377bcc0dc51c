//! SM83 opcode encoding (spec.md §4.4: "consults an opcode table keyed on
//! `(mne, addr-form)`"). `original_source/src/smasm/mne.c` only supplies
//! the mnemonic *name* table — `smOpcodeFind`'s actual opcode bytes are not
//! part of the retrieved source, so the encodings below are the public,
//! well-documented SM83/LR35902 opcode map rather than a port of any
//! proprietary table.

use crate::mne::Mne;
use crate::operand::{Cond, Operand, Reg16, Reg8, StackReg};
use sm83asm_core::expr::ExprView;
use sm83asm_core::sect::RelocFlags;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid operand(s) for {0:?}")]
    InvalidOperands(Mne),
    #[error("wrong number of operands for {0:?}: expected {1}, found {2}")]
    WrongArity(Mne, usize, usize),
}

/// An immediate that must be patched once `value` is known — either
/// written directly (both passes write some byte; pass 1 just needs the
/// final length) or deferred to a link-time relocation if `value` isn't
/// solvable yet.
#[derive(Clone, Debug)]
pub struct PendingImm {
    /// Byte offset of the immediate within `Encoded::bytes`.
    pub offset: usize,
    pub width: u8,
    pub value: ExprView,
    pub flags: RelocFlags,
}

#[derive(Clone, Debug, Default)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub imm: Option<PendingImm>,
}

impl Encoded {
    fn fixed(bytes: &[u8]) -> Self {
        Encoded {
            bytes: bytes.to_vec(),
            imm: None,
        }
    }

    fn with_imm(mut bytes: Vec<u8>, width: u8, value: ExprView, flags: RelocFlags) -> Self {
        let offset = bytes.len();
        bytes.extend(std::iter::repeat(0u8).take(width as usize));
        Encoded {
            bytes,
            imm: Some(PendingImm {
                offset,
                width,
                value,
                flags,
            }),
        }
    }
}

fn reg8(op: &Operand) -> Option<Reg8> {
    match op {
        Operand::Reg8(r) => Some(*r),
        _ => None,
    }
}

fn reg16(op: &Operand) -> Option<Reg16> {
    match op {
        Operand::Reg16(r) => Some(*r),
        _ => None,
    }
}

fn stack_reg(op: &Operand) -> Option<StackReg> {
    match op {
        Operand::Stack(s) => Some(*s),
        Operand::Reg16(Reg16::Bc) => Some(StackReg::Bc),
        Operand::Reg16(Reg16::De) => Some(StackReg::De),
        Operand::Reg16(Reg16::Hl) => Some(StackReg::Hl),
        _ => None,
    }
}

fn cond(op: &Operand) -> Option<Cond> {
    match op {
        Operand::Cond(c) => Some(*c),
        _ => None,
    }
}

fn imm(op: &Operand) -> Option<ExprView> {
    match op {
        Operand::Imm(e) => Some(e.clone()),
        Operand::Ind(e) => Some(e.clone()),
        _ => None,
    }
}

macro_rules! bad {
    ($mne:expr) => {
        return Err(EncodeError::InvalidOperands($mne))
    };
}

/// Encode one statement's mnemonic and already-parsed operands into bytes
/// plus an optional pending immediate/relocation.
pub fn encode(mne: Mne, ops: &[Operand]) -> Result<Encoded, EncodeError> {
    use Mne::*;
    match mne {
        Nop => fixed0(ops, mne, &[0x00]),
        Halt => fixed0(ops, mne, &[0x76]),
        Stop => fixed0(ops, mne, &[0x10, 0x00]),
        Di => fixed0(ops, mne, &[0xF3]),
        Ei => fixed0(ops, mne, &[0xFB]),
        Rlca => fixed0(ops, mne, &[0x07]),
        Rrca => fixed0(ops, mne, &[0x0F]),
        Rla => fixed0(ops, mne, &[0x17]),
        Rra => fixed0(ops, mne, &[0x1F]),
        Daa => fixed0(ops, mne, &[0x27]),
        Cpl => fixed0(ops, mne, &[0x2F]),
        Scf => fixed0(ops, mne, &[0x37]),
        Ccf => fixed0(ops, mne, &[0x3F]),
        Ret if ops.is_empty() => Ok(Encoded::fixed(&[0xC9])),
        Ret => encode_ret_cc(ops, mne),
        Reti => fixed0(ops, mne, &[0xD9]),

        Inc => encode_inc_dec(ops, mne, 0x04, 0x03),
        Dec => encode_inc_dec(ops, mne, 0x05, 0x0B),

        Ld => encode_ld(ops, mne),
        Ldi => encode_ldi_ldd(ops, mne, true),
        Ldd => encode_ldi_ldd(ops, mne, false),
        Ldh => encode_ldh(ops, mne),

        Push => encode_push_pop(ops, mne, 0xC5),
        Pop => encode_push_pop(ops, mne, 0xC1),

        Add => encode_add(ops, mne),
        Adc => encode_alu(ops, mne, 0x88, 0xCE),
        Sub => encode_alu_a_implicit(ops, mne, 0x90, 0xD6),
        Sbc => encode_alu(ops, mne, 0x98, 0xDE),
        And => encode_alu_a_implicit(ops, mne, 0xA0, 0xE6),
        Xor => encode_alu_a_implicit(ops, mne, 0xA8, 0xEE),
        Or => encode_alu_a_implicit(ops, mne, 0xB0, 0xF6),
        Cp => encode_alu_a_implicit(ops, mne, 0xB8, 0xFE),

        Jr => encode_jr(ops, mne),
        Jp => encode_jp(ops, mne),
        Call => encode_call(ops, mne),
        Rst => encode_rst(ops, mne),

        Rlc => encode_cb(ops, mne, 0x00),
        Rrc => encode_cb(ops, mne, 0x08),
        Rl => encode_cb(ops, mne, 0x10),
        Rr => encode_cb(ops, mne, 0x18),
        Sla => encode_cb(ops, mne, 0x20),
        Sra => encode_cb(ops, mne, 0x28),
        Swap => encode_cb(ops, mne, 0x30),
        Srl => encode_cb(ops, mne, 0x38),
        Bit => encode_cb_bit(ops, mne, 0x40),
        Res => encode_cb_bit(ops, mne, 0x80),
        Set => encode_cb_bit(ops, mne, 0xC0),
    }
}

fn fixed0(ops: &[Operand], mne: Mne, bytes: &[u8]) -> Result<Encoded, EncodeError> {
    if !ops.is_empty() {
        return Err(EncodeError::WrongArity(mne, 0, ops.len()));
    }
    Ok(Encoded::fixed(bytes))
}

fn encode_ret_cc(ops: &[Operand], mne: Mne) -> Result<Encoded, EncodeError> {
    if ops.len() != 1 {
        return Err(EncodeError::WrongArity(mne, 1, ops.len()));
    }
    let Some(c) = cond(&ops[0]) else { bad!(mne) };
    Ok(Encoded::fixed(&[0xC0 + c.code() * 8]))
}

fn encode_inc_dec(ops: &[Operand], mne: Mne, r8_base: u8, r16_base: u8) -> Result<Encoded, EncodeError> {
    if ops.len() != 1 {
        return Err(EncodeError::WrongArity(mne, 1, ops.len()));
    }
    if let Some(r) = reg8(&ops[0]) {
        return Ok(Encoded::fixed(&[r8_base + r.code() * 8]));
    }
    if let Some(rr) = reg16(&ops[0]) {
        return Ok(Encoded::fixed(&[r16_base + rr.code() * 16]));
    }
    bad!(mne)
}

fn encode_ld(ops: &[Operand], mne: Mne) -> Result<Encoded, EncodeError> {
    if ops.len() != 2 {
        return Err(EncodeError::WrongArity(mne, 2, ops.len()));
    }
    let (dst, src) = (&ops[0], &ops[1]);
    match (dst, src) {
        // LD r, r'
        (d, s) if reg8(d).is_some() && reg8(s).is_some() => {
            let (d, s) = (reg8(d).unwrap(), reg8(s).unwrap());
            if d == Reg8::IndHl && s == Reg8::IndHl {
                bad!(mne); // that slot is HALT
            }
            Ok(Encoded::fixed(&[0x40 + d.code() * 8 + s.code()]))
        }
        // LD r, n8
        (d, s) if reg8(d).is_some() && imm(s).is_some() => {
            let d = reg8(d).unwrap();
            Ok(Encoded::with_imm(
                vec![0x06 + d.code() * 8],
                1,
                imm(s).unwrap(),
                RelocFlags::empty(),
            ))
        }
        // LD rr, n16
        (d, s) if reg16(d).is_some() && imm(s).is_some() => {
            let d = reg16(d).unwrap();
            Ok(Encoded::with_imm(
                vec![0x01 + d.code() * 16],
                2,
                imm(s).unwrap(),
                RelocFlags::empty(),
            ))
        }
        // LD A,[BC] / LD A,[DE]
        (Operand::Reg8(Reg8::A), Operand::IndBc) => Ok(Encoded::fixed(&[0x0A])),
        (Operand::Reg8(Reg8::A), Operand::IndDe) => Ok(Encoded::fixed(&[0x1A])),
        (Operand::IndBc, Operand::Reg8(Reg8::A)) => Ok(Encoded::fixed(&[0x02])),
        (Operand::IndDe, Operand::Reg8(Reg8::A)) => Ok(Encoded::fixed(&[0x12])),
        // LD [n16], SP
        (Operand::Ind(e), Operand::Reg16(Reg16::Sp)) => {
            Ok(Encoded::with_imm(vec![0x08], 2, e.clone(), RelocFlags::empty()))
        }
        // LD SP, HL
        (Operand::Reg16(Reg16::Sp), Operand::Reg16(Reg16::Hl)) => Ok(Encoded::fixed(&[0xF9])),
        // LD HL, SP+e8
        (Operand::Reg16(Reg16::Hl), Operand::SpPlusImm(e)) => {
            Ok(Encoded::with_imm(vec![0xF8], 1, e.clone(), RelocFlags::empty()))
        }
        // LD [n16], A / LD A, [n16]
        (Operand::Ind(e), Operand::Reg8(Reg8::A)) => {
            Ok(Encoded::with_imm(vec![0xEA], 2, e.clone(), RelocFlags::empty()))
        }
        (Operand::Reg8(Reg8::A), Operand::Ind(e)) => {
            Ok(Encoded::with_imm(vec![0xFA], 2, e.clone(), RelocFlags::empty()))
        }
        _ => bad!(mne),
    }
}

fn encode_ldi_ldd(ops: &[Operand], mne: Mne, inc: bool) -> Result<Encoded, EncodeError> {
    if ops.len() != 2 {
        return Err(EncodeError::WrongArity(mne, 2, ops.len()));
    }
    let op = match (inc, &ops[0], &ops[1]) {
        (true, Operand::Reg8(Reg8::A), Operand::Reg8(Reg8::IndHl)) => 0x2A,
        (true, Operand::Reg8(Reg8::IndHl), Operand::Reg8(Reg8::A)) => 0x22,
        (false, Operand::Reg8(Reg8::A), Operand::Reg8(Reg8::IndHl)) => 0x3A,
        (false, Operand::Reg8(Reg8::IndHl), Operand::Reg8(Reg8::A)) => 0x32,
        _ => bad!(mne),
    };
    Ok(Encoded::fixed(&[op]))
}

fn encode_ldh(ops: &[Operand], mne: Mne) -> Result<Encoded, EncodeError> {
    if ops.len() != 2 {
        return Err(EncodeError::WrongArity(mne, 2, ops.len()));
    }
    match (&ops[0], &ops[1]) {
        (Operand::Ind(e), Operand::Reg8(Reg8::A)) => {
            Ok(Encoded::with_imm(vec![0xE0], 1, e.clone(), RelocFlags::HRAM))
        }
        (Operand::Reg8(Reg8::A), Operand::Ind(e)) => {
            Ok(Encoded::with_imm(vec![0xF0], 1, e.clone(), RelocFlags::HRAM))
        }
        (Operand::IndC, Operand::Reg8(Reg8::A)) => Ok(Encoded::fixed(&[0xE2])),
        (Operand::Reg8(Reg8::A), Operand::IndC) => Ok(Encoded::fixed(&[0xF2])),
        _ => bad!(mne),
    }
}

fn encode_push_pop(ops: &[Operand], mne: Mne, base: u8) -> Result<Encoded, EncodeError> {
    if ops.len() != 1 {
        return Err(EncodeError::WrongArity(mne, 1, ops.len()));
    }
    let Some(s) = stack_reg(&ops[0]) else { bad!(mne) };
    Ok(Encoded::fixed(&[base + s.code() * 16]))
}

fn encode_add(ops: &[Operand], mne: Mne) -> Result<Encoded, EncodeError> {
    if ops.len() != 2 {
        return Err(EncodeError::WrongArity(mne, 2, ops.len()));
    }
    match (&ops[0], &ops[1]) {
        (Operand::Reg16(Reg16::Hl), rr) if reg16(rr).is_some() => {
            Ok(Encoded::fixed(&[0x09 + reg16(rr).unwrap().code() * 16]))
        }
        (Operand::Reg16(Reg16::Sp), s) if imm(s).is_some() => {
            Ok(Encoded::with_imm(vec![0xE8], 1, imm(s).unwrap(), RelocFlags::empty()))
        }
        (Operand::Reg8(Reg8::A), s) if reg8(s).is_some() => {
            Ok(Encoded::fixed(&[0x80 + reg8(s).unwrap().code()]))
        }
        (Operand::Reg8(Reg8::A), s) if imm(s).is_some() => {
            Ok(Encoded::with_imm(vec![0xC6], 1, imm(s).unwrap(), RelocFlags::empty()))
        }
        _ => bad!(mne),
    }
}

fn encode_alu(ops: &[Operand], mne: Mne, r_base: u8, imm_op: u8) -> Result<Encoded, EncodeError> {
    if ops.len() != 2 {
        return Err(EncodeError::WrongArity(mne, 2, ops.len()));
    }
    if !matches!(&ops[0], Operand::Reg8(Reg8::A)) {
        bad!(mne);
    }
    if let Some(r) = reg8(&ops[1]) {
        return Ok(Encoded::fixed(&[r_base + r.code()]));
    }
    if let Some(e) = imm(&ops[1]) {
        return Ok(Encoded::with_imm(vec![imm_op], 1, e, RelocFlags::empty()));
    }
    bad!(mne)
}

/// `SUB`/`AND`/`XOR`/`OR`/`CP` accept either `A, r`/`A, n8` or the bare
/// single-operand form with `A` implied, matching the original dialect's
/// tolerance for both spellings.
fn encode_alu_a_implicit(ops: &[Operand], mne: Mne, r_base: u8, imm_op: u8) -> Result<Encoded, EncodeError> {
    let rhs = match ops.len() {
        1 => &ops[0],
        2 if matches!(&ops[0], Operand::Reg8(Reg8::A)) => &ops[1],
        _ => return Err(EncodeError::WrongArity(mne, 1, ops.len())),
    };
    if let Some(r) = reg8(rhs) {
        return Ok(Encoded::fixed(&[r_base + r.code()]));
    }
    if let Some(e) = imm(rhs) {
        return Ok(Encoded::with_imm(vec![imm_op], 1, e, RelocFlags::empty()));
    }
    bad!(mne)
}

fn encode_jr(ops: &[Operand], mne: Mne) -> Result<Encoded, EncodeError> {
    match ops.len() {
        1 => {
            let Some(e) = imm(&ops[0]) else { bad!(mne) };
            Ok(Encoded::with_imm(vec![0x18], 1, e, RelocFlags::JP))
        }
        2 => {
            let Some(c) = cond(&ops[0]) else { bad!(mne) };
            let Some(e) = imm(&ops[1]) else { bad!(mne) };
            Ok(Encoded::with_imm(vec![0x20 + c.code() * 8], 1, e, RelocFlags::JP))
        }
        n => Err(EncodeError::WrongArity(mne, 1, n)),
    }
}

fn encode_jp(ops: &[Operand], mne: Mne) -> Result<Encoded, EncodeError> {
    match ops.len() {
        1 => {
            if matches!(&ops[0], Operand::Reg8(Reg8::IndHl)) {
                return Ok(Encoded::fixed(&[0xE9]));
            }
            let Some(e) = imm(&ops[0]) else { bad!(mne) };
            Ok(Encoded::with_imm(vec![0xC3], 2, e, RelocFlags::empty()))
        }
        2 => {
            let Some(c) = cond(&ops[0]) else { bad!(mne) };
            let Some(e) = imm(&ops[1]) else { bad!(mne) };
            Ok(Encoded::with_imm(vec![0xC2 + c.code() * 8], 2, e, RelocFlags::empty()))
        }
        n => Err(EncodeError::WrongArity(mne, 1, n)),
    }
}

fn encode_call(ops: &[Operand], mne: Mne) -> Result<Encoded, EncodeError> {
    match ops.len() {
        1 => {
            let Some(e) = imm(&ops[0]) else { bad!(mne) };
            Ok(Encoded::with_imm(vec![0xCD], 2, e, RelocFlags::empty()))
        }
        2 => {
            let Some(c) = cond(&ops[0]) else { bad!(mne) };
            let Some(e) = imm(&ops[1]) else { bad!(mne) };
            Ok(Encoded::with_imm(vec![0xC4 + c.code() * 8], 2, e, RelocFlags::empty()))
        }
        n => Err(EncodeError::WrongArity(mne, 1, n)),
    }
}

fn encode_rst(ops: &[Operand], mne: Mne) -> Result<Encoded, EncodeError> {
    if ops.len() != 1 {
        return Err(EncodeError::WrongArity(mne, 1, ops.len()));
    }
    let Some(e) = imm(&ops[0]) else { bad!(mne) };
    // The opcode base itself is `0xC7 | vector`, so the immediate does not
    // appear as a trailing byte; it is folded into the opcode by the
    // dispatcher once the vector is known to be constant (spec.md: "RST
    // vector encoding" is assemble-time only, never deferred).
    Ok(Encoded {
        bytes: vec![0xC7],
        imm: Some(PendingImm {
            offset: 0,
            width: 0,
            value: e,
            flags: RelocFlags::RST,
        }),
    })
}

fn encode_cb(ops: &[Operand], mne: Mne, base: u8) -> Result<Encoded, EncodeError> {
    if ops.len() != 1 {
        return Err(EncodeError::WrongArity(mne, 1, ops.len()));
    }
    let Some(r) = reg8(&ops[0]) else { bad!(mne) };
    Ok(Encoded::fixed(&[0xCB, base + r.code()]))
}

fn encode_cb_bit(ops: &[Operand], mne: Mne, base: u8) -> Result<Encoded, EncodeError> {
    if ops.len() != 2 {
        return Err(EncodeError::WrongArity(mne, 2, ops.len()));
    }
    let Operand::Imm(e) = &ops[0] else { bad!(mne) };
    let Some(r) = reg8(&ops[1]) else { bad!(mne) };
    // The bit index must be a constant 0..=7 known at assemble time; the
    // dispatcher resolves `e` before calling in and passes the literal
    // value back through `Operand::Imm` only for uniformity with the
    // other addressing forms.
    let bit = match sm83asm_core::expr::solve(
        e,
        &sm83asm_core::sym::SymTable::new(),
        sm83asm_core::view::View::EMPTY,
        false,
    ) {
        Some(n) if (0..=7).contains(&n) => n as u8,
        _ => bad!(mne),
    };
    Ok(Encoded::fixed(&[0xCB, base + bit * 8 + r.code()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm83asm_core::expr;

    #[test]
    fn nop_is_single_zero_byte() {
        assert_eq!(encode(Mne::Nop, &[]).unwrap().bytes, vec![0x00]);
    }

    #[test]
    fn ld_b_c_is_0x41() {
        let ops = vec![Operand::Reg8(Reg8::B), Operand::Reg8(Reg8::C)];
        assert_eq!(encode(Mne::Ld, &ops).unwrap().bytes, vec![0x41]);
    }

    #[test]
    fn ld_ind_hl_ind_hl_is_rejected_as_halt_slot() {
        let ops = vec![Operand::Reg8(Reg8::IndHl), Operand::Reg8(Reg8::IndHl)];
        assert!(encode(Mne::Ld, &ops).is_err());
    }

    #[test]
    fn push_bc_is_0xc5() {
        let ops = vec![Operand::Reg16(Reg16::Bc)];
        assert_eq!(encode(Mne::Push, &ops).unwrap().bytes, vec![0xC5]);
    }

    #[test]
    fn push_af_is_0xf5() {
        let ops = vec![Operand::Stack(StackReg::Af)];
        assert_eq!(encode(Mne::Push, &ops).unwrap().bytes, vec![0xF5]);
    }

    #[test]
    fn cp_immediate_has_pending_byte() {
        let e = expr::intern(vec![expr::ExprAtom::Const(5)]);
        let ops = vec![Operand::Imm(e)];
        let enc = encode(Mne::Cp, &ops).unwrap();
        assert_eq!(enc.bytes, vec![0xFE, 0x00]);
        assert_eq!(enc.imm.unwrap().width, 1);
    }

    #[test]
    fn bit_3_a_is_0xcb5f() {
        let bitnum = Operand::Imm(expr::intern(vec![expr::ExprAtom::Const(3)]));
        let ops = vec![bitnum, Operand::Reg8(Reg8::A)];
        assert_eq!(encode(Mne::Bit, &ops).unwrap().bytes, vec![0xCB, 0x5F]);
    }

    #[test]
    fn jp_hl_is_0xe9() {
        let ops = vec![Operand::Reg8(Reg8::IndHl)];
        assert_eq!(encode(Mne::Jp, &ops).unwrap().bytes, vec![0xE9]);
    }

    #[test]
    fn jr_condition_sets_jp_reloc_flag() {
        let e = expr::intern(vec![expr::ExprAtom::Const(0)]);
        let ops = vec![Operand::Cond(Cond::Z), Operand::Imm(e)];
        let enc = encode(Mne::Jr, &ops).unwrap();
        assert_eq!(enc.bytes[0], 0x28);
        assert!(enc.imm.unwrap().flags.contains(RelocFlags::JP));
    }

    #[test]
    fn rst_carries_rst_flag_with_no_trailing_byte() {
        let e = expr::intern(vec![expr::ExprAtom::Const(0x10)]);
        let ops = vec![Operand::Imm(e)];
        let enc = encode(Mne::Rst, &ops).unwrap();
        assert_eq!(enc.bytes, vec![0xC7]);
        assert!(enc.imm.unwrap().flags.contains(RelocFlags::RST));
    }

    #[test]
    fn ldh_a_ind_n8_sets_hram_flag() {
        let e = expr::intern(vec![expr::ExprAtom::Const(0x44)]);
        let ops = vec![Operand::Reg8(Reg8::A), Operand::Ind(e)];
        let enc = encode(Mne::Ldh, &ops).unwrap();
        assert_eq!(enc.bytes[0], 0xF0);
        assert!(enc.imm.unwrap().flags.contains(RelocFlags::HRAM));
    }
}
