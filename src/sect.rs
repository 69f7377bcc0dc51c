//! Sections and relocations (spec.md §3 "Section", "Relocation").

use crate::expr::ExprView;
use crate::pos::Pos;
use crate::view::View;

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct RelocFlags: u8 {
        /// Result must lie in `$FF00-$FFFF` (an `LDH`-style operand).
        const HRAM = 1 << 0;
        /// Result must be one of the 8 reset vectors.
        const RST = 1 << 1;
        /// Result is a signed relative-jump displacement.
        const JP = 1 << 2;
    }
}

/// A deferred patch: write the low `width` bytes of `value` at `offset`
/// once the linker can solve it.
#[derive(Clone, Debug)]
pub struct Reloc {
    pub offset: u32,
    /// 1 or 2.
    pub width: u8,
    pub value: ExprView,
    pub unit: View,
    pub pos: Pos,
    pub flags: RelocFlags,
}

/// A named, contiguous byte buffer with its own program counter and
/// relocation list. `pc` always equals `data.len()` once a pass finishes
/// emitting (spec.md §3 invariant); it is tracked separately from
/// `data.len()` during assembly because pass 1 advances `pc` without
/// writing bytes.
#[derive(Clone, Debug, Default)]
pub struct Section {
    pub name: View,
    pub pc: u32,
    pub data: Vec<u8>,
    pub relocs: Vec<Reloc>,
}

impl Section {
    pub fn new(name: View) -> Self {
        Section {
            name,
            pc: 0,
            data: Vec::new(),
            relocs: Vec::new(),
        }
    }

    /// Reset at the start of a pass: PC returns to 0, and on pass 2 the
    /// previously emitted bytes/relocs (from pass 1's dry run, which wrote
    /// neither) are cleared so pass 2 starts from a blank buffer.
    pub fn reset_pc(&mut self) {
        self.pc = 0;
        self.data.clear();
        self.relocs.clear();
    }

    /// Advance `pc` without writing (pass 1).
    pub fn advance(&mut self, n: u32) {
        self.pc += n;
    }

    /// Append bytes and advance `pc` to match (pass 2).
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.pc = self.data.len() as u32;
    }

    pub fn emit_byte(&mut self, b: u8) {
        self.emit_bytes(&[b]);
    }

    pub fn add_reloc(&mut self, reloc: Reloc) {
        self.relocs.push(reloc);
    }

    /// spec.md §3 invariant: `section.pc == |section.data|` at emit time.
    pub fn pc_matches_data_len(&self) -> bool {
        self.pc as usize == self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;
    use crate::view::Pool;

    #[test]
    fn advance_without_emit_moves_pc_only() {
        let mut pool = Pool::new();
        let mut sect = Section::new(pool.intern_str("CODE"));
        sect.advance(3);
        assert_eq!(sect.pc, 3);
        assert!(sect.data.is_empty());
        assert!(!sect.pc_matches_data_len());
    }

    #[test]
    fn emit_bytes_keeps_pc_in_sync() {
        let mut pool = Pool::new();
        let mut sect = Section::new(pool.intern_str("CODE"));
        sect.emit_bytes(&[0x00, 0x01, 0x02]);
        assert_eq!(sect.pc, 3);
        assert!(sect.pc_matches_data_len());
    }

    #[test]
    fn reset_pc_clears_pass_1_state() {
        let mut pool = Pool::new();
        let mut sect = Section::new(pool.intern_str("CODE"));
        sect.advance(10);
        sect.reset_pc();
        assert_eq!(sect.pc, 0);
        assert!(sect.data.is_empty());
    }

    #[test]
    fn reloc_carries_width_and_flags() {
        let mut pool = Pool::new();
        let unit = pool.intern_str("main.s");
        let reloc = Reloc {
            offset: 4,
            width: 1,
            value: expr::intern(vec![expr::ExprAtom::Const(5)]),
            unit,
            pos: Pos::new(View::EMPTY, 1, 1),
            flags: RelocFlags::HRAM,
        };
        assert!(reloc.flags.contains(RelocFlags::HRAM));
        assert!(!reloc.flags.contains(RelocFlags::JP));
    }
}
