//! The object file codec (spec.md §4.6).
//!
//! A deterministic, little-endian, positional format: a magic number, then
//! four pools/tables written in order (string pool, expression pool,
//! symbol table, section table), with every later structure referencing
//! the pools by offset + length rather than embedding copies.
//!
//! Serialization follows the teacher's `WritableBuffer` idiom
//! (`src/write/util.rs`: reserve once, then append) adapted to a single
//! format instead of per-architecture object writers; deserialization
//! follows the teacher's `ReadRef` idiom (`src/read/read_ref.rs`): a
//! cursor over a borrowed byte slice with bounds-checked reads, adapted to
//! read our own variable-width records instead of fixed-size `Pod` types.

use crate::expr::{ExprAtom, ExprView, OpTok};
use crate::pos::Pos;
use crate::sect::{Reloc, RelocFlags, Section};
use crate::sym::{Lbl, Sym, SymFlags};
use crate::view::{Pool, View};
use hashbrown::HashMap;
use std::rc::Rc;
use thiserror::Error;

pub const MAGIC: [u8; 4] = *b"SM00";

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("not an object file (bad magic)")]
    BadMagic,
    #[error("truncated object file")]
    Truncated,
    #[error("expression reference out of bounds")]
    BadExprRef,
    #[error("string reference out of bounds")]
    BadStringRef,
    #[error("unrecognized expression atom tag: {0}")]
    BadAtomTag(u8),
    #[error("unrecognized operator code: {0}")]
    BadOpTok(u8),
}

type Result<T> = std::result::Result<T, ObjectError>;

/// An offset + length into the object's flat `string_pool`.
#[derive(Clone, Copy, Debug)]
struct BufRef {
    offset: u32,
    len: u32,
}

/// An offset + length into the object's flat `expr_pool` (measured in
/// atoms, not bytes — see [`Writer::add_expr`]).
#[derive(Clone, Copy, Debug)]
struct ExprBufRef {
    offset: u32,
    len: u32,
}

fn op_to_u8(op: OpTok) -> u8 {
    use OpTok::*;
    match op {
        Add => 0,
        Sub => 1,
        Mul => 2,
        Div => 3,
        Mod => 4,
        Shl => 5,
        Asr => 6,
        Lsr => 7,
        Lt => 8,
        Gt => 9,
        Le => 10,
        Ge => 11,
        Eq => 12,
        Ne => 13,
        BitAnd => 14,
        BitOr => 15,
        BitXor => 16,
        LogAnd => 17,
        LogOr => 18,
        Not => 19,
        BitNot => 20,
        LowByte => 21,
        MidByte => 22,
        HighByte => 23,
        Pos => 24,
        Neg => 25,
    }
}

fn u8_to_op(b: u8) -> Result<OpTok> {
    use OpTok::*;
    Ok(match b {
        0 => Add,
        1 => Sub,
        2 => Mul,
        3 => Div,
        4 => Mod,
        5 => Shl,
        6 => Asr,
        7 => Lsr,
        8 => Lt,
        9 => Gt,
        10 => Le,
        11 => Ge,
        12 => Eq,
        13 => Ne,
        14 => BitAnd,
        15 => BitOr,
        16 => BitXor,
        17 => LogAnd,
        18 => LogOr,
        19 => Not,
        20 => BitNot,
        21 => LowByte,
        22 => MidByte,
        23 => HighByte,
        24 => Pos,
        25 => Neg,
        other => return Err(ObjectError::BadOpTok(other)),
    })
}

/// Serializes a completed assembly unit (its symbols and sections) into
/// the `SM00` wire format. One writer per object file.
pub struct Writer<'p> {
    pool: &'p Pool,
    strings: Vec<u8>,
    string_refs: HashMap<View, BufRef>,
    atoms: Vec<ExprAtom>,
    syms: Vec<Sym>,
    sections: Vec<Section>,
}

impl<'p> Writer<'p> {
    pub fn new(pool: &'p Pool) -> Self {
        Writer {
            pool,
            strings: Vec::new(),
            string_refs: HashMap::new(),
            atoms: Vec::new(),
            syms: Vec::new(),
            sections: Vec::new(),
        }
    }

    fn intern_ref(&mut self, v: View) -> BufRef {
        if let Some(r) = self.string_refs.get(&v) {
            return *r;
        }
        let bytes = v.as_bytes(self.pool);
        let r = BufRef {
            offset: self.strings.len() as u32,
            len: bytes.len() as u32,
        };
        self.strings.extend_from_slice(bytes);
        self.string_refs.insert(v, r);
        r
    }

    /// Append `atoms` to the flat expression pool, returning a reference
    /// to the contiguous run just written. Expressions are not
    /// content-deduplicated (unlike the string pool); the `Rc` sharing in
    /// [`crate::expr::ExprView`] already avoids most duplication in
    /// memory, and wire-format size is not a design goal here.
    pub fn add_expr(&mut self, expr: &ExprView) -> ExprBufRefHandle {
        let offset = self.atoms.len() as u32;
        self.atoms.extend_from_slice(expr);
        ExprBufRefHandle(ExprBufRef {
            offset,
            len: expr.len() as u32,
        })
    }

    pub fn add_sym(&mut self, sym: Sym) {
        self.syms.push(sym);
    }

    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    fn write_lbl(&mut self, out: &mut Vec<u8>, lbl: Lbl) {
        if lbl.is_global() {
            out.push(1);
        } else {
            out.push(0);
            let scope = self.intern_ref(lbl.scope);
            write_bufref(out, scope);
        }
        let name = self.intern_ref(lbl.name);
        write_bufref(out, name);
    }

    fn write_pos(&mut self, out: &mut Vec<u8>, pos: Pos) {
        let file = self.intern_ref(pos.file);
        write_bufref(out, file);
        out.extend_from_slice(&pos.line.to_le_bytes());
        out.extend_from_slice(&pos.col.to_le_bytes());
    }

    /// Touch every view an atom references so it is registered in the
    /// string pool before that pool's length is written out. Must run
    /// over every atom before `finish` emits `string_pool`, since
    /// `write_atom` itself calls `intern_ref` and would otherwise grow
    /// `self.strings` after its length prefix was already serialized.
    fn register_atom_refs(&mut self, atom: &ExprAtom) {
        match *atom {
            ExprAtom::Const(_) | ExprAtom::Op(_) => {}
            ExprAtom::Addr { section, .. } => {
                self.intern_ref(section);
            }
            ExprAtom::Label(lbl) | ExprAtom::Rel(lbl) => {
                self.intern_ref(lbl.name);
                if !lbl.is_global() {
                    self.intern_ref(lbl.scope);
                }
            }
            ExprAtom::Tag { lbl, name } => {
                self.intern_ref(lbl.name);
                if !lbl.is_global() {
                    self.intern_ref(lbl.scope);
                }
                self.intern_ref(name);
            }
        }
    }

    fn write_atom(&mut self, out: &mut Vec<u8>, atom: ExprAtom) {
        match atom {
            ExprAtom::Const(n) => {
                out.push(0);
                out.extend_from_slice(&(n as u32).to_le_bytes());
            }
            ExprAtom::Addr { section, pc } => {
                out.push(1);
                let r = self.intern_ref(section);
                write_bufref(out, r);
                out.extend_from_slice(&(pc as u32).to_le_bytes());
            }
            ExprAtom::Op(op) => {
                out.push(2);
                out.push(op_to_u8(op));
                out.push(crate::expr::is_unary(op) as u8);
            }
            ExprAtom::Label(lbl) => {
                out.push(3);
                self.write_lbl(out, lbl);
            }
            ExprAtom::Tag { lbl, name } => {
                out.push(4);
                self.write_lbl(out, lbl);
                let r = self.intern_ref(name);
                write_bufref(out, r);
            }
            ExprAtom::Rel(lbl) => {
                out.push(5);
                self.write_lbl(out, lbl);
            }
        }
    }

    /// Serialize the whole object: magic, string pool, expression pool,
    /// symbol table, section table, in that order (spec.md §4.6).
    pub fn finish(mut self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);

        // Symbols and sections reference the string/expr pools, so their
        // bodies must be serialized (growing those pools) before the pool
        // headers are written; buffer them separately first.
        let mut sym_body = Vec::new();
        let syms = std::mem::take(&mut self.syms);
        for sym in &syms {
            self.write_lbl(&mut sym_body, sym.lbl);
            let value_ref = self.add_expr(&sym.value).0;
            write_exprbufref(&mut sym_body, value_ref);
            let unit = self.intern_ref(sym.unit);
            write_bufref(&mut sym_body, unit);
            let section = self.intern_ref(sym.section);
            write_bufref(&mut sym_body, section);
            self.write_pos(&mut sym_body, sym.pos);
            sym_body.push(sym.flags.bits());
        }

        let mut sect_body = Vec::new();
        let sections = std::mem::take(&mut self.sections);
        for section in &sections {
            let name = self.intern_ref(section.name);
            write_bufref(&mut sect_body, name);
            sect_body.extend_from_slice(&(section.data.len() as u32).to_le_bytes());
            sect_body.extend_from_slice(&section.data);
            sect_body.extend_from_slice(&(section.relocs.len() as u32).to_le_bytes());
            for reloc in &section.relocs {
                sect_body.extend_from_slice(&reloc.offset.to_le_bytes());
                sect_body.push(reloc.width);
                let value_ref = self.add_expr(&reloc.value).0;
                write_exprbufref(&mut sect_body, value_ref);
                let unit = self.intern_ref(reloc.unit);
                write_bufref(&mut sect_body, unit);
                self.write_pos(&mut sect_body, reloc.pos);
                sect_body.push(reloc.flags.bits());
            }
        }

        // Every atom that references a view (Addr/Label/Tag/Rel) must be
        // registered before string_pool's length is written, since
        // write_atom below would otherwise intern new bytes after that
        // length prefix is already on the wire.
        let atoms = std::mem::take(&mut self.atoms);
        for atom in &atoms {
            self.register_atom_refs(atom);
        }

        // string_pool
        out.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.strings);

        // expr_pool
        let mut atom_bytes = Vec::new();
        for atom in &atoms {
            self.write_atom(&mut atom_bytes, *atom);
        }
        out.extend_from_slice(&(atoms.len() as u32).to_le_bytes());
        out.extend_from_slice(&atom_bytes);

        out.extend_from_slice(&(syms.len() as u32).to_le_bytes());
        out.extend_from_slice(&sym_body);

        out.extend_from_slice(&(sections.len() as u32).to_le_bytes());
        out.extend_from_slice(&sect_body);

        out
    }
}

/// Opaque handle returned by [`Writer::add_expr`]; only the writer's
/// `finish` needs the concrete offsets.
pub struct ExprBufRefHandle(ExprBufRef);

fn write_bufref(out: &mut Vec<u8>, r: BufRef) {
    out.extend_from_slice(&r.offset.to_le_bytes());
    out.extend_from_slice(&r.len.to_le_bytes());
}

fn write_exprbufref(out: &mut Vec<u8>, r: ExprBufRef) {
    out.extend_from_slice(&r.offset.to_le_bytes());
    out.extend_from_slice(&r.len.to_le_bytes());
}

/// A bounds-checked cursor over a borrowed object-file byte slice, in the
/// shape of the teacher's `ReadRef` (`src/read/read_ref.rs`): every read
/// advances an explicit offset and fails closed rather than panicking.
struct Cursor<'d> {
    data: &'d [u8],
    offset: usize,
}

impl<'d> Cursor<'d> {
    fn new(data: &'d [u8]) -> Self {
        Cursor { data, offset: 0 }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'d [u8]> {
        let start = self.offset;
        let end = start.checked_add(n).ok_or(ObjectError::Truncated)?;
        let slice = self.data.get(start..end).ok_or(ObjectError::Truncated)?;
        self.offset = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_bufref(&mut self) -> Result<BufRef> {
        Ok(BufRef {
            offset: self.read_u32()?,
            len: self.read_u32()?,
        })
    }

    fn read_exprbufref(&mut self) -> Result<ExprBufRef> {
        Ok(ExprBufRef {
            offset: self.read_u32()?,
            len: self.read_u32()?,
        })
    }
}

/// The fully-reconstructed contents of one object file: the pool needed
/// to resolve every view it references, plus its symbols and sections.
pub struct ObjectFile {
    pub pool: Pool,
    pub syms: Vec<Sym>,
    pub sections: Vec<Section>,
}

struct Reader<'d> {
    cur: Cursor<'d>,
    pool: Pool,
    /// Maps each distinct `(offset, len)` span in the on-disk string pool
    /// to the `View` it was interned as, so repeated `BufRef`s (the same
    /// label name reused by many symbols) share one `View` just as they
    /// did in the writer's pool.
    string_cache: HashMap<(u32, u32), View>,
    string_pool: &'d [u8],
    atoms: Vec<ExprAtom>,
}

impl<'d> Reader<'d> {
    fn resolve(&mut self, r: BufRef) -> Result<View> {
        if let Some(v) = self.string_cache.get(&(r.offset, r.len)) {
            return Ok(*v);
        }
        let bytes = self
            .string_pool
            .get(r.offset as usize..(r.offset + r.len) as usize)
            .ok_or(ObjectError::BadStringRef)?;
        let v = self.pool.intern(bytes);
        self.string_cache.insert((r.offset, r.len), v);
        Ok(v)
    }

    fn read_lbl(&mut self) -> Result<Lbl> {
        let is_global = self.cur.read_u8()? != 0;
        let scope = if is_global {
            View::EMPTY
        } else {
            let r = self.cur.read_bufref()?;
            self.resolve(r)?
        };
        let name_ref = self.cur.read_bufref()?;
        let name = self.resolve(name_ref)?;
        Ok(Lbl { scope, name })
    }

    fn read_pos(&mut self) -> Result<Pos> {
        let file_ref = self.cur.read_bufref()?;
        let file = self.resolve(file_ref)?;
        let line = self.cur.read_u32()?;
        let col = self.cur.read_u32()?;
        Ok(Pos::new(file, line, col))
    }

    fn read_expr_ref(&self, r: ExprBufRef) -> Result<ExprView> {
        let start = r.offset as usize;
        let end = start
            .checked_add(r.len as usize)
            .ok_or(ObjectError::BadExprRef)?;
        let slice = self.atoms.get(start..end).ok_or(ObjectError::BadExprRef)?;
        Ok(Rc::from(slice))
    }

    fn read_atom(&mut self) -> Result<ExprAtom> {
        let tag = self.cur.read_u8()?;
        Ok(match tag {
            0 => ExprAtom::Const(self.cur.read_u32()? as i32),
            1 => {
                let r = self.cur.read_bufref()?;
                let section = self.resolve(r)?;
                let pc = self.cur.read_u32()? as u16;
                ExprAtom::Addr { section, pc }
            }
            // Symmetric `(tok, unary)` read order: the reference
            // deserializer read `unary` twice and never read `tok` at all
            // (spec.md §9 open question); this reads both fields in the
            // order they were written.
            2 => {
                let tok = u8_to_op(self.cur.read_u8()?)?;
                let _unary = self.cur.read_u8()?;
                ExprAtom::Op(tok)
            }
            3 => ExprAtom::Label(self.read_lbl()?),
            4 => {
                let lbl = self.read_lbl()?;
                let r = self.cur.read_bufref()?;
                let name = self.resolve(r)?;
                ExprAtom::Tag { lbl, name }
            }
            5 => ExprAtom::Rel(self.read_lbl()?),
            other => return Err(ObjectError::BadAtomTag(other)),
        })
    }
}

/// Deserialize an object file, reconstructing a fresh [`Pool`] plus
/// symbol and section tables that reference views into it. All
/// pool/expr-pool references are bounds-checked against the pools
/// actually present (spec.md §4.6 "all later references are validated to
/// lie inside their pool.").
pub fn read(data: &[u8]) -> Result<ObjectFile> {
    let mut cur = Cursor::new(data);
    let magic = cur.read_bytes(4)?;
    if magic != MAGIC {
        return Err(ObjectError::BadMagic);
    }

    let string_len = cur.read_u32()? as usize;
    let string_pool = cur.read_bytes(string_len)?;

    let mut reader = Reader {
        cur,
        pool: Pool::new(),
        string_cache: HashMap::new(),
        string_pool,
        atoms: Vec::new(),
    };

    let atom_count = reader.cur.read_u32()? as usize;
    let mut atoms = Vec::with_capacity(atom_count);
    for _ in 0..atom_count {
        let atom = reader.read_atom()?;
        atoms.push(atom);
    }
    reader.atoms = atoms;

    let sym_count = reader.cur.read_u32()? as usize;
    let mut syms = Vec::with_capacity(sym_count);
    for _ in 0..sym_count {
        let lbl = reader.read_lbl()?;
        let value_ref = reader.cur.read_exprbufref()?;
        let value = reader.read_expr_ref(value_ref)?;
        let unit_ref = reader.cur.read_bufref()?;
        let unit = reader.resolve(unit_ref)?;
        let section_ref = reader.cur.read_bufref()?;
        let section = reader.resolve(section_ref)?;
        let pos = reader.read_pos()?;
        let flags = SymFlags::from_bits_truncate(reader.cur.read_u8()?);
        syms.push(Sym {
            lbl,
            value,
            unit,
            section,
            pos,
            flags,
        });
    }

    let section_count = reader.cur.read_u32()? as usize;
    let mut sections = Vec::with_capacity(section_count);
    for _ in 0..section_count {
        let name_ref = reader.cur.read_bufref()?;
        let name = reader.resolve(name_ref)?;
        let data_len = reader.cur.read_u32()? as usize;
        let data = reader.cur.read_bytes(data_len)?.to_vec();
        let reloc_count = reader.cur.read_u32()? as usize;
        let mut relocs = Vec::with_capacity(reloc_count);
        for _ in 0..reloc_count {
            let offset = reader.cur.read_u32()?;
            let width = reader.cur.read_u8()?;
            let value_ref = reader.cur.read_exprbufref()?;
            let value = reader.read_expr_ref(value_ref)?;
            let unit_ref = reader.cur.read_bufref()?;
            let unit = reader.resolve(unit_ref)?;
            let pos = reader.read_pos()?;
            let flags = RelocFlags::from_bits_truncate(reader.cur.read_u8()?);
            relocs.push(Reloc {
                offset,
                width,
                value,
                unit,
                pos,
                flags,
            });
        }
        sections.push(Section {
            name,
            pc: data.len() as u32,
            data,
            relocs,
        });
    }

    Ok(ObjectFile {
        pool: reader.pool,
        syms,
        sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;

    #[test]
    fn round_trips_a_constant_symbol() {
        let mut pool = Pool::new();
        let name = pool.intern_str("VERSION");
        let unit = pool.intern_str("main.s");
        let lbl = Lbl::global(name);
        let mut writer = Writer::new(&pool);
        writer.add_sym(Sym {
            lbl,
            value: expr::intern(vec![expr::ExprAtom::Const(14)]),
            unit,
            section: View::EMPTY,
            pos: Pos::new(unit, 1, 1),
            flags: SymFlags::EQU,
        });
        let bytes = writer.finish();

        let obj = read(&bytes).expect("round trip");
        assert_eq!(obj.syms.len(), 1);
        let sym = &obj.syms[0];
        assert_eq!(obj.pool.as_str(sym.lbl.name), "VERSION");
        assert!(sym.flags.contains(SymFlags::EQU));
        let v = expr::solve(&sym.value, &crate::sym::SymTable::new(), View::EMPTY, false);
        assert_eq!(v, Some(14));
    }

    #[test]
    fn round_trips_a_section_with_a_relocation() {
        let mut pool = Pool::new();
        let name = pool.intern_str("CODE");
        let unit = pool.intern_str("main.s");
        let target = Lbl::global(pool.intern_str("end"));
        let mut section = Section::new(name);
        section.emit_bytes(&[0x18, 0x00]);
        section.add_reloc(Reloc {
            offset: 1,
            width: 1,
            value: expr::intern(vec![expr::ExprAtom::Rel(target)]),
            unit,
            pos: Pos::new(unit, 2, 1),
            flags: RelocFlags::JP,
        });
        let mut writer = Writer::new(&pool);
        writer.add_section(section);
        let bytes = writer.finish();

        let obj = read(&bytes).expect("round trip");
        assert_eq!(obj.sections.len(), 1);
        let sect = &obj.sections[0];
        assert_eq!(obj.pool.as_str(sect.name), "CODE");
        assert_eq!(sect.data, vec![0x18, 0x00]);
        assert_eq!(sect.relocs.len(), 1);
        assert!(sect.relocs[0].flags.contains(RelocFlags::JP));
        match sect.relocs[0].value[0] {
            ExprAtom::Rel(lbl) => assert_eq!(obj.pool.as_str(lbl.name), "end"),
            _ => panic!("expected a Rel atom"),
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = read(b"XXXX").unwrap_err();
        assert!(matches!(err, ObjectError::BadMagic));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let err = read(b"SM00").unwrap_err();
        assert!(matches!(err, ObjectError::Truncated));
    }

    #[test]
    fn scoped_label_round_trips_scope_and_name() {
        let mut pool = Pool::new();
        let scope = pool.intern_str("Start");
        let name = pool.intern_str("loop");
        let lbl = Lbl::scoped(scope, name);
        let unit = pool.intern_str("main.s");
        let mut writer = Writer::new(&pool);
        writer.add_sym(Sym {
            lbl,
            value: expr::intern(vec![expr::ExprAtom::Const(0)]),
            unit,
            section: View::EMPTY,
            pos: Pos::new(unit, 1, 1),
            flags: SymFlags::empty(),
        });
        let bytes = writer.finish();
        let obj = read(&bytes).unwrap();
        assert!(!obj.syms[0].lbl.is_global());
        assert_eq!(obj.pool.as_str(obj.syms[0].lbl.scope), "Start");
        assert_eq!(obj.pool.as_str(obj.syms[0].lbl.name), "loop");
    }
}
