//! Object merge, placement, and relocation resolution (spec.md §4.7).
//!
//! The algorithm runs in two rebias stages rather than one:
//!
//! * **Stage A** (per object, as it is merged): every `Addr{section,pc}`
//!   atom in that object's symbols and relocations is rewritten so `pc` is
//!   relative to the *merged* section's start rather than that one
//!   object's own section — the bias is simply how much of the merged
//!   section already exists.
//! * **Stage B** (once every config section has an absolute placement
//!   address): every remaining `Addr{section,pc}` atom is rewritten to
//!   `Const(base + pc)`, an ordinary absolute constant. After that,
//!   `sm83asm_core::expr::solve`'s algorithm is enough to resolve anything
//!   except a `Tag` atom, which only a linker (with the config's section
//!   tags in hand) can answer — see [`link_solve`].
//!
//! Static (non-exported) symbols are re-scoped per object: each
//! [`LoadedObject`] keeps its own [`SymTable`] of everything it defines,
//! looked up only when resolving that object's own relocations
//! (`reloc.unit` names the owning object). A single flat table is used
//! only for `EXPORTED` symbols, where spec.md §4.7 requires uniqueness by
//! label.

use crate::cfg::Config;
use crate::error::LinkError;
use sm83asm_core::expr::{self, ExprAtom, ExprView};
use sm83asm_core::object;
use sm83asm_core::pos::Pos;
use sm83asm_core::sect::{Reloc, RelocFlags, Section};
use sm83asm_core::sym::{Lbl, Sym, SymFlags, SymTable};
use sm83asm_core::view::{Pool, View};
use std::collections::HashMap;
use std::path::Path;

/// Everything one assembled object contributes: its own symbol table
/// (already reinterned into the global pool and Stage-A rebiased), keyed
/// by the unit view used to scope its relocations.
struct LoadedObject {
    unit: View,
    syms: SymTable,
}

fn reintern(v: View, src: &Pool, dst: &mut Pool) -> View {
    dst.intern(v.as_bytes(src))
}

fn reintern_lbl(l: Lbl, src: &Pool, dst: &mut Pool) -> Lbl {
    Lbl {
        scope: reintern(l.scope, src, dst),
        name: reintern(l.name, src, dst),
    }
}

fn reintern_pos(p: Pos, src: &Pool, dst: &mut Pool) -> Pos {
    Pos::new(reintern(p.file, src, dst), p.line, p.col)
}

/// Rewrite one atom: reintern any view it carries into the global pool,
/// and if it is an `Addr` into a section this object touches, add that
/// section's Stage-A bias.
fn rebias_atom(atom: ExprAtom, src: &Pool, dst: &mut Pool, biases: &HashMap<View, u32>) -> ExprAtom {
    match atom {
        ExprAtom::Const(n) => ExprAtom::Const(n),
        ExprAtom::Addr { section, pc } => {
            let section = reintern(section, src, dst);
            let bias = biases.get(&section).copied().unwrap_or(0);
            ExprAtom::Addr {
                section,
                pc: pc.wrapping_add(bias as u16),
            }
        }
        ExprAtom::Op(op) => ExprAtom::Op(op),
        ExprAtom::Label(lbl) => ExprAtom::Label(reintern_lbl(lbl, src, dst)),
        ExprAtom::Tag { lbl, name } => ExprAtom::Tag {
            lbl: reintern_lbl(lbl, src, dst),
            name: reintern(name, src, dst),
        },
        ExprAtom::Rel(lbl) => ExprAtom::Rel(reintern_lbl(lbl, src, dst)),
    }
}

fn rebias_expr(e: &ExprView, src: &Pool, dst: &mut Pool, biases: &HashMap<View, u32>) -> ExprView {
    let atoms: Vec<ExprAtom> = e.iter().map(|a| rebias_atom(*a, src, dst, biases)).collect();
    expr::intern(atoms)
}

/// Stage A: load every object, reinterning its pool into `pool` and
/// folding its sections into the growing `merged` map. Returns the
/// per-object symbol tables plus a flat table of every exported symbol.
fn load_and_merge(
    object_paths: &[impl AsRef<Path>],
    pool: &mut Pool,
) -> Result<(Vec<LoadedObject>, HashMap<View, Section>, SymTable), LinkError> {
    let mut merged: HashMap<View, Section> = HashMap::new();
    let mut loaded = Vec::new();
    let mut export_owner: HashMap<Lbl, View> = HashMap::new();
    let mut exports = SymTable::new();

    for path in object_paths {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let obj = object::read(&bytes)?;
        let obj_pool = &obj.pool;
        let unit = pool.intern_str(&path.display().to_string());

        let mut biases: HashMap<View, u32> = HashMap::new();
        for sect in &obj.sections {
            let gname = reintern(sect.name, obj_pool, pool);
            let bias = merged.get(&gname).map(|s| s.pc).unwrap_or(0);
            biases.insert(gname, bias);
        }

        let mut local = SymTable::new();
        for sym in &obj.syms {
            let lbl = reintern_lbl(sym.lbl, obj_pool, pool);
            let new_sym = Sym {
                lbl,
                value: rebias_expr(&sym.value, obj_pool, pool, &biases),
                unit,
                section: reintern(sym.section, obj_pool, pool),
                pos: reintern_pos(sym.pos, obj_pool, pool),
                flags: sym.flags,
            };
            if new_sym.is_exported() {
                if let Some(&prev_unit) = export_owner.get(&lbl) {
                    if prev_unit != unit {
                        return Err(LinkError::DuplicateExport(
                            lbl.full_name(pool),
                            pool.as_str(prev_unit).to_string(),
                            pool.as_str(unit).to_string(),
                        ));
                    }
                }
                export_owner.insert(lbl, unit);
                exports.insert(new_sym.clone());
            }
            local.insert(new_sym);
        }

        for sect in obj.sections {
            let gname = reintern(sect.name, obj_pool, pool);
            let bias = *biases.get(&gname).unwrap_or(&0);
            let entry = merged.entry(gname).or_insert_with(|| Section::new(gname));
            entry.emit_bytes(&sect.data);
            for reloc in sect.relocs {
                entry.add_reloc(Reloc {
                    offset: reloc.offset + bias,
                    width: reloc.width,
                    value: rebias_expr(&reloc.value, obj_pool, pool, &biases),
                    unit,
                    pos: reintern_pos(reloc.pos, obj_pool, pool),
                    flags: reloc.flags,
                });
            }
        }

        loaded.push(LoadedObject { unit, syms: local });
    }

    Ok((loaded, merged, exports))
}

fn align_up(n: u32, align: u32) -> u32 {
    if align <= 1 {
        return n;
    }
    let rem = n % align;
    if rem == 0 {
        n
    } else {
        n + (align - rem)
    }
}

/// Placement step (spec.md §4.7 step 3): walk each config section in
/// declared order, assigning it the next aligned address in its target
/// memory. Returns each section's absolute base address.
fn place(cfg: &Config, merged: &HashMap<View, Section>, pool: &Pool) -> Result<HashMap<View, u32>, LinkError> {
    let mut cursor: HashMap<View, u32> = HashMap::new();
    let mut bases = HashMap::new();
    for sect in &cfg.sects {
        let mem = cfg
            .find_mem(sect.load, pool)
            .expect("cfg::parse already validated every section's load memory");
        let cur = *cursor.entry(mem.name).or_insert(mem.start);
        let aligned = align_up(cur, sect.align);
        let len = merged.get(&sect.name).map(|s| s.data.len() as u32).unwrap_or(0);
        let limit = mem.start + mem.size;
        if aligned + len > limit {
            return Err(LinkError::Overflow(
                pool.as_str(sect.name).to_string(),
                len,
                pool.as_str(mem.name).to_string(),
                limit.saturating_sub(aligned),
            ));
        }
        bases.insert(sect.name, aligned);
        cursor.insert(mem.name, aligned + len);
    }
    Ok(bases)
}

/// Stage B: an `Addr{section,pc}` atom surviving Stage A is a reference to
/// a section whose absolute start is now known; fold it into a plain
/// constant. An atom for a section never placed by any config entry is
/// left untouched, which surfaces as a `NotConstant` error when resolved.
fn rebase_atom(atom: ExprAtom, bases: &HashMap<View, u32>) -> ExprAtom {
    match atom {
        ExprAtom::Addr { section, pc } => match bases.get(&section) {
            Some(base) => ExprAtom::Const((*base + pc as u32) as i32),
            None => atom,
        },
        other => other,
    }
}

fn rebase_expr(e: &ExprView, bases: &HashMap<View, u32>) -> ExprView {
    let atoms: Vec<ExprAtom> = e.iter().map(|a| rebase_atom(*a, bases)).collect();
    expr::intern(atoms)
}

fn rebase_symtable(tbl: &SymTable, bases: &HashMap<View, u32>) -> SymTable {
    let mut out = SymTable::new();
    for sym in tbl.iter() {
        let mut s = sym.clone();
        s.value = rebase_expr(&s.value, bases);
        out.insert(s);
    }
    out
}

/// A link-time expression evaluator. Mirrors `expr::solve`'s postfix stack
/// machine exactly (reusing its `apply_unary`/`apply_binary`), adding the
/// one case `solve` can never handle: a `Tag` atom, resolved by finding the
/// governing config section and looking up the tag name in it.
fn link_solve(expr: &[ExprAtom], syms: &SymTable, cfg: &Config) -> Option<i32> {
    let mut stack: Vec<i32> = Vec::with_capacity(expr.len());
    for atom in expr {
        match *atom {
            ExprAtom::Const(n) => stack.push(n),
            ExprAtom::Label(lbl) | ExprAtom::Rel(lbl) => {
                let sym = syms.find(lbl)?;
                stack.push(link_solve(&sym.value, syms, cfg)?);
            }
            ExprAtom::Addr { pc, .. } => stack.push(pc as i32),
            ExprAtom::Tag { lbl, name } => {
                let sym = syms.find(lbl)?;
                let sect = cfg.sects.iter().find(|s| s.name == sym.section)?;
                stack.push(*sect.tags.get(&name)?);
            }
            ExprAtom::Op(op) => {
                if expr::is_unary(op) {
                    let rhs = stack.pop()?;
                    stack.push(expr::apply_unary(op, rhs));
                } else {
                    let rhs = stack.pop()?;
                    let lhs = stack.pop()?;
                    stack.push(expr::apply_binary(op, lhs, rhs)?);
                }
            }
        }
    }
    if stack.len() != 1 {
        return None;
    }
    stack.pop()
}

/// Solve one relocation's value and, for `JP`, convert it to a
/// displacement relative to `reloc_offset + 1` (spec.md §4.7 step 4),
/// mirroring `smasm`'s assemble-time fast path exactly.
fn resolve_reloc(reloc: &Reloc, abs_offset: u32, syms: &SymTable, cfg: &Config, sect_name: View, pool: &Pool) -> Result<i32, LinkError> {
    let n = link_solve(&reloc.value, syms, cfg)
        .ok_or_else(|| LinkError::NotConstant(pool.as_str(sect_name).to_string()))?;
    if reloc.flags.contains(RelocFlags::JP) {
        Ok(n - (abs_offset as i32 + 1))
    } else {
        Ok(n)
    }
}

fn write_reloc_bytes(value: i32, reloc: &Reloc, sect_name: View, out: &mut [u8], pool: &Pool) -> Result<(), LinkError> {
    let offset = reloc.offset as usize;
    if reloc.flags.contains(RelocFlags::HRAM) {
        if !(0xFF00..=0xFFFF).contains(&value) {
            return Err(LinkError::NotHram(pool.as_str(sect_name).to_string()));
        }
        out[offset] = (value & 0xFF) as u8;
        return Ok(());
    }
    if reloc.flags.contains(RelocFlags::JP) {
        if !(-128..=127).contains(&value) {
            return Err(LinkError::RelocOutOfRange(pool.as_str(sect_name).to_string(), 1));
        }
        out[offset] = value as i8 as u8;
        return Ok(());
    }
    // RST relocations are always folded at assemble time and never reach
    // the object file format (see DESIGN.md); handled here only so the
    // linker mirrors spec.md §4.7 step 4 in full.
    if reloc.flags.contains(RelocFlags::RST) {
        if !(0..=0x38).contains(&value) || value % 8 != 0 {
            return Err(LinkError::NotRstVector(pool.as_str(sect_name).to_string()));
        }
        out[offset] |= value as u8;
        return Ok(());
    }
    match reloc.width {
        1 => {
            if !expr::can_repr_u8(value) && !expr::can_repr_i8(value) {
                return Err(LinkError::RelocOutOfRange(pool.as_str(sect_name).to_string(), 1));
            }
            out[offset] = (value & 0xFF) as u8;
        }
        2 => {
            if !expr::can_repr_u16(value) && !(i16::MIN as i32..=i16::MAX as i32).contains(&value) {
                return Err(LinkError::RelocOutOfRange(pool.as_str(sect_name).to_string(), 2));
            }
            let v = value as u16;
            out[offset] = (v & 0xFF) as u8;
            out[offset + 1] = (v >> 8) as u8;
        }
        _ => unreachable!("widths are only ever 1 or 2"),
    }
    Ok(())
}

/// The fully-resolved result of a link: the flat ROM image, the merged
/// export table (values now absolute constants), and each config
/// section's placement address — enough for `symfile`/`tags` to render
/// without touching the linker internals again.
pub struct LinkResult {
    pub image: Vec<u8>,
    pub exports: SymTable,
    pub bases: HashMap<View, u32>,
}

/// Run the full five-step algorithm (spec.md §4.7): load/merge, place,
/// rebase, resolve, fill.
pub fn link(cfg: &Config, object_paths: &[impl AsRef<Path>], defines: &[(String, i32)], pool: &mut Pool) -> Result<LinkResult, LinkError> {
    let (loaded, mut merged, mut exports) = load_and_merge(object_paths, pool)?;

    for (name, value) in defines {
        let lbl = Lbl::global(pool.intern_str(name));
        let unit = pool.intern_str("@EXPORT");
        exports.insert(Sym {
            lbl,
            value: expr::intern(vec![ExprAtom::Const(*value)]),
            unit,
            section: View::EMPTY,
            pos: Pos::new(unit, 0, 0),
            flags: SymFlags::EQU | SymFlags::EXPORTED,
        });
    }

    let bases = place(cfg, &merged, pool)?;

    exports = rebase_symtable(&exports, &bases);
    let loaded: Vec<LoadedObject> = loaded
        .into_iter()
        .map(|o| LoadedObject {
            unit: o.unit,
            syms: rebase_symtable(&o.syms, &bases),
        })
        .collect();
    for sect in merged.values_mut() {
        for reloc in sect.relocs.iter_mut() {
            reloc.value = rebase_expr(&reloc.value, &bases);
        }
    }

    let combined_by_unit: HashMap<View, SymTable> = loaded
        .iter()
        .map(|o| {
            let mut combined = SymTable::new();
            for sym in exports.iter() {
                combined.insert(sym.clone());
            }
            for sym in o.syms.iter() {
                combined.insert(sym.clone());
            }
            (o.unit, combined)
        })
        .collect();

    // Final resolve + fill: one output buffer per memory, pre-filled with
    // that memory's fill byte, sections copied in at their placement
    // address with every relocation patched in place.
    let mut mem_bufs: HashMap<View, Vec<u8>> = cfg
        .mems
        .iter()
        .map(|m| (m.name, vec![m.fill; m.size as usize]))
        .collect();

    for sect in &cfg.sects {
        let mem = cfg.find_mem(sect.load, pool).expect("validated by cfg::parse");
        let base = bases[&sect.name];
        let merged_sect = match merged.get(&sect.name) {
            Some(s) => s,
            None => continue,
        };
        let mut img = merged_sect.data.clone();
        for reloc in &merged_sect.relocs {
            let abs_offset = base + reloc.offset;
            let empty = SymTable::new();
            let syms = combined_by_unit.get(&reloc.unit).unwrap_or(&empty);
            let value = resolve_reloc(reloc, abs_offset, syms, cfg, sect.name, pool)?;
            write_reloc_bytes(value, reloc, sect.name, &mut img, pool)?;
        }
        let buf = mem_bufs.get_mut(&mem.name).expect("buffer allocated for every memory");
        let start = (base - mem.start) as usize;
        buf[start..start + img.len()].copy_from_slice(&img);
    }

    // Concatenate in config declaration order (spec.md leaves final image
    // assembly order unspecified; see DESIGN.md).
    let mut image = Vec::new();
    for mem in &cfg.mems {
        image.extend_from_slice(&mem_bufs[&mem.name]);
    }

    Ok(LinkResult { image, exports, bases })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("smold_link_test_{}_{}", std::process::id(), name));
        p
    }

    #[test]
    fn places_a_single_section_and_resolves_a_reference() {
        let obj_path = temp_path("a.smo");
        let mut obj_pool = Pool::new();
        let code = obj_pool.intern_str("CODE");
        let lbl = Lbl::global(obj_pool.intern_str("start"));
        let unit = obj_pool.intern_str("a.s");

        let mut section = Section::new(code);
        section.emit_bytes(&[0x00, 0x00, 0x00]);
        section.add_reloc(Reloc {
            offset: 1,
            width: 2,
            value: expr::intern(vec![ExprAtom::Label(lbl)]),
            unit,
            pos: Pos::new(View::EMPTY, 1, 1),
            flags: RelocFlags::empty(),
        });

        let mut writer = object::Writer::new(&obj_pool);
        writer.add_sym(Sym {
            lbl,
            value: expr::intern(vec![ExprAtom::Addr { section: code, pc: 0 }]),
            unit,
            section: code,
            pos: Pos::new(View::EMPTY, 1, 1),
            flags: SymFlags::EXPORTED,
        });
        writer.add_section(section);
        std::fs::write(&obj_path, writer.finish()).unwrap();

        let cfg_path = temp_path("a.cfg");
        std::fs::write(
            &cfg_path,
            "memories { ROM0 { start = $0000, size = $10, kind = readonly } }\n\
             sections { CODE { load = ROM0, kind = code } }",
        )
        .unwrap();

        let mut pool = Pool::new();
        let cfg = crate::cfg::parse(&cfg_path, &mut pool).unwrap();
        let result = link(&cfg, &[obj_path.clone()], &[], &mut pool).unwrap();

        assert_eq!(result.image.len(), 0x10);
        // The reference resolves to the section's own placement base (0),
        // written little-endian at offset 1.
        assert_eq!(&result.image[0..3], &[0x00, 0x00, 0x00]);

        std::fs::remove_file(&obj_path).ok();
        std::fs::remove_file(&cfg_path).ok();
    }

    #[test]
    fn duplicate_export_across_objects_is_fatal() {
        let mk_object = |path: &std::path::Path| {
            let mut pool = Pool::new();
            let lbl = Lbl::global(pool.intern_str("shared"));
            let unit = pool.intern_str("u");
            let mut writer = object::Writer::new(&pool);
            writer.add_sym(Sym {
                lbl,
                value: expr::intern(vec![ExprAtom::Const(1)]),
                unit,
                section: View::EMPTY,
                pos: Pos::new(View::EMPTY, 1, 1),
                flags: SymFlags::EXPORTED,
            });
            std::fs::write(path, writer.finish()).unwrap();
        };
        let a = temp_path("dup_a.smo");
        let b = temp_path("dup_b.smo");
        mk_object(&a);
        mk_object(&b);

        let cfg_path = temp_path("dup.cfg");
        std::fs::write(&cfg_path, "memories { ROM0 { size = $10 } }\nsections { }").unwrap();
        let mut pool = Pool::new();
        let cfg = crate::cfg::parse(&cfg_path, &mut pool).unwrap();

        let err = link(&cfg, &[a.clone(), b.clone()], &[], &mut pool).unwrap_err();
        assert!(matches!(err, LinkError::DuplicateExport(..)));

        std::fs::remove_file(&a).ok();
        std::fs::remove_file(&b).ok();
        std::fs::remove_file(&cfg_path).ok();
    }
}
