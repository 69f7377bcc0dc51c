//! The `-g SYMFILE` writer (spec.md §6): one `BANK:ADDR name` line per
//! exported symbol. A thin formatter over the already-resolved export
//! table — by the time this runs every value is a plain constant, so it
//! only needs to sort and print.

use crate::cfg::Config;
use sm83asm_core::expr;
use sm83asm_core::sym::{Sym, SymTable};
use sm83asm_core::view::Pool;
use std::io::{self, Write};

/// The `bank` tag on a symbol's governing config section, or `0` when the
/// section carries none (single-bank memories need no tag at all).
fn bank_of(sym: &Sym, cfg: &Config, pool: &Pool) -> i32 {
    let Some(sect) = cfg.sects.iter().find(|s| s.name == sym.section) else {
        return 0;
    };
    for (name, value) in sect.tags.iter() {
        if pool.as_str(*name) == "bank" {
            return *value;
        }
    }
    0
}

pub fn write(exports: &SymTable, cfg: &Config, pool: &Pool, out: &mut dyn Write) -> io::Result<()> {
    let mut lines: Vec<(String, String)> = Vec::new();
    for sym in exports.iter() {
        let Some(addr) = expr::solve(&sym.value, exports, sym.section, false) else {
            continue;
        };
        let name = sym.lbl.full_name(pool);
        let bank = bank_of(sym, cfg, pool);
        lines.push((
            name.clone(),
            format!("{:02X}:{:04X} {}", bank, addr as u32 & 0xFFFF, name),
        ));
    }
    lines.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, line) in lines {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm83asm_core::expr::ExprAtom;
    use sm83asm_core::pos::Pos;
    use sm83asm_core::sym::{Lbl, SymFlags};
    use sm83asm_core::view::View;

    #[test]
    fn formats_bank_addr_name_sorted_by_name() {
        let mut pool = Pool::new();
        let mut exports = SymTable::new();
        for (name, addr) in [("zeta", 0x200), ("alpha", 0x100)] {
            exports.insert(Sym {
                lbl: Lbl::global(pool.intern_str(name)),
                value: expr::intern(vec![ExprAtom::Const(addr)]),
                unit: pool.intern_str("@EXPORT"),
                section: View::EMPTY,
                pos: Pos::new(View::EMPTY, 1, 1),
                flags: SymFlags::EXPORTED,
            });
        }
        let cfg = Config::default();
        let mut buf = Vec::new();
        write(&exports, &cfg, &pool, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["00:0100 alpha", "00:0200 zeta"]);
    }
}
