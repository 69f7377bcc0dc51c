//! The `--tags` writer (spec.md §6): a vi-style tags file indexed by label
//! name, `name\tfile\tline` per exported symbol, sorted by name so a plain
//! binary search (`:set tags` in vi/vim) finds entries without a linear
//! scan.

use sm83asm_core::sym::SymTable;
use sm83asm_core::view::Pool;
use std::io::{self, Write};

pub fn write(exports: &SymTable, pool: &Pool, out: &mut dyn Write) -> io::Result<()> {
    let mut entries: Vec<(String, String, u32)> = exports
        .iter()
        .map(|sym| {
            (
                sym.lbl.full_name(pool),
                pool.as_str(sym.pos.file).to_string(),
                sym.pos.line,
            )
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, file, line) in entries {
        writeln!(out, "{}\t{}\t{}", name, file, line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm83asm_core::expr;
    use sm83asm_core::pos::Pos;
    use sm83asm_core::sym::{Lbl, Sym, SymFlags};
    use sm83asm_core::view::View;

    #[test]
    fn sorted_by_label_name() {
        let mut pool = Pool::new();
        let mut exports = SymTable::new();
        let file = pool.intern_str("main.s");
        for (name, line) in [("zeta", 10u32), ("alpha", 3u32)] {
            exports.insert(Sym {
                lbl: Lbl::global(pool.intern_str(name)),
                value: expr::intern(vec![expr::ExprAtom::Const(0)]),
                unit: pool.intern_str("@EXPORT"),
                section: View::EMPTY,
                pos: Pos::new(file, line, 1),
                flags: SymFlags::EXPORTED,
            });
        }
        let mut buf = Vec::new();
        write(&exports, &pool, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["alpha\tmain.s\t3", "zeta\tmain.s\t10"]);
    }
}
