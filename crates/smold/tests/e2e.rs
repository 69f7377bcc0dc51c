//! End-to-end linker scenarios: assemble source with `smasm`'s library,
//! write the resulting object file(s) to disk, then drive `smold`'s
//! `link` directly and inspect the final image.

use sm83asm_core::view::Pool;
use smasm::Assembler;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn tmp_path(tag: &str, ext: &str) -> std::path::PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!("smold_e2e_{}_{}_{}.{}", tag, std::process::id(), n, ext));
    path
}

fn assemble_to_object(src: &str, tag: &str) -> std::path::PathBuf {
    let src_path = tmp_path(tag, "s");
    std::fs::File::create(&src_path)
        .unwrap()
        .write_all(src.as_bytes())
        .unwrap();
    let mut asm = Assembler::new(&src_path, vec![]).unwrap();
    asm.assemble().unwrap();

    let mut writer = sm83asm_core::object::Writer::new(&asm.ctx.pool);
    for sym in asm.ctx.syms.iter() {
        writer.add_sym(sym.clone());
    }
    for section in asm.ctx.sections_to_emit() {
        writer.add_section(section.clone());
    }
    let bytes = writer.finish();

    let obj_path = tmp_path(tag, "o");
    std::fs::write(&obj_path, &bytes).unwrap();
    obj_path
}

fn write_config(tag: &str, text: &str) -> std::path::PathBuf {
    let path = tmp_path(tag, "cfg");
    std::fs::write(&path, text).unwrap();
    path
}

const BASIC_CFG: &str = r#"
memories {
    ROM0 { start = $0000, size = $4000, kind = readonly }
    WRAM { start = $C000, size = $2000, kind = readwrite }
}
sections {
    CODE { load = ROM0, kind = code, align = 1 }
    DATA { load = WRAM, kind = data, align = 1 }
}
"#;

#[test]
fn cross_section_reference_resolves_at_link_time() {
    let obj = assemble_to_object(
        "@SECTION \"CODE\"\nLD A, [BANK]\n@SECTION \"DATA\"\nBANK:: @DB $AB\n",
        "xsect",
    );
    let cfg_path = write_config("xsect", BASIC_CFG);

    let mut pool = Pool::new();
    let cfg = smold::cfg::parse(&cfg_path, &mut pool).unwrap();
    let result = smold::link(&cfg, &[obj], &[], &mut pool).unwrap();

    // CODE is placed at $0000: `LD A, [BANK]` is FA, then BANK's resolved
    // address ($C000) little-endian.
    assert_eq!(&result.image[0..3], &[0xFA, 0x00, 0xC0]);
}

#[test]
fn duplicate_exported_symbol_across_objects_is_fatal() {
    let obj_a = assemble_to_object("@SECTION \"CODE\"\nfoo:: NOP\n", "dup_a");
    let obj_b = assemble_to_object("@SECTION \"CODE\"\nfoo:: NOP\n", "dup_b");
    let cfg_path = write_config("dup", BASIC_CFG);

    let mut pool = Pool::new();
    let cfg = smold::cfg::parse(&cfg_path, &mut pool).unwrap();
    let err = smold::link(&cfg, &[obj_a, obj_b], &[], &mut pool).unwrap_err();
    assert!(matches!(err, smold::LinkError::DuplicateExport(..)));
}
