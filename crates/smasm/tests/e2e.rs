//! End-to-end assembler scenarios: source text in, final pass-2 bytes out.
//! Each case here assembles a standalone source file and inspects the
//! resulting `CODE` section directly, without going through the linker —
//! every reference in these sources resolves within the same file.

use smasm::Assembler;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn assemble(src: &str) -> Assembler {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!("smasm_e2e_{}_{}.s", std::process::id(), n));
    std::fs::File::create(&path)
        .unwrap()
        .write_all(src.as_bytes())
        .unwrap();
    let mut asm = Assembler::new(&path, vec![]).unwrap();
    asm.assemble().unwrap();
    asm
}

fn code_bytes(asm: &mut Assembler) -> Vec<u8> {
    let code = asm.ctx.pool.intern_str("CODE");
    asm.ctx.switch_section(code);
    asm.ctx.sections[asm.ctx.current_section].data.clone()
}

#[test]
fn constant_arithmetic() {
    let mut asm = assemble("X =: (3 + 4) * 2\n@SECTION \"CODE\"\n@DB X, X + 1\n");
    assert_eq!(code_bytes(&mut asm), vec![0x0E, 0x0F]);
}

#[test]
fn forward_reference_relative_jump() {
    let mut asm = assemble(
        "@SECTION \"CODE\"\nstart:  JR end\n        NOP\nend:    NOP\n",
    );
    assert_eq!(code_bytes(&mut asm), vec![0x18, 0x01, 0x00, 0x00]);
}

#[test]
fn macro_with_arguments() {
    let mut asm = assemble(
        "@MACRO add2\n  ADD A, @ARG\n  ADD A, @ARG\n@END\n@SECTION \"CODE\"\nadd2 1, 2\n",
    );
    assert_eq!(code_bytes(&mut asm), vec![0xC6, 0x01, 0xC6, 0x02]);
}

#[test]
fn repeat_with_iteration_index() {
    let mut asm = assemble("@SECTION \"CODE\"\n@REPEAT 3\n  @DB @ITER\n@END\n");
    assert_eq!(code_bytes(&mut asm), vec![0x00, 0x01, 0x02]);
}

#[test]
fn string_format_label() {
    let mut asm = assemble("@IDFMT \"L_%02X\", $5\n@SECTION \"CODE\"\nNOP\n");
    let name = asm
        .ctx
        .syms
        .iter()
        .find(|s| s.lbl.full_name(&asm.ctx.pool) == "L_05")
        .map(|s| s.lbl.full_name(&asm.ctx.pool));
    assert_eq!(name.as_deref(), Some("L_05"));
}

#[test]
fn byte_literal_overflow_is_rejected() {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!("smasm_e2e_{}_{}.s", std::process::id(), n));
    std::fs::write(&path, "@SECTION \"CODE\"\n@DB $100\n").unwrap();
    let mut asm = Assembler::new(&path, vec![]).unwrap();
    let err = asm.assemble().unwrap_err();
    assert!(format!("{err}").contains("does not fit in a byte"));
}

#[test]
fn out_of_range_relative_jump_is_rejected() {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!("smasm_e2e_{}_{}.s", std::process::id(), n));
    // 200 NOPs put `target` far enough away that `JR target` can't reach it.
    let mut src = String::from("@SECTION \"CODE\"\nJR target\n");
    for _ in 0..200 {
        src.push_str("NOP\n");
    }
    src.push_str("target: NOP\n");
    std::fs::write(&path, src).unwrap();
    let mut asm = Assembler::new(&path, vec![]).unwrap();
    let err = asm.assemble().unwrap_err();
    assert!(format!("{err}").contains("out of range"));
}

#[test]
fn self_including_file_overflows_the_token_stream_depth() {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!("smasm_e2e_selfinclude_{}_{}.s", std::process::id(), n));
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    std::fs::write(&path, format!("@INCLUDE \"{}\"\n", name)).unwrap();
    let mut asm = Assembler::new(&path, vec![std::env::temp_dir().to_string_lossy().to_string()]).unwrap();
    let err = asm.assemble().unwrap_err();
    assert!(matches!(err, smasm::AsmError::TooDeep));
}
