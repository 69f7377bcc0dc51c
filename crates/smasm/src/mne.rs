//! The mnemonic name table (spec.md §4.4), grounded on the 42-entry table
//! in `original_source/src/smasm/mne.c`. Lookup is case-insensitive, as in
//! the original's `smViewEqualIgnoreAsciiCase`.

/// One of the 42 SM83 mnemonics. Variant order matches the original table's
/// alphabetical listing, not the opcode map (opcodes are derived separately
/// in `encode.rs`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Mne {
    Adc,
    Add,
    And,
    Bit,
    Call,
    Ccf,
    Cp,
    Cpl,
    Daa,
    Dec,
    Di,
    Ei,
    Halt,
    Inc,
    Jp,
    Jr,
    Ld,
    Ldd,
    Ldh,
    Ldi,
    Nop,
    Or,
    Pop,
    Push,
    Res,
    Ret,
    Reti,
    Rl,
    Rla,
    Rlc,
    Rlca,
    Rr,
    Rra,
    Rrc,
    Rrca,
    Rst,
    Sbc,
    Scf,
    Set,
    Sla,
    Sra,
    Srl,
    Stop,
    Sub,
    Swap,
    Xor,
}

const MNEMONICS: &[(&str, Mne)] = &[
    ("ADC", Mne::Adc),
    ("ADD", Mne::Add),
    ("AND", Mne::And),
    ("BIT", Mne::Bit),
    ("CALL", Mne::Call),
    ("CCF", Mne::Ccf),
    ("CP", Mne::Cp),
    ("CPL", Mne::Cpl),
    ("DAA", Mne::Daa),
    ("DEC", Mne::Dec),
    ("DI", Mne::Di),
    ("EI", Mne::Ei),
    ("HALT", Mne::Halt),
    ("INC", Mne::Inc),
    ("JP", Mne::Jp),
    ("JR", Mne::Jr),
    ("LD", Mne::Ld),
    ("LDD", Mne::Ldd),
    ("LDH", Mne::Ldh),
    ("LDI", Mne::Ldi),
    ("NOP", Mne::Nop),
    ("OR", Mne::Or),
    ("POP", Mne::Pop),
    ("PUSH", Mne::Push),
    ("RES", Mne::Res),
    ("RET", Mne::Ret),
    ("RETI", Mne::Reti),
    ("RL", Mne::Rl),
    ("RLA", Mne::Rla),
    ("RLC", Mne::Rlc),
    ("RLCA", Mne::Rlca),
    ("RR", Mne::Rr),
    ("RRA", Mne::Rra),
    ("RRC", Mne::Rrc),
    ("RRCA", Mne::Rrca),
    ("RST", Mne::Rst),
    ("SBC", Mne::Sbc),
    ("SCF", Mne::Scf),
    ("SET", Mne::Set),
    ("SLA", Mne::Sla),
    ("SRA", Mne::Sra),
    ("SRL", Mne::Srl),
    ("STOP", Mne::Stop),
    ("SUB", Mne::Sub),
    ("SWAP", Mne::Swap),
    ("XOR", Mne::Xor),
];

/// Case-insensitive mnemonic lookup, mirroring `mneFind` in the original.
pub fn find(name: &str) -> Option<Mne> {
    MNEMONICS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, m)| *m)
}
