//! `smfix`: patches a Game Boy ROM's header checksum and pads it out to its
//! declared size (spec.md §6 "Checksum fixer").
//!
//! ```text
//! smfix [-o OUTPUT] ROM
//! ```

mod error;

use anyhow::{Context, Result};
use clap::{command, Arg};
use error::FixError;
use std::path::PathBuf;

const HEADER_START: usize = 0x0134;
const CHECKSUM_OFFSET: usize = 0x014D;
const MIN_LEN: usize = 0x014E;
const ROM_SIZE_OFFSET: usize = 0x0148;

fn main() -> Result<()> {
    let matches = command!()
        .args([
            Arg::new("rom")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Game Boy ROM image"),
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Output file (default: stdout)"),
        ])
        .get_matches();

    env_logger::init();

    if let Err(err) = run(&matches) {
        eprintln!("smfix: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let rom_path = matches.get_one::<PathBuf>("rom").unwrap();
    log::debug!("reading {}", rom_path.display());
    let mut rom = std::fs::read(rom_path)
        .with_context(|| format!("reading {}", rom_path.display()))?;

    fix(&mut rom)?;

    let output = matches.get_one::<PathBuf>("output");
    match output {
        Some(path) => std::fs::write(path, &rom)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&rom)?;
        }
    }
    Ok(())
}

/// Patch the header checksum at `0x014D`, then pad `rom` up to
/// `0x8000 << rom[0x0148]` bytes with zero fill (spec.md §6).
fn fix(rom: &mut Vec<u8>) -> Result<(), FixError> {
    if rom.len() < MIN_LEN {
        return Err(FixError::TooSmall);
    }

    let mut checksum: u8 = 0;
    for &b in &rom[HEADER_START..CHECKSUM_OFFSET] {
        checksum = checksum.wrapping_sub(b).wrapping_sub(1);
    }
    rom[CHECKSUM_OFFSET] = checksum;

    let rom_size = rom[ROM_SIZE_OFFSET];
    if rom_size > 0x08 {
        return Err(FixError::BadRomSize(rom_size));
    }
    let target_len = 0x8000usize << rom_size;
    if rom.len() < target_len {
        rom.resize(target_len, 0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_rom(rom_size_byte: u8) -> Vec<u8> {
        let mut rom = vec![0u8; MIN_LEN];
        rom[ROM_SIZE_OFFSET] = rom_size_byte;
        rom
    }

    #[test]
    fn checksum_of_all_zero_header_is_all_ones() {
        let mut rom = minimal_rom(0);
        fix(&mut rom).unwrap();
        // Sum of (-0 - 1) for 0x19 bytes, truncated to u8, is -0x19 mod 256.
        assert_eq!(rom[CHECKSUM_OFFSET], (0u8).wrapping_sub(0x19));
    }

    #[test]
    fn pads_to_declared_rom_size() {
        let mut rom = minimal_rom(1); // 0x8000 << 1 == 0x10000
        fix(&mut rom).unwrap();
        assert_eq!(rom.len(), 0x10000);
    }

    #[test]
    fn does_not_shrink_a_rom_already_longer_than_declared() {
        let mut rom = minimal_rom(0);
        rom.resize(0x9000, 0xAA);
        fix(&mut rom).unwrap();
        assert_eq!(rom.len(), 0x9000);
    }

    #[test]
    fn rejects_a_truncated_rom() {
        let mut rom = vec![0u8; 0x10];
        assert!(matches!(fix(&mut rom), Err(FixError::TooSmall)));
    }

    #[test]
    fn rejects_an_out_of_range_rom_size_byte() {
        let mut rom = minimal_rom(0x09);
        assert!(matches!(fix(&mut rom), Err(FixError::BadRomSize(0x09))));
    }
}
