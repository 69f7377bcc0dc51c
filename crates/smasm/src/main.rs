//! `smasm`: the sm83 assembler CLI (spec.md §6).
//!
//! ```text
//! smasm [-o OUTPUT] [-D KEY=value]… [-I dir]… [-MD] [-MF depfile] SOURCE
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{command, Arg, ArgAction};
use smasm::dispatch::Assembler;
use smasm::depfile;
use std::path::PathBuf;

fn main() -> Result<()> {
    let matches = command!()
        .args([
            Arg::new("source")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Assembly source file"),
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Output file (default: stdout)"),
            Arg::new("define")
                .short('D')
                .long("define")
                .value_name("KEY=value")
                .action(ArgAction::Append)
                .help("Pre-defined symbol (repeatable)"),
            Arg::new("include")
                .short('I')
                .long("include")
                .value_name("dir")
                .action(ArgAction::Append)
                .help("Search directory for included files (repeatable)"),
            Arg::new("makedepend")
                .long("MD")
                .action(ArgAction::SetTrue)
                .help("Emit a Makefile-format dependency list"),
            Arg::new("depfile")
                .long("MF")
                .value_parser(clap::value_parser!(PathBuf))
                .value_name("DEPFILE")
                .help("Dependency-file path (default: SOURCE.d)"),
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose logging"),
        ])
        .get_matches();

    if matches.get_flag("verbose") {
        env_logger::builder()
            .format_level(false)
            .format_target(false)
            .filter_module("smasm", log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    if let Err(err) = run(&matches) {
        eprintln!("smasm: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let source = matches.get_one::<PathBuf>("source").unwrap();
    let include: Vec<String> = matches
        .get_many::<String>("include")
        .unwrap_or_default()
        .cloned()
        .collect();

    log::debug!("assembling {}", source.display());
    let mut asm = Assembler::new(source, include)
        .with_context(|| format!("could not open {}", source.display()))?;

    for raw in matches.get_many::<String>("define").unwrap_or_default() {
        let (key, value) = parse_define(raw)?;
        asm.define(&key, value);
    }

    asm.assemble()
        .with_context(|| format!("assembling {}", source.display()))?;

    let mut writer = sm83asm_core::object::Writer::new(&asm.ctx.pool);
    for sym in asm.ctx.syms.iter() {
        writer.add_sym(sym.clone());
    }
    for section in asm.ctx.sections_to_emit() {
        writer.add_section(section.clone());
    }
    let bytes = writer.finish();

    let output = matches.get_one::<PathBuf>("output");
    match output {
        Some(path) => {
            std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&bytes)?;
        }
    }

    if matches.get_flag("makedepend") {
        let path = matches
            .get_one::<PathBuf>("depfile")
            .cloned()
            .unwrap_or_else(|| depfile::default_path(source));
        let target = output
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string());
        let deps: Vec<String> = asm
            .included_files
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let f = std::fs::File::create(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        depfile::write_depfile(f, &target, &deps)?;
    }

    Ok(())
}

/// Parse a `-D KEY=value` argument. `value` follows the source language's
/// own numeric-literal syntax: decimal, `$hex`, or `%binary`.
fn parse_define(raw: &str) -> Result<(String, i32)> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(anyhow!("expected `=` in -D {raw}"));
    };
    let parsed = parse_number(value).with_context(|| format!("invalid number: {value}"))?;
    Ok((key.to_string(), parsed))
}

fn parse_number(s: &str) -> Result<i32> {
    if s.is_empty() {
        return Err(anyhow!("empty number"));
    }
    let (radix, digits) = if let Some(rest) = s.strip_prefix('$') {
        (16, rest)
    } else if let Some(rest) = s.strip_prefix('%') {
        (2, rest)
    } else {
        (10, s)
    };
    if digits.is_empty() {
        return Err(anyhow!("invalid number: {s}"));
    }
    i32::from_str_radix(digits, radix).with_context(|| format!("invalid number: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_define_value() {
        assert_eq!(parse_define("FOO=42").unwrap(), ("FOO".to_string(), 42));
    }

    #[test]
    fn hex_define_value() {
        assert_eq!(parse_define("FOO=$2A").unwrap(), ("FOO".to_string(), 42));
    }

    #[test]
    fn binary_define_value() {
        assert_eq!(
            parse_define("FOO=%101010").unwrap(),
            ("FOO".to_string(), 42)
        );
    }

    #[test]
    fn missing_equals_is_rejected() {
        assert!(parse_define("FOO").is_err());
    }
}
