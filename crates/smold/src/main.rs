//! `smold`: the sm83 linker CLI (spec.md §6).
//!
//! ```text
//! smold -c CONFIG [-o OUTPUT] [-g SYMFILE] [--tags TAGFILE] [-D KEY=value]… OBJECTS…
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{command, Arg, ArgAction};
use sm83asm_core::view::Pool;
use smold::{cfg, link, symfile, tags};
use std::path::PathBuf;

fn main() -> Result<()> {
    let matches = command!()
        .args([
            Arg::new("objects")
                .required(true)
                .num_args(1..)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Object files to link"),
            Arg::new("config")
                .short('c')
                .long("config")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Linker configuration file"),
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Output ROM image (default: stdout)"),
            Arg::new("symfile")
                .short('g')
                .value_parser(clap::value_parser!(PathBuf))
                .help("Write a line-oriented BANK:ADDR symbol table"),
            Arg::new("tags")
                .long("tags")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Write a vi-style tags file indexed by label name"),
            Arg::new("define")
                .short('D')
                .long("define")
                .value_name("KEY=value")
                .action(ArgAction::Append)
                .help("Pre-defined exported symbol (repeatable)"),
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
            .filter_module("smold", log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    if let Err(err) = run(&matches) {
        eprintln!("smold: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let config_path = matches.get_one::<PathBuf>("config").unwrap();
    let objects: Vec<PathBuf> = matches
        .get_many::<PathBuf>("objects")
        .unwrap()
        .cloned()
        .collect();

    let mut pool = Pool::new();
    log::debug!("reading config {}", config_path.display());
    let cfg = cfg::parse(config_path, &mut pool)
        .with_context(|| format!("reading {}", config_path.display()))?;

    let mut defines = Vec::new();
    for raw in matches.get_many::<String>("define").unwrap_or_default() {
        defines.push(parse_define(raw)?);
    }

    log::debug!("linking {} object(s)", objects.len());
    let result = link::link(&cfg, &objects, &defines, &mut pool)
        .with_context(|| "linking".to_string())?;

    let output = matches.get_one::<PathBuf>("output");
    match output {
        Some(path) => std::fs::write(path, &result.image)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&result.image)?;
        }
    }

    if let Some(path) = matches.get_one::<PathBuf>("symfile") {
        let mut f = std::fs::File::create(path)
            .with_context(|| format!("writing {}", path.display()))?;
        symfile::write(&result.exports, &cfg, &pool, &mut f)?;
    }

    if let Some(path) = matches.get_one::<PathBuf>("tags") {
        let mut f = std::fs::File::create(path)
            .with_context(|| format!("writing {}", path.display()))?;
        tags::write(&result.exports, &pool, &mut f)?;
    }

    Ok(())
}

/// Parse a `-D KEY=value` argument the same way `smasm` does: `value`
/// follows the source language's numeric-literal syntax (decimal, `$hex`,
/// `%binary`), never a full expression.
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
        assert_eq!(parse_define("BASE=100").unwrap(), ("BASE".to_string(), 100));
    }

    #[test]
    fn hex_define_value() {
        assert_eq!(parse_define("BASE=$C000").unwrap(), ("BASE".to_string(), 0xC000));
    }

    #[test]
    fn missing_equals_is_rejected() {
        assert!(parse_define("BASE").is_err());
    }
}
