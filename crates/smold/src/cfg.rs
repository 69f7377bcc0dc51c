//! The linker configuration grammar (spec.md §4.7 "Config file").
//!
//! A small, case-insensitive-keyword mini-language describing the target's
//! memory map and which sections land where, read by [`parse`] over the
//! same lexer/token-stream `smasm` uses — grounded directly on the original
//! `parseMems`/`parseSects`/`parseCfg` recursive-descent functions, which
//! match attribute names with `smBufEqualIgnoreAsciiCase`.
//!
//! ```text
//! memories {
//!     ROM0 { start = $0000, size = $4000, kind = readonly }
//!     WRAM { start = $C000, size = $2000, kind = readwrite, fill = $00 }
//! }
//! sections {
//!     CODE { load = ROM0, kind = code, align = 1 }
//!     HEADER { load = ROM0, kind = code, define, tags { bank = 0 } }
//! }
//! ```

use crate::error::LinkError;
use sm83asm_core::stream::{FileFrame, TokStream};
use sm83asm_core::token::TokKind;
use sm83asm_core::view::{Pool, View};
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemKind {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Debug)]
pub struct Mem {
    pub name: View,
    pub start: u32,
    pub size: u32,
    pub fill: u8,
    pub kind: MemKind,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SectKind {
    Code,
    Data,
    Uninit,
    Zeropage,
}

impl SectKind {
    /// `READONLY` memories may only host `CODE`-kind sections (spec.md
    /// §4.7, grounded on the original's memory/section compatibility
    /// fallthrough).
    pub fn allowed_in(self, mem_kind: MemKind) -> bool {
        match mem_kind {
            MemKind::ReadWrite => true,
            MemKind::ReadOnly => self == SectKind::Code,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Sect {
    pub name: View,
    pub load: View,
    pub kind: SectKind,
    pub align: u32,
    pub define: bool,
    pub tags: HashMap<View, i32>,
}

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub mems: Vec<Mem>,
    pub sects: Vec<Sect>,
}

impl Config {
    pub fn find_mem(&self, name: View, pool: &Pool) -> Option<&Mem> {
        self.mems.iter().find(|m| pool.bytes_eq(m.name, name))
    }
}

/// Read and parse a linker script from `path`.
pub fn parse(path: &Path, pool: &mut Pool) -> Result<Config, LinkError> {
    let bytes = std::fs::read(path)?;
    let file = pool.intern_str(&path.display().to_string());
    let mut stream = TokStream::new(FileFrame::new(&bytes, file));
    parse_stream(&mut stream, pool)
}

fn parse_stream(stream: &mut TokStream, pool: &mut Pool) -> Result<Config, LinkError> {
    let mut cfg = Config::default();
    loop {
        let tok = stream.peek(pool)?;
        match tok.kind {
            TokKind::Eof => break,
            TokKind::Id(name) if kw_is(pool, name, "memories") => {
                stream.eat(pool)?;
                parse_memories(stream, pool, &mut cfg)?;
            }
            TokKind::Id(name) if kw_is(pool, name, "sections") => {
                stream.eat(pool)?;
                parse_sections(stream, pool, &mut cfg)?;
            }
            _ => {
                return Err(LinkError::Expected(
                    "`memories` or `sections`",
                    tok.name(),
                ))
            }
        }
    }
    validate(&cfg, pool)?;
    Ok(cfg)
}

fn validate(cfg: &Config, pool: &Pool) -> Result<(), LinkError> {
    for sect in &cfg.sects {
        let mem = cfg.find_mem(sect.load, pool).ok_or_else(|| {
            LinkError::UnknownMemory(pool.as_str(sect.name).to_string(), pool.as_str(sect.load).to_string())
        })?;
        if !sect.kind.allowed_in(mem.kind) {
            return Err(LinkError::ReadOnlyHostsData(
                pool.as_str(mem.name).to_string(),
                pool.as_str(sect.name).to_string(),
            ));
        }
    }
    Ok(())
}

fn kw_is(pool: &Pool, v: View, kw: &str) -> bool {
    pool.as_str(v).eq_ignore_ascii_case(kw)
}

fn eat_punct(stream: &mut TokStream, pool: &mut Pool, c: char) -> Result<(), LinkError> {
    let tok = stream.eat(pool)?;
    match tok.kind {
        TokKind::Punct(p) if p == c => Ok(()),
        _ => Err(LinkError::Expected(punct_name(c), tok.name())),
    }
}

fn punct_name(c: char) -> &'static str {
    match c {
        '{' => "`{`",
        '}' => "`}`",
        '=' => "`=`",
        _ => "punctuation",
    }
}

/// Swallow a single optional `,` separator between attributes. The grammar
/// does not require commas, but the usual config style sprinkles them in for
/// readability, matching the original's lenient attribute-list parsing.
fn skip_comma(stream: &mut TokStream, pool: &mut Pool) -> Result<(), LinkError> {
    if matches!(stream.peek(pool)?.kind, TokKind::Punct(',')) {
        stream.eat(pool)?;
    }
    Ok(())
}

fn eat_ident(stream: &mut TokStream, pool: &mut Pool) -> Result<View, LinkError> {
    let tok = stream.eat(pool)?;
    match tok.kind {
        TokKind::Id(v) => Ok(v),
        _ => Err(LinkError::Expected("identifier", tok.name())),
    }
}

fn eat_num(stream: &mut TokStream, pool: &mut Pool) -> Result<i32, LinkError> {
    let tok = stream.eat(pool)?;
    match tok.kind {
        TokKind::Num(n, _) => Ok(n),
        _ => Err(LinkError::Expected("number", tok.name())),
    }
}

fn parse_memories(stream: &mut TokStream, pool: &mut Pool, cfg: &mut Config) -> Result<(), LinkError> {
    eat_punct(stream, pool, '{')?;
    loop {
        let tok = stream.peek(pool)?;
        if matches!(tok.kind, TokKind::Punct('}')) {
            stream.eat(pool)?;
            break;
        }
        let name = eat_ident(stream, pool)?;
        if cfg.find_mem(name, pool).is_some() {
            return Err(LinkError::DuplicateMemory(pool.as_str(name).to_string()));
        }
        eat_punct(stream, pool, '{')?;
        let mut start = None;
        let mut size = None;
        let mut fill = 0u8;
        let mut kind = None;
        loop {
            skip_comma(stream, pool)?;
            let tok = stream.peek(pool)?;
            if matches!(tok.kind, TokKind::Punct('}')) {
                stream.eat(pool)?;
                break;
            }
            let attr = eat_ident(stream, pool)?;
            eat_punct(stream, pool, '=')?;
            if kw_is(pool, attr, "start") {
                start = Some(eat_num(stream, pool)? as u32);
            } else if kw_is(pool, attr, "size") {
                size = Some(eat_num(stream, pool)? as u32);
            } else if kw_is(pool, attr, "fill") {
                fill = eat_num(stream, pool)? as u8;
            } else if kw_is(pool, attr, "kind") {
                let v = eat_ident(stream, pool)?;
                kind = Some(if kw_is(pool, v, "readonly") {
                    MemKind::ReadOnly
                } else if kw_is(pool, v, "readwrite") {
                    MemKind::ReadWrite
                } else {
                    return Err(LinkError::UnknownMemKind(pool.as_str(v).to_string()));
                });
            } else {
                return Err(LinkError::UnknownAttribute(pool.as_str(attr).to_string()));
            }
        }
        cfg.mems.push(Mem {
            name,
            start: start.unwrap_or(0),
            size: size.unwrap_or(0),
            fill,
            kind: kind.unwrap_or(MemKind::ReadWrite),
        });
    }
    Ok(())
}

fn parse_sections(stream: &mut TokStream, pool: &mut Pool, cfg: &mut Config) -> Result<(), LinkError> {
    eat_punct(stream, pool, '{')?;
    loop {
        let tok = stream.peek(pool)?;
        if matches!(tok.kind, TokKind::Punct('}')) {
            stream.eat(pool)?;
            break;
        }
        let name = eat_ident(stream, pool)?;
        if cfg.sects.iter().any(|s| pool.bytes_eq(s.name, name)) {
            return Err(LinkError::DuplicateSection(pool.as_str(name).to_string()));
        }
        eat_punct(stream, pool, '{')?;
        let mut load = None;
        let mut kind = SectKind::Code;
        let mut align = 1u32;
        let mut define = false;
        let mut tags = HashMap::new();
        loop {
            skip_comma(stream, pool)?;
            let tok = stream.peek(pool)?;
            if matches!(tok.kind, TokKind::Punct('}')) {
                stream.eat(pool)?;
                break;
            }
            let attr = eat_ident(stream, pool)?;
            if kw_is(pool, attr, "define") {
                define = true;
                continue;
            }
            if kw_is(pool, attr, "tags") {
                eat_punct(stream, pool, '{')?;
                loop {
                    skip_comma(stream, pool)?;
                    let tok = stream.peek(pool)?;
                    if matches!(tok.kind, TokKind::Punct('}')) {
                        stream.eat(pool)?;
                        break;
                    }
                    let tag_name = eat_ident(stream, pool)?;
                    eat_punct(stream, pool, '=')?;
                    let tag_val = eat_num(stream, pool)?;
                    tags.insert(tag_name, tag_val);
                }
                continue;
            }
            eat_punct(stream, pool, '=')?;
            if kw_is(pool, attr, "load") {
                load = Some(eat_ident(stream, pool)?);
            } else if kw_is(pool, attr, "kind") {
                let v = eat_ident(stream, pool)?;
                kind = if kw_is(pool, v, "code") {
                    SectKind::Code
                } else if kw_is(pool, v, "data") {
                    SectKind::Data
                } else if kw_is(pool, v, "uninit") {
                    SectKind::Uninit
                } else if kw_is(pool, v, "zeropage") {
                    SectKind::Zeropage
                } else {
                    return Err(LinkError::UnknownSectKind(pool.as_str(v).to_string()));
                };
            } else if kw_is(pool, attr, "align") {
                align = eat_num(stream, pool)? as u32;
            } else {
                return Err(LinkError::UnknownAttribute(pool.as_str(attr).to_string()));
            }
        }
        let load = load.ok_or_else(|| LinkError::MissingLoad(pool.as_str(name).to_string()))?;
        cfg.sects.push(Sect {
            name,
            load,
            kind,
            align: align.max(1),
            define,
            tags,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(src: &str) -> (Config, Pool) {
        let mut pool = Pool::new();
        let file = pool.intern_str("test.cfg");
        let mut stream = TokStream::new(FileFrame::new(src.as_bytes(), file));
        let cfg = parse_stream(&mut stream, &mut pool).unwrap();
        (cfg, pool)
    }

    #[test]
    fn parses_a_memory_and_a_section() {
        let (cfg, pool) = parse_str(
            "memories { ROM0 { start = $0000, size = $4000, kind = readonly } }
             sections { CODE { load = ROM0, kind = code, align = 1 } }",
        );
        assert_eq!(cfg.mems.len(), 1);
        assert_eq!(cfg.mems[0].start, 0);
        assert_eq!(pool.as_str(cfg.mems[0].name), "ROM0");
        assert_eq!(cfg.mems[0].size, 0x4000);
        assert_eq!(cfg.mems[0].kind, MemKind::ReadOnly);
        assert_eq!(cfg.sects.len(), 1);
        assert_eq!(pool.as_str(cfg.sects[0].load), "ROM0");
        assert_eq!(cfg.sects[0].kind, SectKind::Code);
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let (cfg, _pool) = parse_str(
            "MEMORIES { rom0 { START = 0, SIZE = 10, Kind = ReadOnly } }
             Sections { code { Load = rom0, KIND = CODE } }",
        );
        assert_eq!(cfg.mems[0].kind, MemKind::ReadOnly);
        assert_eq!(cfg.sects[0].kind, SectKind::Code);
    }

    #[test]
    fn readonly_memory_rejects_data_section() {
        let mut pool = Pool::new();
        let file = pool.intern_str("test.cfg");
        let mut stream = TokStream::new(FileFrame::new(
            b"memories { ROM0 { kind = readonly } }
              sections { VARS { load = ROM0, kind = data } }",
            file,
        ));
        let err = parse_stream(&mut stream, &mut pool).unwrap_err();
        assert!(matches!(err, LinkError::ReadOnlyHostsData(..)));
    }

    #[test]
    fn section_with_undefined_memory_is_fatal() {
        let mut pool = Pool::new();
        let file = pool.intern_str("test.cfg");
        let mut stream = TokStream::new(FileFrame::new(
            b"sections { CODE { load = NOPE, kind = code } }",
            file,
        ));
        let err = parse_stream(&mut stream, &mut pool).unwrap_err();
        assert!(matches!(err, LinkError::UnknownMemory(..)));
    }

    #[test]
    fn section_tags_are_captured() {
        let (cfg, pool) = parse_str(
            "memories { ROM0 { kind = readonly } }
             sections { HEADER { load = ROM0, kind = code, define, tags { bank = 0 } } }",
        );
        assert!(cfg.sects[0].define);
        let (tag_name, tag_val) = cfg.sects[0].tags.iter().next().unwrap();
        assert_eq!(pool.as_str(*tag_name), "bank");
        assert_eq!(*tag_val, 0);
    }
}
