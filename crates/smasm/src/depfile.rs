//! Makefile-style dependency writer (spec.md §4.8, `-MD`/`-MF`). Named
//! out of scope by spec.md §1 as an external collaborator of the core
//! engine, but still part of the ambient CLI surface (see SPEC_FULL.md).

use std::io::Write;
use std::path::Path;

/// Write a single `target: dep dep …` rule, one dependency per
/// continuation line, matching `make`'s own depfile convention (the same
/// shape `cc -MD` emits).
pub fn write_depfile<W: Write>(mut w: W, target: &str, deps: &[String]) -> std::io::Result<()> {
    write!(w, "{}:", target)?;
    for dep in deps {
        write!(w, " \\\n  {}", escape(dep))?;
    }
    writeln!(w)?;
    Ok(())
}

fn escape(path: &str) -> String {
    path.replace(' ', "\\ ")
}

/// Default depfile path for a source file when `-MF` is not given:
/// `SOURCE.d`.
pub fn default_path(source: &Path) -> std::path::PathBuf {
    let mut s = source.as_os_str().to_owned();
    s.push(".d");
    std::path::PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_continuation_line_per_dependency() {
        let mut buf = Vec::new();
        write_depfile(&mut buf, "out.obj", &["a.s".into(), "inc/b.s".into()]).unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert_eq!(s, "out.obj: \\\n  a.s \\\n  inc/b.s\n");
    }

    #[test]
    fn default_path_appends_dot_d() {
        assert_eq!(
            default_path(Path::new("main.s")),
            std::path::PathBuf::from("main.s.d")
        );
    }
}
