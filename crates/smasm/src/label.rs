//! Label-name resolution (spec.md §4.4: "A scoped name `scope.name` is
//! resolved per the `Lbl` rule. A leading `.` is local to the current
//! scope."). Not present in the retrieved `original_source`'s dispatcher
//! (its `main.c`/`state.c` `pass()` is an empty stub); grounded instead on
//! the `Lbl`/scope plumbing that *is* present (`lblLocal`/`lblGlobal`/
//! `lblAbs` in `state.c`) plus the RGBDS-family convention spec.md's
//! wording describes.

use sm83asm_core::sym::Lbl;
use sm83asm_core::view::{Pool, View};

/// Resolve an identifier's raw text into a `Lbl` given the assembler's
/// current scope:
/// - no `.` at all → global (`Lbl::global`), and the caller should also
///   adopt this label as the new current scope for subsequent locals;
/// - leading `.` (`.name`) → local to `current_scope`;
/// - `scope.name` → an explicit absolute reference into `scope`, which
///   does *not* change `current_scope`.
pub fn resolve(pool: &mut Pool, text: &str, current_scope: View) -> Lbl {
    match text.find('.') {
        None => Lbl::global(pool.intern_str(text)),
        Some(0) => Lbl::scoped(current_scope, pool.intern_str(&text[1..])),
        Some(dot) => {
            let scope = pool.intern_str(&text[..dot]);
            let name = pool.intern_str(&text[dot + 1..]);
            Lbl::scoped(scope, name)
        }
    }
}

/// Whether `text` would define a new current scope (no `.`), used by the
/// dispatcher to decide if defining this label should also update
/// `current_scope`.
pub fn is_global_form(text: &str) -> bool {
    !text.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_dot_is_global() {
        let mut pool = Pool::new();
        let lbl = resolve(&mut pool, "Foo", View::EMPTY);
        assert!(lbl.is_global());
        assert!(is_global_form("Foo"));
    }

    #[test]
    fn leading_dot_is_local_to_current_scope() {
        let mut pool = Pool::new();
        let scope = pool.intern_str("Foo");
        let lbl = resolve(&mut pool, ".loop", scope);
        assert_eq!(lbl.scope, scope);
        assert!(!is_global_form(".loop"));
    }

    #[test]
    fn explicit_scope_dot_name_does_not_use_current_scope() {
        let mut pool = Pool::new();
        let current = pool.intern_str("Bar");
        let lbl = resolve(&mut pool, "Foo.loop", current);
        let expect_scope = pool.intern_str("Foo");
        assert_eq!(lbl.scope, expect_scope);
    }
}
