//! Labels and the symbol table (spec.md §3 "Symbol table", §4.3).
//!
//! The reference implementation's `SmSymTab` is a hand-rolled
//! open-addressed table (`tab.h`'s `SM_TAB_*` macros) keyed by a DJB2 hash
//! of the label's full `scope.name` bytes. Here `Lbl` is a pair of interned
//! [`View`]s, and since [`Pool::intern`] guarantees `intern(x) == intern(y)`
//! iff `x` and `y` are byte-equal, two labels with identical scope/name
//! text always carry identical `View` handles — so deriving `Hash`/`Eq` on
//! the handle fields already gives exact content semantics, and the table
//! itself is `hashbrown::HashMap`, an open-addressed (SwissTable) map with
//! load factor < 1 and grow-by-doubling, matching the invariant without a
//! second hand-rolled probe sequence (see DESIGN.md).

use crate::expr::ExprView;
use crate::pos::Pos;
use crate::view::{Pool, View};
use hashbrown::HashMap;

/// A label: an optional scope (the enclosing global label's name, or
/// [`View::EMPTY`] for a global label) plus the label's own name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Lbl {
    pub scope: View,
    pub name: View,
}

impl Lbl {
    /// The sentinel null label, used as a "not found" return value the way
    /// `SM_LBL_NULL` is in the reference table macros.
    pub const NULL: Lbl = Lbl {
        scope: View::EMPTY,
        name: View::EMPTY,
    };

    pub fn global(name: View) -> Lbl {
        Lbl {
            scope: View::EMPTY,
            name,
        }
    }

    pub fn scoped(scope: View, name: View) -> Lbl {
        Lbl { scope, name }
    }

    pub fn is_global(&self) -> bool {
        self.scope.is_empty()
    }

    pub fn is_null(&self) -> bool {
        *self == Lbl::NULL
    }

    /// `scope.name` for a local label, or bare `name` for a global one —
    /// mirrors `smLblFullName`.
    pub fn full_name(&self, pool: &Pool) -> String {
        if self.is_global() {
            pool.as_str(self.name).to_string()
        } else {
            format!("{}.{}", pool.as_str(self.scope), pool.as_str(self.name))
        }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct SymFlags: u8 {
        /// Defined by `@EQU`/`=` rather than by a label declaration; may be
        /// redefined (non-`EQU` symbols may only be defined once).
        const EQU = 1 << 0;
        /// Visible to other translation units at link time.
        const EXPORTED = 1 << 1;
    }
}

/// A resolved or to-be-resolved symbol binding.
#[derive(Clone, Debug)]
pub struct Sym {
    pub lbl: Lbl,
    pub value: ExprView,
    /// The object/translation unit that defined this symbol (a file name
    /// view), used to report "already defined in %s" diagnostics.
    pub unit: View,
    /// The section active when the symbol was declared; needed to solve
    /// `Addr` atoms against the right section at assemble time.
    pub section: View,
    pub pos: Pos,
    pub flags: SymFlags,
}

impl Sym {
    pub fn is_equ(&self) -> bool {
        self.flags.contains(SymFlags::EQU)
    }

    pub fn is_exported(&self) -> bool {
        self.flags.contains(SymFlags::EXPORTED)
    }
}

/// Hash-addressed symbol table (spec.md: "Open-addressed hash table keyed
/// by full label hash. Load factor < 1; grow by doubling; sentinel is the
/// zero label.").
#[derive(Default)]
pub struct SymTable {
    map: HashMap<Lbl, Sym>,
}

impl SymTable {
    pub fn new() -> Self {
        SymTable {
            map: HashMap::new(),
        }
    }

    pub fn find(&self, lbl: Lbl) -> Option<&Sym> {
        self.map.get(&lbl)
    }

    pub fn find_mut(&mut self, lbl: Lbl) -> Option<&mut Sym> {
        self.map.get_mut(&lbl)
    }

    /// Insert `sym`, returning the symbol it replaced, if any. Callers that
    /// must reject redefinition of non-`EQU` symbols check `find` first;
    /// the table itself does not enforce that invariant (spec.md §4.3
    /// "a non-`EQU` symbol may be defined only once" is a dispatcher-level
    /// check, since `@EQU` redefinition is legal).
    pub fn insert(&mut self, sym: Sym) -> Option<Sym> {
        self.map.insert(sym.lbl, sym)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sym> {
        self.map.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;

    fn dummy_pos() -> Pos {
        Pos::new(View::EMPTY, 1, 1)
    }

    #[test]
    fn global_label_has_empty_scope() {
        let mut pool = Pool::new();
        let name = pool.intern_str("Start");
        let lbl = Lbl::global(name);
        assert!(lbl.is_global());
        assert_eq!(lbl.full_name(&pool), "Start");
    }

    #[test]
    fn scoped_label_renders_dotted_name() {
        let mut pool = Pool::new();
        let scope = pool.intern_str("Start");
        let name = pool.intern_str("loop");
        let lbl = Lbl::scoped(scope, name);
        assert!(!lbl.is_global());
        assert_eq!(lbl.full_name(&pool), "Start.loop");
    }

    #[test]
    fn labels_interned_from_equal_bytes_compare_equal() {
        let mut pool = Pool::new();
        let a = Lbl::global(pool.intern_str("Foo"));
        let b = Lbl::global(pool.intern_str("Foo"));
        assert_eq!(a, b);
    }

    #[test]
    fn insert_and_find_round_trip() {
        let mut pool = Pool::new();
        let lbl = Lbl::global(pool.intern_str("Foo"));
        let mut table = SymTable::new();
        let sym = Sym {
            lbl,
            value: expr::intern(vec![expr::ExprAtom::Const(42)]),
            unit: pool.intern_str("main.s"),
            section: View::EMPTY,
            pos: dummy_pos(),
            flags: SymFlags::empty(),
        };
        assert!(table.find(lbl).is_none());
        table.insert(sym);
        let found = table.find(lbl).expect("symbol present");
        assert_eq!(found.unit, pool.intern_str("main.s"));
    }

    #[test]
    fn equ_symbols_may_be_redefined() {
        let mut pool = Pool::new();
        let lbl = Lbl::global(pool.intern_str("VERSION"));
        let mut table = SymTable::new();
        let unit = pool.intern_str("a.s");
        table.insert(Sym {
            lbl,
            value: expr::intern(vec![expr::ExprAtom::Const(1)]),
            unit,
            section: View::EMPTY,
            pos: dummy_pos(),
            flags: SymFlags::EQU,
        });
        assert!(table.find(lbl).unwrap().is_equ());
        table.insert(Sym {
            lbl,
            value: expr::intern(vec![expr::ExprAtom::Const(2)]),
            unit,
            section: View::EMPTY,
            pos: dummy_pos(),
            flags: SymFlags::EQU,
        });
        let v = expr::solve(&table.find(lbl).unwrap().value, &table, View::EMPTY, false);
        assert_eq!(v, Some(2));
    }

    #[test]
    fn null_label_is_its_own_sentinel() {
        assert!(Lbl::NULL.is_null());
        assert!(Lbl::NULL.is_global());
    }
}
