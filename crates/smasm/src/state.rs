//! Assembler state (spec.md §5 "Shared resources"): the process-wide
//! singletons a single assembly run mutates — intern pools, symbol table,
//! section list, and macro table — plus the bookkeeping the two-pass
//! driver needs (current scope, current section, emit flag, `@UNIQUE`
//! nonce counter).

use sm83asm_core::sect::Section;
use sm83asm_core::sym::SymTable;
use sm83asm_core::token::Tok;
use sm83asm_core::view::{Pool, View};
use std::collections::HashMap;
use std::rc::Rc;

/// A captured `@MACRO ... @END` body, replayed by a `MacroFrame` on call.
#[derive(Clone, Debug)]
pub struct MacroDef {
    pub body: Rc<[Tok]>,
}

pub struct AssemblerContext {
    pub pool: Pool,
    pub syms: SymTable,
    pub sections: Vec<Section>,
    section_index: HashMap<View, usize>,
    pub macros: HashMap<View, MacroDef>,
    /// Sections force-created with `@CREATE` survive even if never emitted
    /// into — see DESIGN.md's Open Question on `@CREATE`, whose semantics
    /// are not spelled out in spec.md beyond naming the token.
    force_created: std::collections::HashSet<View>,
    pub current_section: usize,
    pub current_scope: View,
    pub emit: bool,
    pub search_dirs: Vec<String>,
    /// Set by `@EXPORT`/`@STATIC`: the default visibility applied to plain
    /// `label:` definitions that follow, until the next `@EXPORT`/`@STATIC`
    /// (spec.md Glossary "Unit"). A label written with the explicit `::`
    /// suffix is always exported regardless of this default.
    pub default_export: bool,
    nonce: u32,
}

impl AssemblerContext {
    pub fn new() -> Self {
        let mut pool = Pool::new();
        let defines = pool.intern_str("@DEFINES");
        let mut ctx = AssemblerContext {
            pool,
            syms: SymTable::new(),
            sections: Vec::new(),
            section_index: HashMap::new(),
            macros: HashMap::new(),
            force_created: std::collections::HashSet::new(),
            current_section: 0,
            current_scope: View::EMPTY,
            emit: false,
            search_dirs: Vec::new(),
            default_export: false,
            nonce: 0,
        };
        ctx.section_index.insert(defines, 0);
        ctx.sections.push(Section::new(defines));
        ctx
    }

    pub fn section_named(&mut self, name: View) -> usize {
        if let Some(&idx) = self.section_index.get(&name) {
            return idx;
        }
        let idx = self.sections.len();
        self.sections.push(Section::new(name));
        self.section_index.insert(name, idx);
        idx
    }

    pub fn switch_section(&mut self, name: View) {
        self.current_section = self.section_named(name);
    }

    pub fn mark_force_created(&mut self, name: View) {
        self.force_created.insert(name);
    }

    pub fn is_force_created(&self, name: View) -> bool {
        self.force_created.contains(&name)
    }

    pub fn current_section_mut(&mut self) -> &mut Section {
        &mut self.sections[self.current_section]
    }

    pub fn current_section_name(&self) -> View {
        self.sections[self.current_section].name
    }

    pub fn current_pc(&self) -> u16 {
        self.sections[self.current_section].pc as u16
    }

    /// Called at the start of each pass: PCs reset, emitted bytes/relocs
    /// from a prior pass 2 (or the no-op pass 1) are cleared.
    pub fn reset_pass(&mut self) {
        for s in &mut self.sections {
            s.reset_pc();
        }
    }

    pub fn next_nonce(&mut self) -> u32 {
        self.nonce += 1;
        self.nonce
    }

    /// Non-empty sections plus any explicitly `@CREATE`d ones, per spec.md
    /// §4.6 ("Empty sections are omitted").
    pub fn sections_to_emit(&self) -> Vec<&Section> {
        self.sections
            .iter()
            .filter(|s| !s.data.is_empty() || self.force_created.contains(&s.name))
            .collect()
    }
}

impl Default for AssemblerContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defines_section_exists_from_construction() {
        let ctx = AssemblerContext::new();
        assert_eq!(ctx.pool.as_str(ctx.sections[0].name), "@DEFINES");
    }

    #[test]
    fn switching_to_new_section_creates_it() {
        let mut ctx = AssemblerContext::new();
        let code = ctx.pool.intern_str("CODE");
        ctx.switch_section(code);
        assert_eq!(ctx.current_section_name(), code);
        ctx.switch_section(code);
        assert_eq!(ctx.sections.len(), 2);
    }

    #[test]
    fn empty_sections_are_excluded_unless_force_created() {
        let mut ctx = AssemblerContext::new();
        let code = ctx.pool.intern_str("CODE");
        ctx.switch_section(code);
        assert!(ctx.sections_to_emit().is_empty());
        ctx.mark_force_created(code);
        assert_eq!(ctx.sections_to_emit().len(), 1);
    }
}
