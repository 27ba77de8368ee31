//! Canon Symbol Table
//!
//! Words intern their spelling here once and carry a [`SymbolId`] from
//! then on. Comparison is case-insensitive: `Foo`, `FOO` and `foo` canon
//! to the same id, and the spelling recorded is the first one seen.
//!
//! Symbols are ids into this table rather than heap nodes, so the table
//! is never a collection candidate; it lives exactly as long as the
//! interpreter that owns it.

use std::collections::HashMap;

/// Interned symbol handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    /// Spelling as first seen, indexed by SymbolId.
    names: Vec<String>,
    /// Lowercased spelling -> id.
    canon: HashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Intern a spelling, returning the canon id for its case-folded form.
    pub fn intern(&mut self, spelling: &str) -> SymbolId {
        let folded = spelling.to_lowercase();
        if let Some(&id) = self.canon.get(&folded) {
            return id;
        }
        let id = SymbolId(self.names.len() as u32);
        self.names.push(spelling.to_string());
        self.canon.insert(folded, id);
        id
    }

    /// Canon id for a spelling that may not have been interned.
    pub fn lookup(&self, spelling: &str) -> Option<SymbolId> {
        self.canon.get(&spelling.to_lowercase()).copied()
    }

    /// The recorded spelling of a symbol.
    pub fn text(&self, id: SymbolId) -> &str {
        &self.names[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_canon() {
        let mut t = SymbolTable::new();
        let a = t.intern("Append");
        let b = t.intern("APPEND");
        let c = t.intern("append");
        assert_eq!(a, b);
        assert_eq!(b, c);
        // First spelling wins.
        assert_eq!(t.text(a), "Append");
    }

    #[test]
    fn test_distinct_symbols() {
        let mut t = SymbolTable::new();
        let a = t.intern("foo");
        let b = t.intern("bar");
        assert_ne!(a, b);
        assert_eq!(t.lookup("FOO"), Some(a));
        assert_eq!(t.lookup("baz"), None);
    }
}
