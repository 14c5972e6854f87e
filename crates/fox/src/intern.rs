//! Identifier interning.
//!
//! Identifiers are interned once per [`AstContext`](crate::ast::AstContext) and compared by
//! pointer (here: by the numeric id returned at intern time), never by string content, after
//! interning. The intern table owns the backing strings; handles remain valid for the
//! context's lifetime.

use ahash::AHashMap;

/// A handle to an interned identifier string.
///
/// Two `Ident`s compare equal iff they were interned from equal strings by the same
/// [`Interner`] - this is the "identifier equality is pointer-equality after interning"
/// invariant from the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Ident(u32);

impl Ident {
    /// Reconstructs an `Ident` from a raw index.
    ///
    /// Only meant to be used by the bytecode dumper and persistence layer, which store
    /// idents as plain integers and reconstruct them against the same [`Interner`].
    #[must_use]
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Insertion-ordered, deduplicating string interner.
///
/// Owns every interned string; returns stable, cheap-to-copy handles. Because identifiers are
/// never mutated once interned, this is a pure insertion-only structure - no removal API is
/// exposed.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, Ident>,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `text`, returning its (possibly pre-existing) handle.
    pub fn intern(&mut self, text: &str) -> Ident {
        if let Some(&id) = self.lookup.get(text) {
            return id;
        }
        let id = Ident(u32::try_from(self.strings.len()).expect("identifier table overflow"));
        self.strings.push(text.into());
        self.lookup.insert(text.into(), id);
        id
    }

    /// Resolves an interned handle back to its text.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this interner.
    #[must_use]
    pub fn resolve(&self, id: Ident) -> &str {
        &self.strings[id.index()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Interner;

    #[test]
    fn interning_is_idempotent() {
        let mut interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        assert_eq!(a, b);
        let c = interner.intern("world");
        assert_ne!(a, c);
    }

    #[test]
    fn resolves_back_to_original_text() {
        let mut interner = Interner::new();
        let id = interner.intern("fox");
        assert_eq!(interner.resolve(id), "fox");
    }
}
