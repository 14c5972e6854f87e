//! The declaration-context scope tree (spec §3.5).

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::DeclId;
use crate::{intern::Ident, source::SourceRange};

/// For local decls, the source range of the enclosing compound-statement scope; lookup at a
/// location filters results by containment within this range (spec §3.5/§4.2).
#[derive(Debug, Clone, Copy)]
pub struct ScopeInfo {
    pub scope_range: SourceRange,
    /// The location from which this decl becomes visible to unqualified lookup. For a
    /// `ParamDecl` this is the function body's opening brace; for a local `VarDecl` it is the
    /// end of the declaration statement itself (its own initializer cannot see it - spec §8.4
    /// scenario 6's `var x : int = x + 1;` resolves `x` to the outer parameter precisely
    /// because the local `x` is not yet visible at that point).
    pub visible_from: crate::source::SourceLoc,
}

/// A node in the scope tree. Owns its contained decls (in lexical insertion order) and a
/// lookup multimap from identifier to `(ScopeInfo, DeclId)`.
///
/// Lifecycle: created when the parser enters a function body or unit, populated by `add_decl`
/// as decls are parsed, immutable after semantic analysis (nothing mutates it past that point,
/// enforced by convention rather than the type system, matching the teacher's AST mutability
/// model).
#[derive(Debug, Clone)]
pub struct DeclContext {
    pub parent: Option<super::context::DeclContextId>,
    pub decls: Vec<DeclId>,
    pub is_unit: bool,
    lookup: IndexMap<Ident, SmallVec<[(ScopeInfo, DeclId); 2]>>,
}

impl DeclContext {
    #[must_use]
    pub fn new(parent: Option<super::context::DeclContextId>, is_unit: bool) -> Self {
        Self { parent, decls: Vec::new(), is_unit, lookup: IndexMap::new() }
    }

    /// Registers `decl` under `name` with the given scope info, in lexical order.
    pub fn add_decl(&mut self, name: Ident, decl: DeclId, scope: ScopeInfo) {
        self.decls.push(decl);
        self.lookup.entry(name).or_default().push((scope, decl));
    }

    /// All `(ScopeInfo, DeclId)` entries registered under `name` directly in this context (not
    /// walking to parents), in insertion order.
    #[must_use]
    pub fn entries(&self, name: Ident) -> &[(ScopeInfo, DeclId)] {
        self.lookup.get(&name).map_or(&[], SmallVec::as_slice)
    }
}
