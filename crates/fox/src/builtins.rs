//! Built-in intrinsics: `print` (spec §3.3's `BuiltinFuncDecl`).
//!
//! `len` is *not* registered here: `a.len()`/`s.len()` is recognised directly as a syntactic
//! pattern by the semantic analyser and lowered straight to the `ArrayLen`/`StringLen` opcodes
//! (spec §C.5), bypassing declaration lookup and overload resolution entirely. A free-function
//! `len` would need one overload per element type just like `print`, but unlike `print` it has
//! no use outside of member-call position, so modelling it as a decl at all would just be
//! machinery with nothing using it.

use smallvec::SmallVec;

use crate::ast::{AstContext, PrimKind, TypeId};

/// Identifies a runtime intrinsic by name; carried on a [`BuiltinFuncDecl`](crate::ast::BuiltinFuncDecl)
/// rather than a user-visible function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "camelCase")]
pub enum BuiltinIntrinsic {
    /// `print(value)`: writes a value's display form followed by a newline. Overloaded over
    /// every primitive type at the call site rather than generic at the declaration.
    Print,
}

impl BuiltinIntrinsic {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
        }
    }
}

/// Registers every builtin into `ctx`'s unit scope, returning their decl ids keyed by intrinsic.
///
/// `print` is registered once per primitive argument type; the type checker picks the right
/// overload by argument type (spec §4.2's overload-resolution note).
pub fn register_builtins(ctx: &mut AstContext, scope: crate::ast::DeclContextId) -> Vec<crate::ast::DeclId> {
    let mut ids = Vec::new();

    for prim in [PrimKind::Bool, PrimKind::Int, PrimKind::Double, PrimKind::Char, PrimKind::String] {
        let arg_ty = ctx.types.primitive(prim);
        let void_ty = ctx.types.primitive(PrimKind::Void);
        ids.push(declare(ctx, scope, BuiltinIntrinsic::Print, smallvec_of([arg_ty]), void_ty));
    }

    ids
}

fn smallvec_of<const N: usize>(items: [TypeId; N]) -> SmallVec<[TypeId; 4]> {
    items.into_iter().collect()
}

fn declare(
    ctx: &mut AstContext,
    scope: crate::ast::DeclContextId,
    intrinsic: BuiltinIntrinsic,
    params: SmallVec<[TypeId; 4]>,
    ret: TypeId,
) -> crate::ast::DeclId {
    use crate::ast::{BuiltinFuncDecl, Decl, DeclKind, ScopeInfo};
    use crate::source::SourceRange;

    let signature = ctx.types.function(params, ret);
    let name = ctx.intern(intrinsic.name());
    let decl = Decl::new(
        DeclKind::BuiltinFunc(BuiltinFuncDecl { signature, intrinsic }),
        name,
        SourceRange::dummy(),
        Some(scope),
    );
    let id = ctx.alloc_decl(decl);
    ctx.decl_context_mut(scope)
        .add_decl(name, id, ScopeInfo { scope_range: SourceRange::dummy(), visible_from: SourceRange::dummy().begin() });
    id
}

#[cfg(test)]
mod tests {
    use super::{register_builtins, BuiltinIntrinsic};
    use crate::ast::{AstContext, DeclContext};

    #[test]
    fn registers_one_print_overload_per_primitive() {
        let mut ctx = AstContext::new();
        let scope = ctx.alloc_decl_context(DeclContext::new(None, true));
        let ids = register_builtins(&mut ctx, scope);
        assert_eq!(ids.len(), 5);
        assert!(ids.iter().all(|id| match &ctx.decl(*id).kind {
            crate::ast::DeclKind::BuiltinFunc(b) => b.intrinsic == BuiltinIntrinsic::Print,
            _ => false,
        }));
    }
}
