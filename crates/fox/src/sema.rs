//! Semantic analysis (spec §4.2): redeclaration checking, name resolution, type checking, and
//! function-flow ("returns on all paths") analysis, run over an already-parsed [`AstContext`].
//!
//! Two phases run over the unit's top-level declarations before any function body is checked:
//! every function signature is resolved first, then every global variable is checked, so that a
//! function body may freely call a function declared later in the same unit (spec §3.5's
//! "forward refs at unit level").

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    ast::{
        highest_rank, is_lvalue, strip_lvalue, unify, AstContext, BinOp, DeclContextId, DeclId, DeclKind, ExprId,
        ExprKind, PrimKind, StmtKind, TypeId, TypeKind, UnOp,
    },
    diagnostic::{DiagId, DiagnosticEngine},
    intern::Ident,
    source::{SourceLoc, SourceRange},
};

/// Runs semantic analysis over `unit` (as produced by [`crate::parser::parse_unit`]), electing
/// the unique, legally-declared, unit-scope function named `entry_name` as the program's entry
/// point (spec §4.2, §8.4).
///
/// # Panics
/// Panics if `unit` is not a `DeclKind::Unit` decl.
pub fn analyze(ctx: &mut AstContext, unit: DeclId, entry_name: &str, diags: &mut DiagnosticEngine) {
    let DeclKind::Unit(u) = ctx.decl(unit).kind.clone() else {
        panic!("analyze called on a non-unit decl");
    };
    let unit_scope = u.scope;

    check_scope_redeclarations(ctx, unit_scope, diags);

    let top_decls = ctx.decl_context(unit_scope).decls.clone();

    for &d in &top_decls {
        if matches!(ctx.decl(d).kind, DeclKind::Func(_)) {
            resolve_func_signature(ctx, d);
        }
    }
    for &d in &top_decls {
        if matches!(ctx.decl(d).kind, DeclKind::Var(_)) {
            check_var_decl(ctx, diags, unit_scope, d);
        }
    }
    for &d in &top_decls {
        if let DeclKind::Func(f) = ctx.decl(d).kind.clone() {
            check_scope_redeclarations(ctx, f.scope, diags);
            check_function_body(ctx, diags, d);
        }
    }

    elect_entry_point(ctx, unit, entry_name, diags);
}

// ---- redeclaration checking ------------------------------------------------------------------

/// The three name categories redeclaration legality is judged between (spec §4.2). Builtin and
/// user functions share a bucket: both are callable names, and a user function redeclaring a
/// builtin is exactly as illegal as redeclaring another user function.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Var,
    Param,
    Func,
}

fn bucket(kind: &DeclKind) -> Option<Bucket> {
    match kind {
        DeclKind::Var(_) => Some(Bucket::Var),
        DeclKind::Param(_) => Some(Bucket::Param),
        DeclKind::Func(_) | DeclKind::BuiltinFunc(_) => Some(Bucket::Func),
        DeclKind::Unit(_) => None,
    }
}

/// `None` means the pairing is a legal shadow (only a local variable shadowing a parameter of
/// the same name); otherwise the diagnostic to raise against the later declaration.
fn redecl_diag(a: Bucket, b: Bucket) -> Option<DiagId> {
    match (a, b) {
        (Bucket::Var, Bucket::Param) | (Bucket::Param, Bucket::Var) => None,
        (Bucket::Var, Bucket::Var) => Some(DiagId::InvalidVarRedeclaration),
        (Bucket::Param, Bucket::Param) => Some(DiagId::InvalidParamRedeclaration),
        (Bucket::Func, Bucket::Func) => Some(DiagId::InvalidFuncRedeclaration),
        _ => Some(DiagId::InvalidCrossKindRedeclaration),
    }
}

/// Walks every name declared directly in `scope` (in lexical/insertion order) and flags illegal
/// redeclarations by setting [`crate::ast::Decl::illegal_redecl`].
///
/// A local variable legally shadowing a parameter of the same name promotes the tracked "current"
/// declaration for that name to the variable, so a *third* declaration under the same name is
/// compared against the shadowing variable rather than the shadowed parameter - this is not
/// spelled out in the spec's two-declaration examples but is the only reading consistent with
/// "the narrower scope wins" (see [`best_local_non_illegal`]).
fn check_scope_redeclarations(ctx: &mut AstContext, scope: DeclContextId, diags: &mut DiagnosticEngine) {
    let decl_ids = ctx.decl_context(scope).decls.clone();
    let mut tracked: AHashMap<Ident, DeclId> = AHashMap::default();

    for id in decl_ids {
        let name = ctx.decl(id).name;
        let Some(new_bucket) = bucket(&ctx.decl(id).kind) else { continue };
        match tracked.get(&name).copied() {
            None => {
                tracked.insert(name, id);
            }
            Some(original) => {
                let Some(original_bucket) = bucket(&ctx.decl(original).kind) else { continue };
                match redecl_diag(original_bucket, new_bucket) {
                    None => {
                        if new_bucket == Bucket::Var {
                            tracked.insert(name, id);
                        }
                    }
                    Some(diag_id) => {
                        ctx.decl_mut(id).illegal_redecl = true;
                        let name_str = ctx.interner.resolve(name).to_owned();
                        diags.report(diag_id, ctx.decl(id).range).add_arg(name_str);
                        diags.report(DiagId::FirstDeclaredHere, ctx.decl(original).range);
                    }
                }
            }
        }
    }
}

// ---- variable and function-signature checking ------------------------------------------------

fn check_var_decl(ctx: &mut AstContext, diags: &mut DiagnosticEngine, scope: DeclContextId, decl_id: DeclId) {
    let (type_expr, initializer, is_global) = {
        let DeclKind::Var(v) = &ctx.decl(decl_id).kind else { unreachable!() };
        (v.type_expr.clone(), v.initializer, v.is_global)
    };
    let declared_ty = type_expr.resolve(&mut ctx.types);
    if let DeclKind::Var(v) = &mut ctx.decl_mut(decl_id).kind {
        v.resolved_type = Some(declared_ty);
    }

    if let Some(init) = initializer {
        let init_ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, init));
        if !matches!(ctx.types.kind(init_ty), TypeKind::Error) && !unify(&mut ctx.types, declared_ty, init_ty) {
            diags
                .report(DiagId::CannotInitializeVariable, ctx.decl(decl_id).range)
                .add_arg(ctx.types.display(declared_ty))
                .add_arg(ctx.types.display(init_ty));
        }
        if is_global && contains_declref(ctx, init) {
            diags.report(DiagId::GlobalInitializerNotConstant, ctx.decl(decl_id).range);
        }
    }
}

/// `true` if `id`'s expression tree references any declaration at all - a function call, a
/// variable, a parameter - rather than being built solely from literals and operators on them.
/// Global initializers must pass this check (spec §4.2: no references to other declarations).
fn contains_declref(ctx: &AstContext, id: ExprId) -> bool {
    match &ctx.expr(id).kind {
        ExprKind::IntLit(_)
        | ExprKind::DoubleLit(_)
        | ExprKind::CharLit(_)
        | ExprKind::BoolLit(_)
        | ExprKind::StringLit(_)
        | ExprKind::Error => false,
        ExprKind::ArrayLit(elems) => elems.iter().any(|&e| contains_declref(ctx, e)),
        ExprKind::Binary { lhs, rhs, .. } => contains_declref(ctx, *lhs) || contains_declref(ctx, *rhs),
        ExprKind::Unary { operand, .. } => contains_declref(ctx, *operand),
        ExprKind::Cast { inner, .. } => contains_declref(ctx, *inner),
        ExprKind::DeclRef(_)
        | ExprKind::UnresolvedDeclRef(_)
        | ExprKind::MemberOf { .. }
        | ExprKind::Subscript { .. }
        | ExprKind::Call { .. } => true,
    }
}

fn resolve_func_signature(ctx: &mut AstContext, decl_id: DeclId) {
    let DeclKind::Func(f) = ctx.decl(decl_id).kind.clone() else { unreachable!() };
    for &p in &f.params {
        let type_expr = {
            let DeclKind::Param(pd) = &ctx.decl(p).kind else { unreachable!() };
            pd.type_expr.clone()
        };
        let ty = type_expr.resolve(&mut ctx.types);
        if let DeclKind::Param(pd) = &mut ctx.decl_mut(p).kind {
            pd.resolved_type = Some(ty);
        }
    }
    let ret_ty = match &f.return_type_expr {
        Some(te) => te.resolve(&mut ctx.types),
        None => ctx.types.primitive(PrimKind::Void),
    };
    if let DeclKind::Func(f) = &mut ctx.decl_mut(decl_id).kind {
        f.resolved_return_type = Some(ret_ty);
    }
}

fn check_function_body(ctx: &mut AstContext, diags: &mut DiagnosticEngine, decl_id: DeclId) {
    let DeclKind::Func(f) = ctx.decl(decl_id).kind.clone() else { unreachable!() };
    let ret_ty = f.resolved_return_type.expect("signature resolved in phase 1");
    let returns = check_stmt(ctx, diags, f.scope, ret_ty, f.body);
    let void_ty = ctx.types.primitive(PrimKind::Void);
    if ret_ty != void_ty && !returns {
        let StmtKind::Compound(c) = ctx.stmt(f.body).kind.clone() else {
            unreachable!("a function body is always a compound statement")
        };
        let name = ctx.interner.resolve(ctx.decl(decl_id).name).to_owned();
        diags
            .report(DiagId::MissingReturn, SourceRange::single(c.scope_range.end()))
            .add_arg(name)
            .add_arg(ctx.types.display(ret_ty));
    }
}

fn elect_entry_point(ctx: &mut AstContext, unit: DeclId, entry_name: &str, diags: &mut DiagnosticEngine) {
    let DeclKind::Unit(u) = ctx.decl(unit).kind.clone() else { unreachable!() };
    let name = ctx.intern(entry_name);
    let candidate = ctx
        .decl_context(u.scope)
        .entries(name)
        .iter()
        .find(|(_, id)| !ctx.decl(*id).illegal_redecl && matches!(ctx.decl(*id).kind, DeclKind::Func(_)))
        .map(|(_, id)| *id);
    match candidate {
        Some(id) => {
            if let DeclKind::Func(f) = &mut ctx.decl_mut(id).kind {
                f.is_entry_point = true;
            }
            ctx.entry_point = Some(id);
        }
        None => {
            diags.report(DiagId::EntryPointNotFound, SourceRange::dummy()).add_arg(entry_name);
        }
    }
}

// ---- flow analysis ------------------------------------------------------------------------

/// Type-checks `id` and returns whether it (and, recursively, its children) return on every
/// control path (spec §4.2): a `Return` always does; a `Compound` does iff one of its direct
/// children does (anything after that point is unreachable); a `Condition` does iff both
/// branches do (a missing `else` never returns on all paths); a `While` never counts, since the
/// condition may be false on first entry.
fn check_stmt(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    scope: DeclContextId,
    ret_ty: TypeId,
    id: crate::ast::StmtId,
) -> bool {
    let kind = ctx.stmt(id).kind.clone();
    match kind {
        StmtKind::Compound(c) => {
            let mut returned = false;
            for node in c.nodes {
                if returned {
                    diags.report(DiagId::UnreachableCode, node_range(ctx, node));
                }
                match node {
                    crate::ast::AstNode::Decl(d) => check_var_decl(ctx, diags, scope, d),
                    crate::ast::AstNode::Expr(e) => {
                        type_check_expr(ctx, diags, scope, e);
                    }
                    crate::ast::AstNode::Stmt(s) => {
                        if check_stmt(ctx, diags, scope, ret_ty, s) {
                            returned = true;
                        }
                    }
                }
            }
            returned
        }
        StmtKind::Condition(c) => {
            expect_bool(ctx, diags, scope, c.cond);
            let then_returns = check_stmt(ctx, diags, scope, ret_ty, c.then_branch);
            match c.else_branch {
                Some(e) => then_returns && check_stmt(ctx, diags, scope, ret_ty, e),
                None => false,
            }
        }
        StmtKind::While(w) => {
            expect_bool(ctx, diags, scope, w.cond);
            check_stmt(ctx, diags, scope, ret_ty, w.body);
            false
        }
        StmtKind::Return(r) => {
            let range = ctx.stmt(id).range;
            match r.value {
                Some(v) => {
                    let vt = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, v));
                    if !matches!(ctx.types.kind(vt), TypeKind::Error) && !unify(&mut ctx.types, ret_ty, vt) {
                        diags
                            .report(DiagId::CannotUnifyTypes, range)
                            .add_arg(ctx.types.display(ret_ty))
                            .add_arg(ctx.types.display(vt));
                    }
                }
                None => {
                    let void_ty = ctx.types.primitive(PrimKind::Void);
                    if ret_ty != void_ty {
                        diags
                            .report(DiagId::CannotUnifyTypes, range)
                            .add_arg(ctx.types.display(ret_ty))
                            .add_arg("void");
                    }
                }
            }
            true
        }
        StmtKind::Null => false,
    }
}

fn node_range(ctx: &AstContext, node: crate::ast::AstNode) -> SourceRange {
    match node {
        crate::ast::AstNode::Decl(d) => ctx.decl(d).range,
        crate::ast::AstNode::Expr(e) => ctx.expr(e).range,
        crate::ast::AstNode::Stmt(s) => ctx.stmt(s).range,
    }
}

// ---- expression type-checking ------------------------------------------------------------------

/// Bottom-up type checks `id`, memoizing the result onto the expression node. Safe to call more
/// than once on the same id (e.g. a `.len()` receiver visited both directly and through its
/// wrapping `Call`).
pub fn type_check_expr(ctx: &mut AstContext, diags: &mut DiagnosticEngine, scope: DeclContextId, id: ExprId) -> TypeId {
    if let Some(ty) = ctx.expr(id).ty {
        return ty;
    }
    let range = ctx.expr(id).range;
    let kind = ctx.expr(id).kind.clone();
    let ty = match kind {
        ExprKind::IntLit(_) => ctx.types.primitive(PrimKind::Int),
        ExprKind::DoubleLit(_) => ctx.types.primitive(PrimKind::Double),
        ExprKind::CharLit(_) => ctx.types.primitive(PrimKind::Char),
        ExprKind::BoolLit(_) => ctx.types.primitive(PrimKind::Bool),
        ExprKind::StringLit(_) => ctx.types.primitive(PrimKind::String),
        ExprKind::ArrayLit(elems) => type_check_array_lit(ctx, diags, scope, range, &elems),
        ExprKind::Binary { op, op_range, lhs, rhs } => type_check_binary(ctx, diags, scope, op, op_range, lhs, rhs),
        ExprKind::Unary { op, operand } => type_check_unary(ctx, diags, scope, range, op, operand),
        ExprKind::Cast { target, inner, .. } => {
            let t = type_check_cast(ctx, diags, scope, range, &target, inner);
            if let ExprKind::Cast { resolved_target, .. } = &mut ctx.expr_mut(id).kind {
                *resolved_target = Some(t);
            }
            t
        }
        ExprKind::DeclRef(decl_id) => decl_ref_type(ctx, decl_id),
        ExprKind::UnresolvedDeclRef(name) => type_check_unresolved(ctx, diags, scope, id, range, name),
        ExprKind::MemberOf { base, member, member_range } => type_check_member(ctx, diags, scope, base, member, member_range),
        ExprKind::Subscript { base, index } => type_check_subscript(ctx, diags, scope, range, base, index),
        ExprKind::Call { callee, args } => type_check_call(ctx, diags, scope, range, callee, &args),
        ExprKind::Error => ctx.types.error(),
    };
    ctx.expr_mut(id).ty = Some(ty);
    ty
}

fn decl_ref_type(ctx: &mut AstContext, decl_id: DeclId) -> TypeId {
    match ctx.decl(decl_id).kind.clone() {
        DeclKind::Var(v) => {
            let base = v.resolved_type.expect("var type resolved before any reference is type-checked");
            if v.is_mutable { ctx.types.lvalue(base) } else { base }
        }
        DeclKind::Param(p) => {
            let base = p.resolved_type.expect("param type resolved in phase 1");
            if p.is_mutable { ctx.types.lvalue(base) } else { base }
        }
        DeclKind::Func(f) => {
            let params: SmallVec<[TypeId; 4]> = f
                .params
                .iter()
                .map(|&p| {
                    let DeclKind::Param(pd) = &ctx.decl(p).kind else { unreachable!() };
                    pd.resolved_type.expect("param type resolved in phase 1")
                })
                .collect();
            let ret = f.resolved_return_type.expect("signature resolved in phase 1");
            ctx.types.function(params, ret)
        }
        DeclKind::BuiltinFunc(b) => b.signature,
        DeclKind::Unit(_) => unreachable!("a unit decl is never referenced as a value"),
    }
}

fn type_check_unresolved(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    scope: DeclContextId,
    id: ExprId,
    range: SourceRange,
    name: Ident,
) -> TypeId {
    match resolve_single(ctx, scope, name, range.begin()) {
        Some(decl_id) => {
            ctx.expr_mut(id).kind = ExprKind::DeclRef(decl_id);
            decl_ref_type(ctx, decl_id)
        }
        None => {
            let name_str = ctx.interner.resolve(name).to_owned();
            diags.report(DiagId::UnresolvedIdentifier, range).add_arg(name_str);
            ctx.expr_mut(id).kind = ExprKind::Error;
            ctx.types.error()
        }
    }
}

fn type_check_array_lit(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    scope: DeclContextId,
    range: SourceRange,
    elems: &SmallVec<[ExprId; 4]>,
) -> TypeId {
    if elems.is_empty() {
        let cell = ctx.types.new_cell();
        return ctx.types.array(cell);
    }
    let elem_types: Vec<TypeId> =
        elems.iter().map(|&e| strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, e))).collect();
    let base = elem_types[0];
    for &t in &elem_types[1..] {
        if !unify(&mut ctx.types, base, t) {
            diags
                .report(DiagId::CannotUnifyTypes, range)
                .add_arg(ctx.types.display(base))
                .add_arg(ctx.types.display(t));
        }
    }
    ctx.types.array(base)
}

fn is_arith(ctx: &AstContext, ty: TypeId) -> bool {
    matches!(ctx.types.kind(ty), TypeKind::Primitive(p) if p.arith_rank().is_some())
}

fn is_int(ctx: &AstContext, ty: TypeId) -> bool {
    matches!(ctx.types.kind(ty), TypeKind::Primitive(PrimKind::Int))
}

fn is_concat_pair(ctx: &AstContext, a: TypeId, b: TypeId) -> bool {
    let concat_compatible = |t: TypeId| matches!(ctx.types.kind(t), TypeKind::Primitive(p) if p.is_concat_compatible());
    concat_compatible(a) && concat_compatible(b)
}

fn same_comparable_kind(ctx: &AstContext, a: TypeId, b: TypeId) -> bool {
    matches!((ctx.types.kind(a), ctx.types.kind(b)), (TypeKind::Primitive(p1), TypeKind::Primitive(p2)) if p1 == p2)
}

fn binary_error(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    op: BinOp,
    op_range: SourceRange,
    lhs_ty: TypeId,
    rhs_ty: TypeId,
) -> TypeId {
    diags
        .report(DiagId::InvalidBinaryOperands, op_range)
        .add_arg(ctx.types.display(lhs_ty))
        .add_arg(ctx.types.display(rhs_ty))
        .add_arg(op);
    ctx.types.error()
}

fn expect_bool(ctx: &mut AstContext, diags: &mut DiagnosticEngine, scope: DeclContextId, id: ExprId) -> TypeId {
    let ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, id));
    let bool_ty = ctx.types.primitive(PrimKind::Bool);
    if !matches!(ctx.types.kind(ty), TypeKind::Error) && ty != bool_ty {
        diags
            .report(DiagId::CannotUnifyTypes, ctx.expr(id).range)
            .add_arg("bool")
            .add_arg(ctx.types.display(ty));
    }
    bool_ty
}

fn type_check_assign(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    scope: DeclContextId,
    op_range: SourceRange,
    lhs: ExprId,
    rhs: ExprId,
) -> TypeId {
    let lhs_ty = type_check_expr(ctx, diags, scope, lhs);
    let rhs_ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, rhs));
    if !is_lvalue(&ctx.types, lhs_ty) {
        diags.report(DiagId::AssignToNonLvalue, op_range);
        return ctx.types.error();
    }
    let inner = strip_lvalue(&ctx.types, lhs_ty);
    if matches!(ctx.types.kind(rhs_ty), TypeKind::Error) {
        return inner;
    }
    if !unify(&mut ctx.types, inner, rhs_ty) {
        diags
            .report(DiagId::CannotUnifyTypes, op_range)
            .add_arg(ctx.types.display(inner))
            .add_arg(ctx.types.display(rhs_ty));
        return ctx.types.error();
    }
    inner
}

fn type_check_binary(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    scope: DeclContextId,
    op: BinOp,
    op_range: SourceRange,
    lhs: ExprId,
    rhs: ExprId,
) -> TypeId {
    if op == BinOp::Assign {
        return type_check_assign(ctx, diags, scope, op_range, lhs, rhs);
    }
    if matches!(op, BinOp::And | BinOp::Or) {
        expect_bool(ctx, diags, scope, lhs);
        expect_bool(ctx, diags, scope, rhs);
        return ctx.types.primitive(PrimKind::Bool);
    }

    let lhs_ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, lhs));
    let rhs_ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, rhs));
    if matches!(ctx.types.kind(lhs_ty), TypeKind::Error) || matches!(ctx.types.kind(rhs_ty), TypeKind::Error) {
        return ctx.types.error();
    }

    match op {
        BinOp::Add if is_concat_pair(ctx, lhs_ty, rhs_ty) => ctx.types.primitive(PrimKind::String),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Pow => {
            if is_arith(ctx, lhs_ty) && is_arith(ctx, rhs_ty) {
                highest_rank(&ctx.types, lhs_ty, rhs_ty)
            } else {
                binary_error(ctx, diags, op, op_range, lhs_ty, rhs_ty)
            }
        }
        // `%` is "only on int" (spec §4.2), an explicit carve-out from the other arithmetic
        // operators' "both arithmetic, promote via highestRank" rule: it never promotes bool or
        // double, it requires int on both sides.
        BinOp::Mod => {
            if is_int(ctx, lhs_ty) && is_int(ctx, rhs_ty) {
                lhs_ty
            } else {
                binary_error(ctx, diags, op, op_range, lhs_ty, rhs_ty)
            }
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            if is_arith(ctx, lhs_ty) && is_arith(ctx, rhs_ty) {
                ctx.types.primitive(PrimKind::Bool)
            } else {
                binary_error(ctx, diags, op, op_range, lhs_ty, rhs_ty)
            }
        }
        BinOp::Eq | BinOp::Ne => {
            if same_comparable_kind(ctx, lhs_ty, rhs_ty) {
                ctx.types.primitive(PrimKind::Bool)
            } else {
                binary_error(ctx, diags, op, op_range, lhs_ty, rhs_ty)
            }
        }
        BinOp::And | BinOp::Or | BinOp::Assign => unreachable!("handled above"),
    }
}

fn type_check_unary(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    scope: DeclContextId,
    range: SourceRange,
    op: UnOp,
    operand: ExprId,
) -> TypeId {
    let ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, operand));
    if matches!(ctx.types.kind(ty), TypeKind::Error) {
        return ctx.types.error();
    }
    match op {
        UnOp::Not => {
            let bool_ty = ctx.types.primitive(PrimKind::Bool);
            if ty == bool_ty {
                bool_ty
            } else {
                diags.report(DiagId::InvalidUnaryOperand, range).add_arg(ctx.types.display(ty)).add_arg(op);
                ctx.types.error()
            }
        }
        UnOp::Neg | UnOp::Plus => {
            if is_arith(ctx, ty) {
                ty
            } else {
                diags.report(DiagId::InvalidUnaryOperand, range).add_arg(ctx.types.display(ty)).add_arg(op);
                ctx.types.error()
            }
        }
    }
}

fn is_valid_cast(ctx: &AstContext, from: TypeId, to: TypeId) -> bool {
    if ctx.types.structurally_equal(from, to) {
        return true;
    }
    let (TypeKind::Primitive(f), TypeKind::Primitive(t)) = (ctx.types.kind(from), ctx.types.kind(to)) else {
        return false;
    };
    matches!(
        (f, t),
        (PrimKind::Bool, PrimKind::Int)
            | (PrimKind::Int, PrimKind::Bool)
            | (PrimKind::Bool, PrimKind::Double)
            | (PrimKind::Double, PrimKind::Bool)
            | (PrimKind::Int, PrimKind::Double)
            | (PrimKind::Double, PrimKind::Int)
            | (PrimKind::Char, PrimKind::String)
            | (PrimKind::String, PrimKind::Char)
    )
}

fn type_check_cast(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    scope: DeclContextId,
    range: SourceRange,
    target: &crate::ast::TypeExpr,
    inner: ExprId,
) -> TypeId {
    let inner_ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, inner));
    let target_ty = target.resolve(&mut ctx.types);
    if matches!(ctx.types.kind(inner_ty), TypeKind::Error) {
        return target_ty;
    }
    if is_valid_cast(ctx, inner_ty, target_ty) {
        target_ty
    } else {
        diags
            .report(DiagId::InvalidCast, range)
            .add_arg(ctx.types.display(inner_ty))
            .add_arg(ctx.types.display(target_ty));
        ctx.types.error()
    }
}

fn type_check_member(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    scope: DeclContextId,
    base: ExprId,
    member: Ident,
    member_range: SourceRange,
) -> TypeId {
    let base_ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, base));
    if matches!(ctx.types.kind(base_ty), TypeKind::Error) {
        return ctx.types.error();
    }
    // Every member access Fox supports is the `.len()` call form, handled directly by
    // `type_check_call` before it ever reaches here; a bare `.member` (no call, or any name
    // other than `len`) is never valid.
    let member_name = ctx.interner.resolve(member).to_owned();
    diags.report(DiagId::UnknownMember, member_range).add_arg(member_name).add_arg(ctx.types.display(base_ty));
    ctx.types.error()
}

fn type_check_subscript(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    scope: DeclContextId,
    range: SourceRange,
    base: ExprId,
    index: ExprId,
) -> TypeId {
    let base_ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, base));
    let idx_ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, index));
    let elem = match ctx.types.kind(base_ty).clone() {
        TypeKind::Array(e) => e,
        TypeKind::Error => return ctx.types.error(),
        _ => {
            diags.report(DiagId::SubscriptNonArray, range).add_arg(ctx.types.display(base_ty));
            return ctx.types.error();
        }
    };
    let int_ty = ctx.types.primitive(PrimKind::Int);
    if !matches!(ctx.types.kind(idx_ty), TypeKind::Error) && idx_ty != int_ty {
        diags.report(DiagId::NonIntSubscript, range).add_arg(ctx.types.display(idx_ty));
    }
    ctx.types.lvalue(elem)
}

fn callable_signature(ctx: &AstContext, decl_id: DeclId) -> Option<(Vec<TypeId>, TypeId)> {
    match &ctx.decl(decl_id).kind {
        DeclKind::Func(f) => {
            let params = f
                .params
                .iter()
                .map(|&p| {
                    let DeclKind::Param(pd) = &ctx.decl(p).kind else { unreachable!() };
                    pd.resolved_type.expect("param type resolved in phase 1")
                })
                .collect();
            Some((params, f.resolved_return_type.expect("signature resolved in phase 1")))
        }
        DeclKind::BuiltinFunc(b) => {
            let TypeKind::Function(params, ret) = ctx.types.kind(b.signature).clone() else {
                unreachable!("a builtin's signature is always a function type")
            };
            Some((params.to_vec(), ret))
        }
        DeclKind::Var(_) | DeclKind::Param(_) | DeclKind::Unit(_) => None,
    }
}

/// All visible, non-illegal declarations named `name` that a call site could mean: a single
/// local match (shadowing anything outer) if one exists, otherwise every same-named entry in the
/// nearest enclosing scope that has one (so the several `print` overloads living in unit scope
/// are all considered together, spec §4.2's overload-resolution note).
fn resolve_call_candidates(ctx: &AstContext, scope: DeclContextId, name: Ident, at: SourceLoc) -> Vec<DeclId> {
    if let Some(id) = best_local_non_illegal(ctx, scope, name, at) {
        return vec![id];
    }
    let mut cur = ctx.decl_context(scope).parent;
    while let Some(p) = cur {
        let candidates: Vec<DeclId> =
            ctx.decl_context(p).entries(name).iter().filter(|(_, id)| !ctx.decl(*id).illegal_redecl).map(|(_, id)| *id).collect();
        if !candidates.is_empty() {
            return candidates;
        }
        cur = ctx.decl_context(p).parent;
    }
    Vec::new()
}

/// The single best match for a plain (non-call) identifier reference: the narrowest local match,
/// else the first non-illegal match walking outward through enclosing scopes.
fn resolve_single(ctx: &AstContext, scope: DeclContextId, name: Ident, at: SourceLoc) -> Option<DeclId> {
    if let Some(id) = best_local_non_illegal(ctx, scope, name, at) {
        return Some(id);
    }
    let mut cur = ctx.decl_context(scope).parent;
    while let Some(p) = cur {
        if let Some((_, id)) = ctx.decl_context(p).entries(name).iter().find(|(_, id)| !ctx.decl(*id).illegal_redecl) {
            return Some(*id);
        }
        cur = ctx.decl_context(p).parent;
    }
    None
}

/// The narrowest-scoped entry under `name` that is visible at `at` (spec §4.2's local lookup:
/// scope range contains `at`, `visible_from` precedes it; among candidates - e.g. a local
/// shadowing a parameter - the one with the smaller scope range wins) and not an illegal
/// redeclaration. `DeclContext` itself stays a pure append-and-query structure and never learns
/// about the `illegal_redecl` flag, which lives on `Decl`, so that predicate is folded in here
/// rather than filtered afterward - a plain post-filter of a single narrowest match can't fall
/// back to the next-narrowest candidate when the narrowest one turns out to be illegal.
fn best_local_non_illegal(ctx: &AstContext, scope: DeclContextId, name: Ident, at: SourceLoc) -> Option<DeclId> {
    ctx.decl_context(scope)
        .entries(name)
        .iter()
        .filter(|(info, id)| info.scope_range.contains(at) && info.visible_from.offset() <= at.offset() && !ctx.decl(*id).illegal_redecl)
        .min_by_key(|(info, _)| info.scope_range.end().offset() - info.scope_range.begin().offset())
        .map(|(_, id)| *id)
}

fn type_check_call(
    ctx: &mut AstContext,
    diags: &mut DiagnosticEngine,
    scope: DeclContextId,
    range: SourceRange,
    callee: ExprId,
    args: &SmallVec<[ExprId; 4]>,
) -> TypeId {
    if args.is_empty() {
        if let ExprKind::MemberOf { base, member, member_range } = ctx.expr(callee).kind.clone() {
            let member_name = ctx.interner.resolve(member).to_owned();
            if member_name == "len" {
                let base_ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, base));
                ctx.expr_mut(callee).ty = Some(base_ty);
                return match ctx.types.kind(base_ty).clone() {
                    TypeKind::Array(_) | TypeKind::Primitive(PrimKind::String) => ctx.types.primitive(PrimKind::Int),
                    TypeKind::Error => ctx.types.error(),
                    _ => {
                        diags
                            .report(DiagId::UnknownMember, member_range)
                            .add_arg("len")
                            .add_arg(ctx.types.display(base_ty));
                        ctx.types.error()
                    }
                };
            }
        }
    }

    let arg_types: Vec<TypeId> =
        args.iter().map(|&a| strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, a))).collect();

    let ExprKind::UnresolvedDeclRef(name) = ctx.expr(callee).kind.clone() else {
        let callee_ty = strip_lvalue(&ctx.types, type_check_expr(ctx, diags, scope, callee));
        if !matches!(ctx.types.kind(callee_ty), TypeKind::Error) {
            diags.report(DiagId::CallNonFunction, range).add_arg(ctx.types.display(callee_ty));
        }
        return ctx.types.error();
    };

    let candidates = resolve_call_candidates(ctx, scope, name, range.begin());
    if candidates.is_empty() {
        let name_str = ctx.interner.resolve(name).to_owned();
        diags.report(DiagId::UnresolvedIdentifier, ctx.expr(callee).range).add_arg(name_str);
        ctx.expr_mut(callee).kind = ExprKind::Error;
        return ctx.types.error();
    }

    for &cand in &candidates {
        let Some((params, ret)) = callable_signature(ctx, cand) else { continue };
        if params.len() != arg_types.len() {
            continue;
        }
        if params.iter().zip(&arg_types).all(|(&p, &a)| unify(&mut ctx.types, p, a)) {
            ctx.expr_mut(callee).kind = ExprKind::DeclRef(cand);
            let callee_ty = decl_ref_type(ctx, cand);
            ctx.expr_mut(callee).ty = Some(callee_ty);
            return ret;
        }
    }

    let first = candidates[0];
    match callable_signature(ctx, first) {
        Some((params, _)) => {
            diags.report(DiagId::ArgumentCountMismatch, range).add_arg(params.len()).add_arg(arg_types.len());
        }
        None => {
            let t = strip_lvalue(&ctx.types, decl_ref_type(ctx, first));
            diags.report(DiagId::CallNonFunction, range).add_arg(ctx.types.display(t));
        }
    }
    ctx.expr_mut(callee).kind = ExprKind::Error;
    ctx.types.error()
}

#[cfg(test)]
mod tests {
    use super::analyze;
    use crate::{ast::AstContext, diagnostic::DiagnosticEngine, lexer::lex, parser::parse_unit, source::SourceManager};

    fn run(src: &str) -> (AstContext, DiagnosticEngine) {
        let mut files = SourceManager::new();
        let file = files.add_buffer("t.fox", src);
        let mut ctx = AstContext::new();
        let mut diags = DiagnosticEngine::default();
        let tokens = lex(&files, file, &mut ctx.interner, &mut diags);
        let unit = parse_unit(&tokens, &mut ctx, &mut diags).expect("parses");
        analyze(&mut ctx, unit, "main", &mut diags);
        (ctx, diags)
    }

    #[test]
    fn well_typed_program_has_no_errors_and_elects_main() {
        let (ctx, diags) = run("func main() : void { var x : int = 1; print(x); }");
        assert!(diags.diagnostics().is_empty(), "{:?}", diags.diagnostics());
        assert!(ctx.entry_point.is_some());
    }

    #[test]
    fn missing_return_is_reported() {
        let (_, diags) = run("func main() : int { var x : int = 1; }");
        assert!(diags.diagnostics().iter().any(|d| d.id == crate::diagnostic::DiagId::MissingReturn));
    }

    #[test]
    fn unresolved_identifier_is_reported() {
        let (_, diags) = run("func main() : void { print(y); }");
        assert!(diags.diagnostics().iter().any(|d| d.id == crate::diagnostic::DiagId::UnresolvedIdentifier));
    }

    #[test]
    fn duplicate_global_var_is_illegal() {
        let (ctx, diags) = run("var x : int = 1; var x : int = 2; func main() : void { }");
        assert!(diags.diagnostics().iter().any(|d| d.id == crate::diagnostic::DiagId::InvalidVarRedeclaration));
        let _ = ctx;
    }

    #[test]
    fn local_shadowing_a_parameter_is_legal() {
        let (_, diags) = run("func f(x : int) : int { var x : int = x + 1; return x; }");
        assert!(diags.diagnostics().is_empty(), "{:?}", diags.diagnostics());
    }

    #[test]
    fn array_len_lowers_without_resolving_a_free_function() {
        let (_, diags) = run("func main() : void { var a : [int] = [1, 2, 3]; var n : int = a.len(); print(n); }");
        assert!(diags.diagnostics().is_empty(), "{:?}", diags.diagnostics());
    }

    #[test]
    fn entry_point_not_found_without_main() {
        let (_, diags) = run("func other() : void { }");
        assert!(diags.diagnostics().iter().any(|d| d.id == crate::diagnostic::DiagId::EntryPointNotFound));
    }
}
