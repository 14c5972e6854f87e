//! A human-readable AST dump, used by the CLI's `--dump-ast` flag. Unlike
//! [`crate::bytecode::dump_module`] this has no deterministic format spec (spec §6's "dumpers"
//! are out of scope) and exists purely as a debugging aid.

use std::fmt::Write as _;

use super::{AstContext, AstNode, DeclId, DeclKind, ExprId, ExprKind, StmtId, StmtKind};

/// Renders `unit` (and every declaration reachable from it) as an indented tree.
#[must_use]
pub fn dump_unit(ctx: &AstContext, unit: DeclId) -> String {
    let mut out = String::new();
    dump_decl(ctx, unit, 0, &mut out);
    out
}

fn dump_decl(ctx: &AstContext, id: DeclId, depth: usize, out: &mut String) {
    let decl = ctx.decl(id);
    let name = ctx.interner.resolve(decl.name);
    match &decl.kind {
        DeclKind::Unit(u) => {
            writeln!(out, "{}Unit", pad(depth)).unwrap();
            for &child in &ctx.decl_context(u.scope).decls {
                dump_decl(ctx, child, depth + 1, out);
            }
        }
        DeclKind::Func(f) => {
            let entry = if f.is_entry_point { " [entry]" } else { "" };
            writeln!(out, "{}Func {name}{entry}", pad(depth)).unwrap();
            for &p in &ctx.decl_context(f.scope).decls {
                if matches!(ctx.decl(p).kind, DeclKind::Param(_)) {
                    dump_decl(ctx, p, depth + 1, out);
                }
            }
            dump_stmt(ctx, f.body, depth + 1, out);
        }
        DeclKind::Param(_) => {
            writeln!(out, "{}Param {name}", pad(depth)).unwrap();
        }
        DeclKind::Var(v) => {
            let kind = if v.is_global { "Global" } else { "Var" };
            writeln!(out, "{}{kind} {name}", pad(depth)).unwrap();
            if let Some(init) = v.initializer {
                dump_expr(ctx, init, depth + 1, out);
            }
        }
        DeclKind::BuiltinFunc(_) => {
            writeln!(out, "{}BuiltinFunc {name}", pad(depth)).unwrap();
        }
    }
}

fn dump_stmt(ctx: &AstContext, id: StmtId, depth: usize, out: &mut String) {
    match &ctx.stmt(id).kind {
        StmtKind::Compound(c) => {
            writeln!(out, "{}Block", pad(depth)).unwrap();
            for &node in &c.nodes {
                match node {
                    AstNode::Decl(d) => dump_decl(ctx, d, depth + 1, out),
                    AstNode::Expr(e) => dump_expr(ctx, e, depth + 1, out),
                    AstNode::Stmt(s) => dump_stmt(ctx, s, depth + 1, out),
                }
            }
        }
        StmtKind::Condition(c) => {
            writeln!(out, "{}If", pad(depth)).unwrap();
            dump_expr(ctx, c.cond, depth + 1, out);
            dump_stmt(ctx, c.then_branch, depth + 1, out);
            if let Some(e) = c.else_branch {
                dump_stmt(ctx, e, depth + 1, out);
            }
        }
        StmtKind::While(w) => {
            writeln!(out, "{}While", pad(depth)).unwrap();
            dump_expr(ctx, w.cond, depth + 1, out);
            dump_stmt(ctx, w.body, depth + 1, out);
        }
        StmtKind::Return(r) => {
            writeln!(out, "{}Return", pad(depth)).unwrap();
            if let Some(v) = r.value {
                dump_expr(ctx, v, depth + 1, out);
            }
        }
        StmtKind::Null => {
            writeln!(out, "{}Null", pad(depth)).unwrap();
        }
    }
}

fn dump_expr(ctx: &AstContext, id: ExprId, depth: usize, out: &mut String) {
    let expr = ctx.expr(id);
    match &expr.kind {
        ExprKind::IntLit(v) => writeln!(out, "{}IntLit {v}", pad(depth)).unwrap(),
        ExprKind::DoubleLit(v) => writeln!(out, "{}DoubleLit {v}", pad(depth)).unwrap(),
        ExprKind::CharLit(v) => writeln!(out, "{}CharLit {v:?}", pad(depth)).unwrap(),
        ExprKind::BoolLit(v) => writeln!(out, "{}BoolLit {v}", pad(depth)).unwrap(),
        ExprKind::StringLit(v) => writeln!(out, "{}StringLit {v:?}", pad(depth)).unwrap(),
        ExprKind::ArrayLit(elems) => {
            writeln!(out, "{}ArrayLit", pad(depth)).unwrap();
            for &e in elems {
                dump_expr(ctx, e, depth + 1, out);
            }
        }
        ExprKind::Binary { op, lhs, rhs, .. } => {
            writeln!(out, "{}Binary {op}", pad(depth)).unwrap();
            dump_expr(ctx, *lhs, depth + 1, out);
            dump_expr(ctx, *rhs, depth + 1, out);
        }
        ExprKind::Unary { op, operand } => {
            writeln!(out, "{}Unary {op}", pad(depth)).unwrap();
            dump_expr(ctx, *operand, depth + 1, out);
        }
        ExprKind::Cast { inner, .. } => {
            writeln!(out, "{}Cast", pad(depth)).unwrap();
            dump_expr(ctx, *inner, depth + 1, out);
        }
        ExprKind::DeclRef(decl_id) => {
            let name = ctx.interner.resolve(ctx.decl(*decl_id).name);
            writeln!(out, "{}DeclRef {name}", pad(depth)).unwrap();
        }
        ExprKind::UnresolvedDeclRef(ident) => {
            writeln!(out, "{}UnresolvedDeclRef {}", pad(depth), ctx.interner.resolve(*ident)).unwrap();
        }
        ExprKind::MemberOf { base, member, .. } => {
            writeln!(out, "{}MemberOf .{}", pad(depth), ctx.interner.resolve(*member)).unwrap();
            dump_expr(ctx, *base, depth + 1, out);
        }
        ExprKind::Subscript { base, index } => {
            writeln!(out, "{}Subscript", pad(depth)).unwrap();
            dump_expr(ctx, *base, depth + 1, out);
            dump_expr(ctx, *index, depth + 1, out);
        }
        ExprKind::Call { callee, args } => {
            writeln!(out, "{}Call", pad(depth)).unwrap();
            dump_expr(ctx, *callee, depth + 1, out);
            for &a in args {
                dump_expr(ctx, a, depth + 1, out);
            }
        }
        ExprKind::Error => writeln!(out, "{}Error", pad(depth)).unwrap(),
    }
}

fn pad(depth: usize) -> String {
    "  ".repeat(depth)
}
