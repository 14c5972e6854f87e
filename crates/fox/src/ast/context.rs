//! The AST context: owns every arena (decls, statements, expressions, scope tree), the
//! identifier interner, and the type table for one compilation unit (spec §2, §3.1, §9).

use super::{
    decl::Decl,
    decl_context::DeclContext,
    expr::{Expr, ExprId},
    stmt::{Stmt, StmtId},
    ty::TypeTable,
};
use crate::intern::{Ident, Interner};

/// A handle to a declaration allocated from an [`AstContext`]'s decl arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(u32);

impl DeclId {
    fn from_index(i: usize) -> Self {
        Self(u32::try_from(i).expect("decl arena overflow"))
    }
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A handle to a [`DeclContext`] allocated from an [`AstContext`]'s scope-tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclContextId(u32);

impl DeclContextId {
    fn from_index(i: usize) -> Self {
        Self(u32::try_from(i).expect("decl-context arena overflow"))
    }
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owns every AST arena for one compilation unit.
///
/// All nodes created with a given context are freed together when the context is dropped;
/// cleanup callbacks registered via [`add_cleanup`](Self::add_cleanup) run in LIFO order at that
/// point (spec §5, §8.1). Nodes (and their ids) must never be used with a different
/// `AstContext` than the one that allocated them - ids carry no context tag, so this is an
/// invariant the caller must uphold, exactly like the teacher's arena-owned AST nodes.
#[derive(Default)]
pub struct AstContext {
    pub interner: Interner,
    pub types: TypeTable,
    decls: Vec<Decl>,
    stmts: Vec<Stmt>,
    exprs: Vec<Expr>,
    decl_contexts: Vec<DeclContext>,
    cleanups: Vec<Box<dyn FnOnce()>>,
    pub entry_point: Option<DeclId>,
}

impl AstContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn intern(&mut self, text: &str) -> Ident {
        self.interner.intern(text)
    }

    pub fn alloc_decl(&mut self, decl: Decl) -> DeclId {
        self.decls.push(decl);
        DeclId::from_index(self.decls.len() - 1)
    }

    #[must_use]
    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.index()]
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        self.stmts.push(stmt);
        StmtId::from_index(self.stmts.len() - 1)
    }

    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()]
    }

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        self.exprs.push(expr);
        ExprId::from_index(self.exprs.len() - 1)
    }

    #[must_use]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    pub fn alloc_decl_context(&mut self, ctx: DeclContext) -> DeclContextId {
        self.decl_contexts.push(ctx);
        DeclContextId::from_index(self.decl_contexts.len() - 1)
    }

    #[must_use]
    pub fn decl_context(&self, id: DeclContextId) -> &DeclContext {
        &self.decl_contexts[id.index()]
    }

    pub fn decl_context_mut(&mut self, id: DeclContextId) -> &mut DeclContext {
        &mut self.decl_contexts[id.index()]
    }

    /// Registers a closure to run (in LIFO order, alongside other registered cleanups) when
    /// this context is dropped. Mirrors the teacher's `addCleanup`/arena-cleanup convention.
    pub fn add_cleanup(&mut self, f: impl FnOnce() + 'static) {
        self.cleanups.push(Box::new(f));
    }
}

impl Drop for AstContext {
    fn drop(&mut self) {
        while let Some(cleanup) = self.cleanups.pop() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::AstContext;

    #[test]
    fn cleanups_run_in_lifo_order_exactly_once() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = AstContext::new();
        for i in 0..3 {
            let order = Rc::clone(&order);
            ctx.add_cleanup(move || order.borrow_mut().push(i));
        }
        drop(ctx);
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }
}
