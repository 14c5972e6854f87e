//! Statements (spec §3.4).

use smallvec::SmallVec;

use super::{context::DeclId, expr::ExprId};
use crate::source::SourceRange;

/// A handle to a statement allocated from an [`AstContext`](super::AstContext)'s statement arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

impl StmtId {
    pub(super) fn from_index(i: usize) -> Self {
        Self(u32::try_from(i).expect("statement arena overflow"))
    }
    pub(super) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One child of a [`CompoundStmt`]: a declaration, a discarded expression, or a nested
/// statement (spec §3.4).
#[derive(Debug, Clone, Copy)]
pub enum AstNode {
    Decl(DeclId),
    Expr(ExprId),
    Stmt(StmtId),
}

#[derive(Debug, Clone)]
pub struct CompoundStmt {
    pub nodes: SmallVec<[AstNode; 4]>,
    /// The source range of this compound statement, used by `DeclContext` local lookup to
    /// filter visibility (spec §3.5) and as the `MissingReturn` diagnostic's anchor (its closing
    /// brace, spec §4.2).
    pub scope_range: SourceRange,
}

#[derive(Debug, Clone)]
pub struct ConditionStmt {
    pub cond: ExprId,
    /// Always a `Compound` statement id.
    pub then_branch: StmtId,
    pub else_branch: Option<StmtId>,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub cond: ExprId,
    pub body: StmtId,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub value: Option<ExprId>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Compound(CompoundStmt),
    Condition(ConditionStmt),
    While(WhileStmt),
    Return(ReturnStmt),
    /// A stray semicolon; discarded by enclosing compounds at parse time but kept here so
    /// recovery code has somewhere to point a partial statement.
    Null,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub range: SourceRange,
}
