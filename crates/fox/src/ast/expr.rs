//! Expressions (spec §3.4).

use smallvec::SmallVec;

use super::{context::DeclId, ty::{TypeExpr, TypeId}};
use crate::{intern::Ident, source::SourceRange};

/// A handle to an expression allocated from an [`AstContext`](super::AstContext)'s expression arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ExprId {
    pub(super) fn from_index(i: usize) -> Self {
        Self(u32::try_from(i).expect("expression arena overflow"))
    }
    pub(super) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "**")]
    Pow,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "=")]
    Assign,
}

impl BinOp {
    /// Lowest-to-highest precedence index from spec §4.1's table (higher binds tighter).
    /// `**` and `=` are handled outside the climbing table (right-assoc, special-cased).
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 5,
            Self::And => 4,
            Self::Eq | Self::Ne => 3,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 2,
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div | Self::Mod => 0,
            Self::Pow | Self::Assign => unreachable!("handled by dedicated grammar productions"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnOp {
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "+")]
    Plus,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i64),
    DoubleLit(f64),
    CharLit(char),
    BoolLit(bool),
    StringLit(String),
    ArrayLit(SmallVec<[ExprId; 4]>),
    Binary { op: BinOp, op_range: SourceRange, lhs: ExprId, rhs: ExprId },
    Unary { op: UnOp, operand: ExprId },
    Cast { target: TypeExpr, resolved_target: Option<TypeId>, inner: ExprId },
    /// Resolved reference to a value declaration (post name-resolution).
    DeclRef(DeclId),
    /// Identifier reference before name binding; never seen past semantic analysis unless the
    /// lookup failed, in which case it is replaced with `Error`.
    UnresolvedDeclRef(Ident),
    MemberOf { base: ExprId, member: Ident, member_range: SourceRange },
    Subscript { base: ExprId, index: ExprId },
    Call { callee: ExprId, args: SmallVec<[ExprId; 4]> },
    /// A node that failed to parse or type-check past recovery; silently propagates failure.
    Error,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: SourceRange,
    /// Filled in by the semantic analyser; `None` before typing runs.
    pub ty: Option<TypeId>,
}
