//! Declarations (spec §3.3).

use smallvec::SmallVec;

use super::{context::DeclContextId, expr::ExprId, stmt::StmtId, ty::{TypeExpr, TypeId}};
use crate::{builtins::BuiltinIntrinsic, intern::Ident, source::SourceRange};

#[derive(Debug, Clone)]
pub struct VarDecl {
    /// `var` => true (mutable), `let` => false.
    pub is_mutable: bool,
    pub type_expr: TypeExpr,
    pub resolved_type: Option<TypeId>,
    pub initializer: Option<ExprId>,
    pub is_global: bool,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub is_mutable: bool,
    pub type_expr: TypeExpr,
    pub resolved_type: Option<TypeId>,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub params: SmallVec<[super::context::DeclId; 4]>,
    /// `None` means the declared return type defaulted to `void`.
    pub return_type_expr: Option<TypeExpr>,
    pub resolved_return_type: Option<TypeId>,
    pub body: StmtId,
    /// The scope containing this function's parameters and body locals.
    pub scope: DeclContextId,
    pub is_entry_point: bool,
}

#[derive(Debug, Clone)]
pub struct BuiltinFuncDecl {
    pub signature: TypeId,
    pub intrinsic: BuiltinIntrinsic,
}

#[derive(Debug, Clone)]
pub struct UnitDecl {
    pub scope: DeclContextId,
}

#[derive(Debug, Clone)]
pub enum DeclKind {
    Var(VarDecl),
    Param(ParamDecl),
    Func(FuncDecl),
    BuiltinFunc(BuiltinFuncDecl),
    Unit(UnitDecl),
}

impl DeclKind {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Var(v) if v.is_global => "global variable",
            Self::Var(_) => "local variable",
            Self::Param(_) => "parameter",
            Self::Func(_) => "function",
            Self::BuiltinFunc(_) => "builtin function",
            Self::Unit(_) => "unit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub kind: DeclKind,
    pub name: Ident,
    pub range: SourceRange,
    /// Set when this decl loses an illegal-redeclaration check (spec §4.2). Illegal-redecl
    /// decls are retained in the AST but excluded from lookup.
    pub illegal_redecl: bool,
    pub parent: Option<DeclContextId>,
}

impl Decl {
    #[must_use]
    pub fn new(kind: DeclKind, name: Ident, range: SourceRange, parent: Option<DeclContextId>) -> Self {
        Self { kind, name, range, illegal_redecl: false, parent }
    }
}
