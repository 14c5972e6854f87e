//! The abstract syntax tree: declarations, statements, expressions, the scope tree, and the
//! type lattice, all owned by a single [`AstContext`] per compilation unit (spec §3).

pub mod context;
pub mod decl;
pub mod decl_context;
pub mod dump;
pub mod expr;
pub mod stmt;
pub mod ty;

pub use context::{AstContext, DeclContextId, DeclId};
pub use decl::{BuiltinFuncDecl, Decl, DeclKind, FuncDecl, ParamDecl, UnitDecl, VarDecl};
pub use decl_context::{DeclContext, ScopeInfo};
pub use dump::dump_unit;
pub use expr::{BinOp, Expr, ExprId, ExprKind, UnOp};
pub use stmt::{AstNode, CompoundStmt, ConditionStmt, ReturnStmt, Stmt, StmtId, StmtKind, WhileStmt};
pub use ty::{highest_rank, is_lvalue, strip_lvalue, unify, CellId, PrimKind, TypeExpr, TypeId, TypeKind, TypeTable};
