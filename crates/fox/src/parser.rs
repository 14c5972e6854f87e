//! Hand-written recursive-descent parser (spec §4.1).
//!
//! Every grammar production returns a [`ParseResult`]: `Found` (a node was built), `NotFound`
//! (no tokens were consumed - the caller tries the next alternative), or `Error` (the production
//! started but failed; recovery has already been attempted or is impossible, so the caller
//! propagates). This tri-state lets callers distinguish "this production is absent" from "this
//! production started but failed" without exceptions.

use smallvec::SmallVec;

use crate::{
    ast::{
        AstContext, AstNode, BinOp, CompoundStmt, ConditionStmt, Decl, DeclContext, DeclContextId, DeclId, ExprId,
        ExprKind, FuncDecl, ParamDecl, PrimKind, ReturnStmt, ScopeInfo, Stmt, StmtId, StmtKind, TypeExpr, UnOp,
        UnitDecl, VarDecl, WhileStmt,
    },
    builtins::register_builtins,
    diagnostic::{DiagId, DiagnosticEngine},
    intern::Ident,
    source::{SourceLoc, SourceRange},
    token::{Keyword, LiteralValue, Punct, Token, TokenKind},
};

/// Outcome of one grammar production (spec §4.1).
pub enum ParseResult<T> {
    Found(T),
    NotFound,
    Error,
}

use ParseResult::{Error, Found, NotFound};

/// Parses `tokens` into a unit. Returns `None` (after diagnosing
/// [`DiagId::ExpectedDeclInUnit`]) if the unit contains no declarations at all (spec §8.4
/// scenario 1: an empty source file produces no AST unit).
pub fn parse_unit(tokens: &[Token], ctx: &mut AstContext, diags: &mut DiagnosticEngine) -> Option<DeclId> {
    let unit_scope = ctx.alloc_decl_context(DeclContext::new(None, true));
    register_builtins(ctx, unit_scope);

    let mut parser = Parser { tokens, pos: 0, ctx, diags };
    let start_range = parser.current_range();
    let mut any = false;
    loop {
        if parser.at_eof() {
            break;
        }
        match parser.parse_top_level_decl(unit_scope) {
            Found(()) => any = true,
            NotFound => {
                parser.diags.report(DiagId::ExpectedDeclInUnit, parser.current_range());
                if !parser.resync_to_next_decl() {
                    break;
                }
            }
            Error => {
                if !parser.resync_to_next_decl() {
                    break;
                }
            }
        }
    }
    if !any {
        // A genuinely empty file never enters the loop body above, so diagnose here instead -
        // exactly one `ExpectedDeclInUnit`, not one per retried resync.
        if parser.diags.diagnostics().is_empty() {
            parser.diags.report(DiagId::ExpectedDeclInUnit, start_range);
        }
        return None;
    }
    let end_range = parser.previous_range();
    let name = parser.ctx.intern("<unit>");
    let unit = Decl::new(crate::ast::DeclKind::Unit(UnitDecl { scope: unit_scope }), name, start_range.join(end_range), None);
    Some(parser.ctx.alloc_decl(unit))
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    ctx: &'a mut AstContext,
    diags: &'a mut DiagnosticEngine,
}

/// A local var decl pending registration into its enclosing compound's scope: collected while
/// parsing a compound's statements, registered all at once once the compound's full range (and
/// thus its `ScopeInfo::scope_range`) is known (spec §3.5).
struct PendingLocal {
    name: Ident,
    decl: DeclId,
    /// The location from which the decl becomes visible - the end of its own declaration
    /// statement, so its own initializer cannot see it (spec §8.4 scenario 6).
    visible_from: SourceLoc,
}

impl Parser<'_> {
    // ---- token cursor -----------------------------------------------------------------------

    fn at_eof(&self) -> bool {
        matches!(self.tokens[self.pos].kind, TokenKind::Eof)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn current_range(&self) -> SourceRange {
        self.current().range
    }

    fn previous_range(&self) -> SourceRange {
        self.tokens[self.pos.saturating_sub(1)].range
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if !matches!(tok.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        tok
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.current().kind, TokenKind::Keyword(k) if k == kw)
    }

    fn check_sign(&self, p: Punct) -> bool {
        matches!(self.current().kind, TokenKind::Punct(p2) if p2 == p)
    }

    fn consume_keyword(&mut self, kw: Keyword) -> Option<SourceRange> {
        if self.check_keyword(kw) {
            Some(self.bump().range)
        } else {
            None
        }
    }

    fn consume_sign(&mut self, p: Punct) -> Option<SourceRange> {
        if self.check_sign(p) {
            Some(self.bump().range)
        } else {
            None
        }
    }

    fn consume_identifier(&mut self) -> Option<(Ident, SourceRange)> {
        if let TokenKind::Identifier(id) = self.current().kind {
            let range = self.bump().range;
            Some((id, range))
        } else {
            None
        }
    }

    /// Reports `DiagId::ExpectedToken` with `what` as `%0` at the current location.
    fn expect_token_diag(&mut self, what: &str) {
        self.diags.report(DiagId::ExpectedToken, self.current_range()).add_arg(what);
    }

    fn require_sign(&mut self, p: Punct, what: &str) -> Option<SourceRange> {
        match self.consume_sign(p) {
            Some(r) => Some(r),
            None => {
                self.expect_token_diag(what);
                None
            }
        }
    }

    // ---- error recovery (spec §4.1) ----------------------------------------------------------

    /// Advances until `target` is found (at bracket depth 0) or, if `stop_at_semi`, a `;` is
    /// found at depth 0; tracks bracket nesting so a mismatched close doesn't let recovery
    /// "escape" outward until balanced. Returns whether a stopping point was found (vs. hitting
    /// EOF or an unresolvable bracket imbalance).
    fn resync_to(&mut self, target: Punct, stop_at_semi: bool, consume: bool) -> bool {
        let mut depth: i32 = 0;
        loop {
            if self.at_eof() {
                return false;
            }
            let TokenKind::Punct(p) = self.current().kind else {
                self.bump();
                continue;
            };
            if depth == 0 && p == target {
                if consume {
                    self.bump();
                }
                return true;
            }
            match p {
                Punct::LParen | Punct::LBracket | Punct::LBrace => {
                    depth += 1;
                    self.bump();
                }
                Punct::RParen | Punct::RBracket | Punct::RBrace => {
                    if depth > 0 {
                        depth -= 1;
                        self.bump();
                    } else {
                        return false;
                    }
                }
                Punct::Semi if depth == 0 && stop_at_semi => {
                    self.bump();
                    return true;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Seeks the next `let`/`var`/`func` keyword at unit scope, for recovery between top-level
    /// declarations. Returns `false` if EOF was reached without finding one.
    fn resync_to_next_decl(&mut self) -> bool {
        loop {
            if self.at_eof() {
                return false;
            }
            if matches!(self.current().kind, TokenKind::Keyword(Keyword::Let | Keyword::Var | Keyword::Func)) {
                return true;
            }
            self.bump();
        }
    }

    // ---- top-level declarations ---------------------------------------------------------------

    fn parse_top_level_decl(&mut self, unit_scope: DeclContextId) -> ParseResult<()> {
        match self.parse_var_decl(true, unit_scope) {
            Found(id) => {
                self.register_unit_decl(unit_scope, id);
                return Found(());
            }
            Error => return Error,
            NotFound => {}
        }
        match self.parse_func_decl(unit_scope) {
            Found(id) => {
                self.register_unit_decl(unit_scope, id);
                Found(())
            }
            Error => Error,
            NotFound => NotFound,
        }
    }

    fn register_unit_decl(&mut self, unit_scope: DeclContextId, id: DeclId) {
        let name = self.ctx.decl(id).name;
        self.ctx.decl_context_mut(unit_scope).add_decl(
            name,
            id,
            ScopeInfo { scope_range: SourceRange::dummy(), visible_from: SourceRange::dummy().begin() },
        );
    }

    /// `var_decl = ("let" | "var") id ":" type [ "=" expr ] ";"`
    fn parse_var_decl(&mut self, is_global: bool, scope: DeclContextId) -> ParseResult<DeclId> {
        let start = if let Some(r) = self.consume_keyword(Keyword::Let) {
            (false, r)
        } else if let Some(r) = self.consume_keyword(Keyword::Var) {
            (true, r)
        } else {
            return NotFound;
        };
        let (is_mutable, kw_range) = start;

        let Some((name, _)) = self.consume_identifier() else {
            self.diags.report(DiagId::ExpectedIdentifier, self.current_range());
            self.resync_to(Punct::Semi, true, true);
            return Error;
        };

        if self.require_sign(Punct::Colon, ":").is_none() {
            self.resync_to(Punct::Semi, true, true);
            return Error;
        }

        let type_expr = match self.parse_type() {
            Found(t) => t,
            NotFound => {
                self.diags.report(DiagId::ExpectedType, self.current_range());
                self.resync_to(Punct::Semi, true, true);
                return Error;
            }
            Error => return Error,
        };

        let initializer = if self.consume_sign(Punct::Equal).is_some() {
            match self.parse_expr() {
                Found(e) => Some(e),
                NotFound => {
                    self.diags.report(DiagId::ExpectedExpr, self.current_range());
                    self.resync_to(Punct::Semi, true, true);
                    return Error;
                }
                Error => return Error,
            }
        } else {
            None
        };

        let semi_range = match self.require_sign(Punct::Semi, ";") {
            Some(r) => r,
            None => {
                self.resync_to(Punct::Semi, true, true);
                self.previous_range()
            }
        };

        let range = kw_range.join(semi_range);
        let decl = Decl::new(
            crate::ast::DeclKind::Var(VarDecl { is_mutable, type_expr, resolved_type: None, initializer, is_global }),
            name,
            range,
            Some(scope),
        );
        Found(self.ctx.alloc_decl(decl))
    }

    /// `func_decl = "func" id "(" [ param_decl { "," param_decl } ] ")" [ ":" type ] compound`
    fn parse_func_decl(&mut self, unit_scope: DeclContextId) -> ParseResult<DeclId> {
        let Some(kw_range) = self.consume_keyword(Keyword::Func) else {
            return NotFound;
        };

        let name = match self.consume_identifier() {
            Some((name, _)) => name,
            None => {
                self.diags.report(DiagId::ExpectedIdentifier, self.current_range());
                // Synthesize a placeholder identifier so the caller can still attempt to parse
                // the rest of the signature and body (spec §4.1's partial-node recovery).
                self.ctx.intern("<error>")
            }
        };

        let func_scope = self.ctx.alloc_decl_context(DeclContext::new(Some(unit_scope), false));

        if self.require_sign(Punct::LParen, "(").is_none() {
            self.resync_to(Punct::RParen, false, true);
        }

        let mut params: SmallVec<[DeclId; 4]> = SmallVec::new();
        let mut pending_params: Vec<PendingLocal> = Vec::new();
        if !self.check_sign(Punct::RParen) {
            loop {
                match self.parse_param_decl(func_scope) {
                    Found((pname, pid)) => {
                        params.push(pid);
                        pending_params.push(PendingLocal { name: pname, decl: pid, visible_from: SourceLoc::dummy() });
                    }
                    NotFound | Error => {
                        self.resync_to(Punct::RParen, false, false);
                        break;
                    }
                }
                if self.consume_sign(Punct::Comma).is_some() {
                    continue;
                }
                break;
            }
        }
        if self.require_sign(Punct::RParen, ")").is_none() {
            self.resync_to(Punct::RParen, false, true);
        }

        let return_type_expr = if self.consume_sign(Punct::Colon).is_some() {
            match self.parse_type() {
                Found(t) => Some(t),
                NotFound => {
                    self.diags.report(DiagId::ExpectedType, self.current_range());
                    None
                }
                Error => return Error,
            }
        } else {
            None
        };

        let body = match self.parse_compound(func_scope) {
            Found(id) => id,
            NotFound => {
                self.expect_token_diag("{");
                return Error;
            }
            Error => return Error,
        };

        let body_range = self.ctx.stmt(body).range;
        for p in pending_params {
            self.ctx.decl_context_mut(func_scope).add_decl(
                p.name,
                p.decl,
                ScopeInfo { scope_range: body_range, visible_from: body_range.begin() },
            );
        }

        let range = kw_range.join(body_range);
        let decl = Decl::new(
            crate::ast::DeclKind::Func(FuncDecl {
                params,
                return_type_expr,
                resolved_return_type: None,
                body,
                scope: func_scope,
                is_entry_point: false,
            }),
            name,
            range,
            Some(unit_scope),
        );
        Found(self.ctx.alloc_decl(decl))
    }

    /// `param_decl = id ":" [ "mut" ] type`
    fn parse_param_decl(&mut self, scope: DeclContextId) -> ParseResult<(Ident, DeclId)> {
        let Some((name, name_range)) = self.consume_identifier() else {
            return NotFound;
        };
        if self.require_sign(Punct::Colon, ":").is_none() {
            return Error;
        }
        let is_mutable = self.consume_keyword(Keyword::Mut).is_some();
        let type_expr = match self.parse_type() {
            Found(t) => t,
            NotFound => {
                self.diags.report(DiagId::ExpectedType, self.current_range());
                return Error;
            }
            Error => return Error,
        };
        let range = name_range.join(self.previous_range());
        let decl = Decl::new(
            crate::ast::DeclKind::Param(ParamDecl { is_mutable, type_expr, resolved_type: None }),
            name,
            range,
            Some(scope),
        );
        Found((name, self.ctx.alloc_decl(decl)))
    }

    /// `type = primitive_type | "[" type "]"`
    fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        let prim = match self.current().kind {
            TokenKind::Keyword(Keyword::Int) => Some(PrimKind::Int),
            TokenKind::Keyword(Keyword::Double) => Some(PrimKind::Double),
            TokenKind::Keyword(Keyword::Bool) => Some(PrimKind::Bool),
            TokenKind::Keyword(Keyword::Char) => Some(PrimKind::Char),
            TokenKind::Keyword(Keyword::String) => Some(PrimKind::String),
            TokenKind::Keyword(Keyword::Void) => Some(PrimKind::Void),
            _ => None,
        };
        if let Some(p) = prim {
            self.bump();
            return Found(TypeExpr::Primitive(p));
        }
        if self.consume_sign(Punct::LBracket).is_some() {
            let inner = match self.parse_type() {
                Found(t) => t,
                NotFound => {
                    self.diags.report(DiagId::ExpectedType, self.current_range());
                    return Error;
                }
                Error => return Error,
            };
            if self.require_sign(Punct::RBracket, "]").is_none() {
                return Error;
            }
            return Found(TypeExpr::Array(Box::new(inner)));
        }
        NotFound
    }

    // ---- statements -------------------------------------------------------------------------

    /// `compound = "{" { stmt } "}"`
    fn parse_compound(&mut self, scope: DeclContextId) -> ParseResult<StmtId> {
        let Some(lbrace) = self.consume_sign(Punct::LBrace) else {
            return NotFound;
        };
        let mut nodes: SmallVec<[AstNode; 4]> = SmallVec::new();
        let mut pending_locals: Vec<PendingLocal> = Vec::new();
        loop {
            if self.check_sign(Punct::RBrace) || self.at_eof() {
                break;
            }
            match self.parse_stmt(scope, &mut pending_locals) {
                Found(Some(node)) => nodes.push(node),
                Found(None) => {}
                NotFound => {
                    self.diags.report(DiagId::ExpectedExpr, self.current_range());
                    self.resync_to(Punct::Semi, true, true);
                }
                Error => {
                    self.resync_to(Punct::Semi, true, true);
                }
            }
        }
        let rbrace = match self.require_sign(Punct::RBrace, "}") {
            Some(r) => r,
            None => self.previous_range(),
        };
        let scope_range = lbrace.join(rbrace);
        for local in pending_locals {
            self.ctx.decl_context_mut(scope).add_decl(
                local.name,
                local.decl,
                ScopeInfo { scope_range, visible_from: local.visible_from },
            );
        }
        let compound = CompoundStmt { nodes, scope_range };
        Found(self.ctx.alloc_stmt(Stmt { kind: StmtKind::Compound(compound), range: scope_range }))
    }

    /// `stmt = var_decl | expr_stmt | condition | while_loop | return_stmt`. Returns `Found(None)`
    /// for a stray `;` (spec's `NullStmt`, discarded by the enclosing compound).
    fn parse_stmt(&mut self, scope: DeclContextId, pending: &mut Vec<PendingLocal>) -> ParseResult<Option<AstNode>> {
        if self.consume_sign(Punct::Semi).is_some() {
            return Found(None);
        }

        match self.parse_var_decl(false, scope) {
            Found(id) => {
                let name = self.ctx.decl(id).name;
                let visible_from = self.ctx.decl(id).range.end();
                pending.push(PendingLocal { name, decl: id, visible_from });
                return Found(Some(AstNode::Decl(id)));
            }
            Error => return Error,
            NotFound => {}
        }

        match self.parse_condition(scope) {
            Found(id) => return Found(Some(AstNode::Stmt(id))),
            Error => return Error,
            NotFound => {}
        }

        match self.parse_while(scope) {
            Found(id) => return Found(Some(AstNode::Stmt(id))),
            Error => return Error,
            NotFound => {}
        }

        match self.parse_return(scope) {
            Found(id) => return Found(Some(AstNode::Stmt(id))),
            Error => return Error,
            NotFound => {}
        }

        match self.parse_expr() {
            Found(e) => {
                self.require_sign(Punct::Semi, ";");
                Found(Some(AstNode::Expr(e)))
            }
            NotFound => NotFound,
            Error => Error,
        }
    }

    /// `condition = "if" expr compound [ "else" compound ]`
    fn parse_condition(&mut self, scope: DeclContextId) -> ParseResult<StmtId> {
        let Some(kw_range) = self.consume_keyword(Keyword::If) else {
            return NotFound;
        };
        let cond = match self.parse_expr() {
            Found(e) => e,
            NotFound => {
                self.diags.report(DiagId::ExpectedExpr, self.current_range());
                return Error;
            }
            Error => return Error,
        };
        let then_branch = match self.parse_compound(scope) {
            Found(id) => id,
            NotFound => {
                self.expect_token_diag("{");
                return Error;
            }
            Error => return Error,
        };
        let mut end_range = self.ctx.stmt(then_branch).range;
        let else_branch = if self.consume_keyword(Keyword::Else).is_some() {
            match self.parse_compound(scope) {
                Found(id) => {
                    end_range = self.ctx.stmt(id).range;
                    Some(id)
                }
                NotFound => {
                    self.expect_token_diag("{");
                    return Error;
                }
                Error => return Error,
            }
        } else {
            None
        };
        let range = kw_range.join(end_range);
        let stmt = Stmt { kind: StmtKind::Condition(ConditionStmt { cond, then_branch, else_branch }), range };
        Found(self.ctx.alloc_stmt(stmt))
    }

    /// `while_loop = "while" expr compound`
    fn parse_while(&mut self, scope: DeclContextId) -> ParseResult<StmtId> {
        let Some(kw_range) = self.consume_keyword(Keyword::While) else {
            return NotFound;
        };
        let cond = match self.parse_expr() {
            Found(e) => e,
            NotFound => {
                self.diags.report(DiagId::ExpectedExpr, self.current_range());
                return Error;
            }
            Error => return Error,
        };
        let body = match self.parse_compound(scope) {
            Found(id) => id,
            NotFound => {
                self.expect_token_diag("{");
                return Error;
            }
            Error => return Error,
        };
        let range = kw_range.join(self.ctx.stmt(body).range);
        Found(self.ctx.alloc_stmt(Stmt { kind: StmtKind::While(WhileStmt { cond, body }), range }))
    }

    /// `return_stmt = "return" [ expr ] ";"`
    fn parse_return(&mut self, _scope: DeclContextId) -> ParseResult<StmtId> {
        let Some(kw_range) = self.consume_keyword(Keyword::Return) else {
            return NotFound;
        };
        let value = if self.check_sign(Punct::Semi) {
            None
        } else {
            match self.parse_expr() {
                Found(e) => Some(e),
                NotFound => {
                    self.diags.report(DiagId::ExpectedExpr, self.current_range());
                    self.resync_to(Punct::Semi, true, true);
                    return Error;
                }
                Error => return Error,
            }
        };
        let semi_range = match self.require_sign(Punct::Semi, ";") {
            Some(r) => r,
            None => self.previous_range(),
        };
        let range = kw_range.join(semi_range);
        Found(self.ctx.alloc_stmt(Stmt { kind: StmtKind::Return(ReturnStmt { value }), range }))
    }

    // ---- expressions ------------------------------------------------------------------------

    /// `expr = binary_expr [ "=" expr ]` (right-assoc)
    fn parse_expr(&mut self) -> ParseResult<ExprId> {
        let lhs = match self.parse_binary_expr(0) {
            Found(e) => e,
            other => return other,
        };
        if let Some(op_range) = self.consume_sign(Punct::Equal) {
            let rhs = match self.parse_expr() {
                Found(e) => e,
                NotFound => {
                    self.diags.report(DiagId::ExpectedExpr, self.current_range());
                    return Error;
                }
                Error => return Error,
            };
            return Found(self.alloc_binary(BinOp::Assign, op_range, lhs, rhs));
        }
        Found(lhs)
    }

    /// `binary_expr = cast_expr { binop cast_expr }` via precedence climbing. `min_bp` is the
    /// minimum binding power (inverse of spec §4.1's precedence *index*, where index 0 - `* / %`
    /// - binds tightest) required to continue consuming operators at this recursion level.
    fn parse_binary_expr(&mut self, min_bp: u8) -> ParseResult<ExprId> {
        let mut lhs = match self.parse_cast_expr() {
            Found(e) => e,
            other => return other,
        };
        loop {
            let Some(op) = self.peek_binop() else { break };
            let bp = binding_power(op);
            if bp < min_bp {
                break;
            }
            let op_range = self.bump().range;
            let rhs = match self.parse_binary_expr(bp + 1) {
                Found(e) => e,
                NotFound => {
                    self.diags.report(DiagId::ExpectedExpr, self.current_range());
                    return Error;
                }
                Error => return Error,
            };
            lhs = self.alloc_binary(op, op_range, lhs, rhs);
        }
        Found(lhs)
    }

    fn peek_binop(&self) -> Option<BinOp> {
        let TokenKind::Punct(p) = self.current().kind else { return None };
        Some(match p {
            Punct::Plus => BinOp::Add,
            Punct::Minus => BinOp::Sub,
            Punct::Star => BinOp::Mul,
            Punct::Slash => BinOp::Div,
            Punct::Percent => BinOp::Mod,
            Punct::Less => BinOp::Lt,
            Punct::LessEqual => BinOp::Le,
            Punct::Greater => BinOp::Gt,
            Punct::GreaterEqual => BinOp::Ge,
            Punct::EqualEqual => BinOp::Eq,
            Punct::BangEqual => BinOp::Ne,
            Punct::AmpAmp => BinOp::And,
            Punct::PipePipe => BinOp::Or,
            _ => return None,
        })
    }

    /// `cast_expr = prefix_expr [ "as" type ]`
    fn parse_cast_expr(&mut self) -> ParseResult<ExprId> {
        let inner = match self.parse_prefix_expr() {
            Found(e) => e,
            other => return other,
        };
        if self.consume_keyword(Keyword::As).is_some() {
            let target = match self.parse_type() {
                Found(t) => t,
                NotFound => {
                    self.diags.report(DiagId::ExpectedType, self.current_range());
                    return Error;
                }
                Error => return Error,
            };
            let range = self.ctx.expr(inner).range.join(self.previous_range());
            let kind = ExprKind::Cast { target, resolved_target: None, inner };
            return Found(self.ctx.alloc_expr(crate::ast::Expr { kind, range, ty: None }));
        }
        Found(inner)
    }

    /// `prefix_expr = unary_op prefix_expr | exp_expr`
    fn parse_prefix_expr(&mut self) -> ParseResult<ExprId> {
        let op = match self.current().kind {
            TokenKind::Punct(Punct::Bang) => Some(UnOp::Not),
            TokenKind::Punct(Punct::Minus) => Some(UnOp::Neg),
            TokenKind::Punct(Punct::Plus) => Some(UnOp::Plus),
            _ => None,
        };
        if let Some(op) = op {
            let op_range = self.bump().range;
            let operand = match self.parse_prefix_expr() {
                Found(e) => e,
                NotFound => {
                    self.diags.report(DiagId::ExpectedExpr, self.current_range());
                    return Error;
                }
                Error => return Error,
            };
            let range = op_range.join(self.ctx.expr(operand).range);
            let kind = ExprKind::Unary { op, operand };
            return Found(self.ctx.alloc_expr(crate::ast::Expr { kind, range, ty: None }));
        }
        self.parse_exp_expr()
    }

    /// `exp_expr = suffix_expr [ "**" prefix_expr ]` (right-assoc)
    fn parse_exp_expr(&mut self) -> ParseResult<ExprId> {
        let base = match self.parse_suffix_expr() {
            Found(e) => e,
            other => return other,
        };
        if let Some(op_range) = self.consume_sign(Punct::StarStar) {
            let rhs = match self.parse_prefix_expr() {
                Found(e) => e,
                NotFound => {
                    self.diags.report(DiagId::ExpectedExpr, self.current_range());
                    return Error;
                }
                Error => return Error,
            };
            return Found(self.alloc_binary(BinOp::Pow, op_range, base, rhs));
        }
        Found(base)
    }

    /// `suffix_expr = primary { suffix }`, `suffix = "." id | "[" expr "]" | paren_expr_list`
    fn parse_suffix_expr(&mut self) -> ParseResult<ExprId> {
        let mut base = match self.parse_primary() {
            Found(e) => e,
            other => return other,
        };
        loop {
            if self.consume_sign(Punct::Dot).is_some() {
                let Some((member, member_range)) = self.consume_identifier() else {
                    self.diags.report(DiagId::ExpectedIdentifier, self.current_range());
                    return Error;
                };
                let range = self.ctx.expr(base).range.join(member_range);
                let kind = ExprKind::MemberOf { base, member, member_range };
                base = self.ctx.alloc_expr(crate::ast::Expr { kind, range, ty: None });
            } else if self.consume_sign(Punct::LBracket).is_some() {
                let index = match self.parse_expr() {
                    Found(e) => e,
                    NotFound => {
                        self.diags.report(DiagId::ExpectedExpr, self.current_range());
                        return Error;
                    }
                    Error => return Error,
                };
                if self.require_sign(Punct::RBracket, "]").is_none() {
                    return Error;
                }
                let range = self.ctx.expr(base).range.join(self.previous_range());
                base = self.ctx.alloc_expr(crate::ast::Expr { kind: ExprKind::Subscript { base, index }, range, ty: None });
            } else if self.check_sign(Punct::LParen) {
                self.bump();
                let mut args: SmallVec<[ExprId; 4]> = SmallVec::new();
                if !self.check_sign(Punct::RParen) {
                    loop {
                        match self.parse_expr() {
                            Found(e) => args.push(e),
                            NotFound => {
                                self.diags.report(DiagId::ExpectedExpr, self.current_range());
                                return Error;
                            }
                            Error => return Error,
                        }
                        if self.consume_sign(Punct::Comma).is_some() {
                            continue;
                        }
                        break;
                    }
                }
                if self.require_sign(Punct::RParen, ")").is_none() {
                    return Error;
                }
                let range = self.ctx.expr(base).range.join(self.previous_range());
                base = self.ctx.alloc_expr(crate::ast::Expr { kind: ExprKind::Call { callee: base, args }, range, ty: None });
            } else {
                break;
            }
        }
        Found(base)
    }

    /// `primary = literal | id | "(" expr ")" | array_literal`
    fn parse_primary(&mut self) -> ParseResult<ExprId> {
        let range = self.current_range();
        match self.current().kind.clone() {
            TokenKind::Literal(LiteralValue::Int(v)) => {
                self.bump();
                Found(self.alloc_leaf(ExprKind::IntLit(v), range))
            }
            TokenKind::Literal(LiteralValue::Double(v)) => {
                self.bump();
                Found(self.alloc_leaf(ExprKind::DoubleLit(v), range))
            }
            TokenKind::Literal(LiteralValue::Bool(v)) => {
                self.bump();
                Found(self.alloc_leaf(ExprKind::BoolLit(v), range))
            }
            TokenKind::Literal(LiteralValue::Str(text)) => {
                self.bump();
                let stripped = strip_delims(&text);
                let normalized = normalize_escapes(stripped, self.diags, range);
                Found(self.alloc_leaf(ExprKind::StringLit(normalized), range))
            }
            TokenKind::Literal(LiteralValue::Char(text)) => {
                self.bump();
                let stripped = strip_delims(&text);
                let normalized = normalize_escapes(stripped, self.diags, range);
                let mut chars = normalized.chars();
                let first = chars.next();
                match (first, chars.next()) {
                    (Some(c), None) => Found(self.alloc_leaf(ExprKind::CharLit(c), range)),
                    _ => {
                        self.diags.report(DiagId::InvalidCharLiteral, range);
                        Found(self.alloc_leaf(ExprKind::Error, range))
                    }
                }
            }
            TokenKind::Identifier(id) => {
                self.bump();
                Found(self.alloc_leaf(ExprKind::UnresolvedDeclRef(id), range))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.bump();
                let inner = match self.parse_expr() {
                    Found(e) => e,
                    NotFound => {
                        self.diags.report(DiagId::ExpectedExpr, self.current_range());
                        return Error;
                    }
                    Error => return Error,
                };
                if self.require_sign(Punct::RParen, ")").is_none() {
                    return Error;
                }
                Found(inner)
            }
            TokenKind::Punct(Punct::LBracket) => self.parse_array_literal(),
            _ => NotFound,
        }
    }

    /// `array_literal = "[" [ expr { "," expr } ] "]"`
    fn parse_array_literal(&mut self) -> ParseResult<ExprId> {
        let lbracket = self.consume_sign(Punct::LBracket).expect("caller checked LBracket");
        let mut elems: SmallVec<[ExprId; 4]> = SmallVec::new();
        if !self.check_sign(Punct::RBracket) {
            loop {
                match self.parse_expr() {
                    Found(e) => elems.push(e),
                    NotFound => {
                        self.diags.report(DiagId::ExpectedExpr, self.current_range());
                        return Error;
                    }
                    Error => return Error,
                }
                if self.consume_sign(Punct::Comma).is_some() {
                    continue;
                }
                break;
            }
        }
        let rbracket = match self.require_sign(Punct::RBracket, "]") {
            Some(r) => r,
            None => return Error,
        };
        let range = lbracket.join(rbracket);
        Found(self.alloc_leaf(ExprKind::ArrayLit(elems), range))
    }

    fn alloc_leaf(&mut self, kind: ExprKind, range: SourceRange) -> ExprId {
        self.ctx.alloc_expr(crate::ast::Expr { kind, range, ty: None })
    }

    fn alloc_binary(&mut self, op: BinOp, op_range: SourceRange, lhs: ExprId, rhs: ExprId) -> ExprId {
        let range = self.ctx.expr(lhs).range.join(self.ctx.expr(rhs).range);
        let kind = ExprKind::Binary { op, op_range, lhs, rhs };
        self.ctx.alloc_expr(crate::ast::Expr { kind, range, ty: None })
    }
}

fn binding_power(op: BinOp) -> u8 {
    5 - op.precedence()
}

/// Strips the leading/trailing quote byte from a literal's verbatim (quotes-included) text.
fn strip_delims(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 { &text[1..text.len() - 1] } else { "" }
}

/// Processes the recognized escape sequences (spec §4.1): `\0 \n \r \t \\ \' \"`. Unknown
/// escapes are diagnosed and elided.
fn normalize_escapes(inner: &str, diags: &mut DiagnosticEngine, range: SourceRange) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('\0'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                diags.report(DiagId::UnknownEscapeSequence, range).add_arg(other);
            }
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::parse_unit;
    use crate::{ast::AstContext, diagnostic::DiagnosticEngine, lexer::lex, source::SourceManager};

    fn parse(src: &str) -> (AstContext, DiagnosticEngine, Option<crate::ast::DeclId>) {
        let mut files = SourceManager::new();
        let file = files.add_buffer("t.fox", src);
        let mut ctx = AstContext::new();
        let mut diags = DiagnosticEngine::default();
        let tokens = lex(&files, file, &mut ctx.interner, &mut diags);
        let unit = parse_unit(&tokens, &mut ctx, &mut diags);
        (ctx, diags, unit)
    }

    #[test]
    fn empty_unit_has_no_ast_and_one_diagnostic() {
        let (_, diags, unit) = parse("");
        assert!(unit.is_none());
        assert_eq!(diags.diagnostics().len(), 1);
    }

    #[test]
    fn minimal_main_parses_one_func_decl() {
        let (ctx, diags, unit) = parse("func main() { return; }");
        assert!(diags.diagnostics().is_empty());
        let unit = unit.expect("unit should parse");
        let crate::ast::DeclKind::Unit(u) = &ctx.decl(unit).kind else { panic!() };
        let decls = &ctx.decl_context(u.scope).decls;
        // builtins + main
        let main_id = *decls.last().unwrap();
        let crate::ast::DeclKind::Func(f) = &ctx.decl(main_id).kind else { panic!("expected func decl") };
        assert!(f.params.is_empty());
    }

    #[test]
    fn string_and_char_escapes_normalize() {
        let (ctx, diags, unit) = parse(r#"func main() { let s : string = "a\nb"; let c : char = '\t'; return; }"#);
        assert!(diags.diagnostics().is_empty());
        let _ = (ctx, unit);
    }

    #[test]
    fn invalid_char_literal_diagnoses() {
        let (_, diags, _) = parse("func main() { let c : char = 'ab'; return; }");
        assert_eq!(diags.diagnostics().len(), 1);
        assert_eq!(diags.diagnostics()[0].id, crate::diagnostic::DiagId::InvalidCharLiteral);
    }
}
