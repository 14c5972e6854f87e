//! Lowers a checked AST into a [`BCModule`] (spec §4.3/§4.4).
//!
//! Precondition: callers only run this once `sema::analyze` leaves the diagnostic engine free
//! of errors. Codegen trusts every type annotation the semantic analyser wrote back onto the
//! AST and does not re-validate anything it already checked.
//!
//! Registers are allocated by a simple bump allocator (`RegisterAllocator`) with strict
//! last-in-first-out freeing, mirroring how expression evaluation naturally nests. A local
//! variable's register is never freed (`RAIIRegister::leak`): spec §3.5's scope model is flat
//! per function, so a local lives in its register for the rest of the function's call, exactly
//! like the source-level `DeclContext` it was declared in.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    ast::{
        strip_lvalue, AstContext, BinOp, DeclId, DeclKind, ExprId, ExprKind, PrimKind, StmtId, StmtKind, TypeId,
        TypeKind, UnOp,
    },
    diagnostic::DiagnosticEngine,
    source::SourceRange,
};

use super::{
    builder::{BCBuilder, InstrId},
    code::{BCFunction, BCModule, BuiltinCallSpec, ConstPools, OrderedDouble},
    op::Opcode,
};

/// Lowers every declaration in `unit`'s scope into a [`BCModule`].
#[must_use]
pub fn compile_unit(ctx: &AstContext, unit: DeclId, diags: &mut DiagnosticEngine) -> BCModule {
    let DeclKind::Unit(u) = ctx.decl(unit).kind.clone() else {
        unreachable!("compile_unit must be called with a Unit decl");
    };
    let top: Vec<DeclId> = ctx.decl_context(u.scope).decls.clone();

    let mut module = BCModule::new();
    let mut func_indices: AHashMap<DeclId, u32> = AHashMap::default();
    let mut global_indices: AHashMap<DeclId, u32> = AHashMap::default();
    let mut builtin_indices: AHashMap<DeclId, u16> = AHashMap::default();

    // Every function and global gets a stable slot up front, in declaration order, before any
    // body is compiled - this is what lets one function call another declared later in the unit
    // (and what lets mutually recursive functions call each other at all).
    for &d in &top {
        if matches!(ctx.decl(d).kind, DeclKind::Func(_)) {
            func_indices.insert(d, u32::try_from(module.functions.len()).unwrap());
            module.functions.push(BCFunction::new(ctx.interner.resolve(ctx.decl(d).name).to_owned()));
        }
    }
    for &d in &top {
        if matches!(ctx.decl(d).kind, DeclKind::Var(_)) {
            global_indices.insert(d, u32::try_from(module.globals.len()).unwrap());
            module.globals.push(BCFunction::new(format!("<init {}>", ctx.interner.resolve(ctx.decl(d).name))));
        }
    }

    for &d in &top {
        let DeclKind::Var(v) = ctx.decl(d).kind.clone() else { continue };
        let idx = global_indices[&d] as usize;
        let placeholder = std::mem::replace(&mut module.globals[idx], BCFunction::new(String::new()));
        let mut gen = FuncCodeGen::new(
            ctx,
            diags,
            &func_indices,
            &global_indices,
            &mut builtin_indices,
            &mut module.builtins,
            &mut module.consts,
            placeholder,
        );
        let result = match v.initializer {
            Some(init) => gen.lower_expr(init),
            None => gen.lower_default_value(v.resolved_type.expect("sema resolves every var's type")),
        };
        gen.builder().create_small_binary(Opcode::Ret, 0, result.get());
        drop(result);
        module.globals[idx] = gen.finish();
    }

    for &d in &top {
        let DeclKind::Func(f) = ctx.decl(d).kind.clone() else { continue };
        let idx = func_indices[&d] as usize;
        let placeholder = std::mem::replace(&mut module.functions[idx], BCFunction::new(String::new()));
        let mut gen = FuncCodeGen::new(
            ctx,
            diags,
            &func_indices,
            &global_indices,
            &mut builtin_indices,
            &mut module.builtins,
            &mut module.consts,
            placeholder,
        );
        let params: Vec<DeclId> = ctx
            .decl_context(f.scope)
            .decls
            .iter()
            .copied()
            .filter(|&pd| matches!(ctx.decl(pd).kind, DeclKind::Param(_)))
            .collect();
        gen.bind_params(&params);
        gen.lower_stmt(f.body);
        let is_void = match f.resolved_return_type {
            Some(t) => matches!(ctx.types.kind(t), TypeKind::Primitive(PrimKind::Void)),
            None => true,
        };
        if is_void {
            gen.builder().create_nullary(Opcode::RetVoid);
        }
        module.functions[idx] = gen.finish();
    }

    if let Some(entry) = ctx.entry_point {
        module.entry_point = func_indices.get(&entry).copied();
    }

    module
}

struct RegisterAllocatorInner {
    next: u8,
    max: u8,
}

/// A bump register allocator shared (via `Rc<RefCell<_>>`) between every live [`RAIIRegister`]
/// handed out for one function body.
#[derive(Clone)]
struct RegisterAllocator(Rc<RefCell<RegisterAllocatorInner>>);

impl RegisterAllocator {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(RegisterAllocatorInner { next: 0, max: 0 })))
    }

    fn alloc(&self) -> RAIIRegister {
        let mut inner = self.0.borrow_mut();
        assert!(inner.next < u8::MAX, "register window exhausted (function needs more than 255 live registers)");
        let reg = inner.next;
        inner.next += 1;
        inner.max = inner.max.max(inner.next);
        drop(inner);
        RAIIRegister { reg, alloc: self.clone(), owned: true }
    }

    /// Wraps an already-allocated register (a parameter or local) without taking ownership of
    /// it: dropping the returned handle does not free the register.
    fn borrow(&self, reg: u8) -> RAIIRegister {
        RAIIRegister { reg, alloc: self.clone(), owned: false }
    }

    fn free(&self, reg: u8) {
        let mut inner = self.0.borrow_mut();
        assert_eq!(reg + 1, inner.next, "registers must be freed in the reverse order they were allocated");
        inner.next = reg;
    }

    fn max_registers(&self) -> u8 {
        self.0.borrow().max
    }
}

/// An allocated register, freed when dropped unless it was leaked (for a persistent local) or
/// merely borrowed (for reading a persistent local/parameter).
struct RAIIRegister {
    reg: u8,
    alloc: RegisterAllocator,
    owned: bool,
}

impl RAIIRegister {
    fn get(&self) -> u8 {
        self.reg
    }

    /// Promotes this register to a permanent slot that outlives this handle: used for a local
    /// variable's register, which lives for the rest of the function's call.
    fn leak(mut self) -> u8 {
        self.owned = false;
        self.reg
    }
}

impl Drop for RAIIRegister {
    fn drop(&mut self) {
        if self.owned {
            self.alloc.free(self.reg);
        }
    }
}

/// Lowers one function body or global initializer into a [`BCFunction`].
struct FuncCodeGen<'a> {
    ctx: &'a AstContext,
    diags: &'a mut DiagnosticEngine,
    func_indices: &'a AHashMap<DeclId, u32>,
    global_indices: &'a AHashMap<DeclId, u32>,
    builtin_indices: &'a mut AHashMap<DeclId, u16>,
    builtins: &'a mut Vec<BuiltinCallSpec>,
    consts: &'a mut ConstPools,
    locals: AHashMap<DeclId, u8>,
    alloc: RegisterAllocator,
    func: BCFunction,
}

impl<'a> FuncCodeGen<'a> {
    fn new(
        ctx: &'a AstContext,
        diags: &'a mut DiagnosticEngine,
        func_indices: &'a AHashMap<DeclId, u32>,
        global_indices: &'a AHashMap<DeclId, u32>,
        builtin_indices: &'a mut AHashMap<DeclId, u16>,
        builtins: &'a mut Vec<BuiltinCallSpec>,
        consts: &'a mut ConstPools,
        func: BCFunction,
    ) -> Self {
        Self {
            ctx,
            diags,
            func_indices,
            global_indices,
            builtin_indices,
            builtins,
            consts,
            locals: AHashMap::default(),
            alloc: RegisterAllocator::new(),
            func,
        }
    }

    fn bind_params(&mut self, params: &[DeclId]) {
        for &p in params {
            let reg = self.alloc.alloc().leak();
            self.locals.insert(p, reg);
        }
        self.func.num_params = u8::try_from(params.len()).expect("a function cannot declare more than 255 parameters");
    }

    fn finish(self) -> BCFunction {
        let num_registers = self.alloc.max_registers();
        let mut func = self.func;
        func.num_registers = num_registers;
        func
    }

    fn builder(&mut self) -> BCBuilder<'_> {
        BCBuilder::new(&mut self.func)
    }

    // -- statements ----------------------------------------------------------------------

    fn lower_stmt(&mut self, id: StmtId) {
        match self.ctx.stmt(id).kind.clone() {
            StmtKind::Compound(c) => {
                for node in c.nodes {
                    match node {
                        crate::ast::AstNode::Decl(d) => self.lower_local_decl(d),
                        crate::ast::AstNode::Expr(e) => drop(self.lower_expr(e)),
                        crate::ast::AstNode::Stmt(s) => self.lower_stmt(s),
                    }
                }
            }
            StmtKind::Condition(c) => self.lower_condition(&c, self.ctx.stmt(id).range),
            StmtKind::While(w) => self.lower_while(&w, self.ctx.stmt(id).range),
            StmtKind::Return(r) => self.lower_return(&r),
            StmtKind::Null => {}
        }
    }

    fn lower_local_decl(&mut self, decl_id: DeclId) {
        let DeclKind::Var(v) = self.ctx.decl(decl_id).kind.clone() else {
            unreachable!("only local variables appear as a compound statement's declaration node");
        };
        let reg = match v.initializer {
            Some(init) => self.lower_expr(init),
            None => self.lower_default_value(v.resolved_type.expect("sema resolves every var's type")),
        };
        self.locals.insert(decl_id, reg.leak());
    }

    fn lower_condition(&mut self, c: &crate::ast::ConditionStmt, range: SourceRange) {
        let then_is_empty = is_empty_compound(self.ctx, c.then_branch);

        if then_is_empty && c.else_branch.is_none() {
            drop(self.lower_expr(c.cond));
            return;
        }

        // The "empty-then" peephole (spec §4.4): `if (cond) {} else { ... }` needs only one
        // conditional jump, testing the condition directly instead of negating it twice.
        if then_is_empty {
            let cond = self.lower_expr(c.cond);
            let jump = self.builder().create_cond_jump(Opcode::JumpIf, cond.get());
            drop(cond);
            self.lower_stmt(c.else_branch.expect("checked above"));
            let target = self.builder().next_index();
            self.builder().patch_jump(jump, target, self.diags, range);
            return;
        }

        let cond = self.lower_expr(c.cond);
        let jump_over_then = self.builder().create_cond_jump(Opcode::JumpIfNot, cond.get());
        drop(cond);
        self.lower_stmt(c.then_branch);
        match c.else_branch {
            None => {
                let target = self.builder().next_index();
                self.builder().patch_jump(jump_over_then, target, self.diags, range);
            }
            Some(else_branch) => {
                let jump_over_else = self.builder().create_jump();
                let else_target = self.builder().next_index();
                self.builder().patch_jump(jump_over_then, else_target, self.diags, range);
                self.lower_stmt(else_branch);
                let end_target = self.builder().next_index();
                self.builder().patch_jump(jump_over_else, end_target, self.diags, range);
            }
        }
    }

    fn lower_while(&mut self, w: &crate::ast::WhileStmt, range: SourceRange) {
        let top = self.builder().next_index();
        let cond = self.lower_expr(w.cond);
        let exit_jump = self.builder().create_cond_jump(Opcode::JumpIfNot, cond.get());
        drop(cond);
        self.lower_stmt(w.body);
        self.builder().create_jump_to(top, self.diags, range);
        let exit_target = self.builder().next_index();
        self.builder().patch_jump(exit_jump, exit_target, self.diags, range);
    }

    fn lower_return(&mut self, r: &crate::ast::ReturnStmt) {
        match r.value {
            Some(v) => {
                let reg = self.lower_expr(v);
                self.builder().create_small_binary(Opcode::Ret, 0, reg.get());
            }
            None => {
                self.builder().create_nullary(Opcode::RetVoid);
            }
        }
    }

    // -- expressions ---------------------------------------------------------------------

    fn lower_expr(&mut self, id: ExprId) -> RAIIRegister {
        match self.ctx.expr(id).kind.clone() {
            ExprKind::IntLit(v) => self.lower_int_const(v),
            ExprKind::DoubleLit(v) => self.lower_double_const(v),
            ExprKind::CharLit(c) => self.lower_char_const(c),
            ExprKind::BoolLit(v) => self.lower_bool_const(v),
            ExprKind::StringLit(s) => self.lower_string_const(&s),
            ExprKind::ArrayLit(elems) => self.lower_array_lit(&elems),
            ExprKind::Binary { op: BinOp::Assign, lhs, rhs, .. } => self.lower_assign(lhs, rhs),
            ExprKind::Binary { op: BinOp::And, op_range, lhs, rhs } => self.lower_short_circuit(true, lhs, rhs, op_range),
            ExprKind::Binary { op: BinOp::Or, op_range, lhs, rhs } => self.lower_short_circuit(false, lhs, rhs, op_range),
            ExprKind::Binary { op, lhs, rhs, .. } => self.lower_binary(op, lhs, rhs, self.ctx.expr(id).range),
            ExprKind::Unary { op, operand } => self.lower_unary(op, operand),
            ExprKind::Cast { inner, .. } => self.lower_cast(id, inner),
            ExprKind::DeclRef(decl_id) => self.lower_decl_ref(decl_id),
            ExprKind::Subscript { base, index } => self.lower_subscript_get(base, index, self.ctx.expr(id).range),
            ExprKind::Call { callee, args } => self.lower_call(callee, &args, self.ctx.expr(id).range),
            // Sema already reported a diagnostic for every case that reaches here (an unresolved
            // name, a bare member access, or a node it gave up on); nothing more to emit beyond a
            // well-formed placeholder value so the surrounding expression stays structurally sound.
            ExprKind::MemberOf { .. } | ExprKind::UnresolvedDeclRef(_) | ExprKind::Error => self.lower_int_const(0),
        }
    }

    fn lower_int_const(&mut self, v: i64) -> RAIIRegister {
        let dest = self.alloc.alloc();
        if let Ok(imm) = i16::try_from(v) {
            self.builder().create_binary(Opcode::StoreSmallInt, dest.get(), imm);
        } else {
            let idx = self.consts.ints.intern(v);
            self.builder().create_binary(Opcode::LoadIntK, dest.get(), enc16(idx));
        }
        dest
    }

    fn lower_double_const(&mut self, v: f64) -> RAIIRegister {
        let dest = self.alloc.alloc();
        let idx = self.consts.doubles.intern(OrderedDouble(v));
        self.builder().create_binary(Opcode::LoadDoubleK, dest.get(), enc16(idx));
        dest
    }

    fn lower_bool_const(&mut self, v: bool) -> RAIIRegister {
        let dest = self.alloc.alloc();
        self.builder().create_binary(Opcode::StoreSmallInt, dest.get(), i16::from(v));
        dest
    }

    fn lower_char_const(&mut self, c: char) -> RAIIRegister {
        self.lower_int_const(i64::from(u32::from(c)))
    }

    fn lower_string_const(&mut self, s: &str) -> RAIIRegister {
        let dest = self.alloc.alloc();
        let idx = self.consts.strings.intern(s.to_owned());
        self.builder().create_binary(Opcode::LoadStringK, dest.get(), enc16(idx));
        dest
    }

    fn lower_array_lit(&mut self, elems: &SmallVec<[ExprId; 4]>) -> RAIIRegister {
        let dest = self.alloc.alloc();
        {
            let cap = self.lower_int_const(i64::try_from(elems.len()).unwrap());
            self.builder().create_small_binary(Opcode::NewArray, dest.get(), cap.get());
        }
        for &e in elems {
            let v = self.lower_expr(e);
            self.builder().create_small_binary(Opcode::ArrayPush, dest.get(), v.get());
        }
        dest
    }

    /// The zero value for a type with no initializer: `VarDecl.initializer` is optional (spec
    /// §3.3), so a declaration like `var x : int;` still needs something to put in its register.
    fn lower_default_value(&mut self, ty: TypeId) -> RAIIRegister {
        match self.ctx.types.kind(ty).clone() {
            TypeKind::Primitive(PrimKind::Double) => self.lower_double_const(0.0),
            TypeKind::Primitive(PrimKind::String) => self.lower_string_const(""),
            TypeKind::Array(_) => {
                let dest = self.alloc.alloc();
                let cap = self.lower_int_const(0);
                self.builder().create_small_binary(Opcode::NewArray, dest.get(), cap.get());
                drop(cap);
                dest
            }
            _ => self.lower_int_const(0),
        }
    }

    fn lower_short_circuit(&mut self, is_and: bool, lhs: ExprId, rhs: ExprId, range: SourceRange) -> RAIIRegister {
        let dest = self.alloc.alloc();
        {
            let l = self.lower_expr(lhs);
            self.builder().create_small_binary(Opcode::Copy, dest.get(), l.get());
        }
        let skip_op = if is_and { Opcode::JumpIfNot } else { Opcode::JumpIf };
        let jump = self.builder().create_cond_jump(skip_op, dest.get());
        {
            let r = self.lower_expr(rhs);
            self.builder().create_small_binary(Opcode::Copy, dest.get(), r.get());
        }
        let target = self.builder().next_index();
        self.builder().patch_jump(jump, target, self.diags, range);
        dest
    }

    fn lower_binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId, range: SourceRange) -> RAIIRegister {
        let lhs_kind = self.prim_kind_of(lhs);
        let rhs_kind = self.prim_kind_of(rhs);

        if op == BinOp::Add
            && lhs_kind.is_concat_compatible()
            && rhs_kind.is_concat_compatible()
            && (lhs_kind == PrimKind::String || rhs_kind == PrimKind::String)
        {
            let l = self.lower_expr(lhs);
            self.coerce_inplace(&l, lhs_kind, PrimKind::String);
            let r = self.lower_expr(rhs);
            self.coerce_inplace(&r, rhs_kind, PrimKind::String);
            let dest = self.alloc.alloc();
            self.builder().create_ternary(Opcode::ConcatString, dest.get(), l.get(), r.get());
            return dest;
        }

        match op {
            BinOp::Eq | BinOp::Ne => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                let dest = self.alloc.alloc();
                self.builder().create_ternary(eq_ne_opcode(op, lhs_kind), dest.get(), l.get(), r.get());
                dest
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let common = arith_common_kind(lhs_kind, rhs_kind);
                let l = self.lower_expr(lhs);
                self.coerce_inplace(&l, lhs_kind, common);
                let r = self.lower_expr(rhs);
                self.coerce_inplace(&r, rhs_kind, common);
                let dest = self.alloc.alloc();
                self.builder().create_ternary(rel_opcode(op, common), dest.get(), l.get(), r.get());
                dest
            }
            _ => {
                let common = arith_common_kind(lhs_kind, rhs_kind);
                let l = self.lower_expr(lhs);
                self.coerce_inplace(&l, lhs_kind, common);
                let r = self.lower_expr(rhs);
                self.coerce_inplace(&r, rhs_kind, common);
                let dest = self.alloc.alloc();
                let opcode = arith_opcode(op, common);
                let instr = self.builder().create_ternary(opcode, dest.get(), l.get(), r.get());
                if matches!(opcode, Opcode::DivInt | Opcode::ModInt) {
                    self.builder().add_debug_range(instr, range);
                }
                dest
            }
        }
    }

    fn lower_unary(&mut self, op: UnOp, operand: ExprId) -> RAIIRegister {
        let kind = self.prim_kind_of(operand);
        let v = self.lower_expr(operand);
        match op {
            UnOp::Not => {
                let dest = self.alloc.alloc();
                self.builder().create_small_binary(Opcode::LNot, dest.get(), v.get());
                dest
            }
            UnOp::Plus => {
                let norm = if kind == PrimKind::Bool { PrimKind::Int } else { kind };
                self.coerce_inplace(&v, kind, norm);
                v
            }
            UnOp::Neg => {
                let norm = if kind == PrimKind::Bool { PrimKind::Int } else { kind };
                self.coerce_inplace(&v, kind, norm);
                let dest = self.alloc.alloc();
                let op = if norm == PrimKind::Double { Opcode::NegDouble } else { Opcode::NegInt };
                self.builder().create_small_binary(op, dest.get(), v.get());
                dest
            }
        }
    }

    fn lower_cast(&mut self, id: ExprId, inner: ExprId) -> RAIIRegister {
        let ExprKind::Cast { resolved_target, .. } = self.ctx.expr(id).kind.clone() else {
            unreachable!("lower_cast called on a non-Cast expression");
        };
        let target = resolved_target.expect("sema resolves every cast's target type");
        let from_ty = strip_lvalue(&self.ctx.types, self.ctx.expr(inner).ty.expect("codegen runs after typing"));
        let v = self.lower_expr(inner);
        if self.ctx.types.structurally_equal(from_ty, target) {
            return v;
        }
        let from_kind = self.prim_kind_of(inner);
        let TypeKind::Primitive(to_kind) = self.ctx.types.kind(target) else {
            unreachable!("is_valid_cast only ever accepts a primitive target");
        };
        let to_kind = *to_kind;
        let instr = self.coerce_inplace(&v, from_kind, to_kind);
        if let Some(instr) = instr {
            if cast_opcode(from_kind, to_kind) == Some(Opcode::StringToChar) {
                self.builder().add_debug_range(instr, self.ctx.expr(id).range);
            }
        }
        v
    }

    fn lower_decl_ref(&mut self, decl_id: DeclId) -> RAIIRegister {
        match self.ctx.decl(decl_id).kind.clone() {
            DeclKind::Param(_) => self.alloc.borrow(self.locals[&decl_id]),
            DeclKind::Var(v) if v.is_global => {
                let idx = self.global_indices[&decl_id];
                let dest = self.alloc.alloc();
                self.builder().create_binary(Opcode::LoadGlobal, dest.get(), enc16(u16::try_from(idx).unwrap()));
                dest
            }
            DeclKind::Var(_) => self.alloc.borrow(self.locals[&decl_id]),
            DeclKind::Func(_) => {
                let idx = self.func_indices[&decl_id];
                let dest = self.alloc.alloc();
                self.builder().create_binary(Opcode::LoadFunc, dest.get(), enc16(u16::try_from(idx).unwrap()));
                dest
            }
            DeclKind::BuiltinFunc(b) => {
                let idx = self.intern_builtin(decl_id, &b);
                let dest = self.alloc.alloc();
                self.builder().create_binary(Opcode::LoadBuiltinFunc, dest.get(), enc16(idx));
                dest
            }
            DeclKind::Unit(_) => unreachable!("a unit decl is never referenced by an expression"),
        }
    }

    fn intern_builtin(&mut self, decl_id: DeclId, b: &crate::ast::BuiltinFuncDecl) -> u16 {
        if let Some(&idx) = self.builtin_indices.get(&decl_id) {
            return idx;
        }
        let TypeKind::Function(params, _) = self.ctx.types.kind(b.signature).clone() else {
            unreachable!("a builtin's signature is always a function type");
        };
        let TypeKind::Primitive(arg_kind) = self.ctx.types.kind(params[0]) else {
            unreachable!("every registered builtin takes a single primitive argument");
        };
        let idx = u16::try_from(self.builtins.len()).expect("more than 65536 distinct builtin call sites");
        self.builtins.push(BuiltinCallSpec { intrinsic: b.intrinsic, arg_kind: *arg_kind });
        self.builtin_indices.insert(decl_id, idx);
        idx
    }

    fn lower_subscript_get(&mut self, base: ExprId, index: ExprId, range: SourceRange) -> RAIIRegister {
        let b = self.lower_expr(base);
        let i = self.lower_expr(index);
        let dest = self.alloc.alloc();
        let instr = self.builder().create_ternary(Opcode::ArrayGet, dest.get(), b.get(), i.get());
        self.builder().add_debug_range(instr, range);
        dest
    }

    fn lower_assign(&mut self, lhs: ExprId, rhs: ExprId) -> RAIIRegister {
        match self.ctx.expr(lhs).kind.clone() {
            ExprKind::DeclRef(decl_id) => match self.ctx.decl(decl_id).kind.clone() {
                DeclKind::Var(v) if v.is_global => {
                    let idx = self.global_indices[&decl_id];
                    let value = self.lower_expr(rhs);
                    self.builder().create_binary(Opcode::StoreGlobal, value.get(), enc16(u16::try_from(idx).unwrap()));
                    value
                }
                DeclKind::Param(_) | DeclKind::Var(_) => {
                    let local_reg = self.locals[&decl_id];
                    let value = self.lower_expr(rhs);
                    self.builder().create_small_binary(Opcode::Copy, local_reg, value.get());
                    value
                }
                _ => unreachable!("sema only resolves an assignment target to a variable or parameter"),
            },
            ExprKind::Subscript { base, index } => {
                let range = self.ctx.expr(lhs).range;
                let b = self.lower_expr(base);
                let i = self.lower_expr(index);
                let value = self.lower_expr(rhs);
                let instr = self.builder().create_ternary(Opcode::ArraySet, b.get(), i.get(), value.get());
                self.builder().add_debug_range(instr, range);
                value
            }
            _ => unreachable!("sema only allows a DeclRef or Subscript as an assignment's lvalue"),
        }
    }

    fn lower_call(&mut self, callee: ExprId, args: &[ExprId], range: SourceRange) -> RAIIRegister {
        if let ExprKind::MemberOf { base, member, .. } = self.ctx.expr(callee).kind.clone() {
            if args.is_empty() && self.ctx.interner.resolve(member) == "len" {
                return self.lower_len_call(base);
            }
        }
        let ExprKind::DeclRef(decl_id) = self.ctx.expr(callee).kind.clone() else {
            // Sema already reported `CallNonFunction` for anything reaching here.
            return self.lower_expr(callee);
        };

        let dest = self.lower_decl_ref(decl_id);
        let mut arg_regs = Vec::with_capacity(args.len());
        for &a in args {
            arg_regs.push(self.lower_expr(a));
        }
        let src = arg_regs.first().map_or(dest.get(), RAIIRegister::get);
        let instr = self.builder().create_small_binary(Opcode::Call, dest.get(), src);
        self.builder().add_debug_range(instr, range);
        while let Some(r) = arg_regs.pop() {
            drop(r);
        }
        dest
    }

    fn lower_len_call(&mut self, base: ExprId) -> RAIIRegister {
        let base_ty = strip_lvalue(&self.ctx.types, self.ctx.expr(base).ty.expect("codegen runs after typing"));
        let is_string = matches!(self.ctx.types.kind(base_ty), TypeKind::Primitive(PrimKind::String));
        let b = self.lower_expr(base);
        let dest = self.alloc.alloc();
        let op = if is_string { Opcode::StringLen } else { Opcode::ArrayLen };
        self.builder().create_small_binary(op, dest.get(), b.get());
        dest
    }

    fn prim_kind_of(&self, id: ExprId) -> PrimKind {
        let ty = strip_lvalue(&self.ctx.types, self.ctx.expr(id).ty.expect("codegen runs after typing"));
        match self.ctx.types.kind(ty) {
            TypeKind::Primitive(p) => *p,
            _ => PrimKind::Int,
        }
    }

    fn coerce_inplace(&mut self, reg: &RAIIRegister, from: PrimKind, to: PrimKind) -> Option<InstrId> {
        if from == to {
            return None;
        }
        let op = cast_opcode(from, to).unwrap_or_else(|| unreachable!("no coercion opcode from {from} to {to}"));
        Some(self.builder().create_small_binary(op, reg.get(), reg.get()))
    }
}

fn is_empty_compound(ctx: &AstContext, id: StmtId) -> bool {
    matches!(&ctx.stmt(id).kind, StmtKind::Compound(c) if c.nodes.is_empty())
}

/// Reinterprets a 16-bit pool/table index as the signed immediate `Binary`-layout instructions
/// carry; the VM reverses this with the same bit-for-bit cast.
fn enc16(v: u16) -> i16 {
    v as i16
}

/// Promotes `bool` into `int` for arithmetic opcode selection - there is no `AddBool`/`LtBool`/
/// etc, only `Int`/`Double` families (spec §4.4's catalogue).
fn arith_common_kind(a: PrimKind, b: PrimKind) -> PrimKind {
    let norm = |p: PrimKind| if p == PrimKind::Bool { PrimKind::Int } else { p };
    if norm(a) == PrimKind::Double || norm(b) == PrimKind::Double {
        PrimKind::Double
    } else {
        PrimKind::Int
    }
}

fn cast_opcode(from: PrimKind, to: PrimKind) -> Option<Opcode> {
    use PrimKind::{Bool, Char, Double, Int, String};
    match (from, to) {
        (Bool, Int) => Some(Opcode::BoolToInt),
        (Int, Bool) => Some(Opcode::IntToBool),
        (Bool, Double) => Some(Opcode::BoolToDouble),
        (Double, Bool) => Some(Opcode::DoubleToBool),
        (Int, Double) => Some(Opcode::IntToDouble),
        (Double, Int) => Some(Opcode::DoubleToInt),
        (Char, String) => Some(Opcode::CharToString),
        (String, Char) => Some(Opcode::StringToChar),
        _ => None,
    }
}

fn arith_opcode(op: BinOp, kind: PrimKind) -> Opcode {
    match (op, kind) {
        (BinOp::Add, PrimKind::Int) => Opcode::AddInt,
        (BinOp::Add, PrimKind::Double) => Opcode::AddDouble,
        (BinOp::Sub, PrimKind::Int) => Opcode::SubInt,
        (BinOp::Sub, PrimKind::Double) => Opcode::SubDouble,
        (BinOp::Mul, PrimKind::Int) => Opcode::MulInt,
        (BinOp::Mul, PrimKind::Double) => Opcode::MulDouble,
        (BinOp::Div, PrimKind::Int) => Opcode::DivInt,
        (BinOp::Div, PrimKind::Double) => Opcode::DivDouble,
        (BinOp::Mod, PrimKind::Int) => Opcode::ModInt,
        (BinOp::Pow, PrimKind::Int) => Opcode::PowInt,
        (BinOp::Pow, PrimKind::Double) => Opcode::PowDouble,
        _ => unreachable!("sema rejects `%` on anything but int (no ModBool/ModDouble opcode exists)"),
    }
}

fn eq_ne_opcode(op: BinOp, kind: PrimKind) -> Opcode {
    match (op, kind) {
        (BinOp::Eq, PrimKind::Int) => Opcode::EqInt,
        (BinOp::Eq, PrimKind::Double) => Opcode::EqDouble,
        (BinOp::Eq, PrimKind::Char) => Opcode::EqChar,
        (BinOp::Eq, PrimKind::Bool) => Opcode::EqBool,
        (BinOp::Eq, PrimKind::String) => Opcode::EqString,
        (BinOp::Ne, PrimKind::Int) => Opcode::NeInt,
        (BinOp::Ne, PrimKind::Double) => Opcode::NeDouble,
        (BinOp::Ne, PrimKind::Char) => Opcode::NeChar,
        (BinOp::Ne, PrimKind::Bool) => Opcode::NeBool,
        (BinOp::Ne, PrimKind::String) => Opcode::NeString,
        _ => unreachable!("== / != only ever compare same-kind operands (spec §4.2's same_comparable_kind)"),
    }
}

fn rel_opcode(op: BinOp, kind: PrimKind) -> Opcode {
    match (op, kind) {
        (BinOp::Lt, PrimKind::Int) => Opcode::LtInt,
        (BinOp::Lt, PrimKind::Double) => Opcode::LtDouble,
        (BinOp::Le, PrimKind::Int) => Opcode::LeInt,
        (BinOp::Le, PrimKind::Double) => Opcode::LeDouble,
        (BinOp::Gt, PrimKind::Int) => Opcode::GtInt,
        (BinOp::Gt, PrimKind::Double) => Opcode::GtDouble,
        (BinOp::Ge, PrimKind::Int) => Opcode::GeInt,
        (BinOp::Ge, PrimKind::Double) => Opcode::GeDouble,
        _ => unreachable!("relational operators only ever compare Int or Double after promotion"),
    }
}

#[cfg(test)]
mod tests {
    use super::compile_unit;
    use crate::{
        ast::{AstContext, PrimKind},
        bytecode::{dump_module, BCModule},
        diagnostic::DiagnosticEngine,
        lexer::lex,
        parser::parse_unit,
        sema,
        source::SourceManager,
    };

    fn compile(src: &str) -> (BCModule, DiagnosticEngine) {
        let mut sm = SourceManager::new();
        let file = sm.add_buffer("t.fox", src);
        let mut ctx = AstContext::new();
        let mut diags = DiagnosticEngine::default();
        let tokens = lex(&sm, file, &mut ctx.interner, &mut diags);
        let unit = parse_unit(&tokens, &mut ctx, &mut diags).expect("parses");
        sema::analyze(&mut ctx, unit, "main", &mut diags);
        assert!(
            !diags.has_errors(),
            "unexpected errors: {:?}",
            diags.diagnostics().iter().map(crate::diagnostic::Diagnostic::message).collect::<Vec<_>>()
        );
        let module = compile_unit(&ctx, unit, &mut diags);
        (module, diags)
    }

    #[test]
    fn empty_main_returns_void() {
        let (module, _) = compile("func main() { }");
        assert!(dump_module(&module).contains("RetVoid"));
        assert_eq!(module.entry_point, Some(0));
    }

    #[test]
    fn arithmetic_promotes_int_to_double() {
        let (module, _) = compile("func main() : double { return 1 + 2.0; }");
        let dump = dump_module(&module);
        assert!(dump.contains("IntToDouble"));
        assert!(dump.contains("AddDouble"));
    }

    #[test]
    fn string_concat_casts_a_char_operand() {
        let (module, _) = compile("func main() : string { let c : char = 'x'; return \"a\" + c; }");
        let dump = dump_module(&module);
        assert!(dump.contains("CharToString"));
        assert!(dump.contains("ConcatString"));
    }

    #[test]
    fn global_initializer_compiles_separately_and_loads_via_load_global() {
        let (module, _) = compile("var counter : int = 41; func main() : int { return counter; }");
        assert_eq!(module.globals.len(), 1);
        assert!(dump_module(&module).contains("LoadGlobal"));
    }

    #[test]
    fn while_loop_jumps_backward_to_its_condition() {
        let (module, _) = compile("func main() { var i : int = 0; while (i < 3) { i = i + 1; } }");
        let dump = dump_module(&module);
        assert!(dump.contains("LtInt"));
        assert!(dump.contains("Jump "));
    }

    #[test]
    fn array_len_lowers_directly_without_a_call() {
        let (module, _) = compile("func main() : int { let a : [int] = [1, 2, 3]; return a.len(); }");
        let dump = dump_module(&module);
        assert!(dump.contains("ArrayLen"));
        assert!(!dump.contains("Call "));
    }

    #[test]
    fn print_call_records_one_builtin_spec_keyed_by_argument_kind() {
        let (module, _) = compile("func main() { print(1); }");
        assert_eq!(module.builtins.len(), 1);
        assert_eq!(module.builtins[0].arg_kind, PrimKind::Int);
    }

    #[test]
    fn user_function_call_carries_its_arity_on_the_callee() {
        let (module, _) = compile(
            "func add(a : int, b : int) : int { return a + b; } func main() : int { return add(1, 2); }",
        );
        let add = module.functions.iter().find(|f| f.name == "add").expect("add was compiled");
        assert_eq!(add.num_params, 2);
    }

    #[test]
    fn empty_then_branch_emits_a_single_conditional_jump() {
        let (module, _) = compile("func main() { if (true) { } else { print(1); } }");
        let add = &module.functions[0];
        let jumps = add.instrs.iter().filter(|i| i.op == crate::bytecode::Opcode::JumpIf || i.op == crate::bytecode::Opcode::JumpIfNot).count();
        assert_eq!(jumps, 1);
    }
}
