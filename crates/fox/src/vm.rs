//! The register-windowed virtual machine (spec §3.7/§4.5).
//!
//! The VM trusts the module it is handed: `compile_unit` only ever produces instructions whose
//! operands are in range for the function that owns them, so register indices and constant-pool
//! indices are never bounds-checked here beyond what a slice index already does for free. What
//! *is* checked, because it depends on values only known at runtime, are the conditions spec §7
//! calls VM runtime errors: division by zero, an out-of-bounds array/string access, a call whose
//! register window would overrun the stack, and a `string as char` cast whose string isn't
//! exactly one code point long.

use std::io::{self, Write};

use crate::{
    ast::PrimKind,
    builtins::BuiltinIntrinsic,
    bytecode::{BCFunction, BCModule, BuiltinCallSpec, Instr, Opcode},
    heap::{ArrayObject, Heap, Slot, StringObject},
    source::SourceRange,
};

/// Default register-stack capacity (spec §3.7: "default 255 registers of 64 bits").
pub const DEFAULT_REGISTER_STACK_SIZE: usize = 255;

/// Tags a `Call`-able [`Slot`] as a builtin index rather than a `BCFunction` index; set by
/// `LoadBuiltinFunc`, tested by `Call`. The top bit is free for this since no realistic module
/// compiles anywhere near 2^63 functions.
const BUILTIN_TAG: u64 = 1 << 63;

/// A VM runtime error (spec §7's third failure kind): terminates execution, never unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum VmError {
    DivisionByZero,
    IndexOutOfBounds,
    /// A register window for an incoming call would not fit in the remaining register stack.
    StackOverflow,
    /// `string as char` on a string whose length in code points isn't exactly one.
    InvalidCast,
    /// `run_module` called on a module with no entry point recorded.
    NoEntryPoint,
}

/// One saved caller context, pushed on `Call` and popped on `Ret`/`RetVoid` (spec §4.5: "a
/// call-stack, distinct from the register stack"). Borrows the caller's `BCFunction` directly
/// rather than an index into `module.functions`, since the caller being resumed might equally be
/// a global initializer (`module.globals`) calling into a user function mid-initialization.
struct Frame<'m> {
    func: &'m BCFunction,
    pc: usize,
    base: usize,
    /// The register (in the frame being returned *to*) that receives the callee's result.
    dest: u8,
}

/// Owns the register stack, heap, and global-variable slots for one module's lifetime (spec
/// §3.7). `print`'s output goes to `out`, injectable so tests can capture it instead of writing
/// to the process's real stdout.
pub struct Vm {
    registers: Vec<Slot>,
    heap: Heap,
    globals: Vec<Slot>,
    out: Box<dyn Write>,
    /// The source range recorded for the most recently dispatched instruction, if its lowering
    /// site called `add_debug_range` (spec §4.3's `BCFunction` debug map). Read by callers after
    /// a runtime error to report where in the source it occurred; meaningless until the first
    /// instruction has run.
    last_fault_range: Option<SourceRange>,
}

impl Vm {
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    #[must_use]
    pub fn with_writer(out: Box<dyn Write>) -> Self {
        Self::with_capacity(DEFAULT_REGISTER_STACK_SIZE, out)
    }

    #[must_use]
    pub fn with_capacity(register_stack_size: usize, out: Box<dyn Write>) -> Self {
        Self {
            registers: vec![Slot::zero(); register_stack_size],
            heap: Heap::new(),
            globals: Vec::new(),
            out,
            last_fault_range: None,
        }
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The source range of the instruction dispatched immediately before a runtime error, if its
    /// lowering site recorded one. `None` either because nothing has faulted or because the
    /// faulting instruction's site doesn't track debug info.
    #[must_use]
    pub fn last_fault_range(&self) -> Option<SourceRange> {
        self.last_fault_range
    }

    /// Runs every global initializer (in declaration order), then the entry point, matching the
    /// driver behavior spec §4.4's "Global vars" paragraph describes.
    pub fn run_module(&mut self, module: &BCModule) -> Result<Option<Slot>, VmError> {
        self.globals = vec![Slot::zero(); module.globals.len()];
        for (i, init) in module.globals.iter().enumerate() {
            let value = self.call_function(module, init, &[])?;
            self.globals[i] = value.expect("a global initializer always returns its value");
        }
        let entry = module.entry_point.ok_or(VmError::NoEntryPoint)?;
        self.call(module, entry, &[])
    }

    /// The external entry point (spec §4.5's "External call"): copies `args` into the initial
    /// register window, runs until `Ret`/`RetVoid`, and returns the result slot (or `None` for a
    /// void function).
    pub fn call(&mut self, module: &BCModule, func_idx: u32, args: &[Slot]) -> Result<Option<Slot>, VmError> {
        let func = &module.functions[func_idx as usize];
        self.call_function(module, func, args)
    }

    fn call_function<'m>(&mut self, module: &'m BCModule, func: &'m BCFunction, args: &[Slot]) -> Result<Option<Slot>, VmError> {
        let mut base = 0usize;
        self.ensure_window(base, func.num_registers)?;
        for (i, &a) in args.iter().enumerate() {
            self.registers[base + i] = a;
        }

        let mut func = func;
        let mut pc = 0usize;
        let mut frames: Vec<Frame<'m>> = Vec::new();

        loop {
            let instr = func.instrs[pc];
            self.last_fault_range = func.debug_ranges[pc];
            pc += 1;

            match instr.op {
                Opcode::NoOp => {}

                Opcode::StoreSmallInt => {
                    let (dest, imm) = instr.as_binary();
                    self.set_reg(base, dest, Slot::from_int(i64::from(imm)));
                }
                Opcode::LoadIntK => {
                    let (dest, idx) = instr.as_binary();
                    self.set_reg(base, dest, Slot::from_int(*module.consts.ints.get(idx as u16)));
                }
                Opcode::LoadDoubleK => {
                    let (dest, idx) = instr.as_binary();
                    self.set_reg(base, dest, Slot::from_double(module.consts.doubles.get(idx as u16).0));
                }
                Opcode::LoadStringK => {
                    let (dest, idx) = instr.as_binary();
                    let s = module.consts.strings.get(idx as u16).clone();
                    let id = self.heap.alloc_string(StringObject::new(s));
                    self.set_reg(base, dest, Slot::from_heap_id(id));
                }
                Opcode::LoadFunc => {
                    let (dest, idx) = instr.as_binary();
                    self.set_reg(base, dest, Slot::from_bits(u64::from(idx as u16)));
                }
                Opcode::LoadBuiltinFunc => {
                    let (dest, idx) = instr.as_binary();
                    self.set_reg(base, dest, Slot::from_bits(BUILTIN_TAG | u64::from(idx as u16)));
                }
                Opcode::LoadGlobal => {
                    let (dest, idx) = instr.as_binary();
                    self.set_reg(base, dest, self.globals[idx as usize]);
                }
                Opcode::StoreGlobal => {
                    let (src, idx) = instr.as_binary();
                    self.globals[idx as usize] = self.reg(base, src);
                }

                Opcode::AddInt => self.ternary_int(base, instr, i64::wrapping_add),
                Opcode::AddDouble => self.ternary_double(base, instr, |a, b| a + b),
                Opcode::ConcatString => self.concat_string(base, instr),
                Opcode::SubInt => self.ternary_int(base, instr, i64::wrapping_sub),
                Opcode::SubDouble => self.ternary_double(base, instr, |a, b| a - b),
                Opcode::MulInt => self.ternary_int(base, instr, i64::wrapping_mul),
                Opcode::MulDouble => self.ternary_double(base, instr, |a, b| a * b),
                Opcode::DivInt => self.div_mod_int(base, instr, |a, b| a.wrapping_div(b))?,
                Opcode::DivDouble => self.ternary_double(base, instr, |a, b| a / b),
                Opcode::ModInt => self.div_mod_int(base, instr, |a, b| a.wrapping_rem(b))?,
                Opcode::PowInt => self.ternary_int(base, instr, |a, b| ((a as f64).powf(b as f64)) as i64),
                Opcode::PowDouble => self.ternary_double(base, instr, f64::powf),

                Opcode::LtInt => self.cmp_int(base, instr, |a, b| a < b),
                Opcode::LtDouble => self.cmp_double(base, instr, |a, b| a < b),
                Opcode::LeInt => self.cmp_int(base, instr, |a, b| a <= b),
                Opcode::LeDouble => self.cmp_double(base, instr, |a, b| a <= b),
                Opcode::GtInt => self.cmp_int(base, instr, |a, b| a > b),
                Opcode::GtDouble => self.cmp_double(base, instr, |a, b| a > b),
                Opcode::GeInt => self.cmp_int(base, instr, |a, b| a >= b),
                Opcode::GeDouble => self.cmp_double(base, instr, |a, b| a >= b),
                Opcode::EqInt => self.cmp_int(base, instr, |a, b| a == b),
                Opcode::EqDouble => self.cmp_double(base, instr, |a, b| a == b),
                Opcode::EqChar => self.cmp_char(base, instr, |a, b| a == b),
                Opcode::EqBool => self.cmp_bool(base, instr, |a, b| a == b),
                Opcode::EqString => self.cmp_string(base, instr, |a, b| a == b),
                Opcode::NeInt => self.cmp_int(base, instr, |a, b| a != b),
                Opcode::NeDouble => self.cmp_double(base, instr, |a, b| a != b),
                Opcode::NeChar => self.cmp_char(base, instr, |a, b| a != b),
                Opcode::NeBool => self.cmp_bool(base, instr, |a, b| a != b),
                Opcode::NeString => self.cmp_string(base, instr, |a, b| a != b),

                Opcode::LAnd => self.cmp_bool(base, instr, |a, b| a && b),
                Opcode::LOr => self.cmp_bool(base, instr, |a, b| a || b),
                Opcode::LNot => {
                    let (dest, src) = instr.as_small_binary();
                    let v = !self.reg(base, src).as_bool();
                    self.set_reg(base, dest, Slot::from_bool(v));
                }
                Opcode::NegInt => {
                    let (dest, src) = instr.as_small_binary();
                    let v = self.reg(base, src).as_int().wrapping_neg();
                    self.set_reg(base, dest, Slot::from_int(v));
                }
                Opcode::NegDouble => {
                    let (dest, src) = instr.as_small_binary();
                    let v = -self.reg(base, src).as_double();
                    self.set_reg(base, dest, Slot::from_double(v));
                }

                Opcode::IntToDouble => {
                    let (dest, src) = instr.as_small_binary();
                    let v = self.reg(base, src).as_int() as f64;
                    self.set_reg(base, dest, Slot::from_double(v));
                }
                Opcode::DoubleToInt => {
                    let (dest, src) = instr.as_small_binary();
                    let v = self.reg(base, src).as_double() as i64;
                    self.set_reg(base, dest, Slot::from_int(v));
                }
                Opcode::BoolToInt => {
                    let (dest, src) = instr.as_small_binary();
                    let v = i64::from(self.reg(base, src).as_bool());
                    self.set_reg(base, dest, Slot::from_int(v));
                }
                Opcode::BoolToDouble => {
                    let (dest, src) = instr.as_small_binary();
                    let v = if self.reg(base, src).as_bool() { 1.0 } else { 0.0 };
                    self.set_reg(base, dest, Slot::from_double(v));
                }
                Opcode::IntToBool => {
                    let (dest, src) = instr.as_small_binary();
                    let v = self.reg(base, src).as_int() != 0;
                    self.set_reg(base, dest, Slot::from_bool(v));
                }
                Opcode::DoubleToBool => {
                    let (dest, src) = instr.as_small_binary();
                    let v = self.reg(base, src).as_double() != 0.0;
                    self.set_reg(base, dest, Slot::from_bool(v));
                }
                Opcode::CharToString => {
                    let (dest, src) = instr.as_small_binary();
                    let c = self.reg(base, src).as_char();
                    let id = self.heap.alloc_string(StringObject::new(c.to_string()));
                    self.set_reg(base, dest, Slot::from_heap_id(id));
                }
                Opcode::StringToChar => {
                    let (dest, src) = instr.as_small_binary();
                    let s = self.heap.string(self.reg(base, src).as_heap_id());
                    let mut chars = s.as_str().chars();
                    let (Some(c), None) = (chars.next(), chars.next()) else { return Err(VmError::InvalidCast) };
                    self.set_reg(base, dest, Slot::from_char(c));
                }

                Opcode::Copy => {
                    let (dest, src) = instr.as_small_binary();
                    let v = self.reg(base, src);
                    self.set_reg(base, dest, v);
                }
                Opcode::Jump => {
                    pc = apply_offset(pc, instr.as_unary_offset());
                }
                Opcode::JumpIf => {
                    let (cond, off) = instr.as_binary();
                    if self.reg(base, cond).as_bool() {
                        pc = apply_offset(pc, i32::from(off));
                    }
                }
                Opcode::JumpIfNot => {
                    let (cond, off) = instr.as_binary();
                    if !self.reg(base, cond).as_bool() {
                        pc = apply_offset(pc, i32::from(off));
                    }
                }

                Opcode::Call => {
                    let (dest, src) = instr.as_small_binary();
                    let callee = self.reg(base, dest);
                    let bits = callee.bits();
                    if bits & BUILTIN_TAG != 0 {
                        let spec = &module.builtins[(bits & !BUILTIN_TAG) as usize];
                        let arg = self.reg(base, src);
                        self.invoke_builtin(spec, arg);
                    } else {
                        let callee_idx = u32::from(bits as u16);
                        let callee_func = &module.functions[callee_idx as usize];
                        let new_base = base + usize::from(func.num_registers);
                        self.ensure_window(new_base, callee_func.num_registers)?;
                        for i in 0..usize::from(callee_func.num_params) {
                            self.registers[new_base + i] = self.registers[base + usize::from(src) + i];
                        }
                        frames.push(Frame { func, pc, base, dest });
                        func = callee_func;
                        base = new_base;
                        pc = 0;
                    }
                }
                Opcode::Ret => {
                    let (_, src) = instr.as_small_binary();
                    let value = self.reg(base, src);
                    match frames.pop() {
                        None => return Ok(Some(value)),
                        Some(frame) => {
                            self.registers[frame.base + usize::from(frame.dest)] = value;
                            func = frame.func;
                            pc = frame.pc;
                            base = frame.base;
                        }
                    }
                }
                Opcode::RetVoid => match frames.pop() {
                    None => return Ok(None),
                    Some(frame) => {
                        func = frame.func;
                        pc = frame.pc;
                        base = frame.base;
                    }
                },

                Opcode::NewArray => {
                    let (dest, src) = instr.as_small_binary();
                    let cap = self.reg(base, src).as_int().max(0) as usize;
                    let id = self.heap.alloc_array(ArrayObject::with_capacity(cap));
                    self.set_reg(base, dest, Slot::from_heap_id(id));
                }
                Opcode::ArrayGet => {
                    let (dest, arr, idx) = instr.as_ternary();
                    let array = self.heap.array(self.reg(base, arr).as_heap_id());
                    let i = self.reg(base, idx).as_int();
                    let v = usize::try_from(i).ok().and_then(|i| array.get(i)).ok_or(VmError::IndexOutOfBounds)?;
                    self.set_reg(base, dest, v);
                }
                Opcode::ArraySet => {
                    let (arr, idx, value) = instr.as_ternary();
                    let id = self.reg(base, arr).as_heap_id();
                    let i = self.reg(base, idx).as_int();
                    let v = self.reg(base, value);
                    let ok = usize::try_from(i).ok().and_then(|i| self.heap.array_mut(id).set(i, v));
                    ok.ok_or(VmError::IndexOutOfBounds)?;
                }
                Opcode::ArrayLen => {
                    let (dest, src) = instr.as_small_binary();
                    let len = self.heap.array(self.reg(base, src).as_heap_id()).len();
                    self.set_reg(base, dest, Slot::from_int(i64::try_from(len).unwrap()));
                }
                Opcode::ArrayPush => {
                    let (arr, src) = instr.as_small_binary();
                    let id = self.reg(base, arr).as_heap_id();
                    let v = self.reg(base, src);
                    self.heap.array_mut(id).push(v);
                }
                Opcode::StringLen => {
                    let (dest, src) = instr.as_small_binary();
                    let len = self.heap.string(self.reg(base, src).as_heap_id()).len_chars();
                    self.set_reg(base, dest, Slot::from_int(i64::try_from(len).unwrap()));
                }
            }
        }
    }

    fn reg(&self, base: usize, r: u8) -> Slot {
        self.registers[base + usize::from(r)]
    }

    fn set_reg(&mut self, base: usize, r: u8, v: Slot) {
        self.registers[base + usize::from(r)] = v;
    }

    fn ensure_window(&mut self, base: usize, num_registers: u8) -> Result<(), VmError> {
        if base + usize::from(num_registers) > self.registers.len() {
            return Err(VmError::StackOverflow);
        }
        Ok(())
    }

    fn ternary_int(&mut self, base: usize, instr: Instr, f: impl Fn(i64, i64) -> i64) {
        let (dest, lhs, rhs) = instr.as_ternary();
        let v = f(self.reg(base, lhs).as_int(), self.reg(base, rhs).as_int());
        self.set_reg(base, dest, Slot::from_int(v));
    }

    fn ternary_double(&mut self, base: usize, instr: Instr, f: impl Fn(f64, f64) -> f64) {
        let (dest, lhs, rhs) = instr.as_ternary();
        let v = f(self.reg(base, lhs).as_double(), self.reg(base, rhs).as_double());
        self.set_reg(base, dest, Slot::from_double(v));
    }

    fn div_mod_int(&mut self, base: usize, instr: Instr, f: impl Fn(i64, i64) -> i64) -> Result<(), VmError> {
        let (dest, lhs, rhs) = instr.as_ternary();
        let divisor = self.reg(base, rhs).as_int();
        if divisor == 0 {
            return Err(VmError::DivisionByZero);
        }
        let v = f(self.reg(base, lhs).as_int(), divisor);
        self.set_reg(base, dest, Slot::from_int(v));
        Ok(())
    }

    fn cmp_int(&mut self, base: usize, instr: Instr, f: impl Fn(i64, i64) -> bool) {
        let (dest, lhs, rhs) = instr.as_ternary();
        let v = f(self.reg(base, lhs).as_int(), self.reg(base, rhs).as_int());
        self.set_reg(base, dest, Slot::from_bool(v));
    }

    fn cmp_double(&mut self, base: usize, instr: Instr, f: impl Fn(f64, f64) -> bool) {
        let (dest, lhs, rhs) = instr.as_ternary();
        let v = f(self.reg(base, lhs).as_double(), self.reg(base, rhs).as_double());
        self.set_reg(base, dest, Slot::from_bool(v));
    }

    fn cmp_char(&mut self, base: usize, instr: Instr, f: impl Fn(char, char) -> bool) {
        let (dest, lhs, rhs) = instr.as_ternary();
        let v = f(self.reg(base, lhs).as_char(), self.reg(base, rhs).as_char());
        self.set_reg(base, dest, Slot::from_bool(v));
    }

    fn cmp_bool(&mut self, base: usize, instr: Instr, f: impl Fn(bool, bool) -> bool) {
        let (dest, lhs, rhs) = instr.as_ternary();
        let v = f(self.reg(base, lhs).as_bool(), self.reg(base, rhs).as_bool());
        self.set_reg(base, dest, Slot::from_bool(v));
    }

    fn cmp_string(&mut self, base: usize, instr: Instr, f: impl Fn(&str, &str) -> bool) {
        let (dest, lhs, rhs) = instr.as_ternary();
        let a = self.heap.string(self.reg(base, lhs).as_heap_id()).as_str().to_owned();
        let b = self.heap.string(self.reg(base, rhs).as_heap_id()).as_str().to_owned();
        self.set_reg(base, dest, Slot::from_bool(f(&a, &b)));
    }

    fn concat_string(&mut self, base: usize, instr: Instr) {
        let (dest, lhs, rhs) = instr.as_ternary();
        let mut out = self.heap.string(self.reg(base, lhs).as_heap_id()).as_str().to_owned();
        out.push_str(self.heap.string(self.reg(base, rhs).as_heap_id()).as_str());
        let id = self.heap.alloc_string(StringObject::new(out));
        self.set_reg(base, dest, Slot::from_heap_id(id));
    }

    fn invoke_builtin(&mut self, spec: &BuiltinCallSpec, arg: Slot) {
        match spec.intrinsic {
            BuiltinIntrinsic::Print => {
                let text = format_value(spec.arg_kind, &self.heap, arg);
                let _ = writeln!(self.out, "{text}");
            }
        }
    }
}

/// Renders a [`Slot`] as `print`/`as string` would, given the primitive kind it holds (the VM has
/// no runtime type tag to recover this from the slot itself - every caller already knows the
/// kind statically). Exposed for `fox-cli`'s `--run`, which prints the entry point's result the
/// same way.
#[must_use]
pub fn format_value(kind: PrimKind, heap: &Heap, slot: Slot) -> String {
    match kind {
        PrimKind::Bool => slot.as_bool().to_string(),
        PrimKind::Int => slot.as_int().to_string(),
        PrimKind::Double => format_double(slot.as_double()),
        PrimKind::Char => slot.as_char().to_string(),
        PrimKind::String => heap.string(slot.as_heap_id()).as_str().to_owned(),
        PrimKind::Void => String::new(),
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_offset(pc: usize, offset: i32) -> usize {
    (i64::try_from(pc).unwrap() + i64::from(offset)) as usize
}

/// Formats a double the way `as string` and `print(double)` both render one: `ryu`'s shortest
/// round-tripping digits, with the exponent reshaped into Fox's `1e+20`/`1e-07`-style convention
/// (ryu alone would emit the bare `1e20`).
fn format_double(v: f64) -> String {
    let mut buf = ryu::Buffer::new();
    let s = buf.format(v);
    let Some(epos) = s.find('e') else { return s.to_owned() };
    let (mantissa, exp) = s.split_at(epos);
    let digits = &exp[1..];
    match digits.strip_prefix('-') {
        Some(d) => format!("{mantissa}e-{d}"),
        None => format!("{mantissa}e+{digits}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{Vm, VmError};
    use crate::{ast::AstContext, bytecode::compile_unit, diagnostic::DiagnosticEngine, lexer::lex, parser::parse_unit, sema, source::SourceManager};

    fn run(src: &str) -> Result<Option<i64>, VmError> {
        let mut sm = SourceManager::new();
        let file = sm.add_buffer("t.fox", src);
        let mut ctx = AstContext::new();
        let mut diags = DiagnosticEngine::default();
        let tokens = lex(&sm, file, &mut ctx.interner, &mut diags);
        let unit = parse_unit(&tokens, &mut ctx, &mut diags).expect("parses");
        sema::analyze(&mut ctx, unit, "main", &mut diags);
        assert!(!diags.has_errors());
        let module = compile_unit(&ctx, unit, &mut diags);
        let mut vm = Vm::with_writer(Box::new(std::io::sink()));
        Ok(vm.run_module(&module)?.map(|s| s.as_int()))
    }

    #[test]
    fn integer_add_returns_three() {
        assert_eq!(run("func main() : int { return 1 + 2; }"), Ok(Some(3)));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        assert_eq!(run("func main() : int { var z : int = 0; return 1 / z; }"), Err(VmError::DivisionByZero));
    }

    #[test]
    fn recursive_call_computes_factorial() {
        let src = "func fact(n : int) : int { if (n <= 1) { return 1; } return n * fact(n - 1); } func main() : int { return fact(5); }";
        assert_eq!(run(src), Ok(Some(120)));
    }

    #[test]
    fn array_index_out_of_bounds_is_a_runtime_error() {
        let src = "func main() : int { let a : [int] = [1, 2]; return a[5]; }";
        assert_eq!(run(src), Err(VmError::IndexOutOfBounds));
    }

    #[test]
    fn global_initializer_value_is_visible_in_main() {
        assert_eq!(run("var x : int = 10; func main() : int { return x + 1; }"), Ok(Some(11)));
    }

    #[test]
    fn while_loop_accumulates() {
        let src = "func main() : int { var i : int = 0; var sum : int = 0; while (i < 5) { sum = sum + i; i = i + 1; } return sum; }";
        assert_eq!(run(src), Ok(Some(10)));
    }

    #[test]
    fn print_writes_formatted_value_to_the_injected_sink() {
        let mut sm = SourceManager::new();
        let file = sm.add_buffer("t.fox", "func main() { print(42); }");
        let mut ctx = AstContext::new();
        let mut diags = DiagnosticEngine::default();
        let tokens = lex(&sm, file, &mut ctx.interner, &mut diags);
        let unit = parse_unit(&tokens, &mut ctx, &mut diags).expect("parses");
        sema::analyze(&mut ctx, unit, "main", &mut diags);
        let module = compile_unit(&ctx, unit, &mut diags);
        let mut buf = Vec::new();
        {
            let mut vm = Vm::with_writer(Box::new(&mut buf));
            vm.run_module(&module).unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "42\n");
    }
}
