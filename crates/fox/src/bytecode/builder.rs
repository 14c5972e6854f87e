//! Emits instructions into a [`BCFunction`], tracking stable per-instruction handles so jump
//! offsets can be patched once their target is known (spec §4.3).

use crate::{
    diagnostic::{DiagId, DiagnosticEngine},
    source::SourceRange,
};

use super::{
    code::{BCFunction, Instr},
    op::Opcode,
};

/// A stable, index-based reference to an instruction appended through this builder. Patched
/// relative to the instruction that follows it (spec §4.3: "offset 0 = fall-through").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrId(usize);

/// Wraps a [`BCFunction`] under construction. Every `create*` method is a thin wrapper around
/// [`Instr`]'s constructors that also records the instruction's index for later patching.
pub struct BCBuilder<'a> {
    func: &'a mut BCFunction,
}

impl<'a> BCBuilder<'a> {
    #[must_use]
    pub fn new(func: &'a mut BCFunction) -> Self {
        Self { func }
    }

    fn push(&mut self, instr: Instr) -> InstrId {
        self.func.instrs.push(instr);
        self.func.debug_ranges.push(None);
        InstrId(self.func.instrs.len() - 1)
    }

    pub fn create_nullary(&mut self, op: Opcode) -> InstrId {
        self.push(Instr::nullary(op))
    }

    pub fn create_ternary(&mut self, op: Opcode, dest: u8, lhs: u8, rhs: u8) -> InstrId {
        self.push(Instr::ternary(op, dest, lhs, rhs))
    }

    pub fn create_small_binary(&mut self, op: Opcode, dest: u8, src: u8) -> InstrId {
        self.push(Instr::small_binary(op, dest, src))
    }

    pub fn create_binary(&mut self, op: Opcode, dest: u8, value: i16) -> InstrId {
        self.push(Instr::binary(op, dest, value))
    }

    /// Emits an unconditional placeholder jump (offset 0), patched later via
    /// [`patch_jump`](Self::patch_jump).
    pub fn create_jump(&mut self) -> InstrId {
        self.push(Instr::unary(Opcode::Jump, 0))
    }

    /// Emits an unconditional jump whose target is already known (spec §4.4's `WhileStmt`
    /// backward jump to the loop's top).
    pub fn create_jump_to(&mut self, target: InstrId, diags: &mut DiagnosticEngine, at: SourceRange) -> InstrId {
        let id = self.create_jump();
        self.patch_jump(id, target, diags, at);
        id
    }

    /// Emits a placeholder conditional jump (`op` must be `JumpIf`/`JumpIfNot`) testing
    /// `cond_reg`, patched later via [`patch_jump`](Self::patch_jump).
    pub fn create_cond_jump(&mut self, op: Opcode, cond_reg: u8) -> InstrId {
        debug_assert!(matches!(op, Opcode::JumpIf | Opcode::JumpIfNot));
        self.push(Instr::binary(op, cond_reg, 0))
    }

    /// Flips a not-yet-patched conditional jump between `JumpIf` and `JumpIfNot`, keeping its
    /// condition register. Used by the empty-then peephole (spec §4.4).
    pub fn negate_cond_jump(&mut self, id: InstrId) {
        let instr = self.func.instrs[id.0];
        let (cond_reg, offset) = instr.as_binary();
        let negated = match instr.op {
            Opcode::JumpIf => Opcode::JumpIfNot,
            Opcode::JumpIfNot => Opcode::JumpIf,
            _ => unreachable!("negate_cond_jump called on a non-conditional-jump instruction"),
        };
        self.func.instrs[id.0] = Instr::binary(negated, cond_reg, offset);
    }

    /// Whether `id` refers to the most recently appended instruction.
    #[must_use]
    pub fn is_last_instr(&self, id: InstrId) -> bool {
        id.0 + 1 == self.func.instrs.len()
    }

    /// Drops the most recently appended instruction.
    ///
    /// # Panics
    /// Panics if the function has no instructions.
    pub fn pop_instr(&mut self) {
        assert!(self.func.instrs.pop().is_some(), "pop_instr called on an empty function");
        self.func.debug_ranges.pop();
    }

    /// Drops `id` and every instruction appended after it.
    pub fn truncate_instrs(&mut self, id: InstrId) {
        self.func.instrs.truncate(id.0);
        self.func.debug_ranges.truncate(id.0);
    }

    pub fn add_debug_range(&mut self, id: InstrId, range: SourceRange) {
        self.func.debug_ranges[id.0] = Some(range);
    }

    /// The instruction index that would be assigned to the next instruction appended; the
    /// conventional "top of loop" marker for backward jumps (spec §4.4's `WhileStmt` lowering).
    #[must_use]
    pub fn next_index(&self) -> InstrId {
        InstrId(self.func.instrs.len())
    }

    /// Patches the jump at `jump` to target `target`, computing the signed offset relative to
    /// the instruction after `jump` (spec §4.3). Reports [`DiagId::JumpOffsetOverflow`] and
    /// leaves the instruction unpatched if the offset doesn't fit the accepted 16-bit signed
    /// range (spec §8.1, see the comment on [`Instr::unary`](super::code::Instr::unary)).
    pub fn patch_jump(&mut self, jump: InstrId, target: InstrId, diags: &mut DiagnosticEngine, at: SourceRange) {
        let offset = i64::try_from(target.0).unwrap() - i64::try_from(jump.0 + 1).unwrap();
        let Ok(offset16) = i16::try_from(offset) else {
            diags.report(DiagId::JumpOffsetOverflow, at);
            return;
        };
        let instr = self.func.instrs[jump.0];
        self.func.instrs[jump.0] = match instr.op.layout() {
            super::op::Layout::Unary => Instr::unary(instr.op, i32::from(offset16)),
            super::op::Layout::Binary => {
                let (dest, _) = instr.as_binary();
                Instr::binary(instr.op, dest, offset16)
            }
            _ => unreachable!("patch_jump called on a non-jump instruction"),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::BCBuilder;
    use crate::{
        bytecode::code::BCFunction,
        bytecode::op::Opcode,
        diagnostic::DiagnosticEngine,
        source::SourceRange,
    };

    #[test]
    fn patch_jump_computes_fallthrough_relative_offset() {
        let mut func = BCFunction::new("f".to_owned());
        let mut diags = DiagnosticEngine::default();
        let mut b = BCBuilder::new(&mut func);
        let jump = b.create_cond_jump(Opcode::JumpIfNot, 0);
        b.create_nullary(Opcode::NoOp);
        let target = b.next_index();
        b.patch_jump(jump, target, &mut diags, SourceRange::dummy());
        assert!(diags.diagnostics().is_empty());
        let (_, offset) = func.instrs[0].as_binary();
        assert_eq!(offset, 1);
    }

    #[test]
    fn truncate_drops_trailing_instructions() {
        let mut func = BCFunction::new("f".to_owned());
        let mut b = BCBuilder::new(&mut func);
        b.create_nullary(Opcode::NoOp);
        let mark = b.next_index();
        b.create_nullary(Opcode::RetVoid);
        b.truncate_instrs(mark);
        assert_eq!(func.instrs.len(), 1);
    }
}
