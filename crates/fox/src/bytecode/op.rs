//! The opcode catalogue (spec §4.3) and the five fixed 32-bit operand layouts.

/// Which fields of an [`Instr`](super::code::Instr) an opcode's operands occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// 3 x 8-bit register addresses: `dest, lhs, rhs`.
    Ternary,
    /// 2 x 8-bit register addresses: `dest, src`.
    SmallBinary,
    /// 8-bit dest register + 16-bit signed immediate.
    Binary,
    /// 24-bit signed immediate only (e.g. a jump offset).
    Unary,
    /// No meaningful payload.
    Nullary,
}

macro_rules! opcodes {
    ($($name:ident => $layout:expr),+ $(,)?) => {
        /// One bytecode operation (spec §4.3's catalogue).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize, serde::Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $($name),+
        }

        impl Opcode {
            #[must_use]
            pub fn layout(self) -> Layout {
                match self {
                    $(Self::$name => $layout),+
                }
            }
        }
    };
}

opcodes! {
    NoOp => Layout::Nullary,

    // Constant/value loads.
    StoreSmallInt => Layout::Binary,
    LoadIntK => Layout::Binary,
    LoadDoubleK => Layout::Binary,
    LoadStringK => Layout::Binary,
    LoadBuiltinFunc => Layout::Binary,
    LoadFunc => Layout::Binary,
    /// Reads global variable slot #`imm16` into `dest`. Not in spec §4.3's literal catalogue
    /// list but covered by its "non-exhaustive... implementers must cover all forms required"
    /// clause: global storage needs a load/store pair since the register window is per-call.
    LoadGlobal => Layout::Binary,
    /// Writes `dest`'s register into global variable slot #`imm16` (operand name kept as
    /// `dest` for symmetry with `LoadGlobal`; here it names the source register).
    StoreGlobal => Layout::Binary,

    // Arithmetic, specialized by operand type (spec §4.4).
    AddInt => Layout::Ternary,
    AddDouble => Layout::Ternary,
    ConcatString => Layout::Ternary,
    SubInt => Layout::Ternary,
    SubDouble => Layout::Ternary,
    MulInt => Layout::Ternary,
    MulDouble => Layout::Ternary,
    DivInt => Layout::Ternary,
    DivDouble => Layout::Ternary,
    ModInt => Layout::Ternary,
    PowInt => Layout::Ternary,
    PowDouble => Layout::Ternary,

    // Comparisons, one family per comparable primitive kind.
    LtInt => Layout::Ternary,
    LtDouble => Layout::Ternary,
    LeInt => Layout::Ternary,
    LeDouble => Layout::Ternary,
    GtInt => Layout::Ternary,
    GtDouble => Layout::Ternary,
    GeInt => Layout::Ternary,
    GeDouble => Layout::Ternary,
    EqInt => Layout::Ternary,
    EqDouble => Layout::Ternary,
    EqChar => Layout::Ternary,
    EqBool => Layout::Ternary,
    EqString => Layout::Ternary,
    NeInt => Layout::Ternary,
    NeDouble => Layout::Ternary,
    NeChar => Layout::Ternary,
    NeBool => Layout::Ternary,
    NeString => Layout::Ternary,

    // Logical and unary.
    LAnd => Layout::Ternary,
    LOr => Layout::Ternary,
    LNot => Layout::SmallBinary,
    NegInt => Layout::SmallBinary,
    NegDouble => Layout::SmallBinary,

    // Casts.
    IntToDouble => Layout::SmallBinary,
    DoubleToInt => Layout::SmallBinary,
    BoolToInt => Layout::SmallBinary,
    BoolToDouble => Layout::SmallBinary,
    IntToBool => Layout::SmallBinary,
    DoubleToBool => Layout::SmallBinary,
    CharToString => Layout::SmallBinary,
    /// `char(s)`: the typing table permits string<->char in both directions (spec §4.2); the
    /// reverse of `CharToString` has no catalogue entry of its own to reuse, so it gets one. A
    /// runtime error (not a diagnostic - this is a cast the type checker already accepted) is
    /// raised if the string's length in code points isn't exactly 1.
    StringToChar => Layout::SmallBinary,

    // Register/control flow.
    Copy => Layout::SmallBinary,
    /// Unconditional jump; operand is a signed instruction-count offset (spec §4.3).
    Jump => Layout::Unary,
    /// Conditional jumps pair a condition register with a 16-bit offset, so they use the
    /// `Binary` layout rather than `Unary` (spec §4.3's layout table covers the unconditional
    /// case explicitly; conditional jumps need a register operand too).
    JumpIf => Layout::Binary,
    JumpIfNot => Layout::Binary,
    Call => Layout::SmallBinary,
    Ret => Layout::SmallBinary,
    RetVoid => Layout::Nullary,

    // Arrays.
    NewArray => Layout::SmallBinary,
    ArrayGet => Layout::Ternary,
    ArraySet => Layout::Ternary,
    ArrayLen => Layout::SmallBinary,
    ArrayPush => Layout::SmallBinary,
    StringLen => Layout::SmallBinary,
}
