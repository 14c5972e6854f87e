//! Bytecode representation and the compiler that lowers a checked AST into it (spec §4.3/§4.4).
//!
//! # Module structure
//!
//! - `op` - the opcode catalogue and its five operand layouts
//! - `code` - `Instr`, constant pools, `BCFunction`, `BCModule`
//! - `builder` - `BCBuilder`, emitting instructions with jump-patching handles
//! - `compiler` - the AST-to-bytecode lowering passes (`StmtGen`/`ExprGen`)
//! - `dump` - the deterministic text dump format (spec §6.4)

pub use builder::{BCBuilder, InstrId};
pub use code::{BCFunction, BCModule, BuiltinCallSpec, ConstPool, ConstPools, Instr, OrderedDouble};
pub use compiler::compile_unit;
pub use dump::dump_module;
pub use op::{Layout, Opcode};

mod builder;
mod code;
mod compiler;
mod dump;
mod op;
