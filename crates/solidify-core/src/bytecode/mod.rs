//! Bytecode helpers: fixed-width instruction words and their textual form.
//!
//! The solidifier only needs two things from the instruction stream: the
//! global-variable operand of `GETGBL`/`SETGBL` (to validate it against the
//! built-in globals) and a one-line disassembly for audit comments.

/// Opcodes and instruction-word field accessors.
pub mod instr;
/// Human-readable disassembly.
pub mod disasm;

pub use instr::{Instruction, Opcode};
