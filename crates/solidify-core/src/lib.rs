//! solidify-core: runtime object model (no_std-ready)
//!
//! Provides:
//! - `Value` and the heap objects: `Proto`, `Closure`, `Class`, `Instance`, `List`, `Module`
//! - `Map`: open-addressing table (in-array chains, compaction)
//! - 32-bit instruction words (`Instruction`, `Opcode`) + one-line disassembler
//! - JSON graph loader (`graph::Graph`, feature `serde`)
//!
//! Features:
//! - `std` (default): `std::error::Error` impls
//! - `serde` (default): JSON object-graph loader

#![deny(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

/* ─────────────────────────── Public modules ─────────────────────────── */

pub mod bytecode;
pub mod map;
pub mod value;

#[cfg(feature = "serde")]
pub mod graph;

/// Text disassembler.
pub use bytecode::disasm;

pub use bytecode::{Instruction, Opcode};
pub use map::{Map, MapError, MapNode, LAST_NODE};
pub use value::{
    BStr, Class, Closure, Instance, List, MapRef, Module, NativeClass, Proto, Real, UpvalDesc,
    Value, ValueKind,
};

/// Exclusive upper bound on a constant string's length.
pub const MAX_CONST_STR_LEN: usize = 255;

/* ─────────────────────────── Prelude ─────────────────────────── */

/// Key types of the crate in one import.
pub mod prelude {
    pub use super::{
        BStr, Class, Closure, Instance, Instruction, List, Map, MapRef, Module, Opcode, Proto,
        Real, Value, ValueKind,
    };

    #[cfg(feature = "serde")]
    pub use super::graph::{Graph, GraphError};
}

/* ─────────────────────────── Tests ─────────────────────────── */
