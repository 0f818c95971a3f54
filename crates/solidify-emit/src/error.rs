//! Solidifier errors.

use std::io;

use solidify_core::ValueKind;
use thiserror::Error;

/// Fatal dump errors. Output written before the error is truncated and must be discarded.
#[derive(Debug, Error)]
pub enum SolidifyError {
    /// Map key other than a string or an integer.
    #[error("unsupported type in key: {kind}")]
    UnsupportedKey {
        /// Kind of the offending key.
        kind: ValueKind,
    },

    /// Constant string of 255 bytes or more.
    #[error("strings of 255 bytes or more are not supported (got {len} bytes: {preview:?}…)")]
    StringTooLong {
        /// Length in bytes.
        len: usize,
        /// First bytes, lossily decoded.
        preview: String,
    },

    /// Instance other than a one-variable wrapper of the built-in map or list.
    #[error("unsupported instance: {reason}")]
    BadInstance {
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Value kind that has no constant form.
    #[error("unsupported type in function constants: {kind}")]
    UnsupportedValue {
        /// Kind of the value.
        kind: ValueKind,
    },

    /// `GETGBL`/`SETGBL` on a global that is not a built-in.
    #[error("unsupported access to non-builtin global G{index} in `{proto}` at pc {pc:04X} ({builtins} builtins)")]
    NonBuiltinGlobal {
        /// Derived name of the prototype.
        proto: String,
        /// Instruction offset.
        pc: usize,
        /// Global slot.
        index: u32,
        /// Built-in global count in effect.
        builtins: usize,
    },

    /// Closure capturing upvalues.
    #[error("closure `{name}` captures {count} upvalue(s) and cannot be solidified")]
    CapturedUpvalues {
        /// Prototype name.
        name: String,
        /// Number of captures.
        count: u8,
    },

    /// Root value is not a closure, class or module.
    #[error("unsupported root type: {kind} (expected closure, class or module)")]
    UnsupportedRoot {
        /// Kind of the root.
        kind: ValueKind,
    },

    /// Map reached again while it is being serialized.
    #[error("map contains itself")]
    Cyclic,

    /// Nesting beyond the configured limit.
    #[error("value nesting exceeds {limit} levels")]
    TooDeep {
        /// Configured limit.
        limit: usize,
    },

    /// Output sink failure.
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl SolidifyError {
    /// True for errors caused by the object graph (as opposed to the output sink).
    pub fn is_input_error(&self) -> bool { !matches!(self, SolidifyError::Io(_)) }
}

/// Solidifier result.
pub type Result<T> = std::result::Result<T, SolidifyError>;
