//! Dump options.

/// Default nesting limit for values and prototypes.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Everything a dump depends on besides the root value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpOptions {
    /// Emit strings as quoted literals instead of interned-string identifiers.
    pub literal: bool,
    /// Number of built-in globals; `GETGBL`/`SETGBL` operands above it are rejected.
    pub builtins: usize,
    /// Maximum nesting of values and sub-prototypes.
    pub max_depth: usize,
}

impl Default for DumpOptions {
    fn default() -> Self { Self { literal: false, builtins: 0, max_depth: DEFAULT_MAX_DEPTH } }
}

impl DumpOptions {
    /// Identifier mode, no built-ins, default depth.
    pub fn new() -> Self { Self::default() }

    /// Selects literal (`true`) or identifier (`false`) string encoding.
    #[must_use]
    pub fn literal(mut self, literal: bool) -> Self { self.literal = literal; self }

    /// Sets the built-in global count.
    #[must_use]
    pub fn builtins(mut self, builtins: usize) -> Self { self.builtins = builtins; self }

    /// Sets the nesting limit.
    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self { self.max_depth = max_depth; self }
}
