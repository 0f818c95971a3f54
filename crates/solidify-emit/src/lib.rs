//! solidify-emit: runtime objects → constant C declarations
//!
//! - Input: a root `Value` (closure, class or module) from `solidify_core`
//! - Output: C text (`be_local_closure`, `be_local_class`, `be_local_module`… macros)
//!   streamed into a `std::io::Write`
//! - Validation: map keys, instance shape, string length,
//!   non-builtin globals, closures with upvalues
//!
//! An error stops the dump: whatever was already written is truncated and
//! must be discarded.
//!
//! ```
//! use std::rc::Rc;
//! use solidify_core::{Closure, Proto, Value};
//! use solidify_emit::{dump_to_string, DumpOptions};
//!
//! let hello = Value::closure(Closure::new(Rc::new(Proto::new("hello"))));
//! let c = dump_to_string(&hello, &DumpOptions::new().literal(true)).unwrap();
//! assert!(c.contains("be_local_closure(hello,   /* name */"));
//! assert!(c.contains("be_str_literal(\"hello\"),"));
//! ```

#![deny(missing_docs)]

use std::{collections::HashSet, io::Write};

use solidify_core::{Class, Value};

mod class;
mod closure;
mod module;
mod proto;
mod value;

pub mod encode;
pub mod error;
pub mod options;

pub use error::{Result, SolidifyError};
pub use options::{DumpOptions, DEFAULT_MAX_DEPTH};

/* ─────────────────────────── Banners ─────────────────────────── */

const BANNER_OPEN: &str = "/********************************************************************\n";
const BANNER_CLOSE: &str = "********************************************************************/\n";
const DECL_END: &str = "/*******************************************************************/\n\n";
const MODULE_END: &str = "/********************************************************************/\n";

// name shown inside a banner comment; `*/` would close it
fn banner_name(bytes: &[u8]) -> String { String::from_utf8_lossy(bytes).replace("*/", "* /") }

/* ─────────────────────────── Solidifier ─────────────────────────── */

/// Streams the C form of one object graph into a writer.
pub struct Solidifier<W: Write> {
    out: W,
    opts: DumpOptions,
    // classes declared (or being declared) during the current dump
    declared: HashSet<*const Class>,
    // declarations still open, and those already forward-declared
    pending: HashSet<*const Class>,
    forwarded: HashSet<*const Class>,
    depth: usize,
}

impl<W: Write> Solidifier<W> {
    /// Wraps a sink.
    pub fn new(out: W, opts: DumpOptions) -> Self {
        Self {
            out,
            opts,
            declared: HashSet::new(),
            pending: HashSet::new(),
            forwarded: HashSet::new(),
            depth: 0,
        }
    }

    /// Options in effect.
    pub fn options(&self) -> &DumpOptions { &self.opts }

    /// Dumps one root: a closure, a class (with its loader) or a module.
    pub fn dump(&mut self, root: &Value) -> Result<()> {
        self.declared.clear();
        self.pending.clear();
        self.forwarded.clear();
        self.depth = 0;
        tracing::debug!(root = %root.kind(), literal = self.opts.literal, builtins = self.opts.builtins, "dump");
        match root {
            Value::Closure { closure, .. } => self.closure(closure, None)?,
            Value::Class(class) => self.class(class)?,
            Value::Module(module) => self.module(module)?,
            other => return Err(SolidifyError::UnsupportedRoot { kind: other.kind() }),
        }
        self.out.flush()?;
        Ok(())
    }

    /// Gives the sink back.
    pub fn into_inner(self) -> W { self.out }

    // string text in the active encoding
    fn text(&self, bytes: &[u8]) -> String {
        if self.opts.literal { encode::to_literal(bytes) } else { encode::to_identifier(bytes) }
    }

    // runs `f` one nesting level deeper
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.opts.max_depth {
            return Err(SolidifyError::TooDeep { limit: self.opts.max_depth });
        }
        self.depth += 1;
        let r = f(self);
        self.depth -= 1;
        r
    }
}

/// Dumps `root` into `out`.
pub fn dump<W: Write>(root: &Value, opts: &DumpOptions, out: W) -> Result<()> {
    Solidifier::new(out, *opts).dump(root)
}

/// Dumps `root` into a string.
pub fn dump_to_string(root: &Value, opts: &DumpOptions) -> Result<String> {
    let mut buf = Vec::new();
    dump(root, opts, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use solidify_core::{Closure, Map, Module, Proto, ValueKind};
    use std::rc::Rc;

    #[test]
    fn banners_have_runtime_widths() {
        assert_eq!(BANNER_OPEN.matches('*').count(), 68);
        assert_eq!(BANNER_CLOSE.matches('*').count(), 68);
        assert_eq!(DECL_END.matches('*').count(), 67);
        assert_eq!(MODULE_END.matches('*').count(), 68);
    }

    #[test]
    fn rejects_other_roots() {
        for root in [Value::Int(1), Value::list(vec![]), Value::map(Map::new()), Value::Nil] {
            let kind = root.kind();
            let err = dump_to_string(&root, &DumpOptions::new()).unwrap_err();
            assert!(matches!(err, SolidifyError::UnsupportedRoot { kind: k } if k == kind));
            assert!(err.is_input_error());
        }
    }

    #[test]
    fn dumps_each_root_kind() {
        let f = Value::closure(Closure::new(Rc::new(Proto::new("f"))));
        assert!(dump_to_string(&f, &DumpOptions::new()).unwrap().contains("be_local_closure(f,"));

        let c = Value::Class(Rc::new(Class::new("C")));
        assert!(dump_to_string(&c, &DumpOptions::new()).unwrap().contains("be_local_class(C,"));

        let m = Value::Module(Rc::new(Module::new("m", Map::new())));
        assert!(dump_to_string(&m, &DumpOptions::new()).unwrap().contains("be_local_module(m,"));
    }

    #[test]
    fn depth_limit_applies() {
        let mut v = Value::list(vec![]);
        for _ in 0..10 {
            v = Value::list(vec![v]);
        }
        let f = Proto::new("deep").with_consts(vec![v]);
        let root = Value::closure(Closure::new(Rc::new(f)));
        let err = dump_to_string(&root, &DumpOptions::new().max_depth(8)).unwrap_err();
        assert!(matches!(err, SolidifyError::TooDeep { limit: 8 }));
        assert!(dump_to_string(&root, &DumpOptions::new()).is_ok());
        assert_eq!(root.kind(), ValueKind::Closure);
    }

    #[test]
    fn solidifier_is_reusable() {
        let f = Value::closure(Closure::new(Rc::new(Proto::new("f"))));
        let mut s = Solidifier::new(Vec::new(), DumpOptions::new());
        s.dump(&f).unwrap();
        s.dump(&f).unwrap();
        let text = String::from_utf8(s.into_inner()).unwrap();
        assert_eq!(text.matches("be_local_closure(f,").count(), 2);
    }
}
