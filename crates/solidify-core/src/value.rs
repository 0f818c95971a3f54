//! Runtime object model: tagged values and the heap objects they point to.
//!
//! Everything here is a read-only view of a frozen object graph. Shared
//! objects are reference counted; maps sit behind a `RefCell` because
//! compaction is the one mutation the solidifier is allowed to perform.

use core::{cell::RefCell, fmt};

#[cfg(not(feature = "std"))]
use alloc::{rc::Rc, string::String, vec::Vec};
#[cfg(feature = "std")]
use std::{rc::Rc, string::String, vec::Vec};

use crate::map::Map;

/// Shared, compactable map handle.
pub type MapRef = Rc<RefCell<Map>>;

/* ─────────────────────────── Byte strings ─────────────────────────── */

/// Byte string as stored by the runtime (not necessarily UTF-8).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BStr(Vec<u8>);

impl BStr {
    /// Wraps raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self { Self(bytes.into()) }
    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] { &self.0 }
    /// Length in bytes.
    pub fn len(&self) -> usize { self.0.len() }
    /// True if empty.
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    /// Lossy UTF-8 view, for diagnostics only.
    pub fn to_string_lossy(&self) -> String { String::from_utf8_lossy(&self.0).into_owned() }
}

impl From<&str> for BStr { fn from(s: &str) -> Self { Self(s.as_bytes().to_vec()) } }
impl From<String> for BStr { fn from(s: String) -> Self { Self(s.into_bytes()) } }
impl From<&[u8]> for BStr { fn from(b: &[u8]) -> Self { Self(b.to_vec()) } }
impl From<Vec<u8>> for BStr { fn from(b: Vec<u8>) -> Self { Self(b) } }

impl fmt::Debug for BStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"{}\"", self.0.escape_ascii())
    }
}

impl fmt::Display for BStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/* ─────────────────────────── Scalars ─────────────────────────── */

/// Floating point payload, in the precision the runtime was built with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Real {
    /// Single-precision build.
    F32(f32),
    /// Double-precision build.
    F64(f64),
}

impl Real {
    /// IEEE bit pattern, zero-extended to 64 bits.
    pub fn to_bits(self) -> u64 {
        match self {
            Real::F32(x) => u64::from(x.to_bits()),
            Real::F64(x) => x.to_bits(),
        }
    }

    /// Widened value.
    pub fn as_f64(self) -> f64 {
        match self {
            Real::F32(x) => f64::from(x),
            Real::F64(x) => x,
        }
    }

    /// True for NaN payloads.
    pub fn is_nan(self) -> bool { self.as_f64().is_nan() }
}

/* ─────────────────────────── Prototypes & closures ─────────────────────────── */

/// Upvalue descriptor: where a closure captures a variable from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalDesc {
    /// Captured from the caller's stack frame (otherwise from its upvalues).
    pub instack: bool,
    /// Stack slot or upvalue index.
    pub idx: u8,
}

/// Static description of a function.
#[derive(Debug, Clone, Default)]
pub struct Proto {
    /// Function name.
    pub name: BStr,
    /// Source file name (not preserved by solidification).
    pub source: BStr,
    /// Number of stack slots.
    pub nstack: u8,
    /// Number of parameters.
    pub argc: u8,
    /// Variadic flags.
    pub varg: u8,
    /// Upvalue descriptors, in capture order.
    pub upvals: Vec<UpvalDesc>,
    /// Nested sub-prototypes, owned by this one.
    pub protos: Vec<Rc<Proto>>,
    /// Constant pool.
    pub consts: Vec<Value>,
    /// Instruction words.
    pub code: Vec<u32>,
}

impl Proto {
    /// Empty prototype with the given name.
    pub fn new(name: impl Into<BStr>) -> Self { Self { name: name.into(), ..Self::default() } }

    /// Sets the instruction stream.
    #[must_use]
    pub fn with_code(mut self, code: Vec<u32>) -> Self { self.code = code; self }

    /// Sets the constant pool.
    #[must_use]
    pub fn with_consts(mut self, consts: Vec<Value>) -> Self { self.consts = consts; self }

    /// Sets the nested prototypes.
    #[must_use]
    pub fn with_protos(mut self, protos: Vec<Rc<Proto>>) -> Self { self.protos = protos; self }

    /// Sets the upvalue descriptors.
    #[must_use]
    pub fn with_upvals(mut self, upvals: Vec<UpvalDesc>) -> Self { self.upvals = upvals; self }

    /// Sets stack size, parameter count and variadic flags.
    #[must_use]
    pub fn with_frame(mut self, nstack: u8, argc: u8, varg: u8) -> Self {
        self.nstack = nstack;
        self.argc = argc;
        self.varg = varg;
        self
    }
}

/// A prototype bound to its captured upvalues.
#[derive(Debug, Clone)]
pub struct Closure {
    /// Function description.
    pub proto: Rc<Proto>,
    /// Number of captured upvalues at runtime.
    pub nupvals: u8,
}

impl Closure {
    /// Closure without captures.
    pub fn new(proto: Rc<Proto>) -> Self { Self { proto, nupvals: 0 } }
}

/* ─────────────────────────── Classes, instances, modules ─────────────────────────── */

/// Built-in container classes of the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeClass {
    /// `map`
    Map,
    /// `list`
    List,
}

/// A class: name, instance-variable count, superclass and members.
pub struct Class {
    /// Class name.
    pub name: BStr,
    /// Number of instance variables.
    pub nvar: u32,
    /// Superclass, declared separately.
    pub superclass: Option<Rc<Class>>,
    /// Member table (methods, static values, nested classes).
    pub members: Option<MapRef>,
    /// Set for the runtime's built-in container classes.
    pub native: Option<NativeClass>,
}

impl Class {
    /// Class without members or superclass.
    pub fn new(name: impl Into<BStr>) -> Self {
        Self { name: name.into(), nvar: 0, superclass: None, members: None, native: None }
    }

    /// The built-in `map` class (one instance variable holding the table).
    pub fn native_map() -> Self {
        Self { nvar: 1, native: Some(NativeClass::Map), ..Self::new("map") }
    }

    /// The built-in `list` class (one instance variable holding the items).
    pub fn native_list() -> Self {
        Self { nvar: 1, native: Some(NativeClass::List), ..Self::new("list") }
    }

    /// Sets the superclass.
    #[must_use]
    pub fn with_super(mut self, superclass: Rc<Class>) -> Self { self.superclass = Some(superclass); self }

    /// Sets the member table.
    #[must_use]
    pub fn with_members(mut self, members: Map) -> Self {
        self.members = Some(Rc::new(RefCell::new(members)));
        self
    }

    /// Sets the instance-variable count.
    #[must_use]
    pub fn with_nvar(mut self, nvar: u32) -> Self { self.nvar = nvar; self }
}

// members may point back at the class through closures' constants
impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("nvar", &self.nvar)
            .field("superclass", &self.superclass.as_ref().map(|s| &s.name))
            .field("native", &self.native)
            .finish_non_exhaustive()
    }
}

/// A class instance.
#[derive(Debug)]
pub struct Instance {
    /// Class of this instance.
    pub class: Rc<Class>,
    /// Superclass part, if the class inherits.
    pub superinst: Option<Rc<Instance>>,
    /// Subclass part, if this is an inner layer.
    pub subinst: Option<Rc<Instance>>,
    /// Instance variables.
    pub members: Vec<Value>,
}

impl Instance {
    /// Stand-alone instance (no super/sub layers).
    pub fn new(class: Rc<Class>, members: Vec<Value>) -> Self {
        Self { class, superinst: None, subinst: None, members }
    }
}

/// Dense, ordered sequence of values.
#[derive(Debug, Clone, Default)]
pub struct List {
    items: Vec<Value>,
}

impl List {
    /// Empty list.
    pub fn new() -> Self { Self::default() }
    /// Appends a value.
    pub fn push(&mut self, v: Value) { self.items.push(v); }
    /// Number of elements.
    pub fn len(&self) -> usize { self.items.len() }
    /// True if empty.
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    /// Elements in order.
    pub fn as_slice(&self) -> &[Value] { &self.items }
    /// Iterates the elements in order.
    pub fn iter(&self) -> core::slice::Iter<'_, Value> { self.items.iter() }
}

impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> Self { Self { items } }
}

/// A module: optional name plus member table.
pub struct Module {
    /// Module name.
    pub name: Option<BStr>,
    /// Member table.
    pub table: Option<MapRef>,
}

impl Module {
    /// Named module with the given members.
    pub fn new(name: impl Into<BStr>, table: Map) -> Self {
        Self { name: Some(name.into()), table: Some(Rc::new(RefCell::new(table))) }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module").field("name", &self.name).finish_non_exhaustive()
    }
}

/* ─────────────────────────── Tagged values ─────────────────────────── */

/// A runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// `nil`
    #[default]
    Nil,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Tagged integer (instance-variable index).
    Index(i64),
    /// Floating point.
    Real(Real),
    /// String.
    Str(BStr),
    /// Script closure; `is_static` marks static class members.
    Closure {
        /// The closure.
        closure: Rc<Closure>,
        /// Static member qualifier.
        is_static: bool,
    },
    /// Class.
    Class(Rc<Class>),
    /// Class instance.
    Instance(Rc<Instance>),
    /// Hash map.
    Map(MapRef),
    /// List.
    List(Rc<List>),
    /// Opaque native pointer.
    ComPtr,
    /// Native function; `is_static` marks static class members.
    NtvFunc {
        /// Static member qualifier.
        is_static: bool,
    },
    /// Module.
    Module(Rc<Module>),
}

impl Value {
    /// String value.
    pub fn str(s: impl Into<BStr>) -> Self { Value::Str(s.into()) }

    /// Non-static closure value.
    pub fn closure(closure: Closure) -> Self {
        Value::Closure { closure: Rc::new(closure), is_static: false }
    }

    /// Static closure value.
    pub fn static_closure(closure: Closure) -> Self {
        Value::Closure { closure: Rc::new(closure), is_static: true }
    }

    /// Map value.
    pub fn map(map: Map) -> Self { Value::Map(Rc::new(RefCell::new(map))) }

    /// List value.
    pub fn list(items: Vec<Value>) -> Self { Value::List(Rc::new(List::from(items))) }

    /// Double-precision real.
    pub fn real(x: f64) -> Self { Value::Real(Real::F64(x)) }

    /// Kind tag, for diagnostics.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Index(_) => ValueKind::Index,
            Value::Real(_) => ValueKind::Real,
            Value::Str(_) => ValueKind::Str,
            Value::Closure { .. } => ValueKind::Closure,
            Value::Class(_) => ValueKind::Class,
            Value::Instance(_) => ValueKind::Instance,
            Value::Map(_) => ValueKind::Map,
            Value::List(_) => ValueKind::List,
            Value::ComPtr => ValueKind::ComPtr,
            Value::NtvFunc { .. } => ValueKind::NtvFunc,
            Value::Module(_) => ValueKind::Module,
        }
    }

    /// True for `nil`.
    pub fn is_nil(&self) -> bool { matches!(self, Value::Nil) }
}

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(i64::from(v)) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::real(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::str(v) } }

/// Kind of a [`Value`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `nil`
    Nil,
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Tagged integer.
    Index,
    /// Floating point.
    Real,
    /// String.
    Str,
    /// Closure.
    Closure,
    /// Class.
    Class,
    /// Instance.
    Instance,
    /// Map.
    Map,
    /// List.
    List,
    /// Native pointer.
    ComPtr,
    /// Native function.
    NtvFunc,
    /// Module.
    Module,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Nil => "nil",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Index => "index",
            ValueKind::Real => "real",
            ValueKind::Str => "string",
            ValueKind::Closure => "closure",
            ValueKind::Class => "class",
            ValueKind::Instance => "instance",
            ValueKind::Map => "map",
            ValueKind::List => "list",
            ValueKind::ComPtr => "comptr",
            ValueKind::NtvFunc => "ntvfunc",
            ValueKind::Module => "module",
        })
    }
}
