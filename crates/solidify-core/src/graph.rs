//! Loader for object graphs described in JSON.
//!
//! Lets the solidifier run without a live VM: a document names classes,
//! prototypes and modules, then gives the root value to dump.
//!
//! ```json
//! {
//!   "builtins": 40,
//!   "classes": { "Foo": { "nvar": 1, "members": [[{"str": "init"}, {"closure": {"proto": "init"}}]] } },
//!   "protos":  { "init": { "name": "init", "nstack": 2, "argc": 1, "code": [...] } },
//!   "root": { "class": "Foo" }
//! }
//! ```

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    io::Read,
    rc::Rc,
};

use serde::Deserialize;
use thiserror::Error;

use crate::map::{Map, MapError};
use crate::value::{Class, Closure, Instance, Module, Proto, Real, UpvalDesc, Value};

/* ─────────────────────────── Errors ─────────────────────────── */

/// Errors raised while loading a graph document.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Malformed JSON or schema mismatch.
    #[error("invalid graph document: {0}")]
    Json(#[from] serde_json::Error),
    /// A value names a class the document does not define.
    #[error("unknown class `{0}`")]
    UnknownClass(String),
    /// A closure or prototype names an undefined prototype id.
    #[error("unknown prototype `{0}`")]
    UnknownProto(String),
    /// A value names an undefined module.
    #[error("unknown module `{0}`")]
    UnknownModule(String),
    /// A class is (transitively) its own superclass.
    #[error("superclass cycle through class `{0}`")]
    SuperclassCycle(String),
    /// A prototype is (transitively) its own sub-prototype.
    #[error("prototype `{0}` contains itself")]
    ProtoCycle(String),
    /// A member table rejected a key.
    #[error("in {context}: {source}")]
    Map {
        /// Where the table was being built.
        context: String,
        /// Rejection reason.
        #[source]
        source: MapError,
    },
}

/* ─────────────────────────── Schema ─────────────────────────── */

type Pairs = Vec<(ValueDesc, ValueDesc)>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(default)]
    builtins: Option<usize>,
    #[serde(default)]
    classes: BTreeMap<String, ClassDesc>,
    #[serde(default)]
    protos: BTreeMap<String, ProtoDesc>,
    #[serde(default)]
    modules: BTreeMap<String, ModuleDesc>,
    root: ValueDesc,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassDesc {
    #[serde(default)]
    nvar: u32,
    #[serde(default, rename = "super")]
    superclass: Option<String>,
    #[serde(default)]
    members: Option<Pairs>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProtoDesc {
    name: String,
    #[serde(default)]
    nstack: u8,
    #[serde(default)]
    argc: u8,
    #[serde(default)]
    varg: u8,
    #[serde(default)]
    upvals: Vec<(bool, u8)>,
    #[serde(default)]
    protos: Vec<String>,
    #[serde(default)]
    consts: Vec<ValueDesc>,
    #[serde(default)]
    code: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModuleDesc {
    #[serde(default)]
    members: Option<Pairs>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ValueDesc {
    Nil,
    Bool(bool),
    Int(i64),
    Index(i64),
    Real(f64),
    Real32(f32),
    Str(String),
    // non UTF-8 strings
    Bytes(Vec<u8>),
    Closure(ClosureDesc),
    Class(String),
    Map(Pairs),
    List(Vec<ValueDesc>),
    Instance(InstanceDesc),
    ComPtr,
    NtvFunc(NtvFuncDesc),
    Module(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClosureDesc {
    proto: String,
    #[serde(default, rename = "static")]
    is_static: bool,
    #[serde(default)]
    upvals: u8,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NtvFuncDesc {
    #[serde(default, rename = "static")]
    is_static: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum InstanceDesc {
    Map(Pairs),
    List(Vec<ValueDesc>),
}

/* ─────────────────────────── Loaded graph ─────────────────────────── */

/// A loaded object graph.
#[derive(Debug)]
pub struct Graph {
    /// Value to dump.
    pub root: Value,
    /// Built-in global count recorded in the document, if any.
    pub builtins: Option<usize>,
    /// Every class, by name.
    pub classes: BTreeMap<String, Rc<Class>>,
    /// Every prototype, by id.
    pub protos: BTreeMap<String, Rc<Proto>>,
    /// Every module, by name.
    pub modules: BTreeMap<String, Rc<Module>>,
}

impl Graph {
    /// Parses and links a JSON document.
    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        let doc: Document = serde_json::from_str(text)?;
        Loader::new(&doc).load()
    }

    /// Reads, parses and links a JSON document.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, GraphError> {
        let doc: Document = serde_json::from_reader(reader)?;
        Loader::new(&doc).load()
    }
}

/* ─────────────────────────── Linking ─────────────────────────── */

struct Loader<'d> {
    doc: &'d Document,
    classes: HashMap<&'d str, Rc<Class>>,
    protos: HashMap<&'d str, Rc<Proto>>,
    modules: HashMap<&'d str, Rc<Module>>,
    // class names or proto ids whose construction is on the stack
    building: Vec<&'d str>,
    map_class: Rc<Class>,
    list_class: Rc<Class>,
}

impl<'d> Loader<'d> {
    fn new(doc: &'d Document) -> Self {
        Self {
            doc,
            classes: HashMap::new(),
            protos: HashMap::new(),
            modules: HashMap::new(),
            building: Vec::new(),
            map_class: Rc::new(Class::native_map()),
            list_class: Rc::new(Class::native_list()),
        }
    }

    fn load(mut self) -> Result<Graph, GraphError> {
        let doc = self.doc;
        // shells first: any value may reference any class or module
        for name in doc.classes.keys() {
            self.class(name)?;
        }
        for (name, desc) in &doc.modules {
            let table = desc.members.as_ref().map(|_| Rc::new(RefCell::new(Map::new())));
            let module = Module { name: Some(name.as_str().into()), table };
            self.modules.insert(name.as_str(), Rc::new(module));
        }
        for id in doc.protos.keys() {
            self.proto(id)?;
        }

        for (name, desc) in &doc.classes {
            let table = self.classes[name.as_str()].members.clone();
            if let (Some(pairs), Some(table)) = (&desc.members, table) {
                let filled = self.map(pairs, &format!("class `{name}`"))?;
                *table.borrow_mut() = filled;
            }
        }
        for (name, desc) in &doc.modules {
            let table = self.modules[name.as_str()].table.clone();
            if let (Some(pairs), Some(table)) = (&desc.members, table) {
                let filled = self.map(pairs, &format!("module `{name}`"))?;
                *table.borrow_mut() = filled;
            }
        }

        let root = self.value(&doc.root)?;
        tracing::debug!(
            classes = self.classes.len(),
            protos = self.protos.len(),
            modules = self.modules.len(),
            root = %root.kind(),
            "graph loaded"
        );
        Ok(Graph {
            root,
            builtins: self.doc.builtins,
            classes: self.classes.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
            protos: self.protos.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
            modules: self.modules.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
        })
    }

    fn class(&mut self, name: &str) -> Result<Rc<Class>, GraphError> {
        if let Some(c) = self.classes.get(name) {
            return Ok(Rc::clone(c));
        }
        let doc = self.doc;
        let (key, desc) = doc
            .classes
            .get_key_value(name)
            .ok_or_else(|| GraphError::UnknownClass(name.to_owned()))?;
        if self.building.contains(&key.as_str()) {
            return Err(GraphError::SuperclassCycle(name.to_owned()));
        }
        self.building.push(key);
        let superclass = desc.superclass.as_deref().map(|s| self.class(s)).transpose();
        self.building.pop();

        let class = Rc::new(Class {
            name: key.as_str().into(),
            nvar: desc.nvar,
            superclass: superclass?,
            members: desc.members.as_ref().map(|_| Rc::new(RefCell::new(Map::new()))),
            native: None,
        });
        self.classes.insert(key, Rc::clone(&class));
        Ok(class)
    }

    fn proto(&mut self, id: &str) -> Result<Rc<Proto>, GraphError> {
        if let Some(p) = self.protos.get(id) {
            return Ok(Rc::clone(p));
        }
        let doc = self.doc;
        let (key, desc) = doc
            .protos
            .get_key_value(id)
            .ok_or_else(|| GraphError::UnknownProto(id.to_owned()))?;
        if self.building.contains(&key.as_str()) {
            return Err(GraphError::ProtoCycle(id.to_owned()));
        }
        self.building.push(key);
        let built = self.build_proto(key, desc);
        self.building.pop();

        let proto = Rc::new(built?);
        self.protos.insert(key, Rc::clone(&proto));
        Ok(proto)
    }

    fn build_proto(&mut self, id: &str, desc: &'d ProtoDesc) -> Result<Proto, GraphError> {
        let protos = desc.protos.iter().map(|p| self.proto(p)).collect::<Result<Vec<_>, _>>()?;
        let consts = desc
            .consts
            .iter()
            .map(|v| self.value_in(v, &format!("prototype `{id}`")))
            .collect::<Result<Vec<_>, _>>()?;
        let upvals = desc.upvals.iter().map(|&(instack, idx)| UpvalDesc { instack, idx }).collect();
        Ok(Proto::new(desc.name.as_str())
            .with_frame(desc.nstack, desc.argc, desc.varg)
            .with_upvals(upvals)
            .with_protos(protos)
            .with_consts(consts)
            .with_code(desc.code.clone()))
    }

    fn map(&mut self, pairs: &'d Pairs, context: &str) -> Result<Map, GraphError> {
        let mut map = Map::new();
        for (k, v) in pairs {
            let key = self.value_in(k, context)?;
            let value = self.value_in(v, context)?;
            map.insert(key, value)
                .map_err(|source| GraphError::Map { context: context.to_owned(), source })?;
        }
        Ok(map)
    }

    fn value(&mut self, desc: &'d ValueDesc) -> Result<Value, GraphError> { self.value_in(desc, "root") }

    fn value_in(&mut self, desc: &'d ValueDesc, context: &str) -> Result<Value, GraphError> {
        Ok(match desc {
            ValueDesc::Nil => Value::Nil,
            ValueDesc::Bool(b) => Value::Bool(*b),
            ValueDesc::Int(i) => Value::Int(*i),
            ValueDesc::Index(i) => Value::Index(*i),
            ValueDesc::Real(x) => Value::Real(Real::F64(*x)),
            ValueDesc::Real32(x) => Value::Real(Real::F32(*x)),
            ValueDesc::Str(s) => Value::str(s.as_str()),
            ValueDesc::Bytes(b) => Value::str(b.as_slice()),
            ValueDesc::Closure(c) => {
                let closure = Closure { proto: self.proto(&c.proto)?, nupvals: c.upvals };
                Value::Closure { closure: Rc::new(closure), is_static: c.is_static }
            }
            ValueDesc::Class(name) => Value::Class(self.class(name)?),
            ValueDesc::Map(pairs) => Value::map(self.map(pairs, context)?),
            ValueDesc::List(items) => Value::list(
                items.iter().map(|v| self.value_in(v, context)).collect::<Result<_, _>>()?,
            ),
            ValueDesc::Instance(InstanceDesc::Map(pairs)) => {
                let member = Value::map(self.map(pairs, context)?);
                Value::Instance(Rc::new(Instance::new(Rc::clone(&self.map_class), vec![member])))
            }
            ValueDesc::Instance(InstanceDesc::List(items)) => {
                let member = Value::list(
                    items.iter().map(|v| self.value_in(v, context)).collect::<Result<_, _>>()?,
                );
                Value::Instance(Rc::new(Instance::new(Rc::clone(&self.list_class), vec![member])))
            }
            ValueDesc::ComPtr => Value::ComPtr,
            ValueDesc::NtvFunc(f) => Value::NtvFunc { is_static: f.is_static },
            ValueDesc::Module(name) => Value::Module(
                self.modules.get(name.as_str()).cloned().ok_or_else(|| GraphError::UnknownModule(name.clone()))?,
            ),
        })
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"{
        "builtins": 12,
        "classes": {
            "Base": { "nvar": 0, "members": [] },
            "Led":  {
                "nvar": 2,
                "super": "Base",
                "members": [
                    [{"str": "init"}, {"closure": {"proto": "init"}}],
                    [{"str": "count"}, {"int": 3}],
                    [{"str": "mk"}, {"closure": {"proto": "mk", "static": true}}]
                ]
            }
        },
        "protos": {
            "init": { "name": "init", "nstack": 3, "argc": 2, "code": [1275068416] },
            "mk":   { "name": "mk", "protos": ["inner"], "consts": [{"class": "Led"}, {"real": 1.5}] },
            "inner": { "name": "inner", "upvals": [[true, 1]] }
        },
        "root": { "class": "Led" }
    }"#;

    #[test]
    fn links_classes_and_protos() {
        let g = Graph::from_json(DOC).unwrap();
        assert_eq!(g.builtins, Some(12));
        let Value::Class(led) = &g.root else { panic!("root is {:?}", g.root.kind()) };
        assert_eq!(led.name.to_string(), "Led");
        assert_eq!(led.nvar, 2);
        assert!(Rc::ptr_eq(led.superclass.as_ref().unwrap(), &g.classes["Base"]));

        let members = led.members.as_ref().unwrap().borrow();
        assert_eq!(members.len(), 3);
        let Some(Value::Closure { closure, is_static }) = members.get(&Value::str("mk")) else {
            panic!("mk is not a closure")
        };
        assert!(*is_static);
        assert_eq!(closure.proto.protos.len(), 1);
        assert_eq!(closure.proto.protos[0].upvals, vec![UpvalDesc { instack: true, idx: 1 }]);
        // the class constant points back at the same class object
        assert!(matches!(&closure.proto.consts[0], Value::Class(c) if Rc::ptr_eq(c, led)));
        assert!(matches!(closure.proto.consts[1], Value::Real(Real::F64(x)) if x == 1.5));
        assert_eq!(g.protos["init"].code, vec![0x4C00_0000]);
    }

    #[test]
    fn instances_wrap_native_containers() {
        let g = Graph::from_json(
            r#"{ "root": { "list": [ {"instance": {"map": [[{"int": 1}, "nil"]]}},
                                     {"instance": {"list": ["comptr", {"ntvfunc": {}}]}} ] } }"#,
        )
        .unwrap();
        let Value::List(items) = &g.root else { panic!("root is not a list") };
        let Value::Instance(a) = &items.as_slice()[0] else { panic!("not an instance") };
        assert_eq!(a.class.name.to_string(), "map");
        assert!(matches!(a.members.as_slice(), [Value::Map(_)]));
        let Value::Instance(b) = &items.as_slice()[1] else { panic!("not an instance") };
        assert!(matches!(b.members.as_slice(), [Value::List(l)] if l.len() == 2));
    }

    #[test]
    fn modules_resolve_by_name() {
        let g = Graph::from_json(
            r#"{ "modules": { "gpio": { "members": [[{"str": "pin"}, {"int": 4}]] } },
                 "root": { "module": "gpio" } }"#,
        )
        .unwrap();
        let Value::Module(m) = &g.root else { panic!("root is not a module") };
        assert_eq!(m.name.as_ref().unwrap().to_string(), "gpio");
        assert_eq!(m.table.as_ref().unwrap().borrow().len(), 1);
    }

    #[test]
    fn reports_link_errors() {
        let err = Graph::from_json(r#"{ "root": { "class": "Nope" } }"#).unwrap_err();
        assert!(matches!(err, GraphError::UnknownClass(ref n) if n == "Nope"));

        let err = Graph::from_json(
            r#"{ "classes": { "A": { "super": "B" }, "B": { "super": "A" } }, "root": "nil" }"#,
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::SuperclassCycle(_)));

        let err = Graph::from_json(
            r#"{ "protos": { "f": { "name": "f", "protos": ["f"] } }, "root": "nil" }"#,
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::ProtoCycle(ref n) if n == "f"));

        let err = Graph::from_json(r#"{ "root": { "map": [["nil", {"int": 1}]] } }"#).unwrap_err();
        assert!(matches!(err, GraphError::Map { source: MapError::NilKey, .. }));
        assert_eq!(err.to_string(), "in root: map key cannot be nil");

        assert!(matches!(Graph::from_json("{}"), Err(GraphError::Json(_))));
    }
}
