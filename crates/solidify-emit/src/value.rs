//! Constant expressions for values, maps and lists.

use std::io::Write;

use solidify_core::{Instance, List, MapRef, NativeClass, Real, Value, MAX_CONST_STR_LEN};

use crate::encode::to_identifier;
use crate::{Result, SolidifyError, Solidifier};

/// Enclosing names used for closure symbols and native references.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Scope<'a> {
    /// Identifier-encoded class or module name.
    pub class: Option<&'a str>,
    /// Member key the value was found under.
    pub key: Option<&'a [u8]>,
}

impl<'a> Scope<'a> {
    pub(crate) fn class(class: Option<&'a str>) -> Self { Self { class, key: None } }

    fn with_key(self, key: Option<&'a [u8]>) -> Self { Self { key, ..self } }

    // `be_ntv_<class>_<key>`, either part falling back to `unknown`
    fn native_symbol(self) -> String {
        let class = self.class.filter(|c| !c.is_empty()).unwrap_or("unknown");
        let key = self.key.filter(|k| !k.is_empty()).map_or_else(|| "unknown".to_owned(), to_identifier);
        format!("be_ntv_{class}_{key}")
    }

    fn closure_prefix(self) -> String { self.class.map(|c| format!("{c}_")).unwrap_or_default() }
}

fn static_prefix(is_static: bool) -> &'static str { if is_static { "static_" } else { "" } }

impl<W: Write> Solidifier<W> {
    pub(crate) fn value(&mut self, value: &Value, scope: Scope<'_>) -> Result<()> {
        self.nested(|s| s.value_inner(value, scope))
    }

    fn value_inner(&mut self, value: &Value, scope: Scope<'_>) -> Result<()> {
        match value {
            Value::Nil => write!(self.out, "be_const_nil()")?,
            Value::Bool(b) => write!(self.out, "be_const_bool({})", u8::from(*b))?,
            Value::Int(i) => write!(self.out, "be_const_int({i})")?,
            Value::Index(i) => write!(self.out, "be_const_var({i})")?,
            Value::Real(Real::F64(x)) => write!(self.out, "be_const_real_hex(0x{:016x})", x.to_bits())?,
            Value::Real(Real::F32(x)) => write!(self.out, "be_const_real_hex(0x{:08X})", x.to_bits())?,
            Value::Str(s) => {
                if s.len() >= MAX_CONST_STR_LEN {
                    let head = &s.as_bytes()[..32];
                    return Err(SolidifyError::StringTooLong {
                        len: s.len(),
                        preview: String::from_utf8_lossy(head).into_owned(),
                    });
                }
                let text = self.text(s.as_bytes());
                if self.opts.literal {
                    write!(self.out, "be_nested_str_literal(\"{text}\")")?;
                } else {
                    write!(self.out, "be_nested_str({text})")?;
                }
            }
            Value::Closure { closure, is_static } => write!(
                self.out,
                "be_const_{}closure({}{}_closure)",
                static_prefix(*is_static),
                scope.closure_prefix(),
                to_identifier(closure.proto.name.as_bytes())
            )?,
            Value::Class(class) => {
                write!(self.out, "be_const_class(be_class_{})", to_identifier(class.name.as_bytes()))?;
            }
            Value::ComPtr => write!(self.out, "be_const_comptr(&{})", scope.native_symbol())?,
            Value::NtvFunc { is_static } => {
                write!(self.out, "be_const_{}func({})", static_prefix(*is_static), scope.native_symbol())?;
            }
            Value::Instance(instance) => self.instance(instance, scope)?,
            Value::Map(map) => self.map(map, scope.class)?,
            Value::List(list) => self.list(list, scope.class)?,
            Value::Module(_) => return Err(SolidifyError::UnsupportedValue { kind: value.kind() }),
        }
        Ok(())
    }

    fn instance(&mut self, instance: &Instance, scope: Scope<'_>) -> Result<()> {
        let bad = |reason| Err(SolidifyError::BadInstance { reason });
        if instance.superinst.is_some() || instance.subinst.is_some() {
            return bad("instance must not have a super/sub class");
        }
        if instance.class.nvar != 1 || instance.members.len() != 1 {
            return bad("instance must have only one instance variable");
        }
        let member = &instance.members[0];
        let (class, ctor) = match (instance.class.native, member) {
            (Some(NativeClass::Map), Value::Map(_)) => ("map", "be_const_map"),
            (Some(NativeClass::List), Value::List(_)) => ("list", "be_const_list"),
            (None, _) => return bad("instance class must be the built-in map or list"),
            _ => return bad("instance variable does not match its built-in class"),
        };
        write!(self.out, "be_const_simple_instance(be_nested_simple_instance(&be_class_{class}, {{\n")?;
        write!(self.out, "        {ctor}( * ")?;
        self.value(member, scope)?;
        write!(self.out, "    ) }} ))")?;
        Ok(())
    }

    /// Compacts then emits a map; `class` names native members and closures.
    pub(crate) fn map(&mut self, map: &MapRef, class: Option<&str>) -> Result<()> {
        map.try_borrow_mut().map_err(|_| SolidifyError::Cyclic)?.compact();
        let table = map.try_borrow().map_err(|_| SolidifyError::Cyclic)?;

        writeln!(self.out, "    be_nested_map({},", table.len())?;
        writeln!(self.out, "    ( (struct bmapnode*) &(const bmapnode[]) {{")?;
        for (_, node) in table.iter() {
            let next = node.next_index().map_or(-1, |n| n as i64);
            let scope = Scope::class(class);
            match &node.key {
                Value::Str(key) => {
                    let text = self.text(key.as_bytes());
                    if self.opts.literal {
                        write!(self.out, "        {{ be_const_key_literal(\"{text}\", {next}), ")?;
                    } else {
                        write!(self.out, "        {{ be_const_key({text}, {next}), ")?;
                    }
                    self.value(&node.value, scope.with_key(Some(key.as_bytes())))?;
                }
                Value::Int(key) => {
                    write!(self.out, "        {{ be_const_key_int({key}, {next}), ")?;
                    self.value(&node.value, scope)?;
                }
                other => return Err(SolidifyError::UnsupportedKey { kind: other.kind() }),
            }
            writeln!(self.out, " }},")?;
        }
        write!(self.out, "    }}))")?;
        Ok(())
    }

    pub(crate) fn list(&mut self, list: &List, class: Option<&str>) -> Result<()> {
        writeln!(self.out, "    be_nested_list({},", list.len())?;
        writeln!(self.out, "    ( (struct bvalue*) &(const bvalue[]) {{")?;
        let scope = Scope::class(class).with_key(Some(&b""[..]));
        for item in list.iter() {
            write!(self.out, "        ")?;
            self.value(item, scope)?;
            writeln!(self.out, ",")?;
        }
        write!(self.out, "    }}))")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DumpOptions;
    use pretty_assertions::assert_eq;
    use solidify_core::{Class, Closure, Instance, Map, Module, Proto, ValueKind};
    use std::rc::Rc;

    fn emit(v: &Value, opts: DumpOptions, scope: Scope<'_>) -> Result<String> {
        let mut s = Solidifier::new(Vec::new(), opts);
        s.value(v, scope)?;
        Ok(String::from_utf8(s.into_inner()).unwrap())
    }

    fn ident(v: &Value) -> String { emit(v, DumpOptions::new(), Scope::default()).unwrap() }

    fn literal(v: &Value) -> String { emit(v, DumpOptions::new().literal(true), Scope::default()).unwrap() }

    #[test]
    fn scalars() {
        assert_eq!(ident(&Value::Nil), "be_const_nil()");
        assert_eq!(ident(&Value::Bool(true)), "be_const_bool(1)");
        assert_eq!(ident(&Value::Int(-42)), "be_const_int(-42)");
        assert_eq!(ident(&Value::Int(i64::MAX)), "be_const_int(9223372036854775807)");
        assert_eq!(ident(&Value::Index(3)), "be_const_var(3)");
        assert_eq!(ident(&Value::real(1.0)), "be_const_real_hex(0x3ff0000000000000)");
        assert_eq!(ident(&Value::Real(Real::F32(1.0))), "be_const_real_hex(0x3F800000)");
    }

    #[test]
    fn strings_follow_mode() {
        let v = Value::str("it's \"ok\"\n");
        assert_eq!(literal(&v), "be_nested_str_literal(\"it's \\\"ok\\\"\\n\")");
        assert_eq!(ident(&Value::str("a-b")), "be_nested_str(a_X2Db)");
    }

    #[test]
    fn string_length_limit() {
        assert!(emit(&Value::str("x".repeat(254)), DumpOptions::new(), Scope::default()).is_ok());
        let err = emit(&Value::str("x".repeat(255)), DumpOptions::new(), Scope::default()).unwrap_err();
        assert!(matches!(err, SolidifyError::StringTooLong { len: 255, .. }));
    }

    #[test]
    fn references() {
        let f = Closure::new(Rc::new(Proto::new("init")));
        let scope = Scope::class(Some("Led"));
        assert_eq!(ident(&Value::closure(f.clone())), "be_const_closure(init_closure)");
        assert_eq!(
            emit(&Value::static_closure(f), DumpOptions::new(), scope).unwrap(),
            "be_const_static_closure(Led_init_closure)"
        );
        assert_eq!(ident(&Value::Class(Rc::new(Class::new("my.cls")))), "be_const_class(be_class_my_X2Ecls)");
    }

    #[test]
    fn natives_fall_back_to_unknown() {
        assert_eq!(ident(&Value::ComPtr), "be_const_comptr(&be_ntv_unknown_unknown)");
        let scope = Scope { class: Some("gpio"), key: Some(&b"pin_mode"[..]) };
        assert_eq!(
            emit(&Value::NtvFunc { is_static: true }, DumpOptions::new(), scope).unwrap(),
            "be_const_static_func(be_ntv_gpio_pin_mode)"
        );
        let scope = Scope { class: Some(""), key: Some(&b""[..]) };
        assert_eq!(
            emit(&Value::NtvFunc { is_static: false }, DumpOptions::new(), scope).unwrap(),
            "be_const_func(be_ntv_unknown_unknown)"
        );
    }

    #[test]
    fn empty_list() {
        assert_eq!(
            ident(&Value::list(vec![])),
            "    be_nested_list(0,\n    ( (struct bvalue*) &(const bvalue[]) {\n    }))"
        );
    }

    #[test]
    fn list_keeps_order() {
        let v = Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(
            ident(&v),
            "    be_nested_list(3,\n    ( (struct bvalue*) &(const bvalue[]) {\n        \
             be_const_int(3),\n        be_const_int(1),\n        be_const_int(2),\n    }))"
        );
    }

    #[test]
    fn single_entry_map() {
        let m = Map::from_pairs([(Value::str("a"), Value::Int(1))]).unwrap();
        assert_eq!(
            literal(&Value::map(m)),
            "    be_nested_map(1,\n    ( (struct bmapnode*) &(const bmapnode[]) {\n        \
             { be_const_key_literal(\"a\", -1), be_const_int(1) },\n    }))"
        );
        let m = Map::from_pairs([(Value::Int(7), Value::Nil)]).unwrap();
        assert_eq!(
            ident(&Value::map(m)),
            "    be_nested_map(1,\n    ( (struct bmapnode*) &(const bmapnode[]) {\n        \
             { be_const_key_int(7, -1), be_const_nil() },\n    }))"
        );
    }

    fn emitted_nexts(text: &str) -> Vec<i64> {
        text.lines()
            .filter_map(|l| {
                l.strip_prefix("        { be_const_key(").or_else(|| l.strip_prefix("        { be_const_key_int("))
            })
            .map(|l| {
                let (_, rest) = l.split_once(", ").unwrap();
                rest.split_once(')').unwrap().0.parse().unwrap()
            })
            .collect()
    }

    // every emitted `next` is -1 or the index of another emitted slot
    proptest::proptest! {
        #[test]
        fn map_next_indices_are_valid(
            ops in proptest::collection::vec((-30i64..30, proptest::bool::ANY, proptest::bool::weighted(0.8)), 0..80)
        ) {
            let mut m = Map::new();
            for (k, as_str, add) in ops {
                let key = if as_str { Value::str(format!("s{k}").as_str()) } else { Value::Int(k) };
                if add {
                    m.insert(key, Value::Int(k)).unwrap();
                } else {
                    m.remove(&key);
                }
            }
            let len = m.len();
            let text = ident(&Value::map(m));
            let header = format!("    be_nested_map({len},\n");
            proptest::prop_assert!(text.starts_with(&header));
            let nexts = emitted_nexts(&text);
            proptest::prop_assert_eq!(nexts.len(), len);
            let slots = i64::try_from(len).unwrap();
            proptest::prop_assert!(nexts.iter().all(|&n| n == -1 || (0..slots).contains(&n)));
        }
    }

    #[test]
    fn map_rejects_other_keys() {
        let m = Map::from_pairs([(Value::Bool(true), Value::Nil)]).unwrap();
        let err = emit(&Value::map(m), DumpOptions::new(), Scope::default()).unwrap_err();
        assert!(matches!(err, SolidifyError::UnsupportedKey { kind: ValueKind::Bool }));
    }

    #[test]
    fn map_containing_itself_is_cyclic() {
        let v = Value::map(Map::new());
        let Value::Map(handle) = &v else { unreachable!() };
        handle.borrow_mut().insert(Value::Int(1), v.clone()).unwrap();
        let err = emit(&v, DumpOptions::new(), Scope::default()).unwrap_err();
        assert!(matches!(err, SolidifyError::Cyclic));
    }

    #[test]
    fn wrapped_instances() {
        let items = Value::list(vec![Value::Int(1)]);
        let inst = Instance::new(Rc::new(Class::native_list()), vec![items]);
        assert_eq!(
            ident(&Value::Instance(Rc::new(inst))),
            "be_const_simple_instance(be_nested_simple_instance(&be_class_list, {\n        \
             be_const_list( *     be_nested_list(1,\n    ( (struct bvalue*) &(const bvalue[]) {\n        \
             be_const_int(1),\n    }))    ) } ))"
        );
    }

    #[test]
    fn rejects_malformed_instances() {
        let reason = |inst: Instance| match emit(&Value::Instance(Rc::new(inst)), DumpOptions::new(), Scope::default()) {
            Err(SolidifyError::BadInstance { reason }) => reason,
            other => panic!("expected BadInstance, got {other:?}"),
        };
        let list = || Value::list(vec![]);

        let two = Instance::new(Rc::new(Class::native_list().with_nvar(2)), vec![list(), list()]);
        assert_eq!(reason(two), "instance must have only one instance variable");

        let user = Instance::new(Rc::new(Class::new("Foo").with_nvar(1)), vec![list()]);
        assert_eq!(reason(user), "instance class must be the built-in map or list");

        let mismatched = Instance::new(Rc::new(Class::native_map()), vec![list()]);
        assert_eq!(reason(mismatched), "instance variable does not match its built-in class");

        let mut layered = Instance::new(Rc::new(Class::native_list()), vec![list()]);
        layered.superinst = Some(Rc::new(Instance::new(Rc::new(Class::native_list()), vec![list()])));
        assert_eq!(reason(layered), "instance must not have a super/sub class");
    }

    #[test]
    fn modules_are_not_constants() {
        let m = Value::Module(Rc::new(Module::new("m", Map::new())));
        let err = emit(&m, DumpOptions::new(), Scope::default()).unwrap_err();
        assert!(matches!(err, SolidifyError::UnsupportedValue { kind: ValueKind::Module }));
    }
}
