//! `be_local_closure(...)` declarations.

use std::io::Write;

use solidify_core::{Closure, Proto, Value};

use crate::encode::to_identifier;
use crate::{banner_name, Result, SolidifyError, Solidifier, BANNER_CLOSE, BANNER_OPEN, DECL_END};

impl<W: Write> Solidifier<W> {
    /// Declares a closure; `class` is the identifier of the enclosing class or module.
    pub(crate) fn closure(&mut self, closure: &Closure, class: Option<&str>) -> Result<()> {
        let proto = &closure.proto;
        let name = proto.name.to_string_lossy();
        if closure.nupvals > 0 {
            return Err(SolidifyError::CapturedUpvalues { name, count: closure.nupvals });
        }
        let _span = tracing::debug_span!("closure", %name, class = class.unwrap_or_default()).entered();

        // referenced classes must be declared before the closure body
        self.inner_classes(proto)?;

        tracing::debug!("declaring closure");
        write!(self.out, "\n{BANNER_OPEN}** Solidified function: {}\n{BANNER_CLOSE}", banner_name(proto.name.as_bytes()))?;
        let prefix = class.map(|c| format!("{c}_")).unwrap_or_default();
        writeln!(self.out, "be_local_closure({prefix}{},   /* name */", to_identifier(proto.name.as_bytes()))?;
        self.proto(proto, &name, 2)?;
        write!(self.out, "\n);\n{DECL_END}")?;
        Ok(())
    }

    fn inner_classes(&mut self, proto: &Proto) -> Result<()> {
        self.nested(|s| {
            for k in &proto.consts {
                if let Value::Class(class) = k {
                    s.subclass(class)?;
                }
            }
            for sub in &proto.protos {
                s.inner_classes(sub)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dump_to_string, DumpOptions};
    use pretty_assertions::assert_eq;
    use solidify_core::{Class, Instruction, Opcode};
    use std::rc::Rc;

    fn ret() -> u32 { Instruction::abc(Opcode::Ret, 0, 0, 0).raw() }

    #[test]
    fn full_closure_text() {
        let f = Value::closure(Closure::new(Rc::new(Proto::new("hello").with_frame(1, 0, 0).with_code(vec![ret()]))));
        let expected = "
/********************************************************************
** Solidified function: hello
********************************************************************/
be_local_closure(hello,   /* name */
  be_nested_proto(
    1,                          /* nstack */
    0,                          /* argc */
    0,                          /* varg */
    0,                          /* has upvals */
    NULL,                       /* no upvals */
    0,                          /* has sup protos */
    NULL,                       /* no sub protos */
    0,                          /* has constants */
    NULL,                       /* no const */
    &be_const_str_hello,
    &be_const_str_solidified,
    ( &(const binstruction[ 1]) {  /* code */
      0x80000000,  //  0000  RET\t0
    })
  )
);
/*******************************************************************/

";
        assert_eq!(dump_to_string(&f, &DumpOptions::new()).unwrap(), expected);
    }

    #[test]
    fn captured_upvalues_are_rejected() {
        let mut c = Closure::new(Rc::new(Proto::new("counter")));
        c.nupvals = 1;
        let err = dump_to_string(&Value::closure(c), &DumpOptions::new()).unwrap_err();
        assert!(matches!(err, SolidifyError::CapturedUpvalues { ref name, count: 1 } if name == "counter"));
    }

    #[test]
    fn constant_classes_come_first() {
        let helper = Rc::new(Class::new("Helper"));
        let inner = Proto::new("inner").with_consts(vec![Value::Class(Rc::clone(&helper))]);
        let f = Proto::new("make")
            .with_protos(vec![Rc::new(inner)])
            .with_consts(vec![Value::Class(helper)]);
        let text = dump_to_string(&Value::closure(Closure::new(Rc::new(f))), &DumpOptions::new()).unwrap();

        let class_at = text.find("be_local_class(Helper,").unwrap();
        let closure_at = text.find("be_local_closure(make,").unwrap();
        assert!(class_at < closure_at);
        // declared once even though two prototypes reference it
        assert_eq!(text.matches("be_local_class(Helper,").count(), 1);
        assert!(text.contains("/* K0   */  be_const_class(be_class_Helper),"));
        // nested declarations carry no loader
        assert!(!text.contains("be_load_Helper_class"));
    }

    #[test]
    fn names_are_encoded() {
        let f = Value::closure(Closure::new(Rc::new(Proto::new("<lambda>"))));
        let text = dump_to_string(&f, &DumpOptions::new()).unwrap();
        assert!(text.contains("** Solidified function: <lambda>\n"));
        assert!(text.contains("be_local_closure(_X3Clambda_X3E,   /* name */"));
        assert!(text.contains("&be_const_str__X3Clambda_X3E,"));
    }

    #[test]
    fn comment_terminator_in_name_is_broken_up() {
        let f = Value::closure(Closure::new(Rc::new(Proto::new("f*/g"))));
        let text = dump_to_string(&f, &DumpOptions::new()).unwrap();
        assert!(text.contains("** Solidified function: f* /g\n"));
        assert!(!text.contains("f*/g"));
    }
}
