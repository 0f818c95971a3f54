//! `be_nested_proto(...)`: one prototype and, recursively, its sub-prototypes.

use std::io::Write;

use solidify_core::{disasm::format_inst, Instruction, Proto};

use crate::value::Scope;
use crate::{Result, SolidifyError, Solidifier};

// column alignment of the header comments
const FIELD_GAP: &str = "                          ";
const NULL_GAP: &str = "                       ";

impl<W: Write> Solidifier<W> {
    /// Emits `proto` at `indent`. `name` is its unique derived name (`f`, `f_0`, `f_0_1`…).
    pub(crate) fn proto(&mut self, proto: &Proto, name: &str, indent: usize) -> Result<()> {
        self.nested(|s| s.proto_body(proto, name, indent))
    }

    fn field(&mut self, pad: usize, value: impl std::fmt::Display, comment: &str) -> Result<()> {
        writeln!(self.out, "{:pad$}{value},{FIELD_GAP}/* {comment} */", "")?;
        Ok(())
    }

    fn null(&mut self, pad: usize, comment: &str) -> Result<()> {
        writeln!(self.out, "{:pad$}NULL,{NULL_GAP}/* {comment} */", "")?;
        Ok(())
    }

    fn proto_body(&mut self, proto: &Proto, name: &str, indent: usize) -> Result<()> {
        tracing::trace!(proto = name, indent, consts = proto.consts.len(), code = proto.code.len(), "prototype");
        writeln!(self.out, "{:indent$}be_nested_proto(", "")?;
        let pad = indent + 2;

        self.field(pad, proto.nstack, "nstack")?;
        self.field(pad, proto.argc, "argc")?;
        self.field(pad, proto.varg, "varg")?;
        self.field(pad, u8::from(!proto.upvals.is_empty()), "has upvals")?;
        if proto.upvals.is_empty() {
            self.null(pad, "no upvals")?;
        } else {
            writeln!(self.out, "{:pad$}( &(const bupvaldesc[{:2}]) {{  /* upvals */", "", proto.upvals.len())?;
            for up in &proto.upvals {
                writeln!(self.out, "{:pad$}  be_local_const_upval({}, {}),", "", u8::from(up.instack), up.idx)?;
            }
            writeln!(self.out, "{:pad$}}}),", "")?;
        }

        self.field(pad, u8::from(!proto.protos.is_empty()), "has sup protos")?;
        if proto.protos.is_empty() {
            self.null(pad, "no sub protos")?;
        } else {
            writeln!(self.out, "{:pad$}( &(const struct bproto*[{:2}]) {{", "", proto.protos.len())?;
            for (i, sub) in proto.protos.iter().enumerate() {
                self.proto(sub, &format!("{name}_{i}"), pad + 2)?;
                writeln!(self.out, ",")?;
            }
            writeln!(self.out, "{:pad$}}}),", "")?;
        }

        self.field(pad, u8::from(!proto.consts.is_empty()), "has constants")?;
        if proto.consts.is_empty() {
            self.null(pad, "no const")?;
        } else {
            writeln!(self.out, "{:pad$}( &(const bvalue[{:2}]) {{     /* constants */", "", proto.consts.len())?;
            for (k, value) in proto.consts.iter().enumerate() {
                write!(self.out, "{:pad$}/* K{k:<3} */  ", "")?;
                self.value(value, Scope::default())?;
                writeln!(self.out, ",")?;
            }
            writeln!(self.out, "{:pad$}}}),", "")?;
        }

        let fname = self.text(proto.name.as_bytes());
        if self.opts.literal {
            writeln!(self.out, "{:pad$}be_str_literal(\"{fname}\"),", "")?;
        } else {
            writeln!(self.out, "{:pad$}&be_const_str_{fname},", "")?;
        }
        // source is not preserved
        writeln!(self.out, "{:pad$}&be_const_str_solidified,", "")?;

        writeln!(self.out, "{:pad$}( &(const binstruction[{:2}]) {{  /* code */", "", proto.code.len())?;
        for (pc, &word) in proto.code.iter().enumerate() {
            writeln!(self.out, "{:pad$}  0x{word:08X},  //{}", "", format_inst(word, pc))?;
            if let Some(index) = Instruction(word).global_slot() {
                if index as usize > self.opts.builtins {
                    return Err(SolidifyError::NonBuiltinGlobal {
                        proto: name.to_owned(),
                        pc,
                        index,
                        builtins: self.opts.builtins,
                    });
                }
            }
        }
        writeln!(self.out, "{:pad$}}})", "")?;
        write!(self.out, "{:indent$})", "")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DumpOptions;
    use pretty_assertions::assert_eq;
    use solidify_core::{Opcode, UpvalDesc, Value};
    use std::rc::Rc;

    fn emit(p: &Proto, opts: DumpOptions) -> Result<String> {
        let mut s = Solidifier::new(Vec::new(), opts);
        s.proto(p, "f", 2)?;
        Ok(String::from_utf8(s.into_inner()).unwrap())
    }

    fn ret() -> u32 { Instruction::abc(Opcode::Ret, 0, 0, 0).raw() }

    fn gbl(index: u32) -> Proto {
        Proto::new("f").with_code(vec![Instruction::abx(Opcode::GetGbl, 1, index).raw(), ret()])
    }

    #[test]
    fn minimal_layout() {
        let p = Proto::new("add").with_frame(3, 2, 0).with_code(vec![ret()]);
        let expected = "  be_nested_proto(\n\
\x20   3,                          /* nstack */\n\
\x20   2,                          /* argc */\n\
\x20   0,                          /* varg */\n\
\x20   0,                          /* has upvals */\n\
\x20   NULL,                       /* no upvals */\n\
\x20   0,                          /* has sup protos */\n\
\x20   NULL,                       /* no sub protos */\n\
\x20   0,                          /* has constants */\n\
\x20   NULL,                       /* no const */\n\
\x20   &be_const_str_add,\n\
\x20   &be_const_str_solidified,\n\
\x20   ( &(const binstruction[ 1]) {  /* code */\n\
\x20     0x80000000,  //  0000  RET\t0\n\
\x20   })\n\
\x20 )";
        assert_eq!(emit(&p, DumpOptions::new()).unwrap(), expected);
    }

    #[test]
    fn upvals_subprotos_and_constants() {
        let inner = Proto::new("inner")
            .with_upvals(vec![UpvalDesc { instack: true, idx: 0 }, UpvalDesc { instack: false, idx: 2 }]);
        let p = Proto::new("outer")
            .with_protos(vec![Rc::new(inner)])
            .with_consts(vec![Value::str("x"), Value::Int(5)]);
        let text = emit(&p, DumpOptions::new().literal(true)).unwrap();

        assert!(text.contains("    1,                          /* has sup protos */\n    ( &(const struct bproto*[ 1]) {\n      be_nested_proto(\n"));
        assert!(text.contains("        ( &(const bupvaldesc[ 2]) {  /* upvals */\n          be_local_const_upval(1, 0),\n          be_local_const_upval(0, 2),\n        }),\n"));
        assert!(text.contains("        be_str_literal(\"inner\"),\n"));
        assert!(text.contains("      ),\n    }),\n"));
        assert!(text.contains("    ( &(const bvalue[ 2]) {     /* constants */\n    /* K0   */  be_nested_str_literal(\"x\"),\n    /* K1   */  be_const_int(5),\n    }),\n"));
        assert!(text.contains("    be_str_literal(\"outer\"),\n"));
    }

    #[test]
    fn global_at_builtin_boundary_is_accepted() {
        let text = emit(&gbl(40), DumpOptions::new().builtins(40)).unwrap();
        assert!(text.contains("0x60040028,  //  0000  GETGBL\tR1\tG40\n"));
    }

    #[test]
    fn global_past_builtins_is_rejected() {
        let err = emit(&gbl(41), DumpOptions::new().builtins(40)).unwrap_err();
        assert!(matches!(
            err,
            SolidifyError::NonBuiltinGlobal { index: 41, pc: 0, builtins: 40, ref proto } if proto == "f"
        ));

        let set = Proto::new("f").with_code(vec![ret(), Instruction::abx(Opcode::SetGbl, 0, 3).raw()]);
        let err = emit(&set, DumpOptions::new().builtins(2)).unwrap_err();
        assert!(matches!(err, SolidifyError::NonBuiltinGlobal { index: 3, pc: 1, .. }));
    }

    #[test]
    fn nested_globals_report_derived_names() {
        let leaf = Rc::new(gbl(9));
        let mid = Rc::new(Proto::new("mid").with_protos(vec![Rc::new(Proto::new("a")), leaf]));
        let p = Proto::new("top").with_protos(vec![mid]);
        let err = emit(&p, DumpOptions::new().builtins(1)).unwrap_err();
        assert!(matches!(err, SolidifyError::NonBuiltinGlobal { ref proto, .. } if proto == "f_0_1"));
    }
}
