//! Minimal textual disassembly, used for audit comments and CLI listings.

use crate::bytecode::instr::{is_k, Instruction, Opcode, KR_MASK};
use crate::value::{Proto, Value};

#[cfg(not(feature = "std"))]
use alloc::{format, string::String};
#[cfg(feature = "std")]
use std::{format, string::String};

use core::fmt::Write;

fn rk(v: u32) -> String {
    format!("{}{}", if is_k(v) { 'K' } else { 'R' }, v & KR_MASK)
}

fn target(ins: Instruction, pc: usize) -> String {
    format!("#{:04X}", i64::from(ins.sbx()) + pc as i64 + 1)
}

/// One instruction on one line: `"  PPPP  OPNAME\toperands"`.
pub fn format_inst(word: u32, pc: usize) -> String {
    let ins = Instruction(word);
    let mut out = format!("  {pc:04X}  ");
    let Some(op) = ins.op() else {
        out.push_str("???");
        return out;
    };
    let name = op.name();
    let (a, b, c) = (ins.a(), ins.b(), ins.c());
    let _ = match op {
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod
        | Opcode::Lt | Opcode::Le | Opcode::Eq | Opcode::Ne | Opcode::Gt | Opcode::Ge
        | Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Shl | Opcode::Shr
        | Opcode::Connect | Opcode::GetMbr | Opcode::GetMet | Opcode::SetMbr
        | Opcode::GetIdx | Opcode::SetIdx => {
            write!(out, "{name}\tR{a}\t{}\t{}", rk(b), rk(c))
        }
        Opcode::GetNGbl | Opcode::SetNGbl | Opcode::Move | Opcode::SetSuper
        | Opcode::Neg | Opcode::Flip | Opcode::Import => write!(out, "{name}\tR{a}\t{}", rk(b)),
        Opcode::GetGbl | Opcode::SetGbl => write!(out, "{name}\tR{a}\tG{}", ins.bx()),
        Opcode::Jmp => write!(out, "{name}\t\t{}", target(ins, pc)),
        Opcode::JmpT | Opcode::JmpF => write!(out, "{name}\tR{a}\t{}", target(ins, pc)),
        Opcode::LdInt => write!(out, "{name}\tR{a}\t{}", ins.sbx()),
        Opcode::LdBool | Opcode::Catch => write!(out, "{name}\tR{a}\t{b}\t{c}"),
        Opcode::Ret if a != 0 => write!(out, "{name}\t{a}\t{}", rk(b)),
        Opcode::Ret => write!(out, "{name}\t{a}"),
        Opcode::GetUpv | Opcode::SetUpv => write!(out, "{name}\tR{a}\tU{b}"),
        Opcode::LdConst => write!(out, "{name}\tR{a}\tK{}", ins.bx()),
        Opcode::Call => write!(out, "{name}\tR{a}\t{b}"),
        Opcode::Closure => write!(out, "{name}\tR{a}\tP{}", ins.bx()),
        Opcode::Class => write!(out, "{name}\tK{}", ins.bx()),
        Opcode::Close | Opcode::LdNil => write!(out, "{name}\tR{a}"),
        Opcode::Raise => write!(out, "{name}\t{a}\t{}\t{}", rk(b), rk(c)),
        Opcode::ExBlk if a != 0 => write!(out, "{name}\t{a}\t{}", ins.bx()),
        Opcode::ExBlk => write!(out, "{name}\t{a}\t{}", target(ins, pc)),
    };
    out
}

/// Multi-line listing of a prototype and, recursively, its sub-prototypes.
pub fn disassemble(proto: &Proto, title: &str) -> String {
    let mut out = String::new();
    write_proto(&mut out, proto, title);
    out
}

fn write_proto(out: &mut String, proto: &Proto, title: &str) {
    let _ = writeln!(
        out,
        "== {title} == (name={}, nstack={}, argc={}, varg={}, upvals={}, consts={}, code={})",
        proto.name,
        proto.nstack,
        proto.argc,
        proto.varg,
        proto.upvals.len(),
        proto.consts.len(),
        proto.code.len()
    );
    for (k, value) in proto.consts.iter().enumerate() {
        let _ = writeln!(out, ";; K{k:<3} {}", show_const(value));
    }
    for (pc, word) in proto.code.iter().enumerate() {
        let _ = writeln!(out, "{}", format_inst(*word, pc));
    }
    for (i, sub) in proto.protos.iter().enumerate() {
        let _ = writeln!(out);
        write_proto(out, sub, &format!("{title}_{i}"));
    }
}

fn show_const(value: &Value) -> String {
    match value {
        Value::Nil => "nil".into(),
        Value::Bool(b) => format!("{b}"),
        Value::Int(i) => format!("{i}"),
        Value::Index(i) => format!("var({i})"),
        Value::Real(r) => format!("{}", r.as_f64()),
        Value::Str(s) if s.len() <= 64 => format!("\"{s}\""),
        Value::Str(s) => format!("\"{}…\"", String::from_utf8_lossy(&s.as_bytes()[..64])),
        Value::Closure { closure, .. } => format!("<function {}>", closure.proto.name),
        Value::Class(c) => format!("<class {}>", c.name),
        other => format!("<{}>", other.kind()),
    }
}
