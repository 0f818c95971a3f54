//! `be_local_class(...)` declarations and their loaders.

use std::{io::Write, rc::Rc};

use solidify_core::{Class, Closure, MapRef, Value};

use crate::encode::{to_identifier, to_literal};
use crate::{banner_name, Result, SolidifyError, Solidifier, BANNER_CLOSE, BANNER_OPEN, DECL_END};

/// Member that needs its own declaration before the table referencing it.
pub(crate) enum Decl {
    Closure(Rc<Closure>),
    Class(Rc<Class>),
}

/// String-keyed closure and class members, in emitted slot order.
pub(crate) fn declarations(table: Option<&MapRef>) -> Result<Vec<Decl>> {
    let Some(table) = table else { return Ok(Vec::new()) };
    table.try_borrow_mut().map_err(|_| SolidifyError::Cyclic)?.compact();
    let table = table.try_borrow().map_err(|_| SolidifyError::Cyclic)?;
    Ok(table
        .iter()
        .filter(|(_, node)| matches!(node.key, Value::Str(_)))
        .filter_map(|(_, node)| match &node.value {
            Value::Closure { closure, .. } => Some(Decl::Closure(Rc::clone(closure))),
            Value::Class(class) => Some(Decl::Class(Rc::clone(class))),
            _ => None,
        })
        .collect())
}

impl<W: Write> Solidifier<W> {
    /// Top-level class: declaration plus `be_load_<name>_class`.
    pub(crate) fn class(&mut self, class: &Rc<Class>) -> Result<()> {
        self.subclass(class)?;
        let id = to_identifier(class.name.as_bytes());
        write!(self.out, "{DECL_END}")?;
        writeln!(self.out, "void be_load_{id}_class(bvm *vm) {{")?;
        writeln!(self.out, "    be_pushntvclass(vm, &be_class_{id});")?;
        writeln!(self.out, "    be_setglobal(vm, \"{}\");", to_literal(class.name.as_bytes()))?;
        writeln!(self.out, "    be_pop(vm, 1);")?;
        writeln!(self.out, "}}")?;
        Ok(())
    }

    /// Declares a class once per dump, after its closure and class members.
    pub(crate) fn subclass(&mut self, class: &Rc<Class>) -> Result<()> {
        let ptr = Rc::as_ptr(class);
        if !self.declared.insert(ptr) {
            // referenced from inside its own declaration: symbol must exist first
            if self.pending.contains(&ptr) && self.forwarded.insert(ptr) {
                tracing::trace!(class = %class.name, "forward declaration");
                writeln!(self.out, "extern const bclass be_class_{};", to_identifier(class.name.as_bytes()))?;
            } else {
                tracing::trace!(class = %class.name, "already declared");
            }
            return Ok(());
        }
        self.pending.insert(ptr);
        let r = self.nested(|s| s.class_body(class));
        self.pending.remove(&ptr);
        r
    }

    fn class_body(&mut self, class: &Class) -> Result<()> {
        let _span = tracing::debug_span!("class", name = %class.name).entered();
        let id = to_identifier(class.name.as_bytes());

        for decl in declarations(class.members.as_ref())? {
            match decl {
                Decl::Closure(closure) => self.closure(&closure, Some(id.as_str()))?,
                Decl::Class(inner) => self.subclass(&inner)?,
            }
        }

        tracing::debug!(nvar = class.nvar, "declaring class");
        write!(self.out, "\n{BANNER_OPEN}** Solidified class: {}\n{BANNER_CLOSE}", banner_name(class.name.as_bytes()))?;
        let superclass = class.superclass.as_ref().map(|s| to_identifier(s.name.as_bytes()));
        if let Some(sup) = &superclass {
            writeln!(self.out, "extern const bclass be_class_{sup};")?;
        }
        writeln!(self.out, "be_local_class({id},")?;
        writeln!(self.out, "    {},", class.nvar)?;
        match &superclass {
            Some(sup) => writeln!(self.out, "    &be_class_{sup},")?,
            None => writeln!(self.out, "    NULL,")?,
        }
        match &class.members {
            Some(members) => {
                self.map(members, Some(id.as_str()))?;
                writeln!(self.out, ",")?;
            }
            None => writeln!(self.out, "    NULL,")?,
        }
        let name = self.text(class.name.as_bytes());
        if self.opts.literal {
            writeln!(self.out, "    be_str_literal(\"{name}\")")?;
        } else {
            writeln!(self.out, "    &be_const_str_{name},")?;
        }
        writeln!(self.out, ");")?;
        Ok(())
    }
}
