//! `be_local_module(...)` declarations.

use std::io::Write;

use solidify_core::Module;

use crate::class::{declarations, Decl};
use crate::encode::{to_identifier, to_literal};
use crate::{banner_name, Result, Solidifier, BANNER_CLOSE, BANNER_OPEN, MODULE_END};

impl<W: Write> Solidifier<W> {
    pub(crate) fn module(&mut self, module: &Module) -> Result<()> {
        let raw = module.name.as_ref().map_or(&[][..], |n| n.as_bytes());
        let id = to_identifier(raw);
        let _span = tracing::debug_span!("module", name = %String::from_utf8_lossy(raw)).entered();

        for decl in declarations(module.table.as_ref())? {
            match decl {
                Decl::Closure(closure) => self.closure(&closure, Some(id.as_str()))?,
                Decl::Class(class) => self.subclass(&class)?,
            }
        }

        tracing::debug!("declaring module");
        write!(self.out, "\n{BANNER_OPEN}** Solidified module: {}\n{BANNER_CLOSE}", banner_name(raw))?;
        writeln!(self.out, "be_local_module({id},")?;
        writeln!(self.out, "    \"{}\",", to_literal(raw))?;
        match &module.table {
            Some(table) => {
                self.map(table, Some(id.as_str()))?;
                writeln!(self.out)?;
            }
            None => writeln!(self.out, "    NULL,")?,
        }
        writeln!(self.out, ");")?;
        writeln!(self.out, "BE_EXPORT_VARIABLE be_define_const_native_module({id});")?;
        write!(self.out, "{MODULE_END}")?;
        Ok(())
    }
}
