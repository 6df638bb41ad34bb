//! The built-in C-function and C-special registry.
//!
//! One file per concern, mirroring the teacher's `src/builtins/*.rs`
//! one-function-per-file convention: [`arithmetic`], [`lists`],
//! [`predicates`], [`equality`], [`printing`], and [`gensym`]. Each module
//! exposes a slice of [`BuiltinSpec`]s; [`BuiltinTable::standard`] collects
//! them all, interns every name, and binds each symbol's function slot to
//! a `Value::CFunction`/`Value::CSpecial` descriptor, the way the original
//! KISS implementation populates its symbol table at startup.

pub mod arithmetic;
pub mod equality;
pub mod gensym;
pub mod lists;
pub mod predicates;
pub mod printing;

use crate::eval::nonlocal::EvalOutcome;
use crate::eval::Evaluator;
use crate::intern::SymbolTable;
use crate::object::Value;

/// Handle to a built-in's descriptor in the [`BuiltinTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuiltinId(u16);

/// A built-in's argument-evaluation strategy (`spec.md` §4.1's C-function
/// vs. C-special distinction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// Arguments are evaluated left-to-right before the handler runs.
    Function,
    /// The handler receives the unevaluated argument list.
    Special,
}

pub type BuiltinFn = fn(&mut Evaluator, Value) -> EvalOutcome;

/// One entry in the registry: name, arity bounds, and the handler.
#[derive(Clone, Copy)]
pub struct BuiltinSpec {
    pub name: &'static str,
    pub kind: BuiltinKind,
    pub min_arity: usize,
    pub max_arity: Option<usize>,
    pub handler: BuiltinFn,
}

pub struct BuiltinTable {
    specs: Vec<BuiltinSpec>,
}

impl BuiltinTable {
    #[must_use]
    pub fn get(&self, id: BuiltinId) -> &BuiltinSpec {
        &self.specs[id.0 as usize]
    }

    /// Builds the table and binds every entry into `symbols`' function
    /// slots, interning each name as needed.
    #[must_use]
    pub fn standard(symbols: &mut SymbolTable) -> Self {
        let mut specs = Vec::new();
        for group in [
            arithmetic::SPECS,
            lists::SPECS,
            predicates::SPECS,
            equality::SPECS,
            printing::SPECS,
            gensym::SPECS,
            crate::eval::binding::SPECS,
            crate::eval::control::SPECS,
            crate::eval::generic::SPECS,
        ] {
            specs.extend_from_slice(group);
        }
        let table = Self { specs };
        for (index, spec) in table.specs.iter().enumerate() {
            let id = BuiltinId(u16::try_from(index).expect("builtin table overflowed u16"));
            let sym = symbols.intern(spec.name);
            let value = match spec.kind {
                BuiltinKind::Function => Value::CFunction(id),
                BuiltinKind::Special => Value::CSpecial(id),
            };
            symbols.get_mut(sym).function = Some(value);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_binds_every_name_to_its_function_slot() {
        let mut symbols = SymbolTable::new();
        let table = BuiltinTable::standard(&mut symbols);
        assert!(!table.specs.is_empty());
        let plus = symbols.intern("+");
        assert!(matches!(symbols.get(plus).function, Some(Value::CFunction(_))));
        let if_sym = symbols.intern("if");
        assert!(matches!(symbols.get(if_sym).function, Some(Value::CSpecial(_))));
    }
}
