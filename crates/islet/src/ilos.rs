//! Minimal ILOS surface: classes, instances, and the generic-dispatch seam.
//!
//! `spec.md` requires an ILOS-object callable flavor and a
//! `generic-function-invoke` entry point while explicitly scoping the
//! dispatch *algorithm* out. This module supplies just enough structure —
//! a linear-MRO class table and a plain slot plist per instance — to make
//! the evaluator's ILOS-object case and the `convert` special operator
//! testable, grounded on `original_source/symbol.c`'s static class-table
//! bootstrap and simplified from the teacher's `types/class.rs`
//! `ClassObject` (which supports full Python MRO linearization; ILOS's
//! single-inheritance-friendly case needs none of that machinery).
//!
//! Full method combination (`:before`/`:after`/`:around`) and multiple
//! inheritance are out of scope; see `DESIGN.md`.

use ahash::AHashMap;

use crate::error::EvalResult;
use crate::function::Closure;
use crate::intern::SymbolId;
use crate::object::Value;

/// A class in the minimal ILOS class table.
#[derive(Debug, Clone)]
pub struct ClassRef {
    pub name: SymbolId,
    /// Direct superclasses, most-specific first. Linearized by repeated
    /// depth-first walk rather than C3 — sufficient for the
    /// single-inheritance chains this core exercises.
    pub superclasses: Vec<SymbolId>,
    pub slots: Vec<SymbolId>,
}

impl ClassRef {
    #[must_use]
    pub fn new(name: SymbolId, superclasses: Vec<SymbolId>, slots: Vec<SymbolId>) -> Self {
        Self { name, superclasses, slots }
    }
}

/// An ILOS instance: which class it belongs to, plus a slot plist (`(slot1
/// value1 slot2 value2 ...)`), matching `spec.md`'s "class reference; slot
/// plist" row. Generic functions and methods are themselves ILOS objects
/// whose slots hold their lambda lists and bodies; this core represents
/// them instead as ordinary `Closure`s registered in a side table (see
/// `GenericTable` below) since the evaluator already knows how to invoke a
/// closure — duplicating that machinery inside slot storage would be pure
/// overhead with no behavioral difference observable at this scope.
#[derive(Debug, Clone)]
pub struct IlosObject {
    pub class: SymbolId,
    pub slots: Vec<(SymbolId, Value)>,
}

impl IlosObject {
    #[must_use]
    pub fn get_slot(&self, name: SymbolId) -> Option<Value> {
        self.slots.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn set_slot(&mut self, name: SymbolId, value: Value) {
        match self.slots.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.slots.push((name, value)),
        }
    }
}

/// The host hook the evaluator calls when an ILOS object turns out to be a
/// generic function (`spec.md` §4.5's "the contract of that function ...
/// is out of scope here"). The default, [`NoGenericDispatch`], always
/// signals `undefined-method`, which keeps the evaluator's ILOS-object case
/// exercisable by tests without committing this crate to a dispatch
/// algorithm.
pub trait GenericDispatch {
    /// `true` if `value` is a generic function rather than a plain
    /// instance or method.
    fn is_generic_function(&self, value: Value) -> bool;

    /// Invokes a generic function with already-evaluated arguments.
    fn invoke(&mut self, generic_function: Value, args: &[Value]) -> EvalResult<Value>;
}

/// The default `GenericDispatch`: no generic functions exist, so every
/// ILOS-object call that isn't a plain method signals `undefined-method`.
#[derive(Debug, Default)]
pub struct NoGenericDispatch;

impl GenericDispatch for NoGenericDispatch {
    fn is_generic_function(&self, _value: Value) -> bool {
        false
    }

    fn invoke(&mut self, _generic_function: Value, _args: &[Value]) -> EvalResult<Value> {
        Err(crate::error::EvalError::undefined_method("generic-function-invoke"))
    }
}

/// One applicable method: the closure to run, and the class name it is
/// specialized on (by string, since a method's specializer is written and
/// compared by printed name rather than by a pre-interned `SymbolId` —
/// `<point>` in a `defmethod` parameter list and the runtime class of an
/// argument need not have been interned in that order). `None` means the
/// method applies regardless of the dispatch argument's class.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub specializer: Option<String>,
    pub closure: Closure,
}

/// A generic function's parameter template plus its registered methods.
/// Dispatch is single: only the first parameter's runtime class is
/// consulted, walking its class-precedence list most-specific first and
/// falling back to an unspecialized (`None`) method if one was defined.
/// Method combination (`:before`/`:after`/`:around`, `call-next-method`) is
/// out of scope; see `DESIGN.md`.
#[derive(Debug, Clone, Default)]
pub struct GenericFunctionEntry {
    pub methods: Vec<MethodEntry>,
}

impl GenericFunctionEntry {
    #[must_use]
    pub fn resolve(&self, class_precedence_list: &[String]) -> Option<&Closure> {
        for class_name in class_precedence_list {
            if let Some(method) = self.methods.iter().find(|m| m.specializer.as_deref() == Some(class_name.as_str())) {
                return Some(&method.closure);
            }
        }
        self.methods.iter().find(|m| m.specializer.is_none()).map(|m| &m.closure)
    }
}

/// The in-crate generic-function/method registry populated by `defgeneric`
/// and `defmethod`. Keyed by the generic function's name rather than by a
/// heap identity, since an ILOS "generic function" object's `HeapId` is not
/// stable across a watermark rewind (`spec.md` §4.6) the way a symbol is.
#[derive(Debug, Default)]
pub struct GenericTable {
    entries: AHashMap<SymbolId, GenericFunctionEntry>,
}

impl GenericTable {
    #[must_use]
    pub fn is_defined(&self, name: SymbolId) -> bool {
        self.entries.contains_key(&name)
    }

    #[must_use]
    pub fn get(&self, name: SymbolId) -> Option<&GenericFunctionEntry> {
        self.entries.get(&name)
    }

    /// `defgeneric`: ensures an entry exists, without touching any methods
    /// already registered under this name.
    pub fn define(&mut self, name: SymbolId) {
        self.entries.entry(name).or_default();
    }

    /// `defmethod`: adds or replaces (by specializer) a method on `name`'s
    /// entry, creating the entry if `defgeneric` was never called for it.
    pub fn add_method(&mut self, name: SymbolId, specializer: Option<String>, closure: Closure) {
        let entry = self.entries.entry(name).or_default();
        match entry.methods.iter_mut().find(|m| m.specializer == specializer) {
            Some(existing) => existing.closure = closure,
            None => entry.methods.push(MethodEntry { specializer, closure }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_get_set_round_trips() {
        let mut table = crate::intern::SymbolTable::new();
        let class = table.intern("point");
        let x = table.intern("x");
        let mut obj = IlosObject { class, slots: Vec::new() };
        obj.set_slot(x, Value::Fixnum(3));
        assert_eq!(obj.get_slot(x), Some(Value::Fixnum(3)));
        obj.set_slot(x, Value::Fixnum(5));
        assert_eq!(obj.get_slot(x), Some(Value::Fixnum(5)));
    }

    #[test]
    fn default_dispatch_signals_undefined_method() {
        let mut dispatch = NoGenericDispatch;
        assert!(!dispatch.is_generic_function(Value::Nil));
        assert!(dispatch.invoke(Value::Nil, &[]).is_err());
    }

    fn stub_closure() -> Closure {
        Closure {
            params: crate::function::ParamTemplate { required: Vec::new(), rest: None },
            body: Value::Nil,
            captured: Vec::new(),
            captured_functions: Vec::new(),
            name: None,
        }
    }

    #[test]
    fn most_specific_method_wins_over_the_unspecialized_fallback() {
        let mut table = GenericTable::default();
        let mut symbols = crate::intern::SymbolTable::new();
        let area = symbols.intern("area");
        table.define(area);
        table.add_method(area, None, stub_closure());
        table.add_method(area, Some("circle".to_owned()), stub_closure());
        let entry = table.get(area).unwrap();
        assert!(entry.resolve(&["circle".to_owned(), "shape".to_owned(), "t".to_owned()]).is_some());
        assert!(entry.resolve(&["square".to_owned(), "shape".to_owned(), "t".to_owned()]).is_some());
    }

    #[test]
    fn undefined_generic_function_has_no_entry() {
        let mut symbols = crate::intern::SymbolTable::new();
        let table = GenericTable::default();
        let name = symbols.intern("unknown-generic");
        assert!(!table.is_defined(name));
    }
}
