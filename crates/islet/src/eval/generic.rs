//! `defgeneric`, `defmethod`, and `generic-function-p`: the user-facing
//! forms that populate the minimal ILOS method registry described in
//! `ilos::GenericTable`. Single dispatch only, on the class of the first
//! argument — see `DESIGN.md` for why full method combination is out of
//! scope here.

use crate::builtins::{BuiltinKind, BuiltinSpec};
use crate::error::EvalError;
use crate::heap::HeapData;
use crate::ilos::IlosObject;
use crate::intern::SymbolId;
use crate::object::{self, Value};

use super::nonlocal::{Condition, EvalOutcome};
use super::Evaluator;

pub const SPECS: &[BuiltinSpec] = &[
    BuiltinSpec { name: "defgeneric", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: defgeneric },
    BuiltinSpec { name: "defmethod", kind: BuiltinKind::Special, min_arity: 2, max_arity: None, handler: defmethod },
    BuiltinSpec {
        name: "generic-function-p",
        kind: BuiltinKind::Function,
        min_arity: 1,
        max_arity: Some(1),
        handler: generic_function_p,
    },
];

/// `(defgeneric name (params...))`: registers the name in the generic
/// function table (if not already present) and binds its function slot to
/// a marker ILOS object recognized by [`super::Evaluator::invoke`].
fn defgeneric(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "defgeneric").map_err(Condition::from)?;
    let name = object::as_symbol(&ev.heap, items[0]).map_err(Condition::from)?;
    ev.generics.define(name);
    bind_generic_marker(ev, name)?;
    Ok(Value::Symbol(name))
}

/// `(defmethod name ((param spec) param2 ...) body...)`: each parameter may
/// be a plain symbol or a `(symbol class-name)` pair; only the first
/// parameter's specializer is consulted at dispatch time. Implicitly
/// defines the generic function if `defgeneric` was never called for this
/// name.
fn defmethod(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "defmethod").map_err(Condition::from)?;
    let name = object::as_symbol(&ev.heap, items[0]).map_err(Condition::from)?;
    let params_form = items[1];
    let body = object::list_from_slice(&mut ev.heap, &items[2..]).map_err(Condition::from)?;

    let (plain_params, specializer) = parse_method_params(ev, params_form)?;
    let closure_value = super::build_closure_from_parts(ev, plain_params, body, Some(name))?;
    let closure = match closure_value {
        Value::Ref(id) => match ev.heap.get(id) {
            HeapData::Closure(closure) => closure.clone(),
            _ => unreachable!("build_closure_from_parts always allocates a Closure"),
        },
        _ => unreachable!("build_closure_from_parts always returns Value::Ref"),
    };

    ev.generics.add_method(name, specializer, closure);
    if !ev.generics_marker_is_bound(name) {
        bind_generic_marker(ev, name)?;
    }
    Ok(Value::Symbol(name))
}

/// Splits a `defmethod` parameter list into a plain parameter form (for
/// [`super::build_closure_from_parts`]) and the first parameter's
/// specializer class name, if any. Angle brackets around the class name
/// (`<point>`) are stripped, matching `convert`'s class-designator
/// handling.
fn parse_method_params(ev: &mut Evaluator, params_form: Value) -> Result<(Value, Option<String>), Condition> {
    let items = object::list_to_vec(&ev.heap, params_form, "method-parameter-list").map_err(Condition::from)?;
    let mut plain_params = Vec::with_capacity(items.len());
    let mut first_specializer = None;
    for (index, &item) in items.iter().enumerate() {
        match object::as_cons(&ev.heap, item) {
            Ok((Value::Symbol(param), rest)) => {
                plain_params.push(Value::Symbol(param));
                if index == 0 {
                    let spec_items =
                        object::list_to_vec(&ev.heap, rest, "method-specializer").map_err(Condition::from)?;
                    if let Some(&class_form) = spec_items.first() {
                        let class_sym = object::as_symbol(&ev.heap, class_form).map_err(Condition::from)?;
                        first_specializer =
                            Some(strip_class_brackets(ev.symbols.name(class_sym)));
                    }
                }
            }
            _ => plain_params.push(item),
        }
    }
    let plain_form = object::list_from_slice(&mut ev.heap, &plain_params).map_err(Condition::from)?;
    Ok((plain_form, first_specializer))
}

fn strip_class_brackets(name: &str) -> String {
    name.trim_start_matches('<').trim_end_matches('>').to_owned()
}

fn bind_generic_marker(ev: &mut Evaluator, name: SymbolId) -> Result<(), Condition> {
    let id = ev
        .heap
        .alloc(HeapData::Ilos(IlosObject { class: name, slots: Vec::new() }))
        .ok_or_else(EvalError::storage_exhausted)
        .map_err(Condition::from)?;
    ev.symbols.get_mut(name).function = Some(Value::Ref(id));
    Ok(())
}

/// `(generic-function-p obj)`: true exactly when `obj` is the marker ILOS
/// object `defgeneric`/`defmethod` bind, i.e. its class is a name currently
/// registered in the generic function table.
fn generic_function_p(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "generic-function-p").map_err(Condition::from)?;
    let value = ev.eval(items[0])?;
    let is_generic = match value {
        Value::Ref(id) => matches!(ev.heap.get(id), HeapData::Ilos(obj) if ev.generics.is_defined(obj.class)),
        _ => false,
    };
    Ok(if is_generic { Value::T } else { Value::Nil })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StringInputStream;

    fn eval_str(ev: &mut Evaluator, src: &str) -> Value {
        let mut input = StringInputStream::new(src);
        let mut reader = crate::reader::Reader::new(&mut input);
        let form = reader.read(&mut ev.heap, &mut ev.symbols, true, Value::Nil).unwrap();
        match ev.eval(form) {
            Ok(v) => v,
            Err(Condition::Error(e)) => panic!("eval error: {e}"),
            Err(Condition::Unwind(_)) => panic!("unexpected unwind"),
        }
    }

    #[test]
    fn defgeneric_binds_a_recognized_generic_function_marker() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defgeneric area (shape))");
        assert_eq!(eval_str(&mut ev, "(generic-function-p (function area))"), Value::T);
    }

    #[test]
    fn ordinary_function_is_not_a_generic_function() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defun plain (x) x)");
        assert_eq!(eval_str(&mut ev, "(generic-function-p (function plain))"), Value::Nil);
    }

    #[test]
    fn method_dispatches_on_the_runtime_class_of_the_first_argument() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defmethod describe ((x integer)) 'a-number)");
        eval_str(&mut ev, "(defmethod describe ((x string)) 'a-string)");
        let a = eval_str(&mut ev, "(describe 5)");
        let b = eval_str(&mut ev, "(describe \"hi\")");
        assert_eq!(ev.symbols.name(object::as_symbol(&ev.heap, a).unwrap()), "a-number");
        assert_eq!(ev.symbols.name(object::as_symbol(&ev.heap, b).unwrap()), "a-string");
    }

    #[test]
    fn unspecialized_method_is_a_fallback() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defmethod describe (x) 'something)");
        let result = eval_str(&mut ev, "(describe 3.0)");
        assert_eq!(ev.symbols.name(object::as_symbol(&ev.heap, result).unwrap()), "something");
    }

    #[test]
    fn a_call_with_no_applicable_method_signals_undefined_method() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defmethod describe ((x integer)) 'a-number)");
        let mut input = StringInputStream::new("(describe \"hi\")");
        let mut reader = crate::reader::Reader::new(&mut input);
        let form = reader.read(&mut ev.heap, &mut ev.symbols, true, Value::Nil).unwrap();
        let outcome = ev.eval(form);
        assert!(matches!(outcome, Err(Condition::Error(e)) if e.class == crate::error::ConditionClass::UndefinedMethod));
    }
}
