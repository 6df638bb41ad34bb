//! Binding-form special operators: `let`/`let*`, `flet`/`labels`,
//! `defun`/`defmacro`, the `defglobal`/`defconstant`/`defdynamic` family,
//! `setq`/`dynamic`/`dynamic-let`/`set-dynamic`, and `lambda`/`function`
//! (`spec.md` §4.5).
//!
//! `flet` and `labels` both just build ordinary closures; the only
//! difference is *when* each closure's function-namespace snapshot
//! (`Closure::captured_functions`) is taken. `flet` takes the snapshot
//! before any of the new bindings exist, so a bound function cannot see its
//! siblings or itself. `labels` allocates every closure first with a
//! placeholder snapshot, then patches each one in place once the full
//! sibling list is known, so mutual and self recursion both work.

use crate::environment::{FunctionFrame, LexicalFrame};
use crate::error::EvalError;
use crate::function::Closure;
use crate::heap::HeapData;
use crate::intern::SymbolId;
use crate::object::{self, Value};

use super::nonlocal::{Condition, EvalOutcome};
use super::{build_closure_from_parts, Evaluator};
use crate::builtins::{BuiltinKind, BuiltinSpec};

pub const SPECS: &[BuiltinSpec] = &[
    BuiltinSpec { name: "let", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: let_ },
    BuiltinSpec { name: "let*", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: let_star },
    BuiltinSpec { name: "flet", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: flet },
    BuiltinSpec { name: "labels", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: labels },
    BuiltinSpec { name: "defun", kind: BuiltinKind::Special, min_arity: 2, max_arity: None, handler: defun },
    BuiltinSpec { name: "defmacro", kind: BuiltinKind::Special, min_arity: 2, max_arity: None, handler: defmacro },
    BuiltinSpec { name: "defglobal", kind: BuiltinKind::Special, min_arity: 2, max_arity: Some(2), handler: defglobal },
    BuiltinSpec {
        name: "defconstant",
        kind: BuiltinKind::Special,
        min_arity: 2,
        max_arity: Some(2),
        handler: defconstant,
    },
    BuiltinSpec { name: "defdynamic", kind: BuiltinKind::Special, min_arity: 2, max_arity: Some(2), handler: defdynamic },
    BuiltinSpec { name: "dynamic", kind: BuiltinKind::Special, min_arity: 1, max_arity: Some(1), handler: dynamic },
    BuiltinSpec {
        name: "dynamic-let",
        kind: BuiltinKind::Special,
        min_arity: 1,
        max_arity: None,
        handler: dynamic_let,
    },
    BuiltinSpec { name: "set-dynamic", kind: BuiltinKind::Special, min_arity: 2, max_arity: Some(2), handler: set_dynamic },
    BuiltinSpec { name: "setq", kind: BuiltinKind::Special, min_arity: 2, max_arity: Some(2), handler: setq },
    BuiltinSpec { name: "lambda", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: lambda },
    BuiltinSpec { name: "function", kind: BuiltinKind::Special, min_arity: 1, max_arity: Some(1), handler: function },
];

/// Splits a `(name init-form)` or bare `name` binding clause into its
/// literal name form and init form (`spec.md`'s `let` binding clauses: a
/// symbol alone defaults its init form to `nil`).
fn parse_binding(ev: &Evaluator, clause: Value) -> Result<(Value, Value), Condition> {
    if matches!(clause, Value::Symbol(_) | Value::Nil | Value::T) {
        return Ok((clause, Value::Nil));
    }
    let (name_form, rest) = object::as_cons(&ev.heap, clause)?;
    let init_form = match rest {
        Value::Nil => Value::Nil,
        _ => object::as_cons(&ev.heap, rest)?.0,
    };
    Ok((name_form, init_form))
}

/// Splits a `(name (params...) body...)` function binding clause
/// (`flet`/`labels`) into name, parameter-list form, and body.
fn parse_function_binding(ev: &Evaluator, clause: Value) -> Result<(SymbolId, Value, Value), Condition> {
    let (name_form, rest) = object::as_cons(&ev.heap, clause)?;
    let name = object::as_symbol(&ev.heap, name_form)?;
    let (params_form, body) = object::as_cons(&ev.heap, rest)?;
    Ok((name, params_form, body))
}

fn let_(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (bindings_form, body) = object::as_cons(&ev.heap, form)?;
    let clauses = object::list_to_vec(&ev.heap, bindings_form, "let")?;
    let mut frame = LexicalFrame::new();
    for clause in clauses {
        let (name_form, init_form) = parse_binding(ev, clause)?;
        let name = object::as_symbol(&ev.heap, name_form)?;
        let value = ev.eval(init_form)?;
        frame.bind(name, value);
    }
    ev.env.push_lexical(frame);
    let result = ev.eval_body(body);
    ev.env.pop_lexical();
    result
}

fn let_star(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (bindings_form, body) = object::as_cons(&ev.heap, form)?;
    let clauses = object::list_to_vec(&ev.heap, bindings_form, "let*")?;
    ev.env.push_lexical(LexicalFrame::new());
    for clause in clauses {
        let (name_form, init_form) = match parse_binding(ev, clause) {
            Ok(v) => v,
            Err(e) => {
                ev.env.pop_lexical();
                return Err(e);
            }
        };
        let name = match object::as_symbol(&ev.heap, name_form) {
            Ok(n) => n,
            Err(e) => {
                ev.env.pop_lexical();
                return Err(e.into());
            }
        };
        let value = match ev.eval(init_form) {
            Ok(v) => v,
            Err(e) => {
                ev.env.pop_lexical();
                return Err(e);
            }
        };
        ev.env.bind_in_top(name, value);
    }
    let result = ev.eval_body(body);
    ev.env.pop_lexical();
    result
}

fn flet(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (bindings_form, body) = object::as_cons(&ev.heap, form)?;
    let clauses = object::list_to_vec(&ev.heap, bindings_form, "flet")?;
    // Every closure here snapshots the function namespace as it stands
    // before any of the new bindings are pushed: a flet-bound function
    // cannot see its siblings, and cannot call itself recursively.
    let mut bindings = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let (name, params_form, fn_body) = parse_function_binding(ev, clause)?;
        let closure = build_closure_from_parts(ev, params_form, fn_body, Some(name))?;
        bindings.push((name, closure));
    }
    let mut frame = FunctionFrame::default();
    frame.bindings = bindings.into_iter().collect();
    ev.env.push_function_frame(frame);
    let result = ev.eval_body(body);
    ev.env.pop_function_frame();
    result
}

fn labels(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (bindings_form, body) = object::as_cons(&ev.heap, form)?;
    let clauses = object::list_to_vec(&ev.heap, bindings_form, "labels")?;
    let mut parsed = Vec::with_capacity(clauses.len());
    for clause in clauses {
        parsed.push(parse_function_binding(ev, clause)?);
    }
    let mut bindings = Vec::with_capacity(parsed.len());
    for &(name, params_form, fn_body) in &parsed {
        let closure = build_closure_from_parts(ev, params_form, fn_body, Some(name))?;
        bindings.push((name, closure));
    }
    // Patch every closure's captured function namespace to include the
    // full sibling set (itself included), now that every sibling closure
    // exists. This is what lets `labels` bindings call one another and
    // themselves.
    for &(_, value) in &bindings {
        if let Value::Ref(id) = value {
            if let HeapData::Closure(closure) = ev.heap.get_mut(id) {
                closure.captured_functions = bindings.clone();
            }
        }
    }
    let mut frame = FunctionFrame::default();
    frame.bindings = bindings.into_iter().collect();
    ev.env.push_function_frame(frame);
    let result = ev.eval_body(body);
    ev.env.pop_function_frame();
    result
}

fn defun(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "defun")?;
    let name = object::as_symbol(&ev.heap, items[0])?;
    let params_form = *items.get(1).unwrap_or(&Value::Nil);
    let body = object::list_from_slice(&mut ev.heap, items.get(2..).unwrap_or(&[]))?;
    let closure = build_closure_from_parts(ev, params_form, body, Some(name))?;
    ev.symbols.get_mut(name).function = Some(closure);
    Ok(items[0])
}

fn defmacro(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "defmacro")?;
    let name = object::as_symbol(&ev.heap, items[0])?;
    let params_form = *items.get(1).unwrap_or(&Value::Nil);
    let body = object::list_from_slice(&mut ev.heap, items.get(2..).unwrap_or(&[]))?;
    let params = super::parse_param_template(&ev.heap, &ev.symbols, params_form)?;
    let captured = ev.env.capture();
    let captured_functions = ev.env.capture_functions();
    let closure = Closure { params, body, captured, captured_functions, name: Some(name) };
    let id = ev
        .heap
        .alloc(HeapData::Macro(crate::heap::LispMacro { closure }))
        .ok_or_else(EvalError::storage_exhausted)?;
    ev.symbols.get_mut(name).function = Some(Value::Ref(id));
    Ok(items[0])
}

fn defglobal(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "defglobal")?;
    let name = object::as_symbol(&ev.heap, items[0])?;
    let value = ev.eval(*items.get(1).unwrap_or(&Value::Nil))?;
    ev.symbols.get_mut(name).value = Some(value);
    Ok(items[0])
}

fn defconstant(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "defconstant")?;
    let name = object::as_symbol(&ev.heap, items[0])?;
    let value = ev.eval(*items.get(1).unwrap_or(&Value::Nil))?;
    let data = ev.symbols.get_mut(name);
    data.value = Some(value);
    data.is_constant = true;
    Ok(items[0])
}

fn defdynamic(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "defdynamic")?;
    let name = object::as_symbol(&ev.heap, items[0])?;
    let value = ev.eval(*items.get(1).unwrap_or(&Value::Nil))?;
    ev.env.push_dynamic(name, value);
    Ok(items[0])
}

fn dynamic(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "dynamic")?;
    let name = object::as_symbol(&ev.heap, items[0])?;
    ev.env
        .lookup_dynamic(name)
        .ok_or_else(|| EvalError::unbound_variable(ev.symbols.name(name)).into())
}

fn dynamic_let(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (bindings_form, body) = object::as_cons(&ev.heap, form)?;
    let clauses = object::list_to_vec(&ev.heap, bindings_form, "dynamic-let")?;
    let mut pushed = 0usize;
    for clause in clauses {
        let outcome: Result<(), Condition> = (|| {
            let (name_form, init_form) = parse_binding(ev, clause)?;
            let name = object::as_symbol(&ev.heap, name_form)?;
            let value = ev.eval(init_form)?;
            ev.env.push_dynamic(name, value);
            Ok(())
        })();
        match outcome {
            Ok(()) => pushed += 1,
            Err(e) => {
                unwind_dynamic(ev, pushed);
                return Err(e);
            }
        }
    }
    let result = ev.eval_body(body);
    unwind_dynamic(ev, pushed);
    result
}

fn unwind_dynamic(ev: &mut Evaluator, count: usize) {
    for _ in 0..count {
        ev.env.pop_dynamic();
    }
}

fn set_dynamic(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "set-dynamic")?;
    let name = object::as_symbol(&ev.heap, items[0])?;
    let value = ev.eval(*items.get(1).unwrap_or(&Value::Nil))?;
    if ev.env.set_dynamic(name, value) {
        Ok(value)
    } else {
        Err(EvalError::unbound_variable(ev.symbols.name(name)).into())
    }
}

fn setq(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "setq")?;
    let name = object::as_symbol(&ev.heap, items[0])?;
    if name == ev.symbols.nil || name == ev.symbols.t || ev.symbols.is_keyword(name) || ev.symbols.get(name).is_constant
    {
        return Err(EvalError::control_error(format!("cannot setq a constant: {}", ev.symbols.name(name))).into());
    }
    let value = ev.eval(*items.get(1).unwrap_or(&Value::Nil))?;
    if let Some(cell) = ev.env.lookup_variable(name) {
        *cell.borrow_mut() = value;
        return Ok(value);
    }
    if ev.symbols.get(name).value.is_some() {
        ev.symbols.get_mut(name).value = Some(value);
        return Ok(value);
    }
    Err(EvalError::unbound_variable(ev.symbols.name(name)).into())
}

/// `(lambda (params...) body...)` — unlike the compound-form-head case
/// handled by [`super::build_closure`], the special operator here receives
/// the argument list already split from the `lambda` head.
fn lambda(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (params_form, body) = object::as_cons(&ev.heap, form)?;
    build_closure_from_parts(ev, params_form, body, None)
}

/// `(function name)` — resolves `name` in the lexical function namespace,
/// falling back to the global function slot, without invoking it.
fn function(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "function")?;
    match items[0] {
        Value::Symbol(id) => ev
            .env
            .lookup_lexical_function(id)
            .or(ev.symbols.get(id).function)
            .ok_or_else(|| EvalError::unbound_function(ev.symbols.name(id)).into()),
        other if ev.is_lambda_form(other) => super::build_closure(ev, other),
        other => Err(EvalError::domain_error("function-designator", other.type_name(&ev.heap)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;
    use crate::streams::StringInputStream;

    fn eval_str(ev: &mut Evaluator, src: &str) -> Value {
        let mut input = StringInputStream::new(src);
        let mut reader = Reader::new(&mut input);
        let form = reader.read(&mut ev.heap, &mut ev.symbols, true, Value::Nil).unwrap();
        match ev.eval(form) {
            Ok(v) => v,
            Err(Condition::Error(e)) => panic!("eval error: {e}"),
            Err(Condition::Unwind(_)) => panic!("unexpected unwind at top level"),
        }
    }

    #[test]
    fn let_shadows_without_seeing_its_own_bindings_in_inits() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defglobal x 1)");
        assert_eq!(eval_str(&mut ev, "(let ((x 2) (y x)) y)"), Value::Fixnum(1));
    }

    #[test]
    fn let_star_sees_earlier_bindings_in_later_inits() {
        let mut ev = Evaluator::new();
        assert_eq!(eval_str(&mut ev, "(let* ((x 2) (y (+ x 1))) y)"), Value::Fixnum(3));
    }

    #[test]
    fn flet_bound_function_cannot_call_itself() {
        let mut ev = Evaluator::new();
        let err = {
            let mut input = StringInputStream::new("(flet ((f (n) (f n))) (f 1))");
            let mut reader = Reader::new(&mut input);
            let form = reader.read(&mut ev.heap, &mut ev.symbols, true, Value::Nil).unwrap();
            ev.eval(form).unwrap_err()
        };
        match err {
            Condition::Error(e) => assert_eq!(e.class, crate::error::ConditionClass::UnboundFunction),
            Condition::Unwind(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn labels_supports_mutual_recursion() {
        let mut ev = Evaluator::new();
        let result = eval_str(
            &mut ev,
            "(labels ((even-p (n) (if (= n 0) t (odd-p (- n 1)))) \
                      (odd-p (n) (if (= n 0) nil (even-p (- n 1))))) \
               (even-p 10))",
        );
        assert_eq!(result, Value::T);
    }

    #[test]
    fn setq_mutates_a_defglobal_binding() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defglobal x 1)");
        eval_str(&mut ev, "(setq x 2)");
        assert_eq!(eval_str(&mut ev, "x"), Value::Fixnum(2));
    }

    #[test]
    fn setq_on_a_constant_is_rejected() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defconstant pi-ish 3)");
        let mut input = StringInputStream::new("(setq pi-ish 4)");
        let mut reader = Reader::new(&mut input);
        let form = reader.read(&mut ev.heap, &mut ev.symbols, true, Value::Nil).unwrap();
        let err = ev.eval(form).unwrap_err();
        match err {
            Condition::Error(e) => assert_eq!(e.class, crate::error::ConditionClass::ControlError),
            Condition::Unwind(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn dynamic_let_restores_the_previous_binding_on_exit() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defdynamic d 1)");
        assert_eq!(eval_str(&mut ev, "(dynamic-let ((d 2)) (dynamic d))"), Value::Fixnum(2));
        assert_eq!(eval_str(&mut ev, "(dynamic d)"), Value::Fixnum(1));
    }
}
