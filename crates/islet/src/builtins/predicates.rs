//! Type predicates: `consp null symbolp stringp characterp numberp
//! functionp`.

use crate::eval::nonlocal::EvalOutcome;
use crate::eval::Evaluator;
use crate::heap::HeapData;
use crate::object::{self, Value};

use super::{BuiltinKind, BuiltinSpec};

pub const SPECS: &[BuiltinSpec] = &[
    BuiltinSpec { name: "consp", kind: BuiltinKind::Function, min_arity: 1, max_arity: Some(1), handler: consp },
    BuiltinSpec { name: "null", kind: BuiltinKind::Function, min_arity: 1, max_arity: Some(1), handler: null },
    BuiltinSpec {
        name: "symbolp",
        kind: BuiltinKind::Function,
        min_arity: 1,
        max_arity: Some(1),
        handler: symbolp,
    },
    BuiltinSpec {
        name: "stringp",
        kind: BuiltinKind::Function,
        min_arity: 1,
        max_arity: Some(1),
        handler: stringp,
    },
    BuiltinSpec {
        name: "characterp",
        kind: BuiltinKind::Function,
        min_arity: 1,
        max_arity: Some(1),
        handler: characterp,
    },
    BuiltinSpec {
        name: "numberp",
        kind: BuiltinKind::Function,
        min_arity: 1,
        max_arity: Some(1),
        handler: numberp,
    },
    BuiltinSpec {
        name: "functionp",
        kind: BuiltinKind::Function,
        min_arity: 1,
        max_arity: Some(1),
        handler: functionp,
    },
];

fn as_bool(b: bool) -> Value {
    if b {
        Value::T
    } else {
        Value::Nil
    }
}

fn arg(ev: &Evaluator, form: Value) -> crate::error::EvalResult<Value> {
    Ok(object::list_to_vec(&ev.heap, form, "predicate")?[0])
}

fn consp(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let v = arg(ev, form)?;
    Ok(as_bool(v.is_cons(&ev.heap)))
}

fn null(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let v = arg(ev, form)?;
    Ok(as_bool(v.is_nil()))
}

fn symbolp(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let v = arg(ev, form)?;
    Ok(as_bool(v.is_symbol()))
}

fn stringp(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let v = arg(ev, form)?;
    Ok(as_bool(v.is_string(&ev.heap)))
}

fn characterp(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let v = arg(ev, form)?;
    Ok(as_bool(v.is_character()))
}

fn numberp(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let v = arg(ev, form)?;
    Ok(as_bool(v.is_number(&ev.heap)))
}

fn functionp(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let v = arg(ev, form)?;
    let is_fn = matches!(v, Value::CFunction(_))
        || matches!(v, Value::Ref(id) if matches!(ev.heap.get(id), HeapData::Closure(_)));
    Ok(as_bool(is_fn))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, v: Value) -> Value {
        let mut ev = Evaluator::new();
        let form = object::list_from_slice(&mut ev.heap, &[v]).unwrap();
        let spec = SPECS.iter().find(|s| s.name == name).unwrap();
        (spec.handler)(&mut ev, form).unwrap()
    }

    #[test]
    fn null_is_true_only_for_nil() {
        assert_eq!(call("null", Value::Nil), Value::T);
        assert_eq!(call("null", Value::Fixnum(0)), Value::Nil);
    }

    #[test]
    fn numberp_recognizes_fixnum_and_float() {
        assert_eq!(call("numberp", Value::Fixnum(1)), Value::T);
        assert_eq!(call("numberp", Value::Float(1.0)), Value::T);
        assert_eq!(call("numberp", Value::Nil), Value::Nil);
    }

    #[test]
    fn consp_is_false_for_nil() {
        assert_eq!(call("consp", Value::Nil), Value::Nil);
    }
}
