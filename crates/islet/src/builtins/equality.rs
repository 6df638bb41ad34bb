//! Equality predicates: `eq eql equal`, exposed as callables over
//! `crate::object`'s free functions.

use crate::eval::nonlocal::EvalOutcome;
use crate::eval::Evaluator;
use crate::object::{self, Value};

use super::{BuiltinKind, BuiltinSpec};

pub const SPECS: &[BuiltinSpec] = &[
    BuiltinSpec { name: "eq", kind: BuiltinKind::Function, min_arity: 2, max_arity: Some(2), handler: eq },
    BuiltinSpec { name: "eql", kind: BuiltinKind::Function, min_arity: 2, max_arity: Some(2), handler: eql },
    BuiltinSpec { name: "equal", kind: BuiltinKind::Function, min_arity: 2, max_arity: Some(2), handler: equal },
];

fn as_bool(b: bool) -> Value {
    if b {
        Value::T
    } else {
        Value::Nil
    }
}

fn eq(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "eq")?;
    Ok(as_bool(object::eq(args[0], args[1])))
}

fn eql(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "eql")?;
    Ok(as_bool(object::eql(&ev.heap, args[0], args[1])))
}

fn equal(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "equal")?;
    Ok(as_bool(object::equal(&ev.heap, args[0], args[1])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_is_identity_equal_is_structural() {
        let mut ev = Evaluator::new();
        let a = object::cons(&mut ev.heap, Value::Fixnum(1), Value::Nil).unwrap();
        let b = object::cons(&mut ev.heap, Value::Fixnum(1), Value::Nil).unwrap();
        let form = object::list_from_slice(&mut ev.heap, &[a, b]).unwrap();
        assert_eq!(eq(&mut ev, form).unwrap(), Value::Nil);
        let form2 = object::list_from_slice(&mut ev.heap, &[a, b]).unwrap();
        assert_eq!(equal(&mut ev, form2).unwrap(), Value::T);
    }
}
