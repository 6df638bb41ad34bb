//! List built-ins: `cons car cdr list append* reverse length copy-list nth
//! elt set-car set-cdr`.

use crate::error::EvalError;
use crate::eval::nonlocal::EvalOutcome;
use crate::eval::Evaluator;
use crate::heap::HeapData;
use crate::object::{self, Value};

use super::{BuiltinKind, BuiltinSpec};

pub const SPECS: &[BuiltinSpec] = &[
    BuiltinSpec { name: "cons", kind: BuiltinKind::Function, min_arity: 2, max_arity: Some(2), handler: cons },
    BuiltinSpec { name: "car", kind: BuiltinKind::Function, min_arity: 1, max_arity: Some(1), handler: car },
    BuiltinSpec { name: "cdr", kind: BuiltinKind::Function, min_arity: 1, max_arity: Some(1), handler: cdr },
    BuiltinSpec { name: "list", kind: BuiltinKind::Function, min_arity: 0, max_arity: None, handler: list },
    BuiltinSpec {
        name: "append*",
        kind: BuiltinKind::Function,
        min_arity: 0,
        max_arity: None,
        handler: append_star,
    },
    BuiltinSpec {
        name: "reverse",
        kind: BuiltinKind::Function,
        min_arity: 1,
        max_arity: Some(1),
        handler: reverse,
    },
    BuiltinSpec {
        name: "length",
        kind: BuiltinKind::Function,
        min_arity: 1,
        max_arity: Some(1),
        handler: length,
    },
    BuiltinSpec {
        name: "copy-list",
        kind: BuiltinKind::Function,
        min_arity: 1,
        max_arity: Some(1),
        handler: copy_list,
    },
    BuiltinSpec { name: "nth", kind: BuiltinKind::Function, min_arity: 2, max_arity: Some(2), handler: nth },
    BuiltinSpec { name: "elt", kind: BuiltinKind::Function, min_arity: 2, max_arity: Some(2), handler: elt },
    BuiltinSpec {
        name: "set-car",
        kind: BuiltinKind::Function,
        min_arity: 2,
        max_arity: Some(2),
        handler: set_car,
    },
    BuiltinSpec {
        name: "set-cdr",
        kind: BuiltinKind::Function,
        min_arity: 2,
        max_arity: Some(2),
        handler: set_cdr,
    },
];

fn cons(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "cons")?;
    Ok(object::cons(&mut ev.heap, args[0], args[1])?)
}

fn car(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "car")?;
    let (head, _) = object::as_cons(&ev.heap, args[0])?;
    Ok(head)
}

fn cdr(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "cdr")?;
    let (_, tail) = object::as_cons(&ev.heap, args[0])?;
    Ok(tail)
}

fn list(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "list")?;
    Ok(object::list_from_slice(&mut ev.heap, &args)?)
}

fn append_star(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let lists = object::list_to_vec(&ev.heap, form, "append*")?;
    let Some((last, init)) = lists.split_last() else {
        return Ok(Value::Nil);
    };
    let mut flattened = Vec::new();
    for &l in init {
        flattened.extend(object::list_to_vec(&ev.heap, l, "append*")?);
    }
    let mut result = *last;
    for item in flattened.into_iter().rev() {
        result = object::cons(&mut ev.heap, item, result)?;
    }
    Ok(result)
}

fn reverse(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "reverse")?;
    let mut items = object::list_to_vec(&ev.heap, args[0], "reverse")?;
    items.reverse();
    Ok(object::list_from_slice(&mut ev.heap, &items)?)
}

fn length(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "length")?;
    let count = match args[0] {
        Value::Ref(id) => match ev.heap.get(id) {
            HeapData::Str(s) => s.chars().count(),
            HeapData::Vector(v) => v.len(),
            _ => object::list_to_vec(&ev.heap, args[0], "length")?.len(),
        },
        Value::Nil => 0,
        _ => object::list_to_vec(&ev.heap, args[0], "length")?.len(),
    };
    Ok(Value::Fixnum(i64::try_from(count).expect("sequence length fits in a fixnum")))
}

/// A fresh top-level spine over the same elements (`spec.md` §8: `length`,
/// `reverse`, and `copy-list` of the same list must agree on length).
fn copy_list(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "copy-list")?;
    let items = object::list_to_vec(&ev.heap, args[0], "copy-list")?;
    Ok(object::list_from_slice(&mut ev.heap, &items)?)
}

fn nth(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "nth")?;
    let index = object::as_fixnum(&ev.heap, args[0])?;
    let items = object::list_to_vec(&ev.heap, args[1], "nth")?;
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i).copied())
        .ok_or_else(|| EvalError::index_out_of_range(index, items.len()))
        .map_err(Into::into)
}

fn elt(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "elt")?;
    let index = object::as_fixnum(&ev.heap, args[1])?;
    let i = usize::try_from(index).ok();
    match args[0] {
        Value::Ref(id) => match ev.heap.get(id) {
            HeapData::Vector(v) => i
                .and_then(|i| v.get(i).copied())
                .ok_or_else(|| EvalError::index_out_of_range(index, v.len()))
                .map_err(Into::into),
            HeapData::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let c = i.and_then(|i| chars.get(i).copied());
                match c {
                    Some(c) => Ok(Value::Character(c)),
                    None => Err(EvalError::index_out_of_range(index, chars.len()).into()),
                }
            }
            _ => {
                let items = object::list_to_vec(&ev.heap, args[0], "elt")?;
                i.and_then(|i| items.get(i).copied())
                    .ok_or_else(|| EvalError::index_out_of_range(index, items.len()))
                    .map_err(Into::into)
            }
        },
        _ => {
            let items = object::list_to_vec(&ev.heap, args[0], "elt")?;
            i.and_then(|i| items.get(i).copied())
                .ok_or_else(|| EvalError::index_out_of_range(index, items.len()))
                .map_err(Into::into)
        }
    }
}

fn set_car(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "set-car")?;
    let Value::Ref(id) = args[0] else {
        return Err(EvalError::domain_error("cons", args[0].type_name(&ev.heap)).into());
    };
    match ev.heap.get_mut(id) {
        HeapData::Cons(cell) => {
            cell.car = args[1];
            Ok(args[1])
        }
        _ => Err(EvalError::domain_error("cons", args[0].type_name(&ev.heap)).into()),
    }
}

fn set_cdr(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "set-cdr")?;
    let Value::Ref(id) = args[0] else {
        return Err(EvalError::domain_error("cons", args[0].type_name(&ev.heap)).into());
    };
    match ev.heap.get_mut(id) {
        HeapData::Cons(cell) => {
            cell.cdr = args[1];
            Ok(args[1])
        }
        _ => Err(EvalError::domain_error("cons", args[0].type_name(&ev.heap)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Value {
        let mut ev = Evaluator::new();
        let list = object::list_from_slice(&mut ev.heap, args).unwrap();
        let spec = SPECS.iter().find(|s| s.name == name).unwrap();
        (spec.handler)(&mut ev, list).unwrap()
    }

    #[test]
    fn cons_car_cdr_round_trip() {
        let mut ev = Evaluator::new();
        let args = object::list_from_slice(&mut ev.heap, &[Value::Fixnum(1), Value::Fixnum(2)]).unwrap();
        let pair = cons(&mut ev, args).unwrap();
        let car_args = object::list_from_slice(&mut ev.heap, &[pair]).unwrap();
        assert_eq!(car(&mut ev, car_args).unwrap(), Value::Fixnum(1));
    }

    #[test]
    fn append_star_flattens_all_but_last() {
        let mut ev = Evaluator::new();
        let a = object::list_from_slice(&mut ev.heap, &[Value::Fixnum(1), Value::Fixnum(2)]).unwrap();
        let b = object::list_from_slice(&mut ev.heap, &[Value::Fixnum(3)]).unwrap();
        let form = object::list_from_slice(&mut ev.heap, &[a, b]).unwrap();
        let result = append_star(&mut ev, form).unwrap();
        let items = object::list_to_vec(&ev.heap, result, "test").unwrap();
        assert_eq!(items, vec![Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3)]);
    }

    #[test]
    fn length_of_nil_is_zero() {
        assert_eq!(call("length", &[Value::Nil]), Value::Fixnum(0));
    }

    #[test]
    fn copy_list_produces_an_equal_but_distinct_spine() {
        let mut ev = Evaluator::new();
        let original = object::list_from_slice(&mut ev.heap, &[Value::Fixnum(1), Value::Fixnum(2)]).unwrap();
        let form = object::list_from_slice(&mut ev.heap, &[original]).unwrap();
        let copy = copy_list(&mut ev, form).unwrap();
        assert!(object::equal(&ev.heap, original, copy));
        assert_ne!(original, copy);
    }

    #[test]
    fn nth_out_of_range_is_an_error() {
        let mut ev = Evaluator::new();
        let items = object::list_from_slice(&mut ev.heap, &[Value::Fixnum(1)]).unwrap();
        let form = object::list_from_slice(&mut ev.heap, &[Value::Fixnum(5), items]).unwrap();
        assert!(nth(&mut ev, form).is_err());
    }

    #[test]
    fn set_car_mutates_in_place() {
        let mut ev = Evaluator::new();
        let pair = object::cons(&mut ev.heap, Value::Fixnum(1), Value::Nil).unwrap();
        let form = object::list_from_slice(&mut ev.heap, &[pair, Value::Fixnum(9)]).unwrap();
        set_car(&mut ev, form).unwrap();
        let (car, _) = object::as_cons(&ev.heap, pair).unwrap();
        assert_eq!(car, Value::Fixnum(9));
    }
}
