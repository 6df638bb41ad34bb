//! Numeric built-ins: `+ - * quotient mod <= < >= > =`.
//!
//! Fixnum arithmetic promotes to [`num_bigint::BigInt`] on overflow and
//! demotes back to a fixnum when the result fits, matching `spec.md` §4.1's
//! `Bignum` row ("produced automatically by fixnum overflow, never
//! constructed directly by user code"). Any float operand forces the whole
//! chain to float, the usual numeric-tower contagion rule.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{ToPrimitive, Zero};

use crate::error::EvalError;
use crate::eval::nonlocal::EvalOutcome;
use crate::eval::Evaluator;
use crate::heap::HeapData;
use crate::object::{self, Value};

use super::{BuiltinKind, BuiltinSpec};

pub const SPECS: &[BuiltinSpec] = &[
    BuiltinSpec { name: "+", kind: BuiltinKind::Function, min_arity: 0, max_arity: None, handler: add },
    BuiltinSpec { name: "-", kind: BuiltinKind::Function, min_arity: 1, max_arity: None, handler: sub },
    BuiltinSpec { name: "*", kind: BuiltinKind::Function, min_arity: 0, max_arity: None, handler: mul },
    BuiltinSpec {
        name: "quotient",
        kind: BuiltinKind::Function,
        min_arity: 2,
        max_arity: Some(2),
        handler: quotient,
    },
    BuiltinSpec { name: "mod", kind: BuiltinKind::Function, min_arity: 2, max_arity: Some(2), handler: modulo },
    BuiltinSpec { name: "<=", kind: BuiltinKind::Function, min_arity: 1, max_arity: None, handler: le },
    BuiltinSpec { name: "<", kind: BuiltinKind::Function, min_arity: 1, max_arity: None, handler: lt },
    BuiltinSpec { name: ">=", kind: BuiltinKind::Function, min_arity: 1, max_arity: None, handler: ge },
    BuiltinSpec { name: ">", kind: BuiltinKind::Function, min_arity: 1, max_arity: None, handler: gt },
    BuiltinSpec { name: "=", kind: BuiltinKind::Function, min_arity: 1, max_arity: None, handler: num_eq },
];

#[derive(Debug, Clone)]
enum Num {
    Fixnum(i64),
    Float(f64),
    Big(BigInt),
}

fn to_number(ev: &Evaluator, v: Value) -> Result<Num, EvalError> {
    match v {
        Value::Fixnum(n) => Ok(Num::Fixnum(n)),
        Value::Float(f) => Ok(Num::Float(f)),
        Value::Ref(id) => match ev.heap.get(id) {
            HeapData::Bignum(b) => Ok(Num::Big(b.clone())),
            _ => Err(EvalError::domain_error("number", v.type_name(&ev.heap))),
        },
        _ => Err(EvalError::domain_error("number", v.type_name(&ev.heap))),
    }
}

fn to_f64(n: &Num) -> f64 {
    match n {
        Num::Fixnum(i) => *i as f64,
        Num::Float(f) => *f,
        Num::Big(b) => b.to_f64().unwrap_or(f64::NAN),
    }
}

fn is_zero(n: &Num) -> bool {
    match n {
        Num::Fixnum(i) => *i == 0,
        Num::Float(f) => *f == 0.0,
        Num::Big(b) => b.is_zero(),
    }
}

fn number_to_value(ev: &mut Evaluator, n: Num) -> Result<Value, EvalError> {
    match n {
        Num::Fixnum(i) => Ok(Value::Fixnum(i)),
        Num::Float(f) => Ok(Value::Float(f)),
        Num::Big(b) => match b.to_i64() {
            Some(i) => Ok(Value::Fixnum(i)),
            None => object::make_bignum(&mut ev.heap, b),
        },
    }
}

fn combine(
    a: Num,
    b: Num,
    op_i: fn(i64, i64) -> Option<i64>,
    op_b: fn(&BigInt, &BigInt) -> BigInt,
    op_f: fn(f64, f64) -> f64,
) -> Num {
    match (a, b) {
        (Num::Fixnum(x), Num::Fixnum(y)) => match op_i(x, y) {
            Some(v) => Num::Fixnum(v),
            None => Num::Big(op_b(&BigInt::from(x), &BigInt::from(y))),
        },
        (Num::Float(x), Num::Float(y)) => Num::Float(op_f(x, y)),
        (Num::Float(x), Num::Fixnum(y)) => Num::Float(op_f(x, y as f64)),
        (Num::Fixnum(x), Num::Float(y)) => Num::Float(op_f(x as f64, y)),
        (Num::Float(x), Num::Big(y)) => Num::Float(op_f(x, y.to_f64().unwrap_or(f64::NAN))),
        (Num::Big(x), Num::Float(y)) => Num::Float(op_f(x.to_f64().unwrap_or(f64::NAN), y)),
        (Num::Fixnum(x), Num::Big(y)) => Num::Big(op_b(&BigInt::from(x), &y)),
        (Num::Big(x), Num::Fixnum(y)) => Num::Big(op_b(&x, &BigInt::from(y))),
        (Num::Big(x), Num::Big(y)) => Num::Big(op_b(&x, &y)),
    }
}

fn fold_identity(
    ev: &Evaluator,
    args: &[Value],
    identity: i64,
    op_i: fn(i64, i64) -> Option<i64>,
    op_b: fn(&BigInt, &BigInt) -> BigInt,
    op_f: fn(f64, f64) -> f64,
) -> Result<Num, EvalError> {
    let mut acc = Num::Fixnum(identity);
    for &arg in args {
        acc = combine(acc, to_number(ev, arg)?, op_i, op_b, op_f);
    }
    Ok(acc)
}

fn reduce_seeded(
    ev: &Evaluator,
    args: &[Value],
    op_i: fn(i64, i64) -> Option<i64>,
    op_b: fn(&BigInt, &BigInt) -> BigInt,
    op_f: fn(f64, f64) -> f64,
) -> Result<Num, EvalError> {
    let mut acc = to_number(ev, args[0])?;
    for &arg in &args[1..] {
        acc = combine(acc, to_number(ev, arg)?, op_i, op_b, op_f);
    }
    Ok(acc)
}

fn add(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "+")?;
    let sum = fold_identity(ev, &args, 0, i64::checked_add, |a, b| a + b, |a, b| a + b)?;
    Ok(number_to_value(ev, sum)?)
}

fn sub(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "-")?;
    let result = if args.len() == 1 {
        fold_identity(ev, &args, 0, i64::checked_sub, |a, b| a - b, |a, b| a - b)?
    } else {
        reduce_seeded(ev, &args, i64::checked_sub, |a, b| a - b, |a, b| a - b)?
    };
    Ok(number_to_value(ev, result)?)
}

fn mul(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "*")?;
    let product = fold_identity(ev, &args, 1, i64::checked_mul, |a, b| a * b, |a, b| a * b)?;
    Ok(number_to_value(ev, product)?)
}

fn quotient(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "quotient")?;
    let a = to_number(ev, args[0])?;
    let b = to_number(ev, args[1])?;
    if is_zero(&b) {
        return Err(EvalError::division_by_zero("quotient").into());
    }
    let result = match (a, b) {
        (Num::Fixnum(x), Num::Fixnum(y)) => Num::Fixnum(x / y),
        (Num::Big(x), Num::Fixnum(y)) => Num::Big(x / BigInt::from(y)),
        (Num::Fixnum(x), Num::Big(y)) => Num::Big(BigInt::from(x) / y),
        (Num::Big(x), Num::Big(y)) => Num::Big(x / y),
        (x, y) => Num::Float((to_f64(&x) / to_f64(&y)).trunc()),
    };
    Ok(number_to_value(ev, result)?)
}

fn modulo(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "mod")?;
    let a = to_number(ev, args[0])?;
    let b = to_number(ev, args[1])?;
    if is_zero(&b) {
        return Err(EvalError::division_by_zero("mod").into());
    }
    let result = match (a, b) {
        (Num::Fixnum(x), Num::Fixnum(y)) => Num::Fixnum(x.mod_floor(&y)),
        (Num::Big(x), Num::Fixnum(y)) => Num::Big(x.mod_floor(&BigInt::from(y))),
        (Num::Fixnum(x), Num::Big(y)) => Num::Big(BigInt::from(x).mod_floor(&y)),
        (Num::Big(x), Num::Big(y)) => Num::Big(x.mod_floor(&y)),
        (x, y) => {
            let (fx, fy) = (to_f64(&x), to_f64(&y));
            Num::Float(fx - fy * (fx / fy).floor())
        }
    };
    Ok(number_to_value(ev, result)?)
}

fn compare(ev: &Evaluator, a: Value, b: Value) -> Result<std::cmp::Ordering, EvalError> {
    let na = to_number(ev, a)?;
    let nb = to_number(ev, b)?;
    Ok(match (na, nb) {
        (Num::Fixnum(x), Num::Fixnum(y)) => x.cmp(&y),
        (Num::Big(x), Num::Big(y)) => x.cmp(&y),
        (Num::Big(x), Num::Fixnum(y)) => x.cmp(&BigInt::from(y)),
        (Num::Fixnum(x), Num::Big(y)) => BigInt::from(x).cmp(&y),
        (x, y) => to_f64(&x).partial_cmp(&to_f64(&y)).unwrap_or(std::cmp::Ordering::Equal),
    })
}

fn chain(ev: &mut Evaluator, form: Value, name: &str, ok: fn(std::cmp::Ordering) -> bool) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, name)?;
    for window in args.windows(2) {
        if !ok(compare(ev, window[0], window[1])?) {
            return Ok(Value::Nil);
        }
    }
    Ok(Value::T)
}

fn le(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    chain(ev, form, "<=", |o| o != std::cmp::Ordering::Greater)
}

fn lt(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    chain(ev, form, "<", |o| o == std::cmp::Ordering::Less)
}

fn ge(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    chain(ev, form, ">=", |o| o != std::cmp::Ordering::Less)
}

fn gt(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    chain(ev, form, ">", |o| o == std::cmp::Ordering::Greater)
}

fn num_eq(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    chain(ev, form, "=", |o| o == std::cmp::Ordering::Equal)
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
    fn add_sums_fixnums() {
        assert_eq!(call("+", &[Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3)]), Value::Fixnum(6));
    }

    #[test]
    fn add_promotes_on_overflow() {
        let mut ev = Evaluator::new();
        let list = object::list_from_slice(&mut ev.heap, &[Value::Fixnum(i64::MAX), Value::Fixnum(1)]).unwrap();
        let result = add(&mut ev, list).unwrap();
        assert!(matches!(result, Value::Ref(_)));
        assert!(result.is_number(&ev.heap));
    }

    #[test]
    fn sub_with_one_arg_negates() {
        assert_eq!(call("-", &[Value::Fixnum(5)]), Value::Fixnum(-5));
    }

    #[test]
    fn quotient_rejects_division_by_zero() {
        let mut ev = Evaluator::new();
        let list = object::list_from_slice(&mut ev.heap, &[Value::Fixnum(1), Value::Fixnum(0)]).unwrap();
        assert!(quotient(&mut ev, list).is_err());
    }

    #[test]
    fn mod_floors_toward_negative_infinity() {
        assert_eq!(call("mod", &[Value::Fixnum(-1), Value::Fixnum(3)]), Value::Fixnum(2));
    }

    #[test]
    fn comparison_chain_short_circuits() {
        assert_eq!(call("<", &[Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(2)]), Value::Nil);
        assert_eq!(call("<=", &[Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(2)]), Value::T);
    }
}
