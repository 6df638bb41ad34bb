//! The `gensym` built-in: a fresh, never-interned symbol.

use crate::eval::nonlocal::EvalOutcome;
use crate::eval::Evaluator;
use crate::object::Value;

use super::{BuiltinKind, BuiltinSpec};

pub const SPECS: &[BuiltinSpec] =
    &[BuiltinSpec { name: "gensym", kind: BuiltinKind::Function, min_arity: 0, max_arity: Some(0), handler: gensym }];

fn gensym(ev: &mut Evaluator, _form: Value) -> EvalOutcome {
    Ok(Value::Symbol(ev.symbols.gensym()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gensym_produces_distinct_symbols() {
        let mut ev = Evaluator::new();
        let a = gensym(&mut ev, Value::Nil).unwrap();
        let b = gensym(&mut ev, Value::Nil).unwrap();
        assert!(!crate::object::eq(a, b));
    }
}
