//! Control-flow special operators: `quote`, `if`, `cond`, `case`,
//! `case-using`, `and`, `or`, `progn`, `prog1`, `while`, `catch`/`throw`,
//! `block`/`return-from`, `tagbody`/`go`, `unwind-protect`, and `convert`
//! (`spec.md` §4.5).
//!
//! `catch`/`block`/`tagbody` all push an [`ExitFrame`](crate::environment::ExitFrame)
//! recording a heap watermark, run their body, and on a matching
//! [`Unwind`] rewind the heap back to that watermark and resume — the
//! single `unwind-to(frame-id, value)` primitive `spec.md` §9 describes,
//! specialized three ways by what "matching" and "resume" mean for each.

use crate::environment::ExitKind;
use crate::error::EvalError;
use crate::heap::HeapData;
use crate::object::{self, Value};

use super::nonlocal::{Condition, EvalOutcome, Unwind};
use super::Evaluator;
use crate::builtins::{BuiltinKind, BuiltinSpec};

pub const SPECS: &[BuiltinSpec] = &[
    BuiltinSpec { name: "quote", kind: BuiltinKind::Special, min_arity: 1, max_arity: Some(1), handler: quote },
    BuiltinSpec { name: "if", kind: BuiltinKind::Special, min_arity: 2, max_arity: Some(3), handler: if_ },
    BuiltinSpec { name: "cond", kind: BuiltinKind::Special, min_arity: 0, max_arity: None, handler: cond },
    BuiltinSpec { name: "case", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: case },
    BuiltinSpec {
        name: "case-using",
        kind: BuiltinKind::Special,
        min_arity: 2,
        max_arity: None,
        handler: case_using,
    },
    BuiltinSpec { name: "and", kind: BuiltinKind::Special, min_arity: 0, max_arity: None, handler: and },
    BuiltinSpec { name: "or", kind: BuiltinKind::Special, min_arity: 0, max_arity: None, handler: or },
    BuiltinSpec { name: "progn", kind: BuiltinKind::Special, min_arity: 0, max_arity: None, handler: progn },
    BuiltinSpec { name: "prog1", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: prog1 },
    BuiltinSpec { name: "while", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: while_ },
    BuiltinSpec { name: "catch", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: catch },
    BuiltinSpec { name: "throw", kind: BuiltinKind::Special, min_arity: 2, max_arity: Some(2), handler: throw },
    BuiltinSpec { name: "block", kind: BuiltinKind::Special, min_arity: 1, max_arity: None, handler: block },
    BuiltinSpec {
        name: "return-from",
        kind: BuiltinKind::Special,
        min_arity: 1,
        max_arity: Some(2),
        handler: return_from,
    },
    BuiltinSpec { name: "tagbody", kind: BuiltinKind::Special, min_arity: 0, max_arity: None, handler: tagbody },
    BuiltinSpec { name: "go", kind: BuiltinKind::Special, min_arity: 1, max_arity: Some(1), handler: go },
    BuiltinSpec {
        name: "unwind-protect",
        kind: BuiltinKind::Special,
        min_arity: 1,
        max_arity: None,
        handler: unwind_protect,
    },
    BuiltinSpec { name: "convert", kind: BuiltinKind::Special, min_arity: 2, max_arity: Some(2), handler: convert },
];

fn quote(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "quote")?;
    Ok(items[0])
}

fn if_(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "if")?;
    let test = ev.eval(items[0])?;
    if !test.is_nil() {
        ev.eval(items[1])
    } else {
        match items.get(2) {
            Some(&else_form) => ev.eval(else_form),
            None => Ok(Value::Nil),
        }
    }
}

fn cond(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let clauses = object::list_to_vec(&ev.heap, form, "cond")?;
    for clause in clauses {
        let (test_form, body) = object::as_cons(&ev.heap, clause)?;
        let test = ev.eval(test_form)?;
        if !test.is_nil() {
            return ev.eval_body(body);
        }
    }
    Ok(Value::Nil)
}

fn case(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (key_form, clauses_form) = object::as_cons(&ev.heap, form)?;
    let key = ev.eval(key_form)?;
    let clauses = object::list_to_vec(&ev.heap, clauses_form, "case")?;
    for clause in clauses {
        let (keys_form, body) = object::as_cons(&ev.heap, clause)?;
        if matches!(keys_form, Value::T) {
            return ev.eval_body(body);
        }
        let keys = object::list_to_vec(&ev.heap, keys_form, "case")?;
        if keys.iter().any(|&k| object::eql(&ev.heap, k, key)) {
            return ev.eval_body(body);
        }
    }
    Ok(Value::Nil)
}

/// `(case-using test-function keyform clause...)`: like `case`, but the
/// per-key comparison runs `test-function` (evaluated once, applied to
/// already-evaluated values) instead of `eql`.
fn case_using(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "case-using")?;
    let test_fn = ev.eval(items[0])?;
    let key = ev.eval(items[1])?;
    for &clause in &items[2..] {
        let (keys_form, body) = object::as_cons(&ev.heap, clause)?;
        if matches!(keys_form, Value::T) {
            return ev.eval_body(body);
        }
        let keys = object::list_to_vec(&ev.heap, keys_form, "case-using")?;
        for k in keys {
            if !ev.apply(test_fn, vec![k, key])?.is_nil() {
                return ev.eval_body(body);
            }
        }
    }
    Ok(Value::Nil)
}

fn and(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let forms = object::list_to_vec(&ev.heap, form, "and")?;
    let mut result = Value::T;
    for f in forms {
        result = ev.eval(f)?;
        if result.is_nil() {
            return Ok(Value::Nil);
        }
    }
    Ok(result)
}

fn or(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let forms = object::list_to_vec(&ev.heap, form, "or")?;
    for f in forms {
        let value = ev.eval(f)?;
        if !value.is_nil() {
            return Ok(value);
        }
    }
    Ok(Value::Nil)
}

fn progn(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    ev.eval_body(form)
}

fn prog1(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let forms = object::list_to_vec(&ev.heap, form, "prog1")?;
    let first = ev.eval(forms[0])?;
    for &f in &forms[1..] {
        ev.eval(f)?;
    }
    Ok(first)
}

fn while_(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (test_form, body) = object::as_cons(&ev.heap, form)?;
    loop {
        let test = ev.eval(test_form)?;
        if test.is_nil() {
            return Ok(Value::Nil);
        }
        ev.eval_body(body)?;
    }
}

fn catch(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (tag_form, body) = object::as_cons(&ev.heap, form)?;
    let tag = ev.eval(tag_form)?;
    let watermark = ev.heap.mark();
    let exit_id = ev.env.push_exit(ExitKind::Catch { tag }, watermark);
    let outcome = ev.eval_body(body);
    ev.env.pop_exit();
    match outcome {
        Ok(value) => Ok(value),
        Err(Condition::Unwind(unwind)) if unwind.frame_id == exit_id => Ok(ev.heap.rewind(watermark, unwind.value)),
        Err(other) => Err(other),
    }
}

fn throw(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "throw")?;
    let tag = ev.eval(items[0])?;
    let value = ev.eval(items[1])?;
    for frame in ev.env.exit_frames() {
        if let ExitKind::Catch { tag: t } = &frame.kind {
            if object::eq(*t, tag) {
                return Err(Condition::Unwind(Unwind { frame_id: frame.id, value, goto_label: None }));
            }
        }
    }
    Err(EvalError::control_error("throw: no enclosing catch for this tag").into())
}

fn block(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (name_form, body) = object::as_cons(&ev.heap, form)?;
    let name = object::as_symbol(&ev.heap, name_form)?;
    let watermark = ev.heap.mark();
    let exit_id = ev.env.push_exit(ExitKind::Block { name }, watermark);
    let outcome = ev.eval_body(body);
    ev.env.pop_exit();
    match outcome {
        Ok(value) => Ok(value),
        Err(Condition::Unwind(unwind)) if unwind.frame_id == exit_id => Ok(ev.heap.rewind(watermark, unwind.value)),
        Err(other) => Err(other),
    }
}

fn return_from(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "return-from")?;
    let name = object::as_symbol(&ev.heap, items[0])?;
    let value = match items.get(1) {
        Some(&f) => ev.eval(f)?,
        None => Value::Nil,
    };
    for frame in ev.env.exit_frames() {
        if let ExitKind::Block { name: n } = &frame.kind {
            if *n == name {
                return Err(Condition::Unwind(Unwind { frame_id: frame.id, value, goto_label: None }));
            }
        }
    }
    Err(EvalError::control_error(format!("return-from: no enclosing block named {}", ev.symbols.name(name))).into())
}

/// `(tagbody form-or-label...)`: runs each non-label form in sequence for
/// effect, returning `nil`. A `go` targeting one of this body's labels
/// unwinds here and resumes immediately after the labelled position rather
/// than returning to the tagbody's caller.
fn tagbody(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let forms = object::list_to_vec(&ev.heap, form, "tagbody")?;
    let labels: Vec<crate::intern::SymbolId> = forms
        .iter()
        .filter_map(|&f| match f {
            Value::Symbol(s) => Some(s),
            _ => None,
        })
        .collect();
    let watermark = ev.heap.mark();
    let exit_id = ev.env.push_exit(ExitKind::TagBody { labels }, watermark);
    let mut index = 0usize;
    loop {
        if index >= forms.len() {
            ev.env.pop_exit();
            return Ok(Value::Nil);
        }
        if matches!(forms[index], Value::Symbol(_)) {
            index += 1;
            continue;
        }
        match ev.eval(forms[index]) {
            Ok(_) => index += 1,
            Err(Condition::Unwind(unwind)) if unwind.frame_id == exit_id => {
                ev.heap.rewind(watermark, unwind.value);
                let target = unwind.goto_label;
                let resume = target.and_then(|t| forms.iter().position(|&f| matches!(f, Value::Symbol(s) if s == t)));
                index = resume.map_or(forms.len(), |pos| pos + 1);
            }
            Err(other) => {
                ev.env.pop_exit();
                return Err(other);
            }
        }
    }
}

fn go(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "go")?;
    let label = object::as_symbol(&ev.heap, items[0])?;
    for frame in ev.env.exit_frames() {
        if let ExitKind::TagBody { labels } = &frame.kind {
            if labels.contains(&label) {
                return Err(Condition::Unwind(Unwind { frame_id: frame.id, value: Value::Nil, goto_label: Some(label) }));
            }
        }
    }
    Err(EvalError::control_error(format!("go: no enclosing tagbody has label {}", ev.symbols.name(label))).into())
}

/// `(unwind-protect protected-form cleanup-form...)`: runs the cleanup
/// forms unconditionally after the protected form, whether it returned
/// normally, signalled an error, or is mid-unwind to an outer frame. A
/// cleanup-form error takes precedence over whatever the protected form
/// produced.
fn unwind_protect(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let (protected_form, cleanup_body) = object::as_cons(&ev.heap, form)?;
    let result = ev.eval(protected_form);
    match ev.eval_body(cleanup_body) {
        Ok(_) => result,
        Err(cleanup_err) => Err(cleanup_err),
    }
}

/// `(convert obj class-name)`: `class-name` is a literal (unevaluated)
/// symbol naming the target representation, `<`/`>` brackets optional.
/// Covers the conversions between the built-in sequence-like classes
/// (`spec.md`'s Non-goals exclude user-defined ILOS `convert` methods).
fn convert(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let items = object::list_to_vec(&ev.heap, form, "convert")?;
    let obj = ev.eval(items[0])?;
    let class_sym = object::as_symbol(&ev.heap, items[1])?;
    let class_name = ev.symbols.name(class_sym).trim_start_matches('<').trim_end_matches('>').to_owned();
    match class_name.as_str() {
        "string" => convert_to_string(ev, obj),
        "symbol" => convert_to_symbol(ev, obj),
        "list" => convert_to_list(ev, obj),
        "general-vector" | "vector" => convert_to_vector(ev, obj),
        "integer" => convert_to_integer(ev, obj),
        "float" => convert_to_float(ev, obj),
        "character" => convert_to_character(ev, obj),
        other => Err(EvalError::domain_error("convertible-class", other).into()),
    }
}

fn convert_to_string(ev: &mut Evaluator, obj: Value) -> EvalOutcome {
    if obj.is_string(&ev.heap) {
        return Ok(obj);
    }
    if let Value::Character(c) = obj {
        return Ok(object::make_string(&mut ev.heap, c.to_string())?);
    }
    if let Value::Symbol(s) = obj {
        let name = ev.symbols.name(s).to_owned();
        return Ok(object::make_string(&mut ev.heap, name)?);
    }
    if object::is_proper_list(&ev.heap, obj) {
        let items = object::list_to_vec(&ev.heap, obj, "convert")?;
        let mut out = String::with_capacity(items.len());
        for item in items {
            out.push(object::as_character(&ev.heap, item)?);
        }
        return Ok(object::make_string(&mut ev.heap, out)?);
    }
    Err(EvalError::domain_error("string-convertible", obj.type_name(&ev.heap)).into())
}

fn convert_to_symbol(ev: &mut Evaluator, obj: Value) -> EvalOutcome {
    if matches!(obj, Value::Symbol(_) | Value::Nil | Value::T) {
        return Ok(obj);
    }
    if obj.is_string(&ev.heap) {
        let text = object::as_string(&ev.heap, obj)?.to_owned();
        return Ok(Value::Symbol(ev.symbols.intern(&text)));
    }
    Err(EvalError::domain_error("symbol-convertible", obj.type_name(&ev.heap)).into())
}

fn convert_to_list(ev: &mut Evaluator, obj: Value) -> EvalOutcome {
    if object::is_proper_list(&ev.heap, obj) {
        return Ok(obj);
    }
    if obj.is_string(&ev.heap) {
        let chars: Vec<Value> = object::as_string(&ev.heap, obj)?.chars().map(Value::Character).collect();
        return Ok(object::list_from_slice(&mut ev.heap, &chars)?);
    }
    if let Value::Ref(id) = obj {
        if let HeapData::Vector(items) = ev.heap.get(id) {
            let items = items.clone();
            return Ok(object::list_from_slice(&mut ev.heap, &items)?);
        }
    }
    Err(EvalError::domain_error("list-convertible", obj.type_name(&ev.heap)).into())
}

fn convert_to_vector(ev: &mut Evaluator, obj: Value) -> EvalOutcome {
    if let Value::Ref(id) = obj {
        if matches!(ev.heap.get(id), HeapData::Vector(_)) {
            return Ok(obj);
        }
    }
    if obj.is_string(&ev.heap) {
        let chars: Vec<Value> = object::as_string(&ev.heap, obj)?.chars().map(Value::Character).collect();
        return Ok(object::make_vector(&mut ev.heap, chars)?);
    }
    if object::is_proper_list(&ev.heap, obj) {
        let items = object::list_to_vec(&ev.heap, obj, "convert")?;
        return Ok(object::make_vector(&mut ev.heap, items)?);
    }
    Err(EvalError::domain_error("vector-convertible", obj.type_name(&ev.heap)).into())
}

fn convert_to_integer(ev: &mut Evaluator, obj: Value) -> EvalOutcome {
    match obj {
        Value::Fixnum(_) => Ok(obj),
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(f) => Ok(Value::Fixnum(f.trunc() as i64)),
        _ => Err(EvalError::domain_error("integer-convertible", obj.type_name(&ev.heap)).into()),
    }
}

fn convert_to_float(ev: &mut Evaluator, obj: Value) -> EvalOutcome {
    match obj {
        Value::Float(_) => Ok(obj),
        #[allow(clippy::cast_precision_loss)]
        Value::Fixnum(n) => Ok(Value::Float(n as f64)),
        _ => Err(EvalError::domain_error("float-convertible", obj.type_name(&ev.heap)).into()),
    }
}

fn convert_to_character(ev: &mut Evaluator, obj: Value) -> EvalOutcome {
    if matches!(obj, Value::Character(_)) {
        return Ok(obj);
    }
    if obj.is_string(&ev.heap) {
        let text = object::as_string(&ev.heap, obj)?;
        let mut chars = text.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Ok(Value::Character(c));
        }
    }
    Err(EvalError::domain_error("character-convertible", obj.type_name(&ev.heap)).into())
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
    fn if_takes_the_else_branch_on_nil() {
        let mut ev = Evaluator::new();
        assert_eq!(eval_str(&mut ev, "(if nil 1 2)"), Value::Fixnum(2));
    }

    #[test]
    fn cond_falls_through_to_nil_with_no_matching_clause() {
        let mut ev = Evaluator::new();
        assert_eq!(eval_str(&mut ev, "(cond (nil 1))"), Value::Nil);
    }

    #[test]
    fn case_matches_one_of_several_keys_in_a_clause() {
        let mut ev = Evaluator::new();
        assert_eq!(eval_str(&mut ev, "(case 2 ((1 2) 'a) (t 'b))"), eval_str(&mut ev, "'a"));
    }

    #[test]
    fn and_short_circuits_on_the_first_nil() {
        let mut ev = Evaluator::new();
        assert_eq!(eval_str(&mut ev, "(and 1 nil (error))"), Value::Nil);
    }

    #[test]
    fn catch_and_throw_transfer_control_with_a_value() {
        let mut ev = Evaluator::new();
        assert_eq!(eval_str(&mut ev, "(catch 'tag (+ 1 (throw 'tag 42)))"), Value::Fixnum(42));
    }

    #[test]
    fn unthrown_tag_is_an_error() {
        let mut ev = Evaluator::new();
        let mut input = StringInputStream::new("(throw 'nobody-catches 1)");
        let mut reader = Reader::new(&mut input);
        let form = reader.read(&mut ev.heap, &mut ev.symbols, true, Value::Nil).unwrap();
        let err = ev.eval(form).unwrap_err();
        match err {
            Condition::Error(e) => assert_eq!(e.class, crate::error::ConditionClass::ControlError),
            Condition::Unwind(_) => panic!("expected an error, not an in-flight unwind escaping to top level"),
        }
    }

    #[test]
    fn block_and_return_from_transfer_control_with_a_value() {
        let mut ev = Evaluator::new();
        assert_eq!(
            eval_str(&mut ev, "(block done (+ 1 (return-from done 42)) 99)"),
            Value::Fixnum(42)
        );
    }

    #[test]
    fn tagbody_go_loops_back_to_a_label() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defglobal count 0)");
        eval_str(
            &mut ev,
            "(tagbody \
               top \
               (setq count (+ count 1)) \
               (if (< count 5) (go top)))",
        );
        assert_eq!(eval_str(&mut ev, "count"), Value::Fixnum(5));
    }

    #[test]
    fn unwind_protect_runs_cleanup_even_when_the_body_throws() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defglobal ran nil)");
        eval_str(&mut ev, "(catch 'tag (unwind-protect (throw 'tag 1) (setq ran t)))");
        assert_eq!(eval_str(&mut ev, "ran"), Value::T);
    }

    #[test]
    fn convert_round_trips_string_and_symbol() {
        let mut ev = Evaluator::new();
        let result = eval_str(&mut ev, "(convert 'hello <string>)");
        assert_eq!(object::as_string(&ev.heap, result).unwrap(), "hello");
        let back = eval_str(&mut ev, "(convert \"hello\" <symbol>)");
        assert_eq!(back, eval_str(&mut ev, "'hello"));
    }
}
