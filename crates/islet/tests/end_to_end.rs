//! End-to-end scenarios, one per row of the testable-properties table:
//! arithmetic, recursion, quasiquote splicing, catch/throw, and
//! unwind-protect cleanup ordering under a non-local exit.

use islet::{Condition, Evaluator, Value};

fn eval_one(ev: &mut Evaluator, src: &str) -> Value {
    let mut input = islet::StringInputStream::new(src);
    let mut reader = islet::Reader::new(&mut input);
    let form = reader.read(&mut ev.heap, &mut ev.symbols, true, Value::Nil).unwrap();
    match ev.eval(form) {
        Ok(v) => v,
        Err(Condition::Error(e)) => panic!("eval error: {e}"),
        Err(Condition::Unwind(_)) => panic!("unexpected unwind escaping to top level"),
    }
}

#[test]
fn arithmetic_sums_left_to_right() {
    let mut ev = Evaluator::new();
    assert_eq!(eval_one(&mut ev, "(+ 1 2 3)"), Value::Fixnum(6));
}

#[test]
fn factorial_of_ten() {
    let mut ev = Evaluator::new();
    eval_one(&mut ev, "(defun fact (n) (if (<= n 1) 1 (* n (fact (- n 1)))))");
    assert_eq!(eval_one(&mut ev, "(fact 10)"), Value::Fixnum(3_628_800));
}

#[test]
fn quasiquote_splices_a_list_in_the_middle() {
    let mut ev = Evaluator::new();
    eval_one(&mut ev, "(defglobal xs (list 2 3 4))");
    let result = eval_one(&mut ev, "`(1 ,@xs 5)");
    let items = islet::object::list_to_vec(&ev.heap, result, "test").unwrap();
    assert_eq!(
        items,
        vec![Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3), Value::Fixnum(4), Value::Fixnum(5)]
    );
}

#[test]
fn catch_throw_transfers_exactly_the_thrown_value() {
    let mut ev = Evaluator::new();
    assert_eq!(eval_one(&mut ev, "(catch 'tag (progn (throw 'tag 42) 99))"), Value::Fixnum(42));
}

#[test]
fn unwind_protect_cleanup_runs_on_a_non_local_exit_through_it() {
    let mut ev = Evaluator::new();
    eval_one(&mut ev, "(defglobal log nil)");
    eval_one(
        &mut ev,
        "(catch 'e (unwind-protect (throw 'e 'out) (setq log (cons 'cleanup log))))",
    );
    let log = eval_one(&mut ev, "log");
    let items = islet::object::list_to_vec(&ev.heap, log, "test").unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(ev.symbols.name(islet::object::as_symbol(&ev.heap, items[0]).unwrap()), "cleanup");
}

#[test]
fn nested_unwind_protects_run_cleanups_inner_to_outer() {
    let mut ev = Evaluator::new();
    eval_one(&mut ev, "(defglobal log nil)");
    eval_one(
        &mut ev,
        "(catch 'e \
           (unwind-protect \
             (unwind-protect \
               (throw 'e 'out) \
               (setq log (cons 'inner log))) \
             (setq log (cons 'outer log))))",
    );
    let log = eval_one(&mut ev, "log");
    let items = islet::object::list_to_vec(&ev.heap, log, "test").unwrap();
    let names: Vec<&str> = items
        .iter()
        .map(|&v| ev.symbols.name(islet::object::as_symbol(&ev.heap, v).unwrap()))
        .collect();
    // `log` is built by successive `cons`es, so the innermost cleanup (pushed
    // first) ends up last in the printed list.
    assert_eq!(names, vec!["outer", "inner"]);
}
