//! Reader round-trip properties (`spec.md` §8): vectors, general arrays,
//! the consing dot, and `read(print(x))` identity for readable forms.

use islet::heap::HeapData;
use islet::{Evaluator, Reader, StringInputStream, Value};

fn read_one(ev: &mut Evaluator, src: &str) -> Value {
    let mut input = StringInputStream::new(src);
    let mut reader = Reader::new(&mut input);
    reader.read(&mut ev.heap, &mut ev.symbols, true, Value::Nil).unwrap()
}

#[test]
fn sharp_paren_reads_a_general_vector() {
    let mut ev = Evaluator::new();
    let v = read_one(&mut ev, "#(1 2 3)");
    let Value::Ref(id) = v else { panic!("expected a heap ref") };
    match ev.heap.get(id) {
        HeapData::Vector(items) => assert_eq!(items, &[Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3)]),
        other => panic!("expected a vector, got {other:?}"),
    }
}

#[test]
fn sharp_2a_reads_a_2x2_general_array() {
    let mut ev = Evaluator::new();
    let v = read_one(&mut ev, "#2a((1 2) (3 4))");
    let Value::Ref(id) = v else { panic!("expected a heap ref") };
    match ev.heap.get(id) {
        HeapData::Array(array) => {
            assert_eq!(array.dimensions, vec![2, 2]);
            assert_eq!(array.elements, vec![Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3), Value::Fixnum(4)]);
        }
        other => panic!("expected a general array, got {other:?}"),
    }
}

#[test]
fn consing_dot_round_trips_through_print() {
    let mut ev = Evaluator::new();
    let dotted = read_one(&mut ev, "(a b . c)");
    let printed = islet::builtins::printing::print_to_string(&ev.heap, &ev.symbols, dotted);
    assert_eq!(printed, "(a b . c)");
    let reread = read_one(&mut ev, &printed);
    assert!(islet::object::equal(&ev.heap, dotted, reread));
}

#[test]
fn proper_list_printed_form_reads_back_as_a_proper_list() {
    let mut ev = Evaluator::new();
    let list = read_one(&mut ev, "(1 2 3)");
    assert!(islet::object::is_proper_list(&ev.heap, list));
    let printed = islet::builtins::printing::print_to_string(&ev.heap, &ev.symbols, list);
    let reread = read_one(&mut ev, &printed);
    assert!(islet::object::is_proper_list(&ev.heap, reread));
    assert!(islet::object::equal(&ev.heap, list, reread));
}

#[test]
fn fixnum_print_read_round_trip_is_identity() {
    let mut ev = Evaluator::new();
    for n in [0_i64, 1, -1, 42, -100_000] {
        let printed = islet::builtins::printing::print_to_string(&ev.heap, &ev.symbols, Value::Fixnum(n));
        let reread = read_one(&mut ev, &printed);
        assert_eq!(reread, Value::Fixnum(n));
    }
}
