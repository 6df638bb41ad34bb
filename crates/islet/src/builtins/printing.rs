//! `format-object` and `prin1-to-string`: read-compatible textual output.
//!
//! Grounded on `original_source/print.c`'s `kiss_prin1`: strings are
//! re-escaped, characters print as `#\name` forms, and the output of
//! printing any value `v` is itself valid input to the reader — the
//! `read`/`print` round-trip property `spec.md` §8 tests.

use crate::eval::nonlocal::EvalOutcome;
use crate::eval::Evaluator;
use crate::heap::{Heap, HeapData};
use crate::intern::SymbolTable;
use crate::object::{self, Value};

use super::{BuiltinKind, BuiltinSpec};

pub const SPECS: &[BuiltinSpec] = &[
    BuiltinSpec {
        name: "format-object",
        kind: BuiltinKind::Function,
        min_arity: 2,
        max_arity: Some(2),
        handler: format_object,
    },
    BuiltinSpec {
        name: "prin1-to-string",
        kind: BuiltinKind::Function,
        min_arity: 1,
        max_arity: Some(1),
        handler: prin1_to_string,
    },
];

/// Renders `value` as read-compatible text (`spec.md`'s `prin1` family).
#[must_use]
pub fn print_to_string(heap: &Heap, symbols: &SymbolTable, value: Value) -> String {
    let mut out = String::new();
    write_value(heap, symbols, value, &mut out);
    out
}

fn write_value(heap: &Heap, symbols: &SymbolTable, value: Value, out: &mut String) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::T => out.push('t'),
        Value::Fixnum(n) => out.push_str(&n.to_string()),
        Value::Float(f) => out.push_str(&format_float(f)),
        Value::Character(c) => write_character(c, out),
        Value::Symbol(id) => out.push_str(symbols.name(id)),
        Value::CFunction(_) => out.push_str("#<c-function>"),
        Value::CSpecial(_) => out.push_str("#<c-special>"),
        Value::Ref(id) => write_heap_value(heap, symbols, id, out),
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

fn write_character(c: char, out: &mut String) {
    out.push_str("#\\");
    match c {
        ' ' => out.push_str("space"),
        '\n' => out.push_str("newline"),
        '\t' => out.push_str("tab"),
        other => out.push(other),
    }
}

fn write_heap_value(heap: &Heap, symbols: &SymbolTable, id: crate::heap::HeapId, out: &mut String) {
    match heap.get(id) {
        HeapData::Cons(_) => write_list(heap, symbols, Value::Ref(id), out),
        HeapData::Bignum(b) => out.push_str(&b.to_string()),
        HeapData::Str(s) => write_string(s, out),
        HeapData::Vector(items) => {
            out.push_str("#(");
            for (i, &item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(heap, symbols, item, out);
            }
            out.push(')');
        }
        HeapData::Array(array) => {
            out.push('#');
            out.push_str(&array.dimensions.len().to_string());
            out.push('a');
            write_array_nested(heap, symbols, &array.dimensions, &array.elements, out);
        }
        HeapData::HashTable(_) => out.push_str("#<hash-table>"),
        HeapData::Stream(_) => out.push_str("#<stream>"),
        HeapData::Closure(_) => out.push_str("#<closure>"),
        HeapData::Macro(_) => out.push_str("#<macro>"),
        HeapData::Ilos(obj) => {
            out.push_str("#<");
            out.push_str(symbols.name(obj.class));
            out.push('>');
        }
    }
}

fn write_array_nested(heap: &Heap, symbols: &SymbolTable, dims: &[usize], elements: &[Value], out: &mut String) {
    if dims.is_empty() {
        if let Some(&only) = elements.first() {
            write_value(heap, symbols, only, out);
        }
        return;
    }
    let (head, rest) = (dims[0], &dims[1..]);
    let stride: usize = rest.iter().product::<usize>().max(1);
    out.push('(');
    for i in 0..head {
        if i > 0 {
            out.push(' ');
        }
        write_array_nested(heap, symbols, rest, &elements[i * stride..(i + 1) * stride], out);
    }
    out.push(')');
}

fn write_list(heap: &Heap, symbols: &SymbolTable, mut value: Value, out: &mut String) {
    out.push('(');
    let mut first = true;
    loop {
        match value {
            Value::Nil => break,
            Value::Ref(id) => match heap.get(id) {
                HeapData::Cons(cell) => {
                    if !first {
                        out.push(' ');
                    }
                    first = false;
                    write_value(heap, symbols, cell.car, out);
                    value = cell.cdr;
                }
                _ => {
                    out.push_str(" . ");
                    write_value(heap, symbols, value, out);
                    break;
                }
            },
            other => {
                out.push_str(" . ");
                write_value(heap, symbols, other, out);
                break;
            }
        }
    }
    out.push(')');
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn format_object(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "format-object")?;
    let text = print_to_string(&ev.heap, &ev.symbols, args[0]);
    let Value::Ref(id) = args[1] else {
        return Err(crate::error::EvalError::domain_error("stream", args[1].type_name(&ev.heap)).into());
    };
    match ev.heap.get_mut(id) {
        HeapData::Stream(stream) => {
            for c in text.chars() {
                stream.write_char(c)?;
            }
            Ok(args[0])
        }
        _ => Err(crate::error::EvalError::domain_error("stream", args[1].type_name(&ev.heap)).into()),
    }
}

fn prin1_to_string(ev: &mut Evaluator, form: Value) -> EvalOutcome {
    let args = object::list_to_vec(&ev.heap, form, "prin1-to-string")?;
    let text = print_to_string(&ev.heap, &ev.symbols, args[0]);
    Ok(object::make_string(&mut ev.heap, text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_list_read_compatibly() {
        let mut ev = Evaluator::new();
        let list = object::list_from_slice(&mut ev.heap, &[Value::Fixnum(1), Value::Fixnum(2)]).unwrap();
        assert_eq!(print_to_string(&ev.heap, &ev.symbols, list), "(1 2)");
    }

    #[test]
    fn prints_dotted_pair() {
        let mut ev = Evaluator::new();
        let pair = object::cons(&mut ev.heap, Value::Fixnum(1), Value::Fixnum(2)).unwrap();
        assert_eq!(print_to_string(&ev.heap, &ev.symbols, pair), "(1 . 2)");
    }

    #[test]
    fn prints_string_with_escapes() {
        let mut ev = Evaluator::new();
        let s = object::make_string(&mut ev.heap, "a\"b").unwrap();
        assert_eq!(print_to_string(&ev.heap, &ev.symbols, s), "\"a\\\"b\"");
    }

    #[test]
    fn prin1_to_string_allocates_a_string_object() {
        let mut ev = Evaluator::new();
        let form = object::list_from_slice(&mut ev.heap, &[Value::Fixnum(42)]).unwrap();
        let result = prin1_to_string(&mut ev, form).unwrap();
        assert_eq!(object::as_string(&ev.heap, result).unwrap(), "42");
    }
}
