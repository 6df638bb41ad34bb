//! The object universe: the tagged `Value` type, its constructors,
//! predicates, accessors, and the three equality predicates (`eq`, `eql`,
//! `equal`).
//!
//! Following the teacher's `object.rs` split (an immediate-or-heap-ref
//! `Object`/`Value` pair, fallible `TryFrom`-style conversions instead of
//! panics), every compound or mutable object lives behind a [`HeapId`] and
//! every constructor here that allocates goes through [`Heap::alloc`], so a
//! constructor either returns a fully registered object or a
//! `storage-exhausted` condition — there is no window where a freshly built
//! object exists off-heap.

use crate::builtins::BuiltinId;
use crate::error::EvalError;
use crate::heap::{ConsCell, GeneralArray, Heap, HeapData, HeapId, HashTest, LispHashTable};
use crate::intern::SymbolId;

/// A value of the ISLISP-family object universe.
///
/// Immediate variants (`Nil`, `T`, `Fixnum`, `Float`, `Character`, `Symbol`,
/// `CFunction`, `CSpecial`) are `Copy` and live directly in this enum, the
/// way the teacher keeps `Object::Int`/`Object::Bool` immediate. Everything
/// else — conses, bignums, strings, vectors, arrays, hash tables, streams,
/// closures, macros, and ILOS objects — is addressed through [`HeapId`] via
/// `Ref`, mirroring the teacher's `Value::Ref(HeapId)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    T,
    Fixnum(i64),
    Float(f64),
    Character(char),
    Symbol(SymbolId),
    /// A built-in function: arguments are evaluated before the handler runs.
    CFunction(BuiltinId),
    /// A built-in special operator: the handler receives the unevaluated
    /// argument list.
    CSpecial(BuiltinId),
    Ref(HeapId),
}

impl Value {
    #[must_use]
    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    #[must_use]
    pub fn is_cons(self, heap: &Heap) -> bool {
        matches!(self, Value::Ref(id) if matches!(heap.get(id), HeapData::Cons(_)))
    }

    #[must_use]
    pub fn is_symbol(self) -> bool {
        matches!(self, Value::Symbol(_) | Value::Nil | Value::T)
    }

    #[must_use]
    pub fn is_fixnum(self) -> bool {
        matches!(self, Value::Fixnum(_))
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Value::Float(_))
    }

    #[must_use]
    pub fn is_character(self) -> bool {
        matches!(self, Value::Character(_))
    }

    #[must_use]
    pub fn is_string(self, heap: &Heap) -> bool {
        matches!(self, Value::Ref(id) if matches!(heap.get(id), HeapData::Str(_)))
    }

    #[must_use]
    pub fn is_number(self, heap: &Heap) -> bool {
        match self {
            Value::Fixnum(_) | Value::Float(_) => true,
            Value::Ref(id) => matches!(heap.get(id), HeapData::Bignum(_)),
            _ => false,
        }
    }

    /// Variant name, for `domain-error` diagnostics.
    #[must_use]
    pub fn type_name(self, heap: &Heap) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::T => "t",
            Value::Fixnum(_) => "fixnum",
            Value::Float(_) => "float",
            Value::Character(_) => "character",
            Value::Symbol(_) => "symbol",
            Value::CFunction(_) => "c-function",
            Value::CSpecial(_) => "c-special",
            Value::Ref(id) => match heap.get(id) {
                HeapData::Cons(_) => "cons",
                HeapData::Bignum(_) => "bignum",
                HeapData::Str(_) => "string",
                HeapData::Vector(_) => "general-vector",
                HeapData::Array(_) => "general-array",
                HeapData::HashTable(_) => "hash-table",
                HeapData::Stream(_) => "stream",
                HeapData::Closure(_) => "closure",
                HeapData::Macro(_) => "macro",
                HeapData::Ilos(_) => "ilos-object",
            },
        }
    }
}

/// Allocates a cons cell.
pub fn cons(heap: &mut Heap, car: Value, cdr: Value) -> Result<Value, EvalError> {
    let id = heap
        .alloc(HeapData::Cons(ConsCell { car, cdr }))
        .ok_or_else(EvalError::storage_exhausted)?;
    Ok(Value::Ref(id))
}

/// Allocates a string from its content.
pub fn make_string(heap: &mut Heap, content: impl Into<String>) -> Result<Value, EvalError> {
    let id = heap
        .alloc(HeapData::Str(content.into()))
        .ok_or_else(EvalError::storage_exhausted)?;
    Ok(Value::Ref(id))
}

/// Allocates a general vector.
pub fn make_vector(heap: &mut Heap, elements: Vec<Value>) -> Result<Value, EvalError> {
    let id = heap
        .alloc(HeapData::Vector(elements))
        .ok_or_else(EvalError::storage_exhausted)?;
    Ok(Value::Ref(id))
}

/// Allocates a general array over a flat, row-major element vector.
pub fn make_array(heap: &mut Heap, dimensions: Vec<usize>, elements: Vec<Value>) -> Result<Value, EvalError> {
    let id = heap
        .alloc(HeapData::Array(GeneralArray { dimensions, elements }))
        .ok_or_else(EvalError::storage_exhausted)?;
    Ok(Value::Ref(id))
}

/// Allocates an empty hash table with the given key-equality test.
pub fn make_hash_table(heap: &mut Heap, test: HashTest) -> Result<Value, EvalError> {
    let id = heap
        .alloc(HeapData::HashTable(LispHashTable { test, entries: Vec::new() }))
        .ok_or_else(EvalError::storage_exhausted)?;
    Ok(Value::Ref(id))
}

/// Allocates a bignum. Callers normally reach this only through overflowing
/// fixnum arithmetic (`spec.md`'s `Bignum` row); it is exposed directly for
/// the reader, which can produce an out-of-fixnum-range integer literal.
pub fn make_bignum(heap: &mut Heap, value: num_bigint::BigInt) -> Result<Value, EvalError> {
    let id = heap.alloc(HeapData::Bignum(value)).ok_or_else(EvalError::storage_exhausted)?;
    Ok(Value::Ref(id))
}

/// Builds a proper list from a slice, nil-terminated.
pub fn list_from_slice(heap: &mut Heap, items: &[Value]) -> Result<Value, EvalError> {
    let mut result = Value::Nil;
    for item in items.iter().rev() {
        result = cons(heap, *item, result)?;
    }
    Ok(result)
}

/// Collects a proper list into a `Vec`. Signals `improper-list` (tagged with
/// `context`) if `value` does not terminate in `Nil`.
pub fn list_to_vec(heap: &Heap, mut value: Value, context: &str) -> Result<Vec<Value>, EvalError> {
    let mut out = Vec::new();
    loop {
        match value {
            Value::Nil => return Ok(out),
            Value::Ref(id) => match heap.get(id) {
                HeapData::Cons(cell) => {
                    out.push(cell.car);
                    value = cell.cdr;
                }
                _ => return Err(EvalError::improper_list(context)),
            },
            _ => return Err(EvalError::improper_list(context)),
        }
    }
}

/// `true` if `value` is nil or a chain of conses ending in nil.
#[must_use]
pub fn is_proper_list(heap: &Heap, mut value: Value) -> bool {
    loop {
        match value {
            Value::Nil => return true,
            Value::Ref(id) => match heap.get(id) {
                HeapData::Cons(cell) => value = cell.cdr,
                _ => return false,
            },
            _ => return false,
        }
    }
}

/// Extracts `(car, cdr)` from a cons, or a `domain-error` if `value` is not
/// one.
pub fn as_cons(heap: &Heap, value: Value) -> Result<(Value, Value), EvalError> {
    match value {
        Value::Ref(id) => match heap.get(id) {
            HeapData::Cons(cell) => Ok((cell.car, cell.cdr)),
            _ => Err(EvalError::domain_error("cons", value.type_name(heap))),
        },
        _ => Err(EvalError::domain_error("cons", value.type_name(heap))),
    }
}

pub fn as_fixnum(heap: &Heap, value: Value) -> Result<i64, EvalError> {
    match value {
        Value::Fixnum(n) => Ok(n),
        _ => Err(EvalError::domain_error("fixnum", value.type_name(heap))),
    }
}

pub fn as_float(heap: &Heap, value: Value) -> Result<f64, EvalError> {
    match value {
        Value::Float(f) => Ok(f),
        _ => Err(EvalError::domain_error("float", value.type_name(heap))),
    }
}

pub fn as_character(heap: &Heap, value: Value) -> Result<char, EvalError> {
    match value {
        Value::Character(c) => Ok(c),
        _ => Err(EvalError::domain_error("character", value.type_name(heap))),
    }
}

pub fn as_symbol(heap: &Heap, value: Value) -> Result<SymbolId, EvalError> {
    match value {
        Value::Symbol(id) => Ok(id),
        _ => Err(EvalError::domain_error("symbol", value.type_name(heap))),
    }
}

pub fn as_string<'h>(heap: &'h Heap, value: Value) -> Result<&'h str, EvalError> {
    match value {
        Value::Ref(id) => match heap.get(id) {
            HeapData::Str(s) => Ok(s.as_str()),
            _ => Err(EvalError::domain_error("string", value.type_name(heap))),
        },
        _ => Err(EvalError::domain_error("string", value.type_name(heap))),
    }
}

pub fn as_vector<'h>(heap: &'h Heap, value: Value) -> Result<&'h [Value], EvalError> {
    match value {
        Value::Ref(id) => match heap.get(id) {
            HeapData::Vector(v) => Ok(v.as_slice()),
            _ => Err(EvalError::domain_error("general-vector", value.type_name(heap))),
        },
        _ => Err(EvalError::domain_error("general-vector", value.type_name(heap))),
    }
}

/// `eq`: identity equality. Immediate scalars of the same variant and value
/// are `eq` (there is only ever one machine representation for a given
/// fixnum/character, unlike floats which the specification still treats as
/// identity-comparable under `eq` when the bit patterns coincide, matching
/// typical ISLISP practice of boxing floats by value but comparing the box).
#[must_use]
pub fn eq(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) | (Value::T, Value::T) => true,
        (Value::Fixnum(x), Value::Fixnum(y)) => x == y,
        (Value::Character(x), Value::Character(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::CFunction(x), Value::CFunction(y)) | (Value::CSpecial(x), Value::CSpecial(y)) => x == y,
        (Value::Ref(x), Value::Ref(y)) => x == y,
        _ => false,
    }
}

/// `eql`: `eq`, extended to compare floats and bignums by value rather than
/// by heap identity.
#[must_use]
pub fn eql(heap: &Heap, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Ref(x), Value::Ref(y)) => {
            if x == y {
                return true;
            }
            matches!(
                (heap.get(x), heap.get(y)),
                (HeapData::Bignum(p), HeapData::Bignum(q)) if p == q
            )
        }
        _ => eq(a, b),
    }
}

/// `equal`: deep structural equality over conses, strings, vectors, and
/// arrays; falls back to `eql` everywhere else.
#[must_use]
pub fn equal(heap: &Heap, a: Value, b: Value) -> bool {
    if eql(heap, a, b) {
        return true;
    }
    match (a, b) {
        (Value::Ref(x), Value::Ref(y)) => match (heap.get(x), heap.get(y)) {
            (HeapData::Cons(p), HeapData::Cons(q)) => {
                equal(heap, p.car, q.car) && equal(heap, p.cdr, q.cdr)
            }
            (HeapData::Str(p), HeapData::Str(q)) => p == q,
            (HeapData::Vector(p), HeapData::Vector(q)) => {
                p.len() == q.len() && p.iter().zip(q.iter()).all(|(&pi, &qi)| equal(heap, pi, qi))
            }
            (HeapData::Array(p), HeapData::Array(q)) => {
                p.dimensions == q.dimensions
                    && p.elements.len() == q.elements.len()
                    && p.elements
                        .iter()
                        .zip(q.elements.iter())
                        .all(|(&pi, &qi)| equal(heap, pi, qi))
            }
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_and_t_are_identity_unique_singletons() {
        assert!(eq(Value::Nil, Value::Nil));
        assert!(!eq(Value::Nil, Value::T));
    }

    #[test]
    fn cons_round_trips_car_cdr() {
        let mut heap = Heap::new();
        let pair = cons(&mut heap, Value::Fixnum(1), Value::Nil).unwrap();
        let (car, cdr) = as_cons(&heap, pair).unwrap();
        assert_eq!(car, Value::Fixnum(1));
        assert_eq!(cdr, Value::Nil);
    }

    #[test]
    fn list_round_trips_through_slice() {
        let mut heap = Heap::new();
        let items = [Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3)];
        let list = list_from_slice(&mut heap, &items).unwrap();
        let back = list_to_vec(&heap, list, "test").unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn improper_list_is_rejected() {
        let mut heap = Heap::new();
        let dotted = cons(&mut heap, Value::Fixnum(1), Value::Fixnum(2)).unwrap();
        assert!(!is_proper_list(&heap, dotted));
        assert!(list_to_vec(&heap, dotted, "test").is_err());
    }

    #[test]
    fn equal_is_deep_but_eq_is_not() {
        let mut heap = Heap::new();
        let a = cons(&mut heap, Value::Fixnum(1), Value::Nil).unwrap();
        let b = cons(&mut heap, Value::Fixnum(1), Value::Nil).unwrap();
        assert!(!eq(a, b));
        assert!(equal(&heap, a, b));
    }

    #[test]
    fn domain_error_names_expected_and_actual_class() {
        let heap = Heap::new();
        let err = as_fixnum(&heap, Value::Nil).unwrap_err();
        assert_eq!(err.class, crate::error::ConditionClass::DomainError);
    }
}
