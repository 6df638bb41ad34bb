//! The watermark heap.
//!
//! Grounded directly on `kiss_invoke` in the original KISS evaluator: a call
//! records the heap's current length (the "heap index") before dispatching,
//! and on return rewinds the heap back to that length, discarding every
//! object allocated while evaluating the call's arguments and body. Anything
//! the call actually returns is copied down below the watermark first, so it
//! survives the rewind; anything else — intermediate conses, temporary
//! vectors — is garbage by construction and never needs a trace/sweep pass.
//!
//! This gives the evaluator arena-style bump allocation (`alloc` is a
//! `Vec::push`) with GC-like reclamation, without a mark phase: reachability
//! from the watermark's perspective is exactly "was it in the call's return
//! value". The cost is that a long-lived object referenced only through a
//! deeply nested return (e.g. the tail of a big list built and returned by a
//! recursive function) gets copied once per stack frame it escapes through;
//! the specification accepts this in exchange for never needing a collector.

use std::collections::HashMap;

use crate::function::Closure;
use crate::ilos::IlosObject;
use crate::object::Value;
use crate::streams::StreamHandle;

/// Handle to a heap-allocated object. `Copy`; meaningless once the slot it
/// names has been rewound past, same as a stale pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(u32);

impl HeapId {
    fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).expect("heap overflowed u32::MAX live objects"))
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The equality test governing a hash table's key lookup (`spec.md` §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashTest {
    Eq,
    Eql,
    Equal,
}

/// A mutable cons cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsCell {
    pub car: Value,
    pub cdr: Value,
}

/// A Lisp hash table. Backed by a flat association vector rather than a
/// `std`/`ahash` map: the three possible key equalities (`eq`, `eql`,
/// `equal`) each need a different notion of hash, and `equal` in particular
/// requires hashing through the heap, which a `Hash` impl on `Value` alone
/// cannot express. Tables in this interpreter are small enough in practice
/// that linear scan is not a bottleneck; `spec.md`'s Non-goals exclude a
/// performance-tuned hash table.
#[derive(Debug, Clone)]
pub struct LispHashTable {
    pub test: HashTest,
    pub entries: Vec<(Value, Value)>,
}

/// A general array: row-major elements over a dimension list
/// (`spec.md` §4.1's general array, `#Na(...)` in the reader).
#[derive(Debug, Clone)]
pub struct GeneralArray {
    pub dimensions: Vec<usize>,
    pub elements: Vec<Value>,
}

/// One cell of an ILOS method table keyed by a macro-like form; see
/// `crate::ilos` for the generic-dispatch story this module only stores
/// data for.
#[derive(Debug, Clone)]
pub struct LispMacro {
    pub closure: Closure,
}

/// Everything that lives on the heap rather than inline in a [`Value`].
#[derive(Debug, Clone)]
pub enum HeapData {
    Cons(ConsCell),
    Bignum(num_bigint::BigInt),
    Str(String),
    Vector(Vec<Value>),
    Array(GeneralArray),
    HashTable(LispHashTable),
    Stream(StreamHandle),
    Closure(Closure),
    Macro(LispMacro),
    Ilos(IlosObject),
}

/// Snapshot of heap occupancy, in the spirit of the teacher's `HeapStats`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapStats {
    pub live_objects: usize,
    pub objects_by_kind: Vec<(&'static str, usize)>,
}

impl HeapData {
    fn kind(&self) -> &'static str {
        match self {
            HeapData::Cons(_) => "cons",
            HeapData::Bignum(_) => "bignum",
            HeapData::Str(_) => "string",
            HeapData::Vector(_) => "vector",
            HeapData::Array(_) => "array",
            HeapData::HashTable(_) => "hash-table",
            HeapData::Stream(_) => "stream",
            HeapData::Closure(_) => "closure",
            HeapData::Macro(_) => "macro",
            HeapData::Ilos(_) => "ilos-object",
        }
    }

}

/// A heap-exhaustion ceiling. `None` means unbounded (the default); callers
/// embedding `islet` in a resource-constrained host can set a soft limit,
/// after which `alloc` signals `storage-exhausted` rather than growing
/// further (`spec.md` §5's "soft, caller-configurable ceiling").
pub struct Heap {
    slots: Vec<HeapData>,
    soft_limit: Option<usize>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            soft_limit: None,
        }
    }

    #[must_use]
    pub fn with_soft_limit(limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            soft_limit: Some(limit),
        }
    }

    /// Allocates `data`, returning its handle. Fails with `None` if a soft
    /// limit is set and already reached; callers translate this to
    /// `storage-exhausted` (`crate::error::EvalError::storage_exhausted`).
    pub fn alloc(&mut self, data: HeapData) -> Option<HeapId> {
        if let Some(limit) = self.soft_limit {
            if self.slots.len() >= limit {
                return None;
            }
        }
        let id = HeapId::from_index(self.slots.len());
        self.slots.push(data);
        Some(id)
    }

    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.slots[id.index()]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.slots[id.index()]
    }

    /// Records the current heap index, to be passed to [`Heap::rewind`]
    /// once the call this mark guards has produced a result.
    #[must_use]
    pub fn mark(&self) -> usize {
        self.slots.len()
    }

    /// Rewinds the heap to `watermark`, first promoting anything `result`
    /// transitively references that lives at or past the watermark down
    /// into the surviving region. This is the literal translation of
    /// `kiss_invoke`'s save-dispatch-restore sequence.
    ///
    /// Promoted objects are assembled in a side buffer first (their final
    /// index, `watermark + position`, is known as soon as they are queued,
    /// which is what lets a cycle resolve through `remap` without a
    /// second fixup pass) and only appended once the old region above
    /// `watermark` has been discarded, so a promoted object's final slot
    /// never aliases a slot being truncated away.
    pub fn rewind(&mut self, watermark: usize, result: Value) -> Value {
        if self.slots.len() <= watermark {
            return result;
        }
        let mut remap: HashMap<u32, HeapId> = HashMap::new();
        let mut staging: Vec<HeapData> = Vec::new();
        let promoted = self.promote(result, watermark, &mut remap, &mut staging);
        self.slots.truncate(watermark);
        self.slots.extend(staging);
        promoted
    }

    fn promote(
        &self,
        value: Value,
        watermark: usize,
        remap: &mut HashMap<u32, HeapId>,
        staging: &mut Vec<HeapData>,
    ) -> Value {
        let Value::Ref(id) = value else {
            return value;
        };
        if id.index() < watermark {
            return value;
        }
        if let Some(&new_id) = remap.get(&(id.0)) {
            return Value::Ref(new_id);
        }
        // Reserve `new_id` and register it before recursing into children,
        // so a cycle back to `id` resolves through `remap` instead of
        // recursing forever.
        let new_id = HeapId::from_index(watermark + staging.len());
        remap.insert(id.0, new_id);
        let data = self.slots[id.index()].clone();
        staging.push(data.clone());
        let promoted_data = self.promote_children(data, watermark, remap, staging);
        staging[new_id.index() - watermark] = promoted_data;
        Value::Ref(new_id)
    }

    fn promote_children(
        &self,
        data: HeapData,
        watermark: usize,
        remap: &mut HashMap<u32, HeapId>,
        staging: &mut Vec<HeapData>,
    ) -> HeapData {
        match data {
            HeapData::Cons(cell) => HeapData::Cons(ConsCell {
                car: self.promote(cell.car, watermark, remap, staging),
                cdr: self.promote(cell.cdr, watermark, remap, staging),
            }),
            HeapData::Vector(items) => HeapData::Vector(
                items
                    .into_iter()
                    .map(|v| self.promote(v, watermark, remap, staging))
                    .collect(),
            ),
            HeapData::Array(array) => HeapData::Array(GeneralArray {
                dimensions: array.dimensions,
                elements: array
                    .elements
                    .into_iter()
                    .map(|v| self.promote(v, watermark, remap, staging))
                    .collect(),
            }),
            HeapData::HashTable(table) => HeapData::HashTable(LispHashTable {
                test: table.test,
                entries: table
                    .entries
                    .into_iter()
                    .map(|(k, v)| {
                        (
                            self.promote(k, watermark, remap, staging),
                            self.promote(v, watermark, remap, staging),
                        )
                    })
                    .collect(),
            }),
            HeapData::Closure(closure) => {
                self.promote_captured(&closure.captured, watermark, remap, staging);
                let captured_functions = closure
                    .captured_functions
                    .iter()
                    .map(|&(name, v)| (name, self.promote(v, watermark, remap, staging)))
                    .collect();
                HeapData::Closure(Closure { captured_functions, ..closure })
            }
            HeapData::Macro(m) => {
                self.promote_captured(&m.closure.captured, watermark, remap, staging);
                let captured_functions = m
                    .closure
                    .captured_functions
                    .iter()
                    .map(|&(name, v)| (name, self.promote(v, watermark, remap, staging)))
                    .collect();
                let closure = Closure { captured_functions, ..m.closure };
                HeapData::Macro(LispMacro { closure })
            }
            other @ (HeapData::Bignum(_) | HeapData::Str(_) | HeapData::Stream(_) | HeapData::Ilos(_)) => other,
        }
    }

    /// Promotes in place through shared binding cells captured by a closure
    /// or macro. Unlike the other `promote_children` arms this mutates
    /// through the `Rc<RefCell<_>>` rather than rebuilding an owned value,
    /// since the cell may be shared with a still-live lexical frame outside
    /// the heap and must keep observing the same allocation.
    fn promote_captured(
        &self,
        captured: &[(crate::intern::SymbolId, crate::function::Binding)],
        watermark: usize,
        remap: &mut HashMap<u32, HeapId>,
        staging: &mut Vec<HeapData>,
    ) {
        for (_, cell) in captured {
            let current = *cell.borrow();
            let promoted = self.promote(current, watermark, remap, staging);
            *cell.borrow_mut() = promoted;
        }
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut by_kind: Vec<(&'static str, usize)> = Vec::new();
        for slot in &self.slots {
            let kind = slot.kind();
            match by_kind.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, count)) => *count += 1,
                None => by_kind.push((kind, 1)),
            }
        }
        HeapStats {
            live_objects: self.slots.len(),
            objects_by_kind: by_kind,
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewind_without_escaping_refs_drops_everything() {
        let mut heap = Heap::new();
        let mark = heap.mark();
        heap.alloc(HeapData::Str("scratch".into())).unwrap();
        heap.alloc(HeapData::Str("more scratch".into())).unwrap();
        let result = heap.rewind(mark, Value::Fixnum(42));
        assert_eq!(result, Value::Fixnum(42));
        assert_eq!(heap.stats().live_objects, mark);
    }

    #[test]
    fn rewind_promotes_the_returned_cons() {
        let mut heap = Heap::new();
        let mark = heap.mark();
        let cons_id = heap
            .alloc(HeapData::Cons(ConsCell {
                car: Value::Fixnum(1),
                cdr: Value::Nil,
            }))
            .unwrap();
        heap.alloc(HeapData::Str("discarded".into())).unwrap();
        let result = heap.rewind(mark, Value::Ref(cons_id));
        let Value::Ref(new_id) = result else {
            panic!("expected a promoted ref");
        };
        match heap.get(new_id) {
            HeapData::Cons(cell) => assert_eq!(cell.car, Value::Fixnum(1)),
            other => panic!("expected cons, got {other:?}"),
        }
    }

    #[test]
    fn rewind_promotes_through_a_cycle_without_looping_forever() {
        let mut heap = Heap::new();
        let mark = heap.mark();
        let id = heap
            .alloc(HeapData::Cons(ConsCell {
                car: Value::Nil,
                cdr: Value::Nil,
            }))
            .unwrap();
        if let HeapData::Cons(cell) = heap.get_mut(id) {
            cell.car = Value::Ref(id);
        }
        let result = heap.rewind(mark, Value::Ref(id));
        let Value::Ref(new_id) = result else {
            panic!("expected a promoted ref");
        };
        match heap.get(new_id) {
            HeapData::Cons(cell) => assert_eq!(cell.car, Value::Ref(new_id)),
            other => panic!("expected cons, got {other:?}"),
        }
    }

    #[test]
    fn soft_limit_signals_exhaustion() {
        let mut heap = Heap::with_soft_limit(1);
        assert!(heap.alloc(HeapData::Str("a".into())).is_some());
        assert!(heap.alloc(HeapData::Str("b".into())).is_none());
    }
}
