//! Lexical frames, the dynamic-binding stack, the function/class
//! namespaces, and the non-local-exit stack (`spec.md` §4.3).
//!
//! Lexical frames are `SmallVec`-backed: the teacher reaches for
//! `smallvec::SmallVec` wherever a collection is usually small (argument
//! lists, namespace slot lists) but occasionally large, and a parameter
//! list is exactly that shape here.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::function::Binding;
use crate::ilos::ClassRef;
use crate::intern::SymbolId;
use crate::object::Value;

/// One pushed lexical scope: `let`/`let*` bindings, or a closure's
/// parameter bindings on invocation.
#[derive(Debug, Default, Clone)]
pub struct LexicalFrame {
    pub bindings: SmallVec<[(SymbolId, Binding); 4]>,
}

impl LexicalFrame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: SymbolId, value: Value) {
        self.bindings.push((name, std::rc::Rc::new(std::cell::RefCell::new(value))));
    }

    pub fn bind_cell(&mut self, name: SymbolId, cell: Binding) {
        self.bindings.push((name, cell));
    }

    #[must_use]
    pub fn lookup(&self, name: SymbolId) -> Option<Binding> {
        self.bindings.iter().rev().find(|(n, _)| *n == name).map(|(_, c)| c.clone())
    }
}

/// A lexically-scoped function binding frame (`flet`/`labels`, `spec.md`
/// §4.3's "lexical function stack").
#[derive(Debug, Default, Clone)]
pub struct FunctionFrame {
    pub bindings: SmallVec<[(SymbolId, Value); 4]>,
}

impl FunctionFrame {
    #[must_use]
    pub fn lookup(&self, name: SymbolId) -> Option<Value> {
        self.bindings.iter().rev().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }
}

/// What kind of target a non-local-exit frame represents (`spec.md` §4.5's
/// `catch`/`block`/`tagbody`).
#[derive(Debug, Clone)]
pub enum ExitKind {
    /// `tag` is compared to a thrown tag by `eq` (identity).
    Catch { tag: Value },
    /// `name` is compared by symbol identity.
    Block { name: SymbolId },
    /// Labels reachable by `go`, compared by identity; a `go` to one of
    /// these rewinds to this frame and resumes at the labelled form.
    TagBody { labels: Vec<SymbolId> },
}

/// One entry in the non-local-exit stack.
#[derive(Debug, Clone)]
pub struct ExitFrame {
    pub id: u64,
    pub kind: ExitKind,
    /// Heap watermark recorded when this frame was pushed; unwinding to
    /// this frame rewinds the heap here (`spec.md` §4.6 point 4).
    pub heap_watermark: usize,
}

/// Holds everything the evaluator threads through a recursive descent:
/// lexical and dynamic bindings, the function/class namespaces, and the
/// active non-local-exit targets.
pub struct Environment {
    lexical: Vec<LexicalFrame>,
    functions: Vec<FunctionFrame>,
    dynamic: Vec<(SymbolId, Value)>,
    classes: AHashMap<SymbolId, ClassRef>,
    exits: Vec<ExitFrame>,
    next_exit_id: u64,
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lexical: Vec::new(),
            functions: Vec::new(),
            dynamic: Vec::new(),
            classes: AHashMap::new(),
            exits: Vec::new(),
            next_exit_id: 0,
        }
    }

    pub fn push_lexical(&mut self, frame: LexicalFrame) {
        self.lexical.push(frame);
    }

    pub fn pop_lexical(&mut self) {
        self.lexical.pop();
    }

    #[must_use]
    pub fn lookup_variable(&self, name: SymbolId) -> Option<Binding> {
        self.lexical.iter().rev().find_map(|frame| frame.lookup(name))
    }

    /// Adds a binding to the innermost pushed lexical frame in place, for
    /// `let*`'s "each init form sees the previous bindings" sequencing.
    pub fn bind_in_top(&mut self, name: SymbolId, value: Value) {
        if let Some(frame) = self.lexical.last_mut() {
            frame.bind(name, value);
        }
    }

    pub fn push_function_frame(&mut self, frame: FunctionFrame) {
        self.functions.push(frame);
    }

    pub fn pop_function_frame(&mut self) {
        self.functions.pop();
    }

    /// Replaces the entire lexical stack with `stack`, returning the
    /// previous one. A closure call uses this (rather than pushing on top
    /// of the caller's frames) so the body sees exactly the closure's
    /// captured bindings plus its own parameters — never whatever happens
    /// to be on the caller's dynamic call stack.
    pub fn swap_lexical(&mut self, stack: Vec<LexicalFrame>) -> Vec<LexicalFrame> {
        std::mem::replace(&mut self.lexical, stack)
    }

    /// As [`Environment::swap_lexical`], for the lexical function
    /// namespace; this is what makes `flet`'s and `labels'` differing
    /// `captured_functions` snapshots actually isolate a closure's function
    /// visibility instead of merely shadowing on top of it.
    pub fn swap_functions(&mut self, stack: Vec<FunctionFrame>) -> Vec<FunctionFrame> {
        std::mem::replace(&mut self.functions, stack)
    }

    #[must_use]
    pub fn lookup_lexical_function(&self, name: SymbolId) -> Option<Value> {
        self.functions.iter().rev().find_map(|frame| frame.lookup(name))
    }

    /// Flattens every binding visible right now, innermost first — the
    /// snapshot a newly created closure captures (`spec.md`'s "captured
    /// lexical env").
    #[must_use]
    pub fn capture(&self) -> Vec<(SymbolId, Binding)> {
        let mut seen = ahash::AHashSet::new();
        let mut out = Vec::new();
        for frame in self.lexical.iter().rev() {
            for (name, cell) in frame.bindings.iter().rev() {
                if seen.insert(*name) {
                    out.push((*name, cell.clone()));
                }
            }
        }
        out
    }

    /// Flattens every lexical function binding visible right now, innermost
    /// first — the snapshot a newly created closure captures for `flet`/
    /// `labels` scoping (`spec.md` §4.3).
    #[must_use]
    pub fn capture_functions(&self) -> Vec<(SymbolId, Value)> {
        let mut seen = ahash::AHashSet::new();
        let mut out = Vec::new();
        for frame in self.functions.iter().rev() {
            for (name, value) in frame.bindings.iter().rev() {
                if seen.insert(*name) {
                    out.push((*name, *value));
                }
            }
        }
        out
    }

    /// Pushes a dynamic binding (`dynamic-let`), to be restored with
    /// [`Environment::pop_dynamic`] regardless of exit path.
    pub fn push_dynamic(&mut self, name: SymbolId, value: Value) {
        self.dynamic.push((name, value));
    }

    pub fn pop_dynamic(&mut self) {
        self.dynamic.pop();
    }

    #[must_use]
    pub fn lookup_dynamic(&self, name: SymbolId) -> Option<Value> {
        self.dynamic.iter().rev().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    /// Sets the innermost dynamic binding for `name` in place
    /// (`set-dynamic`). Returns `false` if no binding for `name` exists.
    pub fn set_dynamic(&mut self, name: SymbolId, value: Value) -> bool {
        match self.dynamic.iter_mut().rev().find(|(n, _)| *n == name) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn define_class(&mut self, class: ClassRef) {
        self.classes.insert(class.name, class);
    }

    #[must_use]
    pub fn lookup_class(&self, name: SymbolId) -> Option<&ClassRef> {
        self.classes.get(&name)
    }

    /// Pushes a non-local-exit frame, returning its unique id.
    pub fn push_exit(&mut self, kind: ExitKind, heap_watermark: usize) -> u64 {
        let id = self.next_exit_id;
        self.next_exit_id += 1;
        self.exits.push(ExitFrame { id, kind, heap_watermark });
        id
    }

    pub fn pop_exit(&mut self) {
        self.exits.pop();
    }

    /// All frames from innermost to outermost, for a `throw`/`return-from`/
    /// `go` search.
    #[must_use]
    pub fn exit_frames(&self) -> impl Iterator<Item = &ExitFrame> {
        self.exits.iter().rev()
    }

    #[must_use]
    pub fn exit_depth(&self) -> usize {
        self.exits.len()
    }

    /// Truncates the exit stack back to (and including) the frame with
    /// `id`, as part of unwinding to it.
    pub fn truncate_exits_to(&mut self, id: u64) {
        if let Some(pos) = self.exits.iter().position(|f| f.id == id) {
            self.exits.truncate(pos + 1);
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_lookup_respects_shadowing_by_stack_order() {
        let mut table = crate::intern::SymbolTable::new();
        let x = table.intern("x");
        let mut env = Environment::new();
        let mut outer = LexicalFrame::new();
        outer.bind(x, Value::Fixnum(1));
        env.push_lexical(outer);
        let mut inner = LexicalFrame::new();
        inner.bind(x, Value::Fixnum(2));
        env.push_lexical(inner);
        assert_eq!(*env.lookup_variable(x).unwrap().borrow(), Value::Fixnum(2));
        env.pop_lexical();
        assert_eq!(*env.lookup_variable(x).unwrap().borrow(), Value::Fixnum(1));
    }

    #[test]
    fn dynamic_binding_restores_on_pop() {
        let mut table = crate::intern::SymbolTable::new();
        let x = table.intern("x");
        let mut env = Environment::new();
        env.push_dynamic(x, Value::Fixnum(1));
        env.push_dynamic(x, Value::Fixnum(2));
        assert_eq!(env.lookup_dynamic(x), Some(Value::Fixnum(2)));
        env.pop_dynamic();
        assert_eq!(env.lookup_dynamic(x), Some(Value::Fixnum(1)));
    }

    #[test]
    fn capture_flattens_without_duplicate_names() {
        let mut table = crate::intern::SymbolTable::new();
        let x = table.intern("x");
        let y = table.intern("y");
        let mut env = Environment::new();
        let mut outer = LexicalFrame::new();
        outer.bind(x, Value::Fixnum(1));
        env.push_lexical(outer);
        let mut inner = LexicalFrame::new();
        inner.bind(x, Value::Fixnum(2));
        inner.bind(y, Value::Fixnum(3));
        env.push_lexical(inner);
        let snapshot = env.capture();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(*snapshot.iter().find(|(n, _)| *n == x).unwrap().1.borrow(), Value::Fixnum(2));
    }

    #[test]
    fn exit_frame_search_finds_innermost_matching_catch_tag() {
        let mut env = Environment::new();
        let tag = Value::Fixnum(7);
        env.push_exit(ExitKind::Catch { tag: Value::Fixnum(1) }, 0);
        let inner_id = env.push_exit(ExitKind::Catch { tag }, 0);
        let found = env
            .exit_frames()
            .find(|f| matches!(&f.kind, ExitKind::Catch { tag: t } if crate::object::eq(*t, tag)))
            .map(|f| f.id);
        assert_eq!(found, Some(inner_id));
    }
}
