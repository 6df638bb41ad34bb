//! Form dispatch, argument evaluation, and callable invocation: the
//! recursive tree-walking evaluator (`spec.md` §4.5).
//!
//! The five callable flavors share [`Evaluator::invoke`] as a single entry
//! point, matching the design note in `spec.md` §9 ("Callable
//! polymorphism") and the literal structure of `kiss_invoke` in
//! `original_source/eval.c`: one dispatch on the callable's variant, one
//! heap watermark taken before and rewound after, regardless of which
//! flavor ran.

pub mod binding;
pub mod control;
pub mod generic;
pub mod nonlocal;

use crate::builtins::{BuiltinId, BuiltinTable};
use crate::environment::Environment;
use crate::error::EvalError;
use crate::function::{Closure, ParamTemplate};
use crate::heap::{Heap, HeapData};
use crate::ilos::{GenericDispatch, GenericTable, NoGenericDispatch};
use crate::intern::{SymbolId, SymbolTable};
use crate::object::{self, Value};
use nonlocal::{Condition, EvalOutcome, Unwind};

/// Owns the heap, symbol table, environment, builtin registry, the
/// in-crate `defgeneric`/`defmethod` registry, and the host-supplied
/// generic-dispatch hook — everything one evaluation session needs.
/// Construct one per independent program; forms evaluated through the same
/// `Evaluator` share state exactly as the specification's global symbol
/// table, dynamic stack, and class namespace require.
pub struct Evaluator {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub env: Environment,
    pub builtins: BuiltinTable,
    /// Methods registered by `defgeneric`/`defmethod`, checked first; an
    /// ILOS object whose class is not registered here falls through to
    /// `generic_dispatch` below, the host's extension point for generic
    /// functions this crate doesn't define itself.
    pub generics: GenericTable,
    pub generic_dispatch: Box<dyn GenericDispatch>,
}

impl Evaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::with_generic_dispatch(Box::new(NoGenericDispatch))
    }

    #[must_use]
    pub fn with_generic_dispatch(generic_dispatch: Box<dyn GenericDispatch>) -> Self {
        let mut symbols = SymbolTable::new();
        let builtins = BuiltinTable::standard(&mut symbols);
        Self {
            heap: Heap::new(),
            symbols,
            env: Environment::new(),
            builtins,
            generics: GenericTable::default(),
            generic_dispatch,
        }
    }

    /// Whether `name`'s function slot is already bound to the marker ILOS
    /// object `defgeneric`/`defmethod` recognize as "this name is a generic
    /// function" — used by `defmethod` to decide whether it needs to bind
    /// one itself.
    #[must_use]
    pub fn generics_marker_is_bound(&self, name: SymbolId) -> bool {
        matches!(
            self.symbols.get(name).function,
            Some(Value::Ref(id)) if matches!(self.heap.get(id), HeapData::Ilos(obj) if obj.class == name)
        )
    }

    /// `eval(form)` (`spec.md` §6): self-evaluating atoms return
    /// themselves, a non-keyword symbol is a variable reference, a cons is
    /// a compound form.
    pub fn eval(&mut self, form: Value) -> EvalOutcome {
        match form {
            Value::Symbol(id) => match self.env.lookup_variable(id) {
                Some(cell) => Ok(*cell.borrow()),
                None => match self.symbols.get(id).value {
                    Some(v) => Ok(v),
                    None => Err(EvalError::unbound_variable(self.symbols.name(id)).into()),
                },
            },
            Value::Ref(id) if matches!(self.heap.get(id), HeapData::Cons(_)) => self.eval_compound(form),
            other => Ok(other),
        }
    }

    fn eval_compound(&mut self, form: Value) -> EvalOutcome {
        let (head, args) = object::as_cons(&self.heap, form).map_err(Condition::from)?;
        match head {
            Value::Symbol(id) => {
                let callable = self.env.lookup_lexical_function(id).or(self.symbols.get(id).function);
                match callable {
                    Some(callable) => self.invoke(callable, args),
                    None => Err(EvalError::unbound_function(self.symbols.name(id)).into()),
                }
            }
            _ if self.is_lambda_form(head) => {
                let closure = build_closure(self, head)?;
                self.invoke(closure, args)
            }
            _ => Err(EvalError::domain_error("callable-form-head", head.type_name(&self.heap)).into()),
        }
    }

    pub(crate) fn is_lambda_form(&self, head: Value) -> bool {
        match object::as_cons(&self.heap, head) {
            Ok((Value::Symbol(s), _)) => self.symbols.name(s) == "lambda",
            _ => false,
        }
    }

    /// A proper list of forms evaluated sequentially; the last form's
    /// value is returned, an empty body returns `nil` (`spec.md` §4.5).
    pub fn eval_body(&mut self, body: Value) -> EvalOutcome {
        let forms = object::list_to_vec(&self.heap, body, "body").map_err(Condition::from)?;
        let mut result = Value::Nil;
        for form in forms {
            result = self.eval(form)?;
        }
        Ok(result)
    }

    /// Evaluates each element of a proper argument list left-to-right.
    fn eval_args(&mut self, args_form: Value) -> Result<Vec<Value>, Condition> {
        let forms = object::list_to_vec(&self.heap, args_form, "argument-list").map_err(Condition::from)?;
        let mut out = Vec::with_capacity(forms.len());
        for form in forms {
            out.push(self.eval(form)?);
        }
        Ok(out)
    }

    /// The single invocation entry point shared by all five callable
    /// flavors. Snapshots the heap watermark before dispatch and rewinds
    /// it after, promoting the result (or, when unwinding, the in-transit
    /// value) below the watermark — the literal translation of
    /// `kiss_invoke`.
    pub fn invoke(&mut self, callable: Value, args_form: Value) -> EvalOutcome {
        let watermark = self.heap.mark();
        match self.invoke_inner(callable, args_form) {
            Ok(value) => Ok(self.heap.rewind(watermark, value)),
            Err(Condition::Unwind(unwind)) => {
                let value = self.heap.rewind(watermark, unwind.value);
                Err(Condition::Unwind(Unwind { value, ..unwind }))
            }
            Err(err) => Err(err),
        }
    }

    fn invoke_inner(&mut self, callable: Value, args_form: Value) -> EvalOutcome {
        match callable {
            Value::CFunction(id) => {
                let arg_values = self.eval_args(args_form)?;
                self.check_arity(id, arg_values.len())?;
                let list = object::list_from_slice(&mut self.heap, &arg_values).map_err(Condition::from)?;
                let handler = self.builtins.get(id).handler;
                handler(self, list)
            }
            Value::CSpecial(id) => {
                let count = object::list_to_vec(&self.heap, args_form, "special-operator-args")
                    .map_err(Condition::from)?
                    .len();
                self.check_arity(id, count)?;
                let handler = self.builtins.get(id).handler;
                handler(self, args_form)
            }
            Value::Ref(id) => {
                let data = self.heap.get(id).clone();
                match data {
                    HeapData::Closure(closure) => {
                        let arg_values = self.eval_args(args_form)?;
                        self.apply_closure(&closure, arg_values)
                    }
                    HeapData::Macro(m) => {
                        let raw_args =
                            object::list_to_vec(&self.heap, args_form, "macro-args").map_err(Condition::from)?;
                        let expansion = self.apply_closure(&m.closure, raw_args)?;
                        self.eval(expansion)
                    }
                    HeapData::Ilos(obj) => {
                        if self.generics.is_defined(obj.class) {
                            let arg_values = self.eval_args(args_form)?;
                            self.invoke_generic_function(obj.class, arg_values)
                        } else if self.generic_dispatch.is_generic_function(callable) {
                            let arg_values = self.eval_args(args_form)?;
                            self.generic_dispatch.invoke(callable, &arg_values).map_err(Condition::from)
                        } else {
                            Err(EvalError::undefined_method(self.symbols.name(obj.class)).into())
                        }
                    }
                    _ => Err(EvalError::domain_error("callable", callable.type_name(&self.heap)).into()),
                }
            }
            _ => Err(EvalError::domain_error("callable", callable.type_name(&self.heap)).into()),
        }
    }

    /// Invokes `callable` on already-evaluated arguments, the way
    /// `funcall`/`apply`/`case-using`'s per-key test function need to —
    /// `invoke` always treats its argument list as unevaluated forms, which
    /// is wrong once the values in hand might themselves be conses that
    /// would otherwise be mistaken for compound forms. Mirrors `invoke`'s
    /// watermark wrapping; does not accept `Value::CSpecial`, since a
    /// special operator's contract is to receive raw forms.
    pub fn apply(&mut self, callable: Value, args: Vec<Value>) -> EvalOutcome {
        let watermark = self.heap.mark();
        match self.apply_inner(callable, args) {
            Ok(value) => Ok(self.heap.rewind(watermark, value)),
            Err(Condition::Unwind(unwind)) => {
                let value = self.heap.rewind(watermark, unwind.value);
                Err(Condition::Unwind(Unwind { value, ..unwind }))
            }
            Err(err) => Err(err),
        }
    }

    fn apply_inner(&mut self, callable: Value, args: Vec<Value>) -> EvalOutcome {
        match callable {
            Value::CFunction(id) => {
                self.check_arity(id, args.len())?;
                let list = object::list_from_slice(&mut self.heap, &args).map_err(Condition::from)?;
                let handler = self.builtins.get(id).handler;
                handler(self, list)
            }
            Value::Ref(id) => {
                let data = self.heap.get(id).clone();
                match data {
                    HeapData::Closure(closure) => self.apply_closure(&closure, args),
                    HeapData::Ilos(obj) => {
                        if self.generics.is_defined(obj.class) {
                            self.invoke_generic_function(obj.class, args)
                        } else if self.generic_dispatch.is_generic_function(callable) {
                            self.generic_dispatch.invoke(callable, &args).map_err(Condition::from)
                        } else {
                            Err(EvalError::undefined_method(self.symbols.name(obj.class)).into())
                        }
                    }
                    _ => Err(EvalError::domain_error("callable", callable.type_name(&self.heap)).into()),
                }
            }
            _ => Err(EvalError::domain_error("callable", callable.type_name(&self.heap)).into()),
        }
    }

    fn check_arity(&self, id: BuiltinId, got: usize) -> Result<(), Condition> {
        let spec = self.builtins.get(id);
        if got < spec.min_arity || spec.max_arity.is_some_and(|max| got > max) {
            return Err(EvalError::arity_error(spec.name, spec.min_arity, spec.max_arity, got).into());
        }
        Ok(())
    }

    /// Resolves and runs the method applicable to `args` on the generic
    /// function `name`, dispatching on the class-precedence list of the
    /// first argument only (`ilos::GenericFunctionEntry::resolve`).
    fn invoke_generic_function(&mut self, name: SymbolId, args: Vec<Value>) -> EvalOutcome {
        let precedence_list = match args.first() {
            Some(&first) => self.class_precedence_list(first),
            None => vec!["t".to_owned()],
        };
        let closure = self
            .generics
            .get(name)
            .and_then(|entry| entry.resolve(&precedence_list))
            .cloned();
        match closure {
            Some(closure) => self.apply_closure(&closure, args),
            None => Err(EvalError::undefined_method(self.symbols.name(name)).into()),
        }
    }

    /// The class-precedence list used for generic-function dispatch:
    /// depth-first over `ClassRef::superclasses` for an ILOS instance,
    /// ending in `"t"`; a single built-in type name ending in `"t"`
    /// otherwise. Compared by name rather than `SymbolId`, since a
    /// `defmethod` specializer need not have been interned in the same
    /// order as the classes it is meant to match.
    fn class_precedence_list(&self, value: Value) -> Vec<String> {
        if let Value::Ref(id) = value {
            if let HeapData::Ilos(obj) = self.heap.get(id) {
                let mut chain = Vec::new();
                let mut pending = vec![obj.class];
                while let Some(class_name) = pending.pop() {
                    let printed = self.symbols.name(class_name).to_owned();
                    if chain.contains(&printed) {
                        continue;
                    }
                    chain.push(printed);
                    if let Some(class) = self.env.lookup_class(class_name) {
                        pending.extend(class.superclasses.iter().rev().copied());
                    }
                }
                chain.push("t".to_owned());
                return chain;
            }
        }
        vec![builtin_class_name(value, &self.heap).to_owned(), "t".to_owned()]
    }

    /// Runs a closure's body against exactly its captured lexical and
    /// function namespaces plus its freshly bound parameters — not on top
    /// of whatever the caller's dynamic call stack happens to hold. The
    /// entire lexical/function stacks are swapped out for the duration of
    /// the call and swapped back afterward, so a closure invoked deep in
    /// some other call's dynamic extent still only sees what was visible
    /// where it was defined (`spec.md` §4.3's lexical-scope guarantee).
    /// Dynamic bindings and non-local-exit targets are deliberately left
    /// alone: those are dynamically, not lexically, scoped.
    fn apply_closure(&mut self, closure: &Closure, args: Vec<Value>) -> EvalOutcome {
        let callable_name = closure.name.map_or("lambda", |n| self.symbols.name(n));
        let param_frame = self.bind_params(&closure.params, args, callable_name)?;
        let mut capture_frame = crate::environment::LexicalFrame::new();
        for (name, cell) in &closure.captured {
            capture_frame.bind_cell(*name, cell.clone());
        }
        let mut fn_frame = crate::environment::FunctionFrame::default();
        fn_frame.bindings = closure.captured_functions.iter().copied().collect();
        let saved_lexical = self.env.swap_lexical(vec![capture_frame, param_frame]);
        let saved_functions = self.env.swap_functions(vec![fn_frame]);
        let result = self.eval_body(closure.body);
        self.env.swap_lexical(saved_lexical);
        self.env.swap_functions(saved_functions);
        result
    }

    fn bind_params(
        &mut self,
        params: &ParamTemplate,
        args: Vec<Value>,
        callable_name: &str,
    ) -> Result<crate::environment::LexicalFrame, Condition> {
        let min = params.min_arity();
        let max = params.max_arity();
        if args.len() < min || max.is_some_and(|m| args.len() > m) {
            return Err(EvalError::arity_error(callable_name, min, max, args.len()).into());
        }
        let mut frame = crate::environment::LexicalFrame::new();
        let mut iter = args.into_iter();
        for &name in &params.required {
            frame.bind(name, iter.next().expect("arity already checked"));
        }
        if let Some(rest_name) = params.rest {
            let rest_items: Vec<Value> = iter.collect();
            let rest_list = object::list_from_slice(&mut self.heap, &rest_items).map_err(Condition::from)?;
            frame.bind(rest_name, rest_list);
        }
        Ok(frame)
    }
}

/// The built-in class name a value dispatches under when it is not an ILOS
/// instance. Collapses `fixnum`/`bignum` into ISLISP's single `integer`
/// class; everything else matches [`Value::type_name`] under a slightly
/// different name where ISLISP's class names diverge from this crate's
/// internal variant names.
fn builtin_class_name(value: Value, heap: &Heap) -> &'static str {
    match value {
        Value::Nil => "null",
        Value::T => "symbol",
        Value::Fixnum(_) => "integer",
        Value::Float(_) => "float",
        Value::Character(_) => "character",
        Value::Symbol(_) => "symbol",
        Value::CFunction(_) | Value::CSpecial(_) => "function",
        Value::Ref(id) => match heap.get(id) {
            HeapData::Cons(_) => "cons",
            HeapData::Bignum(_) => "integer",
            HeapData::Str(_) => "string",
            HeapData::Vector(_) => "general-vector",
            HeapData::Array(_) => "general-array",
            HeapData::HashTable(_) => "hash-table",
            HeapData::Stream(_) => "stream",
            HeapData::Closure(_) => "function",
            HeapData::Macro(_) => "function",
            HeapData::Ilos(_) => "object",
        },
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a parameter template list: required symbols, then an optional
/// `&rest`/`:rest` tail collector (`spec.md` §4.5).
pub(crate) fn parse_param_template(
    heap: &Heap,
    symbols: &SymbolTable,
    params_form: Value,
) -> Result<ParamTemplate, EvalError> {
    let items = object::list_to_vec(heap, params_form, "parameter-list")?;
    let mut required = Vec::new();
    let mut rest = None;
    let mut i = 0;
    while i < items.len() {
        let sym = object::as_symbol(heap, items[i])?;
        let name = symbols.name(sym);
        if name == "&rest" || name == ":rest" {
            i += 1;
            let rest_item = items
                .get(i)
                .ok_or_else(|| EvalError::parse_error("&rest must be followed by a parameter name"))?;
            rest = Some(object::as_symbol(heap, *rest_item)?);
            break;
        }
        required.push(sym);
        i += 1;
    }
    Ok(ParamTemplate { required, rest })
}

/// Builds a [`Closure`] (allocated on the heap, wrapped as `Value::Ref`)
/// from an already-split parameter list and body, capturing the current
/// lexical variable and function namespaces. Shared by the `lambda`/
/// `function`/`defun`/`defmacro`/`flet`/`labels` special operators, which
/// differ only in what they do with the resulting value and in which
/// environment snapshot they call this at.
pub(crate) fn build_closure_from_parts(
    ev: &mut Evaluator,
    params_form: Value,
    body: Value,
    name: Option<SymbolId>,
) -> Result<Value, Condition> {
    let params = parse_param_template(&ev.heap, &ev.symbols, params_form).map_err(Condition::from)?;
    let captured = ev.env.capture();
    let captured_functions = ev.env.capture_functions();
    let closure = Closure { params, body, captured, captured_functions, name };
    let id = ev
        .heap
        .alloc(HeapData::Closure(closure))
        .ok_or_else(EvalError::storage_exhausted)
        .map_err(Condition::from)?;
    Ok(Value::Ref(id))
}

/// Builds a [`Closure`] from a raw `(lambda (params...) body...)` form — the
/// shape a compound form's head takes when it is itself a lambda expression
/// rather than a symbol (`spec.md` §4.5: "a cons whose car is `lambda` is
/// made into an anonymous closure and invoked").
pub(crate) fn build_closure(ev: &mut Evaluator, lambda_form: Value) -> Result<Value, Condition> {
    let (_lambda_sym, rest) = object::as_cons(&ev.heap, lambda_form).map_err(Condition::from)?;
    let (params_form, body) = object::as_cons(&ev.heap, rest).map_err(Condition::from)?;
    build_closure_from_parts(ev, params_form, body, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::StringInputStream;

    fn eval_str(ev: &mut Evaluator, src: &str) -> Value {
        let mut input = StringInputStream::new(src);
        let mut reader = crate::reader::Reader::new(&mut input);
        let form = reader.read(&mut ev.heap, &mut ev.symbols, true, Value::Nil).unwrap();
        match ev.eval(form) {
            Ok(v) => v,
            Err(Condition::Error(e)) => panic!("eval error: {e}"),
            Err(Condition::Unwind(_)) => panic!("unexpected unwind at top level"),
        }
    }

    #[test]
    fn self_evaluating_fixnum() {
        let mut ev = Evaluator::new();
        assert_eq!(eval_str(&mut ev, "42"), Value::Fixnum(42));
    }

    #[test]
    fn quote_returns_identity() {
        let mut ev = Evaluator::new();
        let quoted = eval_str(&mut ev, "(quote (1 2 3))");
        let items = object::list_to_vec(&ev.heap, quoted, "test").unwrap();
        assert_eq!(items, vec![Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3)]);
    }

    #[test]
    fn arithmetic_sums_left_to_right() {
        let mut ev = Evaluator::new();
        assert_eq!(eval_str(&mut ev, "(+ 1 2 3)"), Value::Fixnum(6));
    }

    #[test]
    fn unbound_variable_signals() {
        let mut ev = Evaluator::new();
        let mut input = StringInputStream::new("unbound-thing");
        let mut reader = crate::reader::Reader::new(&mut input);
        let form = reader.read(&mut ev.heap, &mut ev.symbols, true, Value::Nil).unwrap();
        let err = ev.eval(form).unwrap_err();
        match err {
            Condition::Error(e) => assert_eq!(e.class, crate::error::ConditionClass::UnboundVariable),
            Condition::Unwind(_) => panic!("expected an error, not an unwind"),
        }
    }

    #[test]
    fn lambda_call_binds_parameters() {
        let mut ev = Evaluator::new();
        assert_eq!(eval_str(&mut ev, "((lambda (x y) (+ x y)) 3 4)"), Value::Fixnum(7));
    }

    #[test]
    fn factorial_recursion() {
        let mut ev = Evaluator::new();
        eval_str(&mut ev, "(defun fact (n) (if (<= n 1) 1 (* n (fact (- n 1)))))");
        assert_eq!(eval_str(&mut ev, "(fact 10)"), Value::Fixnum(3628800));
    }
}
