//! The condition taxonomy signalled by the reader and evaluator.
//!
//! Mirrors the teacher's `exception_private::ExcType` pattern: a plain enum
//! with `strum`-derived `Display`/`EnumString`/`IntoStaticStr`, not a
//! `thiserror` derive. Every condition named in the specification's error
//! taxonomy has a variant here; variants carry just enough data to render a
//! useful diagnostic and, where available, the offending fragment.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can signal a condition.
pub type EvalResult<T> = Result<T, EvalError>;

/// The abstract condition classes named in the specification's error
/// taxonomy (`spec.md` §7). These are condition *classes*, not Rust types
/// in their own right — [`EvalError`] pairs one of these with a message and
/// optional offending fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ConditionClass {
    /// Wrong variant supplied where a specific class was required.
    DomainError,
    /// Argument count outside a callable's declared min/max.
    ArityError,
    /// A variable name lookup failed.
    UnboundVariable,
    /// A function name lookup failed.
    UnboundFunction,
    /// An operation that requires a proper list was given an improper one.
    ImproperList,
    /// A sequence index fell outside its valid range.
    IndexOutOfRange,
    /// Division or modulo by zero.
    DivisionByZero,
    /// The reader could not make sense of the input.
    ParseError,
    /// End of stream reached where `eos-error-p` was non-nil.
    EndOfStream,
    /// `throw`/`return-from`/`go` found no matching frame, or a quasi-quote
    /// operator (`,` / `,@`) appeared outside a backquote.
    ControlError,
    /// A class name lookup failed.
    UnboundClass,
    /// No applicable method was found for a generic function call.
    UndefinedMethod,
    /// The heap could not satisfy an allocation request.
    StorageExhausted,
}

/// A signalled condition: a [`ConditionClass`] plus a human-readable message
/// and, for reader errors, the offending fragment of source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub class: ConditionClass,
    pub message: String,
    /// The fragment of source text that triggered a reader error, when
    /// available (`spec.md` §7: "the reader's parse errors include the
    /// offending fragment where available").
    pub fragment: Option<String>,
}

impl EvalError {
    #[must_use]
    pub fn new(class: ConditionClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            fragment: None,
        }
    }

    #[must_use]
    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    #[must_use]
    pub fn domain_error(expected: &str, actual: &str) -> Self {
        Self::new(
            ConditionClass::DomainError,
            format!("expected an object of class {expected}, got {actual}"),
        )
    }

    #[must_use]
    pub fn arity_error(callable: &str, min: usize, max: Option<usize>, got: usize) -> Self {
        let arity = match max {
            Some(max) if max == min => format!("{min}"),
            Some(max) => format!("{min}..={max}"),
            None => format!("at least {min}"),
        };
        Self::new(
            ConditionClass::ArityError,
            format!("{callable}: expected {arity} argument(s), got {got}"),
        )
    }

    #[must_use]
    pub fn unbound_variable(name: &str) -> Self {
        Self::new(ConditionClass::UnboundVariable, format!("unbound variable: {name}"))
    }

    #[must_use]
    pub fn unbound_function(name: &str) -> Self {
        Self::new(ConditionClass::UnboundFunction, format!("unbound function: {name}"))
    }

    #[must_use]
    pub fn improper_list(context: &str) -> Self {
        Self::new(ConditionClass::ImproperList, format!("{context}: expected a proper list"))
    }

    #[must_use]
    pub fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::new(
            ConditionClass::IndexOutOfRange,
            format!("index {index} out of range for length {len}"),
        )
    }

    #[must_use]
    pub fn division_by_zero(op: &str) -> Self {
        Self::new(ConditionClass::DivisionByZero, format!("{op}: division by zero"))
    }

    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ConditionClass::ParseError, message)
    }

    #[must_use]
    pub fn end_of_stream() -> Self {
        Self::new(ConditionClass::EndOfStream, "end of stream")
    }

    #[must_use]
    pub fn control_error(message: impl Into<String>) -> Self {
        Self::new(ConditionClass::ControlError, message)
    }

    #[must_use]
    pub fn unbound_class(name: &str) -> Self {
        Self::new(ConditionClass::UnboundClass, format!("unbound class: {name}"))
    }

    #[must_use]
    pub fn undefined_method(name: &str) -> Self {
        Self::new(ConditionClass::UndefinedMethod, format!("no applicable method: {name}"))
    }

    #[must_use]
    pub fn storage_exhausted() -> Self {
        Self::new(ConditionClass::StorageExhausted, "storage exhausted")
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)?;
        if let Some(fragment) = &self.fragment {
            write!(f, " (in: {fragment})")?;
        }
        Ok(())
    }
}

impl std::error::Error for EvalError {}
