//! The non-local control-transfer signal threaded alongside ordinary
//! errors.
//!
//! `spec.md` §9 models `throw`/`return-from`/`go` as "a single
//! `unwind-to(frame-id, value)` primitive that pops the control stack,
//! running cleanups, until the matching frame is on top." [`Unwind`] is
//! that primitive, carried in the `Err` side of [`EvalOutcome`] alongside
//! ordinary [`EvalError`]s so `?` can propagate either uniformly through
//! the recursive evaluator without a second, parallel `Result` type at
//! every call site.

use crate::error::EvalError;
use crate::intern::SymbolId;
use crate::object::Value;

/// A pending non-local exit in flight: unwind to the frame named `frame_id`,
/// delivering `value`. `goto_label` is set only for `tagbody`/`go`, where
/// the target frame must additionally know which label to resume at,
/// rather than simply returning a value to its caller.
#[derive(Debug, Clone)]
pub struct Unwind {
    pub frame_id: u64,
    pub value: Value,
    pub goto_label: Option<SymbolId>,
}

/// Either an ordinary signalled condition, or a non-local exit in transit.
#[derive(Debug, Clone)]
pub enum Condition {
    Error(EvalError),
    Unwind(Unwind),
}

impl From<EvalError> for Condition {
    fn from(err: EvalError) -> Self {
        Condition::Error(err)
    }
}

/// The result type threaded through every evaluation step.
pub type EvalOutcome = Result<Value, Condition>;
