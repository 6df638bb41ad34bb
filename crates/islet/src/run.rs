//! The top-level read/eval/print driver (`spec.md` §6's read-eval-print
//! contract, supplemented by §3.10): read a form, evaluate it against a
//! shared [`Evaluator`], print the result or report an unhandled
//! condition, repeat until end of stream.
//!
//! Grounded on `ouros-cli/src/main.rs`'s no-`clap`, read-a-file-run-it
//! simplicity and `ouros::repl`'s read-eval-print shape, cut down to this
//! crate's much smaller surface: no persistent session snapshotting, no
//! external-function/future machinery, no progress enum to drive — just
//! "read a form, eval it, record what happened", with printing and
//! process-exit handling left to the `islet-cli` binary.

use crate::builtins::printing::print_to_string;
use crate::error::ConditionClass;
use crate::eval::nonlocal::Condition;
use crate::eval::Evaluator;
use crate::object::Value;
use crate::reader::Reader;
use crate::streams::{CharSource, StringInputStream};

/// Outcome of evaluating one top-level form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormOutcome {
    /// The form evaluated to this value.
    Value(Value),
    /// An unhandled condition was signalled; this is its diagnostic text
    /// (`spec.md` §7: "An unhandled condition at the top level prints a
    /// diagnostic to the error stream and returns control to the
    /// read-eval-print host").
    Condition(String),
    /// The reader could not parse the remaining input; evaluation stops
    /// here, same as an unhandled condition.
    ReadError(String),
}

/// Reads and evaluates every form in `source` against `evaluator` in turn,
/// returning one [`FormOutcome`] per form. Stops cleanly at end of stream;
/// stops early (after recording a [`FormOutcome::ReadError`]) if the reader
/// cannot make sense of what follows.
pub fn run_forms<S: CharSource>(evaluator: &mut Evaluator, source: &mut S) -> Vec<FormOutcome> {
    let mut reader = Reader::new(source);
    let mut outcomes = Vec::new();
    loop {
        let form = match reader.read(&mut evaluator.heap, &mut evaluator.symbols, true, Value::Nil) {
            Ok(form) => form,
            Err(e) if e.class == ConditionClass::EndOfStream => break,
            Err(e) => {
                outcomes.push(FormOutcome::ReadError(e.to_string()));
                break;
            }
        };
        match evaluator.eval(form) {
            Ok(value) => outcomes.push(FormOutcome::Value(value)),
            Err(Condition::Error(e)) => outcomes.push(FormOutcome::Condition(e.to_string())),
            Err(Condition::Unwind(unwind)) => {
                let target = match unwind.goto_label {
                    Some(label) => format!("go {}", evaluator.symbols.name(label)),
                    None => "throw/return-from".to_owned(),
                };
                outcomes.push(FormOutcome::Condition(format!(
                    "control-error: unhandled non-local exit ({target}, frame {})",
                    unwind.frame_id
                )));
            }
        }
    }
    outcomes
}

/// Owns one [`Evaluator`] across a sequence of top-level reads, the way a
/// REPL session carries definitions forward from one input to the next.
pub struct Runner {
    pub evaluator: Evaluator,
}

impl Runner {
    #[must_use]
    pub fn new() -> Self {
        Self { evaluator: Evaluator::new() }
    }

    /// Evaluates every form in `source` and renders a transcript: one line
    /// per form, either its printed value or a `; error: ...` diagnostic.
    /// Later forms in the same call see definitions made by earlier ones,
    /// and the session persists across calls on the same `Runner`.
    pub fn run_str(&mut self, source: &str) -> String {
        let mut input = StringInputStream::new(source);
        let outcomes = run_forms(&mut self.evaluator, &mut input);
        render(&self.evaluator, &outcomes)
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

fn render(evaluator: &Evaluator, outcomes: &[FormOutcome]) -> String {
    let mut out = String::new();
    for outcome in outcomes {
        match outcome {
            FormOutcome::Value(value) => {
                out.push_str(&print_to_string(&evaluator.heap, &evaluator.symbols, *value));
                out.push('\n');
            }
            FormOutcome::Condition(message) | FormOutcome::ReadError(message) => {
                out.push_str("; error: ");
                out.push_str(message);
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_forms_see_earlier_definitions() {
        let mut runner = Runner::new();
        let output = runner.run_str("(defglobal x 10) (+ x 5)");
        assert_eq!(output, "10\n15\n");
    }

    #[test]
    fn definitions_persist_across_separate_calls() {
        let mut runner = Runner::new();
        runner.run_str("(defun double (n) (* n 2))");
        assert_eq!(runner.run_str("(double 21)"), "42\n");
    }

    #[test]
    fn an_unhandled_error_is_reported_without_aborting_the_whole_run() {
        let mut runner = Runner::new();
        let output = runner.run_str("(car 1) 2");
        let mut lines = output.lines();
        assert!(lines.next().unwrap().starts_with("; error: domain-error"));
        assert_eq!(lines.next(), Some("2"));
    }

    #[test]
    fn an_escaping_throw_is_reported_as_a_control_error() {
        let mut runner = Runner::new();
        let output = runner.run_str("(throw 'nobody 1)");
        assert!(output.starts_with("; error: control-error"));
    }
}
