//! Evaluation entry point and the assignment fallback of the dispatcher.
//!
//! [`InterpreterSession::evaluate`] tries the cheap resolutions first
//! (`ans`, literals, locals, stored vectors, model parameters), then the
//! vector call forms, and only then parses the text as an algebraic
//! expression.  The session is also the [`EvalContext`] that expression
//! trees and functionoids call back into.

use std::rc::Rc;

use rand::Rng;
use tracing::debug;

use crate::error::{HcomError, HcomResult};
use crate::host::{LogDataStore, OptimizationBridge, VectorRef};

use super::builtins::{call_vector_form, is_call_form};
use super::commands;
use super::expr::{eval_str, math_arity, EvalContext};
use super::interp::{is_protected, InterpreterSession};
use super::names::split_generation;
use super::text::{is_valid_variable_name, split_call, strip_redundant_parens};
use super::value::{format_scalar, ScriptValue, ValueKind};

impl InterpreterSession {
    /// Evaluate `expr`, optionally requiring a result kind.
    ///
    /// A successful result becomes the new `ans`.  A kind mismatch, or text
    /// that resolves to nothing, gives `Wildcard(expr)`.
    pub fn evaluate(&mut self, expr: &str, desired: Option<ValueKind>) -> ScriptValue {
        let text = strip_redundant_parens(expr);
        if text.is_empty() {
            return ScriptValue::Wildcard(expr.trim().to_owned());
        }
        let result = match self.resolve_atom(text, desired) {
            Some(v) => v,
            None => self.evaluate_compound(text),
        };
        let result = match result {
            ScriptValue::Wildcard(_) => ScriptValue::Wildcard(text.to_owned()),
            v if v.is_ok() && !v.fits(desired) => ScriptValue::Wildcard(text.to_owned()),
            v => v,
        };
        if result.is_ok() {
            self.ans = result.clone();
        }
        result
    }

    /// `ans`, numbers, locals, vectors and parameters.
    fn resolve_atom(&mut self, text: &str, desired: Option<ValueKind>) -> Option<ScriptValue> {
        if text == "ans" && self.ans.is_ok() && self.ans.fits(desired) {
            return Some(self.ans.clone());
        }
        if desired != Some(ValueKind::Vector) {
            if let Ok(x) = text.parse::<f64>() {
                return Some(ScriptValue::Scalar(x));
            }
            if let Some(x) = self.locals.get(text) {
                return Some(ScriptValue::Scalar(*x));
            }
        }
        if desired != Some(ValueKind::Scalar) {
            if let Some(v) = self.find_vector(text) {
                return Some(ScriptValue::Vector(v));
            }
        }
        if desired != Some(ValueKind::Vector) {
            if let Some(x) = self.parameter_scalar(text) {
                return Some(ScriptValue::Scalar(x));
            }
        }
        None
    }

    fn evaluate_compound(&mut self, text: &str) -> ScriptValue {
        if let Some((name, args)) = split_call(text) {
            if is_call_form(name) {
                if let Some(v) = call_vector_form(name, args, self) {
                    return v;
                }
            }
        }
        eval_str(text, self)
    }

    /// Resolve a name to a stored vector, printing any generation warning.
    pub(crate) fn find_vector(&mut self, name: &str) -> Option<VectorRef> {
        let (found, warning) = self.resolver().lookup_vector(name);
        if let Some(w) = warning {
            self.warning(&w);
        }
        found
    }

    /// Numeric value of a model parameter.  A value naming a system
    /// parameter is followed once.
    fn parameter_scalar(&self, name: &str) -> Option<f64> {
        let value = self.resolver().parameter_value(name)?;
        let value = value.trim();
        if let Ok(x) = value.parse::<f64>() {
            return Some(x);
        }
        self.model.parameter_value(value)?.trim().parse::<f64>().ok()
    }

    pub(crate) fn is_parameter(&self, name: &str) -> bool {
        self.resolver().parameter_long_name(name).is_some()
    }

    // ── Assignment and bare expressions ───────────────────────────────────────

    /// Fallback for lines that are not commands.
    pub(crate) fn assign_or_evaluate(&mut self, line: &str) -> HcomResult<()> {
        let unknown = || HcomError::Resolution(format!("Unknown command or failed to evaluate: {line}"));
        if line.ends_with('*') {
            return Err(unknown());
        }
        if let Some(pos) = find_assignment(line) {
            let left = line[..pos].trim();
            let right = line[pos + 1..].trim();
            return match self.evaluate(right, None) {
                ScriptValue::Scalar(x) => self.assign_scalar(left, x),
                ScriptValue::Vector(v) => self.assign_vector(left, v),
                _ => Err(unknown()),
            };
        }
        match self.evaluate(line, None) {
            ScriptValue::Scalar(x) => {
                self.print(&format_scalar(x));
                Ok(())
            }
            ScriptValue::Vector(v) => {
                let short = self.names.to_short_name(&v.borrow().name);
                self.print(&short);
                Ok(())
            }
            _ => Err(unknown()),
        }
    }

    fn assign_scalar(&mut self, left: &str, x: f64) -> HcomResult<()> {
        let is_parameter = self.is_parameter(left);
        if !is_parameter && self.resolver().lookup_vector(left).0.is_some() {
            return Err(HcomError::Type(
                "Not very clever to assign a data vector with a scalar.".to_owned(),
            ));
        }
        if is_parameter {
            return commands::change_parameters(self, left, &x.to_string());
        }
        if !is_valid_variable_name(left) || is_protected(left) {
            return Err(HcomError::Argument("Illegal variable name.".to_owned()));
        }
        self.locals.insert(left.to_owned(), x);
        self.print(&format!("Assigning scalar {left} with {}", format_scalar(x)));
        Ok(())
    }

    fn assign_vector(&mut self, left: &str, value: VectorRef) -> HcomResult<()> {
        if !is_valid_variable_name(left) {
            return Err(HcomError::Argument("Illegal variable name.".to_owned()));
        }
        if let Some(existing) = self.find_vector(left) {
            if Rc::ptr_eq(&existing, &value) {
                return Ok(());
            }
            let (target_gen, source_gen) = (existing.borrow().generation, value.borrow().generation);
            if target_gen != source_gen {
                self.warning(&format!(
                    "Variable generations missmatch {} != {} in assignment",
                    target_gen + 1,
                    source_gen + 1
                ));
            }
            existing.borrow_mut().data = value.borrow().data.clone();
            return Ok(());
        }
        let (base, _) = split_generation(left);
        let long = self.resolver().long_variable_name(base);
        let (data, time) = {
            let v = value.borrow();
            (v.data.clone(), v.time.clone())
        };
        debug!(name = %long, len = data.len(), "defining vector");
        self.store.define(&long, None, data, time);
        if !is_protected(left) {
            self.locals.remove(left);
        }
        Ok(())
    }
}

/// Byte index of the assignment `=` in `line`, skipping `==`, `<=`, `>=`,
/// `!=` and anything quoted or parenthesised.
pub(crate) fn find_assignment(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut depth = 0i32;
    let mut in_str = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_str = !in_str,
            b'(' if !in_str => depth += 1,
            b')' if !in_str => depth -= 1,
            b'=' if !in_str && depth == 0 => {
                let prev = i.checked_sub(1).map(|p| bytes[p]);
                let next = bytes.get(i + 1).copied();
                let compound = matches!(prev, Some(b'<' | b'>' | b'=' | b'!')) || next == Some(b'=');
                if !compound {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ── EvalContext ───────────────────────────────────────────────────────────────

impl EvalContext for InterpreterSession {
    fn evaluate(&mut self, text: &str, desired: Option<ValueKind>) -> ScriptValue {
        InterpreterSession::evaluate(self, text, desired)
    }

    fn resolve_name(&mut self, name: &str) -> ScriptValue {
        self.resolve_atom(name, None)
            .unwrap_or_else(|| ScriptValue::Wildcard(name.to_owned()))
    }

    fn call_function(&mut self, name: &str, raw_args: &str, argc: usize) -> Option<ScriptValue> {
        if let Some(v) = call_vector_form(name, raw_args, self) {
            return Some(v);
        }
        let registry = Rc::clone(&self.functionoids);
        let f = registry.get(name)?;
        if f.arity != argc && math_arity(name) == Some(argc) {
            return None;
        }
        match registry.call(name, raw_args, self)? {
            Ok(x) => Some(ScriptValue::Scalar(x)),
            Err(msg) => {
                self.error(&msg);
                Some(ScriptValue::Undefined)
            }
        }
    }

    fn lookup_vector(&mut self, name: &str) -> Option<VectorRef> {
        self.find_vector(name)
    }

    fn store(&self) -> &dyn LogDataStore {
        &*self.store
    }

    fn optimizer(&self) -> &dyn OptimizationBridge {
        &*self.optimizer
    }

    fn last_simulation_time(&self) -> Option<f64> {
        self.model.last_simulation_time()
    }

    fn random(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn report_warning(&mut self, message: &str) {
        self.warning(message);
    }

    fn report_error(&mut self, message: &str) {
        self.error(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BufferSink, MemoryLogStore, MemoryModel};

    fn session() -> (InterpreterSession, BufferSink) {
        let model = MemoryModel::new()
            .with_component("Mass", "MechanicTranslationalMass", &[("m", "100"), ("B", "sysB")])
            .with_system_parameter("sysB", "2.5");
        InterpreterSession::buffered_with(model, MemoryLogStore::new())
    }

    fn scalar(s: &mut InterpreterSession, expr: &str) -> f64 {
        s.evaluate(expr, None).as_scalar().expect("scalar")
    }

    #[test]
    fn literal_round_trip() {
        let (mut s, _) = session();
        assert_eq!(scalar(&mut s, "4.25"), 4.25);
        assert_eq!(scalar(&mut s, "((-3e2))"), -300.0);
    }

    #[test]
    fn ans_tracks_last_success() {
        let (mut s, _) = session();
        s.evaluate("2*3", None);
        assert_eq!(s.ans(), &ScriptValue::Scalar(6.0));
        assert!(!s.evaluate("nosuch", None).is_ok());
        assert_eq!(scalar(&mut s, "ans + 1"), 7.0);
    }

    #[test]
    fn desired_kind_mismatch_is_wildcard() {
        let (mut s, _) = session();
        assert_eq!(
            s.evaluate("1+1", Some(ValueKind::Vector)),
            ScriptValue::Wildcard("1+1".into())
        );
    }

    #[test]
    fn unresolvable_name_is_wildcard() {
        let (mut s, sink) = session();
        assert_eq!(s.evaluate("ghost", None), ScriptValue::Wildcard("ghost".into()));
        assert!(sink.errors().is_empty());
    }

    #[test]
    fn parameters_evaluate_and_follow_system_parameters() {
        let (mut s, _) = session();
        assert_eq!(scalar(&mut s, "Mass.m"), 100.0);
        assert_eq!(scalar(&mut s, "Mass.B"), 2.5);
        assert_eq!(scalar(&mut s, "Mass.m / 4"), 25.0);
    }

    #[test]
    fn functionoid_and_math_share_names() {
        let (mut s, _) = session();
        s.execute("v = linspace(1, 3, 3)");
        assert_eq!(scalar(&mut s, "max(v)"), 3.0);
        assert_eq!(scalar(&mut s, "max(2, 5)"), 5.0);
        assert_eq!(scalar(&mut s, "aver(v) * 2"), 4.0);
    }

    #[test]
    fn functionoid_errors_are_reported() {
        let (mut s, sink) = session();
        assert!(!s.evaluate("imin(3) + 1", None).is_ok());
        assert_eq!(sink.errors(), vec!["3, is not a vector"]);
    }

    #[test]
    fn assignment_of_scalar_expression() {
        let (mut s, sink) = session();
        s.execute("x = 3+4");
        assert_eq!(s.local("x"), Some(7.0));
        assert_eq!(sink.texts(), vec!["Assigning scalar x with 7"]);
    }

    #[test]
    fn assignment_validation() {
        let (mut s, sink) = session();
        s.execute("1x = 2");
        s.execute("true = 2");
        s.execute("v = ones(2)");
        s.execute("v = 3");
        assert_eq!(
            sink.errors(),
            vec![
                "Illegal variable name.",
                "Illegal variable name.",
                "Not very clever to assign a data vector with a scalar.",
            ]
        );
        assert_eq!(s.local("true"), Some(1.0));
    }

    #[test]
    fn scalar_assignment_to_parameter_changes_it() {
        let (mut s, _) = session();
        s.execute("Mass.m = 50 * 2 + 1");
        assert_eq!(s.model().parameter_value("Mass#m").as_deref(), Some("101"));
    }

    #[test]
    fn vector_assignment_defines_then_copies() {
        let (mut s, sink) = session();
        s.execute("w = 5");
        s.execute("w = zeros(3)");
        assert_eq!(s.local("w"), None);
        let w = s.store().latest("w").expect("defined");
        assert_eq!(w.borrow().data, vec![0.0; 3]);
        s.execute("w = ones(3)");
        assert_eq!(w.borrow().data, vec![1.0; 3]);
        assert!(sink.errors().is_empty());
    }

    #[test]
    fn bare_expressions_print() {
        let (mut s, sink) = session();
        s.execute("2^10");
        s.execute("v = ones(2)");
        s.execute("v");
        s.execute("v*");
        assert_eq!(sink.texts()[..2], ["1024".to_owned(), "v".to_owned()]);
        assert_eq!(sink.errors(), vec!["Unknown command or failed to evaluate: v*"]);
    }

    #[test]
    fn assignment_position() {
        assert_eq!(find_assignment("x = 1"), Some(2));
        assert_eq!(find_assignment("x == 1"), None);
        assert_eq!(find_assignment("a <= b"), None);
        assert_eq!(find_assignment("a != b"), None);
        assert_eq!(find_assignment("f(a=1)"), None);
        assert_eq!(find_assignment("s = \"a=b\""), Some(2));
    }
}
