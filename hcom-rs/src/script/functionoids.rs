//! Named scalar functions callable inside algebraic expressions.
//!
//! A functionoid receives its argument text verbatim together with the
//! evaluator ([`EvalContext`]) and decides itself how to evaluate each
//! argument.  The registry also carries help-only entries for the vector
//! call forms so `help` can list everything under "Custom Functions".

use std::collections::BTreeMap;

use super::builtins::CALL_FORMS;
use super::expr::{scalars_close, EvalContext};
use super::text::split_respecting;
use super::value::{ScriptValue, ValueKind};

pub type FunctionoidFn = Box<dyn Fn(&str, &mut dyn EvalContext) -> Result<f64, String>>;

pub struct Functionoid {
    pub name: String,
    pub description: String,
    pub help: String,
    pub arity: usize,
    call: FunctionoidFn,
}

impl std::fmt::Debug for Functionoid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Functionoid")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Description and help text for `help name()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionHelp {
    pub description: String,
    pub help: String,
}

#[derive(Debug, Default)]
pub struct FunctionoidRegistry {
    functions: BTreeMap<String, Functionoid>,
    help_only: BTreeMap<String, FunctionHelp>,
}

impl FunctionoidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        register_builtins(&mut r);
        register_call_form_help(&mut r);
        r
    }

    pub fn register(
        &mut self,
        name: &str,
        arity: usize,
        description: &str,
        help: &str,
        call: impl Fn(&str, &mut dyn EvalContext) -> Result<f64, String> + 'static,
    ) {
        self.functions.insert(
            name.to_owned(),
            Functionoid {
                name: name.to_owned(),
                description: description.to_owned(),
                help: help.to_owned(),
                arity,
                call: Box::new(call),
            },
        );
    }

    /// Register help text for a function implemented elsewhere.
    pub fn register_help(&mut self, name: &str, description: &str, help: &str) {
        self.help_only.insert(
            name.to_owned(),
            FunctionHelp {
                description: description.to_owned(),
                help: help.to_owned(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Functionoid> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Invoke `name`; `None` if it is not registered.
    pub fn call(
        &self,
        name: &str,
        raw_args: &str,
        ctx: &mut dyn EvalContext,
    ) -> Option<Result<f64, String>> {
        let f = self.functions.get(name)?;
        let argc = split_respecting(raw_args, ',').len();
        if argc != f.arity {
            return Some(Err("Wrong number of arguments".to_owned()));
        }
        Some((f.call)(raw_args, ctx))
    }

    /// Every documented function, sorted by name.
    pub fn help_entries(&self) -> BTreeMap<String, FunctionHelp> {
        let mut all = self.help_only.clone();
        for (name, f) in &self.functions {
            all.insert(
                name.clone(),
                FunctionHelp {
                    description: f.description.clone(),
                    help: f.help.clone(),
                },
            );
        }
        all
    }
}

// ── Argument helpers ──────────────────────────────────────────────────────────

fn args(raw: &str) -> Vec<String> {
    split_respecting(raw, ',')
}

fn scalar_arg(arg: &str, ctx: &mut dyn EvalContext) -> Result<f64, String> {
    ctx.evaluate(arg, Some(ValueKind::Scalar))
        .as_scalar()
        .ok_or_else(|| format!("Failed to evaluate {arg}"))
}

fn any_arg(arg: &str, ctx: &mut dyn EvalContext) -> Result<ScriptValue, String> {
    let v = ctx.evaluate(arg, None);
    if v.is_ok() {
        Ok(v)
    } else {
        Err(format!("Failed to find variable {arg}"))
    }
}

/// `int(x + 0.1)` with a non-negative check.
fn index_arg(arg: &str, ctx: &mut dyn EvalContext) -> Result<usize, String> {
    let x = scalar_arg(arg, ctx)?;
    let i = (x + 0.1).floor();
    if i < 0.0 {
        return Err("Index out of range".to_owned());
    }
    Ok(i as usize)
}

// ── Built-ins ─────────────────────────────────────────────────────────────────

fn register_builtins(r: &mut FunctionoidRegistry) {
    r.register(
        "aver",
        1,
        "Calculate average value of vector",
        "Usage: aver(vector)",
        |raw, ctx| match any_arg(raw, ctx)? {
            ScriptValue::Vector(v) => Ok(v.borrow().average()),
            other => Ok(other.as_scalar().unwrap_or_default()),
        },
    );
    r.register(
        "min",
        1,
        "Calculate minimum value of vector",
        "Usage: min(vector)",
        |raw, ctx| match any_arg(raw, ctx)? {
            ScriptValue::Vector(v) => Ok(v.borrow().min_with_index().map_or(0.0, |(m, _)| m)),
            other => Ok(other.as_scalar().unwrap_or_default()),
        },
    );
    r.register(
        "max",
        1,
        "Calculate maximum value of vector",
        "Usage: max(vector)",
        |raw, ctx| match any_arg(raw, ctx)? {
            ScriptValue::Vector(v) => Ok(v.borrow().max_with_index().map_or(0.0, |(m, _)| m)),
            other => Ok(other.as_scalar().unwrap_or_default()),
        },
    );
    r.register(
        "imin",
        1,
        "Calculate index of minimum value of vector",
        "Usage: imin(vector)",
        |raw, ctx| match any_arg(raw, ctx)? {
            ScriptValue::Vector(v) => Ok(v.borrow().min_with_index().map_or(0.0, |(_, i)| i as f64)),
            _ => Err(format!("{raw}, is not a vector")),
        },
    );
    r.register(
        "imax",
        1,
        "Calculate index of maximum value of vector",
        "Usage: imax(vector)",
        |raw, ctx| match any_arg(raw, ctx)? {
            ScriptValue::Vector(v) => Ok(v.borrow().max_with_index().map_or(0.0, |(_, i)| i as f64)),
            _ => Err(format!("{raw}, is not a vector")),
        },
    );
    r.register(
        "size",
        1,
        "Calculate the size of a vector",
        "Usage: size(vector)",
        |raw, ctx| match any_arg(raw, ctx)? {
            ScriptValue::Vector(v) => Ok(v.borrow().len() as f64),
            _ => Ok(1.0),
        },
    );
    r.register(
        "rand",
        0,
        "Generates a random value between 0 and 1",
        "Usage: rand()",
        |_, ctx| Ok(ctx.random()),
    );
    r.register(
        "peek",
        2,
        "Returns vector value at specified index",
        "Usage: peek(vector, idx)",
        |raw, ctx| {
            let a = args(raw);
            let v = ctx
                .lookup_vector(&a[0])
                .ok_or_else(|| format!("Failed to find variable {}", a[0]))?;
            let i = index_arg(&a[1], ctx)?;
            let value = v.borrow().peek(i);
            value
        },
    );
    r.register(
        "time",
        0,
        "Returns last simulation time",
        "Usage: time()",
        |_, ctx| {
            ctx.last_simulation_time()
                .ok_or_else(|| "No model is open.".to_owned())
        },
    );
    r.register(
        "obj",
        1,
        "Returns optimization objective function value with specified index",
        "Usage: obj(idx)",
        |raw, ctx| {
            let i = index_arg(raw, ctx)?;
            ctx.optimizer()
                .objective(i)
                .ok_or_else(|| "Index out of range.".to_owned())
        },
    );
    r.register(
        "optvar",
        1,
        "Returns specified optimization variable",
        "Usage: optvar(name)",
        |raw, ctx| {
            let name = raw.trim();
            ctx.optimizer()
                .variable(name)
                .ok_or_else(|| format!("Failed to find variable {name}"))
        },
    );
    r.register(
        "optpar",
        2,
        "Returns specified optimization parameter",
        "Usage: optpar(pointId, parId)",
        |raw, ctx| {
            let a = args(raw);
            let point = index_arg(&a[0], ctx)?;
            let par = index_arg(&a[1], ctx)?;
            ctx.optimizer()
                .parameter(point, par)
                .ok_or_else(|| "Index out of range.".to_owned())
        },
    );
    r.register(
        "fc",
        3,
        "Fuzzy compare, returns 1 if the values of the arguments are almost the same",
        "Usage: fc(expr, expr, tolerance)",
        fuzzy_compare,
    );
}

fn fuzzy_compare(raw: &str, ctx: &mut dyn EvalContext) -> Result<f64, String> {
    let a = args(raw);
    let tolerance = ctx
        .evaluate(&a[2], Some(ValueKind::Scalar))
        .as_scalar()
        .ok_or_else(|| format!("Could not evaluate tolerance {}", a[2]))?;
    let lhs = any_arg(&a[0], ctx)?;
    let rhs = any_arg(&a[1], ctx)?;
    let same = match (lhs, rhs) {
        (ScriptValue::Vector(x), ScriptValue::Vector(y)) => x.borrow().compare(&y.borrow(), tolerance),
        (ScriptValue::Scalar(x), ScriptValue::Scalar(y)) => scalars_close(x, y, tolerance),
        _ => {
            ctx.report_warning("Comparing scalar with vector (will fail)");
            false
        }
    };
    Ok(if same { 1.0 } else { 0.0 })
}

fn register_call_form_help(r: &mut FunctionoidRegistry) {
    for (name, description, usage) in CALL_FORMS {
        r.register_help(name, description, usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::interp::InterpreterSession;

    fn call(session: &mut InterpreterSession, name: &str, raw: &str) -> Result<f64, String> {
        let registry = FunctionoidRegistry::with_builtins();
        registry.call(name, raw, session).expect("registered")
    }

    #[test]
    fn unknown_name_is_none() {
        let mut s = InterpreterSession::in_memory();
        let registry = FunctionoidRegistry::with_builtins();
        assert!(registry.call("nosuch", "", &mut s).is_none());
    }

    #[test]
    fn arity_is_checked() {
        let mut s = InterpreterSession::in_memory();
        assert_eq!(call(&mut s, "aver", ""), Err("Wrong number of arguments".into()));
        assert_eq!(call(&mut s, "fc", "1, 2"), Err("Wrong number of arguments".into()));
    }

    #[test]
    fn statistics_over_vectors() {
        let mut s = InterpreterSession::in_memory();
        s.execute("v = linspace(0, 4, 5)");
        assert_eq!(call(&mut s, "aver", "v"), Ok(2.0));
        assert_eq!(call(&mut s, "max", "v"), Ok(4.0));
        assert_eq!(call(&mut s, "imax", "v"), Ok(4.0));
        assert_eq!(call(&mut s, "imin", "v"), Ok(0.0));
        assert_eq!(call(&mut s, "size", "v"), Ok(5.0));
        assert_eq!(call(&mut s, "peek", "v, 2"), Ok(2.0));
        assert_eq!(call(&mut s, "peek", "v, 1.95"), Ok(2.0));
        assert_eq!(call(&mut s, "peek", "v, 9"), Err("Index out of range".into()));
    }

    #[test]
    fn scalars_pass_through() {
        let mut s = InterpreterSession::in_memory();
        assert_eq!(call(&mut s, "aver", "3"), Ok(3.0));
        assert_eq!(call(&mut s, "size", "3"), Ok(1.0));
        assert_eq!(call(&mut s, "imin", "3"), Err("3, is not a vector".into()));
        assert_eq!(call(&mut s, "max", "nothing"), Err("Failed to find variable nothing".into()));
    }

    #[test]
    fn fuzzy_compare_kinds() {
        let mut s = InterpreterSession::in_memory();
        s.execute("v = ones(3)");
        assert_eq!(call(&mut s, "fc", "1, 1.0001, 0.01"), Ok(1.0));
        assert_eq!(call(&mut s, "fc", "1, 2, 0.01"), Ok(0.0));
        assert_eq!(call(&mut s, "fc", "v, v*1.0001, 0.01"), Ok(1.0));
        assert_eq!(call(&mut s, "fc", "v, 1, 0.01"), Ok(0.0));
        assert_eq!(
            call(&mut s, "fc", "1, 1, tol"),
            Err("Could not evaluate tolerance tol".into())
        );
    }

    #[test]
    fn time_requires_a_run() {
        let mut s = InterpreterSession::in_memory();
        assert!(call(&mut s, "time", "").is_err());
        s.execute("sim");
        assert_eq!(call(&mut s, "time", ""), Ok(10.0));
    }

    #[test]
    fn help_lists_call_forms_and_functionoids() {
        let r = FunctionoidRegistry::with_builtins();
        let help = r.help_entries();
        assert!(help.contains_key("ddt"));
        assert!(help.contains_key("fc"));
        assert_eq!(help["ones"].help, "Usage: ones(size)");
        let names: Vec<_> = help.keys().cloned().collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
