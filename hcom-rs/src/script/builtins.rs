//! Vector call forms: `ddt`, `int`, `lp1`, `fft`, `gt`, `lt`, `eq`,
//! `linspace`, `logspace`, `ones`, `zeros`, `maxof`, `minof` and `abs`.
//!
//! Each form takes raw argument text, evaluates the pieces it needs through
//! the [`EvalContext`] and returns a value.  Failures are reported on the
//! error channel and yield [`ScriptValue::Undefined`].

use crate::host::numeric::{self, fuzzy_equal};
use crate::host::VectorRef;

use super::expr::{EvalContext, EQUALITY_TOLERANCE};
use super::text::split_respecting;
use super::value::{ScriptValue, ValueKind};

/// Name of the stored time axis used when a vector carries none.
pub const TIME_VARIABLE: &str = "time";

/// `(name, description, usage)` for every call form.
pub const CALL_FORMS: &[(&str, &str, &str)] = &[
    (
        "abs",
        "The absolute value of each vector element",
        "Usage: abs(vector)",
    ),
    (
        "ddt",
        "Differentiates vector with respect to time (or to custom vector)",
        "Usage: ddt(vector)\nUsage: ddt(vector, timevector)",
    ),
    (
        "eq",
        "Index-wise fuzzy equal check between vectors and/or scalars (equivalent to \"==\" operator)",
        "Usage: eq(varName, threshold, eps)\nUsage: eq(varName1, varName2, eps)",
    ),
    (
        "fft",
        "Generates frequency spectrum plot from vector",
        "Usage: fft(vector)\nUsage: fft(vector, power[true/false])\nUsage: fft(vector, timevector)\nUsage: fft(vector, timevector, power[true/false])",
    ),
    (
        "gt",
        "Index-wise greater than check between vectors and/or scalars (equivalent to \">\" operator)",
        "Usage: gt(varName, threshold)\nUsage: gt(varName1, varName2)",
    ),
    (
        "int",
        "Integrates vector with respect to time (or to custom vector)",
        "Usage: int(vector)\nUsage: int(vector, timevector)",
    ),
    (
        "linspace",
        "Linearly spaced vector",
        "Usage: linspace(min, max, numSamples)",
    ),
    (
        "logspace",
        "Logarithmicly spaced vector",
        "Usage: logspace(min, max, numSamples)",
    ),
    (
        "lp1",
        "Applies low-pass filter of first degree to vector",
        "Usage: lp1(vector, frequency)\nUsage: lp1(vector, timevector, frequency)",
    ),
    (
        "lt",
        "Index-wise less than check between vectors and/or scalars (equivalent to \"<\" operator)",
        "Usage: lt(varName, threshold)\nUsage: lt(varName1, varName2)",
    ),
    (
        "maxof",
        "Returns the element-wise maximum values of x and y vectors",
        "Usage: maxof(x,y)",
    ),
    (
        "minof",
        "Returns the element-wise minimum values of x and y vectors",
        "Usage: minof(x,y)",
    ),
    ("ones", "Create a vector of ones", "Usage: ones(size)"),
    ("zeros", "Create a vector of zeros", "Usage: zeros(size)"),
];

fn usage(name: &str) -> &'static str {
    CALL_FORMS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map_or("", |(_, _, u)| *u)
}

fn canonical(name: &str) -> Option<&'static str> {
    Some(match name {
        "greaterThan" => "gt",
        "smallerThan" => "lt",
        other => CALL_FORMS.iter().find(|(n, _, _)| *n == other)?.0,
    })
}

pub fn is_call_form(name: &str) -> bool {
    canonical(name).is_some()
}

/// Run call form `name`.  `None` when `name` is not a call form.
pub fn call_vector_form(name: &str, raw_args: &str, ctx: &mut dyn EvalContext) -> Option<ScriptValue> {
    let name = canonical(name)?;
    let args = split_respecting(raw_args, ',');
    let result = match arity_ok(name, args.len()) {
        false => Err(arity_message(name)),
        true => dispatch(name, &args, ctx),
    };
    Some(match result {
        Ok(v) => v,
        Err(msg) => {
            ctx.report_error(&msg);
            ScriptValue::Undefined
        }
    })
}

fn arity_ok(name: &str, n: usize) -> bool {
    match name {
        "abs" | "ones" | "zeros" => n == 1,
        "ddt" | "int" => (1..=2).contains(&n),
        "lp1" | "eq" => (2..=3).contains(&n),
        "fft" => (1..=3).contains(&n),
        "gt" | "lt" | "maxof" | "minof" => n == 2,
        "linspace" | "logspace" => n == 3,
        _ => false,
    }
}

fn arity_message(name: &str) -> String {
    match name {
        "ddt" => format!("Wrong number of arguments for ddt function.\n{}", usage(name)),
        _ => format!(
            "Wrong number of arguments provided for {name} function.\n{}",
            usage(name)
        ),
    }
}

// ── Argument evaluation ───────────────────────────────────────────────────────

fn vector_arg(arg: &str, ctx: &mut dyn EvalContext) -> Result<VectorRef, String> {
    if let Some(v) = ctx.lookup_vector(arg) {
        return Ok(v);
    }
    match ctx.evaluate(arg, Some(ValueKind::Vector)) {
        ScriptValue::Vector(v) => Ok(v),
        _ => Err(format!("Variable: {arg} was not found!")),
    }
}

/// The explicit time vector, else the vector's own axis, else the stored
/// time variable.
fn time_arg(of: &VectorRef, explicit: Option<&str>, ctx: &mut dyn EvalContext) -> Result<VectorRef, String> {
    if let Some(name) = explicit {
        return ctx
            .lookup_vector(name)
            .ok_or_else(|| format!("Time variable: {name} was not found!"));
    }
    if let Some(axis) = of.borrow().time.clone() {
        return Ok(axis);
    }
    ctx.lookup_vector(TIME_VARIABLE)
        .ok_or_else(|| format!("Time variable: {TIME_VARIABLE} was not found!"))
}

fn scalar_arg(arg: &str, ctx: &mut dyn EvalContext) -> Result<f64, String> {
    ctx.evaluate(arg, Some(ValueKind::Scalar))
        .as_scalar()
        .ok_or_else(|| format!("Failed to evaluate {arg}"))
}

fn value_arg(arg: &str, ctx: &mut dyn EvalContext) -> Result<ScriptValue, String> {
    let v = ctx.evaluate(arg, None);
    if v.is_ok() {
        Ok(v)
    } else {
        Err(format!("Failed to find variable/evaluate {arg}"))
    }
}

fn flag(b: bool) -> ScriptValue {
    ScriptValue::Scalar(if b { 1.0 } else { 0.0 })
}

fn count_arg(arg: &str, ctx: &mut dyn EvalContext) -> Result<f64, String> {
    Ok((scalar_arg(arg, ctx)? + 0.5).floor())
}

/// Upper bound on the length of a generated series.
pub const MAX_GENERATED_SAMPLES: usize = 10_000_000;

/// Convert an already range-checked count; infinite, NaN and huge counts are rejected.
fn sample_count(n: f64) -> Result<usize, String> {
    if n.is_finite() && n <= MAX_GENERATED_SAMPLES as f64 {
        Ok(n as usize)
    } else {
        Err(format!("Size must not exceed {MAX_GENERATED_SAMPLES}"))
    }
}

// ── Forms ─────────────────────────────────────────────────────────────────────

fn dispatch(name: &'static str, args: &[String], ctx: &mut dyn EvalContext) -> Result<ScriptValue, String> {
    use ScriptValue::{Scalar as S, Vector as V};

    match name {
        "abs" => match value_arg(&args[0], ctx)? {
            S(x) => Ok(S(x.abs())),
            V(v) => Ok(V(ctx.store().abs(&v))),
            _ => unreachable_kind(),
        },

        "ddt" | "int" => {
            let v = vector_arg(&args[0], ctx)?;
            let t = time_arg(&v, args.get(1).map(String::as_str), ctx)?;
            let store = ctx.store();
            let r = if name == "ddt" {
                store.ddt(&v, &t)
            } else {
                store.integrate(&v, &t)
            };
            r.map(V)
        }

        "lp1" => {
            let v = vector_arg(&args[0], ctx)?;
            let freq_text = &args[args.len() - 1];
            let freq = ctx
                .evaluate(freq_text, Some(ValueKind::Scalar))
                .as_scalar()
                .ok_or_else(|| format!("Failed to parse frequency: {freq_text}"))?;
            let explicit = (args.len() == 3).then(|| args[1].as_str());
            let t = time_arg(&v, explicit, ctx)?;
            ctx.store().lowpass1(&v, &t, freq).map(V)
        }

        "fft" => {
            let v = vector_arg(&args[0], ctx)?;
            let (explicit, power) = match args.len() {
                1 => (None, false),
                2 if args[1] == "true" || args[1] == "false" => (None, args[1] == "true"),
                2 => (Some(args[1].as_str()), false),
                _ => (Some(args[1].as_str()), args[2] == "true"),
            };
            let t = time_arg(&v, explicit, ctx)?;
            ctx.store().fft(&v, &t, power).map(V)
        }

        "gt" | "lt" => {
            let a = value_arg(&args[0], ctx)?;
            let b = value_arg(&args[1], ctx)?;
            let greater = name == "gt";
            let store = ctx.store();
            match (a, b) {
                (S(x), S(y)) => Ok(flag(if greater { x > y } else { x < y })),
                (V(v), S(x)) => Ok(V(if greater {
                    store.greater_than(&v, x)
                } else {
                    store.less_than(&v, x)
                })),
                (S(x), V(v)) => Ok(V(if greater {
                    store.less_than(&v, x)
                } else {
                    store.greater_than(&v, x)
                })),
                (V(v), V(w)) => {
                    let r = if greater {
                        store.greater_than_each(&v, &w)
                    } else {
                        store.less_than_each(&v, &w)
                    };
                    r.map(V)
                }
                _ => unreachable_kind(),
            }
        }

        "eq" => {
            let a = value_arg(&args[0], ctx)?;
            let b = value_arg(&args[1], ctx)?;
            let eps = match args.get(2) {
                Some(e) => scalar_arg(e, ctx)?,
                None => EQUALITY_TOLERANCE,
            };
            let store = ctx.store();
            match (a, b) {
                (S(x), S(y)) => Ok(flag(fuzzy_equal(x, y, eps))),
                (V(v), S(x)) | (S(x), V(v)) => Ok(V(store.equal_to(&v, x, eps))),
                (V(v), V(w)) => Ok(V(store.equal_each(&v, &w, eps)?)),
                _ => unreachable_kind(),
            }
        }

        "linspace" | "logspace" => {
            let min = scalar_arg(&args[0], ctx)?;
            let max = scalar_arg(&args[1], ctx)?;
            let n = count_arg(&args[2], ctx)?;
            if n <= 1.0 {
                return Err("Number of samples must be > 1".to_owned());
            }
            let n = sample_count(n)?;
            let data = if name == "linspace" {
                numeric::linspace(min, max, n)
            } else {
                numeric::logspace(min, max, n)
            };
            Ok(V(ctx.store().generated(name, data)))
        }

        "ones" | "zeros" => {
            let n = count_arg(&args[0], ctx)?;
            if n <= 0.0 {
                return Err("Size must be > 0".to_owned());
            }
            let n = sample_count(n)?;
            let fill = if name == "ones" { 1.0 } else { 0.0 };
            Ok(V(ctx.store().generated(name, vec![fill; n])))
        }

        "maxof" | "minof" => {
            let a = value_arg(&args[0], ctx)?;
            let b = value_arg(&args[1], ctx)?;
            let take_max = name == "maxof";
            let store = ctx.store();
            match (a, b) {
                (S(x), S(y)) => Ok(S(if take_max { x.max(y) } else { x.min(y) })),
                (V(v), S(x)) | (S(x), V(v)) => Ok(V(if take_max {
                    store.max_of_scalar(&v, x)
                } else {
                    store.min_of_scalar(&v, x)
                })),
                (V(v), V(w)) => Ok(V(if take_max {
                    store.max_of(&v, &w)
                } else {
                    store.min_of(&v, &w)
                })),
                _ => unreachable_kind(),
            }
        }

        _ => Err("Undefined function.".to_owned()),
    }
}

/// `value_arg` only returns scalars and vectors.
fn unreachable_kind() -> Result<ScriptValue, String> {
    Err("Unexpected value kind".to_owned())
}
