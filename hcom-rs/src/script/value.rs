//! Result of every evaluation.
//!
//! HCOM values are scalars or handles to stored series.  Evaluation never
//! fails with an error; it yields [`ScriptValue::Wildcard`] (the text could
//! not be interpreted) or [`ScriptValue::Undefined`] (it was interpreted but
//! the operation is not defined).

use std::fmt;
use std::rc::Rc;

use crate::host::VectorRef;

/// The two kinds a successful evaluation can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    Vector,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Scalar => f.write_str("Scalar"),
            ValueKind::Vector => f.write_str("Vector"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum ScriptValue {
    Scalar(f64),
    Vector(VectorRef),
    /// Uninterpretable text, kept verbatim.
    Wildcard(String),
    #[default]
    Undefined,
}

impl ScriptValue {
    /// True for `Scalar` and `Vector`.
    pub fn is_ok(&self) -> bool {
        self.kind().is_some()
    }

    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            ScriptValue::Scalar(_) => Some(ValueKind::Scalar),
            ScriptValue::Vector(_) => Some(ValueKind::Vector),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ScriptValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&VectorRef> {
        match self {
            ScriptValue::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the value fits `desired` (`None` accepts any successful value).
    pub fn fits(&self, desired: Option<ValueKind>) -> bool {
        match (self.kind(), desired) {
            (Some(_), None) => true,
            (Some(k), Some(d)) => k == d,
            (None, _) => false,
        }
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScriptValue::Scalar(a), ScriptValue::Scalar(b)) => a == b,
            (ScriptValue::Vector(a), ScriptValue::Vector(b)) => Rc::ptr_eq(a, b),
            (ScriptValue::Wildcard(a), ScriptValue::Wildcard(b)) => a == b,
            (ScriptValue::Undefined, ScriptValue::Undefined) => true,
            _ => false,
        }
    }
}

// ── Number formatting ─────────────────────────────────────────────────────────

/// Format like C's `%g`: six significant digits, trailing zeros dropped,
/// scientific notation below `1e-4` and from `1e6` up.
pub fn format_scalar(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_owned();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if x == 0.0 {
        return "0".to_owned();
    }
    let sci = format!("{x:.5e}");
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    } else {
        let decimals = (5 - exp) as usize;
        trim_fraction(&format!("{x:.decimals$}")).to_owned()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Space-joined samples, as `print` interpolates a vector.
pub fn format_samples(data: &[f64]) -> String {
    data.iter()
        .map(|v| format_scalar(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LogVector;

    #[test]
    fn format_like_percent_g() {
        assert_eq!(format_scalar(7.0), "7");
        assert_eq!(format_scalar(0.5), "0.5");
        assert_eq!(format_scalar(-2.25), "-2.25");
        assert_eq!(format_scalar(1.0 / 3.0), "0.333333");
        assert_eq!(format_scalar(123456.0), "123456");
        assert_eq!(format_scalar(1234567.0), "1.23457e+06");
        assert_eq!(format_scalar(0.0001), "0.0001");
        assert_eq!(format_scalar(0.00001), "1e-05");
        assert_eq!(format_scalar(1e100), "1e+100");
        assert_eq!(format_scalar(999999.7), "1e+06");
    }

    #[test]
    fn kinds_and_fit() {
        let s = ScriptValue::Scalar(1.0);
        assert!(s.is_ok());
        assert!(s.fits(None));
        assert!(s.fits(Some(ValueKind::Scalar)));
        assert!(!s.fits(Some(ValueKind::Vector)));
        assert!(!ScriptValue::Wildcard("x".into()).is_ok());
        assert!(!ScriptValue::Undefined.fits(None));
    }

    #[test]
    fn vector_equality_is_identity() {
        let a = LogVector::new("a", 0, vec![1.0]).into_ref();
        let b = LogVector::new("a", 0, vec![1.0]).into_ref();
        assert_eq!(ScriptValue::Vector(a.clone()), ScriptValue::Vector(a));
        assert_ne!(ScriptValue::Vector(b.clone()), ScriptValue::Vector(LogVector::default().into_ref()));
    }

    #[test]
    fn samples_join() {
        assert_eq!(format_samples(&[1.0, 2.5, 3.0]), "1 2.5 3");
        assert_eq!(format_samples(&[]), "");
    }
}
