//! Error type shared by command handlers, the script parser and the session.
//!
//! Every variant carries the exact console text; [`Display`](std::fmt::Display)
//! prints it unchanged so the dispatcher can hand it straight to
//! [`ConsoleSink::print_error`](crate::host::ConsoleSink::print_error).

use thiserror::Error;

use crate::config::ConfigError;

/// An interpreter-level failure.
///
/// Evaluation failures are *not* errors: they are reported as
/// [`ScriptValue::Undefined`](crate::script::value::ScriptValue) or
/// `Wildcard` values.  Cancellation is a
/// [`RunState`](crate::script::interp::RunState), never an error.
#[derive(Debug, Error, PartialEq)]
pub enum HcomError {
    /// Malformed script structure (missing terminators, bad statements).
    #[error("{0}")]
    Syntax(String),
    /// Wrong argument count or an argument that does not parse.
    #[error("{0}")]
    Argument(String),
    /// A variable, parameter, component, function or label was not found.
    #[error("{0}")]
    Resolution(String),
    /// Operation applied to the wrong kind of value.
    #[error("{0}")]
    Type(String),
    /// The model host or log-data store rejected an operation.
    #[error("{0}")]
    Host(String),
    /// Reading or writing a file failed.
    #[error("{0}")]
    Io(String),
    /// Console configuration could not be parsed.
    #[error("config {0}")]
    Config(#[from] ConfigError),
}

impl HcomError {
    /// The generic arity complaint used by most commands.
    pub fn wrong_arg_count() -> Self {
        HcomError::Argument("Wrong number of arguments.".to_owned())
    }

    /// Shorthand for the "no model open" host error.
    pub fn no_model() -> Self {
        HcomError::Host("No model is open.".to_owned())
    }
}

/// Result alias used by command handlers.
pub type HcomResult<T> = Result<T, HcomError>;
