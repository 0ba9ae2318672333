//! The HCOM scripting language.
//!
//! This module implements the console interpreter:
//!
//! - Line dispatch to the built-in command table (`sim`, `chpa`, `peek`, …)
//! - Assignment and evaluation of scalar and vector expressions
//! - Control flow: `if` … `else` … `endif`, `while` … `repeat`,
//!   `foreach` … `endforeach`, `&label` / `goto`, `define` … `enddefine`
//! - Functionoids (`aver()`, `peek()`, `obj()`, …) and vector call forms
//!   (`ddt()`, `linspace()`, …)
//!
//! # Quick start
//!
//! ```rust
//! use hcom::script::InterpreterSession;
//!
//! let (mut session, sink) = InterpreterSession::buffered();
//! session.run_script("x = 6\nwhile (x < 8)\n  x = x + 1\nrepeat\nprint \"$x$\"");
//! assert_eq!(sink.texts().last().map(String::as_str), Some("8"));
//! ```

pub mod builtins;
pub mod commands;
pub mod eval;
pub mod expr;
pub mod functionoids;
pub mod interp;
pub mod names;
pub mod stmt;
pub mod text;
pub mod value;

pub use expr::EvalContext;
pub use interp::{InterpreterSession, RunState};
pub use value::{ScriptValue, ValueKind};
