//! HCOM: the scripting language of a simulation console.
//!
//! The interpreter drives a model host (parameters, components, simulation
//! settings) and a log-data store (generation-indexed time series) through
//! the traits in [`host`]. [`script::InterpreterSession`] is the entry point.

pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod pattern;
pub mod script;

pub use error::{HcomError, HcomResult};
pub use script::{InterpreterSession, RunState};
