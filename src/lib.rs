//! Debugging and execution control for a small embeddable command
//! interpreter: per-interpreter debugger state, call frames with uplevel
//! invocation, a console token shared across threads, secure evaluation in
//! child interpreters and the emergency reconfigurator, all driven through
//! the `debug` command.

mod flags;

pub mod callframe;
pub mod config;
pub mod control;
pub mod debugger;
pub mod emergency;
pub mod error;
pub mod executor;
pub mod interactive;
pub mod interp;
pub mod parser;
pub mod secure;

pub use config::DebuggerConfig;
pub use error::{DebugError, EvalResult, Result};
pub use interp::{InterpHandle, Interpreter};
