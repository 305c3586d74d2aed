//! Script evaluation: logical lines in order, each one a command whose
//! words are substituted and dispatched to a built-in.

mod commands;
mod runner;

pub use commands::{is_hidden, HIDDEN_COMMANDS};
pub use runner::{invoke, run_script, Source};
