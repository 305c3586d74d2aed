//! Per-interpreter debugger state machine.
//!
//! A `Debugger` is owned by its `Interpreter` (absent until set up). It
//! carries the enabled flag, the breakpoint-type bitset, stepping state,
//! the interactive command/result mailbox with its FIFO queue, and the
//! token breakpoint registry.

mod breakpoints;
mod state;
mod stepping;
mod types;

pub use breakpoints::{glob_match, ScriptLocation, TokenBreakpoints};
pub use state::{Debugger, DebuggerInfo, DebuggerState};
pub use stepping::Stepping;
pub use types::BreakpointType;

/// Options for a demand break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakOptions {
    /// Coerce an error outcome from the break loop into success
    pub no_error: bool,
    /// Break even while the debugger is disabled
    pub ignore_enabled: bool,
}
