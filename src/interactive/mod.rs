//! Interactive input: the host an interpreter reads from, the coordinator
//! that serializes console ownership across threads, and the loops that
//! read and evaluate.

mod coordinator;
mod host;
mod repl;

pub use coordinator::{InteractiveLoopCoordinator, ReadRegistration};
pub use host::{InteractiveHost, ScriptedHost, StdioHost};
pub use repl::{run_interactive_loop, run_repl, LoopData};
