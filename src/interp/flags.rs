use crate::flags::flag_set;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

flag_set! {
    /// Interpreter-wide toggles.
    pub struct InterpreterFlags: u32 {
        /// Restricted ("safe") interpreter
        const SAFE = 1 << 0, "Safe";
        /// Restrictions temporarily lifted
        const TRUSTED = 1 << 1, "Trusted";
        const INTERACTIVE = 1 << 2, "Interactive";
        /// Evaluator records script locations (needed for token breakpoints)
        const TRACK_SCRIPT_LOCATIONS = 1 << 3, "ScriptLocations";
        /// Error info carries the failing command's line
        const TRACK_ARGUMENT_LOCATIONS = 1 << 4, "ArgumentLocations";
        /// Debugger records the words of each executed command
        const TRACK_SCRIPT_ARGUMENTS = 1 << 5, "ScriptArguments";
        /// Interactive loop never reads from the host; an empty command
        /// queue ends it
        const LOOP_TEST_HOOK = 1 << 6, "LoopTestHook";
    }
}

flag_set! {
    /// Flags scoped to the evaluation context rather than the interpreter.
    pub struct ContextFlags: u32 {
        const IGNORE_HIDDEN_COMMANDS = 1 << 0, "IgnoreHiddenCommands";
    }
}

flag_set! {
    /// How event processing behaves while waiting.
    pub struct WaitFlags: u32 {
        /// Stop processing queued events at the first failing one
        const STOP_ON_ERROR = 1 << 0, "StopOnError";
    }
}

impl InterpreterFlags {
    pub const DEFAULT: Self = Self::TRACK_SCRIPT_LOCATIONS;
}

#[derive(Debug, Default)]
struct CancelInner {
    canceled: AtomicBool,
    unwind: AtomicBool,
    reason: Mutex<Option<String>>,
}

/// Cancellation request for one interpreter; clones share it so a watchdog
/// thread can raise it.
#[derive(Debug, Clone, Default)]
pub struct CancelState(Arc<CancelInner>);

impl CancelState {
    /// With `unwind`, the request survives the end of the outermost
    /// evaluation and must be reset explicitly.
    pub fn cancel(&self, reason: impl Into<String>, unwind: bool) {
        *self.0.reason.lock() = Some(reason.into());
        if unwind {
            self.0.unwind.store(true, Ordering::SeqCst);
        }
        self.0.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.canceled.load(Ordering::SeqCst)
    }

    pub fn is_unwinding(&self) -> bool {
        self.0.unwind.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> String {
        self.0
            .reason
            .lock()
            .clone()
            .unwrap_or_else(|| "eval canceled".to_string())
    }

    /// Clear a pending request. Returns whether one was pending.
    pub fn reset(&self, unwind: bool) -> bool {
        if self.is_unwinding() && !unwind {
            return false;
        }
        let was = self.0.canceled.swap(false, Ordering::SeqCst);
        self.0.unwind.store(false, Ordering::SeqCst);
        *self.0.reason.lock() = None;
        was
    }
}
