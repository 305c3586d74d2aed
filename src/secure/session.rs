use super::watchdog::Watchdog;
use crate::config::DebuggerConfig;
use crate::error::{DebugError, EvalResult, Result};
use crate::interp::{lock_with_retry, ContextFlags, InterpHandle, Interpreter, InterpreterFlags, WaitFlags};
use parking_lot::MutexGuard;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a secure evaluation adjusts the child for its duration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecureEvalOptions {
    /// Lift the restrictions of a safe child
    pub trusted: bool,
    /// Let the child process its event queue; suppressed otherwise
    pub events: bool,
    pub stop_on_error: bool,
    pub timeout: Option<Duration>,
    /// The script argument names a file to evaluate
    pub file: bool,
    /// Clear pending cancellation on the child afterwards
    pub no_cancel: bool,
    /// With `no_cancel`, clear it on the child's descendants too
    pub global_cancel: bool,
}

type Undo = Box<dyn FnOnce(&mut Interpreter) -> Result<()> + Send>;

/// One evaluation in a locked, adjusted child interpreter.
///
/// Each adjustment pushes its undo as soon as it succeeds; the undos run
/// in reverse on every exit path and the child's lock is released last.
pub struct SecureEvalSession<'a> {
    child: MutexGuard<'a, Interpreter>,
    path: String,
    undo: Vec<(&'static str, Undo)>,
    failures: Vec<DebugError>,
    elevated: bool,
}

impl<'a> SecureEvalSession<'a> {
    pub fn begin(
        handle: &'a InterpHandle,
        path: &str,
        config: &DebuggerConfig,
        options: &SecureEvalOptions,
    ) -> Result<Self> {
        let child = lock_with_retry(handle, config)?;
        debug!(child = path, "secure eval: child locked");

        let mut session = Self {
            child,
            path: path.to_string(),
            undo: Vec::new(),
            failures: Vec::new(),
            elevated: false,
        };
        session.acquire(options)?;
        Ok(session)
    }

    fn push<F>(&mut self, step: &'static str, undo: F)
    where
        F: FnOnce(&mut Interpreter) -> Result<()> + Send + 'static,
    {
        debug!(child = %self.path, step, "secure eval: acquired");
        self.undo.push((step, Box::new(undo)));
    }

    fn acquire(&mut self, options: &SecureEvalOptions) -> Result<()> {
        if options.no_cancel {
            let global = options.global_cancel;
            self.push("cancel", move |child| {
                child.reset_cancel(global)?;
                Ok(())
            });
        }

        if let Some(debugger) = self.child.debugger_mut() {
            if debugger.is_enabled() {
                debugger.suspend();
                self.push("debugger", |child| {
                    child.require_debugger()?.resume()?;
                    Ok(())
                });
            }
        }

        if !options.events {
            let saved = self.child.events_enabled();
            self.child.set_events_enabled(false);
            self.push("events", move |child| {
                child.set_events_enabled(saved);
                Ok(())
            });
        }

        if options.stop_on_error {
            let saved = self.child.wait_flags();
            self.child.set_wait_flags(saved | WaitFlags::STOP_ON_ERROR);
            self.push("wait flags", move |child| {
                child.set_wait_flags(saved);
                Ok(())
            });
        }

        if options.trusted && self.child.is_restricted() {
            self.child.set_flag(InterpreterFlags::TRUSTED, true);
            self.elevated = true;
            self.push("trust", |child| {
                child.set_flag(InterpreterFlags::TRUSTED, false);
                Ok(())
            });

            let saved = self.child.context_flags();
            self.child.set_context_flags(saved | ContextFlags::IGNORE_HIDDEN_COMMANDS);
            self.push("context flags", move |child| {
                child.set_context_flags(saved);
                Ok(())
            });
        } else if options.trusted {
            debug!(child = %self.path, "child is not restricted, trust request ignored");
        }

        if let Some(timeout) = options.timeout {
            let watchdog = Watchdog::start(self.child.cancel_state(), timeout, self.path.clone())?;
            self.push("watchdog", move |_| {
                if watchdog.stop() {
                    info!("secure eval watchdog fired");
                }
                Ok(())
            });
        }
        Ok(())
    }

    /// Whether restrictions were actually lifted.
    pub fn elevated(&self) -> bool {
        self.elevated
    }

    pub fn evaluate(&mut self, script: &str, file: bool) -> EvalResult {
        if file {
            self.child.eval_file(script)
        } else {
            self.child.eval_source(&self.path, script)
        }
    }

    pub fn child_error(&self) -> (String, Option<usize>) {
        (self.child.error_info().to_string(), self.child.error_line())
    }

    /// Undo every adjustment, newest first, and release the child. Failed
    /// undo steps don't stop the others; they are handed back.
    pub fn finish(mut self) -> Vec<DebugError> {
        self.unwind();
        std::mem::take(&mut self.failures)
    }

    fn unwind(&mut self) {
        while let Some((step, undo)) = self.undo.pop() {
            match undo(&mut *self.child) {
                Ok(()) => debug!(child = %self.path, step, "secure eval: restored"),
                Err(e) => {
                    warn!(child = %self.path, step, error = %e, "secure eval: restore failed");
                    self.failures.push(e);
                }
            }
        }
    }
}

impl Drop for SecureEvalSession<'_> {
    fn drop(&mut self) {
        self.unwind();
        // nobody collected these through finish()
        for failure in std::mem::take(&mut self.failures) {
            self.child.complain(&failure);
        }
    }
}
