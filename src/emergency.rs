//! "Diagnose and optionally fix" the debugging setup of an interpreter in
//! one step, under its hard lock.

use crate::control::debug_break;
use crate::debugger::{BreakOptions, BreakpointType};
use crate::error::{DebugError, EvalResult, Result};
use crate::flags::flag_set;
use crate::interp::{Interpreter, InterpreterFlags};
use std::fmt::Display;
use tracing::{debug, info};

flag_set! {
    /// What `debug emergency` should do.
    pub struct EmergencyFlags: u32 {
        /// Turn every aspect on
        const ENABLED = 1 << 0, "Enabled";
        /// Turn every aspect off
        const DISABLED = 1 << 1, "Disabled";
        /// Afterwards, break into the interactive loop
        const BREAK = 1 << 2, "Break";
        /// Include break-on-token
        const TOKENS = 1 << 3, "Tokens";
        /// Include script-argument tracking
        const SCRIPT_ARGUMENTS = 1 << 4, "ScriptArguments";
        /// Report unchanged aspects too
        const VERBOSE = 1 << 5, "Verbose";
        /// Create the debugger when missing
        const CREATED = 1 << 6, "Created";
        /// Change interactive mode even when locked against changes
        const IGNORE_MODIFIABLE = 1 << 7, "IgnoreModifiable";
        /// Create the debugger with its own interpreter
        const ISOLATED = 1 << 8, "Isolated";
        /// Tear the debugger down
        const DISPOSED = 1 << 9, "Disposed";
    }
}

impl EmergencyFlags {
    pub const DEFAULT: Self = Self(Self::ENABLED.bits() | Self::CREATED.bits() | Self::BREAK.bits());

    /// `Some(true)` to enable, `Some(false)` to disable, `None` to only report.
    pub fn requested(self) -> Result<Option<bool>> {
        match (self.has(Self::ENABLED), self.has(Self::DISABLED)) {
            (true, true) => Err(DebugError::script("cannot both enable and disable")),
            (true, false) => Ok(Some(true)),
            (false, true) => Ok(Some(false)),
            (false, false) => Ok(None),
        }
    }
}

/// Lines describing what an emergency pass changed (and, when verbose,
/// what it left alone).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmergencyReport {
    pub lines: Vec<String>,
    pub changes: usize,
    verbose: bool,
}

impl EmergencyReport {
    fn changed(&mut self, aspect: &str, from: impl Display, to: impl Display) {
        info!(aspect, %from, %to, "emergency change");
        self.lines.push(format!("{}: {} -> {}", aspect, from, to));
        self.changes += 1;
    }

    fn status(&mut self, aspect: &str, value: impl Display) {
        if self.verbose {
            self.lines.push(format!("{}: {}", aspect, value));
        }
    }

    /// Compare `current` against the request; returns the value to apply
    /// when it differs.
    fn toggle(&mut self, aspect: &str, current: bool, wanted: Option<bool>) -> Option<bool> {
        match wanted {
            Some(want) if want != current => {
                self.changed(aspect, current, want);
                Some(want)
            }
            _ => {
                self.status(aspect, current);
                None
            }
        }
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Take the hard lock, apply `flags`, and break afterwards when asked to.
/// Fails with `LockUnavailable` without touching anything if the lock
/// can't be had.
///
/// The hard lock is the interpreter's sync root. The `&mut` borrow means
/// the caller already holds the handle lock when the interpreter is a
/// child, so this works from inside `interp eval` and secure evaluation.
pub fn emergency(interp: &mut Interpreter, flags: EmergencyFlags) -> EvalResult {
    let sync_root = interp.sync_root();
    let report = {
        let _guard = sync_root
            .try_lock_for(interp.config().lock_timeout())
            .ok_or_else(|| DebugError::LockUnavailable("unable to acquire interpreter lock".to_string()))?;
        apply(interp, flags)?
    };
    let text = report.text();

    if flags.has(EmergencyFlags::BREAK) {
        if !text.is_empty() {
            interp.write_output(&format!("{}\n", text));
        }
        return debug_break(interp, BreakOptions::default(), Ok(text));
    }
    Ok(text)
}

/// Walk every aspect in order. Caller holds the hard lock.
pub fn apply(interp: &mut Interpreter, flags: EmergencyFlags) -> Result<EmergencyReport> {
    if flags.has(EmergencyFlags::CREATED) && flags.has(EmergencyFlags::DISPOSED) {
        return Err(DebugError::script("cannot both create and dispose the debugger"));
    }
    let wanted = flags.requested()?;
    let mut report = EmergencyReport {
        verbose: flags.has(EmergencyFlags::VERBOSE),
        ..EmergencyReport::default()
    };
    debug!(interp = interp.id(), %flags, "emergency");

    apply_existence(interp, flags, &mut report)?;
    apply_debugger(interp, flags, wanted, &mut report);
    apply_interpreter(interp, flags, wanted, &mut report);

    Ok(report)
}

fn apply_existence(interp: &mut Interpreter, flags: EmergencyFlags, report: &mut EmergencyReport) -> Result<()> {
    let present = interp.debugger().is_some();
    if flags.has(EmergencyFlags::CREATED) && !present {
        interp.setup_debugger(true, flags.has(EmergencyFlags::ISOLATED))?;
        report.changed("debugger", "absent", "created");
    } else if flags.has(EmergencyFlags::DISPOSED) && present {
        interp.teardown_debugger();
        report.changed("debugger", "present", "disposed");
    } else {
        report.status("debugger", if present { "present" } else { "absent" });
    }
    Ok(())
}

fn apply_debugger(
    interp: &mut Interpreter,
    flags: EmergencyFlags,
    wanted: Option<bool>,
    report: &mut EmergencyReport,
) {
    let Some(debugger) = interp.debugger_mut() else {
        return;
    };

    let types = BreakpointType::default_types(Some(true), flags.has(EmergencyFlags::TOKENS));
    let current = debugger.types();
    let (matched, status) = current.match_types(types, wanted);
    match wanted {
        Some(true) if !matched => {
            debugger.add_types(types);
            report.changed("debugger types", current, debugger.types());
        }
        Some(false) if !matched => {
            debugger.remove_types(types);
            report.changed("debugger types", current, debugger.types());
        }
        _ => report.status("debugger types", status),
    }

    if let Some(on) = report.toggle("debugger enabled", debugger.is_enabled(), wanted) {
        debugger.set_enabled(on);
    }

    if flags.has(EmergencyFlags::TOKENS) {
        if let Some(on) = report.toggle("break on token", debugger.break_on_token(), wanted) {
            debugger.set_break_on_token(on);
        }
    }
}

fn apply_interpreter(
    interp: &mut Interpreter,
    flags: EmergencyFlags,
    wanted: Option<bool>,
    report: &mut EmergencyReport,
) {
    let interactive = interp.is_interactive();
    let may_change = interp.is_interactive_modifiable() || flags.has(EmergencyFlags::IGNORE_MODIFIABLE);
    match wanted {
        Some(want) if want != interactive && !may_change => {
            report.status("interactive", format!("{} (not modifiable)", interactive));
        }
        _ => {
            if let Some(on) = report.toggle("interactive", interactive, wanted) {
                interp.set_flag(InterpreterFlags::INTERACTIVE, on);
            }
        }
    }

    let mut tracking = vec![
        ("script locations", InterpreterFlags::TRACK_SCRIPT_LOCATIONS),
        ("argument locations", InterpreterFlags::TRACK_ARGUMENT_LOCATIONS),
    ];
    if flags.has(EmergencyFlags::SCRIPT_ARGUMENTS) {
        tracking.push(("script arguments", InterpreterFlags::TRACK_SCRIPT_ARGUMENTS));
    }
    for (aspect, flag) in tracking {
        if let Some(on) = report.toggle(aspect, interp.has_flag(flag), wanted) {
            interp.set_flag(flag, on);
        }
    }

    // enabling clears the hook, disabling leaves it alone
    let hooked = interp.has_flag(InterpreterFlags::LOOP_TEST_HOOK);
    if wanted == Some(true) && hooked {
        interp.set_flag(InterpreterFlags::LOOP_TEST_HOOK, false);
        report.changed("loop test hook", true, false);
    } else {
        report.status("loop test hook", hooked);
    }
}
