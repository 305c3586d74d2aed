use super::coordinator::InteractiveLoopCoordinator;
use crate::callframe::FrameFlags;
use crate::debugger::{BreakpointType, ScriptLocation};
use crate::error::{DebugError, EvalResult, Result};
use crate::interp::{Interpreter, InterpreterFlags};
use crate::parser::{brace_delta, is_comment};
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info};

/// Why an interactive debugger loop was entered.
#[derive(Debug, Clone)]
pub struct LoopData {
    pub kind: BreakpointType,
    pub location: Option<ScriptLocation>,
    pub reason: String,
}

impl LoopData {
    pub fn demand(reason: impl Into<String>) -> Self {
        Self {
            kind: BreakpointType::DEMAND,
            location: None,
            reason: reason.into(),
        }
    }
}

/// Lines starting with `#` that steer the loop instead of being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Go,
    Step,
    Cancel,
    Stack,
    Info,
    Result,
}

impl Directive {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "#go" | "#continue" | "#run" => Some(Self::Go),
            "#step" => Some(Self::Step),
            "#cancel" => Some(Self::Cancel),
            "#stack" => Some(Self::Stack),
            "#info" => Some(Self::Info),
            "#result" => Some(Self::Result),
            _ => None,
        }
    }
}

/// Nested read-eval-report loop run at a breakpoint.
///
/// Owns the console for its duration (the coordinator token) and runs its
/// commands inside a debugger frame with breakpoints suppressed. The
/// outcome is the last command's result, or `Canceled` after `#cancel`.
pub fn run_interactive_loop(interp: &mut Interpreter, data: LoopData) -> EvalResult {
    if !interp.is_interactive() {
        return Err(DebugError::NotInteractive(
            "cannot break into interactive loop".to_string(),
        ));
    }

    let coordinator = interp.coordinator();
    if !coordinator.try_acquire() {
        return Err(DebugError::LockUnavailable(
            "unable to acquire interactive loop".to_string(),
        ));
    }

    let depth = interp.debugger_mut().map_or(0, |d| d.enter_loop());
    info!(interp = interp.id(), depth, kind = %data.kind, "entering interactive loop");
    interp.no_breakpoint += 1;
    let handle = interp.stack_mut().push_tracking_frame("debugger loop", FrameFlags::DEBUGGER);

    announce(interp, &data);
    let outcome = read_eval_loop(interp, &coordinator);

    interp.pop_tracking_frame(handle);
    interp.no_breakpoint -= 1;
    if let Some(debugger) = interp.debugger_mut() {
        debugger.exit_loop();
    }
    coordinator.release();
    info!(interp = interp.id(), ok = outcome.is_ok(), "leaving interactive loop");
    outcome
}

fn announce(interp: &mut Interpreter, data: &LoopData) {
    let mut line = format!("debugger: {} break", data.kind);
    if let Some(location) = &data.location {
        line.push_str(&format!(" at {}", location));
    }
    if !data.reason.is_empty() {
        let reason = data.reason.lines().next().unwrap_or_default();
        line.push_str(&format!(": {}", reason));
    }
    line.push('\n');
    interp.write_output(&line);
}

fn read_eval_loop(interp: &mut Interpreter, coordinator: &InteractiveLoopCoordinator) -> EvalResult {
    let mut last = String::new();

    while let Some(line) = next_command(interp, coordinator)? {
        match Directive::parse(&line) {
            Some(Directive::Go) => {
                if let Some(debugger) = interp.debugger_mut() {
                    debugger.set_single_step(false);
                }
                break;
            }
            Some(Directive::Step) => {
                if let Some(debugger) = interp.debugger_mut() {
                    debugger.set_single_step(true);
                }
                break;
            }
            Some(Directive::Cancel) => {
                return Err(DebugError::Canceled("debugger loop canceled".to_string()));
            }
            Some(Directive::Stack) => {
                let lines = interp.stack().describe();
                for frame in lines {
                    interp.write_output(&format!("{}\n", frame));
                }
            }
            Some(Directive::Info) => {
                let text = match interp.debugger() {
                    Some(debugger) => serde_json::to_string_pretty(&debugger.info())?,
                    None => "debugger not available".to_string(),
                };
                interp.write_output(&format!("{}\n", text));
            }
            Some(Directive::Result) => {
                let text = interp
                    .debugger()
                    .and_then(|d| d.result().map(str::to_string))
                    .unwrap_or_default();
                interp.write_output(&format!("{}\n", text));
            }
            None if is_comment(&line) => {}
            None => {
                let outcome = interp.eval(&line);
                let text = match &outcome {
                    Ok(result) => result.clone(),
                    Err(e) => e.to_string(),
                };
                if let Some(debugger) = interp.debugger_mut() {
                    debugger.set_result(Some(text.clone()));
                }
                match outcome {
                    Ok(result) => {
                        if !result.is_empty() {
                            interp.write_output(&format!("{}\n", result));
                        }
                        last = result;
                    }
                    Err(e) if e.is_canceled() => return Err(e),
                    Err(_) => interp.write_output(&format!("error: {}\n", text)),
                }
            }
        }
    }
    Ok(last)
}

/// The one-time command, then the queue, then the host. `None` ends the
/// loop.
fn next_command(interp: &mut Interpreter, coordinator: &InteractiveLoopCoordinator) -> Result<Option<String>> {
    if let Some(command) = interp.debugger_mut().and_then(|d| d.take_command()) {
        return Ok(Some(command));
    }
    if interp.has_flag(InterpreterFlags::LOOP_TEST_HOOK) || !interp.has_host() {
        return Ok(None);
    }
    let prompt = interp.config().debug_prompt.clone();
    read_host_line(interp, coordinator, &prompt)
}

/// Blocking host read, registered with the coordinator so another thread
/// wanting the console can cancel it. A canceled read reads as end of input.
fn read_host_line(
    interp: &mut Interpreter,
    coordinator: &InteractiveLoopCoordinator,
    prompt: &str,
) -> Result<Option<String>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let _registration = coordinator.begin_read(Arc::clone(&cancel), interp.host_can_cancel_read());
    match interp.read_interactive(prompt, &cancel) {
        Ok(line) => Ok(line),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
            debug!(interp = interp.id(), "interactive read canceled");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Top-level read-eval-print loop of an interactive interpreter. Lines
/// with open braces are continued on the next read. `exit` or end of
/// input ends it.
pub fn run_repl(interp: &mut Interpreter) -> Result<()> {
    let coordinator = interp.coordinator();
    let prompt = interp.config().prompt.clone();
    let mut pending = String::new();
    let mut depth = 0i32;

    loop {
        let shown = if pending.is_empty() { prompt.as_str() } else { "> " };
        let line = match read_host_line(interp, &coordinator, shown)? {
            Some(line) => line,
            None => break,
        };

        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(&line);
        depth += brace_delta(&line);
        if depth > 0 {
            continue;
        }
        depth = 0;

        let script = std::mem::take(&mut pending);
        if script.trim() == "exit" {
            break;
        }
        if is_comment(&script) {
            continue;
        }
        match interp.eval(&script) {
            Ok(result) if result.is_empty() => {}
            Ok(result) => interp.write_output(&format!("{}\n", result)),
            Err(e) => interp.write_output(&format!("error: {}\n", e)),
        }
    }
    Ok(())
}
