use super::commands::{self, Site};
use crate::debugger::{BreakpointType, ScriptLocation};
use crate::error::{DebugError, EvalResult, Result};
use crate::interp::{Interpreter, InterpreterFlags};
use crate::parser::{is_comment, preprocess_script, quote_list, split_words, substitute, LogicalLine};
use tracing::{debug, trace};

/// Script text plus where it came from.
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    /// Source name used for token breakpoints and error info; empty for
    /// scripts typed or built at runtime
    pub name: &'a str,
    pub text: &'a str,
    /// Line number of the first line of `text` within `name`
    pub first_line: usize,
}

impl<'a> Source<'a> {
    pub fn anonymous(text: &'a str) -> Self {
        Self {
            name: "",
            text,
            first_line: 1,
        }
    }

    pub fn named(name: &'a str, text: &'a str, first_line: usize) -> Self {
        Self {
            name,
            text,
            first_line: first_line.max(1),
        }
    }

    fn location(&self, line: &LogicalLine) -> ScriptLocation {
        ScriptLocation::new(
            self.name,
            self.first_line + line.phys_start,
            self.first_line + line.phys_end,
        )
    }
}

/// Evaluate a whole script. The result is that of the last command.
///
/// When the outermost evaluation finishes, a pending cancel that was not
/// raised with unwind is cleared so the interpreter is usable again.
pub fn run_script(interp: &mut Interpreter, source: &Source<'_>) -> EvalResult {
    interp.eval_depth += 1;
    let outcome = run_lines(interp, source);
    interp.eval_depth -= 1;

    if interp.eval_depth == 0 {
        if outcome.is_ok() {
            // the script already succeeded; a failing exit break only complains
            if let Err(e) = maybe_break(interp, BreakpointType::EXIT, None, "script finished") {
                interp.complain(&e);
            }
        }
        if interp.cancel_state().reset(false) {
            debug!(interp = interp.id(), "cancel reset after outermost evaluation");
        }
    }
    outcome
}

fn run_lines(interp: &mut Interpreter, source: &Source<'_>) -> EvalResult {
    let pre = preprocess_script(source.text);
    let mut result = String::new();

    for line in &pre.logical {
        if is_comment(&line.text) {
            continue;
        }
        let location = source.location(line);
        result = run_command(interp, source, &line.text, &location)?;
    }
    Ok(result)
}

fn run_command(
    interp: &mut Interpreter,
    source: &Source<'_>,
    text: &str,
    location: &ScriptLocation,
) -> EvalResult {
    if interp.cancel_state().is_canceled() {
        maybe_break(interp, BreakpointType::CANCEL, Some(location), "evaluation canceled")?;
        interp.check_canceled()?;
    }

    let tracking = interp.has_flag(InterpreterFlags::TRACK_SCRIPT_LOCATIONS);
    if tracking {
        interp.locations.push(location.clone());
    }
    let outcome = run_tracked(interp, source, text, location, tracking);
    if tracking {
        interp.locations.pop();
    }

    match outcome {
        Ok(result) => Ok(result),
        Err(e) if e.is_canceled() => Err(e),
        Err(e) => {
            let fresh = match &e {
                DebugError::Script { line, .. } => line.is_none(),
                other => !interp.error_info().starts_with(&other.to_string()),
            };
            let e = e.at_line(location.start_line);
            record_error(interp, source, text, &e, fresh);
            maybe_break(interp, BreakpointType::ERROR, Some(location), &e.to_string())?;
            Err(e)
        }
    }
}

fn run_tracked(
    interp: &mut Interpreter,
    source: &Source<'_>,
    text: &str,
    location: &ScriptLocation,
    tracking: bool,
) -> EvalResult {
    if breaks_allowed(interp) {
        if tracking && interp.debugger().map_or(false, |d| d.token_break(location)) {
            interp.breakpoint_event(BreakpointType::TOKEN, Some(location), "token breakpoint")?;
        }
        if interp.debugger_mut().map_or(false, |d| d.step_break()) {
            interp.breakpoint_event(BreakpointType::EXECUTE, Some(location), "step")?;
        } else {
            maybe_break(interp, BreakpointType::EXECUTE, Some(location), text)?;
        }
    }

    let words = split_words(text)?;
    let mut values = Vec::with_capacity(words.len());
    for word in &words {
        values.push(substitute(word, |name| interp.read_var(name))?);
    }
    if values.is_empty() {
        return Ok(String::new());
    }
    trace!(interp = interp.id(), line = location.start_line, command = %values[0], "execute");

    if interp.has_flag(InterpreterFlags::TRACK_SCRIPT_ARGUMENTS) {
        if let Some(debugger) = interp.debugger_mut() {
            debugger.set_execute_arguments(Some(values.clone()));
        }
    }
    maybe_break(
        interp,
        BreakpointType::EXECUTE_ARGUMENT,
        Some(location),
        &quote_list(&values),
    )?;

    let site = Site {
        name: source.name,
        line: location.start_line,
    };
    let result = commands::execute(interp, &values, &site)?;
    maybe_break(interp, BreakpointType::RETURN, Some(location), &result)?;
    Ok(result)
}

/// Run one already-split command, outside of any script.
pub fn invoke(interp: &mut Interpreter, words: Vec<String>) -> EvalResult {
    if words.is_empty() {
        return Ok(String::new());
    }
    interp.check_canceled()?;
    let site = Site { name: "", line: 1 };
    commands::execute(interp, &words, &site)
}

fn breaks_allowed(interp: &Interpreter) -> bool {
    interp.no_breakpoint == 0 && interp.is_interactive() && interp.debugger().is_some()
}

/// Break when the debugger is enabled and wants this event type.
fn maybe_break(
    interp: &mut Interpreter,
    kind: BreakpointType,
    location: Option<&ScriptLocation>,
    reason: &str,
) -> Result<()> {
    if breaks_allowed(interp) && interp.debugger().map_or(false, |d| d.wants(kind)) {
        interp.breakpoint_event(kind, location, reason)?;
    }
    Ok(())
}

/// Build up error info: the message once, then one trailer per command
/// the error passed through.
fn record_error(interp: &mut Interpreter, source: &Source<'_>, text: &str, error: &DebugError, fresh: bool) {
    let command = text.lines().next().unwrap_or_default();
    let verb = if fresh {
        interp.set_error_info(error.to_string(), error.line());
        "while executing"
    } else {
        "invoked from within"
    };
    let mut trailer = format!("    {}\n\"{}\"", verb, command);
    if interp.has_flag(InterpreterFlags::TRACK_ARGUMENT_LOCATIONS) {
        let name = if source.name.is_empty() { "script" } else { source.name };
        trailer.push_str(&format!("\n    (\"{}\" line {})", name, error.line().unwrap_or(0)));
    }
    interp.append_error_info(&trailer);
}
