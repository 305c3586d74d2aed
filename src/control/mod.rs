//! The `debug` command: one subcommand per debugger operation.

mod options;

pub use options::{parse_options, OptionSpec, ParsedOptions};

use crate::callframe::CallStack;
use crate::debugger::{BreakOptions, BreakpointType, ScriptLocation};
use crate::emergency::{self, EmergencyFlags};
use crate::error::{DebugError, EvalResult, Result};
use crate::interactive::{run_interactive_loop, LoopData};
use crate::interp::Interpreter;
use crate::parser::{parse_bool, quote_list};
use crate::secure;
use tracing::debug;

const SUBCOMMANDS: &[&str] = &[
    "break", "breakpoint", "breakpoints", "callback", "emergency", "enable", "icommand", "info",
    "invoke", "iqueue", "iresult", "lockloop", "restore", "resume", "run", "secureeval", "setup",
    "step", "steps", "suspend", "token", "types",
];

pub fn dispatch(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let (sub, rest) = args
        .split_first()
        .ok_or_else(|| DebugError::usage("debug option ?arg ...?"))?;
    debug!(interp = interp.id(), subcommand = %sub, "debug");

    match sub.as_str() {
        "break" => cmd_break(interp, rest),
        "breakpoint" => cmd_breakpoint(interp, rest),
        "breakpoints" => cmd_breakpoints(interp, rest),
        "callback" => cmd_callback(interp, rest),
        "emergency" => cmd_emergency(interp, rest),
        "enable" => cmd_enable(interp, rest),
        "icommand" => cmd_icommand(interp, rest),
        "info" => cmd_info(interp, rest),
        "invoke" => cmd_invoke(interp, rest),
        "iqueue" => cmd_iqueue(interp, rest),
        "iresult" => cmd_iresult(interp, rest),
        "lockloop" => cmd_lockloop(interp, rest),
        "restore" => cmd_restore(interp, rest),
        "resume" => cmd_resume(interp, rest),
        "run" => cmd_run(interp, rest),
        "secureeval" => secure::secure_eval_command(interp, rest),
        "setup" => cmd_setup(interp, rest),
        "step" => cmd_step(interp, rest),
        "steps" => cmd_steps(interp, rest),
        "suspend" => cmd_suspend(interp, rest),
        "token" => cmd_token(interp, rest),
        "types" => cmd_types(interp, rest),
        other => Err(DebugError::script(format!(
            "bad option \"{}\": must be {}",
            other,
            SUBCOMMANDS.join(", ")
        ))),
    }
}

fn flag(on: bool) -> String {
    if on { "1" } else { "0" }.to_string()
}

fn bool_arg(text: &str) -> Result<bool> {
    parse_bool(text).ok_or_else(|| DebugError::script(format!("expected boolean value but got \"{}\"", text)))
}

/// Enter an interactive loop on demand.
///
/// Passes `previous` through untouched when there is no debugger, when
/// demand breaks are off, or when it is disabled (unless told to ignore
/// that). With `no_error` an error from the loop becomes an empty success.
pub fn debug_break(interp: &mut Interpreter, options: BreakOptions, previous: EvalResult) -> EvalResult {
    let wanted = interp.debugger().map_or(false, |d| {
        d.types().has(BreakpointType::DEMAND) && (d.is_enabled() || options.ignore_enabled)
    });
    if !wanted {
        return previous;
    }

    interp.run_callback(BreakpointType::DEMAND);
    match run_interactive_loop(interp, LoopData::demand("debug break")) {
        Err(e) if options.no_error => {
            debug!(interp = interp.id(), error = %e, "break error ignored");
            Ok(String::new())
        }
        outcome => outcome,
    }
}

fn cmd_break(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::switch("-noerror"), OptionSpec::switch("-ignoreenabled")];
    let (opts, rest) = parse_options(SPECS, args)?;
    if !rest.is_empty() {
        return Err(DebugError::usage("debug break ?-noerror? ?-ignoreenabled?"));
    }
    let options = BreakOptions {
        no_error: opts.has("-noerror"),
        ignore_enabled: opts.has("-ignoreenabled"),
    };
    debug_break(interp, options, Ok(String::new()))
}

fn cmd_setup(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let (create, isolated) = match args {
        [] => (true, false),
        [create] => (bool_arg(create)?, false),
        [create, isolated] => (bool_arg(create)?, bool_arg(isolated)?),
        _ => return Err(DebugError::usage("debug setup ?create? ?isolated?")),
    };
    interp.setup_debugger(create, isolated)?;
    Ok(flag(interp.debugger().is_some()))
}

fn cmd_restore(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    if !args.is_empty() {
        return Err(DebugError::usage("debug restore"));
    }
    let config = interp.config().clone();
    interp.require_debugger()?.restore(&config);
    Ok(String::new())
}

fn cmd_enable(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let debugger = interp.require_debugger()?;
    match args {
        [] => {}
        [value] => debugger.set_enabled(bool_arg(value)?),
        _ => return Err(DebugError::usage("debug enable ?enabled?")),
    }
    Ok(flag(debugger.is_enabled()))
}

fn cmd_suspend(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    if !args.is_empty() {
        return Err(DebugError::usage("debug suspend"));
    }
    Ok(interp.require_enabled_debugger()?.suspend().to_string())
}

/// A suspended debugger reads as disabled, so resume accepts either.
fn cmd_resume(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    if !args.is_empty() {
        return Err(DebugError::usage("debug resume"));
    }
    let debugger = interp.require_debugger()?;
    if !debugger.is_enabled() && !debugger.is_suspended() {
        return Err(DebugError::DebuggerUnavailable("debugger not enabled".to_string()));
    }
    Ok(debugger.resume()?.to_string())
}

/// Suspend, evaluate at full speed, resume. A failing resume is
/// complained about; the evaluation outcome stands.
fn cmd_run(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let script = match args {
        [script] => script,
        _ => return Err(DebugError::usage("debug run script")),
    };
    interp.require_enabled_debugger()?.suspend();

    let outcome = interp.eval(script);

    if let Err(e) = interp.require_debugger().and_then(|d| d.resume()) {
        interp.complain(&e);
    }
    outcome
}

fn cmd_emergency(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let flags = match args {
        [] => EmergencyFlags::DEFAULT,
        [list] => list
            .parse::<EmergencyFlags>()
            .map_err(DebugError::script)?,
        _ => return Err(DebugError::usage("debug emergency ?flags?")),
    };
    emergency::emergency(interp, flags)
}

fn cmd_iqueue(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    const SPECS: &[OptionSpec] = &[OptionSpec::switch("-dump"), OptionSpec::switch("-clear")];
    let (opts, rest) = parse_options(SPECS, args)?;
    let debugger = interp.require_debugger()?;

    let mut result = String::new();
    if opts.has("-dump") {
        result = quote_list(&debugger.dump_commands());
    }
    if opts.has("-clear") {
        debugger.clear_commands();
    }
    match rest {
        [] => {}
        [command] => debugger.enqueue(command.as_str()),
        _ => return Err(DebugError::usage("debug iqueue ?-dump? ?-clear? ?command?")),
    }
    Ok(result)
}

fn cmd_icommand(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let debugger = interp.require_debugger()?;
    match args {
        [] => Ok(debugger.command().unwrap_or_default().to_string()),
        [command] => {
            debugger.set_command(Some(command.clone()));
            Ok(String::new())
        }
        _ => Err(DebugError::usage("debug icommand ?command?")),
    }
}

fn cmd_iresult(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let debugger = interp.require_debugger()?;
    match args {
        [] => Ok(debugger.result().unwrap_or_default().to_string()),
        [result] => {
            debugger.set_result(Some(result.clone()));
            Ok(String::new())
        }
        _ => Err(DebugError::usage("debug iresult ?result?")),
    }
}

/// `debug invoke ?level? cmd ?arg ...?`; the level defaults to 1.
fn cmd_invoke(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let (level, words) = match args {
        [] => return Err(DebugError::usage("debug invoke ?level? cmd ?arg ...?")),
        [first, rest @ ..] if !rest.is_empty() && CallStack::is_level_spec(first) => (first.as_str(), rest),
        _ => ("1", args),
    };
    interp.invoke_uplevel(level, words.to_vec())
}

fn cmd_token(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let debugger = interp.require_debugger()?;
    match args {
        [] => {}
        [value] => debugger.set_break_on_token(bool_arg(value)?),
        _ => return Err(DebugError::usage("debug token ?enabled?")),
    }
    Ok(flag(debugger.break_on_token()))
}

fn parse_line(text: &str) -> Result<usize> {
    text.trim()
        .parse()
        .map_err(|_| DebugError::InvalidLocation(format!("bad line number \"{}\"", text)))
}

fn cmd_breakpoint(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let usage = || DebugError::usage("debug breakpoint set|clear|match fileName startLine ?endLine?");
    let (action, location) = match args {
        [action, file, start] => {
            let start = parse_line(start)?;
            (action, ScriptLocation::new(file.as_str(), start, start))
        }
        [action, file, start, end] => (
            action,
            ScriptLocation::new(file.as_str(), parse_line(start)?, parse_line(end)?),
        ),
        _ => return Err(usage()),
    };
    let debugger = interp.require_debugger()?;
    let outcome = match action.as_str() {
        "set" => debugger.set_breakpoint(&location)?,
        "clear" => debugger.clear_breakpoint(&location)?,
        "match" => debugger.match_breakpoint(&location)?,
        _ => return Err(usage()),
    };
    Ok(flag(outcome))
}

fn cmd_breakpoints(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let pattern = match args {
        [] => None,
        [pattern] => Some(pattern.as_str()),
        _ => return Err(DebugError::usage("debug breakpoints ?pattern?")),
    };
    Ok(quote_list(&interp.require_debugger()?.breakpoint_list(pattern)))
}

/// Bare names replace the set; `+Name` adds and `-Name` removes on top.
fn cmd_types(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let debugger = interp.require_debugger()?;
    if args.is_empty() {
        return Ok(debugger.types().to_string());
    }

    let mut replace: Option<BreakpointType> = None;
    let mut add = BreakpointType::NONE;
    let mut remove = BreakpointType::NONE;
    for word in args.iter().flat_map(|a| a.split_whitespace()) {
        let (target, name) = if let Some(name) = word.strip_prefix('+') {
            (&mut add, name)
        } else if let Some(name) = word.strip_prefix('-') {
            (&mut remove, name)
        } else {
            (replace.get_or_insert(BreakpointType::NONE), word)
        };
        target.set(name.parse::<BreakpointType>().map_err(DebugError::script)?);
    }

    if let Some(types) = replace {
        debugger.set_types(types);
    }
    debugger.add_types(add);
    debugger.remove_types(remove);
    Ok(debugger.types().to_string())
}

fn cmd_step(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let interactive = interp.is_interactive();
    let debugger = interp.require_debugger()?;
    match args {
        [] => {}
        [value] => {
            let on = bool_arg(value)?;
            if !interactive {
                return Err(DebugError::NotInteractive(
                    "cannot set single step while not interactive".to_string(),
                ));
            }
            debugger.set_single_step(on);
        }
        _ => return Err(DebugError::usage("debug step ?enabled?")),
    }
    Ok(flag(debugger.single_step()))
}

fn cmd_steps(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let interactive = interp.is_interactive();
    let debugger = interp.require_debugger()?;
    match args {
        [] => {}
        [value] => {
            let steps: i64 = value
                .trim()
                .parse()
                .map_err(|_| DebugError::script(format!("expected integer but got \"{}\"", value)))?;
            if !interactive {
                return Err(DebugError::NotInteractive(
                    "cannot set steps while not interactive".to_string(),
                ));
            }
            debugger.set_steps(steps);
        }
        _ => return Err(DebugError::usage("debug steps ?count?")),
    }
    Ok(debugger.steps().to_string())
}

/// With no arguments report the callback; a single empty argument clears it.
fn cmd_callback(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let debugger = interp.require_debugger()?;
    match args {
        [] => Ok(debugger
            .callback_arguments()
            .map(|words| quote_list(words))
            .unwrap_or_default()),
        [only] if only.is_empty() => {
            debugger.set_callback_arguments(None);
            Ok(String::new())
        }
        _ => {
            debugger.set_callback_arguments(Some(args.to_vec()));
            Ok(String::new())
        }
    }
}

/// Take (`true`) or give back (`false`) the interactive loop token on
/// behalf of the calling thread.
fn cmd_lockloop(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let lock = match args {
        [value] => bool_arg(value)?,
        _ => return Err(DebugError::usage("debug lockloop lock")),
    };
    let coordinator = interp.coordinator();
    if lock {
        if !coordinator.try_acquire() {
            return Err(DebugError::LockUnavailable(
                "unable to acquire interactive loop".to_string(),
            ));
        }
        Ok(flag(true))
    } else {
        Ok(flag(coordinator.release()))
    }
}

fn cmd_info(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    if !args.is_empty() {
        return Err(DebugError::usage("debug info"));
    }
    let info = interp.require_debugger()?.info();
    Ok(serde_json::to_string(&info)?)
}
