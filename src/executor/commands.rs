use super::runner::{run_script, Source};
use crate::control;
use crate::error::{DebugError, EvalResult, Result};
use crate::interp::{lock_with_retry, ContextFlags, Interpreter};
use crate::parser::quote_list;
use std::thread;
use std::time::{Duration, Instant};

/// Commands a restricted interpreter cannot see.
pub const HIDDEN_COMMANDS: &[&str] = &["puts", "source", "sleep", "interp", "debug"];

/// Where the command being executed sits in its script.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Site<'a> {
    pub name: &'a str,
    pub line: usize,
}

/// Hidden commands stay hidden in a safe interpreter unless it is trusted
/// and the context allows hidden commands.
pub fn is_hidden(interp: &Interpreter, name: &str) -> bool {
    interp.is_safe()
        && HIDDEN_COMMANDS.contains(&name)
        && !(interp.is_trusted() && interp.context_flags().has(ContextFlags::IGNORE_HIDDEN_COMMANDS))
}

pub(crate) fn execute(interp: &mut Interpreter, words: &[String], site: &Site<'_>) -> EvalResult {
    let name = words[0].as_str();
    if is_hidden(interp, name) {
        return Err(invalid_command(name));
    }
    let args = &words[1..];

    match name {
        "set" => cmd_set(interp, args),
        "unset" => cmd_unset(interp, args),
        "incr" => cmd_incr(interp, args),
        "append" => cmd_append(interp, args),
        "puts" => cmd_puts(interp, args),
        "error" => cmd_error(args),
        "eval" => cmd_eval(interp, args, site),
        "catch" => cmd_catch(interp, args, site),
        "sleep" => cmd_sleep(interp, args),
        "source" => cmd_source(interp, args),
        "scope" => cmd_scope(interp, args),
        "info" => cmd_info(interp, args),
        "after" => cmd_after(interp, args),
        "update" => cmd_update(interp, args),
        "interp" => cmd_interp(interp, args),
        "debug" => control::dispatch(interp, args),
        _ => Err(invalid_command(name)),
    }
}

fn invalid_command(name: &str) -> DebugError {
    DebugError::script(format!("invalid command name \"{}\"", name))
}

fn cmd_set(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    match args {
        [name] => interp.read_var(name),
        [name, value] => Ok(interp.set_var(name, value.as_str())),
        _ => Err(DebugError::usage("set varName ?newValue?")),
    }
}

fn cmd_unset(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    if args.is_empty() {
        return Err(DebugError::usage("unset varName ?varName ...?"));
    }
    for name in args {
        interp.unset_var(name)?;
    }
    Ok(String::new())
}

fn parse_int(text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| DebugError::script(format!("expected integer but got \"{}\"", text)))
}

fn cmd_incr(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let (name, amount) = match args {
        [name] => (name, 1),
        [name, amount] => (name, parse_int(amount)?),
        _ => return Err(DebugError::usage("incr varName ?increment?")),
    };
    let current = match interp.get_var(name) {
        Some(value) => parse_int(value)?,
        None => 0,
    };
    let sum = current
        .checked_add(amount)
        .ok_or_else(|| DebugError::script("integer overflow"))?;
    Ok(interp.set_var(name, sum.to_string()))
}

fn cmd_append(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let (name, values) = args
        .split_first()
        .ok_or_else(|| DebugError::usage("append varName ?value ...?"))?;
    let mut current = interp.get_var(name).unwrap_or_default().to_string();
    for value in values {
        current.push_str(value);
    }
    Ok(interp.set_var(name, current))
}

fn cmd_puts(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let (newline, rest) = match args.split_first() {
        Some((flag, rest)) if flag == "-nonewline" => (false, rest),
        _ => (true, args),
    };
    let text = match rest {
        [text] => text,
        [channel, text] if channel == "stdout" || channel == "stderr" => text,
        _ => return Err(DebugError::usage("puts ?-nonewline? ?channelId? string")),
    };
    interp.write_output(text);
    if newline {
        interp.write_output("\n");
    }
    Ok(String::new())
}

fn cmd_error(args: &[String]) -> EvalResult {
    match args {
        [message] => Err(DebugError::script(message.as_str())),
        _ => Err(DebugError::usage("error message")),
    }
}

fn cmd_eval(interp: &mut Interpreter, args: &[String], site: &Site<'_>) -> EvalResult {
    match args {
        [] => Err(DebugError::usage("eval arg ?arg ...?")),
        [script] => run_script(interp, &Source::named(site.name, script, site.line)),
        _ => {
            let script = args.join(" ");
            run_script(interp, &Source::named(site.name, &script, site.line))
        }
    }
}

fn cmd_catch(interp: &mut Interpreter, args: &[String], site: &Site<'_>) -> EvalResult {
    let (script, var) = match args {
        [script] => (script, None),
        [script, var] => (script, Some(var)),
        _ => return Err(DebugError::usage("catch script ?resultVarName?")),
    };
    let (code, value) = match run_script(interp, &Source::named(site.name, script, site.line)) {
        Ok(result) => ("0", result),
        Err(e) if e.is_canceled() => return Err(e),
        Err(e) => ("1", e.to_string()),
    };
    if let Some(var) = var {
        interp.set_var(var, value);
    }
    Ok(code.to_string())
}

fn parse_ms(text: &str) -> Result<Duration> {
    text.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| DebugError::script(format!("expected milliseconds but got \"{}\"", text)))
}

/// Sleep in small slices so a cancel (including a watchdog's) ends it early.
fn cancellable_sleep(interp: &Interpreter, duration: Duration) -> Result<()> {
    let deadline = Instant::now() + duration;
    loop {
        interp.check_canceled()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep((deadline - now).min(Duration::from_millis(10)));
    }
}

fn cmd_sleep(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    match args {
        [ms] => {
            cancellable_sleep(interp, parse_ms(ms)?)?;
            Ok(String::new())
        }
        _ => Err(DebugError::usage("sleep milliseconds")),
    }
}

fn cmd_source(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    match args {
        [path] => interp.eval_file(path),
        _ => Err(DebugError::usage("source fileName")),
    }
}

fn cmd_scope(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let stack = interp.stack_mut();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["open"] => {
            stack.push_scope_frame("scope");
            Ok(stack.depth().to_string())
        }
        ["open", name] => {
            stack.push_scope_frame(name);
            Ok(stack.depth().to_string())
        }
        ["close"] => {
            let frame = stack.pop_scope()?;
            Ok(frame.name)
        }
        ["depth"] => Ok(stack.depth().to_string()),
        _ => Err(DebugError::usage("scope open ?name?|close|depth")),
    }
}

fn cmd_info(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["level"] => Ok(interp.stack().level().to_string()),
        ["exists", name] => Ok(if interp.get_var(name).is_some() { "1" } else { "0" }.to_string()),
        ["locals"] => {
            let names: Vec<String> = interp.stack().variables().keys().cloned().collect();
            Ok(quote_list(&names))
        }
        ["errorinfo"] => Ok(interp.error_info().to_string()),
        _ => Err(DebugError::usage("info level|exists varName|locals|errorinfo")),
    }
}

/// `after idle script` and `after ms script` queue an event; `after ms`
/// sleeps.
fn cmd_after(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    match args {
        [ms] => {
            cancellable_sleep(interp, parse_ms(ms)?)?;
            Ok(String::new())
        }
        [when, script @ ..] if !script.is_empty() => {
            if when != "idle" {
                parse_ms(when)?;
            }
            interp.queue_event(script.join(" "));
            Ok(interp.pending_events().to_string())
        }
        _ => Err(DebugError::usage("after ms|idle ?script ...?")),
    }
}

fn cmd_update(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    if !args.is_empty() {
        return Err(DebugError::usage("update"));
    }
    interp.process_events()?;
    Ok(String::new())
}

fn cmd_interp(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let usage = || DebugError::usage("interp create ?-safe? name|eval path script|issafe path|children");
    let (sub, rest) = args.split_first().ok_or_else(usage)?;

    match (sub.as_str(), rest) {
        ("create", [name]) => {
            interp.create_child(name, false)?;
            Ok(name.clone())
        }
        ("create", [flag, name]) if flag == "-safe" => {
            interp.create_child(name, true)?;
            Ok(name.clone())
        }
        ("eval", [path, script @ ..]) if !script.is_empty() => {
            let child = interp.child(path)?;
            let config = interp.config().clone();
            let mut guard = lock_with_retry(&child, &config)?;
            guard.eval(&script.join(" "))
        }
        ("issafe", [path]) => {
            let child = interp.child(path)?;
            let config = interp.config().clone();
            let guard = lock_with_retry(&child, &config)?;
            Ok(if guard.is_safe() { "1" } else { "0" }.to_string())
        }
        ("children", []) => Ok(quote_list(&interp.child_names())),
        _ => Err(usage()),
    }
}
