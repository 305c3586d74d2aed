//! Secure evaluation in a child interpreter.

mod session;
mod watchdog;

pub use session::{SecureEvalOptions, SecureEvalSession};
pub use watchdog::Watchdog;

use crate::control::{parse_options, OptionSpec};
use crate::error::{DebugError, EvalResult};
use crate::interp::Interpreter;
use tracing::info;

const USAGE: &str = "debug secureeval ?-trusted bool? ?-events bool? ?-stoponerror bool? ?-timeout ms? ?-file? ?-nocancel? ?-globalcancel? path script";

const SPECS: &[OptionSpec] = &[
    OptionSpec::value("-trusted"),
    OptionSpec::value("-events"),
    OptionSpec::value("-stoponerror"),
    OptionSpec::value("-timeout"),
    OptionSpec::switch("-file"),
    OptionSpec::switch("-nocancel"),
    OptionSpec::switch("-globalcancel"),
];

pub fn secure_eval_command(interp: &mut Interpreter, args: &[String]) -> EvalResult {
    let (opts, rest) = parse_options(SPECS, args)?;
    let (path, script) = match rest {
        [path, script] => (path.as_str(), script.as_str()),
        _ => return Err(DebugError::usage(USAGE)),
    };
    let options = SecureEvalOptions {
        trusted: opts.bool("-trusted")?.unwrap_or(false),
        events: opts.bool("-events")?.unwrap_or(false),
        stop_on_error: opts.bool("-stoponerror")?.unwrap_or(false),
        timeout: opts.millis("-timeout")?,
        file: opts.has("-file"),
        no_cancel: opts.has("-nocancel"),
        global_cancel: opts.has("-globalcancel"),
    };
    secure_eval(interp, path, script, &options)
}

/// Evaluate `script` in the child at `path` under `options`.
///
/// The evaluation's outcome is returned as is. Restore failures are
/// complained about on `interp`; a failing evaluation leaves the child's
/// error info in `interp`, tagged with the child's path and line. A
/// canceled one leaves only the cancel message and the path.
pub fn secure_eval(
    interp: &mut Interpreter,
    path: &str,
    script: &str,
    options: &SecureEvalOptions,
) -> EvalResult {
    let handle = interp.child(path)?;
    let config = interp.config().clone();

    let mut session = SecureEvalSession::begin(&handle, path, &config, options)?;
    info!(parent = interp.id(), child = path, elevated = session.elevated(), "secure eval");

    let outcome = session.evaluate(script, options.file);
    let child_error = match &outcome {
        Err(e) if !e.is_canceled() => Some(session.child_error()),
        _ => None,
    };

    for failure in session.finish() {
        interp.complain(&failure);
    }

    match (&outcome, child_error) {
        (Err(e), Some((info, line))) => {
            let line = line.map_or_else(|| "?".to_string(), |l| l.to_string());
            interp.set_error_info(format!("{}\n    (in interpreter \"{}\" line {})", info, path, line), e.line());
        }
        // the child's error info may be stale after a cancel
        (Err(e), None) => {
            interp.set_error_info(format!("{}\n    (canceled in interpreter \"{}\")", e, path), None);
        }
        (Ok(_), _) => {}
    }
    outcome
}
