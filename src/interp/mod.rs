//! Interpreter: the execution unit that owns a call stack and, once set
//! up, a debugger.

mod flags;

pub use flags::{CancelState, ContextFlags, InterpreterFlags, WaitFlags};

use crate::callframe::{CallStack, FrameFlags, FrameHandle};
use crate::config::DebuggerConfig;
use crate::debugger::{BreakpointType, Debugger, ScriptLocation};
use crate::error::{DebugError, EvalResult, Result};
use crate::executor::{self, Source};
use crate::interactive::{InteractiveHost, InteractiveLoopCoordinator};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared, lockable interpreter. Locking it is the interpreter's hard lock.
pub type InterpHandle = Arc<Mutex<Interpreter>>;

static NEXT_INTERP_ID: AtomicU64 = AtomicU64::new(1);

pub struct Interpreter {
    id: u64,
    name: String,
    config: Arc<DebuggerConfig>,
    pub(crate) stack: CallStack,
    debugger: Option<Debugger>,
    flags: InterpreterFlags,
    interactive_modifiable: bool,
    context: ContextFlags,
    wait_flags: WaitFlags,
    events_enabled: bool,
    events: VecDeque<String>,
    cancel: CancelState,
    children: BTreeMap<String, InterpHandle>,
    /// Held by `debug emergency` while it rewrites the debugging setup.
    /// Separate from the handle lock: anyone with `&mut` access already
    /// owns that one (or the interpreter itself), so emergency only has to
    /// exclude holders of a cloned root.
    sync_root: Arc<Mutex<()>>,
    host: Option<Box<dyn InteractiveHost>>,
    coordinator: Option<InteractiveLoopCoordinator>,
    error_info: String,
    error_line: Option<usize>,
    output: String,
    complaints: Vec<String>,
    pub(crate) locations: Vec<ScriptLocation>,
    /// Non-zero while commands run from an interactive debugger loop
    pub(crate) no_breakpoint: usize,
    pub(crate) eval_depth: usize,
}

impl Interpreter {
    pub fn new(name: impl Into<String>, config: Arc<DebuggerConfig>) -> Self {
        let name = name.into();
        let id = NEXT_INTERP_ID.fetch_add(1, Ordering::Relaxed);
        debug!(interp = id, %name, "interpreter created");
        Self {
            id,
            name,
            config,
            stack: CallStack::new(),
            debugger: None,
            flags: InterpreterFlags::DEFAULT,
            interactive_modifiable: true,
            context: ContextFlags::NONE,
            wait_flags: WaitFlags::NONE,
            events_enabled: true,
            events: VecDeque::new(),
            cancel: CancelState::default(),
            children: BTreeMap::new(),
            sync_root: Arc::new(Mutex::new(())),
            host: None,
            coordinator: None,
            error_info: String::new(),
            error_line: None,
            output: String::new(),
            complaints: Vec::new(),
            locations: Vec::new(),
            no_breakpoint: 0,
            eval_depth: 0,
        }
    }

    /// Interactive interpreter reading from and writing to `host`.
    pub fn interactive(
        name: impl Into<String>,
        config: Arc<DebuggerConfig>,
        host: Box<dyn InteractiveHost>,
    ) -> Self {
        let mut interp = Self::new(name, config);
        interp.host = Some(host);
        interp.flags.set(InterpreterFlags::INTERACTIVE);
        interp
    }

    pub fn into_handle(self) -> InterpHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Arc<DebuggerConfig> {
        &self.config
    }

    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut CallStack {
        &mut self.stack
    }

    // ----- flags -----

    pub fn flags(&self) -> InterpreterFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: InterpreterFlags) -> bool {
        self.flags.has(flag)
    }

    pub fn set_flag(&mut self, flag: InterpreterFlags, on: bool) {
        self.flags.toggle(flag, on);
    }

    pub fn is_interactive(&self) -> bool {
        self.flags.has(InterpreterFlags::INTERACTIVE)
    }

    pub fn is_interactive_modifiable(&self) -> bool {
        self.interactive_modifiable
    }

    pub fn set_interactive_modifiable(&mut self, modifiable: bool) {
        self.interactive_modifiable = modifiable;
    }

    /// Fails when the interactive flag has been locked against changes.
    pub fn set_interactive(&mut self, on: bool) -> Result<()> {
        if !self.interactive_modifiable && self.is_interactive() != on {
            return Err(DebugError::NotInteractive(
                "interactive mode cannot be modified".to_string(),
            ));
        }
        self.set_flag(InterpreterFlags::INTERACTIVE, on);
        Ok(())
    }

    pub fn is_safe(&self) -> bool {
        self.flags.has(InterpreterFlags::SAFE)
    }

    pub fn is_trusted(&self) -> bool {
        self.flags.has(InterpreterFlags::TRUSTED)
    }

    /// Restricted and not currently trusted.
    pub fn is_restricted(&self) -> bool {
        self.is_safe() && !self.is_trusted()
    }

    pub fn context_flags(&self) -> ContextFlags {
        self.context
    }

    pub fn set_context_flags(&mut self, flags: ContextFlags) {
        self.context = flags;
    }

    pub fn wait_flags(&self) -> WaitFlags {
        self.wait_flags
    }

    pub fn set_wait_flags(&mut self, flags: WaitFlags) {
        self.wait_flags = flags;
    }

    pub fn events_enabled(&self) -> bool {
        self.events_enabled
    }

    pub fn set_events_enabled(&mut self, on: bool) {
        self.events_enabled = on;
    }

    pub(crate) fn queue_event(&mut self, script: String) {
        self.events.push_back(script);
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Run queued event scripts. With events disabled nothing runs. With
    /// `StopOnError` the first failure stops processing and is returned;
    /// otherwise failures are complained about and processing continues.
    pub fn process_events(&mut self) -> Result<usize> {
        if !self.events_enabled {
            return Ok(0);
        }
        let mut ran = 0usize;
        while let Some(script) = self.events.pop_front() {
            ran += 1;
            if let Err(e) = self.eval(&script) {
                if e.is_canceled() || self.wait_flags.has(WaitFlags::STOP_ON_ERROR) {
                    return Err(e);
                }
                self.complain(&e);
            }
        }
        Ok(ran)
    }

    // ----- debugger -----

    pub fn debugger(&self) -> Option<&Debugger> {
        self.debugger.as_ref()
    }

    pub fn debugger_mut(&mut self) -> Option<&mut Debugger> {
        self.debugger.as_mut()
    }

    /// Debugger that must exist (enabled or not).
    pub fn require_debugger(&mut self) -> Result<&mut Debugger> {
        self.debugger
            .as_mut()
            .ok_or_else(|| DebugError::DebuggerUnavailable("debugger not available".to_string()))
    }

    /// Debugger that must exist and be enabled.
    pub fn require_enabled_debugger(&mut self) -> Result<&mut Debugger> {
        match self.debugger.as_mut() {
            Some(d) if d.is_enabled() => Ok(d),
            Some(_) => Err(DebugError::DebuggerUnavailable(
                "debugger not enabled".to_string(),
            )),
            None => Err(DebugError::DebuggerUnavailable(
                "debugger not available".to_string(),
            )),
        }
    }

    /// Create the debugger (`create`) or destroy it. Returns whether the
    /// debugger's existence changed.
    pub fn setup_debugger(&mut self, create: bool, isolated: bool) -> Result<bool> {
        match (create, self.debugger.is_some()) {
            (true, false) => {
                let isolated = if isolated {
                    let mut child = Interpreter::new(format!("{}-debugger", self.name), Arc::clone(&self.config));
                    child.coordinator = self.coordinator.clone();
                    Some(child.into_handle())
                } else {
                    None
                };
                self.debugger = Some(Debugger::new(&self.config, isolated));
                Ok(true)
            }
            (false, true) => {
                self.debugger = None;
                info!(interp = self.id, "debugger torn down");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn teardown_debugger(&mut self) -> bool {
        self.debugger.take().is_some()
    }

    // ----- host, output, diagnostics -----

    pub fn set_host(&mut self, host: Option<Box<dyn InteractiveHost>>) {
        self.host = host;
    }

    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    pub(crate) fn host_can_cancel_read(&self) -> bool {
        self.host.as_ref().map_or(false, |h| h.can_cancel_read())
    }

    pub(crate) fn read_interactive(&mut self, prompt: &str, cancel: &AtomicBool) -> io::Result<Option<String>> {
        match self.host.as_mut() {
            Some(host) => host.read_line(prompt, cancel),
            None => Ok(None),
        }
    }

    /// Text goes to the host when there is one, else to the capture buffer.
    pub fn write_output(&mut self, text: &str) {
        if let Some(host) = self.host.as_mut() {
            if let Err(e) = host.write(text) {
                warn!(interp = self.id, error = %e, "host write failed");
            }
            return;
        }
        self.output.push_str(text);
    }

    /// Captured output of a host-less interpreter.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn set_coordinator(&mut self, coordinator: Option<InteractiveLoopCoordinator>) {
        self.coordinator = coordinator;
    }

    pub fn coordinator(&self) -> InteractiveLoopCoordinator {
        self.coordinator
            .clone()
            .unwrap_or_else(|| InteractiveLoopCoordinator::global().clone())
    }

    pub fn error_info(&self) -> &str {
        &self.error_info
    }

    pub fn error_line(&self) -> Option<usize> {
        self.error_line
    }

    pub(crate) fn set_error_info(&mut self, info: String, line: Option<usize>) {
        self.error_info = info;
        self.error_line = line;
    }

    pub(crate) fn append_error_info(&mut self, text: &str) {
        if !self.error_info.is_empty() {
            self.error_info.push('\n');
        }
        self.error_info.push_str(text);
    }

    /// Report a secondary failure that must not change the primary outcome.
    pub fn complain(&mut self, error: &DebugError) {
        warn!(interp = self.id, error = %error, "complaint");
        if self.complaints.len() >= self.config.max_complaints {
            self.complaints.remove(0);
        }
        self.complaints.push(error.to_string());
    }

    pub fn complaints(&self) -> &[String] {
        &self.complaints
    }

    // ----- variables -----

    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.stack.variables().get(name).map(String::as_str)
    }

    pub fn read_var(&self, name: &str) -> Result<String> {
        self.get_var(name)
            .map(str::to_string)
            .ok_or_else(|| DebugError::InvalidVariable(format!("can't read \"{}\": no such variable", name)))
    }

    pub fn set_var(&mut self, name: &str, value: impl Into<String>) -> String {
        let value = value.into();
        self.stack
            .variables_mut()
            .insert(name.to_string(), value.clone());
        value
    }

    pub fn unset_var(&mut self, name: &str) -> Result<()> {
        self.stack
            .variables_mut()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DebugError::InvalidVariable(format!("can't unset \"{}\": no such variable", name)))
    }

    // ----- children -----

    pub fn create_child(&mut self, name: &str, safe: bool) -> Result<InterpHandle> {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(DebugError::InvalidConnection(format!("bad interpreter name \"{}\"", name)));
        }
        if self.children.contains_key(name) {
            return Err(DebugError::InvalidConnection(format!(
                "interpreter named \"{}\" already exists",
                name
            )));
        }
        let mut child = Interpreter::new(name, Arc::clone(&self.config));
        child.set_flag(InterpreterFlags::SAFE, safe);
        child.coordinator = self.coordinator.clone();
        let handle = child.into_handle();
        self.children.insert(name.to_string(), Arc::clone(&handle));
        debug!(parent = self.id, child = name, safe, "child interpreter created");
        Ok(handle)
    }

    pub fn child_names(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    /// Resolve a space-separated path of child names.
    pub fn child(&self, path: &str) -> Result<InterpHandle> {
        let mut names = path.split_whitespace();
        let first = names
            .next()
            .ok_or_else(|| DebugError::InvalidConnection("empty interpreter path".to_string()))?;
        let mut handle = self
            .children
            .get(first)
            .cloned()
            .ok_or_else(|| DebugError::InvalidConnection(format!("could not find interpreter \"{}\"", path)))?;

        for name in names {
            let next = {
                let guard = lock_with_retry(&handle, &self.config)?;
                guard.children.get(name).cloned()
            };
            handle = next.ok_or_else(|| {
                DebugError::InvalidConnection(format!("could not find interpreter \"{}\"", path))
            })?;
        }
        Ok(handle)
    }

    // ----- locking -----

    pub fn sync_root(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.sync_root)
    }

    // ----- cancellation -----

    pub fn cancel_state(&self) -> CancelState {
        self.cancel.clone()
    }

    pub fn cancel(&self, reason: &str, unwind: bool) {
        self.cancel.cancel(reason, unwind);
    }

    /// Reset pending cancellation here, and with `global` in every
    /// descendant too. Returns how many interpreters had one pending.
    pub fn reset_cancel(&mut self, global: bool) -> Result<usize> {
        let mut reset = usize::from(self.cancel.reset(true));
        if global {
            for child in self.children.values() {
                let mut guard = lock_with_retry(child, &self.config)?;
                reset += guard.reset_cancel(true)?;
            }
        }
        Ok(reset)
    }

    pub(crate) fn check_canceled(&self) -> Result<()> {
        if self.cancel.is_canceled() {
            return Err(DebugError::Canceled(self.cancel.reason()));
        }
        Ok(())
    }

    // ----- evaluation -----

    pub fn eval(&mut self, script: &str) -> EvalResult {
        executor::run_script(self, &Source::anonymous(script))
    }

    pub fn eval_source(&mut self, name: &str, script: &str) -> EvalResult {
        executor::run_script(self, &Source::named(name, script, 1))
    }

    pub fn eval_file(&mut self, path: impl AsRef<Path>) -> EvalResult {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let name = path.to_string_lossy().into_owned();
        executor::run_script(self, &Source::named(&name, &text, 1))
    }

    /// Run one already-split command.
    pub fn eval_words(&mut self, words: Vec<String>) -> EvalResult {
        executor::invoke(self, words)
    }

    /// Push a tracking frame, run `f`, and unwind it (plus anything `f`
    /// left open) on every exit path. Unwind trouble is complained about.
    pub fn with_tracking_frame<T, F>(&mut self, name: &str, flags: FrameFlags, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let handle = self.stack.push_tracking_frame(name, flags);
        let outcome = f(self);
        self.pop_tracking_frame(handle);
        outcome
    }

    pub(crate) fn pop_tracking_frame(&mut self, handle: FrameHandle) {
        if let Err(e) = self.stack.pop_scope_frames_and_one_more(handle) {
            self.complain(&e);
        }
    }

    /// Run a command as if called from the frame `level` names, masking
    /// the frames in between so their variables stay out of reach.
    pub fn invoke_uplevel(&mut self, level: &str, words: Vec<String>) -> EvalResult {
        let target = self.stack.resolve_uplevel_target(level)?;
        let mark = if target.marked {
            Some(self.stack.mark_frames(target.target, FrameFlags::INVISIBLE)?)
        } else {
            None
        };

        let outcome = self.with_tracking_frame("debug invoke", FrameFlags::DEBUGGER, |interp| {
            interp.eval_words(words)
        });

        if let Some(mark) = mark {
            if let Err(e) = self.stack.unmark_frames(mark) {
                self.complain(&e);
            }
        }
        outcome
    }

    /// Event hook the evaluator calls when a breakpoint condition holds.
    /// Outside interactive mode, or inside a debugger loop, nothing happens.
    pub(crate) fn breakpoint_event(
        &mut self,
        kind: BreakpointType,
        location: Option<&ScriptLocation>,
        reason: &str,
    ) -> Result<()> {
        if self.no_breakpoint > 0 || !self.is_interactive() {
            return Ok(());
        }
        self.run_callback(kind);
        let data = crate::interactive::LoopData {
            kind,
            location: location.cloned(),
            reason: reason.to_string(),
        };
        crate::interactive::run_interactive_loop(self, data).map(|_| ())
    }

    /// Evaluate the debugger callback (if configured) with the event type
    /// appended. Failures are complained about.
    pub(crate) fn run_callback(&mut self, kind: BreakpointType) {
        let (mut words, isolated) = match self.debugger.as_ref() {
            Some(d) => match d.callback_arguments() {
                Some(args) if !args.is_empty() => (args.to_vec(), d.isolated_interpreter()),
                _ => return,
            },
            None => return,
        };
        words.push(kind.to_string());

        let outcome = match isolated {
            Some(handle) => match lock_with_retry(&handle, &self.config) {
                Ok(mut guard) => guard.eval_words(words),
                Err(e) => Err(e),
            },
            None => {
                self.no_breakpoint += 1;
                let r = self.eval_words(words);
                self.no_breakpoint -= 1;
                r
            }
        };
        if let Err(e) = outcome {
            self.complain(&e);
        }
    }
}

/// Take an interpreter's hard lock: bounded wait, bounded retries.
pub fn lock_with_retry<'a>(handle: &'a InterpHandle, config: &DebuggerConfig) -> Result<MutexGuard<'a, Interpreter>> {
    let timeout = config.lock_timeout();
    for attempt in 0..config.lock_retries.max(1) {
        if let Some(guard) = handle.try_lock_for(timeout) {
            return Ok(guard);
        }
        debug!(attempt, "interpreter lock busy");
    }
    Err(DebugError::LockUnavailable(
        "unable to acquire interpreter lock".to_string(),
    ))
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("depth", &self.stack.depth())
            .field("debugger", &self.debugger)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}
