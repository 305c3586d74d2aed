use super::breakpoints::{ScriptLocation, TokenBreakpoints};
use super::stepping::Stepping;
use super::types::BreakpointType;
use crate::config::DebuggerConfig;
use crate::error::{DebugError, Result};
use crate::interp::InterpHandle;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Fields that a suspend parks and a resume brings back.
#[derive(Debug, Clone, Default)]
pub struct DebuggerState {
    pub enabled: bool,
    pub types: BreakpointType,
    pub break_on_token: bool,
    pub stepping: Stepping,
    /// Next interactive command; consumed on read
    pub command: Option<String>,
    /// Outcome of the last interactive command
    pub result: Option<String>,
    pub queue: VecDeque<String>,
    pub callback_arguments: Option<Vec<String>>,
    /// Words of the last executed command, when script-argument tracking is on
    pub execute_arguments: Option<Vec<String>>,
    pub breakpoints: TokenBreakpoints,
}

impl DebuggerState {
    fn initial(config: &DebuggerConfig) -> Self {
        Self {
            enabled: config.enabled,
            types: if config.enabled {
                config.default_types
            } else {
                BreakpointType::NONE
            },
            ..Self::default()
        }
    }
}

/// Per-interpreter debugger controller.
pub struct Debugger {
    state: DebuggerState,
    saved: Option<DebuggerState>,
    suspend_count: usize,
    loops: usize,
    active: usize,
    /// Out-of-band interpreter used for callbacks when created isolated
    isolated: Option<InterpHandle>,
}

/// Serializable snapshot returned by `debug info`.
#[derive(Debug, Clone, Serialize)]
pub struct DebuggerInfo {
    pub enabled: bool,
    pub suspend_count: usize,
    pub loops: usize,
    pub active: usize,
    pub single_step: bool,
    pub break_on_token: bool,
    pub steps: i64,
    pub types: BreakpointType,
    pub breakpoints: usize,
    pub command: Option<String>,
    pub result: Option<String>,
    pub queue: usize,
    pub callback_arguments: Option<Vec<String>>,
    pub execute_arguments: Option<Vec<String>>,
    pub isolated: bool,
}

impl Debugger {
    pub fn new(config: &DebuggerConfig, isolated: Option<InterpHandle>) -> Self {
        info!(isolated = isolated.is_some(), enabled = config.enabled, "debugger created");
        Self {
            state: DebuggerState::initial(config),
            saved: None,
            suspend_count: 0,
            loops: 0,
            active: 0,
            isolated,
        }
    }

    pub fn state(&self) -> &DebuggerState {
        &self.state
    }

    pub fn isolated_interpreter(&self) -> Option<InterpHandle> {
        self.isolated.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.state.enabled != enabled {
            debug!(enabled, "debugger enabled changed");
        }
        self.state.enabled = enabled;
    }

    pub fn types(&self) -> BreakpointType {
        self.state.types
    }

    pub fn set_types(&mut self, types: BreakpointType) {
        self.state.types = types;
    }

    pub fn add_types(&mut self, types: BreakpointType) {
        self.state.types.set(types);
    }

    pub fn remove_types(&mut self, types: BreakpointType) {
        self.state.types.clear(types);
    }

    /// Enabled and carrying every bit of `kind`.
    pub fn wants(&self, kind: BreakpointType) -> bool {
        self.state.enabled && self.state.types.has(kind)
    }

    pub fn break_on_token(&self) -> bool {
        self.state.break_on_token
    }

    pub fn set_break_on_token(&mut self, on: bool) {
        self.state.break_on_token = on;
    }

    pub fn single_step(&self) -> bool {
        self.state.stepping.single_step
    }

    pub fn set_single_step(&mut self, on: bool) {
        self.state.stepping.single_step = on;
    }

    pub fn steps(&self) -> i64 {
        self.state.stepping.steps
    }

    pub fn set_steps(&mut self, steps: i64) {
        self.state.stepping.steps = steps;
    }

    pub fn next_step(&mut self) -> i64 {
        self.state.stepping.next_step()
    }

    pub fn maybe_next_step(&mut self) -> bool {
        self.state.stepping.maybe_next_step()
    }

    /// Step check the evaluator makes before each command.
    pub fn step_break(&mut self) -> bool {
        self.state.enabled && self.state.stepping.should_break()
    }

    pub fn command(&self) -> Option<&str> {
        self.state.command.as_deref()
    }

    pub fn set_command(&mut self, command: Option<String>) {
        self.state.command = command;
    }

    /// One-time read of the queued interactive command, falling back to the
    /// head of the command queue.
    pub fn take_command(&mut self) -> Option<String> {
        self.state
            .command
            .take()
            .or_else(|| self.state.queue.pop_front())
    }

    pub fn result(&self) -> Option<&str> {
        self.state.result.as_deref()
    }

    pub fn set_result(&mut self, result: Option<String>) {
        self.state.result = result;
    }

    pub fn enqueue(&mut self, command: impl Into<String>) {
        self.state.queue.push_back(command.into());
    }

    pub fn dump_commands(&self) -> Vec<String> {
        self.state.queue.iter().cloned().collect()
    }

    pub fn clear_commands(&mut self) -> usize {
        let n = self.state.queue.len();
        self.state.queue.clear();
        n
    }

    pub fn callback_arguments(&self) -> Option<&[String]> {
        self.state.callback_arguments.as_deref()
    }

    pub fn set_callback_arguments(&mut self, arguments: Option<Vec<String>>) {
        self.state.callback_arguments = arguments;
    }

    pub fn execute_arguments(&self) -> Option<&[String]> {
        self.state.execute_arguments.as_deref()
    }

    pub fn set_execute_arguments(&mut self, arguments: Option<Vec<String>>) {
        self.state.execute_arguments = arguments;
    }

    pub fn set_breakpoint(&mut self, location: &ScriptLocation) -> Result<bool> {
        self.state.breakpoints.set(location)
    }

    pub fn clear_breakpoint(&mut self, location: &ScriptLocation) -> Result<bool> {
        self.state.breakpoints.clear(location)
    }

    pub fn match_breakpoint(&self, location: &ScriptLocation) -> Result<bool> {
        self.state.breakpoints.matches(location)
    }

    pub fn breakpoint_list(&self, pattern: Option<&str>) -> Vec<String> {
        self.state.breakpoints.list(pattern)
    }

    /// Whether a command at `location` should stop for a token breakpoint.
    pub fn token_break(&self, location: &ScriptLocation) -> bool {
        self.state.enabled
            && (self.state.break_on_token || self.state.types.has(BreakpointType::TOKEN))
            && self.state.breakpoints.matches(location).unwrap_or(false)
    }

    pub fn suspend_count(&self) -> usize {
        self.suspend_count
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_count > 0
    }

    /// The outermost suspend parks the live state and leaves a blank one.
    pub fn suspend(&mut self) -> usize {
        self.suspend_count += 1;
        if self.suspend_count == 1 {
            self.saved = Some(std::mem::take(&mut self.state));
            debug!("debugger suspended");
        }
        self.suspend_count
    }

    /// The matching outermost resume brings the parked state back.
    pub fn resume(&mut self) -> Result<usize> {
        if self.suspend_count == 0 {
            return Err(DebugError::DebuggerUnavailable(
                "debugger is not suspended".to_string(),
            ));
        }
        self.suspend_count -= 1;
        if self.suspend_count == 0 {
            if let Some(saved) = self.saved.take() {
                self.state = saved;
            }
            debug!("debugger resumed");
        }
        Ok(self.suspend_count)
    }

    /// Back to a freshly created debugger; any suspension is dropped.
    pub fn restore(&mut self, config: &DebuggerConfig) {
        self.state = DebuggerState::initial(config);
        self.saved = None;
        self.suspend_count = 0;
        info!("debugger restored to initial state");
    }

    pub fn enter_loop(&mut self) -> usize {
        self.loops += 1;
        self.loops
    }

    pub fn exit_loop(&mut self) -> usize {
        self.loops = self.loops.saturating_sub(1);
        self.loops
    }

    pub fn loops(&self) -> usize {
        self.loops
    }

    pub fn set_active(&mut self, active: bool) -> usize {
        if active {
            self.active += 1;
        } else {
            self.active = self.active.saturating_sub(1);
        }
        self.active
    }

    pub fn info(&self) -> DebuggerInfo {
        let s = &self.state;
        DebuggerInfo {
            enabled: s.enabled,
            suspend_count: self.suspend_count,
            loops: self.loops,
            active: self.active,
            single_step: s.stepping.single_step,
            break_on_token: s.break_on_token,
            steps: s.stepping.steps,
            types: s.types,
            breakpoints: s.breakpoints.len(),
            command: s.command.clone(),
            result: s.result.clone(),
            queue: s.queue.len(),
            callback_arguments: s.callback_arguments.clone(),
            execute_arguments: s.execute_arguments.clone(),
            isolated: self.isolated.is_some(),
        }
    }
}

impl std::fmt::Debug for Debugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debugger")
            .field("state", &self.state)
            .field("suspend_count", &self.suspend_count)
            .field("loops", &self.loops)
            .field("isolated", &self.isolated.is_some())
            .finish()
    }
}
