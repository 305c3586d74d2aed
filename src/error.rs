//! Error types for the debugger core

use thiserror::Error;

/// Result type for debugger operations
pub type Result<T> = std::result::Result<T, DebugError>;

/// Outcome of evaluating a script or command: its result string or the error.
pub type EvalResult = Result<String>;

/// Errors raised by the control surface and the core mechanisms behind it
#[derive(Debug, Error)]
pub enum DebugError {
    /// Argument shape did not match the expected invocation
    #[error("wrong # args: should be \"{usage}\"")]
    BadArgumentCount { usage: String },

    /// Uplevel target outside the live stack
    #[error("bad level \"{0}\"")]
    InvalidLevel(String),

    /// Debugger absent, or disabled when it must be enabled
    #[error("{0}")]
    DebuggerUnavailable(String),

    /// Single-step or step counts requested outside interactive mode
    #[error("{0}")]
    NotInteractive(String),

    /// Hard lock or interactive token not acquired within budget
    #[error("{0}")]
    LockUnavailable(String),

    #[error("{0}")]
    InvalidLocation(String),

    #[error("{0}")]
    InvalidVariable(String),

    #[error("{0}")]
    InvalidConnection(String),

    /// Call stack shape did not match a frame handle or mark token
    #[error("{0}")]
    InvalidFrame(String),

    /// Error raised by the evaluated script
    #[error("{message}")]
    Script { message: String, line: Option<usize> },

    /// Evaluation was canceled (cooperatively or by a watchdog)
    #[error("{0}")]
    Canceled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DebugError {
    pub fn usage(usage: impl Into<String>) -> Self {
        Self::BadArgumentCount {
            usage: usage.into(),
        }
    }

    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
            line: None,
        }
    }

    /// Lock and timeout failures may succeed when retried; logic failures won't.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockUnavailable(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// Line of the failing command, when the evaluator recorded one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Script { line, .. } => *line,
            _ => None,
        }
    }

    /// Attach a line to a script error that doesn't carry one yet.
    pub fn at_line(self, at: usize) -> Self {
        match self {
            Self::Script {
                message,
                line: None,
            } => Self::Script {
                message,
                line: Some(at),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_failures_are_retryable() {
        assert!(DebugError::LockUnavailable("busy".into()).is_retryable());
        assert!(!DebugError::InvalidLevel("3".into()).is_retryable());
    }

    #[test]
    fn usage_message_names_invocation() {
        let err = DebugError::usage("debug steps ?count?");
        assert_eq!(
            err.to_string(),
            "wrong # args: should be \"debug steps ?count?\""
        );
    }

    #[test]
    fn at_line_keeps_first_line() {
        let err = DebugError::script("boom").at_line(4).at_line(9);
        assert_eq!(err.line(), Some(4));
    }
}
