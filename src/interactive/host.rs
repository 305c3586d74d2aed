use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Console collaborator an interactive loop reads from and reports to.
pub trait InteractiveHost: Send {
    /// `Ok(None)` at end of input; `ErrorKind::Interrupted` once `cancel`
    /// has been raised by another thread.
    fn read_line(&mut self, prompt: &str, cancel: &AtomicBool) -> io::Result<Option<String>>;

    fn write(&mut self, text: &str) -> io::Result<()>;

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.write(text)?;
        self.write("\n")
    }

    /// Whether a blocked `read_line` notices `cancel`.
    fn can_cancel_read(&self) -> bool {
        false
    }
}

/// Process stdin/stdout. Reads block and cannot be canceled.
#[derive(Debug, Default)]
pub struct StdioHost;

impl InteractiveHost for StdioHost {
    fn read_line(&mut self, prompt: &str, _cancel: &AtomicBool) -> io::Result<Option<String>> {
        let mut out = io::stdout();
        out.write_all(prompt.as_bytes())?;
        out.flush()?;

        let mut line = String::new();
        let n = io::stdin().lock().read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        let mut out = io::stdout();
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

#[derive(Debug, Default)]
struct ScriptedInner {
    input: VecDeque<String>,
    output: String,
    prompts: usize,
    closed: bool,
}

/// In-memory host: input lines are queued up front (or pushed later from
/// another thread), output is captured. Clones share the same buffers.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHost {
    inner: Arc<Mutex<ScriptedInner>>,
    /// Keep waiting for input instead of reporting end of input
    blocking: bool,
}

impl ScriptedHost {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let host = Self::default();
        host.push_lines(lines);
        host
    }

    /// A host whose reads wait for input until closed or canceled.
    pub fn blocking() -> Self {
        Self {
            inner: Arc::default(),
            blocking: true,
        }
    }

    pub fn push_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.inner.lock();
        inner.input.extend(lines.into_iter().map(Into::into));
    }

    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn output(&self) -> String {
        self.inner.lock().output.clone()
    }

    pub fn prompts(&self) -> usize {
        self.inner.lock().prompts
    }

    pub fn pending_input(&self) -> usize {
        self.inner.lock().input.len()
    }
}

impl InteractiveHost for ScriptedHost {
    fn read_line(&mut self, _prompt: &str, cancel: &AtomicBool) -> io::Result<Option<String>> {
        self.inner.lock().prompts += 1;
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(line) = inner.input.pop_front() {
                    return Ok(Some(line));
                }
                if inner.closed || !self.blocking {
                    return Ok(None);
                }
            }
            if cancel.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "interactive read canceled"));
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        self.inner.lock().output.push_str(text);
        Ok(())
    }

    fn can_cancel_read(&self) -> bool {
        true
    }
}
