use crate::interp::CancelState;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Cancels an evaluation (with unwind) once its time limit passes, unless
/// stopped first.
pub struct Watchdog {
    stop: Sender<()>,
    handle: Option<JoinHandle<bool>>,
}

impl Watchdog {
    pub fn start(cancel: CancelState, timeout: Duration, label: String) -> std::io::Result<Self> {
        let (stop, stopped) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(format!("watchdog-{}", label))
            .spawn(move || match stopped.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    warn!(target_interp = %label, timeout_ms = timeout.as_millis() as u64, "time limit exceeded, canceling");
                    cancel.cancel(format!("time limit of {} milliseconds exceeded", timeout.as_millis()), true);
                    true
                }
                _ => false,
            })?;
        debug!(timeout_ms = timeout.as_millis() as u64, "watchdog started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop the timer and wait for its thread. Returns whether it fired.
    pub fn stop(mut self) -> bool {
        self.shutdown()
    }

    fn shutdown(&mut self) -> bool {
        let _ = self.stop.try_send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(false),
            None => false,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_timeout() {
        let cancel = CancelState::default();
        let dog = Watchdog::start(cancel.clone(), Duration::from_millis(20), "t".into()).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(dog.stop());
        assert!(cancel.is_canceled());
        assert!(cancel.is_unwinding());
    }

    #[test]
    fn stopped_before_timeout_does_nothing() {
        let cancel = CancelState::default();
        let dog = Watchdog::start(cancel.clone(), Duration::from_secs(10), "t".into()).unwrap();
        assert!(!dog.stop());
        assert!(!cancel.is_canceled());
    }
}
