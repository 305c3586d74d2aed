//! Console ownership shared by a group of interpreters.
//!
//! A thread blocked reading interactive input owns the token implicitly,
//! so acquisition cancels that read before each bounded wait.

use crate::config::DebuggerConfig;
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, trace, warn};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// Coordinators whose token this thread owns directly. Absence is the
    /// "must acquire on behalf of myself" marker.
    static HELD: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

#[derive(Debug, Default)]
struct TokenState {
    owner: Option<ThreadId>,
    depth: usize,
}

struct PendingRead {
    thread: ThreadId,
    cancel: Arc<AtomicBool>,
    cancellable: bool,
}

struct Shared {
    id: usize,
    name: String,
    token: Mutex<TokenState>,
    released: Condvar,
    readers: Mutex<HashMap<u64, PendingRead>>,
    next_read: AtomicUsize,
    retries: u32,
    timeout: Duration,
    retry_sleep: Duration,
}

#[derive(Clone)]
pub struct InteractiveLoopCoordinator {
    shared: Arc<Shared>,
}

/// Unregisters a pending read when dropped.
pub struct ReadRegistration {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for ReadRegistration {
    fn drop(&mut self) {
        self.shared.readers.lock().remove(&self.id);
    }
}

impl InteractiveLoopCoordinator {
    pub fn new(name: impl Into<String>, config: &DebuggerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                token: Mutex::new(TokenState::default()),
                released: Condvar::new(),
                readers: Mutex::new(HashMap::new()),
                next_read: AtomicUsize::new(1),
                retries: config.loop_retries.max(1),
                timeout: config.loop_timeout(),
                retry_sleep: config.loop_retry_sleep(),
            }),
        }
    }

    /// Process-wide console shared by interpreters that weren't given one.
    pub fn global() -> &'static InteractiveLoopCoordinator {
        static GLOBAL: OnceLock<InteractiveLoopCoordinator> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::new("console", &DebuggerConfig::default()))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the calling thread owns the token.
    pub fn held_by_current_thread(&self) -> bool {
        HELD.with(|held| held.borrow().contains(&self.shared.id))
    }

    pub fn is_held(&self) -> bool {
        self.shared.token.lock().owner.is_some()
    }

    /// Announce that the calling thread is about to block reading input.
    pub fn begin_read(&self, cancel: Arc<AtomicBool>, cancellable: bool) -> ReadRegistration {
        let id = self.shared.next_read.fetch_add(1, Ordering::Relaxed) as u64;
        self.shared.readers.lock().insert(
            id,
            PendingRead {
                thread: thread::current().id(),
                cancel,
                cancellable,
            },
        );
        ReadRegistration {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    /// Best effort: ask threads blocked on interactive input to give up.
    /// Reads of the token owner are canceled when it has any, otherwise
    /// every pending read. `Ok(false)` when nobody is reading.
    pub fn cancel_pending_read(&self) -> io::Result<bool> {
        let owner = self.shared.token.lock().owner;
        let readers = self.shared.readers.lock();
        let owner_reading = owner.is_some_and(|o| readers.values().any(|r| r.thread == o));
        let targets: Vec<&PendingRead> = readers
            .values()
            .filter(|r| !owner_reading || Some(r.thread) == owner)
            .collect();
        if targets.is_empty() {
            return Ok(false);
        }

        let mut canceled = false;
        for pending in targets.iter().filter(|r| r.cancellable) {
            pending.cancel.store(true, Ordering::SeqCst);
            canceled = true;
        }
        if canceled {
            Ok(true)
        } else {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "pending interactive read cannot be canceled",
            ))
        }
    }

    /// Try to take the token, canceling any pending read before each
    /// bounded wait. Re-entrant for the owning thread.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_for(self.shared.timeout)
    }

    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        let me = thread::current().id();

        for attempt in 0..self.shared.retries {
            {
                let mut token = self.shared.token.lock();
                if token.owner == Some(me) {
                    token.depth += 1;
                    return true;
                }
            }

            match self.cancel_pending_read() {
                Ok(canceled) => {
                    if canceled {
                        trace!(console = %self.shared.name, attempt, "canceled pending interactive read");
                    }
                }
                Err(e) => {
                    debug!(console = %self.shared.name, attempt, error = %e, "could not cancel interactive read");
                    thread::sleep(self.shared.retry_sleep);
                }
            }

            let mut token = self.shared.token.lock();
            if token.owner.is_some() {
                let _ = self
                    .shared
                    .released
                    .wait_while_for(&mut token, |t| t.owner.is_some(), timeout);
            }
            if token.owner.is_none() {
                token.owner = Some(me);
                token.depth = 1;
                drop(token);
                HELD.with(|held| held.borrow_mut().insert(self.shared.id));
                debug!(console = %self.shared.name, attempt, "interactive loop token acquired");
                return true;
            }
        }

        warn!(console = %self.shared.name, retries = self.shared.retries, "interactive loop token unavailable");
        false
    }

    /// Restore the calling thread's marker, then give the token back.
    /// Returns whether a release actually happened.
    pub fn release(&self) -> bool {
        let me = thread::current().id();
        let mut token = self.shared.token.lock();
        if token.owner != Some(me) {
            return false;
        }
        token.depth -= 1;
        if token.depth > 0 {
            return true;
        }

        HELD.with(|held| held.borrow_mut().remove(&self.shared.id));
        token.owner = None;
        drop(token);
        self.shared.released.notify_all();
        debug!(console = %self.shared.name, "interactive loop token released");
        true
    }
}

impl std::fmt::Debug for InteractiveLoopCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveLoopCoordinator")
            .field("name", &self.shared.name)
            .field("held", &self.is_held())
            .finish()
    }
}
