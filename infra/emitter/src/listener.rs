use crate::args::Args;
use crate::error::Result;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A registered callback.
///
/// Listeners receive the emitted [`Args`] by reference and report failures
/// through the returned [`Result`]; panics are caught by the dispatcher.
pub type Listener = Arc<dyn Fn(&Args) -> Result<()> + Send + Sync>;

/// Identifies one registered listener within its [`Emitter`](crate::Emitter).
///
/// Handles are allocated from a per-emitter counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerKind {
    Persistent,
    Once,
    Throttled,
}

#[derive(Clone)]
pub(crate) struct ListenerRecord {
    pub(crate) handle: ListenerHandle,
    pub(crate) kind: ListenerKind,
    pub(crate) listener: Listener,
}

impl fmt::Debug for ListenerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRecord")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Wraps `listener` so it only runs if `interval` has passed since its last
/// successful run. The first call always runs.
pub(crate) fn throttled<F>(interval: Duration, listener: F) -> Listener
where
    F: Fn(&Args) -> Result<()> + Send + Sync + 'static,
{
    let last_run: Mutex<Option<Instant>> = Mutex::new(None);
    Arc::new(move |args: &Args| {
        let started = Instant::now();
        let previous = {
            let mut last = last_run.lock();
            if last.is_some_and(|at| started.saturating_duration_since(at) < interval) {
                return Ok(());
            }
            last.replace(started)
        };

        // The slot is claimed before the call so concurrent emissions cannot both
        // pass the window check; a failed or panicking run hands it back.
        let mut rollback = Rollback { slot: &last_run, started, previous, armed: true };
        listener(args)?;
        rollback.armed = false;
        Ok(())
    })
}

struct Rollback<'a> {
    slot: &'a Mutex<Option<Instant>>,
    started: Instant,
    previous: Option<Instant>,
    armed: bool,
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut last = self.slot.lock();
        if *last == Some(self.started) {
            *last = self.previous;
        }
    }
}
