use crate::args::Args;
use crate::config::{EmitterBuilder, EmitterConfig, ListenerLimit, OverflowPolicy};
use crate::error::{EmitterError, Result};
use crate::listener::{self, Listener, ListenerHandle, ListenerKind, ListenerRecord};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Callback receiving listener faults as `(event, handle, error)`.
pub(crate) type RecoveryHook = Arc<dyn Fn(&str, ListenerHandle, &EmitterError) + Send + Sync>;

#[derive(Default)]
struct Registry {
    events: FxHashMap<Arc<str>, Vec<ListenerRecord>>,
    last_handle: u64,
    max_listeners: ListenerLimit,
    recovery: Option<RecoveryHook>,
}

struct Shared {
    registry: Mutex<Registry>,
    overflow: OverflowPolicy,
    thread_name: String,
}

/// What to do with a fault when no recovery hook is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unhandled {
    /// Log it; only the faulting listener's unit of work is lost.
    Log,
    /// Resume panics on the calling thread.
    Propagate,
}

/// The listeners of one emission, detached from the registry.
struct Dispatch<'a> {
    event: &'a str,
    listeners: Vec<ListenerRecord>,
    recovery: Option<RecoveryHook>,
}

impl Dispatch<'_> {
    /// Runs one listener and routes its fault. Returns the panic payload when
    /// it has to be resumed on the caller instead.
    fn run(
        &self,
        record: &ListenerRecord,
        args: &Args,
        unhandled: Unhandled,
    ) -> Option<Box<dyn Any + Send>> {
        let fault = match panic::catch_unwind(AssertUnwindSafe(|| (record.listener)(args))) {
            Ok(Ok(())) => return None,
            Ok(Err(err)) => err,
            Err(payload) => {
                if self.recovery.is_none() && unhandled == Unhandled::Propagate {
                    return Some(payload);
                }
                EmitterError::from_panic(&*payload)
            },
        };

        self.report(record.handle, &fault);
        None
    }

    fn report(&self, handle: ListenerHandle, fault: &EmitterError) {
        let Some(hook) = &self.recovery else {
            error!(
                event = self.event,
                %handle,
                error = %fault,
                "Listener fault left unhandled; install a recovery hook to observe it"
            );
            return;
        };

        if panic::catch_unwind(AssertUnwindSafe(|| hook(self.event, handle, fault))).is_err() {
            error!(
                event = self.event,
                %handle,
                error = %fault,
                "Recovery hook panicked while handling a listener fault"
            );
        }
    }
}

/// A thread-safe registry of named-event listeners.
///
/// Listeners are registered against an event name and invoked by
/// [`Emitter::emit`] (concurrently, joined before returning) or
/// [`Emitter::emit_sync`] (sequentially, in registration order). Every
/// registration yields a [`ListenerHandle`], which is the only way to remove
/// that listener again.
///
/// Cloning an `Emitter` is cheap; clones share the same registry.
///
/// # Examples
/// ```rust
/// use mhub_emitter::{Emitter, args};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// let emitter = Emitter::new();
/// let total = Arc::new(AtomicU32::new(0));
///
/// let sink = Arc::clone(&total);
/// let handle = emitter
///     .on("deposit", move |args| {
///         sink.fetch_add(*args.get::<u32>(0)?, Ordering::SeqCst);
///         Ok(())
///     })
///     .expect("below the listener cap");
///
/// emitter.emit("deposit", args![40_u32]).emit("deposit", args![2_u32]);
/// assert_eq!(total.load(Ordering::SeqCst), 42);
///
/// emitter.off("deposit", handle);
/// assert_eq!(emitter.listener_count("deposit"), 0);
/// ```
#[derive(Clone)]
pub struct Emitter {
    shared: Arc<Shared>,
}

impl Emitter {
    /// Creates an empty emitter with the default configuration: at most
    /// [`DEFAULT_MAX_LISTENERS`](crate::DEFAULT_MAX_LISTENERS) listeners per
    /// event, overflowing registrations rejected, no recovery hook.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EmitterConfig::default())
    }

    /// Creates an empty emitter from an explicit configuration.
    #[must_use]
    pub fn with_config(config: EmitterConfig) -> Self {
        Self::from_parts(config.normalized(), None)
    }

    /// Returns a new [`EmitterBuilder`].
    #[must_use = "The builder must be configured before it can be used to build the emitter."]
    pub fn builder() -> EmitterBuilder {
        EmitterBuilder::default()
    }

    pub(crate) fn from_parts(config: EmitterConfig, recovery: Option<RecoveryHook>) -> Self {
        let registry =
            Registry { max_listeners: config.max_listeners, recovery, ..Registry::default() };
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(registry),
                overflow: config.overflow,
                thread_name: config.thread_name,
            }),
        }
    }

    /// The current configuration, including the live listener cap.
    #[must_use]
    pub fn config(&self) -> EmitterConfig {
        EmitterConfig {
            max_listeners: self.max_listeners(),
            overflow: self.shared.overflow,
            thread_name: self.shared.thread_name.clone(),
        }
    }

    /// Registers `listener` for `event`.
    ///
    /// Returns `None` if the event already holds the maximum number of
    /// listeners and the emitter uses [`OverflowPolicy::Reject`]; no handle is
    /// consumed in that case. With [`OverflowPolicy::Warn`] the listener is
    /// registered anyway and a warning is logged.
    pub fn add_listener<F>(&self, event: &str, listener: F) -> Option<ListenerHandle>
    where
        F: Fn(&Args) -> Result<()> + Send + Sync + 'static,
    {
        self.register(event, ListenerKind::Persistent, Arc::new(listener))
    }

    /// Alias for [`Emitter::add_listener`].
    pub fn on<F>(&self, event: &str, listener: F) -> Option<ListenerHandle>
    where
        F: Fn(&Args) -> Result<()> + Send + Sync + 'static,
    {
        self.add_listener(event, listener)
    }

    /// Registers a listener that runs on the next emission of `event` only.
    ///
    /// The listener leaves the registry in the same critical section that
    /// snapshots the emission, so concurrent emissions can never run it twice.
    /// Removing the returned handle before that cancels it.
    pub fn once<F>(&self, event: &str, listener: F) -> Option<ListenerHandle>
    where
        F: Fn(&Args) -> Result<()> + Send + Sync + 'static,
    {
        self.register(event, ListenerKind::Once, Arc::new(listener))
    }

    /// Registers a listener that is skipped while less than `interval` has
    /// elapsed since its last successful run. The first emission always runs it.
    ///
    /// Throttled listeners count against the listener cap like any other.
    pub fn throttle<F>(
        &self,
        event: &str,
        interval: Duration,
        listener: F,
    ) -> Option<ListenerHandle>
    where
        F: Fn(&Args) -> Result<()> + Send + Sync + 'static,
    {
        self.register(event, ListenerKind::Throttled, listener::throttled(interval, listener))
    }

    fn register(
        &self,
        event: &str,
        kind: ListenerKind,
        listener: Listener,
    ) -> Option<ListenerHandle> {
        let mut guard = self.shared.registry.lock();
        let registry = &mut *guard;

        let count = registry.events.get(event).map_or(0, Vec::len);
        if registry.max_listeners.is_reached(count) {
            match self.shared.overflow {
                OverflowPolicy::Reject => {
                    debug!(
                        event,
                        count,
                        max_listeners = %registry.max_listeners,
                        "Listener rejected: event is at its listener limit"
                    );
                    return None;
                },
                OverflowPolicy::Warn => warn!(
                    event,
                    count,
                    max_listeners = %registry.max_listeners,
                    "Listener limit exceeded; possible listener leak"
                ),
            }
        }

        registry.last_handle += 1;
        let handle = ListenerHandle::new(registry.last_handle);
        let record = ListenerRecord { handle, kind, listener };
        match registry.events.get_mut(event) {
            Some(records) => records.push(record),
            None => {
                registry.events.insert(Arc::from(event), vec![record]);
            },
        }

        debug!(event, %handle, ?kind, "Listener registered");
        Some(handle)
    }

    /// Removes the listener identified by `handle` from `event`.
    ///
    /// Unknown events and handles are ignored. Returns whether a listener was
    /// removed. Safe to call from inside a running listener.
    pub fn remove_listener(&self, event: &str, handle: ListenerHandle) -> bool {
        let removed = {
            let mut guard = self.shared.registry.lock();
            let registry = &mut *guard;
            let Some(records) = registry.events.get_mut(event) else {
                return false;
            };
            let Some(position) = records.iter().position(|r| r.handle == handle) else {
                return false;
            };
            let removed = records.remove(position);
            if records.is_empty() {
                registry.events.remove(event);
            }
            removed
        };

        debug!(event, handle = %removed.handle, "Listener removed");
        // Dropped outside the lock: the listener's captures may call back into the emitter.
        drop(removed);
        true
    }

    /// Alias for [`Emitter::remove_listener`].
    pub fn off(&self, event: &str, handle: ListenerHandle) -> bool {
        self.remove_listener(event, handle)
    }

    /// Removes every listener of `event`, returning how many were removed.
    pub fn remove_all_listeners(&self, event: &str) -> usize {
        let removed = self.shared.registry.lock().events.remove(event).unwrap_or_default();
        if !removed.is_empty() {
            debug!(event, removed = removed.len(), "All listeners removed");
        }
        removed.len()
    }

    /// Removes every listener of every event, returning how many were removed.
    pub fn clear(&self) -> usize {
        let events = std::mem::take(&mut self.shared.registry.lock().events);
        let removed = events.values().map(Vec::len).sum();
        debug!(events = events.len(), removed, "Emitter cleared");
        removed
    }

    /// Number of listeners currently registered for `event`; `0` if unknown.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.registry.lock().events.get(event).map_or(0, Vec::len)
    }

    /// Returns `true` if `event` has at least one listener.
    #[must_use]
    pub fn has_listeners(&self, event: &str) -> bool {
        self.listener_count(event) > 0
    }

    /// Names of all events that currently have listeners, in no particular order.
    #[must_use]
    pub fn event_names(&self) -> Vec<Arc<str>> {
        self.shared.registry.lock().events.keys().cloned().collect()
    }

    /// Changes the listener cap for future registrations. Listeners already
    /// registered are kept even if they now exceed it.
    pub fn set_max_listeners(&self, limit: impl Into<ListenerLimit>) -> &Self {
        let limit = limit.into();
        self.shared.registry.lock().max_listeners = limit;
        debug!(max_listeners = %limit, "Listener limit changed");
        self
    }

    /// The listener cap applied to new registrations.
    #[must_use]
    pub fn max_listeners(&self) -> ListenerLimit {
        self.shared.registry.lock().max_listeners
    }

    /// Installs `hook` to receive every listener fault as
    /// `(event, handle, error)`, replacing any previous hook.
    ///
    /// Without a hook, faults inside [`Emitter::emit`] are logged and only
    /// cost the faulting listener its run, while a panic inside
    /// [`Emitter::emit_sync`] propagates to the caller. The hook runs on the
    /// thread that ran the listener, with the registry unlocked, so it may
    /// call back into the emitter. A panic inside the hook is caught and
    /// logged; it never reaches the caller of either emit method.
    pub fn recover_with<F>(&self, hook: F) -> &Self
    where
        F: Fn(&str, ListenerHandle, &EmitterError) + Send + Sync + 'static,
    {
        self.shared.registry.lock().recovery = Some(Arc::new(hook));
        self
    }

    /// Removes the recovery hook, restoring the default fault handling.
    pub fn clear_recovery(&self) -> &Self {
        self.shared.registry.lock().recovery = None;
        self
    }

    /// Invokes every listener of `event` with `args` and waits for all of them.
    ///
    /// Listeners run concurrently on scoped worker threads (a lone listener
    /// runs on the calling thread), so no ordering between them is
    /// guaranteed. The set of listeners is fixed when the call starts:
    /// registrations made while it runs apply to later emissions only.
    /// A fault in one listener never affects the others or the join, and
    /// neither does a panicking recovery hook, whatever the listener count.
    pub fn emit(&self, event: &str, args: impl Into<Args>) -> &Self {
        let Some(dispatch) = self.snapshot(event) else {
            trace!(event, "No listeners registered; nothing to emit");
            return self;
        };
        let args = args.into();
        trace!(event, listeners = dispatch.listeners.len(), "Emitting event");

        if let [record] = dispatch.listeners.as_slice() {
            dispatch.run(record, &args, Unhandled::Log);
            return self;
        }

        let dispatch = &dispatch;
        let args = &args;
        thread::scope(|scope| {
            let mut workers = Vec::with_capacity(dispatch.listeners.len());
            for record in &dispatch.listeners {
                let handle = record.handle;
                let spawned = thread::Builder::new()
                    .name(format!("{}:{event}", self.shared.thread_name))
                    .spawn_scoped(scope, move || {
                        dispatch.run(record, args, Unhandled::Log);
                    });
                match spawned {
                    Ok(worker) => workers.push((handle, worker)),
                    Err(err) => {
                        warn!(
                            event,
                            %handle,
                            error = %err,
                            "Failed to spawn listener worker; running inline"
                        );
                        dispatch.run(record, args, Unhandled::Log);
                    },
                }
            }

            for (handle, worker) in workers {
                if worker.join().is_err() {
                    error!(event, %handle, "Listener worker panicked outside fault isolation");
                }
            }
        });
        self
    }

    /// Invokes every listener of `event` with `args` one at a time, in
    /// registration order, on the calling thread.
    ///
    /// Without a recovery hook a panicking listener unwinds into the caller
    /// and the remaining listeners of this emission do not run. One-shot
    /// listeners among those skipped are put back, so the next emission
    /// still runs them.
    pub fn emit_sync(&self, event: &str, args: impl Into<Args>) -> &Self {
        let Some(dispatch) = self.snapshot(event) else {
            trace!(event, "No listeners registered; nothing to emit");
            return self;
        };
        let args = args.into();
        trace!(event, listeners = dispatch.listeners.len(), "Emitting event synchronously");

        for (position, record) in dispatch.listeners.iter().enumerate() {
            if let Some(payload) = dispatch.run(record, &args, Unhandled::Propagate) {
                self.restore(event, &dispatch.listeners[position + 1..]);
                panic::resume_unwind(payload);
            }
        }
        self
    }

    /// Puts back the one-shot records an interrupted emission never ran, in
    /// handle order. The listener cap does not apply: they were admitted once.
    fn restore(&self, event: &str, skipped: &[ListenerRecord]) {
        let pending: Vec<_> =
            skipped.iter().filter(|r| r.kind == ListenerKind::Once).cloned().collect();
        if pending.is_empty() {
            return;
        }

        let restored = pending.len();
        {
            let mut guard = self.shared.registry.lock();
            let records = guard.events.entry(Arc::from(event)).or_default();
            for record in pending {
                let position = records.partition_point(|r| r.handle < record.handle);
                records.insert(position, record);
            }
        }
        debug!(event, restored, "One-shot listeners restored after a panicking emission");
    }

    /// Copies the listeners of `event` and retires its one-shot records, all
    /// under one lock acquisition.
    fn snapshot<'a>(&self, event: &'a str) -> Option<Dispatch<'a>> {
        let mut guard = self.shared.registry.lock();
        let registry = &mut *guard;

        let records = registry.events.get_mut(event)?;
        let listeners = records.clone();
        records.retain(|r| r.kind != ListenerKind::Once);
        if records.is_empty() {
            registry.events.remove(event);
        }
        if listeners.is_empty() {
            return None;
        }

        Some(Dispatch { event, listeners, recovery: registry.recovery.clone() })
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("Emitter")
            .field("events", &registry.events.len())
            .field("listeners", &registry.events.values().map(Vec::len).sum::<usize>())
            .field("max_listeners", &registry.max_listeners)
            .field("overflow", &self.shared.overflow)
            .field("recovery", &registry.recovery.is_some())
            .finish()
    }
}
