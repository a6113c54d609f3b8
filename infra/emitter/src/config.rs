use crate::emitter::{Emitter, RecoveryHook};
use crate::error::EmitterError;
use crate::listener::ListenerHandle;
use std::fmt;
use std::sync::Arc;

/// Default cap on listeners per event.
pub const DEFAULT_MAX_LISTENERS: usize = 10;
const DEFAULT_THREAD_NAME: &str = "emitter";

/// Upper bound on the number of listeners a single event may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerLimit {
    /// At most this many listeners per event.
    Bounded(usize),
    /// No cap.
    Unlimited,
}

impl ListenerLimit {
    /// Returns `true` if an event currently holding `count` listeners is full.
    #[must_use]
    pub const fn is_reached(self, count: usize) -> bool {
        match self {
            Self::Bounded(max) => count >= max,
            Self::Unlimited => false,
        }
    }
}

impl Default for ListenerLimit {
    fn default() -> Self {
        Self::Bounded(DEFAULT_MAX_LISTENERS)
    }
}

impl From<usize> for ListenerLimit {
    fn from(max: usize) -> Self {
        Self::Bounded(max)
    }
}

/// Negative values disable the cap, matching the usual `-1` convention.
impl From<i64> for ListenerLimit {
    fn from(max: i64) -> Self {
        usize::try_from(max).map_or(Self::Unlimited, Self::Bounded)
    }
}

impl From<i32> for ListenerLimit {
    fn from(max: i32) -> Self {
        Self::from(i64::from(max))
    }
}

impl fmt::Display for ListenerLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(max) => write!(f, "{max}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// What happens to a registration that would exceed the [`ListenerLimit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverflowPolicy {
    /// The listener is silently dropped and no handle is allocated.
    #[default]
    Reject,
    /// The listener is inserted anyway and a warning is logged.
    Warn,
}

/// Configuration of an [`Emitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitterConfig {
    pub max_listeners: ListenerLimit,
    pub overflow: OverflowPolicy,
    /// Prefix of the worker threads spawned by [`Emitter::emit`].
    pub thread_name: String,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            max_listeners: ListenerLimit::default(),
            overflow: OverflowPolicy::default(),
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

impl EmitterConfig {
    /// Preset without a listener cap.
    #[must_use = "Use this configuration to build an emitter"]
    pub fn unbounded() -> Self {
        Self { max_listeners: ListenerLimit::Unlimited, ..Self::default() }
    }

    pub(crate) fn normalized(mut self) -> Self {
        if self.thread_name.trim().is_empty() {
            DEFAULT_THREAD_NAME.clone_into(&mut self.thread_name);
        }
        self
    }
}

/// A builder for configuring an [`Emitter`].
#[derive(Default)]
pub struct EmitterBuilder {
    config: EmitterConfig,
    recovery: Option<RecoveryHook>,
}

impl EmitterBuilder {
    /// Starts from an existing configuration.
    #[must_use]
    pub fn from_config(config: EmitterConfig) -> Self {
        Self { config, recovery: None }
    }

    /// Sets the per-event listener cap.
    #[must_use = "The builder must be configured before it can be used to build the emitter."]
    pub fn max_listeners(mut self, limit: impl Into<ListenerLimit>) -> Self {
        self.config.max_listeners = limit.into();
        self
    }

    /// Sets the behaviour for registrations beyond the cap.
    #[must_use = "The builder must be configured before it can be used to build the emitter."]
    pub const fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    /// Sets the name prefix of dispatch worker threads.
    #[must_use = "The builder must be configured before it can be used to build the emitter."]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Installs a recovery hook, see [`Emitter::recover_with`].
    #[must_use = "The builder must be configured before it can be used to build the emitter."]
    pub fn recover_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, ListenerHandle, &EmitterError) + Send + Sync + 'static,
    {
        self.recovery = Some(Arc::new(hook));
        self
    }

    /// Consumes the builder and creates the emitter.
    #[must_use]
    pub fn build(self) -> Emitter {
        Emitter::from_parts(self.config.normalized(), self.recovery)
    }
}

impl fmt::Debug for EmitterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterBuilder")
            .field("config", &self.config)
            .field("recovery", &self.recovery.is_some())
            .finish()
    }
}
