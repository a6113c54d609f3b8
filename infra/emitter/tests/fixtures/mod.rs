#![allow(dead_code)]

use mhub_emitter::{Args, Result};
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Routes emitter logs through the test harness; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("mhub_emitter=debug"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// A shared invocation counter.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// A listener that bumps this counter on every call.
    pub fn listener(&self) -> impl Fn(&Args) -> Result<()> + Send + Sync + 'static {
        let inner = Arc::clone(&self.0);
        move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
