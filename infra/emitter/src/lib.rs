//! # Emitter
//!
//! An in-process, thread-safe registry of named-event listeners.
//!
//! ## Overview
//!
//! Callers register callbacks ("listeners") against an event name and later
//! emit that name with an argument list. Every registration returns a
//! [`ListenerHandle`], the only way to remove that listener again.
//!
//! ## Features
//!
//! * **Concurrent fan-out**: [`Emitter::emit`] runs listeners on scoped worker
//!   threads and returns once all of them finished.
//! * **Ordered dispatch**: [`Emitter::emit_sync`] runs them one by one, in
//!   registration order, on the calling thread.
//! * **One-shot listeners**: [`Emitter::once`] listeners run at most once,
//!   even when the event is emitted concurrently.
//! * **Throttling**: [`Emitter::throttle`] skips a listener inside a minimum interval.
//! * **Fault isolation**: errors and panics stay inside the faulting listener and
//!   can be observed through [`Emitter::recover_with`].
//! * **Listener cap**: at most [`DEFAULT_MAX_LISTENERS`] listeners per event by
//!   default, see [`ListenerLimit`] and [`OverflowPolicy`].
//!
//! The registry lock is never held while listeners run, so listeners may add
//! or remove listeners (including themselves) and emit further events.
//!
//! # Example
//!
//! ```rust
//! use mhub_emitter::{Emitter, args};
//! use std::sync::{Arc, Mutex};
//!
//! let emitter = Emitter::builder()
//!     .max_listeners(4)
//!     .recover_with(|event, handle, err| eprintln!("{event} {handle}: {err}"))
//!     .build();
//!
//! let greetings = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&greetings);
//! emitter.once("user.created", move |args| {
//!     let name = args.get::<String>(0)?;
//!     sink.lock().unwrap().push(format!("welcome, {name}"));
//!     Ok(())
//! });
//!
//! emitter.emit("user.created", args![String::from("ada")]);
//! emitter.emit("user.created", args![String::from("bob")]);
//!
//! assert_eq!(*greetings.lock().unwrap(), ["welcome, ada"]);
//! ```

mod args;
mod config;
mod emitter;
mod error;
mod listener;

pub use args::{Arg, Args};
pub use config::{
    DEFAULT_MAX_LISTENERS, EmitterBuilder, EmitterConfig, ListenerLimit, OverflowPolicy,
};
pub use emitter::Emitter;
pub use error::{EmitterError, EmitterErrorExt, Result};
pub use listener::{Listener, ListenerHandle};
