use crate::error::{EmitterError, Result};
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// A single type-erased argument.
pub type Arg = Arc<dyn Any + Send + Sync>;

/// The ordered argument sequence handed to every listener of an emission.
///
/// Values are stored type-erased; listeners recover them with [`Args::get`],
/// which reports a type or arity mismatch as an [`EmitterError`] instead of
/// panicking. Every listener of an emission borrows the same `Args`.
///
/// # Examples
/// ```rust
/// use mhub_emitter::{Args, args};
///
/// let args = args![7_u32, "seven"];
/// assert_eq!(*args.get::<u32>(0).unwrap(), 7);
/// assert_eq!(*args.get::<&str>(1).unwrap(), "seven");
/// assert!(args.get::<u64>(0).is_err());
///
/// let empty = Args::from(());
/// assert!(empty.is_empty());
/// ```
#[derive(Clone, Default)]
pub struct Args {
    values: Vec<Arg>,
}

impl Args {
    /// Creates an empty argument list.
    #[must_use]
    pub const fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Appends a value and returns the list, for chained construction.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    /// Appends a value.
    pub fn push<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.push(Arc::new(value));
    }

    /// Appends an already shared value without re-wrapping it.
    pub fn push_arc(&mut self, value: Arg) {
        self.values.push(value);
    }

    /// Number of emitted arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrows the argument at `index` as a `T`.
    ///
    /// # Errors
    /// Returns [`EmitterError::MissingArgument`] if fewer than `index + 1`
    /// arguments were emitted, or [`EmitterError::ArgumentMismatch`] if the
    /// argument holds a different type.
    pub fn get<T: Any>(&self, index: usize) -> Result<&T> {
        let value = self
            .values
            .get(index)
            .ok_or(EmitterError::MissingArgument { index, len: self.len(), context: None })?;
        value.downcast_ref::<T>().ok_or(EmitterError::ArgumentMismatch {
            index,
            expected: type_name::<T>(),
            context: None,
        })
    }

    /// Like [`Args::get`], but discards the reason.
    #[must_use]
    pub fn try_get<T: Any>(&self, index: usize) -> Option<&T> {
        self.values.get(index).and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns the shared handle of the argument at `index`.
    #[must_use]
    pub fn get_arc(&self, index: usize) -> Option<&Arg> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.values.iter()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args").field("len", &self.values.len()).finish_non_exhaustive()
    }
}

impl From<()> for Args {
    fn from((): ()) -> Self {
        Self::new()
    }
}

impl From<Vec<Arg>> for Args {
    fn from(values: Vec<Arg>) -> Self {
        Self { values }
    }
}

impl FromIterator<Arg> for Args {
    fn from_iter<I: IntoIterator<Item = Arg>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

/// Builds an [`Args`] list from a comma-separated sequence of values.
///
/// ```rust
/// let args = mhub_emitter::args![1_i32, String::from("two"), 3.0_f64];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Args::new()$(.with($value))+
    };
}
