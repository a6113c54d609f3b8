use std::borrow::Cow;

/// Convenience alias for results produced by listeners and argument accessors.
pub type Result<T, E = EmitterError> = std::result::Result<T, E>;

/// Faults raised while invoking a listener.
///
/// Registry operations never fail at runtime; every variant here describes
/// something that went wrong inside a single listener invocation and is
/// isolated from its siblings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitterError {
    /// The argument at `index` is not of the type the listener asked for.
    #[error("Argument mismatch{}: argument {index} is not a `{expected}`", format_context(.context))]
    ArgumentMismatch {
        index: usize,
        expected: &'static str,
        context: Option<Cow<'static, str>>,
    },

    /// The listener asked for an argument beyond the emitted ones.
    #[error("Missing argument{}: index {index} requested but only {len} emitted", format_context(.context))]
    MissingArgument { index: usize, len: usize, context: Option<Cow<'static, str>> },

    /// The listener reported a failure of its own.
    #[error("Listener failed{}: {message}", format_context(.context))]
    Listener { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The listener panicked. The message is the panic payload when it was a string.
    #[error("Listener panicked{}: {message}", format_context(.context))]
    Panicked { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl EmitterError {
    /// Returns `true` for faults caused by a panic inside the listener.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message: Cow<'static, str> = payload.downcast_ref::<&'static str>().map_or_else(
            || {
                payload
                    .downcast_ref::<String>()
                    .map_or(Cow::Borrowed("non-string panic payload"), |s| Cow::Owned(s.clone()))
            },
            |s| Cow::Borrowed(*s),
        );
        Self::Panicked { message, context: None }
    }

    const fn context_mut(&mut self) -> &mut Option<Cow<'static, str>> {
        match self {
            Self::ArgumentMismatch { context, .. }
            | Self::MissingArgument { context, .. }
            | Self::Listener { context, .. }
            | Self::Panicked { context, .. } => context,
        }
    }
}

impl From<&'static str> for EmitterError {
    #[inline]
    fn from(s: &'static str) -> Self {
        Self::Listener { message: Cow::Borrowed(s), context: None }
    }
}

impl From<String> for EmitterError {
    #[inline]
    fn from(s: String) -> Self {
        Self::Listener { message: Cow::Owned(s), context: None }
    }
}

/// Attaches human-readable context to an [`EmitterError`] result.
pub trait EmitterErrorExt<T> {
    /// Sets the context of the error, replacing any previous one.
    ///
    /// # Errors
    /// Returns the original error with the context attached.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T>;
}

impl<T> EmitterErrorExt<T> for Result<T> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            *e.context_mut() = Some(context.into());
            e
        })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_rendered() {
        let err: Result<()> = Err(EmitterError::from("disk full"));
        let err = err.context("saving snapshot").unwrap_err();
        assert_eq!(err.to_string(), "Listener failed (saving snapshot): disk full");
    }

    #[test]
    fn test_mismatch_without_context() {
        let err = EmitterError::ArgumentMismatch { index: 1, expected: "u32", context: None };
        assert_eq!(err.to_string(), "Argument mismatch: argument 1 is not a `u32`");
    }

    #[test]
    fn test_panic_payloads() {
        let err = EmitterError::from_panic(&"boom");
        assert_eq!(err, EmitterError::Panicked { message: "boom".into(), context: None });

        let err = EmitterError::from_panic(&String::from("owned boom"));
        assert!(err.is_panic());
        assert!(err.to_string().ends_with("owned boom"));

        let err = EmitterError::from_panic(&42_u8);
        assert!(err.to_string().contains("non-string panic payload"));
    }
}
