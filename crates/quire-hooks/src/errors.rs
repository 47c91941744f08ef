//! Hook error types.

use thiserror::Error;

/// Errors raised by hook registration and dispatch.
#[derive(Debug, Error)]
pub enum HookError {
    /// A hook name (or list of names) was not a scalar value.
    #[error("invalid hook name: {0}")]
    InvalidHookName(String),

    /// A callback was empty, malformed, not callable, or a closure.
    #[error("invalid callback: {0}")]
    InvalidCallback(String),

    /// Priority outside `0..=10000`.
    #[error("priority {0} is outside the allowed range 0..=10000")]
    PriorityOutOfRange(i32),

    /// Registration rejected; wraps the validation failure with the hook it
    /// was attempted for.
    #[error("cannot register hook '{hook}': {source}")]
    Registration {
        /// Hook name as passed by the caller.
        hook: String,
        /// Underlying validation error.
        #[source]
        source: Box<HookError>,
    },

    /// A callback reported a failure during dispatch.
    #[error("hook handler error in '{name}': {message}")]
    Handler {
        /// Hook name being dispatched.
        name: String,
        /// Error message from the callback.
        message: String,
    },

    /// Writing callback output failed.
    #[error("failed to write hook output: {0}")]
    Output(#[from] std::io::Error),
}

impl HookError {
    /// Error for a callback to return from inside a dispatch.
    pub fn handler(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            name: name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn registration(hook: impl Into<String>, source: HookError) -> Self {
        Self::Registration {
            hook: hook.into(),
            source: Box::new(source),
        }
    }

    /// The validation error behind a [`HookError::Registration`], or `self`.
    #[must_use]
    pub fn root(&self) -> &HookError {
        match self {
            Self::Registration { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for hook operations.
pub type HookResult<T> = Result<T, HookError>;
