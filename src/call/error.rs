//! How a failed call looks to the caller.

use thiserror::Error;

/// Outcome of a call that did not return a value, as seen by the caller.
///
/// `E` is the call's declared error type, lifted from the error buffer.
#[derive(Error, Debug)]
pub enum CallError<E> {
    /// The callee returned one of its declared errors.
    #[error("{0}")]
    Declared(E),

    /// The callee failed unexpectedly; carries its diagnostic message.
    #[error("Native call panicked: {0}")]
    Panic(String),

    /// The async operation was cancelled before it produced a result.
    #[error("Call was cancelled")]
    Cancelled,

    /// The envelope itself could not be processed.
    #[error(transparent)]
    Internal(#[from] crate::Error),
}

impl<E> CallError<E> {
    pub fn is_declared(&self) -> bool {
        matches!(self, Self::Declared(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Panics and broken envelopes mean the native side can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Panic(_) | Self::Internal(_))
    }

    /// The declared error, if that is what this is.
    pub fn declared(self) -> Option<E> {
        match self {
            Self::Declared(error) => Some(error),
            _ => None,
        }
    }

    pub fn map_declared<F>(self, f: impl FnOnce(E) -> F) -> CallError<F> {
        match self {
            Self::Declared(error) => CallError::Declared(f(error)),
            Self::Panic(message) => CallError::Panic(message),
            Self::Cancelled => CallError::Cancelled,
            Self::Internal(error) => CallError::Internal(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let declared: CallError<String> = CallError::Declared("nope".into());
        assert!(declared.is_declared());
        assert!(!declared.is_fatal());
        assert_eq!(declared.to_string(), "nope");

        let panic: CallError<String> = CallError::Panic("boom".into());
        assert!(panic.is_fatal());
        assert_eq!(panic.to_string(), "Native call panicked: boom");

        assert!(CallError::<String>::Cancelled.is_cancelled());
    }

    #[test]
    fn test_map_declared() {
        let error: CallError<u32> = CallError::Declared(4);
        assert_eq!(error.map_declared(|code| code * 2).declared(), Some(8));
    }
}
