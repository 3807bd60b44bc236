//! Error classification shared by all services.
//!
//! Every failure travels as an [`anyhow::Error`]. Where callers need to tell failures apart,
//! a [`ServiceError`] is attached as context which carries an [`ErrorKind`]. Use [`ResultExt`]
//! to tag error chains or the [`validation_bail!`] and [`kind_bail!`] macros for early returns.
//! [`kind_of`] recovers the kind from an arbitrary error chain.

use std::fmt::{Debug, Display, Formatter};

/// Classifies a failure so that callers never depend on vendor specific error shapes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input (empty key, invalid config field, ...).
    Validation,
    /// An underlying SDK or HTTP call failed.
    Transport,
    /// The operation requires a signed-in user.
    Unauthenticated,
    /// The backend for the requested subsystem was never initialized.
    NotInitialized,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Unauthenticated => write!(f, "unauthenticated"),
            ErrorKind::NotInitialized => write!(f, "not initialized"),
        }
    }
}

/// Context attached to an error chain to record its [`ErrorKind`].
#[derive(Clone, Debug)]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl ToString) -> Self {
        ServiceError {
            kind,
            message: message.to_string(),
        }
    }
}

/// Extension trait for tagging error results with an [`ErrorKind`].
pub trait ResultExt<T> {
    /// Wraps the error with a [`ServiceError`] carrying the given kind.
    fn with_kind(self, kind: ErrorKind) -> Result<T, anyhow::Error>;

    /// Convenience method for `with_kind(ErrorKind::Validation)`.
    fn mark_validation_error(self) -> Result<T, anyhow::Error>;

    /// Convenience method for `with_kind(ErrorKind::Transport)`.
    fn mark_transport_error(self) -> Result<T, anyhow::Error>;
}

impl<T> ResultExt<T> for Result<T, anyhow::Error> {
    fn with_kind(self, kind: ErrorKind) -> Result<T, anyhow::Error> {
        match self {
            Ok(t) => Ok(t),
            Err(err) => {
                let message = format!("{:#}", err);
                Err(err.context(ServiceError { kind, message }))
            }
        }
    }

    fn mark_validation_error(self) -> Result<T, anyhow::Error> {
        self.with_kind(ErrorKind::Validation)
    }

    fn mark_transport_error(self) -> Result<T, anyhow::Error> {
        self.with_kind(ErrorKind::Transport)
    }
}

/// Returns the outermost [`ErrorKind`] recorded in the given error chain.
///
/// Plain `anyhow` context layered on top of a tagged error is looked through.
pub fn kind_of(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<ServiceError>()
        .map(|service_error| service_error.kind)
}

/// Early return with a validation error.
#[macro_export]
macro_rules! validation_bail {
    ($err:expr $(,)?) => {
        return $crate::error::ResultExt::mark_validation_error(Err(::anyhow::anyhow!($err)))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return $crate::error::ResultExt::mark_validation_error(Err(::anyhow::anyhow!($fmt, $($arg)*)))
    };
}

/// Early return with an error of the given kind.
#[macro_export]
macro_rules! kind_bail {
    ($kind:expr, $msg:literal $(,)?) => {
        return $crate::error::ResultExt::with_kind(Err(::anyhow::anyhow!($msg)), $kind)
    };
    ($kind:expr, $fmt:literal, $($arg:tt)*) => {
        return $crate::error::ResultExt::with_kind(Err(::anyhow::anyhow!($fmt, $($arg)*)), $kind)
    };
}
