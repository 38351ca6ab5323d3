use std::fmt::{Display, Formatter};

/// Error returned by broker operations.
///
/// Carries a [`Code`] so callers can branch on the failure class the same
/// way they would on a gRPC status, plus a human readable message.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the `Code` of this `Status`.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the text error message of this `Status`.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(Code::Aborted, message)
    }
}

/// Status codes used by [`Status`].
///
/// The variants follow the [gRPC status codes] the Pub/Sub surface is
/// usually consumed through, so code written against a remote client
/// ports over unchanged.
///
/// [gRPC status codes]: https://github.com/grpc/grpc/blob/master/doc/statuscodes.md#status-codes-and-their-use-in-grpc
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Code {
    /// The operation was cancelled.
    Cancelled,

    /// Client specified an invalid argument.
    InvalidArgument,

    /// Deadline expired before operation could complete.
    DeadlineExceeded,

    /// Some requested entity was not found.
    NotFound,

    /// Some entity that we attempted to create already exists.
    AlreadyExists,

    /// The system is not in a state required for the operation's execution.
    FailedPrecondition,

    /// The operation was aborted.
    Aborted,
}

impl Code {
    pub fn description(&self) -> &'static str {
        match self {
            Code::Cancelled => "The operation was cancelled",
            Code::InvalidArgument => "Client specified an invalid argument",
            Code::DeadlineExceeded => "Deadline expired before operation could complete",
            Code::NotFound => "Some requested entity was not found",
            Code::AlreadyExists => "Some entity that we attempted to create already exists",
            Code::FailedPrecondition => "The system is not in a state required for the operation's execution",
            Code::Aborted => "The operation was aborted",
        }
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.description(), f)
    }
}
