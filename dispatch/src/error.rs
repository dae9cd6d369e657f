use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::parse::ParseFailure;

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Failure of a dispatch client operation.
///
/// [`DispatchError::is_infrastructure`] separates failures of the acceleration
/// path, which the client absorbs by parsing on the calling thread, from
/// failures the caller has to react to.
#[derive(Debug)]
pub enum DispatchError {
    /// No background worker is attached, or a message could not be posted.
    Unavailable(String),
    /// The background worker crashed or disconnected while the request was pending.
    ContextFailure(String),
    /// The worker did not answer within the request timeout.
    Timeout { id: String, timeout: Duration },
    /// The client was torn down.
    Terminated,
    /// The worker answered with `PARSE_ERROR` or `ERROR`.
    Remote(String),
    /// The payload is malformed; raised by the calling-thread parser.
    Parse(ParseFailure),
    /// The worker answered with data that does not match the request.
    InvalidResponse(String),
}

impl DispatchError {
    /// True when the operation can be retried on the calling thread.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_)
                | Self::ContextFailure(_)
                | Self::Remote(_)
                | Self::InvalidResponse(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "worker unavailable: {message}"),
            Self::ContextFailure(message) => write!(f, "worker context error: {message}"),
            Self::Timeout { id, timeout } => write!(
                f,
                "request {id} timed out after {}ms",
                timeout.as_millis()
            ),
            Self::Terminated => write!(f, "dispatch client terminated"),
            Self::Remote(message) => write!(f, "worker error: {message}"),
            Self::Parse(failure) => write!(f, "parse error: {failure}"),
            Self::InvalidResponse(message) => write!(f, "invalid worker response: {message}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<ParseFailure> for DispatchError {
    fn from(failure: ParseFailure) -> Self {
        Self::Parse(failure)
    }
}
