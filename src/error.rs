//! Error taxonomy for API calls.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Copyable tag for matching on an [`Error`] without borrowing its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    ServiceUnavailable,
    RateLimited,
    Ambiguous,
    MalformedResponse,
    RemoteError,
    InvalidParameter,
    Transport,
    Build,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("request timed out (url: {url})")]
    Timeout { url: String },

    /// The gateway in front of the API answered instead of the API itself.
    #[error("service unavailable, status {status} (url: {url})")]
    ServiceUnavailable { status: u16, url: String },

    #[error("rate limit exceeded (url: {url})")]
    RateLimited { url: String },

    /// Server accepted the request but could not confirm it was processed
    /// within its own deadline.
    #[error("request accepted but not confirmed by the server (url: {url})")]
    Ambiguous { url: String },

    #[error("malformed response: {message} (url: {url})")]
    MalformedResponse { url: String, message: String },

    #[error("{message} (status {status}, url: {url})")]
    RemoteError {
        status: u16,
        message: String,
        url: String,
    },

    #[error("invalid parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("{source} (url: {url})")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl Error {
    pub(crate) fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Ambiguous { .. } => ErrorKind::Ambiguous,
            Error::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Error::RemoteError { .. } => ErrorKind::RemoteError,
            Error::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Build(_) => ErrorKind::Build,
        }
    }

    /// HTTP status of the response that produced this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ServiceUnavailable { status, .. } | Error::RemoteError { status, .. } => {
                Some(*status)
            }
            Error::RateLimited { .. } => Some(429),
            Error::Ambiguous { .. } => Some(202),
            Error::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Error::Timeout { url }
            | Error::ServiceUnavailable { url, .. }
            | Error::RateLimited { url }
            | Error::Ambiguous { url }
            | Error::MalformedResponse { url, .. }
            | Error::RemoteError { url, .. }
            | Error::Transport { url, .. } => Some(url),
            Error::InvalidParameter { .. } | Error::Build(_) => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// True when the caller cannot tell whether the request took effect.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Ambiguous { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_expose_status_and_url() {
        let e = Error::ServiceUnavailable {
            status: 521,
            url: "https://api/x".into(),
        };
        assert_eq!(e.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(e.status(), Some(521));
        assert_eq!(e.url(), Some("https://api/x"));
        assert!(!e.is_indeterminate());

        let p = Error::invalid_parameter("gameId", "missing value");
        assert_eq!(p.kind(), ErrorKind::InvalidParameter);
        assert_eq!(p.url(), None);
        assert_eq!(p.to_string(), "invalid parameter gameId: missing value");
    }

    #[test]
    fn timeout_and_ambiguous_are_indeterminate() {
        let t = Error::Timeout { url: "u".into() };
        let a = Error::Ambiguous { url: "u".into() };
        assert!(t.is_indeterminate());
        assert!(a.is_indeterminate());
        assert_ne!(t.kind(), a.kind());
        assert!(!a.is_rate_limited());
    }
}
