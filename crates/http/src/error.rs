//! The client-visible error taxonomy.
//!
//! The wire layer keeps its own finer-grained [`ParseError`] and
//! [`SendError`] types (see [`crate::protocol`]); at the connection boundary
//! those collapse into this flat enum so callers and the retry policy can
//! classify failures by kind. Non-2xx statuses are never errors.

use std::io;

use thiserror::Error;

use crate::protocol::{ParseError, SendError};

/// Any failure a request can surface to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or non-absolute URL at request construction
    #[error("invalid uri: {reason}")]
    InvalidUri { reason: String },

    /// DNS failure or TCP connect refused/unreachable
    #[error("connect error: {source}")]
    Connect {
        #[source]
        source: io::Error,
    },

    /// TLS handshake or certificate verification failure
    #[error("tls error: {reason}")]
    Tls { reason: String },

    /// Socket write failure mid-exchange
    #[error("write error: {source}")]
    Write {
        #[source]
        source: io::Error,
    },

    /// Socket read failure mid-exchange
    #[error("read error: {source}")]
    Read {
        #[source]
        source: io::Error,
    },

    /// Malformed status line, headers or body framing
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// Unknown or broken content coding
    #[error("decode error: {reason}")]
    Decode { reason: String },

    /// A deadline expired, at any stage
    #[error("request timed out")]
    Timeout,

    /// The redirect budget was exhausted
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    /// A 401 persisted after every offered scheme, or the challenge was
    /// malformed
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    /// The client (and therefore its pool) has been closed
    #[error("client is closed")]
    PoolClosed,
}

impl Error {
    pub fn invalid_uri<S: ToString>(reason: S) -> Self {
        Self::InvalidUri { reason: reason.to_string() }
    }

    pub fn connect<E: Into<io::Error>>(e: E) -> Self {
        Self::Connect { source: e.into() }
    }

    pub fn tls<S: ToString>(reason: S) -> Self {
        Self::Tls { reason: reason.to_string() }
    }

    pub fn write<E: Into<io::Error>>(e: E) -> Self {
        Self::Write { source: e.into() }
    }

    pub fn read<E: Into<io::Error>>(e: E) -> Self {
        Self::Read { source: e.into() }
    }

    pub fn protocol<S: ToString>(reason: S) -> Self {
        Self::Protocol { reason: reason.to_string() }
    }

    pub fn decode<S: ToString>(reason: S) -> Self {
        Self::Decode { reason: reason.to_string() }
    }

    pub fn authentication<S: ToString>(reason: S) -> Self {
        Self::Authentication { reason: reason.to_string() }
    }

    /// Whether the retry policy may re-issue the request after this failure.
    ///
    /// Only transport-level failures qualify; protocol and policy failures
    /// would fail the same way again.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. } | Error::Read { .. } | Error::Write { .. } | Error::Timeout
        )
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Io { source } => Error::Read { source },
            ParseError::Decode { reason } => Error::Decode { reason },
            other => Error::Protocol { reason: other.to_string() },
        }
    }
}

impl From<SendError> for Error {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => Error::Write { source },
            other => Error::Protocol { reason: other.to_string() },
        }
    }
}
