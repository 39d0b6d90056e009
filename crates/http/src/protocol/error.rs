//! Wire-level error types.
//!
//! [`ParseError`] covers everything that can go wrong while reading a
//! response from the socket; [`SendError`] covers request serialization and
//! writing. Both collapse into the public [`crate::Error`] taxonomy at the
//! connection boundary.

use std::io;

use thiserror::Error;

/// Errors raised while parsing a response.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Head section exceeds the maximum allowed size
    #[error("response head too large, current: {current_size} exceeds the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    /// Number of header fields exceeds the maximum allowed
    #[error("header count exceeds the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    /// Malformed status line
    #[error("invalid status line: {reason}")]
    InvalidStatusLine { reason: String },

    /// Invalid header field format or content
    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    /// Unsupported HTTP version in the status line
    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    /// Invalid or conflicting Content-Length headers
    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    /// Malformed chunked transfer framing
    #[error("invalid chunked framing: {reason}")]
    InvalidChunk { reason: String },

    /// The peer closed the connection mid-message
    #[error("connection closed before the message was complete")]
    UnexpectedEof,

    /// Unknown or broken content coding
    #[error("content decode failed: {reason}")]
    Decode { reason: String },

    /// I/O error during parsing
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_status_line<S: ToString>(reason: S) -> Self {
        Self::InvalidStatusLine { reason: reason.to_string() }
    }

    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(reason: S) -> Self {
        Self::InvalidChunk { reason: reason.to_string() }
    }

    pub fn decode<S: ToString>(reason: S) -> Self {
        Self::Decode { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Errors raised while serializing and sending a request.
#[derive(Error, Debug)]
pub enum SendError {
    /// The request body did not match the declared framing
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    /// I/O error during sending
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
