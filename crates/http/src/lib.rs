//! HTTP/1.1 wire protocol for the `strand` client.
//!
//! This crate implements everything below the middleware layer:
//!
//! - [`uri`]: the absolute http(s) URI model and the `(scheme, host, port)`
//!   connection key
//! - [`protocol`]: request/response value types and the wire-message
//!   vocabulary shared by the codec and the connection
//! - [`codec`]: request serialization and response parsing as
//!   [`tokio_util::codec`] implementations, including chunked transfer
//!   framing and gzip/deflate content decoding
//! - [`connection`]: a plain-TCP or TLS byte stream driving one
//!   request/response exchange at a time
//! - [`pool`]: per-client idle connection reuse
//! - [`transport`]: the end-to-end round trip, producing either a fully
//!   buffered or a streaming response

pub mod codec;
pub mod connection;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod transport;
pub mod uri;

pub use error::Error;
pub use protocol::{Body, Credentials, Request, Response};
pub use uri::{ConnectionKey, RequestUri, Scheme};

pub(crate) use help::ensure;

mod help {

    macro_rules! ensure {
        ($predicate:expr, $error:expr) => {
            if !$predicate {
                return Err($error);
            }
        };
    }
    pub(crate) use ensure;
}
