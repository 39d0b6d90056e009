//! Connection handling: the plain/TLS byte stream and the single-exchange
//! round-trip driver.
//!
//! A [`HttpConnection`] wraps one [`TransportStream`] in a
//! `tokio_util::codec::Framed` with the HTTP/1.1 codec and carries one
//! request/response exchange at a time. After a clean, self-delimiting
//! exchange it reports itself reusable and can go back to the pool.

mod http_connection;
mod stream;

pub use http_connection::HttpConnection;
pub use stream::{connect, TlsSettings, TransportStream};
