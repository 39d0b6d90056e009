//! The HTTP/1.1 wire codec.
//!
//! Built on [`tokio_util::codec`]: [`Http1Codec`] encodes request heads and
//! payload items and decodes response heads and payload items, delegating
//! body framing to the [`body`] module and head handling to [`header`].
//! Content codings (gzip/deflate) are undone by [`coding`], either
//! incrementally for streaming bodies or over whole buffers.

pub mod body;
pub mod coding;
pub mod header;

mod http1;
pub use http1::Http1Codec;
