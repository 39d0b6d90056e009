//! Body framing: encoders for outgoing request payloads and decoders for
//! the three ways a response body can be delimited.
//!
//! - [`ChunkedDecoder`] / [`ChunkedEncoder`]: chunked transfer coding
//!   (RFC 9112 §7.1)
//! - [`LengthDecoder`] / [`LengthEncoder`]: `Content-Length` delimited
//! - [`UntilCloseDecoder`]: responses without framing, read until the peer
//!   closes the connection
//! - [`PayloadDecoder`] / [`PayloadEncoder`]: strategy dispatch over the
//!   above

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;
mod until_close_decoder;

pub(crate) use chunked_decoder::ChunkedDecoder;
pub(crate) use length_decoder::LengthDecoder;
pub(crate) use until_close_decoder::UntilCloseDecoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
