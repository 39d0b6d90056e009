//! Head section codec: serializing request heads and parsing response heads.

mod header_decoder;
mod header_encoder;

pub use header_decoder::body_framing;
pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
