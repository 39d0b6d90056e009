//! Encoder for `Content-Length` delimited request bodies.

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::protocol::{PayloadItem, SendError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
    saw_eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length, saw_eof: false }
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0 && self.saw_eof
    }
}

impl Encoder<PayloadItem> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if bytes.is_empty() {
                    return Ok(());
                }
                if (bytes.len() as u64) > self.remaining {
                    warn!(
                        len = bytes.len(),
                        remaining = self.remaining,
                        "body chunk exceeds declared content-length"
                    );
                    return Err(SendError::invalid_body("body longer than declared content-length"));
                }
                self.remaining -= bytes.len() as u64;
                dst.extend_from_slice(&bytes);
                Ok(())
            }
            PayloadItem::Eof => {
                if self.remaining != 0 {
                    return Err(SendError::invalid_body(format!(
                        "body ended {} bytes short of declared content-length",
                        self.remaining
                    )));
                }
                self.saw_eof = true;
                Ok(())
            }
        }
    }
}
