//! Decoder for responses without any body framing.
//!
//! When a response carries neither `Content-Length` nor chunked coding, the
//! body is everything up to the connection close. The end of the body is
//! only discovered through `decode_eof`, which the payload dispatcher calls
//! when the underlying stream reaches EOF.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UntilCloseDecoder {
    finished: bool,
}

impl UntilCloseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the stream hit EOF: drains the remainder, then reports
    /// the end of the body.
    pub fn decode_end(&mut self, src: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        if !src.is_empty() {
            return Ok(Some(PayloadItem::Chunk(src.split().freeze())));
        }
        if self.finished {
            return Ok(None);
        }
        self.finished = true;
        Ok(Some(PayloadItem::Eof))
    }
}

impl Decoder for UntilCloseDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            return Ok(Some(PayloadItem::Eof));
        }
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(PayloadItem::Chunk(src.split().freeze())))
    }
}
