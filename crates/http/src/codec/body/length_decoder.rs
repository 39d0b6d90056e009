//! Decoder for `Content-Length` delimited bodies.

use std::cmp;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Counts down a fixed number of body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let take = cmp::min(self.remaining, src.len() as u64) as usize;
        let bytes = src.split_to(take).freeze();
        self.remaining -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_length() {
        let mut src = BytesMut::from(&b"0123456789extra"[..]);
        let mut decoder = LengthDecoder::new(10);

        let item = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap().as_ref(), b"0123456789");

        assert!(decoder.decode(&mut src).unwrap().unwrap().is_eof());
        assert_eq!(&src[..], b"extra");
    }

    #[test]
    fn zero_length_is_immediately_eof() {
        let mut src = BytesMut::new();
        let mut decoder = LengthDecoder::new(0);
        assert!(decoder.decode(&mut src).unwrap().unwrap().is_eof());
    }

    #[test]
    fn partial_delivery() {
        let mut src = BytesMut::from(&b"01234"[..]);
        let mut decoder = LengthDecoder::new(10);

        let item = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap().len(), 5);
        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(b"56789");
        let item = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap().as_ref(), b"56789");
        assert!(decoder.decode(&mut src).unwrap().unwrap().is_eof());
    }
}
