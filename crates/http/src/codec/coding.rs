//! Content-coding decoders: gzip and deflate.
//!
//! The decoder works incrementally for streaming responses and over whole
//! buffers for materialized ones; both paths share the same write-side
//! flate2 machinery, fed through a `BytesMut`-backed `io::Write` sink.
//! Stacked codings (`Content-Encoding: deflate, gzip`) are undone right to
//! left. Servers disagree on whether `deflate` means a zlib stream or raw
//! deflate, so the first bytes are probed before a deflate stage commits.

use std::io::Write;

use bytes::{Bytes, BytesMut};
use flate2::write::{DeflateDecoder, GzDecoder, ZlibDecoder};
use http::header::CONTENT_ENCODING;
use http::HeaderMap;
use tracing::trace;

use crate::protocol::{headers, ParseError};

/// One recognized content coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    Gzip,
    Deflate,
    Identity,
}

/// Parses every `Content-Encoding` value into the list of applied codings,
/// in application order. Unknown codings fail decoding up front.
pub fn parse_codings(header_map: &HeaderMap) -> Result<Vec<Coding>, ParseError> {
    let mut codings = Vec::new();
    for value in header_map.get_all(CONTENT_ENCODING) {
        let text = value
            .to_str()
            .map_err(|_| ParseError::decode("content-encoding is not visible ascii"))?;
        for item in headers::split_list(text) {
            match item.to_ascii_lowercase().as_str() {
                "gzip" | "x-gzip" => codings.push(Coding::Gzip),
                "deflate" => codings.push(Coding::Deflate),
                "identity" => codings.push(Coding::Identity),
                other => {
                    return Err(ParseError::decode(format!("unknown content coding `{other}`")))
                }
            }
        }
    }
    Ok(codings)
}

/// A `BytesMut` sink for the write-side flate2 decoders.
struct Sink {
    buf: BytesMut,
}

impl Sink {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// One decompression stage.
enum Stage {
    Gzip(GzDecoder<Sink>),
    Zlib(ZlibDecoder<Sink>),
    Raw(DeflateDecoder<Sink>),
    /// A deflate stage that has not seen enough input to pick zlib vs raw
    DeflateProbe(Vec<u8>),
}

impl Stage {
    fn write(&mut self, data: &[u8]) -> Result<Bytes, ParseError> {
        if data.is_empty() {
            return Ok(Bytes::new());
        }
        match self {
            Stage::Gzip(decoder) => {
                decoder.write_all(data).map_err(|e| ParseError::decode(e.to_string()))?;
                decoder.flush().map_err(|e| ParseError::decode(e.to_string()))?;
                Ok(decoder.get_mut().take())
            }
            Stage::Zlib(decoder) => {
                decoder.write_all(data).map_err(|e| ParseError::decode(e.to_string()))?;
                decoder.flush().map_err(|e| ParseError::decode(e.to_string()))?;
                Ok(decoder.get_mut().take())
            }
            Stage::Raw(decoder) => {
                decoder.write_all(data).map_err(|e| ParseError::decode(e.to_string()))?;
                decoder.flush().map_err(|e| ParseError::decode(e.to_string()))?;
                Ok(decoder.get_mut().take())
            }
            Stage::DeflateProbe(pending) => {
                pending.extend_from_slice(data);
                if pending.len() < 2 {
                    return Ok(Bytes::new());
                }
                let buffered = std::mem::take(pending);
                let mut committed = if looks_like_zlib(&buffered) {
                    Stage::Zlib(ZlibDecoder::new(Sink::new()))
                } else {
                    Stage::Raw(DeflateDecoder::new(Sink::new()))
                };
                let out = committed.write(&buffered)?;
                *self = committed;
                Ok(out)
            }
        }
    }

    fn finish(self) -> Result<Bytes, ParseError> {
        match self {
            Stage::Gzip(decoder) => {
                let mut sink =
                    decoder.finish().map_err(|e| ParseError::decode(e.to_string()))?;
                Ok(sink.take())
            }
            Stage::Zlib(decoder) => {
                let mut sink =
                    decoder.finish().map_err(|e| ParseError::decode(e.to_string()))?;
                Ok(sink.take())
            }
            Stage::Raw(decoder) => {
                let mut sink =
                    decoder.finish().map_err(|e| ParseError::decode(e.to_string()))?;
                Ok(sink.take())
            }
            Stage::DeflateProbe(pending) if pending.is_empty() => Ok(Bytes::new()),
            Stage::DeflateProbe(_) => Err(ParseError::decode("truncated deflate stream")),
        }
    }
}

/// zlib header: CM=8, CINFO<=7, and the two bytes are a multiple of 31.
fn looks_like_zlib(data: &[u8]) -> bool {
    data.len() >= 2
        && data[0] & 0x0f == 8
        && data[0] >> 4 <= 7
        && (u16::from(data[0]) << 8 | u16::from(data[1])) % 31 == 0
}

/// Undoes a stack of content codings incrementally.
pub struct ContentDecoder {
    stages: Vec<Stage>,
}

impl ContentDecoder {
    /// Builds the decode pipeline for codings listed in application order;
    /// decoding runs in the reverse order. Identity stages are dropped.
    pub fn new(codings: &[Coding]) -> Self {
        let stages = codings
            .iter()
            .rev()
            .filter_map(|coding| match coding {
                Coding::Gzip => Some(Stage::Gzip(GzDecoder::new(Sink::new()))),
                Coding::Deflate => Some(Stage::DeflateProbe(Vec::new())),
                Coding::Identity => None,
            })
            .collect();
        Self { stages }
    }

    /// Builds a decoder from response headers; `None` when the body is not
    /// encoded.
    pub fn from_headers(header_map: &HeaderMap) -> Result<Option<Self>, ParseError> {
        let codings = parse_codings(header_map)?;
        let decoder = Self::new(&codings);
        if decoder.is_identity() {
            return Ok(None);
        }
        trace!(?codings, "response body is content-encoded");
        Ok(Some(decoder))
    }

    pub fn is_identity(&self) -> bool {
        self.stages.is_empty()
    }

    /// Pushes compressed input through the pipeline, returning whatever
    /// decoded output is available so far (possibly empty).
    pub fn write(&mut self, data: &[u8]) -> Result<Bytes, ParseError> {
        if self.stages.is_empty() {
            return Ok(Bytes::copy_from_slice(data));
        }
        let mut carry = Bytes::copy_from_slice(data);
        for stage in self.stages.iter_mut() {
            carry = stage.write(&carry)?;
            if carry.is_empty() {
                break;
            }
        }
        Ok(carry)
    }

    /// Flushes the pipeline at end of body and validates stream trailers.
    pub fn finish(&mut self) -> Result<Bytes, ParseError> {
        let mut tail: Vec<u8> = Vec::new();
        let stages = std::mem::take(&mut self.stages);
        let mut remaining = stages.into_iter();

        while let Some(mut stage) = remaining.next() {
            let mut produced = BytesMut::new();
            if !tail.is_empty() {
                produced.extend_from_slice(&stage.write(&tail)?);
            }
            produced.extend_from_slice(&stage.finish()?);
            tail = produced.to_vec();
        }
        Ok(Bytes::from(tail))
    }

    /// Decodes a whole buffered body at once.
    pub fn decode_all(codings: &[Coding], content: &[u8]) -> Result<Bytes, ParseError> {
        let mut decoder = Self::new(codings);
        if decoder.is_identity() {
            return Ok(Bytes::copy_from_slice(content));
        }
        let mut out = BytesMut::new();
        out.extend_from_slice(&decoder.write(content)?);
        out.extend_from_slice(&decoder.finish()?);
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use http::HeaderValue;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn raw_deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn parses_codings() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("deflate, gzip"));
        assert_eq!(parse_codings(&headers).unwrap(), vec![Coding::Deflate, Coding::Gzip]);

        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("br"));
        assert!(matches!(parse_codings(&headers), Err(ParseError::Decode { .. })));
    }

    #[test]
    fn gzip_round_trip() {
        let body = b"The quick brown fox jumps over the lazy dog".repeat(50);
        let decoded = ContentDecoder::decode_all(&[Coding::Gzip], &gzip(&body)).unwrap();
        assert_eq!(decoded.as_ref(), &body[..]);
    }

    #[test]
    fn zlib_deflate_round_trip() {
        let body = b"zlib-wrapped deflate data".repeat(20);
        let decoded = ContentDecoder::decode_all(&[Coding::Deflate], &zlib(&body)).unwrap();
        assert_eq!(decoded.as_ref(), &body[..]);
    }

    #[test]
    fn raw_deflate_round_trip() {
        let body = b"raw deflate data without a zlib wrapper".repeat(20);
        let decoded = ContentDecoder::decode_all(&[Coding::Deflate], &raw_deflate(&body)).unwrap();
        assert_eq!(decoded.as_ref(), &body[..]);
    }

    #[test]
    fn stacked_codings_decode_right_to_left() {
        let body = b"stacked";
        let wire = gzip(&zlib(body));
        let decoded =
            ContentDecoder::decode_all(&[Coding::Deflate, Coding::Gzip], &wire).unwrap();
        assert_eq!(decoded.as_ref(), body);
    }

    #[test]
    fn incremental_decode_is_split_independent() {
        let body = b"chunk boundary independence, hopefully".repeat(100);
        let wire = gzip(&body);

        for split in [1usize, 2, 3, 7, wire.len() / 2, wire.len() - 1] {
            let mut decoder = ContentDecoder::new(&[Coding::Gzip]);
            let mut out = Vec::new();
            for piece in wire.chunks(split) {
                out.extend_from_slice(&decoder.write(piece).unwrap());
            }
            out.extend_from_slice(&decoder.finish().unwrap());
            assert_eq!(out, body, "failed at split {split}");
        }
    }

    #[test]
    fn truncated_gzip_fails() {
        let body = b"will be cut short".repeat(10);
        let wire = gzip(&body);
        let mut decoder = ContentDecoder::new(&[Coding::Gzip]);
        let _ = decoder.write(&wire[..wire.len() / 2]);
        assert!(decoder.finish().is_err());
    }

    #[test]
    fn identity_passes_through() {
        let decoded = ContentDecoder::decode_all(&[Coding::Identity], b"plain").unwrap();
        assert_eq!(decoded.as_ref(), b"plain");

        let mut headers = HeaderMap::new();
        assert!(ContentDecoder::from_headers(&headers).unwrap().is_none());
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("identity"));
        assert!(ContentDecoder::from_headers(&headers).unwrap().is_none());
    }
}
