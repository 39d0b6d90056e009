//! Decoder for chunked transfer coding.
//!
//! Consumes `<hex-size>[;ext]CRLF` framed chunks until the zero-sized final
//! chunk, then skips optional trailer fields and the terminating CRLF.
//! Framing is strict: bare LF is not accepted inside chunk delimiters.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

/// A streaming decoder for chunked transfer coding.
///
/// Data chunks are yielded as they become available; a chunk split across
/// reads is yielded in pieces. After the final chunk the decoder reports
/// [`PayloadItem::Eof`] and stays in that state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    /// Bytes left in the chunk currently being read
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Accumulating hex digits of the chunk size
    Size,
    /// Whitespace between the size and extension/CRLF
    SizeWs,
    /// Skipping a chunk extension up to CR
    Extension,
    /// Expecting the LF that ends the size line
    SizeLf,
    /// Reading chunk data
    Data,
    /// Expecting CR after chunk data
    DataCr,
    /// Expecting LF after chunk data
    DataLf,
    /// First byte of a line after the zero chunk: CR ends the message,
    /// anything else starts a trailer field
    MaybeTrailer,
    /// Skipping a trailer field up to CR
    TrailerData,
    /// Expecting the LF that ends a trailer field
    TrailerLf,
    /// Expecting the final LF
    FinalLf,
    /// Message complete
    Done,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, remaining: 0 }
    }

    /// Consumes one delimiter byte and returns the next state.
    fn step(&mut self, byte: u8) -> Result<State, ParseError> {
        match self.state {
            State::Size => match byte {
                b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' => {
                    let digit = (byte as char).to_digit(16).unwrap_or(0) as u64;
                    self.remaining = self
                        .remaining
                        .checked_mul(16)
                        .and_then(|v| v.checked_add(digit))
                        .ok_or_else(|| ParseError::invalid_chunk("chunk size overflow"))?;
                    Ok(State::Size)
                }
                b'\t' | b' ' => Ok(State::SizeWs),
                b';' => Ok(State::Extension),
                b'\r' => Ok(State::SizeLf),
                _ => Err(ParseError::invalid_chunk("invalid character in chunk size")),
            },
            State::SizeWs => match byte {
                b'\t' | b' ' => Ok(State::SizeWs),
                b';' => Ok(State::Extension),
                b'\r' => Ok(State::SizeLf),
                _ => Err(ParseError::invalid_chunk("invalid character after chunk size")),
            },
            // extensions are ignored but a bare LF inside one is rejected
            State::Extension => match byte {
                b'\r' => Ok(State::SizeLf),
                b'\n' => Err(ParseError::invalid_chunk("bare LF in chunk extension")),
                _ => Ok(State::Extension),
            },
            State::SizeLf => match byte {
                b'\n' if self.remaining == 0 => Ok(State::MaybeTrailer),
                b'\n' => Ok(State::Data),
                _ => Err(ParseError::invalid_chunk("missing LF after chunk size")),
            },
            State::DataCr => match byte {
                b'\r' => Ok(State::DataLf),
                _ => Err(ParseError::invalid_chunk("missing CR after chunk data")),
            },
            State::DataLf => match byte {
                b'\n' => Ok(State::Size),
                _ => Err(ParseError::invalid_chunk("missing LF after chunk data")),
            },
            State::MaybeTrailer => match byte {
                b'\r' => Ok(State::FinalLf),
                _ => Ok(State::TrailerData),
            },
            State::TrailerData => match byte {
                b'\r' => Ok(State::TrailerLf),
                _ => Ok(State::TrailerData),
            },
            State::TrailerLf => match byte {
                b'\n' => Ok(State::MaybeTrailer),
                _ => Err(ParseError::invalid_chunk("missing LF after trailer field")),
            },
            State::FinalLf => match byte {
                b'\n' => Ok(State::Done),
                _ => Err(ParseError::invalid_chunk("missing final LF")),
            },
            State::Data | State::Done => unreachable!("data and done are handled in decode"),
        }
    }

    fn read_data(&mut self, src: &mut BytesMut) -> Option<Bytes> {
        if src.is_empty() || self.remaining == 0 {
            return None;
        }
        let take = src.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        self.remaining -= take as u64;
        if self.remaining == 0 {
            self.state = State::DataCr;
        }
        Some(src.split_to(take).freeze())
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Done => {
                    trace!("chunked body complete");
                    return Ok(Some(PayloadItem::Eof));
                }
                State::Data => {
                    return match self.read_data(src) {
                        Some(bytes) => {
                            trace!(len = bytes.len(), "decoded chunk data");
                            Ok(Some(PayloadItem::Chunk(bytes)))
                        }
                        None => Ok(None),
                    };
                }
                _ => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let byte = src.get_u8();
                    self.state = self.step(byte)?;
                }
            }
        }
    }
}
