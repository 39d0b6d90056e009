//! The combined HTTP/1.1 client codec.
//!
//! One [`Http1Codec`] drives both directions of a single exchange on a
//! `tokio_util::codec::Framed` stream: it encodes a request head followed by
//! payload items, and decodes a response head followed by payload items.
//! Interim 1xx responses are consumed and discarded. Call
//! [`Http1Codec::prepare`] before each exchange.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::body::{PayloadDecoder, PayloadEncoder};
use crate::codec::header::{body_framing, HeaderDecoder, HeaderEncoder};
use crate::protocol::{
    BodyFraming, Message, ParseError, PayloadSize, RequestHead, ResponseHead, SendError,
};

pub struct Http1Codec {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
    payload_decoder: Option<PayloadDecoder>,
    /// The current exchange is for a HEAD request: the response never has a
    /// body regardless of its headers.
    head_request: bool,
}

impl Http1Codec {
    pub fn new() -> Self {
        Default::default()
    }

    /// Resets per-exchange state. Must be called before sending a request.
    pub fn prepare(&mut self, head_request: bool) {
        self.payload_encoder = None;
        self.payload_decoder = None;
        self.head_request = head_request;
    }
}

impl Default for Http1Codec {
    fn default() -> Self {
        Self {
            header_encoder: HeaderEncoder,
            payload_encoder: None,
            payload_decoder: None,
            head_request: false,
        }
    }
}

impl Encoder<Message<(RequestHead, PayloadSize)>> for Http1Codec {
    type Error = SendError;

    fn encode(
        &mut self,
        item: Message<(RequestHead, PayloadSize)>,
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        match item {
            Message::Head((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    return Err(SendError::invalid_body(
                        "request head sent while the previous body is unfinished",
                    ));
                }
                self.payload_encoder = Some(PayloadEncoder::from(payload_size));
                self.header_encoder.encode((head, payload_size), dst)
            }
            Message::Payload(item) => {
                let encoder = self
                    .payload_encoder
                    .as_mut()
                    .ok_or_else(|| SendError::invalid_body("payload sent before request head"))?;

                let result = encoder.encode(item, dst);
                if encoder.is_finished() {
                    self.payload_encoder.take();
                }
                result
            }
        }
    }
}

impl Decoder for Http1Codec {
    type Item = Message<(ResponseHead, BodyFraming)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if let Some(payload_decoder) = &mut self.payload_decoder {
                return Ok(payload_decoder.decode(src)?.map(Message::Payload));
            }

            match HeaderDecoder.decode(src)? {
                Some(head) if head.status.is_informational() => {
                    // 100 Continue and friends: not the real response
                    trace!(status = %head.status, "skipping interim response");
                    continue;
                }
                Some(head) => {
                    let framing = body_framing(self.head_request, &head)?;
                    self.payload_decoder = Some(PayloadDecoder::from(framing));
                    return Ok(Some(Message::Head((head, framing))));
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.payload_decoder {
            Some(payload_decoder) => Ok(payload_decoder.decode_end(src)?.map(Message::Payload)),
            // EOF between exchanges is a clean close; EOF mid-head is not
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};

    fn request_head() -> RequestHead {
        RequestHead {
            method: Method::POST,
            target: "/submit".to_string(),
            host: "example.com".to_string(),
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn encodes_full_request() {
        let mut codec = Http1Codec::new();
        codec.prepare(false);
        let mut dst = BytesMut::new();

        codec.encode(Message::Head((request_head(), PayloadSize::Length(5))), &mut dst).unwrap();
        codec.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello"))), &mut dst).unwrap();
        codec.encode(Message::Payload(PayloadItem::Eof), &mut dst).unwrap();

        let wire = String::from_utf8(dst.to_vec()).unwrap();
        assert!(wire.starts_with("POST /submit HTTP/1.1\r\nhost: example.com\r\n"));
        assert!(wire.contains("content-length: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn payload_before_head_is_rejected() {
        let mut codec = Http1Codec::new();
        codec.prepare(false);
        let mut dst = BytesMut::new();
        let result =
            codec.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"x"))), &mut dst);
        assert!(result.is_err());
    }

    #[test]
    fn decodes_head_then_payload() {
        let mut codec = Http1Codec::new();
        codec.prepare(false);
        let mut src = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nHello");

        let head = match codec.decode(&mut src).unwrap().unwrap() {
            Message::Head((head, framing)) => {
                assert_eq!(framing, BodyFraming::Length(5));
                head
            }
            _ => panic!("expected head"),
        };
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.reason, "OK");

        match codec.decode(&mut src).unwrap().unwrap() {
            Message::Payload(PayloadItem::Chunk(bytes)) => assert_eq!(bytes.as_ref(), b"Hello"),
            _ => panic!("expected chunk"),
        }
        match codec.decode(&mut src).unwrap().unwrap() {
            Message::Payload(PayloadItem::Eof) => {}
            _ => panic!("expected eof"),
        }
    }

    #[test]
    fn interim_continue_is_skipped() {
        let mut codec = Http1Codec::new();
        codec.prepare(false);
        let mut src = BytesMut::from(
            "HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nHi",
        );

        match codec.decode(&mut src).unwrap().unwrap() {
            Message::Head((head, _)) => assert_eq!(head.status, StatusCode::OK),
            _ => panic!("expected the real head"),
        }
    }

    #[test]
    fn head_request_suppresses_body() {
        let mut codec = Http1Codec::new();
        codec.prepare(true);
        let mut src = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n");

        match codec.decode(&mut src).unwrap().unwrap() {
            Message::Head((_, framing)) => assert_eq!(framing, BodyFraming::None),
            _ => panic!("expected head"),
        }
        match codec.decode(&mut src).unwrap().unwrap() {
            Message::Payload(PayloadItem::Eof) => {}
            _ => panic!("expected immediate eof"),
        }
    }

    #[test]
    fn eof_mid_head_is_an_error() {
        let mut codec = Http1Codec::new();
        codec.prepare(false);
        let mut src = BytesMut::from("HTTP/1.1 200 O");
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert!(matches!(codec.decode_eof(&mut src), Err(ParseError::UnexpectedEof)));
    }

    #[test]
    fn eof_terminates_unframed_body() {
        let mut codec = Http1Codec::new();
        codec.prepare(false);
        let mut src = BytesMut::from("HTTP/1.1 200 OK\r\n\r\npartial body");

        match codec.decode(&mut src).unwrap().unwrap() {
            Message::Head((_, framing)) => assert_eq!(framing, BodyFraming::UntilClose),
            _ => panic!("expected head"),
        }
        match codec.decode(&mut src).unwrap().unwrap() {
            Message::Payload(PayloadItem::Chunk(bytes)) => {
                assert_eq!(bytes.as_ref(), b"partial body")
            }
            _ => panic!("expected chunk"),
        }
        assert!(codec.decode(&mut src).unwrap().is_none());

        match codec.decode_eof(&mut src).unwrap().unwrap() {
            Message::Payload(PayloadItem::Eof) => {}
            _ => panic!("expected eof after close"),
        }
    }
}
