//! Request head serialization.
//!
//! Emits `METHOD SP request-target SP HTTP/1.1 CRLF`, the mandatory `Host`
//! field, the caller's headers, and the framing header derived from the
//! payload size. `Content-Length` and `Transfer-Encoding` are owned by the
//! encoder; stale values in the header map are replaced.

use bytes::{BufMut, BytesMut};
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use tokio_util::codec::Encoder;

use crate::protocol::{PayloadSize, RequestHead, SendError};

const INIT_HEAD_SIZE: usize = 4 * 1024;

pub struct HeaderEncoder;

impl Encoder<(RequestHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(
        &mut self,
        item: (RequestHead, PayloadSize),
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        dst.reserve(INIT_HEAD_SIZE);
        dst.put_slice(head.method.as_str().as_bytes());
        dst.put_slice(b" ");
        dst.put_slice(head.target.as_bytes());
        dst.put_slice(b" HTTP/1.1\r\n");

        dst.put_slice(b"host: ");
        dst.put_slice(head.host.as_bytes());
        dst.put_slice(b"\r\n");
        head.headers.remove(HOST);

        match payload_size {
            PayloadSize::Length(n) => {
                head.headers.insert(CONTENT_LENGTH, n.into());
                head.headers.remove(TRANSFER_ENCODING);
            }
            PayloadSize::Chunked => {
                head.headers.insert(TRANSFER_ENCODING, http::HeaderValue::from_static("chunked"));
                head.headers.remove(CONTENT_LENGTH);
            }
            PayloadSize::Empty => {
                head.headers.remove(CONTENT_LENGTH);
                head.headers.remove(TRANSFER_ENCODING);
            }
        }

        for (name, value) in head.headers.iter() {
            dst.put_slice(name.as_str().as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
