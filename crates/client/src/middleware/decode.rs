//! Content decoding for materialized responses.

use async_trait::async_trait;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use strand_http::codec::coding::{parse_codings, Coding, ContentDecoder};
use strand_http::protocol::headers::accept_encoding_value;
use strand_http::{Error, Request, Response};
use tracing::trace;

use crate::middleware::{Middleware, Next};

/// Advertises the supported codings and undoes them on buffered responses.
///
/// The default `Accept-Encoding` is only added when the caller has not set
/// one. Materialized responses are decompressed in place and lose their
/// `Content-Encoding`/`Content-Length` headers; streaming responses pass
/// through untouched because the wire codec already decodes them on the
/// fly.
#[derive(Default)]
pub struct DecodeMiddleware;

impl DecodeMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for DecodeMiddleware {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error> {
        if !request.headers.contains_key(ACCEPT_ENCODING) {
            request.headers.insert(ACCEPT_ENCODING, accept_encoding_value());
        }

        let mut response = next.run(request).await?;
        if response.is_streaming() {
            return Ok(response);
        }

        let codings = parse_codings(response.headers())?;
        if codings.iter().all(|coding| *coding == Coding::Identity) {
            return Ok(response);
        }

        trace!(?codings, "decoding response content");
        let decoded = ContentDecoder::decode_all(&codings, response.content())?;
        response.set_content(decoded);
        response.headers_mut().remove(CONTENT_ENCODING);
        response.headers_mut().remove(CONTENT_LENGTH);
        Ok(response)
    }
}
