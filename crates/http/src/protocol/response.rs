use bytes::Bytes;
use http::header::CONNECTION;
use http::{HeaderMap, Method, StatusCode, Version};

use crate::error::Error;
use crate::protocol::headers;
use crate::transport::BodyReader;
use crate::uri::RequestUri;

/// The parsed head of a response: status line and headers.
///
/// `http::Response` cannot carry the reason phrase, so the head is its own
/// type here; the phrase is part of the public response surface.
#[derive(Debug)]
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Whether the peer asked to close the connection after this exchange.
    pub fn connection_close(&self) -> bool {
        self.headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(headers::split_list)
            .any(|token| token.eq_ignore_ascii_case("close"))
    }
}

/// Back-reference from a response to the request that produced it, as it
/// looked after the last middleware mutation.
#[derive(Debug, Clone)]
pub struct ResponseSource {
    pub method: Method,
    pub uri: RequestUri,
}

#[derive(Debug)]
enum ResponseBody {
    Full(Bytes),
    Streaming(BodyReader),
}

/// One HTTP response.
///
/// Comes in two flavors: *materialized*, with the whole body buffered in
/// [`Response::content`], and *streaming*, where [`Response::chunk`] yields
/// body pieces lazily and the response owns its connection until the body is
/// exhausted or the response is dropped.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    reason: String,
    headers: HeaderMap,
    body: ResponseBody,
    source: ResponseSource,
}

impl Response {
    pub fn materialized(head: ResponseHead, content: Bytes, source: ResponseSource) -> Self {
        Self {
            status: head.status,
            reason: head.reason,
            headers: head.headers,
            body: ResponseBody::Full(content),
            source,
        }
    }

    pub fn streaming(head: ResponseHead, reader: BodyReader, source: ResponseSource) -> Self {
        Self {
            status: head.status,
            reason: head.reason,
            headers: head.headers,
            body: ResponseBody::Streaming(reader),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The status message from the wire, e.g. `OK`.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Method and URI of the request that produced this response.
    pub fn source(&self) -> &ResponseSource {
        &self.source
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Streaming(_))
    }

    /// The buffered body.
    ///
    /// # Panics
    ///
    /// Panics for a streaming response that has not been drained with
    /// [`Response::read_to_end`] yet.
    pub fn content(&self) -> &Bytes {
        match &self.body {
            ResponseBody::Full(bytes) => bytes,
            ResponseBody::Streaming(_) => {
                panic!("streaming response has no buffered content; drain it with read_to_end()")
            }
        }
    }

    /// Replaces the buffered body; used by the decode middleware after
    /// decompression.
    pub fn set_content(&mut self, content: Bytes) {
        self.body = ResponseBody::Full(content);
    }

    /// The body decoded as text. Bytes that are not valid UTF-8 are
    /// replaced, matching the charset-lenient behavior of browsers.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.content()).into_owned()
    }

    /// The body parsed as JSON.
    pub fn json(&self) -> Result<serde_json::Value, Error> {
        serde_json::from_slice(self.content()).map_err(Error::decode)
    }

    /// The next body chunk.
    ///
    /// For a streaming response this reads from the connection; for a
    /// materialized response the whole body is yielded once. `None` marks
    /// the end of the body.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match &mut self.body {
            ResponseBody::Full(bytes) => {
                if bytes.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(std::mem::take(bytes)))
                }
            }
            ResponseBody::Streaming(reader) => reader.chunk().await,
        }
    }

    /// Drains a streaming body into memory, turning this into a
    /// materialized response. No-op when already materialized.
    pub async fn read_to_end(&mut self) -> Result<&Bytes, Error> {
        if let ResponseBody::Streaming(reader) = &mut self.body {
            let mut content = bytes::BytesMut::new();
            while let Some(chunk) = reader.chunk().await? {
                content.extend_from_slice(&chunk);
            }
            self.body = ResponseBody::Full(content.freeze());
        }
        match &self.body {
            ResponseBody::Full(bytes) => Ok(bytes),
            ResponseBody::Streaming(_) => unreachable!(),
        }
    }

    /// Direct access to the streaming body, for callers that want the
    /// [`futures::Stream`] interface.
    pub fn stream_reader(&mut self) -> Option<&mut BodyReader> {
        match &mut self.body {
            ResponseBody::Streaming(reader) => Some(reader),
            ResponseBody::Full(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(status: u16) -> ResponseHead {
        ResponseHead {
            version: Version::HTTP_11,
            status: StatusCode::from_u16(status).unwrap(),
            reason: "OK".to_string(),
            headers: HeaderMap::new(),
        }
    }

    fn source() -> ResponseSource {
        ResponseSource { method: Method::GET, uri: RequestUri::parse("http://h/").unwrap() }
    }

    #[test]
    fn connection_close_detection() {
        let mut h = head(200);
        assert!(!h.connection_close());

        h.headers.insert(CONNECTION, "keep-alive".parse().unwrap());
        assert!(!h.connection_close());

        h.headers.insert(CONNECTION, "Close".parse().unwrap());
        assert!(h.connection_close());

        h.headers.insert(CONNECTION, "upgrade, close".parse().unwrap());
        assert!(h.connection_close());
    }

    #[tokio::test]
    async fn materialized_chunk_yields_once() {
        let mut resp = Response::materialized(head(200), Bytes::from_static(b"hello"), source());
        assert_eq!(resp.chunk().await.unwrap(), Some(Bytes::from_static(b"hello")));
        assert_eq!(resp.chunk().await.unwrap(), None);
    }

    #[test]
    fn json_body() {
        let resp = Response::materialized(head(200), Bytes::from_static(b"{\"a\":1}"), source());
        assert_eq!(resp.json().unwrap()["a"], 1);

        let resp = Response::materialized(head(200), Bytes::from_static(b"not json"), source());
        assert!(matches!(resp.json(), Err(Error::Decode { .. })));
    }
}
