//! Response head parsing.
//!
//! `httparse` does the line-level work (it tolerates bare-LF line endings
//! and rejects obsolete folded continuations); this module turns its output
//! into a [`ResponseHead`] and decides how the body that follows is framed.

use bytes::{Buf, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Version};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{headers, BodyFraming, ParseError, ResponseHead};

const MAX_HEADER_NUM: usize = 64;
const MAX_HEADER_BYTES: usize = 8 * 1024;

pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = ResponseHead;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut parsed_headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut response = httparse::Response::new(&mut parsed_headers);

        let parse_result = response.parse(src).map_err(|e| match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            httparse::Error::Status => ParseError::invalid_status_line(e.to_string()),
            httparse::Error::Version => ParseError::invalid_status_line(e.to_string()),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let head_len = match parse_result {
            Status::Complete(head_len) => head_len,
            Status::Partial => {
                ensure!(
                    src.len() <= MAX_HEADER_BYTES,
                    ParseError::too_large_header(src.len(), MAX_HEADER_BYTES)
                );
                return Ok(None);
            }
        };
        ensure!(
            head_len <= MAX_HEADER_BYTES,
            ParseError::too_large_header(head_len, MAX_HEADER_BYTES)
        );
        trace!(head_len, "parsed response head");

        let version = match response.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            v => return Err(ParseError::InvalidVersion(v)),
        };

        let status = response
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| ParseError::invalid_status_line("status code out of range"))?;

        let reason = response.reason.unwrap_or_default().to_string();

        let mut header_map = HeaderMap::with_capacity(response.headers.len());
        for header in response.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| ParseError::invalid_header(e.to_string()))?;
            let value = HeaderValue::from_bytes(header.value)
                .map_err(|e| ParseError::invalid_header(e.to_string()))?;
            header_map.append(name, value);
        }

        src.advance(head_len);

        Ok(Some(ResponseHead { version, status, reason, headers: header_map }))
    }
}

/// Selects the body framing for a response head, in spec order: statuses
/// that never carry a body, then chunked, then `Content-Length`, then
/// read-until-close.
pub fn body_framing(head_request: bool, head: &ResponseHead) -> Result<BodyFraming, ParseError> {
    if head_request
        || head.status.is_informational()
        || head.status == StatusCode::NO_CONTENT
        || head.status == StatusCode::NOT_MODIFIED
    {
        return Ok(BodyFraming::None);
    }

    if is_chunked(&head.headers) {
        return Ok(BodyFraming::Chunked);
    }

    match content_length(&head.headers)? {
        Some(n) => Ok(BodyFraming::Length(n)),
        None => Ok(BodyFraming::UntilClose),
    }
}

/// Chunked applies only when it is the final transfer coding.
fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get(TRANSFER_ENCODING)
        .and_then(|value| value.to_str().ok())
        .and_then(|codings| codings.rsplit(',').next())
        .map(|last| last.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

/// Multiple `Content-Length` headers are tolerated only when they agree.
fn content_length(headers: &HeaderMap) -> Result<Option<u64>, ParseError> {
    let mut result: Option<u64> = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let text = value
            .to_str()
            .map_err(|_| ParseError::invalid_content_length("not visible ascii"))?;
        for item in headers::split_list(text) {
            let parsed = item.trim().parse::<u64>().map_err(|_| {
                ParseError::invalid_content_length(format!("`{item}` is not a length"))
            })?;
            match result {
                Some(existing) if existing != parsed => {
                    return Err(ParseError::invalid_content_length(format!(
                        "conflicting values {existing} and {parsed}"
                    )));
                }
                _ => result = Some(parsed),
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decode(wire: &str) -> Result<Option<ResponseHead>, ParseError> {
        let mut src = BytesMut::from(wire);
        HeaderDecoder.decode(&mut src)
    }

    #[test]
    fn simple_response() {
        let head = decode("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n").unwrap().unwrap();
        assert_eq!(head.version, Version::HTTP_11);
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.reason, "OK");
        assert_eq!(head.headers.get(CONTENT_LENGTH).unwrap(), "5");
    }

    #[test]
    fn leaves_body_bytes_in_buffer() {
        let mut src = BytesMut::from("HTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\nabc");
        let head = HeaderDecoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(&src[..], b"abc");
    }

    #[test]
    fn partial_head_needs_more() {
        assert!(decode("HTTP/1.1 200 OK\r\nContent-Le").unwrap().is_none());
    }

    #[test]
    fn multi_line_realistic_head() {
        let wire = indoc! {"
            HTTP/1.1 404 Not Found
            Server: nginx/1.25.3
            Date: Tue, 14 May 2024 09:00:00 GMT
            Content-Type: text/html; charset=utf-8
            Content-Length: 0
            Vary: Accept-Encoding

        "}
        .replace('\n', "\r\n");
        let head = decode(&wire).unwrap().unwrap();
        assert_eq!(head.status, StatusCode::NOT_FOUND);
        assert_eq!(head.reason, "Not Found");
        assert_eq!(head.headers.len(), 5);
        assert_eq!(head.headers.get("server").unwrap(), "nginx/1.25.3");
    }

    #[test]
    fn bare_lf_head_is_tolerated() {
        let head = decode("HTTP/1.1 204 No Content\nConnection: close\n\n").unwrap().unwrap();
        assert_eq!(head.status, StatusCode::NO_CONTENT);
        assert!(head.connection_close());
    }

    #[test]
    fn set_cookie_values_stay_separate() {
        let wire = "HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\nContent-Length: 0\r\n\r\n";
        let head = decode(wire).unwrap().unwrap();
        let cookies: Vec<_> = head.headers.get_all(http::header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0], "a=1");
        assert_eq!(cookies[1], "b=2");
    }

    #[test]
    fn rejects_garbage_status_line() {
        assert!(decode("NOT-HTTP garbage\r\n\r\n").is_err());
    }

    #[test]
    fn framing_no_body_statuses() {
        for wire in [
            "HTTP/1.1 204 No Content\r\nContent-Length: 10\r\n\r\n",
            "HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n",
        ] {
            let head = decode(wire).unwrap().unwrap();
            assert_eq!(body_framing(false, &head).unwrap(), BodyFraming::None);
        }
    }

    #[test]
    fn framing_head_request_never_reads_a_body() {
        let head = decode("HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n").unwrap().unwrap();
        assert_eq!(body_framing(true, &head).unwrap(), BodyFraming::None);
    }

    #[test]
    fn framing_chunked_wins_over_length() {
        let wire =
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\nContent-Length: 5\r\n\r\n";
        let head = decode(wire).unwrap().unwrap();
        assert_eq!(body_framing(false, &head).unwrap(), BodyFraming::Chunked);
    }

    #[test]
    fn framing_non_final_chunked_reads_until_close() {
        let wire = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked, gzip\r\n\r\n";
        let head = decode(wire).unwrap().unwrap();
        assert_eq!(body_framing(false, &head).unwrap(), BodyFraming::UntilClose);
    }

    #[test]
    fn framing_content_length() {
        let head = decode("HTTP/1.1 200 OK\r\nContent-Length: 42\r\n\r\n").unwrap().unwrap();
        assert_eq!(body_framing(false, &head).unwrap(), BodyFraming::Length(42));
    }

    #[test]
    fn framing_agreeing_duplicate_lengths() {
        let wire = "HTTP/1.1 200 OK\r\nContent-Length: 7\r\nContent-Length: 7\r\n\r\n";
        let head = decode(wire).unwrap().unwrap();
        assert_eq!(body_framing(false, &head).unwrap(), BodyFraming::Length(7));
    }

    #[test]
    fn framing_conflicting_lengths_is_an_error() {
        let wire = "HTTP/1.1 200 OK\r\nContent-Length: 7\r\nContent-Length: 8\r\n\r\n";
        let head = decode(wire).unwrap().unwrap();
        assert!(matches!(
            body_framing(false, &head),
            Err(ParseError::InvalidContentLength { .. })
        ));
    }

    #[test]
    fn framing_unframed_reads_until_close() {
        let head = decode("HTTP/1.1 200 OK\r\nServer: old\r\n\r\n").unwrap().unwrap();
        assert_eq!(body_framing(false, &head).unwrap(), BodyFraming::UntilClose);
    }
}
