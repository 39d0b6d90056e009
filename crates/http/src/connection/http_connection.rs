//! One HTTP/1.1 exchange at a time over a framed stream.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use http::header::CONNECTION;
use http::{Method, Version};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::codec::Http1Codec;
use crate::connection::TransportStream;
use crate::error::Error;
use crate::protocol::{
    headers, Body, BodyFraming, Message, PayloadItem, PayloadSize, RequestHead, ResponseHead,
};

/// A connection that carries sequential request/response exchanges.
///
/// State moves `Idle → Sending → Reading → Idle` across
/// [`HttpConnection::send_request`] and the payload reads that follow; any
/// error or non-self-delimiting response leaves the connection unusable for
/// further exchanges, which the pool turns into eviction.
pub struct HttpConnection<T = TransportStream> {
    framed: Framed<T, Http1Codec>,
    reusable: bool,
}

impl<T> HttpConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: T) -> Self {
        Self { framed: Framed::new(stream, Http1Codec::new()), reusable: false }
    }

    /// Whether the last exchange left the connection fit for another one.
    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    /// Writes the request and reads the response head. Interim 1xx
    /// responses are consumed inside the codec. Body payload is read
    /// afterwards through [`HttpConnection::next_payload`] or
    /// [`HttpConnection::poll_payload`].
    pub async fn send_request(
        &mut self,
        head: RequestHead,
        payload_size: PayloadSize,
        body: &mut Body,
        write_timeout: Option<Duration>,
        read_timeout: Option<Duration>,
    ) -> Result<(ResponseHead, BodyFraming), Error> {
        self.reusable = false;
        let request_close = wants_close(&head);
        self.framed.codec_mut().prepare(head.method == Method::HEAD);

        deadline(write_timeout, self.framed.feed(Message::Head((head, payload_size)))).await??;

        match body {
            Body::Empty => {
                deadline(write_timeout, self.framed.feed(Message::Payload(PayloadItem::Eof)))
                    .await??;
            }
            Body::Bytes(bytes) => {
                let chunk = PayloadItem::Chunk(bytes.clone());
                deadline(write_timeout, self.framed.feed(Message::Payload(chunk))).await??;
                deadline(write_timeout, self.framed.feed(Message::Payload(PayloadItem::Eof)))
                    .await??;
            }
            Body::Stream(stream) => {
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    deadline(
                        write_timeout,
                        self.framed.feed(Message::Payload(PayloadItem::Chunk(chunk))),
                    )
                    .await??;
                }
                deadline(write_timeout, self.framed.feed(Message::Payload(PayloadItem::Eof)))
                    .await??;
            }
        }
        deadline(write_timeout, self.framed.flush()).await??;
        trace!("request written, waiting for response head");

        match deadline(read_timeout, self.framed.next()).await? {
            Some(Ok(Message::Head((response_head, framing)))) => {
                self.reusable = response_head.version == Version::HTTP_11
                    && !request_close
                    && !response_head.connection_close()
                    && framing.is_self_delimiting();
                debug!(
                    status = %response_head.status,
                    ?framing,
                    reusable = self.reusable,
                    "response head received"
                );
                Ok((response_head, framing))
            }
            Some(Ok(Message::Payload(_))) => {
                Err(Error::protocol("payload item arrived before a response head"))
            }
            Some(Err(parse_error)) => Err(parse_error.into()),
            None => Err(Error::read(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before a response arrived",
            ))),
        }
    }

    /// Reads the next payload item of the current response.
    pub async fn next_payload(&mut self, read_timeout: Option<Duration>) -> Result<PayloadItem, Error> {
        let result = match deadline(read_timeout, self.framed.next()).await {
            Ok(next) => match next {
                Some(Ok(Message::Payload(item))) => Ok(item),
                Some(Ok(Message::Head(_))) => {
                    Err(Error::protocol("second response head inside a body"))
                }
                Some(Err(parse_error)) => Err(parse_error.into()),
                None => Err(Error::read(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside a body",
                ))),
            },
            Err(timeout) => Err(timeout),
        };

        match &result {
            Ok(PayloadItem::Eof) => self.finish_exchange(),
            Ok(PayloadItem::Chunk(_)) => {}
            Err(_) => self.reusable = false,
        }
        result
    }

    /// Poll-based flavor of [`HttpConnection::next_payload`], used by the
    /// streaming body reader.
    pub fn poll_payload(&mut self, cx: &mut Context<'_>) -> Poll<Result<PayloadItem, Error>> {
        match Pin::new(&mut self.framed).poll_next(cx) {
            Poll::Ready(Some(Ok(Message::Payload(item)))) => {
                if item.is_eof() {
                    self.finish_exchange();
                }
                Poll::Ready(Ok(item))
            }
            Poll::Ready(Some(Ok(Message::Head(_)))) => {
                self.reusable = false;
                Poll::Ready(Err(Error::protocol("second response head inside a body")))
            }
            Poll::Ready(Some(Err(parse_error))) => {
                self.reusable = false;
                Poll::Ready(Err(parse_error.into()))
            }
            Poll::Ready(None) => {
                self.reusable = false;
                Poll::Ready(Err(Error::read(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside a body",
                ))))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    /// A finished exchange must leave the read buffer empty; the client
    /// never pipelines, so leftover bytes mean the framing went wrong.
    fn finish_exchange(&mut self) {
        if !self.framed.read_buffer().is_empty() {
            debug!(
                leftover = self.framed.read_buffer().len(),
                "unexpected bytes after response; disabling reuse"
            );
            self.reusable = false;
        }
    }
}

fn wants_close(head: &RequestHead) -> bool {
    head.headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(headers::split_list)
        .any(|token| token.eq_ignore_ascii_case("close"))
}

/// Applies an optional per-operation timeout.
async fn deadline<F>(limit: Option<Duration>, fut: F) -> Result<F::Output, Error>
where
    F: Future,
{
    match limit {
        Some(duration) => {
            tokio::time::timeout(duration, fut).await.map_err(|_| Error::Timeout)
        }
        None => Ok(fut.await),
    }
}
