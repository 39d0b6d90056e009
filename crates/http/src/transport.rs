//! The end-to-end request driver.
//!
//! [`HttpTransport`] takes a fully prepared [`Request`], borrows a
//! connection from the pool (dialing when none is idle), runs the exchange,
//! and assembles either a buffered [`Response`] or a streaming one whose
//! [`BodyReader`] owns the connection until the body is exhausted or the
//! response is dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use rustls::ClientConfig;
use tokio::time::{sleep_until, Instant as TokioInstant, Sleep};
use tracing::{debug, trace};

use crate::codec::coding::ContentDecoder;
use crate::connection::{connect, HttpConnection, TlsSettings};
use crate::error::Error;
use crate::pool::Pool;
use crate::protocol::{PayloadItem, Request, Response, ResponseSource};
use crate::uri::{ConnectionKey, Scheme};

/// Transport-level tuning.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Covers TCP connect and TLS handshake together
    pub connect_timeout: Duration,
    /// Applied to each socket read while receiving a response
    pub read_timeout: Option<Duration>,
    /// Applied to each socket write while sending a request
    pub write_timeout: Option<Duration>,
    pub tls: TlsSettings,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: None,
            write_timeout: None,
            tls: TlsSettings::default(),
        }
    }
}

/// Drives single requests over pooled connections.
pub struct HttpTransport {
    pool: Pool,
    config: TransportConfig,
    /// rustls config built on first https use; plain-http clients never pay
    /// for root store loading
    tls_config: OnceLock<Arc<ClientConfig>>,
}

impl HttpTransport {
    pub fn new(pool: Pool, config: TransportConfig) -> Self {
        Self { pool, config, tls_config: OnceLock::new() }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Runs one request end to end.
    ///
    /// The request has passed every middleware pre-phase at this point; the
    /// response returned here unwinds back up the chain.
    pub async fn round_trip(&self, request: &mut Request) -> Result<Response, Error> {
        let key = request.uri.connection_key();
        let mut connection = match self.pool.checkout(&key)? {
            Some(connection) => connection,
            None => {
                let tls_config = match key.scheme {
                    Scheme::Http => None,
                    Scheme::Https => Some(self.tls_config()?),
                };
                let stream = connect(&key, tls_config, self.config.connect_timeout).await?;
                HttpConnection::new(stream)
            }
        };

        let head = request.to_head();
        let payload_size = request.payload_size();
        trace!(method = %request.method, uri = %request.uri, "starting round trip");

        let (response_head, framing) = connection
            .send_request(
                head,
                payload_size,
                &mut request.body,
                self.config.write_timeout,
                self.config.read_timeout,
            )
            .await?;

        let source = ResponseSource { method: request.method.clone(), uri: request.uri.clone() };

        if request.stream && !framing.is_none() {
            // decoding happens on the fly; unknown codings fail now, while
            // the connection can still be discarded cleanly
            let decoder = match ContentDecoder::from_headers(&response_head.headers) {
                Ok(decoder) => decoder,
                Err(e) => return Err(e.into()),
            };
            let reader = BodyReader::new(
                connection,
                key,
                self.pool.clone(),
                decoder,
                self.config.read_timeout,
            );
            return Ok(Response::streaming(response_head, reader, source));
        }

        let mut content = BytesMut::new();
        loop {
            match connection.next_payload(self.config.read_timeout).await {
                Ok(PayloadItem::Chunk(chunk)) => content.extend_from_slice(&chunk),
                Ok(PayloadItem::Eof) => break,
                Err(e) => return Err(e),
            }
        }
        self.pool.release(key, connection);

        Ok(Response::materialized(response_head, content.freeze(), source))
    }

    fn tls_config(&self) -> Result<Arc<ClientConfig>, Error> {
        if let Some(config) = self.tls_config.get() {
            return Ok(config.clone());
        }
        let config = self.config.tls.build_config()?;
        let _ = self.tls_config.set(config.clone());
        Ok(config)
    }
}

/// The chunk source of a streaming response.
///
/// Owns the connection for the lifetime of the body: clean exhaustion
/// returns it to the pool (when the exchange allowed keep-alive), while
/// dropping the reader early closes it.
pub struct BodyReader {
    connection: Option<HttpConnection>,
    key: ConnectionKey,
    pool: Pool,
    decoder: Option<ContentDecoder>,
    read_timeout: Option<Duration>,
    idle_deadline: Option<Pin<Box<Sleep>>>,
    done: bool,
}

impl BodyReader {
    fn new(
        connection: HttpConnection,
        key: ConnectionKey,
        pool: Pool,
        decoder: Option<ContentDecoder>,
        read_timeout: Option<Duration>,
    ) -> Self {
        Self {
            connection: Some(connection),
            key,
            pool,
            decoder,
            read_timeout,
            idle_deadline: None,
            done: false,
        }
    }

    /// The next decoded body chunk; `None` once the body is complete.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, Error> {
        futures::StreamExt::next(self).await.transpose()
    }

    fn release_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(self.key.clone(), connection);
        }
    }

    fn abort(&mut self) {
        // dropping the connection closes the socket
        self.connection = None;
        self.done = true;
    }

    /// Finishes the content decoder and hands the connection back.
    fn complete(&mut self) -> Result<Bytes, Error> {
        let tail = match self.decoder.as_mut() {
            Some(decoder) => decoder.finish().map_err(Error::from)?,
            None => Bytes::new(),
        };
        self.done = true;
        self.release_connection();
        debug!(key = %self.key, "streaming body exhausted");
        Ok(tail)
    }
}

impl Stream for BodyReader {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        loop {
            let Some(connection) = this.connection.as_mut() else {
                this.done = true;
                return Poll::Ready(None);
            };

            match connection.poll_payload(cx) {
                Poll::Ready(Ok(PayloadItem::Chunk(chunk))) => {
                    this.idle_deadline = None;
                    let out = match this.decoder.as_mut() {
                        Some(decoder) => match decoder.write(&chunk) {
                            Ok(decoded) => decoded,
                            Err(e) => {
                                this.abort();
                                return Poll::Ready(Some(Err(e.into())));
                            }
                        },
                        None => chunk,
                    };
                    if out.is_empty() {
                        // the decoder needs more input before it can emit
                        continue;
                    }
                    return Poll::Ready(Some(Ok(out)));
                }
                Poll::Ready(Ok(PayloadItem::Eof)) => {
                    this.idle_deadline = None;
                    return match this.complete() {
                        Ok(tail) if tail.is_empty() => Poll::Ready(None),
                        Ok(tail) => Poll::Ready(Some(Ok(tail))),
                        Err(e) => {
                            this.abort();
                            Poll::Ready(Some(Err(e)))
                        }
                    };
                }
                Poll::Ready(Err(e)) => {
                    this.abort();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Pending => {
                    if let Some(limit) = this.read_timeout {
                        let deadline = this
                            .idle_deadline
                            .get_or_insert_with(|| Box::pin(sleep_until(TokioInstant::now() + limit)));
                        if deadline.as_mut().poll(cx).is_ready() {
                            this.abort();
                            return Poll::Ready(Some(Err(Error::Timeout)));
                        }
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

impl Drop for BodyReader {
    fn drop(&mut self) {
        if self.connection.is_some() && !self.done {
            debug!(key = %self.key, "streaming response dropped before exhaustion; closing connection");
        }
        // an unexhausted connection is dropped (closed), never repooled
    }
}

impl std::fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyReader")
            .field("key", &self.key)
            .field("done", &self.done)
            .field("decoding", &self.decoder.is_some())
            .finish()
    }
}
