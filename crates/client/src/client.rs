//! The user-facing client.
//!
//! A [`Client`] owns the connection pool, the cookie jar, the digest nonce
//! state and the middleware chain; it is an `Arc` handle and cheap to
//! clone. Requests are built fluently from the verb methods and executed
//! through the chain.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method};
use strand_http::connection::TlsSettings;
use strand_http::pool::Pool;
use strand_http::transport::{HttpTransport, TransportConfig};
use strand_http::{Body, Credentials, Error, Request, Response};
use tracing::debug;

use crate::auth::DigestState;
use crate::cookies::CookieJar;
use crate::middleware::{
    AuthenticationMiddleware, CookiesMiddleware, DecodeMiddleware, Middleware, Next,
    RedirectMiddleware, RetryMiddleware, TimeoutMiddleware,
};

const DEFAULT_USER_AGENT: &str = concat!("strand/", env!("CARGO_PKG_VERSION"));

/// An asynchronous HTTP/1.1 client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: HttpTransport,
    /// The chain head; may be rewritten at runtime, so requests snapshot it
    middlewares: RwLock<Vec<Arc<dyn Middleware>>>,
    default_headers: HeaderMap,
    jar: Arc<CookieJar>,
    #[allow(dead_code)]
    digest_state: Arc<DigestState>,
}

impl Client {
    /// A client with the default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn head(&self, url: &str) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    pub fn options(&self, url: &str) -> RequestBuilder {
        self.request(Method::OPTIONS, url)
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url)
    }

    /// Sends a prebuilt request through the middleware chain, returning a
    /// materialized response.
    pub async fn send(&self, mut request: Request) -> Result<Response, Error> {
        request.stream = false;
        self.execute(request).await
    }

    /// Sends a prebuilt request and returns a streaming response. The
    /// response owns a pooled connection until its body is exhausted or it
    /// is dropped.
    pub async fn stream(&self, mut request: Request) -> Result<Response, Error> {
        request.stream = true;
        self.execute(request).await
    }

    async fn execute(&self, mut request: Request) -> Result<Response, Error> {
        for (name, value) in self.inner.default_headers.iter() {
            if !request.headers.contains_key(name) {
                request.headers.insert(name, value.clone());
            }
        }
        let stack = self
            .inner
            .middlewares
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Next::new(&stack, &self.inner.transport).run(&mut request).await
    }

    /// Puts a middleware at the head of the chain: it will be the first to
    /// see requests and the last to see responses. In-flight requests keep
    /// the chain they started with.
    pub fn add_middleware_first(&self, middleware: Arc<dyn Middleware>) {
        self.inner
            .middlewares
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(0, middleware);
    }

    /// Appends a middleware just above the timeout guard and the transport.
    pub fn add_middleware_last(&self, middleware: Arc<dyn Middleware>) {
        let mut stack =
            self.inner.middlewares.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        // keep the timeout guard innermost
        let at = stack.len().saturating_sub(1);
        stack.insert(at, middleware);
    }

    /// The client's cookie jar.
    pub fn cookies(&self) -> &CookieJar {
        &self.inner.jar
    }

    /// Closes the client: idle connections are dropped and new requests
    /// fail with [`Error::PoolClosed`].
    pub fn close(&self) {
        debug!("closing client");
        self.inner.transport.pool().close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.transport.pool().is_closed()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures and builds a [`Client`].
pub struct ClientBuilder {
    headers: HeaderMap,
    persistent_connections: bool,
    max_idle_per_host: usize,
    verify_mode: bool,
    check_hostname: bool,
    keylog_filename: Option<PathBuf>,
    timeout: Option<Duration>,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    retry_count: usize,
    retry_non_idempotent: bool,
    redirect_count: usize,
    user_agent: HeaderValue,
    middlewares: Option<Vec<Arc<dyn Middleware>>>,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            headers: HeaderMap::new(),
            persistent_connections: true,
            max_idle_per_host: 8,
            verify_mode: true,
            check_hostname: true,
            keylog_filename: None,
            timeout: None,
            connect_timeout: Duration::from_secs(30),
            read_timeout: None,
            write_timeout: None,
            retry_count: RetryMiddleware::DEFAULT_RETRIES,
            retry_non_idempotent: false,
            redirect_count: RedirectMiddleware::DEFAULT_REDIRECTS,
            user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
            middlewares: None,
        }
    }

    /// Headers sent with every request unless the request sets its own.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Keep-alive connection reuse; disabling closes every connection after
    /// its exchange.
    pub fn persistent_connections(mut self, enabled: bool) -> Self {
        self.persistent_connections = enabled;
        self
    }

    /// Verify the server certificate chain (default on).
    pub fn verify_mode(mut self, enabled: bool) -> Self {
        self.verify_mode = enabled;
        self
    }

    /// Verify that the certificate covers the host (default on).
    pub fn check_hostname(mut self, enabled: bool) -> Self {
        self.check_hostname = enabled;
        self
    }

    /// Append TLS secrets to this file in NSS key-log format;
    /// `SSLKEYLOGFILE` is honored without this.
    pub fn keylog_filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.keylog_filename = Some(path.into());
        self
    }

    /// Default total deadline per request attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = count;
        self
    }

    pub fn retry_non_idempotent(mut self, enabled: bool) -> Self {
        self.retry_non_idempotent = enabled;
        self
    }

    pub fn redirect_count(mut self, count: usize) -> Self {
        self.redirect_count = count;
        self
    }

    pub fn user_agent(mut self, value: HeaderValue) -> Self {
        self.user_agent = value;
        self
    }

    /// Replaces the default middleware stack. The timeout guard is always
    /// appended innermost.
    pub fn middlewares(mut self, middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        self.middlewares = Some(middlewares);
        self
    }

    pub fn build(self) -> Client {
        let jar = Arc::new(CookieJar::new());
        let digest_state = Arc::new(DigestState::new());

        let pool = if self.persistent_connections {
            Pool::new(self.max_idle_per_host)
        } else {
            Pool::disabled()
        };
        let transport = HttpTransport::new(
            pool,
            TransportConfig {
                connect_timeout: self.connect_timeout,
                read_timeout: self.read_timeout,
                write_timeout: self.write_timeout,
                tls: TlsSettings {
                    verify: self.verify_mode,
                    check_hostname: self.check_hostname,
                    keylog_file: self.keylog_filename,
                },
            },
        );

        let mut middlewares = self.middlewares.unwrap_or_else(|| {
            vec![
                Arc::new(
                    RetryMiddleware::new(self.retry_count)
                        .retry_non_idempotent(self.retry_non_idempotent),
                ) as Arc<dyn Middleware>,
                Arc::new(RedirectMiddleware::new(self.redirect_count)),
                Arc::new(CookiesMiddleware::new(jar.clone())),
                Arc::new(DecodeMiddleware::new()),
                Arc::new(AuthenticationMiddleware::new(digest_state.clone())),
            ]
        });
        middlewares.push(Arc::new(TimeoutMiddleware::new(self.timeout)));

        let mut default_headers = self.headers;
        if !default_headers.contains_key(USER_AGENT) {
            default_headers.insert(USER_AGENT, self.user_agent);
        }

        Client {
            inner: Arc::new(ClientInner {
                transport,
                middlewares: RwLock::new(middlewares),
                default_headers,
                jar,
                digest_state,
            }),
        }
    }
}

/// Fluent request construction, created by the client verb methods.
pub struct RequestBuilder {
    client: Client,
    method: Method,
    url: String,
    headers: HeaderMap,
    params: Vec<(String, String)>,
    body: Body,
    auth: Option<Credentials>,
    timeout: Option<Duration>,
    error: Option<Error>,
}

impl RequestBuilder {
    fn new(client: Client, method: Method, url: &str) -> Self {
        Self {
            client,
            method,
            url: url.to_string(),
            headers: HeaderMap::new(),
            params: Vec::new(),
            body: Body::Empty,
            auth: None,
            timeout: None,
            error: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                self.error.get_or_insert_with(|| {
                    Error::protocol(format!("invalid header `{name}`"))
                });
            }
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Adds a query parameter to the URL.
    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the request body from a byte block or string.
    pub fn content(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and the matching `Content-Type`.
    pub fn json(mut self, value: &serde_json::Value) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                self.body = Body::from(bytes);
            }
            Err(e) => {
                self.error.get_or_insert(Error::Decode { reason: e.to_string() });
            }
        }
        self
    }

    /// Credentials for challenge-response authentication; not sent until
    /// the server asks.
    pub fn auth(mut self, username: &str, password: &str) -> Self {
        self.auth = Some(Credentials::new(username, password));
        self
    }

    /// Total deadline for this request, overriding the client default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends an explicit preemptive `Authorization` header; this also opts
    /// out of the automatic 401 retry.
    pub fn authorization(mut self, value: &str) -> Self {
        match value.parse::<HeaderValue>() {
            Ok(value) => {
                self.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => {
                self.error.get_or_insert_with(|| Error::protocol("invalid authorization value"));
            }
        }
        self
    }

    /// Builds the [`Request`] without sending it.
    pub fn build(self) -> Result<Request, Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut request = Request::new(self.method, &self.url)?;
        for (name, value) in &self.params {
            request.uri.append_query_pair(name, value);
        }
        request.headers.extend(self.headers);
        if self.auth.is_some() {
            request.auth = self.auth;
        }
        request.timeout = self.timeout;
        request.body = self.body;
        Ok(request)
    }

    /// Sends the request and buffers the whole response body.
    pub async fn send(self) -> Result<Response, Error> {
        let client = self.client.clone();
        let request = self.build()?;
        client.send(request).await
    }

    /// Sends the request and returns a streaming response.
    pub async fn stream(self) -> Result<Response, Error> {
        let client = self.client.clone();
        let request = self.build()?;
        client.stream(request).await
    }
}
