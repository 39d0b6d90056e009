//! An async HTTP/1.1 client with a composable middleware pipeline.
//!
//! ```no_run
//! use strand::Client;
//!
//! # async fn run() -> Result<(), strand::Error> {
//! let client = Client::new();
//! let response = client.get("http://httpbin.org/get").send().await?;
//! println!("{} {}", response.status(), response.text());
//!
//! // streaming: the body arrives chunk by chunk and the connection
//! // returns to the pool once the stream is exhausted
//! let mut response = client.get("http://httpbin.org/bytes/1048576").stream().await?;
//! while let Some(chunk) = response.chunk().await? {
//!     println!("read {} bytes", chunk.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Cross-cutting behavior lives in middlewares (retry, redirects, cookies,
//! content decoding, authentication, timeouts), each an independently
//! orderable stage wrapping the wire transport from [`strand_http`].

pub mod auth;
mod client;
pub mod cookies;
pub mod middleware;

pub use client::{Client, ClientBuilder, RequestBuilder};
pub use cookies::{Cookie, CookieJar};
pub use middleware::{Middleware, Next};

pub use strand_http::protocol::headers;
pub use strand_http::transport::BodyReader;
pub use strand_http::uri::{ConnectionKey, RequestUri, Scheme};
pub use strand_http::{Body, Credentials, Error, Request, Response};
