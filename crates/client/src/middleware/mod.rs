//! The request-processing pipeline.
//!
//! A middleware sees the request on the way down and the response on the
//! way up; [`Next`] carries the rest of the chain plus the transport that
//! terminates it. The head-most middleware is first to touch the request
//! and last to touch the response. Chains are plain ordered vectors; a
//! middleware re-invokes its tail as many times as its policy needs
//! (retries, redirect hops, auth second attempts).

mod auth;
mod cookies;
mod decode;
mod redirect;
mod retry;
mod timeout;

pub use auth::AuthenticationMiddleware;
pub use cookies::CookiesMiddleware;
pub use decode::DecodeMiddleware;
pub use redirect::RedirectMiddleware;
pub use retry::RetryMiddleware;
pub use timeout::TimeoutMiddleware;

use std::sync::Arc;

use async_trait::async_trait;
use strand_http::transport::HttpTransport;
use strand_http::{Error, Request, Response};

/// One stage of the pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Processes `request`, usually by delegating to `next` at least once
    /// and inspecting or replacing the result.
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error>;
}

/// The remaining chain after the current middleware, ending in the
/// transport.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stack: &'a [Arc<dyn Middleware>],
    transport: &'a HttpTransport,
}

impl<'a> Next<'a> {
    pub fn new(stack: &'a [Arc<dyn Middleware>], transport: &'a HttpTransport) -> Self {
        Self { stack, transport }
    }

    /// Runs the rest of the chain on `request`.
    pub async fn run(self, request: &mut Request) -> Result<Response, Error> {
        match self.stack.split_first() {
            Some((middleware, rest)) => {
                middleware.handle(request, Next { stack: rest, transport: self.transport }).await
            }
            None => self.transport.round_trip(request).await,
        }
    }
}
