//! Transport-failure retry.

use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use strand_http::{Error, Request, Response};
use tracing::warn;

use crate::middleware::{Middleware, Next};

/// Re-issues a request after a retriable transport failure (connect,
/// read, write or timeout).
///
/// Non-idempotent methods are not retried unless explicitly enabled, and a
/// request whose body has already been consumed (a producer body) is never
/// retried. Everything else passes through untouched.
pub struct RetryMiddleware {
    max_retries: usize,
    backoff: Duration,
    retry_non_idempotent: bool,
}

impl RetryMiddleware {
    pub const DEFAULT_RETRIES: usize = 3;

    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            backoff: Duration::from_millis(100),
            retry_non_idempotent: false,
        }
    }

    pub fn retry_non_idempotent(mut self, enabled: bool) -> Self {
        self.retry_non_idempotent = enabled;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn applies_to(&self, request: &Request) -> bool {
        (self.retry_non_idempotent || is_idempotent(&request.method))
            && request.body.is_replayable()
    }
}

impl Default for RetryMiddleware {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETRIES)
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

#[async_trait]
impl Middleware for RetryMiddleware {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error> {
        let mut attempt = 0;
        loop {
            match next.run(request).await {
                Ok(response) => return Ok(response),
                Err(error)
                    if error.is_retriable() && attempt < self.max_retries && self.applies_to(request) =>
                {
                    attempt += 1;
                    warn!(
                        %error,
                        attempt,
                        max = self.max_retries,
                        method = %request.method,
                        "retrying after transport failure"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
