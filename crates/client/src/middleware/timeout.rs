//! Total-deadline guard.

use std::time::Duration;

use async_trait::async_trait;
use strand_http::{Error, Request, Response};
use tracing::debug;

use crate::middleware::{Middleware, Next};

/// Bounds the downstream call with one overall deadline.
///
/// The per-request timeout wins over the client default; with neither set
/// the call is unbounded. Expiry drops the in-flight future, which closes
/// any connection it had acquired, and surfaces [`Error::Timeout`]. Sits
/// innermost in the default chain so that the budget applies per attempt
/// rather than across retries.
pub struct TimeoutMiddleware {
    default: Option<Duration>,
}

impl TimeoutMiddleware {
    pub fn new(default: Option<Duration>) -> Self {
        Self { default }
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error> {
        match request.timeout.or(self.default) {
            Some(limit) => match tokio::time::timeout(limit, next.run(request)).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(?limit, "request deadline exceeded");
                    Err(Error::Timeout)
                }
            },
            None => next.run(request).await,
        }
    }
}
