//! Jar-backed cookie handling.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{COOKIE, SET_COOKIE};
use strand_http::{Error, Request, Response};
use tracing::{trace, warn};

use crate::cookies::{parse_set_cookie, CookieJar};
use crate::middleware::{Middleware, Next};

/// Injects matching jar cookies before delegation and ingests `Set-Cookie`
/// headers from the response.
///
/// Redirect and auth retries re-enter this middleware on every hop, so
/// cookies set mid-chain are visible to subsequent hops.
pub struct CookiesMiddleware {
    jar: Arc<CookieJar>,
}

impl CookiesMiddleware {
    pub fn new(jar: Arc<CookieJar>) -> Self {
        Self { jar }
    }
}

#[async_trait]
impl Middleware for CookiesMiddleware {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error> {
        // the jar owns the Cookie header: a redirect hop may land on a
        // path the previously injected cookies do not match
        match self.jar.cookie_header(&request.uri) {
            Some(header) => {
                trace!(uri = %request.uri, "attaching jar cookies");
                request.headers.insert(COOKIE, header);
            }
            None => {
                request.headers.remove(COOKIE);
            }
        }

        let response = next.run(request).await?;

        for value in response.headers().get_all(SET_COOKIE) {
            let Ok(text) = value.to_str() else {
                warn!("ignoring set-cookie with non-ascii content");
                continue;
            };
            match parse_set_cookie(text, &request.uri) {
                Some(cookie) => self.jar.store(cookie),
                None => warn!(header = text, "ignoring unparseable set-cookie"),
            }
        }
        Ok(response)
    }
}
