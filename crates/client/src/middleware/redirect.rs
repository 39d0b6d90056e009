//! Redirect following.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION, TRANSFER_ENCODING};
use http::Method;
use strand_http::uri::RequestUri;
use strand_http::{Body, Error, Request, Response};
use tracing::{debug, warn};

use crate::middleware::{Middleware, Next};

/// Follows 301/302/303/307/308 responses up to a per-request budget.
///
/// Method rewriting: 303 always becomes GET without a body; 301 and 302
/// rewrite POST to GET for compatibility; 307 and 308 preserve the method
/// and body, and are therefore only followed while the body is replayable
/// (a consumed producer stream stops the chain and surfaces the redirect).
/// Hops that leave the origin strip `Authorization` and `Cookie` (jar
/// cookies re-attach naturally on the next hop). Permanent redirects are
/// remembered for the client's lifetime and short-circuit later requests
/// to the same URI.
pub struct RedirectMiddleware {
    max_redirects: usize,
    permanent: Mutex<HashMap<String, RequestUri>>,
}

impl RedirectMiddleware {
    pub const DEFAULT_REDIRECTS: usize = 10;

    pub fn new(max_redirects: usize) -> Self {
        Self { max_redirects, permanent: Mutex::new(HashMap::new()) }
    }
}

impl Default for RedirectMiddleware {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REDIRECTS)
    }
}

/// Whether this status redirects, and how the method is rewritten.
fn rewrite_to_get(status: u16, method: &Method) -> Option<bool> {
    match status {
        303 => Some(true),
        301 | 302 => Some(*method == Method::POST),
        307 | 308 => Some(false),
        _ => None,
    }
}

#[async_trait]
impl Middleware for RedirectMiddleware {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error> {
        {
            let permanent = self.permanent.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(target) = permanent.get(&request.uri.to_string()) {
                debug!(from = %request.uri, to = %target, "applying remembered permanent redirect");
                request.uri = target.clone();
            }
        }

        let mut hops = 0;
        loop {
            let response = next.run(request).await?;

            let status = response.status().as_u16();
            let Some(to_get) = rewrite_to_get(status, &request.method) else {
                return Ok(response);
            };
            // 307/308 re-send the body, which the first attempt has already
            // consumed when it was a producer stream
            if !to_get && !request.body.is_replayable() {
                warn!(status, uri = %request.uri, "leaving redirect unfollowed: request body cannot be replayed");
                return Ok(response);
            }
            let Some(location) = response.headers().get(LOCATION) else {
                // a redirect without a target is surfaced as-is
                return Ok(response);
            };
            let location = location
                .to_str()
                .map_err(|_| Error::protocol("location header is not visible ascii"))?
                .to_string();

            hops += 1;
            if hops > self.max_redirects {
                return Err(Error::TooManyRedirects { limit: self.max_redirects });
            }

            let target = request.uri.join(&location)?;
            debug!(status, from = %request.uri, to = %target, hop = hops, "following redirect");

            if to_get {
                request.method = Method::GET;
                request.body = Body::Empty;
                request.headers.remove(CONTENT_LENGTH);
                request.headers.remove(CONTENT_TYPE);
                request.headers.remove(TRANSFER_ENCODING);
            }

            if !request.uri.same_origin(&target) {
                request.headers.remove(AUTHORIZATION);
                request.headers.remove(COOKIE);
            }

            if status == 301 || status == 308 {
                self.permanent
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(request.uri.to_string(), target.clone());
            }

            request.uri = target;
            // response is dropped here; a streaming hop closes its connection
        }
    }
}
