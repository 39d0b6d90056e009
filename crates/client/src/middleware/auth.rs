//! Challenge-response authentication.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::StatusCode;
use strand_http::protocol::headers::{parse_challenges, Challenge};
use strand_http::{Error, Request, Response};
use tracing::{debug, warn};

use crate::auth::{
    basic_authorization, digest_authorization, make_cnonce, DigestAlgorithm, DigestChallenge,
    DigestState,
};
use crate::middleware::{Middleware, Next};

/// Answers 401 challenges with the request's credential pair.
///
/// The first attempt is always sent bare. On a 401 with `WWW-Authenticate`,
/// the offered schemes are ranked (Digest/SHA-256 over Digest/MD5 over
/// Basic) and tried strongest-first, one retry each; the retry only happens
/// while the body is replayable, since the bare attempt has already
/// consumed a producer stream. A caller that set `Authorization`
/// preemptively has opted out: the 401 is returned to them untouched. A 401
/// that survives every scheme becomes an [`Error::Authentication`].
pub struct AuthenticationMiddleware {
    digest_state: Arc<DigestState>,
}

impl AuthenticationMiddleware {
    pub fn new(digest_state: Arc<DigestState>) -> Self {
        Self { digest_state }
    }
}

enum Attempt {
    Digest(DigestChallenge),
    Basic,
}

/// Orders the offered challenges strongest first, dropping ones this
/// client cannot answer.
fn plan_attempts(challenges: &[Challenge]) -> Vec<Attempt> {
    let mut digests: Vec<DigestChallenge> =
        challenges.iter().filter_map(DigestChallenge::from_challenge).collect();
    digests.sort_by_key(|challenge| match challenge.algorithm {
        DigestAlgorithm::Sha256 | DigestAlgorithm::Sha256Sess => 0,
        DigestAlgorithm::Md5 | DigestAlgorithm::Md5Sess => 1,
    });

    let mut attempts: Vec<Attempt> = digests.into_iter().map(Attempt::Digest).collect();
    if challenges.iter().any(|challenge| challenge.scheme.eq_ignore_ascii_case("basic")) {
        attempts.push(Attempt::Basic);
    }
    attempts
}

#[async_trait]
impl Middleware for AuthenticationMiddleware {
    async fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error> {
        let preemptive = request.headers.contains_key(AUTHORIZATION);

        let response = next.run(request).await?;

        let Some(credentials) = request.auth.clone() else {
            return Ok(response);
        };
        if response.status() != StatusCode::UNAUTHORIZED || preemptive {
            return Ok(response);
        }
        // the retry re-sends the body, which the bare first attempt has
        // already consumed when it was a producer stream
        if !request.body.is_replayable() {
            warn!(uri = %request.uri, "leaving challenge unanswered: request body cannot be replayed");
            return Ok(response);
        }

        let challenges: Vec<Challenge> = {
            let offered = response.headers().get_all(WWW_AUTHENTICATE);
            parse_challenges(offered)
        };
        if challenges.is_empty() {
            return Err(Error::authentication("401 without a www-authenticate challenge"));
        }

        let attempts = plan_attempts(&challenges);
        if attempts.is_empty() {
            return Err(Error::authentication("no supported authentication scheme offered"));
        }
        drop(response);

        for attempt in attempts {
            let header = match &attempt {
                Attempt::Basic => {
                    debug!(uri = %request.uri, "retrying with basic credentials");
                    basic_authorization(&credentials)
                }
                Attempt::Digest(challenge) => {
                    let origin = request.uri.connection_key().to_string();
                    let nc = self.digest_state.next_nonce_count(&origin, &challenge.realm);
                    let body = request.body.as_bytes().map(|bytes| bytes.as_ref());
                    debug!(
                        uri = %request.uri,
                        algorithm = challenge.algorithm.as_str(),
                        nc,
                        "retrying with digest credentials"
                    );
                    match digest_authorization(
                        challenge,
                        &credentials,
                        request.method.as_str(),
                        &request.uri.request_target(),
                        body,
                        &make_cnonce(),
                        nc,
                    ) {
                        Ok(header) => header,
                        Err(error) => {
                            warn!(%error, "skipping digest challenge");
                            continue;
                        }
                    }
                }
            };

            request.headers.insert(AUTHORIZATION, header);
            let retried = next.run(request).await?;
            if retried.status() != StatusCode::UNAUTHORIZED {
                return Ok(retried);
            }
        }

        Err(Error::authentication("credentials rejected by every offered scheme"))
    }
}
