//! RFC 6265 cookie storage.
//!
//! The jar stores cookies keyed by `(domain, path, name)`; newer inserts
//! overwrite but keep the original creation time, which preserves the
//! emission order RFC 6265 §5.4 asks for (longest path first, then oldest).
//! Expired cookies are purged on insert and on emission.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use http::HeaderValue;
use strand_http::uri::RequestUri;
use tracing::trace;

/// One stored cookie with its RFC 6265 attributes.
#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Absolute expiry; `None` is a session cookie
    pub expires: Option<SystemTime>,
    pub secure: bool,
    pub http_only: bool,
    /// Set when the cookie had no `Domain` attribute: it then only matches
    /// the exact request host
    pub host_only: bool,
    created: SystemTime,
}

impl Cookie {
    fn is_expired(&self, now: SystemTime) -> bool {
        matches!(self.expires, Some(at) if at <= now)
    }

    fn matches(&self, uri: &RequestUri, now: SystemTime) -> bool {
        if self.is_expired(now) {
            return false;
        }
        let host = uri.host();
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(host, &self.domain)
        };
        if !domain_ok {
            return false;
        }
        if !path_matches(uri.path(), &self.path) {
            return false;
        }
        if self.secure && !uri.scheme().is_secure() {
            return false;
        }
        true
    }
}

/// Parses one `Set-Cookie` value in the context of the request it answered.
/// Returns `None` for cookies that must be ignored (bad syntax, or a
/// `Domain` that does not cover the request host).
pub fn parse_set_cookie(input: &str, uri: &RequestUri) -> Option<Cookie> {
    let mut parts = input.split(';');

    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        value: value.trim().trim_matches('"').to_string(),
        domain: uri.host().to_string(),
        path: default_path(uri.path()),
        expires: None,
        secure: false,
        http_only: false,
        host_only: true,
        created: SystemTime::now(),
    };

    let mut max_age: Option<Duration> = None;
    let mut expired_by_max_age = false;
    let mut expires_attr: Option<SystemTime> = None;

    for attribute in parts {
        let (key, val) = match attribute.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attribute.trim(), ""),
        };
        if key.eq_ignore_ascii_case("expires") {
            if let Ok(at) = httpdate::parse_http_date(val) {
                expires_attr = Some(at);
            }
        } else if key.eq_ignore_ascii_case("max-age") {
            match val.parse::<i64>() {
                Ok(seconds) if seconds > 0 => max_age = Some(Duration::from_secs(seconds as u64)),
                Ok(_) => expired_by_max_age = true,
                Err(_) => {}
            }
        } else if key.eq_ignore_ascii_case("domain") {
            let domain = val.trim_start_matches('.').to_ascii_lowercase();
            if domain.is_empty() {
                continue;
            }
            // an off-site Domain attribute invalidates the whole cookie
            if !domain_matches(uri.host(), &domain) {
                return None;
            }
            cookie.domain = domain;
            cookie.host_only = false;
        } else if key.eq_ignore_ascii_case("path") {
            if val.starts_with('/') {
                cookie.path = val.to_string();
            }
        } else if key.eq_ignore_ascii_case("secure") {
            cookie.secure = true;
        } else if key.eq_ignore_ascii_case("httponly") {
            cookie.http_only = true;
        }
    }

    // Max-Age wins over Expires
    cookie.expires = if expired_by_max_age {
        Some(SystemTime::UNIX_EPOCH)
    } else if let Some(age) = max_age {
        Some(cookie.created + age)
    } else {
        expires_attr
    };

    Some(cookie)
}

/// The client's cookie store. Shared between the cookies middleware and the
/// client facade; mutation happens inside a short lock.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a cookie, replacing any existing `(domain, path, name)`
    /// entry while keeping its creation time.
    pub fn store(&self, mut cookie: Cookie) {
        let now = SystemTime::now();
        let mut cookies = self.cookies.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cookies.retain(|existing| !existing.is_expired(now));

        if let Some(position) = cookies.iter().position(|existing| {
            existing.name == cookie.name
                && existing.domain == cookie.domain
                && existing.path == cookie.path
        }) {
            cookie.created = cookies[position].created;
            cookies.remove(position);
        }
        trace!(name = %cookie.name, domain = %cookie.domain, path = %cookie.path, "storing cookie");
        cookies.push(cookie);
    }

    /// Builds the `Cookie` header value for a request: matching, unexpired
    /// cookies ordered longest-path-first then oldest-first. `None` when
    /// nothing matches.
    pub fn cookie_header(&self, uri: &RequestUri) -> Option<HeaderValue> {
        let now = SystemTime::now();
        let mut cookies = self.cookies.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cookies.retain(|cookie| !cookie.is_expired(now));

        let mut matching: Vec<&Cookie> =
            cookies.iter().filter(|cookie| cookie.matches(uri, now)).collect();
        if matching.is_empty() {
            return None;
        }
        matching.sort_by(|a, b| {
            b.path.len().cmp(&a.path.len()).then_with(|| a.created.cmp(&b.created))
        });

        let header = matching
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }

    pub fn len(&self) -> usize {
        self.cookies.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the stored cookies, for inspection.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

/// RFC 6265 §5.1.3: exact match, or `host` ends with `.domain` and is not
/// an IP address.
fn domain_matches(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    if host == domain {
        return true;
    }
    host.ends_with(&domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
        && host.parse::<std::net::IpAddr>().is_err()
}

/// RFC 6265 §5.1.4: path match.
fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    let request_path = if request_path.is_empty() { "/" } else { request_path };
    if request_path == cookie_path {
        return true;
    }
    request_path.len() > cookie_path.len()
        && request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes()[cookie_path.len()] == b'/')
}

/// RFC 6265 §5.1.4: default path of a request URI.
fn default_path(uri_path: &str) -> String {
    if !uri_path.starts_with('/') {
        return "/".to_string();
    }
    match uri_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(last_slash) => uri_path[..last_slash].to_string(),
    }
}
