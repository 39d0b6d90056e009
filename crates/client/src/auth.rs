//! Authorization header construction: Basic and Digest (RFC 7616).
//!
//! The digest computation is a pure function of the challenge, the
//! credentials, the request line and the client nonce material, so the
//! RFC test vectors can drive it directly. Mutable state is limited to
//! [`DigestState`], the per-(origin, realm) nonce counter that lives on the
//! client and persists across attempts and redirects to the same origin.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use http::HeaderValue;
use sha2::{Digest as _, Sha256};
use strand_http::protocol::headers::Challenge;
use strand_http::{Credentials, Error};

/// Builds `Authorization: Basic base64(user:pass)`.
pub fn basic_authorization(credentials: &Credentials) -> HeaderValue {
    let encoded =
        BASE64.encode(format!("{}:{}", credentials.username, credentials.password));
    // base64 output is always a valid header value
    HeaderValue::from_str(&format!("Basic {encoded}"))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic"))
}

/// Digest algorithms the client can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl DigestAlgorithm {
    /// Parses the challenge's `algorithm` parameter; absent means MD5.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value.map(str::to_ascii_uppercase).as_deref() {
            None | Some("MD5") => Some(Self::Md5),
            Some("MD5-SESS") => Some(Self::Md5Sess),
            Some("SHA-256") => Some(Self::Sha256),
            Some("SHA-256-SESS") => Some(Self::Sha256Sess),
            _ => None,
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, Self::Md5Sess | Self::Sha256Sess)
    }

    /// The token echoed back in the `algorithm` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
            Self::Sha256 => "SHA-256",
            Self::Sha256Sess => "SHA-256-sess",
        }
    }

    fn hash(&self, data: &[u8]) -> String {
        match self {
            Self::Md5 | Self::Md5Sess => format!("{:x}", md5::compute(data)),
            Self::Sha256 | Self::Sha256Sess => hex(Sha256::digest(data).as_slice()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    Auth,
    AuthInt,
}

impl Qop {
    pub fn as_str(&self) -> &'static str {
        match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
        }
    }
}

/// A digest challenge reduced to the parameters the computation needs.
#[derive(Debug, Clone)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: DigestAlgorithm,
    /// Offered quality-of-protection values, in offer order
    pub qop: Vec<Qop>,
}

impl DigestChallenge {
    /// Extracts a usable challenge; `None` when the algorithm or the
    /// parameter set is something this client cannot answer.
    pub fn from_challenge(challenge: &Challenge) -> Option<Self> {
        if !challenge.scheme.eq_ignore_ascii_case("digest") {
            return None;
        }
        let params: &HashMap<String, String> = &challenge.params;
        let algorithm = DigestAlgorithm::parse(params.get("algorithm").map(String::as_str))?;
        let nonce = params.get("nonce")?.clone();
        let realm = params.get("realm").cloned().unwrap_or_default();
        let qop = params
            .get("qop")
            .map(|offered| {
                offered
                    .split(',')
                    .filter_map(|item| match item.trim() {
                        "auth" => Some(Qop::Auth),
                        "auth-int" => Some(Qop::AuthInt),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            realm,
            nonce,
            opaque: params.get("opaque").cloned(),
            algorithm,
            qop,
        })
    }

    /// Picks the qop for this request: `auth` when offered, `auth-int`
    /// only when it is the sole offer and the entity body is available.
    fn select_qop(&self, body: Option<&[u8]>) -> Result<Option<Qop>, Error> {
        if self.qop.is_empty() {
            return Ok(None);
        }
        if self.qop.contains(&Qop::Auth) {
            return Ok(Some(Qop::Auth));
        }
        if self.qop.contains(&Qop::AuthInt) {
            if body.is_some() {
                return Ok(Some(Qop::AuthInt));
            }
            return Err(Error::authentication(
                "auth-int requires a replayable request body",
            ));
        }
        Err(Error::authentication("no supported qop offered"))
    }
}

/// Computes the `Authorization: Digest …` value per RFC 7616.
///
/// `cnonce` and `nc` are passed in so the caller controls randomness and
/// counter state; `body` is the entity body for `auth-int` (empty slice for
/// bodiless requests).
pub fn digest_authorization(
    challenge: &DigestChallenge,
    credentials: &Credentials,
    method: &str,
    uri_path: &str,
    body: Option<&[u8]>,
    cnonce: &str,
    nc: u32,
) -> Result<HeaderValue, Error> {
    let algorithm = challenge.algorithm;
    let qop = challenge.select_qop(body)?;
    let nc_value = format!("{nc:08x}");

    let a1 = format!("{}:{}:{}", credentials.username, challenge.realm, credentials.password);
    let ha1 = if algorithm.is_session() {
        let base = algorithm.hash(a1.as_bytes());
        algorithm.hash(format!("{base}:{}:{cnonce}", challenge.nonce).as_bytes())
    } else {
        algorithm.hash(a1.as_bytes())
    };

    let ha2 = match qop {
        Some(Qop::AuthInt) => {
            let body_hash = algorithm.hash(body.unwrap_or_default());
            algorithm.hash(format!("{method}:{uri_path}:{body_hash}").as_bytes())
        }
        _ => algorithm.hash(format!("{method}:{uri_path}").as_bytes()),
    };

    let response = match qop {
        Some(qop) => algorithm.hash(
            format!(
                "{ha1}:{}:{nc_value}:{cnonce}:{}:{ha2}",
                challenge.nonce,
                qop.as_str()
            )
            .as_bytes(),
        ),
        None => algorithm.hash(format!("{ha1}:{}:{ha2}", challenge.nonce).as_bytes()),
    };

    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", uri=\"{uri_path}\", algorithm={}, nonce=\"{}\"",
        credentials.username,
        challenge.realm,
        algorithm.as_str(),
        challenge.nonce,
    );
    if let Some(qop) = qop {
        let _ = write!(header, ", qop={}, nc={nc_value}, cnonce=\"{cnonce}\"", qop.as_str());
    }
    let _ = write!(header, ", response=\"{response}\"");
    if let Some(opaque) = &challenge.opaque {
        let _ = write!(header, ", opaque=\"{opaque}\"");
    }

    HeaderValue::from_str(&header)
        .map_err(|_| Error::authentication("challenge parameters are not header-safe"))
}

/// Generates the client nonce: 16 random bytes, hex encoded.
pub fn make_cnonce() -> String {
    hex(&rand::random::<[u8; 16]>())
}

/// Per-(origin, realm) nonce counters, scoped to the client so the count
/// survives retries and redirect hops back to the same origin.
#[derive(Debug, Default)]
pub struct DigestState {
    counters: Mutex<HashMap<(String, String), u32>>,
}

impl DigestState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `nc` value for this origin and realm, starting at 1.
    pub fn next_nonce_count(&self, origin: &str, realm: &str) -> u32 {
        let mut counters =
            self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let counter = counters.entry((origin.to_string(), realm.to_string())).or_insert(0);
        *counter += 1;
        *counter
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
