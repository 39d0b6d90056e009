//! Structured parsing of HTTP field values.
//!
//! Pure functions over header value strings: comma-splitting that respects
//! quoted strings, `;q=` weighted lists, `WWW-Authenticate` challenges and
//! media-type parameters. The header store itself is `http::HeaderMap`;
//! these helpers are the shared layer on top of it.

use std::collections::HashMap;

use http::HeaderValue;

/// Splits a field value on commas that sit outside double-quoted strings,
/// trimming surrounding whitespace. Empty elements are dropped.
pub fn split_list(value: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, ch) in value.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                let item = value[start..idx].trim();
                if !item.is_empty() {
                    items.push(item);
                }
                start = idx + 1;
            }
            _ => {}
        }
    }

    let last = value[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    items
}

/// Parses a qualified list such as `gzip; q=0.8, deflate`, returning
/// `(item, quality)` pairs in field order. A missing or malformed `q`
/// parameter counts as 1.0; items are lowercased.
pub fn parse_weighted(value: &str) -> Vec<(String, f32)> {
    split_list(value)
        .into_iter()
        .map(|item| {
            let mut parts = item.split(';');
            let name = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            let mut q = 1.0f32;
            for param in parts {
                if let Some((key, val)) = param.split_once('=') {
                    if key.trim().eq_ignore_ascii_case("q") {
                        if let Ok(parsed) = val.trim().parse::<f32>() {
                            if (0.0..=1.0).contains(&parsed) {
                                q = parsed;
                            }
                        }
                    }
                }
            }
            (name, q)
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

/// One authentication challenge from a `WWW-Authenticate` header: the
/// scheme token plus its parameters (keys lowercased, values unquoted).
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub scheme: String,
    pub params: HashMap<String, String>,
}

/// Parses every challenge offered across a set of `WWW-Authenticate`
/// values. Multiple challenges may share a header; a new challenge starts
/// wherever a list element leads with a scheme token (`Basic realm="x"`)
/// or consists of a bare token.
pub fn parse_challenges<'a>(values: impl IntoIterator<Item = &'a HeaderValue>) -> Vec<Challenge> {
    let mut challenges: Vec<Challenge> = Vec::new();

    for value in values {
        let Ok(text) = value.to_str() else { continue };
        for element in split_list(text) {
            match element.split_once(char::is_whitespace) {
                // `Scheme name=value` starts a new challenge
                Some((scheme, rest)) if is_token(scheme) => {
                    let mut challenge =
                        Challenge { scheme: scheme.to_string(), params: HashMap::new() };
                    if let Some((k, v)) = parse_param(rest) {
                        challenge.params.insert(k, v);
                    }
                    challenges.push(challenge);
                }
                // `name=value` continues the current challenge
                _ if element.contains('=') => {
                    if let (Some(challenge), Some((k, v))) =
                        (challenges.last_mut(), parse_param(element))
                    {
                        challenge.params.insert(k, v);
                    }
                }
                // a bare scheme token with no parameters
                _ if is_token(element) => {
                    challenges.push(Challenge { scheme: element.to_string(), params: HashMap::new() });
                }
                _ => {}
            }
        }
    }
    challenges
}

/// Extracts the `charset` parameter from a media type such as
/// `text/html; charset=utf-8`.
pub fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| unquote(value.trim()).to_ascii_lowercase())
    })
}

/// The default `Accept-Encoding` value advertising the codings the codec
/// can undo.
pub fn accept_encoding_value() -> HeaderValue {
    HeaderValue::from_static("gzip; q=1, deflate; q=1")
}

fn parse_param(input: &str) -> Option<(String, String)> {
    let (key, value) = input.split_once('=')?;
    let key = key.trim().to_ascii_lowercase();
    if key.is_empty() {
        return None;
    }
    Some((key, unquote(value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn is_token(input: &str) -> bool {
    !input.is_empty()
        && input.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_respects_quotes() {
        assert_eq!(split_list("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(split_list(r#"a="x,y", b"#), vec![r#"a="x,y""#, "b"]);
        assert_eq!(split_list(""), Vec::<&str>::new());
        assert_eq!(split_list("a,,b"), vec!["a", "b"]);
        assert_eq!(split_list(r#"a="quoted \"stuff, here\"", b"#).len(), 2);
    }

    #[test]
    fn weighted_parsing() {
        let parsed = parse_weighted("gzip; q=0.8, deflate, br;q=0");
        assert_eq!(
            parsed,
            vec![
                ("gzip".to_string(), 0.8),
                ("deflate".to_string(), 1.0),
                ("br".to_string(), 0.0)
            ]
        );
    }

    #[test]
    fn weighted_ignores_bad_q() {
        let parsed = parse_weighted("GZIP; q=nope, deflate; q=9");
        assert_eq!(parsed, vec![("gzip".to_string(), 1.0), ("deflate".to_string(), 1.0)]);
    }

    #[test]
    fn single_challenge() {
        let value = HeaderValue::from_static(r#"Basic realm="users""#);
        let parsed = parse_challenges([&value]);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].scheme, "Basic");
        assert_eq!(parsed[0].params["realm"], "users");
    }

    #[test]
    fn digest_challenge_params() {
        let value = HeaderValue::from_static(
            r#"Digest realm="http-auth@example.org", qop="auth, auth-int", algorithm=SHA-256, nonce="7ypf/xlj", opaque="FQhe/qaU""#,
        );
        let parsed = parse_challenges([&value]);
        assert_eq!(parsed.len(), 1);
        let c = &parsed[0];
        assert_eq!(c.scheme, "Digest");
        assert_eq!(c.params["realm"], "http-auth@example.org");
        assert_eq!(c.params["qop"], "auth, auth-int");
        assert_eq!(c.params["algorithm"], "SHA-256");
        assert_eq!(c.params["nonce"], "7ypf/xlj");
        assert_eq!(c.params["opaque"], "FQhe/qaU");
    }

    #[test]
    fn multiple_challenges_in_one_header() {
        let value = HeaderValue::from_static(r#"Basic realm="simple", Digest realm="api", nonce="abc""#);
        let parsed = parse_challenges([&value]);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].scheme, "Basic");
        assert_eq!(parsed[1].scheme, "Digest");
        assert_eq!(parsed[1].params["nonce"], "abc");
    }

    #[test]
    fn challenges_across_headers() {
        let a = HeaderValue::from_static(r#"Basic realm="one""#);
        let b = HeaderValue::from_static(r#"Digest realm="two", nonce="n""#);
        let parsed = parse_challenges([&a, &b]);
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn charset_extraction() {
        assert_eq!(charset("text/html; charset=UTF-8"), Some("utf-8".to_string()));
        assert_eq!(charset(r#"text/html; charset="iso-8859-1""#), Some("iso-8859-1".to_string()));
        assert_eq!(charset("application/json"), None);
    }
}
