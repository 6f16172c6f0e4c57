//! Debug switches and redaction for request logging.
//!
//! `ASC_DEBUG` selects the baseline; process-wide overrides (set by the CLI's
//! `--debug` / `--debug-http` flags) are layered on top.

use std::{
    env,
    fmt::Write as _,
    sync::atomic::{AtomicU8, Ordering},
};

use reqwest::header::HeaderMap;
use url::Url;

pub const DEBUG_ENV: &str = "ASC_DEBUG";

const UNSET: u8 = 0;
const FORCED_OFF: u8 = 1;
const FORCED_ON: u8 = 2;

static DEBUG_OVERRIDE: AtomicU8 = AtomicU8::new(UNSET);
static HTTP_OVERRIDE: AtomicU8 = AtomicU8::new(UNSET);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugSettings {
    pub enabled: bool,
    pub verbose_http: bool,
}

impl DebugSettings {
    pub const OFF: Self = Self {
        enabled: false,
        verbose_http: false,
    };
}

pub fn set_debug_override(value: Option<bool>) {
    DEBUG_OVERRIDE.store(encode(value), Ordering::SeqCst);
}

pub fn set_debug_http_override(value: Option<bool>) {
    HTTP_OVERRIDE.store(encode(value), Ordering::SeqCst);
}

pub fn debug_override() -> Option<bool> {
    decode(DEBUG_OVERRIDE.load(Ordering::SeqCst))
}

pub fn debug_http_override() -> Option<bool> {
    decode(HTTP_OVERRIDE.load(Ordering::SeqCst))
}

/// Current settings from `ASC_DEBUG` and the process overrides.
pub fn resolve() -> DebugSettings {
    let env_value = env::var(DEBUG_ENV).ok();
    resolve_with(env_value.as_deref(), debug_override(), debug_http_override())
}

/// An explicit debug override replaces the environment and turns HTTP
/// verbosity off; an HTTP override then applies unless debug was forced off.
pub fn resolve_with(
    env_value: Option<&str>,
    debug: Option<bool>,
    http: Option<bool>,
) -> DebugSettings {
    let mut settings = from_env_value(env_value);
    if let Some(enabled) = debug {
        settings = DebugSettings {
            enabled,
            verbose_http: false,
        };
    }
    if debug != Some(false)
        && let Some(verbose) = http
    {
        settings.verbose_http = verbose;
        settings.enabled |= verbose;
    }
    settings
}

fn from_env_value(value: Option<&str>) -> DebugSettings {
    let Some(value) = value else {
        return DebugSettings::OFF;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => DebugSettings::OFF,
        "api" => DebugSettings {
            enabled: true,
            verbose_http: true,
        },
        _ => DebugSettings {
            enabled: true,
            verbose_http: false,
        },
    }
}

fn encode(value: Option<bool>) -> u8 {
    match value {
        None => UNSET,
        Some(false) => FORCED_OFF,
        Some(true) => FORCED_ON,
    }
}

fn decode(raw: u8) -> Option<bool> {
    match raw {
        FORCED_OFF => Some(false),
        FORCED_ON => Some(true),
        _ => None,
    }
}

/// Value of a header as it may appear in logs.
pub fn redact_header_value(name: &str, value: &str) -> String {
    if name.eq_ignore_ascii_case("authorization") {
        let scheme = value.split_whitespace().next().unwrap_or_default();
        if scheme.eq_ignore_ascii_case("bearer") {
            return "Bearer <redacted>".to_string();
        }
        return "<redacted>".to_string();
    }
    if name.eq_ignore_ascii_case("cookie")
        || name.eq_ignore_ascii_case("set-cookie")
        || name.eq_ignore_ascii_case("proxy-authorization")
    {
        return "<redacted>".to_string();
    }
    value.to_string()
}

/// One `name: value` line per header, secrets redacted.
pub fn format_headers(headers: &HeaderMap) -> String {
    let mut out = String::new();
    let mut names: Vec<_> = headers.keys().collect();
    names.sort_by_key(|n| n.as_str());
    names.dedup();
    for name in names {
        for value in headers.get_all(name) {
            let value = String::from_utf8_lossy(value.as_bytes());
            let _ = writeln!(out, "{}: {}", name, redact_header_value(name.as_str(), &value));
        }
    }
    out
}

fn is_signing_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower == "token"
        || lower == "signature"
        || lower == "sig"
        || lower == "access_token"
        || lower.starts_with("x-amz-")
        || lower.starts_with("x-goog-")
}

/// URL text safe for logs: no userinfo, signing parameters replaced, and every
/// query value replaced once a signature is present.
pub fn sanitize_url(url: &Url) -> String {
    let mut clean = url.clone();
    let _ = clean.set_username("");
    let _ = clean.set_password(None);

    let pairs: Vec<(String, String)> = clean
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        return clean.to_string();
    }

    let signed = pairs.iter().any(|(k, v)| {
        let lower = k.to_ascii_lowercase();
        (lower == "signature" || lower == "x-amz-signature") && !v.is_empty()
    });
    {
        let mut query = clean.query_pairs_mut();
        query.clear();
        for (key, value) in &pairs {
            if signed || is_signing_param(key) {
                query.append_pair(key, "REDACTED");
            } else {
                query.append_pair(key, value);
            }
        }
    }
    clean.to_string()
}

/// Same as [`sanitize_url`] for raw strings; unparseable input is hidden.
pub fn sanitize_url_str(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => sanitize_url(&url),
        Err(_) => "<unparseable url>".to_string(),
    }
}

const BODY_DUMP_LIMIT: usize = 4096;

/// Full request dump for HTTP-verbose mode.
pub fn dump_request(method: &str, url: &Url, headers: &HeaderMap, body: Option<&[u8]>) -> String {
    let mut out = format!("--> {method} {}\n", sanitize_url(url));
    out.push_str(&format_headers(headers));
    if let Some(body) = body.filter(|b| !b.is_empty()) {
        out.push('\n');
        out.push_str(&body_preview(body));
    }
    out
}

/// Full response dump for HTTP-verbose mode.
pub fn dump_response(status: u16, url: &Url, headers: &HeaderMap, body: &[u8]) -> String {
    let mut out = format!("<-- {status} {}\n", sanitize_url(url));
    out.push_str(&format_headers(headers));
    if !body.is_empty() {
        out.push('\n');
        out.push_str(&body_preview(body));
    }
    out
}

fn body_preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= BODY_DUMP_LIMIT {
        return text.into_owned();
    }
    let mut end = BODY_DUMP_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &text[..end], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{AUTHORIZATION, HeaderValue};

    #[test]
    fn request_dump_never_contains_token() {
        let jwt = "eyJraWQiOiJLRVkifQ.eyJhdWQiOiJhcHBzdG9yZWNvbm5lY3QtdjEifQ.sig";
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {jwt}")).unwrap());
        let url = Url::parse("https://api.appstoreconnect.apple.com/v1/apps?limit=1").unwrap();
        let dump = dump_request("GET", &url, &headers, Some(br#"{"a":1}"#));
        assert!(dump.starts_with("--> GET https://api.appstoreconnect.apple.com/v1/apps?limit=1"));
        assert!(!dump.contains(jwt));
        assert!(dump.contains("<redacted>"));
        assert!(dump.ends_with(r#"{"a":1}"#));
    }

    #[test]
    fn env_values() {
        assert_eq!(resolve_with(None, None, None), DebugSettings::OFF);
        assert_eq!(resolve_with(Some(""), None, None), DebugSettings::OFF);
        assert_eq!(resolve_with(Some("no"), None, None), DebugSettings::OFF);
        assert_eq!(
            resolve_with(Some("api"), None, None),
            DebugSettings { enabled: true, verbose_http: true }
        );
        for value in ["1", "true", "YES", "verbose"] {
            assert_eq!(
                resolve_with(Some(value), None, None),
                DebugSettings { enabled: true, verbose_http: false },
                "value {value}"
            );
        }
    }

    #[test]
    fn debug_override_suppresses_http_from_env() {
        assert_eq!(
            resolve_with(Some("api"), Some(true), None),
            DebugSettings { enabled: true, verbose_http: false }
        );
    }

    #[test]
    fn debug_off_dominates_http_override() {
        assert_eq!(resolve_with(Some("api"), Some(false), Some(true)), DebugSettings::OFF);
    }

    #[test]
    fn http_override_implies_debug() {
        assert_eq!(
            resolve_with(None, None, Some(true)),
            DebugSettings { enabled: true, verbose_http: true }
        );
        assert_eq!(
            resolve_with(Some("api"), None, Some(false)),
            DebugSettings { enabled: true, verbose_http: false }
        );
    }

    #[test]
    fn authorization_is_redacted() {
        let jwt = "eyJhbGciOiJFUzI1NiJ9.eyJpc3MiOiJ4In0.c2ln";
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {jwt}")).unwrap());
        headers.insert("accept", HeaderValue::from_static("application/json"));
        let dump = format_headers(&headers);
        assert!(!dump.contains(jwt));
        assert!(dump.contains("authorization: Bearer <redacted>"));
        assert!(dump.contains("accept: application/json"));
        assert_eq!(redact_header_value("Authorization", "Basic abc"), "<redacted>");
    }

    #[test]
    fn sanitizes_signed_urls() {
        let url = Url::parse(
            "https://user:pw@store.example.com/p?X-Amz-Signature=abc&X-Amz-Date=1&part=2",
        )
        .unwrap();
        let clean = sanitize_url(&url);
        assert!(!clean.contains("user"));
        assert!(!clean.contains("pw@"));
        assert!(!clean.contains("abc"));
        assert!(clean.contains("part=REDACTED"));

        let plain = Url::parse("https://api.example.com/v1/apps?limit=2&token=t0k").unwrap();
        let clean = sanitize_url(&plain);
        assert!(clean.contains("limit=2"));
        assert!(clean.contains("token=REDACTED"));
    }
}
