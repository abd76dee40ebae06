//! Per-request state threaded through the authentication pipeline.
//!
//! A [`RequestContext`] is created once per incoming request, owned by the
//! task serving it, and mutated in place as the gates and the verifier make
//! progress: the parsed signature, the resolved account, the decrypted body,
//! and any credentials issued for the client are all recorded here.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{CONTENT_TYPE, HOST};
use serde_json::{Map, Value};
use sigil_core::Pattern;

use crate::account::AccountRecord;
use crate::envelope::SignatureEnvelope;

/// Server-side session values, keyed by field name.
pub type Session = HashMap<String, String>;

/// Parameters decoded from the request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BodyParams {
    /// No body, or a body that is not parameter-shaped.
    #[default]
    None,
    /// `application/x-www-form-urlencoded` pairs, in order.
    Form(Vec<(String, String)>),
    /// Top-level members of a JSON object body.
    Json(Map<String, Value>),
}

/// A bearer token minted for the client after a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Parameter/header name the client must send the token under.
    pub name: String,
    /// Encrypted, hex-encoded token value.
    pub value: String,
    /// Token lifetime in milliseconds.
    pub max_age_ms: i64,
}

/// Everything the pipeline knows about one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP method; empty when unknown.
    pub method: String,
    /// Request path, without the query string.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw request body; replaced by the plaintext once an encrypted body
    /// has been decrypted.
    pub body: Bytes,
    /// Parameters decoded from the body.
    pub body_params: BodyParams,
    /// Client address, as matched by the IP gates.
    pub client_ip: IpAddr,
    /// Session values, when a session layer is present.
    pub session: Option<Session>,
    /// The parsed signature, once the verifier has looked for one.
    pub signature: Option<SignatureEnvelope>,
    /// The authenticated account.
    pub account: Option<Arc<AccountRecord>>,
    /// Set when no login was supplied at all.
    pub unsigned: bool,
    /// Bearer token minted for the client during this request.
    pub issued_token: Option<IssuedToken>,
    query_params: Vec<(String, String)>,
}

impl RequestContext {
    /// Create a context for `method` and a request target such as
    /// `/account/get?id=1`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sigil_auth::RequestContext;
    ///
    /// let ctx = RequestContext::new("GET", "/account/get?id=1&x=2");
    /// assert_eq!(ctx.path, "/account/get");
    /// assert_eq!(ctx.query, "id=1&x=2");
    /// assert_eq!(ctx.query_param("id"), Some("1"));
    /// ```
    #[must_use]
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method: method.into(),
            path: path.to_owned(),
            query: query.to_owned(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            body_params: BodyParams::None,
            client_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            session: None,
            signature: None,
            account: None,
            unsigned: false,
            issued_token: None,
            query_params: parse_pairs(query.as_bytes()),
        }
    }

    /// Create a context from request parts, the collected body, and the peer address.
    #[must_use]
    pub fn from_parts(parts: &http::request::Parts, body: Bytes, client_ip: IpAddr) -> Self {
        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_owned(), ToString::to_string);
        let mut ctx = Self::new(parts.method.as_str(), &target);
        ctx.headers = parts.headers.clone();
        ctx.client_ip = client_ip;
        ctx.set_body(body);
        ctx
    }

    /// Add a header, replacing any previous value.
    ///
    /// Invalid header names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set the body and decode its parameters.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.set_body(body.into());
        self
    }

    /// Attach a session.
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the client address.
    #[must_use]
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = ip;
        self
    }

    /// Value of a header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `Host` header with any port removed, lower-cased.
    #[must_use]
    pub fn host(&self) -> Option<String> {
        self.headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(|h| strip_port(h).to_ascii_lowercase())
            .filter(|h| !h.is_empty())
    }

    /// Lower-cased `Content-Type` header, empty when absent.
    #[must_use]
    pub fn content_type(&self) -> String {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase()
    }

    /// First decoded value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decoded query parameters, in request order.
    #[must_use]
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query_params
    }

    /// Overwrite the value of a query parameter, if present.
    ///
    /// The raw query string is rewritten too, so [`url`](Self::url) no
    /// longer carries the old value.
    pub fn blank_query_param(&mut self, name: &str) {
        let mut changed = false;
        for (k, v) in &mut self.query_params {
            if k == name && !v.is_empty() {
                v.clear();
                changed = true;
            }
        }
        if changed {
            self.query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.query_params.iter())
                .finish();
        }
    }

    /// Path plus query string, as it appeared on the request line.
    #[must_use]
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    /// Replace the body and decode its parameters from the content type.
    pub fn set_body(&mut self, body: Bytes) {
        self.body_params = decode_body(&self.content_type(), &body);
        self.body = body;
    }

    /// Remove every query and body parameter whose name matches `pattern`.
    pub fn remove_params(&mut self, pattern: &Pattern) {
        let before = self.query_params.len();
        self.query_params.retain(|(k, _)| !pattern.is_match(k));
        if self.query_params.len() != before {
            self.query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.query_params.iter())
                .finish();
        }

        match &mut self.body_params {
            BodyParams::None => {}
            BodyParams::Form(pairs) => pairs.retain(|(k, _)| !pattern.is_match(k)),
            BodyParams::Json(map) => map.retain(|k, _| !pattern.is_match(k)),
        }
    }
}

/// Remove a trailing `:port` from a host, keeping bracketed IPv6 literals intact.
pub(crate) fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split_once(']').map_or(host, |(addr, _)| addr);
    }
    host.split(':').next().unwrap_or(host)
}

fn parse_pairs(input: &[u8]) -> Vec<(String, String)> {
    form_urlencoded::parse(input).into_owned().collect()
}

fn decode_body(content_type: &str, body: &[u8]) -> BodyParams {
    if body.is_empty() {
        return BodyParams::None;
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        return BodyParams::Form(parse_pairs(body));
    }
    if content_type.starts_with("application/json") {
        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
            return BodyParams::Json(map);
        }
    }
    BodyParams::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_split_target_into_path_and_query() {
        let ctx = RequestContext::new("GET", "/a/b?x=1&y=%20z");
        assert_eq!(ctx.path, "/a/b");
        assert_eq!(ctx.query, "x=1&y=%20z");
        assert_eq!(ctx.query_param("y"), Some(" z"));
        assert_eq!(ctx.url(), "/a/b?x=1&y=%20z");
    }

    #[test]
    fn test_should_default_empty_path_to_slash() {
        let ctx = RequestContext::new("GET", "?a=1");
        assert_eq!(ctx.path, "/");
        assert_eq!(RequestContext::new("GET", "/x").url(), "/x");
    }

    #[test]
    fn test_should_strip_port_and_lowercase_host() {
        let ctx = RequestContext::new("GET", "/").with_header("host", "API.Example.com:8080");
        assert_eq!(ctx.host().as_deref(), Some("api.example.com"));
        assert_eq!(strip_port("[::1]:8000"), "::1");
        assert!(RequestContext::new("GET", "/").host().is_none());
    }

    #[test]
    fn test_should_decode_form_and_json_bodies() {
        let ctx = RequestContext::new("POST", "/")
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_body("a=1&b=2");
        assert_eq!(
            ctx.body_params,
            BodyParams::Form(vec![("a".into(), "1".into()), ("b".into(), "2".into())])
        );

        let ctx = RequestContext::new("POST", "/")
            .with_header("content-type", "application/json; charset=utf-8")
            .with_body(r#"{"a":1}"#);
        assert!(matches!(ctx.body_params, BodyParams::Json(ref m) if m.contains_key("a")));

        let ctx = RequestContext::new("POST", "/").with_body("opaque");
        assert_eq!(ctx.body_params, BodyParams::None);
    }

    #[test]
    fn test_should_remove_matching_params_from_query_and_body() {
        let pattern = Pattern::new_case_insensitive("^_").unwrap();
        let mut ctx = RequestContext::new("POST", "/x?_debug=1&id=7")
            .with_header("content-type", "application/json")
            .with_body(r#"{"_admin":true,"name":"n"}"#);

        ctx.remove_params(&pattern);

        assert_eq!(ctx.query_param("_debug"), None);
        assert_eq!(ctx.query_param("id"), Some("7"));
        assert_eq!(ctx.query, "id=7");
        match ctx.body_params {
            BodyParams::Json(map) => {
                assert!(!map.contains_key("_admin"));
                assert!(map.contains_key("name"));
            }
            other => panic!("unexpected body params: {other:?}"),
        }
    }

    #[test]
    fn test_should_blank_query_param() {
        let mut ctx = RequestContext::new("GET", "/login?login=bob&password=p");
        ctx.blank_query_param("password");
        assert_eq!(ctx.query_param("password"), Some(""));
        assert_eq!(ctx.query_param("login"), Some("bob"));
        assert_eq!(ctx.query, "login=bob&password=");
        assert_eq!(ctx.url(), "/login?login=bob&password=");
    }

    #[test]
    fn test_should_build_from_request_parts() {
        let (parts, ()) = http::Request::builder()
            .method("PUT")
            .uri("http://example.com:8000/item?id=3")
            .header("host", "example.com:8000")
            .body(())
            .unwrap()
            .into_parts();
        let ctx = RequestContext::from_parts(&parts, Bytes::new(), "10.0.0.1".parse().unwrap());
        assert_eq!(ctx.method, "PUT");
        assert_eq!(ctx.path, "/item");
        assert_eq!(ctx.query, "id=3");
        assert_eq!(ctx.host().as_deref(), Some("example.com"));
        assert_eq!(ctx.client_ip.to_string(), "10.0.0.1");
    }
}
