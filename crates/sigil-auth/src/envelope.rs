//! The compact signature envelope and its transports.
//!
//! On the wire a signature is a single pipe-delimited value:
//!
//! ```text
//! version|tag|login|hash|expires|checksum|
//! ```
//!
//! It may arrive in a request header, a query parameter, an encrypted bearer
//! token, or a session field. [`parse_signature`] looks in that order and
//! records which [`SourceChannel`] carried it, because each
//! [`SignatureVersion`] is only valid on specific channels.

use std::fmt;

use sigil_core::SignatureConfig;
use tracing::debug;

use crate::context::RequestContext;
use crate::crypto::decrypt_token;

/// Signing protocol versions. Each fixes a canonical-string layout and a
/// hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureVersion {
    /// Legacy HMAC-SHA1 over the request line, not bound to the login.
    V1,
    /// Session-cookie signature, wildcarded over path/method/query.
    V2,
    /// Bearer-token signature, same shape as `V2` with the token secret mixed in.
    V3,
    /// Full request signature, the default.
    V4,
    /// Clear-text login/password check.
    V5,
}

impl SignatureVersion {
    /// Map a wire version number to a version.
    #[must_use]
    pub fn from_number(n: u64) -> Option<Self> {
        match n {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            4 => Some(Self::V4),
            5 => Some(Self::V5),
            _ => None,
        }
    }

    /// Wire version number.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
            Self::V4 => 4,
            Self::V5 => 5,
        }
    }

    /// Whether a signature of this version may arrive over `channel`.
    ///
    /// Session signatures only come from the session, bearer-token
    /// signatures only from a decrypted token, and every other version must
    /// come directly from a header or query parameter.
    #[must_use]
    pub fn accepts(self, channel: Option<SourceChannel>) -> bool {
        match self {
            Self::V2 => channel == Some(SourceChannel::Session),
            Self::V3 => channel == Some(SourceChannel::Token),
            Self::V1 | Self::V4 | Self::V5 => !matches!(
                channel,
                Some(SourceChannel::Token | SourceChannel::Session)
            ),
        }
    }
}

impl fmt::Display for SignatureVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Where a signature value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceChannel {
    /// Request header.
    Header,
    /// Query parameter.
    Query,
    /// Encrypted bearer token (query parameter or header).
    Token,
    /// Server-side session.
    Session,
}

impl fmt::Display for SourceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Header => "header",
            Self::Query => "query",
            Self::Token => "token",
            Self::Session => "session",
        })
    }
}

/// The fields carried by a signature value.
#[derive(Clone, PartialEq, Eq)]
pub struct WireSignature {
    /// Protocol version.
    pub version: SignatureVersion,
    /// Opaque vendor tag.
    pub tag: String,
    /// Account login.
    pub login: String,
    /// Claimed hash (or clear password for version 5).
    pub signature: String,
    /// Expiry in epoch milliseconds.
    pub expires: i64,
    /// Body checksum, may be empty.
    pub checksum: String,
}

impl fmt::Debug for WireSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireSignature")
            .field("version", &self.version)
            .field("tag", &self.tag)
            .field("login", &self.login)
            .field("expires", &self.expires)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

/// A parsed signature plus the request metadata it claims to cover.
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureEnvelope {
    /// Protocol version.
    pub version: SignatureVersion,
    /// Opaque vendor tag.
    pub tag: String,
    /// Account login; empty when no usable signature was found.
    pub login: String,
    /// Claimed hash (or clear password for version 5).
    pub signature: String,
    /// Expiry in epoch milliseconds.
    pub expires: i64,
    /// Body checksum, may be empty.
    pub checksum: String,
    /// Transport that carried the signature.
    pub source: Option<SourceChannel>,
    /// Request method.
    pub method: String,
    /// Request host, lower-cased and without port; empty when missing.
    pub host: String,
    /// Request path.
    pub path: String,
    /// Raw request query string.
    pub query: String,
    /// Lower-cased content type.
    pub content_type: String,
}

impl SignatureEnvelope {
    /// An envelope holding only the request-derived fields.
    ///
    /// The version defaults to [`SignatureVersion::V1`] and every signature
    /// field is empty until a value is applied.
    #[must_use]
    pub fn from_request(ctx: &RequestContext) -> Self {
        Self {
            version: SignatureVersion::V1,
            tag: String::new(),
            login: String::new(),
            signature: String::new(),
            expires: 0,
            checksum: String::new(),
            source: None,
            method: ctx.method.clone(),
            host: ctx.host().unwrap_or_default(),
            path: ctx.path.clone(),
            query: ctx.query.clone(),
            content_type: ctx.content_type(),
        }
    }

    /// Copy the signature fields from a parsed wire value.
    pub fn apply(&mut self, wire: WireSignature) {
        self.version = wire.version;
        self.tag = wire.tag;
        self.login = wire.login;
        self.signature = wire.signature;
        self.expires = wire.expires;
        self.checksum = wire.checksum;
    }
}

impl fmt::Debug for SignatureEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureEnvelope")
            .field("version", &self.version)
            .field("tag", &self.tag)
            .field("login", &self.login)
            .field("expires", &self.expires)
            .field("checksum", &self.checksum)
            .field("source", &self.source)
            .field("method", &self.method)
            .field("host", &self.host)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Format a signature value: `version|tag|login|hash|expires|checksum|`.
///
/// # Examples
///
/// ```
/// use sigil_auth::envelope::{SignatureVersion, encode_signature_value};
///
/// let value = encode_signature_value(SignatureVersion::V4, "", "alice", "abc=", 1000, "");
/// assert_eq!(value, "4||alice|abc=|1000||");
/// ```
#[must_use]
pub fn encode_signature_value(
    version: SignatureVersion,
    tag: &str,
    login: &str,
    hash: &str,
    expires: i64,
    checksum: &str,
) -> String {
    format!("{version}|{tag}|{login}|{hash}|{expires}|{checksum}|")
}

/// Parse a signature value into its fields.
///
/// The value must split on `|` into exactly seven fields, with version,
/// login, hash and expiry non-empty and the version one of 1–5. Anything
/// else yields `None`. A non-numeric expiry parses as `0`, which the
/// freshness check then rejects.
#[must_use]
pub fn parse_signature_value(value: &str) -> Option<WireSignature> {
    let fields: Vec<&str> = value.split('|').collect();
    let [version, tag, login, hash, expires, checksum, _trailer] = fields.as_slice() else {
        return None;
    };

    let login = login.trim();
    if version.is_empty() || login.is_empty() || hash.is_empty() || expires.is_empty() {
        return None;
    }

    let version = SignatureVersion::from_number(version.trim().parse().ok()?)?;

    Some(WireSignature {
        version,
        tag: (*tag).to_owned(),
        login: login.to_owned(),
        signature: (*hash).to_owned(),
        expires: expires.trim().parse().unwrap_or(0),
        checksum: (*checksum).to_owned(),
    })
}

/// Locate and parse the signature of a request.
///
/// Transports are tried in order: the signature header, the signature query
/// parameter, the encrypted bearer token (query parameter, then header), and
/// finally the session. A token that fails to decrypt counts as absent. When
/// nothing usable is found the envelope carries only request-derived fields
/// and an empty login.
#[must_use]
pub fn parse_signature(ctx: &RequestContext, config: &SignatureConfig) -> SignatureEnvelope {
    let mut envelope = SignatureEnvelope::from_request(ctx);

    let Some((raw, source)) = locate_signature(ctx, config) else {
        return envelope;
    };
    envelope.source = Some(source);

    match parse_signature_value(&raw) {
        Some(wire) => {
            debug!(
                version = %wire.version,
                login = %wire.login,
                expires = wire.expires,
                source = %source,
                "parsed request signature"
            );
            envelope.apply(wire);
        }
        None => debug!(source = %source, "signature value does not match the envelope format"),
    }

    envelope
}

/// Find the raw signature value and the channel it came from.
fn locate_signature(
    ctx: &RequestContext,
    config: &SignatureConfig,
) -> Option<(String, SourceChannel)> {
    let name = config.header_name.as_str();

    if let Some(v) = ctx.header(name).filter(|v| !v.is_empty()) {
        return Some((v.to_owned(), SourceChannel::Header));
    }
    if let Some(v) = ctx.query_param(name).filter(|v| !v.is_empty()) {
        return Some((v.to_owned(), SourceChannel::Query));
    }

    let token_name = config.access_token_name.as_str();
    let token = ctx
        .query_param(token_name)
        .filter(|v| !v.is_empty())
        .or_else(|| ctx.header(token_name).filter(|v| !v.is_empty()));
    if let Some(token) = token {
        match decrypt_token(&config.access_token_secret, token) {
            Ok(v) if !v.is_empty() => return Some((v, SourceChannel::Token)),
            Ok(_) => {}
            Err(err) => debug!(error = %err, "ignoring undecryptable access token"),
        }
    }

    ctx.session
        .as_ref()
        .and_then(|s| s.get(name))
        .filter(|v| !v.is_empty())
        .map(|v| (v.clone(), SourceChannel::Session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Session;
    use crate::crypto::encrypt_token;

    fn config() -> SignatureConfig {
        SignatureConfig::builder()
            .access_token_secret("token-key".into())
            .build()
    }

    #[test]
    fn test_should_parse_full_signature_value() {
        let wire = parse_signature_value("4|vendor|alice|aGFzaA==|1700000000000|c2hh|").unwrap();
        assert_eq!(wire.version, SignatureVersion::V4);
        assert_eq!(wire.tag, "vendor");
        assert_eq!(wire.login, "alice");
        assert_eq!(wire.signature, "aGFzaA==");
        assert_eq!(wire.expires, 1_700_000_000_000);
        assert_eq!(wire.checksum, "c2hh");
    }

    #[test]
    fn test_should_allow_empty_tag_and_checksum() {
        let wire = parse_signature_value("2||bob|h|5||").unwrap();
        assert_eq!(wire.tag, "");
        assert_eq!(wire.checksum, "");
    }

    #[test]
    fn test_should_trim_login() {
        let wire = parse_signature_value("4|| bob |h|5||").unwrap();
        assert_eq!(wire.login, "bob");
    }

    #[test]
    fn test_should_reject_values_that_do_not_match_envelope() {
        // missing trailing separator
        assert!(parse_signature_value("4||alice|h|5|").is_none());
        // extra field
        assert!(parse_signature_value("4||alice|h|5|||").is_none());
        // required fields empty
        assert!(parse_signature_value("4|||h|5||").is_none());
        assert!(parse_signature_value("4||alice||5||").is_none());
        assert!(parse_signature_value("||alice|h|5||").is_none());
        assert!(parse_signature_value("4||alice|h|||").is_none());
        // unknown version
        assert!(parse_signature_value("9||alice|h|5||").is_none());
        assert!(parse_signature_value("x||alice|h|5||").is_none());
        assert!(parse_signature_value("").is_none());
    }

    #[test]
    fn test_should_parse_non_numeric_expiry_as_zero() {
        assert_eq!(parse_signature_value("4||a|h|soon||").unwrap().expires, 0);
    }

    #[test]
    fn test_should_recover_fields_from_encoded_value() {
        let value = encode_signature_value(SignatureVersion::V1, "t", "carol", "h+/=", 42, "ck");
        let wire = parse_signature_value(&value).unwrap();
        assert_eq!(wire.version, SignatureVersion::V1);
        assert_eq!(wire.login, "carol");
        assert_eq!(wire.expires, 42);
        assert_eq!(wire.checksum, "ck");
    }

    #[test]
    fn test_should_prefer_header_over_query() {
        let ctx = RequestContext::new("GET", "/x?bk-signature=4%7C%7Cquery%7Ch%7C1%7C%7C")
            .with_header("bk-signature", "4||header|h|1||");
        let env = parse_signature(&ctx, &config());
        assert_eq!(env.login, "header");
        assert_eq!(env.source, Some(SourceChannel::Header));
    }

    #[test]
    fn test_should_read_signature_from_query() {
        let ctx = RequestContext::new("GET", "/x?bk-signature=4%7C%7Cq%7Ch%7C1%7C%7C");
        let env = parse_signature(&ctx, &config());
        assert_eq!(env.login, "q");
        assert_eq!(env.source, Some(SourceChannel::Query));
    }

    #[test]
    fn test_should_decrypt_access_token() {
        let token = encrypt_token("token-key", "3||tok|h|1||").unwrap();
        let ctx = RequestContext::new("GET", "/x").with_header("bk-access-token", &token);
        let env = parse_signature(&ctx, &config());
        assert_eq!(env.login, "tok");
        assert_eq!(env.version, SignatureVersion::V3);
        assert_eq!(env.source, Some(SourceChannel::Token));
    }

    #[test]
    fn test_should_fall_back_to_session_when_token_is_bad() {
        let mut session = Session::new();
        session.insert("bk-signature".into(), "2||sess|h|1||".into());
        let ctx = RequestContext::new("GET", "/x?bk-access-token=deadbeef").with_session(session);
        let env = parse_signature(&ctx, &config());
        assert_eq!(env.login, "sess");
        assert_eq!(env.source, Some(SourceChannel::Session));
    }

    #[test]
    fn test_should_return_empty_envelope_without_signature() {
        let ctx = RequestContext::new("POST", "/x?a=1")
            .with_header("host", "Example.com:80")
            .with_header("content-type", "Application/JSON");
        let env = parse_signature(&ctx, &config());
        assert_eq!(env.version, SignatureVersion::V1);
        assert!(env.login.is_empty());
        assert!(env.source.is_none());
        assert_eq!(env.method, "POST");
        assert_eq!(env.host, "example.com");
        assert_eq!(env.query, "a=1");
        assert_eq!(env.content_type, "application/json");
    }

    #[test]
    fn test_should_keep_channel_for_malformed_value() {
        let ctx = RequestContext::new("GET", "/x").with_header("bk-signature", "garbage");
        let env = parse_signature(&ctx, &config());
        assert!(env.login.is_empty());
        assert_eq!(env.source, Some(SourceChannel::Header));
    }

    #[test]
    fn test_should_enforce_channel_rules_per_version() {
        use SourceChannel::{Header, Query, Session, Token};

        assert!(SignatureVersion::V2.accepts(Some(Session)));
        assert!(!SignatureVersion::V2.accepts(Some(Header)));
        assert!(SignatureVersion::V3.accepts(Some(Token)));
        assert!(!SignatureVersion::V3.accepts(Some(Query)));
        for v in [SignatureVersion::V1, SignatureVersion::V4, SignatureVersion::V5] {
            assert!(v.accepts(Some(Header)));
            assert!(v.accepts(Some(Query)));
            assert!(!v.accepts(Some(Token)));
            assert!(!v.accepts(Some(Session)));
        }
    }

    #[test]
    fn test_should_not_render_signature_in_debug_output() {
        let wire = parse_signature_value("4||alice|SECRETHASH|1||").unwrap();
        assert!(!format!("{wire:?}").contains("SECRETHASH"));
    }
}
