//! Signing and hash verification.
//!
//! [`create_signature`] mints signature values for clients and for the
//! credentials the server issues itself; [`verify_signature`] recomputes the
//! hash of a parsed envelope against an account and compares it in
//! constant time.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use hmac::{Hmac, KeyInit, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::account::AccountRecord;
use crate::canonical::{canonical_string, domain_name};
use crate::envelope::{SignatureEnvelope, SignatureVersion, encode_signature_value};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Expiry applied when the caller does not pick one.
const DEFAULT_EXPIRY_MS: i64 = 30_000;

/// Keyed hash used for a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// HMAC-SHA-1.
    Sha1,
    /// HMAC-SHA-256.
    Sha256,
}

impl SignatureVersion {
    /// Keyed hash used by this version.
    #[must_use]
    pub fn algorithm(self) -> HashAlgorithm {
        match self {
            Self::V1 => HashAlgorithm::Sha1,
            Self::V2 | Self::V3 | Self::V4 | Self::V5 => HashAlgorithm::Sha256,
        }
    }
}

/// `base64(HMAC(key, data))`.
///
/// # Examples
///
/// ```
/// use sigil_auth::signer::{HashAlgorithm, sign};
///
/// assert_eq!(
///     sign("key", "The quick brown fox jumps over the lazy dog", HashAlgorithm::Sha256),
///     "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg="
/// );
/// ```
#[must_use]
pub fn sign(key: &str, data: &str, algorithm: HashAlgorithm) -> String {
    let raw = match algorithm {
        HashAlgorithm::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(key.as_bytes())
                .expect("HMAC can accept keys of any length");
            mac.update(data.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(key.as_bytes())
                .expect("HMAC can accept keys of any length");
            mac.update(data.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
    };
    BASE64.encode(raw)
}

/// Body checksum carried in the envelope: `base64(SHA-1(body))`.
///
/// # Examples
///
/// ```
/// use sigil_auth::signer::body_checksum;
///
/// assert_eq!(body_checksum(b""), "2jmj7l5rSw0yVb/vlWAYkK/YBwk=");
/// ```
#[must_use]
pub fn body_checksum(body: &[u8]) -> String {
    BASE64.encode(Sha1::digest(body))
}

/// Options for [`create_signature`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct SignOptions {
    /// Protocol version, 4 unless stated.
    #[builder(default = SignatureVersion::V4)]
    pub version: SignatureVersion,
    /// Opaque vendor tag.
    #[builder(default, setter(into))]
    pub tag: String,
    /// Absolute expiry in epoch milliseconds. `0` means 30 seconds from
    /// now; a value smaller than now is taken as relative to now.
    #[builder(default)]
    pub expires: i64,
    /// Content type of the body being signed.
    #[builder(default, setter(into))]
    pub content_type: String,
    /// Body checksum, see [`body_checksum`].
    #[builder(default, setter(into))]
    pub checksum: String,
    /// Query string to sign instead of the one in the URI.
    #[builder(default, setter(strip_option, into))]
    pub query: Option<String>,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Cookie scope for session and bearer-token signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieScope {
    /// Registrable domain the cookie is valid for.
    pub domain: String,
    /// Lifetime in seconds.
    pub max_age_secs: i64,
    /// Absolute expiry in epoch milliseconds.
    pub expires: i64,
    /// Cookie path, always `/`.
    pub path: String,
}

/// A freshly minted signature value.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedSignature {
    /// The `version|tag|login|hash|expires|checksum|` value.
    pub value: String,
    /// Absolute expiry in epoch milliseconds.
    pub expires: i64,
    /// Cookie scope, for versions 2 and 3.
    pub cookie: Option<CookieScope>,
}

impl std::fmt::Debug for IssuedSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSignature")
            .field("expires", &self.expires)
            .field("cookie", &self.cookie)
            .finish_non_exhaustive()
    }
}

/// Sign a request for `login` with `secret`.
///
/// `uri` is a request target such as `/account/get?id=1`. Returns `None`
/// when the login or secret is empty, or for version 5 which cannot be
/// minted.
///
/// # Examples
///
/// ```
/// use sigil_auth::envelope::parse_signature_value;
/// use sigil_auth::signer::{SignOptions, create_signature};
///
/// let issued = create_signature(
///     "alice",
///     "s3cr3t",
///     "GET",
///     "api.example.com",
///     "/account/get?id=1",
///     &SignOptions::builder().expires(4_102_444_800_000).build(),
/// )
/// .unwrap();
/// let wire = parse_signature_value(&issued.value).unwrap();
/// assert_eq!(wire.login, "alice");
/// assert_eq!(wire.expires, 4_102_444_800_000);
/// ```
#[must_use]
pub fn create_signature(
    login: &str,
    secret: &str,
    method: &str,
    host: &str,
    uri: &str,
    options: &SignOptions,
) -> Option<IssuedSignature> {
    create_signature_at(login, secret, method, host, uri, options, Utc::now().timestamp_millis())
}

pub(crate) fn create_signature_at(
    login: &str,
    secret: &str,
    method: &str,
    host: &str,
    uri: &str,
    options: &SignOptions,
    now: i64,
) -> Option<IssuedSignature> {
    if login.is_empty() || secret.is_empty() || options.version == SignatureVersion::V5 {
        return None;
    }

    let mut expires = options.expires;
    if expires == 0 {
        expires = now + DEFAULT_EXPIRY_MS;
    }
    if expires < now {
        expires += now;
    }

    let uri = if uri.is_empty() { "/" } else { uri };
    let (path, uri_query) = uri.split_once('?').unwrap_or((uri, ""));
    let query = options.query.as_deref().unwrap_or(uri_query);

    let envelope = SignatureEnvelope {
        version: options.version,
        tag: options.tag.clone(),
        login: login.to_owned(),
        signature: String::new(),
        expires,
        checksum: options.checksum.clone(),
        source: None,
        method: method.to_owned(),
        host: crate::context::strip_port(host).to_ascii_lowercase(),
        path: path.to_owned(),
        query: query.to_owned(),
        content_type: options.content_type.to_ascii_lowercase(),
    };
    let canonical = canonical_string(&envelope, "")?;
    let hash = sign(secret, &canonical, options.version.algorithm());

    let cookie = matches!(options.version, SignatureVersion::V2 | SignatureVersion::V3).then(|| {
        CookieScope {
            domain: domain_name(&envelope.host),
            max_age_secs: (expires - now) / 1000,
            expires,
            path: "/".to_owned(),
        }
    });

    debug!(version = %options.version, login, expires, "minted signature");

    Some(IssuedSignature {
        value: encode_signature_value(
            options.version,
            &options.tag,
            login,
            &hash,
            expires,
            &options.checksum,
        ),
        expires,
        cookie,
    })
}

/// Key an account signs a given version with.
fn signing_key(version: SignatureVersion, account: &AccountRecord) -> String {
    match version {
        SignatureVersion::V1 | SignatureVersion::V2 => account.secret.clone(),
        SignatureVersion::V3 => format!(
            "{}:{}",
            account.secret,
            account.token_secret.as_deref().unwrap_or("")
        ),
        SignatureVersion::V4 => match account.auth_secret.as_deref() {
            Some(extra) => format!("{}:{extra}", account.secret),
            None => account.secret.clone(),
        },
        SignatureVersion::V5 => account.salt.clone(),
    }
}

/// Whether the envelope's hash was produced with the account's credentials.
///
/// For versions 1–4 the canonical string is rebuilt and signed with the
/// account's key. For version 5 the supplied password is hashed with the
/// account salt and compared with the stored password hash. Comparisons are
/// constant time.
#[must_use]
pub fn verify_signature(
    envelope: &SignatureEnvelope,
    account: &AccountRecord,
    signature_param: &str,
) -> bool {
    let key = signing_key(envelope.version, account);
    let (expected, provided) = match canonical_string(envelope, signature_param) {
        Some(canonical) => (
            sign(&key, &canonical, envelope.version.algorithm()),
            envelope.signature.as_str(),
        ),
        None => (
            sign(&key, &envelope.signature, HashAlgorithm::Sha256),
            account.password.as_str(),
        ),
    };

    if provided.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
