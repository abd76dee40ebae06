//! Configuration management for Sigil.
//!
//! Configuration is a JSON document (camelCase keys) optionally named by
//! `SIGIL_CONFIG`, with individual environment variables layered on top.
//! Every field has a default, so an empty environment yields a working
//! (if permissive) setup.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::error::{SigilError, SigilResult};

/// Seven days in milliseconds.
const DEFAULT_ACCESS_TOKEN_AGE_MS: i64 = 7 * 86_400_000;

/// Fourteen days in milliseconds.
const DEFAULT_SESSION_AGE_MS: i64 = 14 * 86_400_000;

/// Top-level Sigil configuration.
///
/// # Examples
///
/// ```
/// use sigil_core::SigilConfig;
///
/// let config = SigilConfig::default();
/// assert_eq!(config.gateway_listen, "0.0.0.0:8000");
/// assert_eq!(config.signature.header_name, "bk-signature");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase", default)]
pub struct SigilConfig {
    /// Bind address for the server (e.g. `"0.0.0.0:8000"`).
    #[builder(default = String::from("0.0.0.0:8000"))]
    pub gateway_listen: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Signature transport and freshness settings.
    #[builder(default)]
    pub signature: SignatureConfig,

    /// Access and authorization pattern lists.
    #[builder(default)]
    pub access: AccessConfig,
}

impl Default for SigilConfig {
    fn default() -> Self {
        Self {
            gateway_listen: String::from("0.0.0.0:8000"),
            log_level: String::from("info"),
            signature: SignatureConfig::default(),
            access: AccessConfig::default(),
        }
    }
}

/// Where signatures travel and how long they stay valid.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase", default)]
pub struct SignatureConfig {
    /// Header, query parameter, and session field carrying the signature.
    #[builder(default = String::from("bk-signature"))]
    pub header_name: String,

    /// Header or query parameter carrying the encrypted bearer token.
    #[builder(default = String::from("bk-access-token"))]
    pub access_token_name: String,

    /// Server-side secret used to encrypt and decrypt bearer tokens.
    #[builder(default)]
    pub access_token_secret: String,

    /// Freshness window in milliseconds: a signature whose expiry is older
    /// than `now - signature_age_ms` is rejected.
    #[builder(default = 0)]
    pub signature_age_ms: i64,

    /// Lifetime of issued bearer tokens in milliseconds.
    #[builder(default = DEFAULT_ACCESS_TOKEN_AGE_MS)]
    pub access_token_age_ms: i64,

    /// Lifetime of issued session signatures in milliseconds.
    #[builder(default = DEFAULT_SESSION_AGE_MS)]
    pub session_age_ms: i64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            header_name: String::from("bk-signature"),
            access_token_name: String::from("bk-access-token"),
            access_token_secret: String::new(),
            signature_age_ms: 0,
            access_token_age_ms: DEFAULT_ACCESS_TOKEN_AGE_MS,
            session_age_ms: DEFAULT_SESSION_AGE_MS,
        }
    }
}

/// Regex sources for the access and authorization gates.
///
/// Each list is compiled into a single set; a request matches the list when
/// any entry matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessConfig {
    /// Paths served without any signature.
    #[builder(default)]
    pub allow: Vec<String>,
    /// Paths refused outright.
    #[builder(default)]
    pub deny: Vec<String>,
    /// Client IPs served without any signature.
    #[builder(default)]
    pub allow_ip: Vec<String>,
    /// Client IPs refused outright.
    #[builder(default)]
    pub deny_ip: Vec<String>,
    /// Paths reserved for accounts of type `admin`.
    #[builder(default)]
    pub allow_admin: Vec<String>,
    /// Paths reserved for accounts of a given type, keyed by type.
    #[builder(default)]
    pub allow_account: BTreeMap<String, Vec<String>>,
    /// Paths that accept requests without a login.
    #[builder(default)]
    pub allow_anonymous: Vec<String>,
    /// Paths that refuse session-cookie authentication.
    #[builder(default)]
    pub disable_session: Vec<String>,
}

impl SigilConfig {
    /// Read a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`SigilError::Io`] if the file cannot be read or
    /// [`SigilError::Json`] if it does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> SigilResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SigilError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Load configuration from `SIGIL_CONFIG` (if set) and environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SIGIL_CONFIG` | *(unset)* |
    /// | `GATEWAY_LISTEN` | `0.0.0.0:8000` |
    /// | `LOG_LEVEL` | `info` |
    /// | `SIGIL_SIGNATURE_HEADER` | `bk-signature` |
    /// | `SIGIL_ACCESS_TOKEN_NAME` | `bk-access-token` |
    /// | `SIGIL_ACCESS_TOKEN_SECRET` | *(empty)* |
    /// | `SIGIL_SIGNATURE_AGE` | `0` |
    /// | `SIGIL_ACCESS_TOKEN_AGE` | `604800000` |
    /// | `SIGIL_SESSION_AGE` | `1209600000` |
    ///
    /// `SIGIL_ALLOW`, `SIGIL_DENY`, `SIGIL_ALLOW_IP`, `SIGIL_DENY_IP`,
    /// `SIGIL_ALLOW_ADMIN`, `SIGIL_ALLOW_ANONYMOUS` and `SIGIL_DISABLE_SESSION`
    /// each append one pattern to the corresponding list.
    ///
    /// # Errors
    ///
    /// Returns an error if `SIGIL_CONFIG` names an unreadable or invalid file,
    /// or a numeric variable does not parse.
    pub fn from_env() -> SigilResult<Self> {
        let mut config = match std::env::var("SIGIL_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };

        if let Ok(v) = std::env::var("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        let sig = &mut config.signature;
        if let Ok(v) = std::env::var("SIGIL_SIGNATURE_HEADER") {
            sig.header_name = v;
        }
        if let Ok(v) = std::env::var("SIGIL_ACCESS_TOKEN_NAME") {
            sig.access_token_name = v;
        }
        if let Ok(v) = std::env::var("SIGIL_ACCESS_TOKEN_SECRET") {
            sig.access_token_secret = v;
        }
        if let Ok(v) = std::env::var("SIGIL_SIGNATURE_AGE") {
            sig.signature_age_ms = parse_millis("SIGIL_SIGNATURE_AGE", &v)?;
        }
        if let Ok(v) = std::env::var("SIGIL_ACCESS_TOKEN_AGE") {
            sig.access_token_age_ms = parse_millis("SIGIL_ACCESS_TOKEN_AGE", &v)?;
        }
        if let Ok(v) = std::env::var("SIGIL_SESSION_AGE") {
            sig.session_age_ms = parse_millis("SIGIL_SESSION_AGE", &v)?;
        }

        let access = &mut config.access;
        for (name, list) in [
            ("SIGIL_ALLOW", &mut access.allow),
            ("SIGIL_DENY", &mut access.deny),
            ("SIGIL_ALLOW_IP", &mut access.allow_ip),
            ("SIGIL_DENY_IP", &mut access.deny_ip),
            ("SIGIL_ALLOW_ADMIN", &mut access.allow_admin),
            ("SIGIL_ALLOW_ANONYMOUS", &mut access.allow_anonymous),
            ("SIGIL_DISABLE_SESSION", &mut access.disable_session),
        ] {
            if let Ok(v) = std::env::var(name) {
                if !v.is_empty() {
                    list.push(v);
                }
            }
        }

        Ok(config)
    }
}

/// Parse a non-negative millisecond count.
fn parse_millis(name: &str, value: &str) -> SigilResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| {
            SigilError::Config(format!(
                "{name} must be a non-negative integer, got {value:?}"
            ))
        })
}
