//! Canonical strings for each signature version.
//!
//! Every field is followed by a newline, including the last one:
//!
//! ```text
//! v1:    method\nhost\npath\nquery\nexpires\ncontent-type\nchecksum\n
//! v2/v3: version\ntag\nlogin\n*\ndomain\n/\n*\nexpires\n*\n*\n
//! v4:    version\ntag\nlogin\nmethod\nhost\npath\nquery\nexpires\ncontent-type\nchecksum\n
//! ```
//!
//! Version 5 has no canonical string; it hashes the supplied password.

use std::net::IpAddr;

use crate::envelope::{SignatureEnvelope, SignatureVersion};

/// Canonical form of a query string.
///
/// The signature parameter (exact key match on the text before the first
/// `=`) and empty segments are removed, and the remaining segments are
/// sorted by their raw bytes. No percent-decoding is performed. An empty
/// `signature_param` removes nothing.
///
/// # Examples
///
/// ```
/// use sigil_auth::canonical::canonical_query;
///
/// assert_eq!(canonical_query("b=2&&a=1&bk-signature=x", "bk-signature"), "a=1&b=2");
/// ```
#[must_use]
pub fn canonical_query(query: &str, signature_param: &str) -> String {
    let mut parts: Vec<&str> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .filter(|p| signature_param.is_empty() || p.split('=').next() != Some(signature_param))
        .collect();
    parts.sort_unstable();
    parts.join("&")
}

/// Registrable domain of a host, used to scope session signatures.
///
/// The port is stripped and the name lower-cased. IP literals are returned
/// unchanged; names with more than two labels lose their first label.
///
/// # Examples
///
/// ```
/// use sigil_auth::canonical::domain_name;
///
/// assert_eq!(domain_name("API.Example.com:8080"), "example.com");
/// assert_eq!(domain_name("example.com"), "example.com");
/// assert_eq!(domain_name("10.0.0.1"), "10.0.0.1");
/// ```
#[must_use]
pub fn domain_name(host: &str) -> String {
    let host = crate::context::strip_port(host).to_ascii_lowercase();
    if host.parse::<IpAddr>().is_ok() {
        return host;
    }
    match host.split_once('.') {
        Some((_, rest)) if rest.contains('.') => rest.to_owned(),
        _ => host,
    }
}

/// Canonical string for an envelope, or `None` for version 5.
#[must_use]
pub fn canonical_string(envelope: &SignatureEnvelope, signature_param: &str) -> Option<String> {
    let e = envelope;
    match e.version {
        SignatureVersion::V1 => Some(format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n{}\n",
            e.method,
            e.host,
            e.path,
            canonical_query(&e.query, signature_param),
            e.expires,
            e.content_type,
            e.checksum,
        )),
        SignatureVersion::V2 | SignatureVersion::V3 => Some(format!(
            "{}\n{}\n{}\n*\n{}\n/\n*\n{}\n*\n*\n",
            e.version,
            e.tag,
            e.login,
            domain_name(&e.host),
            e.expires,
        )),
        SignatureVersion::V4 => Some(format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n",
            e.version,
            e.tag,
            e.login,
            e.method,
            e.host,
            e.path,
            canonical_query(&e.query, signature_param),
            e.expires,
            e.content_type,
            e.checksum,
        )),
        SignatureVersion::V5 => None,
    }
}
