//! Error types for signature authentication.
//!
//! Every terminal failure of the verification pipeline is an [`AuthError`]
//! variant. Each variant knows the HTTP status it is reported with and the
//! broad [`ErrorCategory`] it belongs to. Messages never include secrets,
//! hashes, or the signature value itself.

use http::StatusCode;

use crate::envelope::{SignatureVersion, SourceChannel};

/// Broad classes of authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed envelope or wrong transport channel.
    Protocol,
    /// Stale signature or expired account.
    Freshness,
    /// Hash or password mismatch.
    Authentication,
    /// ACL, role, or hook denial.
    Authorization,
    /// Account store failure.
    Backend,
}

/// Errors that can occur while verifying a signed request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request has no method or no host.
    #[error("Invalid request")]
    MissingRequestLine,

    /// No signature with a login was found in any transport.
    #[error("No login provided")]
    NoLogin,

    /// The signature expired before the freshness window.
    #[error("Expired request, check your clock, server time is {server_time}")]
    StaleSignature {
        /// Server time, formatted for the client.
        server_time: String,
    },

    /// The signature version arrived over a channel it is not allowed on.
    #[error("Invalid request")]
    ChannelMismatch {
        /// Declared signature version.
        version: SignatureVersion,
        /// Channel the signature arrived on.
        channel: Option<SourceChannel>,
    },

    /// The account store failed.
    #[error("{0}")]
    AccountLookup(String),

    /// No account exists for the login.
    #[error("No account record found")]
    AccountNotFound,

    /// The account has passed its expiry time.
    #[error("This account has expired")]
    AccountExpired,

    /// The request line matches the account's deny ACL.
    #[error("Access denied")]
    AclDenied,

    /// The request line does not match the account's allow ACL.
    #[error("Not permitted")]
    AclNotPermitted,

    /// The declared body checksum does not match the body.
    #[error("Checksum mismatch")]
    ChecksumMismatch,

    /// The body is marked encrypted but cannot be decrypted.
    #[error("Invalid encrypted body")]
    BodyDecryption,

    /// The computed hash does not match the provided signature.
    #[error("Not authenticated")]
    SignatureDoesNotMatch,
}

impl AuthError {
    /// HTTP status reported to the client for this failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingRequestLine => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NoLogin => StatusCode::EXPECTATION_FAILED,
            Self::StaleSignature { .. } => StatusCode::NOT_ACCEPTABLE,
            Self::ChannelMismatch { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::AccountLookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::AccountExpired => StatusCode::PRECONDITION_FAILED,
            Self::AclDenied | Self::AclNotPermitted => StatusCode::FORBIDDEN,
            Self::ChecksumMismatch | Self::BodyDecryption => StatusCode::BAD_REQUEST,
            Self::SignatureDoesNotMatch => StatusCode::UNAUTHORIZED,
        }
    }

    /// Failure class for this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingRequestLine
            | Self::NoLogin
            | Self::ChannelMismatch { .. }
            | Self::ChecksumMismatch
            | Self::BodyDecryption => ErrorCategory::Protocol,
            Self::StaleSignature { .. } | Self::AccountExpired => ErrorCategory::Freshness,
            Self::AccountNotFound | Self::SignatureDoesNotMatch => ErrorCategory::Authentication,
            Self::AclDenied | Self::AclNotPermitted => ErrorCategory::Authorization,
            Self::AccountLookup(_) => ErrorCategory::Backend,
        }
    }
}

/// Failure reported by an [`AccountStore`](crate::store::AccountStore) backend.
#[derive(Debug, thiserror::Error)]
#[error("account store error: {0}")]
pub struct StoreError(pub String);

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::AccountLookup(err.to_string())
    }
}

/// Failure to encrypt or decrypt a token or body.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The input is not valid hex/base64.
    #[error("invalid encoding")]
    Encoding,
    /// The ciphertext is truncated or fails authentication.
    #[error("decryption failed")]
    Decrypt,
    /// Encryption failed.
    #[error("encryption failed")]
    Encrypt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_errors_to_status_codes() {
        assert_eq!(AuthError::MissingRequestLine.status().as_u16(), 415);
        assert_eq!(AuthError::NoLogin.status().as_u16(), 417);
        assert_eq!(
            AuthError::StaleSignature { server_time: String::new() }.status().as_u16(),
            406
        );
        assert_eq!(
            AuthError::ChannelMismatch { version: SignatureVersion::V2, channel: None }
                .status()
                .as_u16(),
            416
        );
        assert_eq!(AuthError::AccountLookup("down".into()).status().as_u16(), 500);
        assert_eq!(AuthError::AccountNotFound.status().as_u16(), 404);
        assert_eq!(AuthError::AccountExpired.status().as_u16(), 412);
        assert_eq!(AuthError::AclDenied.status().as_u16(), 403);
        assert_eq!(AuthError::AclNotPermitted.status().as_u16(), 403);
        assert_eq!(AuthError::ChecksumMismatch.status().as_u16(), 400);
        assert_eq!(AuthError::SignatureDoesNotMatch.status().as_u16(), 401);
    }

    #[test]
    fn test_should_classify_errors() {
        assert_eq!(AuthError::NoLogin.category(), ErrorCategory::Protocol);
        assert_eq!(AuthError::AccountExpired.category(), ErrorCategory::Freshness);
        assert_eq!(
            AuthError::SignatureDoesNotMatch.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(AuthError::AclDenied.category(), ErrorCategory::Authorization);
        assert_eq!(
            AuthError::from(StoreError("timeout".into())).category(),
            ErrorCategory::Backend
        );
    }
}
