//! The signature verification state machine.
//!
//! [`Verifier::check_signature`] walks a request through a fixed sequence of
//! checks and stops at the first one that fails:
//!
//! 1. request line present (415)
//! 2. login present (417, request marked unsigned)
//! 3. signature not stale (406)
//! 4. version allowed on its channel (416)
//! 5. account lookup (500 / 404)
//! 6. account not expired (412)
//! 7. account ACLs (403)
//! 8. body checksum and encrypted body (400)
//! 9. hash comparison (401)
//! 10. denied parameters stripped
//! 11. account and envelope attached to the context

use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::header::CONTENT_ENCODING;
use sigil_core::SignatureConfig;
use tracing::debug;

use crate::account::AccountRecord;
use crate::context::RequestContext;
use crate::crypto::decrypt_body;
use crate::envelope::{SignatureEnvelope, parse_signature};
use crate::error::AuthError;
use crate::signer::{body_checksum, verify_signature};
use crate::store::AccountStore;

/// `Content-Encoding` value marking an encrypted body.
pub const ENCRYPTED_ENCODING: &str = "encrypted";

/// Verifies signed requests against an [`AccountStore`].
#[derive(Debug)]
pub struct Verifier<S> {
    store: S,
}

impl<S: AccountStore> Verifier<S> {
    /// Create a verifier backed by `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The account store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Authenticate the request in `ctx`.
    ///
    /// If `ctx.signature` is already set it is used as-is, otherwise the
    /// signature is located with [`parse_signature`]. The envelope is left
    /// on the context whatever the outcome; on success the account is
    /// attached as well.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failed check.
    pub async fn check_signature(
        &self,
        ctx: &mut RequestContext,
        settings: &SignatureConfig,
    ) -> Result<(), AuthError> {
        self.check_signature_at(ctx, settings, Utc::now().timestamp_millis())
            .await
    }

    async fn check_signature_at(
        &self,
        ctx: &mut RequestContext,
        settings: &SignatureConfig,
        now: i64,
    ) -> Result<(), AuthError> {
        let envelope = match ctx.signature.take() {
            Some(envelope) => envelope,
            None => parse_signature(ctx, settings),
        };
        ctx.signature = Some(envelope.clone());

        if envelope.method.is_empty() || envelope.host.is_empty() {
            return Err(AuthError::MissingRequestLine);
        }

        if envelope.login.is_empty() {
            ctx.unsigned = true;
            return Err(AuthError::NoLogin);
        }

        if envelope.expires < now - settings.signature_age_ms {
            debug!(
                login = %envelope.login,
                expires = envelope.expires,
                now,
                "signature is stale"
            );
            return Err(AuthError::StaleSignature {
                server_time: DateTime::from_timestamp_millis(now)
                    .unwrap_or_default()
                    .to_rfc2822(),
            });
        }

        if !envelope.version.accepts(envelope.source) {
            debug!(
                login = %envelope.login,
                version = %envelope.version,
                source = ?envelope.source,
                "signature version not allowed on this channel"
            );
            return Err(AuthError::ChannelMismatch {
                version: envelope.version,
                channel: envelope.source,
            });
        }

        let account = self
            .store
            .get(&envelope.login)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if account.is_expired(now) {
            return Err(AuthError::AccountExpired);
        }

        check_acl(&account, &ctx.url())?;
        check_body(ctx, &envelope, &account)?;

        if !verify_signature(&envelope, &account, &settings.header_name) {
            debug!(
                login = %envelope.login,
                version = %envelope.version,
                source = ?envelope.source,
                "signature does not match"
            );
            return Err(AuthError::SignatureDoesNotMatch);
        }

        if let Some(pattern) = &account.query_deny {
            ctx.remove_params(pattern);
        }

        debug!(
            login = %envelope.login,
            version = %envelope.version,
            source = ?envelope.source,
            "signature verified"
        );
        ctx.account = Some(account);
        Ok(())
    }
}

fn check_acl(account: &AccountRecord, url: &str) -> Result<(), AuthError> {
    if account.acl_deny.as_ref().is_some_and(|p| p.is_match(url)) {
        return Err(AuthError::AclDenied);
    }
    if account.acl_allow.as_ref().is_some_and(|p| !p.is_match(url)) {
        return Err(AuthError::AclNotPermitted);
    }
    Ok(())
}

/// Checksum first, over the body as received; then decrypt if needed.
fn check_body(
    ctx: &mut RequestContext,
    envelope: &SignatureEnvelope,
    account: &Arc<AccountRecord>,
) -> Result<(), AuthError> {
    if !envelope.checksum.is_empty() && envelope.checksum != body_checksum(&ctx.body) {
        return Err(AuthError::ChecksumMismatch);
    }

    let encrypted = ctx
        .header(CONTENT_ENCODING.as_str())
        .is_some_and(|v| v.eq_ignore_ascii_case(ENCRYPTED_ENCODING));
    if encrypted && !ctx.body.is_empty() {
        let plain = decrypt_body(&account.secret, &ctx.body).map_err(|err| {
            debug!(login = %account.login, error = %err, "cannot decrypt request body");
            AuthError::BodyDecryption
        })?;
        ctx.set_body(plain.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use sigil_core::Pattern;

    use super::*;
    use crate::context::{BodyParams, Session};
    use crate::crypto::{encrypt_body, encrypt_token};
    use crate::envelope::{SignatureVersion, SourceChannel, encode_signature_value};
    use crate::error::StoreError;
    use crate::signer::{HashAlgorithm, SignOptions, create_signature_at, sign};
    use crate::store::StaticAccountStore;

    const NOW: i64 = 1_700_000_000_000;
    const LATER: i64 = NOW + 60_000;
    const HOST: &str = "api.example.com";

    fn settings() -> SignatureConfig {
        SignatureConfig::builder()
            .access_token_secret("token-key".into())
            .build()
    }

    fn alice() -> AccountRecord {
        AccountRecord::builder().login("alice").secret("s3cr3t").build()
    }

    fn verifier(accounts: Vec<AccountRecord>) -> Verifier<StaticAccountStore> {
        Verifier::new(StaticAccountStore::new(accounts))
    }

    // signing clock at the epoch keeps every expiry absolute
    fn sign_request(secret: &str, method: &str, uri: &str, options: SignOptions) -> String {
        create_signature_at("alice", secret, method, HOST, uri, &options, 0)
            .unwrap()
            .value
    }

    fn v4(secret: &str, uri: &str) -> String {
        sign_request(secret, "GET", uri, SignOptions::builder().expires(LATER).build())
    }

    fn signed_get(uri: &str, value: &str) -> RequestContext {
        RequestContext::new("GET", uri)
            .with_header("host", HOST)
            .with_header("bk-signature", value)
    }

    #[tokio::test]
    async fn test_should_accept_valid_v4_signature() {
        let mut ctx = signed_get("/account/get?id=1", &v4("s3cr3t", "/account/get?id=1"));
        verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap();
        assert_eq!(ctx.account.unwrap().login, "alice");
        assert_eq!(ctx.signature.unwrap().source, Some(SourceChannel::Header));
    }

    #[tokio::test]
    async fn test_should_reject_signature_made_with_wrong_secret() {
        let mut ctx = signed_get("/account/get?id=1", &v4("wrong", "/account/get?id=1"));
        let err = verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 401);
        assert!(ctx.account.is_none());
    }

    #[tokio::test]
    async fn test_should_reject_missing_host_with_415() {
        let mut ctx =
            RequestContext::new("GET", "/x").with_header("bk-signature", &v4("s3cr3t", "/x"));
        let err = verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingRequestLine));
    }

    #[tokio::test]
    async fn test_should_mark_unsigned_request() {
        let mut ctx = RequestContext::new("GET", "/x").with_header("host", HOST);
        let err = verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 417);
        assert!(ctx.unsigned);
    }

    #[tokio::test]
    async fn test_should_reject_stale_signature_regardless_of_hash() {
        let options = SignOptions::builder().expires(NOW - 1).build();
        let value = sign_request("s3cr3t", "GET", "/x", options);
        let mut ctx = signed_get("/x", &value);
        let err = verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 406);

        let garbage =
            encode_signature_value(SignatureVersion::V4, "", "alice", "nope", NOW - 1, "");
        let mut ctx = signed_get("/x", &garbage);
        let err = verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 406);
    }

    #[tokio::test]
    async fn test_should_honor_freshness_window() {
        let options = SignOptions::builder().expires(NOW - 500).build();
        let value = sign_request("s3cr3t", "GET", "/x", options);
        let mut ctx = signed_get("/x", &value);
        let mut window = settings();
        window.signature_age_ms = 1_000;
        verifier(vec![alice()])
            .check_signature_at(&mut ctx, &window, NOW)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_should_reject_session_signature_sent_in_header() {
        let value = sign_request(
            "s3cr3t",
            "",
            "",
            SignOptions::builder()
                .version(SignatureVersion::V2)
                .expires(LATER)
                .build(),
        );
        let mut ctx = signed_get("/x", &value);
        let err = verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 416);
    }

    #[tokio::test]
    async fn test_should_accept_session_signature_from_session() {
        let value = sign_request(
            "s3cr3t",
            "",
            "",
            SignOptions::builder()
                .version(SignatureVersion::V2)
                .expires(LATER)
                .build(),
        );
        let mut session = Session::new();
        session.insert("bk-signature".into(), value);
        let mut ctx = RequestContext::new("POST", "/any/path?x=1")
            .with_header("host", "www.example.com")
            .with_session(session);
        verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_should_reject_v4_signature_inside_token() {
        let token = encrypt_token("token-key", &v4("s3cr3t", "/x")).unwrap();
        let mut ctx = RequestContext::new("GET", "/x")
            .with_header("host", HOST)
            .with_header("bk-access-token", &token);
        let err = verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 416);
    }

    #[tokio::test]
    async fn test_should_accept_v3_token() {
        let account = AccountRecord::builder()
            .login("alice")
            .secret("s3cr3t")
            .token_secret("tok")
            .build();
        let value = sign_request(
            "s3cr3t:tok",
            "",
            "",
            SignOptions::builder()
                .version(SignatureVersion::V3)
                .expires(LATER)
                .build(),
        );
        let token = encrypt_token("token-key", &value).unwrap();
        let mut ctx = RequestContext::new("GET", &format!("/x?bk-access-token={token}"))
            .with_header("host", HOST);
        verifier(vec![account])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap();
        assert_eq!(ctx.signature.unwrap().source, Some(SourceChannel::Token));
    }

    #[tokio::test]
    async fn test_should_report_unknown_account_and_store_failure() {
        let mut ctx = signed_get("/x", &v4("s3cr3t", "/x"));
        let err = verifier(vec![])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 404);

        struct Down;
        #[async_trait::async_trait]
        impl AccountStore for Down {
            async fn get(&self, _: &str) -> Result<Option<Arc<AccountRecord>>, StoreError> {
                Err(StoreError("db down".into()))
            }
        }
        let mut ctx = signed_get("/x", &v4("s3cr3t", "/x"));
        let err = Verifier::new(Down)
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 500);
    }

    #[tokio::test]
    async fn test_should_reject_expired_account() {
        let account = AccountRecord::builder()
            .login("alice")
            .secret("s3cr3t")
            .expires(NOW - 1)
            .build();
        let mut ctx = signed_get("/x", &v4("s3cr3t", "/x"));
        let err = verifier(vec![account])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 412);
    }

    #[tokio::test]
    async fn test_should_enforce_account_acls() {
        let denied = AccountRecord::builder()
            .login("alice")
            .secret("s3cr3t")
            .acl_deny(Pattern::new("^/admin").unwrap())
            .build();
        let mut ctx = signed_get("/admin/users", &v4("s3cr3t", "/admin/users"));
        let err = verifier(vec![denied.clone()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AclDenied));

        let mut ctx = signed_get("/account/get", &v4("s3cr3t", "/account/get"));
        verifier(vec![denied])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap();

        let restricted = AccountRecord::builder()
            .login("alice")
            .secret("s3cr3t")
            .acl_allow(Pattern::new("^/public").unwrap())
            .build();
        let mut ctx = signed_get("/account/get", &v4("s3cr3t", "/account/get"));
        let err = verifier(vec![restricted])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AclNotPermitted));
    }

    #[tokio::test]
    async fn test_should_check_body_checksum() {
        let body = br#"{"name":"n"}"#;
        let options = |checksum: String| {
            SignOptions::builder()
                .expires(LATER)
                .content_type("application/json")
                .checksum(checksum)
                .build()
        };
        let value = sign_request("s3cr3t", "POST", "/x", options(body_checksum(body)));
        let mut ctx = RequestContext::new("POST", "/x")
            .with_header("host", HOST)
            .with_header("content-type", "application/json")
            .with_header("bk-signature", &value)
            .with_body(Bytes::from_static(body));
        verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap();

        let value = sign_request("s3cr3t", "POST", "/x", options(body_checksum(b"other")));
        let mut ctx = RequestContext::new("POST", "/x")
            .with_header("host", HOST)
            .with_header("content-type", "application/json")
            .with_header("bk-signature", &value)
            .with_body(Bytes::from_static(body));
        let err = verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_should_decrypt_encrypted_body() {
        let wire = encrypt_body("s3cr3t", br#"{"amount":5}"#).unwrap();
        let value = sign_request(
            "s3cr3t",
            "POST",
            "/pay",
            SignOptions::builder()
                .expires(LATER)
                .content_type("application/json")
                .build(),
        );
        let mut ctx = RequestContext::new("POST", "/pay")
            .with_header("host", HOST)
            .with_header("content-type", "application/json")
            .with_header("content-encoding", "encrypted")
            .with_header("bk-signature", &value)
            .with_body(wire);
        verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap();
        assert_eq!(&ctx.body[..], br#"{"amount":5}"#);
        assert!(matches!(ctx.body_params, BodyParams::Json(ref m) if m.contains_key("amount")));
    }

    #[tokio::test]
    async fn test_should_reject_undecryptable_body() {
        let wire = encrypt_body("another-secret", b"{}").unwrap();
        let options = SignOptions::builder().expires(LATER).build();
        let value = sign_request("s3cr3t", "POST", "/pay", options);
        let mut ctx = RequestContext::new("POST", "/pay")
            .with_header("host", HOST)
            .with_header("content-encoding", "encrypted")
            .with_header("bk-signature", &value)
            .with_body(wire);
        let err = verifier(vec![alice()])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BodyDecryption));
    }

    #[tokio::test]
    async fn test_should_strip_denied_params_after_verification() {
        let account = AccountRecord::builder()
            .login("alice")
            .secret("s3cr3t")
            .query_deny(Pattern::new_case_insensitive("^_").unwrap())
            .build();
        let uri = "/x?_Debug=1&id=2";
        let mut ctx = signed_get(uri, &v4("s3cr3t", uri));
        verifier(vec![account])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap();
        assert_eq!(ctx.query_param("_Debug"), None);
        assert_eq!(ctx.query_param("id"), Some("2"));
    }

    #[tokio::test]
    async fn test_should_verify_preset_v5_envelope() {
        let account = AccountRecord::builder()
            .login("alice")
            .secret("s3cr3t")
            .salt("pepper")
            .password(sign("pepper", "hunter2", HashAlgorithm::Sha256))
            .build();
        let mut ctx = RequestContext::new("GET", "/login").with_header("host", HOST);
        let mut envelope = SignatureEnvelope::from_request(&ctx);
        envelope.version = SignatureVersion::V5;
        envelope.login = "alice".into();
        envelope.signature = "hunter2".into();
        envelope.expires = LATER;
        envelope.source = Some(SourceChannel::Query);
        ctx.signature = Some(envelope);

        verifier(vec![account])
            .check_signature_at(&mut ctx, &settings(), NOW)
            .await
            .unwrap();
    }
}
