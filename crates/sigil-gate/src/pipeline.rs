//! The full request authentication pipeline.
//!
//! ```text
//! request ─▶ AccessGate ──decided──▶ done
//!               │
//!               ▼
//!            Verifier ─▶ AuthorizationGate ─▶ Decision
//! ```
//!
//! Besides [`AuthPipeline::handle`], the pipeline offers the clear-text
//! login check and issues session signatures and bearer tokens for clients
//! that have just logged in.

use std::sync::Arc;

use chrono::Utc;
use sigil_auth::crypto::encrypt_token;
use sigil_auth::signer::{SignOptions, create_signature};
use sigil_auth::{
    AccountStore, CryptoError, IssuedToken, RequestContext, SignatureEnvelope, SignatureVersion,
    SourceChannel, Verifier,
};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::access::AccessGate;
use crate::authorization::AuthorizationGate;
use crate::hooks::HookRegistry;
use crate::policy::{PolicySnapshot, PolicyStore};
use crate::status::{AuthStatus, Decision};

/// Query parameter carrying the login for [`AuthPipeline::check_login`].
pub const LOGIN_PARAM: &str = "login";

/// Query parameter carrying the clear-text password for [`AuthPipeline::check_login`].
pub const PASSWORD_PARAM: &str = "password";

/// Slack added to the expiry of a synthesized login envelope.
const LOGIN_EXPIRY_SLACK_MS: i64 = 1_000;

/// Which credentials [`AuthPipeline::handle_session_signature`] should
/// issue or revoke.
///
/// `Some(true)` issues, `Some(false)` revokes, `None` leaves it alone.
#[derive(Debug, Clone, Copy, Default, TypedBuilder)]
pub struct SessionOptions {
    /// Issue or revoke a bearer token.
    #[builder(default, setter(strip_option))]
    pub access_token: Option<bool>,
    /// Issue or revoke a session signature.
    #[builder(default, setter(strip_option))]
    pub session: Option<bool>,
    /// Lifetime override in milliseconds.
    #[builder(default, setter(strip_option))]
    pub max_age_ms: Option<i64>,
}

/// Access gate, verifier, and authorization gate wired together.
#[derive(Debug)]
pub struct AuthPipeline<S> {
    policy: Arc<PolicyStore>,
    verifier: Verifier<S>,
    access: AccessGate,
    authorization: AuthorizationGate,
}

impl<S: AccountStore> AuthPipeline<S> {
    /// Create a pipeline.
    pub fn new(policy: Arc<PolicyStore>, store: S, hooks: Arc<HookRegistry>) -> Self {
        Self {
            policy,
            verifier: Verifier::new(store),
            access: AccessGate::new(Arc::clone(&hooks)),
            authorization: AuthorizationGate::new(hooks),
        }
    }

    /// The policy holder, for reloads.
    pub fn policy(&self) -> &Arc<PolicyStore> {
        &self.policy
    }

    /// The account store.
    pub fn store(&self) -> &S {
        self.verifier.store()
    }

    /// Run the request through every stage and decide what to do with it.
    pub async fn handle(&self, ctx: &mut RequestContext) -> Decision {
        let policy = self.policy.snapshot();

        if let Some(status) = self.gate(ctx, &policy).await {
            return status.decision();
        }

        let verified = self.verify(ctx, &policy).await;
        let status = self
            .authorization
            .check_authorization(ctx, &policy, verified)
            .await;

        if !status.is_ok() {
            warn!(
                method = %ctx.method,
                path = %ctx.path,
                login = ctx.signature.as_ref().map_or("", |s| s.login.as_str()),
                status = status.code.as_u16(),
                message = %status.message,
                "request rejected"
            );
        }
        status.decision()
    }

    /// Authenticate a clear-text `login`/`password` pair from the query.
    ///
    /// The access gate runs first and any refusal is returned as is. Both
    /// parameters are blanked in the context before verification.
    pub async fn check_login(&self, ctx: &mut RequestContext) -> AuthStatus {
        let policy = self.policy.snapshot();
        if let Some(status) = self.gate(ctx, &policy).await {
            if !status.is_ok() {
                return status;
            }
        }

        let login = ctx.query_param(LOGIN_PARAM).unwrap_or_default().to_owned();
        let password = ctx.query_param(PASSWORD_PARAM).unwrap_or_default().to_owned();
        if login.is_empty() || password.is_empty() {
            ctx.unsigned = true;
            return AuthStatus::from(&sigil_auth::AuthError::NoLogin);
        }

        let mut envelope = SignatureEnvelope::from_request(ctx);
        envelope.version = SignatureVersion::V5;
        envelope.source = Some(SourceChannel::Query);
        envelope.expires = Utc::now().timestamp_millis()
            + policy.signature.signature_age_ms
            + LOGIN_EXPIRY_SLACK_MS;
        envelope.login = login;
        envelope.signature = password;
        ctx.signature = Some(envelope);
        ctx.blank_query_param(LOGIN_PARAM);
        ctx.blank_query_param(PASSWORD_PARAM);

        self.verify(ctx, &policy).await
    }

    /// Issue or revoke a session signature and a bearer token for the
    /// account attached to `ctx`.
    ///
    /// A bearer token is a version 3 signature encrypted with the
    /// server-side token secret and left in `ctx.issued_token`. A session
    /// signature is a version 2 signature stored in `ctx.session` under the
    /// signature field name. Nothing is issued without an account, a host,
    /// or (for sessions) a session.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if the token cannot be encrypted.
    pub fn handle_session_signature(
        &self,
        ctx: &mut RequestContext,
        options: SessionOptions,
    ) -> Result<(), CryptoError> {
        let policy = self.policy.snapshot();
        let settings = &policy.signature;
        let host = ctx.header("host").unwrap_or_default().to_owned();
        debug!(?options, "handling session signature");

        if let Some(issue) = options.access_token {
            ctx.issued_token = None;
            let account = ctx.account.clone().filter(|_| issue && !host.is_empty());
            if let Some(account) = account {
                let max_age_ms = options.max_age_ms.unwrap_or(settings.access_token_age_ms);
                let secret = format!(
                    "{}:{}",
                    account.secret,
                    account.token_secret.as_deref().unwrap_or("")
                );
                let signed = create_signature(
                    &account.login,
                    &secret,
                    "",
                    &host,
                    "",
                    &SignOptions::builder()
                        .version(SignatureVersion::V3)
                        .expires(max_age_ms)
                        .build(),
                );
                if let Some(signed) = signed {
                    ctx.issued_token = Some(IssuedToken {
                        name: settings.access_token_name.clone(),
                        value: encrypt_token(&settings.access_token_secret, &signed.value)?,
                        max_age_ms,
                    });
                    info!(login = %account.login, expires = signed.expires, "issued access token");
                }
            }
        }

        if let Some(issue) = options.session {
            let account = ctx.account.clone().filter(|_| issue && !host.is_empty());
            let Some(session) = ctx.session.as_mut() else {
                return Ok(());
            };
            session.remove(&settings.header_name);
            if let Some(account) = account {
                let max_age_ms = options.max_age_ms.unwrap_or(settings.session_age_ms);
                let signed = create_signature(
                    &account.login,
                    &account.secret,
                    "",
                    &host,
                    "",
                    &SignOptions::builder()
                        .version(SignatureVersion::V2)
                        .expires(max_age_ms)
                        .build(),
                );
                if let Some(signed) = signed {
                    session.insert(settings.header_name.clone(), signed.value);
                    info!(
                        login = %account.login,
                        expires = signed.expires,
                        "issued session signature"
                    );
                }
            }
        }

        Ok(())
    }

    /// Run only the access gate, for routes that need no signature.
    ///
    /// Same contract as [`AccessGate::check_access`].
    pub async fn check_access(&self, ctx: &mut RequestContext) -> Option<AuthStatus> {
        let policy = self.policy.snapshot();
        self.gate(ctx, &policy).await
    }

    async fn gate(&self, ctx: &mut RequestContext, policy: &PolicySnapshot) -> Option<AuthStatus> {
        let status = self.access.check_access(ctx, policy).await?;
        if !status.is_ok() {
            warn!(
                method = %ctx.method,
                path = %ctx.path,
                status = status.code.as_u16(),
                "request refused by access gate"
            );
        }
        Some(status)
    }

    async fn verify(&self, ctx: &mut RequestContext, policy: &PolicySnapshot) -> AuthStatus {
        match self.verifier.check_signature(ctx, &policy.signature).await {
            Ok(()) => {
                if let Some(account) = &ctx.account {
                    info!(
                        login = %account.login,
                        channel = ?ctx.signature.as_ref().and_then(|s| s.source),
                        "request authenticated"
                    );
                }
                AuthStatus::ok()
            }
            Err(err) => {
                debug!(
                    status = err.status().as_u16(),
                    category = ?err.category(),
                    "verification failed"
                );
                AuthStatus::from(&err)
            }
        }
    }
}
