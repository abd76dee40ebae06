//! Post-authentication authorization decisions.
//!
//! Runs whatever the verifier concluded, so hooks can turn an
//! authentication failure into something else (a login redirect, say).

use std::sync::Arc;

use http::StatusCode;
use sigil_auth::{RequestContext, SourceChannel};
use tracing::debug;

use crate::hooks::{HookHandler, HookKind, HookOutcome, HookRegistry};
use crate::policy::PolicySnapshot;
use crate::status::AuthStatus;

/// Account type that bypasses the role restrictions.
pub const ADMIN_TYPE: &str = "admin";

/// Applies role rules and auth hooks to the verifier's status.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    hooks: Arc<HookRegistry>,
}

impl AuthorizationGate {
    /// Create a gate running the auth hooks of `hooks`.
    #[must_use]
    pub fn new(hooks: Arc<HookRegistry>) -> Self {
        Self { hooks }
    }

    /// Produce the final status for a request given the verifier's `status`.
    pub async fn check_authorization(
        &self,
        ctx: &mut RequestContext,
        policy: &PolicySnapshot,
        mut status: AuthStatus,
    ) -> AuthStatus {
        if status.code == StatusCode::EXPECTATION_FAILED
            && policy.allow_anonymous.is_match(&ctx.path)
        {
            debug!(path = %ctx.path, "anonymous access allowed");
            status = AuthStatus::ok();
        }

        let via_session = ctx
            .signature
            .as_ref()
            .is_some_and(|s| s.source == Some(SourceChannel::Session));
        if via_session && policy.disable_session.is_match(&ctx.path) {
            return AuthStatus::new(StatusCode::UNAUTHORIZED, "Not authorized");
        }

        let is_admin = ctx.account.as_ref().is_some_and(|a| a.has_type(ADMIN_TYPE));
        if !is_admin {
            if policy.allow_admin.is_match(&ctx.path) {
                return AuthStatus::new(StatusCode::UNAUTHORIZED, "Restricted access");
            }
            for (kind, patterns) in &policy.allow_account {
                let has_type = ctx.account.as_ref().is_some_and(|a| a.has_type(kind));
                if !has_type && patterns.is_match(&ctx.path) {
                    return AuthStatus::new(StatusCode::UNAUTHORIZED, "Access is not allowed");
                }
            }
        }

        let (method, path) = (ctx.method.clone(), ctx.path.clone());
        for hook in self.hooks.find(HookKind::Auth, &method, &path) {
            let HookHandler::Auth(handler) = hook.handler() else {
                continue;
            };
            debug!(method, path, hook = hook.path(), "running auth hook");
            if let HookOutcome::Resolve(replacement) = handler.check(ctx, &status).await {
                if !replacement.is_ok() {
                    return replacement;
                }
            }
        }
        status
    }
}
