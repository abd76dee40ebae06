//! Pre-authentication access decisions.

use std::sync::Arc;

use http::StatusCode;
use sigil_auth::RequestContext;
use tracing::debug;

use crate::hooks::{HookHandler, HookKind, HookOutcome, HookRegistry};
use crate::policy::PolicySnapshot;
use crate::status::AuthStatus;

/// Decides whether a request needs signature verification at all.
#[derive(Debug, Clone)]
pub struct AccessGate {
    hooks: Arc<HookRegistry>,
}

impl AccessGate {
    /// Create a gate running the access hooks of `hooks`.
    #[must_use]
    pub fn new(hooks: Arc<HookRegistry>) -> Self {
        Self { hooks }
    }

    /// Check the request against the IP and path lists, then the access hooks.
    ///
    /// Returns `Some(status)` when the request is decided here: `200` means
    /// proceed without a signature, anything else is final. `None` means
    /// the signature must be verified.
    pub async fn check_access(
        &self,
        ctx: &mut RequestContext,
        policy: &PolicySnapshot,
    ) -> Option<AuthStatus> {
        let ip = ctx.client_ip.to_canonical().to_string();

        if policy.deny_ip.is_match(&ip) || policy.deny.is_match(&ctx.path) {
            debug!(ip, path = %ctx.path, "denied by access list");
            return Some(AuthStatus::new(StatusCode::FORBIDDEN, "Access denied"));
        }
        if policy.allow_ip.is_match(&ip) || policy.allow.is_match(&ctx.path) {
            debug!(ip, path = %ctx.path, "allowed by access list");
            return Some(AuthStatus::new(StatusCode::OK, ""));
        }

        let (method, path) = (ctx.method.clone(), ctx.path.clone());
        for hook in self.hooks.find(HookKind::Access, &method, &path) {
            let HookHandler::Access(handler) = hook.handler() else {
                continue;
            };
            debug!(method, path, hook = hook.path(), "running access hook");
            if let HookOutcome::Resolve(status) = handler.check(ctx).await {
                return Some(status);
            }
        }
        None
    }
}
