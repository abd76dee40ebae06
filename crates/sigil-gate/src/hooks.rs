//! Ordered, method/path-matched hooks for the access and authorization gates.
//!
//! An access hook runs before any signature work and may resolve the request
//! outright. An auth hook runs after verification, sees the current status,
//! and may replace it. Hooks are matched by a method pattern and a path
//! pattern and always run in registration order.

use std::sync::Arc;

use async_trait::async_trait;
use sigil_auth::RequestContext;
use sigil_core::{Pattern, SigilResult};

use crate::status::AuthStatus;

/// Which gate a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Runs in the access gate, before signature verification.
    Access,
    /// Runs in the authorization gate, after signature verification.
    Auth,
}

/// Result of running one hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// No opinion, run the next hook.
    Continue,
    /// Stop the chain with this status.
    Resolve(AuthStatus),
}

/// Hook run by the access gate.
#[async_trait]
pub trait AccessHook: Send + Sync {
    /// Inspect the request before signature verification.
    async fn check(&self, ctx: &mut RequestContext) -> HookOutcome;
}

#[async_trait]
impl<F> AccessHook for F
where
    F: Fn(&mut RequestContext) -> HookOutcome + Send + Sync,
{
    async fn check(&self, ctx: &mut RequestContext) -> HookOutcome {
        self(ctx)
    }
}

/// Hook run by the authorization gate.
#[async_trait]
pub trait AuthHook: Send + Sync {
    /// Inspect the request and the status so far.
    ///
    /// A [`HookOutcome::Resolve`] with a non-200 status replaces the status
    /// and stops the chain; anything else leaves it unchanged.
    async fn check(&self, ctx: &mut RequestContext, status: &AuthStatus) -> HookOutcome;
}

#[async_trait]
impl<F> AuthHook for F
where
    F: Fn(&mut RequestContext, &AuthStatus) -> HookOutcome + Send + Sync,
{
    async fn check(&self, ctx: &mut RequestContext, status: &AuthStatus) -> HookOutcome {
        self(ctx, status)
    }
}

/// The callback of a registered hook.
#[derive(Clone)]
pub enum HookHandler {
    /// Access gate callback.
    Access(Arc<dyn AccessHook>),
    /// Authorization gate callback.
    Auth(Arc<dyn AuthHook>),
}

impl HookHandler {
    /// Gate this handler runs in.
    #[must_use]
    pub fn kind(&self) -> HookKind {
        match self {
            Self::Access(_) => HookKind::Access,
            Self::Auth(_) => HookKind::Auth,
        }
    }
}

impl std::fmt::Debug for HookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HookHandler").field(&self.kind()).finish()
    }
}

/// A registered hook.
#[derive(Debug, Clone)]
pub struct Hook {
    method: Option<Pattern>,
    path: Pattern,
    handler: HookHandler,
}

impl Hook {
    /// Gate this hook runs in.
    #[must_use]
    pub fn kind(&self) -> HookKind {
        self.handler.kind()
    }

    /// Path pattern source.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// The callback.
    #[must_use]
    pub fn handler(&self) -> &HookHandler {
        &self.handler
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        self.method.as_ref().is_none_or(|m| m.is_match(method)) && self.path.is_match(path)
    }
}

/// All registered hooks, in registration order.
///
/// Built once at startup, then shared read-only.
///
/// # Examples
///
/// ```
/// use sigil_gate::hooks::{HookKind, HookOutcome, HookRegistry};
/// use sigil_gate::AuthStatus;
/// use sigil_auth::RequestContext;
///
/// let registry = HookRegistry::builder()
///     .access("GET", "^/legacy/", |_: &mut RequestContext| {
///         HookOutcome::Resolve(AuthStatus::redirect("/v2/"))
///     })
///     .unwrap()
///     .build();
/// assert_eq!(registry.find(HookKind::Access, "get", "/legacy/x").count(), 1);
/// assert_eq!(registry.find(HookKind::Access, "POST", "/legacy/x").count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Hook>,
}

impl HookRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a registry.
    #[must_use]
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    /// Register a hook.
    ///
    /// `method` is a regex matched case-insensitively against the whole
    /// method name; `*` or an empty string matches any method. `path` is a
    /// regex matched anywhere in the request path.
    ///
    /// # Errors
    ///
    /// Fails if either pattern is not a valid regex.
    pub fn register(&mut self, method: &str, path: &str, handler: HookHandler) -> SigilResult<()> {
        let method = match method.trim() {
            "" | "*" => None,
            m => Some(Pattern::new_case_insensitive(&format!("^(?:{m})$"))?),
        };
        self.hooks.push(Hook {
            method,
            path: Pattern::new(path)?,
            handler,
        });
        Ok(())
    }

    /// Hooks of `kind` matching `method` and `path`, in registration order.
    pub fn find<'a>(
        &'a self,
        kind: HookKind,
        method: &'a str,
        path: &'a str,
    ) -> impl Iterator<Item = &'a Hook> + 'a {
        self.hooks
            .iter()
            .filter(move |h| h.kind() == kind && h.matches(method, path))
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Builder for [`HookRegistry`].
#[derive(Debug, Default)]
pub struct HookRegistryBuilder {
    registry: HookRegistry,
}

impl HookRegistryBuilder {
    /// Add an access hook.
    ///
    /// # Errors
    ///
    /// Fails if either pattern is not a valid regex.
    pub fn access(
        mut self,
        method: &str,
        path: &str,
        hook: impl AccessHook + 'static,
    ) -> SigilResult<Self> {
        self.registry
            .register(method, path, HookHandler::Access(Arc::new(hook)))?;
        Ok(self)
    }

    /// Add an auth hook.
    ///
    /// # Errors
    ///
    /// Fails if either pattern is not a valid regex.
    pub fn auth(
        mut self,
        method: &str,
        path: &str,
        hook: impl AuthHook + 'static,
    ) -> SigilResult<Self> {
        self.registry
            .register(method, path, HookHandler::Auth(Arc::new(hook)))?;
        Ok(self)
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> HookRegistry {
        self.registry
    }
}
