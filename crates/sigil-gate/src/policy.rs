//! Compiled access policy and its hot-swappable holder.
//!
//! A [`PolicySnapshot`] is built once from a [`SigilConfig`] and never
//! mutated. The [`PolicyStore`] hands out `Arc` clones of the current
//! snapshot; a reload compiles a fresh snapshot and swaps it in, so requests
//! in flight keep the snapshot they started with.

use std::sync::Arc;

use parking_lot::RwLock;
use sigil_core::{PatternSet, SigilConfig, SigilResult, SignatureConfig};
use tracing::info;

/// Immutable, compiled view of the access configuration.
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    /// Signature transport names, secrets, and lifetimes.
    pub signature: SignatureConfig,
    /// Paths that skip signature verification.
    pub allow: PatternSet,
    /// Paths refused before any signature work.
    pub deny: PatternSet,
    /// Client addresses that skip signature verification.
    pub allow_ip: PatternSet,
    /// Client addresses refused outright.
    pub deny_ip: PatternSet,
    /// Paths reserved for admin accounts.
    pub allow_admin: PatternSet,
    /// Paths reserved for accounts of a given type, in type order.
    pub allow_account: Vec<(String, PatternSet)>,
    /// Paths that accept requests without a login.
    pub allow_anonymous: PatternSet,
    /// Paths that refuse session-authenticated requests.
    pub disable_session: PatternSet,
}

impl PolicySnapshot {
    /// Compile every pattern list in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SigilError::InvalidPattern`](sigil_core::SigilError::InvalidPattern)
    /// for the first pattern that fails to compile.
    pub fn compile(config: &SigilConfig) -> SigilResult<Self> {
        let access = &config.access;
        let allow_account = access
            .allow_account
            .iter()
            .map(|(kind, sources)| Ok((kind.clone(), PatternSet::compile(sources)?)))
            .collect::<SigilResult<Vec<_>>>()?;

        Ok(Self {
            signature: config.signature.clone(),
            allow: PatternSet::compile(&access.allow)?,
            deny: PatternSet::compile(&access.deny)?,
            allow_ip: PatternSet::compile(&access.allow_ip)?,
            deny_ip: PatternSet::compile(&access.deny_ip)?,
            allow_admin: PatternSet::compile(&access.allow_admin)?,
            allow_account,
            allow_anonymous: PatternSet::compile(&access.allow_anonymous)?,
            disable_session: PatternSet::compile(&access.disable_session)?,
        })
    }
}

/// Holder of the current [`PolicySnapshot`].
#[derive(Debug)]
pub struct PolicyStore {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
    /// Create a store holding `snapshot`.
    #[must_use]
    pub fn new(snapshot: PolicySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Compile `config` into the initial snapshot.
    ///
    /// # Errors
    ///
    /// Fails if any configured pattern is invalid.
    pub fn from_config(config: &SigilConfig) -> SigilResult<Self> {
        PolicySnapshot::compile(config).map(Self::new)
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a new snapshot.
    pub fn replace(&self, snapshot: PolicySnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    /// Compile `config` and swap it in. On error the current snapshot is kept.
    ///
    /// # Errors
    ///
    /// Fails if any configured pattern is invalid.
    pub fn reload(&self, config: &SigilConfig) -> SigilResult<()> {
        let snapshot = PolicySnapshot::compile(config)?;
        self.replace(snapshot);
        info!("access policy reloaded");
        Ok(())
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(PolicySnapshot::default())
    }
}
