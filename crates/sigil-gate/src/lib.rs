//! Access control and authorization around Sigil signature verification.
//!
//! A request passes three stages:
//!
//! 1. the [`AccessGate`] checks IP and path lists and runs access hooks; it
//!    may accept or refuse the request before any signature work,
//! 2. the [`Verifier`](sigil_auth::Verifier) authenticates the signature,
//! 3. the [`AuthorizationGate`] applies role rules and auth hooks to the
//!    verifier's status and produces the final [`AuthStatus`].
//!
//! [`AuthPipeline`] wires the three together against a hot-reloadable
//! [`PolicyStore`] and a shared [`HookRegistry`].
//!
//! # Modules
//!
//! - [`access`] - Pre-authentication access gate
//! - [`authorization`] - Post-authentication authorization gate
//! - [`hooks`] - Hook traits and the ordered registry
//! - [`pipeline`] - The full pipeline and credential issuance
//! - [`policy`] - Compiled policy snapshot and atomic reload
//! - [`status`] - Status and decision values

pub mod access;
pub mod authorization;
pub mod hooks;
pub mod pipeline;
pub mod policy;
pub mod status;

pub use access::AccessGate;
pub use authorization::AuthorizationGate;
pub use hooks::{AccessHook, AuthHook, HookKind, HookOutcome, HookRegistry};
pub use pipeline::{AuthPipeline, SessionOptions};
pub use policy::{PolicySnapshot, PolicyStore};
pub use status::{AuthStatus, Decision};
