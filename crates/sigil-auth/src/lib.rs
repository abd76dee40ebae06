//! Multi-version HMAC request signing and verification for Sigil.
//!
//! Clients sign each request with a secret shared with the server and send
//! the result as a compact pipe-delimited value. This crate implements both
//! sides of that protocol: minting signatures and verifying them.
//!
//! # Overview
//!
//! Five protocol versions are supported. Version 4 signs the full request
//! line, version 1 is its legacy SHA-1 predecessor, versions 2 and 3 are
//! domain-scoped signatures carried by a session or an encrypted bearer
//! token, and version 5 checks a clear-text login and password.
//!
//! # Usage
//!
//! ```rust
//! use sigil_auth::signer::{SignOptions, create_signature};
//! use sigil_auth::{AccountRecord, RequestContext, StaticAccountStore, Verifier};
//! use sigil_core::SignatureConfig;
//!
//! # tokio_test::block_on(async {
//! let verifier = Verifier::new(StaticAccountStore::new(vec![
//!     AccountRecord::builder().login("alice").secret("s3cr3t").build(),
//! ]));
//!
//! let issued = create_signature(
//!     "alice", "s3cr3t", "GET", "api.example.com", "/account/get", &SignOptions::default(),
//! )
//! .unwrap();
//!
//! let mut ctx = RequestContext::new("GET", "/account/get")
//!     .with_header("host", "api.example.com")
//!     .with_header("bk-signature", &issued.value);
//! verifier.check_signature(&mut ctx, &SignatureConfig::default()).await.unwrap();
//! assert_eq!(ctx.account.unwrap().login, "alice");
//! # });
//! ```
//!
//! # Modules
//!
//! - [`account`] - Account records and their credential material
//! - [`canonical`] - Canonical strings per protocol version
//! - [`context`] - Per-request state shared with the gates
//! - [`crypto`] - Bearer token and request body encryption
//! - [`envelope`] - Signature value codec and transport lookup
//! - [`error`] - Authentication error types
//! - [`signer`] - Signature minting and hash verification
//! - [`store`] - Account store trait, static and cached stores
//! - [`verifier`] - The verification state machine

pub mod account;
pub mod canonical;
pub mod context;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod signer;
pub mod store;
pub mod verifier;

pub use account::AccountRecord;
pub use context::{BodyParams, IssuedToken, RequestContext, Session};
pub use envelope::{SignatureEnvelope, SignatureVersion, SourceChannel, parse_signature};
pub use error::{AuthError, CryptoError, ErrorCategory, StoreError};
pub use signer::{IssuedSignature, SignOptions, body_checksum, create_signature, verify_signature};
pub use store::{AccountStore, CachedAccountStore, StaticAccountStore};
pub use verifier::Verifier;
