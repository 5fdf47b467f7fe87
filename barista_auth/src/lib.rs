//! Bearer token authorization for the barista drinks service
//!
//! Requests are authorized in one call to [`AuthGate::authorize`], which
//! extracts the bearer token from the `Authorization` header, verifies it
//! with a [`TokenVerifier`] against the issuer's signing keys held in a
//! [`KeySetCache`], and then asks a [`ScopeChecker`] whether the verified
//! claims grant the permission the operation requires. Any failure is
//! reported as the [`AuthError`] raised by the step that failed.
//!
//! ```no_run
//! use barista_auth::{
//!     jwt::{Audience, Issuer},
//!     AuthGate, CoreValidator, KeySetCache, PermissionRef, RemoteOptions, ScopeChecker,
//!     TokenVerifier,
//! };
//!
//! # async fn example(headers: http::HeaderMap) -> Result<(), Box<dyn std::error::Error>> {
//! let keys = KeySetCache::remote(
//!     "https://tenant.auth0.com/.well-known/jwks.json",
//!     RemoteOptions::default(),
//! )?;
//! let validator = CoreValidator::new(
//!     Issuer::from_static("https://tenant.auth0.com/"),
//!     Audience::from_static("drinks"),
//! );
//! let gate = AuthGate::new(TokenVerifier::new(keys, validator), ScopeChecker::new());
//!
//! let claims = gate
//!     .authorize(&headers, PermissionRef::from_static("post:drinks"))
//!     .await?;
//! println!("authorized {:?}", claims.sub());
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod cache;
mod error;
mod gate;
mod jwa;
mod jwks;
pub mod jwt;
mod scope;
mod verify;

#[cfg(any(test, feature = "test-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod test_util;

pub use aliri_clock as clock;
pub use cache::{KeySetCache, RemoteOptions};
pub use error::{AuthError, AuthStage, KeySetError, MalformedToken};
pub use gate::AuthGate;
pub use jwa::{Algorithm, UnknownAlgorithm};
pub use jwks::{KeyId, KeyIdRef, RsaPublicKey, SigningKey, SigningKeySet};
pub use jwt::{Claims, CoreValidator};
pub use scope::{Permission, PermissionRef, Scope, ScopeChecker, ScopeClaim, UnknownScopeClaim};
pub use verify::{extract_bearer, TokenVerifier};
