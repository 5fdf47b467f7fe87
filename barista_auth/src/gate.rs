//! The single entry point handlers use to authorize a request

use std::sync::Arc;

use http::{header, HeaderMap};

use crate::{
    clock::{Clock, System},
    error::{AuthError, AuthStage},
    jwt::Claims,
    scope::{PermissionRef, ScopeChecker},
    verify::TokenVerifier,
};

#[derive(Debug)]
struct Inner {
    verifier: TokenVerifier,
    checker: ScopeChecker,
}

/// Authorizes requests by verifying their bearer token and checking that it
/// grants a required permission
///
/// The gate keeps no per-request state. Clones share the same verifier and
/// key set.
#[derive(Debug, Clone)]
pub struct AuthGate {
    inner: Arc<Inner>,
}

impl AuthGate {
    /// Constructs a gate
    #[must_use]
    pub fn new(verifier: TokenVerifier, checker: ScopeChecker) -> Self {
        Self {
            inner: Arc::new(Inner { verifier, checker }),
        }
    }

    /// The verifier used on presented tokens
    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.inner.verifier
    }

    /// The checker applied to verified claims
    #[must_use]
    pub fn checker(&self) -> &ScopeChecker {
        &self.inner.checker
    }

    /// Verifies the request's bearer token and requires `required`
    ///
    /// # Errors
    ///
    /// The error raised by the first failing step, unchanged.
    pub async fn authorize(&self, headers: &HeaderMap, required: &PermissionRef) -> Result<Claims, AuthError> {
        self.authorize_with_clock(headers, required, &System).await
    }

    /// Verifies the request's bearer token against the given clock and
    /// requires `required`
    ///
    /// # Errors
    ///
    /// The error raised by the first failing step, unchanged.
    pub async fn authorize_with_clock<C>(
        &self,
        headers: &HeaderMap,
        required: &PermissionRef,
        clock: &C,
    ) -> Result<Claims, AuthError>
    where
        C: Clock + Sync,
    {
        let result = async {
            let claims = self.verify(headers, clock).await?;
            self.inner.checker.check(&claims, required)?;
            Ok::<_, AuthError>(claims)
        }
        .await;

        match &result {
            Ok(claims) => tracing::trace!(
                auth.stage = AuthStage::Authorized.as_str(),
                auth.permission = %required,
                auth.sub = claims.sub().map(|s| s.as_str()),
                "request authorized"
            ),
            Err(err) => log_rejection(err, Some(required)),
        }

        result
    }

    /// Verifies the request's bearer token without requiring any permission
    ///
    /// # Errors
    ///
    /// The error raised by the first failing verification step, unchanged.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let result = self.verify(headers, &System).await;
        if let Err(err) = &result {
            log_rejection(err, None);
        }

        result
    }

    async fn verify<C>(&self, headers: &HeaderMap, clock: &C) -> Result<Claims, AuthError>
    where
        C: Clock + Sync,
    {
        let raw = headers
            .get(header::AUTHORIZATION)
            .map(|value| value.to_str().map_err(|_| AuthError::InvalidHeaderFormat))
            .transpose()?;

        self.inner.verifier.verify_with_clock(raw, clock).await
    }
}

fn log_rejection(err: &AuthError, required: Option<&PermissionRef>) {
    let error: &(dyn std::error::Error + 'static) = err;
    tracing::debug!(
        error,
        auth.stage = err.stage().as_str(),
        auth.code = err.code(),
        auth.permission = required.map(|p| p.as_str()),
        "request rejected"
    );
}
