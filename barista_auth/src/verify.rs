//! Verifying bearer tokens presented in an `Authorization` header

use crate::{
    cache::KeySetCache,
    clock::{Clock, System},
    error::AuthError,
    jwt::{Claims, CoreValidator, Decomposed},
};

/// Extracts the token from a `Bearer <token>` header value
///
/// The scheme is matched case-insensitively. The value must be exactly two
/// whitespace-separated parts, so an empty token is rejected.
///
/// # Errors
///
/// [`AuthError::InvalidHeaderFormat`] if the value is not of that form.
pub fn extract_bearer(raw: &str) -> Result<&str, AuthError> {
    let mut parts = raw.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::InvalidHeaderFormat),
    }
}

/// Verifies signed bearer tokens against a key set and claim requirements
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: KeySetCache,
    validator: CoreValidator,
}

impl TokenVerifier {
    /// Constructs a verifier
    #[must_use]
    pub fn new(keys: KeySetCache, validator: CoreValidator) -> Self {
        Self { keys, validator }
    }

    /// The key set used to check signatures
    pub fn keys(&self) -> &KeySetCache {
        &self.keys
    }

    /// The validator applied to token headers and claims
    pub fn validator(&self) -> &CoreValidator {
        &self.validator
    }

    /// Verifies the raw `Authorization` header value, if any
    ///
    /// # Errors
    ///
    /// The first failing check, in order: header presence, header format,
    /// token structure, algorithm, key id, signature, then expiry, issuer,
    /// and audience.
    pub async fn verify(&self, raw_header: Option<&str>) -> Result<Claims, AuthError> {
        self.verify_with_clock(raw_header, &System).await
    }

    /// Verifies the raw `Authorization` header value against the given clock
    ///
    /// # Errors
    ///
    /// See [`TokenVerifier::verify`].
    pub async fn verify_with_clock<C>(&self, raw_header: Option<&str>, clock: &C) -> Result<Claims, AuthError>
    where
        C: Clock + Sync,
    {
        let raw = raw_header.ok_or(AuthError::AuthorizationHeaderMissing)?;
        let token = extract_bearer(raw)?;

        let decomposed = Decomposed::parse(token)?;
        let alg = self.validator.approve_algorithm(decomposed.header())?;
        let kid = decomposed.header().kid().ok_or(AuthError::KeyNotFound)?;

        let keys = self.keys.get_keys_for(kid).await?;
        let key = keys.find(kid, alg).ok_or_else(|| {
            tracing::debug!(%kid, %alg, "unable to find matching key");
            AuthError::KeyNotFound
        })?;

        key.key().verify(
            alg,
            decomposed.message().as_bytes(),
            decomposed.signature(),
        )?;

        let claims = decomposed.claims()?;
        self.validator.validate_with_clock(&claims, clock)?;

        Ok(claims)
    }
}
