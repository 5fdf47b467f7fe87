//! Fixtures for signing tokens in tests
//!
//! The private keys under `data/rsa/` are test-only material; the matching
//! public key sets are exposed as [`PRIMARY_JWKS`] and [`SECONDARY_JWKS`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::json;

use crate::{
    clock::{Clock, System, UnixTime},
    jwa::Algorithm,
    jwks::SigningKeySet,
};

/// Key id of the primary test key
pub const PRIMARY_KEY_ID: &str = "barista-test-1";

/// Key id of the secondary test key
pub const SECONDARY_KEY_ID: &str = "barista-test-2";

/// A key set publishing only the primary test key
pub const PRIMARY_JWKS: &str = include_str!("../data/rsa/primary-jwks.json");

/// A key set publishing only the secondary test key
pub const SECONDARY_JWKS: &str = include_str!("../data/rsa/secondary-jwks.json");

/// Issuer used by test tokens
pub const ISSUER: &str = "https://barista.test/";

/// Audience used by test tokens
pub const AUDIENCE: &str = "drinks";

const PRIMARY_PKCS8: &[u8] = include_bytes!("../data/rsa/primary.pk8");
const SECONDARY_PKCS8: &[u8] = include_bytes!("../data/rsa/secondary.pk8");

/// Parses one of the published test key sets
///
/// # Panics
///
/// If `jwks` is not a key set document.
#[must_use]
pub fn key_set(jwks: &str) -> SigningKeySet {
    serde_json::from_str(jwks).expect("test key set is valid")
}

/// Signs tokens with a fixed RSA test key
#[derive(Debug)]
pub struct TestSigner {
    key_pair: ring::signature::RsaKeyPair,
    kid: Option<String>,
    alg: Algorithm,
}

impl TestSigner {
    /// A signer using the primary key, published in [`PRIMARY_JWKS`]
    #[must_use]
    pub fn primary() -> Self {
        Self::from_pkcs8(PRIMARY_PKCS8, PRIMARY_KEY_ID)
    }

    /// A signer using the secondary key, published in [`SECONDARY_JWKS`]
    #[must_use]
    pub fn secondary() -> Self {
        Self::from_pkcs8(SECONDARY_PKCS8, SECONDARY_KEY_ID)
    }

    fn from_pkcs8(der: &[u8], kid: &str) -> Self {
        Self {
            key_pair: ring::signature::RsaKeyPair::from_pkcs8(der).expect("test key is valid"),
            kid: Some(kid.to_owned()),
            alg: Algorithm::RS256,
        }
    }

    /// Overrides the key id written into token headers
    #[must_use]
    pub fn with_kid(self, kid: Option<&str>) -> Self {
        Self {
            kid: kid.map(ToOwned::to_owned),
            ..self
        }
    }

    /// Signs with `alg` instead of RS256
    #[must_use]
    pub fn with_alg(self, alg: Algorithm) -> Self {
        Self { alg, ..self }
    }

    /// The header this signer writes
    #[must_use]
    pub fn header(&self) -> serde_json::Value {
        match &self.kid {
            Some(kid) => json!({ "alg": self.alg.name(), "typ": "JWT", "kid": kid }),
            None => json!({ "alg": self.alg.name(), "typ": "JWT" }),
        }
    }

    /// Signs `claims` under this signer's header
    #[must_use]
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        self.sign_with_header(&self.header(), claims)
    }

    /// Signs `claims` under an arbitrary header, still using this signer's algorithm
    ///
    /// # Panics
    ///
    /// If the signing operation fails.
    #[must_use]
    pub fn sign_with_header(
        &self,
        header: &serde_json::Value,
        claims: &serde_json::Value,
    ) -> String {
        let message = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );

        let rng = ring::rand::SystemRandom::new();
        let mut signature = vec![0; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(signing_params(self.alg), &rng, message.as_bytes(), &mut signature)
            .expect("test key can sign");

        format!("{message}.{}", URL_SAFE_NO_PAD.encode(signature))
    }
}

fn signing_params(alg: Algorithm) -> &'static dyn ring::signature::RsaEncoding {
    match alg {
        Algorithm::RS256 => &ring::signature::RSA_PKCS1_SHA256,
        Algorithm::RS384 => &ring::signature::RSA_PKCS1_SHA384,
        Algorithm::RS512 => &ring::signature::RSA_PKCS1_SHA512,
        Algorithm::PS256 => &ring::signature::RSA_PSS_SHA256,
        Algorithm::PS384 => &ring::signature::RSA_PSS_SHA384,
        Algorithm::PS512 => &ring::signature::RSA_PSS_SHA512,
    }
}

/// Claims accepted by a verifier configured with [`ISSUER`] and [`AUDIENCE`]
/// that expire `ttl` seconds after `now`
#[must_use]
pub fn claims_at(now: UnixTime, ttl: u64, scope: &str) -> serde_json::Value {
    json!({
        "iss": ISSUER,
        "aud": [AUDIENCE, "https://barista.test/userinfo"],
        "sub": "auth0|barista-test",
        "iat": now.0,
        "exp": now.0 + ttl,
        "scope": scope,
    })
}

/// Claims valid for the next hour of wall-clock time
#[must_use]
pub fn claims(scope: &str) -> serde_json::Value {
    claims_at(System.now(), 3600, scope)
}
