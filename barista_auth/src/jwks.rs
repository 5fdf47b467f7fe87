//! Signing key sets published by a token issuer

use std::fmt;

use aliri_braid::braid;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;

use crate::{error::AuthError, jwa::Algorithm};

/// An identifier for a key within a key set
#[braid(serde, ref_doc = "A borrowed reference to a [`KeyId`]")]
pub struct KeyId;

/// An RSA public key
#[derive(Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl RsaPublicKey {
    /// Constructs a key from its big-endian modulus and public exponent
    #[must_use]
    pub fn from_components(modulus: Vec<u8>, exponent: Vec<u8>) -> Self {
        Self { modulus, exponent }
    }

    /// Verifies `signature` over `message`
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSignature`] if the signature does not
    /// match, including when the key itself is unusable.
    pub fn verify(&self, alg: Algorithm, message: &[u8], signature: &[u8]) -> Result<(), AuthError> {
        let key = ring::signature::RsaPublicKeyComponents {
            n: &self.modulus,
            e: &self.exponent,
        };

        key.verify(alg.verification_params(), message, signature)
            .map_err(|_| AuthError::InvalidSignature)
    }
}

impl fmt::Debug for RsaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPublicKey")
            .field("bits", &(self.modulus.len() * 8))
            .finish()
    }
}

/// A public key usable to verify token signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    kid: Option<KeyId>,
    alg: Option<Algorithm>,
    key: RsaPublicKey,
}

impl SigningKey {
    /// Constructs a signing key
    #[must_use]
    pub fn new(kid: Option<KeyId>, alg: Option<Algorithm>, key: RsaPublicKey) -> Self {
        Self { kid, alg, key }
    }

    /// The key identifier, if published
    #[must_use]
    pub fn kid(&self) -> Option<&KeyIdRef> {
        self.kid.as_deref()
    }

    /// The single algorithm this key is restricted to, if published
    #[must_use]
    pub fn alg(&self) -> Option<Algorithm> {
        self.alg
    }

    /// The key material
    #[must_use]
    pub fn key(&self) -> &RsaPublicKey {
        &self.key
    }

    fn accepts(&self, kid: &KeyIdRef, alg: Algorithm) -> bool {
        self.kid() == Some(kid) && self.alg.map_or(true, |a| a == alg)
    }
}

/// An ordered set of signing keys
///
/// When deserialized from a JWKS document, entries that are not RSA
/// signature keys are skipped with a warning rather than failing the
/// whole set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "JwksDto")]
pub struct SigningKeySet {
    keys: Vec<SigningKey>,
}

impl SigningKeySet {
    /// Adds a key to the end of the set
    pub fn add_key(&mut self, key: SigningKey) {
        self.keys.push(key);
    }

    /// The keys in publication order
    #[must_use]
    pub fn keys(&self) -> &[SigningKey] {
        &self.keys
    }

    /// The number of usable keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set has no usable keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether any key carries the identifier `kid`
    #[must_use]
    pub fn contains_kid(&self, kid: &KeyIdRef) -> bool {
        self.keys.iter().any(|k| k.kid() == Some(kid))
    }

    /// Finds the first key with identifier `kid` that may verify `alg`
    #[must_use]
    pub fn find(&self, kid: &KeyIdRef, alg: Algorithm) -> Option<&SigningKey> {
        self.keys.iter().find(|k| k.accepts(kid, alg))
    }
}

impl FromIterator<SigningKey> for SigningKeySet {
    fn from_iter<T: IntoIterator<Item = SigningKey>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

#[derive(Deserialize)]
struct JwksDto {
    keys: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct JwkDto {
    kty: String,
    #[serde(default)]
    kid: Option<KeyId>,
    #[serde(default, rename = "use")]
    usage: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

impl From<JwksDto> for SigningKeySet {
    fn from(dto: JwksDto) -> Self {
        dto.keys
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match signing_key_from_value(value) {
                Ok(key) => Some(key),
                Err(reason) => {
                    tracing::warn!(jwks.index = index, reason, "skipping unusable key");
                    None
                }
            })
            .collect()
    }
}

fn signing_key_from_value(value: serde_json::Value) -> Result<SigningKey, &'static str> {
    let jwk: JwkDto = serde_json::from_value(value).map_err(|_| "not a JSON web key")?;

    if jwk.kty != "RSA" {
        return Err("unsupported key type");
    }

    if jwk.usage.as_deref().is_some_and(|u| u != "sig") {
        return Err("not a signature key");
    }

    let alg = jwk
        .alg
        .as_deref()
        .map(str::parse::<Algorithm>)
        .transpose()
        .map_err(|_| "unsupported algorithm")?;

    let (Some(n), Some(e)) = (jwk.n, jwk.e) else {
        return Err("missing RSA public components");
    };

    let modulus = URL_SAFE_NO_PAD
        .decode(n)
        .map_err(|_| "modulus is not base64url")?;
    let exponent = URL_SAFE_NO_PAD
        .decode(e)
        .map_err(|_| "exponent is not base64url")?;

    Ok(SigningKey::new(
        jwk.kid,
        alg,
        RsaPublicKey::from_components(modulus, exponent),
    ))
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::test_util;

    #[test]
    fn parses_published_rsa_keys() -> Result<()> {
        let jwks: SigningKeySet = serde_json::from_str(test_util::PRIMARY_JWKS)?;

        assert_eq!(jwks.len(), 1);
        let key = &jwks.keys()[0];
        assert_eq!(key.kid(), Some(KeyIdRef::from_str(test_util::PRIMARY_KEY_ID)));
        assert_eq!(key.alg(), Some(Algorithm::RS256));
        Ok(())
    }

    #[test]
    #[tracing_test::traced_test]
    fn skips_keys_that_cannot_verify_signatures() -> Result<()> {
        const DATA: &str = r#"{
            "keys": [
                { "kty": "EC", "kid": "ec", "crv": "P-256", "x": "AA", "y": "AA" },
                { "kty": "RSA", "kid": "enc", "use": "enc", "n": "AQAB", "e": "AQAB" },
                { "kty": "RSA", "kid": "hmac", "alg": "HS256", "n": "AQAB", "e": "AQAB" },
                { "kty": "RSA", "kid": "no-material" },
                { "kty": "RSA", "kid": "bad-material", "n": "***", "e": "AQAB" },
                "not even an object",
                { "kty": "RSA", "kid": "good", "use": "sig", "n": "AQAB", "e": "AQAB" }
            ]
        }"#;

        let jwks: SigningKeySet = serde_json::from_str(DATA)?;

        assert_eq!(jwks.len(), 1);
        assert!(jwks.contains_kid(KeyIdRef::from_str("good")));
        assert!(!jwks.contains_kid(KeyIdRef::from_str("enc")));
        assert!(logs_contain("skipping unusable key"));
        Ok(())
    }

    #[test]
    fn document_without_keys_is_malformed() {
        assert!(serde_json::from_str::<SigningKeySet>(r#"{"kids": []}"#).is_err());
        assert!(serde_json::from_str::<SigningKeySet>("[]").is_err());
    }

    #[test]
    fn find_respects_declared_algorithm() -> Result<()> {
        let jwks: SigningKeySet = serde_json::from_str(test_util::PRIMARY_JWKS)?;
        let kid = KeyIdRef::from_str(test_util::PRIMARY_KEY_ID);

        assert!(jwks.find(kid, Algorithm::RS256).is_some());
        assert!(jwks.find(kid, Algorithm::PS256).is_none());
        assert!(jwks.find(KeyIdRef::from_str("other"), Algorithm::RS256).is_none());
        Ok(())
    }

    #[test]
    fn key_without_declared_algorithm_accepts_any() {
        let mut jwks = SigningKeySet::default();
        jwks.add_key(SigningKey::new(
            Some(KeyId::from_static("k")),
            None,
            RsaPublicKey::from_components(vec![1], vec![1, 0, 1]),
        ));

        assert!(jwks.find(KeyIdRef::from_str("k"), Algorithm::PS512).is_some());
    }
}
