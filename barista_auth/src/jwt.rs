//! Decoding bearer tokens and validating their standard claims

use std::time::Duration;

use aliri_braid::braid;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, UnixTime},
    error::{AuthError, MalformedToken},
    jwa::Algorithm,
    jwks::KeyId,
    scope::Scope,
};

/// An audience a token may be issued for
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// An issuer of tokens
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The subject of a token
#[braid(serde, ref_doc = "A borrowed reference to a [`Subject`]")]
pub struct Subject;

/// A set of zero or more [`Audience`]s
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany<Audience>", into = "OneOrMany<Audience>")]
#[must_use]
pub struct Audiences(Vec<Audience>);

impl Audiences {
    /// An empty audience set
    #[inline]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Indicates whether the audience set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates through references to the audiences in the set
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &AudienceRef> {
        self.0.iter().map(AsRef::as_ref)
    }
}

impl From<OneOrMany<Audience>> for Audiences {
    #[inline]
    fn from(vals: OneOrMany<Audience>) -> Self {
        match vals {
            OneOrMany::One(x) => Self(vec![x]),
            OneOrMany::Many(v) => Self(v),
        }
    }
}

impl From<Audiences> for OneOrMany<Audience> {
    #[inline]
    fn from(mut auds: Audiences) -> Self {
        if auds.0.len() == 1 {
            if let Some(aud) = auds.0.pop() {
                return Self::One(aud);
            }
        }

        Self::Many(auds.0)
    }
}

/// One or more items, primarily for serialization
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A single item
    One(T),

    /// Zero or more items, serialized as an array
    Many(Vec<T>),
}

/// The protected header of a signed token
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Header {
    alg: String,
    #[serde(default)]
    kid: Option<KeyId>,
}

impl Header {
    /// The algorithm named by the token, as written
    #[must_use]
    pub fn alg(&self) -> &str {
        &self.alg
    }

    /// The id of the key that signed the token
    #[must_use]
    pub fn kid(&self) -> Option<&crate::jwks::KeyIdRef> {
        self.kid.as_deref()
    }
}

/// Claims decoded from a token whose signature has been verified
///
/// The registered claims this service relies on are typed; every other
/// claim is retained as JSON in [`Claims::extra`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Audiences::is_empty")]
    aud: Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permissions: Option<Scope>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// The `iss` claim
    #[must_use]
    pub fn iss(&self) -> Option<&IssuerRef> {
        self.iss.as_deref()
    }

    /// The `aud` claim
    pub fn aud(&self) -> &Audiences {
        &self.aud
    }

    /// The `sub` claim
    #[must_use]
    pub fn sub(&self) -> Option<&SubjectRef> {
        self.sub.as_deref()
    }

    /// The `exp` claim
    #[must_use]
    pub fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    /// The space-delimited OAuth2 `scope` claim
    #[must_use]
    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// The RBAC `permissions` claim
    #[must_use]
    pub fn permissions(&self) -> Option<&Scope> {
        self.permissions.as_ref()
    }

    /// Every claim without a typed accessor
    #[must_use]
    pub fn extra(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.extra
    }
}

/// A token split into its segments, with the signature not yet verified
#[derive(Debug)]
pub struct Decomposed<'a> {
    header: Header,
    message: &'a str,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

impl<'a> Decomposed<'a> {
    /// Splits and decodes a compact-serialized token
    ///
    /// # Errors
    ///
    /// The token does not have three unpadded base64url segments, or its
    /// header is not a JSON object naming an algorithm.
    pub fn parse(token: &'a str) -> Result<Self, MalformedToken> {
        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(MalformedToken::Segments);
        };

        let header = URL_SAFE_NO_PAD.decode(header_b64)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64)?;
        let signature = URL_SAFE_NO_PAD.decode(signature_b64)?;

        let header: Header = serde_json::from_slice(&header).map_err(MalformedToken::Header)?;

        Ok(Self {
            header,
            message: &token[..header_b64.len() + 1 + payload_b64.len()],
            payload,
            signature,
        })
    }

    /// The decoded header
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The signed portion of the token, `header.payload`
    #[must_use]
    pub fn message(&self) -> &'a str {
        self.message
    }

    /// The raw signature bytes
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Decodes the payload as claims
    ///
    /// Only meaningful after the signature has been verified.
    ///
    /// # Errors
    ///
    /// The payload is not a JSON object, or a typed claim has the wrong shape.
    pub fn claims(&self) -> Result<Claims, MalformedToken> {
        serde_json::from_slice(&self.payload).map_err(MalformedToken::Payload)
    }
}

/// Validates algorithms and standard claims against configuration
#[derive(Clone, Debug)]
#[must_use]
pub struct CoreValidator {
    approved_algorithms: Vec<Algorithm>,
    leeway: Duration,
    issuer: Issuer,
    audience: Audience,
}

impl CoreValidator {
    /// A validator requiring `issuer` and `audience`, approving only RS256
    pub fn new(issuer: impl Into<Issuer>, audience: impl Into<Audience>) -> Self {
        Self {
            approved_algorithms: vec![Algorithm::RS256],
            leeway: Duration::ZERO,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Replaces the approved algorithms
    pub fn with_algorithms(self, algs: impl IntoIterator<Item = Algorithm>) -> Self {
        Self {
            approved_algorithms: algs.into_iter().collect(),
            ..self
        }
    }

    /// Adds an approved algorithm
    pub fn add_approved_algorithm(mut self, alg: Algorithm) -> Self {
        if !self.approved_algorithms.contains(&alg) {
            self.approved_algorithms.push(alg);
        }
        self
    }

    /// Allows a grace period after expiry
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// The approved algorithms
    #[must_use]
    pub fn approved_algorithms(&self) -> &[Algorithm] {
        &self.approved_algorithms
    }

    /// The required issuer
    #[must_use]
    pub fn issuer(&self) -> &IssuerRef {
        &self.issuer
    }

    /// The required audience
    #[must_use]
    pub fn audience(&self) -> &AudienceRef {
        &self.audience
    }

    /// Resolves the algorithm named in a token header against the approved list
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidAlgorithm`] if the name is unknown or not approved.
    pub fn approve_algorithm(&self, header: &Header) -> Result<Algorithm, AuthError> {
        header
            .alg()
            .parse::<Algorithm>()
            .ok()
            .filter(|alg| self.approved_algorithms.contains(alg))
            .ok_or_else(|| AuthError::InvalidAlgorithm {
                alg: header.alg().to_owned(),
            })
    }

    /// Checks expiry, issuer, and audience, in that order
    ///
    /// A token is valid only while `exp + leeway > now`. A token without an
    /// `exp`, `iss`, or `aud` claim fails the corresponding check.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenExpired`], [`AuthError::InvalidIssuer`], or
    /// [`AuthError::InvalidAudience`] for the first check that fails.
    pub fn validate_with_clock<C: Clock>(&self, claims: &Claims, clock: &C) -> Result<(), AuthError> {
        let now = clock.now();
        match claims.exp() {
            Some(exp) if exp.0.saturating_add(self.leeway.as_secs()) > now.0 => {}
            _ => return Err(AuthError::TokenExpired),
        }

        if claims.iss() != Some(&*self.issuer) {
            return Err(AuthError::InvalidIssuer);
        }

        if !claims.aud().iter().any(|aud| aud == &*self.audience) {
            return Err(AuthError::InvalidAudience);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use serde_json::json;

    use super::*;
    use crate::clock::TestClock;

    const NOW: UnixTime = UnixTime(1_700_000_000);

    fn validator() -> CoreValidator {
        CoreValidator::new(
            Issuer::from_static("https://barista.test/"),
            Audience::from_static("drinks"),
        )
    }

    fn claims(value: serde_json::Value) -> Result<Claims> {
        Ok(serde_json::from_value(value)?)
    }

    fn encode(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    #[test]
    fn deserialize_claims() -> Result<()> {
        let claims = claims(json!({
            "iss": "https://barista.test/",
            "aud": ["drinks", "other"],
            "sub": "auth0|barista",
            "exp": 1_700_000_100,
            "iat": 1_700_000_000,
            "scope": "get:drinks-detail",
            "azp": "client"
        }))?;

        assert_eq!(claims.iss(), Some(IssuerRef::from_str("https://barista.test/")));
        assert_eq!(claims.aud().iter().count(), 2);
        assert_eq!(claims.sub(), Some(SubjectRef::from_str("auth0|barista")));
        assert_eq!(claims.exp(), Some(UnixTime(1_700_000_100)));
        assert_eq!(claims.extra().get("azp"), Some(&json!("client")));
        assert_eq!(claims.extra().get("iat"), Some(&json!(1_700_000_000)));
        assert!(claims.extra().get("exp").is_none());
        Ok(())
    }

    #[test]
    fn exp_equal_to_now_is_expired() -> Result<()> {
        let claims = claims(json!({
            "iss": "https://barista.test/",
            "aud": "drinks",
            "exp": NOW.0,
        }))?;

        let err = validator()
            .validate_with_clock(&claims, &TestClock::new(NOW))
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
        Ok(())
    }

    #[test]
    fn exp_one_second_ahead_is_valid() -> Result<()> {
        let claims = claims(json!({
            "iss": "https://barista.test/",
            "aud": "drinks",
            "exp": NOW.0 + 1,
        }))?;

        validator().validate_with_clock(&claims, &TestClock::new(NOW))?;
        Ok(())
    }

    #[test]
    fn leeway_extends_expiry() -> Result<()> {
        let claims = claims(json!({
            "iss": "https://barista.test/",
            "aud": "drinks",
            "exp": NOW.0 - 5,
        }))?;

        validator()
            .with_leeway(Duration::from_secs(10))
            .validate_with_clock(&claims, &TestClock::new(NOW))?;
        Ok(())
    }

    #[test]
    fn missing_exp_is_expired() -> Result<()> {
        let claims = claims(json!({ "iss": "https://barista.test/", "aud": "drinks" }))?;

        let err = validator()
            .validate_with_clock(&claims, &TestClock::new(NOW))
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
        Ok(())
    }

    #[test]
    fn issuer_must_match_exactly() -> Result<()> {
        for iss in [json!("https://barista.test"), json!("https://evil.test/"), json!(null)] {
            let claims = claims(json!({ "iss": iss, "aud": "drinks", "exp": NOW.0 + 60 }))?;

            let err = validator()
                .validate_with_clock(&claims, &TestClock::new(NOW))
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidIssuer), "iss = {iss}");
        }
        Ok(())
    }

    #[test]
    fn audience_may_be_one_of_many() -> Result<()> {
        let claims = claims(json!({
            "iss": "https://barista.test/",
            "aud": ["https://barista.test/userinfo", "drinks"],
            "exp": NOW.0 + 60,
        }))?;

        validator().validate_with_clock(&claims, &TestClock::new(NOW))?;
        Ok(())
    }

    #[test]
    fn audience_must_be_present() -> Result<()> {
        for aud in [json!("coffee"), json!([]), json!(["coffee", "tea"])] {
            let claims = claims(json!({
                "iss": "https://barista.test/",
                "aud": aud,
                "exp": NOW.0 + 60,
            }))?;

            let err = validator()
                .validate_with_clock(&claims, &TestClock::new(NOW))
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidAudience), "aud = {aud}");
        }
        Ok(())
    }

    #[test]
    fn expiry_is_checked_before_issuer() -> Result<()> {
        let claims = claims(json!({ "iss": "https://evil.test/", "exp": NOW.0 }))?;

        let err = validator()
            .validate_with_clock(&claims, &TestClock::new(NOW))
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
        Ok(())
    }

    #[test]
    fn unknown_and_unapproved_algorithms_are_rejected() -> Result<()> {
        let validator = validator();
        for alg in ["none", "HS256", "PS256"] {
            let header: Header = serde_json::from_value(json!({ "alg": alg }))?;
            let err = validator.approve_algorithm(&header).unwrap_err();
            assert!(matches!(err, AuthError::InvalidAlgorithm { alg: a } if a == alg));
        }

        let header: Header = serde_json::from_value(json!({ "alg": "RS256", "kid": "k" }))?;
        assert_eq!(validator.approve_algorithm(&header)?, Algorithm::RS256);
        Ok(())
    }

    #[test]
    fn decomposes_three_segments() -> Result<()> {
        let header = encode(&json!({ "alg": "RS256", "kid": "k" }));
        let payload = encode(&json!({ "sub": "s" }));
        let token = format!("{header}.{payload}.AAEC");

        let decomposed = Decomposed::parse(&token)?;

        assert_eq!(decomposed.header().alg(), "RS256");
        assert_eq!(decomposed.message(), format!("{header}.{payload}"));
        assert_eq!(decomposed.signature(), &[0, 1, 2]);
        assert_eq!(decomposed.claims()?.sub(), Some(SubjectRef::from_str("s")));
        Ok(())
    }

    #[test]
    fn rejects_structurally_invalid_tokens() {
        let header = encode(&json!({ "alg": "RS256" }));
        let no_alg = encode(&json!({ "kid": "k" }));
        let payload = encode(&json!({}));

        let cases = [
            String::new(),
            "abc".to_owned(),
            format!("{header}.{payload}"),
            format!("{header}.{payload}.sig.extra"),
            format!("{header}.{payload}.s!g"),
            format!("{header}=.{payload}.sig"),
            format!("{no_alg}.{payload}.sig"),
            format!("{}.{payload}.sig", URL_SAFE_NO_PAD.encode("not json")),
        ];

        for token in cases {
            assert!(Decomposed::parse(&token).is_err(), "token = {token:?}");
        }
    }

    #[test]
    fn non_object_payload_fails_after_decomposition() -> Result<()> {
        let header = encode(&json!({ "alg": "RS256" }));
        let payload = encode(&json!(["not", "claims"]));
        let token = format!("{header}.{payload}.sig");

        let decomposed = Decomposed::parse(&token)?;
        assert!(matches!(
            decomposed.claims().unwrap_err(),
            MalformedToken::Payload(_)
        ));
        Ok(())
    }
}
