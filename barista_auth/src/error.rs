//! Authorization failures and the stages that raise them

use http::StatusCode;
use thiserror::Error;

use crate::scope::Permission;

/// The reason a request was refused access to a protected operation
///
/// Every variant maps to a fixed HTTP status and a machine-readable code,
/// which are reported to the client unchanged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No `Authorization` header was presented
    #[error("authorization header is expected")]
    AuthorizationHeaderMissing,

    /// The `Authorization` header is not of the form `Bearer <token>`
    #[error("authorization header must be of the form `Bearer <token>`")]
    InvalidHeaderFormat,

    /// The bearer token is not a structurally valid signed token
    #[error("token is malformed")]
    InvalidTokenStructure(#[source] MalformedToken),

    /// The token declares an algorithm that is not approved
    #[error("token algorithm `{alg}` is not approved")]
    InvalidAlgorithm {
        /// The algorithm named in the token header
        alg: String,
    },

    /// No key in the signing key set matches the token's key id
    #[error("unable to find the appropriate signing key")]
    KeyNotFound,

    /// The token signature does not match its content
    #[error("token signature is invalid")]
    InvalidSignature,

    /// The token has expired or carries no expiry
    #[error("token is expired")]
    TokenExpired,

    /// The token was not issued by the trusted issuer
    #[error("token issuer is not trusted")]
    InvalidIssuer,

    /// The token was not issued for this audience
    #[error("token audience is not accepted")]
    InvalidAudience,

    /// The token carries no permissions claim
    #[error("permissions not included in the `{claim}` claim")]
    MissingScopeClaim {
        /// The name of the claim that was expected
        claim: &'static str,
    },

    /// The token does not grant the permission required by the operation
    #[error("permission `{required}` not granted")]
    InsufficientPermission {
        /// The permission that was required
        required: Permission,
    },

    /// The signing key set could not be retrieved
    #[error("unable to retrieve signing keys")]
    KeySetUnavailable(#[source] KeySetError),
}

impl AuthError {
    /// The HTTP status reported for this failure
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingScopeClaim { .. } => StatusCode::BAD_REQUEST,
            Self::InsufficientPermission { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// The machine-readable code reported for this failure
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthorizationHeaderMissing => "authorization_header_missing",
            Self::InvalidHeaderFormat => "invalid_header",
            Self::InvalidTokenStructure(_) => "invalid_token",
            Self::InvalidAlgorithm { .. } => "invalid_algorithm",
            Self::KeyNotFound => "key_not_found",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenExpired => "token_expired",
            Self::InvalidIssuer => "invalid_issuer",
            Self::InvalidAudience => "invalid_audience",
            Self::MissingScopeClaim { .. } => "invalid_claims",
            Self::InsufficientPermission { .. } => "unauthorized",
            Self::KeySetUnavailable(_) => "key_set_unavailable",
        }
    }

    /// The human-readable description reported for this failure
    ///
    /// Underlying causes are omitted; they are available
    /// through [`std::error::Error::source`] for logging.
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// The last stage successfully reached before this failure was raised
    #[must_use]
    pub fn stage(&self) -> AuthStage {
        match self {
            Self::AuthorizationHeaderMissing | Self::InvalidHeaderFormat => AuthStage::Start,
            Self::InvalidTokenStructure(MalformedToken::Payload(_)) => AuthStage::SignatureVerified,
            Self::InvalidTokenStructure(_)
            | Self::InvalidAlgorithm { .. }
            | Self::KeyNotFound
            | Self::InvalidSignature
            | Self::KeySetUnavailable(_) => AuthStage::HeaderExtracted,
            Self::TokenExpired | Self::InvalidIssuer | Self::InvalidAudience => {
                AuthStage::SignatureVerified
            }
            Self::MissingScopeClaim { .. } | Self::InsufficientPermission { .. } => {
                AuthStage::ClaimsValidated
            }
        }
    }
}

/// Progress of a single authorization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStage {
    /// Nothing has been checked yet
    Start,
    /// A bearer token was extracted from the request
    HeaderExtracted,
    /// The token signature matched a trusted key
    SignatureVerified,
    /// Expiry, issuer and audience were accepted
    ClaimsValidated,
    /// The required permission was found
    ScopeChecked,
    /// The request may proceed
    Authorized,
}

impl AuthStage {
    /// A short label suitable for logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::HeaderExtracted => "header_extracted",
            Self::SignatureVerified => "signature_verified",
            Self::ClaimsValidated => "claims_validated",
            Self::ScopeChecked => "scope_checked",
            Self::Authorized => "authorized",
        }
    }
}

/// The ways a bearer token can fail to decode
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MalformedToken {
    /// The token is not three `.`-separated segments
    #[error("token must have exactly three segments")]
    Segments,

    /// A segment is not unpadded base64url
    #[error("token segment is not valid base64url")]
    Encoding(#[from] base64::DecodeError),

    /// The header is not a JSON object with an `alg` member
    #[error("token header is invalid")]
    Header(#[source] serde_json::Error),

    /// The payload does not decode as a claims object
    #[error("token payload is invalid")]
    Payload(#[source] serde_json::Error),
}

impl From<MalformedToken> for AuthError {
    #[inline]
    fn from(err: MalformedToken) -> Self {
        Self::InvalidTokenStructure(err)
    }
}

/// A failure to retrieve a signing key set from its remote source
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeySetError {
    /// The request exceeded its time limit
    #[error("key set request timed out")]
    Timeout(#[source] reqwest::Error),

    /// The request could not be completed
    #[error("key set request failed")]
    Request(#[source] reqwest::Error),

    /// The endpoint answered with an unexpected status
    #[error("key set endpoint responded with status {0}")]
    Status(StatusCode),

    /// The response body is not a key set document
    #[error("key set document is malformed")]
    Malformed(#[from] serde_json::Error),
}

impl From<reqwest::Error> for KeySetError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else {
            Self::Request(err)
        }
    }
}

impl From<KeySetError> for AuthError {
    #[inline]
    fn from(err: KeySetError) -> Self {
        Self::KeySetUnavailable(err)
    }
}
