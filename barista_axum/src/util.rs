//! `www-authenticate` challenges for authorization failures

use barista_auth::AuthError;
use http::{HeaderValue, StatusCode};

/// Builds the RFC 6750 bearer challenge describing `err`
///
/// Descriptions are escaped so that the result is always a valid header
/// value. The error code follows the failure's status:
///
/// ```http
/// 400 → www-authenticate: Bearer error="invalid_request" error_description="..."
/// 401 → www-authenticate: Bearer error="invalid_token" error_description="..."
/// 403 → www-authenticate: Bearer error="insufficient_scope" error_description="..." scope="..."
/// ```
#[must_use]
pub fn challenge(err: &AuthError) -> HeaderValue {
    let description = err.description();
    match err {
        AuthError::InsufficientPermission { required } => {
            bearer("insufficient_scope", &description, Some(required.as_str()))
        }
        _ if err.status() == StatusCode::BAD_REQUEST => {
            bearer("invalid_request", &description, None)
        }
        _ => bearer("invalid_token", &description, None),
    }
}

/// Builds a bearer challenge with the given error code
///
/// `error_description` is omitted if `description` is empty, and `scope` is
/// omitted if not given.
#[must_use]
pub fn bearer(error: &'static str, description: &str, scope: Option<&str>) -> HeaderValue {
    let mut value = format!(r#"Bearer error="{error}""#);

    if !description.is_empty() {
        value.push_str(&format!(
            r#" error_description="{}""#,
            description.escape_default()
        ));
    }

    if let Some(scope) = scope {
        value.push_str(&format!(r#" scope="{}""#, scope.escape_default()));
    }

    // Escaped text is always printable ASCII
    HeaderValue::try_from(value).unwrap_or_else(|_| HeaderValue::from_static("Bearer"))
}
