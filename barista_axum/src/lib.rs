//! Axum guards that authorize individual routes against a required permission
//!
//! A guard is declared with [`permission_guard!`] or [`permission_guards!`]
//! and then used as an extractor. Extracting the guard runs
//! [`AuthGate::authorize`][barista_auth::AuthGate::authorize] with the
//! guard's permission, using the gate found in the router state through
//! [`FromRef`][axum_core::extract::FromRef]. A refused request is answered
//! with an [`AuthRejection`].
//!
//! ```no_run
//! use axum::{extract::FromRef, routing::post, Router};
//! use barista_auth::AuthGate;
//!
//! mod permission {
//!     barista_axum::permission_guards! {
//!         pub permission PostDrinks = "post:drinks";
//!         pub permission DeleteDrinks = "delete:drinks";
//!     }
//! }
//!
//! #[derive(Clone)]
//! struct AppState {
//!     gate: AuthGate,
//! }
//!
//! impl FromRef<AppState> for AuthGate {
//!     fn from_ref(state: &AppState) -> Self {
//!         state.gate.clone()
//!     }
//! }
//!
//! async fn create(permission::PostDrinks(claims): permission::PostDrinks) -> String {
//!     format!("created for {:?}", claims.sub())
//! }
//!
//! # fn app(gate: AuthGate) -> Router {
//! Router::new()
//!     .route("/drinks", post(create))
//!     .with_state(AppState { gate })
//! # }
//! ```

#![warn(missing_docs, unused_import_braces, unused_imports)]
#![deny(missing_debug_implementations, unused_must_use)]
#![forbid(unsafe_code)]

use std::{error::Error, fmt};

use axum_core::response::{IntoResponse, Response};
use barista_auth::{AuthError, PermissionRef};
use http::{header, HeaderValue};

mod macros;
pub mod util;

/// Names the permission an endpoint guard requires
pub trait EndpointPermission {
    /// The permission enforced when this type is used as an endpoint guard
    fn permission() -> &'static PermissionRef;
}

/// A request refused by an endpoint guard
///
/// The response carries the failure's own status, a bearer challenge in
/// `www-authenticate`, and a JSON body:
///
/// ```json
/// {
///   "success": false,
///   "error": 403,
///   "message": "permission `post:drinks` not granted",
///   "code": "unauthorized",
///   "description": "permission `post:drinks` not granted"
/// }
/// ```
#[derive(Debug)]
pub struct AuthRejection(AuthError);

impl AuthRejection {
    /// The underlying authorization failure
    #[must_use]
    pub fn error(&self) -> &AuthError {
        &self.0
    }

    /// Unwraps the underlying authorization failure
    #[must_use]
    pub fn into_error(self) -> AuthError {
        self.0
    }

    /// The JSON body sent to the client
    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        let description = self.0.description();
        serde_json::json!({
            "success": false,
            "error": self.0.status().as_u16(),
            "message": description,
            "code": self.0.code(),
            "description": description,
        })
    }
}

impl From<AuthError> for AuthRejection {
    #[inline]
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Error for AuthRejection {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (
            self.0.status(),
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                ),
                (header::WWW_AUTHENTICATE, util::challenge(&self.0)),
            ],
            self.body().to_string(),
        )
            .into_response()
    }
}

#[doc(hidden)]
pub mod __private {
    pub use barista_auth::{AuthGate, Claims, PermissionRef};
    use http::request::Parts;

    use crate::AuthRejection;

    pub async fn authorize(
        gate: &AuthGate,
        req: &Parts,
        permission: &'static PermissionRef,
    ) -> Result<Claims, AuthRejection> {
        gate.authorize(&req.headers, permission)
            .await
            .map_err(AuthRejection::from)
    }
}
