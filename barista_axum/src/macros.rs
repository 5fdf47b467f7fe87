//! Declaring extractors that authorize a request for a single permission

/// Declares an extractor that authorizes the request for one permission
///
/// For a more concise way to declare several guards, see
/// [`permission_guards!`][crate::permission_guards!].
///
/// ```
/// use barista_axum::permission_guard;
///
/// permission_guard!(pub PostDrinks; "post:drinks");
/// ```
///
/// The router state must provide an [`AuthGate`][barista_auth::AuthGate]
/// through `FromRef`. Extracting the guard verifies the bearer token and
/// checks the permission before the handler body runs; the verified claims
/// are handed to the handler:
///
/// ```
/// use barista_axum::permission_guard;
///
/// permission_guard!(DeleteDrinks; "delete:drinks");
///
/// async fn delete(DeleteDrinks(claims): DeleteDrinks) -> String {
///     format!("deleted on behalf of {:?}", claims.sub())
/// }
///
/// // Or ignore the claims if they aren't needed
/// async fn delete_quietly(_: DeleteDrinks) -> &'static str {
///     "deleted"
/// }
/// ```
///
/// Place the guard before any extractor that consumes the request body so
/// that authorization failures take precedence over body errors.
#[macro_export]
macro_rules! permission_guard {
    ($vis:vis $i:ident; $permission:literal) => {
        #[doc = concat!("Authorizes a request holding the `", $permission, "` permission")]
        ///
        /// Extraction is rejected if the bearer token is missing or invalid,
        /// or does not grant the permission.
        #[derive(Clone, Debug)]
        $vis struct $i($vis $crate::__private::Claims);

        impl $i {
            #[allow(dead_code)]
            $vis fn into_claims(self) -> $crate::__private::Claims {
                self.0
            }

            #[allow(dead_code)]
            $vis fn claims(&self) -> &$crate::__private::Claims {
                &self.0
            }
        }

        impl $crate::EndpointPermission for $i {
            fn permission() -> &'static $crate::__private::PermissionRef {
                $crate::__private::PermissionRef::from_static($permission)
            }
        }

        #[::axum::async_trait]
        impl<S> ::axum::extract::FromRequestParts<S> for $i
        where
            S: Send + Sync,
            $crate::__private::AuthGate: ::axum::extract::FromRef<S>,
        {
            type Rejection = $crate::AuthRejection;

            async fn from_request_parts(
                req: &mut ::axum::http::request::Parts,
                state: &S,
            ) -> Result<Self, Self::Rejection> {
                let gate = <$crate::__private::AuthGate as ::axum::extract::FromRef<S>>::from_ref(state);
                $crate::__private::authorize(
                    &gate,
                    req,
                    <Self as $crate::EndpointPermission>::permission(),
                )
                .await
                .map(Self)
            }
        }
    };
}

/// Declares several permission guards at once
///
/// ```
/// barista_axum::permission_guards! {
///     pub permission ReadDetail = "get:drinks-detail";
///     pub permission PostDrinks = "post:drinks";
///     pub(crate) permission PatchDrinks = "patch:drinks";
///     permission DeleteDrinks = "delete:drinks";
/// }
/// ```
///
/// Each line expands to a [`permission_guard!`][crate::permission_guard!].
#[macro_export]
macro_rules! permission_guards {
    ($($vis:vis permission $i:ident = $permission:literal;)*) => {
        $(
            $crate::permission_guard!($vis $i; $permission);
        )*
    };
}
