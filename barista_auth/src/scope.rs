//! Permissions, scope sets, and checking a token against a required permission

use std::{collections::BTreeSet, fmt, str::FromStr};

use aliri_braid::braid;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{error::AuthError, jwt::Claims};

/// A single permission granted by a token, such as `post:drinks`
#[braid(serde, ref_doc = "A borrowed reference to a [`Permission`]")]
pub struct Permission;

/// The set of permissions granted by a token
///
/// Deserializes from either a space-delimited string (the OAuth2 `scope`
/// form) or an array of strings (the RBAC `permissions` form). Tokens are
/// compared exactly; `drinks` does not match `post:drinks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ScopeDto", into = "String")]
#[must_use]
pub struct Scope(BTreeSet<Permission>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ScopeDto {
    Delimited(String),
    List(Vec<Permission>),
}

impl From<ScopeDto> for Scope {
    fn from(dto: ScopeDto) -> Self {
        match dto {
            ScopeDto::Delimited(s) => Self::from_delimited(&s),
            ScopeDto::List(list) => list.into_iter().collect(),
        }
    }
}

impl Scope {
    /// A scope granting nothing
    #[inline]
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// Splits a whitespace-delimited list of permissions
    pub fn from_delimited(s: &str) -> Self {
        s.split_whitespace().map(Permission::from).collect()
    }

    /// Whether `permission` is granted
    #[inline]
    #[must_use]
    pub fn contains(&self, permission: &PermissionRef) -> bool {
        self.0.contains(permission)
    }

    /// Iterates over the granted permissions in order
    pub fn iter(&self) -> impl Iterator<Item = &PermissionRef> {
        self.0.iter().map(AsRef::as_ref)
    }

    /// The number of granted permissions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no permissions are granted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Permission> for Scope {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for permission in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(permission.as_str())?;
            first = false;
        }
        Ok(())
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

/// The claim that carries a token's permissions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ScopeClaim {
    /// The OAuth2 `scope` claim
    #[default]
    Scope,
    /// The `permissions` claim added by role-based access control
    Permissions,
}

impl ScopeClaim {
    /// The claim name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scope => "scope",
            Self::Permissions => "permissions",
        }
    }
}

impl fmt::Display for ScopeClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The named claim cannot carry permissions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is not a permissions claim; expected `scope` or `permissions`")]
pub struct UnknownScopeClaim(pub String);

impl FromStr for ScopeClaim {
    type Err = UnknownScopeClaim;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scope" => Ok(Self::Scope),
            "permissions" => Ok(Self::Permissions),
            _ => Err(UnknownScopeClaim(s.to_owned())),
        }
    }
}

/// Checks that validated claims grant a required permission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeChecker {
    claim: ScopeClaim,
}

impl ScopeChecker {
    /// A checker reading the `scope` claim
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            claim: ScopeClaim::Scope,
        }
    }

    /// A checker reading the given claim
    #[inline]
    #[must_use]
    pub const fn reading(claim: ScopeClaim) -> Self {
        Self { claim }
    }

    /// The claim this checker reads
    #[inline]
    #[must_use]
    pub const fn claim(&self) -> ScopeClaim {
        self.claim
    }

    /// Fails unless `claims` grants `required`
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingScopeClaim`] when the claim is absent, and
    /// [`AuthError::InsufficientPermission`] when the permission is not one
    /// of its tokens.
    pub fn check(&self, claims: &Claims, required: &PermissionRef) -> Result<(), AuthError> {
        let granted = match self.claim {
            ScopeClaim::Scope => claims.scope(),
            ScopeClaim::Permissions => claims.permissions(),
        }
        .ok_or(AuthError::MissingScopeClaim {
            claim: self.claim.name(),
        })?;

        if granted.contains(required) {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermission {
                required: required.to_owned(),
            })
        }
    }
}
