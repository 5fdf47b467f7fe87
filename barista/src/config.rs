//! Startup configuration, read from flags or the environment

use std::{net::SocketAddr, time::Duration};

use barista_auth::{
    jwt::{Audience, Issuer},
    Algorithm, AuthGate, CoreValidator, KeySetCache, KeySetError, RemoteOptions, ScopeChecker,
    ScopeClaim, TokenVerifier,
};
use clap::Parser;

/// Serves the drinks menu, gating changes behind bearer-token permissions
#[derive(Debug, Clone, Parser)]
#[command(name = "barista", version, about)]
pub struct Config {
    /// The address to listen on
    #[arg(long, env = "BARISTA_BIND", default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    /// The trusted token issuer, such as `https://tenant.auth0.com/`
    #[arg(long, env = "AUTH_ISSUER")]
    pub issuer: Issuer,

    /// The audience tokens must be issued for
    #[arg(long, env = "AUTH_AUDIENCE")]
    pub audience: Audience,

    /// Signing algorithms accepted on tokens
    #[arg(
        long,
        env = "AUTH_ALGORITHMS",
        value_delimiter = ',',
        default_value = "RS256"
    )]
    pub algorithms: Vec<Algorithm>,

    /// Path of the issuer's key set, relative to the issuer
    #[arg(long, env = "AUTH_JWKS_PATH", default_value = ".well-known/jwks.json")]
    pub jwks_path: String,

    /// Time limit for fetching the key set, in seconds
    #[arg(long, env = "AUTH_JWKS_TIMEOUT_SECS", default_value_t = 5)]
    pub jwks_timeout_secs: u64,

    /// How often to refresh the key set in the background, in seconds; 0 disables
    #[arg(long, env = "AUTH_JWKS_REFRESH_SECS", default_value_t = 600)]
    pub jwks_refresh_secs: u64,

    /// The claim carrying granted permissions: `scope` or `permissions`
    #[arg(long, env = "AUTH_PERMISSIONS_CLAIM", default_value = "scope")]
    pub permissions_claim: ScopeClaim,

    /// Start with a sample drink on the menu
    #[arg(long, env = "BARISTA_SEED")]
    pub seed: bool,
}

impl Config {
    /// The URL of the issuer's key set
    #[must_use]
    pub fn jwks_url(&self) -> String {
        format!(
            "{}/{}",
            self.issuer.as_str().trim_end_matches('/'),
            self.jwks_path.trim_start_matches('/')
        )
    }

    /// The interval for background key set refreshes, if enabled
    #[must_use]
    pub fn jwks_refresh_interval(&self) -> Option<Duration> {
        (self.jwks_refresh_secs > 0).then(|| Duration::from_secs(self.jwks_refresh_secs))
    }

    /// Builds the gate that authorizes protected routes
    ///
    /// The key set is fetched lazily, on the first authorization attempt.
    ///
    /// # Errors
    ///
    /// The HTTP client for the key set could not be constructed.
    pub fn auth_gate(&self) -> Result<AuthGate, KeySetError> {
        let keys = KeySetCache::remote(
            self.jwks_url(),
            RemoteOptions::default().with_timeout(Duration::from_secs(self.jwks_timeout_secs)),
        )?;

        let validator = CoreValidator::new(self.issuer.clone(), self.audience.clone())
            .with_algorithms(self.algorithms.iter().copied());

        Ok(AuthGate::new(
            TokenVerifier::new(keys, validator),
            ScopeChecker::reading(self.permissions_claim),
        ))
    }
}
