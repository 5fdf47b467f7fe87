//! A cache for the signing key set published by a token issuer

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use arc_swap::ArcSwapOption;
use http::{header, HeaderValue, StatusCode};
use reqwest::Client;

use crate::{
    error::KeySetError,
    jwks::{KeyIdRef, SigningKeySet},
};

/// Settings for a key set fetched from a remote URL
#[derive(Debug, Clone)]
#[must_use]
pub struct RemoteOptions {
    timeout: Duration,
    min_refresh_interval: Duration,
    client: Option<Client>,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            min_refresh_interval: Duration::from_secs(30),
            client: None,
        }
    }
}

impl RemoteOptions {
    /// Limits how long a single fetch may take
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Limits how often an unknown key id may force a re-fetch
    pub fn with_min_refresh_interval(self, min_refresh_interval: Duration) -> Self {
        Self {
            min_refresh_interval,
            ..self
        }
    }

    /// Uses `client` for fetches instead of a dedicated one
    pub fn with_client(self, client: Client) -> Self {
        Self {
            client: Some(client),
            ..self
        }
    }
}

#[derive(Debug)]
struct Snapshot {
    keys: Arc<SigningKeySet>,
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

impl Snapshot {
    fn new(keys: SigningKeySet) -> Self {
        Self {
            keys: Arc::new(keys),
            etag: None,
            last_modified: None,
        }
    }
}

#[derive(Debug)]
struct Remote {
    url: String,
    client: Client,
    timeout: Duration,
    min_refresh_interval: Duration,
}

#[derive(Debug)]
struct Inner {
    current: ArcSwapOption<Snapshot>,
    remote: Option<Remote>,
    fetch_lock: tokio::sync::Mutex<()>,
    /// When the set was last fetched or replaced, whether or not it succeeded
    last_attempt: ArcSwapOption<Instant>,
}

/// A signing key set, either fixed or backed by a remote JWKS endpoint
///
/// A remote set is fetched lazily on first use. Concurrent first uses share
/// a single fetch, and reads after that never wait on a lock. Cloning the
/// cache shares the underlying state.
#[derive(Debug, Clone)]
#[must_use]
pub struct KeySetCache {
    inner: Arc<Inner>,
}

impl KeySetCache {
    /// A cache holding a fixed key set
    pub fn from_key_set(keys: SigningKeySet) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: ArcSwapOption::from_pointee(Snapshot::new(keys)),
                remote: None,
                fetch_lock: tokio::sync::Mutex::new(()),
                last_attempt: ArcSwapOption::from_pointee(Instant::now()),
            }),
        }
    }

    /// A cache that fetches its key set from `url` when first needed
    ///
    /// # Errors
    ///
    /// The HTTP client could not be constructed.
    pub fn remote(url: impl Into<String>, options: RemoteOptions) -> Result<Self, KeySetError> {
        let client = match options.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(concat!("barista_auth/", env!("CARGO_PKG_VERSION")))
                .build()?,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                current: ArcSwapOption::empty(),
                remote: Some(Remote {
                    url: url.into(),
                    client,
                    timeout: options.timeout,
                    min_refresh_interval: options.min_refresh_interval,
                }),
                fetch_lock: tokio::sync::Mutex::new(()),
                last_attempt: ArcSwapOption::empty(),
            }),
        })
    }

    /// The URL a remote key set is fetched from
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.inner.remote.as_ref().map(|r| r.url.as_str())
    }

    /// Gets the current key set, fetching it if it has never been loaded
    ///
    /// # Errors
    ///
    /// The initial fetch failed, timed out, or returned a malformed document.
    pub async fn get_keys(&self) -> Result<Arc<SigningKeySet>, KeySetError> {
        Ok(self.snapshot().await?.keys.clone())
    }

    /// Gets a key set expected to contain `kid`
    ///
    /// If the current set lacks `kid`, a remote set is re-fetched once to
    /// pick up rotated keys, unless a fetch was attempted or the set was
    /// replaced within the minimum refresh interval. Failed attempts count
    /// toward that interval. The returned set may still lack `kid`.
    ///
    /// # Errors
    ///
    /// A required fetch failed, timed out, or returned a malformed document.
    pub async fn get_keys_for(&self, kid: &KeyIdRef) -> Result<Arc<SigningKeySet>, KeySetError> {
        let seen = self.snapshot().await?;
        if seen.keys.contains_kid(kid) || !self.may_refresh() {
            return Ok(seen.keys.clone());
        }

        let _guard = self.inner.fetch_lock.lock().await;
        if let Some(current) = self.inner.current.load_full() {
            if !Arc::ptr_eq(&current, &seen) || !self.may_refresh() {
                return Ok(current.keys.clone());
            }
        }

        tracing::debug!(%kid, "key id not in key set; refreshing");
        Ok(self.fetch_locked().await?.keys.clone())
    }

    /// Re-fetches a remote key set
    ///
    /// No retries are attempted. If the fetch fails, the current key set is
    /// kept. A fixed key set is left unchanged.
    ///
    /// # Errors
    ///
    /// The fetch failed, timed out, or returned a malformed document.
    pub async fn refresh(&self) -> Result<(), KeySetError> {
        if self.inner.remote.is_some() {
            let _guard = self.inner.fetch_lock.lock().await;
            self.fetch_locked().await?;
        }

        Ok(())
    }

    /// Replaces the key set
    ///
    /// The replacement restarts the minimum refresh interval.
    pub fn set_key_set(&self, keys: SigningKeySet) {
        self.inner
            .current
            .store(Some(Arc::new(Snapshot::new(keys))));
        self.inner.last_attempt.store(Some(Arc::new(Instant::now())));
    }

    /// Refreshes a remote key set every `interval` on the current runtime
    ///
    /// Failures are logged and retried at the next tick.
    pub fn spawn_refresh(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;

            loop {
                timer.tick().await;
                // Failures are already logged by the fetch
                let _ = this.refresh().await;
            }
        })
    }

    async fn snapshot(&self) -> Result<Arc<Snapshot>, KeySetError> {
        if let Some(current) = self.inner.current.load_full() {
            return Ok(current);
        }

        let _guard = self.inner.fetch_lock.lock().await;
        if let Some(current) = self.inner.current.load_full() {
            return Ok(current);
        }

        self.fetch_locked().await
    }

    fn may_refresh(&self) -> bool {
        let Some(remote) = &self.inner.remote else {
            return false;
        };

        match &*self.inner.last_attempt.load() {
            Some(at) => at.elapsed() >= remote.min_refresh_interval,
            None => true,
        }
    }

    /// Must be called while holding `fetch_lock`
    #[tracing::instrument(skip(self), fields(jwks.url = tracing::field::Empty))]
    async fn fetch_locked(&self) -> Result<Arc<Snapshot>, KeySetError> {
        let previous = self.inner.current.load_full();

        let Some(remote) = &self.inner.remote else {
            let current = previous.unwrap_or_else(|| Arc::new(Snapshot::new(SigningKeySet::default())));
            return Ok(current);
        };

        tracing::Span::current().record("jwks.url", remote.url.as_str());
        tracing::debug!("fetching key set");
        self.inner.last_attempt.store(Some(Arc::new(Instant::now())));

        let mut request = remote.client.get(&remote.url).timeout(remote.timeout);
        if let Some(previous) = &previous {
            if let Some(etag) = &previous.etag {
                request = request.header(header::IF_NONE_MATCH, etag);
            } else if let Some(last_modified) = &previous.last_modified {
                request = request.header(header::IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request.send().await.map_err(|err| {
            let error: &(dyn std::error::Error + 'static) = &err;
            tracing::warn!(error, "key set fetch failed");
            KeySetError::from(err)
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            if let Some(previous) = previous {
                tracing::debug!("key set not modified");
                return Ok(previous);
            }
        }

        if !status.is_success() {
            tracing::warn!(
                http.status_code = status.as_u16(),
                "key set fetch failed; unexpected response status",
            );
            return Err(KeySetError::Status(status));
        }

        let etag = response.headers().get(header::ETAG).cloned();
        let last_modified = response.headers().get(header::LAST_MODIFIED).cloned();

        let body = response.bytes().await.map_err(|err| {
            let error: &(dyn std::error::Error + 'static) = &err;
            tracing::warn!(error, "key set fetch failed while reading body");
            KeySetError::from(err)
        })?;

        let keys: SigningKeySet = serde_json::from_slice(&body).map_err(|err| {
            let error: &(dyn std::error::Error + 'static) = &err;
            tracing::warn!(error, "key set fetch failed; malformed document");
            KeySetError::from(err)
        })?;

        tracing::info!(jwks.keys = keys.len(), "key set refreshed");

        let snapshot = Arc::new(Snapshot {
            keys: Arc::new(keys),
            etag,
            last_modified,
        });
        self.inner.current.store(Some(snapshot.clone()));

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use axum::{
        extract::State,
        http::HeaderMap,
        response::{IntoResponse, Response},
        routing::get,
        Router,
    };
    use color_eyre::Result;

    use super::*;
    use crate::test_util;

    #[derive(Debug)]
    struct Document {
        status: StatusCode,
        body: String,
        version: usize,
    }

    #[derive(Debug, Clone)]
    struct Publisher {
        document: Arc<Mutex<Document>>,
        hits: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Publisher {
        fn new(body: &str) -> Self {
            Self {
                document: Arc::new(Mutex::new(Document {
                    status: StatusCode::OK,
                    body: body.to_owned(),
                    version: 1,
                })),
                hits: Arc::new(AtomicUsize::new(0)),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(self, delay: Duration) -> Self {
            Self { delay, ..self }
        }

        fn publish(&self, status: StatusCode, body: &str) {
            let mut document = self.document.lock().unwrap();
            document.status = status;
            document.body = body.to_owned();
            document.version += 1;
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }

        async fn start(&self) -> Result<String> {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
            let addr = listener.local_addr()?;
            let app = Router::new()
                .route("/.well-known/jwks.json", get(serve_jwks))
                .with_state(self.clone());

            tokio::spawn(async move { axum::serve(listener, app).await });

            Ok(format!("http://{addr}/.well-known/jwks.json"))
        }
    }

    async fn serve_jwks(State(publisher): State<Publisher>, headers: HeaderMap) -> Response {
        publisher.hits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(publisher.delay).await;

        let (status, body, etag) = {
            let document = publisher.document.lock().unwrap();
            (
                document.status,
                document.body.clone(),
                format!("\"v{}\"", document.version),
            )
        };

        if headers
            .get(header::IF_NONE_MATCH)
            .is_some_and(|v| v == etag.as_str())
        {
            return StatusCode::NOT_MODIFIED.into_response();
        }

        (status, [(header::ETAG, etag)], body).into_response()
    }

    fn options() -> RemoteOptions {
        RemoteOptions::default().with_client(Client::builder().no_proxy().build().unwrap())
    }

    fn kid(kid: &str) -> &KeyIdRef {
        KeyIdRef::from_str(kid)
    }

    #[tokio::test]
    async fn fixed_key_set_needs_no_fetch() -> Result<()> {
        let cache = KeySetCache::from_key_set(test_util::key_set(test_util::PRIMARY_JWKS));

        let keys = cache.get_keys_for(kid("missing")).await?;
        assert_eq!(keys.len(), 1);
        cache.refresh().await?;
        assert!(cache.url().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_first_use_fetches_once() -> Result<()> {
        let publisher = Publisher::new(test_util::PRIMARY_JWKS).with_delay(Duration::from_millis(100));
        let cache = KeySetCache::remote(publisher.start().await?, options())?;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_keys().await })
            })
            .collect();

        for task in tasks {
            let keys = task.await??;
            assert!(keys.contains_kid(kid(test_util::PRIMARY_KEY_ID)));
        }

        assert_eq!(publisher.hits(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_kid_refreshes_to_pick_up_rotated_keys() -> Result<()> {
        let publisher = Publisher::new(test_util::PRIMARY_JWKS);
        let cache = KeySetCache::remote(
            publisher.start().await?,
            options().with_min_refresh_interval(Duration::ZERO),
        )?;

        let keys = cache.get_keys_for(kid(test_util::PRIMARY_KEY_ID)).await?;
        assert!(keys.contains_kid(kid(test_util::PRIMARY_KEY_ID)));
        assert_eq!(publisher.hits(), 1);

        publisher.publish(StatusCode::OK, test_util::SECONDARY_JWKS);

        let keys = cache.get_keys_for(kid(test_util::SECONDARY_KEY_ID)).await?;
        assert!(keys.contains_kid(kid(test_util::SECONDARY_KEY_ID)));
        assert_eq!(publisher.hits(), 2);

        let keys = cache.get_keys_for(kid(test_util::SECONDARY_KEY_ID)).await?;
        assert!(keys.contains_kid(kid(test_util::SECONDARY_KEY_ID)));
        assert_eq!(publisher.hits(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_kid_refresh_is_rate_limited() -> Result<()> {
        let publisher = Publisher::new(test_util::PRIMARY_JWKS);
        let cache = KeySetCache::remote(
            publisher.start().await?,
            options().with_min_refresh_interval(Duration::from_secs(3600)),
        )?;

        for _ in 0..3 {
            let keys = cache.get_keys_for(kid("forged")).await?;
            assert!(!keys.contains_kid(kid("forged")));
        }

        assert_eq!(publisher.hits(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_refresh_still_counts_toward_the_rate_limit() -> Result<()> {
        let publisher = Publisher::new(test_util::PRIMARY_JWKS);
        let cache = KeySetCache::remote(
            publisher.start().await?,
            options().with_min_refresh_interval(Duration::from_millis(50)),
        )?;

        cache.get_keys().await?;
        tokio::time::sleep(Duration::from_millis(80)).await;
        publisher.publish(StatusCode::INTERNAL_SERVER_ERROR, "oops");

        let err = cache.get_keys_for(kid("forged")).await.unwrap_err();
        assert!(matches!(err, KeySetError::Status(_)), "{err:?}");

        for _ in 0..4 {
            let keys = cache.get_keys_for(kid("forged")).await?;
            assert!(keys.contains_kid(kid(test_util::PRIMARY_KEY_ID)));
        }

        assert_eq!(publisher.hits(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn replaced_set_is_used_and_restarts_the_rate_limit() -> Result<()> {
        let publisher = Publisher::new(test_util::PRIMARY_JWKS);
        let cache = KeySetCache::remote(
            publisher.start().await?,
            options().with_min_refresh_interval(Duration::from_millis(50)),
        )?;

        cache.get_keys().await?;
        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.set_key_set(test_util::key_set(test_util::SECONDARY_JWKS));

        let keys = cache.get_keys_for(kid(test_util::SECONDARY_KEY_ID)).await?;
        assert!(keys.contains_kid(kid(test_util::SECONDARY_KEY_ID)));

        let keys = cache.get_keys_for(kid(test_util::PRIMARY_KEY_ID)).await?;
        assert!(!keys.contains_kid(kid(test_util::PRIMARY_KEY_ID)));
        assert_eq!(publisher.hits(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let keys = cache.get_keys_for(kid(test_util::PRIMARY_KEY_ID)).await?;
        assert!(keys.contains_kid(kid(test_util::PRIMARY_KEY_ID)));
        assert_eq!(publisher.hits(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn fixed_key_set_can_be_replaced() -> Result<()> {
        let cache = KeySetCache::from_key_set(test_util::key_set(test_util::PRIMARY_JWKS));
        cache.set_key_set(test_util::key_set(test_util::SECONDARY_JWKS));

        let keys = cache.get_keys_for(kid(test_util::SECONDARY_KEY_ID)).await?;
        assert!(keys.contains_kid(kid(test_util::SECONDARY_KEY_ID)));
        assert!(!keys.contains_kid(kid(test_util::PRIMARY_KEY_ID)));
        Ok(())
    }

    #[tokio::test]
    async fn not_modified_keeps_the_current_set() -> Result<()> {
        let publisher = Publisher::new(test_util::PRIMARY_JWKS);
        let cache = KeySetCache::remote(publisher.start().await?, options())?;

        cache.get_keys().await?;
        cache.refresh().await?;

        assert_eq!(publisher.hits(), 2);
        assert!(cache
            .get_keys()
            .await?
            .contains_kid(kid(test_util::PRIMARY_KEY_ID)));
        Ok(())
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn failed_refresh_keeps_the_current_set() -> Result<()> {
        let publisher = Publisher::new(test_util::PRIMARY_JWKS);
        let cache = KeySetCache::remote(publisher.start().await?, options())?;

        cache.get_keys().await?;
        publisher.publish(StatusCode::INTERNAL_SERVER_ERROR, "oops");

        let err = cache.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            KeySetError::Status(status) if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert!(logs_contain("unexpected response status"));
        assert!(cache
            .get_keys()
            .await?
            .contains_kid(kid(test_util::PRIMARY_KEY_ID)));
        Ok(())
    }

    #[tokio::test]
    async fn error_status_is_unavailable() -> Result<()> {
        let publisher = Publisher::new("");
        publisher.publish(StatusCode::NOT_FOUND, "not found");
        let cache = KeySetCache::remote(publisher.start().await?, options())?;

        let err = cache.get_keys().await.unwrap_err();
        assert!(matches!(err, KeySetError::Status(status) if status == StatusCode::NOT_FOUND));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_document_is_unavailable() -> Result<()> {
        let publisher = Publisher::new("<html>definitely not a key set</html>");
        let cache = KeySetCache::remote(publisher.start().await?, options())?;

        let err = cache.get_keys().await.unwrap_err();
        assert!(matches!(err, KeySetError::Malformed(_)));
        Ok(())
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() -> Result<()> {
        let publisher = Publisher::new(test_util::PRIMARY_JWKS).with_delay(Duration::from_secs(5));
        let cache = KeySetCache::remote(
            publisher.start().await?,
            options().with_timeout(Duration::from_millis(100)),
        )?;

        let err = cache.get_keys().await.unwrap_err();
        assert!(matches!(err, KeySetError::Timeout(_)), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() -> Result<()> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let cache = KeySetCache::remote(format!("http://{addr}/jwks.json"), options())?;

        let err = cache.get_keys().await.unwrap_err();
        assert!(matches!(err, KeySetError::Request(_)), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn background_refresh_picks_up_new_keys() -> Result<()> {
        let publisher = Publisher::new(test_util::PRIMARY_JWKS);
        let cache = KeySetCache::remote(publisher.start().await?, options())?;
        cache.get_keys().await?;

        let handle = cache.spawn_refresh(Duration::from_millis(20));
        publisher.publish(StatusCode::OK, test_util::SECONDARY_JWKS);

        let mut rotated = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if cache
                .get_keys()
                .await?
                .contains_kid(kid(test_util::SECONDARY_KEY_ID))
            {
                rotated = true;
                break;
            }
        }

        handle.abort();
        assert!(rotated);
        Ok(())
    }
}
