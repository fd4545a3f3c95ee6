//! Read-through caching in front of a [`Transport`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::Request;
use pagecache_core::{Cache, DEFAULT_CACHE_NAME, Exchange, compute_cache_key};

use crate::error::ClientError;
use crate::transport::Transport;

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

/// A response plus whether the cache served it.
#[derive(Debug)]
pub struct Fetched {
    pub exchange: Exchange,
    pub status: CacheStatus,
    /// Whether a miss was written back to the cache.
    pub stored: bool,
}

/// Snapshot of the client's hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// HTTP client that consults a cache before going upstream.
pub struct CachingClient {
    cache: Arc<dyn Cache>,
    transport: Arc<dyn Transport>,
    name: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachingClient {
    pub fn new(cache: Arc<dyn Cache>, transport: Arc<dyn Transport>) -> Self {
        Self::with_name(cache, transport, DEFAULT_CACHE_NAME)
    }

    /// Use `name` as the key namespace, so several clients can share one
    /// cache without colliding.
    pub fn with_name(cache: Arc<dyn Cache>, transport: Arc<dyn Transport>, name: impl Into<String>) -> Self {
        Self { cache, transport, name: name.into(), hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits.load(Ordering::Relaxed), misses: self.misses.load(Ordering::Relaxed) }
    }

    /// Serve `request` from the cache, or send it upstream and store the
    /// response if the cache's policy allows.
    ///
    /// Cache failures other than misses are logged and treated as misses;
    /// failing to store a response does not fail the request.
    pub async fn send(&self, request: Request<Bytes>) -> Result<Fetched, ClientError> {
        let key = compute_cache_key::<_, &str>(&self.name, &request, &[]);

        match self.cache.get(&key) {
            Ok(exchange) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, uri = %request.uri(), "cache hit");
                return Ok(Fetched { exchange, status: CacheStatus::Hit, stored: false });
            }
            Err(e) if e.is_miss() => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "cache lookup failed, fetching upstream"),
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        let upstream = duplicate(&request);
        let response = self.transport.send(upstream).await?;
        let exchange = Exchange::new(request, response);

        let stored = self.store(&key, &exchange);
        Ok(Fetched { exchange, status: CacheStatus::Miss, stored })
    }

    fn store(&self, key: &str, exchange: &Exchange) -> bool {
        let policy = self.cache.policy();
        let Some(request) = exchange.request() else {
            return false;
        };
        if !policy.is_cacheable(&exchange.response, request) {
            return false;
        }

        let ttl = policy.ttl(&exchange.response);
        match self.cache.set(key, exchange, ttl) {
            Ok(()) => {
                tracing::debug!(key, ttl_secs = ttl.num_seconds(), "stored response");
                true
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to store response");
                false
            }
        }
    }
}

/// `http::Request` is not `Clone`; copy everything the transport needs.
fn duplicate(request: &Request<Bytes>) -> Request<Bytes> {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Response, StatusCode, header};
    use pagecache_core::{MemoryCache, Policy, Rule, policy::Behavior};

    struct CountingTransport {
        calls: AtomicU64,
        status: StatusCode,
        headers: Vec<(header::HeaderName, &'static str)>,
    }

    impl CountingTransport {
        fn new(status: StatusCode) -> Self {
            Self { calls: AtomicU64::new(0), status, headers: Vec::new() }
        }

        fn with_header(mut self, name: header::HeaderName, value: &'static str) -> Self {
            self.headers.push((name, value));
            self
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Transport for CountingTransport {
        async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut builder = Response::builder().status(self.status);
            for (name, value) in &self.headers {
                builder = builder.header(name, *value);
            }
            let body = format!("{} #{n}", request.uri());
            Ok(builder.body(Bytes::from(body)).unwrap())
        }
    }

    struct FailingTransport;

    #[async_trait::async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _request: Request<Bytes>) -> Result<Response<Bytes>, ClientError> {
            Err(ClientError::Transport("connection refused".into()))
        }
    }

    fn get(url: &str) -> Request<Bytes> {
        Request::builder().method(Method::GET).uri(url).body(Bytes::new()).unwrap()
    }

    fn client(policy: Policy, transport: Arc<CountingTransport>) -> CachingClient {
        CachingClient::new(Arc::new(MemoryCache::new(policy, 0)), transport)
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let transport = Arc::new(CountingTransport::new(StatusCode::OK));
        let client = client(Policy::default(), transport.clone());

        let first = client.send(get("http://example.com/a")).await.unwrap();
        assert_eq!(first.status, CacheStatus::Miss);
        assert!(first.stored);

        let second = client.send(get("http://example.com/a")).await.unwrap();
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(second.exchange.body(), first.exchange.body());
        assert_eq!(transport.calls(), 1);
        assert_eq!(client.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn test_distinct_urls_do_not_collide() {
        let transport = Arc::new(CountingTransport::new(StatusCode::OK));
        let client = client(Policy::default(), transport.clone());

        client.send(get("http://example.com/a")).await.unwrap();
        let other = client.send(get("http://example.com/b")).await.unwrap();
        assert_eq!(other.status, CacheStatus::Miss);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_uncacheable_status_always_goes_upstream() {
        let transport = Arc::new(CountingTransport::new(StatusCode::INTERNAL_SERVER_ERROR));
        let client = client(Policy::default(), transport.clone());

        let first = client.send(get("http://example.com/")).await.unwrap();
        assert!(!first.stored);
        let second = client.send(get("http://example.com/")).await.unwrap();
        assert_eq!(second.status, CacheStatus::Miss);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_store_is_not_cached() {
        let transport =
            Arc::new(CountingTransport::new(StatusCode::OK).with_header(header::CACHE_CONTROL, "no-store"));
        let client = client(Policy::default(), transport.clone());

        client.send(get("http://example.com/")).await.unwrap();
        client.send(get("http://example.com/")).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_max_age_zero_expires_immediately() {
        let transport =
            Arc::new(CountingTransport::new(StatusCode::OK).with_header(header::CACHE_CONTROL, "max-age=0"));
        let client = client(Policy::default(), transport.clone());

        let first = client.send(get("http://example.com/")).await.unwrap();
        assert!(first.stored);
        let second = client.send(get("http://example.com/")).await.unwrap();
        assert_eq!(second.status, CacheStatus::Miss);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_exclude_rule_bypasses_cache() {
        let policy = Policy::default().with_rule(Rule::url("http://example.com/private", Behavior::Exclude));
        let transport = Arc::new(CountingTransport::new(StatusCode::OK));
        let client = client(policy, transport.clone());

        client.send(get("http://example.com/private")).await.unwrap();
        client.send(get("http://example.com/private")).await.unwrap();
        client.send(get("http://example.com/public")).await.unwrap();
        client.send(get("http://example.com/public")).await.unwrap();
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_named_clients_share_cache_without_colliding() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Policy::default(), 0));
        let transport = Arc::new(CountingTransport::new(StatusCode::OK));
        let docs = CachingClient::with_name(cache.clone(), transport.clone(), "docs");
        let blog = CachingClient::with_name(cache, transport.clone(), "blog");

        docs.send(get("http://example.com/")).await.unwrap();
        let fetched = blog.send(get("http://example.com/")).await.unwrap();
        assert_eq!(fetched.status, CacheStatus::Miss);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_is_returned() {
        let client = CachingClient::new(Arc::new(MemoryCache::new(Policy::default(), 0)), Arc::new(FailingTransport));
        let err = client.send(get("http://example.com/")).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(client.stats(), CacheStats { hits: 0, misses: 1 });
    }

    #[test]
    fn test_duplicate_copies_request() {
        let request = Request::builder()
            .method(Method::HEAD)
            .uri("http://example.com/x")
            .header(header::ACCEPT, "text/html")
            .body(Bytes::from_static(b"body"))
            .unwrap();
        let copy = duplicate(&request);
        assert_eq!(copy.method(), Method::HEAD);
        assert_eq!(copy.uri(), request.uri());
        assert_eq!(copy.headers(), request.headers());
        assert_eq!(copy.body(), request.body());
    }
}
