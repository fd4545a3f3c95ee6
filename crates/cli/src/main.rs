//! pagecache: fetch URLs through an in-memory response cache.
//!
//! Usage: `pagecache URL [URL...]`
//!
//! Each URL is fetched in order; repeating a URL shows whether the second
//! request was served from the cache. One JSON line per request is written
//! to stdout, logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use pagecache_client::{CachingClient, Fetched, ReqwestTransport, TransportConfig, get_request};
use pagecache_core::{CacheConfig, MemoryCache};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// One line of output per fetched URL.
#[derive(Debug, Serialize)]
struct Report<'a> {
    url: &'a str,
    status: u16,
    cache: &'static str,
    stored: bool,
    bytes: usize,
}

impl<'a> Report<'a> {
    fn new(url: &'a str, fetched: &Fetched) -> Self {
        Self {
            url,
            status: fetched.exchange.status().as_u16(),
            cache: fetched.status.as_str(),
            stored: fetched.stored,
            bytes: fetched.exchange.body().len(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        bail!("usage: pagecache URL [URL...]");
    }

    let config = CacheConfig::load().context("loading configuration")?;
    let policy = config.policy().context("building cache policy")?;
    let cache = Arc::new(MemoryCache::new(policy, config.capacity));
    let transport = Arc::new(ReqwestTransport::new(TransportConfig::default())?);
    let client = CachingClient::with_name(cache, transport, config.cache_name());

    tracing::info!(
        cache_name = config.cache_name(),
        capacity = config.capacity,
        urls = urls.len(),
        "Starting pagecache"
    );

    for url in &urls {
        let request = get_request(url).with_context(|| format!("invalid URL {url}"))?;
        match client.send(request).await {
            Ok(fetched) => println!("{}", serde_json::to_string(&Report::new(url, &fetched))?),
            Err(e) => tracing::error!(url = %url, error = %e, "request failed"),
        }
    }

    let stats = client.stats();
    tracing::info!(hits = stats.hits, misses = stats.misses, "done");

    Ok(())
}
