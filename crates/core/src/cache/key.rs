//! Request fingerprinting for cache keys.

use std::hash::Hasher;

use http::{Request, Uri};
use rustc_hash::FxHasher;

/// Cache name used when the caller passes an empty one.
pub const DEFAULT_CACHE_NAME: &str = "pagecache";

/// Compute the cache key for a request.
///
/// The identity string has the form
/// `name:NAME:method:METHOD:url:URL[:extra::EXTRA1:EXTRA2...]`, with the URL
/// stripped of credentials. It is hashed into a fixed-width hex string.
pub fn compute_cache_key<B, S: AsRef<str>>(name: &str, request: &Request<B>, extra: &[S]) -> String {
    fingerprint(&identity(name, request, extra))
}

fn identity<B, S: AsRef<str>>(name: &str, request: &Request<B>, extra: &[S]) -> String {
    let name = if name.trim().is_empty() { DEFAULT_CACHE_NAME } else { name };
    let method = request.method().as_str();
    let url = redacted_url(request.uri());

    let extra_len: usize = extra.iter().map(|e| e.as_ref().len() + 1).sum();
    let mut identity = String::with_capacity(name.len() + method.len() + url.len() + extra_len + 32);

    identity.push_str("name:");
    identity.push_str(name);
    identity.push_str(":method:");
    identity.push_str(method);
    identity.push_str(":url:");
    identity.push_str(&url);

    if !extra.is_empty() {
        identity.push_str(":extra:");
        for e in extra {
            identity.push(':');
            identity.push_str(e.as_ref());
        }
    }

    identity
}

/// Hash an identity string into a 16-character hex fingerprint.
///
/// `FxHasher` output is `usize`-wide and rustc-hash does not promise a
/// stable algorithm across releases. Fingerprints are therefore only
/// comparable within one build on one target; on 32-bit targets the upper
/// half is always zero. A backend that persists keys must not assume they
/// survive a dependency upgrade.
pub fn fingerprint(identity: &str) -> String {
    let mut hasher = FxHasher::default();
    hasher.write(identity.as_bytes());
    hex::encode(hasher.finish().to_be_bytes())
}

/// Render `uri` without user name or password.
///
/// Everything else is kept byte-for-byte so that distinct URLs never
/// collapse into one key.
pub fn redacted_url(uri: &Uri) -> String {
    let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) else {
        return uri.to_string();
    };

    let host = authority.as_str().rsplit_once('@').map_or(authority.as_str(), |(_, host)| host);
    match uri.query() {
        Some(query) => format!("{scheme}://{host}{}?{query}", uri.path()),
        None => format!("{scheme}://{host}{}", uri.path()),
    }
}
