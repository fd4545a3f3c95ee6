//! Header inspection helpers used by the cacheability policy.
//!
//! All helpers are total: unparsable values degrade to "no information"
//! rather than producing errors.

use http::HeaderMap;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, SET_COOKIE};

/// Returns the first parseable `max-age=<int>` directive of the first
/// `Cache-Control` header, in seconds.
///
/// Directives are scanned left to right and trimmed; a directive that does
/// not parse as an integer is skipped.
pub fn max_age(headers: &HeaderMap) -> Option<i64> {
    let value = headers.get(CACHE_CONTROL)?.to_str().ok()?;

    value
        .split(',')
        .map(str::trim)
        .filter_map(|part| part.strip_prefix("max-age="))
        .find_map(|secs| secs.parse::<i64>().ok())
}

/// Returns `true` when the first `Cache-Control` header is exactly one of
/// the given literal values.
pub(crate) fn cache_control_is(headers: &HeaderMap, literals: &[&str]) -> bool {
    headers
        .get(CACHE_CONTROL)
        .and_then(|value| value.to_str().ok())
        .map(|value| literals.contains(&value))
        .unwrap_or(false)
}

/// Checks the declared `Content-Length` against `limit`.
///
/// A limit of zero or less means unlimited. An absent or unparsable
/// `Content-Length` is assumed to be within the limit.
pub fn is_body_size_within_limit(headers: &HeaderMap, limit: i64) -> bool {
    if limit <= 0 {
        return true;
    }

    match headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
    {
        Some(length) => length <= limit,
        None => true,
    }
}

/// Names of the cookies set by `Set-Cookie` headers. Headers that do not
/// parse as a cookie are skipped.
pub fn set_cookie_names(headers: &HeaderMap) -> impl Iterator<Item = String> + '_ {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| cookie::Cookie::parse(value).ok())
        .map(|cookie| cookie.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(name: http::header::HeaderName, value: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_static(value));
        map
    }

    #[test]
    fn test_max_age_missing_header() {
        let map = headers(http::header::CONTENT_TYPE, "text/plain");
        assert_eq!(max_age(&map), None);
    }

    #[test]
    fn test_max_age_with_other_directives() {
        let map = headers(CACHE_CONTROL, "private, max-age=300");
        assert_eq!(max_age(&map), Some(300));
    }

    #[test]
    fn test_max_age_without_directive() {
        let map = headers(CACHE_CONTROL, "private, no-store");
        assert_eq!(max_age(&map), None);
    }

    #[test]
    fn test_max_age_invalid_value() {
        let map = headers(CACHE_CONTROL, "private, max-age=invalid");
        assert_eq!(max_age(&map), None);
    }

    #[test]
    fn test_max_age_first_parseable_wins() {
        let map = headers(CACHE_CONTROL, "max-age=soon, max-age=60 , max-age=120");
        assert_eq!(max_age(&map), Some(60));
    }

    #[test]
    fn test_max_age_negative_is_preserved() {
        let map = headers(CACHE_CONTROL, "max-age=-5");
        assert_eq!(max_age(&map), Some(-5));
    }

    #[test]
    fn test_body_size_limits() {
        let map = headers(CONTENT_LENGTH, "100");
        assert!(is_body_size_within_limit(&map, -1));
        assert!(is_body_size_within_limit(&map, 0));
        assert!(is_body_size_within_limit(&map, 200));
        assert!(is_body_size_within_limit(&map, 100));
        assert!(!is_body_size_within_limit(&map, 99));
    }

    #[test]
    fn test_body_size_unparsable_fails_open() {
        let map = headers(CONTENT_LENGTH, "invalid");
        assert!(is_body_size_within_limit(&map, 200));
        assert!(is_body_size_within_limit(&HeaderMap::new(), 200));
    }

    #[test]
    fn test_cache_control_literal_match() {
        assert!(cache_control_is(&headers(CACHE_CONTROL, "no-store"), &["no-store", "private"]));
        assert!(!cache_control_is(&headers(CACHE_CONTROL, "no-store, max-age=5"), &["no-store"]));
        assert!(!cache_control_is(&HeaderMap::new(), &["no-store"]));
    }

    #[test]
    fn test_set_cookie_names() {
        let mut map = HeaderMap::new();
        map.append(SET_COOKIE, HeaderValue::from_static("sessionid=abc; Path=/; HttpOnly"));
        map.append(SET_COOKIE, HeaderValue::from_static("theme=dark"));
        let names: Vec<String> = set_cookie_names(&map).collect();
        assert_eq!(names, vec!["sessionid".to_string(), "theme".to_string()]);
    }
}
