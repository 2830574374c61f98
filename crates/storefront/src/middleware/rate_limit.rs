//! Rate limiting using governor and `tower_governor`.
//!
//! - `auth_rate_limiter`: login attempts (~10/min per client)
//! - `api_rate_limiter`: cart, checkout and lookups (~100/min per client)

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, Request};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Proxy headers carrying the client address, most trusted first.
const CLIENT_IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"];

/// Key extractor reading the client address from reverse-proxy headers.
///
/// For `X-Forwarded-For` the first (client) entry of the chain is used.
#[derive(Clone, Copy)]
pub struct ProxyIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ProxyIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        client_ip(req.headers()).ok_or(GovernorError::UnableToExtractKey)
    }
}

fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    CLIENT_IP_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    })
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ProxyIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Limiter for `POST /api/auth/login`: 1 token every 6 seconds, burst of 5.
///
/// # Panics
///
/// Does not panic: `per_second(6)` and `burst_size(5)` are both non-zero,
/// which is all `GovernorConfigBuilder::finish` checks.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ProxyIpKeyExtractor)
        .per_second(6)
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}

/// Limiter for the rest of the API: 1 token per second, burst of 50.
///
/// # Panics
///
/// Does not panic: `per_second(1)` and `burst_size(50)` are both non-zero.
#[must_use]
pub fn api_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ProxyIpKeyExtractor)
        .per_second(1)
        .burst_size(50)
        .finish()
        .expect("rate limiter config with per_second(1) and burst_size(50) is valid");
    GovernorLayer::new(Arc::new(config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_cloudflare_header_wins() {
        let map = headers(&[
            ("x-forwarded-for", "10.0.0.1"),
            ("cf-connecting-ip", "203.0.113.7"),
        ]);
        assert_eq!(client_ip(&map), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_for_uses_first_hop() {
        let map = headers(&[("x-forwarded-for", "198.51.100.4, 10.0.0.1")]);
        assert_eq!(client_ip(&map), Some("198.51.100.4".parse().unwrap()));
    }

    #[test]
    fn test_garbage_is_skipped() {
        let map = headers(&[("x-forwarded-for", "unknown"), ("x-real-ip", "::1")]);
        assert_eq!(client_ip(&map), Some("::1".parse().unwrap()));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_limiters_build() {
        let _ = auth_rate_limiter();
        let _ = api_rate_limiter();
    }
}
