use glory_hole_domain::config::CacheConfig;
use hickory_proto::op::{Message, ResponseCode};
use std::time::Duration;

/// Derive the cache TTL for an upstream response.
///
/// Negative responses (NXDOMAIN, or NOERROR with an empty answer section)
/// use `negative_ttl`. Positive responses use the minimum TTL across the
/// answer section clamped to `[min_ttl, max_ttl]`, except that a raw
/// minimum of zero means the response is not cacheable at all.
pub fn response_ttl(message: &Message, config: &CacheConfig) -> Option<Duration> {
    match message.response_code() {
        ResponseCode::NoError => {}
        ResponseCode::NXDomain => {
            return positive_duration(config.negative_ttl);
        }
        // SERVFAIL, REFUSED and friends are never cached
        _ => return None,
    }

    let min_ttl = message.answers().iter().map(|r| r.ttl()).min();
    match min_ttl {
        None => positive_duration(config.negative_ttl),
        Some(0) => None,
        Some(raw) => {
            let clamped = raw.clamp(config.min_ttl, config.max_ttl);
            positive_duration(clamped)
        }
    }
}

fn positive_duration(secs: u32) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(u64::from(secs)))
    }
}
