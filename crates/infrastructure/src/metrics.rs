use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide query counters.
///
/// The pipeline increments these on the hot path; exporters and the
/// management API read them. Everything is a relaxed atomic; consumers
/// tolerate slightly torn cross-counter views.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    pub queries_total: AtomicU64,
    pub queries_blocked: AtomicU64,
    pub queries_cached: AtomicU64,
    pub queries_forwarded: AtomicU64,
    pub queries_local: AtomicU64,
    pub queries_redirected: AtomicU64,
    pub queries_servfail: AtomicU64,
    pub queries_formerr: AtomicU64,
    pub rate_limit_dropped: AtomicU64,
    pub rate_limit_nxdomain: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn block_rate(&self) -> f64 {
        let total = Self::get(&self.queries_total);
        if total == 0 {
            return 0.0;
        }
        Self::get(&self.queries_blocked) as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_rate() {
        let metrics = ServerMetrics::new();
        assert_eq!(metrics.block_rate(), 0.0);
        for _ in 0..10 {
            ServerMetrics::incr(&metrics.queries_total);
        }
        for _ in 0..4 {
            ServerMetrics::incr(&metrics.queries_blocked);
        }
        assert!((metrics.block_rate() - 40.0).abs() < f64::EPSILON);
    }
}
