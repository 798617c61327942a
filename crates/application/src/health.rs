use std::sync::atomic::{AtomicBool, Ordering};

/// Readiness gates published to the management API.
///
/// `/ready` reports 200 only once the initial blocklist load has completed
/// and at least one upstream probe has succeeded.
#[derive(Debug, Default)]
pub struct ReadinessState {
    blocklist_loaded: AtomicBool,
    upstream_probed: AtomicBool,
}

impl ReadinessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_blocklist_loaded(&self) {
        self.blocklist_loaded.store(true, Ordering::Release);
    }

    pub fn mark_upstream_probed(&self) {
        self.upstream_probed.store(true, Ordering::Release);
    }

    pub fn blocklist_loaded(&self) -> bool {
        self.blocklist_loaded.load(Ordering::Acquire)
    }

    pub fn upstream_probed(&self) -> bool {
        self.upstream_probed.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.blocklist_loaded() && self.upstream_probed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_requires_both_gates() {
        let state = ReadinessState::new();
        assert!(!state.is_ready());
        state.mark_blocklist_loaded();
        assert!(!state.is_ready());
        state.mark_upstream_probed();
        assert!(state.is_ready());
    }
}
