use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

/// Process-wide filtering bypass.
///
/// While active, the handler skips the whitelist, blocklist, and policy
/// stages and forwards every query. An optional expiry disarms the switch
/// lazily on the next `is_active` read after the deadline passes.
#[derive(Debug, Default)]
pub struct KillSwitch {
    active: AtomicBool,
    expires_at: Mutex<Option<Instant>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self, duration: Option<Duration>) {
        *self.expires_at.lock().unwrap() = duration.map(|d| Instant::now() + d);
        self.active.store(true, Ordering::Release);
        info!(expires_in = ?duration, "Kill switch enabled; filtering bypassed");
    }

    pub fn disable(&self) {
        self.active.store(false, Ordering::Release);
        *self.expires_at.lock().unwrap() = None;
        info!("Kill switch disabled; filtering restored");
    }

    /// Hot-path check. The fast path is a single atomic load; the expiry
    /// lock is only taken while the switch is armed.
    pub fn is_active(&self) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let mut expires = self.expires_at.lock().unwrap();
        if let Some(deadline) = *expires {
            if Instant::now() >= deadline {
                *expires = None;
                drop(expires);
                self.active.store(false, Ordering::Release);
                info!("Kill switch expired; filtering restored");
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles() {
        let ks = KillSwitch::new();
        assert!(!ks.is_active());
        ks.enable(None);
        assert!(ks.is_active());
        ks.disable();
        assert!(!ks.is_active());
    }

    #[test]
    fn expires_lazily() {
        let ks = KillSwitch::new();
        ks.enable(Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!ks.is_active());
        assert!(!ks.is_active());
    }
}
