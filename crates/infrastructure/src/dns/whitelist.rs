//! Atomically-published whitelist.
//!
//! An exact-domain set plus a pattern matcher, swapped together as one view
//! so a query never observes half an update. Readers load once; the
//! publisher builds the whole view outside any lock and stores it.

use crate::dns::matcher::{Matcher, Pattern};
use arc_swap::ArcSwap;
use glory_hole_domain::DomainError;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::info;

struct WhitelistView {
    exact: FxHashSet<String>,
    patterns: Matcher,
}

pub struct Whitelist {
    view: ArcSwap<WhitelistView>,
}

impl Whitelist {
    pub fn new(entries: &[String]) -> Result<Self, DomainError> {
        Ok(Self {
            view: ArcSwap::from_pointee(Self::build(entries)?),
        })
    }

    pub fn empty() -> Self {
        Self {
            view: ArcSwap::from_pointee(WhitelistView {
                exact: FxHashSet::default(),
                patterns: Matcher::empty(),
            }),
        }
    }

    fn build(entries: &[String]) -> Result<WhitelistView, DomainError> {
        let mut exact = FxHashSet::default();
        let mut patterns = Vec::new();
        for entry in entries {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match Pattern::classify(entry) {
                Pattern::Exact(domain) => {
                    exact.insert(domain);
                }
                _ => patterns.push(entry.to_string()),
            }
        }
        Ok(WhitelistView {
            exact,
            patterns: Matcher::new(&patterns)?,
        })
    }

    /// Swap in a new entry set (hot reload).
    pub fn replace(&self, entries: &[String]) -> Result<(), DomainError> {
        let view = Self::build(entries)?;
        let count = view.exact.len() + view.patterns.pattern_count();
        self.view.store(Arc::new(view));
        info!(entries = count, "Whitelist replaced");
        Ok(())
    }

    /// Exact set first, then the pattern tiers. `domain` must be lowercased.
    pub fn matches(&self, domain: &str) -> bool {
        let view = self.view.load();
        view.exact.contains(domain) || view.patterns.matches(domain)
    }

    pub fn len(&self) -> usize {
        let view = self.view.load();
        view.exact.len() + view.patterns.pattern_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_pattern_entries() {
        let wl = Whitelist::new(&[
            "good.example.com".to_string(),
            "*.cdn.example.net".to_string(),
        ])
        .unwrap();
        assert!(wl.matches("good.example.com"));
        assert!(wl.matches("assets.cdn.example.net"));
        assert!(!wl.matches("cdn.example.net"));
        assert!(!wl.matches("bad.example.com"));
    }

    #[test]
    fn replace_is_atomic_per_read() {
        let wl = Whitelist::new(&["old.example.com".to_string()]).unwrap();
        wl.replace(&["new.example.com".to_string()]).unwrap();
        assert!(!wl.matches("old.example.com"));
        assert!(wl.matches("new.example.com"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(Whitelist::new(&["[bad".to_string()]).is_err());
    }
}
