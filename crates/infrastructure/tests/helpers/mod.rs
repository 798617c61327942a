use async_trait::async_trait;
use glory_hole_application::ports::{BlocklistPort, BlocklistStats};
use glory_hole_domain::DomainError;
use std::collections::HashSet;

/// A fixed in-memory blocklist for edge tests.
pub struct StaticBlocklist {
    domains: HashSet<String>,
}

impl StaticBlocklist {
    pub fn new(domains: &[&str]) -> Self {
        Self {
            domains: domains.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[async_trait]
impl BlocklistPort for StaticBlocklist {
    fn contains(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    async fn refresh(&self) -> Result<(), DomainError> {
        Ok(())
    }

    fn loaded(&self) -> bool {
        true
    }

    fn stats(&self) -> BlocklistStats {
        BlocklistStats::default()
    }
}
