//! DNS resolution for outbound HTTP through the configured upstreams.
//!
//! Blocklist downloads must not use the host resolver: on most deployments
//! the host's resolver is this server, so a lookup during startup would
//! deadlock on ourselves. This bridge plugs the forwarder into reqwest's
//! pluggable DNS so list fetches resolve through the same upstreams as
//! client queries. Strict mode disables the host-resolver fallback
//! entirely.

use crate::dns::message::MessageBuilder;
use glory_hole_application::ports::{ForwarderPort, RoutePlan};
use glory_hole_domain::{DomainError, RecordType};
use hickory_proto::op::Message;
use hickory_proto::rr::RData;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct UpstreamResolver {
    forwarder: Arc<dyn ForwarderPort>,
    plan: RoutePlan,
    strict: bool,
}

impl UpstreamResolver {
    pub fn new(forwarder: Arc<dyn ForwarderPort>, plan: RoutePlan, strict: bool) -> Self {
        Self {
            forwarder,
            plan,
            strict,
        }
    }

    /// An HTTP client whose lookups go through this resolver.
    pub fn new_http_client(self: Arc<Self>, timeout: Duration) -> Result<reqwest::Client, DomainError> {
        reqwest::Client::builder()
            .user_agent(concat!("glory-hole/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .dns_resolver(self)
            .build()
            .map_err(|e| DomainError::BlocklistSourceError(format!("http client: {}", e)))
    }

    async fn resolve_upstream(&self, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        let mut addresses = Vec::new();
        for record_type in [RecordType::A, RecordType::AAAA] {
            let query = MessageBuilder::build_query(host, record_type)
                .and_then(|m| MessageBuilder::serialize(&m))?;
            match self.forwarder.forward(&query, &self.plan).await {
                Ok(response) => {
                    let message = Message::from_vec(&response).map_err(|e| {
                        DomainError::UpstreamError(format!("parse response: {}", e))
                    })?;
                    for record in message.answers() {
                        match record.data() {
                            RData::A(a) => addresses.push(IpAddr::V4(a.0)),
                            RData::AAAA(aaaa) => addresses.push(IpAddr::V6(aaaa.0)),
                            _ => {}
                        }
                    }
                }
                Err(e) => debug!(host = %host, record_type = %record_type, error = %e, "Upstream lookup attempt failed"),
            }
            if !addresses.is_empty() {
                break;
            }
        }

        if addresses.is_empty() {
            return Err(DomainError::UpstreamError(format!(
                "no addresses for {}",
                host
            )));
        }
        Ok(addresses)
    }
}

impl Resolve for UpstreamResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let forwarder = Arc::clone(&self.forwarder);
        let plan = self.plan.clone();
        let strict = self.strict;

        Box::pin(async move {
            let resolver = UpstreamResolver {
                forwarder,
                plan,
                strict,
            };
            let host = name.as_str().to_string();

            match resolver.resolve_upstream(&host).await {
                Ok(addresses) => {
                    let addrs: Addrs = Box::new(
                        addresses
                            .into_iter()
                            .map(|ip| SocketAddr::new(ip, 0))
                            .collect::<Vec<_>>()
                            .into_iter(),
                    );
                    Ok(addrs)
                }
                Err(e) if !strict => {
                    warn!(host = %host, error = %e, "Upstream resolution failed; falling back to host resolver");
                    let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
                    let addrs: Addrs = Box::new(addrs.collect::<Vec<_>>().into_iter());
                    Ok(addrs)
                }
                Err(e) => Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            }
        })
    }
}
