//! Upstream forwarder.
//!
//! Walks the route plan's upstream list in order (optionally shuffled),
//! giving each upstream a retry budget with exponential backoff, all under
//! the plan's whole-query deadline. A truncated UDP response triggers a TCP
//! retry against the same upstream before failing over. Exhaustion of every
//! upstream surfaces as `AllUpstreamsFailed`, which the handler answers
//! with SERVFAIL.

pub mod http_resolver;

use crate::dns::message::{patch_wire_id, wire_id};
use async_trait::async_trait;
use bytes::Bytes;
use glory_hole_application::ports::{ForwarderPort, RoutePlan};
use glory_hole_domain::config::ForwarderConfig;
use glory_hole_domain::DomainError;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, warn};

/// Maximum UDP DNS response size with EDNS(0).
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Base delay for the exponential retry backoff.
const BACKOFF_BASE: Duration = Duration::from_millis(50);

/// TC flag in the third wire byte.
const FLAG_TC: u8 = 0x02;

pub struct Forwarder {
    attempt_timeout: Duration,
    randomize: bool,
    tcp_only: bool,
}

impl Forwarder {
    pub fn new(config: &ForwarderConfig) -> Self {
        Self {
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            randomize: config.randomize,
            tcp_only: config.tcp_only,
        }
    }

    async fn udp_exchange(
        &self,
        upstream: SocketAddr,
        query: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        let bind_addr: SocketAddr = if upstream.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| DomainError::UpstreamError(format!("bind: {}", e)))?;

        tokio::time::timeout(timeout, socket.send_to(query, upstream))
            .await
            .map_err(|_| DomainError::UpstreamTimeout)?
            .map_err(|e| DomainError::UpstreamError(format!("send to {}: {}", upstream, e)))?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(DomainError::UpstreamTimeout)?;
            let (len, from) = tokio::time::timeout(remaining, socket.recv_from(&mut buf))
                .await
                .map_err(|_| DomainError::UpstreamTimeout)?
                .map_err(|e| {
                    DomainError::UpstreamError(format!("recv from {}: {}", upstream, e))
                })?;

            if from.ip() != upstream.ip() {
                warn!(expected = %upstream, received_from = %from, "UDP response from unexpected source; ignoring");
                continue;
            }
            buf.truncate(len);
            return Ok(buf);
        }
    }

    async fn tcp_exchange(
        &self,
        upstream: SocketAddr,
        query: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        let exchange = async {
            let mut stream = TcpStream::connect(upstream)
                .await
                .map_err(|e| DomainError::UpstreamError(format!("connect {}: {}", upstream, e)))?;

            let len = u16::try_from(query.len())
                .map_err(|_| DomainError::InvalidMessage("query exceeds 64KiB".to_string()))?;
            stream
                .write_all(&len.to_be_bytes())
                .await
                .map_err(|e| DomainError::UpstreamError(e.to_string()))?;
            stream
                .write_all(query)
                .await
                .map_err(|e| DomainError::UpstreamError(e.to_string()))?;

            let mut len_buf = [0u8; 2];
            stream
                .read_exact(&mut len_buf)
                .await
                .map_err(|e| DomainError::UpstreamError(e.to_string()))?;
            let mut body = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
            stream
                .read_exact(&mut body)
                .await
                .map_err(|e| DomainError::UpstreamError(e.to_string()))?;
            Ok(body)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| DomainError::UpstreamTimeout)?
    }

    /// One attempt against one upstream, including the TC → TCP follow-up.
    async fn attempt(
        &self,
        upstream: SocketAddr,
        query: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        if self.tcp_only {
            return self.tcp_exchange(upstream, query, timeout).await;
        }

        let started = Instant::now();
        let response = self.udp_exchange(upstream, query, timeout).await?;

        if response.len() >= 12 && response[2] & FLAG_TC != 0 {
            debug!(upstream = %upstream, "Response truncated (TC bit); retrying over TCP");
            let remaining = timeout
                .checked_sub(started.elapsed())
                .unwrap_or(Duration::from_millis(500));
            return self.tcp_exchange(upstream, query, remaining).await;
        }
        Ok(response)
    }

    fn upstream_order(&self, plan: &RoutePlan) -> Vec<SocketAddr> {
        let mut upstreams: Vec<SocketAddr> = plan.upstreams.to_vec();
        if !plan.failover {
            upstreams.truncate(1);
        } else if self.randomize {
            fastrand::shuffle(&mut upstreams);
        }
        upstreams
    }
}

#[async_trait]
impl ForwarderPort for Forwarder {
    async fn forward(&self, query: &[u8], plan: &RoutePlan) -> Result<Bytes, DomainError> {
        let client_id = wire_id(query)
            .ok_or_else(|| DomainError::InvalidMessage("query shorter than a header".to_string()))?;

        // Fresh transaction id per query; the client's id is restored on the
        // way back so upstream responses can be validated against it.
        let upstream_id = fastrand::u16(..);
        let mut outbound = query.to_vec();
        patch_wire_id(&mut outbound, upstream_id);

        let deadline = Instant::now() + plan.timeout;
        let mut last_error = DomainError::AllUpstreamsFailed;

        for upstream in self.upstream_order(plan) {
            for attempt in 0..=plan.max_retries {
                let remaining = match deadline.checked_duration_since(Instant::now()) {
                    Some(d) if !d.is_zero() => d,
                    _ => return Err(DomainError::UpstreamTimeout),
                };
                let timeout = self.attempt_timeout.min(remaining);

                match self.attempt(upstream, &outbound, timeout).await {
                    Ok(mut response) => {
                        if wire_id(&response) != Some(upstream_id) {
                            warn!(upstream = %upstream, "Response id mismatch; discarding");
                            last_error =
                                DomainError::UpstreamError("response id mismatch".to_string());
                        } else {
                            patch_wire_id(&mut response, client_id);
                            debug!(
                                upstream = %upstream,
                                attempt,
                                bytes = response.len(),
                                "Upstream answered"
                            );
                            return Ok(Bytes::from(response));
                        }
                    }
                    Err(e) => {
                        debug!(upstream = %upstream, attempt, error = %e, "Upstream attempt failed");
                        last_error = e;
                    }
                }

                if attempt < plan.max_retries {
                    let backoff = BACKOFF_BASE * 2u32.saturating_pow(attempt);
                    let remaining = deadline
                        .checked_duration_since(Instant::now())
                        .unwrap_or(Duration::ZERO);
                    tokio::time::sleep(backoff.min(remaining)).await;
                }
            }
        }

        warn!(error = %last_error, "All upstreams exhausted");
        Err(DomainError::AllUpstreamsFailed)
    }

    async fn probe(&self, plan: &RoutePlan) -> bool {
        use crate::dns::message::MessageBuilder;
        use glory_hole_domain::RecordType;

        let query = match MessageBuilder::build_query(".", RecordType::NS)
            .and_then(|m| MessageBuilder::serialize(&m))
        {
            Ok(q) => q,
            Err(_) => return false,
        };

        for upstream in plan.upstreams.iter() {
            if self
                .attempt(*upstream, &query, self.attempt_timeout)
                .await
                .is_ok()
            {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn plan(upstreams: Vec<SocketAddr>, timeout: Duration, retries: u32) -> RoutePlan {
        RoutePlan {
            rule_name: None,
            upstreams: Arc::from(upstreams.into_boxed_slice()),
            timeout,
            max_retries: retries,
            failover: true,
        }
    }

    fn forwarder() -> Forwarder {
        Forwarder::new(&ForwarderConfig {
            attempt_timeout_ms: 100,
            query_timeout_ms: 400,
            max_retries: 0,
            randomize: false,
            tcp_only: false,
            strict_resolution: true,
        })
    }

    /// One-shot mock upstream: reads a query, replies with a canned answer
    /// built by echoing the query id.
    async fn mock_upstream(respond: bool) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                if !respond {
                    continue;
                }
                let mut reply = buf[..len].to_vec();
                reply[2] |= 0x80; // QR
                let _ = socket.send_to(&reply, from).await;
            }
        });
        addr
    }

    fn query_bytes() -> Vec<u8> {
        use crate::dns::message::MessageBuilder;
        use glory_hole_domain::RecordType;
        let msg = MessageBuilder::build_query("example.net.", RecordType::A).unwrap();
        MessageBuilder::serialize(&msg).unwrap()
    }

    #[tokio::test]
    async fn forwards_and_restores_client_id() {
        let upstream = mock_upstream(true).await;
        let query = query_bytes();
        let client_id = wire_id(&query).unwrap();

        let response = forwarder()
            .forward(&query, &plan(vec![upstream], Duration::from_secs(1), 0))
            .await
            .unwrap();
        assert_eq!(wire_id(&response), Some(client_id));
    }

    #[tokio::test]
    async fn fails_over_to_second_upstream() {
        let dead = mock_upstream(false).await;
        let live = mock_upstream(true).await;
        let query = query_bytes();

        let response = forwarder()
            .forward(&query, &plan(vec![dead, live], Duration::from_secs(2), 0))
            .await
            .unwrap();
        assert_eq!(wire_id(&response), wire_id(&query));
    }

    #[tokio::test]
    async fn exhaustion_reports_all_upstreams_failed() {
        let dead = mock_upstream(false).await;
        let query = query_bytes();

        let result = forwarder()
            .forward(&query, &plan(vec![dead], Duration::from_secs(5), 1))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::AllUpstreamsFailed | DomainError::UpstreamTimeout)
        ));
    }

    #[tokio::test]
    async fn no_failover_tries_only_first() {
        let dead = mock_upstream(false).await;
        let live = mock_upstream(true).await;
        let query = query_bytes();

        let mut p = plan(vec![dead, live], Duration::from_millis(300), 0);
        p.failover = false;
        let result = forwarder().forward(&query, &p).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn probe_succeeds_against_live_upstream() {
        let live = mock_upstream(true).await;
        assert!(
            forwarder()
                .probe(&plan(vec![live], Duration::from_secs(1), 0))
                .await
        );
    }
}
