//! Conditional-forwarding and failover scenarios.

#[path = "../common/mod.rs"]
mod common;

use common::{first_a, MockUpstream, TestClient, TestServerBuilder};
use glory_hole_domain::config::{ConditionalForwardingConfig, ForwardingRuleConfig};
use glory_hole_domain::RecordType;
use std::net::Ipv4Addr;

fn rule(name: &str, priority: u8, domain: &str, upstream: std::net::SocketAddr) -> ForwardingRuleConfig {
    ForwardingRuleConfig {
        name: name.to_string(),
        enabled: true,
        priority,
        domains: vec![domain.to_string()],
        client_cidrs: vec![],
        query_types: vec![],
        upstreams: vec![upstream.to_string()],
        timeout_ms: None,
        max_retries: None,
        failover: true,
    }
}

#[tokio::test]
async fn conditional_forwarding_picks_highest_priority_match() {
    // Three distinct answers so the chosen upstream is observable.
    let global = MockUpstream::start(Some([203, 0, 113, 1].into()), 300).await;
    let corp = MockUpstream::start(Some([203, 0, 113, 2].into()), 300).await;
    let lan = MockUpstream::start(Some([203, 0, 113, 3].into()), 300).await;

    let mut builder = TestServerBuilder::new(vec![global.addr]);
    builder.forwarding = Some(ConditionalForwardingConfig {
        enabled: true,
        rules: vec![
            rule("corp", 80, "*.corp.local", corp.addr),
            rule("lan", 50, "*.local", lan.addr),
        ],
    });
    let server = builder.start().await;
    let client = TestClient::new(server.addr);

    let response = client.query("host.corp.local.", RecordType::A).await;
    assert_eq!(first_a(&response), Some(Ipv4Addr::from([203, 0, 113, 2])));

    let response = client.query("host.other.local.", RecordType::A).await;
    assert_eq!(first_a(&response), Some(Ipv4Addr::from([203, 0, 113, 3])));

    // No rule matches: global upstreams answer.
    let response = client.query("example.com.", RecordType::A).await;
    assert_eq!(first_a(&response), Some(Ipv4Addr::from([203, 0, 113, 1])));

    server.shutdown();
}

#[tokio::test]
async fn dead_first_upstream_fails_over() {
    let dead = MockUpstream::start(None, 300).await;
    let live = MockUpstream::start(Some([203, 0, 113, 5].into()), 300).await;

    let server = TestServerBuilder::new(vec![dead.addr, live.addr]).start().await;
    let client = TestClient::new(server.addr);

    let response = client.query("example.net.", RecordType::A).await;
    assert_eq!(first_a(&response), Some(Ipv4Addr::from([203, 0, 113, 5])));

    // The answer was cached; a repeat query is served without touching
    // either upstream (observable as an immediate identical answer).
    let again = client.query("example.net.", RecordType::A).await;
    assert_eq!(first_a(&again), Some(Ipv4Addr::from([203, 0, 113, 5])));

    server.shutdown();
}

#[tokio::test]
async fn all_upstreams_dead_yields_servfail() {
    let dead_a = MockUpstream::start(None, 300).await;
    let dead_b = MockUpstream::start(None, 300).await;

    let server = TestServerBuilder::new(vec![dead_a.addr, dead_b.addr]).start().await;
    let client = TestClient::new(server.addr);

    let response = client
        .try_query("unreachable.example.", RecordType::A, std::time::Duration::from_secs(5))
        .await
        .expect("SERVFAIL expected, not silence");
    assert_eq!(
        response.response_code(),
        hickory_proto::op::ResponseCode::ServFail
    );

    server.shutdown();
}
