//! End-to-end pipeline scenarios: literal stimulus/response pairs against
//! a wire-level server with real components behind it.

#[path = "../common/mod.rs"]
mod common;

use common::{first_a, BlocklistHttpServer, MockUpstream, TestClient, TestServerBuilder};
use glory_hole_application::ports::BlocklistPort;
use glory_hole_domain::{LocalRecord, RecordData, RecordType};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RData;
use std::net::Ipv4Addr;
use std::time::Duration;

#[tokio::test]
async fn blocked_domain_unblocks_after_snapshot_refresh() {
    let upstream = MockUpstream::start(Some([203, 0, 113, 5].into()), 300).await;
    let lists = BlocklistHttpServer::start("0.0.0.0 ads.example.com\n").await;

    let mut builder = TestServerBuilder::new(vec![upstream.addr]);
    builder.blocklist_urls = vec![lists.url.clone()];
    let server = builder.start().await;
    let client = TestClient::new(server.addr);

    // Blocked: sinkholed and cached under the blocked TTL.
    let response = client.query("ads.example.com.", RecordType::A).await;
    assert_eq!(first_a(&response), Some(Ipv4Addr::UNSPECIFIED));

    // Remove the domain and publish a new snapshot. Publication clears the
    // cached blocklist decisions, so the next query goes upstream.
    lists.set_content("# empty now\n");
    server.blocklist.refresh().await.unwrap();

    let response = client.query("ads.example.com.", RecordType::A).await;
    assert_eq!(first_a(&response), Some(Ipv4Addr::from([203, 0, 113, 5])));

    server.shutdown();
}

#[tokio::test]
async fn redirect_policy_loses_to_blocklist() {
    let upstream = MockUpstream::start(Some([203, 0, 113, 5].into()), 300).await;
    let lists = BlocklistHttpServer::start("0.0.0.0 tracker.example.com\n").await;

    let mut builder = TestServerBuilder::new(vec![upstream.addr]);
    builder.blocklist_urls = vec![lists.url.clone()];
    builder.policy_rules = vec![glory_hole_domain::config::PolicyRuleConfig {
        name: "rescue-attempt".into(),
        enabled: true,
        logic: r#"Domain == "tracker.example.com""#.into(),
        action: "REDIRECT".into(),
        action_data: "10.0.0.1".into(),
    }];
    let server = builder.start().await;
    let client = TestClient::new(server.addr);

    // Blocklist runs before the policy engine, so the sinkhole wins.
    let response = client.query("tracker.example.com.", RecordType::A).await;
    assert_eq!(first_a(&response), Some(Ipv4Addr::UNSPECIFIED));

    server.shutdown();
}

#[tokio::test]
async fn rate_limit_drop_answers_first_burst_only() {
    let upstream = MockUpstream::start(Some([203, 0, 113, 5].into()), 300).await;
    // Negligible refill so only the burst answers during the test window.
    let server = TestServerBuilder::new(vec![upstream.addr])
        .rate_limit_drop(0.01, 5)
        .start()
        .await;

    // All 20 queries in flight at once, mirroring a burst client.
    let mut tasks = Vec::new();
    for i in 0..20 {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            TestClient::new(addr)
                .try_query(
                    &format!("host{}.example.net.", i),
                    RecordType::A,
                    Duration::from_millis(800),
                )
                .await
        }));
    }

    let mut answered = 0;
    let mut dropped = 0;
    for task in tasks {
        match task.await.unwrap() {
            Some(_) => answered += 1,
            None => dropped += 1,
        }
    }
    assert_eq!(answered, 5);
    assert_eq!(dropped, 15);

    server.shutdown();
}

#[tokio::test]
async fn mx_answers_sort_by_preference() {
    let upstream = MockUpstream::start(Some([203, 0, 113, 5].into()), 300).await;
    let mut builder = TestServerBuilder::new(vec![upstream.addr]);
    builder.local_records = vec![
        LocalRecord::new(
            "example.local",
            300,
            RecordData::Mx {
                preference: 20,
                target: "mail1.example.local".into(),
            },
        ),
        LocalRecord::new(
            "example.local",
            300,
            RecordData::Mx {
                preference: 10,
                target: "mail2.example.local".into(),
            },
        ),
    ];
    let server = builder.start().await;
    let client = TestClient::new(server.addr);

    let response = client.query("example.local.", RecordType::MX).await;
    let preferences: Vec<u16> = response
        .answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::MX(mx) => Some(mx.preference()),
            _ => None,
        })
        .collect();
    assert_eq!(preferences, vec![10, 20]);
    match response.answers()[0].data() {
        RData::MX(mx) => assert!(mx.exchange().to_utf8().starts_with("mail2")),
        other => panic!("expected MX record, got {:?}", other),
    }

    server.shutdown();
}

#[tokio::test]
async fn whitelisted_domain_bypasses_blocklist() {
    let upstream = MockUpstream::start(Some([203, 0, 113, 5].into()), 300).await;
    let lists = BlocklistHttpServer::start("0.0.0.0 cdn.example.net\n").await;

    let mut builder = TestServerBuilder::new(vec![upstream.addr]);
    builder.blocklist_urls = vec![lists.url.clone()];
    builder.whitelist = vec!["cdn.example.net".to_string()];
    let server = builder.start().await;
    let client = TestClient::new(server.addr);

    let response = client.query("cdn.example.net.", RecordType::A).await;
    assert_eq!(first_a(&response), Some(Ipv4Addr::from([203, 0, 113, 5])));

    server.shutdown();
}

#[tokio::test]
async fn blocked_txt_query_gets_nxdomain() {
    let upstream = MockUpstream::start(Some([203, 0, 113, 5].into()), 300).await;
    let lists = BlocklistHttpServer::start("ads.example.com\n").await;

    let mut builder = TestServerBuilder::new(vec![upstream.addr]);
    builder.blocklist_urls = vec![lists.url.clone()];
    let server = builder.start().await;
    let client = TestClient::new(server.addr);

    let response = client.query("ads.example.com.", RecordType::TXT).await;
    assert_eq!(response.response_code(), ResponseCode::NXDomain);
    assert!(response.answers().is_empty());

    server.shutdown();
}
