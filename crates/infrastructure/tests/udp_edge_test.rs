//! Edge-to-edge test: a real client socket against the bound server, with a
//! mock upstream behind the forwarder.

use glory_hole_application::ports::{CachePort, RoutePlan};
use glory_hole_application::KillSwitch;
use glory_hole_domain::config::{CacheConfig, ForwarderConfig, ServerConfig};
use glory_hole_domain::RecordType;
use glory_hole_infrastructure::dns::handler::{PipelineState, QueryHandler};
use glory_hole_infrastructure::dns::message::MessageBuilder;
use glory_hole_infrastructure::dns::{
    DnsServer, Forwarder, LocalRecordTable, NullLogSink, RateLimiter, ShardedCache, Whitelist,
};
use glory_hole_infrastructure::ServerMetrics;
use hickory_proto::op::Message;
use hickory_proto::rr::{rdata, RData, Record};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

mod helpers;
use helpers::StaticBlocklist;

/// Mock upstream answering every A query with 203.0.113.5.
async fn mock_upstream() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(request) = Message::from_vec(&buf[..len]) else {
                continue;
            };
            let name = request.queries()[0].name().clone();
            let mut response = request.clone();
            let mut header = *response.header();
            header.set_message_type(hickory_proto::op::MessageType::Response);
            response.set_header(header);
            response.add_answer(Record::from_rdata(
                name,
                300,
                RData::A(rdata::A([203, 0, 113, 5].into())),
            ));
            if let Ok(bytes) = response.to_vec() {
                let _ = socket.send_to(&bytes, from).await;
            }
        }
    });
    addr
}

async fn start_server(blocked: &[&str], upstream: SocketAddr) -> (SocketAddr, CancellationToken) {
    let cache = Arc::new(ShardedCache::new(&CacheConfig::default()));
    let forwarder = Arc::new(Forwarder::new(&ForwarderConfig {
        attempt_timeout_ms: 500,
        ..ForwarderConfig::default()
    }));
    let state = PipelineState {
        decision_trace: false,
        cache_enabled: true,
        cache_config: CacheConfig::default(),
        rate_limit: None,
        policy: None,
        forwarding_rules: None,
        global_plan: RoutePlan {
            rule_name: None,
            upstreams: Arc::from(vec![upstream].into_boxed_slice()),
            timeout: Duration::from_secs(2),
            max_retries: 0,
            failover: true,
        },
    };
    let handler = Arc::new(QueryHandler::new(
        Some(cache as Arc<dyn CachePort>),
        Arc::new(StaticBlocklist::new(blocked)),
        Arc::new(Whitelist::empty()),
        Arc::new(LocalRecordTable::empty()),
        forwarder,
        Arc::new(RateLimiter::new(50.0, 100, 1000)),
        Arc::new(KillSwitch::new()),
        Arc::new(NullLogSink),
        Arc::new(ServerMetrics::new()),
        state,
    ));

    let shutdown = CancellationToken::new();
    let server = DnsServer::bind(
        handler,
        &ServerConfig {
            listen_address: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        },
        shutdown.clone(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.serve());
    (addr, shutdown)
}

async fn udp_query(server: SocketAddr, domain: &str, rt: RecordType) -> Message {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let query = MessageBuilder::build_query(domain, rt).unwrap();
    let wire = MessageBuilder::serialize(&query).unwrap();
    socket.send_to(&wire, server).await.unwrap();

    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("query timed out")
        .unwrap();
    let response = Message::from_vec(&buf[..len]).unwrap();
    assert_eq!(response.id(), query.id());
    response
}

#[tokio::test]
async fn forwarded_query_round_trips() {
    let upstream = mock_upstream().await;
    let (server, shutdown) = start_server(&[], upstream).await;

    let response = udp_query(server, "example.net.", RecordType::A).await;
    match response.answers()[0].data() {
        RData::A(a) => assert_eq!(a.0, std::net::Ipv4Addr::from([203, 0, 113, 5])),
        other => panic!("unexpected answer: {:?}", other),
    }
    shutdown.cancel();
}

#[tokio::test]
async fn blocked_domain_is_sinkholed_over_the_wire() {
    let upstream = mock_upstream().await;
    let (server, shutdown) = start_server(&["ads.example.com"], upstream).await;

    let response = udp_query(server, "ads.example.com.", RecordType::A).await;
    match response.answers()[0].data() {
        RData::A(a) => assert_eq!(a.0, std::net::Ipv4Addr::UNSPECIFIED),
        other => panic!("unexpected answer: {:?}", other),
    }
    shutdown.cancel();
}

#[tokio::test]
async fn tcp_query_round_trips() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let upstream = mock_upstream().await;
    let (server, shutdown) = start_server(&[], upstream).await;

    let query = MessageBuilder::build_query("tcp.example.net.", RecordType::A).unwrap();
    let wire = MessageBuilder::serialize(&query).unwrap();

    let mut stream = tokio::net::TcpStream::connect(server).await.unwrap();
    stream
        .write_all(&(wire.len() as u16).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(&wire).await.unwrap();

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.unwrap();
    let mut body = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
    stream.read_exact(&mut body).await.unwrap();

    let response = Message::from_vec(&body).unwrap();
    assert_eq!(response.id(), query.id());
    assert_eq!(response.answers().len(), 1);
    shutdown.cancel();
}

#[tokio::test]
async fn garbage_gets_formerr_with_echoed_id() {
    let upstream = mock_upstream().await;
    let (server, shutdown) = start_server(&[], upstream).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    // Valid header, truncated question section.
    let garbage = [0x12u8, 0x34, 0x01, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0xFF];
    socket.send_to(&garbage, server).await.unwrap();

    let mut buf = vec![0u8; 512];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("no FORMERR received")
        .unwrap();
    assert_eq!(&buf[..2], &[0x12, 0x34]);
    assert_eq!(buf[3] & 0x0F, 1);
    let _ = len;
    shutdown.cancel();
}

#[tokio::test]
async fn queries_are_cached_across_requests() {
    let upstream = mock_upstream().await;
    let (server, shutdown) = start_server(&[], upstream).await;

    let first = udp_query(server, "cached.example.net.", RecordType::A).await;
    let second = udp_query(server, "cached.example.net.", RecordType::A).await;
    assert_eq!(first.answers()[0].data(), second.answers()[0].data());
    shutdown.cancel();
}
