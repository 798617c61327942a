//! Shared fixtures: mock upstream resolvers, a tiny blocklist HTTP server,
//! and a full server harness wired the way the binary wires production.

use glory_hole_application::ports::{
    BlocklistPort, CachePort, ForwardingRulesPort, PolicyEnginePort, RoutePlan,
};
use glory_hole_application::KillSwitch;
use glory_hole_domain::config::{
    CacheConfig, ConditionalForwardingConfig, ForwarderConfig, PolicyRuleConfig, ServerConfig,
};
use glory_hole_domain::{LocalRecord, RecordType, ViolationAction};
use glory_hole_infrastructure::dns::handler::{PipelineState, QueryHandler, RateLimitSettings};
use glory_hole_infrastructure::dns::message::MessageBuilder;
use glory_hole_infrastructure::dns::{
    BlocklistManager, DnsServer, Forwarder, ForwardingRuleSet, LocalRecordTable, NullLogSink,
    PolicyEngine, RateLimiter, ShardedCache, Whitelist,
};
use glory_hole_infrastructure::ServerMetrics;
use hickory_proto::op::Message;
use hickory_proto::rr::{rdata, RData, Record};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// Mock upstream resolver. Optionally deaf (never answers), otherwise
/// replies to every A query with a fixed address.
pub struct MockUpstream {
    pub addr: SocketAddr,
}

impl MockUpstream {
    pub async fn start(answer: Option<Ipv4Addr>, ttl: u32) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Some(ip) = answer else { continue };
                let Ok(request) = Message::from_vec(&buf[..len]) else {
                    continue;
                };
                let name = request.queries()[0].name().clone();
                let mut response = request.clone();
                let mut header = *response.header();
                header.set_message_type(hickory_proto::op::MessageType::Response);
                response.set_header(header);
                response.add_answer(Record::from_rdata(name, ttl, RData::A(rdata::A(ip))));
                if let Ok(bytes) = response.to_vec() {
                    let _ = socket.send_to(&bytes, from).await;
                }
            }
        });
        Self { addr }
    }
}

/// Single-purpose HTTP server handing out a mutable hosts file, so the
/// blocklist manager exercises its real download path.
pub struct BlocklistHttpServer {
    pub url: String,
    content: Arc<Mutex<String>>,
}

impl BlocklistHttpServer {
    pub async fn start(initial: &str) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let content = Arc::new(Mutex::new(initial.to_string()));
        let served = Arc::clone(&content);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let body = served.lock().unwrap().clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\ncontent-type: text/plain\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });

        Self {
            url: format!("http://{}/hosts.txt", addr),
            content,
        }
    }

    pub fn set_content(&self, body: &str) {
        *self.content.lock().unwrap() = body.to_string();
    }
}

pub struct TestServerBuilder {
    pub upstreams: Vec<SocketAddr>,
    pub blocklist_urls: Vec<String>,
    pub whitelist: Vec<String>,
    pub policy_rules: Vec<PolicyRuleConfig>,
    pub forwarding: Option<ConditionalForwardingConfig>,
    pub local_records: Vec<LocalRecord>,
    pub rate_limit: Option<RateLimitSettings>,
}

impl TestServerBuilder {
    pub fn new(upstreams: Vec<SocketAddr>) -> Self {
        Self {
            upstreams,
            blocklist_urls: Vec::new(),
            whitelist: Vec::new(),
            policy_rules: Vec::new(),
            forwarding: None,
            local_records: Vec::new(),
            rate_limit: None,
        }
    }

    pub fn rate_limit_drop(mut self, rps: f64, burst: u32) -> Self {
        self.rate_limit = Some(RateLimitSettings {
            rps,
            burst,
            action: ViolationAction::Drop,
            log_violations: false,
        });
        self
    }

    pub async fn start(self) -> TestServer {
        let cache = Arc::new(ShardedCache::new(&CacheConfig::default()));
        let forwarder = Arc::new(Forwarder::new(&ForwarderConfig {
            attempt_timeout_ms: 300,
            ..ForwarderConfig::default()
        }));
        let global_plan = RoutePlan {
            rule_name: None,
            upstreams: Arc::from(self.upstreams.into_boxed_slice()),
            timeout: Duration::from_secs(3),
            max_retries: 0,
            failover: true,
        };

        let blocklist = Arc::new(BlocklistManager::new(
            self.blocklist_urls,
            reqwest::Client::new(),
            Some(Arc::clone(&cache) as Arc<dyn CachePort>),
        ));
        blocklist.refresh().await.ok();

        let policy: Option<Arc<dyn PolicyEnginePort>> = if self.policy_rules.is_empty() {
            None
        } else {
            Some(Arc::new(PolicyEngine::from_config(&self.policy_rules).unwrap()))
        };
        let forwarding_rules = self.forwarding.map(|config| {
            Arc::new(ForwardingRuleSet::from_config(&config, global_plan.clone()).unwrap())
                as Arc<dyn ForwardingRulesPort>
        });

        let state = PipelineState {
            decision_trace: true,
            cache_enabled: true,
            cache_config: CacheConfig::default(),
            rate_limit: self.rate_limit,
            policy,
            forwarding_rules,
            global_plan,
        };

        let handler = Arc::new(QueryHandler::new(
            Some(Arc::clone(&cache) as Arc<dyn CachePort>),
            Arc::clone(&blocklist) as Arc<dyn BlocklistPort>,
            Arc::new(Whitelist::new(&self.whitelist).unwrap()),
            Arc::new(LocalRecordTable::new(self.local_records)),
            forwarder,
            Arc::new(RateLimiter::new(50.0, 100, 10_000)),
            Arc::new(KillSwitch::new()),
            Arc::new(NullLogSink),
            Arc::new(ServerMetrics::new()),
            state,
        ));

        let shutdown = CancellationToken::new();
        let server = DnsServer::bind(
            Arc::clone(&handler),
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

        TestServer {
            addr,
            blocklist,
            shutdown,
        }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub blocklist: Arc<BlocklistManager>,
    shutdown: CancellationToken,
}

impl TestServer {
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

pub struct TestClient {
    server: SocketAddr,
}

impl TestClient {
    pub fn new(server: SocketAddr) -> Self {
        Self { server }
    }

    /// One query, one fresh socket; returns the parsed response.
    pub async fn query(&self, domain: &str, rt: RecordType) -> Message {
        self.try_query(domain, rt, Duration::from_secs(2))
            .await
            .expect("query timed out")
    }

    /// Like `query` but surfaces a timeout as `None` (for drop tests).
    pub async fn try_query(
        &self,
        domain: &str,
        rt: RecordType,
        timeout: Duration,
    ) -> Option<Message> {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query = MessageBuilder::build_query(domain, rt).unwrap();
        let wire = MessageBuilder::serialize(&query).unwrap();
        socket.send_to(&wire, self.server).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let received = tokio::time::timeout(timeout, socket.recv_from(&mut buf)).await;
        match received {
            Ok(Ok((len, _))) => {
                let response = Message::from_vec(&buf[..len]).unwrap();
                assert_eq!(response.id(), query.id());
                Some(response)
            }
            _ => None,
        }
    }
}

/// First A-record address in the answer section.
pub fn first_a(response: &Message) -> Option<Ipv4Addr> {
    response.answers().iter().find_map(|r| match r.data() {
        RData::A(a) => Some(a.0),
        _ => None,
    })
}
