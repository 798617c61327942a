//! The query pipeline.
//!
//! One `handle` call per inbound query, executing the stages in fixed
//! order: malformed check → rate limit → local records → cache →
//! kill-switch → whitelist → blocklist → policy → conditional forwarding →
//! forwarder → cache insertion. Each stage either returns a reply or falls
//! through; no stage ever re-enters an earlier one.
//!
//! Ordering note: the whitelist runs before the blocklist, and the policy
//! engine after it. A blocklisted domain can therefore be rescued only by a
//! whitelist entry; an ALLOW or REDIRECT policy rule never sees it.

use crate::dns::cache::response_ttl;
use crate::dns::local_records::{to_answer_records, LocalRecordTable};
use crate::dns::message::{MessageBuilder, ResponseBuilder};
use crate::dns::rate_limit::{bucket_key, client_key, RateLimiter};
use crate::dns::record_map::RecordTypeMapper;
use crate::dns::whitelist::Whitelist;
use crate::metrics::ServerMetrics;
use arc_swap::ArcSwap;
use bytes::Bytes;
use glory_hole_application::ports::{
    BlocklistPort, CachePort, ForwarderPort, ForwardingRulesPort, PolicyEnginePort,
    QueryLogEntry, QueryLogSink, QueryOutcome, RoutePlan,
};
use glory_hole_application::KillSwitch;
use glory_hole_domain::config::CacheConfig;
use glory_hole_domain::{
    normalize_domain, DomainError, PolicyAction, PolicyContext, RecordType, Stage, TraceBuilder,
    ViolationAction,
};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, Record};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// CNAME chains longer than this are abandoned.
const MAX_CNAME_HOPS: u32 = 10;

/// What the edge should do with the query.
pub enum Reply {
    /// Serialize and send.
    Message(Message),
    /// Send as-is; the id already matches the request.
    Wire(Bytes),
    /// No response at all (rate-limit drop). On TCP the connection is
    /// closed instead.
    Drop,
}

/// Per-client rate limit settings, resolved from configuration once per
/// reload instead of once per query.
#[derive(Clone)]
pub struct RateLimitSettings {
    pub rps: f64,
    pub burst: u32,
    pub action: ViolationAction,
    pub log_violations: bool,
}

/// The hot-reloadable slice of handler state. Swapped atomically as one
/// value so a query in flight observes a consistent configuration.
pub struct PipelineState {
    pub decision_trace: bool,
    pub cache_enabled: bool,
    pub cache_config: CacheConfig,
    pub rate_limit: Option<RateLimitSettings>,
    pub policy: Option<Arc<dyn PolicyEnginePort>>,
    pub forwarding_rules: Option<Arc<dyn ForwardingRulesPort>>,
    pub global_plan: RoutePlan,
}

pub struct QueryHandler {
    cache: Option<Arc<dyn CachePort>>,
    blocklist: Arc<dyn BlocklistPort>,
    whitelist: Arc<Whitelist>,
    local_records: Arc<LocalRecordTable>,
    forwarder: Arc<dyn ForwarderPort>,
    rate_limiter: Arc<RateLimiter>,
    kill_switch: Arc<KillSwitch>,
    sink: Arc<dyn QueryLogSink>,
    metrics: Arc<ServerMetrics>,
    state: ArcSwap<PipelineState>,
}

impl QueryHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Option<Arc<dyn CachePort>>,
        blocklist: Arc<dyn BlocklistPort>,
        whitelist: Arc<Whitelist>,
        local_records: Arc<LocalRecordTable>,
        forwarder: Arc<dyn ForwarderPort>,
        rate_limiter: Arc<RateLimiter>,
        kill_switch: Arc<KillSwitch>,
        sink: Arc<dyn QueryLogSink>,
        metrics: Arc<ServerMetrics>,
        state: PipelineState,
    ) -> Self {
        Self {
            cache,
            blocklist,
            whitelist,
            local_records,
            forwarder,
            rate_limiter,
            kill_switch,
            sink,
            metrics,
            state: ArcSwap::from_pointee(state),
        }
    }

    /// Swap in new pipeline state (hot reload).
    pub fn update_state(&self, state: PipelineState) {
        self.state.store(Arc::new(state));
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the pipeline for one parsed query. `wire` is the original
    /// request bytes, forwarded upstream verbatim apart from the id.
    pub async fn handle(&self, request: Message, wire: Bytes, client_ip: IpAddr) -> Reply {
        let started = Instant::now();
        let state = self.state.load_full();
        ServerMetrics::incr(&self.metrics.queries_total);

        // Stage 1: malformed check. One IN question, nothing else.
        let query = match request.queries() {
            [single] if single.query_class() == DNSClass::IN => single.clone(),
            _ => {
                ServerMetrics::incr(&self.metrics.queries_formerr);
                return Reply::Message(ResponseBuilder::formerr(&request));
            }
        };
        let domain: Arc<str> = Arc::from(normalize_domain(&query.name().to_utf8()));
        let qtype = RecordTypeMapper::from_hickory(query.query_type());
        let mut trace = TraceBuilder::new(state.decision_trace);

        // Stage 2: global rate limiting.
        if let Some(settings) = &state.rate_limit {
            if !self
                .rate_limiter
                .allow_with(&client_key(client_ip), settings.rps, settings.burst)
            {
                if settings.log_violations {
                    warn!(client = %client_ip, domain = %domain, "Rate limit exceeded");
                }
                trace.step(Stage::RateLimit, "violation");
                return match settings.action {
                    ViolationAction::Drop => {
                        ServerMetrics::incr(&self.metrics.rate_limit_dropped);
                        self.log(&domain, qtype, client_ip, QueryOutcome::Dropped, "DROP", started, None, None, trace);
                        Reply::Drop
                    }
                    ViolationAction::Nxdomain => {
                        ServerMetrics::incr(&self.metrics.rate_limit_nxdomain);
                        self.log(&domain, qtype, client_ip, QueryOutcome::RateLimited, "NXDOMAIN", started, None, None, trace);
                        Reply::Message(ResponseBuilder::nxdomain(&request))
                    }
                };
            }
        }

        // Stage 3: local records (with CNAME chasing).
        match self.resolve_local(&request, &domain, qtype) {
            LocalOutcome::Miss => {}
            LocalOutcome::Answer(answers) => {
                trace.step(Stage::LocalRecords, "hit");
                ServerMetrics::incr(&self.metrics.queries_local);
                let response = ResponseBuilder::answer(&request, answers);
                self.log(&domain, qtype, client_ip, QueryOutcome::LocalRecord, "NOERROR", started, None, None, trace);
                return Reply::Message(response);
            }
            LocalOutcome::ChainBroken => {
                trace.step_with_detail(Stage::LocalRecords, "error", "cname chain too long");
                ServerMetrics::incr(&self.metrics.queries_servfail);
                self.log(&domain, qtype, client_ip, QueryOutcome::ServFail, "SERVFAIL", started, None, None, trace);
                return Reply::Message(ResponseBuilder::servfail(&request));
            }
            LocalOutcome::Partial { answers, target } => {
                trace.step_with_detail(Stage::LocalRecords, "cname", &target);
                let reply = self
                    .resolve_cname_tail(&request, &state, answers, &target, qtype, client_ip)
                    .await;
                self.log(&domain, qtype, client_ip, QueryOutcome::Answered, "NOERROR", started, None, None, trace);
                return reply;
            }
        }

        // Stage 4: cache lookup.
        if state.cache_enabled {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get(&domain, qtype.code()) {
                    trace.step(Stage::Cache, "hit");
                    ServerMetrics::incr(&self.metrics.queries_cached);
                    let mut wire_out = hit.wire.to_vec();
                    crate::dns::message::patch_wire_id(&mut wire_out, request.id());
                    self.log(&domain, qtype, client_ip, QueryOutcome::CacheHit, "NOERROR", started, None, hit.trace, trace);
                    return Reply::Wire(Bytes::from(wire_out));
                }
            }
        }

        // Stage 5: kill switch bypasses all filtering.
        let filtering_bypassed = self.kill_switch.is_active();
        if filtering_bypassed {
            trace.step(Stage::KillSwitch, "bypass");
        }

        let mut plan_override: Option<RoutePlan> = None;
        let mut rule_name: Option<Arc<str>> = None;

        if !filtering_bypassed {
            // Stage 6: whitelist short-circuits past blocklist and policy.
            let whitelisted = self.whitelist.matches(&domain);
            if whitelisted {
                trace.step(Stage::Whitelist, "allowed");
            }

            if !whitelisted {
                // Stage 7: blocklist.
                if self.blocklist.contains(&domain) {
                    trace.step_with_source(Stage::Blocklist, "blocked", "blocklist");
                    return self.sinkhole(&request, &domain, qtype, client_ip, &state, started, trace);
                }

                // Stage 8: policy engine, first match wins.
                if let Some(engine) = &state.policy {
                    let ctx = PolicyContext::new(Arc::clone(&domain), client_ip, qtype);
                    if let Some(decision) = engine.evaluate(&ctx) {
                        rule_name = Some(Arc::clone(&decision.rule_name));
                        match decision.action {
                            PolicyAction::Block => {
                                trace.step_with_rule(Stage::Policy, "blocked", &decision.rule_name);
                                return self.sinkhole(&request, &domain, qtype, client_ip, &state, started, trace);
                            }
                            PolicyAction::Allow => {
                                trace.step_with_rule(Stage::Policy, "allowed", &decision.rule_name);
                            }
                            PolicyAction::Redirect => {
                                let ip = decision.redirect_ip.expect("validated at add time");
                                trace.step_with_rule(Stage::Policy, "redirected", &decision.rule_name);
                                ServerMetrics::incr(&self.metrics.queries_redirected);
                                let response = ResponseBuilder::redirect(
                                    &request,
                                    qtype,
                                    ip,
                                    state.cache_config.min_ttl.max(60),
                                );
                                self.log(&domain, qtype, client_ip, QueryOutcome::Redirected, "NOERROR", started, None, None, trace);
                                return Reply::Message(response);
                            }
                            PolicyAction::Forward => {
                                let upstreams =
                                    decision.forward_upstreams.expect("validated at add time");
                                trace.step_with_rule(Stage::Policy, "forwarded", &decision.rule_name);
                                plan_override =
                                    Some(state.global_plan.with_upstreams(upstreams));
                            }
                            PolicyAction::RateLimit => {
                                let spec = decision.rate_limit.expect("validated at add time");
                                let key = bucket_key(
                                    spec.bucket,
                                    &decision.rule_name,
                                    client_ip,
                                    &domain,
                                );
                                if !self.rate_limiter.allow_with(&key, spec.rps, spec.burst) {
                                    trace.step_with_rule(Stage::Policy, "rate_limited", &decision.rule_name);
                                    return match spec.action {
                                        ViolationAction::Drop => {
                                            ServerMetrics::incr(&self.metrics.rate_limit_dropped);
                                            self.log(&domain, qtype, client_ip, QueryOutcome::Dropped, "DROP", started, None, None, trace);
                                            Reply::Drop
                                        }
                                        ViolationAction::Nxdomain => {
                                            ServerMetrics::incr(&self.metrics.rate_limit_nxdomain);
                                            self.log(&domain, qtype, client_ip, QueryOutcome::RateLimited, "NXDOMAIN", started, None, None, trace);
                                            Reply::Message(ResponseBuilder::nxdomain(&request))
                                        }
                                    };
                                }
                                trace.step_with_rule(Stage::Policy, "rate_ok", &decision.rule_name);
                            }
                        }
                    }
                }
            }
        }

        // Stage 9: conditional forwarding (unless a FORWARD policy already
        // pinned the upstreams).
        let plan = match plan_override {
            Some(plan) => plan,
            None => {
                let routed = state
                    .forwarding_rules
                    .as_ref()
                    .and_then(|rules| rules.evaluate(&domain, client_ip, qtype));
                match routed {
                    Some(plan) => {
                        if let Some(name) = &plan.rule_name {
                            trace.step_with_rule(Stage::ConditionalForwarding, "routed", name);
                        }
                        plan
                    }
                    None => state.global_plan.clone(),
                }
            }
        };

        // Stage 10: forwarder.
        let response_wire = match self.forwarder.forward(&wire, &plan).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(domain = %domain, error = %e, "Forwarding failed");
                trace.step_with_detail(Stage::Forwarder, "error", &e.to_string());
                ServerMetrics::incr(&self.metrics.queries_servfail);
                self.log(&domain, qtype, client_ip, QueryOutcome::ServFail, "SERVFAIL", started, None, None, trace);
                return Reply::Message(ResponseBuilder::servfail(&request));
            }
        };
        trace.record_forwarded(&plan);
        ServerMetrics::incr(&self.metrics.queries_forwarded);

        // Stage 11: cache insertion, TTL per response shape.
        if state.cache_enabled {
            if let (Some(cache), Ok(message)) = (&self.cache, Message::from_vec(&response_wire)) {
                if let Some(ttl) = response_ttl(&message, &state.cache_config) {
                    cache.insert(&domain, qtype.code(), response_wire.clone(), ttl);
                }
            }
        }

        let upstream: Option<Arc<str>> =
            plan.upstreams.first().map(|u| Arc::from(u.to_string().as_str()));
        let rcode = wire_rcode(&response_wire);
        self.sink.record(QueryLogEntry {
            timestamp_unix_ms: unix_millis(),
            domain: Arc::clone(&domain),
            record_type: qtype,
            client_ip,
            outcome: QueryOutcome::Answered,
            rcode,
            latency_us: started.elapsed().as_micros() as u64,
            upstream,
            rule: rule_name,
            trace: finish_trace(trace),
        });
        Reply::Wire(response_wire)
    }

    /// Sinkhole a blocked domain and cache the decision under the blocked
    /// TTL with its trace attached.
    #[allow(clippy::too_many_arguments)]
    fn sinkhole(
        &self,
        request: &Message,
        domain: &Arc<str>,
        qtype: RecordType,
        client_ip: IpAddr,
        state: &PipelineState,
        started: Instant,
        trace: TraceBuilder,
    ) -> Reply {
        ServerMetrics::incr(&self.metrics.queries_blocked);
        let response =
            ResponseBuilder::sinkhole(request, qtype, state.cache_config.blocked_ttl.max(1));
        let built = Arc::new(trace.build());

        if state.cache_enabled {
            if let Some(cache) = &self.cache {
                if let Ok(wire) = MessageBuilder::serialize(&response) {
                    cache.insert_blocked(domain, qtype.code(), Bytes::from(wire), Arc::clone(&built));
                }
            }
        }

        let rcode = if response.response_code() == ResponseCode::NXDomain {
            "NXDOMAIN"
        } else {
            "NOERROR"
        };
        self.sink.record(QueryLogEntry {
            timestamp_unix_ms: unix_millis(),
            domain: Arc::clone(domain),
            record_type: qtype,
            client_ip,
            outcome: QueryOutcome::Blocked,
            rcode,
            latency_us: started.elapsed().as_micros() as u64,
            upstream: None,
            rule: built.steps.iter().rev().find_map(|s| s.rule.clone()),
            trace: Some(built),
        });
        Reply::Message(response)
    }

    /// Stage 3 body: direct records, or a CNAME chain chased through the
    /// local table with a hop budget.
    fn resolve_local(&self, request: &Message, domain: &str, qtype: RecordType) -> LocalOutcome {
        if self.local_records.is_empty() {
            return LocalOutcome::Miss;
        }
        let query_name = match request.queries().first() {
            Some(q) => q.name().clone(),
            None => return LocalOutcome::Miss,
        };

        let mut answers = Vec::new();
        let mut current = domain.to_string();
        let mut current_name = query_name;
        let mut hops = MAX_CNAME_HOPS;

        loop {
            let records = self.local_records.lookup(&current, qtype);
            if !records.is_empty() {
                for record in &records {
                    match to_answer_records(record, &current_name) {
                        Ok(built) => answers.extend(built),
                        Err(e) => {
                            warn!(domain = %current, error = %e, "Failed to build local answer");
                        }
                    }
                }
                return LocalOutcome::Answer(answers);
            }

            if qtype != RecordType::CNAME {
                if let Some(cname) = self.local_records.cname(&current) {
                    if hops == 0 {
                        return if answers.is_empty() {
                            LocalOutcome::ChainBroken
                        } else {
                            LocalOutcome::Answer(answers)
                        };
                    }
                    hops -= 1;
                    if let Ok(built) = to_answer_records(&cname, &current_name) {
                        answers.extend(built);
                    }
                    let target = match &cname.data {
                        glory_hole_domain::RecordData::Cname(t) => normalize_domain(t),
                        _ => unreachable!("cname() returns CNAME records"),
                    };
                    current_name = match Name::from_str(&format!("{}.", target)) {
                        Ok(name) => name,
                        Err(_) => return LocalOutcome::ChainBroken,
                    };
                    current = target;
                    continue;
                }
            }

            return if answers.is_empty() {
                if self.local_records.has_any(&current) {
                    // The name exists locally with other types: NODATA.
                    LocalOutcome::Answer(Vec::new())
                } else {
                    LocalOutcome::Miss
                }
            } else {
                LocalOutcome::Partial {
                    answers,
                    target: current,
                }
            };
        }
    }

    /// Resolve the non-local tail of a CNAME chain through the forwarding
    /// stages and merge its answers behind the collected CNAME records.
    async fn resolve_cname_tail(
        &self,
        request: &Message,
        state: &PipelineState,
        mut answers: Vec<Record>,
        target: &str,
        qtype: RecordType,
        client_ip: IpAddr,
    ) -> Reply {
        let plan = state
            .forwarding_rules
            .as_ref()
            .and_then(|rules| rules.evaluate(target, client_ip, qtype))
            .unwrap_or_else(|| state.global_plan.clone());

        let tail_query = match MessageBuilder::build_query(&format!("{}.", target), qtype)
            .and_then(|m| MessageBuilder::serialize(&m))
        {
            Ok(bytes) => bytes,
            Err(_) => return Reply::Message(ResponseBuilder::answer(request, answers)),
        };

        match self.forwarder.forward(&tail_query, &plan).await {
            Ok(wire) => {
                if let Ok(message) = Message::from_vec(&wire) {
                    answers.extend(message.answers().iter().cloned());
                }
                Reply::Message(ResponseBuilder::answer(request, answers))
            }
            Err(e) => {
                debug!(target = %target, error = %e, "CNAME tail resolution failed; returning partial chain");
                Reply::Message(ResponseBuilder::answer(request, answers))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn log(
        &self,
        domain: &Arc<str>,
        qtype: RecordType,
        client_ip: IpAddr,
        outcome: QueryOutcome,
        rcode: &'static str,
        started: Instant,
        upstream: Option<Arc<str>>,
        cached_trace: Option<Arc<glory_hole_domain::DecisionTrace>>,
        trace: TraceBuilder,
    ) {
        let trace = finish_trace(trace).or(cached_trace);
        self.sink.record(QueryLogEntry {
            timestamp_unix_ms: unix_millis(),
            domain: Arc::clone(domain),
            record_type: qtype,
            client_ip,
            outcome,
            rcode,
            latency_us: started.elapsed().as_micros() as u64,
            upstream,
            rule: None,
            trace,
        });
    }
}

fn finish_trace(trace: TraceBuilder) -> Option<Arc<glory_hole_domain::DecisionTrace>> {
    if trace.is_enabled() && !trace.is_empty() {
        Some(Arc::new(trace.build()))
    } else {
        None
    }
}

/// Response code from the low nibble of the fourth wire byte.
fn wire_rcode(wire: &[u8]) -> &'static str {
    match wire.get(3).map(|b| b & 0x0F) {
        Some(0) => "NOERROR",
        Some(2) => "SERVFAIL",
        Some(3) => "NXDOMAIN",
        Some(4) => "NOTIMP",
        Some(5) => "REFUSED",
        _ => "UNKNOWN",
    }
}

enum LocalOutcome {
    Miss,
    Answer(Vec<Record>),
    Partial {
        answers: Vec<Record>,
        target: String,
    },
    ChainBroken,
}


trait TraceExt {
    fn record_forwarded(&mut self, plan: &RoutePlan);
}

impl TraceExt for TraceBuilder {
    fn record_forwarded(&mut self, plan: &RoutePlan) {
        if let Some(upstream) = plan.upstreams.first() {
            self.step_with_source(Stage::Forwarder, "forwarded", &upstream.to_string());
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
