//! Test doubles and common utilities for engine contract tests
//!
//! The doubles record every call so tests can assert on what the engine did,
//! not just on what it reported.

#![allow(dead_code)]

use ddns_core::error::{Error, Result};
use ddns_core::traits::{DomainId, IpResolver, RecordRepository, RecordSnapshot};
use ddns_core::{DdnsConfig, DdnsEngine, EngineConfig, EngineEvent};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Domain id the mock repository hands out
pub const DOMAIN_ID: &str = "2059079";

/// One scripted answer of the IP resolver
#[derive(Debug, Clone)]
pub enum IpAnswer {
    Ip(Ipv4Addr),
    Fail(&'static str),
    /// Never answer
    Hang,
}

/// An IpResolver that replays a script, then repeats a fallback answer
pub struct ScriptedIpResolver {
    script: Mutex<VecDeque<IpAnswer>>,
    fallback: IpAnswer,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedIpResolver {
    /// Always resolve to `ip`
    pub fn new(ip: Ipv4Addr) -> Self {
        Self::with_script(IpAnswer::Ip(ip), Vec::new())
    }

    /// Always fail with a transport error
    pub fn failing(message: &'static str) -> Self {
        Self::with_script(IpAnswer::Fail(message), Vec::new())
    }

    /// Never return from resolve()
    pub fn hanging() -> Self {
        Self::with_script(IpAnswer::Hang, Vec::new())
    }

    /// Replay `script`, then answer `fallback` forever
    pub fn with_script(fallback: IpAnswer, script: Vec<IpAnswer>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            call_times: Mutex::new(Vec::new()),
        }
    }

    /// Number of resolve() calls
    pub fn call_count(&self) -> usize {
        self.call_times.lock().unwrap().len()
    }

    /// (Virtual) time of every resolve() call
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IpResolver for ScriptedIpResolver {
    async fn resolve(&self) -> Result<Ipv4Addr> {
        self.call_times.lock().unwrap().push(Instant::now());

        let answer = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match answer {
            IpAnswer::Ip(ip) => Ok(ip),
            IpAnswer::Fail(message) => Err(Error::http(message)),
            IpAnswer::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// A RecordRepository backed by an in-memory record list
pub struct MockRecordRepository {
    records: Vec<RecordSnapshot>,
    domain_error: Option<&'static str>,
    list_error: Option<&'static str>,
    failing_updates: HashSet<String>,
    update_delay: Duration,
    slow_updates: HashMap<String, Duration>,
    unfiltered: bool,

    resolve_calls: AtomicUsize,
    list_calls: AtomicUsize,
    updates: Mutex<Vec<RecordSnapshot>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockRecordRepository {
    pub fn new(records: Vec<RecordSnapshot>) -> Self {
        Self {
            records,
            domain_error: None,
            list_error: None,
            failing_updates: HashSet::new(),
            update_delay: Duration::ZERO,
            slow_updates: HashMap::new(),
            unfiltered: false,
            resolve_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make resolve_domain_id() fail
    pub fn failing_domain(mut self, message: &'static str) -> Self {
        self.domain_error = Some(message);
        self
    }

    /// Make list_records() fail
    pub fn failing_list(mut self, message: &'static str) -> Self {
        self.list_error = Some(message);
        self
    }

    /// Make update_record() fail for the record named `name`
    pub fn failing_update_for(mut self, name: &str) -> Self {
        self.failing_updates.insert(name.to_string());
        self
    }

    /// Make every update take `delay`
    pub fn with_update_delay(mut self, delay: Duration) -> Self {
        self.update_delay = delay;
        self
    }

    /// Make the update of the record named `name` take `delay`
    pub fn with_slow_update_for(mut self, name: &str, delay: Duration) -> Self {
        self.slow_updates.insert(name.to_string(), delay);
        self
    }

    /// Return every stored record from list_records(), like a server that
    /// ignores the sub_domain and record_type filters
    pub fn returning_unfiltered(mut self) -> Self {
        self.unfiltered = true;
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Snapshots passed to update_record(), in call order
    pub fn updates(&self) -> Vec<RecordSnapshot> {
        self.updates.lock().unwrap().clone()
    }

    /// Highest number of concurrent update_record() calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RecordRepository for MockRecordRepository {
    async fn resolve_domain_id(&self, _domain: &str) -> Result<DomainId> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        match self.domain_error {
            Some(message) => Err(Error::not_found(message)),
            None => Ok(DomainId::new(DOMAIN_ID)),
        }
    }

    async fn list_records(
        &self,
        domain_id: &DomainId,
        subdomains: &[String],
    ) -> Result<Vec<RecordSnapshot>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(domain_id.as_str(), DOMAIN_ID);

        if let Some(message) = self.list_error {
            return Err(Error::api("-15", message));
        }

        Ok(self
            .records
            .iter()
            .filter(|r| self.unfiltered || (r.is_a_record() && subdomains.contains(&r.name)))
            .cloned()
            .collect())
    }

    async fn update_record(&self, record: &RecordSnapshot) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.updates.lock().unwrap().push(record.clone());

        let delay = self
            .slow_updates
            .get(&record.name)
            .copied()
            .unwrap_or(self.update_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_updates.contains(&record.name) {
            return Err(Error::api("-1", "Record modify failed"));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Build an A record snapshot
pub fn a_record(id: &str, name: &str, ip: &str) -> RecordSnapshot {
    RecordSnapshot {
        id: id.to_string(),
        domain_id: DomainId::new(DOMAIN_ID),
        name: name.to_string(),
        record_type: "A".to_string(),
        ttl: "600".to_string(),
        line: "默认".to_string(),
        mx: "0".to_string(),
        status: "enable".to_string(),
        value: ip.to_string(),
    }
}

/// Minimal valid config tracking `subdomains`, one-second interval
pub fn minimal_config(subdomains: &[&str]) -> DdnsConfig {
    DdnsConfig::new("12345,test-token", "example.com", subdomains.iter().copied())
        .with_interval_ms(1_000)
        .with_engine(EngineConfig {
            concurrency: 10,
            request_timeout_secs: 60,
            event_channel_capacity: 100,
        })
}

/// Build an engine and attach a recording observer
pub fn engine_with_recorder(
    resolver: Arc<ScriptedIpResolver>,
    repository: Arc<MockRecordRepository>,
    config: DdnsConfig,
) -> (DdnsEngine, Arc<Mutex<Vec<EngineEvent>>>) {
    let (engine, _events) =
        DdnsEngine::new(resolver, repository, config).expect("engine construction succeeds");

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&recorded);
    engine.subscribe(move |event: &EngineEvent| {
        sink.lock().unwrap().push(event.clone());
    });

    (engine, recorded)
}

/// Names of the recorded events, in emission order
pub fn event_names(recorded: &Mutex<Vec<EngineEvent>>) -> Vec<&'static str> {
    recorded.lock().unwrap().iter().map(EngineEvent::name).collect()
}

/// How many recorded events have the given name
pub fn count(recorded: &Mutex<Vec<EngineEvent>>, name: &str) -> usize {
    event_names(recorded).into_iter().filter(|n| *n == name).count()
}
