//! Core DDNS engine
//!
//! The DdnsEngine is responsible for:
//! - Resolving the public IP once per round via IpResolver
//! - Fetching the tracked A records via RecordRepository
//! - Updating only the records whose IP drifted, through the BoundedExecutor
//! - Announcing every phase on the EventBus
//! - Rescheduling the next round after the configured interval
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!                 │  DdnsEngine  │──── EngineEvent ────► EventBus ──► observers
//!                 └──────────────┘
//!                         │
//!         ┌───────────────┼─────────────────────────┐
//!         │               │                         │
//!         ▼               ▼                         ▼
//! ┌─────────────┐  ┌──────────────────┐   ┌──────────────────┐
//! │ IpResolver  │  │ RecordRepository │◄──│ BoundedExecutor  │
//! │ (resolve)   │  │ (list)           │   │ (update × N ≤ K) │
//! └─────────────┘  └──────────────────┘   └──────────────────┘
//! ```
//!
//! ## Round Flow
//!
//! ```text
//! Idle ─start()─► Detecting ─► Fetching ─► Reconciling ─► RoundEnd ─(interval)─► Detecting ...
//!                     │            │                          ▲
//!                     └── error ───┴──── error / no records ──┘
//! ```
//!
//! 1. `round`, `detecting`; resolve IP; `detected`
//! 2. Fetch records (domain id resolved once, before the first fetch)
//! 3. No records: `warn` and finish the round without error
//! 4. Per record: `equal`, or `changing` → update → [`save-error`] → `changed`
//! 5. [`error`], `round-end`, sleep for the interval
//!
//! Rounds never overlap. The sleep is entered after every round, failed or not.

use crate::config::DdnsConfig;
use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventBus, EventObserver, EventStream};
use crate::executor::BoundedExecutor;
use crate::traits::{DomainId, IpResolver, RecordRepository, RecordSnapshot};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Warning emitted when a round finds none of the tracked records
const NO_RECORDS_WARNING: &str = "No available subdomains.";

/// Phase of the round state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RoundPhase {
    /// Not running a round (before start, or between stop and exit)
    #[default]
    Idle,
    /// Resolving the public IP
    Detecting,
    /// Fetching tracked records from the provider
    Fetching,
    /// Updating drifted records
    Reconciling,
    /// Round finished; waiting for the interval to elapse
    RoundEnd,
}

/// What a successful round did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    /// IP resolved this round
    pub ip: Ipv4Addr,
    /// Number of tracked A records fetched
    pub records: usize,
    /// Records that already pointed at `ip`
    pub unchanged: usize,
    /// Records the provider accepted an update for
    pub updated: usize,
    /// Records whose update failed
    pub failed: usize,
    /// When the round started
    pub started_at: DateTime<Utc>,
    /// When the last record task finished
    pub finished_at: DateTime<Utc>,
}

/// Terminal state of one record task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Unchanged,
    Updated,
    Failed,
}

/// Core DDNS engine
///
/// The engine drives perpetual polling rounds. Each round reconciles the
/// tracked A records against the freshly resolved public IP.
///
/// ## Lifecycle
///
/// 1. Create with [`DdnsEngine::new()`]
/// 2. Optionally [`DdnsEngine::initialize()`] to resolve the domain id up front
/// 3. Start with [`DdnsEngine::start()`] (spawned) or [`DdnsEngine::run()`] (inline)
/// 4. Engine runs rounds until [`DdnsEngine::stop()`] is called
///
/// ## Shared State
///
/// Only the `started` flag and the cached domain id live across rounds. Both
/// are written once. Everything a round learns (IP, snapshots) is dropped when
/// the round ends.
pub struct DdnsEngine {
    /// Public IP resolver
    ip_resolver: Arc<dyn IpResolver>,

    /// Provider access for records
    repository: Arc<dyn RecordRepository>,

    /// Validated configuration
    config: DdnsConfig,

    /// Event fan-out
    events: Arc<EventBus>,

    /// Runs per-record tasks with bounded parallelism
    executor: BoundedExecutor,

    /// Provider id of `config.domain`, resolved once
    domain_identity: OnceCell<DomainId>,

    /// Set by the first start()/run()
    started: AtomicBool,

    /// Serializes rounds
    round_lock: Mutex<()>,

    /// Current phase
    phase: watch::Sender<RoundPhase>,

    /// Stop signal for the round loop
    shutdown: watch::Sender<bool>,
}

impl DdnsEngine {
    /// Create a new DDNS engine
    ///
    /// # Parameters
    ///
    /// - `ip_resolver`: Public IP resolver implementation
    /// - `repository`: Record repository implementation
    /// - `config`: DDNS configuration (validated here)
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_stream) where event_stream yields engine events
    pub fn new(
        ip_resolver: Arc<dyn IpResolver>,
        repository: Arc<dyn RecordRepository>,
        config: DdnsConfig,
    ) -> Result<(Self, EventStream)> {
        config.validate()?;

        let executor = BoundedExecutor::new(config.engine.concurrency)?;
        let events = Arc::new(EventBus::new());
        let stream = events.channel(config.engine.event_channel_capacity);

        let engine = Self {
            ip_resolver,
            repository,
            config,
            events,
            executor,
            domain_identity: OnceCell::new(),
            started: AtomicBool::new(false),
            round_lock: Mutex::new(()),
            phase: watch::Sender::new(RoundPhase::Idle),
            shutdown: watch::Sender::new(false),
        };

        Ok((engine, stream))
    }

    /// Register a synchronous observer for engine events
    pub fn subscribe(&self, observer: impl EventObserver + 'static) {
        self.events.subscribe(observer);
    }

    /// The engine's event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The validated configuration
    pub fn config(&self) -> &DdnsConfig {
        &self.config
    }

    /// Current round phase
    pub fn phase(&self) -> RoundPhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions
    pub fn watch_phase(&self) -> watch::Receiver<RoundPhase> {
        self.phase.subscribe()
    }

    /// Whether start() or run() has been called
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// The cached domain id, if it has been resolved
    pub fn domain_id(&self) -> Option<&DomainId> {
        self.domain_identity.get()
    }

    /// Resolve and cache the domain id
    ///
    /// Calling this is optional: the first round resolves the id on demand.
    /// Once cached the id is never refreshed.
    pub async fn initialize(&self) -> Result<DomainId> {
        self.resolve_domain().await.cloned()
    }

    /// Start the perpetual round loop on a new task
    ///
    /// Only the first call has an effect; later calls return `None`.
    pub fn start(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("Engine already started, ignoring start()");
            return None;
        }

        Some(tokio::spawn(async move { self.round_loop().await }))
    }

    /// Run the perpetual round loop on the current task
    ///
    /// Returns once [`DdnsEngine::stop()`] has been called and the in-flight
    /// round has finished. If the engine was already started this returns
    /// immediately.
    pub async fn run(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("Engine already started, ignoring run()");
            return Ok(());
        }

        self.round_loop().await;
        Ok(())
    }

    /// Ask the round loop to exit
    ///
    /// The in-flight round (if any) completes, including its `round-end`
    /// event; no further round is scheduled.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            info!("Stop requested");
        }
    }

    async fn round_loop(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let interval = self.config.interval();

        info!(
            "DDNS engine started: domain={}, records={}, interval={:?}",
            self.config.domain,
            self.config.subdomains.len(),
            interval
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            // Failures were already surfaced as events; the loop carries on.
            let _ = self.run_round().await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.phase.send_replace(RoundPhase::Idle);
        info!("DDNS engine stopped");
    }

    /// Run one complete round
    ///
    /// Emits `round` first and `round-end` last, with `error` just before
    /// `round-end` when the round aborts. Rounds are serialized: a call made
    /// while another round is in flight waits for it to finish.
    pub async fn run_round(&self) -> Result<RoundSummary> {
        let _round = self.round_lock.lock().await;
        let started_at = Utc::now();

        self.events.emit(EngineEvent::Round);
        let result = self.reconcile_round(started_at).await;

        self.phase.send_replace(RoundPhase::RoundEnd);
        if let Err(ref e) = result {
            self.events.emit(EngineEvent::Error {
                error: e.to_string(),
            });
        }
        self.events.emit(EngineEvent::RoundEnd);

        result
    }

    async fn reconcile_round(&self, started_at: DateTime<Utc>) -> Result<RoundSummary> {
        // Detecting
        self.phase.send_replace(RoundPhase::Detecting);
        self.events.emit(EngineEvent::Detecting);
        let ip = self
            .with_timeout("IP resolution", self.ip_resolver.resolve())
            .await
            .inspect_err(|_| debug!("IP resolver {} failed", self.ip_resolver.name()))?;
        self.events.emit(EngineEvent::Detected { ip });

        // Fetching
        self.phase.send_replace(RoundPhase::Fetching);
        let records = self.fetch_records().await?;

        let mut summary = RoundSummary {
            ip,
            records: records.len(),
            unchanged: 0,
            updated: 0,
            failed: 0,
            started_at,
            finished_at: started_at,
        };

        if records.is_empty() {
            self.events.emit(EngineEvent::Warn {
                error: NO_RECORDS_WARNING.to_string(),
            });
            summary.finished_at = Utc::now();
            return Ok(summary);
        }

        // Reconciling
        self.phase.send_replace(RoundPhase::Reconciling);
        for outcome in self.reconcile(ip, records).await? {
            match outcome {
                RecordOutcome::Unchanged => summary.unchanged += 1,
                RecordOutcome::Updated => summary.updated += 1,
                RecordOutcome::Failed => summary.failed += 1,
            }
        }

        summary.finished_at = Utc::now();
        debug!(
            "Round done: {} record(s), {} unchanged, {} updated, {} failed",
            summary.records, summary.unchanged, summary.updated, summary.failed
        );
        Ok(summary)
    }

    async fn fetch_records(&self) -> Result<Vec<RecordSnapshot>> {
        let domain_id = self.resolve_domain().await?;

        let records = self
            .with_timeout(
                "record fetch",
                self.repository
                    .list_records(domain_id, &self.config.subdomains),
            )
            .await?;

        Ok(records
            .into_iter()
            .filter(|record| {
                let tracked =
                    record.is_a_record() && self.config.subdomains.contains(&record.name);
                if !tracked {
                    debug!(
                        "Ignoring untracked record {} ({})",
                        record.name, record.record_type
                    );
                }
                tracked
            })
            .collect())
    }

    async fn resolve_domain(&self) -> Result<&DomainId> {
        self.domain_identity
            .get_or_try_init(|| async {
                let id = self
                    .with_timeout(
                        "domain resolution",
                        self.repository.resolve_domain_id(&self.config.domain),
                    )
                    .await?;
                info!(
                    "Resolved domain {} to id {} via {}",
                    self.config.domain,
                    id,
                    self.repository.provider_name()
                );
                Ok(id)
            })
            .await
    }

    async fn reconcile(&self, ip: Ipv4Addr, records: Vec<RecordSnapshot>) -> Result<Vec<RecordOutcome>> {
        let ip_text = ip.to_string();
        let timeout = self.config.engine.request_timeout();

        // Equal records go through the executor too, as instantly finished
        // tasks, so the batch completion covers every record.
        let tasks = records.into_iter().map(|record| {
            reconcile_record(
                record,
                ip,
                ip_text.clone(),
                Arc::clone(&self.events),
                Arc::clone(&self.repository),
                timeout,
            )
        });

        self.executor.submit(tasks)?.finished().await
    }

    async fn with_timeout<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        call_with_timeout(self.config.engine.request_timeout(), what, call).await
    }
}

/// Bring one record in line with `ip`
async fn reconcile_record(
    mut record: RecordSnapshot,
    ip: Ipv4Addr,
    ip_text: String,
    events: Arc<EventBus>,
    repository: Arc<dyn RecordRepository>,
    timeout: Duration,
) -> RecordOutcome {
    if record.points_to(&ip_text) {
        events.emit(EngineEvent::Equal { record, ip });
        return RecordOutcome::Unchanged;
    }

    events.emit(EngineEvent::Changing {
        record: record.clone(),
        ip,
    });

    record.value = ip_text;
    let outcome =
        match call_with_timeout(timeout, "record update", repository.update_record(&record)).await {
            Ok(()) => RecordOutcome::Updated,
            Err(e) => {
                events.emit(EngineEvent::SaveError {
                    error: e.to_string(),
                    record: record.clone(),
                });
                RecordOutcome::Failed
            }
        };

    // "changed" means the update was attempted, not that the provider took it.
    events.emit(EngineEvent::Changed { record });
    outcome
}

async fn call_with_timeout<T>(
    limit: Duration,
    what: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(format!(
            "{} did not finish within {:?}",
            what, limit
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_starts_idle() {
        assert_eq!(RoundPhase::default(), RoundPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let result: Result<()> = call_with_timeout(Duration::from_secs(60), "record fetch", async {
            tokio::time::sleep(Duration::from_secs(61)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("record fetch"));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_call_passes_through() {
        let result = call_with_timeout(Duration::from_secs(60), "IP resolution", async {
            Ok::<_, Error>(Ipv4Addr::new(5, 6, 7, 8))
        })
        .await;

        assert_eq!(result.unwrap(), Ipv4Addr::new(5, 6, 7, 8));
    }
}
