//! Lifecycle events and the bus that fans them out
//!
//! Every phase of a round is announced as an [`EngineEvent`]. Observers are
//! called synchronously, in registration order, on the task that emits the
//! event. Record updates run as parallel tasks, so several threads may emit at
//! once; delivery is serialized so that every observer sees the same single
//! timeline. A slow observer therefore delays the round; observers that need
//! to do real work should subscribe through [`EventBus::channel`] instead and
//! consume the stream on their own task.

use crate::traits::RecordSnapshot;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Stream of events for async consumers
pub type EventStream = ReceiverStream<EngineEvent>;

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A new round started
    Round,

    /// Resolving the public IP
    Detecting,

    /// Public IP resolved
    Detected { ip: Ipv4Addr },

    /// Something unexpected but harmless (e.g. no matching records)
    Warn { error: String },

    /// The round aborted
    Error { error: String },

    /// The round finished; the next one is scheduled after the interval
    RoundEnd,

    /// Record already points at the resolved IP
    Equal { record: RecordSnapshot, ip: Ipv4Addr },

    /// Record is about to be updated to the resolved IP
    Changing { record: RecordSnapshot, ip: Ipv4Addr },

    /// Update attempted; `record.value` holds the new IP
    ///
    /// Emitted whether or not the provider accepted the update. A rejected
    /// update is additionally reported by [`EngineEvent::SaveError`] first.
    Changed { record: RecordSnapshot },

    /// The provider rejected a record update
    SaveError { error: String, record: RecordSnapshot },
}

impl EngineEvent {
    /// Event name as exposed to embedding code
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Round => "round",
            EngineEvent::Detecting => "detecting",
            EngineEvent::Detected { .. } => "detected",
            EngineEvent::Warn { .. } => "warn",
            EngineEvent::Error { .. } => "error",
            EngineEvent::RoundEnd => "round-end",
            EngineEvent::Equal { .. } => "equal",
            EngineEvent::Changing { .. } => "changing",
            EngineEvent::Changed { .. } => "changed",
            EngineEvent::SaveError { .. } => "save-error",
        }
    }

    /// The record this event is about, if any
    pub fn record(&self) -> Option<&RecordSnapshot> {
        match self {
            EngineEvent::Equal { record, .. }
            | EngineEvent::Changing { record, .. }
            | EngineEvent::Changed { record }
            | EngineEvent::SaveError { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// Receiver of engine events
///
/// Called inline with emission; must not block.
///
/// Deliveries never overlap, even when events are emitted from several
/// threads: each event reaches every observer before the next event reaches
/// any of them, so all observers see events in the same order. An observer
/// may subscribe new observers but must not emit on the same bus from
/// `on_event`.
pub trait EventObserver: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &EngineEvent);
}

impl<F> EventObserver for F
where
    F: Fn(&EngineEvent) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent) {
        self(event)
    }
}

/// Forwards events into a bounded channel
struct ChannelObserver {
    tx: mpsc::Sender<EngineEvent>,
}

impl EventObserver for ChannelObserver {
    fn on_event(&self, event: &EngineEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                // Consumer is slower than the engine; the event is lost for
                // this channel only.
                warn!(
                    "Event channel full, dropping {} event. Consider increasing event_channel_capacity.",
                    dropped.name()
                );
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Synchronous fan-out of [`EngineEvent`]s
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<Arc<dyn EventObserver>>>,
    // Held for a whole fan-out so concurrent emitters cannot interleave.
    delivery: Mutex<()>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; it receives every event emitted afterwards
    pub fn subscribe(&self, observer: impl EventObserver + 'static) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    /// Register a bounded channel and return its receiving end as a stream
    pub fn channel(&self, capacity: usize) -> EventStream {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribe(ChannelObserver { tx });
        ReceiverStream::new(rx)
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every observer, in registration order
    ///
    /// Concurrent calls are delivered one after the other.
    pub fn emit(&self, event: EngineEvent) {
        let _delivery = self
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        log_event(&event);

        // Snapshot the list so observers may subscribe from inside a callback.
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for observer in observers {
            observer.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .finish()
    }
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::Round => debug!("Round started"),
        EngineEvent::Detecting => debug!("Detecting public IP"),
        EngineEvent::Detected { ip } => info!("Detected public IP: {}", ip),
        EngineEvent::Warn { error } => warn!("{}", error),
        EngineEvent::Error { error } => error!("Round failed: {}", error),
        EngineEvent::RoundEnd => debug!("Round ended"),
        EngineEvent::Equal { record, ip } => {
            debug!("Record {} already points at {}", record.name, ip)
        }
        EngineEvent::Changing { record, ip } => {
            info!("Changing record {}: {} -> {}", record.name, record.value, ip)
        }
        EngineEvent::Changed { record } => {
            info!("Record {} set to {}", record.name, record.value)
        }
        EngineEvent::SaveError { error, record } => {
            error!("Failed to save record {}: {}", record.name, error)
        }
    }
}
