// # ddns-core
//
// Core library for the round-based DNSPod DDNS system.
//
// ## Architecture Overview
//
// This library keeps a set of DNS A records pointed at the machine's public IP:
// - **IpResolver**: Trait for discovering the current public IP
// - **RecordRepository**: Trait for reading/updating A records at the provider
// - **BoundedExecutor**: Runs per-record updates with a parallelism ceiling
// - **EventBus**: Synchronous fan-out of lifecycle events to observers
// - **DdnsEngine**: Round scheduler driving detect → fetch → reconcile → sleep
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from provider and IP adapters
// 2. **Round-Based**: State is refetched every round; nothing persists across rounds
// 3. **Error Containment**: Failures end a round (or one record), never the loop
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Observable**: Every phase is announced on the event bus

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod traits;

// Re-export core types for convenience
pub use config::{DdnsConfig, EngineConfig, RemoteLang};
pub use engine::{DdnsEngine, RoundPhase, RoundSummary};
pub use error::{Error, Result};
pub use events::{EngineEvent, EventBus, EventObserver, EventStream};
pub use executor::{Batch, BoundedExecutor};
pub use traits::{DomainId, IpResolver, RecordRepository, RecordSnapshot};
