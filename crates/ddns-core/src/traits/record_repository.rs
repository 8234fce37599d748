// # Record Repository Trait
//
// Defines the interface for reading and writing the A records of one domain
// at the DNS provider.
//
// ## Implementations
//
// - DNSPod: `ddns-provider-dnspod` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::RecordRepository;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let repository = /* RecordRepository implementation */;
//
//     let domain_id = repository.resolve_domain_id("example.com").await?;
//     let records = repository
//         .list_records(&domain_id, &["www".to_string()])
//         .await?;
//
//     for mut record in records {
//         record.value = "1.2.3.4".to_string();
//         repository.update_record(&record).await?;
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record type the engine manages
pub const A_RECORD: &str = "A";

/// Provider-internal identifier of the configured root domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(String);

impl DomainId {
    /// Wrap a provider identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One A record as the provider currently reports it
///
/// Snapshots are fetched fresh every round and owned by exactly one update
/// task; they are never reused across rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    /// Provider record id
    pub id: String,
    /// Domain the record belongs to
    pub domain_id: DomainId,
    /// Subdomain name (e.g. "www" or "@")
    pub name: String,
    /// Record type, always "A" for snapshots the engine handles
    pub record_type: String,
    /// Time-to-live as reported by the provider
    pub ttl: String,
    /// Routing line
    pub line: String,
    /// MX priority
    pub mx: String,
    /// Enabled/disabled flag
    pub status: String,
    /// Current IP value
    pub value: String,
}

impl RecordSnapshot {
    /// Whether this record is an A record
    pub fn is_a_record(&self) -> bool {
        self.record_type == A_RECORD
    }

    /// Whether the record already points at `ip`
    pub fn points_to(&self, ip: &str) -> bool {
        self.value == ip
    }
}

/// Trait for record repository implementations
///
/// Every operation is a single remote call. All calls share the same failure
/// contract:
///
/// - non-2xx transport status → hard failure (`Error::Http`)
/// - malformed response body → hard failure (`Error::Json` / `Error::Parse`)
/// - well-formed response whose status code is not the provider's success
///   code → hard failure carrying the provider message (`Error::Api`)
///
/// Repositories do not retry, cache or schedule anything; the engine owns
/// those decisions.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Resolve a domain name to the provider's identifier
    ///
    /// Fails with `Error::NotFound` if the account has no domain with that name.
    async fn resolve_domain_id(&self, domain: &str) -> Result<DomainId, crate::Error>;

    /// List the A records under `domain_id` whose name is in `subdomains`
    async fn list_records(
        &self,
        domain_id: &DomainId,
        subdomains: &[String],
    ) -> Result<Vec<RecordSnapshot>, crate::Error>;

    /// Push every field of `record` to the provider
    ///
    /// The provider has no partial-update semantics, so the whole snapshot is
    /// transmitted.
    async fn update_record(&self, record: &RecordSnapshot) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
