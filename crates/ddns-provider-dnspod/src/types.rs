//! DNSPod form API response types
//!
//! Every answer of `dnsapi.cn` is a JSON object with a `status` block:
//!
//! ```json
//! { "status": { "code": "1", "message": "Action completed successful" }, ... }
//! ```
//!
//! Only code `"1"` means success. Identifiers and numeric fields are strings
//! in practice, but older accounts return some of them as numbers, so every
//! field here is read leniently.

use ddns_core::traits::A_RECORD;
use ddns_core::{DomainId, Error, RecordSnapshot, Result};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Status code DNSPod uses for a successful call
pub const SUCCESS_CODE: &str = "1";

/// The `status` block present in every response
#[derive(Debug, Deserialize)]
pub struct ApiStatus {
    #[serde(deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: Option<ApiStatus>,
}

/// Response of `Domain.List`
#[derive(Debug, Deserialize)]
pub struct DomainListResponse {
    #[serde(default)]
    pub domains: Vec<DnspodDomain>,
}

/// Domain item of `Domain.List`
#[derive(Debug, Deserialize)]
pub struct DnspodDomain {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
}

/// Response of `Record.List`
#[derive(Debug, Deserialize)]
pub struct RecordListResponse {
    #[serde(default)]
    pub records: Vec<DnspodRecord>,
}

/// Record item of `Record.List`
#[derive(Debug, Deserialize)]
pub struct DnspodRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "type", deserialize_with = "lenient_string")]
    pub record_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ttl: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub line: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mx: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
}

impl DnspodRecord {
    fn into_snapshot(self, domain_id: &DomainId) -> RecordSnapshot {
        RecordSnapshot {
            id: self.id,
            domain_id: domain_id.clone(),
            name: self.name,
            record_type: self.record_type,
            ttl: self.ttl,
            line: self.line,
            mx: self.mx,
            status: self.status,
            value: self.value,
        }
    }
}

/// Accept a JSON string or number (or null) as a string
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected a string or a number, got {}",
            other
        ))),
    }
}

/// Parse a response body and make sure DNSPod reported success
///
/// Returns the whole body for call-specific parsing.
pub fn check_status(body: &str) -> Result<Value> {
    let json: Value = serde_json::from_str(body)?;

    let envelope: Envelope = serde_json::from_value(json.clone())?;
    let status = envelope
        .status
        .ok_or_else(|| Error::parse(format!("Broken server content: {}", body)))?;

    if status.code != SUCCESS_CODE {
        return Err(Error::api(status.code, status.message));
    }

    Ok(json)
}

/// Pick the id of `domain` out of a `Domain.List` body
pub fn parse_domain_list(body: &str, domain: &str) -> Result<DomainId> {
    let json = check_status(body)?;
    let list: DomainListResponse = serde_json::from_value(json)?;

    if list.domains.is_empty() {
        return Err(Error::not_found(format!("No target domain: {}", domain)));
    }

    list.domains
        .into_iter()
        .find(|d| d.name == domain)
        .map(|d| DomainId::new(d.id))
        .ok_or_else(|| Error::not_found("No fit domain."))
}

/// Keep the tracked A records of a `Record.List` body
pub fn parse_record_list(
    body: &str,
    domain_id: &DomainId,
    subdomains: &[String],
) -> Result<Vec<RecordSnapshot>> {
    let json = check_status(body)?;
    let list: RecordListResponse = serde_json::from_value(json)?;

    Ok(list
        .records
        .into_iter()
        .filter(|r| r.record_type == A_RECORD && subdomains.contains(&r.name))
        .map(|r| r.into_snapshot(domain_id))
        .collect())
}
