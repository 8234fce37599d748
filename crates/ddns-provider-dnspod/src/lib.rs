// # DNSPod Record Repository
//
// This crate provides the DNSPod (`dnsapi.cn`) record repository for the
// DDNS system.
//
// ## Scope
//
// - Resolves the configured root domain to its DNSPod id (`Domain.List`)
// - Lists the tracked A records of that domain (`Record.List`)
// - Pushes a whole record back with a new value (`Record.Modify`)
// - Dry-run mode for safe testing
// - ❌ NO retry logic (a failed call fails the round or the record task)
// - ❌ NO caching (the engine caches the domain id, records are refetched)
// - ❌ NO background tasks
//
// ## Security Requirements
//
// - The login token NEVER appears in logs or Debug output
// - The token is sent in the form body only
//
// ## API Reference
//
// Every call is a form POST to `https://dnsapi.cn/<Action>` carrying the
// common fields `login_token`, `format=json`, `lang` and `error_on_empty=no`.

mod types;

pub use types::{SUCCESS_CODE, check_status, parse_domain_list, parse_record_list};

use async_trait::async_trait;
use ddns_core::{DomainId, Error, RecordRepository, RecordSnapshot, RemoteLang, Result};
use std::time::Duration;

/// DNSPod form API base URL
pub const DNSPOD_API_BASE: &str = "https://dnsapi.cn";

/// Default HTTP timeout for API requests (60 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// DNSPod record repository
///
/// Stateless and single-shot: every trait call is exactly one HTTP request.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the repository will:
/// - Perform `Domain.List` and `Record.List` as usual
/// - Log the intended `Record.Modify` payload
/// - **NOT** actually modify DNS records
pub struct DnspodRepository {
    /// Login token, formatted as `"token_id,token"`
    /// ⚠️ NEVER log this value
    token: String,

    /// Language for provider messages
    lang: RemoteLang,

    /// API base URL (overridable for tests and proxies)
    base_uri: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform reads but skip Record.Modify
    dry_run: bool,
}

// Custom Debug implementation that hides the login token
impl std::fmt::Debug for DnspodRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnspodRepository")
            .field("token", &"<REDACTED>")
            .field("lang", &self.lang)
            .field("base_uri", &self.base_uri)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl DnspodRepository {
    /// Create a new DNSPod repository
    ///
    /// # Parameters
    ///
    /// - `token`: DNSPod login token (`"token_id,token"`)
    /// - `lang`: Language the provider should answer in
    /// - `dry_run`: If true, perform reads but skip record updates
    ///
    /// # Errors
    ///
    /// `Error::Config` if the token is empty, `Error::Http` if the HTTP
    /// client cannot be built.
    pub fn new(token: impl Into<String>, lang: RemoteLang, dry_run: bool) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::config("DNSPod login token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            token,
            lang,
            base_uri: DNSPOD_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Create a repository in live mode
    pub fn new_live(token: impl Into<String>, lang: RemoteLang) -> Result<Self> {
        Self::new(token, lang, false)
    }

    /// Create a repository in dry-run mode
    pub fn new_dry_run(token: impl Into<String>, lang: RemoteLang) -> Result<Self> {
        Self::new(token, lang, true)
    }

    /// Point the repository at another API base URL
    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether record updates are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}/{}", self.base_uri, action)
    }

    /// POST one form call and return the raw body of a 2xx answer
    ///
    /// ```http
    /// POST /<action>
    /// Content-Type: application/x-www-form-urlencoded
    ///
    /// login_token=<token>&format=json&lang=cn&error_on_empty=no&<fields>
    /// ```
    async fn post_form(&self, action: &str, fields: &[(&str, &str)]) -> Result<String> {
        let mut form: Vec<(&str, &str)> = vec![
            ("login_token", self.token.as_str()),
            ("format", "json"),
            ("lang", self.lang.as_str()),
            ("error_on_empty", "no"),
        ];
        form.extend_from_slice(fields);

        let response = self
            .client
            .post(self.action_url(action))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::http(format!("{} request failed: {}", action, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!(
                "Server returns a wrong status {} for {}",
                status.as_u16(),
                action
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read {} response: {}", action, e)))
    }
}

#[async_trait]
impl RecordRepository for DnspodRepository {
    /// ```http
    /// POST /Domain.List
    /// type=mine
    /// ```
    async fn resolve_domain_id(&self, domain: &str) -> Result<DomainId> {
        tracing::debug!("Looking up DNSPod domain id for {}", domain);

        let body = self.post_form("Domain.List", &[("type", "mine")]).await?;
        let domain_id = parse_domain_list(&body, domain)?;

        tracing::debug!("Found domain id: {}", domain_id);
        Ok(domain_id)
    }

    /// ```http
    /// POST /Record.List
    /// domain_id=<id>
    /// ```
    async fn list_records(
        &self,
        domain_id: &DomainId,
        subdomains: &[String],
    ) -> Result<Vec<RecordSnapshot>> {
        let body = self
            .post_form("Record.List", &[("domain_id", domain_id.as_str())])
            .await?;
        let records = parse_record_list(&body, domain_id, subdomains)?;

        tracing::debug!(
            "Fetched {} tracked A record(s) of domain {}",
            records.len(),
            domain_id
        );
        Ok(records)
    }

    /// ```http
    /// POST /Record.Modify
    /// domain_id=..&record_id=..&sub_domain=..&record_type=A&record_line=..
    /// &value=<ip>&mx=..&ttl=..&status=..
    /// ```
    async fn update_record(&self, record: &RecordSnapshot) -> Result<()> {
        let fields = [
            ("domain_id", record.domain_id.as_str()),
            ("record_id", record.id.as_str()),
            ("sub_domain", record.name.as_str()),
            ("record_type", record.record_type.as_str()),
            ("record_line", record.line.as_str()),
            ("value", record.value.as_str()),
            ("mx", record.mx.as_str()),
            ("ttl", record.ttl.as_str()),
            ("status", record.status.as_str()),
        ];

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send Record.Modify to {} with payload: {:?}",
                self.action_url("Record.Modify"),
                fields
            );
            return Ok(());
        }

        tracing::info!(
            "Updating DNSPod record {} ({}) -> {}",
            record.name,
            record.id,
            record.value
        );

        let body = self.post_form("Record.Modify", &fields).await?;
        check_status(&body)?;

        tracing::info!("DNS record updated successfully: {} -> {}", record.name, record.value);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "dnspod"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RecordSnapshot {
        RecordSnapshot {
            id: "16894439".to_string(),
            domain_id: DomainId::new("2059079"),
            name: "www".to_string(),
            record_type: "A".to_string(),
            ttl: "600".to_string(),
            line: "默认".to_string(),
            mx: "0".to_string(),
            status: "enable".to_string(),
            value: "5.6.7.8".to_string(),
        }
    }

    #[test]
    fn empty_token_is_rejected() {
        let err = DnspodRepository::new("", RemoteLang::Cn, false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn dry_run_mode() {
        let dry = DnspodRepository::new_dry_run("12345,token", RemoteLang::Cn).unwrap();
        let live = DnspodRepository::new_live("12345,token", RemoteLang::Cn).unwrap();

        assert!(dry.is_dry_run());
        assert!(!live.is_dry_run());
    }

    #[test]
    fn provider_name() {
        let repository = DnspodRepository::new_live("12345,token", RemoteLang::En).unwrap();
        assert_eq!(repository.provider_name(), "dnspod");
    }

    #[test]
    fn base_uri_is_normalized() {
        let repository = DnspodRepository::new_live("12345,token", RemoteLang::Cn)
            .unwrap()
            .with_base_uri("http://127.0.0.1:8080/");
        assert_eq!(
            repository.action_url("Record.List"),
            "http://127.0.0.1:8080/Record.List"
        );

        let repository = DnspodRepository::new_live("12345,token", RemoteLang::Cn).unwrap();
        assert_eq!(
            repository.action_url("Domain.List"),
            "https://dnsapi.cn/Domain.List"
        );
    }

    #[test]
    fn token_not_exposed_in_debug() {
        let repository =
            DnspodRepository::new_live("12345,secret_token_abc", RemoteLang::Cn).unwrap();

        let debug_str = format!("{:?}", repository);
        assert!(!debug_str.contains("secret_token_abc"));
        assert!(debug_str.contains("<REDACTED>"));
        assert!(debug_str.contains("DnspodRepository"));
    }

    #[tokio::test]
    async fn dry_run_update_sends_nothing() {
        // Unroutable base: any real request would fail
        let repository = DnspodRepository::new_dry_run("12345,token", RemoteLang::Cn)
            .unwrap()
            .with_base_uri("http://127.0.0.1:9");

        tokio_test::assert_ok!(repository.update_record(&snapshot()).await);
    }

    #[tokio::test]
    async fn transport_failure_is_an_http_error() {
        let repository = DnspodRepository::new_live("12345,token", RemoteLang::Cn)
            .unwrap()
            .with_base_uri("http://127.0.0.1:9");

        let err = repository.update_record(&snapshot()).await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        assert!(!err.to_string().contains("token"));
    }
}
