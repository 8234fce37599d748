//! Configuration types for the DDNS system
//!
//! This module defines all configuration structures used throughout the crate.
//! A configuration is immutable once handed to the engine and is validated
//! exactly once, in [`crate::DdnsEngine::new`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Interval between two rounds when none (or an unusable one) is configured
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

/// Main DDNS configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// DNSPod login token, formatted as `"token_id,token"`
    /// ⚠️ NEVER log this value
    pub token: String,

    /// Root domain whose records are managed (e.g. "example.com")
    pub domain: String,

    /// Subdomains (record names) to keep pointed at the public IP
    #[serde(default)]
    pub subdomains: Vec<String>,

    /// Delay between the end of one round and the start of the next
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Language the provider should answer in
    #[serde(default)]
    pub remote_lang: RemoteLang,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

// Custom Debug implementation that hides the token
impl std::fmt::Debug for DdnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DdnsConfig")
            .field("token", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("subdomains", &self.subdomains)
            .field("interval_ms", &self.interval_ms)
            .field("remote_lang", &self.remote_lang)
            .field("engine", &self.engine)
            .finish()
    }
}

impl DdnsConfig {
    /// Create a new configuration with defaults
    pub fn new(
        token: impl Into<String>,
        domain: impl Into<String>,
        subdomains: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            token: token.into(),
            domain: domain.into(),
            subdomains: subdomains.into_iter().map(Into::into).collect(),
            interval_ms: DEFAULT_INTERVAL_MS,
            remote_lang: RemoteLang::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the round interval in milliseconds (0 falls back to the default)
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Set the remote language
    pub fn with_remote_lang(mut self, remote_lang: RemoteLang) -> Self {
        self.remote_lang = remote_lang;
        self
    }

    /// Replace the engine settings
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Effective delay between rounds
    pub fn interval(&self) -> Duration {
        if self.interval_ms == 0 {
            Duration::from_millis(DEFAULT_INTERVAL_MS)
        } else {
            Duration::from_millis(self.interval_ms)
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.token.is_empty() {
            return Err(crate::Error::config("Token cannot be empty"));
        }

        if self.domain.is_empty() {
            return Err(crate::Error::config("Domain cannot be empty"));
        }

        let mut seen = HashSet::with_capacity(self.subdomains.len());
        for name in &self.subdomains {
            if name.is_empty() {
                return Err(crate::Error::config("Subdomain names cannot be empty"));
            }
            if !seen.insert(name.as_str()) {
                return Err(crate::Error::config(format!(
                    "Subdomain listed more than once: {}",
                    name
                )));
            }
        }

        self.engine.validate()
    }
}

/// Parse a textual round interval, falling back to [`DEFAULT_INTERVAL_MS`]
///
/// Accepts integer and decimal text ("30000", "1500.5"). Anything that is not
/// a finite positive number yields the default.
pub fn parse_interval_ms(raw: &str) -> u64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 1.0 => value as u64,
        _ => DEFAULT_INTERVAL_MS,
    }
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

/// Language requested from the provider for its messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteLang {
    /// Chinese
    #[default]
    Cn,
    /// English
    En,
}

impl RemoteLang {
    /// Map a language code; everything except exactly "en" is Chinese
    pub fn from_code(code: &str) -> Self {
        if code == "en" {
            RemoteLang::En
        } else {
            RemoteLang::Cn
        }
    }

    /// Code sent in the `lang` form field
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteLang::Cn => "cn",
            RemoteLang::En => "en",
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of record updates in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline for every remote call (IP resolution, fetch, update)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Capacity of the event channel returned by the engine
    ///
    /// When full, new events are dropped for that channel (with a warning log).
    /// Synchronous observers are unaffected.
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.concurrency == 0 {
            return Err(crate::Error::config("Engine concurrency must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("Request timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Deadline applied to each remote call
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> DdnsConfig {
        DdnsConfig::new("id,secret", "example.com", ["www", "@"])
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn empty_token_or_domain_is_rejected() {
        let mut cfg = valid();
        cfg.token.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.domain.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn duplicate_subdomains_are_rejected() {
        let cfg = DdnsConfig::new("id,secret", "example.com", ["www", "home", "www"]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("www"));
    }

    #[test]
    fn empty_subdomain_name_is_rejected() {
        let cfg = DdnsConfig::new("id,secret", "example.com", ["www", ""]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_subdomain_set_is_allowed() {
        let cfg = DdnsConfig::new("id,secret", "example.com", Vec::<String>::new());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_interval_uses_default() {
        let cfg = valid().with_interval_ms(0);
        assert_eq!(cfg.interval(), Duration::from_millis(DEFAULT_INTERVAL_MS));

        let cfg = valid().with_interval_ms(5_000);
        assert_eq!(cfg.interval(), Duration::from_secs(5));
    }

    #[test]
    fn interval_text_parsing() {
        assert_eq!(parse_interval_ms("60000"), 60_000);
        assert_eq!(parse_interval_ms(" 1500.7 "), 1_500);
        assert_eq!(parse_interval_ms("soon"), DEFAULT_INTERVAL_MS);
        assert_eq!(parse_interval_ms("0"), DEFAULT_INTERVAL_MS);
        assert_eq!(parse_interval_ms("-10"), DEFAULT_INTERVAL_MS);
        assert_eq!(parse_interval_ms("inf"), DEFAULT_INTERVAL_MS);
    }

    #[test]
    fn remote_lang_defaults_to_cn() {
        assert_eq!(RemoteLang::from_code("en"), RemoteLang::En);
        assert_eq!(RemoteLang::from_code("EN"), RemoteLang::Cn);
        assert_eq!(RemoteLang::from_code(" en"), RemoteLang::Cn);
        assert_eq!(RemoteLang::from_code("fr"), RemoteLang::Cn);
        assert_eq!(RemoteLang::default().as_str(), "cn");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let cfg = valid().with_engine(EngineConfig {
            concurrency: 0,
            ..EngineConfig::default()
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: DdnsConfig = serde_json::from_value(serde_json::json!({
            "token": "id,secret",
            "domain": "example.com",
            "subdomains": ["www"]
        }))
        .unwrap();

        assert_eq!(cfg.interval_ms, DEFAULT_INTERVAL_MS);
        assert_eq!(cfg.remote_lang, RemoteLang::Cn);
        assert_eq!(cfg.engine.concurrency, 10);
        assert_eq!(cfg.engine.request_timeout_secs, 60);
    }

    #[test]
    fn debug_hides_token() {
        let debug_str = format!("{:?}", valid());
        assert!(!debug_str.contains("secret"));
        assert!(debug_str.contains("<REDACTED>"));
    }
}
