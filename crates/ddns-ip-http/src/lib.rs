// # HTTP IP Resolvers
//
// This crate provides HTTP-based public IP resolvers for the DDNS system.
//
// ## Architecture
//
// A resolver fetches one page per `resolve()` call and extracts the IPv4
// address from it. There is no polling and no caching: the engine asks once
// per round.
//
// ```text
// resolve() ──► GET url ──► decode (charset) ──► IpExtractor ──► Ipv4Addr
// ```
//
// Built-in services are listed in [`IpService`]; any other plain-text
// endpoint can be used through [`HttpIpResolver::new`].

mod extract;
mod service;

pub use extract::IpExtractor;
pub use service::{GBK, IpService, UTF8};

use async_trait::async_trait;
use ddns_core::{Error, IpResolver, Result};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default HTTP timeout for IP lookups (60 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Public IP resolver backed by one HTTP endpoint
#[derive(Debug)]
pub struct HttpIpResolver {
    /// Name reported to the engine
    name: &'static str,

    /// Page to fetch
    url: String,

    /// How to find the address in the page
    extractor: IpExtractor,

    /// Fallback charset when the response does not declare one
    charset: &'static str,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpResolver {
    /// Create a resolver for a custom endpoint
    ///
    /// # Parameters
    ///
    /// - `url`: Page to fetch (e.g., "https://ifconfig.me/ip")
    /// - `extractor`: How to find the address in the page
    pub fn new(url: impl Into<String>, extractor: IpExtractor) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: "http",
            url: url.into(),
            extractor,
            charset: UTF8,
            client,
        })
    }

    /// Create a resolver for a built-in service
    pub fn for_service(service: IpService) -> Result<Self> {
        let resolver = Self::new(service.url(), service.extractor()?)?;
        Ok(Self {
            name: service.name(),
            charset: service.charset(),
            ..resolver
        })
    }

    /// Set the fallback charset (e.g., [`GBK`])
    pub fn with_charset(mut self, charset: &'static str) -> Self {
        self.charset = charset;
        self
    }

    /// Page this resolver fetches
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the page and decode it
    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "{} returned status {}",
                self.url,
                response.status()
            )));
        }

        response
            .text_with_charset(self.charset)
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))
    }
}

#[async_trait]
impl IpResolver for HttpIpResolver {
    async fn resolve(&self) -> Result<Ipv4Addr> {
        let body = self.fetch().await?;

        let ip = self.extractor.extract(&body).inspect_err(|_| {
            tracing::debug!(
                "No IPv4 address in response of {} ({} bytes)",
                self.url,
                body.len()
            )
        })?;

        tracing::debug!("{} reports public IP {}", self.name, ip);
        Ok(ip)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
