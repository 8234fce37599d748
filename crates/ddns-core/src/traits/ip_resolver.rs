// # IP Resolver Trait
//
// Defines the interface for discovering the machine's current public IPv4
// address.
//
// ## Implementations
//
// - HTTP-based: `ddns-ip-http` crate (ipify, aliyun, sohu, ...)
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::IpResolver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* IpResolver implementation */;
//
//     let ip = resolver.resolve().await?;
//     println!("public IP: {ip}");
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for public IP resolver implementations
///
/// A resolver answers one question per call: what is the public IP right now.
/// The engine calls it once at the start of every round and never caches the
/// answer across rounds.
///
/// # Contract
///
/// - Return the address, or fail with a transport error (`Error::Http`),
///   a parse error (`Error::Parse`) or a timeout (`Error::Timeout`)
/// - Perform at most one lookup per call; no retries, no polling loops
/// - A failure aborts only the current round
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Resolve the current public IPv4 address
    async fn resolve(&self) -> Result<Ipv4Addr, crate::Error>;

    /// Get the resolver name (for logging/debugging)
    fn name(&self) -> &'static str;
}
