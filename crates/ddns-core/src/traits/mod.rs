//! Core traits for the DDNS system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpResolver`]: Discover the current public IP
//! - [`RecordRepository`]: Read and write A records at the DNS provider

pub mod ip_resolver;
pub mod record_repository;

pub use ip_resolver::IpResolver;
pub use record_repository::{A_RECORD, DomainId, RecordRepository, RecordSnapshot};
