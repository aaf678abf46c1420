//! Core traits for zonesync
//!
//! - [`DnsProvider`]: fetch and mutate records through a provider API
//! - [`DnsProviderFactory`]: build providers from configuration

pub mod dns_provider;

pub use dns_provider::{DnsProvider, DnsProviderFactory};
