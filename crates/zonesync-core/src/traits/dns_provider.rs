// # DNS Provider Trait
//
// Defines the interface between the reconciliation core and one provider's
// API: fetch the live record set, encode records into native requests, and
// apply single create/delete/modify calls.
//
// ## Implementations
//
// - ClouDNS: `zonesync-provider-cloudns` crate
// - In-memory: `zonesync_core::providers::InMemoryProvider`
//
// ## Usage
//
// ```rust,ignore
// use zonesync_core::DnsProvider;
//
// async fn show(provider: &dyn DnsProvider) -> zonesync_core::Result<()> {
//     for record in provider.get_zone_records("example.com").await? {
//         println!("{}", record);
//     }
//     Ok(())
// }
// ```

use crate::capability::TtlPolicy;
use crate::error::Error;
use crate::record::RecordConfig;
use crate::registry::ProviderFeatures;
use async_trait::async_trait;

/// Trait for DNS provider implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe: zones of one provider may be
/// reconciled concurrently when the provider declares `CanConcur`.
///
/// # Contract
///
/// - Every call performs at most one logical API operation.
/// - Providers never retry, reorder or batch: ordering and rate limiting are
///   owned by the core.
/// - Records returned by [`DnsProvider::get_zone_records`] carry an origin
///   that [`DnsProvider::delete_record`] and [`DnsProvider::modify_record`]
///   use to identify the native record.
/// - A record that cannot be mapped into the model fails the whole fetch.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;

    /// Key identifying the account credentials in use.
    ///
    /// Zones sharing a credential key share one rate limiter.
    fn credential_key(&self) -> String {
        self.provider_name().to_string()
    }

    /// Fetch the complete live record set of a zone
    ///
    /// # Returns
    ///
    /// - `Ok(records)`: every record, each with an origin
    /// - `Err(Error::Fetch)`: the zone could not be read or a record could
    ///   not be mapped
    async fn get_zone_records(&self, zone: &str) -> Result<Vec<RecordConfig>, Error>;

    /// TTL restrictions for a zone
    async fn ttl_policy(&self, _zone: &str) -> Result<TtlPolicy, Error> {
        Ok(TtlPolicy::Any)
    }

    /// Encode a desired record into the provider-native request
    ///
    /// Called while building a plan, before anything is executed.
    ///
    /// # Returns
    ///
    /// - `Ok(request)`: the payload later handed to create/modify
    /// - `Err(Error::Unsupported)`: the record has no native mapping
    fn encode_record(&self, zone: &str, record: &RecordConfig) -> Result<serde_json::Value, Error>;

    /// Create a record from a request produced by [`DnsProvider::encode_record`]
    async fn create_record(&self, zone: &str, request: &serde_json::Value) -> Result<(), Error>;

    /// Delete a live record
    async fn delete_record(&self, zone: &str, existing: &RecordConfig) -> Result<(), Error>;

    /// Replace a live record with an encoded request
    async fn modify_record(
        &self,
        zone: &str,
        existing: &RecordConfig,
        request: &serde_json::Value,
    ) -> Result<(), Error>;

    /// Whether DNSSEC signing is active for the zone
    async fn dnssec_enabled(&self, _zone: &str) -> Result<bool, Error> {
        Err(Error::capability(format!(
            "{} cannot manage DNSSEC",
            self.provider_name()
        )))
    }

    /// Turn DNSSEC signing on or off
    async fn set_dnssec(&self, _zone: &str, _enabled: bool) -> Result<(), Error> {
        Err(Error::capability(format!(
            "{} cannot manage DNSSEC",
            self.provider_name()
        )))
    }
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this provider
    ///
    /// # Returns
    ///
    /// A boxed DnsProvider trait object
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, Error>;

    /// Capabilities, audit rules and report policy of the provider type.
    ///
    /// Read once, at registration.
    fn features(&self) -> ProviderFeatures {
        ProviderFeatures::default()
    }
}
