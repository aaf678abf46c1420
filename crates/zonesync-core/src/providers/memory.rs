// # In-Memory Provider
//
// DnsProvider implementation keeping zones in process memory.
//
// ## Purpose
//
// Exercises the whole reconciliation pipeline without a network: fetch,
// encode, create, delete, modify and DNSSEC toggling all behave like a real
// provider, including record ids carried in the origin.
//
// ## Crash Behavior
//
// - All zones are lost on restart
// - The next run recreates every desired record
//
// ## When to Use
//
// - Tests
// - Dry runs of a configuration before pointing it at a real account

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::audit::{Auditor, rules};
use crate::capability::{Capability, CapabilitySet, TtlPolicy};
use crate::config::{DEFAULT_TTL, ProviderConfig, RecordSpec};
use crate::error::{Error, Result};
use crate::record::{RecordConfig, RecordData};
use crate::registry::ProviderFeatures;
use crate::traits::{DnsProvider, DnsProviderFactory};

/// Native request and stored form of one record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    id: u64,
    label: String,
    ttl: u32,
    data: RecordData,
}

#[derive(Debug, Deserialize)]
struct MemoryOrigin {
    id: u64,
}

#[derive(Debug, Default)]
struct ZoneState {
    records: Vec<StoredRecord>,
    dnssec: bool,
}

/// In-memory DNS provider
///
/// # Example
///
/// ```rust,no_run
/// use zonesync_core::providers::InMemoryProvider;
/// use zonesync_core::record::{RecordConfig, RecordData};
/// use zonesync_core::DnsProvider;
///
/// #[tokio::main]
/// async fn main() -> zonesync_core::Result<()> {
///     let provider = InMemoryProvider::new();
///     provider
///         .seed("example.com", vec![RecordConfig::new("www", "example.com", 300, RecordData::a("192.0.2.1"))])
///         .await;
///
///     let records = provider.get_zone_records("example.com").await?;
///     assert_eq!(records.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    zones: RwLock<HashMap<String, ZoneState>>,
    next_id: AtomicU64,
    allowed_ttls: Option<Vec<u32>>,
    failures: RwLock<Vec<String>>,
    operations: RwLock<Vec<String>>,
}

impl InMemoryProvider {
    /// Create an empty provider accepting any TTL
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict TTLs to a fixed set, like providers with TTL menus
    pub fn with_allowed_ttls(mut self, ttls: Vec<u32>) -> Self {
        self.allowed_ttls = Some(ttls);
        self
    }

    /// Capabilities of the in-memory provider: everything but
    /// `DeleteBeforeCreate`
    pub fn capabilities() -> CapabilitySet {
        [
            Capability::CanAutoDnssec,
            Capability::CanConcur,
            Capability::CanGetZones,
            Capability::CanUseAlias,
            Capability::CanUseCaa,
            Capability::CanUseDname,
            Capability::CanUseDs,
            Capability::CanUseDsForChildren,
            Capability::CanUseLoc,
            Capability::CanUseNaptr,
            Capability::CanUsePtr,
            Capability::CanUseSrv,
            Capability::CanUseSshfp,
            Capability::CanUseTlsa,
            Capability::CanUseTxtMulti,
        ]
        .into_iter()
        .collect()
    }

    /// Replace a zone's records, bypassing the correction pipeline
    pub async fn seed(&self, zone: &str, records: Vec<RecordConfig>) {
        let stored = self.store(records);
        let mut zones = self.zones.write().await;
        zones.entry(zone_key(zone)).or_default().records = stored;
    }

    /// Make every operation whose record description contains `fragment` fail
    pub async fn fail_on(&self, fragment: impl Into<String>) {
        self.failures.write().await.push(fragment.into());
    }

    /// Drop every injected failure
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Operations applied so far, e.g. `"create A www.example.com 192.0.2.1"`
    pub async fn operations(&self) -> Vec<String> {
        self.operations.read().await.clone()
    }

    /// Current DNSSEC state of a zone
    pub async fn dnssec_state(&self, zone: &str) -> bool {
        self.zones
            .read()
            .await
            .get(&zone_key(zone))
            .is_some_and(|z| z.dnssec)
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn store(&self, records: Vec<RecordConfig>) -> Vec<StoredRecord> {
        records
            .into_iter()
            .map(|rc| StoredRecord {
                id: self.allocate_id(),
                label: rc.label().to_string(),
                ttl: rc.ttl(),
                data: rc.data().clone(),
            })
            .collect()
    }

    fn to_record(zone: &str, stored: &StoredRecord) -> RecordConfig {
        let origin = serde_json::json!({ "id": stored.id });
        RecordConfig::new(&stored.label, zone, stored.ttl, stored.data.clone()).with_origin(origin)
    }

    fn decode(zone: &str, request: &serde_json::Value) -> Result<(StoredRecord, RecordConfig)> {
        let stored: StoredRecord = serde_json::from_value(request.clone())
            .map_err(|e| Error::invalid_input(format!("malformed memory request: {}", e)))?;
        let record = RecordConfig::new(&stored.label, zone, stored.ttl, stored.data.clone());
        Ok((stored, record))
    }

    async fn check_failure(&self, operation: &str) -> Result<()> {
        let failures = self.failures.read().await;
        match failures.iter().find(|f| operation.contains(f.as_str())) {
            Some(fragment) => Err(Error::provider(
                "memory",
                format!("injected failure ({}) for {}", fragment, operation),
            )),
            None => Ok(()),
        }
    }

    async fn log(&self, operation: String) {
        debug!("memory: {}", operation);
        self.operations.write().await.push(operation);
    }
}

fn zone_key(zone: &str) -> String {
    zone.trim_end_matches('.').to_ascii_lowercase()
}

fn describe(verb: &str, record: &RecordConfig) -> String {
    format!("{} {} {} {}", verb, record.type_name(), record.fqdn(), record.data().comparable())
}

#[async_trait]
impl DnsProvider for InMemoryProvider {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn get_zone_records(&self, zone: &str) -> Result<Vec<RecordConfig>> {
        let zones = self.zones.read().await;
        match zones.get(&zone_key(zone)) {
            Some(state) => Ok(state.records.iter().map(|r| Self::to_record(zone, r)).collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn ttl_policy(&self, _zone: &str) -> Result<TtlPolicy> {
        Ok(match &self.allowed_ttls {
            Some(ttls) => TtlPolicy::allowed(ttls.iter().copied()),
            None => TtlPolicy::Any,
        })
    }

    fn encode_record(&self, _zone: &str, record: &RecordConfig) -> Result<serde_json::Value> {
        if let RecordData::Unknown { rtype, .. } = record.data() {
            return Err(Error::unsupported(format!("record type {} is not implemented", rtype)));
        }
        let stored = StoredRecord {
            id: 0,
            label: record.label().to_string(),
            ttl: record.ttl(),
            data: record.data().clone(),
        };
        Ok(serde_json::to_value(stored)?)
    }

    async fn create_record(&self, zone: &str, request: &serde_json::Value) -> Result<()> {
        let (mut stored, record) = Self::decode(zone, request)?;
        let operation = describe("create", &record);
        self.check_failure(&operation).await?;

        stored.id = self.allocate_id();
        self.zones
            .write()
            .await
            .entry(zone_key(zone))
            .or_default()
            .records
            .push(stored);
        self.log(operation).await;
        Ok(())
    }

    async fn delete_record(&self, zone: &str, existing: &RecordConfig) -> Result<()> {
        let origin: MemoryOrigin = existing.origin_as()?;
        let operation = describe("delete", existing);
        self.check_failure(&operation).await?;

        {
            let mut zones = self.zones.write().await;
            let state = zones
                .get_mut(&zone_key(zone))
                .ok_or_else(|| Error::not_found(format!("zone {}", zone)))?;
            let index = state
                .records
                .iter()
                .position(|r| r.id == origin.id)
                .ok_or_else(|| Error::not_found(format!("record {} in {}", origin.id, zone)))?;
            state.records.remove(index);
        }

        self.log(operation).await;
        Ok(())
    }

    async fn modify_record(
        &self,
        zone: &str,
        existing: &RecordConfig,
        request: &serde_json::Value,
    ) -> Result<()> {
        let origin: MemoryOrigin = existing.origin_as()?;
        let (mut stored, record) = Self::decode(zone, request)?;
        let operation = describe("modify", &record);
        self.check_failure(&operation).await?;

        {
            let mut zones = self.zones.write().await;
            let state = zones
                .get_mut(&zone_key(zone))
                .ok_or_else(|| Error::not_found(format!("zone {}", zone)))?;
            let slot = state
                .records
                .iter_mut()
                .find(|r| r.id == origin.id)
                .ok_or_else(|| Error::not_found(format!("record {} in {}", origin.id, zone)))?;
            stored.id = origin.id;
            *slot = stored;
        }

        self.log(operation).await;
        Ok(())
    }

    async fn dnssec_enabled(&self, zone: &str) -> Result<bool> {
        Ok(self.dnssec_state(zone).await)
    }

    async fn set_dnssec(&self, zone: &str, enabled: bool) -> Result<()> {
        let operation = format!("dnssec {} {}", zone_key(zone), if enabled { "on" } else { "off" });
        self.check_failure(&operation).await?;

        self.zones
            .write()
            .await
            .entry(zone_key(zone))
            .or_default()
            .dnssec = enabled;
        self.log(operation).await;
        Ok(())
    }
}

/// Factory for `type = "memory"` providers
#[derive(Debug, Default)]
pub struct MemoryProviderFactory;

impl DnsProviderFactory for MemoryProviderFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let ProviderConfig::Memory { allowed_ttls, seed } = config else {
            return Err(Error::config("Invalid config type for memory provider"));
        };

        let mut provider = InMemoryProvider::new();
        if let Some(ttls) = allowed_ttls {
            provider = provider.with_allowed_ttls(ttls.clone());
        }

        for (zone, specs) in seed {
            let records: Vec<RecordConfig> = specs
                .iter()
                .map(|spec: &RecordSpec| spec.to_record(zone, DEFAULT_TTL))
                .collect();
            debug!("memory: seeding {} record(s) in {}", records.len(), zone);
            let stored = provider.store(records);
            provider.zones.get_mut().entry(zone_key(zone)).or_default().records = stored;
        }

        Ok(Box::new(provider))
    }

    fn features(&self) -> ProviderFeatures {
        ProviderFeatures {
            capabilities: InMemoryProvider::capabilities(),
            audit_rules: Auditor::new().with_rule("MX", rules::mx_null),
            report_policy: None,
        }
    }
}
