//! Test doubles and common utilities for reconciliation contract tests
//!
//! The in-memory provider does the real work; the doubles here only add
//! observation (in-flight counting) on top of it.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use zonesync_core::capability::{Capability, CapabilitySet, TtlPolicy};
use zonesync_core::config::{EngineConfig, ProviderConfig};
use zonesync_core::engine::{EngineEvent, Reconciler, ZoneJob};
use zonesync_core::error::{Error, Result};
use zonesync_core::record::{RecordConfig, RecordData};
use zonesync_core::registry::{ProviderFeatures, ProviderRegistry};
use zonesync_core::traits::{DnsProvider, DnsProviderFactory};
use zonesync_core::{InMemoryProvider, MemoryProviderFactory};

pub const ZONE: &str = "example.com";

/// A record in [`ZONE`] with TTL 300
pub fn record(label: &str, data: RecordData) -> RecordConfig {
    RecordConfig::new(label, ZONE, 300, data)
}

/// Registry with the memory provider under "memory"
pub fn memory_registry() -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    registry.register_provider("memory", Box::new(MemoryProviderFactory));
    Arc::new(registry)
}

/// Reconciler with default engine settings
pub fn reconciler(registry: Arc<ProviderRegistry>) -> (Arc<Reconciler>, mpsc::Receiver<EngineEvent>) {
    reconciler_with(registry, EngineConfig::default())
}

pub fn reconciler_with(
    registry: Arc<ProviderRegistry>,
    config: EngineConfig,
) -> (Arc<Reconciler>, mpsc::Receiver<EngineEvent>) {
    let (reconciler, events) = Reconciler::new(registry, config).expect("reconciler construction succeeds");
    (Arc::new(reconciler), events)
}

/// Job for [`ZONE`] on a memory provider
pub fn memory_job(provider: Arc<InMemoryProvider>, desired: Vec<RecordConfig>) -> ZoneJob {
    ZoneJob {
        zone: ZONE.to_string(),
        provider_type: "memory".to_string(),
        provider,
        desired,
        auto_dnssec: None,
    }
}

/// A cancellation receiver that never fires
pub fn never_cancel() -> watch::Receiver<bool> {
    // The last value stays readable after the sender is dropped
    let (_tx, rx) = watch::channel(false);
    rx
}

/// Drain every event currently queued
pub fn drain(events: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Shared counters of zone fetches in flight
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    /// Highest number of fetches that overlapped
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Memory provider that holds each fetch open for a while and counts overlap
pub struct SlowProvider {
    inner: InMemoryProvider,
    in_flight: Arc<InFlight>,
    delay: Duration,
}

impl SlowProvider {
    pub fn new(in_flight: Arc<InFlight>) -> Self {
        Self {
            inner: InMemoryProvider::new(),
            in_flight,
            delay: Duration::from_millis(25),
        }
    }
}

#[async_trait]
impl DnsProvider for SlowProvider {
    fn provider_name(&self) -> &'static str {
        "slow"
    }

    async fn get_zone_records(&self, zone: &str) -> Result<Vec<RecordConfig>> {
        self.in_flight.enter();
        tokio::time::sleep(self.delay).await;
        let records = self.inner.get_zone_records(zone).await;
        self.in_flight.leave();
        records
    }

    async fn ttl_policy(&self, zone: &str) -> Result<TtlPolicy> {
        self.inner.ttl_policy(zone).await
    }

    fn encode_record(&self, zone: &str, record: &RecordConfig) -> Result<serde_json::Value> {
        self.inner.encode_record(zone, record)
    }

    async fn create_record(&self, zone: &str, request: &serde_json::Value) -> Result<()> {
        self.inner.create_record(zone, request).await
    }

    async fn delete_record(&self, zone: &str, existing: &RecordConfig) -> Result<()> {
        self.inner.delete_record(zone, existing).await
    }

    async fn modify_record(
        &self,
        zone: &str,
        existing: &RecordConfig,
        request: &serde_json::Value,
    ) -> Result<()> {
        self.inner.modify_record(zone, existing, request).await
    }
}

/// Factory declaring a fixed capability set; instances are built by tests directly
pub struct DeclaringFactory {
    pub capabilities: CapabilitySet,
}

impl DeclaringFactory {
    /// Memory capabilities without `CanConcur`
    pub fn serial() -> Self {
        let capabilities = InMemoryProvider::capabilities()
            .iter()
            .filter(|c| *c != Capability::CanConcur)
            .collect();
        Self { capabilities }
    }

    /// Drop `CanAutoDnssec` from the declared set
    pub fn without_dnssec(self) -> Self {
        let capabilities = self
            .capabilities
            .iter()
            .filter(|c| *c != Capability::CanAutoDnssec)
            .collect();
        Self { capabilities }
    }

    /// Memory capabilities, concurrency included
    pub fn concurrent() -> Self {
        Self {
            capabilities: InMemoryProvider::capabilities(),
        }
    }
}

impl DnsProviderFactory for DeclaringFactory {
    fn create(&self, _config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        Err(Error::config("construct this provider directly"))
    }

    fn features(&self) -> ProviderFeatures {
        ProviderFeatures::with_capabilities(self.capabilities)
    }
}

/// Job for `zone` on a slow provider registered as `provider_type`
pub fn slow_job(zone: &str, provider_type: &str, in_flight: Arc<InFlight>) -> ZoneJob {
    ZoneJob {
        zone: zone.to_string(),
        provider_type: provider_type.to_string(),
        provider: Arc::new(SlowProvider::new(in_flight)),
        desired: vec![RecordConfig::new("www", zone, 300, RecordData::a("192.0.2.1"))],
        auto_dnssec: None,
    }
}

/// A provider whose API is down; every call fails before touching anything
#[derive(Debug, Default)]
pub struct UnreachableProvider {
    pub mutations: AtomicUsize,
}

impl UnreachableProvider {
    fn down(&self) -> Error {
        Error::http("connection refused")
    }

    fn mutated(&self) -> Error {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.down()
    }
}

#[async_trait]
impl DnsProvider for UnreachableProvider {
    fn provider_name(&self) -> &'static str {
        "unreachable"
    }

    async fn get_zone_records(&self, _zone: &str) -> Result<Vec<RecordConfig>> {
        Err(self.down())
    }

    fn encode_record(&self, _zone: &str, _record: &RecordConfig) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn create_record(&self, _zone: &str, _request: &serde_json::Value) -> Result<()> {
        Err(self.mutated())
    }

    async fn delete_record(&self, _zone: &str, _existing: &RecordConfig) -> Result<()> {
        Err(self.mutated())
    }

    async fn modify_record(
        &self,
        _zone: &str,
        _existing: &RecordConfig,
        _request: &serde_json::Value,
    ) -> Result<()> {
        Err(self.mutated())
    }
}
