//! Architectural Contract Test: Zone Concurrency
//!
//! Constraints verified:
//! - Zones of a provider type without `CanConcur` never overlap
//! - Zones of a concurrent provider type do overlap
//! - `max_concurrent_zones` bounds the overlap
//! - Results come back in job order regardless of completion order
//! - Fetch-phase reads draw from the per-credential rate limiter
//!
//! If this test fails, a provider that forbids parallel API use can be hammered.

mod common;

use common::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use zonesync_core::config::EngineConfig;
use zonesync_core::engine::Mode;
use zonesync_core::registry::ProviderRegistry;
use zonesync_core::InMemoryProvider;

fn registry() -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    registry.register_provider("serial", Box::new(DeclaringFactory::serial()));
    registry.register_provider("parallel", Box::new(DeclaringFactory::concurrent()));
    Arc::new(registry)
}

fn zones(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("zone{}.example", i)).collect()
}

#[tokio::test]
async fn non_concurrent_provider_is_serialized() {
    let in_flight = Arc::new(InFlight::default());
    let (reconciler, _events) = reconciler(registry());

    let jobs = zones(4)
        .iter()
        .map(|zone| slow_job(zone, "serial", in_flight.clone()))
        .collect();

    let results = reconciler.reconcile_all(jobs, Mode::Push, never_cancel()).await;

    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(in_flight.peak(), 1);
}

#[tokio::test]
async fn concurrent_provider_runs_zones_in_parallel() {
    let in_flight = Arc::new(InFlight::default());
    let (reconciler, _events) = reconciler(registry());

    let jobs = zones(4)
        .iter()
        .map(|zone| slow_job(zone, "parallel", in_flight.clone()))
        .collect();

    let results = reconciler.reconcile_all(jobs, Mode::Push, never_cancel()).await;

    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert!(in_flight.peak() > 1, "zones never overlapped");
    assert!(in_flight.peak() <= EngineConfig::default().max_concurrent_zones);
}

#[tokio::test]
async fn max_concurrent_zones_bounds_overlap() {
    let in_flight = Arc::new(InFlight::default());
    let config = EngineConfig {
        max_concurrent_zones: 2,
        ..Default::default()
    };
    let (reconciler, _events) = reconciler_with(registry(), config);

    let jobs = zones(6)
        .iter()
        .map(|zone| slow_job(zone, "parallel", in_flight.clone()))
        .collect();

    reconciler.reconcile_all(jobs, Mode::Preview, never_cancel()).await;

    assert_eq!(in_flight.peak(), 2);
}

#[tokio::test]
async fn results_follow_job_order() {
    let in_flight = Arc::new(InFlight::default());
    let (reconciler, _events) = reconciler(registry());

    let names = zones(5);
    let jobs = names
        .iter()
        .map(|zone| slow_job(zone, "parallel", in_flight.clone()))
        .collect();

    let results = reconciler.reconcile_all(jobs, Mode::Preview, never_cancel()).await;
    let returned: Vec<String> = results.into_iter().map(|(zone, _)| zone).collect();

    assert_eq!(returned, names);
}

#[tokio::test]
async fn fetch_reads_are_rate_limited_per_credential() {
    // One token up front, then one every 50ms
    let config = EngineConfig {
        rate_limit_per_sec: 20,
        rate_limit_burst: 1,
        ..Default::default()
    };
    let (reconciler, _events) = reconciler_with(memory_registry(), config);
    let provider = Arc::new(InMemoryProvider::new());

    // Three zones with two reads each share the "memory" credential
    let jobs = (0..3).map(|_| memory_job(provider.clone(), Vec::new())).collect();

    let started = Instant::now();
    let results = reconciler.reconcile_all(jobs, Mode::Preview, never_cancel()).await;
    let elapsed = started.elapsed();

    assert!(results.iter().all(|(_, r)| r.is_ok()));
    // Six reads need five refills
    assert!(
        elapsed >= Duration::from_millis(225),
        "reads were not spaced out: {:?}",
        elapsed
    );
}
