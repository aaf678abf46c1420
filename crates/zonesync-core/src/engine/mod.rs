//! Reconciliation engine
//!
//! The Reconciler runs the full pipeline for each zone:
//!
//! ```text
//! desired ──► Auditor ──► (clean) ──► fetch actual ──► Differ ──► Orderer ──► Executor
//!                │                          │                                  │
//!                ▼                          ▼                                  ▼
//!          AuditFailed                 fetch error                    CorrectionApplied
//!                                                                     CorrectionFailed
//! ```
//!
//! ## Concurrency
//!
//! One zone is strictly sequential. Independent zones run concurrently,
//! bounded by `max_concurrent_zones`; zones of a provider type that lacks
//! `CanConcur` are serialized process-wide. The per-credential rate limiter
//! is the only state shared between zone runs.
//!
//! ## Events
//!
//! Progress is reported on a bounded channel. When it is full, events are
//! dropped with a warning instead of blocking reconciliation.

use crate::capability::Capability;
use crate::config::{EngineConfig, ZonesyncConfig};
use crate::correction::ZonePlan;
use crate::diff::Differ;
use crate::error::{Error, Result};
use crate::executor::{ExecutionReport, Executor};
use crate::order::Orderer;
use crate::ratelimit::RateLimiterPool;
use crate::record::RecordConfig;
use crate::registry::ProviderRegistry;
use crate::traits::DnsProvider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Zone reconciliation started
    ZoneStarted { zone: String },

    /// Desired records were rejected; nothing was fetched or changed
    AuditFailed {
        zone: String,
        violations: Vec<String>,
    },

    /// A plan was built
    PlanComputed {
        zone: String,
        change_count: usize,
        summary: String,
    },

    /// One correction was applied
    CorrectionApplied { zone: String, description: String },

    /// One correction failed; the zone stopped there
    CorrectionFailed {
        zone: String,
        description: String,
        error: String,
    },

    /// Zone reconciliation ended
    ZoneFinished {
        zone: String,
        applied: usize,
        success: bool,
    },
}

/// Whether plans are only shown or also executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Compute and print plans
    Preview,
    /// Compute and execute plans
    Push,
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "preview" => Ok(Self::Preview),
            "push" => Ok(Self::Push),
            other => Err(Error::config(format!("Unknown mode: {}", other))),
        }
    }
}

/// Everything needed to reconcile one zone
#[derive(Clone)]
pub struct ZoneJob {
    /// Zone name
    pub zone: String,
    /// Registered provider type, used for feature lookups
    pub provider_type: String,
    /// Provider instance, shared by every zone of the same account
    pub provider: Arc<dyn DnsProvider>,
    /// Desired records
    pub desired: Vec<RecordConfig>,
    /// Desired DNSSEC state, if managed
    pub auto_dnssec: Option<bool>,
}

impl std::fmt::Debug for ZoneJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneJob")
            .field("zone", &self.zone)
            .field("provider_type", &self.provider_type)
            .field("desired", &self.desired.len())
            .field("auto_dnssec", &self.auto_dnssec)
            .finish()
    }
}

/// Result of one zone's reconciliation
#[derive(Debug, Clone)]
pub struct ZoneOutcome {
    pub zone: String,
    /// The plan that was shown or executed
    pub plan: ZonePlan,
    /// Execution result, `None` in preview
    pub execution: Option<ExecutionReport>,
}

impl ZoneOutcome {
    /// Corrections applied, 0 in preview
    pub fn applied(&self) -> usize {
        self.execution.as_ref().map_or(0, |e| e.applied)
    }

    /// Whether the zone reached its desired state (or only previewed)
    pub fn is_success(&self) -> bool {
        self.execution.as_ref().is_none_or(|e| e.is_complete())
    }
}

/// Drives audit, diff, ordering and execution for a set of zones
pub struct Reconciler {
    /// Provider factories and declared features
    registry: Arc<ProviderRegistry>,

    /// Engine settings
    config: EngineConfig,

    /// Token buckets keyed by provider credential
    rate_limiters: RateLimiterPool,

    /// One-permit semaphores for provider types without `CanConcur`
    serializers: Mutex<HashMap<String, Arc<Semaphore>>>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields engine events
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let reconciler = Self {
            registry,
            rate_limiters: RateLimiterPool::new(config.rate_limit_per_sec, config.rate_limit_burst),
            config,
            serializers: Mutex::new(HashMap::new()),
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// Build jobs for the configured zones
    ///
    /// Each provider entry is instantiated once and shared by its zones.
    /// A non-empty `only` restricts the jobs to those zone names.
    pub fn jobs_from_config(&self, config: &ZonesyncConfig, only: &[String]) -> Result<Vec<ZoneJob>> {
        let mut instances: HashMap<&str, Arc<dyn DnsProvider>> = HashMap::new();
        let mut jobs = Vec::new();

        for zone in &config.zones {
            if !only.is_empty() && !only.iter().any(|z| z.eq_ignore_ascii_case(&zone.name)) {
                debug!("Zone {} not selected, skipping", zone.name);
                continue;
            }

            let provider_config = config.provider_for(zone)?;
            let provider = match instances.get(zone.provider.as_str()) {
                Some(provider) => provider.clone(),
                None => {
                    let provider: Arc<dyn DnsProvider> =
                        Arc::from(self.registry.create_provider(provider_config)?);
                    instances.insert(zone.provider.as_str(), provider.clone());
                    provider
                }
            };

            jobs.push(ZoneJob {
                zone: zone.name.trim_end_matches('.').to_ascii_lowercase(),
                provider_type: provider_config.type_name().to_string(),
                provider,
                desired: zone.desired_records(),
                auto_dnssec: zone.auto_dnssec,
            });
        }

        if !only.is_empty() && jobs.is_empty() {
            return Err(Error::config(format!("No configured zone matches {}", only.join(","))));
        }

        Ok(jobs)
    }

    /// Reconcile one zone
    ///
    /// # Returns
    ///
    /// - `Ok(ZoneOutcome)`: the plan, and the execution report in push mode.
    ///   A failed correction is reported inside the outcome.
    /// - `Err(Error)`: audit, fetch or plan construction failed; nothing was
    ///   changed
    pub async fn reconcile_zone(
        &self,
        job: &ZoneJob,
        mode: Mode,
        cancel: watch::Receiver<bool>,
    ) -> Result<ZoneOutcome> {
        self.emit_event(EngineEvent::ZoneStarted {
            zone: job.zone.clone(),
        });

        let result = self.run_pipeline(job, mode, cancel).await;

        let (applied, success) = match &result {
            Ok(outcome) => (outcome.applied(), outcome.is_success()),
            Err(e) => {
                error!("Zone {} failed: {}", job.zone, e);
                (0, false)
            }
        };
        self.emit_event(EngineEvent::ZoneFinished {
            zone: job.zone.clone(),
            applied,
            success,
        });

        result
    }

    async fn run_pipeline(
        &self,
        job: &ZoneJob,
        mode: Mode,
        cancel: watch::Receiver<bool>,
    ) -> Result<ZoneOutcome> {
        let zone = job.zone.as_str();
        let provider = &job.provider;
        let features = self.registry.features(&job.provider_type).unwrap_or_default();

        // Audit before anything touches the network
        let mut violations = features.auditor().audit(&job.desired);
        if job.auto_dnssec.is_some() && !features.capabilities.contains(Capability::CanAutoDnssec) {
            violations.push(format!(
                "zone {} asks for DNSSEC management, which {} does not support",
                zone, job.provider_type
            ));
        }
        if !violations.is_empty() {
            warn!("Audit of {} found {} violation(s)", zone, violations.len());
            self.emit_event(EngineEvent::AuditFailed {
                zone: zone.to_string(),
                violations: violations.clone(),
            });
            return Err(Error::Audit(violations));
        }

        // Reads and corrections draw from the same per-credential bucket
        let limiter = self.rate_limiters.get(&provider.credential_key());

        limiter.acquire().await;
        let actual = provider.get_zone_records(zone).await.map_err(|e| as_fetch(zone, e))?;
        limiter.acquire().await;
        let ttl_policy = provider.ttl_policy(zone).await.map_err(|e| as_fetch(zone, e))?;
        debug!("Fetched {} record(s) for {}", actual.len(), zone);

        let mut differ = Differ::new(ttl_policy);
        if let Some(policy) = features.report_policy.clone() {
            differ = differ.with_report_policy(policy);
        }
        let changes = differ.diff(zone, &job.desired, &actual);

        let dnssec = match job.auto_dnssec {
            Some(wanted) => {
                limiter.acquire().await;
                let current = provider.dnssec_enabled(zone).await.map_err(|e| as_fetch(zone, e))?;
                (current != wanted).then_some(wanted)
            }
            None => None,
        };

        let plan = Orderer::new(features.capabilities).plan(zone, changes, dnssec, provider.as_ref())?;

        info!("{}: {}", zone, plan.summary());
        self.emit_event(EngineEvent::PlanComputed {
            zone: zone.to_string(),
            change_count: plan.change_count,
            summary: plan.summary(),
        });

        if mode == Mode::Preview || self.config.dry_run {
            for step in &plan.steps {
                info!("{}: {}", zone, step.description());
            }
            return Ok(ZoneOutcome {
                zone: zone.to_string(),
                plan,
                execution: None,
            });
        }

        let mut executor = Executor::new(provider.clone())
            .with_rate_limiter(limiter)
            .with_cancellation(cancel)
            .with_events(self.event_tx.clone());
        if self.config.execute_timeout_secs > 0 {
            executor = executor.with_deadline(
                tokio::time::Instant::now() + Duration::from_secs(self.config.execute_timeout_secs),
            );
        }

        let report = executor.execute(&plan).await;
        info!("{}: applied {} of {} correction(s)", zone, report.applied, plan.change_count);

        Ok(ZoneOutcome {
            zone: zone.to_string(),
            plan,
            execution: Some(report),
        })
    }

    /// Reconcile every job, concurrently where the providers allow it
    ///
    /// # Returns
    ///
    /// One result per job, in job order. A failing zone never affects the
    /// others.
    pub async fn reconcile_all(
        self: &Arc<Self>,
        jobs: Vec<ZoneJob>,
        mode: Mode,
        cancel: watch::Receiver<bool>,
    ) -> Vec<(String, Result<ZoneOutcome>)> {
        let limit = Arc::new(Semaphore::new(self.config.max_concurrent_zones));
        let mut tasks = JoinSet::new();
        let mut zones = Vec::with_capacity(jobs.len());

        for (index, job) in jobs.into_iter().enumerate() {
            zones.push(job.zone.clone());

            let serializer = if self.registry.has_capability(&job.provider_type, Capability::CanConcur) {
                None
            } else {
                Some(self.serializer_for(&job.provider_type))
            };
            let limit = limit.clone();
            let this = Arc::clone(self);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let result = async {
                    let _serial = match serializer {
                        Some(semaphore) => Some(semaphore.acquire_owned().await.map_err(closed)?),
                        None => None,
                    };
                    let _slot = limit.acquire_owned().await.map_err(closed)?;
                    this.reconcile_zone(&job, mode, cancel).await
                }
                .await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<ZoneOutcome>>> = zones.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!("Zone task ended abnormally: {}", e),
            }
        }

        zones
            .into_iter()
            .zip(results)
            .map(|(zone, result)| {
                let result = result.unwrap_or_else(|| Err(Error::Other(format!("zone {} task aborted", zone))));
                (zone, result)
            })
            .collect()
    }

    fn serializer_for(&self, provider_type: &str) -> Arc<Semaphore> {
        let mut serializers = self.serializers.lock().unwrap_or_else(PoisonError::into_inner);
        serializers
            .entry(provider_type.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

fn as_fetch(zone: &str, err: Error) -> Error {
    match err {
        Error::Fetch(_) => err,
        other => Error::fetch(format!("{}: {}", zone, other)),
    }
}

fn closed(_: tokio::sync::AcquireError) -> Error {
    Error::Other("zone scheduler closed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_clone_eq() {
        let event = EngineEvent::PlanComputed {
            zone: "example.com".to_string(),
            change_count: 2,
            summary: "2 changes".to_string(),
        };
        assert_eq!(event.clone(), event);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("preview".parse::<Mode>().unwrap(), Mode::Preview);
        assert_eq!("PUSH".parse::<Mode>().unwrap(), Mode::Push);
        assert!("apply".parse::<Mode>().is_err());
    }

    #[test]
    fn test_new_validates_engine_config() {
        let config = EngineConfig {
            max_concurrent_zones: 0,
            ..Default::default()
        };
        assert!(Reconciler::new(Arc::new(ProviderRegistry::new()), config).is_err());
    }
}
