//! Correction executor
//!
//! Applies one zone's plan in order, one correction at a time. The first
//! failing correction stops the run: nothing is retried and nothing already
//! applied is rolled back. Re-running the whole pipeline resumes the work,
//! since a fresh diff against the partially updated zone only contains what
//! is left.
//!
//! Cancellation and the optional deadline are checked before each
//! correction. A correction already handed to the provider always finishes.

use crate::correction::{Action, Correction, Step, ZonePlan};
use crate::engine::EngineEvent;
use crate::error::{Error, Result};
use crate::ratelimit::TokenBucket;
use crate::traits::DnsProvider;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How an execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Every correction was applied
    Completed,
    /// A correction failed; later corrections were not attempted
    Failed {
        /// Description of the failing correction
        description: String,
        /// Error it returned
        error: String,
    },
    /// Stopped by cancellation or deadline before the plan finished
    Cancelled,
}

/// Result of executing one zone plan
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub zone: String,
    /// Corrections applied successfully
    pub applied: usize,
    pub outcome: ExecutionOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Whether every correction was applied
    pub fn is_complete(&self) -> bool {
        self.outcome == ExecutionOutcome::Completed
    }

    /// Convert into the applied count, or [`Error::Execution`] on failure.
    ///
    /// A cancelled run is not an error: the applied count tells how far it
    /// got and the next run picks up the rest.
    pub fn into_result(self) -> Result<usize> {
        match self.outcome {
            ExecutionOutcome::Completed | ExecutionOutcome::Cancelled => Ok(self.applied),
            ExecutionOutcome::Failed { description, error } => Err(Error::Execution {
                applied: self.applied,
                message: format!("{}: {}", description, error),
            }),
        }
    }
}

/// Applies zone plans against one provider
pub struct Executor {
    provider: Arc<dyn DnsProvider>,
    rate_limiter: Option<Arc<TokenBucket>>,
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
    events: Option<mpsc::Sender<EngineEvent>>,
}

impl Executor {
    /// Create an executor without rate limit, cancellation or deadline
    pub fn new(provider: Arc<dyn DnsProvider>) -> Self {
        Self {
            provider,
            rate_limiter: None,
            cancel: None,
            deadline: None,
            events: None,
        }
    }

    /// Take a token from `bucket` before each correction
    pub fn with_rate_limiter(mut self, bucket: Arc<TokenBucket>) -> Self {
        self.rate_limiter = Some(bucket);
        self
    }

    /// Stop issuing corrections once the channel holds `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Stop issuing corrections after `deadline`
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Emit per-correction events on `events`
    pub fn with_events(mut self, events: mpsc::Sender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn should_stop(&self, zone: &str) -> bool {
        if let Some(cancel) = &self.cancel {
            if *cancel.borrow() {
                info!("Cancellation requested, stopping execution for {}", zone);
                return true;
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                warn!("Execution deadline reached for {}", zone);
                return true;
            }
        }
        false
    }

    /// Apply a plan
    ///
    /// # Returns
    ///
    /// The report with the applied count. Failures are part of the report,
    /// use [`ExecutionReport::into_result`] to turn them into an error.
    pub async fn execute(&self, plan: &ZonePlan) -> ExecutionReport {
        let started_at = Utc::now();
        let mut applied = 0;
        let mut outcome = ExecutionOutcome::Completed;

        for step in &plan.steps {
            let correction = match step {
                Step::Report(report) => {
                    info!("{}: {}", report.zone, report.description);
                    continue;
                }
                Step::Apply(correction) => correction,
            };

            if self.should_stop(&plan.zone) {
                outcome = ExecutionOutcome::Cancelled;
                break;
            }

            if let Some(bucket) = &self.rate_limiter {
                bucket.acquire().await;
                if self.should_stop(&plan.zone) {
                    outcome = ExecutionOutcome::Cancelled;
                    break;
                }
            }

            debug!("Applying {} to {}", correction.description, plan.zone);
            match self.apply(correction).await {
                Ok(()) => {
                    applied += 1;
                    info!("{}: {}", plan.zone, correction.description);
                    self.emit_event(EngineEvent::CorrectionApplied {
                        zone: plan.zone.clone(),
                        description: correction.description.clone(),
                    });
                }
                Err(e) => {
                    error!(
                        "{}: {} failed after {} applied correction(s): {}",
                        plan.zone, correction.description, applied, e
                    );
                    self.emit_event(EngineEvent::CorrectionFailed {
                        zone: plan.zone.clone(),
                        description: correction.description.clone(),
                        error: e.to_string(),
                    });
                    outcome = ExecutionOutcome::Failed {
                        description: correction.description.clone(),
                        error: e.to_string(),
                    };
                    break;
                }
            }
        }

        ExecutionReport {
            zone: plan.zone.clone(),
            applied,
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn apply(&self, correction: &Correction) -> Result<()> {
        let zone = correction.zone.as_str();
        match &correction.action {
            Action::Create { request, .. } => self.provider.create_record(zone, request).await,
            Action::Delete { existing } => self.provider.delete_record(zone, existing).await,
            Action::Modify {
                existing, request, ..
            } => self.provider.modify_record(zone, existing, request).await,
            Action::SetDnssec { enabled } => self.provider.set_dnssec(zone, *enabled).await,
        }
    }

    fn emit_event(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            if events.try_send(event).is_err() {
                warn!("Event channel full, dropping correction event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::ChangeReport;
    use crate::providers::InMemoryProvider;
    use crate::record::{RecordConfig, RecordData};

    const ZONE: &str = "example.com";

    fn create_step(provider: &InMemoryProvider, ip: &str) -> Step {
        let record = RecordConfig::new("www", ZONE, 300, RecordData::a(ip));
        let request = provider.encode_record(ZONE, &record).unwrap();
        Step::Apply(Correction::create(ZONE, record, request))
    }

    fn plan(steps: Vec<Step>) -> ZonePlan {
        let change_count = steps.iter().filter(|s| matches!(s, Step::Apply(_))).count();
        ZonePlan {
            zone: ZONE.to_string(),
            steps,
            change_count,
        }
    }

    #[tokio::test]
    async fn test_applies_in_order_and_skips_reports() {
        let provider = Arc::new(InMemoryProvider::new());
        let executor = Executor::new(provider.clone());

        let report = executor
            .execute(&plan(vec![
                Step::Report(ChangeReport::new(ZONE, "just so you know")),
                create_step(&provider, "1.1.1.1"),
                create_step(&provider, "2.2.2.2"),
            ]))
            .await;

        assert!(report.is_complete());
        assert_eq!(report.applied, 2);
        assert_eq!(provider.get_zone_records(ZONE).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.fail_on("2.2.2.2").await;
        let executor = Executor::new(provider.clone());

        let report = executor
            .execute(&plan(vec![
                create_step(&provider, "1.1.1.1"),
                create_step(&provider, "2.2.2.2"),
                create_step(&provider, "3.3.3.3"),
            ]))
            .await;

        assert_eq!(report.applied, 1);
        assert!(matches!(report.outcome, ExecutionOutcome::Failed { .. }));
        assert_eq!(provider.get_zone_records(ZONE).await.unwrap().len(), 1);

        match report.into_result() {
            Err(Error::Execution { applied, message }) => {
                assert_eq!(applied, 1);
                assert!(message.contains("2.2.2.2"));
            }
            other => panic!("expected execution error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_first_correction() {
        let provider = Arc::new(InMemoryProvider::new());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = Executor::new(provider.clone())
            .with_cancellation(rx)
            .execute(&plan(vec![create_step(&provider, "1.1.1.1")]))
            .await;

        assert_eq!(report.outcome, ExecutionOutcome::Cancelled);
        assert_eq!(report.applied, 0);
        assert_eq!(report.into_result().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_past_deadline_applies_nothing() {
        let provider = Arc::new(InMemoryProvider::new());

        let report = Executor::new(provider.clone())
            .with_deadline(Instant::now())
            .execute(&plan(vec![create_step(&provider, "1.1.1.1")]))
            .await;

        assert_eq!(report.outcome, ExecutionOutcome::Cancelled);
        assert!(provider.get_zone_records(ZONE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_are_emitted_per_correction() {
        let provider = Arc::new(InMemoryProvider::new());
        let (tx, mut rx) = mpsc::channel(8);

        Executor::new(provider.clone())
            .with_events(tx)
            .with_rate_limiter(Arc::new(TokenBucket::new(1000, 10)))
            .execute(&plan(vec![create_step(&provider, "1.1.1.1")]))
            .await;

        match rx.recv().await {
            Some(EngineEvent::CorrectionApplied { zone, description }) => {
                assert_eq!(zone, ZONE);
                assert!(description.contains("1.1.1.1"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
