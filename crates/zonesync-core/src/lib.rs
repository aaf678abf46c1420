// # zonesync-core
//
// Core library for declarative DNS zone reconciliation.
//
// ## Architecture Overview
//
// Given the desired records of a zone and the records a provider currently
// serves, this library computes and applies the minimal ordered set of
// corrections that make them equal:
// - **Auditor**: Rejects desired records a provider cannot represent
// - **Differ**: Classifies records into creates, deletes, modifies and reports
// - **Orderer**: Encodes and orders corrections into a safe plan
// - **Executor**: Applies a plan sequentially, stopping at the first failure
// - **Reconciler**: Runs the pipeline for many zones concurrently
// - **ProviderRegistry**: Plugin-based registry of providers and their capabilities
//
// ## Design Principles
//
// 1. **Nothing before audit**: No fetch or mutation happens for a zone with violations
// 2. **Nothing without encoding**: Every record is encoded before the first mutation
// 3. **Plugin-Based**: Providers declare capabilities instead of being special-cased
// 4. **Idempotency**: Re-running after success yields an empty plan

pub mod audit;
pub mod capability;
pub mod config;
pub mod correction;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod order;
pub mod providers;
pub mod ratelimit;
pub mod record;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use audit::Auditor;
pub use capability::{Capability, CapabilitySet, TtlPolicy};
pub use config::{EngineConfig, ProviderConfig, RecordSpec, ZoneConfig, ZonesyncConfig};
pub use correction::{Action, ChangeReport, Correction, Step, ZonePlan};
pub use diff::{Changeset, Differ, MetadataDrift, ReportPolicy};
pub use engine::{EngineEvent, Mode, Reconciler, ZoneJob, ZoneOutcome};
pub use error::{Error, Result};
pub use executor::{ExecutionOutcome, ExecutionReport, Executor};
pub use order::Orderer;
pub use providers::{InMemoryProvider, MemoryProviderFactory};
pub use ratelimit::{RateLimiterPool, TokenBucket};
pub use record::{RecordConfig, RecordData, RecordType};
pub use registry::{ProviderFeatures, ProviderRegistry};
pub use traits::{DnsProvider, DnsProviderFactory};
