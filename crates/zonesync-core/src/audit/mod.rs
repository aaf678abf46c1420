//! Record auditing
//!
//! The [`Auditor`] runs provider-declared rules over a desired record set
//! before anything is fetched or changed. It never stops at the first
//! problem: the caller gets every violation in one pass, and a non-empty
//! result means the zone must not be reconciled.
//!
//! ```rust
//! use zonesync_core::audit::{rules, Auditor};
//! use zonesync_core::record::{RecordConfig, RecordData};
//!
//! let mut auditor = Auditor::new();
//! auditor.add("MX", rules::mx_null);
//! auditor.add("*", rules::cname_at_apex);
//!
//! let records = vec![
//!     RecordConfig::new("@", "example.com", 300, RecordData::mx(0, ".")),
//!     RecordConfig::new("@", "example.com", 300, RecordData::cname("other.example.net.")),
//! ];
//! assert_eq!(auditor.audit(&records).len(), 2);
//! ```

pub mod rules;

use crate::capability::{Capability, CapabilitySet};
use crate::record::{RecordConfig, RecordData, RecordType};
use std::fmt;
use std::sync::Arc;

/// Outcome of a single rule check
pub type CheckResult = std::result::Result<(), String>;

type CheckFn = dyn Fn(&RecordConfig) -> CheckResult + Send + Sync;

/// Pattern matching every record type
pub const ANY_TYPE: &str = "*";

#[derive(Clone)]
struct AuditRule {
    /// Record type mnemonic, or `*`
    pattern: String,
    check: Arc<CheckFn>,
}

impl AuditRule {
    fn applies_to(&self, record: &RecordConfig) -> bool {
        self.pattern == ANY_TYPE || self.pattern.eq_ignore_ascii_case(record.type_name())
    }
}

/// A collection of `(type pattern, check)` rules
#[derive(Clone, Default)]
pub struct Auditor {
    rules: Vec<AuditRule>,
}

impl fmt::Debug for Auditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auditor")
            .field(
                "patterns",
                &self.rules.iter().map(|r| r.pattern.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Auditor {
    /// Create an auditor without rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for a record type, or for every type with `"*"`.
    ///
    /// Checks must be pure: they see one record and return the reason it is
    /// rejected, if it is.
    pub fn add<F>(&mut self, pattern: impl Into<String>, check: F)
    where
        F: Fn(&RecordConfig) -> CheckResult + Send + Sync + 'static,
    {
        self.rules.push(AuditRule {
            pattern: pattern.into(),
            check: Arc::new(check),
        });
    }

    /// Builder-style [`Auditor::add`]
    pub fn with_rule<F>(mut self, pattern: impl Into<String>, check: F) -> Self
    where
        F: Fn(&RecordConfig) -> CheckResult + Send + Sync + 'static,
    {
        self.add(pattern, check);
        self
    }

    /// Append every rule of another auditor
    pub fn extend(&mut self, other: &Auditor) {
        self.rules.extend(other.rules.iter().cloned());
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule is registered
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every applicable rule over every record.
    ///
    /// Violations are returned in record order, then rule order. An empty
    /// vector means the set may proceed to diffing.
    pub fn audit(&self, records: &[RecordConfig]) -> Vec<String> {
        let mut violations = Vec::new();

        for record in records {
            for rule in self.rules.iter().filter(|r| r.applies_to(record)) {
                if let Err(reason) = (rule.check)(record) {
                    violations.push(format!(
                        "{} record {:?}: {}",
                        record.type_name(),
                        record.fqdn(),
                        reason
                    ));
                }
            }
        }

        violations
    }

    /// Rules enforcing a provider's capability set on a desired record set.
    ///
    /// Gated record types, multi-string TXT records and records carrying a
    /// provider origin are rejected here, so no correction for them is ever
    /// built.
    pub fn capability_rules(capabilities: CapabilitySet) -> Auditor {
        let mut auditor = Auditor::new();

        auditor.add(ANY_TYPE, move |rc: &RecordConfig| {
            let required = match rc.record_type() {
                Some(RecordType::Ds) if !rc.is_apex() => Some(Capability::CanUseDsForChildren),
                Some(record_type) => Capability::required_for(record_type),
                None => None,
            };
            match required {
                Some(capability) if !capabilities.contains(capability) => Err(format!(
                    "provider does not support {} records here (missing {})",
                    rc.type_name(),
                    capability
                )),
                _ => Ok(()),
            }
        });

        auditor.add("TXT", move |rc: &RecordConfig| match rc.data() {
            RecordData::TXT { chunks }
                if chunks.len() > 1 && !capabilities.contains(Capability::CanUseTxtMulti) =>
            {
                Err(format!(
                    "provider does not support TXT records with {} strings",
                    chunks.len()
                ))
            }
            _ => Ok(()),
        });

        auditor.add(ANY_TYPE, |rc: &RecordConfig| {
            if rc.origin().is_some() {
                Err("desired record carries a provider origin".to_string())
            } else {
                Ok(())
            }
        });

        auditor
    }
}
