//! Corrections and zone plans
//!
//! A [`Correction`] is an immutable value: it captures the zone, a
//! description for preview output, and the exact inputs its action needs,
//! including the provider-native request encoded when the plan was built.
//! The executor interprets the [`Action`] against a provider; nothing here
//! performs I/O.

use crate::record::RecordConfig;
use serde::Serialize;
use std::fmt;

/// Side effect of one correction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Create a record from a pre-encoded native request
    Create {
        record: RecordConfig,
        request: serde_json::Value,
    },
    /// Delete a live record, identified by its origin
    Delete { existing: RecordConfig },
    /// Rewrite a live record in place
    Modify {
        existing: RecordConfig,
        desired: RecordConfig,
        request: serde_json::Value,
    },
    /// Turn DNSSEC signing on or off for the zone
    SetDnssec { enabled: bool },
}

/// One schedulable mutating unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correction {
    /// Zone the correction applies to
    pub zone: String,
    /// Human-readable description
    pub description: String,
    /// What to do
    pub action: Action,
}

impl Correction {
    /// Build a create correction
    pub fn create(zone: &str, record: RecordConfig, request: serde_json::Value) -> Self {
        Self {
            zone: zone.to_string(),
            description: format!("+ CREATE {}", record),
            action: Action::Create { record, request },
        }
    }

    /// Build a delete correction
    pub fn delete(zone: &str, existing: RecordConfig) -> Self {
        Self {
            zone: zone.to_string(),
            description: format!("- DELETE {}", existing),
            action: Action::Delete { existing },
        }
    }

    /// Build a modify correction
    pub fn modify(
        zone: &str,
        existing: RecordConfig,
        desired: RecordConfig,
        request: serde_json::Value,
    ) -> Self {
        Self {
            zone: zone.to_string(),
            description: format!("± MODIFY {}: ({}) -> ({})", existing.fqdn(), existing, desired),
            action: Action::Modify {
                existing,
                desired,
                request,
            },
        }
    }

    /// Build a DNSSEC toggle
    pub fn set_dnssec(zone: &str, enabled: bool) -> Self {
        let verb = if enabled { "Enable" } else { "Disable" };
        Self {
            zone: zone.to_string(),
            description: format!("{} DNSSEC", verb),
            action: Action::SetDnssec { enabled },
        }
    }

    /// Record type name the correction touches, if it touches a record
    pub fn type_name(&self) -> Option<&str> {
        match &self.action {
            Action::Create { record, .. } => Some(record.type_name()),
            Action::Delete { existing } => Some(existing.type_name()),
            Action::Modify { desired, .. } => Some(desired.type_name()),
            Action::SetDnssec { .. } => None,
        }
    }
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// A description-only diff entry, shown but never executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    pub zone: String,
    pub description: String,
}

impl ChangeReport {
    pub fn new(zone: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            description: description.into(),
        }
    }
}

/// One entry of a zone plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Report(ChangeReport),
    Apply(Correction),
}

impl Step {
    /// Description for preview output
    pub fn description(&self) -> &str {
        match self {
            Self::Report(report) => &report.description,
            Self::Apply(correction) => &correction.description,
        }
    }
}

/// The ordered, executable plan for one zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonePlan {
    pub zone: String,
    pub steps: Vec<Step>,
    /// Mutating steps only, reports excluded
    pub change_count: usize,
}

impl ZonePlan {
    /// A plan with nothing to do
    pub fn empty(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            steps: Vec::new(),
            change_count: 0,
        }
    }

    /// Mutating corrections, in execution order
    pub fn corrections(&self) -> impl Iterator<Item = &Correction> {
        self.steps.iter().filter_map(|step| match step {
            Step::Apply(correction) => Some(correction),
            Step::Report(_) => None,
        })
    }

    /// Informational reports, in plan order
    pub fn reports(&self) -> impl Iterator<Item = &ChangeReport> {
        self.steps.iter().filter_map(|step| match step {
            Step::Report(report) => Some(report),
            Step::Apply(_) => None,
        })
    }

    /// Whether the plan has no steps at all
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// `"N changes"`, `"1 change"` or `"no changes"`
    pub fn summary(&self) -> String {
        match self.change_count {
            0 => "no changes".to_string(),
            1 => "1 change".to_string(),
            n => format!("{} changes", n),
        }
    }
}
