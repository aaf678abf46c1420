//! Diff engine
//!
//! Matches a desired record set against the actual one and classifies every
//! difference as a create, a delete, a modification or an informational
//! report. Matching is set-based: records are grouped by `(label, type)` and
//! aligned inside each group, so the position of a record in either input
//! never matters.
//!
//! Within a group three passes run in order:
//!
//! 1. Exact structural matches are dropped, or reported when the provider's
//!    [`ReportPolicy`] flags a non-authoritative difference.
//! 2. Equal payloads whose TTL differs become modifications.
//! 3. If exactly one record is left on each side it becomes a modification;
//!    any other leftovers become independent creates and deletes.
//!
//! Desired TTLs are normalized with the provider's [`TtlPolicy`] before the
//! first pass. Actual TTLs are used as fetched.

use crate::capability::TtlPolicy;
use crate::correction::ChangeReport;
use crate::record::RecordConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Provider hook classifying differences the provider does not act on
pub trait ReportPolicy: Send + Sync {
    /// Return a description when two structurally equal records still differ
    /// in a way worth showing to the operator.
    fn report(&self, desired: &RecordConfig, actual: &RecordConfig) -> Option<String>;
}

/// Reports metadata keys the provider stores but never acts on
#[derive(Debug, Clone, Default)]
pub struct MetadataDrift {
    keys: Vec<String>,
}

impl MetadataDrift {
    /// Watch the given metadata keys
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl ReportPolicy for MetadataDrift {
    fn report(&self, desired: &RecordConfig, actual: &RecordConfig) -> Option<String> {
        let drifted: Vec<String> = self
            .keys
            .iter()
            .filter(|key| desired.metadata_value(key) != actual.metadata_value(key))
            .map(|key| {
                format!(
                    "{}: {:?} -> {:?}",
                    key,
                    actual.metadata_value(key).unwrap_or(""),
                    desired.metadata_value(key).unwrap_or("")
                )
            })
            .collect();

        if drifted.is_empty() {
            None
        } else {
            Some(format!("{} (ignored by provider: {})", desired, drifted.join(", ")))
        }
    }
}

/// An actual record paired with the desired record replacing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    /// Live record, carries the provider origin
    pub existing: RecordConfig,
    /// Target state, TTL already normalized
    pub desired: RecordConfig,
}

/// Output of one diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    /// Informational differences, never executed
    pub reports: Vec<ChangeReport>,
    /// Desired records missing at the provider
    pub creates: Vec<RecordConfig>,
    /// Live records missing from the desired set
    pub deletes: Vec<RecordConfig>,
    /// Live records to rewrite in place
    pub modifies: Vec<Modification>,
    /// Number of records needing a mutating call (reports excluded)
    pub change_count: usize,
}

impl Changeset {
    /// Whether the changeset contains nothing at all, reports included
    pub fn is_empty(&self) -> bool {
        self.change_count == 0 && self.reports.is_empty()
    }
}

type GroupKey = (String, String);

#[derive(Default)]
struct Group {
    desired: Vec<RecordConfig>,
    actual: Vec<RecordConfig>,
}

/// Computes changesets for one provider
#[derive(Clone)]
pub struct Differ {
    ttl_policy: TtlPolicy,
    report_policy: Option<Arc<dyn ReportPolicy>>,
}

impl Differ {
    /// Create a differ normalizing desired TTLs with `ttl_policy`
    pub fn new(ttl_policy: TtlPolicy) -> Self {
        Self {
            ttl_policy,
            report_policy: None,
        }
    }

    /// Install the provider's report policy
    pub fn with_report_policy(mut self, policy: Arc<dyn ReportPolicy>) -> Self {
        self.report_policy = Some(policy);
        self
    }

    /// Diff `desired` against `actual` for `zone`.
    ///
    /// The result only depends on the inputs, so diffing the same pair twice
    /// yields the same changeset.
    pub fn diff(&self, zone: &str, desired: &[RecordConfig], actual: &[RecordConfig]) -> Changeset {
        let mut order: Vec<GroupKey> = Vec::new();
        let mut groups: HashMap<GroupKey, Group> = HashMap::new();

        for record in desired {
            let normalized = record.clone().with_ttl(self.ttl_policy.normalize(record.ttl()));
            group_for(&mut order, &mut groups, &normalized).desired.push(normalized);
        }
        for record in actual {
            group_for(&mut order, &mut groups, record).actual.push(record.clone());
        }

        let mut changes = Changeset::default();
        for key in &order {
            if let Some(group) = groups.remove(key) {
                self.diff_group(zone, group, &mut changes);
            }
        }

        changes.change_count = changes.creates.len() + changes.deletes.len() + changes.modifies.len();
        changes
    }

    fn diff_group(&self, zone: &str, group: Group, changes: &mut Changeset) {
        let mut actual: Vec<Option<RecordConfig>> = group.actual.into_iter().map(Some).collect();
        let mut unmatched: Vec<RecordConfig> = Vec::new();

        // Pass 1: exact matches
        for desired in group.desired {
            match take_first(&mut actual, |a| desired.matches_structurally(a)) {
                Some(existing) => {
                    let report = self
                        .report_policy
                        .as_ref()
                        .and_then(|policy| policy.report(&desired, &existing));
                    if let Some(description) = report {
                        changes.reports.push(ChangeReport::new(zone, description));
                    }
                }
                None => unmatched.push(desired),
            }
        }

        // Pass 2: same payload, TTL changed
        let mut leftover: Vec<RecordConfig> = Vec::new();
        for desired in unmatched {
            match take_first(&mut actual, |a| desired.same_payload(a)) {
                Some(existing) => changes.modifies.push(Modification { existing, desired }),
                None => leftover.push(desired),
            }
        }

        // Pass 3: single leftovers pair up, the rest are independent
        let mut remaining: Vec<RecordConfig> = actual.into_iter().flatten().collect();
        if leftover.len() == 1 && remaining.len() == 1 {
            if let (Some(desired), Some(existing)) = (leftover.pop(), remaining.pop()) {
                changes.modifies.push(Modification { existing, desired });
            }
            return;
        }

        changes.creates.extend(leftover);
        changes.deletes.extend(remaining);
    }
}

fn group_for<'a>(
    order: &mut Vec<GroupKey>,
    groups: &'a mut HashMap<GroupKey, Group>,
    record: &RecordConfig,
) -> &'a mut Group {
    let key = (
        record.label().to_ascii_lowercase(),
        record.type_name().to_ascii_uppercase(),
    );
    if !groups.contains_key(&key) {
        order.push(key.clone());
    }
    groups.entry(key).or_default()
}

fn take_first<F>(slots: &mut [Option<RecordConfig>], mut pred: F) -> Option<RecordConfig>
where
    F: FnMut(&RecordConfig) -> bool,
{
    slots
        .iter_mut()
        .find(|slot| slot.as_ref().is_some_and(&mut pred))
        .and_then(Option::take)
}
