//! Correction orderer
//!
//! Turns a [`Changeset`] into one [`ZonePlan`] whose order respects the
//! referential checks providers run at call time. Buckets, each stable:
//!
//! 1. reports
//! 2. DNSSEC toggle
//! 3. DS deletions
//! 4. other deletions
//! 5. A and AAAA creations
//! 6. NS creations
//! 7. other creations
//! 8. DS creations
//! 9. modifications
//!
//! Providers declaring [`Capability::DeleteBeforeCreate`] get every
//! modification split into a deletion (buckets 3-4) and a creation
//! (buckets 5-8) instead of bucket 9.
//!
//! Every create and modify is encoded into its native request before the plan
//! exists. One failed encoding fails the whole plan, so a zone never applies
//! part of a batch it could not fully build.

use crate::capability::{Capability, CapabilitySet};
use crate::correction::{Correction, Step, ZonePlan};
use crate::diff::Changeset;
use crate::error::{Error, Result};
use crate::record::{RecordConfig, RecordType};
use crate::traits::DnsProvider;
use tracing::debug;

/// Builds ordered plans for one provider
#[derive(Debug, Clone, Copy, Default)]
pub struct Orderer {
    capabilities: CapabilitySet,
}

#[derive(Default)]
struct Buckets {
    ds_deletes: Vec<Correction>,
    deletes: Vec<Correction>,
    address_creates: Vec<Correction>,
    ns_creates: Vec<Correction>,
    creates: Vec<Correction>,
    ds_creates: Vec<Correction>,
    modifies: Vec<Correction>,
}

impl Buckets {
    fn push_delete(&mut self, correction: Correction, record_type: Option<RecordType>) {
        match record_type {
            Some(RecordType::Ds) => self.ds_deletes.push(correction),
            _ => self.deletes.push(correction),
        }
    }

    fn push_create(&mut self, correction: Correction, record_type: Option<RecordType>) {
        match record_type {
            Some(RecordType::A | RecordType::Aaaa) => self.address_creates.push(correction),
            Some(RecordType::Ns) => self.ns_creates.push(correction),
            Some(RecordType::Ds) => self.ds_creates.push(correction),
            _ => self.creates.push(correction),
        }
    }

    fn into_corrections(self) -> impl Iterator<Item = Correction> {
        self.ds_deletes
            .into_iter()
            .chain(self.deletes)
            .chain(self.address_creates)
            .chain(self.ns_creates)
            .chain(self.creates)
            .chain(self.ds_creates)
            .chain(self.modifies)
    }
}

impl Orderer {
    /// Create an orderer for a provider's capability set
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self { capabilities }
    }

    /// Build the plan for one zone
    ///
    /// # Parameters
    ///
    /// - `zone`: zone name
    /// - `changes`: output of the diff engine
    /// - `dnssec`: `Some(enabled)` when the DNSSEC state must change
    /// - `provider`: encodes desired records into native requests
    ///
    /// # Returns
    ///
    /// - `Ok(ZonePlan)`: the ordered plan
    /// - `Err(Error::Unsupported)`: one entry per record that could not be
    ///   encoded
    /// - `Err(Error::Capability)`: a DNSSEC change for a provider without
    ///   `CanAutoDnssec`
    pub fn plan(
        &self,
        zone: &str,
        changes: Changeset,
        dnssec: Option<bool>,
        provider: &dyn DnsProvider,
    ) -> Result<ZonePlan> {
        if dnssec.is_some() && !self.capabilities.contains(Capability::CanAutoDnssec) {
            return Err(Error::capability(format!(
                "{} cannot manage DNSSEC for {}",
                provider.provider_name(),
                zone
            )));
        }

        let mut failures = Vec::new();
        let mut encode = |record: &RecordConfig| match provider.encode_record(zone, record) {
            Ok(request) => Some(request),
            Err(Error::Unsupported(reasons)) => {
                failures.extend(reasons.into_iter().map(|r| format!("{}: {}", record, r)));
                None
            }
            Err(e) => {
                failures.push(format!("{}: {}", record, e));
                None
            }
        };

        let creates: Vec<_> = changes
            .creates
            .into_iter()
            .map(|record| {
                let request = encode(&record);
                (record, request)
            })
            .collect();
        let modifies: Vec<_> = changes
            .modifies
            .into_iter()
            .map(|m| {
                let request = encode(&m.desired);
                (m.existing, m.desired, request)
            })
            .collect();

        if !failures.is_empty() {
            return Err(Error::Unsupported(failures));
        }

        let split_modifies = self.capabilities.contains(Capability::DeleteBeforeCreate);
        let mut buckets = Buckets::default();

        for existing in changes.deletes {
            let record_type = existing.record_type();
            buckets.push_delete(Correction::delete(zone, existing), record_type);
        }

        for (record, request) in creates {
            let record_type = record.record_type();
            let request = request.unwrap_or_default();
            buckets.push_create(Correction::create(zone, record, request), record_type);
        }

        for (existing, desired, request) in modifies {
            let request = request.unwrap_or_default();
            if split_modifies {
                let deleted_type = existing.record_type();
                let created_type = desired.record_type();
                buckets.push_delete(Correction::delete(zone, existing), deleted_type);
                buckets.push_create(Correction::create(zone, desired, request), created_type);
            } else {
                buckets
                    .modifies
                    .push(Correction::modify(zone, existing, desired, request));
            }
        }

        let mut steps: Vec<Step> = changes.reports.into_iter().map(Step::Report).collect();
        if let Some(enabled) = dnssec {
            steps.push(Step::Apply(Correction::set_dnssec(zone, enabled)));
        }
        steps.extend(buckets.into_corrections().map(Step::Apply));

        let change_count = steps.iter().filter(|s| matches!(s, Step::Apply(_))).count();
        debug!("Planned {} correction(s) for {}", change_count, zone);

        Ok(ZonePlan {
            zone: zone.to_string(),
            steps,
            change_count,
        })
    }
}
