//! Provider capabilities
//!
//! A provider declares its capabilities once, at registration. Anything it
//! does not declare is unsupported. The auditor, the diff engine and the
//! orderer consult the set read-only; nothing mutates it during a run.

use crate::record::RecordType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named boolean provider feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Provider can turn DNSSEC signing on and off for a zone
    CanAutoDnssec,
    /// Provider API tolerates concurrent calls from several zone runs
    CanConcur,
    /// Provider can list the zones of an account
    CanGetZones,
    /// ALIAS records
    CanUseAlias,
    /// CAA records
    CanUseCaa,
    /// DNAME records
    CanUseDname,
    /// DS records at the apex
    CanUseDs,
    /// DS records on delegated children
    CanUseDsForChildren,
    /// LOC records
    CanUseLoc,
    /// NAPTR records
    CanUseNaptr,
    /// PTR records
    CanUsePtr,
    /// SRV records
    CanUseSrv,
    /// SSHFP records
    CanUseSshfp,
    /// TLSA records
    CanUseTlsa,
    /// TXT records made of more than one character string
    CanUseTxtMulti,
    /// Modifications must be split into a delete scheduled with the other
    /// deletes and a create scheduled with the other creates
    DeleteBeforeCreate,
}

impl Capability {
    const ALL: [Capability; 16] = [
        Self::CanAutoDnssec,
        Self::CanConcur,
        Self::CanGetZones,
        Self::CanUseAlias,
        Self::CanUseCaa,
        Self::CanUseDname,
        Self::CanUseDs,
        Self::CanUseDsForChildren,
        Self::CanUseLoc,
        Self::CanUseNaptr,
        Self::CanUsePtr,
        Self::CanUseSrv,
        Self::CanUseSshfp,
        Self::CanUseTlsa,
        Self::CanUseTxtMulti,
        Self::DeleteBeforeCreate,
    ];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// The capability a record type depends on, if any.
    ///
    /// A, AAAA, CNAME, MX, NS and TXT are universally supported. DS is
    /// special-cased by the auditor (apex vs. children).
    pub fn required_for(record_type: RecordType) -> Option<Capability> {
        match record_type {
            RecordType::A
            | RecordType::Aaaa
            | RecordType::Cname
            | RecordType::Mx
            | RecordType::Ns
            | RecordType::Txt => None,
            RecordType::Alias => Some(Self::CanUseAlias),
            RecordType::Caa => Some(Self::CanUseCaa),
            RecordType::Dname => Some(Self::CanUseDname),
            RecordType::Ds => Some(Self::CanUseDs),
            RecordType::Loc => Some(Self::CanUseLoc),
            RecordType::Naptr => Some(Self::CanUseNaptr),
            RecordType::Ptr => Some(Self::CanUsePtr),
            RecordType::Srv => Some(Self::CanUseSrv),
            RecordType::Sshfp => Some(Self::CanUseSshfp),
            RecordType::Tlsa => Some(Self::CanUseTlsa),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fixed set of capabilities, empty by default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    /// The empty set: every capability unsupported
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, capability: Capability) -> Self {
        self.insert(capability);
        self
    }

    /// Declare a capability as supported
    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    /// Whether a capability is supported
    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Whether no capability is declared
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Declared capabilities in declaration order
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::new();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

/// How a provider constrains TTL values.
///
/// Desired TTLs are normalized with this policy before they are compared
/// with actual TTLs, which already reflect what the provider accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Any TTL is accepted as-is
    #[default]
    Any,
    /// Only these values are accepted
    Allowed(Vec<u32>),
    /// Values are clamped into `min..=max`
    Range { min: u32, max: u32 },
}

impl TtlPolicy {
    /// Build an allowed-set policy; values are sorted and deduplicated
    pub fn allowed(values: impl IntoIterator<Item = u32>) -> Self {
        let mut values: Vec<u32> = values.into_iter().collect();
        values.sort_unstable();
        values.dedup();
        Self::Allowed(values)
    }

    /// Normalize a desired TTL.
    ///
    /// For an allowed set the result is the smallest allowed value not below
    /// `ttl`; above the largest allowed value it is the largest one.
    pub fn normalize(&self, ttl: u32) -> u32 {
        match self {
            Self::Any => ttl,
            Self::Allowed(values) => {
                let Some(&largest) = values.last() else {
                    return ttl;
                };
                values.iter().copied().find(|v| *v >= ttl).unwrap_or(largest)
            }
            Self::Range { min, max } => ttl.clamp(*min, (*max).max(*min)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unsupported() {
        let set = CapabilitySet::default();
        assert!(set.is_empty());
        for capability in Capability::ALL {
            assert!(!set.contains(capability), "{} should default to unsupported", capability);
        }
    }

    #[test]
    fn test_set_membership() {
        let set: CapabilitySet = [Capability::CanUseCaa, Capability::CanConcur]
            .into_iter()
            .collect();

        assert!(set.contains(Capability::CanUseCaa));
        assert!(set.contains(Capability::CanConcur));
        assert!(!set.contains(Capability::CanUseSrv));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Capability::CanConcur, Capability::CanUseCaa]
        );
    }

    #[test]
    fn test_required_for() {
        assert_eq!(Capability::required_for(RecordType::A), None);
        assert_eq!(Capability::required_for(RecordType::Txt), None);
        assert_eq!(Capability::required_for(RecordType::Caa), Some(Capability::CanUseCaa));
        assert_eq!(Capability::required_for(RecordType::Alias), Some(Capability::CanUseAlias));
        assert_eq!(Capability::required_for(RecordType::Dname), Some(Capability::CanUseDname));
    }

    #[test]
    fn test_ttl_snaps_up_to_allowed_value() {
        let policy = TtlPolicy::allowed([3600, 60, 300]);
        assert_eq!(policy.normalize(100), 300);
        assert_eq!(policy.normalize(300), 300);
        assert_eq!(policy.normalize(1), 60);
        assert_eq!(policy.normalize(86400), 3600);
    }

    #[test]
    fn test_ttl_range_and_any() {
        assert_eq!(TtlPolicy::Any.normalize(17), 17);
        let range = TtlPolicy::Range { min: 120, max: 86400 };
        assert_eq!(range.normalize(60), 120);
        assert_eq!(range.normalize(100_000), 86400);
        assert_eq!(TtlPolicy::Allowed(Vec::new()).normalize(42), 42);
    }
}
