//! Canonical record model
//!
//! [`RecordConfig`] is the provider-agnostic form of one resource record.
//! Desired records come from configuration, actual records come from a
//! provider fetch and carry an `origin` that identifies the provider-native
//! record for delete and modify calls.
//!
//! Payloads are a tagged enum, one variant per record type. Types the model
//! has no variant for are kept as [`RecordData::Unknown`] so they still take
//! part in matching instead of disappearing.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Known DNS record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Alias,
    Caa,
    Cname,
    Dname,
    Ds,
    Loc,
    Mx,
    Naptr,
    Ns,
    Ptr,
    Srv,
    Sshfp,
    Tlsa,
    Txt,
}

impl RecordType {
    /// Every known record type, in mnemonic order
    pub const ALL: [RecordType; 16] = [
        Self::A,
        Self::Aaaa,
        Self::Alias,
        Self::Caa,
        Self::Cname,
        Self::Dname,
        Self::Ds,
        Self::Loc,
        Self::Mx,
        Self::Naptr,
        Self::Ns,
        Self::Ptr,
        Self::Srv,
        Self::Sshfp,
        Self::Tlsa,
        Self::Txt,
    ];

    /// The wire mnemonic ("A", "AAAA", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Alias => "ALIAS",
            Self::Caa => "CAA",
            Self::Cname => "CNAME",
            Self::Dname => "DNAME",
            Self::Ds => "DS",
            Self::Loc => "LOC",
            Self::Mx => "MX",
            Self::Naptr => "NAPTR",
            Self::Ns => "NS",
            Self::Ptr => "PTR",
            Self::Srv => "SRV",
            Self::Sshfp => "SSHFP",
            Self::Tlsa => "TLSA",
            Self::Txt => "TXT",
        }
    }

    /// Look up a type by mnemonic, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific record payload
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RecordData {
    /// IPv4 address
    A { address: String },

    /// IPv6 address
    AAAA { address: String },

    /// Provider-side flattened alias at any name, including the apex
    ALIAS { target: String },

    /// Certificate Authority Authorization
    CAA { flag: u8, tag: String, value: String },

    /// Canonical name
    CNAME { target: String },

    /// Redirection of a whole subtree
    DNAME { target: String },

    /// Delegation signer
    DS {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: String,
    },

    /// Location, each field in presentation format (e.g. `"52 22 23.000 N"`)
    LOC {
        latitude: String,
        longitude: String,
        altitude: String,
        size: String,
        horiz_precision: String,
        vert_precision: String,
    },

    /// Mail exchange
    MX { preference: u16, exchange: String },

    /// Naming authority pointer
    NAPTR {
        order: u16,
        preference: u16,
        flags: String,
        service: String,
        regexp: String,
        replacement: String,
    },

    /// Name server
    NS { target: String },

    /// Reverse pointer
    PTR { target: String },

    /// Service locator
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },

    /// SSH key fingerprint
    SSHFP {
        algorithm: u8,
        fingerprint_type: u8,
        fingerprint: String,
    },

    /// TLS certificate association
    TLSA {
        usage: u8,
        selector: u8,
        matching_type: u8,
        certificate: String,
    },

    /// Text, as one or more character strings
    TXT { chunks: Vec<String> },

    /// A type without a model variant, kept verbatim
    Unknown { rtype: String, content: String },
}

impl RecordData {
    /// A record
    pub fn a(address: impl Into<String>) -> Self {
        Self::A {
            address: address.into(),
        }
    }

    /// AAAA record
    pub fn aaaa(address: impl Into<String>) -> Self {
        Self::AAAA {
            address: address.into(),
        }
    }

    /// CNAME record
    pub fn cname(target: impl Into<String>) -> Self {
        Self::CNAME {
            target: target.into(),
        }
    }

    /// MX record
    pub fn mx(preference: u16, exchange: impl Into<String>) -> Self {
        Self::MX {
            preference,
            exchange: exchange.into(),
        }
    }

    /// NS record
    pub fn ns(target: impl Into<String>) -> Self {
        Self::NS {
            target: target.into(),
        }
    }

    /// Single-chunk TXT record
    pub fn txt(text: impl Into<String>) -> Self {
        Self::TXT {
            chunks: vec![text.into()],
        }
    }

    /// The known type of this payload, `None` for [`RecordData::Unknown`]
    pub fn record_type(&self) -> Option<RecordType> {
        Some(match self {
            Self::A { .. } => RecordType::A,
            Self::AAAA { .. } => RecordType::Aaaa,
            Self::ALIAS { .. } => RecordType::Alias,
            Self::CAA { .. } => RecordType::Caa,
            Self::CNAME { .. } => RecordType::Cname,
            Self::DNAME { .. } => RecordType::Dname,
            Self::DS { .. } => RecordType::Ds,
            Self::LOC { .. } => RecordType::Loc,
            Self::MX { .. } => RecordType::Mx,
            Self::NAPTR { .. } => RecordType::Naptr,
            Self::NS { .. } => RecordType::Ns,
            Self::PTR { .. } => RecordType::Ptr,
            Self::SRV { .. } => RecordType::Srv,
            Self::SSHFP { .. } => RecordType::Sshfp,
            Self::TLSA { .. } => RecordType::Tlsa,
            Self::TXT { .. } => RecordType::Txt,
            Self::Unknown { .. } => return None,
        })
    }

    /// The wire mnemonic of this payload's type
    pub fn type_name(&self) -> &str {
        match self {
            Self::Unknown { rtype, .. } => rtype,
            known => known.record_type().map_or("", |t| t.as_str()),
        }
    }

    /// The host name this payload points at, for types that point at one
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::ALIAS { target }
            | Self::CNAME { target }
            | Self::DNAME { target }
            | Self::NS { target }
            | Self::PTR { target }
            | Self::SRV { target, .. } => Some(target),
            Self::MX { exchange, .. } => Some(exchange),
            Self::NAPTR { replacement, .. } => Some(replacement),
            _ => None,
        }
    }

    /// Normalized presentation of the payload used for equality.
    ///
    /// Host names are lowercased and made absolute, hex strings are
    /// lowercased, and quoted fields are escaped, so two payloads that mean
    /// the same thing compare equal regardless of how a provider spelled them.
    pub fn comparable(&self) -> String {
        match self {
            Self::A { address } | Self::AAAA { address } => address.to_ascii_lowercase(),
            Self::ALIAS { target }
            | Self::CNAME { target }
            | Self::DNAME { target }
            | Self::NS { target }
            | Self::PTR { target } => canonical_host(target),
            Self::CAA { flag, tag, value } => {
                format!("{} {} {}", flag, tag.to_ascii_lowercase(), quote(value))
            }
            Self::DS {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => format!(
                "{} {} {} {}",
                key_tag,
                algorithm,
                digest_type,
                digest.to_ascii_lowercase()
            ),
            Self::LOC {
                latitude,
                longitude,
                altitude,
                size,
                horiz_precision,
                vert_precision,
            } => format!(
                "{} {} {} {} {} {}",
                canonical_coordinate(latitude),
                canonical_coordinate(longitude),
                canonical_meters(altitude),
                canonical_meters(size),
                canonical_meters(horiz_precision),
                canonical_meters(vert_precision)
            ),
            Self::MX {
                preference,
                exchange,
            } => format!("{} {}", preference, canonical_host(exchange)),
            Self::NAPTR {
                order,
                preference,
                flags,
                service,
                regexp,
                replacement,
            } => format!(
                "{} {} {} {} {} {}",
                order,
                preference,
                quote(flags),
                quote(service),
                quote(regexp),
                canonical_host(replacement)
            ),
            Self::SRV {
                priority,
                weight,
                port,
                target,
            } => format!("{} {} {} {}", priority, weight, port, canonical_host(target)),
            Self::SSHFP {
                algorithm,
                fingerprint_type,
                fingerprint,
            } => format!(
                "{} {} {}",
                algorithm,
                fingerprint_type,
                fingerprint.to_ascii_lowercase()
            ),
            Self::TLSA {
                usage,
                selector,
                matching_type,
                certificate,
            } => format!(
                "{} {} {} {}",
                usage,
                selector,
                matching_type,
                certificate.to_ascii_lowercase()
            ),
            Self::TXT { chunks } => chunks.iter().map(|c| quote(c)).collect::<Vec<_>>().join(" "),
            Self::Unknown { content, .. } => content.clone(),
        }
    }

    /// TXT text with all chunks concatenated, `None` for other types
    pub fn txt_joined(&self) -> Option<String> {
        match self {
            Self::TXT { chunks } => Some(chunks.concat()),
            _ => None,
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_name(), self.comparable())
    }
}

/// Lowercase a host name and make it absolute. "." (null target) stays as is.
pub fn canonical_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    if host.is_empty() || host.ends_with('.') {
        host
    } else {
        format!("{}.", host)
    }
}

/// "52 22 23 N" and "52 22 23.000 n" render alike. Omitted minutes and
/// seconds count as zero. Unparsable input is kept verbatim.
fn canonical_coordinate(value: &str) -> String {
    let mut parts: Vec<&str> = value.split_whitespace().collect();
    let Some(direction) = parts.pop() else {
        return String::new();
    };
    if parts.is_empty() || parts.len() > 3 {
        return value.trim().to_string();
    }

    let mut dms = [0.0f64; 3];
    for (slot, part) in dms.iter_mut().zip(&parts) {
        match part.parse::<f64>() {
            Ok(n) => *slot = n,
            Err(_) => return value.trim().to_string(),
        }
    }

    format!(
        "{} {} {:.3} {}",
        dms[0],
        dms[1],
        dms[2] + 0.0,
        direction.to_ascii_uppercase()
    )
}

/// "-2m", "-2" and "-2.00m" render alike
fn canonical_meters(value: &str) -> String {
    let trimmed = value.trim();
    let number = trimmed.strip_suffix(['m', 'M']).unwrap_or(trimmed);
    match number.parse::<f64>() {
        // Adding zero folds -0.00 into 0.00
        Ok(n) => format!("{:.2}m", n + 0.0),
        Err(_) => trimmed.to_string(),
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn normalize_zone(zone: &str) -> String {
    zone.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// One canonical resource record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordConfig {
    label: String,
    fqdn: String,
    ttl: u32,
    data: RecordData,
    metadata: BTreeMap<String, String>,
    origin: Option<serde_json::Value>,
}

impl RecordConfig {
    /// Create a record from a zone-relative label.
    ///
    /// An empty label or `"@"` denotes the apex and is stored as `"@"`.
    pub fn new(label: impl AsRef<str>, zone: &str, ttl: u32, data: RecordData) -> Self {
        let zone = normalize_zone(zone);
        let label = label.as_ref().trim().trim_end_matches('.').to_ascii_lowercase();

        let (label, fqdn) = if label.is_empty() || label == "@" {
            ("@".to_string(), zone)
        } else {
            let fqdn = format!("{}.{}", label, zone);
            (label, fqdn)
        };

        Self {
            label,
            fqdn,
            ttl,
            data,
            metadata: BTreeMap::new(),
            origin: None,
        }
    }

    /// Create a record from a fully qualified name inside `zone`.
    ///
    /// Fails with [`Error::InvalidInput`] when the name is outside the zone.
    pub fn from_fqdn(fqdn: &str, zone: &str, ttl: u32, data: RecordData) -> Result<Self> {
        let zone_name = normalize_zone(zone);
        let name = normalize_zone(fqdn);

        if name == zone_name {
            return Ok(Self::new("@", &zone_name, ttl, data));
        }

        match name.strip_suffix(&format!(".{}", zone_name)) {
            Some(label) if !label.is_empty() => Ok(Self::new(label, &zone_name, ttl, data)),
            _ => Err(Error::invalid_input(format!(
                "{} is not inside zone {}",
                fqdn, zone_name
            ))),
        }
    }

    /// Attach a metadata flag
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach the provider-native representation (actual records only)
    pub fn with_origin(mut self, origin: serde_json::Value) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Copy of this record with a different TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Zone-relative label, `"@"` at the apex
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Fully qualified name, without the trailing dot
    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Whether this record sits at the zone apex
    pub fn is_apex(&self) -> bool {
        self.label == "@"
    }

    /// TTL in seconds
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Type-specific payload
    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// Known record type, `None` for unknown types
    pub fn record_type(&self) -> Option<RecordType> {
        self.data.record_type()
    }

    /// Wire mnemonic of the record type
    pub fn type_name(&self) -> &str {
        self.data.type_name()
    }

    /// All metadata flags
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// A single metadata flag
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Provider-native representation, present on fetched records only
    pub fn origin(&self) -> Option<&serde_json::Value> {
        self.origin.as_ref()
    }

    /// Deserialize the origin back into the adapter's native type
    pub fn origin_as<T: DeserializeOwned>(&self) -> Result<T> {
        let origin = self
            .origin
            .as_ref()
            .ok_or_else(|| Error::fetch(format!("record {} has no provider origin", self)))?;
        serde_json::from_value(origin.clone())
            .map_err(|e| Error::fetch(format!("record {} has an unreadable origin: {}", self, e)))
    }

    /// Same type and same normalized payload
    pub fn same_payload(&self, other: &Self) -> bool {
        self.type_name().eq_ignore_ascii_case(other.type_name())
            && self.data.comparable() == other.data.comparable()
    }

    /// Structural equality: label, type, normalized payload and TTL.
    /// Metadata and origin are not compared.
    pub fn matches_structurally(&self, other: &Self) -> bool {
        self.label == other.label && self.ttl == other.ttl && self.same_payload(other)
    }
}

impl fmt::Display for RecordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ttl={}",
            self.type_name(),
            self.fqdn,
            self.data.comparable(),
            self.ttl
        )
    }
}

// Plans are dumped as JSON in preview mode; a record renders as its display
// form there.
impl Serialize for RecordConfig {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
