//! Configuration types for zonesync
//!
//! This module defines all configuration structures used throughout the crate.
//! A configuration names the provider accounts, the zones with their desired
//! records, and the engine settings.
//!
//! ```json
//! {
//!   "providers": {
//!     "main": { "type": "cloudns", "auth_id": "1234", "auth_password": "secret" }
//!   },
//!   "zones": [
//!     {
//!       "name": "example.com",
//!       "provider": "main",
//!       "records": [
//!         { "name": "www", "type": "A", "address": "192.0.2.1" },
//!         { "name": "@", "type": "MX", "preference": 10, "exchange": "mx.example.com." }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::error::{Error, Result};
use crate::record::{RecordConfig, RecordData};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// TTL of records that set none, unless the zone overrides it
pub const DEFAULT_TTL: u32 = 300;

/// Main zonesync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZonesyncConfig {
    /// Provider accounts, keyed by a name zones refer to
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Zones to reconcile
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ZonesyncConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.zones.is_empty() {
            return Err(Error::config("No zones configured"));
        }

        for (name, provider) in &self.providers {
            provider
                .validate()
                .map_err(|e| Error::config(format!("provider {}: {}", name, e)))?;
        }

        let mut seen = HashSet::new();
        for zone in &self.zones {
            zone.validate()?;
            if !self.providers.contains_key(&zone.provider) {
                return Err(Error::config(format!(
                    "Zone {} refers to unknown provider {}",
                    zone.name, zone.provider
                )));
            }
            if !seen.insert(zone.name.trim_end_matches('.').to_ascii_lowercase()) {
                return Err(Error::config(format!("Zone {} is configured twice", zone.name)));
            }
        }

        self.engine.validate()
    }

    /// Provider configuration of a zone
    pub fn provider_for(&self, zone: &ZoneConfig) -> Result<&ProviderConfig> {
        self.providers.get(&zone.provider).ok_or_else(|| {
            Error::config(format!(
                "Zone {} refers to unknown provider {}",
                zone.name, zone.provider
            ))
        })
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// ClouDNS provider
    Cloudns {
        /// Main account auth-id
        #[serde(default)]
        auth_id: Option<String>,
        /// Sub-user auth-id, used instead of `auth_id` when set
        #[serde(default)]
        sub_auth_id: Option<String>,
        /// API password
        auth_password: String,
        /// API base URL override
        #[serde(default)]
        base_url: Option<String>,
    },

    /// In-process provider, state lost on exit
    Memory {
        /// Restrict TTLs to these values
        #[serde(default)]
        allowed_ttls: Option<Vec<u32>>,
        /// Records present before the first run, keyed by zone
        #[serde(default)]
        seed: BTreeMap<String, Vec<RecordSpec>>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            ProviderConfig::Cloudns {
                auth_id,
                sub_auth_id,
                auth_password,
                ..
            } => {
                if auth_id.is_none() && sub_auth_id.is_none() {
                    return Err(Error::config("ClouDNS needs auth_id or sub_auth_id"));
                }
                if auth_password.is_empty() {
                    return Err(Error::config("ClouDNS auth_password cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Memory { allowed_ttls, .. } => {
                if allowed_ttls.as_ref().is_some_and(|ttls| ttls.is_empty()) {
                    return Err(Error::config("Memory allowed_ttls cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(Error::config("Custom provider factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(Error::config("Custom provider config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudns { .. } => "cloudns",
            ProviderConfig::Memory { .. } => "memory",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// One zone and its desired records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone name, e.g. "example.com"
    pub name: String,

    /// Key into [`ZonesyncConfig::providers`]
    pub provider: String,

    /// TTL for records that do not set one
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,

    /// Desired DNSSEC state; unset leaves DNSSEC alone
    #[serde(default)]
    pub auto_dnssec: Option<bool>,

    /// Desired records
    #[serde(default)]
    pub records: Vec<RecordSpec>,
}

impl ZoneConfig {
    /// Create a zone without records
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            default_ttl: default_ttl(),
            auto_dnssec: None,
            records: Vec::new(),
        }
    }

    /// Add a desired record
    pub fn with_record(mut self, record: RecordSpec) -> Self {
        self.records.push(record);
        self
    }

    /// Set the desired DNSSEC state
    pub fn with_auto_dnssec(mut self, enabled: bool) -> Self {
        self.auto_dnssec = Some(enabled);
        self
    }

    /// Validate the zone configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().trim_end_matches('.').is_empty() {
            return Err(Error::config("Zone name cannot be empty"));
        }
        if self.provider.is_empty() {
            return Err(Error::config(format!("Zone {} has no provider", self.name)));
        }
        Ok(())
    }

    /// The desired record set in canonical form
    pub fn desired_records(&self) -> Vec<RecordConfig> {
        self.records
            .iter()
            .map(|spec| spec.to_record(&self.name, self.default_ttl))
            .collect()
    }
}

/// One desired record as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSpec {
    /// Label relative to the zone, "@" for the apex
    #[serde(default = "default_label")]
    pub name: String,

    /// TTL; the zone's default when unset
    #[serde(default)]
    pub ttl: Option<u32>,

    /// Type tag and payload fields
    #[serde(flatten)]
    pub data: RecordData,

    /// Provider hints
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RecordSpec {
    /// Create a record spec
    pub fn new(name: impl Into<String>, data: RecordData) -> Self {
        Self {
            name: name.into(),
            ttl: None,
            data,
            metadata: BTreeMap::new(),
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Convert into a canonical record of `zone`
    pub fn to_record(&self, zone: &str, default_ttl: u32) -> RecordConfig {
        self.metadata.iter().fold(
            RecordConfig::new(&self.name, zone, self.ttl.unwrap_or(default_ttl), self.data.clone()),
            |record, (key, value)| record.with_metadata(key, value),
        )
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Zones reconciled at the same time
    #[serde(default = "default_max_concurrent_zones")]
    pub max_concurrent_zones: usize,

    /// Upper bound for one zone's execute phase (in seconds), 0 for none
    #[serde(default)]
    pub execute_timeout_secs: u64,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// API calls per second per provider credential, 0 for unlimited
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,

    /// Calls allowed in a burst per provider credential
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,

    /// Compute and print plans without executing them
    #[serde(default)]
    pub dry_run: bool,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_zones == 0 {
            return Err(Error::config("max_concurrent_zones must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_zones: default_max_concurrent_zones(),
            execute_timeout_secs: 0,
            event_channel_capacity: default_event_channel_capacity(),
            rate_limit_per_sec: default_rate_limit_per_sec(),
            rate_limit_burst: default_rate_limit_burst(),
            dry_run: false,
        }
    }
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

fn default_label() -> String {
    "@".to_string()
}

fn default_max_concurrent_zones() -> usize {
    4
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_rate_limit_per_sec() -> u32 {
    10
}

fn default_rate_limit_burst() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "providers": {
            "main": { "type": "cloudns", "auth_id": "1234", "auth_password": "secret" },
            "lab": { "type": "memory", "allowed_ttls": [60, 300, 3600] }
        },
        "zones": [
            {
                "name": "example.com",
                "provider": "main",
                "auto_dnssec": true,
                "records": [
                    { "name": "www", "type": "A", "address": "192.0.2.1" },
                    { "type": "MX", "preference": 10, "exchange": "mx.example.com.", "ttl": 3600 },
                    { "name": "_sip._tcp", "type": "SRV", "priority": 10, "weight": 5,
                      "port": 5060, "target": "sip.example.com.", "metadata": { "note": "pbx" } }
                ]
            },
            { "name": "example.net", "provider": "lab" }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let config: ZonesyncConfig = serde_json::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.providers["main"].type_name(), "cloudns");
        assert_eq!(config.engine.max_concurrent_zones, 4);
        assert_eq!(config.engine.rate_limit_per_sec, 10);

        let zone = &config.zones[0];
        assert_eq!(zone.auto_dnssec, Some(true));

        let records = zone.desired_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].fqdn(), "www.example.com");
        assert_eq!(records[0].ttl(), 300);
        assert!(records[1].is_apex());
        assert_eq!(records[1].ttl(), 3600);
        assert_eq!(records[2].metadata_value("note"), Some("pbx"));
        assert_eq!(records[2].data().target(), Some("sip.example.com."));
    }

    #[test]
    fn test_validate_rejects_unknown_provider_reference() {
        let mut config = ZonesyncConfig::new();
        config.zones.push(ZoneConfig::new("example.com", "missing"));
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_zones() {
        let mut config = ZonesyncConfig::new();
        config.providers.insert(
            "lab".to_string(),
            ProviderConfig::Memory {
                allowed_ttls: None,
                seed: BTreeMap::new(),
            },
        );
        config.zones.push(ZoneConfig::new("example.com", "lab"));
        config.zones.push(ZoneConfig::new("Example.com.", "lab"));

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn test_validate_rejects_empty_zone_list() {
        assert!(ZonesyncConfig::new().validate().is_err());
    }

    #[test]
    fn test_cloudns_needs_credentials() {
        let config = ProviderConfig::Cloudns {
            auth_id: None,
            sub_auth_id: None,
            auth_password: "secret".to_string(),
            base_url: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = ZonesyncConfig::from_file(file.path()).unwrap();
        assert_eq!(config.zones.len(), 2);

        assert!(matches!(
            ZonesyncConfig::from_file("/nonexistent/zonesync.json"),
            Err(Error::Io(_))
        ));
    }
}
