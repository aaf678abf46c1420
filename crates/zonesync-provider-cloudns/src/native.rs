// # ClouDNS native records
//
// Conversion between the ClouDNS JSON record shape and the canonical
// `RecordConfig`.
//
// ## Wire quirks
//
// - Every field arrives as a string, but some API versions send numbers;
//   both are accepted.
// - Targets come back without the trailing dot.
// - The apex is an empty host, not "@".
// - DS and SSHFP share the `algorithm` field.
// - LOC is split into twelve parameters; sizes are sent without the "m"
//   suffix and "0.00" must be sent as "0".

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use zonesync_core::record::{RecordConfig, RecordData, canonical_host};
use zonesync_core::{Error, Result};

/// One record as returned by `records.json`; kept as the record origin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeRecord {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub rtype: String,
    #[serde(deserialize_with = "lenient")]
    pub host: String,
    #[serde(deserialize_with = "lenient")]
    pub record: String,
    #[serde(deserialize_with = "lenient")]
    pub ttl: String,
    #[serde(deserialize_with = "lenient")]
    pub priority: String,
    #[serde(deserialize_with = "lenient")]
    pub weight: String,
    #[serde(deserialize_with = "lenient")]
    pub port: String,
    #[serde(deserialize_with = "lenient")]
    pub caa_flag: String,
    #[serde(deserialize_with = "lenient")]
    pub caa_type: String,
    #[serde(deserialize_with = "lenient")]
    pub caa_value: String,
    #[serde(deserialize_with = "lenient")]
    pub tlsa_usage: String,
    #[serde(deserialize_with = "lenient")]
    pub tlsa_selector: String,
    #[serde(deserialize_with = "lenient")]
    pub tlsa_matching_type: String,
    #[serde(deserialize_with = "lenient")]
    pub algorithm: String,
    #[serde(deserialize_with = "lenient")]
    pub fp_type: String,
    #[serde(deserialize_with = "lenient")]
    pub key_tag: String,
    #[serde(deserialize_with = "lenient")]
    pub digest_type: String,
    #[serde(deserialize_with = "lenient")]
    pub lat_deg: String,
    #[serde(deserialize_with = "lenient")]
    pub lat_min: String,
    #[serde(deserialize_with = "lenient")]
    pub lat_sec: String,
    #[serde(deserialize_with = "lenient")]
    pub lat_dir: String,
    #[serde(deserialize_with = "lenient")]
    pub long_deg: String,
    #[serde(deserialize_with = "lenient")]
    pub long_min: String,
    #[serde(deserialize_with = "lenient")]
    pub long_sec: String,
    #[serde(deserialize_with = "lenient")]
    pub long_dir: String,
    #[serde(deserialize_with = "lenient")]
    pub altitude: String,
    #[serde(deserialize_with = "lenient")]
    pub size: String,
    #[serde(deserialize_with = "lenient")]
    pub h_precision: String,
    #[serde(deserialize_with = "lenient")]
    pub v_precision: String,
}

fn lenient<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn number<T: FromStr>(record: &NativeRecord, field: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::fetch(format!(
            "ClouDNS record {} ({} {}): invalid {} {:?}",
            record.id, record.rtype, record.host, field, value
        ))
    })
}

fn with_meters(value: &str) -> String {
    if value.ends_with('m') {
        value.to_string()
    } else {
        format!("{}m", value)
    }
}

/// Parse a `records.json` body: an object keyed by record id, or `[]` for
/// an empty zone
pub fn parse_record_list(body: Value) -> Result<Vec<NativeRecord>> {
    match body {
        Value::Object(map) => map
            .into_iter()
            .map(|(id, value)| {
                serde_json::from_value::<NativeRecord>(value)
                    .map_err(|e| Error::fetch(format!("ClouDNS record {}: {}", id, e)))
            })
            .collect(),
        Value::Array(items) if items.is_empty() => Ok(Vec::new()),
        other => Err(Error::fetch(format!("unexpected ClouDNS record list: {}", other))),
    }
}

impl NativeRecord {
    /// Canonical form of this record, with itself as origin
    pub fn to_record(&self, zone: &str) -> Result<RecordConfig> {
        let ttl: u32 = number(self, "ttl", &self.ttl)?;

        let data = match self.rtype.as_str() {
            "A" => RecordData::A {
                address: self.record.clone(),
            },
            "AAAA" => RecordData::AAAA {
                address: self.record.clone(),
            },
            "ALIAS" => RecordData::ALIAS {
                target: canonical_host(&self.record),
            },
            "CNAME" => RecordData::CNAME {
                target: canonical_host(&self.record),
            },
            "DNAME" => RecordData::DNAME {
                target: canonical_host(&self.record),
            },
            "NS" => RecordData::NS {
                target: canonical_host(&self.record),
            },
            "PTR" => RecordData::PTR {
                target: canonical_host(&self.record),
            },
            "MX" => RecordData::MX {
                preference: number(self, "priority", &self.priority)?,
                exchange: canonical_host(&self.record),
            },
            "SRV" => RecordData::SRV {
                priority: number(self, "priority", &self.priority)?,
                weight: number(self, "weight", &self.weight)?,
                port: number(self, "port", &self.port)?,
                target: canonical_host(&self.record),
            },
            "TXT" => RecordData::TXT {
                chunks: vec![self.record.clone()],
            },
            "CAA" => RecordData::CAA {
                flag: number(self, "caa_flag", &self.caa_flag)?,
                tag: self.caa_type.clone(),
                value: self.caa_value.clone(),
            },
            "TLSA" => RecordData::TLSA {
                usage: number(self, "tlsa_usage", &self.tlsa_usage)?,
                selector: number(self, "tlsa_selector", &self.tlsa_selector)?,
                matching_type: number(self, "tlsa_matching_type", &self.tlsa_matching_type)?,
                certificate: self.record.clone(),
            },
            "SSHFP" => RecordData::SSHFP {
                algorithm: number(self, "algorithm", &self.algorithm)?,
                fingerprint_type: number(self, "fp_type", &self.fp_type)?,
                fingerprint: self.record.clone(),
            },
            "DS" => RecordData::DS {
                key_tag: number(self, "key_tag", &self.key_tag)?,
                algorithm: number(self, "algorithm", &self.algorithm)?,
                digest_type: number(self, "digest_type", &self.digest_type)?,
                digest: self.record.clone(),
            },
            "LOC" => RecordData::LOC {
                latitude: format!("{} {} {} {}", self.lat_deg, self.lat_min, self.lat_sec, self.lat_dir),
                longitude: format!(
                    "{} {} {} {}",
                    self.long_deg, self.long_min, self.long_sec, self.long_dir
                ),
                altitude: with_meters(&self.altitude),
                size: with_meters(&self.size),
                horiz_precision: with_meters(&self.h_precision),
                vert_precision: with_meters(&self.v_precision),
            },
            other => RecordData::Unknown {
                rtype: other.to_string(),
                content: self.record.clone(),
            },
        };

        let origin = serde_json::to_value(self)?;
        Ok(RecordConfig::new(&self.host, zone, ttl, data).with_origin(origin))
    }
}

/// The API ignores a unit suffix and treats "0.00" as "use the default"
fn loc_param(value: &str) -> String {
    let value = value.trim().trim_end_matches('m');
    if value == "0.00" {
        "0".to_string()
    } else {
        value.to_string()
    }
}

fn loc_parts<'a>(value: &'a str, what: &str, record: &RecordConfig) -> Result<Vec<&'a str>> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 4 {
        return Err(Error::invalid_input(format!(
            "{}: LOC {} must be \"<deg> <min> <sec> <dir>\", got {:?}",
            record.fqdn(),
            what,
            value
        )));
    }
    Ok(parts)
}

/// Build the request parameters of `add-record.json` / `mod-record.json`
///
/// # Returns
///
/// - `Ok(Value)`: a JSON object of string parameters
/// - `Err(Error::Unsupported)`: the type cannot be written through the API
pub fn encode(zone: &str, record: &RecordConfig) -> Result<Value> {
    let mut req = Map::new();
    let mut set = |key: &str, value: String| {
        req.insert(key.to_string(), Value::String(value));
    };

    set("record-type", record.type_name().to_string());
    set(
        "host",
        if record.is_apex() {
            String::new()
        } else {
            record.label().to_string()
        },
    );
    set("ttl", record.ttl().to_string());

    match record.data() {
        RecordData::A { address } | RecordData::AAAA { address } => set("record", address.clone()),
        RecordData::ALIAS { target }
        | RecordData::CNAME { target }
        | RecordData::DNAME { target }
        | RecordData::PTR { target } => {
            set("record", canonical_host(target))
        }
        RecordData::NS { target } => {
            // In-zone name servers are accepted without the trailing dot only
            let target = canonical_host(target);
            let zone_suffix = format!("{}.", zone.trim_end_matches('.').to_ascii_lowercase());
            let in_zone = target == zone_suffix || target.ends_with(&format!(".{}", zone_suffix));
            set(
                "record",
                if in_zone {
                    target.trim_end_matches('.').to_string()
                } else {
                    target
                },
            );
        }
        RecordData::MX {
            preference,
            exchange,
        } => {
            set("record", canonical_host(exchange));
            set("priority", preference.to_string());
        }
        RecordData::SRV {
            priority,
            weight,
            port,
            target,
        } => {
            set("record", canonical_host(target));
            set("priority", priority.to_string());
            set("weight", weight.to_string());
            set("port", port.to_string());
        }
        RecordData::TXT { chunks } => set("record", chunks.concat()),
        RecordData::CAA { flag, tag, value } => {
            set("record", value.clone());
            set("caa_flag", flag.to_string());
            set("caa_type", tag.clone());
            set("caa_value", value.clone());
        }
        RecordData::TLSA {
            usage,
            selector,
            matching_type,
            certificate,
        } => {
            set("record", certificate.clone());
            set("tlsa_usage", usage.to_string());
            set("tlsa_selector", selector.to_string());
            set("tlsa_matching_type", matching_type.to_string());
        }
        RecordData::SSHFP {
            algorithm,
            fingerprint_type,
            fingerprint,
        } => {
            set("record", fingerprint.clone());
            set("algorithm", algorithm.to_string());
            set("fptype", fingerprint_type.to_string());
        }
        RecordData::DS {
            key_tag,
            algorithm,
            digest_type,
            digest,
        } => {
            set("record", digest.clone());
            set("key-tag", key_tag.to_string());
            set("algorithm", algorithm.to_string());
            set("digest-type", digest_type.to_string());
        }
        RecordData::LOC {
            latitude,
            longitude,
            altitude,
            size,
            horiz_precision,
            vert_precision,
        } => {
            let lat = loc_parts(latitude, "latitude", record)?;
            let long = loc_parts(longitude, "longitude", record)?;
            for (key, value) in ["lat-deg", "lat-min", "lat-sec", "lat-dir"].into_iter().zip(lat) {
                set(key, value.to_string());
            }
            for (key, value) in ["long-deg", "long-min", "long-sec", "long-dir"].into_iter().zip(long) {
                set(key, value.to_string());
            }
            set("altitude", loc_param(altitude));
            set("size", loc_param(size));
            set("h-precision", loc_param(horiz_precision));
            set("v-precision", loc_param(vert_precision));
        }
        RecordData::NAPTR { .. } | RecordData::Unknown { .. } => {
            return Err(Error::unsupported(format!(
                "ClouDNS cannot write {} records",
                record.type_name()
            )));
        }
    }

    Ok(Value::Object(req))
}

/// Flatten an encoded request into query parameters
pub fn request_params(request: &Value) -> Result<Vec<(String, String)>> {
    let map = request
        .as_object()
        .ok_or_else(|| Error::invalid_input("ClouDNS request must be a JSON object"))?;

    Ok(map
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect())
}
