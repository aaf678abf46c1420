// # ClouDNS DNS Provider
//
// This crate provides a ClouDNS implementation of the zonesync `DnsProvider`
// interface.
//
// ## What the adapter owns
//
// - Talking to the ClouDNS HTTP API and parsing its answers
// - Translating between native records and canonical `RecordConfig`s
// - Declaring the ClouDNS capability set and audit rules
//
// ## What it does not own
//
// - Retries, ordering, rate limiting and cancellation (owned by the engine)
// - Caching of zone state between runs
//
// ## Security Requirements
//
// - The auth password NEVER appears in logs or `Debug` output
// - The provider fails at construction when credentials are incomplete
//
// ## API Reference
//
// Every endpoint lives under `https://api.cloudns.net/dns/` and takes
// `auth-id` (or `sub-auth-id`) and `auth-password` as query parameters:
//
// - List records: `records.json?domain-name=...`
// - Allowed TTLs: `get-available-ttl.json?domain-name=...`
// - Add / modify / delete: `add-record.json`, `mod-record.json`, `delete-record.json`
// - DNSSEC: `get-dnssec-ds-records.json`, `activate-dnssec.json`, `deactivate-dnssec.json`
//
// Failures are reported as `{"status": "Failed", "statusDescription": "..."}`,
// often with HTTP 200.

mod native;

pub use native::NativeRecord;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use zonesync_core::audit::{Auditor, rules};
use zonesync_core::capability::{Capability, CapabilitySet, TtlPolicy};
use zonesync_core::config::ProviderConfig;
use zonesync_core::record::RecordConfig;
use zonesync_core::registry::{ProviderFeatures, ProviderRegistry};
use zonesync_core::traits::{DnsProvider, DnsProviderFactory};
use zonesync_core::{Error, Result};

/// ClouDNS API base URL
const CLOUDNS_API_BASE: &str = "https://api.cloudns.net/dns";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Status description ClouDNS returns when asked for DS records of an unsigned zone
const DNSSEC_INACTIVE: &str = "not active";

/// Which ClouDNS user the requests authenticate as
#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthUser {
    /// Main account (`auth-id`)
    Main(String),
    /// Sub-user (`sub-auth-id`)
    Sub(String),
}

impl AuthUser {
    fn param(&self) -> (&'static str, &str) {
        match self {
            AuthUser::Main(id) => ("auth-id", id),
            AuthUser::Sub(id) => ("sub-auth-id", id),
        }
    }
}

/// ClouDNS DNS provider
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the auth password.
pub struct CloudnsProvider {
    /// Account or sub-user the requests run as
    user: AuthUser,

    /// API password
    /// ⚠️ NEVER log this value
    auth_password: String,

    /// API base URL, without trailing slash
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for CloudnsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudnsProvider")
            .field("user", &self.user)
            .field("auth_password", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudnsProvider {
    /// Create a new ClouDNS provider
    ///
    /// # Parameters
    ///
    /// - `auth_id`: Main account id
    /// - `sub_auth_id`: Sub-user id, preferred over `auth_id` when both are set
    /// - `auth_password`: API password
    /// - `base_url`: API base URL override (tests, proxies)
    ///
    /// # Returns
    ///
    /// - `Ok(CloudnsProvider)`: Ready to use
    /// - `Err(Error::Config)`: Credentials are incomplete
    pub fn new(
        auth_id: Option<String>,
        sub_auth_id: Option<String>,
        auth_password: impl Into<String>,
        base_url: Option<String>,
    ) -> Result<Self> {
        let auth_password = auth_password.into();
        if auth_password.is_empty() {
            return Err(Error::config("ClouDNS auth_password cannot be empty"));
        }

        let user = match (sub_auth_id, auth_id) {
            (Some(sub), _) if !sub.is_empty() => AuthUser::Sub(sub),
            (_, Some(id)) if !id.is_empty() => AuthUser::Main(id),
            _ => return Err(Error::config("ClouDNS needs auth_id or sub_auth_id")),
        };

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = base_url
            .unwrap_or_else(|| CLOUDNS_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            user,
            auth_password,
            base_url,
            client,
        })
    }

    /// Call one API endpoint
    ///
    /// # Returns
    ///
    /// - `Ok(Value)`: The parsed JSON body
    /// - `Err(Error)`: Transport failure, HTTP error status, or a `"Failed"` API status
    async fn call(&self, method: Method, endpoint: &str, params: &[(String, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let (user_key, user_value) = self.user.param();

        tracing::debug!("ClouDNS {} {}", method, endpoint);

        let response = self
            .client
            .request(method, &url)
            .query(&[(user_key, user_value), ("auth-password", self.auth_password.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|e| Error::provider("cloudns", format!("HTTP request to {} failed: {}", endpoint, e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(match status.as_u16() {
                401 | 403 => Error::provider(
                    "cloudns",
                    format!("Authentication failed: invalid auth id or password. Status: {}", status),
                ),
                404 => Error::not_found(format!("ClouDNS endpoint not found: {}", endpoint)),
                429 => Error::provider(
                    "cloudns",
                    format!("Rate limit exceeded. Please retry later. Status: {}", status),
                ),
                500..=599 => Error::provider(
                    "cloudns",
                    format!("ClouDNS server error (transient): {} - {}", status, error_text),
                ),
                _ => Error::provider(
                    "cloudns",
                    format!("{} failed: {} - {}", endpoint, status, error_text),
                ),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::provider("cloudns", format!("Failed to parse response: {}", e.without_url())))?;

        if body.get("status").and_then(Value::as_str) == Some("Failed") {
            let description = body
                .get("statusDescription")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(Error::provider("cloudns", format!("{}: {}", endpoint, description)));
        }

        Ok(body)
    }

    fn zone_param(zone: &str) -> (String, String) {
        ("domain-name".to_string(), zone.trim_end_matches('.').to_ascii_lowercase())
    }

    fn record_id(existing: &RecordConfig) -> Result<String> {
        let native: NativeRecord = existing.origin_as()?;
        if native.id.is_empty() {
            return Err(Error::invalid_input(format!("{} has no ClouDNS record id", existing)));
        }
        Ok(native.id)
    }
}

#[async_trait]
impl DnsProvider for CloudnsProvider {
    fn provider_name(&self) -> &'static str {
        "cloudns"
    }

    /// One bucket per ClouDNS user, whatever the number of configured accounts
    fn credential_key(&self) -> String {
        let (kind, id) = self.user.param();
        format!("cloudns:{}:{}", kind, id)
    }

    async fn get_zone_records(&self, zone: &str) -> Result<Vec<RecordConfig>> {
        let body = self
            .call(Method::GET, "records.json", &[Self::zone_param(zone)])
            .await
            .map_err(|e| Error::fetch(format!("ClouDNS records of {}: {}", zone, e)))?;

        let records = native::parse_record_list(body)?
            .iter()
            .map(|native| native.to_record(zone))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("ClouDNS returned {} record(s) for {}", records.len(), zone);
        Ok(records)
    }

    async fn ttl_policy(&self, zone: &str) -> Result<TtlPolicy> {
        let body = self
            .call(Method::GET, "get-available-ttl.json", &[Self::zone_param(zone)])
            .await?;

        let ttls: Vec<u32> = serde_json::from_value(body)
            .map_err(|e| Error::fetch(format!("ClouDNS TTL list of {}: {}", zone, e)))?;

        if ttls.is_empty() {
            return Ok(TtlPolicy::Any);
        }
        Ok(TtlPolicy::allowed(ttls))
    }

    fn encode_record(&self, zone: &str, record: &RecordConfig) -> Result<Value> {
        native::encode(zone, record)
    }

    async fn create_record(&self, zone: &str, request: &Value) -> Result<()> {
        let mut params = vec![Self::zone_param(zone)];
        params.extend(native::request_params(request)?);

        self.call(Method::POST, "add-record.json", &params).await?;
        Ok(())
    }

    async fn delete_record(&self, zone: &str, existing: &RecordConfig) -> Result<()> {
        let params = vec![
            Self::zone_param(zone),
            ("record-id".to_string(), Self::record_id(existing)?),
        ];

        self.call(Method::POST, "delete-record.json", &params).await?;
        Ok(())
    }

    async fn modify_record(&self, zone: &str, existing: &RecordConfig, request: &Value) -> Result<()> {
        let mut params = vec![
            Self::zone_param(zone),
            ("record-id".to_string(), Self::record_id(existing)?),
        ];
        // The record type of an existing record cannot change
        params.extend(
            native::request_params(request)?
                .into_iter()
                .filter(|(key, _)| key != "record-type"),
        );

        self.call(Method::POST, "mod-record.json", &params).await?;
        Ok(())
    }

    async fn dnssec_enabled(&self, zone: &str) -> Result<bool> {
        match self
            .call(Method::GET, "get-dnssec-ds-records.json", &[Self::zone_param(zone)])
            .await
        {
            Ok(_) => Ok(true),
            Err(Error::Provider { message, .. }) if message.contains(DNSSEC_INACTIVE) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn set_dnssec(&self, zone: &str, enabled: bool) -> Result<()> {
        let endpoint = if enabled {
            "activate-dnssec.json"
        } else {
            "deactivate-dnssec.json"
        };

        self.call(Method::POST, endpoint, &[Self::zone_param(zone)]).await?;
        Ok(())
    }
}

/// Capabilities ClouDNS supports; everything else is unsupported
pub fn capabilities() -> CapabilitySet {
    [
        Capability::CanAutoDnssec,
        Capability::CanConcur,
        Capability::CanGetZones,
        Capability::CanUseAlias,
        Capability::CanUseCaa,
        Capability::CanUseDname,
        Capability::CanUseDsForChildren,
        Capability::CanUseLoc,
        Capability::CanUsePtr,
        Capability::CanUseSrv,
        Capability::CanUseSshfp,
        Capability::CanUseTlsa,
    ]
    .into_iter()
    .collect()
}

/// Factory for creating ClouDNS providers
pub struct CloudnsFactory;

impl DnsProviderFactory for CloudnsFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudns {
                auth_id,
                sub_auth_id,
                auth_password,
                base_url,
            } => {
                let provider = CloudnsProvider::new(
                    auth_id.clone(),
                    sub_auth_id.clone(),
                    auth_password.clone(),
                    base_url.clone(),
                )?;
                tracing::debug!("Created {:?}", provider);
                Ok(Box::new(provider))
            }
            _ => Err(Error::config("Invalid config for ClouDNS provider")),
        }
    }

    fn features(&self) -> ProviderFeatures {
        ProviderFeatures {
            capabilities: capabilities(),
            audit_rules: Auditor::new()
                .with_rule("MX", rules::mx_null)
                .with_rule("TXT", rules::txt_is_empty),
            report_policy: None,
        }
    }
}

/// Register the ClouDNS provider with a registry
///
/// # Example
///
/// ```rust
/// use zonesync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// zonesync_provider_cloudns::register(&registry);
/// assert!(registry.has_provider("cloudns"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider("cloudns", Box::new(CloudnsFactory));
}
