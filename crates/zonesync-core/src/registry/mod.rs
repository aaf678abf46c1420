//! Plugin-based provider registry
//!
//! The registry maps provider type names to factories and to the features
//! each provider type declared when it registered: its capability set, its
//! audit rules and its report policy. Lookups of an unknown provider answer
//! "unsupported" for every capability.
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! // In zonesync-provider-cloudns
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudns", Box::new(CloudnsFactory));
//! }
//! ```

use crate::audit::Auditor;
use crate::capability::{Capability, CapabilitySet};
use crate::config::ProviderConfig;
use crate::diff::ReportPolicy;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Everything a provider type declares about itself at registration
#[derive(Clone, Default)]
pub struct ProviderFeatures {
    /// Supported optional features
    pub capabilities: CapabilitySet,
    /// Provider-specific audit rules
    pub audit_rules: Auditor,
    /// Classifies non-authoritative differences, if the provider has any
    pub report_policy: Option<Arc<dyn ReportPolicy>>,
}

impl ProviderFeatures {
    /// Features with a capability set and nothing else
    pub fn with_capabilities(capabilities: CapabilitySet) -> Self {
        Self {
            capabilities,
            ..Default::default()
        }
    }

    /// The provider's own rules followed by the capability gate rules
    pub fn auditor(&self) -> Auditor {
        let mut auditor = self.audit_rules.clone();
        auditor.extend(&Auditor::capability_rules(self.capabilities));
        auditor
    }
}

impl fmt::Debug for ProviderFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderFeatures")
            .field("capabilities", &self.capabilities)
            .field("audit_rules", &self.audit_rules)
            .field("report_policy", &self.report_policy.is_some())
            .finish()
    }
}

/// Provider registry for plugin-based DNS provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,

    /// Features declared by each provider type, read once at registration
    features: RwLock<HashMap<String, ProviderFeatures>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "cloudns", "memory")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let name = name.into();
        let features = factory.features();
        self.features.write().unwrap().insert(name.clone(), features);
        self.providers.write().unwrap().insert(name, factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap();

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Declared features of a provider type, `None` when not registered
    pub fn features(&self, name: &str) -> Option<ProviderFeatures> {
        self.features.read().unwrap().get(name).cloned()
    }

    /// Capability set of a provider type; empty when not registered
    pub fn capabilities(&self, name: &str) -> CapabilitySet {
        self.features
            .read()
            .unwrap()
            .get(name)
            .map(|f| f.capabilities)
            .unwrap_or_default()
    }

    /// Whether a provider type declared a capability
    pub fn has_capability(&self, name: &str, capability: Capability) -> bool {
        self.capabilities(name).contains(capability)
    }

    /// List all registered provider types, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap();
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap();
        providers.contains_key(name)
    }
}
