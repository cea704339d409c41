// =============================================================================
// adapters/mod.rs — THE CARRIER BENCH
// =============================================================================
//
// A carrier adapter is a black box: hand it a tracking value and a
// cancellation token, and it eventually comes back with a result, nothing,
// or an error. How it gets there (scraping, an API, a headless browser,
// a human solving a CAPTCHA) is none of the orchestrator's business.
//
// Adapters live in one of two tiers. Primary adapters race each other
// first. Deferred adapters (the ones that need a human to click on
// traffic lights) only get a turn if every primary adapter came up empty.
//
// Registration is explicit: build an `AdapterRegistry`, push adapters into
// it, hand it to the orchestrator. No import-time magic.
// =============================================================================

pub mod http_json;

#[cfg(test)]
pub mod testing;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::AdapterError;
use crate::models::TrackingResult;

/// Priority grouping for the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Primary,
    /// Needs a blocking user interaction; only runs once primary is exhausted.
    Deferred,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Primary => write!(f, "primary"),
            Tier::Deferred => write!(f, "deferred"),
        }
    }
}

/// The contract every carrier source implements.
///
/// `track` must settle eventually, even if `cancel` fires mid-flight.
/// "Not found" is `Ok(None)`, not an error; errors are for transport and
/// parse failures.
#[async_trait]
pub trait CarrierAdapter: Send + Sync {
    /// Stable unique id, e.g. `"msk"`.
    fn id(&self) -> &str;

    /// Human name shown in progress output, e.g. `"Maersk"`.
    fn display_name(&self) -> &str;

    fn tier(&self) -> Tier {
        Tier::Primary
    }

    async fn track(
        &self,
        value: &str,
        cancel: CancellationToken,
    ) -> Result<Option<TrackingResult>, AdapterError>;
}

/// Ordered list of adapters. Order is only used for progress reporting;
/// within a tier every adapter starts at the same time.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn CarrierAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from whatever the environment declared.
    pub fn from_config(config: &Config) -> Result<Self, AdapterError> {
        let mut registry = Self::new();
        for def in &config.http_adapters {
            let adapter = http_json::HttpJsonAdapter::new(def.clone(), config.http_timeout)?;
            registry.register(Arc::new(adapter));
        }
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn CarrierAdapter>) -> &mut Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with(mut self, adapter: Arc<dyn CarrierAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Adapters in `tier`, in registration order.
    pub fn tier(&self, tier: Tier) -> Vec<Arc<dyn CarrierAdapter>> {
        self.adapters
            .iter()
            .filter(|a| a.tier() == tier)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.adapters.iter().map(|a| format!("{} ({})", a.id(), a.tier())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedAdapter;
    use super::*;

    #[test]
    fn test_registry_partitions_by_tier() {
        let registry = AdapterRegistry::new()
            .with(ScriptedAdapter::nothing("a").shared())
            .with(ScriptedAdapter::nothing("captcha").deferred().shared())
            .with(ScriptedAdapter::nothing("b").shared());

        let primary: Vec<String> = registry
            .tier(Tier::Primary)
            .iter()
            .map(|a| a.id().to_string())
            .collect();
        assert_eq!(primary, vec!["a", "b"]);
        assert_eq!(registry.tier(Tier::Deferred).len(), 1);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_registry_from_config() {
        let mut config = Config::default();
        config.http_adapters = crate::config::parse_adapter_list(
            "msk|Maersk|http://127.0.0.1:1/{value};one|ONE|http://127.0.0.1:1/{value}|deferred",
        );
        let registry = AdapterRegistry::from_config(&config).unwrap();
        assert_eq!(registry.tier(Tier::Primary).len(), 1);
        assert_eq!(registry.tier(Tier::Deferred)[0].display_name(), "ONE");
    }
}
