// =============================================================================
// config.rs — THE KNOBS
// =============================================================================
//
// Every tunable lives here and every one of them can be overridden with a
// FREIGHT_TRACE_ environment variable (or a .env file, for people who have
// their life together). Defaults are what the tracking UI has always used:
// 30 minute cache, two attempts two seconds apart, two workers.
//
// Carrier sources that speak plain JSON over HTTP can be wired in through
// FREIGHT_TRACE_ADAPTERS without writing any code:
//
//   FREIGHT_TRACE_ADAPTERS="msk|Maersk|https://api.example/track/{value}|primary;
//                           cosco|COSCO|https://cosco.example/q?no={value}|deferred"
// =============================================================================

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::adapters::Tier;
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // LOOKUP CACHE
    // =========================================================================
    /// How long a successful lookup stays good. Default: 30 minutes.
    pub cache_ttl: Duration,

    /// Upper bound on distinct values remembered at once.
    pub cache_capacity: usize,

    // =========================================================================
    // SEARCH SESSION
    // =========================================================================
    /// Attempts per value before we give up. Default: 2.
    pub max_attempts: u32,

    /// Fixed wait between attempts. Default: 2 seconds.
    pub retry_backoff: Duration,

    /// Concurrent workers for multi-value searches. Default: 2.
    pub worker_pool_size: usize,

    // =========================================================================
    // ADAPTERS
    // =========================================================================
    /// Adapters are supposed to settle on their own. This is the backstop
    /// for the ones that don't.
    pub adapter_timeout: Duration,

    /// reqwest client timeout for HTTP-backed adapters.
    pub http_timeout: Duration,

    /// JSON-over-HTTP adapters declared in the environment.
    pub http_adapters: Vec<HttpAdapterDef>,
}

/// One `id|name|url-template|tier` entry from FREIGHT_TRACE_ADAPTERS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpAdapterDef {
    pub id: String,
    pub name: String,
    /// Must contain `{value}`.
    pub url_template: String,
    pub tier: Tier,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30 * 60),
            cache_capacity: 1_000,
            max_attempts: 2,
            retry_backoff: Duration::from_millis(2_000),
            worker_pool_size: 2,
            adapter_timeout: Duration::from_secs(90),
            http_timeout: Duration::from_secs(30),
            http_adapters: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        Config {
            cache_ttl: Duration::from_secs(
                env_or_default("FREIGHT_TRACE_CACHE_TTL_SECS", "1800")
                    .parse()
                    .unwrap_or(defaults.cache_ttl.as_secs()),
            ),
            cache_capacity: env_or_default("FREIGHT_TRACE_CACHE_CAPACITY", "1000")
                .parse()
                .unwrap_or(defaults.cache_capacity),

            max_attempts: env_or_default("FREIGHT_TRACE_MAX_ATTEMPTS", "2")
                .parse::<u32>()
                .map(|n| n.max(1))
                .unwrap_or(defaults.max_attempts),
            retry_backoff: Duration::from_millis(
                env_or_default("FREIGHT_TRACE_RETRY_BACKOFF_MS", "2000")
                    .parse()
                    .unwrap_or(2_000),
            ),
            worker_pool_size: env_or_default("FREIGHT_TRACE_WORKER_POOL_SIZE", "2")
                .parse::<usize>()
                .map(|n| n.max(1))
                .unwrap_or(defaults.worker_pool_size),

            adapter_timeout: Duration::from_secs(
                env_or_default("FREIGHT_TRACE_ADAPTER_TIMEOUT_SECS", "90")
                    .parse()
                    .unwrap_or(90),
            ),
            http_timeout: Duration::from_secs(
                env_or_default("FREIGHT_TRACE_HTTP_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            http_adapters: parse_adapter_list(&env_or_default("FREIGHT_TRACE_ADAPTERS", "")),
        }
    }
}

/// Parse the `;`-separated adapter list. Bad entries are logged and
/// skipped; one typo should not take every other carrier down with it.
pub fn parse_adapter_list(raw: &str) -> Vec<HttpAdapterDef> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match parse_adapter_def(entry) {
            Ok(def) => Some(def),
            Err(e) => {
                warn!(error = %e, "Skipping adapter definition");
                None
            }
        })
        .collect()
}

fn parse_adapter_def(entry: &str) -> Result<HttpAdapterDef, ConfigError> {
    let parts: Vec<&str> = entry.split('|').map(str::trim).collect();
    let (id, name, url_template, tier) = match parts.as_slice() {
        [id, name, url] => (*id, *name, *url, "primary"),
        [id, name, url, tier] => (*id, *name, *url, *tier),
        _ => return Err(ConfigError::MalformedAdapter(entry.to_string())),
    };

    if id.is_empty() || name.is_empty() || url_template.is_empty() {
        return Err(ConfigError::MalformedAdapter(entry.to_string()));
    }
    if !url_template.contains("{value}") {
        return Err(ConfigError::MissingPlaceholder { id: id.to_string() });
    }

    let tier = match tier.to_ascii_lowercase().as_str() {
        "" | "primary" => Tier::Primary,
        "deferred" => Tier::Deferred,
        other => {
            return Err(ConfigError::UnknownTier {
                id: id.to_string(),
                tier: other.to_string(),
            })
        }
    };

    Ok(HttpAdapterDef {
        id: id.to_string(),
        name: name.to_string(),
        url_template: url_template.to_string(),
        tier,
    })
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
