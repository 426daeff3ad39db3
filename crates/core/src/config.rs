use serde::Deserialize;

use crate::types::DestinationId;

/// Root application configuration. Loaded from an optional
/// `storefront-tracking.toml` and environment variables with the prefix
/// `STOREFRONT_TRACKING__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub forwarder: ForwarderConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Per-store tracking configuration, consumed once by `Tracker::init`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub destinations: DestinationsConfig,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_server_side_enabled")]
    pub server_side_enabled: bool,
    #[serde(default = "default_store_slug")]
    pub store_slug: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestinationsConfig {
    #[serde(default)]
    pub meta: DestinationConfig,
    #[serde(default)]
    pub tiktok: DestinationConfig,
    #[serde(default)]
    pub google_analytics: DestinationConfig,
    #[serde(default)]
    pub google_tag_manager: DestinationConfig,
}

impl DestinationsConfig {
    pub fn get(&self, destination: DestinationId) -> &DestinationConfig {
        match destination {
            DestinationId::Meta => &self.meta,
            DestinationId::TikTok => &self.tiktok,
            DestinationId::GoogleAnalytics => &self.google_analytics,
            DestinationId::GoogleTagManager => &self.google_tag_manager,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = DestinationId> + '_ {
        DestinationId::ALL
            .into_iter()
            .filter(|id| self.get(*id).enabled)
    }
}

/// One destination's switch and credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Pixel / measurement / container identifier.
    #[serde(default)]
    pub id: String,
    /// Conversions API token. Only the server endpoint uses it.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl DestinationConfig {
    pub fn enabled(id: impl Into<String>) -> Self {
        Self {
            enabled: true,
            id: id.into(),
            access_token: None,
        }
    }
}

// ─── Forwarder ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ForwarderConfig {
    /// Origin of the first-party API, e.g. `https://shop.example.com`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_forwarder_timeout_ms")]
    pub timeout_ms: u64,
}

// ─── Scheduler ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerMode {
    /// Idle worker when a runtime is available, timer otherwise.
    #[default]
    Auto,
    Idle,
    Timer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub mode: SchedulerMode,
    #[serde(default = "default_timer_delay_ms")]
    pub timer_delay_ms: u64,
    /// Calls held per destination while its script is still loading.
    #[serde(default = "default_max_buffered_calls")]
    pub max_buffered_calls: usize,
}

// Default functions
fn default_currency() -> String {
    "USD".to_string()
}
fn default_server_side_enabled() -> bool {
    true
}
fn default_store_slug() -> String {
    "default".to_string()
}
fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_forwarder_timeout_ms() -> u64 {
    5000
}
fn default_timer_delay_ms() -> u64 {
    1
}
fn default_max_buffered_calls() -> usize {
    256
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            destinations: DestinationsConfig::default(),
            currency: default_currency(),
            server_side_enabled: default_server_side_enabled(),
            store_slug: default_store_slug(),
        }
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_ms: default_forwarder_timeout_ms(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: SchedulerMode::default(),
            timer_delay_ms: default_timer_delay_ms(),
            max_buffered_calls: default_max_buffered_calls(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional config file and environment
    /// variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("storefront-tracking").required(false))
            .add_source(
                config::Environment::with_prefix("STOREFRONT_TRACKING")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
