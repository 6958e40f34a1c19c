//! Configuration for the orchestration core.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Orchestration behaviour knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Minimum spacing between two reminders to the same signatory.
    #[serde(default = "default_reminder_cooldown")]
    pub reminder_cooldown_secs: i64,

    /// Filename used when the caller does not provide one.
    #[serde(default = "default_filename")]
    pub default_filename: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reminder_cooldown_secs: default_reminder_cooldown(),
            default_filename: default_filename(),
        }
    }
}

impl OrchestratorConfig {
    pub fn reminder_cooldown(&self) -> Duration {
        Duration::seconds(self.reminder_cooldown_secs.max(0))
    }
}

/// Connection settings for the external signing provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API root, e.g. `https://api.docuseal.example/`
    pub base_url: String,

    /// Static API key sent on every call.
    #[serde(default)]
    pub api_key: String,

    /// Per-attempt timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Whether the provider honours an `Idempotency-Key` header on create calls.
    #[serde(default)]
    pub supports_idempotency_key: bool,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            supports_idempotency_key: false,
        }
    }
}

// Default value helpers
fn default_reminder_cooldown() -> i64 {
    300
}

fn default_filename() -> String {
    "document.pdf".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    250
}

fn default_max_delay() -> u64 {
    5_000
}
