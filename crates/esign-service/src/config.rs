//! Configuration for esignd

use esign_core::{OrchestratorConfig, ProviderConfig, StorageConfig};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Which provider implementation backs the service
    #[serde(default)]
    pub provider_kind: ProviderKind,

    /// Provider connection settings, used when `provider_kind = "http"`
    #[serde(default = "default_provider")]
    pub provider: ProviderConfig,

    /// Webhook authentication and self-registration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Directory for signed PDFs. Empty keeps them in memory.
    #[serde(default)]
    pub vault_dir: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            provider_kind: ProviderKind::default(),
            provider: default_provider(),
            webhook: WebhookConfig::default(),
            storage: StorageConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            vault_dir: String::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Maximum request body size in bytes. Documents arrive base64 encoded.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Real provider over HTTP
    #[default]
    Http,
    /// In-process fixture; signatures are only simulated. Must be chosen explicitly.
    Fixture,
}

impl ProviderKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Fixture => "fixture",
        }
    }
}

/// Webhook configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared HMAC secret configured on the provider side
    #[serde(default)]
    pub secret: String,

    /// Public URL of `/webhooks/signing`. When set, the service registers it at startup.
    #[serde(default)]
    pub callback_url: String,
}

impl WebhookConfig {
    pub fn callback_url(&self) -> Option<&str> {
        let url = self.callback_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8092))
}

fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_provider() -> ProviderConfig {
    ProviderConfig::new("http://127.0.0.1:3000/api", "")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Load configuration from defaults, an optional file and `ESIGN_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `ESIGN_WEBHOOK__SECRET`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ServiceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ESIGN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Rejects combinations that cannot serve traffic.
    pub fn validate(&self) -> Result<(), String> {
        if self.webhook.secret.trim().is_empty() {
            return Err("webhook.secret must be set".to_string());
        }
        if self.provider_kind == ProviderKind::Http {
            if self.provider.base_url.trim().is_empty() {
                return Err("provider.base_url must be set for provider_kind = http".to_string());
            }
            if self.provider.api_key.trim().is_empty() {
                return Err("provider.api_key must be set for provider_kind = http".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8092);
        assert_eq!(config.provider_kind, ProviderKind::Http);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(config.webhook.callback_url().is_none());
    }

    #[test]
    fn test_defaults_survive_config_roundtrip() {
        let config = ServiceConfig::load(None).unwrap();
        assert_eq!(config.orchestrator.reminder_cooldown_secs, 300);
        assert_eq!(config.provider.max_retries, 3);
        assert_eq!(config.storage.label(), "memory");
    }

    #[test]
    fn test_validate_requires_secret() {
        let mut config = ServiceConfig::default();
        config.provider.api_key = "key".to_string();
        assert!(config.validate().is_err());

        config.webhook.secret = "whsec".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fixture_is_never_the_fallback() {
        let mut config = ServiceConfig::default();
        config.webhook.secret = "whsec".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("provider.api_key"), "{err}");

        config.provider_kind = ProviderKind::Fixture;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_callback_url_is_none() {
        let webhook = WebhookConfig {
            secret: "s".to_string(),
            callback_url: "   ".to_string(),
        };
        assert!(webhook.callback_url().is_none());
    }
}
