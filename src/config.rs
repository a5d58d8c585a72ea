use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// State backend configuration
    pub state: StateConfig,

    /// General orchestrator options
    #[serde(default)]
    pub options: OptionsConfig,

    /// Per-incident reminder intervals
    #[serde(default)]
    pub reminders: RemindersConfig,

    /// Status/severity/role catalogs
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Integration adapter configuration
    #[serde(default)]
    pub integrations: IntegrationsConfig,

    /// Notification gateway configuration
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/local.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: INC_)
            .add_source(
                config::Environment::with_prefix("INC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// State backend type
    #[serde(default)]
    pub backend: StateBackend,

    /// Path for the embedded database
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Prefix for incident slugs and channel names
    #[serde(default = "default_slug_prefix")]
    pub slug_prefix: String,

    /// Channel receiving digest announcements for every incident
    #[serde(default = "default_digest_channel")]
    pub digest_channel: String,

    /// Whether pinned images are stored on the timeline
    #[serde(default = "default_true")]
    pub enable_pinned_images: bool,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            slug_prefix: default_slug_prefix(),
            digest_channel: default_digest_channel(),
            enable_pinned_images: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    /// Interval for the communications reminder; 0 disables it
    #[serde(default = "default_comms_reminder_minutes")]
    pub comms_reminder_minutes: u64,

    /// Interval for the unclaimed-role watcher; 0 disables it
    #[serde(default = "default_role_watcher_minutes")]
    pub role_watcher_minutes: u64,

    /// Interval the communications reminder moves to when snoozed
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u64,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            comms_reminder_minutes: default_comms_reminder_minutes(),
            role_watcher_minutes: default_role_watcher_minutes(),
            snooze_minutes: default_snooze_minutes(),
        }
    }
}

/// Configured status/severity/role catalogs. The sets are data, not compiled
/// enums: deployments define their own lifecycle vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LifecycleConfig {
    #[serde(default)]
    pub statuses: Vec<StatusDefinition>,

    #[serde(default)]
    pub severities: Vec<SeverityDefinition>,

    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDefinition {
    pub name: String,

    /// Exactly one status must be flagged initial
    #[serde(default)]
    pub initial: bool,

    /// Exactly one status must be flagged final
    #[serde(default, rename = "final")]
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub is_lead: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    /// Upper bound on each adapter call during fan-out (seconds)
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,

    /// Generic webhook ticketing adapter
    pub ticketing: Option<WebhookEndpointConfig>,

    /// Generic webhook paging adapter
    pub paging: Option<WebhookEndpointConfig>,

    /// Generic webhook document-generator adapter
    pub documents: Option<WebhookEndpointConfig>,

    /// Generic webhook status-page adapter
    pub status_page: Option<WebhookEndpointConfig>,
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: default_adapter_timeout(),
            ticketing: None,
            paging: None,
            documents: None,
            status_page: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpointConfig {
    #[serde(default)]
    pub enabled: bool,

    pub url: String,

    #[serde(default = "default_adapter_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Gateway backend
    #[serde(default)]
    pub backend: NotificationBackend,

    /// Env var holding the webhook URL for the webhook backend
    #[serde(default = "default_webhook_url_env")]
    pub webhook_url_env: String,

    /// Outbound notification timeout (seconds)
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            backend: NotificationBackend::default(),
            webhook_url_env: default_webhook_url_env(),
            timeout_secs: default_notify_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationBackend {
    #[default]
    Memory,
    Webhook,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_slug_prefix() -> String {
    "inc".to_string()
}

fn default_digest_channel() -> String {
    "incidents".to_string()
}

fn default_comms_reminder_minutes() -> u64 {
    30
}

fn default_role_watcher_minutes() -> u64 {
    10
}

fn default_snooze_minutes() -> u64 {
    60
}

fn default_adapter_timeout() -> u64 {
    10
}

fn default_webhook_url_env() -> String {
    "NOTIFY_WEBHOOK_URL".to_string()
}

fn default_notify_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_http_port(), 8080);
        assert_eq!(default_slug_prefix(), "inc");
        assert_eq!(default_comms_reminder_minutes(), 30);
        assert_eq!(default_role_watcher_minutes(), 10);
        assert!(default_true());
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.state.backend, StateBackend::Sled);
        assert_eq!(config.lifecycle.statuses.len(), 4);
        assert_eq!(config.lifecycle.severities.len(), 4);
        assert_eq!(config.lifecycle.roles.len(), 4);
        assert!(config.lifecycle.statuses[0].initial);
        assert!(config.lifecycle.statuses[3].is_final);
        assert!(config
            .lifecycle
            .roles
            .iter()
            .any(|r| r.name == "incident_commander" && r.is_lead));
    }

    #[test]
    fn test_state_backend_default() {
        assert_eq!(StateBackend::default(), StateBackend::Sled);
        assert_eq!(NotificationBackend::default(), NotificationBackend::Memory);
    }
}
