use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub intercom: Option<IntercomConfig>,
    pub asana: Option<AsanaConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct IntercomConfig {
    #[serde(default)]
    pub token: String,
    /// Admin the integration writes notes as.
    pub admin_id: String,
    #[serde(default = "default_intercom_url")]
    pub api_url: String,
    /// App client secret. When set, webhook notifications are checked against
    /// `X-Hub-Signature` (HMAC-SHA1) and card requests against `X-Body-Signature`.
    pub client_secret: Option<String>,
}

fn default_intercom_url() -> String {
    "https://api.intercom.io".into()
}

#[derive(Debug, Deserialize)]
pub struct AsanaConfig {
    #[serde(default)]
    pub token: String,
    pub workspace_id: String,
    pub project_id: String,
    /// User the token belongs to; comments written by it are never relayed back.
    pub integration_user_id: Option<String>,
    #[serde(default = "default_asana_url")]
    pub api_url: String,
    /// Static secret for `X-Hook-Signature` checks. The handshake secret itself is never stored.
    pub webhook_secret: Option<String>,
}

fn default_asana_url() -> String {
    "https://app.asana.com/api/1.0".into()
}

/// How a mapped ticket attribute is written into a text field.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    #[default]
    Plain,
    DateTime,
    Date,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FieldMapEntry {
    /// Ticket attribute name.
    pub attribute: String,
    /// Task custom field name.
    pub field: String,
    #[serde(default)]
    pub format: ValueFormat,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FileAttributeEntry {
    pub attribute: String,
    /// Text field that receives the re-hosted URLs, if any.
    pub field: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_ticket_field")]
    pub ticket_field_name: String,
    #[serde(default = "default_status_field")]
    pub status_field_name: String,
    #[serde(default = "default_link_attribute")]
    pub link_attribute: String,
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    /// Status labels that also close the ticket.
    #[serde(default)]
    pub close_statuses: Vec<String>,
    /// Status labels that never close the ticket, even if their state is resolved.
    #[serde(default)]
    pub keep_open_statuses: Vec<String>,
    #[serde(default)]
    pub field_map: Vec<FieldMapEntry>,
    #[serde(default)]
    pub file_attributes: Vec<FileAttributeEntry>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ticket_field_name: default_ticket_field(),
            status_field_name: default_status_field(),
            link_attribute: default_link_attribute(),
            utc_offset_hours: default_utc_offset(),
            close_statuses: Vec::new(),
            keep_open_statuses: Vec::new(),
            field_map: Vec::new(),
            file_attributes: Vec::new(),
        }
    }
}

fn default_ticket_field() -> String {
    "Intercom Ticket ID".into()
}

fn default_status_field() -> String {
    "Status".into()
}

fn default_link_attribute() -> String {
    "Asana Task ID".into()
}

fn default_utc_offset() -> i32 {
    6
}

fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DESKBRIDGE_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".deskbridge")
        .join("config.toml")
}

pub fn load_config() -> Result<AppConfig> {
    let path = config_path();
    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        AppConfig::default()
    };
    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| "Failed to parse config.toml")?;
    Ok(config)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Secrets and listen address may come from the environment instead of the file.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Some(host) = env_value("DESKBRIDGE_HOST") {
        config.server.host = host;
    }
    if let Some(port) = env_value("DESKBRIDGE_PORT").and_then(|p| p.parse().ok()) {
        config.server.port = port;
    }
    if let Some(intercom) = config.intercom.as_mut() {
        if let Some(token) = env_value("INTERCOM_TOKEN") {
            intercom.token = token;
        }
        if let Some(secret) = env_value("INTERCOM_CLIENT_SECRET") {
            intercom.client_secret = Some(secret);
        }
    }
    if let Some(asana) = config.asana.as_mut() {
        if let Some(token) = env_value("ASANA_TOKEN") {
            asana.token = token;
        }
        if let Some(secret) = env_value("ASANA_WEBHOOK_SECRET") {
            asana.webhook_secret = Some(secret);
        }
    }
}

pub fn validate(config: &AppConfig) -> Result<()> {
    let Some(intercom) = &config.intercom else {
        bail!("Missing [intercom] section. Add it to ~/.deskbridge/config.toml");
    };
    let Some(asana) = &config.asana else {
        bail!("Missing [asana] section. Add it to ~/.deskbridge/config.toml");
    };
    if intercom.token.is_empty() {
        bail!("Intercom token is empty. Set intercom.token or INTERCOM_TOKEN");
    }
    if asana.token.is_empty() {
        bail!("Asana token is empty. Set asana.token or ASANA_TOKEN");
    }
    if !(-12..=14).contains(&config.sync.utc_offset_hours) {
        bail!(
            "sync.utc_offset_hours must be between -12 and 14, got {}",
            config.sync.utc_offset_hours
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
port = 9000

[intercom]
token = "ic-token"
admin_id = "42"

[asana]
token = "as-token"
workspace_id = "w1"
project_id = "p1"

[sync]
utc_offset_hours = -2
close_statuses = ["Done"]

[[sync.field_map]]
attribute = "Priority"
field = "Priority"

[[sync.field_map]]
attribute = "Due"
field = "Due Date"
format = "date_time"

[[sync.file_attributes]]
attribute = "Screenshots"
field = "Screenshot Links"
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_full_config() {
        let file = write_config(SAMPLE);
        let config = load_config_from(file.path()).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.http.timeout_secs, 20);
        assert_eq!(config.intercom.as_ref().unwrap().admin_id, "42");
        assert_eq!(
            config.intercom.as_ref().unwrap().api_url,
            "https://api.intercom.io"
        );
        assert_eq!(config.asana.as_ref().unwrap().project_id, "p1");
        assert_eq!(config.sync.utc_offset_hours, -2);
        assert_eq!(config.sync.close_statuses, vec!["Done".to_string()]);
        assert_eq!(config.sync.field_map.len(), 2);
        assert_eq!(config.sync.field_map[1].format, ValueFormat::DateTime);
        assert_eq!(config.sync.field_map[0].format, ValueFormat::Plain);
        assert_eq!(
            config.sync.file_attributes[0].field.as_deref(),
            Some("Screenshot Links")
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn sync_defaults_apply() {
        let sync = SyncConfig::default();
        assert_eq!(sync.ticket_field_name, "Intercom Ticket ID");
        assert_eq!(sync.status_field_name, "Status");
        assert_eq!(sync.link_attribute, "Asana Task ID");
        assert_eq!(sync.utc_offset_hours, 6);
    }

    #[test]
    fn missing_sections_fail_validation() {
        let config = AppConfig::default();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("[intercom]"));
    }

    #[test]
    fn out_of_range_offset_fails_validation() {
        let file = write_config(SAMPLE);
        let mut config = load_config_from(file.path()).unwrap();
        config.sync.utc_offset_hours = 20;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let file = write_config("[server\nport = ");
        let err = load_config_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}
