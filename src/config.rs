use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{GmailError, Result};
use crate::models::{LabelVisibility, MessageQuery, INBOX_LABEL};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub label: LabelConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// The label applied to messages that have been answered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "default_label_name")]
    pub name: String,
    #[serde(default = "default_label_list_visibility")]
    pub label_list_visibility: String,
    #[serde(default = "default_message_list_visibility")]
    pub message_list_visibility: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            name: default_label_name(),
            label_list_visibility: default_label_list_visibility(),
            message_list_visibility: default_message_list_visibility(),
        }
    }
}

impl LabelConfig {
    pub fn visibility(&self) -> LabelVisibility {
        LabelVisibility {
            label_list: self.label_list_visibility.clone(),
            message_list: self.message_list_visibility.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_label_ids")]
    pub label_ids: Vec<String>,
    /// Page size of the single listing request; `None` uses the provider default
    #[serde(default = "default_max_results")]
    pub max_results: Option<u32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            label_ids: default_label_ids(),
            max_results: default_max_results(),
        }
    }
}

impl ScanConfig {
    pub fn to_query(&self) -> MessageQuery {
        MessageQuery {
            query: self.query.clone(),
            label_ids: self.label_ids.clone(),
            max_results: self.max_results,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    #[serde(default = "default_body")]
    pub body: String,
    /// Mark automated senders handled without replying to them
    #[serde(default)]
    pub skip_automated_senders: bool,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            body: default_body(),
            skip_automated_senders: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: default_min_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            run_on_start: default_run_on_start(),
        }
    }
}

impl ScheduleConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_secs(self.min_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

fn default_label_name() -> String {
    "Vacation".to_string()
}

fn default_label_list_visibility() -> String {
    "labelShow".to_string()
}

fn default_message_list_visibility() -> String {
    "show".to_string()
}

fn default_query() -> String {
    "is:unread".to_string()
}

fn default_label_ids() -> Vec<String> {
    vec![INBOX_LABEL.to_string()]
}

fn default_max_results() -> Option<u32> {
    Some(100)
}

fn default_body() -> String {
    "Hi,\n\nI'm currently on vacation and will get back to you soon.\n\nBest".to_string()
}

fn default_min_delay_secs() -> u64 {
    45
}

fn default_max_delay_secs() -> u64 {
    120
}

fn default_run_on_start() -> bool {
    true
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.label.name.trim().is_empty() {
            return Err(GmailError::ConfigError(
                "label.name cannot be empty".to_string(),
            ));
        }

        match self.label.label_list_visibility.as_str() {
            "labelShow" | "labelShowIfUnread" | "labelHide" => {}
            other => {
                return Err(GmailError::ConfigError(format!(
                    "Invalid label.label_list_visibility: '{}'. Must be 'labelShow', 'labelShowIfUnread', or 'labelHide'",
                    other
                )));
            }
        }

        match self.label.message_list_visibility.as_str() {
            "show" | "hide" => {}
            other => {
                return Err(GmailError::ConfigError(format!(
                    "Invalid label.message_list_visibility: '{}'. Must be 'show' or 'hide'",
                    other
                )));
            }
        }

        if !self.scan.label_ids.iter().any(|l| l == INBOX_LABEL) {
            return Err(GmailError::ConfigError(
                "scan.label_ids must include INBOX".to_string(),
            ));
        }

        // Gmail caps a single listing page at 500 messages
        if let Some(max_results) = self.scan.max_results {
            if max_results == 0 || max_results > 500 {
                return Err(GmailError::ConfigError(
                    "scan.max_results must be between 1 and 500".to_string(),
                ));
            }
        }

        if self.reply.body.trim().is_empty() {
            return Err(GmailError::ConfigError(
                "reply.body cannot be empty".to_string(),
            ));
        }

        if self.schedule.min_delay_secs == 0 {
            return Err(GmailError::ConfigError(
                "schedule.min_delay_secs must be at least 1".to_string(),
            ));
        }
        if self.schedule.min_delay_secs > self.schedule.max_delay_secs {
            return Err(GmailError::ConfigError(
                "schedule.min_delay_secs cannot exceed schedule.max_delay_secs".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.label.name, "Vacation");
        assert_eq!(config.label.label_list_visibility, "labelShow");
        assert_eq!(config.label.message_list_visibility, "show");

        assert_eq!(config.scan.query, "is:unread");
        assert_eq!(config.scan.label_ids, vec!["INBOX".to_string()]);
        assert_eq!(config.scan.max_results, Some(100));

        assert!(config.reply.body.contains("on vacation"));
        assert!(!config.reply.skip_automated_senders);

        assert_eq!(config.schedule.min_delay(), Duration::from_secs(45));
        assert_eq!(config.schedule.max_delay(), Duration::from_secs(120));
        assert!(config.schedule.run_on_start);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_label_name() {
        let mut config = Config::default();
        config.label.name = "  ".to_string();
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("label.name cannot be empty"));
    }

    #[test]
    fn test_config_validation_invalid_visibility() {
        let mut config = Config::default();
        config.label.label_list_visibility = "visible".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Invalid label.label_list_visibility"));

        let mut config = Config::default();
        config.label.message_list_visibility = "always".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Invalid label.message_list_visibility"));
    }

    #[test]
    fn test_config_validation_scan_requires_inbox() {
        let mut config = Config::default();
        config.scan.label_ids = vec!["STARRED".to_string()];
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("must include INBOX"));
    }

    #[test]
    fn test_config_validation_max_results_bounds() {
        let mut config = Config::default();

        config.scan.max_results = Some(0);
        assert!(config.validate().is_err());

        config.scan.max_results = Some(501);
        assert!(config.validate().is_err());

        config.scan.max_results = Some(1);
        assert!(config.validate().is_ok());

        config.scan.max_results = Some(500);
        assert!(config.validate().is_ok());

        config.scan.max_results = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_delay_range() {
        let mut config = Config::default();

        config.schedule.min_delay_secs = 0;
        assert!(config.validate().unwrap_err().to_string().contains("at least 1"));

        config.schedule.min_delay_secs = 130;
        config.schedule.max_delay_secs = 120;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("cannot exceed schedule.max_delay_secs"));

        // A fixed delay is allowed
        config.schedule.min_delay_secs = 60;
        config.schedule.max_delay_secs = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_body() {
        let mut config = Config::default();
        config.reply.body = "\n".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("reply.body cannot be empty"));
    }

    #[tokio::test]
    async fn test_config_load_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.label.name = "Auto Replied".to_string();
        config.schedule.min_delay_secs = 50;
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();

        assert_eq!(loaded.label.name, "Auto Replied");
        assert_eq!(loaded.schedule.min_delay_secs, 50);
        assert_eq!(loaded.reply.body, config.reply.body);
        assert_eq!(loaded.scan.to_query(), config.scan.to_query());
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).await.unwrap();

        assert_eq!(config.label.name, "Vacation");
        assert_eq!(config.schedule.max_delay_secs, 120);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(temp_file.path()).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let partial_config = r#"
[label]
name = "Out Of Office"

[schedule]
max_delay_secs = 300
"#;
        tokio::fs::write(temp_file.path(), partial_config).await.unwrap();

        let config = Config::load(temp_file.path()).await.unwrap();

        assert_eq!(config.label.name, "Out Of Office");
        assert_eq!(config.schedule.max_delay_secs, 300);

        assert_eq!(config.label.label_list_visibility, "labelShow");
        assert_eq!(config.schedule.min_delay_secs, 45);
        assert_eq!(config.scan.query, "is:unread");
    }

    #[tokio::test]
    async fn test_config_load_rejects_invalid_values() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(
            temp_file.path(),
            "[schedule]\nmin_delay_secs = 200\nmax_delay_secs = 100\n",
        )
        .await
        .unwrap();

        let result = Config::load(temp_file.path()).await;
        assert!(matches!(result, Err(GmailError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_example(&path).await.unwrap();

        assert!(path.exists());
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.label.name, "Vacation");
    }
}
