//! Application configuration structures.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Longest accepted recency window (100 years).
const MAX_WINDOW_HOURS: u64 = 24 * 365 * 100;

/// Root application configuration.
///
/// Built once at startup (file, then environment, then CLI flags) and
/// passed by reference to every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Discussion API client settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Destination warehouse settings
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Recency window and listing scan behavior
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Secret Manager lookups for source credentials
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Forums to process, in order
    #[serde(default = "defaults::forums")]
    pub forums: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("REDDIT_CLIENT_ID") {
            self.source.client_id = v;
        }
        if let Some(v) = get("REDDIT_CLIENT_SECRET") {
            self.source.client_secret = Secret::new(v);
        }
        if let Some(v) = get("REDDIT_USER_AGENT") {
            self.source.user_agent = v;
        }
        if let Some(v) = get("GCP_PROJECT_ID") {
            self.warehouse.project_id = v.clone();
            if self.secrets.project_id.is_none() {
                self.secrets.project_id = Some(v);
            }
        }
        if let Some(v) = get("BQ_DATASET_ID") {
            self.warehouse.dataset_id = v;
        }
        if let Some(v) = get("BQ_LOCATION") {
            self.warehouse.location = v;
        }
        if let Some(v) = get("GCP_ACCESS_TOKEN") {
            self.warehouse.access_token = Some(Secret::new(v));
        }
        if let Some(v) = get("ETL_FORUMS") {
            self.forums = parse_forum_list(&v);
        }
        if let Some(v) = get("ETL_WINDOW_HOURS") {
            self.extraction.window_hours = v.trim().parse().map_err(|_| {
                AppError::config(format!("ETL_WINDOW_HOURS is not a number: {v}"))
            })?;
        }
        if let Some(v) = get("SECRET_REDDIT_CLIENT_ID") {
            self.secrets.client_id_secret = Some(v);
        }
        if let Some(v) = get("SECRET_REDDIT_CLIENT_SECRET") {
            self.secrets.client_secret_secret = Some(v);
        }
        Ok(())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.forums.is_empty() {
            return Err(AppError::validation("No forums defined"));
        }
        let mut seen = HashSet::new();
        for forum in &self.forums {
            if forum.trim().is_empty() {
                return Err(AppError::validation("forums contains a blank name"));
            }
            if !forum.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(AppError::validation(format!(
                    "forum '{forum}' may only contain letters, digits and '_'"
                )));
            }
            if !seen.insert(forum.to_lowercase()) {
                return Err(AppError::validation(format!(
                    "forum '{forum}' is listed more than once"
                )));
            }
        }
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if !(1..=100).contains(&self.source.page_size) {
            return Err(AppError::validation(
                "source.page_size must be between 1 and 100",
            ));
        }
        if self.warehouse.dataset_id.trim().is_empty() {
            return Err(AppError::validation("warehouse.dataset_id is empty"));
        }
        if self.warehouse.timeout_secs == 0 {
            return Err(AppError::validation("warehouse.timeout_secs must be > 0"));
        }
        if self.warehouse.load_timeout_secs == 0 {
            return Err(AppError::validation(
                "warehouse.load_timeout_secs must be > 0",
            ));
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&self.extraction.window_hours) {
            return Err(AppError::validation(format!(
                "extraction.window_hours must be between 1 and {MAX_WINDOW_HOURS}"
            )));
        }
        if self.extraction.max_pages == 0 {
            return Err(AppError::validation("extraction.max_pages must be > 0"));
        }
        for endpoint in [
            &self.source.auth_url,
            &self.source.api_base,
            &self.warehouse.api_base,
            &self.warehouse.upload_base,
            &self.warehouse.metadata_token_url,
            &self.secrets.api_base,
        ] {
            Url::parse(endpoint)?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            warehouse: WarehouseConfig::default(),
            extraction: ExtractionConfig::default(),
            secrets: SecretsConfig::default(),
            forums: defaults::forums(),
        }
    }
}

/// Split a comma separated forum list, dropping `r/` prefixes and blanks.
pub fn parse_forum_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('/').trim_start_matches("r/"))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A credential value that never shows up in logs or written config.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(***)")
        }
    }
}

impl Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("")
    }
}

/// Discussion API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// OAuth application id
    #[serde(default)]
    pub client_id: String,

    /// OAuth application secret
    #[serde(default)]
    pub client_secret: Secret,

    /// User-Agent header for API requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// OAuth token endpoint
    #[serde(default = "defaults::auth_url")]
    pub auth_url: String,

    /// Authenticated API base URL
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Items requested per listing page (API maximum is 100)
    #[serde(default = "defaults::page_size")]
    pub page_size: u32,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: Secret::default(),
            user_agent: defaults::user_agent(),
            auth_url: defaults::auth_url(),
            api_base: defaults::api_base(),
            timeout_secs: defaults::timeout(),
            page_size: defaults::page_size(),
            request_delay_ms: defaults::request_delay(),
        }
    }
}

/// Destination warehouse settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Project that owns the dataset and runs load jobs
    #[serde(default)]
    pub project_id: String,

    /// Target dataset
    #[serde(default = "defaults::dataset_id")]
    pub dataset_id: String,

    /// Dataset location used on creation and for job lookups
    #[serde(default = "defaults::location")]
    pub location: String,

    /// REST base URL
    #[serde(default = "defaults::bigquery_base")]
    pub api_base: String,

    /// Media upload base URL for load jobs
    #[serde(default = "defaults::bigquery_upload_base")]
    pub upload_base: String,

    /// Static bearer token; the metadata server is used when absent
    #[serde(default)]
    pub access_token: Option<Secret>,

    /// Compute metadata server token endpoint
    #[serde(default = "defaults::metadata_token_url")]
    pub metadata_token_url: String,

    /// Interval between load job status polls in milliseconds
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,

    /// Give up waiting for a load job after this many seconds
    #[serde(default = "defaults::load_timeout")]
    pub load_timeout_secs: u64,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset_id: defaults::dataset_id(),
            location: defaults::location(),
            api_base: defaults::bigquery_base(),
            upload_base: defaults::bigquery_upload_base(),
            access_token: None,
            metadata_token_url: defaults::metadata_token_url(),
            poll_interval_ms: defaults::poll_interval(),
            load_timeout_secs: defaults::load_timeout(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Recency window and listing scan behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Trailing window in hours
    #[serde(default = "defaults::window_hours")]
    pub window_hours: u64,

    /// Stop reading a newest-first listing at the first post older than
    /// the window instead of scanning every page
    #[serde(default = "defaults::stop_at_first_old")]
    pub stop_at_first_old: bool,

    /// Upper bound on listing pages read per forum
    #[serde(default = "defaults::max_pages")]
    pub max_pages: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            window_hours: defaults::window_hours(),
            stop_at_first_old: defaults::stop_at_first_old(),
            max_pages: defaults::max_pages(),
        }
    }
}

/// Secret Manager lookups for source credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Project holding the secrets (defaults to the warehouse project)
    #[serde(default)]
    pub project_id: Option<String>,

    /// Secret holding the source client id
    #[serde(default)]
    pub client_id_secret: Option<String>,

    /// Secret holding the source client secret
    #[serde(default)]
    pub client_secret_secret: Option<String>,

    /// REST base URL
    #[serde(default = "defaults::secret_manager_base")]
    pub api_base: String,
}

impl SecretsConfig {
    /// Whether any secret lookup is configured.
    pub fn is_enabled(&self) -> bool {
        self.client_id_secret.is_some() || self.client_secret_secret.is_some()
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            client_id_secret: None,
            client_secret_secret: None,
            api_base: defaults::secret_manager_base(),
        }
    }
}

mod defaults {
    // Source defaults
    pub fn user_agent() -> String {
        "subreddit-etl/0.1 (scheduled batch loader)".into()
    }
    pub fn auth_url() -> String {
        "https://www.reddit.com/api/v1/access_token".into()
    }
    pub fn api_base() -> String {
        "https://oauth.reddit.com".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn page_size() -> u32 {
        100
    }
    pub fn request_delay() -> u64 {
        1000
    }

    // Warehouse defaults
    pub fn dataset_id() -> String {
        "reddit_data".into()
    }
    pub fn location() -> String {
        "US".into()
    }
    pub fn bigquery_base() -> String {
        "https://bigquery.googleapis.com/bigquery/v2".into()
    }
    pub fn bigquery_upload_base() -> String {
        "https://bigquery.googleapis.com/upload/bigquery/v2".into()
    }
    pub fn metadata_token_url() -> String {
        "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
            .into()
    }
    pub fn poll_interval() -> u64 {
        1000
    }
    pub fn load_timeout() -> u64 {
        300
    }

    // Extraction defaults
    pub fn window_hours() -> u64 {
        24
    }
    pub fn stop_at_first_old() -> bool {
        true
    }
    pub fn max_pages() -> usize {
        10
    }

    // Secrets defaults
    pub fn secret_manager_base() -> String {
        "https://secretmanager.googleapis.com/v1".into()
    }

    // Forum defaults
    pub fn forums() -> Vec<String> {
        vec!["dataengineering".into(), "rust".into()]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_forums() {
        let mut config = Config::default();
        config.forums.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_forums() {
        let mut config = Config::default();
        config.forums = vec!["rust".into(), "Rust".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut config = Config::default();
        config.extraction.window_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_window() {
        let mut config = Config::default();
        config.extraction.window_hours = MAX_WINDOW_HOURS;
        assert!(config.validate().is_ok());

        config.extraction.window_hours = MAX_WINDOW_HOURS + 1;
        assert!(config.validate().is_err());

        config.extraction.window_hours = 10_000_000_000;
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn validate_rejects_forum_names_unsafe_in_paths() {
        for name in ["rust/new", "rust?x=1", "data engineering", "r/rust", "ünï"] {
            let mut config = Config::default();
            config.forums = vec![name.to_string()];
            assert!(config.validate().is_err(), "{name} accepted");
        }

        let mut config = Config::default();
        config.forums = vec!["Data_Engineering2".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_oversized_page() {
        let mut config = Config::default();
        config.source.page_size = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_endpoint() {
        let mut config = Config::default();
        config.warehouse.api_base = "not a url".into();
        assert!(matches!(config.validate(), Err(AppError::Url(_))));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[
                ("REDDIT_CLIENT_ID", "abc"),
                ("REDDIT_CLIENT_SECRET", "shh"),
                ("BQ_DATASET_ID", "social"),
                ("GCP_PROJECT_ID", "proj-1"),
                ("ETL_FORUMS", "r/rust, golang ,,python"),
                ("ETL_WINDOW_HOURS", "6"),
            ]))
            .unwrap();

        assert_eq!(config.source.client_id, "abc");
        assert_eq!(config.source.client_secret.expose(), "shh");
        assert_eq!(config.warehouse.dataset_id, "social");
        assert_eq!(config.warehouse.project_id, "proj-1");
        assert_eq!(config.secrets.project_id.as_deref(), Some("proj-1"));
        assert_eq!(config.forums, vec!["rust", "golang", "python"]);
        assert_eq!(config.extraction.window_hours, 6);
    }

    #[test]
    fn env_rejects_non_numeric_window() {
        let mut config = Config::default();
        let result = config.apply_env_from(env(&[("ETL_WINDOW_HOURS", "a day")]));
        assert!(result.is_err());
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env_from(env(&[("BQ_DATASET_ID", "  ")])).unwrap();
        assert_eq!(config.warehouse.dataset_id, "reddit_data");
    }

    #[test]
    fn secrets_are_hidden() {
        let mut config = Config::default();
        config.source.client_secret = Secret::new("hunter2");

        assert!(!format!("{config:?}").contains("hunter2"));
        assert!(!toml::to_string(&config).unwrap().contains("hunter2"));
    }

    #[test]
    fn parses_toml_with_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            forums = ["rust"]

            [extraction]
            window_hours = 12
            stop_at_first_old = false

            [warehouse]
            project_id = "proj"
            "#,
        )
        .unwrap();

        assert_eq!(config.forums, vec!["rust"]);
        assert_eq!(config.extraction.window_hours, 12);
        assert!(!config.extraction.stop_at_first_old);
        assert_eq!(config.extraction.max_pages, 10);
        assert_eq!(config.warehouse.dataset_id, "reddit_data");
        assert_eq!(config.source.page_size, 100);
    }
}
