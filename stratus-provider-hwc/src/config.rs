//! Provider configuration
//!
//! Settings come from `HW_*` environment variables or a JSON file. Endpoints
//! follow `https://{service}.{region}.{cloud}/` unless overridden per service.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

static REGION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("region pattern is valid")
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {name}")]
    InvalidVar { name: String, value: String },

    #[error("invalid region name: {0}")]
    InvalidRegion(String),

    #[error("invalid endpoint for service '{service}': {endpoint}")]
    InvalidEndpoint { service: String, endpoint: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Connection settings of the Huawei Cloud provider
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub region: String,
    pub project_id: String,
    pub token: String,
    pub cloud: String,
    /// Per-service endpoint overrides, keyed by lowercase service name
    pub endpoints: HashMap<String, String>,
    pub max_retries: u32,
    /// Skip TLS certificate verification
    pub insecure: bool,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            project_id: String::new(),
            token: String::new(),
            cloud: DEFAULT_CLOUD.to_string(),
            endpoints: HashMap::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            insecure: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("region", &self.region)
            .field("project_id", &self.project_id)
            .field("token", &"<redacted>")
            .field("cloud", &self.cloud)
            .field("endpoints", &self.endpoints)
            .field("max_retries", &self.max_retries)
            .field("insecure", &self.insecure)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Build a configuration from `HW_*` variables
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let key = key.as_ref();
            let value: String = value.into();
            match key {
                "HW_REGION_NAME" => config.region = value,
                "HW_PROJECT_ID" => config.project_id = value,
                "HW_AUTH_TOKEN" => config.token = value,
                "HW_CLOUD" if !value.is_empty() => config.cloud = value,
                "HW_MAX_RETRIES" => config.max_retries = parse_var(key, &value)?,
                "HW_REQUEST_TIMEOUT" => config.request_timeout_secs = parse_var(key, &value)?,
                "HW_INSECURE" => config.insecure = parse_bool(key, &value)?,
                _ => {
                    if let Some(service) = key.strip_prefix("HW_ENDPOINT_")
                        && !service.is_empty()
                    {
                        config.endpoints.insert(service.to_lowercase(), value);
                    }
                }
            }
        }

        Ok(config)
    }

    /// Build a configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Check that the configuration can be used to talk to the cloud
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.is_empty() {
            return Err(ConfigError::Missing("region (HW_REGION_NAME)"));
        }
        if self.project_id.is_empty() {
            return Err(ConfigError::Missing("project_id (HW_PROJECT_ID)"));
        }
        if self.token.is_empty() {
            return Err(ConfigError::Missing("token (HW_AUTH_TOKEN)"));
        }
        if !REGION_PATTERN.is_match(&self.region) {
            return Err(ConfigError::InvalidRegion(self.region.clone()));
        }
        for (service, endpoint) in &self.endpoints {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::InvalidEndpoint {
                    service: service.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }
        Ok(())
    }

    /// Base URL of `service`, always ending with `/`
    pub fn endpoint(&self, service: &str) -> String {
        match self.endpoints.get(service) {
            Some(custom) if custom.ends_with('/') => custom.clone(),
            Some(custom) => format!("{}/", custom),
            None => format!("https://{}.{}.{}/", service, self.region, self.cloud),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidVar {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::InvalidVar {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("HW_REGION_NAME", "cn-north-4"),
            ("HW_PROJECT_ID", "0123456789abcdef"),
            ("HW_AUTH_TOKEN", "secret-token"),
        ]
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = ProviderConfig::from_vars(base_vars()).unwrap();
        assert_eq!(config.region, "cn-north-4");
        assert_eq!(config.cloud, DEFAULT_CLOUD);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(!config.insecure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_vars_overrides() {
        let mut vars = base_vars();
        vars.push(("HW_CLOUD", "example.com"));
        vars.push(("HW_MAX_RETRIES", "2"));
        vars.push(("HW_INSECURE", "true"));
        vars.push(("HW_ENDPOINT_DCS", "http://127.0.0.1:8080"));
        vars.push(("PATH", "/usr/bin"));

        let config = ProviderConfig::from_vars(vars).unwrap();
        assert_eq!(config.cloud, "example.com");
        assert_eq!(config.max_retries, 2);
        assert!(config.insecure);
        assert_eq!(config.endpoint("dcs"), "http://127.0.0.1:8080/");
        assert_eq!(config.endpoint("ims"), "https://ims.cn-north-4.example.com/");
    }

    #[test]
    fn test_from_vars_rejects_bad_numbers() {
        let mut vars = base_vars();
        vars.push(("HW_MAX_RETRIES", "many"));
        let err = ProviderConfig::from_vars(vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { .. }));
    }

    #[test]
    fn test_validate_missing_and_invalid() {
        let config = ProviderConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));

        let mut config = ProviderConfig::from_vars(base_vars()).unwrap();
        config.region = "North China".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRegion(_))
        ));

        let mut config = ProviderConfig::from_vars(base_vars()).unwrap();
        config
            .endpoints
            .insert("ims".to_string(), "ims.local".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_deserialize_partial_file() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{"region": "ap-southeast-1", "project_id": "p", "token": "t", "max_retries": 1}"#,
        )
        .unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.cloud, DEFAULT_CLOUD);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ProviderConfig::from_vars(base_vars()).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }
}
