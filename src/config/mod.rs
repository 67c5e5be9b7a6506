use crate::error::{Result, ServiceError};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream Gemini API configuration
    #[serde(default)]
    pub gemini: GeminiConfig,
    /// Upload handling configuration
    #[serde(default)]
    pub image: ImageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Upstream Gemini API configuration
///
/// The API key is deliberately not part of the file-backed configuration;
/// it is read from the `GEMINI_API_KEY` environment variable at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Model identifier passed to the generateContent endpoint
    #[serde(default = "default_model")]
    pub model: String,
    /// API base URL (overridable for testing)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upstream call timeout in seconds
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,
}

/// Upload handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Maximum accepted image size in bytes
    #[serde(default = "default_max_image_size")]
    pub max_size_bytes: usize,
    /// Accepted image formats
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,
    /// Timeout for fetching images by URL, in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_timeout() -> u64 {
    30
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_timeout() -> u64 {
    60
}

fn default_max_image_size() -> usize {
    10_485_760
}

fn default_allowed_formats() -> Vec<String> {
    ["png", "jpg", "jpeg", "webp", "gif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_download_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_gemini_timeout(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_image_size(),
            allowed_formats: default_allowed_formats(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ServiceError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(ServiceError::Config(
                "Server host cannot be empty".to_string(),
            ));
        }

        if self.gemini.model.is_empty() {
            return Err(ServiceError::Config(
                "Gemini model cannot be empty".to_string(),
            ));
        }

        if !self.gemini.base_url.starts_with("http://")
            && !self.gemini.base_url.starts_with("https://")
        {
            return Err(ServiceError::Config(format!(
                "Gemini base URL must start with http:// or https://: {}",
                self.gemini.base_url
            )));
        }

        if self.image.max_size_bytes == 0 {
            return Err(ServiceError::Config(
                "Maximum image size must be > 0".to_string(),
            ));
        }

        if self.image.allowed_formats.is_empty() {
            return Err(ServiceError::Config(
                "At least one image format must be allowed".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read the Gemini API key from the environment
pub fn api_key_from_env() -> Result<Secret<String>> {
    env::var("GEMINI_API_KEY").map(Secret::new).map_err(|_| {
        ServiceError::Config("GEMINI_API_KEY environment variable is not set".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = ServiceConfig::from_yaml("{}").unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.gemini.model, "gemini-1.5-flash");
        assert_eq!(config.image.max_size_bytes, 10_485_760);
        assert_eq!(config.image.allowed_formats.len(), 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
server:
  port: 9090
gemini:
  model: gemini-1.5-pro
image:
  max_size_bytes: 1048576
"#;
        let config = ServiceConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.gemini.model, "gemini-1.5-pro");
        assert_eq!(config.image.max_size_bytes, 1_048_576);
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = ServiceConfig::default();
        config.gemini.base_url = "generativelanguage.googleapis.com".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_image_size() {
        let mut config = ServiceConfig::default();
        config.image.max_size_bytes = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml_is_a_config_error() {
        let result = ServiceConfig::from_yaml("server: [not, a, map]");
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }
}
