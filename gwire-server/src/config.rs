//! Pipeline configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via GWIRE_CONFIG or --config)
//! 3. Environment variables

use gwire_protocol::header::{
    MIME_GRAPHBINARY_V4, MIME_GRAPHBINARY_V4_FULL, MIME_GRAPHSON_V4, MIME_GRAPHSON_V4_FULL,
    MIME_JSON,
};
use gwire_protocol::tokens::VAL_TRAVERSAL_SOURCE_ALIAS;
use gwire_protocol::Codecs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Request limits.
    pub limits: LimitsConfig,
    /// Enabled wire formats.
    pub serializers: SerializersConfig,
    /// Traversal sources by alias.
    pub sources: SourcesConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("GWIRE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.limits.apply_env_overrides();
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;
        self.serializers.validate()?;
        self.sources.validate()
    }
}

/// Request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum number of bindings on a single request.
    pub max_bindings: usize,
    /// Maximum size in bytes of an encoded request, header included.
    pub max_content_length: usize,
    /// Maximum length in characters of a script.
    pub max_request_size: usize,
    /// Default evaluation timeout in milliseconds (0 = unlimited).
    pub evaluation_timeout_ms: u64,
    /// Default number of results per streamed response.
    pub results_per_batch: usize,
    /// Whether bytecode may carry lambdas.
    pub allow_lambdas: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_bindings: 16,
            max_content_length: 10 * 1024 * 1024,
            max_request_size: 65_535,
            evaluation_timeout_ms: 30_000,
            results_per_batch: 64,
            allow_lambdas: true,
        }
    }
}

impl LimitsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("GWIRE_MAX_BINDINGS") {
            if let Ok(n) = max.parse() {
                self.max_bindings = n;
            }
        }

        if let Ok(max) = std::env::var("GWIRE_MAX_CONTENT_LENGTH") {
            if let Ok(n) = max.parse() {
                self.max_content_length = n;
            }
        }

        if let Ok(max) = std::env::var("GWIRE_MAX_REQUEST_SIZE") {
            if let Ok(n) = max.parse() {
                self.max_request_size = n;
            }
        }

        if let Ok(timeout) = std::env::var("GWIRE_EVALUATION_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.evaluation_timeout_ms = ms;
            }
        }

        if let Ok(batch) = std::env::var("GWIRE_RESULTS_PER_BATCH") {
            if let Ok(n) = batch.parse() {
                self.results_per_batch = n;
            }
        }

        if let Ok(allow) = std::env::var("GWIRE_ALLOW_LAMBDAS") {
            self.allow_lambdas = allow == "1" || allow.to_lowercase() == "true";
        }
    }

    /// Default evaluation timeout, `None` when unlimited.
    pub fn evaluation_timeout(&self) -> Option<Duration> {
        (self.evaluation_timeout_ms > 0).then(|| Duration::from_millis(self.evaluation_timeout_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_content_length == 0 {
            return Err(ConfigError::ValidationError(
                "max_content_length must be greater than 0".to_string(),
            ));
        }
        if self.max_request_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_request_size must be greater than 0".to_string(),
            ));
        }
        if self.results_per_batch == 0 {
            return Err(ConfigError::ValidationError(
                "results_per_batch must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Enabled wire formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializersConfig {
    /// MIME types the pipeline accepts.
    pub mime_types: Vec<String>,
    /// MIME type used for responses when the request's cannot be served.
    pub default_mime_type: String,
}

impl Default for SerializersConfig {
    fn default() -> Self {
        Self {
            mime_types: [
                MIME_GRAPHSON_V4,
                MIME_GRAPHSON_V4_FULL,
                MIME_JSON,
                MIME_GRAPHBINARY_V4,
                MIME_GRAPHBINARY_V4_FULL,
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
            default_mime_type: MIME_GRAPHSON_V4.to_string(),
        }
    }
}

impl SerializersConfig {
    /// Builds the codec set serving exactly the enabled MIME types.
    pub fn build_codecs(&self) -> Result<Codecs, ConfigError> {
        Codecs::global()
            .restrict_to(&self.mime_types)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mime_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one serializer MIME type must be enabled".to_string(),
            ));
        }
        if !self.mime_types.contains(&self.default_mime_type) {
            return Err(ConfigError::ValidationError(format!(
                "default_mime_type '{}' is not enabled",
                self.default_mime_type
            )));
        }
        self.build_codecs().map(|_| ())
    }
}

/// Traversal source names keyed by alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcesConfig(pub BTreeMap<String, String>);

impl Default for SourcesConfig {
    fn default() -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(
            VAL_TRAVERSAL_SOURCE_ALIAS.to_string(),
            VAL_TRAVERSAL_SOURCE_ALIAS.to_string(),
        );
        Self(sources)
    }
}

impl SourcesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (alias, name) in &self.0 {
            if alias.is_empty() || name.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "traversal source '{}' -> '{}' must have a non-empty alias and name",
                    alias, name
                )));
            }
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.limits.max_bindings, 16);
        assert_eq!(config.limits.results_per_batch, 64);
        assert_eq!(
            config.limits.evaluation_timeout(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.sources.0.get("g").map(String::as_str), Some("g"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unlimited_timeout() {
        let limits = LimitsConfig {
            evaluation_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(limits.evaluation_timeout(), None);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.limits.max_bindings, config.limits.max_bindings);
        assert_eq!(parsed.serializers.mime_types, config.serializers.mime_types);
        assert_eq!(parsed.sources, config.sources);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gwire.yaml");
        std::fs::write(
            &path,
            "limits:\n  max_bindings: 2\nsources:\n  g: graph\n  h: other\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.limits.max_bindings, 2);
        assert_eq!(config.limits.results_per_batch, 64);
        assert_eq!(config.sources.0.len(), 2);
        assert_eq!(config.sources.0["g"], "graph");
        assert_eq!(config.serializers.default_mime_type, "graphson-v4");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gwire.yaml");
        let mut config = Config::default();
        config.limits.allow_lambdas = false;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert!(!loaded.limits.allow_lambdas);
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            Config::from_file(&missing),
            Err(ConfigError::IoError(..))
        ));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "limits: [1, 2").unwrap();
        let err = Config::from_file(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
        assert!(err.to_string().starts_with("failed to parse config file"));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.limits.results_per_batch = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.serializers.mime_types = vec!["text/plain".to_string()];
        config.serializers.default_mime_type = "text/plain".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.serializers.mime_types = vec![MIME_GRAPHBINARY_V4.to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sources.0.insert("h".to_string(), String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_codecs() {
        let serializers = SerializersConfig {
            mime_types: vec![MIME_GRAPHBINARY_V4.to_string()],
            default_mime_type: MIME_GRAPHBINARY_V4.to_string(),
        };
        let codecs = serializers.build_codecs().unwrap();
        assert!(codecs.negotiate(MIME_GRAPHBINARY_V4).is_ok());
        assert!(codecs.negotiate(MIME_GRAPHSON_V4).is_err());
    }
}
