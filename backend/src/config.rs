use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

const DEFAULT_MODEL_CONFIG: &str = "config/model.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("Failed to read model config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse model config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub location: String,
    pub input_size: u32,
    pub warm_up: bool,
    /// Set when the exported head emits logits rather than probabilities.
    pub apply_softmax: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            location: "models/brain-tumor-model.pt".to_string(),
            input_size: 224,
            warm_up: true,
            apply_softmax: false,
        }
    }
}

impl ModelConfig {
    /// Reads the YAML model config, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::warn!(
                "Model config {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: ModelConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_size == 0 {
            return Err(ConfigError::Invalid {
                key: "input_size",
                value: self.input_size.to_string(),
            });
        }
        if self.location.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "location",
                value: self.location.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub s3_bucket: String,
    pub scans_table: String,
    pub cognito_client_id: String,
    pub jwt_secret: String,
    pub model: ModelConfig,
    pub heuristic_seed: Option<u64>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let port = match lookup("PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value })?,
            None => 8081,
        };

        let heuristic_seed = match lookup("HEURISTIC_SEED") {
            Some(value) => Some(value.parse().map_err(|_| ConfigError::Invalid {
                key: "HEURISTIC_SEED",
                value,
            })?),
            None => None,
        };

        let model_path =
            lookup("MODEL_CONFIG_PATH").unwrap_or_else(|| DEFAULT_MODEL_CONFIG.to_string());
        let mut model = ModelConfig::load(Path::new(&model_path))?;
        if let Some(location) = lookup("MODEL_LOCATION") {
            model.location = location;
            model.validate()?;
        }

        Ok(Self {
            port,
            s3_bucket: required("S3_BUCKET_NAME")?,
            scans_table: required("DYNAMODB_SCANS_TABLE")?,
            cognito_client_id: required("COGNITO_CLIENT_ID")?,
            jwt_secret: required("JWT_SECRET")?,
            model,
            heuristic_seed,
        })
    }
}
