// Runtime configuration read from the environment
use anyhow::Context;
use std::env;
use std::str::FromStr;

pub const DEFAULT_MODEL_ID: &str = "Naphadon/finetuning-restaurant-reviews-distilbert";
pub const DEFAULT_REVISION: &str = "main";

/// Where the pretrained artifact comes from and how inputs are prepared for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_id: String,
    pub revision: String,
    pub hf_token: Option<String>,
    pub max_sequence_length: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            hf_token: None,
            max_sequence_length: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub max_body_bytes: usize,
    pub cors_allowed_origin: Option<String>,
    pub model: ModelConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            workers: None,
            max_body_bytes: 1024 * 1024,
            cors_allowed_origin: None,
            model: ModelConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values are
    /// treated as unset; values that fail to parse are an error.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let model = ModelConfig {
            model_id: get("SENTIMENT_MODEL_ID").unwrap_or(defaults.model.model_id),
            revision: get("SENTIMENT_MODEL_REVISION").unwrap_or(defaults.model.revision),
            hf_token: get("HF_TOKEN"),
            max_sequence_length: parse_or(
                "SENTIMENT_MAX_TOKENS",
                get("SENTIMENT_MAX_TOKENS"),
                defaults.model.max_sequence_length,
            )?,
        };
        if model.max_sequence_length == 0 {
            anyhow::bail!("SENTIMENT_MAX_TOKENS must be greater than zero");
        }

        let workers = get("WORKERS")
            .map(|value| parse_value::<usize>("WORKERS", &value))
            .transpose()?;
        if workers == Some(0) {
            anyhow::bail!("WORKERS must be greater than zero");
        }

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", get("PORT"), defaults.port)?,
            workers,
            max_body_bytes: parse_or(
                "SENTIMENT_MAX_BODY_BYTES",
                get("SENTIMENT_MAX_BODY_BYTES"),
                defaults.max_body_bytes,
            )?,
            cors_allowed_origin: get("CORS_ALLOWED_ORIGIN"),
            model,
        })
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("invalid value for {key}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 9000);
        assert_eq!(config.model.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.model.revision, "main");
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("WORKERS", "4"),
            ("SENTIMENT_MODEL_ID", "distilbert-base-uncased-finetuned-sst-2-english"),
            ("SENTIMENT_MODEL_REVISION", "refs/pr/1"),
            ("HF_TOKEN", "hf_secret"),
            ("SENTIMENT_MAX_TOKENS", "128"),
            ("CORS_ALLOWED_ORIGIN", "http://localhost:5000"),
        ])
        .unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.workers, Some(4));
        assert_eq!(
            config.model.model_id,
            "distilbert-base-uncased-finetuned-sst-2-english"
        );
        assert_eq!(config.model.revision, "refs/pr/1");
        assert_eq!(config.model.hf_token.as_deref(), Some("hf_secret"));
        assert_eq!(config.model.max_sequence_length, 128);
        assert_eq!(
            config.cors_allowed_origin.as_deref(),
            Some("http://localhost:5000")
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[("HF_TOKEN", "  "), ("PORT", "")]).unwrap();
        assert_eq!(config.model.hf_token, None);
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn unparsable_numbers_are_rejected() {
        let err = config_from(&[("PORT", "ninety")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));

        assert!(config_from(&[("SENTIMENT_MAX_BODY_BYTES", "-1")]).is_err());
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(config_from(&[("SENTIMENT_MAX_TOKENS", "0")]).is_err());
        assert!(config_from(&[("WORKERS", "0")]).is_err());
    }
}
