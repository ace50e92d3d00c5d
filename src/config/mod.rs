use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_MODEL_ID: &str = "NousResearch/Hermes-2-Pro-Llama-3-8B";
pub const DEFAULT_CACHE_DIR: &str = "/data/model-store/huggingface";
pub const DEFAULT_CHAT_TEMPLATE: &str = "chatml";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: expected a boolean, got {value:?}")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key}: expected an unsigned integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key}: invalid socket address {value:?}")]
    InvalidAddr { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub model_id: String,
    pub revision: String,
    /// Local snapshot; when set the hub is never contacted.
    pub model_dir: Option<PathBuf>,
    pub cache_dir: PathBuf,
    /// Name of the built-in template used when the snapshot ships none.
    pub chat_template: String,
    pub chat_template_path: Option<PathBuf>,
    /// Accepted for compatibility, never applied to safetensors loading.
    pub load_in_4bit: bool,
    pub cuda_device: usize,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            info!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let load_in_4bit = match get("LOAD_IN_4BIT") {
            Some(v) => parse_bool("LOAD_IN_4BIT", &v)?,
            None => false,
        };

        let cuda_device = match get("CUDA_DEVICE") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                key: "CUDA_DEVICE",
                value: v,
            })?,
            None => 0,
        };

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddr {
                key: "BIND_ADDR",
                value: bind_raw.clone(),
            })?;

        Ok(Self {
            model_id: get("MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            revision: get("MODEL_REVISION").unwrap_or_else(|| "main".to_string()),
            model_dir: get("MODEL_DIR").map(PathBuf::from),
            cache_dir: get("MODEL_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            chat_template: get("CHAT_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_CHAT_TEMPLATE.to_string()),
            chat_template_path: get("CHAT_TEMPLATE_PATH").map(PathBuf::from),
            load_in_4bit,
            cuda_device,
            bind_addr,
        })
    }

    pub fn warn_inert_flags(&self) {
        if self.load_in_4bit {
            warn!("LOAD_IN_4BIT is set but quantized loading is not supported; loading full weights");
        }
        if self.chat_template != DEFAULT_CHAT_TEMPLATE {
            warn!(
                requested = %self.chat_template,
                "unknown CHAT_TEMPLATE; only chatml is built in"
            );
        }
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.model_id, DEFAULT_MODEL_ID);
        assert_eq!(cfg.revision, "main");
        assert_eq!(cfg.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert_eq!(cfg.chat_template, "chatml");
        assert!(cfg.model_dir.is_none());
        assert!(!cfg.load_in_4bit);
        assert_eq!(cfg.cuda_device, 0);
        assert_eq!(cfg.bind_addr.port(), 8000);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config_from(&[
            ("MODEL_ID", "org/other"),
            ("MODEL_DIR", "/models/other"),
            ("LOAD_IN_4BIT", "True"),
            ("CUDA_DEVICE", "1"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();
        assert_eq!(cfg.model_id, "org/other");
        assert_eq!(cfg.model_dir, Some(PathBuf::from("/models/other")));
        assert!(cfg.load_in_4bit);
        assert_eq!(cfg.cuda_device, 1);
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config_from(&[("MODEL_ID", "  "), ("MODEL_DIR", "")]).unwrap();
        assert_eq!(cfg.model_id, DEFAULT_MODEL_ID);
        assert!(cfg.model_dir.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config_from(&[("LOAD_IN_4BIT", "maybe")]),
            Err(ConfigError::InvalidBool { .. })
        ));
        assert!(matches!(
            config_from(&[("CUDA_DEVICE", "gpu0")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            config_from(&[("BIND_ADDR", "localhost")]),
            Err(ConfigError::InvalidAddr { .. })
        ));
    }
}
