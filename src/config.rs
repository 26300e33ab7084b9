use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub chart: ChartConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_window_ms")]
    pub smoothing_window_ms: i64,
}

fn default_base_url() -> String {
    "https://manifold.markets/api/v0".to_string()
}

fn default_cache_path() -> String {
    "annotator-cache.db".to_string()
}

fn default_window_ms() -> i64 {
    600_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            smoothing_window_ms: default_window_ms(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    /// Load the config file when present, defaults otherwise.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Environment overrides on top of the config file.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_base_url: Option<String>,
    pub cache_path: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Self {
        dotenv::dotenv().ok();

        Self {
            api_base_url: std::env::var("MANIFOLD_API_URL").ok(),
            cache_path: std::env::var("ANNOTATOR_CACHE_PATH").ok(),
        }
    }

    pub fn apply(self, mut config: Config) -> Config {
        if let Some(url) = self.api_base_url {
            config.api.base_url = url;
        }
        if let Some(path) = self.cache_path {
            config.cache.path = path;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://manifold.markets/api/v0");
        assert_eq!(config.chart.smoothing_window_ms, 600_000);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [chart]
            smoothing_window_ms = 120000
            "#,
        )
        .unwrap();

        assert_eq!(config.chart.smoothing_window_ms, 120_000);
        assert_eq!(config.api.base_url, "https://manifold.markets/api/v0");
    }

    #[test]
    fn test_env_overrides_apply() {
        let env = EnvConfig {
            api_base_url: Some("http://localhost:9000".to_string()),
            cache_path: None,
        };
        let config = env.apply(Config::default());

        assert_eq!(config.api.base_url, "http://localhost:9000");
        assert_eq!(config.cache.path, "annotator-cache.db");
    }
}
