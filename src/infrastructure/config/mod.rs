use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use tracing::debug;

use crate::domain::api_config::ApiConfig;
use crate::domain::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "technicia.toml";
pub const ENV_PREFIX: &str = "TECHNICIA_";

pub struct ConfigService {
    config_path: PathBuf,
}

impl ConfigService {
    pub fn new() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Defaults, then the TOML file, then `TECHNICIA_*`, then `API_URL`.
    pub fn load(&self) -> Result<ApiConfig> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        let config: ApiConfig = self.figment().extract()?;
        debug!(base_url = %config.base_url, "Configuration loaded");
        Ok(config)
    }

    fn figment(&self) -> Figment {
        Figment::from(Serialized::defaults(ApiConfig::default()))
            .merge(Toml::file(&self.config_path))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Env::raw().only(&["API_URL"]).map(|_| "base_url".into()))
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}
