//! Configuration Loader
//!
//! Environment-aware loading with the `config` crate. Sources are layered in
//! this order, later ones winning:
//!
//! 1. Built-in defaults
//! 2. `{config_dir}/cacheable.toml` (optional)
//! 3. `{config_dir}/cacheable.{environment}.toml` (optional)
//! 4. `CACHEABLE__SECTION__FIELD` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::CacheableConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "cacheable";
const ENV_PREFIX: &str = "CACHEABLE";

pub struct ConfigManager {
    config: CacheableConfig,
    environment: String,
    config_directory: PathBuf,
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("environment", &self.environment)
            .field("config_directory", &self.config_directory)
            .finish()
    }
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for tests that should not touch global environment variables
    /// for environment selection.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let explicit_dir = config_dir.is_some();
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        if explicit_dir && !config_directory.is_dir() {
            return Err(ConfigurationError::DirectoryNotFound {
                path: config_directory,
            });
        }

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading cache configuration"
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = environment,
            backend = %config.store.backend,
            store_enabled = config.store.enabled,
            policies = config.policies.len(),
            "Cache configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    fn build(config_directory: &Path, environment: &str) -> ConfigResult<CacheableConfig> {
        let base = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let overrides = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        let settings = Config::builder()
            .add_source(Config::try_from(&CacheableConfig::default())?)
            .add_source(File::from(base).format(FileFormat::Toml).required(false))
            .add_source(File::from(overrides).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Detect the current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("CACHEABLE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("CACHEABLE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    pub fn config(&self) -> &CacheableConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }
}
