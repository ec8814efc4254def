use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Path to the SQLite database
    pub database_path: PathBuf,
    /// Directory file documents are served from
    pub storage_dir: PathBuf,
    /// Secret required to register new users
    pub admin_token: String,
    /// Lifetime of a session token, in seconds
    pub token_duration_secs: u64,
    /// Lifetime of a cache entry, in seconds
    pub cache_duration_secs: u64,
    /// Size of the access-filter pool; defaults to half the CPUs
    pub filter_workers: Option<usize>,
    /// Interval between expired session/cache sweeps, in seconds
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("docvault")
                .join("docvault.db"),
            storage_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("docvault")
                .join("files"),
            admin_token: "admin_secret_token".to_string(),
            token_duration_secs: 24 * 60 * 60,
            cache_duration_secs: 60 * 60,
            filter_workers: None,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var("DOCVAULT_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Default config file path: ~/.config/docvault/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docvault")
            .join("config.yaml")
    }

    pub fn token_duration(&self) -> Duration {
        Duration::from_secs(self.token_duration_secs)
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_duration_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(port) = env_parsed("DOCVAULT_PORT")? {
            self.port = port;
        }
        if let Ok(path) = std::env::var("DOCVAULT_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("DOCVAULT_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Ok(token) = std::env::var("DOCVAULT_ADMIN_TOKEN") {
            self.admin_token = token;
        }
        if let Some(secs) = env_parsed("DOCVAULT_TOKEN_DURATION")? {
            self.token_duration_secs = secs;
        }
        if let Some(secs) = env_parsed("DOCVAULT_CACHE_DURATION")? {
            self.cache_duration_secs = secs;
        }
        if let Some(workers) = env_parsed("DOCVAULT_FILTER_WORKERS")? {
            self.filter_workers = Some(workers);
        }
        Ok(())
    }
}

fn env_parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv(name, value)),
        Err(_) => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
            ConfigError::InvalidEnv(name, value) => {
                write!(f, "Invalid value '{}' for {}", value, name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
