use super::types::{DatabaseConfig, ProjectConfig};
use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Default config file name, resolved against the working directory
pub const CONFIG_FILE: &str = "config.json";

const ENV_PREFIX: &str = "PIXRANK_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no stored configuration at {}; create one first", .0.display())]
    Missing(PathBuf),

    #[error("failed to load configuration: {0}")]
    Parse(#[from] Box<figment::Error>),

    #[error("failed to write configuration to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid database connection settings: {0}")]
    InvalidUrl(String),
}

/// Service for configuration management
pub struct ConfigService {
    config_path: PathBuf,
}

impl ConfigService {
    pub fn new(config_path: &Path) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Check if configuration exists
    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Load the stored configuration, with env var overrides (PIXRANK_ prefix, __ separator).
    ///
    /// Keys missing from the file take their defaults; a missing file is an error.
    pub fn load(&self) -> Result<ProjectConfig, ConfigError> {
        if !self.exists() {
            return Err(ConfigError::Missing(self.config_path.clone()));
        }

        let config = Figment::from(Serialized::defaults(ProjectConfig::default()))
            .merge(Json::file(&self.config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;
        Ok(config)
    }

    /// Save configuration to file, indented with four spaces
    pub fn save(&self, config: &ProjectConfig) -> Result<(), ConfigError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        config.serialize(&mut serializer)?;

        let write_err = |source| ConfigError::Write {
            path: self.config_path.clone(),
            source,
        };
        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&self.config_path, buf).map_err(write_err)?;

        tracing::info!("Saved configuration to {}", self.config_path.display());
        Ok(())
    }

    /// Replace the database section and persist, keeping every other setting.
    ///
    /// An unreadable existing file is overwritten with defaults.
    pub fn update_database(&self, database: DatabaseConfig) -> Result<ProjectConfig, ConfigError> {
        let mut config = match self.load() {
            Ok(config) => config,
            Err(ConfigError::Missing(_)) => ProjectConfig::default(),
            Err(e) => {
                tracing::warn!("Replacing unreadable configuration: {}", e);
                ProjectConfig::default()
            },
        };
        config.database = database;
        self.save(&config)?;
        Ok(config)
    }
}

impl DatabaseConfig {
    /// Build the `<driver>://user:password@host/name` connection URL.
    ///
    /// For sqlite the name is the database file, created on first use.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        match self.driver.as_str() {
            "sqlite" => {
                if self.name.is_empty() {
                    return Err(ConfigError::InvalidUrl(
                        "sqlite needs a database file name".to_string(),
                    ));
                }
                Ok(format!("sqlite://{}?mode=rwc", self.name))
            },
            "mysql" => {
                let invalid = |what: &str| {
                    ConfigError::InvalidUrl(format!("{} (host '{}')", what, self.host))
                };
                let mut url = Url::parse(&format!("mysql://{}", self.host))
                    .map_err(|e| invalid(&e.to_string()))?;
                url.set_username(&self.user)
                    .map_err(|_| invalid("cannot set user"))?;
                if !self.password.is_empty() {
                    url.set_password(Some(&self.password))
                        .map_err(|_| invalid("cannot set password"))?;
                }
                url.set_path(&self.name);
                Ok(url.to_string())
            },
            other => Err(ConfigError::InvalidUrl(format!(
                "unsupported driver '{}', expected mysql or sqlite",
                other
            ))),
        }
    }
}
