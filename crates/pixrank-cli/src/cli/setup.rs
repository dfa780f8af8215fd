use super::prompt::{ask_secret, ask_text, ask_yes_no};
use anyhow::{Context, Result};
use pixrank::db::{Schema, SqlImageStore};
use pixrank::embedding::{create_extractor, FeatureExtractor};
use pixrank::services::{ConfigError, ConfigService, DatabaseConfig, ProjectConfig};
use std::path::Path;
use std::sync::Arc;

/// Everything the menu operations work against, opened once at startup
pub struct Session {
    pub config: ProjectConfig,
    pub store: Arc<SqlImageStore>,
    pub extractor: Arc<dyn FeatureExtractor>,
}

/// Load the stored configuration, or ask for new database credentials and save them
pub fn resolve_config(path: &Path, use_default: bool) -> Result<ProjectConfig> {
    let service = ConfigService::new(path);

    let use_stored = use_default || ask_yes_no("Use DEFAULT? (y/n)")?;
    if use_stored {
        return service.load().map_err(|e| match e {
            ConfigError::Missing(_) => anyhow::anyhow!(
                "Cannot find an existing DEFAULT configuration at {}. Run again and answer 'n' to create one.",
                path.display()
            ),
            other => anyhow::Error::new(other),
        });
    }

    let database = DatabaseConfig {
        host: ask_text("New Host")?,
        user: ask_text("New User")?,
        password: ask_secret("New Password")?,
        name: ask_text("New Name")?,
        ..DatabaseConfig::default()
    };
    let config = service
        .update_database(database)
        .context("Failed to save configuration")?;
    println!("Saved configuration to {}", path.display());
    Ok(config)
}

/// Connect to the database and load the model
pub async fn open_session(config: ProjectConfig) -> Result<Session> {
    let url = config.database.connection_url()?;
    let store = SqlImageStore::connect(&url, Schema::default())
        .await
        .context(
            "Database connection failed. Please ensure that the database user \
             has the necessary privileges to access the database",
        )?;
    tracing::info!("Connected to {} database '{}'", config.database.driver, config.database.name);

    let extractor = create_extractor(&config.model)
        .await
        .context("Failed to initialize the feature extractor")?;

    Ok(Session {
        config,
        store: Arc::new(store),
        extractor,
    })
}
