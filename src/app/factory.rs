use crate::{config::Config, semantic::SemanticSearchService};
use anyhow::{Context, Result};
use homedir::my_home;
use std::path::PathBuf;
use std::sync::Arc;

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Create the semantic search service for the configured model.
    ///
    /// The service starts empty; call `initialize()` to load the snapshot.
    pub fn create_search_service(paths: &AppPaths, config: &Config) -> Arc<SemanticSearchService> {
        Arc::new(SemanticSearchService::new(
            config.semantic_search.clone(),
            paths.base_path.clone(),
        ))
    }

    /// Get application paths with validation
    pub fn get_paths() -> Result<AppPaths> {
        let paths = AppPaths::new(Self::get_base_path()?);

        // Ensure base directory exists
        std::fs::create_dir_all(&paths.base_path)
            .context("Failed to create application base directory")?;

        Ok(paths)
    }

    /// Load configuration from the base directory
    pub fn create_config(paths: &AppPaths) -> Result<Config> {
        Config::load_with(&paths.base_path).context("Failed to load configuration")
    }

    /// Get the base path for the application
    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("SAGA_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;

        Ok(home.join(".local").join("share").join("saga"))
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
    pub models_path: PathBuf,
}

impl AppPaths {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            models_path: base_path.join("models"),
            base_path,
        }
    }
}
