use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::semantic::{self, is_supported_model};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
/// Candidates fetched per requested search result before filtering
const DEFAULT_SEARCH_OVERFETCH: usize = 2;
/// Candidates fetched per requested recommendation before filtering
const DEFAULT_RECOMMEND_OVERFETCH: usize = 3;
/// Characters of description kept in a search result
const DEFAULT_DESCRIPTION_LIMIT: usize = 200;

/// Configuration for semantic search functionality
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Over-fetch multiplier for search
    #[serde(default = "default_search_overfetch")]
    pub search_overfetch: usize,

    /// Over-fetch multiplier for recommendations
    #[serde(default = "default_recommend_overfetch")]
    pub recommend_overfetch: usize,

    /// Maximum description length in results, in characters
    #[serde(default = "default_description_limit")]
    pub description_limit: usize,

    /// Load the embedding model when the daemon starts instead of on the
    /// first request
    #[serde(default = "default_preload_model")]
    pub preload_model: bool,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            model: default_semantic_model(),
            search_overfetch: DEFAULT_SEARCH_OVERFETCH,
            recommend_overfetch: DEFAULT_RECOMMEND_OVERFETCH,
            description_limit: DEFAULT_DESCRIPTION_LIMIT,
            preload_model: true,
        }
    }
}

fn default_semantic_model() -> String {
    semantic::DEFAULT_MODEL.to_string()
}

fn default_search_overfetch() -> usize {
    DEFAULT_SEARCH_OVERFETCH
}

fn default_recommend_overfetch() -> usize {
    DEFAULT_RECOMMEND_OVERFETCH
}

fn default_description_limit() -> usize {
    DEFAULT_DESCRIPTION_LIMIT
}

fn default_preload_model() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            semantic_search: SemanticSearchConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("listen_addr '{}' is not a socket address", self.listen_addr))?;

        let sem = &self.semantic_search;
        if !is_supported_model(&sem.model) {
            bail!("semantic_search.model '{}' is not a supported model", sem.model);
        }

        if sem.search_overfetch == 0 {
            bail!("semantic_search.search_overfetch must be greater than 0");
        }

        if sem.recommend_overfetch == 0 {
            bail!("semantic_search.recommend_overfetch must be greater than 0");
        }

        if sem.description_limit == 0 {
            bail!("semantic_search.description_limit must be greater than 0");
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults if it
    /// does not exist yet.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("failed to create {}", base_path.display()))?;
            std::fs::write(&path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("{} is malformed", path.display()))?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = self.base_path.join(CONFIG_FILE);
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&path, config_str)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    #[cfg(test)]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
