use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_DATABASE: &str = "vocab.db";
const DEFAULT_SEMANTIC_MODEL: &str = crate::semantic::DEFAULT_MODEL;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_SEMANTIC_MIN_SCORE: f32 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Embedding model name (e.g., "paraphrase-multilingual-minilm-l12-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Floor for semantic candidates inside the resolver
    #[serde(default = "default_semantic_min_score")]
    pub min_score: f32,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: DEFAULT_SEMANTIC_MODEL.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            min_score: DEFAULT_SEMANTIC_MIN_SCORE,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_semantic_model() -> String {
    DEFAULT_SEMANTIC_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_semantic_min_score() -> f32 {
    DEFAULT_SEMANTIC_MIN_SCORE
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnBackendKind {
    #[default]
    Hnsw,
    Flat,
    Disabled,
}

impl AnnBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnBackendKind::Hnsw => "hnsw",
            AnnBackendKind::Flat => "flat",
            AnnBackendKind::Disabled => "disabled",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnConfig {
    #[serde(default)]
    pub backend: AnnBackendKind,

    /// Queue items consumed per drain
    #[serde(default = "default_max_drain")]
    pub max_drain: usize,

    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            backend: AnnBackendKind::default(),
            max_drain: default_max_drain(),
            ef_search: default_ef_search(),
        }
    }
}

fn default_max_drain() -> usize {
    200
}

fn default_ef_search() -> usize {
    64
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_fuzzy_hinted_threshold")]
    pub fuzzy_hinted_threshold: f32,
    #[serde(default = "default_fuzzy_all_threshold")]
    pub fuzzy_all_threshold: f32,
    #[serde(default = "default_hinted_pool_factor")]
    pub hinted_pool_factor: usize,
    #[serde(default = "default_all_pool_factor")]
    pub all_pool_factor: usize,
    #[serde(default = "default_substring_pool_factor")]
    pub substring_pool_factor: usize,
    /// Added to a candidate's score when its language equals the hint
    #[serde(default = "default_language_boost")]
    pub language_boost: f32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            fuzzy_hinted_threshold: default_fuzzy_hinted_threshold(),
            fuzzy_all_threshold: default_fuzzy_all_threshold(),
            hinted_pool_factor: default_hinted_pool_factor(),
            all_pool_factor: default_all_pool_factor(),
            substring_pool_factor: default_substring_pool_factor(),
            language_boost: default_language_boost(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_fuzzy_hinted_threshold() -> f32 {
    0.35
}

fn default_fuzzy_all_threshold() -> f32 {
    0.30
}

fn default_hinted_pool_factor() -> usize {
    2
}

fn default_all_pool_factor() -> usize {
    3
}

fn default_substring_pool_factor() -> usize {
    2
}

fn default_language_boost() -> f32 {
    0.05
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_fuzzy_threshold")]
    pub fuzzy_threshold: f32,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_search_fuzzy_threshold(),
            default_limit: default_limit(),
        }
    }
}

fn default_search_fuzzy_threshold() -> f32 {
    0.5
}

fn default_limit() -> usize {
    50
}

/// Relation discovery performed when a new entry is added.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkingConfig {
    #[serde(default = "default_true")]
    pub auto_link: bool,
    #[serde(default = "default_translation_threshold")]
    pub translation_threshold: f32,
    #[serde(default = "default_synonym_threshold")]
    pub synonym_threshold: f32,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            auto_link: true,
            translation_threshold: default_translation_threshold(),
            synonym_threshold: default_synonym_threshold(),
        }
    }
}

fn default_translation_threshold() -> f32 {
    0.5
}

fn default_synonym_threshold() -> f32 {
    0.6
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub semantic: SemanticConfig,
    #[serde(default)]
    pub ann: AnnConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub linking: LinkingConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            semantic: SemanticConfig::default(),
            ann: AnnConfig::default(),
            resolver: ResolverConfig::default(),
            search: SearchConfig::default(),
            linking: LinkingConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn check_unit(name: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!(
            "{name} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sem = &self.semantic;
        check_unit("semantic.min_score", sem.min_score)?;
        if sem.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "semantic.download_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if sem.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "semantic.model must not be empty".to_string(),
            ));
        }

        check_positive("ann.max_drain", self.ann.max_drain)?;
        check_positive("ann.ef_search", self.ann.ef_search)?;

        let res = &self.resolver;
        check_positive("resolver.top_k", res.top_k)?;
        check_unit("resolver.fuzzy_hinted_threshold", res.fuzzy_hinted_threshold)?;
        check_unit("resolver.fuzzy_all_threshold", res.fuzzy_all_threshold)?;
        check_positive("resolver.hinted_pool_factor", res.hinted_pool_factor)?;
        check_positive("resolver.all_pool_factor", res.all_pool_factor)?;
        check_positive("resolver.substring_pool_factor", res.substring_pool_factor)?;
        check_unit("resolver.language_boost", res.language_boost)?;

        check_unit("search.fuzzy_threshold", self.search.fuzzy_threshold)?;
        check_positive("search.default_limit", self.search.default_limit)?;

        check_unit(
            "linking.translation_threshold",
            self.linking.translation_threshold,
        )?;
        check_unit("linking.synonym_threshold", self.linking.synonym_threshold)?;

        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("database must not be empty".to_string()));
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing defaults if it does not
    /// exist yet.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path)?;
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            std::fs::write(&path, serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(self.base_path.join(CONFIG_FILE), config_str)?;
        Ok(())
    }

    /// Defaults rooted at `base_path`, without touching the filesystem.
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn database_path(&self) -> PathBuf {
        let db = Path::new(&self.database);
        if db.is_absolute() {
            db.to_path_buf()
        } else {
            self.base_path.join(db)
        }
    }
}

/// Resolve the data directory: explicit flag, then `$VN_HOME`, then
/// `~/.local/share/vocab-notebook`.
pub fn data_dir(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }

    if let Ok(dir) = std::env::var("VN_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let home = homedir::my_home()?
        .ok_or_else(|| anyhow::anyhow!("unable to determine home directory"))?;
    Ok(home.join(".local").join("share").join("vocab-notebook"))
}
