//! Configuration module for the search engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.docseek/settings.toml`, found by walking up
//!   from the current directory)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DOCSEEK_` and use double
//! underscores to separate nested levels:
//! - `DOCSEEK_INDEX__METRIC=cosine` sets `index.metric`
//! - `DOCSEEK_EMBEDDING__BACKEND=hash` sets `embedding.backend`
//! - `DOCSEEK_SEARCH__DEFAULT_LIMIT=20` sets `search.default_limit`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-workspace configuration directory.
pub const CONFIG_DIR: &str = ".docseek";

/// Name of the settings file inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "DOCSEEK_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Index file, relative to the workspace root
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Corpus used to resolve results (and to rebuild the index)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<PathBuf>,

    /// Workspace root directory (where .docseek is located)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Worker threads for embedding, clustering and large scans
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub search: SearchConfig,

    /// Settings for `docseek serve`
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// "fastembed" or "hash"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// fastembed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Output dimension of the hash backend
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Texts embedded per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Where downloaded models are cached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexConfig {
    /// "auto", "flat" or "partitioned"
    #[serde(default = "default_variant")]
    pub variant: String,

    /// "l2" or "cosine"
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Partition count; derived from the corpus size when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<usize>,

    /// Partitions probed per query; derived from `partitions` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probes: Option<usize>,

    /// Seed for partition training
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Corpus size from which "auto" builds a partitioned index
    #[serde(default = "default_flat_threshold")]
    pub flat_threshold: usize,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Vectors used to train partitions; 256 per partition when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_sample: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    /// Results returned when no limit is given
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Upper bound on requested limits
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Reload the index file when it changes
    #[serde(default = "default_true")]
    pub watch: bool,

    /// Seconds between index file checks
    #[serde(default = "default_watch_interval")]
    pub watch_interval: u64,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".docseek/index.dskx")
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_backend() -> String {
    "fastembed".to_string()
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_dimension() -> usize {
    crate::vector::VECTOR_DIMENSION_384
}
fn default_batch_size() -> usize {
    64
}
fn default_variant() -> String {
    "auto".to_string()
}
fn default_metric() -> String {
    "l2".to_string()
}
fn default_seed() -> u64 {
    crate::vector::DEFAULT_SEED
}
fn default_flat_threshold() -> usize {
    crate::vector::DEFAULT_FLAT_THRESHOLD
}
fn default_max_iterations() -> usize {
    crate::vector::DEFAULT_MAX_ITERATIONS
}
fn default_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    50
}
fn default_watch_interval() -> u64 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            corpus_path: None,
            workspace_root: None,
            debug: false,
            parallel_threads: default_parallel_threads(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            cache_dir: None,
            show_download_progress: true,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            metric: default_metric(),
            partitions: None,
            probes: None,
            seed: default_seed(),
            flat_threshold: default_flat_threshold(),
            max_iterations: default_max_iterations(),
            training_sample: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            watch: true,
            watch_interval: default_watch_interval(),
        }
    }
}

impl ServerConfig {
    /// Whether `serve` reloads the index; a command-line choice wins over
    /// the configured default.
    #[must_use]
    pub fn watch_enabled(&self, requested: Option<bool>) -> bool {
        requested.unwrap_or(self.watch)
    }
}

impl EmbeddingConfig {
    /// Model cache directory: `cache_dir` if set, else the user cache dir.
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|dir| dir.join("docseek").join("models"))
                .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("models"))
        })
    }
}

impl SearchConfig {
    /// Applies the default and the upper bound to a requested limit.
    #[must_use]
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        let path = path.as_ref();
        Self::figment(path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = workspace_of(path);
                }
                settings
            })
    }

    /// Defaults, then the TOML file, then `DOCSEEK_` environment variables.
    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name.
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for a .docseek directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .docseek is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Resolves a configured path against the workspace root.
    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Absolute location of the index file.
    #[must_use]
    pub fn index_file(&self) -> PathBuf {
        self.resolve_path(&self.index_path)
    }

    /// Absolute location of the corpus file, if one is configured.
    #[must_use]
    pub fn corpus_file(&self) -> Option<PathBuf> {
        self.corpus_path.as_deref().map(|p| self.resolve_path(p))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let current_dir = std::env::current_dir()?;
        Self::init_config_file_in(&current_dir, force)
    }

    /// Create a default settings file with helpful comments under `root`
    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# docseek configuration file

# Version of the configuration schema
version = 1

# Index file (relative to the workspace root)
index_path = ".docseek/index.dskx"

# Corpus (.json array or .jsonl) used to resolve search results
# corpus_path = "corpus.jsonl"

# Global debug mode
debug = false

# Worker threads for embedding, clustering and large scans (defaults to CPU count)
# parallel_threads = {threads}

[embedding]
# "fastembed" runs a sentence-embedding model (downloaded on first use)
# "hash" hashes words into buckets; no download, weaker ranking
backend = "fastembed"

# fastembed model: AllMiniLML6V2 (384-d), BGESmallENV15 (384-d),
# BGEBaseENV15 (768-d), AllMiniLML12V2, MultilingualE5Small, ...
model = "AllMiniLML6V2"

# Output dimension of the hash backend
dimension = 384

# Texts embedded per batch while building
batch_size = 64

# Model cache directory (defaults to the user cache directory)
# cache_dir = "/path/to/models"

show_download_progress = true

[index]
# "auto" (flat below flat_threshold documents, partitioned above),
# "flat" (exact) or "partitioned" (approximate, faster on large corpora)
variant = "auto"

# Distance metric: "l2" or "cosine"
metric = "l2"

# Partition count (defaults to ceil(sqrt(documents)))
# partitions = 256

# Partitions scanned per query (defaults to partitions / 16)
# probes = 16

# Seed for partition training; same seed and corpus give the same index
seed = 42

flat_threshold = 10000
max_iterations = 25

[search]
# Results returned when no limit is given
default_limit = 10

# Upper bound on the number of results
max_limit = 50

[server]
# Reload the index when the file changes
watch = true

# Seconds between index file checks
watch_interval = 5
"#,
            threads = num_cpus::get()
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}

/// Workspace root of a settings file at `<root>/.docseek/settings.toml`.
fn workspace_of(config_path: &Path) -> Option<PathBuf> {
    let dir = config_path.parent()?;
    if dir.file_name()? == CONFIG_DIR {
        dir.parent().map(Path::to_path_buf)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.index_path, PathBuf::from(".docseek/index.dskx"));
        assert!(settings.parallel_threads > 0);
        assert_eq!(settings.embedding.backend, "fastembed");
        assert_eq!(settings.index.flat_threshold, 10_000);
        assert_eq!(settings.search.default_limit, 10);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2
corpus_path = "docs.jsonl"

[embedding]
backend = "hash"
dimension = 128

[index]
variant = "partitioned"
partitions = 32
metric = "cosine"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.corpus_path, Some(PathBuf::from("docs.jsonl")));
        assert_eq!(settings.embedding.backend, "hash");
        assert_eq!(settings.embedding.dimension, 128);
        assert_eq!(settings.index.partitions, Some(32));
        assert_eq!(settings.index.probes, None);
        // Unspecified values keep their defaults
        assert_eq!(settings.embedding.batch_size, 64);
        assert_eq!(settings.search.max_limit, 50);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.index.max_iterations = 7;
        settings.index.probes = Some(3);
        settings.server.watch = false;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.index.max_iterations, 7);
        assert_eq!(loaded.index.probes, Some(3));
        assert!(!loaded.server.watch);
    }

    #[test]
    fn test_watch_flag_overrides_settings() {
        let mut server = ServerConfig::default();
        assert!(server.watch_enabled(None));
        assert!(!server.watch_enabled(Some(false)));

        server.watch = false;
        assert!(!server.watch_enabled(None));
        assert!(server.watch_enabled(Some(true)));
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file_in(temp_dir.path(), false).unwrap();
        assert_eq!(path, temp_dir.path().join(".docseek/settings.toml"));

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Settings = toml::from_str(&content).unwrap();
        let defaults = Settings::default();
        assert_eq!(parsed.embedding, defaults.embedding);
        assert_eq!(parsed.index, defaults.index);
        assert_eq!(parsed.search, defaults.search);
        assert_eq!(parsed.server, defaults.server);

        // A second init without force refuses to overwrite
        assert!(Settings::init_config_file_in(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file_in(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_workspace_root_from_config_location() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file_in(temp_dir.path(), false).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.workspace_root.as_deref(), Some(temp_dir.path()));
        assert_eq!(
            settings.index_file(),
            temp_dir.path().join(".docseek/index.dskx")
        );
        assert_eq!(settings.corpus_file(), None);
    }

    #[test]
    fn test_effective_limit() {
        let search = SearchConfig::default();
        assert_eq!(search.effective_limit(None), 10);
        assert_eq!(search.effective_limit(Some(0)), 1);
        assert_eq!(search.effective_limit(Some(500)), 50);
    }

    #[test]
    fn test_layer_precedence() {
        Jail::expect_with(|jail| {
            jail.create_dir(".docseek")?;
            jail.create_file(
                ".docseek/settings.toml",
                r#"
[index]
metric = "cosine"
seed = 9

[search]
default_limit = 25
"#,
            )?;
            jail.set_env("DOCSEEK_INDEX__SEED", "11");
            jail.set_env("DOCSEEK_EMBEDDING__BACKEND", "hash");

            let settings = Settings::load().expect("settings load");

            // Environment overrides the file
            assert_eq!(settings.index.seed, 11);
            // File overrides defaults
            assert_eq!(settings.index.metric, "cosine");
            assert_eq!(settings.search.default_limit, 25);
            // Env adds values the file does not set
            assert_eq!(settings.embedding.backend, "hash");
            // Defaults fill the rest
            assert_eq!(settings.server.watch_interval, 5);
            assert!(settings.workspace_root.is_some());
            Ok(())
        });
    }
}
