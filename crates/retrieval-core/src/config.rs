use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Boundary separators from strongest to weakest.
pub const DEFAULT_SEPARATORS: [&str; 7] = ["\n\n\n", "\n\n", "\n", ". ", "; ", ", ", " "];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum characters in a chunk's fresh body. The overlap prefix is
    /// added on top, so a chunk's text may reach `target_size + overlap`.
    pub target_size: usize,
    /// Characters repeated from the previous chunk; must stay below `target_size`.
    pub overlap: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: 500,
            overlap: 100,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ChunkingConfig {
    pub fn new(target_size: usize, overlap: usize) -> Self {
        Self { target_size, overlap, ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(Error::config("chunking.target_size must be positive"));
        }
        if self.overlap >= self.target_size {
            return Err(Error::config(format!(
                "chunking.overlap ({}) must be smaller than chunking.target_size ({})",
                self.overlap, self.target_size
            )));
        }
        if self.separators.is_empty() {
            return Err(Error::config("chunking.separators must not be empty"));
        }
        if self.separators.iter().any(|s| s.is_empty()) {
            return Err(Error::config("chunking.separators must not contain an empty separator"));
        }
        Ok(())
    }
}

/// Okapi BM25 parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Length normalization strength, 0 disables it.
    pub b: f32,
    pub stop_words: bool,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75, stop_words: true }
    }
}

impl LexicalConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.k1 >= 0.0 && self.k1.is_finite()) {
            return Err(Error::config(format!("lexical.k1 must be a non-negative number, got {}", self.k1)));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(Error::config(format!("lexical.b must lie in [0, 1], got {}", self.b)));
        }
        Ok(())
    }
}

/// Tunables for one retrieval session. Immutable once the session is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub chunking: ChunkingConfig,
    pub lexical: LexicalConfig,
    /// Candidates requested from each index per query.
    pub top_k: usize,
    /// Final number of chunks after diversification.
    pub rerank_k: usize,
    /// Per-source cap; `None` means `ceil(rerank_k / 2)`.
    pub max_per_source: Option<usize>,
    /// Semantic weight in `[0, 1]`; the lexical weight is `1 - alpha`.
    pub alpha: f32,
    /// Minimum similarity for a semantic candidate to be considered at all.
    pub relevance_floor: f32,
    pub embed_batch_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            lexical: LexicalConfig::default(),
            top_k: 8,
            rerank_k: 3,
            max_per_source: None,
            alpha: 0.7,
            relevance_floor: 0.5,
            embed_batch_size: 32,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.lexical.validate()?;
        if self.top_k == 0 {
            return Err(Error::config("top_k must be positive"));
        }
        if self.rerank_k == 0 {
            return Err(Error::config("rerank_k must be positive"));
        }
        if self.rerank_k > self.top_k {
            return Err(Error::config(format!(
                "rerank_k ({}) must not exceed top_k ({})",
                self.rerank_k, self.top_k
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::config(format!("alpha must lie in [0, 1], got {}", self.alpha)));
        }
        if self.max_per_source == Some(0) {
            return Err(Error::config("max_per_source must be positive"));
        }
        if !(0.0..=1.0).contains(&self.relevance_floor) {
            return Err(Error::config(format!(
                "relevance_floor must lie in [0, 1], got {}",
                self.relevance_floor
            )));
        }
        if self.embed_batch_size == 0 {
            return Err(Error::config("embed_batch_size must be positive"));
        }
        Ok(())
    }

    pub fn effective_max_per_source(&self) -> usize {
        self.max_per_source.unwrap_or_else(|| default_max_per_source(self.rerank_k))
    }
}

/// `ceil(final_k / 2)`, so no single document can fill the whole context.
pub fn default_max_per_source(final_k: usize) -> usize {
    final_k.div_ceil(2).max(1)
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    /// Merge `config.toml`, `config.<env>.toml` and `APP_*` variables found
    /// relative to `dir`.
    pub fn load_from(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn get_or<T>(&self, key: &str, default: T) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if self.figment.contains(key) { self.get(key) } else { Ok(default) }
    }

    /// The validated `[retrieval]` table, defaults when absent.
    pub fn retrieval(&self) -> anyhow::Result<RetrievalConfig> {
        let config: RetrievalConfig = self.get_or("retrieval", RetrievalConfig::default())?;
        config.validate()?;
        Ok(config)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
