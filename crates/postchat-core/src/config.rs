//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (nested with `__`), then the legacy
//! `AI_HOST` / `AI_MODEL` variables for the generation endpoint, which take
//! precedence. The loaded [`Settings`] are handed to each component at
//! construction time.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
    pub chunking: ChunkingSettings,
    pub queue: QueueSettings,
    pub chat: ChatSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub host: String,
    pub model: String,
    /// Expected vector length; responses of another length are rejected.
    pub dimension: Option<usize>,
    pub timeout_secs: u64,
    pub use_fake: bool,
    /// Entries kept by the worker's embedding cache, `0` disables it.
    pub cache_capacity: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: None,
            timeout_secs: 30,
            use_fake: false,
            cache_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    pub host: String,
    pub path: String,
    pub model: String,
    /// Longest silence allowed between reads of a streamed answer.
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            path: "/api/generate".to_string(),
            model: "llama3".to_string(),
            timeout_secs: 120,
        }
    }
}

impl GenerationSettings {
    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.host.trim_end_matches('/'), self.path.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingSettings {
    pub max_tokens: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { max_tokens: 200, overlap_percent: 0.2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueSettings {
    pub workers: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            workers: 10,
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatSettings {
    /// Refuse questions until the post's embeddings are stored.
    pub require_embeddings_ready: bool,
    /// Answer greetings/thanks/farewells without retrieval or generation.
    pub short_circuit_small_talk: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self { require_embeddings_ready: true, short_circuit_small_talk: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.generation.host.trim().is_empty() {
            return invalid("generation.host must be set (APP_GENERATION__HOST or AI_HOST)");
        }
        if self.generation.model.trim().is_empty() {
            return invalid("generation.model must be set (APP_GENERATION__MODEL or AI_MODEL)");
        }
        if !self.embedding.use_fake
            && (self.embedding.host.trim().is_empty() || self.embedding.model.trim().is_empty())
        {
            return invalid("embedding.host and embedding.model must be set");
        }
        if self.embedding.dimension == Some(0) {
            return invalid("embedding.dimension must be positive");
        }
        if self.retrieval.top_k == 0 {
            return invalid("retrieval.top_k must be at least 1");
        }
        if self.chunking.max_tokens == 0 {
            return invalid("chunking.max_tokens must be at least 1");
        }
        if !(0.0..=0.5).contains(&self.chunking.overlap_percent) {
            return invalid("chunking.overlap_percent must be within [0, 0.5]");
        }
        if self.queue.workers == 0 {
            return invalid("queue.workers must be at least 1");
        }
        if self.queue.max_attempts == 0 {
            return invalid("queue.max_attempts must be at least 1");
        }
        if self.queue.backoff_multiplier < 1.0 {
            return invalid("queue.backoff_multiplier must be >= 1");
        }
        Ok(())
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    /// Load with config files resolved against `dir` for the given environment.
    pub fn load_from(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        // Legacy AI_HOST / AI_MODEL are merged last and win over APP_*.
        figment = figment.merge(Env::prefixed("APP_").split("__")).merge(
            Env::raw().only(&["AI_HOST", "AI_MODEL"]).map(|key| {
                if key.as_str().eq_ignore_ascii_case("ai_host") {
                    "generation.host".into()
                } else {
                    "generation.model".into()
                }
            }),
        );

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(format!("Failed to load settings: {}", e)))
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
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
