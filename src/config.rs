//! Configuration for chat-memory

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Which persistence schema the context store uses.
///
/// The two modes are never composed for the same deployment: append-log keeps
/// the full turn history per user, single-slot keeps one JSON blob per user,
/// replaced wholesale on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Append-only log of (prompt, response) turns, ordered by creation time.
    AppendLog,

    /// Exactly one stored context blob per user, upserted on every write.
    SingleSlot,
}

impl StoreMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "append_log" => Ok(Self::AppendLog),
            "single_slot" => Ok(Self::SingleSlot),
            _ => Err(Error::config(format!("Unknown store mode: {}", s))),
        }
    }
}

/// What the store does with an underlying persistence failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorPolicy {
    /// Log the failure and return a benign default (empty history, no-op
    /// write). The caller's request is never failed by the store.
    Suppress,

    /// Surface the underlying error to the caller.
    Propagate,
}

impl StoreErrorPolicy {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "suppress" => Ok(Self::Suppress),
            "propagate" => Ok(Self::Propagate),
            _ => Err(Error::config(format!("Unknown store error policy: {}", s))),
        }
    }
}

/// How historical turns are attributed when assembling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAttribution {
    /// Both the historical prompt and response are emitted as assistant
    /// entries with `Prompt:` / `Response:` prefixes.
    Collapsed,

    /// Historical prompts are user entries, responses assistant entries.
    Split,
}

impl HistoryAttribution {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "collapsed" => Ok(Self::Collapsed),
            "split" => Ok(Self::Split),
            _ => Err(Error::config(format!("Unknown history attribution: {}", s))),
        }
    }
}

/// Connection details for one hosted capability endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Base URL, without a trailing slash
    pub base_url: String,

    /// Bearer token for the endpoint
    pub api_key: String,

    /// Model identifier sent with each request
    pub model: String,
}

/// Configuration for the context store and relay server
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for all storage
    pub data_dir: PathBuf,

    /// Persistence schema for user contexts
    pub store_mode: StoreMode,

    /// Behavior on persistence failure
    pub on_store_error: StoreErrorPolicy,

    /// Attribution of historical turns during context assembly
    pub history_attribution: HistoryAttribution,

    /// Generation endpoint (required by the server binary)
    pub generation: Option<EndpointConfig>,

    /// Maximum tokens requested per generation call
    pub generation_max_tokens: u32,

    /// Embedding endpoint (absent means records are stored without embeddings)
    pub embedding: Option<EndpointConfig>,

    /// Embedding dimensions (768 for the default hosted model)
    pub embedding_dimensions: usize,

    /// Timeout applied to every outbound generation/embedding call
    pub request_timeout_secs: u64,

    /// Exact origin allowed by CORS; any origin when unset
    pub allowed_origin: Option<String>,

    /// HTTP server port
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chat-memory");

        Self {
            data_dir,
            store_mode: StoreMode::AppendLog,
            on_store_error: StoreErrorPolicy::Suppress,
            history_attribution: HistoryAttribution::Collapsed,
            generation: None,
            generation_max_tokens: 512,
            embedding: None,
            embedding_dimensions: 768,
            request_timeout_secs: 120,
            allowed_origin: None,
            server_port: 5000,
        }
    }
}

impl Config {
    /// Create a new config with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load configuration from the environment.
    ///
    /// `GENERATION_BASE_URL` and `GENERATION_API_KEY` must both be set; the
    /// server refuses to start without a generation endpoint. The embedding
    /// endpoint is optional.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = env_var("CHAT_MEMORY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(port) = env_var("CHAT_MEMORY_PORT") {
            config.server_port = port
                .parse()
                .map_err(|_| Error::config(format!("Invalid port: {}", port)))?;
        }

        if let Some(mode) = env_var("STORE_MODE") {
            config.store_mode = StoreMode::parse(&mode)?;
        }

        if let Some(policy) = env_var("ON_STORE_ERROR") {
            config.on_store_error = StoreErrorPolicy::parse(&policy)?;
        }

        if let Some(attribution) = env_var("HISTORY_ATTRIBUTION") {
            config.history_attribution = HistoryAttribution::parse(&attribution)?;
        }

        config.generation = Some(Self::generation_endpoint_from_env()?);

        if let Some(max_tokens) = env_var("GENERATION_MAX_TOKENS") {
            config.generation_max_tokens = max_tokens
                .parse()
                .map_err(|_| Error::config(format!("Invalid max tokens: {}", max_tokens)))?;
        }

        config.embedding = Self::embedding_endpoint_from_env()?;

        if let Some(dims) = env_var("EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = dims
                .parse()
                .map_err(|_| Error::config(format!("Invalid embedding dimensions: {}", dims)))?;
        }

        if let Some(secs) = env_var("REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = secs
                .parse()
                .map_err(|_| Error::config(format!("Invalid timeout: {}", secs)))?;
        }

        config.allowed_origin = env_var("ALLOWED_ORIGIN");

        Ok(config)
    }

    fn generation_endpoint_from_env() -> Result<EndpointConfig> {
        let base_url = env_var("GENERATION_BASE_URL")
            .ok_or_else(|| Error::config("GENERATION_BASE_URL must be set"))?;
        let api_key = env_var("GENERATION_API_KEY")
            .ok_or_else(|| Error::config("GENERATION_API_KEY must be set"))?;
        let model = env_var("GENERATION_MODEL")
            .unwrap_or_else(|| "deepseek-ai/DeepSeek-V3-0324".to_string());

        Ok(EndpointConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    fn embedding_endpoint_from_env() -> Result<Option<EndpointConfig>> {
        let base_url = match env_var("EMBEDDING_BASE_URL") {
            Some(url) => url,
            None => return Ok(None),
        };
        let api_key = env_var("EMBEDDING_API_KEY")
            .ok_or_else(|| Error::config("EMBEDDING_API_KEY must be set when EMBEDDING_BASE_URL is"))?;
        let model = env_var("EMBEDDING_MODEL").unwrap_or_else(|| "embedding-001".to_string());

        Ok(Some(EndpointConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }))
    }

    /// Get the path to the SQLite database
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("contexts.db")
    }

    /// Timeout for outbound capability calls
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.store_mode, StoreMode::AppendLog);
        assert_eq!(config.on_store_error, StoreErrorPolicy::Suppress);
        assert_eq!(config.history_attribution, HistoryAttribution::Collapsed);
        assert_eq!(config.embedding_dimensions, 768);
        assert_eq!(config.generation_max_tokens, 512);
        assert_eq!(config.server_port, 5000);
        assert!(config.generation.is_none());
        assert!(config.embedding.is_none());
    }

    #[test]
    fn parse_store_mode() {
        assert_eq!(StoreMode::parse("append_log").unwrap(), StoreMode::AppendLog);
        assert_eq!(StoreMode::parse("single_slot").unwrap(), StoreMode::SingleSlot);
        assert!(StoreMode::parse("both").is_err());
    }

    #[test]
    fn parse_error_policy() {
        assert_eq!(
            StoreErrorPolicy::parse("suppress").unwrap(),
            StoreErrorPolicy::Suppress
        );
        assert_eq!(
            StoreErrorPolicy::parse("propagate").unwrap(),
            StoreErrorPolicy::Propagate
        );
        assert!(StoreErrorPolicy::parse("ignore").is_err());
    }

    #[test]
    fn parse_history_attribution() {
        assert_eq!(
            HistoryAttribution::parse("collapsed").unwrap(),
            HistoryAttribution::Collapsed
        );
        assert_eq!(
            HistoryAttribution::parse("split").unwrap(),
            HistoryAttribution::Split
        );
        assert!(HistoryAttribution::parse("merged").is_err());
    }

    #[test]
    fn sqlite_path_under_data_dir() {
        let config = Config::with_data_dir("/tmp/cm-test");
        assert_eq!(config.sqlite_path(), PathBuf::from("/tmp/cm-test/contexts.db"));
    }
}
