//! # Chat Memory
//!
//! A conversation-context store with pluggable embedding, plus the thin relay
//! backend that forwards user prompts to a hosted inference endpoint.
//!
//! ## Architecture
//!
//! - **Context Store** - per-user (prompt, response, embedding) records in
//!   SQLite, in one of two modes: an append-only turn log or a single
//!   upserted blob per user
//! - **Context Assembler** - linearizes stored history and a new prompt into
//!   an ordered message sequence
//! - **Embedding Provider** - hosted text-to-vector endpoint, degraded to a
//!   zero vector on failure
//! - **Generation** - hosted chat-completions endpoint
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chat_memory::{Config, ContextAssembler, ContextStore};
//!
//! let config = Config::from_env()?;
//! let store = ContextStore::new(&config)?;
//! let assembler = ContextAssembler::new(config.history_attribution);
//!
//! let history = store.list_by_user(user_id)?;
//! let messages = assembler.assemble(&history, prompt);
//! // ... call generation, then:
//! store.append(user_id, prompt, &answer, None)?;
//! ```

pub mod assembler;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod record;
pub mod storage;
pub mod store;

pub use assembler::ContextAssembler;
pub use config::{Config, HistoryAttribution, StoreErrorPolicy, StoreMode};
pub use embedding::{EmbeddingProvider, HttpEmbeddingClient, ZeroFallback};
pub use error::{Error, Result};
pub use generation::{ChatCompletionClient, Generator};
pub use record::{ChatMessage, ContextRecord, Role};
pub use store::ContextStore;
