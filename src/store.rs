//! The context store facade: mode selection and the error-policy boundary
//!
//! Concurrent requests for the same user are not serialized here. Two
//! in-flight requests can interleave their list/append calls; ordering is
//! whatever the backing timestamps provide.

use tracing::warn;

use crate::config::{Config, StoreErrorPolicy, StoreMode};
use crate::error::{Error, Result};
use crate::record::ContextRecord;
use crate::storage::{AppendLogStorage, SingleSlotStorage};

enum Backend {
    AppendLog(AppendLogStorage),
    SingleSlot(SingleSlotStorage),
}

/// Durable, queryable persistence of per-user context.
///
/// The backend is chosen once at construction by `StoreMode`; the append-log
/// and single-slot schemas are never mixed for one deployment. Underlying
/// persistence failures are handled per `StoreErrorPolicy`: under `Suppress`
/// (the default) writes silently become no-ops and reads come back empty,
/// with a `warn` diagnostic; under `Propagate` the error surfaces.
pub struct ContextStore {
    backend: Backend,
    policy: StoreErrorPolicy,
}

impl ContextStore {
    /// Create a store from configuration
    pub fn new(config: &Config) -> Result<Self> {
        config.ensure_dirs()?;

        let backend = match config.store_mode {
            StoreMode::AppendLog => Backend::AppendLog(AppendLogStorage::new(config)?),
            StoreMode::SingleSlot => Backend::SingleSlot(SingleSlotStorage::new(config)?),
        };

        Ok(Self {
            backend,
            policy: config.on_store_error,
        })
    }

    /// The mode this store was constructed in
    pub fn mode(&self) -> StoreMode {
        match self.backend {
            Backend::AppendLog(_) => StoreMode::AppendLog,
            Backend::SingleSlot(_) => StoreMode::SingleSlot,
        }
    }

    /// Append one completed turn for a user.
    ///
    /// Best-effort under the suppress policy: the caller's request already
    /// completed with a generated answer, so a persistence failure is logged
    /// and swallowed rather than surfaced.
    pub fn append(
        &self,
        user_id: &str,
        prompt: &str,
        response: &str,
        embedding: Option<&[f32]>,
    ) -> Result<()> {
        require_user_id(user_id)?;

        let storage = match &self.backend {
            Backend::AppendLog(s) => s,
            Backend::SingleSlot(_) => {
                return Err(Error::invalid_input("append requires an append-log store"))
            }
        };

        match storage.insert(user_id, prompt, response, embedding) {
            Ok(_) => Ok(()),
            Err(e) => self.handle_write_failure("append", e),
        }
    }

    /// List all stored turns for a user, oldest first.
    ///
    /// Under the suppress policy a retrieval failure and "no history" are
    /// indistinguishable: both are an empty sequence.
    pub fn list_by_user(&self, user_id: &str) -> Result<Vec<ContextRecord>> {
        require_user_id(user_id)?;

        let storage = match &self.backend {
            Backend::AppendLog(s) => s,
            Backend::SingleSlot(_) => {
                return Err(Error::invalid_input(
                    "list_by_user requires an append-log store",
                ))
            }
        };

        match storage.list_by_user(user_id) {
            Ok(records) => Ok(records),
            Err(e) => match self.policy {
                StoreErrorPolicy::Suppress => {
                    warn!(error = %e, user_id, "Failed to list user contexts, returning empty");
                    Ok(Vec::new())
                }
                StoreErrorPolicy::Propagate => Err(e),
            },
        }
    }

    /// Replace the single stored context blob for a user
    pub fn upsert_single(
        &self,
        user_id: &str,
        context: &serde_json::Value,
        embedding: &[f32],
    ) -> Result<()> {
        require_user_id(user_id)?;

        let storage = match &self.backend {
            Backend::SingleSlot(s) => s,
            Backend::AppendLog(_) => {
                return Err(Error::invalid_input(
                    "upsert_single requires a single-slot store",
                ))
            }
        };

        match storage.upsert(user_id, context, embedding) {
            Ok(()) => Ok(()),
            Err(e) => self.handle_write_failure("upsert_single", e),
        }
    }

    /// Get the single stored context blob for a user
    pub fn get_single(&self, user_id: &str) -> Result<Option<serde_json::Value>> {
        require_user_id(user_id)?;

        let storage = match &self.backend {
            Backend::SingleSlot(s) => s,
            Backend::AppendLog(_) => {
                return Err(Error::invalid_input(
                    "get_single requires a single-slot store",
                ))
            }
        };

        match storage.get(user_id) {
            Ok(context) => Ok(context),
            Err(e) => match self.policy {
                StoreErrorPolicy::Suppress => {
                    warn!(error = %e, user_id, "Failed to get user context, returning none");
                    Ok(None)
                }
                StoreErrorPolicy::Propagate => Err(e),
            },
        }
    }

    fn handle_write_failure(&self, op: &str, e: Error) -> Result<()> {
        match self.policy {
            StoreErrorPolicy::Suppress => {
                warn!(error = %e, op, "Store write failed, continuing");
                Ok(())
            }
            StoreErrorPolicy::Propagate => Err(e),
        }
    }
}

fn require_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(Error::invalid_input("user_id must be non-empty"));
    }
    Ok(())
}
