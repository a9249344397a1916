#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persistence for canonical providers.
//!
//! Providers are keyed by `(scope, uniqueId)`. A scope is the working set of
//! one caller (a session, a tenant, a CLI run); searches replace the
//! contents of their own scope and never touch another's. Two backends are
//! provided: [`memory::MemoryProviderStore`] (default) and, behind the
//! `duckdb` feature, [`duckdb_store::DuckDbProviderStore`].

#[cfg(feature = "duckdb")]
pub mod duckdb_store;
pub mod filter;
pub mod memory;

use async_trait::async_trait;
use medlocate_provider_models::{CanonicalProvider, ErrorKind};

pub use filter::{OpenAt, ProviderFilter, ProviderMatch};

/// Scope used when a caller does not supply one.
pub const DEFAULT_SCOPE: &str = "default";

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A stored document could not be (de)serialized.
    #[error("Document serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The filter is malformed (bad regex, out-of-range distance, ...).
    #[error("Invalid filter: {message}")]
    InvalidFilter {
        /// Description of what went wrong.
        message: String,
    },

    /// A blocking storage task panicked or was cancelled.
    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// `DuckDB` error.
    #[cfg(feature = "duckdb")]
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] ::duckdb::Error),
}

impl StoreError {
    /// Failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFilter { .. } => ErrorKind::InvalidInput,
            _ => ErrorKind::Internal,
        }
    }
}

/// Scoped provider persistence.
///
/// `upsert_many` is an insert-or-replace keyed by `uniqueId`, so concurrent
/// writers on different ids never lose updates.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Removes every provider in `scope`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn clear_scope(&self, scope: &str) -> Result<usize, StoreError>;

    /// Inserts or replaces `providers` in `scope`, returning how many were
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn upsert_many(
        &self,
        scope: &str,
        providers: &[CanonicalProvider],
    ) -> Result<usize, StoreError>;

    /// Replaces the whole contents of `scope` with `providers` in one step.
    /// On failure the previous contents are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn replace_scope(
        &self,
        scope: &str,
        providers: &[CanonicalProvider],
    ) -> Result<usize, StoreError>;

    /// Looks up one provider.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn get(
        &self,
        scope: &str,
        unique_id: &str,
    ) -> Result<Option<CanonicalProvider>, StoreError>;

    /// All providers in `scope`, ordered by `uniqueId`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn list(&self, scope: &str) -> Result<Vec<CanonicalProvider>, StoreError>;

    /// Providers in `scope` matching `filter`. With an origin, results are
    /// sorted by distance; otherwise they keep `uniqueId` order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFilter`] for a malformed filter, or a
    /// backend error.
    async fn filter(
        &self,
        scope: &str,
        filter: &ProviderFilter,
    ) -> Result<Vec<ProviderMatch>, StoreError> {
        let compiled = filter.compile()?;
        let providers = self.list(scope).await?;
        Ok(compiled.apply(providers))
    }
}
