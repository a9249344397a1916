//! Provider store backed by `DuckDB`.
//!
//! Each provider is one JSON document in the `providers` table, keyed by
//! `(scope, unique_id)`. The connection is synchronous, so every call runs
//! on the blocking pool.

use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use ::duckdb::Connection;
use async_trait::async_trait;
use medlocate_provider_models::CanonicalProvider;

use crate::{ProviderStore, StoreError};

/// Persistent provider store.
#[derive(Clone)]
pub struct DuckDbProviderStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for DuckDbProviderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbProviderStore").finish_non_exhaustive()
    }
}

impl DuckDbProviderStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await?
    }
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS providers (
            scope TEXT NOT NULL,
            unique_id TEXT NOT NULL,
            doc TEXT NOT NULL,
            updated_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (scope, unique_id)
        );",
    )?;
    Ok(())
}

/// Serializes `providers` into `(unique_id, doc)` rows.
fn to_docs(providers: &[CanonicalProvider]) -> Result<Vec<(String, String)>, StoreError> {
    providers
        .iter()
        .map(|p| Ok((p.unique_id.clone(), serde_json::to_string(p)?)))
        .collect()
}

fn insert_docs(
    conn: &Connection,
    scope: &str,
    docs: &[(String, String)],
) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare(
        "INSERT INTO providers (scope, unique_id, doc, updated_at)
         VALUES (?, ?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT (scope, unique_id)
         DO UPDATE SET doc = excluded.doc, updated_at = excluded.updated_at",
    )?;
    for (unique_id, doc) in docs {
        stmt.execute(::duckdb::params![scope, unique_id, doc])?;
    }
    Ok(docs.len())
}

#[async_trait]
impl ProviderStore for DuckDbProviderStore {
    async fn clear_scope(&self, scope: &str) -> Result<usize, StoreError> {
        let scope = scope.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute(
                "DELETE FROM providers WHERE scope = ?",
                ::duckdb::params![scope],
            )?)
        })
        .await
    }

    async fn upsert_many(
        &self,
        scope: &str,
        providers: &[CanonicalProvider],
    ) -> Result<usize, StoreError> {
        if providers.is_empty() {
            return Ok(0);
        }

        let scope = scope.to_string();
        let docs = to_docs(providers)?;

        self.with_conn(move |conn| {
            let written = insert_docs(conn, &scope, &docs)?;
            log::debug!("Upserted {written} providers into scope {scope}");
            Ok(written)
        })
        .await
    }

    async fn replace_scope(
        &self,
        scope: &str,
        providers: &[CanonicalProvider],
    ) -> Result<usize, StoreError> {
        let scope = scope.to_string();
        let docs = to_docs(providers)?;

        self.with_conn(move |conn| {
            // Dropping the transaction on an error path rolls it back.
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM providers WHERE scope = ?",
                ::duckdb::params![scope],
            )?;
            let written = insert_docs(&tx, &scope, &docs)?;
            tx.commit()?;
            log::debug!("Replaced {removed} providers in scope {scope} with {written}");
            Ok(written)
        })
        .await
    }

    async fn get(
        &self,
        scope: &str,
        unique_id: &str,
    ) -> Result<Option<CanonicalProvider>, StoreError> {
        let scope = scope.to_string();
        let unique_id = unique_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT doc FROM providers WHERE scope = ? AND unique_id = ?")?;
            let mut rows = stmt.query(::duckdb::params![scope, unique_id])?;
            match rows.next()? {
                Some(row) => {
                    let doc: String = row.get(0)?;
                    Ok(Some(serde_json::from_str(&doc)?))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn list(&self, scope: &str) -> Result<Vec<CanonicalProvider>, StoreError> {
        let scope = scope.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT doc FROM providers WHERE scope = ? ORDER BY unique_id")?;
            let mut rows = stmt.query(::duckdb::params![scope])?;
            let mut providers = Vec::new();
            while let Some(row) = rows.next()? {
                let doc: String = row.get(0)?;
                providers.push(serde_json::from_str(&doc)?);
            }
            Ok(providers)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::provider;

    #[tokio::test]
    async fn round_trips_documents_per_scope() {
        let store = DuckDbProviderStore::open_in_memory().unwrap();
        let mut clinic = provider("OSM_node-1", "Clinic", 6.6, 3.3);
        clinic.location.address.city = Some("Ikeja".to_string());

        assert_eq!(store.upsert_many("a", &[clinic.clone()]).await.unwrap(), 1);
        clinic.name = "Renamed Clinic".to_string();
        store.upsert_many("a", &[clinic.clone()]).await.unwrap();
        store
            .upsert_many("b", &[provider("FS_2", "Other", 1.0, 1.0)])
            .await
            .unwrap();

        let listed = store.list("a").await.unwrap();
        assert_eq!(listed, vec![clinic]);
        assert!(store.get("a", "FS_2").await.unwrap().is_none());

        assert_eq!(store.clear_scope("a").await.unwrap(), 1);
        assert!(store.list("a").await.unwrap().is_empty());
        assert_eq!(store.list("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_scope_swaps_the_result_set() {
        let store = DuckDbProviderStore::open_in_memory().unwrap();
        store
            .upsert_many(
                "a",
                &[
                    provider("OSM_node-1", "Clinic", 6.6, 3.3),
                    provider("FS_2", "Other", 6.6, 3.3),
                ],
            )
            .await
            .unwrap();

        let replacement = provider("GOOGLE_3", "Hospital", 6.7, 3.4);
        assert_eq!(
            store
                .replace_scope("a", &[replacement.clone()])
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.list("a").await.unwrap(), vec![replacement]);

        assert_eq!(store.replace_scope("a", &[]).await.unwrap(), 0);
        assert!(store.list("a").await.unwrap().is_empty());
    }
}
