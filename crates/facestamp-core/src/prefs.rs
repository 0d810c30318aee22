//! Per-user fallback-anchor preferences.
//!
//! A tiny persistent key-value mapping consulted only on the no-face
//! fallback path. The backing store is an injected capability; the
//! shipped backend is SQLite. Lookups never fail the pipeline: a miss,
//! an unknown token or a backend error all degrade to the default
//! anchor.

use crate::types::VerticalAnchor;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreferenceStoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create data directory {0}: {1}")]
    DataDir(String, String),
}

/// Backing-store contract: raw token in, raw token out. Tokens are
/// stored exactly as received; mapping to an anchor happens at the
/// point of use, never at storage time.
pub trait PreferenceBackend: Send {
    fn find(&self, user_id: &str) -> Result<Option<String>, PreferenceStoreError>;
    fn upsert(&self, user_id: &str, token: &str) -> Result<(), PreferenceStoreError>;
}

/// SQLite-backed preference storage: one row per user, last write wins.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self, PreferenceStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PreferenceStoreError::DataDir(parent.display().to_string(), e.to_string())
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store, used by tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self, PreferenceStoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PreferenceStoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS preferences (
                user_id TEXT PRIMARY KEY,
                anchor  TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }
}

impl PreferenceBackend for SqliteBackend {
    fn find(&self, user_id: &str) -> Result<Option<String>, PreferenceStoreError> {
        let token = self
            .conn
            .query_row(
                "SELECT anchor FROM preferences WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(token)
    }

    fn upsert(&self, user_id: &str, token: &str) -> Result<(), PreferenceStoreError> {
        self.conn.execute(
            "INSERT INTO preferences (user_id, anchor) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET anchor = excluded.anchor",
            [user_id, token],
        )?;
        Ok(())
    }
}

/// Preference store with default-on-miss semantics.
pub struct PreferenceStore {
    backend: Box<dyn PreferenceBackend>,
}

impl PreferenceStore {
    pub fn new(backend: Box<dyn PreferenceBackend>) -> Self {
        Self { backend }
    }

    /// Open the shipped SQLite backend at `path`.
    pub fn open(path: &Path) -> Result<Self, PreferenceStoreError> {
        Ok(Self::new(Box::new(SqliteBackend::open(path)?)))
    }

    /// The stored anchor for `user_id`, or `Middle` when no record
    /// exists, the token is unrecognized, or the backend fails.
    /// Backend failures are absorbed here so the pipeline always has a
    /// usable preference.
    pub fn get(&self, user_id: &str) -> VerticalAnchor {
        match self.backend.find(user_id) {
            Ok(Some(token)) => VerticalAnchor::from_token(&token),
            Ok(None) => VerticalAnchor::default(),
            Err(error) => {
                tracing::warn!(
                    user_id,
                    %error,
                    "preference lookup failed, using default anchor"
                );
                VerticalAnchor::default()
            }
        }
    }

    /// Store the raw token for `user_id`, overwriting any previous
    /// value. Unlike `get`, failures surface to the caller.
    pub fn set(&self, user_id: &str, token: &str) -> Result<(), PreferenceStoreError> {
        self.backend.upsert(user_id, token)?;
        tracing::info!(user_id, token, "preference saved");
        Ok(())
    }

    /// Raw stored token, if any. Outer layers show this verbatim.
    pub fn get_token(&self, user_id: &str) -> Result<Option<String>, PreferenceStoreError> {
        self.backend.find(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PreferenceStore {
        PreferenceStore::new(Box::new(SqliteBackend::open_in_memory().unwrap()))
    }

    #[test]
    fn test_unknown_user_gets_default() {
        assert_eq!(store().get("nobody"), VerticalAnchor::Middle);
    }

    #[test]
    fn test_set_then_get() {
        let store = store();
        store.set("42", "75%").unwrap();
        assert_eq!(store.get("42"), VerticalAnchor::UpperMiddle);
    }

    #[test]
    fn test_set_overwrites() {
        let store = store();
        store.set("42", "75%").unwrap();
        store.set("42", "25%").unwrap();
        assert_eq!(store.get("42"), VerticalAnchor::Lower);
        assert_eq!(store.get_token("42").unwrap().as_deref(), Some("25%"));
    }

    #[test]
    fn test_users_are_independent() {
        let store = store();
        store.set("a", "100%").unwrap();
        store.set("b", "25%").unwrap();
        assert_eq!(store.get("a"), VerticalAnchor::Top);
        assert_eq!(store.get("b"), VerticalAnchor::Lower);
    }

    #[test]
    fn test_unrecognized_stored_token_reads_as_middle() {
        // The raw token is stored verbatim; mapping happens on read.
        let store = store();
        store.set("42", "foo").unwrap();
        assert_eq!(store.get_token("42").unwrap().as_deref(), Some("foo"));
        assert_eq!(store.get("42"), VerticalAnchor::Middle);
    }

    struct FailingBackend;

    impl PreferenceBackend for FailingBackend {
        fn find(&self, _: &str) -> Result<Option<String>, PreferenceStoreError> {
            Err(PreferenceStoreError::Sqlite(
                rusqlite::Error::InvalidQuery,
            ))
        }
        fn upsert(&self, _: &str, _: &str) -> Result<(), PreferenceStoreError> {
            Err(PreferenceStoreError::Sqlite(
                rusqlite::Error::InvalidQuery,
            ))
        }
    }

    #[test]
    fn test_backend_failure_degrades_to_default() {
        let store = PreferenceStore::new(Box::new(FailingBackend));
        assert_eq!(store.get("42"), VerticalAnchor::Middle);
    }

    #[test]
    fn test_set_failure_surfaces() {
        let store = PreferenceStore::new(Box::new(FailingBackend));
        assert!(store.set("42", "75%").is_err());
    }
}
