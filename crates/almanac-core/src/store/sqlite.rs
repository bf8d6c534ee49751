//! `SQLite` implementation of `LocalStore`

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{migrations, LocalStore};
use crate::error::Result;
use crate::models::{EntityId, EntityKind};
use crate::sync::{PendingAction, PendingOperation};

/// Entity documents and the pending queue in a single `SQLite` file
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL is not available for in-memory databases
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_documents(conn: &Connection, kind: EntityKind) -> Result<Vec<Value>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT document FROM {} ORDER BY id",
            kind.table()
        ))?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(raw
            .into_iter()
            .filter_map(|document| match serde_json::from_str(&document) {
                Ok(value) => Some(value),
                Err(error) => {
                    tracing::warn!("Skipping corrupt {} row: {}", kind, error);
                    None
                }
            })
            .collect())
    }

    fn query_pending(conn: &Connection) -> Result<Vec<PendingOperation>> {
        let mut stmt = conn.prepare(
            "SELECT id, entity_kind, action, entity_id, timestamp
             FROM pending_operations
             ORDER BY position",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut operations = Vec::with_capacity(rows.len());
        for (id, kind, action, entity_id, timestamp) in rows {
            let (Ok(entity_kind), Ok(action)) =
                (kind.parse::<EntityKind>(), action.parse::<PendingAction>())
            else {
                tracing::warn!("Dropping unreadable pending operation {}", id);
                continue;
            };
            operations.push(PendingOperation {
                id,
                entity_kind,
                action,
                entity_id: EntityId::from(entity_id),
                timestamp,
            });
        }
        Ok(operations)
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn save(&self, kind: EntityKind, id: &EntityId, document: Value) -> Result<()> {
        let document = serde_json::to_string(&document)?;
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (id, document) VALUES (?, ?)",
                kind.table()
            ),
            params![id.as_str(), document],
        )?;
        Ok(())
    }

    async fn load(&self, kind: EntityKind) -> Vec<Value> {
        let conn = self.conn.lock().await;
        Self::query_documents(&conn, kind).unwrap_or_else(|error| {
            tracing::warn!("Failed to load {} from local store: {}", kind, error);
            Vec::new()
        })
    }

    async fn get(&self, kind: EntityKind, id: &EntityId) -> Option<Value> {
        let conn = self.conn.lock().await;
        let result = conn
            .query_row(
                &format!("SELECT document FROM {} WHERE id = ?", kind.table()),
                params![id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional();

        match result {
            Ok(Some(document)) => serde_json::from_str(&document).ok(),
            Ok(None) => None,
            Err(error) => {
                tracing::warn!("Failed to read {} {}: {}", kind, id, error);
                None
            }
        }
    }

    async fn delete(&self, kind: EntityKind, id: &EntityId) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", kind.table()),
            params![id.as_str()],
        )?;
        Ok(())
    }

    async fn clear(&self, kind: EntityKind) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(&format!("DELETE FROM {}", kind.table()), [])?;
        Ok(())
    }

    async fn replace_all(
        &self,
        kind: EntityKind,
        documents: Vec<(EntityId, Value)>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", kind.table()), [])?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (id, document) VALUES (?, ?)",
                kind.table()
            ))?;
            for (id, document) in documents {
                stmt.execute(params![id.as_str(), serde_json::to_string(&document)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn load_pending(&self) -> Vec<PendingOperation> {
        let conn = self.conn.lock().await;
        Self::query_pending(&conn).unwrap_or_else(|error| {
            tracing::warn!("Failed to load pending operations: {}", error);
            Vec::new()
        })
    }

    async fn save_pending(&self, operations: &[PendingOperation]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM pending_operations", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO pending_operations (id, entity_kind, action, entity_id, timestamp)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for operation in operations {
                stmt.execute(params![
                    operation.id,
                    operation.entity_kind.table(),
                    operation.action.as_str(),
                    operation.entity_id.as_str(),
                    operation.timestamp,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Contact;
    use crate::store::EntityStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn setup() -> EntityStore {
        EntityStore::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = setup();
        let contact = Contact::new("Ada Lovelace");
        store.save(&contact).await.unwrap();

        let fetched = store.get::<Contact>(&contact.id).await.unwrap();
        assert_eq!(fetched, contact);
        assert!(store.raw().is_available());
    }

    #[tokio::test]
    async fn test_save_replaces_existing_document() {
        let store = setup();
        let mut contact = Contact::new("Ada");
        store.save(&contact).await.unwrap();

        contact.name = "Ada Lovelace".to_string();
        store.save(&contact).await.unwrap();

        let all = store.load::<Contact>().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = setup();
        let first = Contact::new("First");
        let second = Contact::new("Second");
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        store.delete::<Contact>(&first.id).await.unwrap();
        assert!(store.get::<Contact>(&first.id).await.is_none());
        // Deleting an absent id is fine
        store.delete::<Contact>(&first.id).await.unwrap();

        store.raw().clear(EntityKind::Contacts).await.unwrap();
        assert!(store.load::<Contact>().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_all_rewrites_collection() {
        let store = setup();
        store.save(&Contact::new("Stale")).await.unwrap();

        let fresh = vec![Contact::new("One"), Contact::new("Two")];
        store.replace_all(&fresh).await.unwrap();

        let mut names: Vec<String> = store
            .load::<Contact>()
            .await
            .into_iter()
            .map(|c| c.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["One".to_string(), "Two".to_string()]);
    }

    #[tokio::test]
    async fn test_pending_operations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("almanac.db");

        let operation = PendingOperation::new(
            EntityKind::Events,
            PendingAction::Delete,
            EntityId::from("e1"),
        );
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .save_pending(std::slice::from_ref(&operation))
                .await
                .unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load_pending().await, vec![operation]);
    }
}
