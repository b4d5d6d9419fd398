//! Key/value repository backing the structured storage tier

use crate::error::Result;
use libsql::{Connection, Value};

/// Trait for key/value storage operations (async)
#[allow(async_fn_in_trait)]
pub trait KvRepository {
    /// Load a value, `None` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value
    async fn set(&self, key: &str, value: &str, updated_at: i64) -> Result<()>;

    /// Remove a key; absent keys are not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

/// libSQL implementation of `KvRepository`
pub struct LibSqlKvRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlKvRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl KvRepository for LibSqlKvRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv_store WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str, updated_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)",
                vec![
                    Value::Text(key.to_string()),
                    Value::Text(value.to_string()),
                    Value::Integer(updated_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_key_is_none() {
        let db = setup().await;
        let repo = LibSqlKvRepository::new(db.connection());
        assert_eq!(repo.get("absent").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_overwrite_and_remove() {
        let db = setup().await;
        let repo = LibSqlKvRepository::new(db.connection());

        repo.set("flag", "one", 1).await.unwrap();
        repo.set("flag", "two", 2).await.unwrap();
        assert_eq!(repo.get("flag").await.unwrap().as_deref(), Some("two"));

        repo.remove("flag").await.unwrap();
        repo.remove("flag").await.unwrap();
        assert_eq!(repo.get("flag").await.unwrap(), None);
    }
}
