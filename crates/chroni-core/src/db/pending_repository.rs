//! Pending operations repository implementation

use libsql::{Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{PendingOperation, Record, RecordId};

const PENDING_COLUMNS: &str =
    "operation_id, payload, enqueued_at, attempts, last_error, parked";

/// Trait for the durable queue of unconfirmed writes (async)
#[allow(async_fn_in_trait)]
pub trait PendingRepository {
    /// Append a snapshot of `record`. A record already waiting keeps its
    /// queue position and only has its snapshot refreshed.
    async fn enqueue(&self, record: &Record, enqueued_at: i64) -> Result<i64>;

    /// Replayable entries in FIFO order
    async fn list_ready(&self) -> Result<Vec<PendingOperation>>;

    /// Entries parked after repeated rejections
    async fn list_parked(&self) -> Result<Vec<PendingOperation>>;

    /// Drop an entry after remote acceptance
    async fn remove(&self, operation_id: i64) -> Result<()>;

    /// Drop an entry only if its snapshot still equals `sent`. Returns false
    /// when the entry is gone or was refreshed with newer content.
    async fn remove_if_unchanged(&self, operation_id: i64, sent: &Record) -> Result<bool>;

    /// Count a failed replay, optionally parking the entry
    async fn record_failure(&self, operation_id: i64, error: &str, park: bool) -> Result<()>;

    /// Make parked entries replayable again; returns how many were released
    async fn release_parked(&self) -> Result<u64>;

    /// Number of replayable entries
    async fn count_ready(&self) -> Result<usize>;

    /// Whether `record_id` has an entry (parked or not)
    async fn contains(&self, record_id: &RecordId) -> Result<bool>;
}

/// libSQL implementation of `PendingRepository`
pub struct LibSqlPendingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlPendingRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_operations(&self, parked: bool) -> Result<Vec<PendingOperation>> {
        let sql = format!(
            "SELECT {PENDING_COLUMNS} FROM pending_operations
             WHERE parked = ?
             ORDER BY operation_id ASC"
        );
        let mut rows = self.conn.query(&sql, [i64::from(parked)]).await?;

        let mut operations = Vec::new();
        while let Some(row) = rows.next().await? {
            operations.push(Self::parse_operation(&row)?);
        }
        Ok(operations)
    }

    fn parse_operation(row: &Row) -> Result<PendingOperation> {
        let payload: String = row.get(1)?;
        let attempts: i64 = row.get(3)?;
        let last_error = match row.get_value(4)? {
            Value::Text(message) => Some(message),
            _ => None,
        };

        Ok(PendingOperation {
            operation_id: row.get(0)?,
            payload: serde_json::from_str(&payload)?,
            enqueued_at: row.get(2)?,
            attempts: u32::try_from(attempts).map_err(|e| Error::Database(e.to_string()))?,
            last_error,
            parked: row.get::<i64>(5)? != 0,
        })
    }

    async fn find_operation_id(&self, record_id: &RecordId) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT operation_id FROM pending_operations WHERE record_id = ? LIMIT 1",
                [record_id.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

impl PendingRepository for LibSqlPendingRepository<'_> {
    async fn enqueue(&self, record: &Record, enqueued_at: i64) -> Result<i64> {
        let payload = serde_json::to_string(record)?;

        if let Some(operation_id) = self.find_operation_id(&record.id).await? {
            self.conn
                .execute(
                    "UPDATE pending_operations SET payload = ? WHERE operation_id = ?",
                    vec![Value::Text(payload), Value::Integer(operation_id)],
                )
                .await?;
            return Ok(operation_id);
        }

        self.conn
            .execute(
                "INSERT INTO pending_operations (record_id, payload, enqueued_at) VALUES (?, ?, ?)",
                vec![
                    Value::Text(record.id.to_string()),
                    Value::Text(payload),
                    Value::Integer(enqueued_at),
                ],
            )
            .await?;

        Ok(self.conn.last_insert_rowid())
    }

    async fn list_ready(&self) -> Result<Vec<PendingOperation>> {
        self.query_operations(false).await
    }

    async fn list_parked(&self) -> Result<Vec<PendingOperation>> {
        self.query_operations(true).await
    }

    async fn remove(&self, operation_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM pending_operations WHERE operation_id = ?",
                [operation_id],
            )
            .await?;
        Ok(())
    }

    async fn remove_if_unchanged(&self, operation_id: i64, sent: &Record) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload FROM pending_operations WHERE operation_id = ?",
                [operation_id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(false);
        };
        let stored: Record = serde_json::from_str(&row.get::<String>(0)?)?;
        drop(rows);
        if stored != *sent {
            return Ok(false);
        }

        self.remove(operation_id).await?;
        Ok(true)
    }

    async fn record_failure(&self, operation_id: i64, error: &str, park: bool) -> Result<()> {
        self.conn
            .execute(
                "UPDATE pending_operations
                 SET attempts = attempts + 1, last_error = ?, parked = ?
                 WHERE operation_id = ?",
                vec![
                    Value::Text(error.to_string()),
                    Value::Integer(i64::from(park)),
                    Value::Integer(operation_id),
                ],
            )
            .await?;
        Ok(())
    }

    async fn release_parked(&self) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE pending_operations SET parked = 0, attempts = 0 WHERE parked = 1",
                (),
            )
            .await?;
        Ok(rows)
    }

    async fn count_ready(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM pending_operations WHERE parked = 0",
                (),
            )
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        usize::try_from(count).map_err(|e| Error::Database(e.to_string()))
    }

    async fn contains(&self, record_id: &RecordId) -> Result<bool> {
        Ok(self.find_operation_id(record_id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::EntryType;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn record(id: &str) -> Record {
        Record::new(
            EntryType::Evening,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .with_id(id)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_preserves_fifo_order() {
        let db = setup().await;
        let repo = LibSqlPendingRepository::new(db.connection());

        for id in ["e1", "e2", "e3"] {
            repo.enqueue(&record(id), 1_000).await.unwrap();
        }

        let ids: Vec<String> = repo
            .list_ready()
            .await
            .unwrap()
            .into_iter()
            .map(|op| op.payload.id.to_string())
            .collect();
        assert_eq!(ids, vec!["e1", "e2", "e3"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_same_record_keeps_position() {
        let db = setup().await;
        let repo = LibSqlPendingRepository::new(db.connection());

        let first = repo.enqueue(&record("e1"), 1_000).await.unwrap();
        repo.enqueue(&record("e2"), 1_001).await.unwrap();
        let again = repo
            .enqueue(
                &Record {
                    mood: Some(4),
                    ..record("e1")
                },
                1_002,
            )
            .await
            .unwrap();

        assert_eq!(first, again);
        let ready = repo.list_ready().await.unwrap();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].payload.mood, Some(4));
        assert_eq!(ready[0].enqueued_at, 1_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_and_parking() {
        let db = setup().await;
        let repo = LibSqlPendingRepository::new(db.connection());

        let op = repo.enqueue(&record("e1"), 1_000).await.unwrap();
        repo.record_failure(op, "HTTP 422", false).await.unwrap();
        let ready = repo.list_ready().await.unwrap();
        assert_eq!(ready[0].attempts, 1);
        assert_eq!(ready[0].last_error.as_deref(), Some("HTTP 422"));

        repo.record_failure(op, "HTTP 422", true).await.unwrap();
        assert_eq!(repo.count_ready().await.unwrap(), 0);
        assert_eq!(repo.list_parked().await.unwrap().len(), 1);
        assert!(repo.contains(&"e1".into()).await.unwrap());

        assert_eq!(repo.release_parked().await.unwrap(), 1);
        assert_eq!(repo.count_ready().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove() {
        let db = setup().await;
        let repo = LibSqlPendingRepository::new(db.connection());

        let op = repo.enqueue(&record("e1"), 1_000).await.unwrap();
        repo.remove(op).await.unwrap();
        assert_eq!(repo.count_ready().await.unwrap(), 0);
        assert!(!repo.contains(&"e1".into()).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_if_unchanged_keeps_refreshed_snapshot() {
        let db = setup().await;
        let repo = LibSqlPendingRepository::new(db.connection());

        let sent = record("e1");
        let op = repo.enqueue(&sent, 1_000).await.unwrap();
        repo.enqueue(
            &Record {
                mood: Some(9),
                ..sent.clone()
            },
            1_001,
        )
        .await
        .unwrap();

        assert!(!repo.remove_if_unchanged(op, &sent).await.unwrap());
        assert!(repo.contains(&"e1".into()).await.unwrap());

        let current = repo.list_ready().await.unwrap().remove(0).payload;
        assert!(repo.remove_if_unchanged(op, &current).await.unwrap());
        assert!(!repo.contains(&"e1".into()).await.unwrap());
    }
}
