//! Record repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use chrono::NaiveDate;
use libsql::{Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{EntryType, Record, RecordId, SleepQuality};

const RECORD_COLUMNS: &str = "id, entry_type, date, mood, energy, anxiety, pain, fatigue, \
     sleep_quality, morning_feeling, morning_hopes, morning_symptoms, evening_day_review, \
     evening_gratitude, evening_symptoms, additional_notes, timestamp, synced, owner_id";

/// Filter for listing records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Inclusive lower bound on `date`
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on `date`
    pub date_to: Option<NaiveDate>,
    pub entry_type: Option<EntryType>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl RecordFilter {
    /// Restrict to an inclusive date range
    #[must_use]
    pub const fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    #[must_use]
    pub const fn of_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Trait for record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Insert or replace a record by id
    async fn put(&self, record: &Record) -> Result<()>;

    /// Insert or rewrite a record as unconfirmed. Returns false, leaving the
    /// row alone, when the stored copy is already synced.
    async fn put_unconfirmed(&self, record: &Record) -> Result<bool>;

    /// Get a record by ID
    async fn get(&self, id: &RecordId) -> Result<Option<Record>>;

    /// List records, newest first
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<Record>>;

    /// Remove a record permanently
    async fn delete(&self, id: &RecordId) -> Result<()>;

    /// Flag a record as confirmed by the remote; returns false if it is unknown
    async fn mark_synced(&self, id: &RecordId) -> Result<bool>;

    /// Mark synced only while the stored content still equals `snapshot`
    async fn mark_synced_if_current(&self, snapshot: &Record) -> Result<bool>;

    /// Records that have not been bound to an account yet
    async fn list_unowned(&self) -> Result<Vec<Record>>;

    /// Bind every unowned record to `owner_id`; returns the number updated
    async fn bind_owner(&self, owner_id: &str) -> Result<u64>;

    /// Number of stored records
    async fn count(&self) -> Result<usize>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_records(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Record>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    /// Parse a record from a database row
    fn parse_record(row: &Row) -> Result<Record> {
        let id: String = row.get(0)?;
        let entry_type: String = row.get(1)?;
        let date: String = row.get(2)?;
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| Error::Database(format!("invalid date '{date}' for record {id}: {e}")))?;
        let sleep_quality = optional_text(row, 8)?
            .map(|value| value.parse::<SleepQuality>())
            .transpose()?;

        Ok(Record {
            entry_type: entry_type.parse()?,
            date,
            mood: optional_metric(row, 3)?,
            energy: optional_metric(row, 4)?,
            anxiety: optional_metric(row, 5)?,
            pain: optional_metric(row, 6)?,
            fatigue: optional_metric(row, 7)?,
            sleep_quality,
            morning_feeling: optional_text(row, 9)?,
            morning_hopes: optional_text(row, 10)?,
            morning_symptoms: optional_text(row, 11)?,
            evening_day_review: optional_text(row, 12)?,
            evening_gratitude: optional_text(row, 13)?,
            evening_symptoms: optional_text(row, 14)?,
            additional_notes: optional_text(row, 15)?,
            timestamp: row.get(16)?,
            synced: row.get::<i64>(17)? != 0,
            owner_id: optional_text(row, 18)?,
            id: RecordId::from(id),
        })
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn put(&self, record: &Record) -> Result<()> {
        // The caller's `synced` wins, so merged remote copies arrive confirmed
        self.conn
            .execute(&upsert_sql(""), record_params(record, record.synced))
            .await?;
        Ok(())
    }

    async fn put_unconfirmed(&self, record: &Record) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                &upsert_sql("WHERE records.synced = 0"),
                record_params(record, false),
            )
            .await?;
        Ok(rows > 0)
    }

    async fn get(&self, id: &RecordId) -> Result<Option<Record>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?");
        let mut records = self
            .query_records(&sql, vec![Value::Text(id.to_string())])
            .await?;
        Ok(records.pop())
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE 1 = 1");
        let mut params = Vec::new();

        if let Some(from) = filter.date_from {
            sql.push_str(" AND date >= ?");
            params.push(Value::Text(from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = filter.date_to {
            sql.push_str(" AND date <= ?");
            params.push(Value::Text(to.format("%Y-%m-%d").to_string()));
        }
        if let Some(entry_type) = filter.entry_type {
            sql.push_str(" AND entry_type = ?");
            params.push(Value::Text(entry_type.to_string()));
        }

        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?");
        params.push(Value::Integer(filter.limit.map_or(-1, |limit| limit as i64)));
        params.push(Value::Integer(filter.offset as i64));

        self.query_records(&sql, params).await
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM records WHERE id = ?", [id.as_str()])
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn mark_synced(&self, id: &RecordId) -> Result<bool> {
        let rows = self
            .conn
            .execute("UPDATE records SET synced = 1 WHERE id = ?", [id.as_str()])
            .await?;
        Ok(rows > 0)
    }

    async fn mark_synced_if_current(&self, snapshot: &Record) -> Result<bool> {
        match self.get(&snapshot.id).await? {
            Some(current) if current.same_entry(snapshot) => self.mark_synced(&snapshot.id).await,
            _ => Ok(false),
        }
    }

    async fn list_unowned(&self) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE owner_id IS NULL ORDER BY timestamp ASC, id ASC"
        );
        self.query_records(&sql, Vec::new()).await
    }

    async fn bind_owner(&self, owner_id: &str) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE records SET owner_id = ? WHERE owner_id IS NULL",
                [owner_id],
            )
            .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM records", ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        usize::try_from(count).map_err(|e| Error::Database(e.to_string()))
    }
}

fn upsert_sql(conflict_guard: &str) -> String {
    format!(
        "INSERT INTO records ({RECORD_COLUMNS})
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            entry_type = excluded.entry_type,
            date = excluded.date,
            mood = excluded.mood,
            energy = excluded.energy,
            anxiety = excluded.anxiety,
            pain = excluded.pain,
            fatigue = excluded.fatigue,
            sleep_quality = excluded.sleep_quality,
            morning_feeling = excluded.morning_feeling,
            morning_hopes = excluded.morning_hopes,
            morning_symptoms = excluded.morning_symptoms,
            evening_day_review = excluded.evening_day_review,
            evening_gratitude = excluded.evening_gratitude,
            evening_symptoms = excluded.evening_symptoms,
            additional_notes = excluded.additional_notes,
            timestamp = excluded.timestamp,
            synced = excluded.synced,
            owner_id = COALESCE(excluded.owner_id, records.owner_id)
         {conflict_guard}"
    )
}

fn record_params(record: &Record, synced: bool) -> Vec<Value> {
    vec![
        Value::Text(record.id.to_string()),
        Value::Text(record.entry_type.to_string()),
        Value::Text(record.date.format("%Y-%m-%d").to_string()),
        metric_value(record.mood),
        metric_value(record.energy),
        metric_value(record.anxiety),
        metric_value(record.pain),
        metric_value(record.fatigue),
        text_value(record.sleep_quality.map(|quality| quality.as_str())),
        text_value(record.morning_feeling.as_deref()),
        text_value(record.morning_hopes.as_deref()),
        text_value(record.morning_symptoms.as_deref()),
        text_value(record.evening_day_review.as_deref()),
        text_value(record.evening_gratitude.as_deref()),
        text_value(record.evening_symptoms.as_deref()),
        text_value(record.additional_notes.as_deref()),
        Value::Integer(record.timestamp),
        Value::Integer(i64::from(synced)),
        text_value(record.owner_id.as_deref()),
    ]
}

fn metric_value(value: Option<u8>) -> Value {
    value.map_or(Value::Null, |value| Value::Integer(i64::from(value)))
}

fn text_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

fn optional_metric(row: &Row, idx: i32) -> Result<Option<u8>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => u8::try_from(value)
            .map(Some)
            .map_err(|_| Error::Database(format!("metric out of range in column {idx}: {value}"))),
        other => Err(Error::Database(format!(
            "unexpected value in metric column {idx}: {other:?}"
        ))),
    }
}

fn optional_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "unexpected value in text column {idx}: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(id: &str, d: u32, timestamp: i64) -> Record {
        Record {
            timestamp,
            ..Record::new(EntryType::Morning, day(d)).with_id(id)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_and_get_preserves_every_field() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = Record {
            mood: Some(7),
            energy: Some(5),
            anxiety: Some(3),
            pain: Some(2),
            fatigue: Some(0),
            sleep_quality: Some(SleepQuality::Fair),
            morning_feeling: Some("stiff".to_string()),
            additional_notes: Some("slept badly".to_string()),
            owner_id: Some("user-1".to_string()),
            ..record("e1", 1, 1_000)
        };
        repo.put(&record).await.unwrap();

        let fetched = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_upserts_by_id() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.put(&record("e1", 1, 1_000)).await.unwrap();
        let updated = Record {
            mood: Some(9),
            ..record("e1", 1, 1_000)
        };
        repo.put(&updated).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.get(&"e1".into()).await.unwrap().unwrap().mood, Some(9));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_rewrite_clears_synced_flag() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.put(&record("e1", 1, 1_000)).await.unwrap();
        assert!(repo.mark_synced(&"e1".into()).await.unwrap());
        assert!(repo.get(&"e1".into()).await.unwrap().unwrap().synced);

        repo.put(&record("e1", 2, 1_000)).await.unwrap();
        assert!(!repo.get(&"e1".into()).await.unwrap().unwrap().synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_unconfirmed_never_touches_synced_rows() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        assert!(repo.put_unconfirmed(&record("e1", 1, 1_000)).await.unwrap());
        assert!(repo
            .put_unconfirmed(&Record {
                mood: Some(4),
                ..record("e1", 1, 1_000)
            })
            .await
            .unwrap());
        repo.mark_synced(&"e1".into()).await.unwrap();

        let rewrite = Record {
            mood: Some(9),
            ..record("e1", 1, 1_000)
        };
        assert!(!repo.put_unconfirmed(&rewrite).await.unwrap());
        let stored = repo.get(&"e1".into()).await.unwrap().unwrap();
        assert_eq!(stored.mood, Some(4));
        assert!(stored.synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_if_current_compares_content() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let sent = Record {
            mood: Some(1),
            ..record("e1", 1, 1_000)
        };
        repo.put(&sent).await.unwrap();
        repo.put(&Record {
            mood: Some(9),
            ..sent.clone()
        })
        .await
        .unwrap();

        assert!(!repo.mark_synced_if_current(&sent).await.unwrap());
        assert!(!repo.get(&"e1".into()).await.unwrap().unwrap().synced);

        let current = repo.get(&"e1".into()).await.unwrap().unwrap();
        assert!(repo.mark_synced_if_current(&current).await.unwrap());
        assert!(repo.get(&"e1".into()).await.unwrap().unwrap().synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_orders_by_recency_and_filters_dates() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.put(&record("a", 1, 1_000)).await.unwrap();
        repo.put(&record("b", 2, 2_000)).await.unwrap();
        repo.put(&record("c", 3, 3_000)).await.unwrap();

        let all = repo.list(&RecordFilter::default()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        let ranged = repo
            .list(&RecordFilter::default().between(Some(day(2)), Some(day(3))))
            .await
            .unwrap();
        let ids: Vec<&str> = ranged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);

        let limited = repo.list(&RecordFilter::default().limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_filters_entry_type() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.put(&record("m", 1, 1_000)).await.unwrap();
        repo.put(&Record {
            entry_type: EntryType::Evening,
            ..record("e", 1, 2_000)
        })
        .await
        .unwrap();

        let evenings = repo
            .list(&RecordFilter::default().of_type(EntryType::Evening))
            .await
            .unwrap();
        assert_eq!(evenings.len(), 1);
        assert_eq!(evenings[0].id.as_str(), "e");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.put(&record("e1", 1, 1_000)).await.unwrap();
        repo.delete(&"e1".into()).await.unwrap();

        assert!(repo.get(&"e1".into()).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(&"e1".into()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bind_owner_only_touches_unowned() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.put(&record("a", 1, 1_000)).await.unwrap();
        repo.put(&Record {
            owner_id: Some("someone-else".to_string()),
            ..record("b", 1, 2_000)
        })
        .await
        .unwrap();

        assert_eq!(repo.list_unowned().await.unwrap().len(), 1);
        assert_eq!(repo.bind_owner("user-1").await.unwrap(), 1);
        assert!(repo.list_unowned().await.unwrap().is_empty());

        let b = repo.get(&"b".into()).await.unwrap().unwrap();
        assert_eq!(b.owner_id.as_deref(), Some("someone-else"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_unknown_id() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        assert!(!repo.mark_synced(&"missing".into()).await.unwrap());
    }
}
