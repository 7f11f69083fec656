//! DetectionStore - Detection Record Persistence
//!
//! ## Responsibilities
//!
//! - Persist detection records (detection table)
//! - Transactional batch insert (all rows of one frame or none)
//! - History queries ordered by detection time
//! - Atomic bulk delete

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// Schema for the detection table
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS detection (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    detected_at TEXT NOT NULL,
    label       TEXT NOT NULL,
    confidence  REAL NOT NULL,
    image_path  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
)
"#;

/// Detection record (matches detection table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: i64,
    pub detected_at: DateTime<Utc>,
    pub label: String,
    pub confidence: f64,
    pub image_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row to be inserted; `detected_at` doubles as `created_at`/`updated_at`
/// since records are never edited after creation.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub detected_at: DateTime<Utc>,
    pub label: String,
    pub confidence: f64,
    pub image_path: String,
}

/// Round a raw classifier confidence for storage: clamped to [0,1] and
/// rounded to 4 decimal places.
pub fn round_confidence(raw: f32) -> f64 {
    ((raw.clamp(0.0, 1.0) as f64) * 10_000.0).round() / 10_000.0
}

/// DetectionStore instance
pub struct DetectionStore {
    pool: SqlitePool,
}

impl DetectionStore {
    /// Create new DetectionStore
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensure schema exists
    pub async fn init(&self) -> Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert all rows of one detection batch in a single transaction
    ///
    /// Any failure rolls the whole batch back. Returns the stored records
    /// with their assigned ids.
    pub async fn insert_batch(&self, rows: &[NewDetection]) -> Result<Vec<DetectionRecord>> {
        let mut tx = self.pool.begin().await?;
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO detection (detected_at, label, confidence, image_path, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.detected_at)
            .bind(&row.label)
            .bind(row.confidence)
            .bind(&row.image_path)
            .bind(row.detected_at)
            .bind(row.detected_at)
            .execute(&mut *tx)
            .await?;

            records.push(DetectionRecord {
                id: result.last_insert_rowid(),
                detected_at: row.detected_at,
                label: row.label.clone(),
                confidence: row.confidence,
                image_path: row.image_path.clone(),
                created_at: row.detected_at,
                updated_at: row.detected_at,
            });
        }

        tx.commit().await?;

        tracing::debug!(count = records.len(), "Detection batch committed");
        Ok(records)
    }

    /// Get all records, most recent detection first
    pub async fn list_all(&self) -> Result<Vec<DetectionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, detected_at, label, confidence, image_path, created_at, updated_at
            FROM detection
            ORDER BY detected_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Delete every record atomically; returns the number deleted
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM detection")
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        tracing::info!(deleted = deleted, "Detection store cleared");
        Ok(deleted)
    }
}

/// Convert database row to DetectionRecord
fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<DetectionRecord> {
    Ok(DetectionRecord {
        id: row.try_get("id")?,
        detected_at: row.try_get("detected_at")?,
        label: row.try_get("label")?,
        confidence: row.try_get("confidence")?,
        image_path: row.try_get("image_path")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> DetectionStore {
        // One connection: each :memory: connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = DetectionStore::new(pool);
        store.init().await.unwrap();
        store
    }

    fn row(label: &str, confidence: f64, detected_at: DateTime<Utc>) -> NewDetection {
        NewDetection {
            detected_at,
            label: label.to_string(),
            confidence,
            image_path: format!("detection_test_{}.jpg", label),
        }
    }

    #[test]
    fn confidence_rounds_to_four_places() {
        assert_eq!(round_confidence(0.123456), 0.1235);
        assert_eq!(round_confidence(0.81), 0.81);
        assert_eq!(round_confidence(0.99999), 1.0);
    }

    #[test]
    fn confidence_clamps_into_unit_interval() {
        assert_eq!(round_confidence(-0.5), 0.0);
        assert_eq!(round_confidence(1.5), 1.0);
    }

    #[tokio::test]
    async fn batch_insert_assigns_ids_and_lists_back() {
        let store = memory_store().await;
        let now = Utc::now();

        let records = store
            .insert_batch(&[row("crack", 0.81, now), row("pothole", 0.55, now)])
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].id < records[1].id);

        let listed = store.list_all().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].detected_at, listed[1].detected_at);
    }

    #[tokio::test]
    async fn list_orders_most_recent_first() {
        let store = memory_store().await;
        let earlier = Utc::now() - chrono::Duration::seconds(60);
        let later = Utc::now();

        store.insert_batch(&[row("old", 0.5, earlier)]).await.unwrap();
        store.insert_batch(&[row("new", 0.5, later)]).await.unwrap();

        let listed = store.list_all().await.unwrap();
        assert_eq!(listed[0].label, "new");
        assert_eq!(listed[1].label, "old");
    }

    #[tokio::test]
    async fn delete_all_reports_prior_count() {
        let store = memory_store().await;
        let now = Utc::now();
        store
            .insert_batch(&[row("a", 0.5, now), row("b", 0.6, now), row("c", 0.7, now)])
            .await
            .unwrap();

        assert_eq!(store.delete_all().await.unwrap(), 3);
        assert!(store.list_all().await.unwrap().is_empty());
        assert_eq!(store.delete_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_batch_insert_is_a_no_op() {
        let store = memory_store().await;
        let records = store.insert_batch(&[]).await.unwrap();
        assert!(records.is_empty());
        assert!(store.list_all().await.unwrap().is_empty());
    }
}
