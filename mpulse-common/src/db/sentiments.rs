//! Sentiment record storage

use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp};
use crate::models::SentimentRecord;
use crate::{Error, Result};

/// Insert one sentiment record (connection-level, for use inside the
/// worker's completion transaction)
pub async fn insert(conn: &mut SqliteConnection, record: &SentimentRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sentiments (owner_id, keyword, sentiment_score, mention_count, collected_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.owner_id.to_string())
    .bind(&record.keyword)
    .bind(record.sentiment_score)
    .bind(record.mention_count)
    .bind(format_timestamp(&record.collected_at))
    .execute(conn)
    .await?;

    Ok(())
}

/// Most recent sentiment records for an owner, newest first
pub async fn recent_for_owner(
    pool: &SqlitePool,
    owner_id: Uuid,
    limit: i64,
) -> Result<Vec<SentimentRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT owner_id, keyword, sentiment_score, mention_count, collected_at
        FROM sentiments
        WHERE owner_id = ?
        ORDER BY collected_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(owner_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let owner: String = row.get("owner_id");
            let collected_at: String = row.get("collected_at");
            Ok(SentimentRecord {
                owner_id: Uuid::parse_str(&owner)
                    .map_err(|e| Error::Internal(format!("Failed to parse owner_id: {}", e)))?,
                keyword: row.get("keyword"),
                sentiment_score: row.get("sentiment_score"),
                mention_count: row.get("mention_count"),
                collected_at: parse_timestamp(&collected_at)?,
            })
        })
        .collect()
}

/// Mean stored sentiment for one keyword, if any rows exist.
///
/// The alert rule evaluator reads this before new results are persisted
/// to detect a swing against history.
pub async fn mean_for_keyword(
    pool: &SqlitePool,
    owner_id: Uuid,
    keyword: &str,
) -> Result<Option<f64>> {
    let mean: Option<f64> = sqlx::query_scalar(
        r#"
        SELECT AVG(sentiment_score)
        FROM sentiments
        WHERE owner_id = ? AND keyword = ?
        "#,
    )
    .bind(owner_id.to_string())
    .bind(keyword)
    .fetch_one(pool)
    .await?;

    Ok(mean)
}
