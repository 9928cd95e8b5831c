//! Market trend point storage
//!
//! Derived rows accumulate across uploads; dashboard queries read the
//! most recent N for an owner (time-descending composite index).

use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp};
use crate::models::MarketTrendPoint;
use crate::{Error, Result};

/// Insert one trend point.
///
/// Takes a bare connection so the worker's completion transaction can
/// include derived-row inserts atomically.
pub async fn insert(conn: &mut SqliteConnection, point: &MarketTrendPoint) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO market_trends (owner_id, keyword, trend_score, collected_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(point.owner_id.to_string())
    .bind(&point.keyword)
    .bind(point.trend_score)
    .bind(format_timestamp(&point.collected_at))
    .execute(conn)
    .await?;

    Ok(())
}

/// Most recent trend points for an owner, newest first
pub async fn recent_for_owner(
    pool: &SqlitePool,
    owner_id: Uuid,
    limit: i64,
) -> Result<Vec<MarketTrendPoint>> {
    let rows = sqlx::query(
        r#"
        SELECT owner_id, keyword, trend_score, collected_at
        FROM market_trends
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
            Ok(MarketTrendPoint {
                owner_id: Uuid::parse_str(&owner)
                    .map_err(|e| Error::Internal(format!("Failed to parse owner_id: {}", e)))?,
                keyword: row.get("keyword"),
                trend_score: row.get("trend_score"),
                collected_at: parse_timestamp(&collected_at)?,
            })
        })
        .collect()
}

/// Top keywords for an owner by their latest trend score
pub async fn top_keywords(
    pool: &SqlitePool,
    owner_id: Uuid,
    limit: i64,
) -> Result<Vec<(String, f64)>> {
    let rows = sqlx::query(
        r#"
        SELECT keyword, MAX(collected_at) AS latest, trend_score
        FROM market_trends
        WHERE owner_id = ?
        GROUP BY keyword
        ORDER BY trend_score DESC
        LIMIT ?
        "#,
    )
    .bind(owner_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("keyword"), row.get("trend_score")))
        .collect())
}
