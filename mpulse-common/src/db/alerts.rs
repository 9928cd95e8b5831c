//! Alert storage
//!
//! Alerts are append-only. The single permitted mutation is the
//! `is_read` flag, set by the owning user through [`mark_read`].

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp};
use crate::models::{Alert, NewAlert};
use crate::{Error, Result};

/// Append a new alert
pub async fn insert(pool: &SqlitePool, new: &NewAlert) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO alerts (owner_id, alert_type, message, sent_at, is_read)
        VALUES (?, ?, ?, ?, 0)
        "#,
    )
    .bind(new.owner_id.to_string())
    .bind(&new.alert_type)
    .bind(&new.message)
    .bind(format_timestamp(&Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent alerts for an owner, newest first
pub async fn recent_for_owner(pool: &SqlitePool, owner_id: Uuid, limit: i64) -> Result<Vec<Alert>> {
    let rows = sqlx::query(
        r#"
        SELECT id, owner_id, alert_type, message, sent_at, is_read
        FROM alerts
        WHERE owner_id = ?
        ORDER BY sent_at DESC, id DESC
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
            let sent_at: String = row.get("sent_at");
            Ok(Alert {
                id: row.get("id"),
                owner_id: Uuid::parse_str(&owner)
                    .map_err(|e| Error::Internal(format!("Failed to parse owner_id: {}", e)))?,
                alert_type: row.get("alert_type"),
                message: row.get("message"),
                sent_at: parse_timestamp(&sent_at)?,
                is_read: row.get::<i64, _>("is_read") != 0,
            })
        })
        .collect()
}

/// Mark one of the owner's alerts as read.
///
/// Returns false when the alert doesn't exist or belongs to another
/// owner (same answer for both, by the store's ownership policy).
pub async fn mark_read(pool: &SqlitePool, owner_id: Uuid, alert_id: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE alerts SET is_read = 1 WHERE id = ? AND owner_id = ?")
        .bind(alert_id)
        .bind(owner_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
