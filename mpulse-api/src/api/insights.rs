//! Dashboard insight endpoints
//!
//! Read-only aggregates over the derived rows the worker persists.
//! Sentiment is stored in -1.0..1.0 and rescaled to 0..100 for display.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use mpulse_common::db::{alerts, sentiments, trends};

use crate::error::{ApiError, ApiResult};
use crate::extract::OwnerId;
use crate::AppState;

const TREND_WINDOW: i64 = 12;
const SENTIMENT_WINDOW: i64 = 100;
const ALERT_WINDOW: i64 = 5;
const TOP_TOPIC_COUNT: usize = 4;

/// Sentiment scores within this band around zero count as neutral
const NEUTRAL_BAND: f64 = 0.1;

#[derive(Debug, Serialize)]
pub struct TrendPointView {
    pub keyword: String,
    pub trend_score: f64,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MarketInsightsResponse {
    /// Oldest first, for charting
    pub trends: Vec<TrendPointView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_topic: Option<String>,
    /// Percent change across the window, first point to last
    pub growth_rate: f64,
}

/// GET /dashboard/market-insights
pub async fn market_insights(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> ApiResult<Json<MarketInsightsResponse>> {
    // Stored newest-first; the chart wants chronological order
    let mut recent = trends::recent_for_owner(&state.db, owner_id, TREND_WINDOW).await?;
    recent.reverse();

    let top_topic = trends::top_keywords(&state.db, owner_id, 1)
        .await?
        .into_iter()
        .next()
        .map(|(keyword, _)| keyword);

    let growth_rate = match (recent.first(), recent.last()) {
        (Some(first), Some(last)) if first.trend_score.abs() > f64::EPSILON => {
            (last.trend_score - first.trend_score) / first.trend_score * 100.0
        }
        _ => 0.0,
    };

    let trends = recent
        .into_iter()
        .map(|p| TrendPointView {
            keyword: p.keyword,
            trend_score: p.trend_score,
            collected_at: p.collected_at,
        })
        .collect();

    Ok(Json(MarketInsightsResponse {
        trends,
        top_topic,
        growth_rate,
    }))
}

#[derive(Debug, Serialize)]
pub struct TopicSentiment {
    pub topic: String,
    /// Display scale 0..100; 50 is neutral
    pub score: f64,
    pub mentions: i64,
}

#[derive(Debug, Serialize)]
pub struct SentimentAnalysisResponse {
    pub positive_pct: f64,
    pub neutral_pct: f64,
    pub negative_pct: f64,
    pub top_topics: Vec<TopicSentiment>,
    pub sample_size: usize,
}

/// GET /dashboard/sentiment-analysis
pub async fn sentiment_analysis(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> ApiResult<Json<SentimentAnalysisResponse>> {
    let records = sentiments::recent_for_owner(&state.db, owner_id, SENTIMENT_WINDOW).await?;

    let total = records.len();
    let positive = records
        .iter()
        .filter(|r| r.sentiment_score > NEUTRAL_BAND)
        .count();
    let negative = records
        .iter()
        .filter(|r| r.sentiment_score < -NEUTRAL_BAND)
        .count();
    let neutral = total - positive - negative;

    let pct = |n: usize| {
        if total == 0 {
            0.0
        } else {
            n as f64 / total as f64 * 100.0
        }
    };

    // Per-topic mean sentiment, weighted by nothing but record count
    let mut by_topic: HashMap<String, (f64, i64)> = HashMap::new();
    for record in &records {
        let entry = by_topic.entry(record.keyword.clone()).or_insert((0.0, 0));
        entry.0 += record.sentiment_score;
        entry.1 += record.mention_count;
    }
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in &records {
        *counts.entry(record.keyword.clone()).or_insert(0) += 1;
    }

    let mut top_topics: Vec<TopicSentiment> = by_topic
        .into_iter()
        .map(|(topic, (sum, mentions))| {
            let mean = sum / counts[&topic] as f64;
            TopicSentiment {
                topic,
                // -1..1 -> 0..100
                score: (mean + 1.0) / 2.0 * 100.0,
                mentions,
            }
        })
        .collect();
    top_topics.sort_by(|a, b| {
        b.mentions
            .cmp(&a.mentions)
            .then_with(|| a.topic.cmp(&b.topic))
    });
    top_topics.truncate(TOP_TOPIC_COUNT);

    Ok(Json(SentimentAnalysisResponse {
        positive_pct: pct(positive),
        neutral_pct: pct(neutral),
        negative_pct: pct(negative),
        top_topics,
        sample_size: total,
    }))
}

/// GET /dashboard/recent-alerts
pub async fn recent_alerts(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> ApiResult<Json<serde_json::Value>> {
    let alerts = alerts::recent_for_owner(&state.db, owner_id, ALERT_WINDOW).await?;
    Ok(Json(json!({ "alerts": alerts })))
}

/// POST /dashboard/alerts/:alert_id/read
pub async fn mark_alert_read(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(alert_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = alerts::mark_read(&state.db, owner_id, alert_id).await?;
    if !updated {
        return Err(ApiError::NotFound(format!("Alert not found: {alert_id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

/// GET /dashboard/top-keywords
pub async fn top_keywords(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> ApiResult<Json<serde_json::Value>> {
    let keywords: Vec<serde_json::Value> = trends::top_keywords(&state.db, owner_id, 10)
        .await?
        .into_iter()
        .map(|(keyword, score)| json!({ "keyword": keyword, "trend_score": score }))
        .collect();
    Ok(Json(json!({ "keywords": keywords })))
}

/// Build insight routes
pub fn insight_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/market-insights", get(market_insights))
        .route("/dashboard/sentiment-analysis", get(sentiment_analysis))
        .route("/dashboard/top-keywords", get(top_keywords))
        .route("/dashboard/recent-alerts", get(recent_alerts))
        .route("/dashboard/alerts/:alert_id/read", post(mark_alert_read))
}
