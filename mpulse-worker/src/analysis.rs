//! Analysis engine
//!
//! Extracts keyword/trend candidates and sentiment aggregates from a
//! parsed table's free-text columns. A purely numeric upload is valid
//! input and yields an empty-but-successful result; the only failure
//! mode is infrastructure failure of the scoring capability.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use mpulse_common::config::ScoringConfig;
use mpulse_common::models::{MarketTrendPoint, SentimentRecord};

use crate::parser::{Cell, Table};
use crate::scorer::{ScorerError, TextScorer};

/// Analysis failure. Deliberately narrow: bad or boring input is not an
/// error, only a scoring backend outage is.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Scoring capability unavailable: {0}")]
    ScorerUnavailable(#[from] ScorerError),
}

/// Derived rows produced from one table
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub market_trends: Vec<MarketTrendPoint>,
    pub sentiments: Vec<SentimentRecord>,
}

impl AnalysisResult {
    pub fn is_empty(&self) -> bool {
        self.market_trends.is_empty() && self.sentiments.is_empty()
    }
}

#[derive(Debug, Default)]
struct KeywordStats {
    sentiment_sum: f64,
    mentions: i64,
}

/// Analysis engine with a pluggable scorer and configured weights
pub struct AnalysisEngine {
    scorer: Arc<dyn TextScorer>,
    policy: ScoringConfig,
}

impl AnalysisEngine {
    pub fn new(scorer: Arc<dyn TextScorer>, policy: ScoringConfig) -> Self {
        Self { scorer, policy }
    }

    /// Analyze a table's free-text columns for `owner_id`.
    ///
    /// Deterministic given the same input and weights: keyword
    /// aggregation order is fixed by sorting before emission.
    pub fn analyze(
        &self,
        table: &Table,
        owner_id: Uuid,
        collected_at: DateTime<Utc>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let text_columns = self.candidate_text_columns(table);
        if text_columns.is_empty() {
            tracing::debug!("No free-text columns found; returning empty analysis result");
            return Ok(AnalysisResult::default());
        }

        let mut stats: HashMap<String, KeywordStats> = HashMap::new();
        let mut scored_cells = 0i64;

        for &column in &text_columns {
            for cell in table.column(column) {
                let Some(text) = cell.as_text() else {
                    continue;
                };
                let score = self.scorer.score(text)?;
                scored_cells += 1;

                for keyword in score.keywords {
                    let entry = stats.entry(keyword).or_default();
                    entry.sentiment_sum += score.sentiment;
                    entry.mentions += 1;
                }
            }
        }

        let mut keywords: Vec<(String, KeywordStats)> = stats.into_iter().collect();
        keywords.sort_by(|a, b| a.0.cmp(&b.0));

        let mut result = AnalysisResult::default();
        for (keyword, stats) in keywords {
            result.market_trends.push(MarketTrendPoint {
                owner_id,
                keyword: keyword.clone(),
                trend_score: self.trend_score(stats.mentions, scored_cells),
                collected_at,
            });
            result.sentiments.push(SentimentRecord {
                owner_id,
                keyword,
                sentiment_score: stats.sentiment_sum / stats.mentions as f64,
                mention_count: stats.mentions,
                collected_at,
            });
        }

        Ok(result)
    }

    /// Heuristic free-text column detection: a column qualifies when a
    /// majority of its non-empty cells are text and the average token
    /// count clears the configured floor.
    fn candidate_text_columns(&self, table: &Table) -> Vec<usize> {
        (0..table.column_count())
            .filter(|&index| {
                let mut non_empty = 0usize;
                let mut text_cells = 0usize;
                let mut token_total = 0usize;

                for cell in table.column(index) {
                    match cell {
                        Cell::Empty => {}
                        Cell::Number(_) => non_empty += 1,
                        Cell::Text(s) => {
                            non_empty += 1;
                            text_cells += 1;
                            token_total += s.split_whitespace().count();
                        }
                    }
                }

                if non_empty == 0 || text_cells * 2 < non_empty {
                    return false;
                }
                let avg_tokens = token_total as f64 / text_cells as f64;
                avg_tokens >= self.policy.min_avg_tokens
            })
            .collect()
    }

    /// Recency-weighted prominence of a keyword within this batch.
    ///
    /// Normalized mention frequency scaled by `frequency_weight` plus a
    /// per-mention momentum bonus, capped at 100. The exact weighting
    /// is a policy knob, not a contract; it only has to be monotone in
    /// mention frequency and deterministic.
    fn trend_score(&self, mentions: i64, scored_cells: i64) -> f64 {
        if scored_cells == 0 {
            return 0.0;
        }
        let frequency = mentions as f64 / scored_cells as f64;
        (frequency * self.policy.frequency_weight + mentions as f64 * self.policy.momentum_weight)
            .min(100.0)
    }
}
