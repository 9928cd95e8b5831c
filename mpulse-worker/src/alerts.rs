//! Alert rule evaluator
//!
//! Watches for significant deltas in freshly derived results versus
//! stored history and appends dashboard alerts. Runs after the
//! completion transaction; alerts are advisory and never affect the
//! job's outcome.

use std::collections::HashMap;

use mpulse_common::config::AlertConfig;
use mpulse_common::models::NewAlert;

use crate::analysis::AnalysisResult;

/// Rule evaluator over one job's analysis result
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    thresholds: AlertConfig,
}

impl AlertEvaluator {
    pub fn new(thresholds: AlertConfig) -> Self {
        Self { thresholds }
    }

    /// Evaluate rules against the new result.
    ///
    /// `previous_means` holds each keyword's stored mean sentiment from
    /// before this job's rows were persisted; keywords without history
    /// cannot raise a shift alert.
    pub fn evaluate(
        &self,
        result: &AnalysisResult,
        previous_means: &HashMap<String, f64>,
    ) -> Vec<NewAlert> {
        let mut alerts = Vec::new();

        for record in &result.sentiments {
            if let Some(previous) = previous_means.get(&record.keyword) {
                let swing = record.sentiment_score - previous;
                if swing.abs() >= self.thresholds.sentiment_shift_threshold {
                    let direction = if swing < 0.0 { "dropped" } else { "rose" };
                    alerts.push(NewAlert {
                        owner_id: record.owner_id,
                        alert_type: "sentiment_shift".to_string(),
                        message: format!(
                            "Sentiment for '{}' {} sharply ({:+.2} vs {:+.2} previously)",
                            record.keyword, direction, record.sentiment_score, previous
                        ),
                    });
                }
            }
        }

        for point in &result.market_trends {
            if point.trend_score >= self.thresholds.trend_spike_threshold {
                alerts.push(NewAlert {
                    owner_id: point.owner_id,
                    alert_type: "trend_spike".to_string(),
                    message: format!(
                        "Keyword '{}' is spiking (trend score {:.1})",
                        point.keyword, point.trend_score
                    ),
                });
            }
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mpulse_common::models::{MarketTrendPoint, SentimentRecord};
    use uuid::Uuid;

    fn evaluator() -> AlertEvaluator {
        AlertEvaluator::new(AlertConfig {
            sentiment_shift_threshold: 0.5,
            trend_spike_threshold: 75.0,
        })
    }

    fn sentiment(keyword: &str, score: f64) -> SentimentRecord {
        SentimentRecord {
            owner_id: Uuid::new_v4(),
            keyword: keyword.to_string(),
            sentiment_score: score,
            mention_count: 1,
            collected_at: Utc::now(),
        }
    }

    fn trend(keyword: &str, score: f64) -> MarketTrendPoint {
        MarketTrendPoint {
            owner_id: Uuid::new_v4(),
            keyword: keyword.to_string(),
            trend_score: score,
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn sentiment_swing_beyond_threshold_raises_alert() {
        let result = AnalysisResult {
            sentiments: vec![sentiment("support", -0.8)],
            market_trends: vec![],
        };
        let previous = HashMap::from([("support".to_string(), 0.2)]);

        let alerts = evaluator().evaluate(&result, &previous);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "sentiment_shift");
        assert!(alerts[0].message.contains("dropped"));
    }

    #[test]
    fn small_swing_is_quiet() {
        let result = AnalysisResult {
            sentiments: vec![sentiment("support", 0.3)],
            market_trends: vec![],
        };
        let previous = HashMap::from([("support".to_string(), 0.2)]);
        assert!(evaluator().evaluate(&result, &previous).is_empty());
    }

    #[test]
    fn keyword_without_history_cannot_shift() {
        let result = AnalysisResult {
            sentiments: vec![sentiment("checkout", -1.0)],
            market_trends: vec![],
        };
        assert!(evaluator().evaluate(&result, &HashMap::new()).is_empty());
    }

    #[test]
    fn high_trend_score_raises_spike_alert() {
        let result = AnalysisResult {
            sentiments: vec![],
            market_trends: vec![trend("delivery", 90.0), trend("pricing", 10.0)],
        };
        let alerts = evaluator().evaluate(&result, &HashMap::new());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "trend_spike");
        assert!(alerts[0].message.contains("delivery"));
    }
}
