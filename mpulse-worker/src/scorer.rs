//! Text scoring capability
//!
//! The analysis engine only requires `score(text) -> sentiment +
//! keywords`; the concrete model behind that contract is pluggable.
//! The built-in [`LexiconScorer`] is a deterministic wordlist scorer,
//! which keeps the pipeline self-contained and its output reproducible.

use thiserror::Error;

/// Scoring backend failure (infrastructure, not input)
#[derive(Debug, Error)]
pub enum ScorerError {
    /// The backing model/service could not be reached
    #[error("Scoring backend unavailable: {0}")]
    Unavailable(String),
}

/// Sentiment and keyword labels for one text unit
#[derive(Debug, Clone, PartialEq)]
pub struct TextScore {
    /// Bounded -1.0 (negative) .. 1.0 (positive)
    pub sentiment: f64,
    /// Topic labels extracted from the text, in order of appearance
    pub keywords: Vec<String>,
}

/// Pluggable text-scoring capability
pub trait TextScorer: Send + Sync {
    fn score(&self, text: &str) -> Result<TextScore, ScorerError>;
}

const POSITIVE_WORDS: &[&str] = &[
    "great", "good", "excellent", "amazing", "love", "best", "fantastic", "helpful", "friendly",
    "fast", "reliable", "easy", "happy", "recommend", "awesome", "wonderful", "superb", "pleasant",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "poor", "terrible", "awful", "hate", "worst", "slow", "broken", "expensive", "rude",
    "disappointing", "unreliable", "difficult", "unhappy", "horrible", "frustrating", "late",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "in", "on", "at", "to", "for", "with", "is",
    "are", "was", "were", "be", "been", "it", "its", "this", "that", "my", "our", "their", "very",
    "so", "too", "not", "no", "i", "we", "they", "you",
];

/// Deterministic wordlist sentiment scorer.
///
/// Sentiment is the balance of positive versus negative tokens,
/// `(pos - neg) / (pos + neg)`, zero when neither appears. Keywords are
/// the remaining non-stopword, non-sentiment tokens.
#[derive(Debug, Default, Clone)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }
}

impl TextScorer for LexiconScorer {
    fn score(&self, text: &str) -> Result<TextScore, ScorerError> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut positive = 0usize;
        let mut negative = 0usize;
        let mut keywords = Vec::new();

        for token in &tokens {
            if POSITIVE_WORDS.contains(&token.as_str()) {
                positive += 1;
            } else if NEGATIVE_WORDS.contains(&token.as_str()) {
                negative += 1;
            } else if !STOPWORDS.contains(&token.as_str())
                && !keywords.contains(token)
                && token.chars().any(|c| c.is_alphabetic())
            {
                keywords.push(token.clone());
            }
        }

        let sentiment = if positive + negative == 0 {
            0.0
        } else {
            (positive as f64 - negative as f64) / (positive + negative) as f64
        };

        Ok(TextScore { sentiment, keywords })
    }
}
