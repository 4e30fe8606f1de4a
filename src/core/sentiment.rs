//! Sentiment Capability
//!
//! `Analyze(texts) -> (polarity, confidence)`. The strategy engine treats the
//! result as one more signal type. Two implementations:
//! - `LexiconSentiment`: offline keyword scorer, majority vote over texts
//! - `HttpSentiment`: delegates to an external scoring service

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::models::errors::{AppError, AppResult};
use crate::providers::transport::build_client;

/// Polarity in [-1, 1], confidence in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentScore {
    pub polarity: f64,
    pub confidence: f64,
}

impl SentimentScore {
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn clamped(self) -> Self {
        Self {
            polarity: self.polarity.clamp(-1.0, 1.0),
            confidence: self.confidence.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(&self, texts: &[String]) -> AppResult<SentimentScore>;
}

// ============================================
// LEXICON
// ============================================

const POSITIVE: &[&str] = &[
    "new", "launched", "major", "large", "whale", "purchase", "addition", "good", "great",
    "awesome", "bullish", "moon", "pump", "🚀",
];

const NEGATIVE: &[&str] = &[
    "bad", "terrible", "rug", "scam", "dump", "removed", "bearish", "exploit", "honeypot",
    "drained",
];

/// Keyword scorer: each text votes -1/0/+1, the strict majority wins and the
/// confidence is the majority's share of the votes.
#[derive(Debug, Clone, Default)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn new() -> Self {
        Self
    }

    fn vote(text: &str) -> i8 {
        let lower = text.to_lowercase();
        let mut score = 0i32;
        for token in lower.split(|c: char| c.is_whitespace() || ",.!?()".contains(c)) {
            if token.is_empty() {
                continue;
            }
            if POSITIVE.contains(&token) {
                score += 1;
            } else if NEGATIVE.contains(&token) {
                score -= 1;
            }
        }
        score.signum() as i8
    }

    pub fn score(texts: &[String]) -> SentimentScore {
        let votes: Vec<i8> = texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| Self::vote(t))
            .collect();
        if votes.is_empty() {
            return SentimentScore::neutral();
        }

        let count = |v: i8| votes.iter().filter(|x| **x == v).count();
        let (pos, neg, neu) = (count(1), count(-1), count(0));
        let overall = if pos > neg && pos > neu {
            1
        } else if neg > pos && neg > neu {
            -1
        } else {
            0
        };

        SentimentScore {
            polarity: overall as f64,
            confidence: count(overall) as f64 / votes.len() as f64,
        }
    }
}

#[async_trait]
impl SentimentAnalyzer for LexiconSentiment {
    async fn analyze(&self, texts: &[String]) -> AppResult<SentimentScore> {
        let score = Self::score(texts);
        debug!(
            "💬 Lexicon sentiment over {} texts: polarity {:.2}, confidence {:.2}",
            texts.len(),
            score.polarity,
            score.confidence
        );
        Ok(score)
    }
}

// ============================================
// HTTP
// ============================================

#[derive(Serialize)]
struct SentimentRequest<'a> {
    texts: &'a [String],
}

/// Posts `{"texts": [...]}` and expects `{"polarity": f, "confidence": f}`
#[derive(Clone)]
pub struct HttpSentiment {
    url: String,
    client: reqwest::Client,
}

impl HttpSentiment {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            url: url.into(),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl SentimentAnalyzer for HttpSentiment {
    async fn analyze(&self, texts: &[String]) -> AppResult<SentimentScore> {
        let response = self
            .client
            .post(&self.url)
            .json(&SentimentRequest { texts })
            .send()
            .await
            .map_err(|e| AppError::sentiment_failed(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::sentiment_failed(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let score: SentimentScore = response
            .json()
            .await
            .map_err(|e| AppError::sentiment_failed(format!("invalid response: {}", e)))?;
        Ok(score.clamped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_positive_majority() {
        let score = LexiconSentiment::score(&texts(&[
            "This token is awesome",
            "good momentum 🚀",
            "Swap executed",
        ]));
        assert_eq!(score.polarity, 1.0);
        assert!((score.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_majority() {
        let score = LexiconSentiment::score(&texts(&["terrible launch", "looks like a rug"]));
        assert_eq!(score.polarity, -1.0);
        assert_eq!(score.confidence, 1.0);
    }

    #[test]
    fn test_tie_is_neutral() {
        let score = LexiconSentiment::score(&texts(&["good", "bad"]));
        assert_eq!(score.polarity, 0.0);
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn test_empty_is_neutral() {
        assert_eq!(LexiconSentiment::score(&[]), SentimentScore::neutral());
        assert_eq!(LexiconSentiment::score(&texts(&["  "])), SentimentScore::neutral());
    }

    #[test]
    fn test_clamped() {
        let score = SentimentScore {
            polarity: 3.0,
            confidence: -1.0,
        }
        .clamped();
        assert_eq!((score.polarity, score.confidence), (1.0, 0.0));
    }

    #[tokio::test]
    async fn test_event_descriptions_read_positive() {
        let analyzer = LexiconSentiment::new();
        let score = analyzer
            .analyze(&texts(&[
                "New trading pair created for 0xabcd...1234",
                "Large whale purchase of $120000 for 0xabcd...1234",
            ]))
            .await
            .unwrap();
        assert_eq!(score.polarity, 1.0);
    }
}
