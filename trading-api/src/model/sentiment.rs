use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A scheduled macro event the news provider rates as high impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsEvent {
    pub title: String,
    pub currency: String,
    pub scheduled_at: DateTime<Utc>,
}

/// Aggregated headline sentiment over a trailing window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    /// Mean score in [-1, 1].
    pub average_score: f64,
    pub samples: usize,
    /// Number of headlines matching each tracked topic.
    pub topic_hits: HashMap<String, usize>,
}
