use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::video_id::VideoId;

pub const UNKNOWN_TITLE: &str = "Unknown Title";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

impl Sentiment {
    /// Canonical label order used by distributions and charts.
    pub const ALL: [Sentiment; 4] = [
        Sentiment::Positive,
        Sentiment::Negative,
        Sentiment::Neutral,
        Sentiment::Mixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Mixed => "mixed",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Negative => "Negative",
            Sentiment::Neutral => "Neutral",
            Sentiment::Mixed => "Mixed",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Sentiment::Positive => 0,
            Sentiment::Negative => 1,
            Sentiment::Neutral => 2,
            Sentiment::Mixed => 3,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized sentiment label {0:?}")]
pub struct UnknownLabel(pub String);

impl FromStr for Sentiment {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            "mixed" => Ok(Sentiment::Mixed),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

/// Labels the upstream service scores individually. `mixed` has no score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreLabel {
    Positive,
    Negative,
    Neutral,
}

impl ScoreLabel {
    pub const ALL: [ScoreLabel; 3] = [
        ScoreLabel::Positive,
        ScoreLabel::Negative,
        ScoreLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreLabel::Positive => "positive",
            ScoreLabel::Negative => "negative",
            ScoreLabel::Neutral => "neutral",
        }
    }
}

impl FromStr for ScoreLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(ScoreLabel::Positive),
            "negative" => Ok(ScoreLabel::Negative),
            "neutral" => Ok(ScoreLabel::Neutral),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

/// Per-label confidence values, each in `[0.0, 1.0]`.
pub type Scores = BTreeMap<ScoreLabel, f64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub published_at: DateTime<Utc>,
    pub like_count: u64,
    pub sentiment: Sentiment,
    pub scores: Option<Scores>,
}

impl Comment {
    pub fn score(&self, label: ScoreLabel) -> Option<f64> {
        self.scores.as_ref().and_then(|scores| scores.get(&label).copied())
    }
}

/// A fully normalized server response for one video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentSet {
    pub video_id: VideoId,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub comments: Vec<Comment>,
    /// Counts as reported by the server, kept for display only.
    pub reported_stats: Option<BTreeMap<Sentiment, u64>>,
}

impl CommentSet {
    pub fn new(video_id: VideoId, comments: Vec<Comment>) -> Self {
        Self {
            video_id,
            title: UNKNOWN_TITLE.to_string(),
            published_at: None,
            comments,
            reported_stats: None,
        }
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn all_scored(&self) -> bool {
        self.comments.iter().all(|comment| comment.scores.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_case_insensitively() {
        assert_eq!("Positive".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!(" mixed ".parse::<Sentiment>().unwrap(), Sentiment::Mixed);
        assert!("angry".parse::<Sentiment>().is_err());
    }

    #[test]
    fn score_labels_exclude_mixed() {
        assert!("mixed".parse::<ScoreLabel>().is_err());
        assert_eq!("neutral".parse::<ScoreLabel>().unwrap(), ScoreLabel::Neutral);
    }

    #[test]
    fn canonical_order_matches_index() {
        for (idx, label) in Sentiment::ALL.iter().enumerate() {
            assert_eq!(label.index(), idx);
        }
    }
}
