use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Comment, Sentiment};

/// Occurrence count per sentiment over a full comment collection.
///
/// All four labels are always present; labels with no comments count zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Distribution {
    counts: [usize; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<&'static str>,
    pub values: Vec<usize>,
    pub colors: Vec<&'static str>,
}

pub fn color(label: Sentiment) -> &'static str {
    match label {
        Sentiment::Positive => "#28a745",
        Sentiment::Negative => "#dc3545",
        Sentiment::Neutral => "#ffc107",
        Sentiment::Mixed => "#17a2b8",
    }
}

pub fn aggregate(comments: &[Comment]) -> Distribution {
    let mut counts = [0usize; 4];
    for comment in comments {
        counts[comment.sentiment.index()] += 1;
    }
    Distribution { counts }
}

impl Distribution {
    pub fn count(&self, label: Sentiment) -> usize {
        self.counts[label.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// `count / total * 100`, or 0 for every label when there is nothing to count.
    pub fn percentage(&self, label: Sentiment) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.count(label) as f64 / total as f64 * 100.0
    }

    pub fn rounded_percentage(&self, label: Sentiment) -> u32 {
        self.percentage(label).round() as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = (Sentiment, usize)> + '_ {
        Sentiment::ALL
            .iter()
            .map(move |label| (*label, self.count(*label)))
    }

    pub fn chart(&self) -> ChartData {
        ChartData {
            labels: Sentiment::ALL.iter().map(|label| label.display_name()).collect(),
            values: Sentiment::ALL.iter().map(|label| self.count(*label)).collect(),
            colors: Sentiment::ALL.iter().map(|label| color(*label)).collect(),
        }
    }

    /// Labels where a server-reported count disagrees with the local one.
    pub fn mismatches(&self, reported: &BTreeMap<Sentiment, u64>) -> Vec<Sentiment> {
        reported
            .iter()
            .filter(|(label, count)| self.count(**label) as u64 != **count)
            .map(|(label, _)| *label)
            .collect()
    }
}
