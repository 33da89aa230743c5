use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::model::{Comment, ScoreLabel, Sentiment, UnknownLabel};

pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Only(Sentiment),
}

impl Filter {
    pub fn matches(&self, comment: &Comment) -> bool {
        match self {
            Filter::All => true,
            Filter::Only(label) => comment.sentiment == *label,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Only(label) => label.as_str(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Filter {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Filter::All);
        }
        s.parse::<Sentiment>().map(Filter::Only)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Recent,
    Likes,
    PositiveScore,
    NegativeScore,
    NeutralScore,
}

impl SortKey {
    pub const ALL: [SortKey; 5] = [
        SortKey::Recent,
        SortKey::Likes,
        SortKey::PositiveScore,
        SortKey::NegativeScore,
        SortKey::NeutralScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Recent => "recent",
            SortKey::Likes => "likes",
            SortKey::PositiveScore => "positive-score",
            SortKey::NegativeScore => "negative-score",
            SortKey::NeutralScore => "neutral-score",
        }
    }

    pub fn score_label(&self) -> Option<ScoreLabel> {
        match self {
            SortKey::PositiveScore => Some(ScoreLabel::Positive),
            SortKey::NegativeScore => Some(ScoreLabel::Negative),
            SortKey::NeutralScore => Some(ScoreLabel::Neutral),
            SortKey::Recent | SortKey::Likes => None,
        }
    }

    fn compare(&self, a: &Comment, b: &Comment) -> Ordering {
        if let Some(label) = self.score_label() {
            let left = a.score(label).unwrap_or(f64::NEG_INFINITY);
            let right = b.score(label).unwrap_or(f64::NEG_INFINITY);
            return right.total_cmp(&left);
        }
        match self {
            SortKey::Likes => b.like_count.cmp(&a.like_count),
            _ => b.published_at.cmp(&a.published_at),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort key {0:?} (expected one of recent, likes, positive-score, negative-score, neutral-score)")]
pub struct UnknownSortKey(pub String);

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        SortKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| UnknownSortKey(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("cannot sort by {key}: {missing} comment(s) carry no sentiment scores")]
    ScoresUnavailable { key: SortKey, missing: usize },
}

/// Filter, sort and pagination selections over a comment collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    filter: Filter,
    sort: SortKey,
    page: usize,
    page_size: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}

/// One page of the filtered and sorted collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    pub items: Vec<&'a Comment>,
    pub page: usize,
    pub total_pages: usize,
    /// Zero-based position of the first item within the filtered sequence.
    pub offset: usize,
    pub filtered_count: usize,
    pub total_count: usize,
}

impl Page<'_> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

pub fn total_pages(count: usize, page_size: usize) -> usize {
    count.div_ceil(page_size.max(1)).max(1)
}

impl ViewState {
    pub fn new() -> Self {
        Self {
            filter: Filter::All,
            sort: SortKey::Recent,
            page: 1,
            page_size: PAGE_SIZE,
        }
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn sort(&self) -> SortKey {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
        self.page = 1;
    }

    /// Score keys require every comment to carry scores; otherwise the change
    /// is rejected and the current state is left untouched.
    pub fn set_sort(&mut self, key: SortKey, comments: &[Comment]) -> Result<(), ViewError> {
        if let Some(label) = key.score_label() {
            let missing = comments.iter().filter(|c| c.score(label).is_none()).count();
            if missing > 0 {
                return Err(ViewError::ScoresUnavailable { key, missing });
            }
        }
        self.sort = key;
        self.page = 1;
        Ok(())
    }

    /// Moves to `page`, clamped to the pages that exist for the current filter.
    pub fn set_page(&mut self, page: usize, comments: &[Comment]) {
        self.page = page;
        self.clamp(self.filtered_count(comments));
    }

    pub fn next_page(&mut self, comments: &[Comment]) {
        self.set_page(self.page.saturating_add(1), comments);
    }

    pub fn prev_page(&mut self, comments: &[Comment]) {
        self.set_page(self.page.saturating_sub(1), comments);
    }

    pub fn clamp(&mut self, filtered_count: usize) {
        let last = total_pages(filtered_count, self.page_size);
        self.page = self.page.clamp(1, last);
    }

    /// Re-validates the selections against a freshly loaded collection.
    pub fn rebase(&mut self, comments: &[Comment]) {
        if let Some(label) = self.sort.score_label() {
            if comments.iter().any(|c| c.score(label).is_none()) {
                self.sort = SortKey::Recent;
            }
        }
        self.page = 1;
    }

    pub fn filtered_count(&self, comments: &[Comment]) -> usize {
        comments.iter().filter(|c| self.filter.matches(c)).count()
    }

    pub fn project<'a>(&self, comments: &'a [Comment]) -> Page<'a> {
        let mut filtered: Vec<&Comment> =
            comments.iter().filter(|c| self.filter.matches(c)).collect();
        filtered.sort_by(|a, b| self.sort.compare(a, b));

        let filtered_count = filtered.len();
        let total_pages = total_pages(filtered_count, self.page_size);
        let page = self.page.clamp(1, total_pages);
        let offset = (page - 1) * self.page_size;
        let items = filtered
            .into_iter()
            .skip(offset)
            .take(self.page_size)
            .collect();

        Page {
            items,
            page,
            total_pages,
            offset,
            filtered_count,
            total_count: comments.len(),
        }
    }
}
