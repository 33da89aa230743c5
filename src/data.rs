use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use crate::api;
use crate::error::FetchError;
use crate::model::{Comment, CommentSet, ScoreLabel, Scores, Sentiment};
use crate::video_id::VideoId;

/// Cooperative cancellation flag shared between a session and its requests.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait CommentService: Send + Sync {
    fn load_comments(&self, video_id: &VideoId, cancel: &CancelToken)
        -> Result<CommentSet, FetchError>;
}

pub struct ApiCommentService {
    client: Arc<api::Client>,
    max_results: u32,
}

impl ApiCommentService {
    pub fn new(client: Arc<api::Client>, max_results: u32) -> Self {
        Self {
            client,
            max_results,
        }
    }
}

impl CommentService for ApiCommentService {
    fn load_comments(
        &self,
        video_id: &VideoId,
        cancel: &CancelToken,
    ) -> Result<CommentSet, FetchError> {
        self.client.comments(video_id, self.max_results, cancel)
    }
}

/// Serves a fixed sample collection without touching the network.
#[derive(Default)]
pub struct MockCommentService;

impl CommentService for MockCommentService {
    fn load_comments(
        &self,
        video_id: &VideoId,
        _cancel: &CancelToken,
    ) -> Result<CommentSet, FetchError> {
        Ok(mock_set(video_id))
    }
}

fn mock_set(video_id: &VideoId) -> CommentSet {
    let base = Utc
        .timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let samples = [
        ("ana", "This explained it better than my lecturer.", 120, Sentiment::Positive, [0.92, 0.03, 0.05]),
        ("bo", "Audio is way too quiet in the second half.", 14, Sentiment::Negative, [0.05, 0.81, 0.14]),
        ("cy", "Posted at 3am my time, watching anyway.", 3, Sentiment::Neutral, [0.2, 0.1, 0.7]),
        ("dee", "Great visuals, but the ending felt rushed.", 48, Sentiment::Mixed, [0.46, 0.41, 0.13]),
        ("eli", "Instant classic.", 310, Sentiment::Positive, [0.97, 0.01, 0.02]),
    ];

    let comments = samples
        .into_iter()
        .enumerate()
        .map(|(idx, (author, text, likes, sentiment, [pos, neg, neu]))| Comment {
            author: author.to_string(),
            text: text.to_string(),
            published_at: base + Duration::hours(idx as i64),
            like_count: likes,
            sentiment,
            scores: Some(Scores::from([
                (ScoreLabel::Positive, pos),
                (ScoreLabel::Negative, neg),
                (ScoreLabel::Neutral, neu),
            ])),
        })
        .collect();

    let mut set = CommentSet::new(video_id.clone(), comments);
    set.title = "Sample video".to_string();
    set
}
