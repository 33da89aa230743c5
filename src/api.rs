use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::data::CancelToken;
use crate::error::FetchError;
use crate::model::{Comment, CommentSet, ScoreLabel, Scores, Sentiment, UNKNOWN_TITLE};
use crate::video_id::VideoId;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const COMMENTS_PATH: &str = "/api/comments";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("comments client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base).with_context(|| format!("parse api base url {base:?}"))?;

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()
                .context("build comments HTTP client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn comments_url(&self, video_id: &VideoId, max_results: u32) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join(COMMENTS_PATH)
            .map_err(|err| FetchError::Transient(format!("build request url: {err}")))?;
        url.query_pairs_mut()
            .append_pair("videoId", video_id.as_str())
            .append_pair("maxResults", &max_results.to_string());
        Ok(url)
    }

    /// Performs one retrieval attempt. Retrying is the caller's business.
    ///
    /// A cancelled token short-circuits before the request and skips decoding
    /// after it; the blocking transport itself cannot be interrupted mid-flight.
    pub fn comments(
        &self,
        video_id: &VideoId,
        max_results: u32,
        cancel: &CancelToken,
    ) -> Result<CommentSet, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Transient("request cancelled".into()));
        }
        let url = self.comments_url(video_id, max_results)?;
        let start = Instant::now();
        debug!("requesting comments - video={}, url={}", video_id, url);

        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|err| FetchError::Transient(describe_transport_error(&err)))?;

        let status = response.status();
        if cancel.is_cancelled() {
            debug!("dropping response for cancelled request - video={}", video_id);
            return Err(FetchError::Transient("request cancelled".into()));
        }

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = error_message(&body)
                .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));
            warn!(
                "comments request rejected - video={}, status={}, message={}",
                video_id, status, message
            );
            return Err(FetchError::Server {
                status: status.as_u16(),
                message,
            });
        }

        // A stalled body surfaces from `json()` as a decode error wrapping the
        // timeout, so the timeout check has to come first.
        let payload: Value = response.json().map_err(|err| {
            if err.is_timeout() {
                FetchError::Transient(describe_transport_error(&err))
            } else if err.is_decode() {
                FetchError::Malformed(format!("response body is not JSON: {err}"))
            } else {
                FetchError::Transient(describe_transport_error(&err))
            }
        })?;

        let set = normalize(video_id, payload)?;
        info!(
            "comments fetched - video={}, comments={}, duration={:.2}s",
            video_id,
            set.len(),
            start.elapsed().as_secs_f32()
        );
        Ok(set)
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorPayload = serde_json::from_str(body).ok()?;
    parsed.error.filter(|message| !message.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentsPayload {
    comments: Vec<WireComment>,
    #[serde(default)]
    video_title: Option<String>,
    #[serde(default)]
    video_published_at: Option<String>,
    #[serde(default)]
    sentiment_stats: Option<BTreeMap<String, u64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComment {
    #[serde(default)]
    author: String,
    #[serde(default)]
    text: String,
    published_at: String,
    #[serde(default)]
    like_count: u64,
    sentiment: String,
    #[serde(default)]
    scores: Option<BTreeMap<String, f64>>,
}

/// Validates a success payload and converts it into a `CommentSet`.
///
/// Any shape violation rejects the whole payload; nothing is partially kept.
pub fn normalize(video_id: &VideoId, payload: Value) -> Result<CommentSet, FetchError> {
    match payload.get("comments") {
        Some(Value::Array(_)) => {}
        Some(_) => return Err(FetchError::Malformed("`comments` is not an array".into())),
        None => return Err(FetchError::Malformed("`comments` is missing".into())),
    }

    let wire: CommentsPayload = serde_json::from_value(payload)
        .map_err(|err| FetchError::Malformed(format!("decode comments payload: {err}")))?;

    let comments = wire
        .comments
        .into_iter()
        .enumerate()
        .map(|(idx, comment)| normalize_comment(comment).map_err(|reason| {
            FetchError::Malformed(format!("comment #{idx}: {reason}"))
        }))
        .collect::<Result<Vec<_>, _>>()?;

    let title = wire
        .video_title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let published_at = match wire.video_published_at.as_deref() {
        Some(raw) => Some(
            parse_timestamp(raw)
                .map_err(|reason| FetchError::Malformed(format!("videoPublishedAt: {reason}")))?,
        ),
        None => None,
    };

    // Display-only, so an unknown label is dropped rather than failing the payload.
    let reported_stats = wire.sentiment_stats.map(|stats| {
        stats
            .into_iter()
            .filter_map(|(label, count)| match label.parse::<Sentiment>() {
                Ok(label) => Some((label, count)),
                Err(err) => {
                    warn!("ignoring sentimentStats entry - video={}, {}", video_id, err);
                    None
                }
            })
            .collect::<BTreeMap<_, _>>()
    });

    Ok(CommentSet {
        video_id: video_id.clone(),
        title,
        published_at,
        comments,
        reported_stats,
    })
}

fn normalize_comment(wire: WireComment) -> Result<Comment, String> {
    let sentiment = wire.sentiment.parse::<Sentiment>().map_err(|err| err.to_string())?;
    let published_at = parse_timestamp(&wire.published_at)?;
    let scores = match wire.scores {
        Some(raw) => Some(normalize_scores(raw)?),
        None => None,
    };
    Ok(Comment {
        author: wire.author,
        text: wire.text,
        published_at,
        like_count: wire.like_count,
        sentiment,
        scores,
    })
}

fn normalize_scores(raw: BTreeMap<String, f64>) -> Result<Scores, String> {
    let mut scores = Scores::new();
    for (label, value) in raw {
        let label = label
            .parse::<ScoreLabel>()
            .map_err(|_| format!("unsupported score label {label:?}"))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(format!("score for {} out of range: {value}", label.as_str()));
        }
        scores.insert(label, value);
    }
    if let Some(missing) = ScoreLabel::ALL.iter().find(|label| !scores.contains_key(*label)) {
        return Err(format!("scores missing {} label", missing.as_str()));
    }
    Ok(scores)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| format!("invalid timestamp {raw:?}: {err}"))
}
