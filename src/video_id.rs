use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub const VIDEO_ID_LEN: usize = 11;

// The leading `.*` is greedy, so the last identifier-bearing segment wins.
static VIDEO_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*(?:youtu\.be/|v/|u/\w/|embed/|watch\?v=|&v=)([^#&?]*).*")
        .expect("video url pattern compiles")
});

/// Canonical 11-character video identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Accepts a bare identifier; anything not exactly 11 characters is rejected.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.chars().count() == VIDEO_ID_LEN {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Pulls the video identifier out of a short-link, watch, embed or path URL.
///
/// Returns `None` when no supported shape matches or when the captured token
/// is not exactly 11 characters long. Never panics on user input.
pub fn extract(raw_url: &str) -> Option<VideoId> {
    let captures = VIDEO_URL.captures(raw_url.trim())?;
    let token = captures.get(1)?.as_str();
    VideoId::new(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn extracts_from_common_shapes() {
        let cases = [
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/u/w/dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ#t=42",
            "  https://youtu.be/dQw4w9WgXcQ  ",
        ];
        for url in cases {
            assert_eq!(
                extract(url).as_ref().map(VideoId::as_str),
                Some("dQw4w9WgXcQ"),
                "url: {url}"
            );
        }
    }

    #[test]
    fn rejects_wrong_length_tokens() {
        assert!(extract("https://youtu.be/short").is_none());
        assert!(extract("https://www.youtube.com/watch?v=dQw4w9WgXcQX").is_none());
        assert!(extract("https://youtu.be/dQw4w9WgXcQ/extra").is_none());
        assert!(extract("https://www.youtube.com/watch?v=").is_none());
    }

    #[test]
    fn rejects_unrelated_input() {
        assert!(extract("").is_none());
        assert!(extract("not a url").is_none());
        assert!(extract("https://example.com/dQw4w9WgXcQ").is_none());
    }

    fn prefixes() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "https://youtu.be/",
            "https://www.youtube.com/watch?v=",
            "https://www.youtube.com/watch?list=abc&v=",
            "https://www.youtube.com/embed/",
            "https://www.youtube.com/v/",
        ])
    }

    proptest! {
        #[test]
        fn keeps_eleven_char_tokens_unchanged(prefix in prefixes(), token in "[A-Za-z0-9_-]{11}") {
            let url = format!("{prefix}{token}");
            prop_assert_eq!(extract(&url).map(|id| id.as_str().to_string()), Some(token));
        }

        #[test]
        fn rejects_other_lengths(prefix in prefixes(), token in "[A-Za-z0-9_-]{0,30}") {
            prop_assume!(token.len() != VIDEO_ID_LEN);
            let url = format!("{prefix}{token}");
            prop_assert!(extract(&url).is_none());
        }
    }
}
