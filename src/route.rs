use crate::error::FetchError;
use crate::video_id::{self, VideoId};

const COMMENTS_PREFIX: &str = "/comments/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    Comments(VideoId),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Landing => "/".to_string(),
            Route::Comments(id) => format!("{COMMENTS_PREFIX}{id}"),
        }
    }

    pub fn video_id(&self) -> Option<&VideoId> {
        match self {
            Route::Comments(id) => Some(id),
            Route::Landing => None,
        }
    }
}

/// Resolves a submitted URL to the comments view for its identifier.
/// Invalid input yields `InvalidInput` and no route at all.
pub fn navigate(raw_url: &str) -> Result<Route, FetchError> {
    video_id::extract(raw_url)
        .map(Route::Comments)
        .ok_or(FetchError::InvalidInput)
}
