use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::model::CommentSet;
use crate::video_id::VideoId;

pub const DEFAULT_MAX_ENTRIES: usize = 16;
pub const DEFAULT_TTL: Duration = Duration::from_secs(120);

struct CacheEntry {
    set: CommentSet,
    fetched_at: Instant,
}

/// Recently fetched comment sets keyed by video.
///
/// Entries older than `ttl` are treated as absent. When full, inserting evicts
/// the entry with the oldest fetch time. A capacity of zero disables caching.
pub struct CommentCache {
    entries: HashMap<VideoId, CacheEntry>,
    max_entries: usize,
    ttl: Duration,
}

impl Default for CommentCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl CommentCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            ttl,
        }
    }

    pub fn get(&self, video_id: &VideoId) -> Option<&CommentSet> {
        self.get_at(video_id, Instant::now())
    }

    pub fn get_at(&self, video_id: &VideoId, now: Instant) -> Option<&CommentSet> {
        let entry = self.entries.get(video_id)?;
        if now.saturating_duration_since(entry.fetched_at) < self.ttl {
            Some(&entry.set)
        } else {
            None
        }
    }

    pub fn insert(&mut self, set: CommentSet) {
        self.insert_at(set, Instant::now());
    }

    pub fn insert_at(&mut self, set: CommentSet, now: Instant) {
        if self.max_entries == 0 {
            return;
        }
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.fetched_at) < ttl);
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&set.video_id) {
            if let Some(old_key) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(key, _)| key.clone())
            {
                debug!("evicting cached comments - video={}", old_key);
                self.entries.remove(&old_key);
            }
        }
        self.entries.insert(
            set.video_id.clone(),
            CacheEntry {
                set,
                fetched_at: now,
            },
        );
    }

    pub fn invalidate(&mut self, video_id: &VideoId) {
        self.entries.remove(video_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(id: &str) -> CommentSet {
        CommentSet::new(VideoId::new(id).unwrap(), Vec::new())
    }

    fn vid(id: &str) -> VideoId {
        VideoId::new(id).unwrap()
    }

    #[test]
    fn expires_after_ttl() {
        let mut cache = CommentCache::new(4, Duration::from_secs(60));
        let start = Instant::now();
        cache.insert_at(set("aaaaaaaaaaa"), start);
        assert!(cache.get_at(&vid("aaaaaaaaaaa"), start + Duration::from_secs(59)).is_some());
        assert!(cache.get_at(&vid("aaaaaaaaaaa"), start + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut cache = CommentCache::new(2, Duration::from_secs(600));
        let start = Instant::now();
        cache.insert_at(set("aaaaaaaaaaa"), start);
        cache.insert_at(set("bbbbbbbbbbb"), start + Duration::from_secs(1));
        cache.insert_at(set("ccccccccccc"), start + Duration::from_secs(2));
        let now = start + Duration::from_secs(3);
        assert_eq!(cache.len(), 2);
        assert!(cache.get_at(&vid("aaaaaaaaaaa"), now).is_none());
        assert!(cache.get_at(&vid("bbbbbbbbbbb"), now).is_some());
        assert!(cache.get_at(&vid("ccccccccccc"), now).is_some());
    }

    #[test]
    fn refreshing_existing_key_does_not_evict() {
        let mut cache = CommentCache::new(2, Duration::from_secs(600));
        let start = Instant::now();
        cache.insert_at(set("aaaaaaaaaaa"), start);
        cache.insert_at(set("bbbbbbbbbbb"), start);
        cache.insert_at(set("aaaaaaaaaaa"), start + Duration::from_secs(1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_and_zero_capacity() {
        let mut cache = CommentCache::default();
        cache.insert(set("aaaaaaaaaaa"));
        cache.invalidate(&vid("aaaaaaaaaaa"));
        assert!(cache.is_empty());

        cache.insert(set("bbbbbbbbbbb"));
        cache.insert(set("ccccccccccc"));
        cache.clear();
        assert_eq!(cache.len(), 0);

        let mut off = CommentCache::new(0, DEFAULT_TTL);
        off.insert(set("aaaaaaaaaaa"));
        assert!(off.get(&vid("aaaaaaaaaaa")).is_none());
    }
}
