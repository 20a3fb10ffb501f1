//! Per-root robots.txt cache
//!
//! A downloaded file is trusted for a day. When the download failed the
//! allow-all fallback is only kept for an hour so the site gets another try
//! during long crawls.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// How a cached robots.txt was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsOrigin {
    /// The file was downloaded and parsed
    Downloaded,
    /// The server answered without a robots.txt
    Absent,
    /// The server could not be reached or the body could not be read
    Unreachable,
}

impl RobotsOrigin {
    fn time_to_live(self) -> Duration {
        match self {
            RobotsOrigin::Downloaded | RobotsOrigin::Absent => Duration::hours(24),
            RobotsOrigin::Unreachable => Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    rules: ParsedRobots,
    origin: RobotsOrigin,
    fetched_at: DateTime<Utc>,
}

impl Entry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at <= self.origin.time_to_live()
    }
}

/// Robots rules keyed by URL root
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rules of `url_root` unless missing or expired
    pub async fn lookup(&self, url_root: &str) -> Option<ParsedRobots> {
        let entries = self.entries.read().await;
        entries
            .get(url_root)
            .filter(|entry| entry.is_fresh(Utc::now()))
            .map(|entry| entry.rules.clone())
    }

    pub async fn store(&self, url_root: &str, rules: ParsedRobots, origin: RobotsOrigin) {
        self.store_at(url_root, rules, origin, Utc::now()).await;
    }

    async fn store_at(
        &self,
        url_root: &str,
        rules: ParsedRobots,
        origin: RobotsOrigin,
        fetched_at: DateTime<Utc>,
    ) {
        self.entries.write().await.insert(
            url_root.to_string(),
            Entry {
                rules,
                origin,
                fetched_at,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://example.com";

    #[tokio::test]
    async fn test_fresh_entry_is_returned() {
        let cache = RobotsCache::new();
        assert!(cache.lookup(ROOT).await.is_none());

        cache
            .store(ROOT, ParsedRobots::allow_all(), RobotsOrigin::Downloaded)
            .await;
        assert!(cache.lookup(ROOT).await.is_some());
        assert!(cache.lookup("https://other.example").await.is_none());
    }

    #[tokio::test]
    async fn test_downloaded_rules_expire_after_a_day() {
        let cache = RobotsCache::new();
        let rules = ParsedRobots::allow_all();

        cache
            .store_at(
                ROOT,
                rules.clone(),
                RobotsOrigin::Downloaded,
                Utc::now() - Duration::hours(23),
            )
            .await;
        assert!(cache.lookup(ROOT).await.is_some());

        cache
            .store_at(
                ROOT,
                rules,
                RobotsOrigin::Absent,
                Utc::now() - Duration::hours(25),
            )
            .await;
        assert!(cache.lookup(ROOT).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_fallback_expires_sooner() {
        let cache = RobotsCache::new();
        cache
            .store_at(
                ROOT,
                ParsedRobots::allow_all(),
                RobotsOrigin::Unreachable,
                Utc::now() - Duration::minutes(90),
            )
            .await;
        assert!(cache.lookup(ROOT).await.is_none());
    }
}
