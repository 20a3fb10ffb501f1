//! Politeness delays between requests to the same host

use crate::robots::RobotsPolicy;
use crate::url::root_of;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

/// Spaces out requests per URL root
///
/// The effective delay of a root is the larger of the configured minimum
/// delay and the robots.txt `Crawl-delay`. Each caller reserves the next
/// free slot under the lock and sleeps outside of it, so concurrent workers
/// hitting the same host are serialized while other hosts proceed.
pub struct DelayResolver {
    min_delay: Duration,
    robots: Option<Arc<dyn RobotsPolicy>>,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl DelayResolver {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            robots: None,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Takes robots.txt crawl delays into account
    pub fn with_robots(mut self, robots: Arc<dyn RobotsPolicy>) -> Self {
        self.robots = Some(robots);
        self
    }

    /// Calculates the effective delay for a URL root
    pub async fn effective_delay(&self, url_root: &str) -> Duration {
        let robots_delay = match &self.robots {
            Some(robots) => robots.crawl_delay(url_root).await.unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        };
        std::cmp::max(self.min_delay, robots_delay)
    }

    /// Waits until a request to the URL's host is allowed
    pub async fn wait(&self, url: &Url) {
        let Some(root) = root_of(url) else {
            return;
        };
        let delay = self.effective_delay(&root).await;
        if delay.is_zero() {
            return;
        }

        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next_slot
                .get(&root)
                .map(|next| std::cmp::max(*next, now))
                .unwrap_or(now);
            next_slot.insert(root, slot + delay);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}
