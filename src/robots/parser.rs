//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate. Crawl-delay
//! and Sitemap lines are not covered by it and are parsed here.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks if a URL is allowed for the given user agent token
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `user_agent` - The product token of the crawler (e.g., "RippleCollector")
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay for a specific user agent, in seconds
    ///
    /// A delay declared for the agent wins over the wildcard group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }

        let mut current_user_agents: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut crawl_delay_for_wildcard: Option<f64> = None;
        let mut crawl_delay_for_agent: Option<f64> = None;

        let normalized_agent = user_agent.to_lowercase();

        for (key, value) in directives(&self.content) {
            match key.as_str() {
                "user-agent" => {
                    // Consecutive User-agent lines share one group
                    if in_rules {
                        current_user_agents.clear();
                        in_rules = false;
                    }
                    current_user_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if delay < 0.0 {
                        continue;
                    }
                    if current_user_agents
                        .iter()
                        .any(|ua| ua != "*" && normalized_agent.contains(ua.as_str()))
                    {
                        crawl_delay_for_agent = Some(delay);
                    } else if current_user_agents.iter().any(|ua| ua == "*") {
                        crawl_delay_for_wildcard = Some(delay);
                    }
                }
                "sitemap" => {}
                _ => in_rules = true,
            }
        }

        crawl_delay_for_agent.or(crawl_delay_for_wildcard)
    }

    /// Returns the sitemap locations declared with `Sitemap:` lines
    pub fn sitemaps(&self) -> Vec<String> {
        directives(&self.content)
            .filter(|(key, value)| key == "sitemap" && !value.is_empty())
            .map(|(_, value)| value.to_string())
            .collect()
    }
}

/// Iterates over `key: value` lines, lowercasing keys and skipping comments
fn directives(content: &str) -> impl Iterator<Item = (String, &str)> {
    content.lines().filter_map(|line| {
        let line = line.split('#').next().unwrap_or("").trim();
        let (key, value) = line.split_once(':')?;
        Some((key.trim().to_lowercase(), value.trim()))
    })
}
