/// A host pattern from the `[[exclude]]` table
///
/// `*.example.com` covers the bare domain and any subdomain below it;
/// anything else must equal the host exactly. Patterns are compared
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Subtree(String),
}

impl HostPattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_lowercase();
        match pattern.strip_prefix("*.") {
            Some(base) => HostPattern::Subtree(base.to_string()),
            None => HostPattern::Exact(pattern),
        }
    }

    /// Returns true if `host` (already lowercased) falls under this pattern
    pub fn covers(&self, host: &str) -> bool {
        match self {
            HostPattern::Exact(name) => host == name,
            HostPattern::Subtree(base) => {
                host == base
                    || host
                        .strip_suffix(base.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
        }
    }
}
