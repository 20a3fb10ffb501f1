/// Crawl state definitions for tracking reference progress
///
/// This module defines all possible states a reference can be in during the crawl process.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a reference in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    // ===== Active States =====
    /// Reference is queued and waiting to be fetched
    Queued,

    /// Reference is currently being fetched (never persisted)
    Fetching,

    // ===== Good States =====
    /// Document was never seen in a previous crawl
    New,

    /// Document content changed since the previous crawl
    Modified,

    /// Document content is the same as in the previous crawl
    Unmodified,

    // ===== Terminal Exclusion States =====
    /// Document used to exist and is now gone
    Deleted,

    /// Server reported the document does not exist (HTTP 404/410)
    NotFound,

    /// Document was excluded by a filter, robots rule or importer decision
    Rejected,

    // ===== Transient Failure States =====
    /// Server answered with an unexpected status code
    BadStatus,

    /// Fetching or processing the document failed
    Error,

    // ===== Special States =====
    /// Reference redirected to another URL
    Redirect,

    /// No fetcher accepted the reference
    Unsupported,
}

impl CrawlState {
    /// Returns true if the document can proceed to import and commit
    pub fn is_good(&self) -> bool {
        matches!(self, Self::New | Self::Modified | Self::Unmodified)
    }

    /// Returns true for documents that changed (or are new) since the last crawl
    pub fn is_new_or_modified(&self) -> bool {
        matches!(self, Self::New | Self::Modified)
    }

    /// Returns true if the document was skipped rather than fully processed
    ///
    /// Skipped documents had no chance to have their links extracted in this run.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Unmodified | Self::Rejected | Self::Redirect)
    }

    /// Returns true for failures that may go away on a later crawl
    pub fn is_transient_failure(&self) -> bool {
        matches!(self, Self::BadStatus | Self::Error)
    }

    /// Returns true for states that exclude the document from the collection
    pub fn is_terminal_exclusion(&self) -> bool {
        matches!(self, Self::NotFound | Self::Deleted | Self::Rejected)
    }

    /// Returns true if this is a terminal state for the current fetch cycle
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Fetching)
    }

    /// Returns true if this state is any of the given states
    pub fn is_one_of(&self, states: &[CrawlState]) -> bool {
        states.contains(self)
    }

    /// Converts the crawl state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::New => "new",
            Self::Modified => "modified",
            Self::Unmodified => "unmodified",
            Self::Deleted => "deleted",
            Self::NotFound => "not_found",
            Self::Rejected => "rejected",
            Self::BadStatus => "bad_status",
            Self::Error => "error",
            Self::Redirect => "redirect",
            Self::Unsupported => "unsupported",
        }
    }

    /// Parses a crawl state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "fetching" => Some(Self::Fetching),
            "new" => Some(Self::New),
            "modified" => Some(Self::Modified),
            "unmodified" => Some(Self::Unmodified),
            "deleted" => Some(Self::Deleted),
            "not_found" => Some(Self::NotFound),
            "rejected" => Some(Self::Rejected),
            "bad_status" => Some(Self::BadStatus),
            "error" => Some(Self::Error),
            "redirect" => Some(Self::Redirect),
            "unsupported" => Some(Self::Unsupported),
            _ => None,
        }
    }

    /// Returns all possible crawl states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Queued,
            Self::Fetching,
            Self::New,
            Self::Modified,
            Self::Unmodified,
            Self::Deleted,
            Self::NotFound,
            Self::Rejected,
            Self::BadStatus,
            Self::Error,
            Self::Redirect,
            Self::Unsupported,
        ]
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
