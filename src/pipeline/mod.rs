//! Document and reference pipelines
//!
//! - `queue`: admission of candidate references into the crawl store
//! - `importer`: parsing of fetched documents
//! - `committer`: destination of accepted documents

mod committer;
mod importer;
mod queue;

pub use committer::{CommitDocument, CommitError, CommittedDocument, Committer, SqliteCommitter};
pub use importer::{
    ExtractedLink, HtmlImporter, ImportDisposition, ImportRequest, ImportResponse, Importer,
    Metadata,
};
pub use queue::{DropReason, QueueOutcome, QueuePipeline, SitemapStage};
