use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod aggregate;
pub mod locate;
pub mod panel;
pub mod patch;
pub mod segment;
pub mod types;

pub use aggregate::{aggregate, normalized_phrase, AggregateReport, Heatmap};
pub use locate::locate;
pub use panel::{merge_panel, PanelReport};
pub use patch::apply_edits;
pub use segment::segment;
pub use types::{Edit, Finding, PanelFinding, PhraseBucket, ResolvedFinding, Section};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("oracle failed: {0}")]
    Oracle(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("phrase not found in document: {0:?}")]
    PhraseNotFound(String),
    #[error("overlapping edits: {first:?} and {second:?}")]
    OverlappingEdits { first: String, second: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePolicy {
    /// If true, allow reading from cache.
    pub read: bool,
    /// If true, allow writing to cache.
    pub write: bool,
    /// If set, cached entries older than this are treated as a miss.
    pub ttl_s: Option<u64>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
            ttl_s: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub url: String,
    /// Timeout for the operation (network + extraction).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
    pub cache: CachePolicy,
}

impl DocumentRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentOrigin {
    Cache,
    Network,
}

/// A fetched document, already reduced to analyzable plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentText {
    pub url: String,
    pub final_url: String,
    pub title: Option<String>,
    pub text: String,
    pub truncated: bool,
    pub origin: DocumentOrigin,
}

#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, req: &DocumentRequest) -> Result<DocumentText>;
}

/// External bias-detection oracle.
///
/// One call inspects one section of text and proposes zero or more findings.
/// Calls are not assumed idempotent and may fail transiently; retry policy
/// belongs to the caller, not to the aggregation core.
#[async_trait::async_trait]
pub trait BiasOracle: Send + Sync {
    fn name(&self) -> &str;
    async fn analyze(&self, section_text: &str) -> Result<Vec<Finding>>;
}
