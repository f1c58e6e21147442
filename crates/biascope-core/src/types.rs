use serde::{Deserialize, Serialize};

/// One reported instance of biased phrasing from one oracle invocation.
///
/// `phrase` is claimed to be a verbatim substring of the analyzed section;
/// that claim is checked at resolution time, never trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rationale: String,
    pub category: String,
    pub phrase: String,
    pub affected_party: String,
}

/// A finding whose phrase was located in the source document.
///
/// `id` is assigned monotonically at resolution time and is used only for
/// back-references from heatmap buckets, never for ordering logic.
/// `offset` is a character index into the analyzed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFinding {
    pub id: u64,
    pub offset: usize,
    pub finding: Finding,
}

/// A resolved finding attributed to the reviewer that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelFinding {
    pub id: u64,
    pub source: String,
    pub offset: usize,
    pub finding: Finding,
}

/// Aggregated record of one (phrase, offset) pair: how many times it was
/// independently reported, and by which resolved findings.
///
/// `phrase` keeps the first-seen casing; the heatmap key is the normalized
/// form. Serialized field names are a stable reporting contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseBucket {
    pub phrase: String,
    pub offset: usize,
    pub occurrence_count: u64,
    pub bias_instances: Vec<u64>,
}

/// An instruction to remove one span of text and insert replacement text at
/// that location. The removed span is resolved against the original document
/// as the first occurrence of `text_removed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub rationale: String,
    pub text_removed: String,
    pub text_added: String,
}

/// A named slice of a document, produced by the segmenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub body: String,
}
