//! Cross-reviewer merge.
//!
//! Same resolve/bucket discipline as sample aggregation, generalized from run
//! indices to arbitrary source tags: independent reviewers flagging the
//! identical span collapse into one bucket while keeping distinct
//! contribution ids, so reporting can answer "how many independent sources
//! flagged this exact span" without losing per-source traceability.

use crate::aggregate::{normalized_phrase, record_in_heatmap, Heatmap};
use crate::locate::locate;
use crate::types::{Finding, PanelFinding};

/// Consolidated output of a reviewer panel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PanelReport {
    pub findings: Vec<PanelFinding>,
    pub heatmap: Heatmap,
    /// Union of `affected_party` values across every reviewer's findings,
    /// deduplicated under case/whitespace-normalized equality; first-seen
    /// casing and order preserved.
    pub stakeholders: Vec<String>,
}

/// Merge per-reviewer finding lists against one document.
///
/// `panels` is an ordered (tag, findings) mapping; ids are assigned
/// monotonically across the whole merge in that order. Findings whose phrase
/// is absent from the document contribute no bucket, but their
/// `affected_party` still joins the stakeholder union.
pub fn merge_panel(document: &str, panels: &[(String, Vec<Finding>)]) -> PanelReport {
    let mut findings: Vec<PanelFinding> = Vec::new();
    let mut heatmap = Heatmap::new();
    let mut stakeholders: Vec<String> = Vec::new();
    let mut next_id: u64 = 0;

    for (source, list) in panels {
        for finding in list {
            let party = finding.affected_party.trim();
            if !party.is_empty()
                && !stakeholders
                    .iter()
                    .any(|s| normalized_phrase(s) == normalized_phrase(party))
            {
                stakeholders.push(party.to_string());
            }

            let Some(offset) = locate(document, &finding.phrase) else {
                continue;
            };
            let id = next_id;
            next_id += 1;
            record_in_heatmap(&mut heatmap, &finding.phrase, offset, id);
            findings.push(PanelFinding {
                id,
                source: source.clone(),
                offset,
                finding: finding.clone(),
            });
        }
    }

    PanelReport {
        findings,
        heatmap,
        stakeholders,
    }
}
