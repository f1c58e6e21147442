//! Multi-sample collection and phrase-level heatmap aggregation.
//!
//! The oracle is sampled `sample_count` times against one section of text.
//! Findings whose phrase cannot be located verbatim are dropped. The rest get
//! a monotonically increasing id and are folded into buckets keyed by the
//! normalized phrase; a finding joins an existing bucket only when its
//! resolved offset matches the bucket's, so the same words reported at two
//! different positions stay distinct.

use std::collections::BTreeMap;

use crate::locate::locate;
use crate::types::{PhraseBucket, ResolvedFinding};
use crate::BiasOracle;

/// Normalized phrase to its buckets at distinct offsets.
///
/// Usually one bucket per key; more when the oracle reports the same phrase
/// text (up to case/whitespace) at different locations.
pub type Heatmap = BTreeMap<String, Vec<PhraseBucket>>;

/// Heatmap key: case-folded, whitespace-trimmed phrase text.
pub fn normalized_phrase(phrase: &str) -> String {
    phrase.trim().to_lowercase()
}

/// Join-or-create: the single mutual-exclusion boundary for bucket updates.
///
/// First writer fixes the bucket's canonical phrase text and offset; later
/// contributors only bump the count and append their id.
pub(crate) fn record_in_heatmap(heatmap: &mut Heatmap, raw_phrase: &str, offset: usize, id: u64) {
    let buckets = heatmap.entry(normalized_phrase(raw_phrase)).or_default();
    if let Some(bucket) = buckets.iter_mut().find(|b| b.offset == offset) {
        bucket.occurrence_count += 1;
        bucket.bias_instances.push(id);
    } else {
        buckets.push(PhraseBucket {
            phrase: raw_phrase.to_string(),
            offset,
            occurrence_count: 1,
            bias_instances: vec![id],
        });
    }
}

/// Output of one aggregation run.
///
/// `samples_ok` / `samples_failed` let callers distinguish "nothing biased
/// was detected" from "every oracle call failed".
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AggregateReport {
    pub findings: Vec<ResolvedFinding>,
    pub heatmap: Heatmap,
    pub samples_ok: u32,
    pub samples_failed: u32,
}

impl AggregateReport {
    /// Total occurrences across all buckets; equals the resolved-finding count.
    pub fn total_occurrences(&self) -> u64 {
        self.heatmap
            .values()
            .flatten()
            .map(|b| b.occurrence_count)
            .sum()
    }
}

/// Sample `oracle` `sample_count` times against `document` and aggregate.
///
/// A failed sample loses only its own findings. No retry here; the caller
/// owns retry policy. State is append-only, so a partial run (fewer samples
/// than requested) is always a consistent aggregate.
pub async fn aggregate(
    document: &str,
    sample_count: u32,
    oracle: &dyn BiasOracle,
) -> AggregateReport {
    let mut findings: Vec<ResolvedFinding> = Vec::new();
    let mut heatmap = Heatmap::new();
    let mut next_id: u64 = 0;
    let mut samples_ok = 0u32;
    let mut samples_failed = 0u32;

    for _ in 0..sample_count {
        let sampled = match oracle.analyze(document).await {
            Ok(list) => {
                samples_ok += 1;
                list
            }
            Err(_) => {
                samples_failed += 1;
                continue;
            }
        };
        for finding in sampled {
            let Some(offset) = locate(document, &finding.phrase) else {
                // Misquoted phrase: dropped, never fabricated.
                continue;
            };
            let id = next_id;
            next_id += 1;
            record_in_heatmap(&mut heatmap, &finding.phrase, offset, id);
            findings.push(ResolvedFinding {
                id,
                offset,
                finding,
            });
        }
    }

    AggregateReport {
        findings,
        heatmap,
        samples_ok,
        samples_failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Finding;
    use crate::{Error, Result};
    use std::sync::Mutex;

    /// Oracle that replays a scripted sequence of responses.
    struct ScriptedOracle {
        script: Mutex<Vec<Result<Vec<Finding>>>>,
    }

    impl ScriptedOracle {
        fn new(mut script: Vec<Result<Vec<Finding>>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait::async_trait]
    impl BiasOracle for ScriptedOracle {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn analyze(&self, _section_text: &str) -> Result<Vec<Finding>> {
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Error::Oracle("script exhausted".to_string())))
        }
    }

    fn finding(phrase: &str) -> Finding {
        Finding {
            rationale: "loaded wording".to_string(),
            category: "framing".to_string(),
            phrase: phrase.to_string(),
            affected_party: "residents".to_string(),
        }
    }

    #[tokio::test]
    async fn single_sample_yields_count_one_buckets() {
        let doc = "The devastating storm hit the coastal town.";
        let oracle = ScriptedOracle::new(vec![Ok(vec![finding("devastating"), finding("hit")])]);
        let report = aggregate(doc, 1, &oracle).await;

        assert_eq!(report.samples_ok, 1);
        assert_eq!(report.samples_failed, 0);
        assert_eq!(report.findings.len(), 2);
        for buckets in report.heatmap.values() {
            for b in buckets {
                assert_eq!(b.occurrence_count, 1);
                assert_eq!(b.bias_instances.len(), 1);
            }
        }
    }

    #[tokio::test]
    async fn identical_samples_collapse_into_one_bucket() {
        let doc = "The devastating storm hit the coastal town.";
        let n = 7;
        let oracle =
            ScriptedOracle::new((0..n).map(|_| Ok(vec![finding("devastating")])).collect());
        let report = aggregate(doc, n as u32, &oracle).await;

        assert_eq!(report.samples_ok, n as u32);
        let buckets = &report.heatmap[&normalized_phrase("devastating")];
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].occurrence_count, n as u64);
        assert_eq!(buckets[0].phrase, "devastating");
        // Ids are strictly increasing and each appears in exactly one bucket.
        let ids = &buckets[0].bias_instances;
        assert_eq!(ids.len(), n);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn absent_phrases_are_dropped_entirely() {
        let doc = "plain text without the claimed words";
        let oracle = ScriptedOracle::new(vec![Ok(vec![
            finding("not actually present"),
            finding("plain text"),
        ])]);
        let report = aggregate(doc, 1, &oracle).await;

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].finding.phrase, "plain text");
        assert_eq!(report.heatmap.len(), 1);
    }

    #[tokio::test]
    async fn failed_samples_are_counted_not_retried() {
        let doc = "The devastating storm.";
        let oracle = ScriptedOracle::new(vec![
            Ok(vec![finding("devastating")]),
            Err(Error::Oracle("timeout".to_string())),
            Ok(vec![finding("devastating")]),
        ]);
        let report = aggregate(doc, 3, &oracle).await;

        assert_eq!(report.samples_ok, 2);
        assert_eq!(report.samples_failed, 1);
        let buckets = &report.heatmap[&normalized_phrase("devastating")];
        assert_eq!(buckets[0].occurrence_count, 2);
    }

    #[tokio::test]
    async fn all_samples_failed_is_distinguishable_from_no_findings() {
        let doc = "some text";
        let failing = ScriptedOracle::new(vec![
            Err(Error::Oracle("down".to_string())),
            Err(Error::Oracle("down".to_string())),
        ]);
        let silent = ScriptedOracle::new(vec![Ok(vec![]), Ok(vec![])]);

        let failed = aggregate(doc, 2, &failing).await;
        let empty = aggregate(doc, 2, &silent).await;

        assert!(failed.findings.is_empty() && empty.findings.is_empty());
        assert_eq!(failed.samples_ok, 0);
        assert_eq!(failed.samples_failed, 2);
        assert_eq!(empty.samples_ok, 2);
        assert_eq!(empty.samples_failed, 0);
    }

    #[tokio::test]
    async fn same_normalized_phrase_at_different_offsets_splits_buckets() {
        // "Tragic" appears twice; differing case makes the oracle's two
        // quotes resolve to different first occurrences under one key.
        let doc = "Tragic events followed the tragic decision.";
        let oracle = ScriptedOracle::new(vec![Ok(vec![finding("Tragic"), finding("tragic")])]);
        let report = aggregate(doc, 1, &oracle).await;

        let buckets = &report.heatmap[&normalized_phrase("tragic")];
        assert_eq!(buckets.len(), 2);
        let offsets: Vec<usize> = buckets.iter().map(|b| b.offset).collect();
        assert!(offsets.contains(&0));
        assert!(offsets.contains(&27));
        // Every contributing id appears in exactly one bucket.
        let mut all_ids: Vec<u64> = buckets.iter().flat_map(|b| b.bias_instances.clone()).collect();
        all_ids.sort_unstable();
        all_ids.dedup();
        assert_eq!(all_ids.len(), report.findings.len());
    }

    #[tokio::test]
    async fn occurrence_counts_match_contribution_lists() {
        let doc = "alpha beta gamma alpha";
        let oracle = ScriptedOracle::new(vec![
            Ok(vec![finding("alpha"), finding("beta")]),
            Ok(vec![finding("alpha")]),
            Ok(vec![finding("gamma"), finding("beta")]),
        ]);
        let report = aggregate(doc, 3, &oracle).await;

        for buckets in report.heatmap.values() {
            for b in buckets {
                assert_eq!(b.occurrence_count as usize, b.bias_instances.len());
            }
        }
        assert_eq!(report.total_occurrences() as usize, report.findings.len());
    }
}
