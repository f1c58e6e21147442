//! Header-delimited document segmentation.
//!
//! Splits text into paragraph-like blocks on blank-line boundaries. A block
//! starting with `#` names the current section and contributes no body; other
//! blocks accumulate under the current name, joined by blank lines. Content
//! before the first header lands under a default name.

use crate::types::Section;

const DEFAULT_SECTION: &str = "Introduction";

/// Split `text` into ordered named sections.
///
/// Only sections with at least one body block are emitted. A repeated header
/// name replaces the earlier section's body in place (last write wins); the
/// section keeps the position of its first appearance. Empty input yields an
/// empty list.
pub fn segment(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current = DEFAULT_SECTION.to_string();
    let mut blocks: Vec<&str> = Vec::new();

    for raw in text.split("\n\n") {
        let block = raw.trim();
        if block.is_empty() {
            continue;
        }
        if block.starts_with('#') {
            store(&mut sections, &current, &blocks);
            blocks.clear();
            current = block.trim_start_matches('#').trim().to_string();
        } else {
            blocks.push(block);
        }
    }
    store(&mut sections, &current, &blocks);
    sections
}

fn store(sections: &mut Vec<Section>, name: &str, blocks: &[&str]) {
    if blocks.is_empty() {
        return;
    }
    let body = blocks.join("\n\n");
    if let Some(existing) = sections.iter_mut().find(|s| s.name == name) {
        existing.body = body;
    } else {
        sections.push(Section {
            name: name.to_string(),
            body,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn segment_splits_on_headers() {
        let text = "intro text\n\n# History\n\nearly years\n\nlater years\n\n## Geography\n\nrivers";
        let sections = segment(text);
        assert_eq!(names(&sections), vec!["Introduction", "History", "Geography"]);
        assert_eq!(sections[0].body, "intro text");
        assert_eq!(sections[1].body, "early years\n\nlater years");
        assert_eq!(sections[2].body, "rivers");
    }

    #[test]
    fn segment_without_headers_yields_single_default_section() {
        let sections = segment("just one paragraph\n\nand another");
        assert_eq!(names(&sections), vec!["Introduction"]);
        assert_eq!(sections[0].body, "just one paragraph\n\nand another");
    }

    #[test]
    fn segment_empty_input_yields_no_sections() {
        assert!(segment("").is_empty());
        assert!(segment("\n\n\n\n").is_empty());
    }

    #[test]
    fn segment_drops_bodyless_sections() {
        // Header immediately followed by another header, and a trailing header
        // at end of input: neither appears in the output.
        let text = "# Empty\n\n# Filled\n\nbody here\n\n# Trailing";
        let sections = segment(text);
        assert_eq!(names(&sections), vec!["Filled"]);
    }

    #[test]
    fn segment_duplicate_header_is_last_write_wins() {
        let text = "# Notes\n\nfirst body\n\n# Other\n\nmiddle\n\n# Notes\n\nsecond body";
        let sections = segment(text);
        // Position of first appearance is kept; body comes from the later one.
        assert_eq!(names(&sections), vec!["Notes", "Other"]);
        assert_eq!(sections[0].body, "second body");
    }

    #[test]
    fn segment_strips_header_markers_and_whitespace() {
        let text = "###   Deeply nested   \n\nbody";
        let sections = segment(text);
        assert_eq!(sections[0].name, "Deeply nested");
    }

    proptest! {
        // Every non-header block in the input ends up in exactly one body.
        #[test]
        fn segment_conserves_body_blocks(
            blocks in prop::collection::vec("[a-z]{1,8}( [a-z]{1,8}){0,3}", 0..12),
            header_mask in prop::collection::vec(any::<bool>(), 0..12),
        ) {
            let rendered: Vec<String> = blocks
                .iter()
                .zip(header_mask.iter().chain(std::iter::repeat(&false)))
                .enumerate()
                .map(|(i, (b, is_header))| {
                    if *is_header {
                        format!("# H{i} {b}")
                    } else {
                        b.clone()
                    }
                })
                .collect();
            let text = rendered.join("\n\n");
            let sections = segment(&text);

            let body_blocks_out: usize = sections
                .iter()
                .map(|s| s.body.split("\n\n").count())
                .sum();
            let non_header_blocks_in =
                rendered.iter().filter(|b| !b.starts_with('#')).count();
            // Header names here are unique (indexed), so no body is overwritten.
            prop_assert_eq!(body_blocks_out, non_header_blocks_in);
        }
    }
}
