//! Target-file emission from classified ranges.
//!
//! The label-to-file map is caller-supplied configuration. Ranges append
//! to their target in source order; the emitter never reorders, rewrites,
//! or separates content lines.

use crate::config::CompilerConfig;
use crate::resolver::ExpandedDocument;
use crate::schema::{SectionLabel, SectionRange};

/// One named output file with the ranges assigned to it, in source order.
#[derive(Debug, Clone)]
pub struct TargetFile {
    pub rel_path: String,
    pub lines: Vec<String>,
    pub ranges: Vec<SectionRange>,
}

/// Map classified ranges onto target files per the configured table.
/// Infrastructure ranges are never emitted; unclassified ranges land in
/// the best-effort catch file.
pub fn emit(
    doc: &ExpandedDocument,
    ranges: &[SectionRange],
    config: &CompilerConfig,
) -> Vec<TargetFile> {
    let mut files: Vec<TargetFile> = Vec::new();
    for range in ranges {
        if range.label.is_infrastructure() {
            continue;
        }
        let rel_path = if range.label == SectionLabel::Unclassified {
            config.unclassified_target.clone()
        } else {
            match config.target_map.get(&range.label) {
                Some(path) => path.clone(),
                None => {
                    // Unmapped content labels are not silently dropped:
                    // the verifier reports their lines as missing.
                    tracing::warn!(label = ?range.label, "no target mapped for label");
                    continue;
                }
            }
        };
        let position = match files.iter().position(|file| file.rel_path == rel_path) {
            Some(position) => position,
            None => {
                files.push(TargetFile {
                    rel_path,
                    lines: Vec::new(),
                    ranges: Vec::new(),
                });
                files.len() - 1
            }
        };
        let file = &mut files[position];
        file.lines
            .extend(doc.lines[range.start..range.end].iter().cloned());
        file.ranges.push(*range);
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::schema::LineOrigin;

    fn expanded(lines: &[&str]) -> ExpandedDocument {
        ExpandedDocument {
            lines: lines.iter().map(|line| line.to_string()).collect(),
            line_map: (1..=lines.len())
                .map(|line| LineOrigin::Source { line })
                .collect(),
            source_line_count: lines.len(),
        }
    }

    fn range(label: SectionLabel, start: usize, end: usize) -> SectionRange {
        SectionRange { label, start, end }
    }

    #[test]
    fn domain_patterns_and_examples_share_a_file_in_source_order() {
        let doc = expanded(&["pattern a", "example b", "pattern c"]);
        let ranges = vec![
            range(SectionLabel::DomainPattern, 0, 1),
            range(SectionLabel::Examples, 1, 2),
            range(SectionLabel::DomainPattern, 2, 3),
        ];
        let files = emit(&doc, &ranges, &default_config());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "examples.md");
        assert_eq!(files[0].lines, vec!["pattern a", "example b", "pattern c"]);
        assert_eq!(files[0].ranges.len(), 3);
    }

    #[test]
    fn infrastructure_ranges_are_never_emitted() {
        let doc = expanded(&["---", "name: x", "---", "# Role", "body"]);
        let ranges = vec![
            range(SectionLabel::Frontmatter, 0, 3),
            range(SectionLabel::Intro, 3, 5),
        ];
        let files = emit(&doc, &ranges, &default_config());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "intro.md");
        assert_eq!(files[0].lines, vec!["# Role", "body"]);
    }

    #[test]
    fn unclassified_lines_land_in_the_catch_file() {
        let doc = expanded(&["loose prose"]);
        let ranges = vec![range(SectionLabel::Unclassified, 0, 1)];
        let files = emit(&doc, &ranges, &default_config());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "unclassified.md");
        assert_eq!(files[0].lines, vec!["loose prose"]);
    }

    #[test]
    fn unmapped_label_is_skipped_for_the_verifier_to_flag() {
        let mut config = default_config();
        config.target_map.remove(&SectionLabel::CriticalReminders);
        let doc = expanded(&["never do X"]);
        let ranges = vec![range(SectionLabel::CriticalReminders, 0, 1)];
        let files = emit(&doc, &ranges, &config);
        assert!(files.is_empty());
    }
}
