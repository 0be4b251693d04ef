//! Verification of emitted output against the expanded source.
//!
//! Three independent checks: completeness (every line accounted for
//! exactly once), structural integrity (tag pairs stay within one target
//! file), and line budget. A failure in one never blocks computing the
//! others, and findings are reported, not auto-corrected.

use crate::classifier::{TagEvent, TagScanner};
use crate::config::CompilerConfig;
use crate::emitter::TargetFile;
use crate::resolver::ExpandedDocument;
use crate::schema::{
    LineRef, SectionRange, TagRef, VerificationReport, REPORT_SCHEMA_VERSION,
};
use crate::util::truncate_string;

const EXCERPT_MAX_BYTES: usize = 120;

/// Line-count drift check. `expected` is the expanded count minus the
/// intentionally stripped infrastructure lines.
pub fn budget_within(expected: usize, actual: usize, tolerance: f64) -> bool {
    if expected == 0 {
        return actual == 0;
    }
    let drift = (actual as f64 - expected as f64).abs() / expected as f64;
    drift <= tolerance
}

/// Compare the expanded document against the emitted targets and the
/// recorded stripped ranges.
pub fn verify(
    document: &str,
    doc: &ExpandedDocument,
    ranges: &[SectionRange],
    targets: &[TargetFile],
    config: &CompilerConfig,
    mut warnings: Vec<String>,
) -> VerificationReport {
    let total = doc.line_count();

    // Ownership map: which targets claim each expanded line.
    let mut owners: Vec<Vec<usize>> = vec![Vec::new(); total];
    for (target_index, target) in targets.iter().enumerate() {
        for range in &target.ranges {
            for owner in owners
                .iter_mut()
                .take(range.end.min(total))
                .skip(range.start)
            {
                owner.push(target_index);
            }
        }
    }
    let mut stripped = vec![false; total];
    for range in ranges {
        if range.label.is_infrastructure() {
            for flag in stripped
                .iter_mut()
                .take(range.end.min(total))
                .skip(range.start)
            {
                *flag = true;
            }
        }
    }
    let stripped_line_count = stripped.iter().filter(|flag| **flag).count();

    let line_ref = |line: usize| LineRef {
        line: line + 1,
        origin: doc.line_map[line].clone(),
        excerpt: truncate_string(&doc.lines[line], EXCERPT_MAX_BYTES),
    };
    let mut missing_lines = Vec::new();
    let mut duplicated_lines = Vec::new();
    for line in 0..total {
        if owners[line].is_empty() && !stripped[line] {
            missing_lines.push(line_ref(line));
        }
        if owners[line].len() >= 2 {
            duplicated_lines.push(line_ref(line));
        }
    }
    let completeness_ok = missing_lines.is_empty() && duplicated_lines.is_empty();

    let owner_name = |line: usize| -> Option<String> {
        owners[line]
            .first()
            .map(|index| targets[*index].rel_path.clone())
    };
    let scanner = TagScanner::new();
    let mut open_tags: Vec<(String, usize)> = Vec::new();
    let mut pairs: Vec<(String, usize, usize)> = Vec::new();
    let mut broken_tags = Vec::new();
    for (line, text) in doc.lines.iter().enumerate() {
        for event in scanner.events(text) {
            match event {
                TagEvent::Open(name) => open_tags.push((name, line)),
                TagEvent::Close(name) => {
                    match open_tags.iter().rposition(|(open, _)| open == &name) {
                        Some(position) => {
                            let (_, open_line) = open_tags.remove(position);
                            pairs.push((name, open_line, line));
                        }
                        None => broken_tags.push(TagRef {
                            name,
                            open_line: line + 1,
                            close_line: Some(line + 1),
                            open_target: None,
                            close_target: owner_name(line),
                            reason: "close tag without matching open".to_string(),
                        }),
                    }
                }
            }
        }
    }
    for (name, open_line) in open_tags {
        broken_tags.push(TagRef {
            name,
            open_line: open_line + 1,
            close_line: None,
            open_target: owner_name(open_line),
            close_target: None,
            reason: "no matching close tag".to_string(),
        });
    }
    for (name, open_line, close_line) in pairs {
        let open_target = owner_name(open_line);
        let close_target = owner_name(close_line);
        if open_target != close_target {
            broken_tags.push(TagRef {
                name,
                open_line: open_line + 1,
                close_line: Some(close_line + 1),
                open_target,
                close_target,
                reason: "tag split across target files".to_string(),
            });
        }
    }
    let structural_ok = broken_tags.is_empty();

    let expected_line_count = total - stripped_line_count;
    let actual_line_count = targets.iter().map(|target| target.lines.len()).sum();
    let budget_ok = budget_within(
        expected_line_count,
        actual_line_count,
        config.budget_tolerance,
    );
    if !budget_ok {
        warnings.push(format!(
            "line budget exceeded: expected {expected_line_count} (+/- {:.0}%), emitted {actual_line_count}",
            config.budget_tolerance * 100.0
        ));
    }

    let unclassified: usize = ranges
        .iter()
        .filter(|range| range.label == crate::schema::SectionLabel::Unclassified)
        .map(|range| range.len())
        .sum();
    if unclassified > 0 {
        warnings.push(format!(
            "{unclassified} unclassified lines routed to {} for review",
            config.unclassified_target
        ));
    }

    VerificationReport {
        schema_version: REPORT_SCHEMA_VERSION,
        document: document.to_string(),
        completeness_ok,
        structural_ok,
        budget_ok,
        missing_lines,
        duplicated_lines,
        broken_tags,
        expected_line_count,
        actual_line_count,
        stripped_line_count,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::config::default_config;
    use crate::emitter::emit;
    use crate::schema::{LineOrigin, SectionLabel};

    fn expanded(text: &str) -> ExpandedDocument {
        let lines: Vec<String> = text.lines().map(|line| line.to_string()).collect();
        let line_map = (1..=lines.len())
            .map(|line| LineOrigin::Source { line })
            .collect();
        let source_line_count = lines.len();
        ExpandedDocument {
            lines,
            line_map,
            source_line_count,
        }
    }

    fn compile(text: &str) -> (ExpandedDocument, Vec<SectionRange>, Vec<TargetFile>) {
        let config = default_config();
        let doc = expanded(text);
        let ranges = classify(&doc, &config).expect("classify");
        let targets = emit(&doc, &ranges, &config);
        (doc, ranges, targets)
    }

    #[test]
    fn clean_compile_passes_all_checks() {
        let (doc, ranges, targets) = compile(
            "---\nname: x\ndescription: d\n---\n# Role\nintro prose\n## Workflow\nstep one\n",
        );
        let report = verify("agent.md", &doc, &ranges, &targets, &default_config(), Vec::new());
        assert!(report.completeness_ok, "report: {report:?}");
        assert!(report.structural_ok);
        assert!(report.budget_ok);
        assert!(report.passed());
        assert_eq!(report.stripped_line_count, 4);
        assert_eq!(report.expected_line_count, 4);
        assert_eq!(report.actual_line_count, 4);
    }

    #[test]
    fn dropped_target_lines_are_reported_missing_with_provenance() {
        let (doc, ranges, mut targets) = compile(
            "---\nname: x\ndescription: d\n---\n# Role\nintro prose\n## Workflow\nstep one\n",
        );
        targets.retain(|target| target.rel_path != "workflow.md");
        let report = verify("agent.md", &doc, &ranges, &targets, &default_config(), Vec::new());
        assert!(!report.completeness_ok);
        assert_eq!(report.missing_lines.len(), 2);
        assert_eq!(report.missing_lines[0].line, 7);
        assert_eq!(
            report.missing_lines[0].origin,
            LineOrigin::Source { line: 7 }
        );
        // Independent checks still computed.
        assert!(report.structural_ok);
    }

    #[test]
    fn doubly_assigned_lines_are_reported_duplicated() {
        let (doc, ranges, mut targets) = compile(
            "---\nname: x\ndescription: d\n---\n# Role\nintro prose\n## Workflow\nstep one\n",
        );
        let duplicate = targets
            .iter()
            .find(|target| target.rel_path == "workflow.md")
            .cloned()
            .expect("workflow target");
        targets.push(TargetFile {
            rel_path: "copy.md".to_string(),
            ..duplicate
        });
        let report = verify("agent.md", &doc, &ranges, &targets, &default_config(), Vec::new());
        assert!(!report.completeness_ok);
        assert_eq!(report.duplicated_lines.len(), 2);
    }

    #[test]
    fn tag_split_across_targets_is_broken() {
        let doc = expanded("## Workflow\n<steps>\ndo it\n</steps>\n");
        let ranges = vec![SectionRange {
            label: SectionLabel::Workflow,
            start: 0,
            end: 4,
        }];
        // Force a split: open tag in one file, close in another.
        let targets = vec![
            TargetFile {
                rel_path: "workflow.md".to_string(),
                lines: doc.lines[0..3].to_vec(),
                ranges: vec![SectionRange {
                    label: SectionLabel::Workflow,
                    start: 0,
                    end: 3,
                }],
            },
            TargetFile {
                rel_path: "examples.md".to_string(),
                lines: doc.lines[3..4].to_vec(),
                ranges: vec![SectionRange {
                    label: SectionLabel::Workflow,
                    start: 3,
                    end: 4,
                }],
            },
        ];
        let report = verify("agent.md", &doc, &ranges, &targets, &default_config(), Vec::new());
        assert!(!report.structural_ok);
        assert_eq!(report.broken_tags.len(), 1);
        let broken = &report.broken_tags[0];
        assert_eq!(broken.name, "steps");
        assert_eq!(broken.open_target.as_deref(), Some("workflow.md"));
        assert_eq!(broken.close_target.as_deref(), Some("examples.md"));
        assert_eq!(broken.reason, "tag split across target files");
        // Completeness is unaffected by the structural failure.
        assert!(report.completeness_ok);
    }

    #[test]
    fn unclosed_tag_is_broken() {
        let (doc, ranges, targets) =
            compile("## Workflow\n<steps>\nnever closed\n");
        let report = verify("agent.md", &doc, &ranges, &targets, &default_config(), Vec::new());
        assert!(!report.structural_ok);
        assert_eq!(report.broken_tags.len(), 1);
        assert_eq!(report.broken_tags[0].reason, "no matching close tag");
        assert_eq!(report.broken_tags[0].close_line, None);
    }

    #[test]
    fn budget_tolerance_accepts_drift_within_bound() {
        // 500 source lines, 100 stripped: 405 emitted is within 15%.
        assert!(budget_within(400, 405, 0.15));
        // 300 emitted is a 25% shortfall and fails.
        assert!(!budget_within(400, 300, 0.15));
        assert!(budget_within(0, 0, 0.15));
        assert!(!budget_within(0, 3, 0.15));
    }

    #[test]
    fn unclassified_ranges_surface_a_warning() {
        let (doc, ranges, targets) = compile("loose prose with no heading\n");
        let report = verify("agent.md", &doc, &ranges, &targets, &default_config(), Vec::new());
        assert!(report.passed());
        assert!(report
            .warnings
            .iter()
            .any(|warning| warning.contains("unclassified")));
    }
}
