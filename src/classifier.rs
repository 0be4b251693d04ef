//! Section classification over an expanded document.
//!
//! A single forward pass applies an ordered, data-driven rule table:
//! frontmatter, directive-residue check, preloaded-content manifest,
//! tag atomicity, keyword headings, closing sentinel, unclassified
//! fallback. Each rule consumes lines and advances the cursor; no two
//! rules may claim the same line, and a final partition check enforces
//! exhaustive, non-overlapping coverage.

use crate::config::{CompilerConfig, KeywordRule};
use crate::errors::CompileError;
use crate::resolver::{directive_path, ExpandedDocument};
use crate::schema::{SectionLabel, SectionRange};
use regex::Regex;

/// Scanner for XML-like tag tokens (`<tag>`, `</tag>`; self-closing
/// tokens are ignored).
pub struct TagScanner {
    token: Regex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEvent {
    Open(String),
    Close(String),
}

impl TagScanner {
    pub fn new() -> Self {
        Self {
            token: Regex::new(r"</?([A-Za-z][A-Za-z0-9_:-]*)(?:\s[^<>]*)?/?>")
                .expect("regex for tag tokens"),
        }
    }

    pub fn events(&self, line: &str) -> Vec<TagEvent> {
        let mut events = Vec::new();
        for capture in self.token.captures_iter(line) {
            let token = capture.get(0).map(|m| m.as_str()).unwrap_or_default();
            let name = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            if name.is_empty() || token.ends_with("/>") {
                continue;
            }
            if token.starts_with("</") {
                events.push(TagEvent::Close(name.to_string()));
            } else {
                events.push(TagEvent::Open(name.to_string()));
            }
        }
        events
    }
}

impl Default for TagScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Markdown ATX heading text, if the line is a heading.
pub fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let stripped = trimmed.trim_start_matches('#');
    if stripped.is_empty() || stripped.starts_with(' ') {
        Some(stripped.trim())
    } else {
        None
    }
}

fn contains_any(line: &str, phrases: &[String]) -> bool {
    let lowered = line.to_lowercase();
    phrases
        .iter()
        .any(|phrase| lowered.contains(&phrase.to_lowercase()))
}

fn keyword_label(heading: &str, rules: &[KeywordRule]) -> Option<SectionLabel> {
    let lowered = heading.to_lowercase();
    for rule in rules {
        if rule
            .keywords
            .iter()
            .any(|keyword| lowered.contains(&keyword.to_lowercase()))
        {
            return Some(rule.label);
        }
    }
    None
}

fn close_open(
    ranges: &mut Vec<SectionRange>,
    open: &mut Option<(SectionLabel, usize)>,
    end: usize,
) {
    if let Some((label, start)) = open.take() {
        if end > start {
            ranges.push(SectionRange { label, start, end });
        }
    }
}

fn apply_tag_events(scanner: &TagScanner, line: &str, stack: &mut Vec<String>) {
    for event in scanner.events(line) {
        match event {
            TagEvent::Open(name) => stack.push(name),
            TagEvent::Close(name) => {
                if let Some(position) = stack.iter().rposition(|entry| entry == &name) {
                    stack.remove(position);
                }
            }
        }
    }
}

/// Partition the expanded document into labeled, contiguous ranges.
pub fn classify(
    doc: &ExpandedDocument,
    config: &CompilerConfig,
) -> Result<Vec<SectionRange>, CompileError> {
    let lines = &doc.lines;
    let total = lines.len();
    let scanner = TagScanner::new();
    let mut ranges: Vec<SectionRange> = Vec::new();
    let mut open: Option<(SectionLabel, usize)> = None;
    let mut tag_stack: Vec<String> = Vec::new();
    let mut saw_heading = false;
    let mut index = 0;

    // Rule 1: a leading `---` pair is frontmatter, valid only at the
    // document start.
    if total > 0 && lines[0].trim() == "---" {
        let close = lines
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, line)| line.trim() == "---")
            .map(|(position, _)| position);
        let Some(close) = close else {
            return Err(CompileError::ConfigValidation(
                "unterminated frontmatter (expected closing '---')".to_string(),
            ));
        };
        ranges.push(SectionRange {
            label: SectionLabel::Frontmatter,
            start: 0,
            end: close + 1,
        });
        index = close + 1;
    }

    while index < total {
        let line = &lines[index];

        // Rule 2: expansion must have removed every directive; a survivor
        // is a resolver bug, checked on every line including tag blocks.
        if directive_path(line).is_some() {
            return Err(CompileError::IncludeResidue {
                line: index + 1,
                directive: line.trim().to_string(),
            });
        }

        // Rule 4: while a tag is open the current range cannot close,
        // heading-like lines included.
        if !tag_stack.is_empty() {
            apply_tag_events(&scanner, line, &mut tag_stack);
            index += 1;
            continue;
        }

        // Rule 6: the closing sentinel and everything after it is
        // boilerplate, stripped but recorded.
        if contains_any(line, &config.closing_sentinels) {
            for (offset, tail) in lines[index..].iter().enumerate() {
                if directive_path(tail).is_some() {
                    return Err(CompileError::IncludeResidue {
                        line: index + offset + 1,
                        directive: tail.trim().to_string(),
                    });
                }
            }
            close_open(&mut ranges, &mut open, index);
            ranges.push(SectionRange {
                label: SectionLabel::ClosingBoilerplate,
                start: index,
                end: total,
            });
            break;
        }

        // Rule 3: a preload marker opens a manifest range closing at the
        // next heading, or after the first blank delimiter line.
        if contains_any(line, &config.preload_markers) {
            close_open(&mut ranges, &mut open, index);
            let mut end = total;
            let mut scan = index + 1;
            while scan < total {
                let candidate = &lines[scan];
                if directive_path(candidate).is_some() {
                    return Err(CompileError::IncludeResidue {
                        line: scan + 1,
                        directive: candidate.trim().to_string(),
                    });
                }
                if heading_text(candidate).is_some() {
                    end = scan;
                    break;
                }
                if candidate.trim().is_empty() {
                    end = scan + 1;
                    break;
                }
                scan += 1;
            }
            ranges.push(SectionRange {
                label: SectionLabel::PreloadedManifest,
                start: index,
                end,
            });
            index = end;
            continue;
        }

        // Rule 5: keyword headings open labeled ranges; ties resolve to
        // the first matching rule in table order.
        if let Some(text) = heading_text(line) {
            if let Some(label) = keyword_label(text, &config.keyword_rules) {
                close_open(&mut ranges, &mut open, index);
                open = Some((label, index));
            } else if open.is_none() {
                // The first heading of the body is the role/title heading
                // and opens Intro; later orphan headings are unclassified.
                let label = if saw_heading {
                    SectionLabel::Unclassified
                } else {
                    SectionLabel::Intro
                };
                open = Some((label, index));
            }
            saw_heading = true;
            index += 1;
            continue;
        }

        apply_tag_events(&scanner, line, &mut tag_stack);
        if open.is_none() {
            if line.trim().is_empty() {
                // Blank separator between ranges attaches to the previous
                // range so coverage stays gap-free.
                if let Some(last) = ranges.last_mut() {
                    last.end = index + 1;
                    index += 1;
                    continue;
                }
            }
            // Rule 7: lines no other rule captures are kept, flagged.
            open = Some((SectionLabel::Unclassified, index));
        }
        index += 1;
    }
    close_open(&mut ranges, &mut open, total);

    check_partition(&ranges, total)?;
    Ok(ranges)
}

/// Re-validate that ranges jointly cover every line exactly once. A
/// violation indicates a rule-table bug, never a source defect.
fn check_partition(ranges: &[SectionRange], total: usize) -> Result<(), CompileError> {
    let mut expected = 0usize;
    let mut previous = SectionLabel::Unclassified;
    for range in ranges {
        if range.start != expected {
            let line = range.start.min(expected);
            return Err(CompileError::ClassificationConflict {
                line: line + 1,
                first: previous,
                second: range.label,
            });
        }
        expected = range.end;
        previous = range.label;
    }
    if expected != total {
        return Err(CompileError::ClassificationConflict {
            line: expected + 1,
            first: previous,
            second: SectionLabel::Unclassified,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::schema::LineOrigin;

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

    fn labels(ranges: &[SectionRange]) -> Vec<SectionLabel> {
        ranges.iter().map(|range| range.label).collect()
    }

    #[test]
    fn partitions_frontmatter_intro_and_workflow() {
        let doc = expanded(
            "---\nname: reviewer\ndescription: reviews\n---\n# Code Reviewer\nYou review code.\n## Workflow\n1. Read the diff\n",
        );
        let ranges = classify(&doc, &default_config()).expect("classify");
        assert_eq!(
            labels(&ranges),
            vec![
                SectionLabel::Frontmatter,
                SectionLabel::Intro,
                SectionLabel::Workflow
            ]
        );
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[0].end, 4);
        assert_eq!(ranges[1].start, 4);
        assert_eq!(ranges[1].end, 6);
        assert_eq!(ranges[2].start, 6);
        assert_eq!(ranges[2].end, 8);
    }

    #[test]
    fn unterminated_frontmatter_is_rejected() {
        let doc = expanded("---\nname: x\nno closing fence\n");
        assert!(matches!(
            classify(&doc, &default_config()),
            Err(CompileError::ConfigValidation(_))
        ));
    }

    #[test]
    fn surviving_directive_is_residue_error() {
        let doc = expanded("# Role\nbody\n@include(core/a.md)\n");
        match classify(&doc, &default_config()).expect_err("must fail") {
            CompileError::IncludeResidue { line, directive } => {
                assert_eq!(line, 3);
                assert_eq!(directive, "@include(core/a.md)");
            }
            other => panic!("expected IncludeResidue, got {other:?}"),
        }
    }

    #[test]
    fn preload_manifest_closes_at_next_heading() {
        let doc = expanded(
            "# Role\nThe following is already in your context:\n- core-principles\n- conventions\n## Workflow\nsteps\n",
        );
        let ranges = classify(&doc, &default_config()).expect("classify");
        assert_eq!(
            labels(&ranges),
            vec![
                SectionLabel::Intro,
                SectionLabel::PreloadedManifest,
                SectionLabel::Workflow
            ]
        );
        assert_eq!(ranges[1].start, 1);
        assert_eq!(ranges[1].end, 4);
    }

    #[test]
    fn preload_manifest_closes_after_blank_delimiter() {
        let doc = expanded(
            "preloaded_content follows:\n- core-principles\n\nplain prose afterwards\n",
        );
        let ranges = classify(&doc, &default_config()).expect("classify");
        assert_eq!(
            labels(&ranges),
            vec![SectionLabel::PreloadedManifest, SectionLabel::Unclassified]
        );
        // The blank delimiter stays inside the manifest range.
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[0].end, 3);
        assert_eq!(ranges[1].start, 3);
    }

    #[test]
    fn tag_block_is_atomic_across_matching_headings() {
        let doc = expanded(
            "## Workflow\n<workflow>\nstep one\n## Examples\nstill inside the tag\n</workflow>\nafter\n",
        );
        let ranges = classify(&doc, &default_config()).expect("classify");
        assert_eq!(labels(&ranges), vec![SectionLabel::Workflow]);
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[0].end, 7);
    }

    #[test]
    fn heading_ties_resolve_by_table_order() {
        // "Workflow Examples" matches both lists; Workflow is first.
        let doc = expanded("## Workflow Examples\ncontent\n");
        let ranges = classify(&doc, &default_config()).expect("classify");
        assert_eq!(labels(&ranges), vec![SectionLabel::Workflow]);
    }

    #[test]
    fn closing_sentinel_strips_the_tail() {
        let doc = expanded(
            "# Role\nbody\nNow display all 12 core principles.\ntrailing boilerplate\n",
        );
        let ranges = classify(&doc, &default_config()).expect("classify");
        assert_eq!(
            labels(&ranges),
            vec![SectionLabel::Intro, SectionLabel::ClosingBoilerplate]
        );
        assert_eq!(ranges[1].start, 2);
        assert_eq!(ranges[1].end, 4);
    }

    #[test]
    fn leading_prose_without_heading_is_unclassified() {
        let doc = expanded("loose prose with no heading\nmore prose\n");
        let ranges = classify(&doc, &default_config()).expect("classify");
        assert_eq!(labels(&ranges), vec![SectionLabel::Unclassified]);
    }

    #[test]
    fn every_line_is_covered_exactly_once() {
        let doc = expanded(
            "---\nname: x\ndescription: y\n---\n# Agent\nintro prose\n\n## Workflow\n<steps>\n## Examples\n</steps>\ndone\nPlease display all 7 core principles.\n",
        );
        let ranges = classify(&doc, &default_config()).expect("classify");
        let mut covered = vec![0usize; doc.line_count()];
        for range in &ranges {
            for slot in covered.iter_mut().take(range.end).skip(range.start) {
                *slot += 1;
            }
        }
        assert!(covered.iter().all(|count| *count == 1), "coverage: {covered:?}");
    }

    #[test]
    fn tag_scanner_ignores_self_closing_tokens() {
        let scanner = TagScanner::new();
        assert_eq!(
            scanner.events("<workflow> then </workflow> and <br/>"),
            vec![
                TagEvent::Open("workflow".to_string()),
                TagEvent::Close("workflow".to_string())
            ]
        );
        assert!(scanner.events("no tags here").is_empty());
    }
}
