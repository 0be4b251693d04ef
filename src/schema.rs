//! Schema types for sections, provenance, descriptors, and reports.

use serde::{Deserialize, Serialize};

pub const REPORT_SCHEMA_VERSION: u32 = 1;
pub const DESCRIPTOR_SCHEMA_VERSION: u32 = 1;

/// Closed set of section labels a classified range can carry.
///
/// Infrastructure labels drive the compiler itself and are stripped from
/// emitted output; content labels map to target files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SectionLabel {
    Frontmatter,
    IncludeResidue,
    PreloadedManifest,
    Intro,
    Workflow,
    DomainPattern,
    Examples,
    CriticalReminders,
    ClosingBoilerplate,
    Unclassified,
}

impl SectionLabel {
    /// Labels excluded from every target file but still recorded as
    /// intentionally stripped in the coverage accounting.
    pub fn is_infrastructure(self) -> bool {
        matches!(
            self,
            SectionLabel::Frontmatter
                | SectionLabel::IncludeResidue
                | SectionLabel::PreloadedManifest
                | SectionLabel::ClosingBoilerplate
        )
    }
}

/// Provenance of one line in an expanded document. Line numbers are 1-based
/// and local to the origin file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "from")]
pub enum LineOrigin {
    Source { line: usize },
    Fragment { path: String, line: usize },
}

/// A contiguous half-open span `[start, end)` of expanded-document lines
/// carrying exactly one label. Ranges are non-overlapping and jointly cover
/// the whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRange {
    pub label: SectionLabel,
    pub start: usize,
    pub end: usize,
}

impl SectionRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reference to one expanded-document line in a verification finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRef {
    /// 1-based line number in the expanded document.
    pub line: usize,
    pub origin: LineOrigin,
    pub excerpt: String,
}

/// Reference to a tag pair that failed the structural check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub name: String,
    /// 1-based expanded-document line of the opening tag.
    pub open_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_target: Option<String>,
    pub reason: String,
}

/// Outcome of the completeness, structural, and budget checks for one
/// compiled document. Produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub schema_version: u32,
    pub document: String,
    pub completeness_ok: bool,
    pub structural_ok: bool,
    pub budget_ok: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_lines: Vec<LineRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicated_lines: Vec<LineRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub broken_tags: Vec<TagRef>,
    pub expected_line_count: usize,
    pub actual_line_count: usize,
    pub stripped_line_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.completeness_ok && self.structural_ok && self.budget_ok
    }
}

/// Reference to a skill by identifier; dynamic skills are resolved to
/// content at run time by an external loader, never by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRef {
    pub id: String,
    pub path: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub precompiled: Vec<SkillRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic: Vec<SkillRef>,
}

/// Normalized agent configuration derived from frontmatter and classified
/// metadata. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfigDescriptor {
    pub schema_version: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_prompts_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_prompts_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format_ref: Option<String>,
    #[serde(default)]
    pub skills: SkillSet,
}

/// Per-document outcome line in a batch summary.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub document: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<VerificationReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    Failed,
}

/// Machine-readable batch result for `--json` output.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
    pub documents: Vec<DocumentOutcome>,
}
