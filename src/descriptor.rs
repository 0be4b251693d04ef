//! Agent descriptor generation from frontmatter and classified metadata.

use crate::config::CompilerConfig;
use crate::errors::CompileError;
use crate::resolver::ExpandedDocument;
use crate::schema::{
    AgentConfigDescriptor, SectionLabel, SectionRange, SkillRef, SkillSet,
    DESCRIPTOR_SCHEMA_VERSION,
};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct RawFrontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tools: ToolsField,
    #[serde(default, alias = "corePrompts")]
    core_prompts: Option<String>,
    #[serde(default, alias = "endingPrompts")]
    ending_prompts: Option<String>,
    #[serde(default, alias = "outputFormat")]
    output_format: Option<String>,
}

/// Frontmatter `tools:` accepts a YAML list or a single comma/whitespace
/// separated string.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum ToolsField {
    List(Vec<String>),
    Single(String),
    #[default]
    Empty,
}

impl ToolsField {
    fn into_tools(self) -> Vec<String> {
        match self {
            ToolsField::List(entries) => entries
                .into_iter()
                .map(|entry| entry.trim().to_string())
                .filter(|entry| !entry.is_empty())
                .collect(),
            ToolsField::Single(joined) => joined
                .split(|ch: char| ch == ',' || ch.is_whitespace())
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
            ToolsField::Empty => Vec::new(),
        }
    }
}

/// Derive a human-readable skill name from its kebab-case id.
fn name_from_id(id: &str) -> String {
    id.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkillMode {
    None,
    Precompiled,
    Dynamic,
}

/// Sub-scan of the already-classified manifest and intro ranges for
/// "Pre-compiled Skills" / "Dynamic Skills" listings. Bullet grammar:
/// `- <id> (<path>): <description>`.
fn scan_skills(doc: &ExpandedDocument, ranges: &[SectionRange]) -> SkillSet {
    let bullet = Regex::new(r"^\s*[-*]\s+([a-z0-9][a-z0-9_-]*)\s*\(([^()]+)\)\s*:\s*(\S.*)$")
        .expect("regex for skill bullets");
    let mut skills = SkillSet::default();
    for range in ranges {
        if !matches!(
            range.label,
            SectionLabel::PreloadedManifest | SectionLabel::Intro
        ) {
            continue;
        }
        let mut mode = SkillMode::None;
        for line in &doc.lines[range.start..range.end] {
            if let Some(heading) = crate::classifier::heading_text(line) {
                let lowered = heading.to_lowercase();
                mode = if lowered.contains("pre-compiled skills")
                    || lowered.contains("precompiled skills")
                {
                    SkillMode::Precompiled
                } else if lowered.contains("dynamic skills") {
                    SkillMode::Dynamic
                } else {
                    SkillMode::None
                };
                continue;
            }
            if mode == SkillMode::None {
                continue;
            }
            if let Some(capture) = bullet.captures(line) {
                let id = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
                let path = capture
                    .get(2)
                    .map(|m| m.as_str().trim())
                    .unwrap_or_default();
                let description = capture
                    .get(3)
                    .map(|m| m.as_str().trim())
                    .unwrap_or_default();
                let reference = SkillRef {
                    id: id.to_string(),
                    path: path.to_string(),
                    name: name_from_id(id),
                    description: description.to_string(),
                };
                match mode {
                    SkillMode::Precompiled => skills.precompiled.push(reference),
                    SkillMode::Dynamic => skills.dynamic.push(reference),
                    SkillMode::None => {}
                }
            }
        }
    }
    skills
}

/// Parse frontmatter and classified metadata into a normalized agent
/// descriptor plus non-fatal warnings.
pub fn generate(
    doc: &ExpandedDocument,
    ranges: &[SectionRange],
    config: &CompilerConfig,
) -> Result<(AgentConfigDescriptor, Vec<String>), CompileError> {
    let frontmatter = ranges
        .iter()
        .find(|range| range.label == SectionLabel::Frontmatter)
        .ok_or_else(|| {
            CompileError::ConfigValidation("missing frontmatter block".to_string())
        })?;
    if frontmatter.len() < 2 {
        return Err(CompileError::ConfigValidation(
            "frontmatter block has no body".to_string(),
        ));
    }
    let yaml = doc.lines[frontmatter.start + 1..frontmatter.end - 1].join("\n");
    let raw: RawFrontmatter = serde_yaml::from_str(&yaml).map_err(|err| {
        CompileError::ConfigValidation(format!("invalid YAML frontmatter: {err}"))
    })?;

    let name = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            CompileError::ConfigValidation("missing required frontmatter key: name".to_string())
        })?
        .to_string();
    let description = raw
        .description
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            CompileError::ConfigValidation(
                "missing required frontmatter key: description".to_string(),
            )
        })?
        .to_string();

    let mut warnings = Vec::new();
    let kebab = Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("regex for agent names");
    if !kebab.is_match(&name) {
        warnings.push(format!(
            "agent name {name:?} is not kebab-case; output directory will be sanitized"
        ));
    }

    let tools = raw.tools.into_tools();
    for tool in &tools {
        if !config.known_tools.iter().any(|known| known == tool) {
            warnings.push(format!("unknown tool {tool:?} in frontmatter"));
        }
    }

    let skills = scan_skills(doc, ranges);
    let descriptor = AgentConfigDescriptor {
        schema_version: DESCRIPTOR_SCHEMA_VERSION,
        name,
        title: raw.title.filter(|value| !value.trim().is_empty()),
        description,
        model: raw.model.filter(|value| !value.trim().is_empty()),
        tools,
        core_prompts_ref: raw.core_prompts,
        ending_prompts_ref: raw.ending_prompts,
        output_format_ref: raw.output_format,
        skills,
    };
    Ok((descriptor, warnings))
}

/// Serialize a descriptor to YAML with deterministic key order
/// (declaration order), so repeated compiles are diff-friendly.
pub fn to_yaml(descriptor: &AgentConfigDescriptor) -> Result<String> {
    serde_yaml::to_string(descriptor).context("serialize agent descriptor")
}

/// Filesystem-safe directory name for an agent.
pub fn agent_dir_name(name: &str) -> String {
    let sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = sanitized.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "agent".to_string()
    } else {
        trimmed
    }
}
