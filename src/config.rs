//! Compiler configuration helpers.
//!
//! The rule table that drives classification and emission is data, not
//! code: keyword lists, the label-to-file target map, sentinel phrases,
//! and the budget tolerance all load from a pack-owned JSON file so that
//! adding a section label is a configuration change.

use crate::schema::SectionLabel;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// One keyword rule: a heading whose text contains any keyword
/// (case-insensitive) opens a range with this label. Rules are evaluated
/// in list order; the first match wins ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub label: SectionLabel,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub schema_version: u32,
    /// Ordered heading rules; order is the tie-break priority.
    #[serde(default = "default_keyword_rules")]
    pub keyword_rules: Vec<KeywordRule>,
    /// Content label to relative output file.
    #[serde(default = "default_target_map")]
    pub target_map: BTreeMap<SectionLabel, String>,
    /// Best-effort catch file for unclassified lines.
    #[serde(default = "default_unclassified_target")]
    pub unclassified_target: String,
    /// Phrases that open a preloaded-content manifest range.
    #[serde(default = "default_preload_markers")]
    pub preload_markers: Vec<String>,
    /// Phrases that open the closing-boilerplate tail.
    #[serde(default = "default_closing_sentinels")]
    pub closing_sentinels: Vec<String>,
    /// Closed tool vocabulary; unknown names warn, never fail.
    #[serde(default = "default_known_tools")]
    pub known_tools: Vec<String>,
    /// Relative line-count drift allowed by the budget check.
    #[serde(default = "default_budget_tolerance")]
    pub budget_tolerance: f64,
    /// Safety net for runaway include nesting.
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
}

fn default_keyword_rules() -> Vec<KeywordRule> {
    let rule = |label: SectionLabel, keywords: &[&str]| KeywordRule {
        label,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    };
    vec![
        rule(
            SectionLabel::Workflow,
            &["workflow", "investigation", "process", "steps", "approach"],
        ),
        rule(
            SectionLabel::DomainPattern,
            &["pattern", "domain knowledge", "conventions", "heuristics"],
        ),
        rule(
            SectionLabel::Examples,
            &["example", "sample output", "walkthrough"],
        ),
        rule(
            SectionLabel::CriticalReminders,
            &["critical", "reminder", "never forget", "important rules"],
        ),
        rule(SectionLabel::Intro, &["intro", "role", "overview", "persona"]),
    ]
}

fn default_target_map() -> BTreeMap<SectionLabel, String> {
    BTreeMap::from([
        (SectionLabel::Intro, "intro.md".to_string()),
        (SectionLabel::Workflow, "workflow.md".to_string()),
        (SectionLabel::DomainPattern, "examples.md".to_string()),
        (SectionLabel::Examples, "examples.md".to_string()),
        (
            SectionLabel::CriticalReminders,
            "critical-reminders.md".to_string(),
        ),
    ])
}

fn default_unclassified_target() -> String {
    "unclassified.md".to_string()
}

fn default_preload_markers() -> Vec<String> {
    vec![
        "already in your context".to_string(),
        "preloaded_content".to_string(),
    ]
}

fn default_closing_sentinels() -> Vec<String> {
    vec!["display all".to_string()]
}

fn default_known_tools() -> Vec<String> {
    [
        "Read",
        "Write",
        "Edit",
        "Grep",
        "Glob",
        "Bash",
        "WebSearch",
        "WebFetch",
        "Skill",
    ]
    .iter()
    .map(|tool| tool.to_string())
    .collect()
}

fn default_budget_tolerance() -> f64 {
    0.15
}

fn default_max_include_depth() -> usize {
    16
}

/// Build the default rule table used when no config file is given.
pub fn default_config() -> CompilerConfig {
    CompilerConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        keyword_rules: default_keyword_rules(),
        target_map: default_target_map(),
        unclassified_target: default_unclassified_target(),
        preload_markers: default_preload_markers(),
        closing_sentinels: default_closing_sentinels(),
        known_tools: default_known_tools(),
        budget_tolerance: default_budget_tolerance(),
        max_include_depth: default_max_include_depth(),
    }
}

/// Load a config file and validate it.
pub fn load_config(path: &Path) -> Result<CompilerConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: CompilerConfig =
        serde_json::from_slice(&bytes).context("parse compiler config JSON")?;
    validate_config(&config)?;
    Ok(config)
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(path: &Path, config: &CompilerConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(config).context("serialize compiler config")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Validate schema version and rule-table consistency.
pub fn validate_config(config: &CompilerConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported compiler config schema_version {}",
            config.schema_version
        ));
    }
    for rule in &config.keyword_rules {
        if rule.label.is_infrastructure() || rule.label == SectionLabel::Unclassified {
            return Err(anyhow!(
                "keyword rule may not target {:?}",
                rule.label
            ));
        }
        if rule.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(anyhow!("keyword rule for {:?} has an empty keyword", rule.label));
        }
    }
    for (label, target) in &config.target_map {
        if label.is_infrastructure() {
            return Err(anyhow!(
                "target map may not emit infrastructure label {label:?}"
            ));
        }
        validate_relative_path(target, "target map")?;
    }
    validate_relative_path(&config.unclassified_target, "unclassified_target")?;
    if !(0.0..1.0).contains(&config.budget_tolerance) {
        return Err(anyhow!(
            "budget_tolerance must be in [0, 1) (got {})",
            config.budget_tolerance
        ));
    }
    if config.max_include_depth == 0 {
        return Err(anyhow!("max_include_depth must be at least 1"));
    }
    Ok(())
}

pub fn validate_relative_path(rel: &str, label: &str) -> Result<()> {
    let path = Path::new(rel);
    if rel.trim().is_empty() {
        return Err(anyhow!("{label} entries must be non-empty"));
    }
    if path.is_absolute() || has_parent_components(path) {
        return Err(anyhow!(
            "{label} entries must be relative paths without '..' (got {rel:?})"
        ));
    }
    Ok(())
}

fn has_parent_components(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, std::path::Component::ParentDir))
}
