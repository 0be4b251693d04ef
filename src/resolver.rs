//! Include-directive expansion with cycle detection and provenance.
//!
//! Expansion is a post-order DFS: a fragment's own includes expand fully
//! before the fragment inlines into its parent, so expanded output never
//! contains a residual directive token. Fully expanded fragments memoize
//! per path and are shared across every document in a batch.

use crate::errors::CompileError;
use crate::fragments::FragmentStore;
use crate::schema::LineOrigin;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Raw text of one agent definition, loaded once and immutable.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub raw_text: String,
    pub line_count: usize,
}

impl SourceDocument {
    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let raw_text = fs::read_to_string(path).map_err(|err| CompileError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let line_count = raw_text.lines().count();
        Ok(Self {
            path: path.to_path_buf(),
            raw_text,
            line_count,
        })
    }
}

/// A source document with every `@include` replaced by fragment text.
/// `line_map` records each output line's origin so verification diffs can
/// attribute every line even after expansion.
#[derive(Debug, Clone)]
pub struct ExpandedDocument {
    pub lines: Vec<String>,
    pub line_map: Vec<LineOrigin>,
    pub source_line_count: usize,
}

impl ExpandedDocument {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Parse a line that is exactly an include directive.
///
/// The directive must be the whole line (leading/trailing whitespace
/// aside); `@include(...)` embedded in prose is plain text.
pub fn directive_path(line: &str) -> Option<&str> {
    const PREFIX: &str = "@include(";
    const SUFFIX: &str = ")";
    let inner = line.trim().strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?.trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

#[derive(Debug)]
struct ExpandedFragment {
    lines: Vec<String>,
    origins: Vec<LineOrigin>,
}

pub struct DirectiveResolver<'a> {
    store: &'a FragmentStore,
    max_depth: usize,
    memo: Mutex<HashMap<String, Arc<ExpandedFragment>>>,
}

impl<'a> DirectiveResolver<'a> {
    pub fn new(store: &'a FragmentStore, max_depth: usize) -> Self {
        Self {
            store,
            max_depth,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Expand every include directive in `document`, recursively.
    pub fn expand(&self, document: &SourceDocument) -> Result<ExpandedDocument, CompileError> {
        let mut lines = Vec::new();
        let mut line_map = Vec::new();
        let mut stack = Vec::new();
        for (index, line) in document.raw_text.lines().enumerate() {
            if let Some(rel) = directive_path(line) {
                let fragment = self.expand_fragment(rel, &mut stack, 1)?;
                lines.extend(fragment.lines.iter().cloned());
                line_map.extend(fragment.origins.iter().cloned());
            } else {
                lines.push(line.to_string());
                line_map.push(LineOrigin::Source { line: index + 1 });
            }
        }
        Ok(ExpandedDocument {
            lines,
            line_map,
            source_line_count: document.line_count,
        })
    }

    fn expand_fragment(
        &self,
        rel_path: &str,
        stack: &mut Vec<String>,
        depth: usize,
    ) -> Result<Arc<ExpandedFragment>, CompileError> {
        if let Some(position) = stack.iter().position(|entry| entry == rel_path) {
            let mut cycle = stack[position..].to_vec();
            cycle.push(rel_path.to_string());
            return Err(CompileError::Cycle {
                path: rel_path.to_string(),
                cycle,
            });
        }
        if depth > self.max_depth {
            return Err(CompileError::DepthExceeded {
                path: rel_path.to_string(),
                max_depth: self.max_depth,
            });
        }
        if let Some(hit) = self
            .memo
            .lock()
            .expect("expansion memo poisoned")
            .get(rel_path)
        {
            tracing::debug!(fragment = rel_path, "expansion cache hit");
            return Ok(hit.clone());
        }

        let fragment = self.store.get(rel_path)?;
        stack.push(rel_path.to_string());
        let mut lines = Vec::new();
        let mut origins = Vec::new();
        for (index, line) in fragment.text.lines().enumerate() {
            if let Some(nested) = directive_path(line) {
                let expanded = self.expand_fragment(nested, stack, depth + 1)?;
                lines.extend(expanded.lines.iter().cloned());
                origins.extend(expanded.origins.iter().cloned());
            } else {
                lines.push(line.to_string());
                origins.push(LineOrigin::Fragment {
                    path: rel_path.to_string(),
                    line: index + 1,
                });
            }
        }
        stack.pop();

        // Only acyclic, fully expanded fragments memoize; sharing them
        // across batch threads is safe because entries never mutate.
        let expanded = Arc::new(ExpandedFragment { lines, origins });
        self.memo
            .lock()
            .expect("expansion memo poisoned")
            .insert(rel_path.to_string(), expanded.clone());
        Ok(expanded)
    }
}
