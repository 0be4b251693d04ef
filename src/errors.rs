//! Failure taxonomy for a single document compile.
//!
//! Every variant is terminal for the document it occurred in; the batch
//! driver collects them without aborting sibling compiles. None are retried.

use crate::schema::SectionLabel;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// A fragment path did not resolve under the configured fragment root.
    #[error("fragment not found: {path}")]
    NotFound { path: String },

    /// A document or fragment existed but could not be read.
    #[error("read {path}: {message}")]
    Read { path: String, message: String },

    /// An include chain revisited a fragment already on the expansion path.
    #[error("include cycle at {path}: {}", .cycle.join(" -> "))]
    Cycle { path: String, cycle: Vec<String> },

    /// Safety net for runaway nesting; cycles are normally caught first.
    #[error("include depth exceeded {max_depth} while expanding {path}")]
    DepthExceeded { path: String, max_depth: usize },

    /// A directive survived expansion. Indicates a resolver bug, never
    /// a source-document defect.
    #[error("include directive survived expansion at line {line}: {directive}")]
    IncludeResidue { line: usize, directive: String },

    /// Frontmatter is missing, malformed, or lacks a required key.
    #[error("invalid agent config: {0}")]
    ConfigValidation(String),

    /// Two classifier rules claimed the same line. Indicates a rule-table
    /// bug, never a source-document defect.
    #[error("classifier claimed line {line} twice ({first:?} and {second:?})")]
    ClassificationConflict {
        line: usize,
        first: SectionLabel,
        second: SectionLabel,
    },
}
