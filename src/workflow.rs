//! Compile workflow: per-document pipeline and batch orchestration.
//!
//! Documents compile independently; the only shared state is the
//! read-only fragment and expansion caches, so the batch fans out to one
//! worker thread per document up to the requested job count. A fatal
//! error in one document never aborts its siblings.

use crate::cli::{CheckArgs, CompileArgs, InitArgs};
use crate::classifier::classify;
use crate::config::{self, CompilerConfig};
use crate::descriptor::{self, agent_dir_name};
use crate::emitter::{emit, TargetFile};
use crate::errors::CompileError;
use crate::fragments::FragmentStore;
use crate::resolver::{DirectiveResolver, ExpandedDocument, SourceDocument};
use crate::schema::{
    AgentConfigDescriptor, BatchSummary, DocumentOutcome, LineOrigin, OutcomeStatus,
    VerificationReport,
};
use crate::staging::{publish, stage_json, stage_text, stage_yaml};
use crate::verify::verify;
use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Everything produced for one document; scoped to a single compile run.
#[derive(Debug)]
pub struct CompiledDocument {
    pub document: PathBuf,
    pub expanded: ExpandedDocument,
    pub descriptor: AgentConfigDescriptor,
    pub targets: Vec<TargetFile>,
    pub report: VerificationReport,
}

pub fn run_init(args: InitArgs) -> Result<()> {
    if args.config.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            args.config.display()
        ));
    }
    let config = config::default_config();
    config::write_config(&args.config, &config)?;
    println!("wrote {}", args.config.display());
    Ok(())
}

pub fn run_compile(args: CompileArgs) -> Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    fs::create_dir_all(&args.out)
        .with_context(|| format!("create {}", args.out.display()))?;
    let plan = PublishPlan {
        out_root: args.out.clone(),
        force: args.force,
    };
    run_batch(
        &args.docs,
        args.fragments.clone(),
        &config,
        args.jobs,
        Some(&plan),
        args.verbose,
        args.json,
    )
}

pub fn run_check(args: CheckArgs) -> Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    run_batch(
        &args.docs,
        args.fragments.clone(),
        &config,
        args.jobs,
        None,
        args.verbose,
        args.json,
    )
}

struct PublishPlan {
    out_root: PathBuf,
    force: bool,
}

fn resolve_config(path: Option<&Path>) -> Result<CompilerConfig> {
    match path {
        Some(path) => config::load_config(path),
        None => Ok(config::default_config()),
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

/// Run the full pipeline for one document. Pure computation between the
/// source read and the caller's publish decision.
pub fn compile_document(
    path: &Path,
    resolver: &DirectiveResolver<'_>,
    config: &CompilerConfig,
) -> Result<CompiledDocument, CompileError> {
    let source = SourceDocument::load(path)?;
    let expanded = resolver.expand(&source)?;
    let ranges = classify(&expanded, config)?;
    let (descriptor, warnings) = descriptor::generate(&expanded, &ranges, config)?;
    let targets = emit(&expanded, &ranges, config);
    let report = verify(
        &path.display().to_string(),
        &expanded,
        &ranges,
        &targets,
        config,
        warnings,
    );
    Ok(CompiledDocument {
        document: path.to_path_buf(),
        expanded,
        descriptor,
        targets,
        report,
    })
}

type BatchSlot = Mutex<Option<Result<CompiledDocument, CompileError>>>;

fn compile_batch(
    docs: &[PathBuf],
    resolver: &DirectiveResolver<'_>,
    config: &CompilerConfig,
    jobs: usize,
) -> Vec<Result<CompiledDocument, CompileError>> {
    let queue: Mutex<VecDeque<usize>> = Mutex::new((0..docs.len()).collect());
    let slots: Vec<BatchSlot> = docs.iter().map(|_| Mutex::new(None)).collect();
    let workers = jobs.clamp(1, docs.len().max(1));
    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let next = queue.lock().expect("batch queue poisoned").pop_front();
                let Some(index) = next else {
                    break;
                };
                let outcome = compile_document(&docs[index], resolver, config);
                *slots[index].lock().expect("batch slot poisoned") = Some(outcome);
            });
        }
    });
    slots
        .into_iter()
        .map(|slot| {
            slot.into_inner()
                .expect("batch slot poisoned")
                .expect("batch slot filled")
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn run_batch(
    docs: &[PathBuf],
    fragment_root: PathBuf,
    config: &CompilerConfig,
    jobs: Option<usize>,
    publish: Option<&PublishPlan>,
    verbose: bool,
    json: bool,
) -> Result<()> {
    let store = FragmentStore::new(fragment_root);
    let resolver = DirectiveResolver::new(&store, config.max_include_depth);
    let jobs = jobs.unwrap_or_else(default_jobs);
    let compiled = compile_batch(docs, &resolver, config, jobs);

    let mut outcomes = Vec::new();
    for (path, outcome) in docs.iter().zip(compiled) {
        match outcome {
            Ok(document) => {
                let passed = document.report.passed();
                if let Some(plan) = publish {
                    if passed || plan.force {
                        write_pack(&document, &plan.out_root).with_context(|| {
                            format!("write pack for {}", document.document.display())
                        })?;
                    }
                }
                if passed {
                    // stdout carries only the summary JSON in --json mode.
                    if json {
                        eprintln!("OK {}", document.document.display());
                    } else {
                        println!("OK {}", document.document.display());
                    }
                } else {
                    eprintln!(
                        "FAILED {}: verification failed ({})",
                        document.document.display(),
                        failure_summary(&document.report)
                    );
                }
                if verbose {
                    print_report(&document.report, &document.expanded);
                }
                outcomes.push(DocumentOutcome {
                    document: document.document.display().to_string(),
                    status: if passed {
                        OutcomeStatus::Ok
                    } else {
                        OutcomeStatus::Failed
                    },
                    reason: (!passed).then(|| failure_summary(&document.report)),
                    report: Some(document.report),
                });
            }
            Err(err) => {
                eprintln!("FAILED {}: {err}", path.display());
                outcomes.push(DocumentOutcome {
                    document: path.display().to_string(),
                    status: OutcomeStatus::Failed,
                    reason: Some(err.to_string()),
                    report: None,
                });
            }
        }
    }
    finish_batch(outcomes, json)
}

/// Stage one agent pack and publish it atomically under the output root.
fn write_pack(document: &CompiledDocument, out_root: &Path) -> Result<()> {
    let agent_root = out_root.join(agent_dir_name(&document.descriptor.name));
    let scratch = tempfile::Builder::new()
        .prefix(".ppack-txn-")
        .tempdir_in(out_root)
        .context("create staging dir")?;
    let stage_root = scratch.path().join("stage");
    for target in &document.targets {
        let mut text = target.lines.join("\n");
        text.push('\n');
        stage_text(&stage_root, &target.rel_path, &text)?;
    }
    stage_yaml(&stage_root, "agent.yaml", &document.descriptor)?;
    stage_json(&stage_root, "verification.json", &document.report)?;
    publish(&stage_root, &scratch.path().join("backup"), &agent_root)?;
    Ok(())
}

fn failure_summary(report: &VerificationReport) -> String {
    let mut parts = Vec::new();
    if !report.completeness_ok {
        parts.push(format!(
            "{} missing, {} duplicated lines",
            report.missing_lines.len(),
            report.duplicated_lines.len()
        ));
    }
    if !report.structural_ok {
        parts.push(format!("{} broken tags", report.broken_tags.len()));
    }
    if !report.budget_ok {
        parts.push(format!(
            "emitted {} of {} expected lines",
            report.actual_line_count, report.expected_line_count
        ));
    }
    parts.join("; ")
}

fn origin_display(origin: &LineOrigin) -> String {
    match origin {
        LineOrigin::Source { line } => format!("source:{line}"),
        LineOrigin::Fragment { path, line } => format!("{path}:{line}"),
    }
}

fn print_report(report: &VerificationReport, expanded: &ExpandedDocument) {
    for warning in &report.warnings {
        eprintln!("  warning: {warning}");
    }
    for missing in &report.missing_lines {
        eprintln!(
            "  missing line {} (from {})",
            missing.line,
            origin_display(&missing.origin)
        );
        print_line_context(expanded, missing.line);
    }
    for duplicated in &report.duplicated_lines {
        eprintln!(
            "  duplicated line {} (from {})",
            duplicated.line,
            origin_display(&duplicated.origin)
        );
        print_line_context(expanded, duplicated.line);
    }
    for tag in &report.broken_tags {
        let close = tag
            .close_line
            .map(|line| line.to_string())
            .unwrap_or_else(|| "none".to_string());
        eprintln!(
            "  broken tag <{}>: open at line {}, close at {}: {}",
            tag.name, tag.open_line, close, tag.reason
        );
    }
}

fn print_line_context(expanded: &ExpandedDocument, line: usize) {
    let index = line.saturating_sub(1);
    let start = index.saturating_sub(2);
    let end = (index + 3).min(expanded.line_count());
    for current in start..end {
        let marker = if current == index { '>' } else { ' ' };
        eprintln!("  {marker} {:>4} | {}", current + 1, expanded.lines[current]);
    }
}

fn finish_batch(outcomes: Vec<DocumentOutcome>, json: bool) -> Result<()> {
    let failed = outcomes
        .iter()
        .filter(|outcome| outcome.status == OutcomeStatus::Failed)
        .count();
    let summary = BatchSummary {
        total: outcomes.len(),
        ok: outcomes.len() - failed,
        failed,
        documents: outcomes,
    };
    if json {
        let text = serde_json::to_string_pretty(&summary).context("serialize batch summary")?;
        println!("{text}");
    } else {
        println!(
            "{} ok, {} failed of {} documents",
            summary.ok, summary.failed, summary.total
        );
    }
    if failed > 0 {
        return Err(anyhow!("{failed} of {} documents failed", summary.total));
    }
    Ok(())
}
