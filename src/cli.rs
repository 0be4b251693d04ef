//! CLI argument parsing for the prompt-pack compiler.
//!
//! The CLI is intentionally thin: it wires a deterministic pipeline
//! without embedding policy, so the same core logic can be reused as a
//! library.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the compile workflow.
#[derive(Parser, Debug)]
#[command(
    name = "ppack",
    version,
    about = "Compile monolithic agent definitions into modular prompt packs",
    after_help = "Commands:\n  init --config <FILE>                      Write the default rule table\n  compile --fragments <DIR> --out <DIR> ... Compile documents and publish packs\n  check --fragments <DIR> ...               Run the pipeline without writing\n\nExamples:\n  ppack init --config ppack.json\n  ppack compile --fragments prompts/ --out build/ agents/reviewer.md\n  ppack compile --fragments prompts/ --out build/ --jobs 4 agents/*.md\n  ppack check --fragments prompts/ --verbose agents/reviewer.md",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Compile(CompileArgs),
    Check(CheckArgs),
}

/// Init command inputs for materializing the default rule table.
#[derive(Parser, Debug)]
#[command(about = "Write the default compiler config for editing")]
pub struct InitArgs {
    /// Destination for the rule-table JSON
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

/// Compile command inputs for a batch of agent documents.
#[derive(Parser, Debug)]
#[command(about = "Compile agent documents into modular prompt packs")]
pub struct CompileArgs {
    /// Root directory fragment includes resolve against
    #[arg(long, value_name = "DIR")]
    pub fragments: PathBuf,

    /// Output directory; each agent publishes under <out>/<name>/
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// Rule-table JSON (defaults to the built-in table)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Worker threads for the batch (defaults to available parallelism)
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Publish packs even when verification fails
    #[arg(long)]
    pub force: bool,

    /// Print full verification diffs for failing documents
    #[arg(long)]
    pub verbose: bool,

    /// Emit the batch summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Agent definition documents to compile
    #[arg(required = true, value_name = "DOC")]
    pub docs: Vec<PathBuf>,
}

/// Check command inputs; the full pipeline with no writes.
#[derive(Parser, Debug)]
#[command(about = "Verify agent documents without writing packs")]
pub struct CheckArgs {
    /// Root directory fragment includes resolve against
    #[arg(long, value_name = "DIR")]
    pub fragments: PathBuf,

    /// Rule-table JSON (defaults to the built-in table)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Worker threads for the batch (defaults to available parallelism)
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Print full verification diffs for failing documents
    #[arg(long)]
    pub verbose: bool,

    /// Emit the batch summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Agent definition documents to check
    #[arg(required = true, value_name = "DOC")]
    pub docs: Vec<PathBuf>,
}
