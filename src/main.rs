use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod classifier;
mod cli;
mod config;
mod descriptor;
mod emitter;
mod errors;
mod fragments;
mod resolver;
mod schema;
mod staging;
mod util;
mod verify;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = RootArgs::parse();
    match args.command {
        Command::Init(args) => workflow::run_init(args),
        Command::Compile(args) => workflow::run_compile(args),
        Command::Check(args) => workflow::run_check(args),
    }
}
