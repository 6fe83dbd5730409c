//! mycroft - talk to Home Assistant through a language model
//!
//! Forwards utterances to an OpenAI chat model that answers with a JSON
//! comment and an optional service call, and runs that call against a
//! Home Assistant instance.

mod agent;
mod api;
mod cli;
mod commands;
mod completion;
mod config;
mod dispatch;
mod history;
mod output;
mod prompt;
mod reply;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::config::RuntimeContext;

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(io::stderr(), "Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = RuntimeContext::new(&cli.global)?;
    ctx.init_logging()?;

    log::debug!("Config loaded from: {:?}", ctx.config_path());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_command(&ctx, cli.command))
}

async fn run_command(ctx: &RuntimeContext, command: Command) -> Result<()> {
    match command {
        Command::Ask(cmd) => commands::ask::run(ctx, cmd).await,
        Command::Chat { lang } => commands::chat::run(ctx, &lang).await,
        Command::Check => commands::check::run(ctx).await,
        Command::Config { command } => commands::config::run(ctx, command),
        Command::Completions { shell } => commands::completions::run(shell),
    }
}
