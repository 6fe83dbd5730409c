//! Output formatting utilities
//!
//! Handles JSON, YAML, and plain text output formats.

use std::io::IsTerminal;

use anyhow::Result;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::config::RuntimeContext;

/// Format and print data according to the configured output format
pub fn print_output<T: Serialize>(ctx: &RuntimeContext, data: &T) -> Result<()> {
    let output = format_output(ctx.output_format(), std::io::stdout().is_terminal(), data)?;
    println!("{output}");
    Ok(())
}

/// Format data as JSON or YAML. Text and auto fall back to JSON, compact when
/// piped.
pub fn format_output<T: Serialize>(format: OutputFormat, is_tty: bool, data: &T) -> Result<String> {
    match format {
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        OutputFormat::Json | OutputFormat::Text | OutputFormat::Auto => {
            if is_tty {
                Ok(serde_json::to_string_pretty(data)?)
            } else {
                Ok(serde_json::to_string(data)?)
            }
        }
    }
}

/// Print structured data for machine formats, or run `text` for humans.
///
/// `auto` means text on a terminal and JSON when piped.
pub fn output_for_format<T: Serialize>(
    ctx: &RuntimeContext,
    data: &T,
    text: impl FnOnce() -> Result<()>,
) -> Result<()> {
    let format = ctx.output_format();
    let is_tty = std::io::stdout().is_terminal();

    if wants_text(format, is_tty) {
        text()
    } else {
        print_output(ctx, data)
    }
}

fn wants_text(format: OutputFormat, is_tty: bool) -> bool {
    match format {
        OutputFormat::Text => true,
        OutputFormat::Auto => is_tty,
        OutputFormat::Json | OutputFormat::Yaml => false,
    }
}
