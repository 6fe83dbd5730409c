//! CLI argument parsing and command definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Talk to your Home Assistant through a language model
#[derive(Debug, Parser)]
#[command(
    name = "mycroft",
    author,
    version,
    about = "Talk to your Home Assistant through a language model",
    propagate_version = true,
    after_help = "Use 'mycroft <command> --help' for more information about a command."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,
    #[command(subcommand)]
    pub command: Command,
}

/// Global options available to all commands
#[derive(Debug, Clone, Args)]
pub struct GlobalOpts {
    /// Output format (json, yaml, text, auto)
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        global = true,
        conflicts_with = "json"
    )]
    pub output_format: Option<OutputFormat>,

    /// Output as JSON (shorthand for -o json)
    #[arg(long, global = true)]
    pub json: bool,

    /// Home Assistant server URL
    #[arg(short = 's', long, env = "HASS_SERVER", global = true)]
    pub server: Option<String>,

    /// Home Assistant authentication token
    #[arg(long, env = "HASS_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, value_name = "URL", global = true)]
    pub openai_url: Option<String>,

    /// Completion model to use
    #[arg(short = 'm', long, global = true)]
    pub model: Option<String>,

    /// Home Assistant request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Skip SSL certificate verification for Home Assistant
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Override config file path
    #[arg(long, value_name = "PATH", env = "MYCROFT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Reduce output to only errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase logging verbosity (stackable: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable trace logging
    #[arg(long, global = true)]
    pub trace: bool,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[non_exhaustive]
pub enum OutputFormat {
    Json,
    Yaml,
    Text,
    Auto,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a single utterance to the agent in a fresh conversation
    Ask(AskCommand),

    /// Hold an interactive conversation on stdin
    Chat {
        /// Language tag for the replies
        #[arg(long, default_value = "en")]
        lang: String,
    },

    /// Validate the OpenAI credentials
    Check,

    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct AskCommand {
    /// What to say to the agent
    #[arg(required = true, value_name = "WORDS")]
    pub words: Vec<String>,

    /// Language tag for the reply
    #[arg(long, default_value = "en")]
    pub lang: String,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show effective configuration
    Show,

    /// Print config file path
    Path,

    /// Get a specific configuration value
    Get {
        /// Configuration key (dot-separated path)
        key: Option<String>,
    },

    /// Reset configuration to defaults
    Reset,
}
