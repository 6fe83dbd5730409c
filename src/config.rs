//! Configuration management for mycroft
//!
//! Supports:
//! - TOML config file at XDG locations
//! - Environment variable overrides
//! - Command-line argument overrides

use std::env;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use env_logger::fmt::WriteStyle;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::agent::AgentOptions;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::prompt::{DEFAULT_HOME_INFO_TEMPLATE, DEFAULT_PROMPT};

const APP_NAME: &str = env!("CARGO_PKG_NAME");

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: u32 = 150;
pub const DEFAULT_TOP_P: f64 = 1.0;
pub const DEFAULT_TEMPERATURE: f64 = 0.5;
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Runtime context containing resolved configuration
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub global: GlobalOpts,
    pub config: AppConfig,
    config_path: PathBuf,
}

impl RuntimeContext {
    pub fn new(global: &GlobalOpts) -> Result<Self> {
        let config_path = resolve_config_path(global.config.as_ref())?;
        let config = load_config(&config_path, global)?;

        Ok(Self {
            global: global.clone(),
            config,
            config_path,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn init_logging(&self) -> Result<()> {
        if self.global.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let mut builder = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(&self.config.logging.level),
        );

        if let Some(level) = self.cli_log_level() {
            builder.filter_level(level);
        }

        let force_color = env::var_os("FORCE_COLOR").is_some();
        let disable_color = self.global.no_color
            || env::var_os("NO_COLOR").is_some()
            || (!force_color && !std::io::stderr().is_terminal());

        if disable_color {
            builder.write_style(WriteStyle::Never);
        } else if force_color {
            builder.write_style(WriteStyle::Always);
        } else {
            builder.write_style(WriteStyle::Auto);
        }

        builder.try_init().or_else(|err| {
            if self.global.verbose > 0 {
                eprintln!("logger already initialized: {err}");
            }
            Ok(())
        })
    }

    /// Level requested on the command line; `None` keeps the configured filter
    fn cli_log_level(&self) -> Option<LevelFilter> {
        if self.global.trace {
            Some(LevelFilter::Trace)
        } else if self.global.debug {
            Some(LevelFilter::Debug)
        } else {
            match self.global.verbose {
                0 => None,
                1 => Some(LevelFilter::Info),
                2 => Some(LevelFilter::Debug),
                _ => Some(LevelFilter::Trace),
            }
        }
    }

    /// Get the effective server URL
    pub fn server_url(&self) -> Result<&str> {
        self.global
            .server
            .as_deref()
            .or(self.config.homeassistant.server.as_deref())
            .ok_or_else(|| {
                anyhow!(
                    "No Home Assistant server configured.\n\
                    Set via --server, HASS_SERVER env var, or in config file."
                )
            })
    }

    /// Get the effective auth token
    pub fn token(&self) -> Result<&str> {
        self.global
            .token
            .as_deref()
            .or(self.config.homeassistant.token.as_deref())
            .ok_or_else(|| {
                anyhow!(
                    "No authentication token configured.\n\
                    Set via --token, HASS_TOKEN env var, or in config file."
                )
            })
    }

    /// Get the effective Home Assistant timeout in seconds
    pub fn timeout(&self) -> u64 {
        self.global
            .timeout
            .unwrap_or(self.config.homeassistant.timeout)
    }

    /// Check if SSL verification should be skipped
    pub fn insecure(&self) -> bool {
        self.global.insecure || self.config.homeassistant.insecure
    }

    /// Get the effective OpenAI API key
    pub fn api_key(&self) -> Result<&str> {
        self.global
            .api_key
            .as_deref()
            .or(self.config.openai.api_key.as_deref())
            .ok_or_else(|| {
                anyhow!(
                    "No OpenAI API key configured.\n\
                    Set via --api-key, OPENAI_API_KEY env var, or in config file."
                )
            })
    }

    pub fn openai_base_url(&self) -> &str {
        &self.config.openai.base_url
    }

    /// Resolve the agent's options, applying defaults for anything unset
    pub fn agent_options(&self) -> AgentOptions {
        let openai = &self.config.openai;
        AgentOptions {
            model: self
                .global
                .model
                .clone()
                .unwrap_or_else(|| openai.model.clone()),
            max_tokens: openai.max_tokens,
            top_p: openai.top_p,
            temperature: openai.temperature,
            prompt: openai
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            home_info_template: openai
                .home_info_template
                .clone()
                .unwrap_or_else(|| DEFAULT_HOME_INFO_TEMPLATE.to_string()),
        }
    }

    /// Get the effective output format
    pub fn output_format(&self) -> OutputFormat {
        if self.global.json {
            return OutputFormat::Json;
        }

        self.global
            .output_format
            .unwrap_or(match self.config.output.format.as_str() {
                "json" => OutputFormat::Json,
                "yaml" => OutputFormat::Yaml,
                "text" => OutputFormat::Text,
                _ => OutputFormat::Auto,
            })
    }
}

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub homeassistant: HomeAssistantConfig,
    pub openai: OpenAiConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    pub server: Option<String>,
    pub token: Option<String>,
    pub timeout: u64,
    pub insecure: bool,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            server: None,
            token: None,
            timeout: 30,
            insecure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub top_p: f64,
    pub temperature: f64,
    /// System prompt; the built-in butler prompt when unset
    pub prompt: Option<String>,
    /// Template for the home state block; the built-in one when unset
    pub home_info_template: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            temperature: DEFAULT_TEMPERATURE,
            prompt: None,
            home_info_template: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

fn resolve_config_path(override_path: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        let expanded = expand_path(path)?;
        if expanded.is_dir() {
            return Ok(expanded.join("config.toml"));
        }
        return Ok(expanded);
    }

    Ok(default_config_dir()?.join("config.toml"))
}

fn load_config(config_path: &Path, global: &GlobalOpts) -> Result<AppConfig> {
    // Create default config if it doesn't exist
    if !config_path.exists() {
        write_default_config(config_path)?;
    }

    let config = Config::builder()
        .set_default("homeassistant.timeout", 30_i64)?
        .set_default("homeassistant.insecure", false)?
        .set_default("openai.base_url", DEFAULT_OPENAI_URL)?
        .set_default("openai.model", DEFAULT_MODEL)?
        .set_default("openai.max_tokens", i64::from(DEFAULT_MAX_TOKENS))?
        .set_default("openai.top_p", DEFAULT_TOP_P)?
        .set_default("openai.temperature", DEFAULT_TEMPERATURE)?
        .set_default("output.format", "auto")?
        .set_default("logging.level", "warn")?
        .add_source(
            File::from(config_path)
                .format(FileFormat::Toml)
                .required(false),
        )
        // MYCROFT__SECTION__KEY overrides any value
        .add_source(
            Environment::with_prefix("MYCROFT")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    let mut app_config: AppConfig = config.try_deserialize()?;

    if let Some(url) = &global.openai_url {
        app_config.openai.base_url = url.clone();
    }

    Ok(app_config)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config")?;

    let content = format!(
        "# mycroft configuration\n\
        # File: {}\n\
        #\n\
        # Environment variables:\n\
        #   HASS_SERVER    - Home Assistant server URL\n\
        #   HASS_TOKEN     - Home Assistant authentication token\n\
        #   OPENAI_API_KEY - OpenAI API key\n\
        #   MYCROFT__*     - Override any config value (e.g., MYCROFT__OPENAI__MODEL=gpt-4o)\n\
        #\n\
        # Set openai.prompt or openai.home_info_template to replace the built-in prompts.\n\
        \n\
        {toml}",
        path.display()
    );

    fs::write(path, content).with_context(|| format!("writing config to {}", path.display()))
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        let expanded = shellexpand::full(text).context("expanding path")?;
        Ok(PathBuf::from(expanded.to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}
