//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::render::{DEFAULT_THEME, MathLimits, math::LIMIT_CEILING};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "safe-markup";
const ENV_PREFIX: &str = "SAFE_MARKUP";

/// Command-line arguments for the safe-markup binary.
#[derive(Debug, Parser)]
#[command(
    name = "safe-markup",
    version,
    about = "Render untrusted markdown into sanitized HTML"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SAFE_MARKUP_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render markdown from a file or stdin to stdout.
    Render(RenderArgs),
    /// Print the active sanitization policy as JSON.
    Policy(PolicyArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderArgs {
    /// Markdown file to render; stdin when omitted or `-`.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub render: RenderOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PolicyArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the macro expansion budget of one math expression.
    #[arg(long = "math-max-expand", value_name = "COUNT")]
    pub math_max_expand: Option<u32>,

    /// Override the largest size, in em, a math expression may request.
    #[arg(long = "math-max-size", value_name = "EM")]
    pub math_max_size_em: Option<f64>,

    /// Override the syntax highlighting theme.
    #[arg(long = "highlight-theme", value_name = "NAME")]
    pub highlight_theme: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub math_max_expand: u32,
    pub math_max_size_em: f64,
    pub highlight_theme: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Render(args)) => raw.apply_render_args(args),
        Some(Command::Policy(args)) => raw.apply_logging_overrides(&args.logging),
        None => {}
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    render: RawRenderSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    math_max_expand: Option<u32>,
    math_max_size_em: Option<f64>,
    highlight_theme: Option<String>,
}

impl RawSettings {
    fn apply_render_args(&mut self, args: &RenderArgs) {
        self.apply_render_overrides(&args.render);
        self.apply_logging_overrides(&args.logging);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(count) = overrides.math_max_expand {
            self.render.math_max_expand = Some(count);
        }
        if let Some(size) = overrides.math_max_size_em {
            self.render.math_max_size_em = Some(size);
        }
        if let Some(theme) = overrides.highlight_theme.as_ref() {
            self.render.highlight_theme = Some(theme.clone());
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, render } = raw;

        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;

        Ok(Self { logging, render })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let defaults = MathLimits::default();
    let ceiling = LIMIT_CEILING as u32;

    let math_max_expand = render.math_max_expand.unwrap_or(defaults.max_expand());
    if !(1..=ceiling).contains(&math_max_expand) {
        return Err(LoadError::invalid(
            "render.math_max_expand",
            format!("must be between 1 and {ceiling}"),
        ));
    }

    let math_max_size_em = render.math_max_size_em.unwrap_or(defaults.max_size_em());
    if !math_max_size_em.is_finite() || math_max_size_em <= 0.0 || math_max_size_em > LIMIT_CEILING
    {
        return Err(LoadError::invalid(
            "render.math_max_size_em",
            format!("must be a finite value in (0, {LIMIT_CEILING}]"),
        ));
    }

    let highlight_theme = render
        .highlight_theme
        .map(|theme| theme.trim().to_string())
        .unwrap_or_else(|| DEFAULT_THEME.to_string());
    if highlight_theme.is_empty() {
        return Err(LoadError::invalid(
            "render.highlight_theme",
            "theme name must not be empty",
        ));
    }

    Ok(RenderSettings {
        math_max_expand,
        math_max_size_em,
        highlight_theme,
    })
}

/// Parse CLI arguments and load settings in one go.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
