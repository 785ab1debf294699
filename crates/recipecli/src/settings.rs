use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use imageloader_service::config::Config;
use imageloader_service::recipes::PhotoSize;
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Outputs one row per recipe.
    Table,
    /// Outputs all recipes and their photo states as JSON.
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Size {
    Small,
    Large,
}

impl From<Size> for PhotoSize {
    fn from(size: Size) -> Self {
        match size {
            Size::Small => PhotoSize::Small,
            Size::Large => PhotoSize::Large,
        }
    }
}

/// Fetches the recipe list and loads the photo of every recipe.
///
/// Photos that take longer than `--timeout` are cancelled and shown as a placeholder.
#[derive(Clone, Parser, Debug)]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The URL to fetch the recipe list from.
    ///
    /// Overrides `recipes_url` from the configuration file.
    #[arg(long)]
    pub url: Option<String>,

    /// Which photo to load for every recipe.
    #[arg(long, value_enum, default_value = "small")]
    pub size: Size,

    /// How long to wait for a single photo, e.g. `500ms` or `2s`.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub timeout: Duration,

    /// The output format.
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// The severity level of logging output.
    ///
    /// Overrides the level from the configuration file.
    /// Possible values: off, error, warn, info, debug, trace
    #[arg(long)]
    pub log_level: Option<LevelFilter>,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub config: Config,
    pub size: PhotoSize,
    pub timeout: Duration,
    pub output_format: OutputFormat,
}

impl Settings {
    pub fn get() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> Result<Self> {
        let mut config = Config::get(cli.config.as_deref()).context("failed loading config")?;

        if let Some(url) = cli.url {
            config.recipes_url = Url::parse(&url).context("Invalid recipes URL")?;
        }
        if let Some(level) = cli.log_level {
            config.logging.level = level;
        }

        Ok(Self {
            config,
            size: cli.size.into(),
            timeout: cli.timeout,
            output_format: cli.format,
        })
    }
}
