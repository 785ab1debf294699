use anyhow::{Context, Result};
use imageloader_service::recipes::{FetchRecipes, HttpRecipeFetcher};
use imageloader_service::{StandardImageLoader, logging, metrics};

use crate::output;
use crate::photos;
use crate::settings::{OutputFormat, Settings};

/// Runs the main application.
pub fn execute() -> Result<()> {
    let settings = Settings::get()?;
    let config = &settings.config;

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: No other threads have been spawned yet.
    unsafe { logging::init_logging(config) };
    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("recipecli")
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    runtime.block_on(run(settings))
}

async fn run(settings: Settings) -> Result<()> {
    let config = &settings.config;
    let fetcher = HttpRecipeFetcher::from_config(config).context("failed to create HTTP client")?;
    let loader = StandardImageLoader::from_config(config).context("failed to create HTTP client")?;

    let recipes = fetcher
        .fetch_recipes()
        .await
        .with_context(|| format!("failed to fetch recipes from {}", fetcher.url()))?;
    tracing::info!("Loading photos of {} recipes", recipes.len());

    let rows = photos::load_photos(&loader, recipes, settings.size, settings.timeout).await;

    match settings.output_format {
        OutputFormat::Table => output::print_table(&rows),
        OutputFormat::Json => output::print_json(&rows).context("failed to write output")?,
    }

    Ok(())
}
