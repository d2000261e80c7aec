use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use std::{fs, sync::Arc};
use weather_core::{
    Config, Coordinate, Lifecycle, ProviderId, RefreshScheduler, SqliteWeatherStore,
    WeatherSession, WeatherSyncCoordinator, WeatherUpdate,
    provider::{default_provider_from_config, provider_from_config},
};

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    /// Log sync decisions (cache hits, fetches, store writes).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct LocationArgs {
    /// Latitude in decimal degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude in decimal degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Provider to use instead of the configured default.
    #[arg(long)]
    pub provider: Option<String>,
}

impl LocationArgs {
    fn coordinate(&self) -> anyhow::Result<Coordinate> {
        let coordinate = Coordinate::new(self.lat, self.lon);
        if !coordinate.is_valid() {
            bail!(
                "Invalid coordinate {}, {}: latitude must be within ±90 and longitude within ±180.",
                self.lat,
                self.lon
            );
        }
        Ok(coordinate)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure a provider and make it the default.
    Configure {
        /// Provider short name, e.g. "openweather" or "openmeteo".
        provider: String,
    },

    /// Show weather for a coordinate, from cache when fresh.
    Show(LocationArgs),

    /// Keep showing weather for a coordinate, refreshing periodically until Ctrl-C.
    Watch(LocationArgs),
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Show(args) => show(&args).await,
            Command::Watch(args) => watch(&args).await,
        }
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    if id.requires_api_key() {
        let key = inquire::Password::new(&format!("API key for {id}:"))
            .without_confirmation()
            .prompt()
            .context("Failed to read API key")?;

        let key = key.trim();
        if key.is_empty() {
            bail!("API key must not be empty.");
        }
        config.upsert_provider_api_key(id, key.to_string());
    }

    config.set_default_provider(id);
    config.save()?;

    println!("Provider '{id}' configured and set as default.");
    Ok(())
}

fn build_coordinator(config: &Config, provider: Option<&str>) -> anyhow::Result<WeatherSyncCoordinator> {
    let fetcher = match provider {
        Some(name) => provider_from_config(ProviderId::try_from(name)?, config)?,
        None => default_provider_from_config(config)?,
    };

    let path = config.resolved_store_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }

    let store = SqliteWeatherStore::open(&path, config.sync.coordinate_epsilon)
        .with_context(|| format!("Failed to open weather store: {}", path.display()))?;

    tracing::debug!(store = %path.display(), "opened weather store");

    Ok(WeatherSyncCoordinator::new(Arc::new(store), fetcher)
        .with_cache_duration(config.sync.cache_duration()))
}

async fn show(args: &LocationArgs) -> anyhow::Result<()> {
    let coordinate = args.coordinate()?;
    let config = Config::load()?;
    let coordinator = build_coordinator(&config, args.provider.as_deref())?;

    let snapshot = coordinator
        .load_weather(&coordinate)
        .await
        .with_context(|| format!("Failed to load weather for {coordinate}"))?;

    print!("{}", output::render_snapshot(&snapshot));
    Ok(())
}

async fn watch(args: &LocationArgs) -> anyhow::Result<()> {
    let coordinate = args.coordinate()?;
    let config = Config::load()?;
    let coordinator = build_coordinator(&config, args.provider.as_deref())?;

    let (session, mut updates) = WeatherSession::new(coordinator);
    let session = Arc::new(session);
    session.select_location(coordinate);

    let scheduler = RefreshScheduler::new(session.clone(), config.sync.refresh_interval());
    scheduler.handle_lifecycle(Lifecycle::Foreground).await;

    println!(
        "Watching {coordinate}, refreshing every {}s. Press Ctrl-C to stop.",
        scheduler.interval().as_secs()
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(update) = updates.recv() => {
                if let WeatherUpdate::Failed { error, .. } = &update {
                    tracing::warn!(%error, "refresh failed, retrying on next tick");
                }
                print!("{}", output::render_update(&update));
            }
            res = &mut ctrl_c => {
                res.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    scheduler.handle_lifecycle(Lifecycle::Background).await;
    Ok(())
}
