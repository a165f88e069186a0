use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forecast_core::{
    Config, Coordinate, FileStore, OpenWeatherSource, Units, WeatherAggregator, WeatherSource,
    provider,
};
use inquire::{Password, PasswordDisplayMode, Select};

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "forecast",
    version,
    about = "Weather forecast with offline cache and favorites"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key and preferred units.
    Configure,

    /// Show current conditions, the coming days and the next hours.
    Show {
        #[arg(allow_negative_numbers = true, value_parser = parse_latitude)]
        latitude: f64,
        #[arg(allow_negative_numbers = true, value_parser = parse_longitude)]
        longitude: f64,

        /// Fetch even if the cached forecast is less than an hour old.
        #[arg(long)]
        refresh: bool,
    },

    /// Manage favorite locations.
    #[command(subcommand)]
    Favorites(FavoritesCommand),
}

#[derive(Debug, Subcommand)]
pub enum FavoritesCommand {
    List,

    Add {
        #[arg(allow_negative_numbers = true, value_parser = parse_latitude)]
        latitude: f64,
        #[arg(allow_negative_numbers = true, value_parser = parse_longitude)]
        longitude: f64,

        #[arg(long)]
        name: Option<String>,
    },

    Remove {
        #[arg(allow_negative_numbers = true, value_parser = parse_latitude)]
        latitude: f64,
        #[arg(allow_negative_numbers = true, value_parser = parse_longitude)]
        longitude: f64,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::load()?;

        match self.command {
            Command::Configure => configure(config),
            Command::Show {
                latitude,
                longitude,
                refresh,
            } => show(&config, Coordinate::new(latitude, longitude), refresh).await,
            Command::Favorites(cmd) => favorites(&config, cmd),
        }
    }
}

fn configure(mut config: Config) -> Result<()> {
    let api_key = Password::new("OpenWeather API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    config.set_api_key(api_key);

    let cursor = Units::all()
        .iter()
        .position(|u| *u == config.units)
        .unwrap_or(0);
    let units = Select::new("Units:", Units::all().to_vec())
        .with_starting_cursor(cursor)
        .prompt()
        .context("Failed to read units")?;
    config.units = units;

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show(config: &Config, coordinate: Coordinate, refresh: bool) -> Result<()> {
    let source: Arc<dyn WeatherSource> = Arc::from(provider::source_from_config(config)?);
    let aggregator = WeatherAggregator::new(source, open_store(config)?);

    if refresh || !aggregator.is_fresh_for(coordinate) {
        tracing::debug!(%coordinate, refresh, "Fetching weather");
        let outcome = aggregator.fetch_weather(coordinate).await;
        if !outcome.is_complete() {
            eprintln!("{}", output::partial_refresh_warning(&outcome));
        }
    } else {
        tracing::debug!(%coordinate, "Serving cached weather");
    }

    let state = aggregator.state();
    if state.location != Some(coordinate) || state.current.is_none() {
        anyhow::bail!(
            "No weather data available yet for {coordinate}. Check your connection and API key."
        );
    }
    print!("{}", output::render_state(&state, config.units));
    Ok(())
}

fn favorites(config: &Config, cmd: FavoritesCommand) -> Result<()> {
    // Favorites never touch the network, so a missing API key is fine here.
    let source = Arc::new(OpenWeatherSource::from_config(
        config.api_key.clone().unwrap_or_default(),
        config,
    ));
    let aggregator = WeatherAggregator::new(source, open_store(config)?);

    match cmd {
        FavoritesCommand::List => {
            if !aggregator.has_favorites() {
                println!("No favorites yet. Add one with `forecast favorites add <lat> <lon>`.");
            }
            for favorite in aggregator.favorites() {
                println!("{}", favorite.label());
            }
        }
        FavoritesCommand::Add {
            latitude,
            longitude,
            name,
        } => {
            let coordinate = Coordinate::new(latitude, longitude);
            let added = match name {
                Some(name) => aggregator.add_named_favorite(name, coordinate),
                None => aggregator.add_to_favorites(coordinate),
            };
            if added {
                println!("Added {coordinate} to favorites");
            } else {
                println!("{coordinate} is already a favorite");
            }
        }
        FavoritesCommand::Remove {
            latitude,
            longitude,
        } => {
            let coordinate = Coordinate::new(latitude, longitude);
            if aggregator.remove_from_favorites(coordinate) {
                println!("Removed {coordinate} from favorites");
            } else {
                println!("{coordinate} was not a favorite");
            }
        }
    }
    Ok(())
}

fn parse_latitude(raw: &str) -> Result<f64, String> {
    parse_degrees(raw, 90.0)
}

fn parse_longitude(raw: &str) -> Result<f64, String> {
    parse_degrees(raw, 180.0)
}

fn parse_degrees(raw: &str, limit: f64) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
    if (-limit..=limit).contains(&value) {
        Ok(value)
    } else {
        Err(format!("must be a number between -{limit} and {limit}"))
    }
}

fn open_store(config: &Config) -> Result<Arc<FileStore>> {
    Ok(Arc::new(FileStore::open(config.data_dir()?)?))
}
