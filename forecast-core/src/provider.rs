use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    Config,
    error::FetchError,
    model::{Coordinate, HourlyFeed, OneCallResponse},
};

pub mod openweather;

pub use openweather::OpenWeatherSource;

/// The two feeds the aggregator merges.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    /// Current conditions plus the daily forecast, today first.
    async fn one_call(&self, coordinate: Coordinate) -> Result<OneCallResponse, FetchError>;

    /// The 3-hourly forecast feed.
    async fn hourly(&self, coordinate: Coordinate) -> Result<HourlyFeed, FetchError>;
}

/// Construct the OpenWeather source from config.
pub fn source_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherSource>> {
    let api_key = config.api_key()?;
    Ok(Box::new(OpenWeatherSource::from_config(api_key.to_owned(), config)))
}
