//! Core library for the `forecast` client.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - A typed HTTP fetch client and the OpenWeather source built on it
//! - The weather aggregator: two-feed merge, freshness policy, offline cache, favorites
//! - The location acquisition engine and its async session driver
//!
//! It is used by `forecast-cli`, but can also back any other front end that
//! supplies coordinates and renders the published state.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod fetch;
pub mod location;
pub mod model;
pub mod provider;
pub mod store;

pub use aggregator::{FetchOutcome, WeatherAggregator, WeatherState};
pub use config::{Config, Units};
pub use error::{CoordinateError, FetchError, LocationError};
pub use fetch::HttpFetcher;
pub use location::{LocationEngine, LocationProvider, LocationSession, LocationState};
pub use model::{
    Coordinate, CurrentConditions, DailyForecastEntry, FavoriteLocation, ForecastSnapshot,
    HourlyForecastEntry, LocationSample, WeatherCondition,
};
pub use provider::{OpenWeatherSource, WeatherSource};
pub use store::{FileStore, KeyValueStore, MemoryStore};
