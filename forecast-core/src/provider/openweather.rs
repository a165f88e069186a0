use async_trait::async_trait;
use reqwest::Url;

use crate::{
    Config,
    config::{DEFAULT_FORECAST_URL, DEFAULT_ONE_CALL_URL, Units},
    error::FetchError,
    fetch::HttpFetcher,
    model::{Coordinate, HourlyFeed, OneCallResponse},
};

use super::WeatherSource;

const ONE_CALL_EXCLUDE: &str = "minutely,hourly,alerts";

#[derive(Debug, Clone)]
pub struct OpenWeatherSource {
    api_key: String,
    units: Units,
    one_call_url: String,
    forecast_url: String,
    http: HttpFetcher,
}

impl OpenWeatherSource {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            units: Units::default(),
            one_call_url: DEFAULT_ONE_CALL_URL.to_string(),
            forecast_url: DEFAULT_FORECAST_URL.to_string(),
            http: HttpFetcher::default(),
        }
    }

    pub fn from_config(api_key: String, config: &Config) -> Self {
        Self {
            api_key,
            units: config.units,
            one_call_url: config.one_call_url.clone(),
            forecast_url: config.forecast_url.clone(),
            http: HttpFetcher::new(config.request_timeout()),
        }
    }

    fn one_call_url(&self, coordinate: Coordinate) -> Result<Url, FetchError> {
        let (lat, lon) = (coordinate.latitude.to_string(), coordinate.longitude.to_string());
        build_url(
            &self.one_call_url,
            &[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
                ("exclude", ONE_CALL_EXCLUDE),
            ],
        )
    }

    fn forecast_url(&self, coordinate: Coordinate) -> Result<Url, FetchError> {
        let (lat, lon) = (coordinate.latitude.to_string(), coordinate.longitude.to_string());
        build_url(
            &self.forecast_url,
            &[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
            ],
        )
    }
}

/// Append `params` to `base`, percent-encoding every value.
fn build_url(base: &str, params: &[(&str, &str)]) -> Result<Url, FetchError> {
    Url::parse_with_params(base, params).map_err(|e| FetchError::InvalidUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl WeatherSource for OpenWeatherSource {
    async fn one_call(&self, coordinate: Coordinate) -> Result<OneCallResponse, FetchError> {
        let url = self.one_call_url(coordinate)?;
        self.http.fetch(url.as_str()).await
    }

    async fn hourly(&self, coordinate: Coordinate) -> Result<HourlyFeed, FetchError> {
        let url = self.forecast_url(coordinate)?;
        self.http.fetch(url.as_str()).await
    }
}
