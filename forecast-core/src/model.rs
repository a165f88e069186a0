use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoordinateError;

/// A point on the globe, in degrees.
///
/// Two coordinates are equal when latitude and longitude are equal; this is
/// the identity used for favorites.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Checked constructor for coordinates that come from user input.
    pub fn try_new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        let coordinate = Self::new(latitude, longitude);
        if coordinate.is_valid() {
            Ok(coordinate)
        } else {
            Err(CoordinateError {
                latitude,
                longitude,
            })
        }
    }

    /// Finite, with latitude in [-90, 90] and longitude in [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// A single reading from the location provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub coordinate: Coordinate,
    pub altitude: f64,
    /// Radius of uncertainty in meters. Negative means the reading is invalid.
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
    pub course: f64,
    pub speed: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    /// A reading with only a position and an accuracy; everything else is unknown.
    pub fn at(coordinate: Coordinate, horizontal_accuracy: f64) -> Self {
        Self {
            coordinate,
            altitude: 0.0,
            horizontal_accuracy,
            vertical_accuracy: -1.0,
            course: -1.0,
            speed: -1.0,
            timestamp: Utc::now(),
        }
    }
}

impl From<&LocationSample> for Coordinate {
    fn from(sample: &LocationSample) -> Self {
        sample.coordinate
    }
}

impl From<LocationSample> for Coordinate {
    fn from(sample: LocationSample) -> Self {
        sample.coordinate
    }
}

/// One weather condition as reported by the API (`weather[]` items).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub id: i32,
    /// Short category, e.g. "Rain".
    pub main: String,
    pub description: String,
    /// Icon key, e.g. "10d".
    pub icon: String,
}

impl WeatherCondition {
    /// Placeholder used when the API returns an empty condition list.
    pub fn unknown() -> Self {
        Self {
            id: 0,
            main: "Unknown".to_string(),
            description: "Unknown".to_string(),
            icon: "01d".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    #[serde(rename = "dt")]
    pub timestamp: i64,
    pub sunrise: i64,
    pub sunset: i64,
    #[serde(rename = "temp")]
    pub temperature: f64,
    pub feels_like: f64,
    pub pressure: u32,
    pub humidity: u8,
    pub dew_point: f64,
    #[serde(rename = "uvi")]
    pub uv_index: f64,
    #[serde(rename = "clouds")]
    pub cloud_cover: u8,
    /// Meters. Not reported by every station.
    #[serde(default)]
    pub visibility: Option<u32>,
    pub wind_speed: f64,
    #[serde(rename = "wind_deg")]
    pub wind_direction: u16,
    pub weather: Vec<WeatherCondition>,
}

/// Temperature profile across one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTemperature {
    pub day: f64,
    pub min: f64,
    pub max: f64,
    pub night: f64,
    #[serde(rename = "eve")]
    pub evening: f64,
    #[serde(rename = "morn")]
    pub morning: f64,
}

/// Feels-like profile across one day. The API has no min/max for this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyFeelsLike {
    pub day: f64,
    pub night: f64,
    #[serde(rename = "eve")]
    pub evening: f64,
    #[serde(rename = "morn")]
    pub morning: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecastEntry {
    #[serde(rename = "dt")]
    pub timestamp: i64,
    pub sunrise: i64,
    pub sunset: i64,
    #[serde(rename = "temp")]
    pub temperature: DailyTemperature,
    pub feels_like: DailyFeelsLike,
    pub pressure: u32,
    pub humidity: u8,
    pub dew_point: f64,
    #[serde(rename = "uvi")]
    pub uv_index: f64,
    #[serde(rename = "clouds")]
    pub cloud_cover: u8,
    pub wind_speed: f64,
    #[serde(rename = "wind_deg")]
    pub wind_direction: u16,
    #[serde(default)]
    pub wind_gust: Option<f64>,
    /// Probability of precipitation, 0.0 to 1.0.
    #[serde(rename = "pop")]
    pub precipitation_probability: f64,
    pub weather: Vec<WeatherCondition>,
}

/// Body of the one-call endpoint (`exclude=minutely,hourly,alerts`).
#[derive(Debug, Clone, Deserialize)]
pub struct OneCallResponse {
    pub current: CurrentConditions,
    pub daily: Vec<DailyForecastEntry>,
}

/// Body of the 3-hourly forecast endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct HourlyFeed {
    pub list: Vec<HourlyItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlyItem {
    pub dt: i64,
    pub main: HourlyMain,
    pub weather: Vec<WeatherCondition>,
    pub wind: HourlyWind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlyMain {
    pub temp: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlyWind {
    pub speed: f64,
    pub deg: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecastEntry {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub weather: WeatherCondition,
}

impl From<&HourlyItem> for HourlyForecastEntry {
    fn from(item: &HourlyItem) -> Self {
        Self {
            time: DateTime::from_timestamp(item.dt, 0).unwrap_or_default(),
            temperature: item.main.temp,
            weather: item
                .weather
                .first()
                .cloned()
                .unwrap_or_else(WeatherCondition::unknown),
        }
    }
}

/// Drop the first daily entry, which describes today and duplicates the
/// current conditions. Fewer than two entries yield an empty list.
pub fn upcoming_days(daily: &[DailyForecastEntry]) -> Vec<DailyForecastEntry> {
    if daily.len() < 2 {
        return Vec::new();
    }
    daily[1..].to_vec()
}

/// Everything persisted after a successful refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    /// Where the weather was fetched for.
    pub location: Coordinate,
    pub current: CurrentConditions,
    pub forecast: Vec<DailyForecastEntry>,
    pub hourly: Vec<HourlyForecastEntry>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteLocation {
    pub name: Option<String>,
    pub coordinate: Coordinate,
    pub last_updated: DateTime<Utc>,
}

impl FavoriteLocation {
    pub fn new(name: Option<String>, coordinate: Coordinate) -> Self {
        Self {
            name,
            coordinate,
            last_updated: Utc::now(),
        }
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} ({})", self.coordinate),
            None => self.coordinate.to_string(),
        }
    }
}
