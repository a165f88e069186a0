//! Plain-text rendering of the published weather state.

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};
use forecast_core::{FetchOutcome, Units, WeatherCondition, WeatherState};

/// How many hourly entries to print.
const HOURLY_LIMIT: usize = 8;

pub fn render_state(state: &WeatherState, units: Units) -> String {
    let t = units.temperature_suffix();
    let mut out = String::new();

    if let Some(current) = &state.current {
        let _ = writeln!(
            out,
            "Now: {:.1}{t} (feels like {:.1}{t}), {}",
            current.temperature,
            current.feels_like,
            describe(current.weather.first()),
        );
        let _ = writeln!(
            out,
            "  Humidity {}%  Pressure {} hPa  Clouds {}%  UV {:.1}  Wind {:.1} {} from {}°",
            current.humidity,
            current.pressure,
            current.cloud_cover,
            current.uv_index,
            current.wind_speed,
            wind_unit(units),
            current.wind_direction,
        );
        let _ = writeln!(
            out,
            "  Sunrise {}  Sunset {}",
            local_time(current.sunrise, "%H:%M"),
            local_time(current.sunset, "%H:%M"),
        );
    }

    if !state.forecast.is_empty() {
        let _ = writeln!(out, "\nNext days:");
        for day in &state.forecast {
            let _ = writeln!(
                out,
                "  {}  {:>6.1}{t} / {:>6.1}{t}  {:>3.0}% rain  {}",
                local_time(day.timestamp, "%a %d %b"),
                day.temperature.max,
                day.temperature.min,
                day.precipitation_probability * 100.0,
                describe(day.weather.first()),
            );
        }
    }

    if !state.hourly.is_empty() {
        let _ = writeln!(out, "\nNext hours:");
        for hour in state.hourly.iter().take(HOURLY_LIMIT) {
            let _ = writeln!(
                out,
                "  {}  {:>6.1}{t}  {}",
                hour.time.with_timezone(&Local).format("%a %H:%M"),
                hour.temperature,
                describe(Some(&hour.weather)),
            );
        }
    }

    if let Some(updated) = state.last_updated {
        let updated = updated.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let _ = writeln!(out, "\nUpdated {updated}");
    }

    out
}

pub fn partial_refresh_warning(outcome: &FetchOutcome) -> String {
    match (outcome.one_call, outcome.hourly) {
        (false, false) => "Could not refresh the forecast, showing cached data if any.".to_string(),
        (false, true) => "Could not refresh current conditions, showing cached data.".to_string(),
        (true, false) => "Could not refresh the hourly forecast, showing cached data.".to_string(),
        (true, true) => String::new(),
    }
}

fn describe(condition: Option<&WeatherCondition>) -> String {
    match condition {
        Some(c) if !c.description.is_empty() => c.description.clone(),
        Some(c) => c.main.clone(),
        None => "unknown".to_string(),
    }
}

fn wind_unit(units: Units) -> &'static str {
    match units {
        Units::Imperial => "mph",
        Units::Metric | Units::Standard => "m/s",
    }
}

fn local_time(epoch: i64, fmt: &str) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|dt| dt.with_timezone(&Local).format(fmt).to_string())
        .unwrap_or_else(|| "-".to_string())
}
