//! Open-Meteo forecast client. Needs no API key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    Coordinate, CurrentConditions, DailyForecast, WeatherSnapshot,
    error::FetchError,
    provider::{HTTP_TIMEOUT, truncate_body},
};

use super::WeatherFetcher;

const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

const CURRENT_FIELDS: &str = "temperature_2m,weather_code,is_day,rain,snowfall,wind_speed_10m";
const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,rain_sum,\
                            snowfall_sum,wind_speed_10m_max,sunrise,sunset";

#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    base_url: String,
    http: Client,
}

impl OpenMeteoProvider {
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for OpenMeteoProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Short description for a WMO weather interpretation code.
/// See: https://open-meteo.com/en/docs#weathervariables
pub fn wmo_description(code: i32) -> &'static str {
    match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 | 48 => "fog",
        51 | 53 | 55 => "drizzle",
        56 | 57 => "freezing drizzle",
        61 | 63 => "rain",
        65 => "heavy rain",
        66 | 67 => "freezing rain",
        71 | 73 | 75 | 77 => "snow",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95 => "thunderstorm",
        96 | 99 => "thunderstorm with hail",
        _ => "unknown",
    }
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    time: i64,
    temperature_2m: f64,
    weather_code: i32,
    is_day: u8,
    #[serde(default)]
    rain: Option<f64>,
    /// centimetres
    #[serde(default)]
    snowfall: Option<f64>,
    wind_speed_10m: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OmDaily {
    #[serde(default)]
    time: Vec<i64>,
    #[serde(default)]
    weather_code: Vec<Option<i32>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    rain_sum: Vec<Option<f64>>,
    /// centimetres
    #[serde(default)]
    snowfall_sum: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    sunrise: Vec<i64>,
    #[serde(default)]
    sunset: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct OmForecastResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    current: Option<OmCurrent>,
    #[serde(default)]
    daily: OmDaily,
}

fn unix_to_utc(ts: i64) -> Result<DateTime<Utc>, FetchError> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| FetchError::InvalidData(format!("timestamp out of range: {ts}")))
}

fn cm_to_mm(cm: f64) -> f64 {
    cm * 10.0
}

fn nth<T: Copy>(values: &[Option<T>], i: usize) -> Option<T> {
    values.get(i).copied().flatten()
}

impl OmForecastResponse {
    fn into_snapshot(self, coordinate: &Coordinate) -> Result<WeatherSnapshot, FetchError> {
        let current = self
            .current
            .ok_or_else(|| FetchError::InvalidData("response has no current conditions".into()))?;

        let daily = self.daily;
        if daily.time.is_empty() {
            return Err(FetchError::InvalidData("response has no daily forecast".into()));
        }
        let (Some(&sunrise), Some(&sunset)) = (daily.sunrise.first(), daily.sunset.first()) else {
            return Err(FetchError::InvalidData(
                "response has no sunrise/sunset for today".into(),
            ));
        };

        let conditions = CurrentConditions {
            condition_code: current.weather_code,
            description: wmo_description(current.weather_code).to_string(),
            is_night: current.is_day == 0,
            observed_at: unix_to_utc(current.time)?,
            sunrise: unix_to_utc(sunrise)?,
            sunset: unix_to_utc(sunset)?,
            temperature_c: current.temperature_2m,
            wind_speed_kph: current.wind_speed_10m,
            rain_mm: current.rain.unwrap_or(0.0),
            snow_mm: cm_to_mm(current.snowfall.unwrap_or(0.0)),
        };

        let mut days = Vec::with_capacity(daily.time.len());
        for (i, &date) in daily.time.iter().enumerate() {
            // a day without temperatures is not worth showing
            let (Some(max), Some(min)) = (
                nth(&daily.temperature_2m_max, i),
                nth(&daily.temperature_2m_min, i),
            ) else {
                tracing::debug!(date, "skipping Open-Meteo day without temperatures");
                continue;
            };

            days.push(DailyForecast {
                date: unix_to_utc(date)?,
                condition_code: nth(&daily.weather_code, i).unwrap_or(0),
                temp_min_c: min,
                temp_max_c: max,
                rain_mm: nth(&daily.rain_sum, i).unwrap_or(0.0),
                snow_mm: cm_to_mm(nth(&daily.snowfall_sum, i).unwrap_or(0.0)),
                wind_speed_kph: nth(&daily.wind_speed_10m_max, i).unwrap_or(0.0),
            });
        }

        Ok(WeatherSnapshot::new(
            *coordinate,
            self.utc_offset_seconds,
            conditions,
            days,
        ))
    }
}

#[async_trait]
impl WeatherFetcher for OpenMeteoProvider {
    async fn fetch(&self, coordinate: &Coordinate) -> Result<WeatherSnapshot, FetchError> {
        let url = format!("{}/v1/forecast", self.base_url.trim_end_matches('/'));
        let lat = coordinate.latitude.to_string();
        let lon = coordinate.longitude.to_string();

        tracing::debug!(%coordinate, "requesting Open-Meteo forecast");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("latitude", lat.as_str()),
                ("longitude", lon.as_str()),
                ("current", CURRENT_FIELDS),
                ("daily", DAILY_FIELDS),
                ("timezone", "auto"),
                ("timeformat", "unixtime"),
                ("wind_speed_unit", "kmh"),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: OmForecastResponse = serde_json::from_str(&body)?;
        parsed.into_snapshot(coordinate)
    }
}
