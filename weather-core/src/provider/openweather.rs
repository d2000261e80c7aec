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

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// OpenWeather One Call 3.0 client.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: i32,
    description: String,
    #[serde(default)]
    icon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OwPrecip {
    #[serde(rename = "1h", default)]
    one_hour: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrent {
    dt: i64,
    #[serde(default)]
    sunrise: Option<i64>,
    #[serde(default)]
    sunset: Option<i64>,
    temp: f64,
    /// metres per second with `units=metric`
    wind_speed: f64,
    #[serde(default)]
    weather: Vec<OwWeather>,
    #[serde(default)]
    rain: Option<OwPrecip>,
    #[serde(default)]
    snow: Option<OwPrecip>,
}

#[derive(Debug, Deserialize)]
struct OwDailyTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct OwDaily {
    dt: i64,
    temp: OwDailyTemp,
    wind_speed: f64,
    #[serde(default)]
    rain: Option<f64>,
    #[serde(default)]
    snow: Option<f64>,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwOneCallResponse {
    #[serde(default)]
    timezone_offset: i32,
    current: Option<OwCurrent>,
    #[serde(default)]
    daily: Vec<OwDaily>,
}

fn mps_to_kph(mps: f64) -> f64 {
    mps * 3.6
}

fn unix_to_utc(ts: i64) -> Result<DateTime<Utc>, FetchError> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| FetchError::InvalidData(format!("timestamp out of range: {ts}")))
}

impl OwOneCallResponse {
    fn into_snapshot(self, coordinate: &Coordinate) -> Result<WeatherSnapshot, FetchError> {
        let current = self
            .current
            .ok_or_else(|| FetchError::InvalidData("response has no current conditions".into()))?;

        let condition = current.weather.first().ok_or_else(|| {
            FetchError::InvalidData("current conditions carry no weather entry".into())
        })?;

        let observed_at = unix_to_utc(current.dt)?;
        // polar day/night responses omit sunrise and sunset
        let sunrise = unix_to_utc(current.sunrise.unwrap_or(current.dt))?;
        let sunset = unix_to_utc(current.sunset.unwrap_or(current.dt))?;

        let is_night = match condition.icon.as_deref() {
            Some(icon) if !icon.is_empty() => icon.ends_with('n'),
            _ => observed_at < sunrise || observed_at >= sunset,
        };

        let conditions = CurrentConditions {
            condition_code: condition.id,
            description: condition.description.clone(),
            is_night,
            observed_at,
            sunrise,
            sunset,
            temperature_c: current.temp,
            wind_speed_kph: mps_to_kph(current.wind_speed),
            rain_mm: current.rain.unwrap_or_default().one_hour,
            snow_mm: current.snow.unwrap_or_default().one_hour,
        };

        let daily = self
            .daily
            .into_iter()
            .map(|day| {
                Ok(DailyForecast {
                    date: unix_to_utc(day.dt)?,
                    condition_code: day.weather.first().map_or(0, |w| w.id),
                    temp_min_c: day.temp.min,
                    temp_max_c: day.temp.max,
                    rain_mm: day.rain.unwrap_or(0.0),
                    snow_mm: day.snow.unwrap_or(0.0),
                    wind_speed_kph: mps_to_kph(day.wind_speed),
                })
            })
            .collect::<Result<Vec<_>, FetchError>>()?;

        Ok(WeatherSnapshot::new(
            *coordinate,
            self.timezone_offset,
            conditions,
            daily,
        ))
    }
}

#[async_trait]
impl WeatherFetcher for OpenWeatherProvider {
    async fn fetch(&self, coordinate: &Coordinate) -> Result<WeatherSnapshot, FetchError> {
        let url = format!("{}/data/3.0/onecall", self.base_url.trim_end_matches('/'));
        let lat = coordinate.latitude.to_string();
        let lon = coordinate.longitude.to_string();

        tracing::debug!(%coordinate, "requesting OpenWeather one call");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
                ("exclude", "minutely,hourly,alerts"),
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

        let parsed: OwOneCallResponse = serde_json::from_str(&body)?;
        parsed.into_snapshot(coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<WeatherSnapshot, FetchError> {
        let parsed: OwOneCallResponse = serde_json::from_str(json)?;
        parsed.into_snapshot(&Coordinate::new(51.5, -0.12))
    }

    #[test]
    fn maps_current_and_daily() {
        let snap = parse(
            r#"{
                "timezone_offset": 3600,
                "current": {
                    "dt": 1700000000, "sunrise": 1699990000, "sunset": 1700020000,
                    "temp": 11.2, "wind_speed": 5.0,
                    "weather": [{"id": 501, "description": "moderate rain", "icon": "10d"}],
                    "rain": {"1h": 2.5}
                },
                "daily": [
                    {"dt": 1700092800, "temp": {"min": 4.0, "max": 9.0}, "wind_speed": 2.0,
                     "weather": [{"id": 800, "description": "clear sky", "icon": "01d"}]},
                    {"dt": 1700006400, "temp": {"min": 6.0, "max": 12.0}, "wind_speed": 1.0,
                     "rain": 3.1, "weather": [{"id": 500, "description": "light rain"}]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(snap.timezone_offset_seconds, 3600);
        assert_eq!(snap.current.condition_code, 501);
        assert_eq!(snap.current.observed_at.timestamp(), 1_700_000_000);
        assert!(!snap.current.is_night);
        assert_eq!(snap.current.wind_speed_kph, 18.0);
        assert_eq!(snap.current.rain_mm, 2.5);
        assert_eq!(snap.current.snow_mm, 0.0);

        assert_eq!(snap.daily.len(), 2);
        assert_eq!(snap.daily[0].date.timestamp(), 1_700_006_400);
        assert_eq!(snap.daily[0].rain_mm, 3.1);
        assert_eq!(snap.daily[1].condition_code, 800);
    }

    #[test]
    fn night_icon_sets_is_night() {
        let snap = parse(
            r#"{"current": {"dt": 1700000000, "temp": 1.0, "wind_speed": 0.0,
                "weather": [{"id": 800, "description": "clear sky", "icon": "01n"}]}}"#,
        )
        .unwrap();
        assert!(snap.current.is_night);
    }

    #[test]
    fn missing_current_is_invalid_data() {
        let err = parse(r#"{"timezone_offset": 0, "daily": []}"#).unwrap_err();
        assert!(matches!(err, FetchError::InvalidData(_)));
    }

    #[test]
    fn empty_weather_list_is_invalid_data() {
        let err = parse(
            r#"{"current": {"dt": 1700000000, "temp": 1.0, "wind_speed": 0.0, "weather": []}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::InvalidData(_)));
    }
}
