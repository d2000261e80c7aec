use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default tolerance, in degrees, for treating two coordinates as the same place (~11m).
pub const DEFAULT_COORDINATE_EPSILON: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// True when both axes differ by less than `epsilon`.
    ///
    /// Stored records are always looked up through this, never through `==`.
    pub fn matches(&self, other: &Coordinate, epsilon: f64) -> bool {
        (self.latitude - other.latitude).abs() < epsilon
            && (self.longitude - other.longitude).abs() < epsilon
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4},{:.4}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub condition_code: i32,
    pub description: String,
    pub is_night: bool,
    /// Server-side report time. This, not the local fetch time, decides freshness and change.
    pub observed_at: DateTime<Utc>,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
    pub temperature_c: f64,
    pub wind_speed_kph: f64,
    pub rain_mm: f64,
    pub snow_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: DateTime<Utc>,
    pub condition_code: i32,
    pub temp_min_c: f64,
    pub temp_max_c: f64,
    pub rain_mm: f64,
    pub snow_mm: f64,
    pub wind_speed_kph: f64,
}

/// Complete weather record for one coordinate at one observation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location: Coordinate,
    pub timezone_offset_seconds: i32,
    pub current: CurrentConditions,
    /// Ascending by `date`, no duplicate dates.
    pub daily: Vec<DailyForecast>,
}

impl WeatherSnapshot {
    pub fn new(
        location: Coordinate,
        timezone_offset_seconds: i32,
        current: CurrentConditions,
        daily: Vec<DailyForecast>,
    ) -> Self {
        Self {
            location,
            timezone_offset_seconds,
            current,
            daily: normalize_daily(daily),
        }
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.current.observed_at
    }
}

/// Sort by date and keep the first entry for any repeated date.
pub fn normalize_daily(mut daily: Vec<DailyForecast>) -> Vec<DailyForecast> {
    // stable sort keeps provider order among equal dates
    daily.sort_by_key(|d| d.date);
    daily.dedup_by_key(|d| d.date);
    daily
}

/// What a session hands to its host after a sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherUpdate {
    /// New observation: re-render everything.
    Full(WeatherSnapshot),
    /// Same observation as last shown: only current conditions may be re-surfaced.
    Current {
        location: Coordinate,
        timezone_offset_seconds: i32,
        current: CurrentConditions,
    },
    Failed {
        location: Coordinate,
        error: String,
    },
}
