//! SQLite-backed record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::{path::Path, sync::Arc};

use super::{PutOutcome, WeatherRecordStore};
use crate::{
    Coordinate, CurrentConditions, DailyForecast, WeatherSnapshot, error::StorageError,
    model::normalize_daily,
};

/// Bumped whenever the table layout changes. Older caches are dropped and rebuilt.
const SCHEMA_VERSION: i32 = 2;

const MATCH_CLAUSE: &str = "abs(latitude - ?1) < ?3 AND abs(longitude - ?2) < ?3";

/// Snapshots persisted in two tables: one row per location plus its daily rows.
///
/// All access goes through one connection behind a mutex, so a `put` is a
/// single critical section from lookup to commit.
#[derive(Debug, Clone)]
pub struct SqliteWeatherStore {
    conn: Arc<Mutex<Connection>>,
    epsilon: f64,
}

impl SqliteWeatherStore {
    /// Open (or create) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P, epsilon: f64) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open(path)?, epsilon)
    }

    pub fn in_memory(epsilon: f64) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?, epsilon)
    }

    fn from_connection(conn: Connection, epsilon: f64) -> Result<Self, StorageError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            epsilon,
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await?
    }
}

fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.pragma_update(None, "foreign_keys", true)?;

    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version != SCHEMA_VERSION {
        tracing::debug!(from = version, to = SCHEMA_VERSION, "rebuilding weather cache schema");
        conn.execute_batch(
            "DROP TABLE IF EXISTS daily_forecasts;
             DROP TABLE IF EXISTS weather_records;",
        )?;
    }

    // timestamps are nanoseconds since the Unix epoch
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS weather_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            timezone_offset INTEGER NOT NULL,
            condition_code INTEGER NOT NULL,
            description TEXT NOT NULL,
            is_night INTEGER NOT NULL,
            observed_at INTEGER NOT NULL,
            sunrise INTEGER NOT NULL,
            sunset INTEGER NOT NULL,
            temperature_c REAL NOT NULL,
            wind_speed_kph REAL NOT NULL,
            rain_mm REAL NOT NULL,
            snow_mm REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS daily_forecasts (
            record_id INTEGER NOT NULL REFERENCES weather_records(id) ON DELETE CASCADE,
            date INTEGER NOT NULL,
            condition_code INTEGER NOT NULL,
            temp_min_c REAL NOT NULL,
            temp_max_c REAL NOT NULL,
            rain_mm REAL NOT NULL,
            snow_mm REAL NOT NULL,
            wind_speed_kph REAL NOT NULL,
            PRIMARY KEY (record_id, date)
        );

        CREATE INDEX IF NOT EXISTS idx_weather_records_position
            ON weather_records(latitude, longitude);
        "#,
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn to_nanos(ts: DateTime<Utc>) -> Result<i64, StorageError> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| StorageError::Unrepresentable(format!("timestamp out of range: {ts}")))
}

fn to_utc(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

struct RecordRow {
    id: i64,
    latitude: f64,
    longitude: f64,
    timezone_offset: i32,
    condition_code: i32,
    description: String,
    is_night: bool,
    observed_at: i64,
    sunrise: i64,
    sunset: i64,
    temperature_c: f64,
    wind_speed_kph: f64,
    rain_mm: f64,
    snow_mm: f64,
}

impl RecordRow {
    fn into_snapshot(self, daily: Vec<DailyForecast>) -> WeatherSnapshot {
        let current = CurrentConditions {
            condition_code: self.condition_code,
            description: self.description,
            is_night: self.is_night,
            observed_at: to_utc(self.observed_at),
            sunrise: to_utc(self.sunrise),
            sunset: to_utc(self.sunset),
            temperature_c: self.temperature_c,
            wind_speed_kph: self.wind_speed_kph,
            rain_mm: self.rain_mm,
            snow_mm: self.snow_mm,
        };

        WeatherSnapshot::new(
            Coordinate::new(self.latitude, self.longitude),
            self.timezone_offset,
            current,
            daily,
        )
    }
}

fn find_record(
    conn: &Connection,
    coordinate: &Coordinate,
    epsilon: f64,
) -> Result<Option<WeatherSnapshot>, StorageError> {
    let sql = format!(
        "SELECT id, latitude, longitude, timezone_offset, condition_code, description, is_night,
                observed_at, sunrise, sunset, temperature_c, wind_speed_kph, rain_mm, snow_mm
         FROM weather_records WHERE {MATCH_CLAUSE} ORDER BY id LIMIT 1"
    );

    let row = conn
        .query_row(
            &sql,
            params![coordinate.latitude, coordinate.longitude, epsilon],
            |row| {
                Ok(RecordRow {
                    id: row.get(0)?,
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                    timezone_offset: row.get(3)?,
                    condition_code: row.get(4)?,
                    description: row.get(5)?,
                    is_night: row.get::<_, i32>(6)? != 0,
                    observed_at: row.get(7)?,
                    sunrise: row.get(8)?,
                    sunset: row.get(9)?,
                    temperature_c: row.get(10)?,
                    wind_speed_kph: row.get(11)?,
                    rain_mm: row.get(12)?,
                    snow_mm: row.get(13)?,
                })
            },
        )
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT date, condition_code, temp_min_c, temp_max_c, rain_mm, snow_mm, wind_speed_kph
         FROM daily_forecasts WHERE record_id = ?1 ORDER BY date ASC",
    )?;

    let daily = stmt
        .query_map(params![row.id], |r| {
            Ok(DailyForecast {
                date: to_utc(r.get(0)?),
                condition_code: r.get(1)?,
                temp_min_c: r.get(2)?,
                temp_max_c: r.get(3)?,
                rain_mm: r.get(4)?,
                snow_mm: r.get(5)?,
                wind_speed_kph: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(row.into_snapshot(daily)))
}

fn upsert_record(
    conn: &mut Connection,
    coordinate: &Coordinate,
    snapshot: &WeatherSnapshot,
    epsilon: f64,
) -> Result<PutOutcome, StorageError> {
    let tx = conn.transaction()?;
    let current = &snapshot.current;
    let observed_at = to_nanos(current.observed_at)?;
    let sunrise = to_nanos(current.sunrise)?;
    let sunset = to_nanos(current.sunset)?;

    let existing: Option<(i64, i64)> = tx
        .query_row(
            &format!(
                "SELECT id, observed_at FROM weather_records WHERE {MATCH_CLAUSE} ORDER BY id LIMIT 1"
            ),
            params![coordinate.latitude, coordinate.longitude, epsilon],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (record_id, outcome) = match existing {
        // dropping the transaction rolls back the read-only lookup
        Some((_, stored)) if observed_at <= stored => return Ok(PutOutcome::Stale),
        Some((id, _)) => {
            tx.execute(
                "UPDATE weather_records SET
                    timezone_offset = ?2, condition_code = ?3, description = ?4, is_night = ?5,
                    observed_at = ?6, sunrise = ?7, sunset = ?8, temperature_c = ?9,
                    wind_speed_kph = ?10, rain_mm = ?11, snow_mm = ?12
                 WHERE id = ?1",
                params![
                    id,
                    snapshot.timezone_offset_seconds,
                    current.condition_code,
                    current.description,
                    current.is_night as i32,
                    observed_at,
                    sunrise,
                    sunset,
                    current.temperature_c,
                    current.wind_speed_kph,
                    current.rain_mm,
                    current.snow_mm,
                ],
            )?;
            tx.execute("DELETE FROM daily_forecasts WHERE record_id = ?1", params![id])?;
            (id, PutOutcome::Updated)
        }
        None => {
            tx.execute(
                "INSERT INTO weather_records
                    (latitude, longitude, timezone_offset, condition_code, description, is_night,
                     observed_at, sunrise, sunset, temperature_c, wind_speed_kph, rain_mm, snow_mm)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    coordinate.latitude,
                    coordinate.longitude,
                    snapshot.timezone_offset_seconds,
                    current.condition_code,
                    current.description,
                    current.is_night as i32,
                    observed_at,
                    sunrise,
                    sunset,
                    current.temperature_c,
                    current.wind_speed_kph,
                    current.rain_mm,
                    current.snow_mm,
                ],
            )?;
            (tx.last_insert_rowid(), PutOutcome::Inserted)
        }
    };

    {
        let mut stmt = tx.prepare(
            "INSERT INTO daily_forecasts
                (record_id, date, condition_code, temp_min_c, temp_max_c, rain_mm, snow_mm, wind_speed_kph)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;

        for day in normalize_daily(snapshot.daily.clone()) {
            stmt.execute(params![
                record_id,
                to_nanos(day.date)?,
                day.condition_code,
                day.temp_min_c,
                day.temp_max_c,
                day.rain_mm,
                day.snow_mm,
                day.wind_speed_kph,
            ])?;
        }
    }

    tx.commit()?;
    Ok(outcome)
}

#[async_trait]
impl WeatherRecordStore for SqliteWeatherStore {
    async fn get(&self, coordinate: &Coordinate) -> Result<Option<WeatherSnapshot>, StorageError> {
        let coordinate = *coordinate;
        let epsilon = self.epsilon;
        self.with_conn(move |conn| find_record(conn, &coordinate, epsilon))
            .await
    }

    async fn put(
        &self,
        coordinate: &Coordinate,
        snapshot: &WeatherSnapshot,
    ) -> Result<PutOutcome, StorageError> {
        let coordinate = *coordinate;
        let snapshot = snapshot.clone();
        let epsilon = self.epsilon;
        self.with_conn(move |conn| upsert_record(conn, &coordinate, &snapshot, epsilon))
            .await
    }
}
