//! Plain-text rendering of snapshots and updates.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::fmt::Write;
use weather_core::{CurrentConditions, WeatherSnapshot, WeatherUpdate};

fn local(ts: DateTime<Utc>, offset_seconds: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(offset_seconds).unwrap_or(Utc.fix());
    ts.with_timezone(&offset)
}

fn render_current(out: &mut String, current: &CurrentConditions, offset_seconds: i32) {
    let _ = writeln!(
        out,
        "{:.1}°C, {} ({}), observed {}",
        current.temperature_c,
        current.description,
        if current.is_night { "night" } else { "day" },
        local(current.observed_at, offset_seconds).format("%Y-%m-%d %H:%M"),
    );
    let _ = writeln!(
        out,
        "  wind {:.0} km/h, rain {:.1} mm, snow {:.1} mm, sun {}–{}",
        current.wind_speed_kph,
        current.rain_mm,
        current.snow_mm,
        local(current.sunrise, offset_seconds).format("%H:%M"),
        local(current.sunset, offset_seconds).format("%H:%M"),
    );
}

pub fn render_snapshot(snapshot: &WeatherSnapshot) -> String {
    let mut out = String::new();
    let offset = snapshot.timezone_offset_seconds;

    let _ = writeln!(out, "Weather at {}", snapshot.location);
    render_current(&mut out, &snapshot.current, offset);

    for day in &snapshot.daily {
        let _ = writeln!(
            out,
            "  {}  {:>5.1} / {:>5.1}°C  rain {:.1} mm  snow {:.1} mm",
            local(day.date, offset).format("%a %d %b"),
            day.temp_min_c,
            day.temp_max_c,
            day.rain_mm,
            day.snow_mm,
        );
    }

    out
}

pub fn render_update(update: &WeatherUpdate) -> String {
    match update {
        WeatherUpdate::Full(snapshot) => render_snapshot(snapshot),
        WeatherUpdate::Current {
            location,
            timezone_offset_seconds,
            current,
        } => {
            let mut out = format!("No new observation at {location}; current conditions:\n");
            render_current(&mut out, current, *timezone_offset_seconds);
            out
        }
        WeatherUpdate::Failed { location, error } => {
            format!("Could not refresh weather at {location}: {error}\n")
        }
    }
}
