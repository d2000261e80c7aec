use chrono::{DateTime, Utc};

use crate::model::WeatherSnapshot;

/// How an incoming snapshot relates to what is already on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Same server observation as last shown; re-surface current conditions only.
    Unchanged,
    /// New observation; surface everything and persist.
    Updated,
}

/// Compare server timestamps exactly. `None` means nothing has been shown yet.
pub fn classify(snapshot: &WeatherSnapshot, last_known_observed_at: Option<DateTime<Utc>>) -> Change {
    match last_known_observed_at {
        Some(last) if last == snapshot.current.observed_at => Change::Unchanged,
        _ => Change::Updated,
    }
}
