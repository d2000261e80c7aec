//! The caller-facing side of a sync cycle: which location is on screen, what
//! was last shown for it, and what the host should re-render next.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::{
    Coordinate, WeatherSnapshot, WeatherUpdate,
    change::{Change, classify},
    coordinator::WeatherSyncCoordinator,
    error::FetchError,
    scheduler::RefreshTarget,
};

/// The single displayed location and the server timestamp last shown for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveLocationState {
    pub coordinate: Coordinate,
    pub last_observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct WeatherSession {
    coordinator: WeatherSyncCoordinator,
    active: RwLock<Option<ActiveLocationState>>,
    updates: mpsc::UnboundedSender<WeatherUpdate>,
}

impl WeatherSession {
    /// Returns the session and the receiving end of its update stream.
    pub fn new(coordinator: WeatherSyncCoordinator) -> (Self, mpsc::UnboundedReceiver<WeatherUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let session = Self {
            coordinator,
            active: RwLock::new(None),
            updates,
        };
        (session, rx)
    }

    pub fn coordinator(&self) -> &WeatherSyncCoordinator {
        &self.coordinator
    }

    pub fn active(&self) -> Option<ActiveLocationState> {
        *self.active.read()
    }

    /// Switch the displayed location. The next refresh re-renders everything.
    pub fn select_location(&self, coordinate: Coordinate) {
        tracing::info!(%coordinate, "active location changed");
        *self.active.write() = Some(ActiveLocationState {
            coordinate,
            last_observed_at: None,
        });
    }

    pub fn clear_location(&self) {
        *self.active.write() = None;
    }

    /// Run one sync cycle for the active location and emit the result.
    ///
    /// Returns `Ok(None)` when there is nothing to refresh, or when the active
    /// location changed while the load was in flight.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of a failed load, after emitting it as
    /// [`WeatherUpdate::Failed`].
    pub async fn refresh(&self) -> Result<Option<Change>, FetchError> {
        let Some(target) = self.active() else {
            tracing::trace!("refresh skipped, no active location");
            return Ok(None);
        };

        let result = self.coordinator.load_weather(&target.coordinate).await;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                if self.is_still_active(&target.coordinate) {
                    self.emit(WeatherUpdate::Failed {
                        location: target.coordinate,
                        error: err.to_string(),
                    });
                }
                return Err(err);
            }
        };

        Ok(self.apply(target.coordinate, snapshot))
    }

    fn is_still_active(&self, coordinate: &Coordinate) -> bool {
        matches!(*self.active.read(), Some(state) if state.coordinate == *coordinate)
    }

    fn apply(&self, coordinate: Coordinate, snapshot: WeatherSnapshot) -> Option<Change> {
        // classify and advance under one lock so overlapping refreshes agree
        let change = {
            let mut active = self.active.write();
            let state = match active.as_mut() {
                Some(state) if state.coordinate == coordinate => state,
                _ => {
                    tracing::debug!(%coordinate, "dropping result for a location no longer shown");
                    return None;
                }
            };

            let change = classify(&snapshot, state.last_observed_at);
            if change == Change::Updated {
                state.last_observed_at = Some(snapshot.current.observed_at);
            }
            change
        };

        match change {
            Change::Unchanged => self.emit(WeatherUpdate::Current {
                location: coordinate,
                timezone_offset_seconds: snapshot.timezone_offset_seconds,
                current: snapshot.current,
            }),
            Change::Updated => self.emit(WeatherUpdate::Full(snapshot)),
        }

        Some(change)
    }

    fn emit(&self, update: WeatherUpdate) {
        if self.updates.send(update).is_err() {
            tracing::debug!("weather update dropped, receiver is gone");
        }
    }
}

#[async_trait]
impl RefreshTarget for WeatherSession {
    async fn refresh_active(&self) {
        // failures were already emitted to the host
        let _ = self.refresh().await;
    }
}
