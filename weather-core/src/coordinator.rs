//! Read-through synchronization of snapshots: store first, provider on miss.

use chrono::{DateTime, Utc};
use std::{fmt::Debug, sync::Arc, time::Duration};

use crate::{
    Coordinate, WeatherSnapshot,
    error::{FetchError, StorageError},
    freshness::{DEFAULT_CACHE_DURATION, is_fresh},
    provider::WeatherFetcher,
    store::{PutOutcome, WeatherRecordStore},
};

/// Source of "now" for freshness decisions.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct WeatherSyncCoordinator {
    store: Arc<dyn WeatherRecordStore>,
    fetcher: Arc<dyn WeatherFetcher>,
    clock: Arc<dyn Clock>,
    cache_duration: Duration,
}

impl WeatherSyncCoordinator {
    pub fn new(store: Arc<dyn WeatherRecordStore>, fetcher: Arc<dyn WeatherFetcher>) -> Self {
        Self {
            store,
            fetcher,
            clock: Arc::new(SystemClock),
            cache_duration: DEFAULT_CACHE_DURATION,
        }
    }

    pub fn with_cache_duration(mut self, cache_duration: Duration) -> Self {
        self.cache_duration = cache_duration;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache_duration(&self) -> Duration {
        self.cache_duration
    }

    /// Serve `coordinate` from the store while fresh, otherwise fetch and persist.
    ///
    /// The fetched snapshot is returned even when the store keeps a newer one.
    /// Fetch failures are returned as-is; stale data is never substituted.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`FetchError`] when a fetch was needed and failed.
    pub async fn load_weather(&self, coordinate: &Coordinate) -> Result<WeatherSnapshot, FetchError> {
        match self.store.get(coordinate).await {
            Ok(Some(cached)) => {
                let now = self.clock.now();
                if is_fresh(cached.current.observed_at, now, self.cache_duration) {
                    tracing::debug!(%coordinate, observed_at = %cached.current.observed_at, "serving cached weather");
                    return Ok(cached);
                }
                tracing::debug!(%coordinate, observed_at = %cached.current.observed_at, "cached weather is stale");
            }
            Ok(None) => tracing::debug!(%coordinate, "no cached weather"),
            Err(err) => {
                tracing::warn!(%coordinate, error = %err, "weather store read failed, fetching instead");
            }
        }

        let snapshot = self.fetcher.fetch(coordinate).await.inspect_err(|err| {
            tracing::warn!(%coordinate, error = %err, "weather fetch failed");
        })?;

        tracing::info!(%coordinate, observed_at = %snapshot.current.observed_at, "fetched weather");

        // The write runs on its own task so it finishes even if this future is dropped.
        let store = Arc::clone(&self.store);
        let key = *coordinate;
        let to_store = snapshot.clone();
        let write = tokio::spawn(async move {
            match store.put(&key, &to_store).await {
                Ok(outcome) => {
                    tracing::debug!(coordinate = %key, ?outcome, "stored fetched weather");
                }
                Err(err) => {
                    tracing::warn!(coordinate = %key, error = %err, "failed to store fetched weather");
                }
            }
        });

        if let Err(err) = write.await {
            tracing::warn!(%coordinate, error = %err, "weather store task did not complete");
        }

        Ok(snapshot)
    }

    /// Write `snapshot` and report the outcome, including storage failures.
    ///
    /// # Errors
    ///
    /// Returns the store's [`StorageError`].
    pub async fn persist(&self, snapshot: &WeatherSnapshot) -> Result<PutOutcome, StorageError> {
        self.store.put(&snapshot.location, snapshot).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    pub struct FixedClock(pub Mutex<DateTime<Utc>>);

    impl FixedClock {
        pub fn at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(now)))
        }

        pub fn set(&self, now: DateTime<Utc>) {
            *self.0.lock() = now;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }

    /// Replays queued responses in order and counts calls.
    #[derive(Debug, Default)]
    pub struct ScriptedFetcher {
        responses: Mutex<Vec<Result<WeatherSnapshot, FetchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        pub fn new(responses: Vec<Result<WeatherSnapshot, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherFetcher for ScriptedFetcher {
        async fn fetch(&self, _coordinate: &Coordinate) -> Result<WeatherSnapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Err(FetchError::Network("no scripted response".into()));
            }
            responses.remove(0)
        }
    }

    /// Store whose reads always fail.
    #[derive(Debug, Default)]
    pub struct BrokenReadStore {
        pub inner: crate::store::MemoryWeatherStore,
    }

    #[async_trait]
    impl WeatherRecordStore for BrokenReadStore {
        async fn get(&self, _coordinate: &Coordinate) -> Result<Option<WeatherSnapshot>, StorageError> {
            Err(StorageError::Corrupt("disk on fire".into()))
        }

        async fn put(
            &self,
            coordinate: &Coordinate,
            snapshot: &WeatherSnapshot,
        ) -> Result<PutOutcome, StorageError> {
            self.inner.put(coordinate, snapshot).await
        }
    }
}
