use async_trait::async_trait;
use std::fmt::Debug;

use crate::{Coordinate, WeatherSnapshot, error::StorageError};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryWeatherStore;
pub use sqlite::SqliteWeatherStore;

/// Which branch a `put` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Updated,
    /// The stored record was at least as new; nothing was written.
    Stale,
}

/// Persistent snapshots keyed by approximate coordinate.
///
/// Implementations must serialize writes that hit the same record so that the
/// newer-timestamp check and the write happen atomically.
#[async_trait]
pub trait WeatherRecordStore: Send + Sync + Debug {
    /// Epsilon-match lookup. With several matches the first one found wins.
    async fn get(&self, coordinate: &Coordinate) -> Result<Option<WeatherSnapshot>, StorageError>;

    /// Upsert, accepted only when `snapshot.current.observed_at` is strictly
    /// newer than the matched record. A stale write is `Ok(PutOutcome::Stale)`.
    async fn put(
        &self,
        coordinate: &Coordinate,
        snapshot: &WeatherSnapshot,
    ) -> Result<PutOutcome, StorageError>;
}
