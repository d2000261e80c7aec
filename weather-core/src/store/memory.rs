use async_trait::async_trait;
use parking_lot::Mutex;

use super::{PutOutcome, WeatherRecordStore};
use crate::{Coordinate, WeatherSnapshot, error::StorageError, model::DEFAULT_COORDINATE_EPSILON};

/// Process-local store; records live in insertion order.
#[derive(Debug)]
pub struct MemoryWeatherStore {
    epsilon: f64,
    records: Mutex<Vec<WeatherSnapshot>>,
}

impl MemoryWeatherStore {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for MemoryWeatherStore {
    fn default() -> Self {
        Self::new(DEFAULT_COORDINATE_EPSILON)
    }
}

#[async_trait]
impl WeatherRecordStore for MemoryWeatherStore {
    async fn get(&self, coordinate: &Coordinate) -> Result<Option<WeatherSnapshot>, StorageError> {
        let records = self.records.lock();
        Ok(records
            .iter()
            .find(|r| r.location.matches(coordinate, self.epsilon))
            .cloned())
    }

    async fn put(
        &self,
        coordinate: &Coordinate,
        snapshot: &WeatherSnapshot,
    ) -> Result<PutOutcome, StorageError> {
        let mut records = self.records.lock();

        match records
            .iter_mut()
            .find(|r| r.location.matches(coordinate, self.epsilon))
        {
            Some(existing) if snapshot.current.observed_at <= existing.current.observed_at => {
                Ok(PutOutcome::Stale)
            }
            Some(existing) => {
                // the record keeps the coordinate it was first stored under
                existing.timezone_offset_seconds = snapshot.timezone_offset_seconds;
                existing.current = snapshot.current.clone();
                existing.daily = snapshot.daily.clone();
                Ok(PutOutcome::Updated)
            }
            None => {
                let mut record = snapshot.clone();
                record.location = *coordinate;
                records.push(record);
                Ok(PutOutcome::Inserted)
            }
        }
    }
}
