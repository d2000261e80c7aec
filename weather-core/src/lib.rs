//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - The weather snapshot model and the coordinate-keyed record store
//! - Read-through synchronization against remote providers
//! - Change detection on server timestamps and the foreground refresh timer
//! - Configuration & credentials handling
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod change;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod freshness;
pub mod model;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod store;

pub use change::{Change, classify};
pub use config::{Config, ProviderConfig, SyncConfig};
pub use coordinator::{Clock, SystemClock, WeatherSyncCoordinator};
pub use error::{FetchError, StorageError};
pub use freshness::is_fresh;
pub use model::{Coordinate, CurrentConditions, DailyForecast, WeatherSnapshot, WeatherUpdate};
pub use provider::{ProviderId, WeatherFetcher};
pub use scheduler::{Lifecycle, RefreshScheduler, RefreshTarget, SchedulerState};
pub use session::{ActiveLocationState, WeatherSession};
pub use store::{MemoryWeatherStore, PutOutcome, SqliteWeatherStore, WeatherRecordStore};
