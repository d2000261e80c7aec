use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Default time a stored snapshot may be served without a network call.
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(600);

/// Whether a snapshot observed at `observed_at` can still be served at `now`.
///
/// Holds iff `observed_at > now - cache_duration`; the boundary itself is stale.
pub fn is_fresh(observed_at: DateTime<Utc>, now: DateTime<Utc>, cache_duration: Duration) -> bool {
    let cutoff = TimeDelta::from_std(cache_duration)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta));

    match cutoff {
        Some(cutoff) => observed_at > cutoff,
        // a window wider than the representable range covers everything
        None => true,
    }
}
