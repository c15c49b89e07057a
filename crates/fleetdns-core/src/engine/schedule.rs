//! Due checks and target selection
//!
//! Pure functions of a pool and a clock reading so the rotation decision can
//! be tested without a store or a timer.

use chrono::{DateTime, Timelike, Utc};
use rand::Rng;

use crate::model::{RotationMode, RotationPool, RotationStrategy};

/// Whether a pool should rotate at `now`
///
/// - Interval: never rotated, or at least `interval_secs` since the last
///   rotation
/// - Scheduled: `now` falls in a configured minute (UTC) and the pool has
///   not rotated within `debounce`
pub fn is_due(pool: &RotationPool, now: DateTime<Utc>, debounce: chrono::Duration) -> bool {
    match pool.settings.mode {
        RotationMode::Interval => match pool.last_rotated_at {
            None => true,
            Some(last) => {
                now.signed_duration_since(last).num_seconds() >= pool.settings.interval_secs as i64
            }
        },
        RotationMode::Scheduled => {
            let in_slot = pool
                .settings
                .schedule
                .iter()
                .any(|t| t.hour() == now.hour() && t.minute() == now.minute());
            let debounced = pool
                .last_rotated_at
                .is_some_and(|last| now.signed_duration_since(last) < debounce);
            in_slot && !debounced
        }
    }
}

/// Index of the next target in an eligible list of `len` machines
///
/// A pool that has never had a target starts at index 0 under round-robin.
/// `len` must be non-zero.
pub fn select_index(pool: &RotationPool, len: usize) -> usize {
    debug_assert!(len > 0);
    match pool.settings.strategy {
        RotationStrategy::RoundRobin => {
            if pool.current_machine_id.is_none() {
                0
            } else {
                (pool.current_index + 1) % len
            }
        }
        RotationStrategy::Random => rand::thread_rng().gen_range(0..len),
    }
}
