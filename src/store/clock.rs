//! Monotonic server clock.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use crate::types::{FieldValue, Fields};

/// Strictly increasing clock used to resolve server timestamp sentinels.
///
/// Two calls never return the same instant, even when the wall clock stalls
/// or steps backwards.
///
/// # Examples
///
/// ```
/// use tasksync::store::ServerClock;
///
/// let clock = ServerClock::new();
/// let a = clock.now();
/// let b = clock.now();
/// assert!(b > a);
/// ```
#[derive(Debug)]
pub struct ServerClock {
    last: Mutex<DateTime<Utc>>,
}

impl ServerClock {
    /// Creates a clock.
    pub fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Returns the next timestamp.
    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let wall = Utc::now();
        let next = if wall > *last {
            wall
        } else {
            *last + TimeDelta::microseconds(1)
        };
        *last = next;
        next
    }

    /// Replaces every [`FieldValue::ServerTimestamp`] in `fields` with one
    /// commit timestamp.
    pub fn resolve(&self, mut fields: Fields) -> Fields {
        if fields
            .values()
            .any(|v| matches!(v, FieldValue::ServerTimestamp))
        {
            let at = self.now();
            for value in fields.values_mut() {
                if matches!(value, FieldValue::ServerTimestamp) {
                    *value = FieldValue::Timestamp(at);
                }
            }
        }
        fields
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}
