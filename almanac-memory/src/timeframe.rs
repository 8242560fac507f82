//! Time windows for timeframe queries

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Closed interval `[start, end]` over entry timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// From `start` until now
    pub fn since(start: DateTime<Utc>) -> Self {
        Self::new(start, Utc::now())
    }

    /// The last `days` days, ending now
    pub fn last_days(days: i64) -> Self {
        Self::since(Utc::now() - Duration::days(days))
    }

    /// Inclusive on both ends
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time <= self.end
    }
}
