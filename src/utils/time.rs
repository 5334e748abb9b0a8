//! Year bucketing for topic evolution series.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bucket widths accepted by the time-distribution stage
pub const ALLOWED_INTERVALS: [u32; 5] = [1, 10, 25, 50, 100];

/// Validated bucket width in years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TimeInterval(u32);

impl TimeInterval {
    pub fn new(years: u32) -> Result<Self> {
        if ALLOWED_INTERVALS.contains(&years) {
            Ok(TimeInterval(years))
        } else {
            Err(Error::configuration(format!(
                "invalid time interval {years}, expected one of {ALLOWED_INTERVALS:?}"
            )))
        }
    }

    #[inline]
    pub fn years(self) -> u32 {
        self.0
    }

    /// Start year of the bucket containing `year`
    #[inline]
    pub fn normalize(self, year: i32) -> i32 {
        year_normalizer(year, self.0)
    }
}

impl Default for TimeInterval {
    fn default() -> Self {
        TimeInterval(1)
    }
}

impl TryFrom<u32> for TimeInterval {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        TimeInterval::new(value)
    }
}

impl From<TimeInterval> for u32 {
    fn from(value: TimeInterval) -> Self {
        value.0
    }
}

/// Floor `year` to a multiple of `interval`.
/// Negative years floor toward negative infinity.
#[inline]
pub fn year_normalizer(year: i32, interval: u32) -> i32 {
    let interval = interval.max(1) as i32;
    year.div_euclid(interval) * interval
}

/// Ordered bucket start years covering `[start, end]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    interval: TimeInterval,
    buckets: Vec<i32>,
}

impl Timeline {
    /// Buckets from `normalize(start)` to `normalize(end)` inclusive.
    /// An inverted range yields an empty timeline.
    pub fn new(start: i32, end: i32, interval: TimeInterval) -> Self {
        let first = interval.normalize(start);
        let last = interval.normalize(end);
        let step = interval.years() as usize;
        let buckets = if first > last {
            Vec::new()
        } else {
            (first..=last).step_by(step).collect()
        };
        Timeline { interval, buckets }
    }

    /// Timeline of a corpus without years
    pub fn empty(interval: TimeInterval) -> Self {
        Timeline {
            interval,
            buckets: Vec::new(),
        }
    }

    pub fn interval(&self) -> TimeInterval {
        self.interval
    }

    pub fn buckets(&self) -> &[i32] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Position of the bucket holding `year`, `None` outside the range
    pub fn bucket_of(&self, year: i32) -> Option<usize> {
        let first = *self.buckets.first()?;
        let normalized = self.interval.normalize(year);
        if normalized < first {
            return None;
        }
        let pos = ((normalized - first) / self.interval.years() as i32) as usize;
        (pos < self.buckets.len()).then_some(pos)
    }
}
