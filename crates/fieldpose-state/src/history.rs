//! [`TimeIndexedHistory`] – time-ordered, bounded-retention sample store.
//!
//! Samples are keyed by their timestamp (seconds on the process clock).  On
//! every insertion the store drops everything older than
//! `latest − retention_seconds`, so memory stays bounded no matter how long
//! the robot runs.
//!
//! Lookups between two samples are answered by the history's interpolator,
//! chosen per instance: linear for scalars, screw motion for poses.
//!
//! # Concurrency
//!
//! The map sits behind a [`parking_lot::RwLock`].  Writers hold the lock for
//! one `O(log n)` insert plus the prune; readers hold it only long enough to
//! clone the neighbouring samples and interpolate after releasing it.  A
//! reader therefore never observes a half-inserted sample, concurrent readers
//! never block each other, and writes are serialised.
//!
//! # Example
//!
//! ```rust
//! use fieldpose_state::history::TimeIndexedHistory;
//!
//! let history = TimeIndexedHistory::scalar(1.0);
//! history.insert(0.0, 0.0).unwrap();
//! history.insert(1.0, 10.0).unwrap();
//!
//! assert_eq!(history.sample_at(0.25), Some(2.5));
//! assert_eq!(history.max_absolute_in_window(0.0, 2.0), Some(10.0));
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use fieldpose_types::{FieldPoseError, Pose2d};
use parking_lot::RwLock;

// ────────────────────────────────────────────────────────────────────────────
// Interpolation strategy
// ────────────────────────────────────────────────────────────────────────────

/// Pure blend between two samples.
///
/// Implementations must return `start` exactly for `t = 0` and `end` exactly
/// for `t = 1`.
pub trait Interpolate: Sized {
    fn interpolate(&self, end: &Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn interpolate(&self, end: &Self, t: f64) -> Self {
        if t <= 0.0 {
            *self
        } else if t >= 1.0 {
            *end
        } else {
            self + (end - self) * t
        }
    }
}

impl Interpolate for Pose2d {
    fn interpolate(&self, end: &Self, t: f64) -> Self {
        Pose2d::interpolate(self, end, t)
    }
}

/// Interpolation function stored by a [`TimeIndexedHistory`].
pub type Interpolator<T> = fn(&T, &T, f64) -> T;

// ────────────────────────────────────────────────────────────────────────────
// Keys and samples
// ────────────────────────────────────────────────────────────────────────────

/// Totally ordered timestamp key.  Only finite, non-negative values are ever
/// stored.
#[derive(Debug, Clone, Copy)]
struct SampleTime(f64);

impl PartialEq for SampleTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SampleTime {}

impl PartialOrd for SampleTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SampleTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// An immutable `(timestamp, value)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
    pub timestamp: f64,
    pub value: T,
}

// ────────────────────────────────────────────────────────────────────────────
// TimeIndexedHistory
// ────────────────────────────────────────────────────────────────────────────

/// Thread-safe, time-ordered store that keeps only the trailing
/// `retention_seconds` of samples.
pub struct TimeIndexedHistory<T> {
    retention_seconds: f64,
    interpolator: Interpolator<T>,
    samples: RwLock<BTreeMap<SampleTime, T>>,
}

impl<T: Clone> TimeIndexedHistory<T> {
    /// Create an empty history with an explicit interpolation function.
    pub fn new(retention_seconds: f64, interpolator: Interpolator<T>) -> Self {
        Self {
            retention_seconds,
            interpolator,
            samples: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert `value` at time zero so the history is never empty.
    pub fn with_seed(self, value: T) -> Self {
        self.samples.write().insert(SampleTime(0.0), value);
        self
    }

    pub fn retention_seconds(&self) -> f64 {
        self.retention_seconds
    }

    /// Insert (or overwrite) the sample at `timestamp`, then drop every sample
    /// strictly older than `latest − retention_seconds`.
    ///
    /// Out-of-order inserts are accepted but never widen the window: a sample
    /// older than the window of the newest key is pruned immediately.
    ///
    /// # Errors
    ///
    /// Returns [`FieldPoseError::InvalidTimestamp`] for negative or
    /// non-finite timestamps; nothing is inserted.
    pub fn insert(&self, timestamp: f64, value: T) -> Result<(), FieldPoseError> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(FieldPoseError::InvalidTimestamp(timestamp));
        }

        let mut samples = self.samples.write();
        samples.insert(SampleTime(timestamp), value);

        let latest = samples
            .last_key_value()
            .map_or(timestamp, |(key, _)| key.0);
        let cutoff = latest - self.retention_seconds;
        while let Some(entry) = samples.first_entry() {
            if entry.key().0 < cutoff {
                entry.remove();
            } else {
                break;
            }
        }
        Ok(())
    }

    /// The value at `timestamp`.
    ///
    /// An exact key is returned as stored.  Otherwise the nearest samples on
    /// either side are blended with the interpolator; if only one side
    /// exists that sample is returned unchanged.  `None` only when empty.
    pub fn sample_at(&self, timestamp: f64) -> Option<T> {
        let key = SampleTime(timestamp);
        let (floor, ceil) = {
            let samples = self.samples.read();
            if let Some(exact) = samples.get(&key) {
                return Some(exact.clone());
            }
            let floor = samples
                .range(..=key)
                .next_back()
                .map(|(k, v)| (k.0, v.clone()));
            let ceil = samples.range(key..).next().map(|(k, v)| (k.0, v.clone()));
            (floor, ceil)
        };

        match (floor, ceil) {
            (None, None) => None,
            (Some((_, value)), None) | (None, Some((_, value))) => Some(value),
            (Some((t0, start)), Some((t1, end))) => {
                let fraction = (timestamp - t0) / (t1 - t0);
                Some((self.interpolator)(&start, &end, fraction))
            }
        }
    }

    /// The highest-timestamp sample.
    pub fn latest(&self) -> Option<Sample<T>> {
        self.samples
            .read()
            .last_key_value()
            .map(|(key, value)| Sample {
                timestamp: key.0,
                value: value.clone(),
            })
    }

    /// Every retained sample with `min_time <= timestamp < max_time`, oldest
    /// first.
    pub fn samples_in_window(&self, min_time: f64, max_time: f64) -> Vec<Sample<T>> {
        if min_time.partial_cmp(&max_time) != Some(Ordering::Less) {
            return Vec::new();
        }
        self.samples
            .read()
            .range(SampleTime(min_time)..SampleTime(max_time))
            .map(|(key, value)| Sample {
                timestamp: key.0,
                value: value.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    /// Drop every sample.
    pub fn clear(&self) {
        self.samples.write().clear();
    }
}

impl<T: Interpolate + Clone> TimeIndexedHistory<T> {
    /// Create an empty history that blends with `T`'s own [`Interpolate`]
    /// implementation.
    pub fn interpolating(retention_seconds: f64) -> Self {
        Self::new(retention_seconds, <T as Interpolate>::interpolate)
    }
}

impl TimeIndexedHistory<f64> {
    /// A linearly interpolated scalar series.
    pub fn scalar(retention_seconds: f64) -> Self {
        Self::interpolating(retention_seconds)
    }

    /// Over the samples with `min_time <= timestamp < max_time`, return
    /// whichever of the maximum and minimum has the larger magnitude.  Ties
    /// go to the maximum.  `None` when the window holds no samples.
    pub fn max_absolute_in_window(&self, min_time: f64, max_time: f64) -> Option<f64> {
        if min_time.partial_cmp(&max_time) != Some(Ordering::Less) {
            return None;
        }
        let samples = self.samples.read();
        let mut values = samples
            .range(SampleTime(min_time)..SampleTime(max_time))
            .map(|(_, v)| *v);
        let first = values.next()?;
        let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if max.abs() >= min.abs() {
            Some(max)
        } else {
            Some(min)
        }
    }
}

impl<T> fmt::Debug for TimeIndexedHistory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeIndexedHistory")
            .field("retention_seconds", &self.retention_seconds)
            .field("len", &self.samples.read().len())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
