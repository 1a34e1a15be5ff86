use marionette_core::{AnimationError, Result};

use crate::values::Interpolatable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    #[default]
    Linear,
    Step,
}

/// How far the cursor scans locally before falling back to binary search.
const MAX_SCAN_OFFSET: usize = 3;

/// Remembers the last keyframe interval a track was sampled in.
///
/// Playback moves forward by small steps almost every frame, so the next
/// interval is usually the same one or its neighbour.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyframeCursor {
    pub last_index: usize,
}

impl KeyframeCursor {
    #[inline]
    pub fn reset(&mut self) {
        self.last_index = 0;
    }
}

/// Keyframes of one animated property, sorted by time.
///
/// Always holds at least one keyframe; [`new`](Self::new) rejects anything
/// else, so the fields stay private.
#[derive(Debug, Clone)]
pub struct KeyframeTrack<T: Interpolatable> {
    times: Vec<f32>,
    values: Vec<T>,
    interpolation: InterpolationMode,
}

impl<T: Interpolatable> KeyframeTrack<T> {
    /// Creates a track. `times` and `values` must have the same non-zero
    /// length, with `times` finite and sorted ascending.
    pub fn new(times: Vec<f32>, values: Vec<T>, interpolation: InterpolationMode) -> Result<Self> {
        if times.is_empty() {
            return Err(AnimationError::InvalidTrack("no keyframes".to_string()));
        }
        if times.len() != values.len() {
            return Err(AnimationError::InvalidTrack(format!(
                "{} keyframe times but {} values",
                times.len(),
                values.len()
            )));
        }
        if let Some(bad) = times.iter().position(|t| !t.is_finite()) {
            return Err(AnimationError::InvalidTrack(format!(
                "keyframe {bad} has a non-finite time"
            )));
        }
        if let Some(bad) = times.windows(2).position(|w| w[0] > w[1]) {
            return Err(AnimationError::InvalidTrack(format!(
                "keyframe {} is earlier than keyframe {bad}",
                bad + 1
            )));
        }
        Ok(Self {
            times,
            values,
            interpolation,
        })
    }

    /// Track holding a single constant value.
    #[must_use]
    pub fn constant(value: T) -> Self {
        Self {
            times: vec![0.0],
            values: vec![value],
            interpolation: InterpolationMode::Step,
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn times(&self) -> &[f32] {
        &self.times
    }

    #[inline]
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[inline]
    #[must_use]
    pub fn interpolation(&self) -> InterpolationMode {
        self.interpolation
    }

    /// Time of the last keyframe.
    #[inline]
    #[must_use]
    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    /// Stateless sampling (binary search). Times outside the keyed range
    /// clamp to the first/last value. `None` only for a track without
    /// keyframes.
    #[must_use]
    pub fn sample(&self, time: f32) -> Option<T> {
        let next = self.times.partition_point(|&t| t <= time);
        self.sample_at_frame(next.saturating_sub(1), time)
    }

    /// Sampling accelerated by `cursor`, which is updated to the interval
    /// that contained `time`.
    pub fn sample_with_cursor(&self, time: f32, cursor: &mut KeyframeCursor) -> Option<T> {
        let len = self.times.len();
        if len <= 1 {
            return self.values.first().copied();
        }

        let index = self
            .scan_from(cursor.last_index.min(len - 1), time)
            .unwrap_or_else(|| {
                self.times
                    .partition_point(|&t| t <= time)
                    .saturating_sub(1)
            });

        cursor.last_index = index;
        self.sample_at_frame(index, time)
    }

    /// Looks for the interval containing `time` within a few keyframes of
    /// `start`. Intervals are half-open: `[times[i], times[i + 1])`.
    fn scan_from(&self, start: usize, time: f32) -> Option<usize> {
        let last = self.times.len() - 1;

        if time >= self.times[start] {
            for index in start..=(start + MAX_SCAN_OFFSET).min(last) {
                if index == last || time < self.times[index + 1] {
                    return Some(index);
                }
            }
            None
        } else {
            (start.saturating_sub(MAX_SCAN_OFFSET)..start)
                .rev()
                .find(|&index| time >= self.times[index])
        }
    }

    fn sample_at_frame(&self, index: usize, time: f32) -> Option<T> {
        let last = self.times.len().checked_sub(1)?;
        if index >= last {
            return Some(self.values[last]);
        }

        let t0 = self.times[index];
        let t1 = self.times[index + 1];
        let span = t1 - t0;
        let t = if span > 1e-6 {
            ((time - t0) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Some(match self.interpolation {
            InterpolationMode::Step => self.values[index],
            InterpolationMode::Linear => {
                T::interpolate_linear(&self.values[index], &self.values[index + 1], t)
            }
        })
    }
}
