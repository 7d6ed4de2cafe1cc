//! Contract for downstream gait analyzers (harmonic ratio, recurrence
//! quantification, ...). They live outside this crate; estimator outputs are
//! handed to them as plain numeric series.

use crate::error::{FusionError, FusionResult};
use crate::filters::orientation::OrientationSeries;
use crate::filters::velocity::SpeedSeries;

/// How the samples of a series are spaced in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimeAxis<'a> {
    /// Uniform sampling [Hz]
    SampleRate(f64),
    /// One timestamp per sample [s]
    Explicit(&'a [f64]),
}

impl TimeAxis<'_> {
    /// Check the axis describes `len` samples.
    pub fn validate(&self, len: usize) -> FusionResult<()> {
        match self {
            TimeAxis::SampleRate(hz) if !(hz.is_finite() && *hz > 0.0) => Err(
                FusionError::invalid(format!("sample rate must be positive, got {hz}")),
            ),
            TimeAxis::SampleRate(_) => Ok(()),
            TimeAxis::Explicit(time) if time.len() != len => Err(FusionError::invalid(format!(
                "time axis has {} entries for {len} samples",
                time.len()
            ))),
            TimeAxis::Explicit(time) => crate::dataset::validate_time_axis(time),
        }
    }
}

/// A single-series analyzer: numeric series in, derived numeric series out.
pub trait SeriesAnalyzer {
    fn analyze(&mut self, series: &[f64], axis: TimeAxis<'_>) -> FusionResult<Vec<f64>>;
}

/// Named output channel of an estimator run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Roll,
    Pitch,
    Speed,
}

/// Anything that can hand a channel plus its time axis to an analyzer.
pub trait SeriesSource {
    fn channel(&self, channel: Channel) -> Option<(&[f64], TimeAxis<'_>)>;

    fn analyze_with<A: SeriesAnalyzer>(
        &self,
        channel: Channel,
        analyzer: &mut A,
    ) -> FusionResult<Vec<f64>> {
        let (series, axis) = self.channel(channel).ok_or_else(|| {
            FusionError::invalid(format!("channel {channel:?} is not part of this series"))
        })?;
        axis.validate(series.len())?;
        analyzer.analyze(series, axis)
    }
}

impl SeriesSource for OrientationSeries {
    fn channel(&self, channel: Channel) -> Option<(&[f64], TimeAxis<'_>)> {
        let axis = TimeAxis::Explicit(&self.time);
        match channel {
            Channel::Roll => Some((self.roll.as_slice(), axis)),
            Channel::Pitch => Some((self.pitch.as_slice(), axis)),
            Channel::Speed => None,
        }
    }
}

impl SeriesSource for SpeedSeries {
    fn channel(&self, channel: Channel) -> Option<(&[f64], TimeAxis<'_>)> {
        match channel {
            Channel::Speed => Some((self.speed.as_slice(), TimeAxis::Explicit(&self.time))),
            _ => None,
        }
    }
}
