//! Time-ordered sensor datasets organised as parallel channels.
//!
//! Orientation data is `[time, gyro_x, gyro_y, gyro_z, accel_x, accel_y, accel_z]`,
//! velocity data is `[time, accel_x, accel_y, accel_z, pitch, position]`.
//! Every constructor validates channel lengths and the time axis, so a
//! dataset value is always safe to feed to a filter.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::{FusionError, FusionResult};
use crate::types::{OrientationSample, VelocitySample};

pub const ORIENTATION_CHANNELS: usize = 7;
pub const VELOCITY_CHANNELS: usize = 6;

/// Timestamps must be finite and strictly increasing.
pub fn validate_time_axis(time: &[f64]) -> FusionResult<()> {
    if let Some(i) = time.iter().position(|t| !t.is_finite()) {
        return Err(FusionError::invalid(format!(
            "timestamp {i} is not finite"
        )));
    }
    if let Some(i) = time.windows(2).position(|w| w[1] <= w[0]) {
        return Err(FusionError::invalid(format!(
            "timestamps must be strictly increasing: t[{}] = {} follows t[{}] = {}",
            i + 1,
            time[i + 1],
            i,
            time[i]
        )));
    }
    Ok(())
}

fn check_lengths(names: &[&str], channels: &[&Vec<f64>]) -> FusionResult<()> {
    let expected = channels.first().map(|c| c.len()).unwrap_or(0);
    for (name, channel) in names.iter().zip(channels) {
        if channel.len() != expected {
            return Err(FusionError::invalid(format!(
                "channel '{name}' has {} samples, expected {expected}",
                channel.len()
            )));
        }
    }
    Ok(())
}

fn rows_to_channels<const C: usize>(rows: ArrayView2<'_, f64>) -> FusionResult<[Vec<f64>; C]> {
    let (n_rows, _) = rows.dim();
    if n_rows != C {
        return Err(FusionError::invalid(format!(
            "expected {C} channel rows, got {n_rows}"
        )));
    }
    Ok(std::array::from_fn(|i| rows.row(i).to_vec()))
}

/// Gyroscope + accelerometer recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OrientationChannels", into = "OrientationChannels")]
pub struct OrientationDataset {
    channels: OrientationChannels,
}

/// Named channels as they appear on disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationChannels {
    pub time: Vec<f64>,
    pub gyro_x: Vec<f64>,
    pub gyro_y: Vec<f64>,
    pub gyro_z: Vec<f64>,
    pub accel_x: Vec<f64>,
    pub accel_y: Vec<f64>,
    pub accel_z: Vec<f64>,
}

impl TryFrom<OrientationChannels> for OrientationDataset {
    type Error = FusionError;

    fn try_from(channels: OrientationChannels) -> FusionResult<Self> {
        let c = &channels;
        check_lengths(
            &["time", "gyro_x", "gyro_y", "gyro_z", "accel_x", "accel_y", "accel_z"],
            &[&c.time, &c.gyro_x, &c.gyro_y, &c.gyro_z, &c.accel_x, &c.accel_y, &c.accel_z],
        )?;
        validate_time_axis(&c.time)?;
        Ok(Self { channels })
    }
}

impl From<OrientationDataset> for OrientationChannels {
    fn from(dataset: OrientationDataset) -> Self {
        dataset.channels
    }
}

impl OrientationDataset {
    pub fn new(channels: OrientationChannels) -> FusionResult<Self> {
        Self::try_from(channels)
    }

    /// Build from a 7×n array, one row per channel.
    pub fn from_rows(rows: ArrayView2<'_, f64>) -> FusionResult<Self> {
        let [time, gyro_x, gyro_y, gyro_z, accel_x, accel_y, accel_z] =
            rows_to_channels::<ORIENTATION_CHANNELS>(rows)?;
        Self::new(OrientationChannels {
            time,
            gyro_x,
            gyro_y,
            gyro_z,
            accel_x,
            accel_y,
            accel_z,
        })
    }

    pub fn from_samples(samples: &[OrientationSample]) -> FusionResult<Self> {
        Self::new(OrientationChannels {
            time: samples.iter().map(|s| s.timestamp).collect(),
            gyro_x: samples.iter().map(|s| s.gyro.0).collect(),
            gyro_y: samples.iter().map(|s| s.gyro.1).collect(),
            gyro_z: samples.iter().map(|s| s.gyro.2).collect(),
            accel_x: samples.iter().map(|s| s.accel.0).collect(),
            accel_y: samples.iter().map(|s| s.accel.1).collect(),
            accel_z: samples.iter().map(|s| s.accel.2).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.channels.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.time.is_empty()
    }

    pub fn time(&self) -> &[f64] {
        &self.channels.time
    }

    pub fn channels(&self) -> &OrientationChannels {
        &self.channels
    }

    /// Sample `i`. Panics when out of range, like slice indexing.
    pub fn sample(&self, i: usize) -> OrientationSample {
        let c = &self.channels;
        OrientationSample {
            timestamp: c.time[i],
            gyro: (c.gyro_x[i], c.gyro_y[i], c.gyro_z[i]),
            accel: (c.accel_x[i], c.accel_y[i], c.accel_z[i]),
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = OrientationSample> + '_ {
        (0..self.len()).map(move |i| self.sample(i))
    }
}

/// Acceleration + pitch + cumulative position recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VelocityChannels", into = "VelocityChannels")]
pub struct VelocityDataset {
    channels: VelocityChannels,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityChannels {
    pub time: Vec<f64>,
    pub accel_x: Vec<f64>,
    pub accel_y: Vec<f64>,
    pub accel_z: Vec<f64>,
    /// Pitch angle [deg]
    pub pitch: Vec<f64>,
    pub position: Vec<f64>,
}

impl TryFrom<VelocityChannels> for VelocityDataset {
    type Error = FusionError;

    fn try_from(channels: VelocityChannels) -> FusionResult<Self> {
        let c = &channels;
        check_lengths(
            &["time", "accel_x", "accel_y", "accel_z", "pitch", "position"],
            &[&c.time, &c.accel_x, &c.accel_y, &c.accel_z, &c.pitch, &c.position],
        )?;
        validate_time_axis(&c.time)?;
        Ok(Self { channels })
    }
}

impl From<VelocityDataset> for VelocityChannels {
    fn from(dataset: VelocityDataset) -> Self {
        dataset.channels
    }
}

impl VelocityDataset {
    pub fn new(channels: VelocityChannels) -> FusionResult<Self> {
        Self::try_from(channels)
    }

    /// Build from a 6×n array, one row per channel.
    pub fn from_rows(rows: ArrayView2<'_, f64>) -> FusionResult<Self> {
        let [time, accel_x, accel_y, accel_z, pitch, position] =
            rows_to_channels::<VELOCITY_CHANNELS>(rows)?;
        Self::new(VelocityChannels {
            time,
            accel_x,
            accel_y,
            accel_z,
            pitch,
            position,
        })
    }

    pub fn from_samples(samples: &[VelocitySample]) -> FusionResult<Self> {
        Self::new(VelocityChannels {
            time: samples.iter().map(|s| s.timestamp).collect(),
            accel_x: samples.iter().map(|s| s.accel.0).collect(),
            accel_y: samples.iter().map(|s| s.accel.1).collect(),
            accel_z: samples.iter().map(|s| s.accel.2).collect(),
            pitch: samples.iter().map(|s| s.pitch).collect(),
            position: samples.iter().map(|s| s.position).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.channels.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.time.is_empty()
    }

    pub fn time(&self) -> &[f64] {
        &self.channels.time
    }

    pub fn channels(&self) -> &VelocityChannels {
        &self.channels
    }

    /// Sample `i`. Panics when out of range, like slice indexing.
    pub fn sample(&self, i: usize) -> VelocitySample {
        let c = &self.channels;
        VelocitySample {
            timestamp: c.time[i],
            accel: (c.accel_x[i], c.accel_y[i], c.accel_z[i]),
            pitch: c.pitch[i],
            position: c.position[i],
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = VelocitySample> + '_ {
        (0..self.len()).map(move |i| self.sample(i))
    }
}
