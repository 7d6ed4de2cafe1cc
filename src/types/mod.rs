pub mod linalg;

pub use linalg::*;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One gyroscope + accelerometer reading.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    pub timestamp: f64,
    /// Angular rate [deg/s]
    pub gyro: (f64, f64, f64),
    /// Linear acceleration (gravity-normalised or any consistent unit)
    pub accel: (f64, f64, f64),
}

impl OrientationSample {
    pub fn gyro_vec(&self) -> Vector3<f64> {
        Vector3::new(self.gyro.0, self.gyro.1, self.gyro.2)
    }

    pub fn accel_vec(&self) -> Vector3<f64> {
        Vector3::new(self.accel.0, self.accel.1, self.accel.2)
    }
}

/// One acceleration + pitch + cumulative position reading.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VelocitySample {
    pub timestamp: f64,
    pub accel: (f64, f64, f64),
    /// Pitch angle [deg]
    pub pitch: f64,
    /// Cumulative forward position
    pub position: f64,
}

impl VelocitySample {
    pub fn accel_vec(&self) -> Vector3<f64> {
        Vector3::new(self.accel.0, self.accel.1, self.accel.2)
    }
}

/// Roll and pitch output of one orientation step [deg].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
}
